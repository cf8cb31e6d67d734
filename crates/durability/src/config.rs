//! TLog reader/writer configuration.

/// Buffer sizes and prefetch depth for TLog I/O.
#[derive(Debug, Clone)]
pub struct TLogConfig {
    /// Entries buffered by a reader per refill (default: 65536).
    pub read_buffer_entries: usize,

    /// Entries buffered by a writer before they hit the file (default: 64).
    pub write_buffer_entries: usize,

    /// Readers opened ahead of the consumer by a threaded generator
    /// (default: 10).
    pub prefetch_depth: usize,
}

impl Default for TLogConfig {
    fn default() -> Self {
        TLogConfig {
            read_buffer_entries: 65536,
            write_buffer_entries: 64,
            prefetch_depth: 10,
        }
    }
}

impl TLogConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reader buffer size (builder pattern).
    pub fn with_read_buffer_entries(mut self, entries: usize) -> Self {
        self.read_buffer_entries = entries;
        self
    }

    /// Set the writer buffer size (builder pattern).
    pub fn with_write_buffer_entries(mut self, entries: usize) -> Self {
        self.write_buffer_entries = entries;
        self
    }

    /// Set the prefetch depth (builder pattern).
    pub fn with_prefetch_depth(mut self, depth: usize) -> Self {
        self.prefetch_depth = depth;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), TLogConfigError> {
        if self.read_buffer_entries == 0 {
            return Err(TLogConfigError::ZeroReadBuffer);
        }
        if self.write_buffer_entries == 0 {
            return Err(TLogConfigError::ZeroWriteBuffer);
        }
        if self.prefetch_depth == 0 {
            return Err(TLogConfigError::ZeroPrefetchDepth);
        }
        Ok(())
    }

    /// Create a configuration for testing (tiny buffers so refills happen).
    pub fn for_testing() -> Self {
        TLogConfig {
            read_buffer_entries: 3,
            write_buffer_entries: 2,
            prefetch_depth: 2,
        }
    }
}

/// TLog configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TLogConfigError {
    /// Reader buffer must hold at least one entry.
    #[error("Read buffer must hold at least one entry")]
    ZeroReadBuffer,

    /// Writer buffer must hold at least one entry.
    #[error("Write buffer must hold at least one entry")]
    ZeroWriteBuffer,

    /// Prefetch queue must hold at least one reader.
    #[error("Prefetch depth must be at least 1")]
    ZeroPrefetchDepth,
}
