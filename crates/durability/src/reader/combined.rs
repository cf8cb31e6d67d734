//! One continuous entry sequence over several TLogs.

use super::generator::{BoxedReader, Direction, ReaderResult, TLogReaderGenerator, ThreadedGenerator};
use super::TLogReader;
use crate::backend::Backend;
use crate::config::TLogConfig;
use crate::error::TLogError;
use std::path::Path;
use voltlog_core::Entry;

/// Concatenation of the readers produced by a generator.
///
/// When the current reader is exhausted the next one is taken from the
/// generator; the caller sees one sequence.
pub struct CombinedReader<G> {
    generator: G,
    current: Option<BoxedReader>,
}

impl<G> CombinedReader<G>
where
    G: Iterator<Item = ReaderResult> + Send,
{
    /// Concatenate the readers of `generator`.
    pub fn new(generator: G) -> Self {
        CombinedReader {
            generator,
            current: None,
        }
    }
}

impl CombinedReader<TLogReaderGenerator> {
    /// Read `names` oldest entry first, TLog after TLog.
    pub fn forward(
        dir: &Path,
        names: Vec<String>,
        backend: Box<dyn Backend>,
        config: TLogConfig,
    ) -> Self {
        CombinedReader::new(TLogReaderGenerator::new(
            dir,
            names,
            backend,
            config,
            Direction::Forward,
        ))
    }

    /// Read `names` newest entry first: the last TLog backwards, then the
    /// one before it, and so on.
    pub fn backward(
        dir: &Path,
        mut names: Vec<String>,
        backend: Box<dyn Backend>,
        config: TLogConfig,
    ) -> Self {
        names.reverse();
        CombinedReader::new(TLogReaderGenerator::new(
            dir,
            names,
            backend,
            config,
            Direction::Backward,
        ))
    }
}

impl CombinedReader<ThreadedGenerator> {
    /// Like `forward`, with readers opened (and fetched) on a background
    /// thread up to `config.prefetch_depth` ahead.
    pub fn forward_prefetched(
        dir: &Path,
        names: Vec<String>,
        backend: Box<dyn Backend>,
        config: TLogConfig,
    ) -> Result<Self, TLogError> {
        let depth = config.prefetch_depth;
        let generator = TLogReaderGenerator::new(dir, names, backend, config, Direction::Forward);
        Ok(CombinedReader::new(ThreadedGenerator::spawn(generator, depth)?))
    }
}

impl<G> TLogReader for CombinedReader<G>
where
    G: Iterator<Item = ReaderResult> + Send,
{
    fn next_any(&mut self) -> Result<Option<Entry>, TLogError> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(entry) = reader.next_any()? {
                    return Ok(Some(entry));
                }
                self.current = None;
            }
            match self.generator.next() {
                Some(reader) => self.current = Some(reader?),
                None => return Ok(None),
            }
        }
    }
}
