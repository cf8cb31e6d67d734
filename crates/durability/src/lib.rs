//! TLog I/O for voltlog
//!
//! This crate handles everything that touches TLog files and the object
//! store:
//!
//! - Backend: whole-object store interface, plus a local directory backend
//! - File pool: named scratch files for intermediate results
//! - Readers: forward, backward and combined readers, with generators that
//!   prefetch per-TLog readers on a background thread
//! - Writer: buffered append-only writer sealing TLogs with a TLog CRC
//! - Processors: entry visitors and TLog validators

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod error;
pub mod file_pool;
pub mod processor;
pub mod reader;
pub mod writer;

pub use backend::{Backend, InsistOnLatest, LocalBackend, ObjectMayNotExist, OverwriteObject};
pub use config::{TLogConfig, TLogConfigError};
pub use error::{BackendError, TLogError};
pub use file_pool::FilePool;
pub use processor::{
    dispatch, verify_tlog, ClusterLocationTracker, CombinedProcessor, EntryProcessor,
    EntryVisitor, ScoCrcValidator, TLogCrcValidator, TLogVerification,
};
pub use reader::{
    BackwardReader, BoxedReader, CombinedReader, DelayedGenerator, Direction, ForwardReader,
    PrefetchGenerator, ReaderResult, TLogReader, TLogReaderGenerator, ThreadedGenerator,
};
pub use writer::TLogWriter;
