//! Generators of per-TLog readers.
//!
//! A generator is an `Iterator` yielding one opened reader per TLog name.
//! Opening a reader may mean fetching the TLog from the backend, so the
//! generators here let that latency overlap with consumption:
//!
//! - `TLogReaderGenerator`: opens readers on demand, in name order
//! - `ThreadedGenerator`: runs another generator on a background thread,
//!   at most `depth` readers ahead of the consumer
//! - `PrefetchGenerator`: opens every reader up front
//! - `DelayedGenerator`: adds a fixed delay per reader, for exercising the
//!   prefetching paths

use super::{BackwardReader, ForwardReader, TLogReader};
use crate::backend::Backend;
use crate::config::TLogConfig;
use crate::error::TLogError;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// A reader over one TLog, as handed out by generators.
pub type BoxedReader = Box<dyn TLogReader>;

/// What a generator yields.
pub type ReaderResult = Result<BoxedReader, TLogError>;

/// Direction in which generated readers walk their TLog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Oldest entry first
    Forward,
    /// Newest entry first
    Backward,
}

/// Opens a reader per TLog name, in the order given.
pub struct TLogReaderGenerator {
    dir: PathBuf,
    names: VecDeque<String>,
    backend: Box<dyn Backend>,
    config: TLogConfig,
    direction: Direction,
}

impl TLogReaderGenerator {
    /// Generator over `names`, looked up in `dir` or fetched from `backend`.
    pub fn new(
        dir: impl Into<PathBuf>,
        names: Vec<String>,
        backend: Box<dyn Backend>,
        config: TLogConfig,
        direction: Direction,
    ) -> Self {
        TLogReaderGenerator {
            dir: dir.into(),
            names: names.into(),
            backend,
            config,
            direction,
        }
    }
}

impl Iterator for TLogReaderGenerator {
    type Item = ReaderResult;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.names.pop_front()?;
        let reader: ReaderResult = match self.direction {
            Direction::Forward => {
                ForwardReader::open_in(&self.dir, &name, self.backend.as_ref(), &self.config)
                    .map(|r| Box::new(r) as BoxedReader)
            }
            Direction::Backward => {
                BackwardReader::open_in(&self.dir, &name, self.backend.as_ref(), &self.config)
                    .map(|r| Box::new(r) as BoxedReader)
            }
        };
        Some(reader)
    }
}

/// Runs a generator on a background thread behind a bounded queue.
///
/// Readers come out in the order the inner generator produced them. The
/// worker stops after forwarding an error. Dropping the generator
/// disconnects the queue, which stops the worker (releasing whatever
/// backend handle the inner generator holds), and joins it.
pub struct ThreadedGenerator {
    receiver: Option<Receiver<ReaderResult>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedGenerator {
    /// Start running `generator` with a queue of `depth` readers.
    pub fn spawn<G>(generator: G, depth: usize) -> Result<Self, TLogError>
    where
        G: Iterator<Item = ReaderResult> + Send + 'static,
    {
        let (sender, receiver) = bounded(depth.max(1));
        let worker = thread::Builder::new()
            .name("voltlog-prefetch".to_string())
            .spawn(move || prefetch_loop(generator, sender))?;

        Ok(ThreadedGenerator {
            receiver: Some(receiver),
            worker: Some(worker),
        })
    }

    fn join_worker(&mut self) -> Result<(), TLogError> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| TLogError::Generator("prefetch thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

fn prefetch_loop<G>(generator: G, sender: Sender<ReaderResult>)
where
    G: Iterator<Item = ReaderResult>,
{
    for item in generator {
        let failed = item.is_err();
        if sender.send(item).is_err() {
            debug!(target: "voltlog::prefetch", "consumer went away, stopping prefetch");
            return;
        }
        if failed {
            return;
        }
    }
}

impl Iterator for ThreadedGenerator {
    type Item = ReaderResult;

    fn next(&mut self) -> Option<Self::Item> {
        let received = self.receiver.as_ref()?.recv();
        match received {
            Ok(item) => Some(item),
            Err(_) => {
                self.receiver = None;
                match self.join_worker() {
                    Ok(()) => None,
                    Err(e) => {
                        error!(target: "voltlog::prefetch", error = %e, "prefetch worker failed");
                        Some(Err(e))
                    }
                }
            }
        }
    }
}

impl Drop for ThreadedGenerator {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Err(e) = self.join_worker() {
            warn!(target: "voltlog::prefetch", error = %e, "prefetch worker failed");
        }
    }
}

/// Opens every reader of the inner generator up front.
///
/// Draining stops at the first error, which is yielded in its place.
pub struct PrefetchGenerator {
    readers: VecDeque<ReaderResult>,
}

impl PrefetchGenerator {
    /// Drain `generator` now.
    pub fn new<G>(generator: G) -> Self
    where
        G: Iterator<Item = ReaderResult>,
    {
        let mut readers = VecDeque::new();
        for item in generator {
            let failed = item.is_err();
            readers.push_back(item);
            if failed {
                break;
            }
        }
        PrefetchGenerator { readers }
    }

    /// Readers still queued.
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Whether the queue is drained.
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}

impl Iterator for PrefetchGenerator {
    type Item = ReaderResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.readers.pop_front()
    }
}

/// Sleeps for a fixed delay before producing each item.
pub struct DelayedGenerator<G> {
    inner: G,
    delay: Duration,
}

impl<G> DelayedGenerator<G> {
    /// Delay every item of `inner` by `delay`.
    pub fn new(inner: G, delay: Duration) -> Self {
        DelayedGenerator { inner, delay }
    }
}

impl<G: Iterator> Iterator for DelayedGenerator<G> {
    type Item = G::Item;

    fn next(&mut self) -> Option<Self::Item> {
        thread::sleep(self.delay);
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use voltlog_core::Entry;

    struct OneEntry(Option<Entry>);

    impl TLogReader for OneEntry {
        fn next_any(&mut self) -> Result<Option<Entry>, TLogError> {
            Ok(self.0.take())
        }
    }

    fn numbered(n: u32) -> ReaderResult {
        Ok(Box::new(OneEntry(Some(Entry::ScoCrc(n)))))
    }

    fn first_crc(r: ReaderResult) -> u32 {
        r.unwrap().next_any().unwrap().unwrap().checksum().unwrap()
    }

    #[test]
    fn test_threaded_preserves_order() {
        let gen = ThreadedGenerator::spawn((0..20).map(numbered), 3).unwrap();
        let seen: Vec<u32> = gen.map(first_crc).collect();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_threaded_stops_after_error() {
        let items = vec![
            numbered(1),
            Err(TLogError::Generator("boom".to_string())),
            numbered(2),
        ];
        let mut gen = ThreadedGenerator::spawn(items.into_iter(), 4).unwrap();
        assert_eq!(first_crc(gen.next().unwrap()), 1);
        assert!(gen.next().unwrap().is_err());
        assert!(gen.next().is_none());
    }

    #[test]
    fn test_threaded_drop_stops_producer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let source = (0..1000).map(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            numbered(n)
        });

        let mut gen = ThreadedGenerator::spawn(source, 2).unwrap();
        assert!(gen.next().is_some());
        drop(gen);

        // the worker has been joined; it never ran far ahead of the queue
        let n = produced.load(Ordering::SeqCst);
        assert!(n < 1000, "producer ran to completion: {}", n);
    }

    #[test]
    fn test_prefetch_drains_eagerly() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = produced.clone();
        let source = (0..5).map(move |n| {
            counter.fetch_add(1, Ordering::SeqCst);
            numbered(n)
        });
        let gen = PrefetchGenerator::new(source);
        assert_eq!(produced.load(Ordering::SeqCst), 5);
        assert_eq!(gen.len(), 5);
        let seen: Vec<u32> = gen.map(first_crc).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_delayed_with_threaded() {
        let delayed = DelayedGenerator::new((0..3).map(numbered), Duration::from_millis(5));
        let gen = ThreadedGenerator::spawn(delayed, 1).unwrap();
        let seen: Vec<u32> = gen.map(first_crc).collect();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
