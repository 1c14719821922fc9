/// Progress reporting shared by import, export and index construction.

/// Receives cumulative progress of a long-running operation.
///
/// Returning `false` asks the operation to stop at its next chunk boundary.
/// Closures `FnMut(u64, u64) -> bool` are sinks.
pub trait ProgressSink {
    fn report(&mut self, done: u64, total: u64) -> bool;
}

impl<F> ProgressSink for F
where
    F: FnMut(u64, u64) -> bool,
{
    fn report(&mut self, done: u64, total: u64) -> bool {
        self(done, total)
    }
}

/// Sink for callers that neither display progress nor cancel.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _done: u64, _total: u64) -> bool {
        true
    }
}

/// Outcome of an operation that may be cancelled through its progress sink.
/// Cancellation is not an error: the target is left as it was before the call.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<T = ()> {
    Finished(T),
    Cancelled,
}

impl<T> Completion<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Completion::Cancelled)
    }

    pub fn finished(self) -> Option<T> {
        match self {
            Completion::Finished(value) => Some(value),
            Completion::Cancelled => None,
        }
    }
}

/// Cumulative byte counter reporting to a sink after each completed chunk.
pub(crate) struct ChunkTracker<'a> {
    done: u64,
    total: u64,
    sink: &'a mut dyn ProgressSink,
}

impl<'a> ChunkTracker<'a> {
    pub(crate) fn new(total: u64, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            done: 0,
            total,
            sink,
        }
    }

    /// Account for `bytes` more and report. Returns the sink's verdict.
    pub(crate) fn advance(&mut self, bytes: u64) -> bool {
        self.done += bytes;
        self.sink.report(self.done, self.total)
    }

    pub(crate) fn done(&self) -> u64 {
        self.done
    }
}
