//! [`FlushedWriter`], a [`Flusher`] decorator that flushes its sink on a fixed interval.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::flusher::Flusher;

/// Default interval between automatic flushes, 10 milliseconds.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Shortest interval a [`FlushedWriter`] will tick at, 1 millisecond. Shorter intervals are
/// clamped to this.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Longest interval a [`FlushedWriter`] will tick at, 1 day. Longer intervals are clamped to
/// this, past it the first deadline can overflow [`Instant`].
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub use builder::FlushedWriterBuilder;

/// The sink, plus whether automatic flushing has been stopped. Kept under the same lock so a
/// flush and [`FlushedWriter::stop`] can never interleave.
struct Sink<F> {
    flusher: F,
    stopped: bool,
}

/// Forwards writes to a [`Flusher`] as they happen, and flushes it from a background task at
/// most once per interval, and only if something was written since the last flush.
///
/// The background task runs from construction until [`stop`] is called, the scope token is
/// cancelled, or the writer is dropped. Neither of those flush on the way out, callers that need
/// the tail of the stream pushed out should call [`flush_now`].
///
/// [`stop`]: FlushedWriter::stop
/// [`flush_now`]: FlushedWriter::flush_now
pub struct FlushedWriter<F> {
    sink: Arc<Mutex<Sink<F>>>,
    /// Single slot, a full channel means a flush is already pending.
    pending_tx: mpsc::Sender<()>,
    stop: CancellationToken,
    scope: CancellationToken,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl<F> FlushedWriter<F> {
    /// Whether automatic flushing has ended, either by [`stop`] or the scope being cancelled.
    ///
    /// [`stop`]: FlushedWriter::stop
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled() || self.scope.is_cancelled()
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl FlushedWriter<()> {
    pub const fn builder() -> FlushedWriterBuilder {
        FlushedWriterBuilder::new()
    }
}

impl<F> FlushedWriter<F>
where
    F: Flusher + Send + 'static,
{
    /// Wraps `flusher`, flushing every [`FLUSH_INTERVAL`] until `scope` is cancelled or the
    /// writer is stopped.
    ///
    /// Spawns the flush loop, so this must be called from within a tokio runtime.
    pub fn new(scope: CancellationToken, flusher: F) -> Self {
        FlushedWriterBuilder::new().build(scope, flusher)
    }

    fn spawn(interval: Duration, scope: CancellationToken, flusher: F) -> Self {
        let interval = interval.clamp(MIN_FLUSH_INTERVAL, MAX_FLUSH_INTERVAL);

        let sink = Arc::new(Mutex::new(Sink {
            flusher,
            stopped: false,
        }));
        let (pending_tx, pending_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        // the first tick is a full interval out, a tick at construction would never have
        // anything to flush.
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = tokio::spawn(flush_loop(
            Arc::clone(&sink),
            pending_rx,
            stop.clone(),
            scope.clone(),
            ticker,
        ));

        Self {
            sink,
            pending_tx,
            stop,
            scope,
            interval,
            handle: Some(handle),
        }
    }
}

impl<F: Flusher> FlushedWriter<F> {
    /// Writes `buf` straight through to the sink, returning its result unchanged. Any bytes
    /// accepted make the writer eligible for the next automatic flush.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let written = self.sink.lock().flusher.write(buf)?;

        if written > 0 {
            // Full means a flush is already pending, Closed means the loop already exited.
            // Either way there's nothing to do.
            let _ = self.pending_tx.try_send(());
        }

        Ok(written)
    }

    /// Flushes the sink right away. Unaffected by [`stop`] or the scope being cancelled, since
    /// this is how a caller pushes out the last of a stream once automatic flushing is done.
    ///
    /// [`stop`]: FlushedWriter::stop
    pub fn flush_now(&self) {
        self.sink.lock().flusher.flush();
    }

    /// Stops automatic flushing. Waits on any flush already in progress, and once this returns
    /// the background task will not flush again. Calling this more than once is a no-op.
    pub fn stop(&self) {
        {
            let mut sink = self.sink.lock();
            if !sink.stopped {
                sink.stopped = true;
                tracing::trace!(message = "stopping periodic flushes");
            }
        }

        self.stop.cancel();
    }

    /// Stops the writer, waits for the background task to exit, then hands back the sink.
    pub async fn into_inner(mut self) -> F {
        self.stop();

        let sink = Arc::clone(&self.sink);
        let handle = self.handle.take();
        drop(self);

        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                tracing::error!(message = "flush loop exited abnormally", %error);
            }
        }

        let sink = Arc::into_inner(sink)
            .expect("flush loop has exited, so this is the only handle to the sink");

        sink.into_inner().flusher
    }
}

impl<F> Drop for FlushedWriter<F> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl<F: Flusher> io::Write for FlushedWriter<F> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        FlushedWriter::write(self, buf)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        self.flush_now();
        Ok(())
    }
}

async fn flush_loop<F: Flusher>(
    sink: Arc<Mutex<Sink<F>>>,
    mut pending_rx: mpsc::Receiver<()>,
    stop: CancellationToken,
    scope: CancellationToken,
    mut ticker: Interval,
) {
    tracing::trace!(message = "flush loop started", interval = ?ticker.period());

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::trace!(message = "flush loop stopped");
                break;
            }
            _ = scope.cancelled() => {
                tracing::debug!(message = "flush loop cancelled by its scope");
                break;
            }
            _ = ticker.tick() => {
                if pending_rx.try_recv().is_ok() {
                    flush_pending(&sink, &scope);
                }
            }
        }
    }
}

/// Flushes off the async worker when the runtime allows it, so a slow sink doesn't hold up
/// other tasks (or the timers they wait on) on this worker.
fn flush_pending<F: Flusher>(sink: &Mutex<Sink<F>>, scope: &CancellationToken) {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(|| flush_if_running(sink, scope))
        }
        _ => flush_if_running(sink, scope),
    }
}

fn flush_if_running<F: Flusher>(sink: &Mutex<Sink<F>>, scope: &CancellationToken) {
    let mut sink = sink.lock();

    // stop sets this under the same lock, so checking here is what keeps a flush from
    // running after stop returns.
    if sink.stopped || scope.is_cancelled() {
        return;
    }

    sink.flusher.flush();
}

mod builder {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::{FLUSH_INTERVAL, FlushedWriter};
    use crate::flusher::Flusher;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlushedWriterBuilder {
        interval: Duration,
    }

    impl FlushedWriterBuilder {
        pub const fn new() -> Self {
            Self {
                interval: FLUSH_INTERVAL,
            }
        }

        /// Sets the flush interval. Clamped between [`MIN_FLUSH_INTERVAL`] and
        /// [`MAX_FLUSH_INTERVAL`] when built.
        ///
        /// [`MIN_FLUSH_INTERVAL`]: super::MIN_FLUSH_INTERVAL
        /// [`MAX_FLUSH_INTERVAL`]: super::MAX_FLUSH_INTERVAL
        pub const fn interval(&mut self, interval: Duration) -> &mut Self {
            self.interval = interval;
            self
        }

        pub fn build<F>(&self, scope: CancellationToken, flusher: F) -> FlushedWriter<F>
        where
            F: Flusher + Send + 'static,
        {
            FlushedWriter::spawn(self.interval, scope, flusher)
        }
    }

    impl Default for FlushedWriterBuilder {
        fn default() -> Self {
            Self::new()
        }
    }
}
