//! The [`Flusher`] trait, the sink a [`FlushedWriter`] decorates.
//!
//! [`FlushedWriter`]: crate::FlushedWriter

use std::io;

/// A sink that accepts bytes, and can be told to push anything it has buffered onward.
pub trait Flusher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Flushes any buffered bytes. Best effort, failures aren't reported to the caller.
    ///
    /// Called from the flush loop's task. On a multi-threaded tokio runtime the call is moved
    /// off the worker with [`tokio::task::block_in_place`], on a current-thread runtime it runs
    /// inline and stalls every other task until it returns, so keep it short there.
    fn flush(&mut self);
}

impl<T: Flusher + ?Sized> Flusher for Box<T> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    #[inline]
    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Adapts any [`io::Write`] into a [`Flusher`]. Errors from [`io::Write::flush`] are logged,
/// then dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IoFlusher<W> {
    inner: W,
}

impl<W> IoFlusher<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    pub const fn get_ref(&self) -> &W {
        &self.inner
    }

    pub const fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> From<W> for IoFlusher<W> {
    fn from(inner: W) -> Self {
        Self::new(inner)
    }
}

impl<W: io::Write> Flusher for IoFlusher<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) {
        if let Err(error) = self.inner.flush() {
            tracing::debug!(message = "failed to flush underlying writer", %error);
        }
    }
}
