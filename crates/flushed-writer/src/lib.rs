//! A writer that forwards bytes to an underlying sink and flushes that sink on a fixed cadence,
//! rather than after every write. Geared towards relaying long-lived streaming responses
//! (chunked HTTP bodies, event/log streams) where per-write flushing floods the transport.

pub mod flusher;
pub mod writer;

pub use flusher::{Flusher, IoFlusher};
pub use writer::{
    FLUSH_INTERVAL, FlushedWriter, FlushedWriterBuilder, MAX_FLUSH_INTERVAL, MIN_FLUSH_INTERVAL,
};
