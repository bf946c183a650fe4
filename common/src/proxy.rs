//! Chunk-reporting proxy
//!
//! Wraps a rate-limited reader and publishes the size of every chunk it reads so that a consumer
//! can follow a transfer without touching the reader. The proxy is read on the attempt task
//! while the supervisor may close it concurrently from its deadline path, hence the mutex.

use std::sync::{Arc, Mutex};

use crate::events::{Chunk, ChunkSink};

#[derive(Debug)]
struct State {
    closed: bool,
    sink: Option<ChunkSink>,
}

/// Closing side of a [`ChunkReporter`], usable from another task
#[derive(Debug, Clone)]
pub struct ReporterHandle {
    state: Arc<Mutex<State>>,
}

impl ReporterHandle {
    /// Stops reporting and releases the chunk sink; closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        state.sink = None;
        tracing::trace!("chunk reporter closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

pub struct ChunkReporter<R> {
    inner: throttle::Throttled<R>,
    handle: ReporterHandle,
}

impl<R: tokio::io::AsyncRead + Unpin> ChunkReporter<R> {
    pub fn new(inner: throttle::Throttled<R>, sink: ChunkSink) -> Self {
        Self {
            inner,
            handle: ReporterHandle {
                state: Arc::new(Mutex::new(State {
                    closed: false,
                    sink: Some(sink),
                })),
            },
        }
    }

    pub fn handle(&self) -> ReporterHandle {
        self.handle.clone()
    }

    /// Reads one chunk from the wrapped reader and reports its size.
    ///
    /// A closed reporter refuses to read and returns [`throttle::Error::Cancelled`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, throttle::Error> {
        if self.handle.is_closed() {
            return Err(throttle::Error::Cancelled);
        }
        let n = self.inner.read(buf).await?;
        if n > 0 {
            let state = self.handle.state.lock().unwrap();
            if let Some(sink) = &state.sink {
                sink.send(Chunk::Read(n as u64));
            }
        }
        Ok(n)
    }

    pub fn close(&self) {
        self.handle.close();
    }
}
