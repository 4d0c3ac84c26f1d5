//! TCP byte transport.
//!
//! One connected stream, split into owned halves so the session's event
//! loop can read and drain the write queue independently. Outbound bytes
//! accumulate in `outbuf`; the session writes them out as the socket
//! accepts them, so backpressure simply leaves the remainder queued.

use crate::error::TransportError;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, trace};

/// Grace period for flushing queued bytes during close.
const CLOSE_FLUSH_GRACE: Duration = Duration::from_millis(100);

pub(crate) struct Transport {
    pub(crate) reader: OwnedReadHalf,
    pub(crate) writer: OwnedWriteHalf,
    /// Outbound queue drained by the session's write arm.
    pub(crate) outbuf: BytesMut,
    peer: String,
}

impl Transport {
    /// Resolve and connect, bounded by `timeout`.
    ///
    /// Resolution failure, refusal, and expiry map onto distinct causes so
    /// the caller can tell them apart.
    pub(crate) async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let attempt = async {
            let addrs = lookup_host(addr.as_str())
                .await
                .map_err(|e| TransportError::Resolution(e.to_string()))?;
            let mut last_err = None;
            for candidate in addrs {
                trace!(%candidate, "trying address");
                match TcpStream::connect(candidate).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(match last_err {
                Some(e) => TransportError::from_io(&e),
                None => TransportError::Resolution(format!("no addresses for {addr}")),
            })
        };

        let stream = tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout)??;

        // Command/reply traffic is latency-bound.
        let _ = stream.set_nodelay(true);
        debug!(peer = %addr, "transport connected");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            outbuf: BytesMut::with_capacity(4096),
            peer: addr,
        })
    }

    /// Queue bytes for the event loop to drain.
    #[inline]
    pub(crate) fn queue(&mut self, bytes: &[u8]) {
        self.outbuf.extend_from_slice(bytes);
    }

    /// The `host:port` this transport dialed.
    #[allow(dead_code)]
    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    /// Best-effort flush of queued bytes, then an orderly shutdown.
    pub(crate) async fn close(mut self) {
        if !self.outbuf.is_empty() {
            let _ = tokio::time::timeout(
                CLOSE_FLUSH_GRACE,
                self.writer.write_all_buf(&mut self.outbuf),
            )
            .await;
        }
        let _ = self.writer.shutdown().await;
        debug!(peer = %self.peer, "transport closed");
    }
}
