//! The connection session.
//!
//! One task owns everything: the transport, the decoder, the encoder, and
//! the FIFO of in-flight requests. Callers reach it through a mailbox and
//! get results on per-request oneshot channels, which realizes the
//! single-owner concurrency model without locks.
//!
//! Correlation is strictly FIFO: the k-th non-push reply resolves the k-th
//! still-queued request. Expired and cancelled requests stay in the queue
//! as tombstones so a late reply is consumed and discarded instead of
//! shifting onto the wrong request.

use super::config::Config;
use super::transport::Transport;
use crate::error::{Error, ProtocolError, Result, TransportError};
use crate::protocol::{CommandArg, Decoder, Encoder, Output, Value, PROTOCOL_VERSION};
use bytes::BytesMut;
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, trace, warn};

/// Lifecycle of the session's one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; `connect` (or auto-connect) may start one.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Transport up, `HELLO 3` exchange in progress.
    Handshaking,
    /// Handshake accepted; commands flow.
    Connected,
    /// `close()` requested, teardown running.
    Disconnecting,
    /// Terminal: the connection is gone. A new `Client` is the way back.
    Closed,
    /// Terminal: correlation was destroyed (decode failure or an
    /// unsolicited reply).
    Error,
}

/// Mailbox operations from `Client` handles.
pub(crate) enum Op {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Dispatch {
        id: u64,
        verb: String,
        args: Vec<CommandArg>,
        reply: oneshot::Sender<Result<Value>>,
    },
    Cancel {
        id: u64,
    },
    RegisterPush {
        sink: mpsc::UnboundedSender<Value>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// An in-flight request awaiting its reply.
///
/// A taken resolver marks a tombstone: the slot still consumes its reply
/// from the wire, but the caller has already been answered (timeout or
/// cancellation).
struct PendingRequest {
    id: u64,
    verb: String,
    submitted_at: Instant,
    deadline: Instant,
    resolver: Option<oneshot::Sender<Result<Value>>>,
}

impl PendingRequest {
    #[inline]
    fn is_tombstone(&self) -> bool {
        self.resolver.is_none()
    }
}

/// What one turn of the event loop observed.
enum Event {
    Op(Option<Op>),
    Read(std::io::Result<usize>),
    Wrote(std::io::Result<usize>),
    DeadlineFired,
}

pub(crate) struct Session {
    config: Config,
    ops: mpsc::UnboundedReceiver<Op>,
    state: ConnectionState,
    handshake_complete: bool,
    transport: Option<Transport>,
    decoder: Decoder,
    encoder: Encoder,
    pending: VecDeque<PendingRequest>,
    push_sinks: Vec<mpsc::UnboundedSender<Value>>,
}

impl Session {
    pub(crate) fn new(config: Config, ops: mpsc::UnboundedReceiver<Op>) -> Self {
        Self {
            config,
            ops,
            state: ConnectionState::Disconnected,
            handshake_complete: false,
            transport: None,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            pending: VecDeque::new(),
            push_sinks: Vec::new(),
        }
    }

    /// Run until every `Client` handle is gone.
    pub(crate) async fn run(mut self) {
        let mut rbuf = BytesMut::with_capacity(8 * 1024);
        loop {
            let deadline = self.next_deadline();
            match self.next_event(deadline, &mut rbuf).await {
                Event::Op(None) => {
                    self.do_close().await;
                    return;
                }
                Event::Op(Some(op)) => self.handle_op(op).await,
                Event::Read(Ok(0)) => {
                    debug!("peer closed the connection");
                    self.teardown(Error::Transport(TransportError::Closed)).await;
                }
                Event::Read(Ok(_)) => {
                    self.decoder.feed(&rbuf);
                    rbuf.clear();
                    self.drain_decoder().await;
                }
                Event::Read(Err(err)) => {
                    let cause = TransportError::from_io(&err);
                    self.teardown(Error::Transport(cause)).await;
                }
                Event::Wrote(Ok(_)) => {
                    // Part of the queue went out; the guard re-arms while
                    // bytes remain.
                }
                Event::Wrote(Err(err)) => {
                    warn!(%err, "write to transport failed");
                    self.teardown(Error::Transport(TransportError::WriteFailed(
                        err.to_string(),
                    )))
                    .await;
                }
                Event::DeadlineFired => self.expire_deadlines(),
            }
        }
    }

    /// Wait for the next thing to do: a mailbox op, inbound bytes, room to
    /// write queued bytes, or a command deadline.
    async fn next_event(&mut self, deadline: Option<Instant>, rbuf: &mut BytesMut) -> Event {
        let Session { ops, transport, .. } = self;
        let timer = sleep_until(deadline.unwrap_or_else(Instant::now));
        match transport {
            Some(t) => {
                let want_write = !t.outbuf.is_empty();
                let Transport {
                    reader,
                    writer,
                    outbuf,
                    ..
                } = t;
                tokio::select! {
                    op = ops.recv() => Event::Op(op),
                    res = reader.read_buf(rbuf) => Event::Read(res),
                    res = writer.write_buf(outbuf), if want_write => Event::Wrote(res),
                    _ = timer, if deadline.is_some() => Event::DeadlineFired,
                }
            }
            None => {
                tokio::select! {
                    op = ops.recv() => Event::Op(op),
                    _ = timer, if deadline.is_some() => Event::DeadlineFired,
                }
            }
        }
    }

    async fn handle_op(&mut self, op: Op) {
        match op {
            Op::Connect { reply } => {
                let result = match self.state {
                    ConnectionState::Disconnected => self.do_connect().await,
                    ConnectionState::Connected => Err(Error::Transport(
                        TransportError::InvalidState("already connected"),
                    )),
                    _ => Err(Error::Transport(TransportError::InvalidState(
                        "connection is closing or closed",
                    ))),
                };
                let _ = reply.send(result);
            }
            Op::Dispatch {
                id,
                verb,
                args,
                reply,
            } => self.dispatch(id, verb, &args, reply).await,
            Op::Cancel { id } => self.cancel(id),
            Op::RegisterPush { sink } => self.push_sinks.push(sink),
            Op::State { reply } => {
                let _ = reply.send(self.state);
            }
            Op::Close { reply } => {
                self.do_close().await;
                let _ = reply.send(());
            }
        }
    }

    // ── submit path ─────────────────────────────────────────────────────

    async fn dispatch(
        &mut self,
        id: u64,
        verb: String,
        args: &[CommandArg],
        reply: oneshot::Sender<Result<Value>>,
    ) {
        if self.state == ConnectionState::Disconnected && self.config.auto_connect {
            if let Err(err) = self.do_connect().await {
                let _ = reply.send(Err(err));
                return;
            }
        }
        if self.state != ConnectionState::Connected || !self.handshake_complete {
            let _ = reply.send(Err(Error::ConnectionRequired));
            return;
        }

        let frame = self.encoder.encode_command(&verb, args);
        let Some(transport) = self.transport.as_mut() else {
            let _ = reply.send(Err(Error::ConnectionRequired));
            return;
        };
        transport.queue(&frame);
        trace!(id, verb = %verb, bytes = frame.len(), "command queued");

        let now = Instant::now();
        self.pending.push_back(PendingRequest {
            id,
            verb,
            submitted_at: now,
            deadline: now + self.config.command_timeout,
            resolver: Some(reply),
        });
    }

    fn cancel(&mut self, id: u64) {
        if let Some(req) = self.pending.iter_mut().find(|r| r.id == id) {
            if let Some(tx) = req.resolver.take() {
                debug!(id, verb = %req.verb, "command cancelled");
                let _ = tx.send(Err(Error::CommandCancelled));
            }
        }
    }

    // ── reply path ──────────────────────────────────────────────────────

    async fn drain_decoder(&mut self) {
        loop {
            match self.decoder.poll() {
                Ok(Some(Output::Push(value))) => self.route_push(value),
                Ok(Some(Output::Reply(value))) => {
                    if !self.resolve_reply(value) {
                        warn!("reply arrived with no pending request");
                        self.teardown(Error::UnsolicitedReply).await;
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(%err, "decode failure, correlation lost");
                    self.teardown(Error::Decode(err)).await;
                    return;
                }
            }
        }
    }

    /// Consume the FIFO head for a non-push reply. Returns false when there
    /// is no pending request to claim it.
    fn resolve_reply(&mut self, value: Value) -> bool {
        let Some(mut req) = self.pending.pop_front() else {
            return false;
        };
        match req.resolver.take() {
            None => trace!(id = req.id, "reply discarded against tombstone"),
            Some(tx) => {
                trace!(
                    id = req.id,
                    verb = %req.verb,
                    elapsed_ms = req.submitted_at.elapsed().as_millis() as u64,
                    "reply correlated"
                );
                let _ = tx.send(convert_reply(value));
            }
        }
        true
    }

    fn route_push(&mut self, value: Value) {
        if self.push_sinks.is_empty() {
            trace!("push frame dropped: no listener registered");
            return;
        }
        self.push_sinks
            .retain(|sink| sink.send(value.clone()).is_ok());
    }

    // ── deadlines ───────────────────────────────────────────────────────

    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .iter()
            .filter(|r| !r.is_tombstone())
            .map(|r| r.deadline)
            .min()
    }

    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        for req in self.pending.iter_mut() {
            if req.deadline <= now {
                if let Some(tx) = req.resolver.take() {
                    debug!(id = req.id, verb = %req.verb, "command deadline fired");
                    let _ = tx.send(Err(Error::CommandTimeout));
                }
            }
        }
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    async fn do_connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        debug!(host = %self.config.host, port = self.config.port, "connecting");
        let started = Instant::now();

        let transport = match Transport::connect(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        )
        .await
        {
            Ok(t) => t,
            Err(err) => {
                // A failed dial leaves nothing half-open; the caller may retry.
                self.state = ConnectionState::Disconnected;
                return Err(Error::Transport(err));
            }
        };

        self.state = ConnectionState::Handshaking;
        self.decoder = Decoder::new();
        self.transport = Some(transport);

        match self.handshake(started).await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.handshake_complete = true;
                debug!("session connected");
                // Anything pipelined behind the handshake replies (push
                // frames, typically) is already in the decoder.
                self.drain_decoder().await;
                Ok(())
            }
            Err(err) => {
                debug!(%err, "handshake failed");
                self.state = ConnectionState::Error;
                if let Some(t) = self.transport.take() {
                    t.close().await;
                }
                self.state = ConnectionState::Closed;
                Err(err)
            }
        }
    }

    /// `HELLO 3`, then `SELECT <db>` when configured, all within the
    /// connect budget. The first reply belongs to the handshake; any
    /// non-error reply (simple `OK` or a server-description map) succeeds.
    async fn handshake(&mut self, started: Instant) -> Result<()> {
        let hello = self
            .encoder
            .encode_command("HELLO", &[CommandArg::Text(PROTOCOL_VERSION.to_string())]);
        self.write_direct(&hello, started).await?;

        let first = self.read_reply_within(started).await?;
        if first.is_error() {
            return Err(Error::Protocol(ProtocolError::HandshakeFailed(
                error_text(&first),
            )));
        }
        trace!("handshake accepted");

        if self.config.database > 0 {
            let select = self.encoder.encode_command(
                "SELECT",
                &[CommandArg::Integer(i64::from(self.config.database))],
            );
            self.write_direct(&select, started).await?;
            let reply = self.read_reply_within(started).await?;
            if reply.is_error() {
                return Err(Error::Protocol(ProtocolError::HandshakeFailed(format!(
                    "SELECT {}: {}",
                    self.config.database,
                    error_text(&reply)
                ))));
            }
        }
        Ok(())
    }

    /// Direct bounded write, used only before the session is connected
    /// (no queued traffic can exist yet).
    async fn write_direct(&mut self, bytes: &[u8], started: Instant) -> Result<()> {
        let budget = self.remaining_budget(started)?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::Transport(TransportError::InvalidState(
                "no transport",
            )));
        };
        match tokio::time::timeout(budget, transport.writer.write_all(bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Error::Transport(TransportError::WriteFailed(
                err.to_string(),
            ))),
            Err(_) => Err(Error::Transport(TransportError::Timeout)),
        }
    }

    /// Read until one non-push reply completes, within the connect budget.
    /// Push frames arriving mid-handshake are routed, not returned.
    async fn read_reply_within(&mut self, started: Instant) -> Result<Value> {
        let mut rbuf = BytesMut::with_capacity(4096);
        loop {
            loop {
                match self.decoder.poll() {
                    Ok(Some(Output::Push(value))) => self.route_push(value),
                    Ok(Some(Output::Reply(value))) => return Ok(value),
                    Ok(None) => break,
                    Err(err) => return Err(Error::Decode(err)),
                }
            }
            let budget = self.remaining_budget(started)?;
            let Some(transport) = self.transport.as_mut() else {
                return Err(Error::Transport(TransportError::InvalidState(
                    "no transport",
                )));
            };
            let n = match tokio::time::timeout(budget, transport.reader.read_buf(&mut rbuf)).await
            {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => return Err(Error::Transport(TransportError::from_io(&err))),
                Err(_) => return Err(Error::Transport(TransportError::Timeout)),
            };
            if n == 0 {
                return Err(Error::Transport(TransportError::Closed));
            }
            self.decoder.feed(&rbuf);
            rbuf.clear();
        }
    }

    fn remaining_budget(&self, started: Instant) -> Result<Duration> {
        let elapsed = started.elapsed();
        if elapsed >= self.config.connect_timeout {
            return Err(Error::Transport(TransportError::Timeout));
        }
        Ok(self.config.connect_timeout - elapsed)
    }

    /// Orderly close: fail what is in flight, flush best-effort, shut down.
    async fn do_close(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::Error
        ) {
            return;
        }
        self.state = ConnectionState::Disconnecting;
        debug!("closing session");
        self.fail_all(Error::Transport(TransportError::Closed));
        if let Some(t) = self.transport.take() {
            t.close().await;
        }
        self.handshake_complete = false;
        self.state = ConnectionState::Closed;
    }

    /// Abrupt teardown after the wire or correlation is lost.
    async fn teardown(&mut self, cause: Error) {
        debug!(%cause, "session teardown");
        let terminal = if cause.is_fatal() && !matches!(cause, Error::Transport(_)) {
            ConnectionState::Error
        } else {
            ConnectionState::Closed
        };
        self.fail_all(cause);
        if let Some(t) = self.transport.take() {
            t.close().await;
        }
        self.handshake_complete = false;
        self.state = terminal;
    }

    fn fail_all(&mut self, cause: Error) {
        if self.pending.is_empty() {
            return;
        }
        debug!(count = self.pending.len(), "failing all in-flight requests");
        for mut req in self.pending.drain(..) {
            if let Some(tx) = req.resolver.take() {
                let _ = tx.send(Err(cause.clone()));
            }
        }
    }
}

/// Server-error-to-error conversion: `-`/`!` replies become the semantic
/// error variants with code and message preserved; anything else passes
/// through as the decoded value.
fn convert_reply(value: Value) -> Result<Value> {
    if let Some((code, message)) = value.error_parts() {
        return match value.without_attributes() {
            Value::BlobError(_) => Err(Error::ServerBlob { code, message }),
            _ => Err(Error::Server { code, message }),
        };
    }
    Ok(value)
}

fn error_text(value: &Value) -> String {
    match value.error_parts() {
        Some((Some(code), message)) if message.is_empty() => code,
        Some((Some(code), message)) => format!("{code} {message}"),
        Some((None, message)) => message,
        None => "unexpected reply".to_string(),
    }
}
