//! Client handle and session plumbing.
//!
//! A [`Client`] is a cheap, cloneable handle onto one session task. The
//! session owns the transport, codec, and request FIFO; handles reach it
//! through a mailbox, so any number of tasks can share one connection.

mod config;
mod session;
mod transport;

pub use config::Config;
pub use session::ConnectionState;

use crate::error::{Error, Result, TransportError};
use crate::protocol::{CommandArg, Value};
use session::{Op, Session};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Identifier of a submitted command, usable with [`Client::cancel`].
pub type RequestId = u64;

/// A submitted command whose reply can be awaited or cancelled.
#[derive(Debug)]
pub struct Ticket {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl Ticket {
    /// The request id, for [`Client::cancel`].
    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the reply.
    pub async fn wait(self) -> Result<Value> {
        match self.rx.await {
            Ok(result) => result,
            // The session dropped the resolver: it is gone.
            Err(_) => Err(Error::Transport(TransportError::Closed)),
        }
    }
}

struct Shared {
    ops: mpsc::UnboundedSender<Op>,
    next_id: AtomicU64,
}

/// Handle onto one RESP3 session.
///
/// Created with a validated [`Config`]; construction spawns the session
/// task, so it must happen inside a Tokio runtime. Clones share the same
/// connection; the session ends when the last clone is dropped.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a client for the given configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Config`] when the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        tokio::spawn(Session::new(config, ops_rx).run());
        Ok(Self {
            shared: Arc::new(Shared {
                ops: ops_tx,
                next_id: AtomicU64::new(1),
            }),
        })
    }

    /// Create a client from the URL form
    /// `redis[s]://[user[:pass]@]host[:port][/db]`.
    pub fn with_url(url: &str) -> Result<Self> {
        Self::new(Config::from_url(url)?)
    }

    /// Establish the connection and run the protocol handshake.
    pub async fn connect(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_op(Op::Connect { reply: tx })?;
        rx.await
            .map_err(|_| Error::Transport(TransportError::Closed))?
    }

    /// Send a command and wait for its decoded reply.
    ///
    /// The verb plus any mix of text, integer, byte, and boolean arguments
    /// is encoded as an array of blob strings. Server error replies surface
    /// as [`Error::Server`] / [`Error::ServerBlob`].
    pub async fn send(
        &self,
        verb: &str,
        args: impl IntoIterator<Item = CommandArg>,
    ) -> Result<Value> {
        self.submit(verb, args)?.wait().await
    }

    /// Submit a command without waiting, returning a [`Ticket`].
    pub fn submit(
        &self,
        verb: &str,
        args: impl IntoIterator<Item = CommandArg>,
    ) -> Result<Ticket> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.send_op(Op::Dispatch {
            id,
            verb: verb.to_string(),
            args: args.into_iter().collect(),
            reply: tx,
        })?;
        Ok(Ticket { id, rx })
    }

    /// Cancel an in-flight command. The command resolves with
    /// [`Error::CommandCancelled`]; its eventual reply is discarded without
    /// disturbing the correlation of other commands.
    pub fn cancel(&self, id: RequestId) {
        let _ = self.shared.ops.send(Op::Cancel { id });
    }

    /// Register a push listener. Every server-initiated push frame is
    /// delivered to each registered receiver.
    pub fn push_messages(&self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.shared.ops.send(Op::RegisterPush { sink: tx });
        rx
    }

    /// The session's current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        let (tx, rx) = oneshot::channel();
        if self.shared.ops.send(Op::State { reply: tx }).is_err() {
            return ConnectionState::Closed;
        }
        rx.await.unwrap_or(ConnectionState::Closed)
    }

    /// Close the session: in-flight commands fail with `connection-closed`,
    /// queued bytes get a best-effort flush, the transport shuts down.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.shared.ops.send(Op::Close { reply: tx }).is_ok() {
            let _ = rx.await;
        }
    }

    fn send_op(&self, op: Op) -> Result<()> {
        self.shared
            .ops
            .send(op)
            .map_err(|_| Error::Transport(TransportError::Closed))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}
