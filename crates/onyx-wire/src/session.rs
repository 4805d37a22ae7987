//! Session layer: one TCP connection, one ordered command queue.
//!
//! The protocol is strictly request/response and non-pipelined, so every
//! send path funnels through a single queue drained by one I/O task.
//! Request N+1 is not written until request N's response has been fully
//! decoded. Boosting affects admission order only: a boosted command is
//! inserted ahead of queued non-boosted commands, never ahead of the
//! exchange already in flight.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{Frame, OnyxCodec};
use crate::error::WireError;
use crate::message::OnyxMessage;

/// Handler invoked for every decoded frame, in arrival order.
pub type MessageCallback = Arc<dyn Fn(&OnyxMessage) + Send + Sync>;

type Transport = Framed<TcpStream, OnyxCodec>;

struct PendingRequest {
    command: String,
    boosted: bool,
    responder: oneshot::Sender<Result<OnyxMessage, WireError>>,
}

struct Queue {
    pending: VecDeque<PendingRequest>,
    /// Cleared once the transport is gone; further sends fail immediately.
    open: bool,
}

struct SessionInner {
    queue: Mutex<Queue>,
    wakeup: Notify,
    connected: AtomicBool,
    cancel: CancellationToken,
    /// The console's unprompted greeting, captured before any command.
    first_message: OnyxMessage,
    on_message: Option<MessageCallback>,
}

impl SessionInner {
    fn dispatch(&self, msg: &OnyxMessage) {
        if let Some(callback) = &self.on_message {
            callback(msg);
        }
    }

    /// Fail every queued caller and refuse future admissions.
    async fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        let mut queue = self.queue.lock().await;
        queue.open = false;
        for request in queue.pending.drain(..) {
            let _ = request.responder.send(Err(WireError::ConnectionLost));
        }
    }
}

/// Handle to an established console session.
///
/// Cheaply cloneable; all clones share the queue and the I/O task.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Open a TCP connection and wait for the console's greeting frame.
    ///
    /// The greeting is dispatched to `on_message` and retained as
    /// [`first_message`](Self::first_message); it never resolves a
    /// command. `timeout` bounds both the TCP connect and the greeting
    /// wait — exceeding either fails with [`WireError::Connection`].
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        on_message: Option<MessageCallback>,
    ) -> Result<Self, WireError> {
        let connect_err = |reason: String| WireError::Connection {
            host: host.to_owned(),
            port,
            reason,
        };

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| connect_err("connect timed out".to_owned()))?
            .map_err(|e| connect_err(e.to_string()))?;
        let mut transport = Framed::new(stream, OnyxCodec::new());

        let greeting = tokio::time::timeout(timeout, read_message(&mut transport))
            .await
            .map_err(|_| connect_err("no greeting received".to_owned()))?
            .map_err(|e| connect_err(e.to_string()))?;
        debug!(code = greeting.code, "console greeting received");

        let inner = Arc::new(SessionInner {
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                open: true,
            }),
            wakeup: Notify::new(),
            connected: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            first_message: greeting.clone(),
            on_message,
        });
        inner.dispatch(&greeting);

        tokio::spawn(io_task(transport, Arc::clone(&inner)));

        Ok(Self { inner })
    }

    /// Enqueue a command and wait for its response frame.
    ///
    /// Callers are served strictly in admission order. A boosted command
    /// jumps ahead of queued non-boosted commands (but behind earlier
    /// boosted ones and the in-flight exchange). No timeout is enforced;
    /// wrap the future in [`tokio::time::timeout`] to bound an individual
    /// wait — an abandoned response is discarded without disturbing the
    /// queue.
    pub async fn send(
        &self,
        command: impl Into<String>,
        boosted: bool,
    ) -> Result<OnyxMessage, WireError> {
        let command = command.into();
        if command.contains(['\r', '\n']) {
            return Err(WireError::Encoding { command });
        }

        let (responder, response) = oneshot::channel();
        {
            let mut queue = self.inner.queue.lock().await;
            if !queue.open {
                return Err(WireError::ConnectionLost);
            }
            let request = PendingRequest {
                command,
                boosted,
                responder,
            };
            if boosted {
                let position = queue
                    .pending
                    .iter()
                    .position(|p| !p.boosted)
                    .unwrap_or(queue.pending.len());
                queue.pending.insert(position, request);
            } else {
                queue.pending.push_back(request);
            }
        }
        self.inner.wakeup.notify_one();

        response.await.map_err(|_| WireError::ConnectionLost)?
    }

    /// Close the session.
    ///
    /// The I/O task tears down the socket and fails every queued and
    /// in-flight caller with [`WireError::ConnectionLost`].
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether the transport is still up.
    pub fn connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The greeting frame received when the session was established.
    pub fn first_message(&self) -> &OnyxMessage {
        &self.inner.first_message
    }
}

/// Read frames until one complete message arrives, skipping garbage.
async fn read_message(transport: &mut Transport) -> Result<OnyxMessage, WireError> {
    loop {
        match transport.next().await {
            Some(Ok(Frame::Message(msg))) => return Ok(msg),
            Some(Ok(Frame::Invalid(line))) => {
                warn!(line, "skipping unparseable line");
            }
            Some(Err(e)) => return Err(e),
            None => return Err(WireError::ConnectionLost),
        }
    }
}

/// Single I/O task: drain the queue one exchange at a time; between
/// exchanges, watch the stream for unsolicited frames and loss.
async fn io_task(mut transport: Transport, inner: Arc<SessionInner>) {
    loop {
        let next = inner.queue.lock().await.pending.pop_front();

        let Some(request) = next else {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => break,
                () = inner.wakeup.notified() => {}
                frame = transport.next() => {
                    match frame {
                        Some(Ok(Frame::Message(msg))) => {
                            debug!(code = msg.code, "unsolicited frame");
                            inner.dispatch(&msg);
                        }
                        Some(Ok(Frame::Invalid(line))) => {
                            warn!(line, "ignoring unparseable line");
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "transport error");
                            break;
                        }
                        None => {
                            debug!("console closed the connection");
                            break;
                        }
                    }
                }
            }
            continue;
        };

        if !drain_stray(&mut transport, &inner).await {
            let _ = request.responder.send(Err(WireError::ConnectionLost));
            break;
        }

        if let Err(e) = transport.send(request.command).await {
            warn!(error = %e, "write failed");
            let _ = request.responder.send(Err(WireError::ConnectionLost));
            break;
        }

        // The next complete frame is this exchange's response.
        let outcome = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => None,
            frame = read_response(&mut transport, &inner) => frame,
        };

        match outcome {
            Some(result) => {
                let _ = request.responder.send(result);
            }
            None => {
                let _ = request.responder.send(Err(WireError::ConnectionLost));
                break;
            }
        }
    }

    inner.shutdown().await;
}

/// Flush frames already buffered or readable without waiting, returning
/// `false` on transport loss.
///
/// Runs right before a new request is written. The protocol is
/// non-pipelined, so any frame present at that point cannot belong to
/// the request about to go out — in particular, a response arriving late
/// for an exchange that already failed with a protocol violation is
/// dispatched as unsolicited here instead of resolving the next caller.
async fn drain_stray(transport: &mut Transport, inner: &SessionInner) -> bool {
    std::future::poll_fn(|cx| {
        loop {
            match Pin::new(&mut *transport).poll_next(cx) {
                Poll::Ready(Some(Ok(Frame::Message(msg)))) => {
                    debug!(code = msg.code, "stray frame before write");
                    inner.dispatch(&msg);
                }
                Poll::Ready(Some(Ok(Frame::Invalid(line)))) => {
                    warn!(line, "ignoring unparseable line");
                }
                Poll::Ready(Some(Err(e))) => {
                    warn!(error = %e, "transport error");
                    return Poll::Ready(false);
                }
                Poll::Ready(None) => {
                    debug!("console closed the connection");
                    return Poll::Ready(false);
                }
                Poll::Pending => return Poll::Ready(true),
            }
        }
    })
    .await
}

/// Resolve one exchange: `Some(Ok)` on a frame, `Some(Err)` on a
/// protocol violation (the decoder has already resynchronized), `None`
/// on transport loss.
async fn read_response(
    transport: &mut Transport,
    inner: &SessionInner,
) -> Option<Result<OnyxMessage, WireError>> {
    match transport.next().await {
        Some(Ok(Frame::Message(msg))) => {
            inner.dispatch(&msg);
            Some(Ok(msg))
        }
        Some(Ok(Frame::Invalid(line))) => {
            warn!(line, "protocol violation while awaiting response");
            Some(Err(WireError::Protocol { line }))
        }
        Some(Err(e)) => {
            warn!(error = %e, "transport error");
            None
        }
        None => None,
    }
}
