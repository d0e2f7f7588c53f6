//! Channel actor.
//!
//! One channel per accepted connection. Concurrency participants:
//!
//! - **writer task**: spawned by [`Channel::new`], drains the outbound queue
//!   into frame writes until cancellation.
//! - **reader**: whoever calls [`Channel::read_loop`]; at most one at a time.
//! - **producers**: any number of tasks calling [`Channel::push`].
//!
//! # Lifecycle
//!
//! ```text
//! Open ──close()──► Closing ──writer exited + reader returned──► Closed
//! ```
//!
//! `close()` fires a one-shot cancellation signal. Pushes fail from then on,
//! the writer writes whatever is still queued and exits. A read blocked in
//! the transport is not interrupted; it ends at its deadline or when the
//! owner tears the stream down with [`Channel::shutdown`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::conn::{Conn, FrameRead, FrameWrite, Transport};
use crate::error::{Error, Result};
use crate::frame::{Frame, OpCode};

use super::{Agent, ChannelConfig, MessageListener};

// ============================================================================
// Types
// ============================================================================

/// Write half shared by the writer task and the read loop's Pong replies.
type SharedWriter = Arc<AsyncMutex<Box<dyn FrameWrite>>>;

// ============================================================================
// Channel
// ============================================================================

/// Per-connection actor: one reader, one writer task, a bounded outbound queue.
///
/// # Thread Safety
///
/// `Channel` is `Send + Sync` and is shared as `Arc<Channel>`.
pub struct Channel {
    /// Identifier, unique within a pool.
    id: String,

    /// Transport chosen at wrap time.
    transport: Transport,

    /// Producer side of the outbound queue.
    queue: mpsc::Sender<Bytes>,

    /// Read half. Holding the lock is what makes a read loop exclusive.
    reader: AsyncMutex<Box<dyn FrameRead>>,

    /// Write half.
    writer: SharedWriter,

    /// Idle timeout re-armed before each read.
    read_timeout: Mutex<Duration>,

    /// Timeout re-armed before each write (shared with the writer task).
    write_timeout: Arc<Mutex<Duration>>,

    /// Listener invocations allowed in flight.
    max_inflight: usize,

    /// One-shot, broadcast cancellation signal.
    cancel: watch::Sender<bool>,

    /// Close guard: flips exactly once.
    closed: AtomicBool,

    /// Writer task, taken by whoever joins it first.
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

// ============================================================================
// Channel - Constructor
// ============================================================================

impl Channel {
    /// Wraps `conn` and starts the writer task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(id: impl Into<String>, conn: Box<dyn Conn>, config: ChannelConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let id = id.into();
        let transport = conn.transport();
        let (reader, writer) = conn.into_split();
        let writer: SharedWriter = Arc::new(AsyncMutex::new(writer));
        let write_timeout = Arc::new(Mutex::new(config.write_timeout));

        let (queue, queue_rx) = mpsc::channel(config.queue_capacity);
        let (cancel, cancel_rx) = watch::channel(false);

        let writer_task = tokio::spawn(run_writer(
            id.clone(),
            queue_rx,
            Arc::clone(&writer),
            Arc::clone(&write_timeout),
            cancel_rx,
        ));

        debug!(channel_id = %id, %transport, "Channel created");

        Ok(Arc::new(Self {
            id,
            transport,
            queue,
            reader: AsyncMutex::new(reader),
            writer,
            read_timeout: Mutex::new(config.read_timeout),
            write_timeout,
            max_inflight: config.max_inflight_dispatch,
            cancel,
            closed: AtomicBool::new(false),
            writer_task: Mutex::new(Some(writer_task)),
        }))
    }

    /// Like [`Channel::new`] with a random UUID v4 id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn with_generated_id(conn: Box<dyn Conn>, config: ChannelConfig) -> Result<Arc<Self>> {
        Self::new(Uuid::new_v4().to_string(), conn, config)
    }
}

// ============================================================================
// Channel - Accessors
// ============================================================================

impl Channel {
    /// Returns the channel id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the transport the conn was wrapped with.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Returns `true` once [`Channel::close`] has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the current read timeout.
    #[inline]
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        *self.read_timeout.lock()
    }

    /// Returns the current write timeout.
    #[inline]
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        *self.write_timeout.lock()
    }

    /// Sets the timeout applied before every subsequent read.
    pub fn set_read_timeout(&self, timeout: Duration) {
        *self.read_timeout.lock() = timeout;
    }

    /// Sets the timeout applied before every subsequent write.
    pub fn set_write_timeout(&self, timeout: Duration) {
        *self.write_timeout.lock() = timeout;
    }
}

// ============================================================================
// Channel - Outbound
// ============================================================================

impl Channel {
    /// Queues `payload` for the writer task.
    ///
    /// Waits while the queue is full. Safe to call from any number of tasks;
    /// each producer's payloads are written in the order it pushed them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the channel is closed (including
    /// while this call was waiting for a slot) or the writer task has exited.
    pub async fn push(&self, payload: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::channel_closed(&self.id));
        }

        let mut cancel = self.cancel.subscribe();
        tokio::select! {
            biased;
            () = cancelled(&mut cancel) => Err(Error::channel_closed(&self.id)),
            sent = self.queue.send(payload) => {
                sent.map_err(|_| Error::channel_closed(&self.id))
            }
        }
    }

    /// Writes `frame` directly, bypassing the queue.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] if the channel is closed
    /// - any transport error from the write
    pub async fn write_frame(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::channel_closed(&self.id));
        }

        let mut conn = self.writer.lock().await;
        write_with_deadline(conn.as_mut(), frame, self.write_timeout()).await
    }
}

// ============================================================================
// Channel - Inbound
// ============================================================================

impl Channel {
    /// Reads frames until the first fatal error and dispatches data payloads
    /// to `listener`.
    ///
    /// - Close: returns [`Error::RemoteClose`].
    /// - Ping: answered with exactly one Pong; not dispatched. On the framed
    ///   transport the channel writes an empty Pong itself. On WebSocket the
    ///   library replies, echoing the Ping payload.
    /// - Frames without payload: skipped.
    /// - Anything else: `listener.receive(self, payload)` on its own task,
    ///   with at most `max_inflight_dispatch` running at once.
    ///
    /// The read deadline is re-armed before every read. In-flight dispatches
    /// are awaited before this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadLoopActive`] if another read loop is running
    /// - [`Error::RemoteClose`] when the peer sends Close
    /// - transport and decode errors from the read
    pub async fn read_loop(self: &Arc<Self>, listener: Arc<dyn MessageListener>) -> Result<()> {
        let Ok(mut reader) = self.reader.try_lock() else {
            return Err(Error::read_loop_active(&self.id));
        };

        debug!(channel_id = %self.id, "Read loop started");

        let mut inflight = JoinSet::new();
        let result = self
            .run_reader(reader.as_mut(), &listener, &mut inflight)
            .await;

        while let Some(joined) = inflight.join_next().await {
            self.reap(joined);
        }

        match &result {
            Err(e) => debug!(channel_id = %self.id, error = %e, "Read loop terminated"),
            Ok(()) => debug!(channel_id = %self.id, "Read loop terminated"),
        }
        result
    }

    async fn run_reader(
        self: &Arc<Self>,
        reader: &mut dyn FrameRead,
        listener: &Arc<dyn MessageListener>,
        inflight: &mut JoinSet<()>,
    ) -> Result<()> {
        loop {
            while let Some(joined) = inflight.try_join_next() {
                self.reap(joined);
            }

            reader.set_read_deadline(Some(Instant::now() + self.read_timeout()));
            let frame = reader.read_frame().await?;

            match frame.opcode() {
                OpCode::Close => return Err(Error::remote_close(&self.id)),
                OpCode::Ping => {
                    trace!(channel_id = %self.id, "Ping received");
                    // WebSocket pongs are queued by tungstenite on read and go
                    // out with the next read or write on the stream.
                    if self.transport == Transport::Framed
                        && let Err(e) = self.write_frame(Frame::pong()).await
                    {
                        warn!(channel_id = %self.id, error = %e, "Failed to answer ping");
                    }
                    continue;
                }
                _ => {}
            }

            let Some(payload) = frame.into_payload() else {
                continue;
            };

            if inflight.len() >= self.max_inflight
                && let Some(joined) = inflight.join_next().await
            {
                self.reap(joined);
            }

            let source: Arc<dyn Agent> = Arc::clone(self) as Arc<dyn Agent>;
            let listener = Arc::clone(listener);
            inflight.spawn(async move { listener.receive(source, payload).await });
        }
    }

    fn reap(&self, joined: std::result::Result<(), JoinError>) {
        if let Err(e) = joined
            && e.is_panic()
        {
            warn!(channel_id = %self.id, "Message listener panicked");
        }
    }
}

// ============================================================================
// Channel - Lifecycle
// ============================================================================

impl Channel {
    /// Closes the channel. Idempotent; always succeeds.
    ///
    /// The first call fires cancellation and waits for the writer task to
    /// write what is still queued and exit. Later or concurrent calls return
    /// without waiting. An in-flight read is not interrupted.
    ///
    /// Against a stalled peer the wait is bounded by the batch the writer is
    /// in (one write timeout per frame, at most `queue_capacity + 1` frames)
    /// plus one write timeout for the final drain, which shares a single
    /// deadline.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.cancel.send_replace(true);
        debug!(channel_id = %self.id, "Channel closing");

        let task = self.writer_task.lock().take();
        if let Some(task) = task {
            match join_writer(task).await {
                Ok(()) => debug!(channel_id = %self.id, "Writer joined"),
                Err(e) => warn!(channel_id = %self.id, error = %e, "Writer exited with error"),
            }
        }

        Ok(())
    }

    /// Closes the channel, then closes the write direction of the stream.
    ///
    /// The peer observes end-of-stream; a well-behaved peer then closes its
    /// side, which ends a blocked [`Channel::read_loop`].
    ///
    /// # Errors
    ///
    /// Returns the transport error from closing the stream, if any.
    pub async fn shutdown(&self) -> Result<()> {
        self.close().await?;

        let mut conn = self.writer.lock().await;
        conn.close().await?;

        debug!(channel_id = %self.id, "Channel stream shut down");
        Ok(())
    }

    /// Waits for the writer task to exit and returns its outcome.
    ///
    /// The outcome is delivered once: to the first caller of this method, or
    /// consumed by [`Channel::close`] if that joined the writer first. Later
    /// callers get `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal write error of the writer task.
    pub async fn writer_result(&self) -> Result<()> {
        let task = self.writer_task.lock().take();
        match task {
            Some(task) => join_writer(task).await,
            None => Ok(()),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Writer task must not outlive the channel.
        self.cancel.send_replace(true);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for Channel {
    fn id(&self) -> &str {
        Channel::id(self)
    }

    async fn push(&self, payload: Bytes) -> Result<()> {
        Channel::push(self, payload).await
    }
}

// ============================================================================
// Writer Task
// ============================================================================

/// Resolves once cancellation has fired (or its sender is gone).
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|fired| *fired).await;
}

async fn join_writer(task: JoinHandle<Result<()>>) -> Result<()> {
    task.await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

async fn write_with_deadline(conn: &mut dyn FrameWrite, frame: Frame, timeout: Duration) -> Result<()> {
    conn.set_write_deadline(Some(Instant::now() + timeout));
    conn.write_frame(frame).await
}

async fn flush_with_deadline(conn: &mut dyn FrameWrite, timeout: Duration) -> Result<()> {
    conn.set_write_deadline(Some(Instant::now() + timeout));
    conn.flush().await
}

/// Writer task body.
///
/// Each wake-up writes one payload plus everything already queued at that
/// instant, then flushes once. On cancellation the remaining queue is
/// written before exiting.
async fn run_writer(
    id: String,
    mut queue: mpsc::Receiver<Bytes>,
    writer: SharedWriter,
    write_timeout: Arc<Mutex<Duration>>,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    debug!(channel_id = %id, "Writer started");

    let result = loop {
        tokio::select! {
            biased;
            received = queue.recv() => {
                let Some(payload) = received else {
                    break Ok(());
                };

                let mut conn = writer.lock().await;
                let timeout = *write_timeout.lock();

                if let Err(e) = write_with_deadline(conn.as_mut(), Frame::binary(payload), timeout).await {
                    break Err(e);
                }

                let mut batch = 1usize;
                let pending = queue.len();
                let mut drained = Ok(());
                for _ in 0..pending {
                    let Ok(payload) = queue.try_recv() else { break };
                    if let Err(e) = write_with_deadline(conn.as_mut(), Frame::binary(payload), timeout).await {
                        drained = Err(e);
                        break;
                    }
                    batch += 1;
                }
                if let Err(e) = drained {
                    break Err(e);
                }

                if let Err(e) = flush_with_deadline(conn.as_mut(), timeout).await {
                    break Err(e);
                }
                trace!(channel_id = %id, batch, "Writer flushed batch");
            }

            () = cancelled(&mut cancel) => {
                break drain_on_cancel(&id, &mut queue, &writer, &write_timeout).await;
            }
        }
    };

    match &result {
        Ok(()) => debug!(channel_id = %id, "Writer exited"),
        Err(e) => warn!(channel_id = %id, error = %e, "Writer failed"),
    }
    result
}

/// Writes payloads still queued when cancellation fired.
async fn drain_on_cancel(
    id: &str,
    queue: &mut mpsc::Receiver<Bytes>,
    writer: &SharedWriter,
    write_timeout: &Mutex<Duration>,
) -> Result<()> {
    queue.close();
    if queue.is_empty() {
        return Ok(());
    }

    let mut conn = writer.lock().await;
    conn.set_write_deadline(Some(Instant::now() + *write_timeout.lock()));

    let mut count = 0usize;
    while let Ok(payload) = queue.try_recv() {
        conn.write_frame(Frame::binary(payload)).await?;
        count += 1;
    }
    conn.flush().await?;

    debug!(channel_id = %id, count, "Writer drained queue on close");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
