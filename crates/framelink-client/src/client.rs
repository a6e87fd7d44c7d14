use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use framelink_frame::{encode_frame, Frame, FrameCodec, FrameError, MsgType, ResponsePayload};
use framelink_transport::Transport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::diagnostics::{ErrorInfo, ErrorSink, OperationContext, Severity, TracingErrorSink};
use crate::error::{ClientError, Result};
use crate::health::{
    AtomicState, ConnectionHealthSnapshot, ConnectionState, LinkMetricsSnapshot, Metrics,
};
use crate::pending::{PendingGuard, PendingTable};
use crate::queue::LossyQueue;
use crate::sequence::SequenceTracker;

const COMPONENT: &str = "ProtocolClient";

type TelemetryObserver = Arc<dyn Fn(&Frame) + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&ErrorInfo) + Send + Sync>;

/// Async client for one device link.
///
/// A started client runs up to five tasks over its transport:
/// - read: feeds received bytes to the codec, resolves responses, queues
///   telemetry and event frames
/// - write: drains the command queue first, heartbeats only when it is empty
/// - telemetry dispatch: hands unsolicited frames to the observers
/// - heartbeat (optional): queues an `ALIVE` frame every interval
/// - health: faults the session after sustained receive silence
///
/// Transport failures and receive silence are fatal: the session moves to
/// [`ConnectionState::Faulted`], pending commands fail, and the client stops
/// itself. Reconnecting is up to the caller (`start` again).
///
/// Dropping the client cancels a running session without closing the
/// transport gracefully; prefer [`stop`](Self::stop).
pub struct ProtocolClient<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: T,
    config: ClientConfig,
    sink: Arc<dyn ErrorSink>,
    state: AtomicState,
    metrics: Metrics,
    pending: PendingTable,
    next_msg_id: AtomicU16,
    consecutive_timeouts: AtomicU32,
    last_error: Mutex<Option<String>>,
    observers: RwLock<Observers>,
    // Serializes start and stop.
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<Session>>,
    next_session_id: AtomicU64,
}

#[derive(Default)]
struct Observers {
    telemetry: Vec<TelemetryObserver>,
    errors: Vec<ErrorObserver>,
}

struct Session {
    handle: SessionHandle,
    high_tx: mpsc::Sender<Bytes>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
struct SessionHandle {
    id: u64,
    cancel: CancellationToken,
}

impl<T: Transport> ProtocolClient<T> {
    /// Create a client with default configuration that reports errors to `tracing`.
    pub fn new(transport: T) -> Self {
        Self::from_parts(transport, ClientConfig::default(), Arc::new(TracingErrorSink))
    }

    /// Create a client with explicit configuration.
    pub fn with_config(transport: T, config: ClientConfig) -> Result<Self> {
        Self::with_config_and_sink(transport, config, Arc::new(TracingErrorSink))
    }

    /// Create a client with explicit configuration and error sink.
    pub fn with_config_and_sink(
        transport: T,
        config: ClientConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(transport, config, sink))
    }

    fn from_parts(transport: T, config: ClientConfig, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                sink,
                state: AtomicState::new(ConnectionState::Disconnected),
                metrics: Metrics::new(),
                pending: PendingTable::default(),
                next_msg_id: AtomicU16::new(1),
                consecutive_timeouts: AtomicU32::new(0),
                last_error: Mutex::new(None),
                observers: RwLock::new(Observers::default()),
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// True while a session is active. A session that has been cancelled
    /// (stopped, faulted, or its parent token fired) no longer counts, even
    /// while its tasks are still winding down.
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    pub fn health(&self) -> ConnectionHealthSnapshot {
        ConnectionHealthSnapshot {
            state: self.inner.state.load(),
            consecutive_timeouts: self.inner.consecutive_timeouts.load(Ordering::Relaxed),
            last_seen_age: self.inner.metrics.last_rx_age(),
            last_error: lock(&self.inner.last_error).clone(),
        }
    }

    pub fn link_metrics(&self) -> LinkMetricsSnapshot {
        self.inner.metrics.snapshot(self.inner.pending.len())
    }

    /// Register an observer for telemetry and event frames.
    ///
    /// Observers run on the dispatch task, one frame at a time, in arrival
    /// order. They must not block.
    pub fn on_telemetry(&self, observer: impl Fn(&Frame) + Send + Sync + 'static) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .telemetry
            .push(Arc::new(observer));
    }

    /// Register an observer for structured error reports.
    ///
    /// Called from whichever task raised the error, after the error sink.
    pub fn on_error(&self, observer: impl Fn(&ErrorInfo) + Send + Sync + 'static) {
        self.inner
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .push(Arc::new(observer));
    }

    /// Open the transport and start the session tasks. No-op if already running.
    pub async fn start(&self) -> Result<()> {
        Inner::start(&self.inner, None).await
    }

    /// Like [`start`](Self::start), but the session also stops when `parent` is cancelled.
    pub async fn start_with_cancel(&self, parent: &CancellationToken) -> Result<()> {
        Inner::start(&self.inner, Some(parent)).await
    }

    /// Stop the session: cancel the tasks, fail pending commands, close the
    /// transport. No-op if not running.
    pub async fn stop(&self) {
        self.inner.stop_session(None).await;
    }

    /// Send a command and wait for the correlated response.
    ///
    /// The frame is stamped with type `COMMAND` and a fresh message id. A
    /// `None` or zero timeout means the configured default. Dropping the
    /// returned future abandons the command.
    pub async fn send_command(&self, frame: Frame, timeout: Option<Duration>) -> Result<Frame> {
        self.inner.send_command(frame, timeout, None).await
    }

    /// Like [`send_command`](Self::send_command), failing with
    /// [`ClientError::Cancelled`] once `cancel` fires.
    pub async fn send_command_with_cancel(
        &self,
        frame: Frame,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Frame> {
        self.inner.send_command(frame, timeout, Some(cancel)).await
    }

    /// Send a command and parse the response payload, turning a non-OK
    /// device status into [`ClientError::DeviceRejected`].
    pub async fn send_command_checked(
        &self,
        frame: Frame,
        timeout: Option<Duration>,
    ) -> Result<ResponsePayload> {
        let response = self.send_command(frame, timeout).await?;
        let context = || {
            OperationContext::new("SendCommand").with_detail(format!("msg_id={}", response.msg_id()))
        };

        let parsed = match ResponsePayload::parse(response.payload()) {
            Ok(parsed) => parsed,
            Err(err) => {
                let err = ClientError::from(err);
                self.inner
                    .report(&err, context(), "The device sent an unreadable response.");
                return Err(err);
            }
        };

        if !parsed.is_ok() {
            let err = ClientError::DeviceRejected {
                command_id: parsed.command_id,
                status: parsed.status.0,
                device_error_code: parsed.device_error_code,
            };
            self.inner
                .report(&err, context(), "The device rejected the command.");
            return Err(err);
        }
        Ok(parsed)
    }
}

impl<T: Transport> Drop for ProtocolClient<T> {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.inner.session).take() {
            session.handle.cancel.cancel();
            self.inner.pending.fail_all(client_stopped);
        }
    }
}

impl<T: Transport> Inner<T> {
    fn is_running(&self) -> bool {
        lock(&self.session)
            .as_ref()
            .is_some_and(|session| !session.handle.cancel.is_cancelled())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.swap(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn allocate_msg_id(&self) -> u16 {
        loop {
            let id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    async fn start(self: &Arc<Self>, parent: Option<&CancellationToken>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        // A faulted session is still in the slot until its background stop
        // runs; finish that teardown here so the new session starts clean.
        let stale = {
            let mut slot = lock(&self.session);
            match slot
                .as_ref()
                .map(|session| session.handle.cancel.is_cancelled())
            {
                Some(false) => return Ok(()),
                Some(true) => slot.take(),
                None => None,
            }
        };
        if let Some(stale) = stale {
            self.teardown(stale).await;
        }

        self.metrics.reset();
        self.consecutive_timeouts.store(0, Ordering::Relaxed);
        *lock(&self.last_error) = None;
        self.set_state(ConnectionState::Connecting);

        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let opened = tokio::select! {
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            opened = self.transport.open() => opened.map_err(ClientError::from),
        };
        if let Err(err) = opened {
            self.set_state(ConnectionState::Faulted);
            self.report(
                &err,
                OperationContext::new("Start").with_detail(self.transport.name()),
                "Unable to establish a connection.",
            );
            return Err(err);
        }
        self.set_state(ConnectionState::Connected);

        let handle = SessionHandle {
            id: self.next_session_id.fetch_add(1, Ordering::Relaxed),
            cancel,
        };
        let (high_tx, high_rx) = mpsc::channel(self.config.tx_queue_capacity);
        let low = Arc::new(LossyQueue::new(self.config.tx_queue_capacity));
        let telemetry = Arc::new(LossyQueue::new(self.config.telemetry_queue_capacity));

        let mut tasks = Vec::with_capacity(5);
        tasks.push(tokio::spawn(Arc::clone(self).read_loop(
            handle.clone(),
            Arc::clone(&telemetry),
        )));
        tasks.push(tokio::spawn(Arc::clone(self).write_loop(
            handle.clone(),
            high_rx,
            Arc::clone(&low),
        )));
        tasks.push(tokio::spawn(
            Arc::clone(self).telemetry_loop(handle.clone(), telemetry),
        ));
        if self.config.enable_alive {
            tasks.push(tokio::spawn(
                Arc::clone(self).heartbeat_loop(handle.clone(), low),
            ));
        }
        tasks.push(tokio::spawn(Arc::clone(self).health_loop(handle.clone())));

        if let Some(parent) = parent {
            let inner = Arc::clone(self);
            let parent = parent.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    () = parent.cancelled() => inner.stop_session(Some(handle.id)).await,
                    () = handle.cancel.cancelled() => {}
                }
            });
        }

        debug!(
            transport = self.transport.name(),
            session = handle.id,
            tasks = tasks.len(),
            "client started"
        );
        *lock(&self.session) = Some(Session {
            handle,
            high_tx,
            tasks,
        });
        Ok(())
    }

    /// Stop the current session, or only session `only` when given.
    async fn stop_session(&self, only: Option<u64>) {
        let _lifecycle = self.lifecycle.lock().await;
        let session = {
            let mut slot = lock(&self.session);
            let selected = slot
                .as_ref()
                .is_some_and(|session| only.is_none_or(|id| id == session.handle.id));
            if selected {
                slot.take()
            } else {
                None
            }
        };
        if let Some(session) = session {
            self.teardown(session).await;
        }
    }

    /// Cancel a session taken out of the slot, fail its pending commands,
    /// wait for its tasks and close the transport. Caller holds `lifecycle`.
    async fn teardown(&self, session: Session) {
        session.handle.cancel.cancel();
        let failed = self.pending.fail_all(client_stopped);
        drop(session.high_tx);

        for task in session.tasks {
            // Loop errors were already reported.
            let _ = task.await;
        }
        if let Err(err) = self.transport.close().await {
            debug!(error = %err, "ignoring close failure");
        }
        self.set_state(ConnectionState::Disconnected);
        debug!(
            session = session.handle.id,
            failed_pending = failed,
            "client stopped"
        );
    }

    /// Handle a fatal loop error: fault the session and stop it in the background.
    fn fault(
        self: &Arc<Self>,
        session: &SessionHandle,
        err: ClientError,
        operation: &str,
        user_message: &str,
    ) {
        if session.cancel.is_cancelled() {
            // Already stopping; the error is a consequence of that.
            return;
        }
        session.cancel.cancel();
        self.set_state(ConnectionState::Faulted);

        let info = ErrorInfo::from_error(
            &err,
            OperationContext::new(operation).with_component(COMPONENT),
            user_message,
        );
        let severity = info.severity.max(Severity::Error);
        self.publish(info.with_severity(severity));

        let inner = Arc::clone(self);
        let id = session.id;
        tokio::spawn(async move { inner.stop_session(Some(id)).await });
    }

    fn report(&self, err: &ClientError, context: OperationContext, user_message: &str) {
        self.publish(ErrorInfo::from_error(
            err,
            context.with_component(COMPONENT),
            user_message,
        ));
    }

    fn publish(&self, info: ErrorInfo) {
        *lock(&self.last_error) = Some(info.technical_message.clone());
        self.sink.publish(&info);
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .clone();
        for observer in observers {
            observer(&info);
        }
    }

    async fn send_command(
        &self,
        frame: Frame,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Frame> {
        let (high_tx, session_cancel) = {
            let session = lock(&self.session);
            let session = session
                .as_ref()
                .filter(|session| !session.handle.cancel.is_cancelled())
                .ok_or(ClientError::NotRunning)?;
            (session.high_tx.clone(), session.handle.cancel.clone())
        };
        let timeout = self.config.effective_timeout(timeout);

        let msg_id = self.allocate_msg_id();
        let frame = frame.with_msg_type(MsgType::Command).with_msg_id(msg_id);
        let mut rx = match self.pending.register(msg_id) {
            Ok(rx) => rx,
            Err(err) => {
                self.report(
                    &err,
                    OperationContext::new("SendCommand"),
                    "Internal error while sending a command.",
                );
                return Err(err);
            }
        };
        let mut guard = PendingGuard::new(&self.pending, msg_id);

        let deadline = Instant::now() + timeout;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        let caller_cancelled = cancelled(cancel);
        tokio::pin!(caller_cancelled);

        tokio::select! {
            biased;
            () = &mut caller_cancelled => return Err(ClientError::Cancelled),
            () = session_cancel.cancelled() => return Err(client_stopped()),
            () = &mut sleep => return Err(self.command_timed_out(msg_id, timeout)),
            sent = high_tx.send(encode(&frame)) => {
                if sent.is_err() {
                    return Err(client_stopped());
                }
            }
        }
        trace!(msg_id, len = frame.payload().len(), "command queued");

        let outcome = tokio::select! {
            biased;
            received = &mut rx => {
                guard.disarm();
                received.unwrap_or_else(|_| Err(client_stopped()))
            }
            () = &mut caller_cancelled => Err(ClientError::Cancelled),
            () = session_cancel.cancelled() => Err(client_stopped()),
            () = &mut sleep => match rx.try_recv() {
                // The response raced the deadline.
                Ok(received) => {
                    guard.disarm();
                    received
                }
                Err(_) => Err(self.command_timed_out(msg_id, timeout)),
            },
        };

        if outcome.is_ok() {
            self.consecutive_timeouts.store(0, Ordering::Relaxed);
        }
        outcome
    }

    fn command_timed_out(&self, msg_id: u16, timeout: Duration) -> ClientError {
        self.metrics.record_command_timeout();
        let consecutive = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(msg_id, consecutive, "command timed out");

        let err = ClientError::Timeout { msg_id, timeout };
        self.report(
            &err,
            OperationContext::new("SendCommand").with_detail(format!("msg_id={msg_id}")),
            "The device did not answer in time.",
        );
        err
    }

    async fn read_loop(self: Arc<Self>, session: SessionHandle, telemetry: Arc<LossyQueue<Frame>>) {
        let mut codec = FrameCodec::with_config(self.config.codec_config());
        let mut sequence = SequenceTracker::new();
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            let read = tokio::select! {
                biased;
                () = session.cancel.cancelled() => break,
                read = self.transport.read(&mut buf) => read,
            };
            let n = match read {
                Ok(0) => {
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(n) => n,
                Err(err) => {
                    self.fault(
                        &session,
                        err.into(),
                        "ReadLoop",
                        "Disconnected while reading.",
                    );
                    break;
                }
            };

            self.metrics.record_rx_bytes(n);
            for outcome in codec.feed(&buf[..n]) {
                match outcome {
                    Ok(frame) => self.dispatch(frame, &mut sequence, &telemetry),
                    Err(err) => self.decode_failed(err),
                }
            }
        }
        trace!(session = session.id, "read loop finished");
    }

    fn dispatch(&self, frame: Frame, sequence: &mut SequenceTracker, telemetry: &LossyQueue<Frame>) {
        self.metrics.record_rx_frame();
        match frame.msg_type() {
            MsgType::Response if frame.msg_id() != 0 => {
                let msg_id = frame.msg_id();
                if !self.pending.resolve(msg_id, frame) {
                    debug!(msg_id, "dropping response without pending command");
                }
            }
            MsgType::Telemetry | MsgType::Event => {
                let seq = frame.seq();
                if sequence.observe(seq) {
                    self.metrics.record_seq_misses(1);
                    debug!(seq, "sequence gap in unsolicited frames");
                }
                if telemetry.push(frame).is_some() {
                    self.metrics.record_telemetry_dropped();
                }
            }
            other => trace!(msg_type = %other, "ignoring frame"),
        }
    }

    fn decode_failed(&self, err: FrameError) {
        if matches!(err, FrameError::CrcMismatch { .. }) {
            self.metrics.record_crc_failure();
        } else {
            self.metrics.record_framing_error();
        }
        // The codec already resynchronized; this is recoverable.
        let info = ErrorInfo::from_error(
            &ClientError::Frame(err),
            OperationContext::new("Decode").with_component(COMPONENT),
            "Corrupted frame received (CRC/framing).",
        );
        self.publish(info.with_severity(Severity::Warning));
    }

    async fn write_loop(
        self: Arc<Self>,
        session: SessionHandle,
        mut high_rx: mpsc::Receiver<Bytes>,
        low: Arc<LossyQueue<Bytes>>,
    ) {
        loop {
            if session.cancel.is_cancelled() {
                break;
            }
            let wire = match high_rx.try_recv() {
                Ok(wire) => wire,
                Err(_) => tokio::select! {
                    biased;
                    () = session.cancel.cancelled() => break,
                    Some(wire) = high_rx.recv() => wire,
                    wire = low.pop() => wire,
                },
            };

            let written = tokio::select! {
                biased;
                () = session.cancel.cancelled() => break,
                written = self.transport.write(&wire) => written,
            };
            match written {
                Ok(()) => self.metrics.record_tx_frame(wire.len()),
                Err(err) => {
                    self.fault(
                        &session,
                        err.into(),
                        "WriteLoop",
                        "Connection lost while sending.",
                    );
                    break;
                }
            }
        }
        trace!(session = session.id, "write loop finished");
    }

    async fn telemetry_loop(self: Arc<Self>, session: SessionHandle, telemetry: Arc<LossyQueue<Frame>>) {
        loop {
            let frame = tokio::select! {
                biased;
                () = session.cancel.cancelled() => break,
                frame = telemetry.pop() => frame,
            };
            let observers = self
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .telemetry
                .clone();
            for observer in &observers {
                observer(&frame);
            }
        }
        trace!(session = session.id, "telemetry loop finished");
    }

    async fn heartbeat_loop(self: Arc<Self>, session: SessionHandle, low: Arc<LossyQueue<Bytes>>) {
        let period = self.config.alive_interval;
        let alive = encode(&Frame::alive(self.config.protocol_version));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = session.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if low.push(alive.clone()).is_some() {
                trace!("heartbeat queue full, dropped oldest");
            }
        }
        trace!(session = session.id, "heartbeat loop finished");
    }

    async fn health_loop(self: Arc<Self>, session: SessionHandle) {
        let period = self.config.health_check_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut warned = false;

        loop {
            tokio::select! {
                biased;
                () = session.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Nothing to judge before the first byte of the session.
            let Some(silence) = self.metrics.last_rx_age() else {
                continue;
            };

            if silence >= self.config.rx_fault_after {
                self.fault(
                    &session,
                    ClientError::RxSilence(silence),
                    "Health",
                    "Connection lost (no data received).",
                );
                break;
            }

            if silence >= self.config.rx_warn_after {
                if !warned {
                    warned = true;
                    self.report(
                        &ClientError::RxSilence(silence),
                        OperationContext::new("Health"),
                        "No data received from the device recently.",
                    );
                }
            } else {
                warned = false;
            }
        }
        trace!(session = session.id, "health loop finished");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn client_stopped() -> ClientError {
    ClientError::Disconnected("client stopped".into())
}

fn encode(frame: &Frame) -> Bytes {
    let mut buf = BytesMut::with_capacity(frame.wire_size());
    encode_frame(frame, &mut buf);
    buf.freeze()
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
