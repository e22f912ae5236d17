use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ian_listener::{
    ListenerArgument, ListenerFunction, ListenerHandle, ListenerModule, ListenerRegistry,
};
use ian_packets::builtin::{GameOverPacket, GameStartPacket, HeartbeatPacket, VersionPacket};
use ian_packets::{
    ClientPacket, PacketError, PacketReader, PacketWriter, ParseResult, Protocol,
    ProtocolRegistry, Version,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::InterfaceConfig;
use crate::error::{DisconnectCause, IfaceError, Result};
use crate::event::{ConnectionSuccess, Disconnect, HeartbeatRegained};
use crate::heartbeat::HeartbeatManager;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Event = Box<dyn ListenerArgument>;
type Outbound = Box<dyn ClientPacket>;

/// Lifecycle of an [`ArtemisNetworkInterface`].
#[derive(Debug, Clone)]
pub enum ConnectionState {
    NotStarted,
    Running,
    Stopped(DisconnectCause),
}

enum Lifecycle {
    NotStarted(Box<Parts>),
    Running,
    Stopped(DisconnectCause),
}

struct Parts {
    reader: PacketReader<BoxReader>,
    writer: PacketWriter<BoxWriter>,
    outbound: UnboundedReceiver<Outbound>,
    events: UnboundedReceiver<Event>,
}

struct Inner {
    peer: String,
    config: InterfaceConfig,
    listeners: ListenerRegistry,
    heartbeat: Arc<HeartbeatManager>,
    lifecycle: Mutex<Lifecycle>,
    outbound: UnboundedSender<Outbound>,
    events: UnboundedSender<Event>,
    cancel: CancellationToken,
    finished: CancellationToken,
    server_version: Mutex<Option<Version>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A client connection to an Artemis server.
///
/// Owns four loops once started: one reads packets, one writes queued
/// packets and heartbeats, one dispatches decoded packets to listeners and
/// one dispatches connection events. Cloning yields another handle to the
/// same connection.
#[derive(Clone)]
pub struct ArtemisNetworkInterface {
    inner: Arc<Inner>,
}

impl ArtemisNetworkInterface {
    /// Connect to a server speaking the core protocol.
    pub async fn connect(host: &str, port: u16, config: InterfaceConfig) -> Result<Self> {
        Self::connect_with_protocol(host, port, config, Arc::new(ProtocolRegistry::core())).await
    }

    /// Connect to a server, decoding packets with `protocol`.
    pub async fn connect_with_protocol(
        host: &str,
        port: u16,
        config: InterfaceConfig,
        protocol: Arc<dyn Protocol>,
    ) -> Result<Self> {
        let stream = ian_transport::connect(host, port, config.connect_timeout).await?;
        Ok(Self::build(stream, format!("{host}:{port}"), config, protocol))
    }

    /// Wrap an already connected byte stream.
    pub fn from_stream<S>(stream: S, config: InterfaceConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::from_stream_with_protocol(stream, config, Arc::new(ProtocolRegistry::core()))
    }

    pub fn from_stream_with_protocol<S>(
        stream: S,
        config: InterfaceConfig,
        protocol: Arc<dyn Protocol>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::build(stream, "stream".to_string(), config, protocol)
    }

    fn build<S>(
        stream: S,
        peer: String,
        config: InterfaceConfig,
        protocol: Arc<dyn Protocol>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let listeners = ListenerRegistry::new();
        let reader: BoxReader = Box::new(read_half);
        let writer: BoxWriter = Box::new(write_half);
        let reader = PacketReader::with_config(
            reader,
            protocol,
            listeners.clone(),
            config.packet.clone(),
        );
        let writer = PacketWriter::with_config(writer, config.packet.clone());

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let heartbeat = Arc::new(HeartbeatManager::new(config.heartbeat.clone()));

        let router = Arc::new(HeartbeatRouter {
            heartbeat: Arc::clone(&heartbeat),
            events: events_tx.clone(),
        });
        if let Err(err) = listeners.register(router) {
            warn!(error = %err, "internal heartbeat listeners not registered");
        }

        Self {
            inner: Arc::new(Inner {
                peer,
                config,
                listeners,
                heartbeat,
                lifecycle: Mutex::new(Lifecycle::NotStarted(Box::new(Parts {
                    reader,
                    writer,
                    outbound: outbound_rx,
                    events: events_rx,
                }))),
                outbound: outbound_tx,
                events: events_tx,
                cancel: CancellationToken::new(),
                finished: CancellationToken::new(),
                server_version: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Launch the connection loops.
    ///
    /// Idempotent while running. Fails once stopped, or when called outside
    /// a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| IfaceError::NoRuntime)?;

        let parts = {
            let mut lifecycle = self.lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Running) {
                Lifecycle::NotStarted(parts) => parts,
                Lifecycle::Running => return Ok(()),
                Lifecycle::Stopped(cause) => {
                    *lifecycle = Lifecycle::Stopped(cause.clone());
                    return Err(IfaceError::Stopped(cause));
                }
            }
        };
        let Parts {
            reader,
            writer,
            outbound,
            events,
        } = *parts;

        info!(peer = %self.inner.peer, "connection started");
        self.enqueue_event(ConnectionSuccess {
            message: format!("connected to {}", self.inner.peer),
        });

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let dispatch = runtime.spawn(dispatch_loop(self.clone(), inbound_rx));
        let receive = runtime.spawn(receive_loop(self.clone(), reader, inbound_tx));
        let send = runtime.spawn(send_loop(self.clone(), writer, outbound));
        let event = runtime.spawn(event_loop(self.clone(), events, dispatch));
        self.tasks().extend([receive, send, event]);
        Ok(())
    }

    /// Stop the connection. Idempotent.
    ///
    /// Packets and events still queued at this point are dropped. The only
    /// callback that follows a stop is the final [`Disconnect`].
    pub fn stop(&self) {
        self.stop_with(DisconnectCause::LocalDisconnect);
    }

    /// Stop with an explicit cause. Only the first cause is kept.
    ///
    /// Returns whether this call stopped the connection.
    pub fn stop_with(&self, cause: DisconnectCause) -> bool {
        let was_running = {
            let mut lifecycle = self.lifecycle();
            let was_running = match &*lifecycle {
                Lifecycle::Stopped(_) => return false,
                Lifecycle::Running => true,
                Lifecycle::NotStarted(_) => false,
            };
            *lifecycle = Lifecycle::Stopped(cause.clone());
            was_running
        };

        if cause.is_error() {
            warn!(peer = %self.inner.peer, cause = %cause, "connection stopped");
        } else {
            info!(peer = %self.inner.peer, cause = %cause, "connection stopped");
        }
        self.inner.cancel.cancel();

        // Without an event loop nobody else will report the disconnect.
        if !was_running {
            self.fire_event(&Disconnect { cause });
            self.inner.finished.cancel();
        }
        true
    }

    /// Wait until every loop has finished, including delivery of the
    /// final [`Disconnect`] event.
    ///
    /// Any number of handles may wait at once; all of them return after the
    /// `Disconnect` listeners ran. Returns at once if the connection was
    /// never started or stopped.
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks());
        if tasks.is_empty() {
            if matches!(&*self.lifecycle(), Lifecycle::NotStarted(_)) {
                return;
            }
            self.inner.finished.cancelled().await;
            return;
        }
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "connection task failed");
            }
        }
        // The event loop normally does this; a failed task must not strand
        // other waiters.
        self.inner.finished.cancel();
    }

    /// Stop, wait for the loops to finish and drop every listener.
    ///
    /// The loops close the outbound and event queues on their way out, and
    /// [`send`](Self::send) is rejected once stopped.
    pub async fn dispose(&self) {
        self.stop();
        self.join().await;
        self.inner.listeners.clear();
    }

    /// Queue a packet for the send loop.
    pub fn send(&self, packet: impl ClientPacket + 'static) -> Result<()> {
        if let Some(cause) = self.disconnect_cause() {
            return Err(IfaceError::Stopped(cause));
        }
        self.inner
            .outbound
            .send(Box::new(packet))
            .map_err(|_| IfaceError::Stopped(DisconnectCause::LocalDisconnect))
    }

    /// Register a single listener function.
    pub fn add_listener(&self, function: ListenerFunction) -> ListenerHandle {
        self.inner.listeners.add(function)
    }

    /// Register a closure for the concrete argument type `T`.
    pub fn on<T, F>(&self, callback: F) -> ListenerHandle
    where
        T: ListenerArgument,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.listeners.on(callback)
    }

    /// Register every listener function of `owner`.
    pub fn register<O: ListenerModule>(&self, owner: Arc<O>) -> Result<ListenerHandle> {
        Ok(self.inner.listeners.register(owner)?)
    }

    pub fn unregister(&self, handle: ListenerHandle) -> bool {
        self.inner.listeners.unregister(handle)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    pub fn heartbeat(&self) -> &HeartbeatManager {
        &self.inner.heartbeat
    }

    /// Version announced by the server, once the handshake arrived.
    pub fn server_version(&self) -> Option<Version> {
        *self
            .inner
            .server_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ConnectionState {
        match &*self.lifecycle() {
            Lifecycle::NotStarted(_) => ConnectionState::NotStarted,
            Lifecycle::Running => ConnectionState::Running,
            Lifecycle::Stopped(cause) => ConnectionState::Stopped(cause.clone()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.lifecycle(), Lifecycle::Running)
    }

    /// Why the connection stopped, if it has.
    pub fn disconnect_cause(&self) -> Option<DisconnectCause> {
        match &*self.lifecycle() {
            Lifecycle::Stopped(cause) => Some(cause.clone()),
            _ => None,
        }
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.inner.config
    }

    fn accept_version(&self, version: Version) -> std::result::Result<(), DisconnectCause> {
        *self
            .inner
            .server_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(version);
        if !self.inner.config.supports(version) {
            return Err(DisconnectCause::UnsupportedServerVersion(version));
        }
        info!(peer = %self.inner.peer, %version, "server version accepted");
        Ok(())
    }

    fn enqueue_event(&self, event: impl ListenerArgument) {
        enqueue(&self.inner.events, event);
    }

    /// Fire an event, converting a listener panic into a stop.
    fn fire_event(&self, event: &dyn ListenerArgument) {
        let fired = catch_unwind(AssertUnwindSafe(|| self.inner.listeners.fire(event)));
        if let Err(panic) = fired {
            let message = panic_message(panic.as_ref());
            error!(?event, panic = %message, "connection listener panicked");
            self.stop_with(DisconnectCause::UnknownError(message));
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ArtemisNetworkInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtemisNetworkInterface")
            .field("peer", &self.inner.peer)
            .field("state", &self.state())
            .field("server_version", &self.server_version())
            .finish_non_exhaustive()
    }
}

async fn receive_loop(
    iface: ArtemisNetworkInterface,
    mut reader: PacketReader<BoxReader>,
    inbound: UnboundedSender<ParseResult>,
) {
    let cancel = iface.inner.cancel.clone();
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = reader.read_packet() => result,
        };

        match result {
            Ok(ParseResult::Fail(failure)) => {
                warn!(error = %failure, "packet failed to parse");
                iface.stop_with(DisconnectCause::PacketParseError(Arc::from(failure)));
                break;
            }
            Ok(result @ ParseResult::Success { .. }) => {
                let version = result
                    .packet()
                    .and_then(|packet| packet.downcast_ref::<VersionPacket>())
                    .map(|handshake| handshake.version);
                if let Some(version) = version {
                    if let Err(cause) = iface.accept_version(version) {
                        iface.stop_with(cause);
                        break;
                    }
                }
                if result.is_interesting() && inbound.send(result).is_err() {
                    break;
                }
            }
            Ok(ParseResult::Skip | ParseResult::Processing { .. }) => {}
            Err(PacketError::ConnectionClosed) => {
                // Dropping `inbound` lets dispatch finish what was read, then
                // it reports the remote disconnect.
                debug!("server closed the connection");
                break;
            }
            Err(err) => {
                iface.stop_with(DisconnectCause::from(err));
                break;
            }
        }
    }
    debug!("receive loop finished");
}

async fn send_loop(
    iface: ArtemisNetworkInterface,
    mut writer: PacketWriter<BoxWriter>,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    let cancel = iface.inner.cancel.clone();
    let mut tick = interval(iface.inner.config.poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'run: loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        while let Ok(packet) = outbound.try_recv() {
            if let Err(err) = writer.write_packet(packet.as_ref()).await {
                stop_on_write_error(&iface, err);
                break 'run;
            }
        }

        if let Some(heartbeat) = iface.inner.heartbeat.send_heartbeat_if_needed() {
            if let Err(err) = writer.write_packet(&heartbeat).await {
                stop_on_write_error(&iface, err);
                break;
            }
        }
    }

    outbound.close();
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "discarded unsent packets");
    }
    if let Err(err) = writer.get_mut().shutdown().await {
        debug!(error = %err, "socket shutdown failed");
    }
    debug!("send loop finished");
}

fn stop_on_write_error(iface: &ArtemisNetworkInterface, err: PacketError) {
    if iface.stop_with(DisconnectCause::from(err)) {
        debug!("send loop stopped the connection");
    }
}

async fn dispatch_loop(
    iface: ArtemisNetworkInterface,
    mut inbound: UnboundedReceiver<ParseResult>,
) {
    let cancel = iface.inner.cancel.clone();
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inbound.recv() => match result {
                Some(result) => result,
                None => {
                    iface.stop_with(DisconnectCause::RemoteDisconnect);
                    break;
                }
            },
        };
        if !dispatch(&iface, &result) {
            break;
        }
    }

    inbound.close();
    let mut dropped = 0usize;
    while inbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "discarded undelivered packets");
    }
    debug!("dispatch loop finished");
}

fn dispatch(iface: &ArtemisNetworkInterface, result: &ParseResult) -> bool {
    match catch_unwind(AssertUnwindSafe(|| result.fire_listeners())) {
        Ok(_) => true,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(packet = ?result.packet(), panic = %message, "packet listener panicked");
            iface.stop_with(DisconnectCause::UnknownError(message));
            false
        }
    }
}

async fn event_loop(
    iface: ArtemisNetworkInterface,
    mut events: UnboundedReceiver<Event>,
    dispatch: JoinHandle<()>,
) {
    let cancel = iface.inner.cancel.clone();
    let mut tick = interval(iface.inner.config.poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = tick.tick() => {}
        }

        while !cancel.is_cancelled() {
            let Ok(event) = events.try_recv() else {
                break;
            };
            iface.fire_event(event.as_ref());
        }
        if cancel.is_cancelled() {
            break;
        }
        if let Some(lost) = iface.inner.heartbeat.check_for_heartbeat() {
            iface.fire_event(&lost);
        }
    }

    events.close();
    let mut dropped = 0usize;
    while events.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "discarded undelivered events");
    }

    // Disconnect is the last event, after every delivered packet.
    if let Err(err) = dispatch.await {
        error!(error = %err, "dispatch loop failed");
    }
    let cause = iface
        .disconnect_cause()
        .unwrap_or(DisconnectCause::LocalDisconnect);
    iface.fire_event(&Disconnect { cause });
    iface.inner.finished.cancel();
    debug!("event loop finished");
}

/// Queue an event for the event loop. Returns false once the loop is gone.
fn enqueue(events: &UnboundedSender<Event>, event: impl ListenerArgument) -> bool {
    if let Err(err) = events.send(Box::new(event)) {
        debug!(event = ?err.0, "event queue closed, dropping event");
        return false;
    }
    true
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}

/// Routes core packets to the heartbeat manager.
struct HeartbeatRouter {
    heartbeat: Arc<HeartbeatManager>,
    events: UnboundedSender<Event>,
}

impl HeartbeatRouter {
    fn regained(&self, event: Option<HeartbeatRegained>) {
        if let Some(event) = event {
            enqueue(&self.events, event);
        }
    }
}

impl ListenerModule for HeartbeatRouter {
    fn listener_functions(self: Arc<Self>) -> Vec<ListenerFunction> {
        let on_heartbeat = Arc::clone(&self);
        let on_start = Arc::clone(&self);
        let on_over = self;
        vec![
            ListenerFunction::new(move |_: &HeartbeatPacket| {
                on_heartbeat.regained(on_heartbeat.heartbeat.on_heartbeat());
            }),
            ListenerFunction::new(move |_: &GameStartPacket| {
                on_start.regained(on_start.heartbeat.on_game_start());
            }),
            ListenerFunction::new(move |_: &GameOverPacket| {
                on_over.heartbeat.on_game_over();
            }),
        ]
    }
}
