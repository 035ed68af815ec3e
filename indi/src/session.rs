//! Stream session
//!
//! [`Session`] owns every piece of per-connection state: the frame buffer,
//! the subscription router, the property store and the outgoing link. All
//! mutation goes through `&mut Session`, so a host wraps it in one lock (see
//! [`run_session`](crate::run_session)) and nothing else needs to be shared.
//!
//! Sends issued while the link is not open are retried every
//! `send_retry_ms` until it is. Each deferred send retries on its own, so a
//! later send that finds the link open can overtake an earlier deferred one.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::command::{Command, CommandEncoder};
use crate::config::{AvailabilityPolicy, SessionConfig};
use crate::error::{IndiError, IndiResult};
use crate::flatten::parse_frame;
use crate::framing::FrameExtractor;
use crate::property::{IndiEvent, MessageNotice};
use crate::protocol::standard_properties::{CONNECT, CONNECTION, DISCONNECT};
use crate::router::{PropertyCallback, PropertyPattern, Router};
use crate::store::{PropertyStore, StoreOutcome};

/// Transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl SessionState {
    fn as_u8(self) -> u8 {
        match self {
            SessionState::Disconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Open => 2,
            SessionState::Closed => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Connecting,
            2 => SessionState::Open,
            3 => SessionState::Closed,
            _ => SessionState::Disconnected,
        }
    }
}

/// Notifications for the UI layer
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Condition the operator must see (transport down, command misuse)
    Alert(String),
    /// INDI `<message>` for the log widget
    Message(MessageNotice),
}

/// Outgoing half shared with deferred sends
#[derive(Debug)]
struct Link {
    state: AtomicU8,
    tx: Mutex<Option<mpsc::Sender<String>>>,
}

impl Link {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn set_sender(&self, tx: Option<mpsc::Sender<String>>) {
        let mut guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        *guard = tx;
    }

    /// Send if the link is open; false means try again later
    fn try_send(&self, text: &str) -> bool {
        if self.state() != SessionState::Open {
            return false;
        }
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.try_send(text.to_string()).is_ok(),
            None => false,
        }
    }
}

/// INDI stream session
pub struct Session {
    config: SessionConfig,
    encoder: CommandEncoder,
    extractor: FrameExtractor,
    router: Router,
    store: PropertyStore,
    link: Arc<Link>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            encoder: CommandEncoder::new(config.protocol_version.clone()),
            config,
            extractor: FrameExtractor::new(),
            router: Router::new(),
            store: PropertyStore::new(),
            link: Arc::new(Link {
                state: AtomicU8::new(SessionState::Disconnected.as_u8()),
                tx: Mutex::new(None),
            }),
            event_tx,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    // ---- subscriptions ----

    /// Register a callback for `device.name`, `device.*` or `*.*` and ask the
    /// server for matching properties. `init` suppresses the request, for
    /// registrations made before the link opens (opening replays every
    /// pattern anyway).
    pub fn register(
        &mut self,
        pattern: &str,
        callback: PropertyCallback,
        init: bool,
    ) -> IndiResult<PropertyPattern> {
        let pattern = self.router.register(pattern, callback)?;
        if !init {
            if self.state() == SessionState::Open {
                self.request(&pattern);
            } else {
                tracing::debug!("Deferring request for {} until the link opens", pattern);
            }
        }
        Ok(pattern)
    }

    pub fn unregister(&mut self, pattern: &str) -> bool {
        self.router.unregister(pattern)
    }

    pub fn set_available(&mut self, device: &str, name: &str, omit: bool) {
        self.router.set_available(device, name, omit);
    }

    pub fn is_available(&self, device: &str, name: &str) -> bool {
        self.router.is_available(device, name)
    }

    /// Send `getProperties` (and `enableBLOB`) for one pattern
    fn request(&self, pattern: &PropertyPattern) {
        tracing::debug!("Requesting {}", pattern);
        let (device, name) = (pattern.device_filter(), pattern.name_filter());
        self.send(self.encoder.get_properties(device, name));
        if self.config.request_blobs {
            self.send(self.encoder.enable_blob(device, name));
        }
    }

    // ---- commands ----

    /// Change property values: `set_property("Number", "Dome Simulator.POLLING_PERIOD", &["PERIOD_MS", "2000"])`
    pub fn set_property(&self, kind: &str, target: &str, args: &[&str]) -> IndiResult<Command> {
        let command = self.encoder.encode(kind, target, args).map_err(|e| {
            self.alert(&e);
            e
        })?;

        if self.config.read_only {
            tracing::info!("INDI send (not sent): {}", command.trace);
            let err = IndiError::ReadOnly;
            self.alert(&err);
            return Err(err);
        }

        self.send(command.xml.clone());
        tracing::info!("INDI send: {}", command.trace);
        Ok(command)
    }

    /// Switch a driver's CONNECTION property on
    pub fn connect_device(&self, device: &str) -> IndiResult<Command> {
        self.set_connection(device, true)
    }

    /// Switch a driver's CONNECTION property off
    pub fn disconnect_device(&self, device: &str) -> IndiResult<Command> {
        self.set_connection(device, false)
    }

    fn set_connection(&self, device: &str, connect: bool) -> IndiResult<Command> {
        let (on, off) = if connect { ("On", "Off") } else { ("Off", "On") };
        self.set_property(
            "Switch",
            &format!("{}.{}", device, CONNECTION),
            &[CONNECT, on, DISCONNECT, off],
        )
    }

    /// Queue raw text for the server, deferring while the link is not open
    pub fn send(&self, text: String) {
        if self.link.try_send(&text) {
            return;
        }

        let link: Weak<Link> = Arc::downgrade(&self.link);
        let wait = self.config.send_retry();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Link {:?}, retrying send in {:?}", self.state(), wait);
                handle.spawn(async move {
                    loop {
                        tokio::time::sleep(wait).await;
                        let Some(link) = link.upgrade() else {
                            tracing::debug!("Session dropped, abandoning deferred send");
                            break;
                        };
                        if link.try_send(&text) {
                            break;
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!("No async runtime, dropping send while {:?}", self.state());
            }
        }
    }

    fn alert(&self, err: &IndiError) {
        let _ = self.event_tx.send(SessionEvent::Alert(err.to_string()));
    }

    fn set_state(&self, state: SessionState) {
        if self.link.state() != state {
            self.link.set_state(state);
            let _ = self.event_tx.send(SessionEvent::StateChanged(state));
        }
    }

    // ---- transport callbacks ----

    /// A connection attempt started
    pub fn begin_connect(&mut self) {
        self.set_state(SessionState::Connecting);
    }

    /// The transport opened; `tx` carries text to the server
    pub fn handle_open(&mut self, tx: mpsc::Sender<String>) {
        self.link.set_sender(Some(tx));
        self.set_state(SessionState::Open);
        tracing::info!("INDI link open, requesting {} pattern(s)", self.router.len());
        for pattern in self.router.patterns() {
            self.request(&pattern);
        }
    }

    /// Process one inbound chunk. Returns the number of elements handled.
    pub fn handle_chunk(&mut self, chunk: &str) -> usize {
        let frames: Vec<String> = self.extractor.feed(chunk).collect();
        let count = frames.len();
        for frame in frames {
            self.process_frame(&frame);
        }
        count
    }

    /// The transport closed; partial input is discarded
    pub fn handle_close(&mut self, clean: bool) {
        self.link.set_sender(None);
        self.extractor.reset();
        if clean {
            tracing::warn!("INDI connection closed cleanly");
        } else {
            tracing::warn!("INDI connection died");
        }
        if self.state() == SessionState::Open {
            let _ = self
                .event_tx
                .send(SessionEvent::Alert("Lost connection to INDI server".to_string()));
        }
        self.set_state(SessionState::Closed);
    }

    fn process_frame(&mut self, frame: &str) {
        let event = match parse_frame(frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Dropping INDI element: {}", e);
                return;
            }
        };

        if let IndiEvent::Message(m) = &event {
            tracing::info!("{}: {}", m.device.as_deref().unwrap_or("INDI"), m.message);
            let _ = self.event_tx.send(SessionEvent::Message(m.clone()));
        }

        match self.store.apply(&event) {
            Ok(StoreOutcome::Defined { .. }) => {
                if self.config.availability == AvailabilityPolicy::Automatic {
                    if let IndiEvent::Vector(v) = &event {
                        self.router.set_available(&v.device, &v.name, false);
                    }
                }
            }
            Ok(StoreOutcome::Deleted(count)) => {
                tracing::debug!(
                    "delProperty {}.{} marked {} vector(s) deleted",
                    event.device().unwrap_or("*"),
                    event.name().unwrap_or("*"),
                    count
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Dropping INDI element: {}", e);
                return;
            }
        }

        self.router.dispatch(&event);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("router", &self.router)
            .field("buffered", &self.extractor.buffered_len())
            .field("vectors", &self.store.len())
            .finish()
    }
}
