//! Client facade composing a session with alert subscriptions.

use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use tether_config::{SessionConfig, SettingsPack};
use tether_native::{AlertSink, NativeApi};
use tokio_stream::Stream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::alerts::{Alert, AlertBus, AlertRouter, AlertStream};
use crate::attachment::TorrentAttachment;
use crate::descriptor::TorrentDescriptor;
use crate::error::{TetherError, TetherResult};
use crate::session::{Session, SessionShared};

/// Registers the native callback while at least one subscription is alive.
struct AlertGate {
    session: Weak<SessionShared>,
    subscribers: Mutex<usize>,
    include_unmapped: AtomicBool,
    bus: AlertBus,
    router: Arc<AlertRouter>,
}

impl AlertGate {
    fn subscribers(&self) -> MutexGuard<'_, usize> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> Arc<dyn AlertSink> {
        self.router.clone()
    }

    fn acquire(&self) -> TetherResult<()> {
        let mut count = self.subscribers();
        let shared = self
            .session
            .upgrade()
            .ok_or(TetherError::disposed("session"))?;
        if *count == 0 {
            shared.set_alert_sink(self.sink(), self.include_unmapped.load(Ordering::Acquire))?;
        } else {
            shared.ensure_live()?;
        }
        *count += 1;
        Ok(())
    }

    fn release(&self) {
        let mut count = self.subscribers();
        *count = count.saturating_sub(1);
        if *count == 0 {
            if let Some(shared) = self.session.upgrade() {
                shared.clear_alert_sink();
            }
        }
    }

    fn reregister(&self, include_unmapped: bool) -> TetherResult<()> {
        let count = self.subscribers();
        self.include_unmapped.store(include_unmapped, Ordering::Release);
        if *count > 0 {
            if let Some(shared) = self.session.upgrade() {
                shared.clear_alert_sink();
                shared.set_alert_sink(self.sink(), include_unmapped)?;
            }
        }
        Ok(())
    }
}

/// Stream of alerts for one subscriber.
///
/// The engine callback stays registered while any subscription is alive.
/// Alerts missed because the subscriber fell behind are skipped with a warning.
pub struct AlertSubscription {
    stream: AlertStream,
    gate: Arc<AlertGate>,
}

impl Stream for AlertSubscription {
    type Item = Alert;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Alert>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.stream).poll_next(cx) {
                Poll::Ready(Some(Ok(alert))) => return Poll::Ready(Some(alert)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "alert subscriber lagged; alerts dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for AlertSubscription {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for AlertSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertSubscription").finish_non_exhaustive()
    }
}

/// Torrent client: one engine session plus alert subscriptions.
///
/// Dropping the client disposes the session.
pub struct TorrentClient {
    session: Session,
    gate: Arc<AlertGate>,
}

impl TorrentClient {
    /// Create a client over `api`.
    ///
    /// # Errors
    /// Propagates [`Session::new`] failures.
    pub fn new(api: Arc<dyn NativeApi>, config: &SessionConfig) -> TetherResult<Self> {
        let session = Session::new(api, config)?;
        Ok(Self::from_session(session, config.include_unmapped_alerts))
    }

    /// Create a client over the engine this build links against.
    ///
    /// # Errors
    /// Propagates [`Session::new`] failures.
    pub fn with_default_engine(config: &SessionConfig) -> TetherResult<Self> {
        Self::new(tether_native::default_api(), config)
    }

    /// Wrap an existing session.
    #[must_use]
    pub fn from_session(session: Session, include_unmapped: bool) -> Self {
        let bus = AlertBus::new();
        let router = Arc::new(AlertRouter::new(
            Arc::downgrade(session.shared()),
            bus.clone(),
        ));
        let gate = Arc::new(AlertGate {
            session: Arc::downgrade(session.shared()),
            subscribers: Mutex::new(0),
            include_unmapped: AtomicBool::new(include_unmapped),
            bus,
            router,
        });
        Self { session, gate }
    }

    /// Underlying session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Subscribe to alerts; the first subscription registers the engine callback.
    ///
    /// # Errors
    /// [`TetherError::Disposed`](crate::TetherError::Disposed) after dispose.
    pub fn subscribe(&self) -> TetherResult<AlertSubscription> {
        let stream = self.gate.bus.subscribe();
        self.gate.acquire()?;
        Ok(AlertSubscription {
            stream,
            gate: Arc::clone(&self.gate),
        })
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        *self.gate.subscribers()
    }

    /// Whether alerts without a dedicated payload are forwarded.
    #[must_use]
    pub fn include_unmapped(&self) -> bool {
        self.gate.include_unmapped.load(Ordering::Acquire)
    }

    /// Forward alerts without a dedicated payload; re-registers an active callback.
    ///
    /// # Errors
    /// [`TetherError::Disposed`](crate::TetherError::Disposed) after dispose.
    pub fn set_include_unmapped(&self, include: bool) -> TetherResult<()> {
        self.gate.reregister(include)
    }

    /// Parse a .torrent file with this client's engine.
    ///
    /// # Errors
    /// See [`TorrentDescriptor::from_file`].
    pub fn load_descriptor_file(&self, path: impl AsRef<Path>) -> TetherResult<TorrentDescriptor> {
        TorrentDescriptor::from_file(self.session.api(), path)
    }

    /// Parse in-memory .torrent content with this client's engine.
    ///
    /// # Errors
    /// See [`TorrentDescriptor::from_bytes`].
    pub fn load_descriptor_bytes(&self, bytes: &[u8]) -> TetherResult<TorrentDescriptor> {
        TorrentDescriptor::from_bytes(self.session.api(), bytes)
    }

    /// Apply additional settings to the live session.
    ///
    /// # Errors
    /// See [`Session::apply_settings`].
    pub fn update_settings(&self, pack: &SettingsPack) -> TetherResult<()> {
        self.session.apply_settings(pack)
    }

    /// Attach a torrent. See [`Session::attach`].
    ///
    /// # Errors
    /// See [`Session::attach`].
    pub fn attach(
        &self,
        descriptor: &TorrentDescriptor,
        save_path: Option<&Path>,
    ) -> TetherResult<Arc<TorrentAttachment>> {
        self.session.attach(descriptor, save_path)
    }

    /// Detach a torrent. See [`Session::detach`].
    ///
    /// # Errors
    /// See [`Session::detach`].
    pub fn detach(&self, attachment: &TorrentAttachment) -> TetherResult<()> {
        self.session.detach(attachment)
    }

    /// Snapshot of live attachments.
    #[must_use]
    pub fn active_torrents(&self) -> Vec<Arc<TorrentAttachment>> {
        self.session.active_torrents()
    }

    /// Dispose the session now instead of on drop.
    pub fn dispose(&self) {
        self.session.dispose();
    }
}

impl fmt::Debug for TorrentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorrentClient")
            .field("session", &self.session)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
