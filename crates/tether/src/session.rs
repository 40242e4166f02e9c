//! Engine session owning its attachments.
//!
//! Lock order: session handle, then the attachment registry, then the pending
//! removal table, then an attachment's own state.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use tether_config::{SessionConfig, SettingsPack};
use tether_native::{AlertSink, AttachedTorrent, NativeApi, Owned, SessionHandle};
use tracing::{debug, info, warn};

use crate::attachment::TorrentAttachment;
use crate::descriptor::TorrentDescriptor;
use crate::error::{TetherError, TetherResult};
use crate::types::InfoHash;

const OBJECT: &str = "session";
const DOWNLOADS_DIR: &str = "downloads";

type Registry = HashMap<InfoHash, Arc<TorrentAttachment>>;
/// Explicit detaches awaiting their removal confirmation, oldest first.
type Pending = HashMap<InfoHash, VecDeque<Arc<TorrentAttachment>>>;
type HandleGuard<'a> = RwLockReadGuard<'a, Option<Owned<SessionHandle>>>;

/// State shared between a [`Session`] and the alert router.
pub(crate) struct SessionShared {
    api: Arc<dyn NativeApi>,
    handle: RwLock<Option<Owned<SessionHandle>>>,
    registry: Mutex<Registry>,
    pending_removals: Mutex<Pending>,
    download_root: RwLock<PathBuf>,
    alerts_enabled: AtomicBool,
}

impl SessionShared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending_removals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn live_handle(&self) -> TetherResult<(HandleGuard<'_>, SessionHandle)> {
        let guard = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        let handle = guard
            .as_ref()
            .and_then(Owned::get)
            .ok_or(TetherError::disposed(OBJECT))?;
        Ok((guard, handle))
    }

    /// Fails with [`TetherError::Disposed`] once the session is torn down.
    pub(crate) fn ensure_live(&self) -> TetherResult<()> {
        self.live_handle().map(|_| ())
    }

    /// Read guard used while resolving alerts; `None` while the session is
    /// being torn down or is gone.
    pub(crate) fn try_live(&self) -> Option<HandleGuard<'_>> {
        let guard = self.handle.try_read().ok()?;
        guard.as_ref().and_then(Owned::get)?;
        Some(guard)
    }

    /// Live attachment registered under `key`.
    pub(crate) fn lookup(&self, key: &InfoHash) -> Option<Arc<TorrentAttachment>> {
        self.registry().get(key).cloned()
    }

    /// Resolve a removal confirmation for `key`.
    ///
    /// Explicit detaches awaiting confirmation are consumed first, in detach
    /// order, since the engine confirms removals of one content hash in the
    /// order they were requested. Otherwise a live attachment is removed from
    /// the registry and detached here.
    pub(crate) fn take_removed(&self, key: &InfoHash) -> Option<Arc<TorrentAttachment>> {
        let mut registry = self.registry();
        if let Some(confirmed) = self.pop_pending(key) {
            return Some(confirmed);
        }
        let attachment = registry.remove(key)?;
        if attachment.mark_detached() {
            info!(info_hash = %key, "torrent removed by engine");
        }
        Some(attachment)
    }

    fn pop_pending(&self, key: &InfoHash) -> Option<Arc<TorrentAttachment>> {
        let mut pending = self.pending();
        let queue = pending.get_mut(key)?;
        let confirmed = queue.pop_front();
        if queue.is_empty() {
            pending.remove(key);
        }
        confirmed
    }

    /// Route the session's alerts into `sink`, replacing any previous one.
    pub(crate) fn set_alert_sink(
        &self,
        sink: Arc<dyn AlertSink>,
        include_unmapped: bool,
    ) -> TetherResult<()> {
        let (_guard, session) = self.live_handle()?;
        self.api.set_event_callback(session, sink, include_unmapped);
        self.alerts_enabled.store(true, Ordering::Release);
        debug!(include_unmapped, "alert callback registered");
        Ok(())
    }

    /// Stop alert delivery; a no-op once disposed.
    pub(crate) fn clear_alert_sink(&self) {
        let Ok((_guard, session)) = self.live_handle() else {
            return;
        };
        if self.alerts_enabled.swap(false, Ordering::AcqRel) {
            self.api.clear_event_callback(session);
            self.pending().clear();
            debug!("alert callback cleared");
        }
    }

    fn detach_entry(&self, attachment: &TorrentAttachment) {
        if let Err(err) = attachment.stop() {
            debug!(info_hash = %attachment.info_hash(), error = %err, "stop before detach skipped");
        }
        attachment.mark_detached();
    }
}

/// Engine session.
///
/// Owns the native session and every torrent attached to it. Attachments are
/// keyed by content hash; the same content can be attached once per session.
/// Dropping the session disposes it.
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Create a session from discrete options.
    ///
    /// # Errors
    /// [`TetherError::Settings`] when the engine rejects the derived settings,
    /// [`TetherError::InvalidHandle`] when no session could be created.
    pub fn new(api: Arc<dyn NativeApi>, config: &SessionConfig) -> TetherResult<Self> {
        Self::with_settings(api, &config.to_settings_pack())
    }

    /// Create a session seeded with an explicit settings pack.
    ///
    /// # Errors
    /// [`TetherError::Settings`] when the engine rejects a key,
    /// [`TetherError::InvalidHandle`] when no session could be created,
    /// [`TetherError::Io`] when the working directory is unavailable.
    pub fn with_settings(api: Arc<dyn NativeApi>, pack: &SettingsPack) -> TetherResult<Self> {
        let cwd = std::env::current_dir().map_err(|err| TetherError::io("current_dir", ".", err))?;
        let settings = pack.build(&api)?;
        let handle = api
            .create_session(settings.get())
            .ok_or(TetherError::InvalidHandle {
                operation: "create_session",
            })?;
        drop(settings);
        info!(?handle, settings = pack.len(), "session created");

        Ok(Self {
            shared: Arc::new(SessionShared {
                handle: RwLock::new(Some(Owned::new(Arc::clone(&api), handle))),
                api,
                registry: Mutex::new(HashMap::new()),
                pending_removals: Mutex::new(HashMap::new()),
                download_root: RwLock::new(cwd.join(DOWNLOADS_DIR)),
                alerts_enabled: AtomicBool::new(false),
            }),
        })
    }

    pub(crate) const fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    /// Native surface backing this session.
    #[must_use]
    pub fn api(&self) -> &Arc<dyn NativeApi> {
        &self.shared.api
    }

    /// Native session handle, `None` once disposed.
    #[must_use]
    pub fn native_handle(&self) -> Option<SessionHandle> {
        self.shared.live_handle().ok().map(|(_, handle)| handle)
    }

    /// Whether [`Session::dispose`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.native_handle().is_none()
    }

    /// Directory relative save paths are resolved against.
    #[must_use]
    pub fn default_download_path(&self) -> PathBuf {
        self.shared
            .download_root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the directory relative save paths are resolved against.
    pub fn set_default_download_path(&self, path: impl Into<PathBuf>) {
        *self
            .shared
            .download_root
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path.into();
    }

    fn resolve_save_path(&self, save_path: Option<&Path>) -> PathBuf {
        let root = self.default_download_path();
        match save_path {
            None => root,
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => root.join(path),
        }
    }

    /// Bind `descriptor` into the session, paused.
    ///
    /// `save_path` may be absolute; relative paths and `None` resolve under
    /// [`Session::default_download_path`]. The directory is created.
    ///
    /// # Errors
    /// [`TetherError::AlreadyAttached`] when the content is already attached,
    /// [`TetherError::InvalidHandle`] when the engine refuses the torrent,
    /// [`TetherError::Io`] when the save directory cannot be created,
    /// [`TetherError::Disposed`] after dispose.
    pub fn attach(
        &self,
        descriptor: &TorrentDescriptor,
        save_path: Option<&Path>,
    ) -> TetherResult<Arc<TorrentAttachment>> {
        let (_guard, session) = self.shared.live_handle()?;
        let key = descriptor.routing_key()?;
        let descriptor_handle = descriptor.handle()?;

        let mut registry = self.shared.registry();
        if registry.contains_key(&key) {
            return Err(TetherError::AlreadyAttached { info_hash: key });
        }

        let save_path = self.resolve_save_path(save_path);
        fs::create_dir_all(&save_path)
            .map_err(|err| TetherError::io("create_save_path", &save_path, err))?;

        let torrent = self
            .shared
            .api
            .attach_torrent(session, descriptor_handle, &save_path)
            .ok_or(TetherError::InvalidHandle {
                operation: "attach_torrent",
            })?;

        let attachment = Arc::new(TorrentAttachment::new(
            Arc::clone(&self.shared.api),
            AttachedTorrent { session, torrent },
            descriptor.clone(),
            key,
            save_path,
        ));
        registry.insert(key, Arc::clone(&attachment));
        info!(info_hash = %key, save_path = %attachment.save_path().display(), "torrent attached");
        Ok(attachment)
    }

    /// Stop and remove an attachment, freeing its native handle.
    ///
    /// # Errors
    /// [`TetherError::NotAttached`] when `attachment` is not attached to this
    /// session, [`TetherError::Disposed`] after dispose.
    pub fn detach(&self, attachment: &TorrentAttachment) -> TetherResult<()> {
        let (_guard, _session) = self.shared.live_handle()?;
        let key = attachment.info_hash();

        let mut registry = self.shared.registry();
        let owned = registry
            .get(&key)
            .is_some_and(|entry| std::ptr::eq(entry.as_ref(), attachment));
        if !owned {
            return Err(TetherError::NotAttached { info_hash: key });
        }
        let Some(entry) = registry.remove(&key) else {
            return Err(TetherError::NotAttached { info_hash: key });
        };
        if self.shared.alerts_enabled.load(Ordering::Acquire) {
            self.shared
                .pending()
                .entry(key)
                .or_default()
                .push_back(Arc::clone(&entry));
        }
        self.shared.detach_entry(&entry);
        drop(registry);

        info!(info_hash = %key, "torrent detached");
        Ok(())
    }

    /// Snapshot of live attachments.
    #[must_use]
    pub fn active_torrents(&self) -> Vec<Arc<TorrentAttachment>> {
        self.shared.registry().values().cloned().collect()
    }

    /// Live attachment for `info_hash`.
    #[must_use]
    pub fn find(&self, info_hash: &InfoHash) -> Option<Arc<TorrentAttachment>> {
        self.shared.lookup(info_hash)
    }

    /// Build `pack` and apply it to the live session.
    ///
    /// # Errors
    /// [`TetherError::Settings`] when the engine rejects a key,
    /// [`TetherError::Disposed`] after dispose.
    pub fn apply_settings(&self, pack: &SettingsPack) -> TetherResult<()> {
        let (_guard, session) = self.shared.live_handle()?;
        let settings = pack.build(&self.shared.api)?;
        if let Some(handle) = settings.get() {
            self.shared.api.apply_settings(session, handle);
        }
        debug!(settings = pack.len(), "settings applied");
        Ok(())
    }

    /// Tear down everything: detach all attachments, clear the alert
    /// callback, release the session. Idempotent.
    pub fn dispose(&self) {
        let mut handle = self.shared.handle.write().unwrap_or_else(PoisonError::into_inner);
        let Some(owned) = handle.take() else {
            return;
        };

        let attachments: Vec<_> = self.shared.registry().drain().collect();
        for (key, attachment) in attachments {
            if let Err(err) = attachment.stop() {
                warn!(info_hash = %key, error = %err, "failed to stop torrent during dispose");
            }
            if !attachment.mark_detached() {
                warn!(info_hash = %key, "torrent was already detached during dispose");
            }
        }
        self.shared.pending().clear();

        if let Some(session) = owned.get() {
            if self.shared.alerts_enabled.swap(false, Ordering::AcqRel) {
                self.shared.api.clear_event_callback(session);
            }
        }
        owned.release();
        drop(handle);
        info!("session disposed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.native_handle())
            .field("attachments", &self.shared.registry().len())
            .field("download_root", &self.default_download_path())
            .finish_non_exhaustive()
    }
}
