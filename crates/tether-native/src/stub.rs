//! In-memory engine implementing the native call surface.
//!
//! Handles are never reused, so release bookkeeping per raw value stays exact
//! for the lifetime of the engine. Descriptors are JSON manifests (see
//! [`TorrentManifest`]) whose bytes are SHA-1 hashed to produce the v1
//! info-hash. Alerts are queued and only delivered by [`StubEngine::deliver_pending`],
//! which builds the same wire structs as the engine shim and runs them through
//! the shared decoder.

use std::collections::{HashMap, VecDeque};
use std::ffi::CString;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::alert::{AlertSink, NativeAlertKind, dispatch};
use crate::api::{NativeApi, NativeFile, NativeMetadata, NativeStatus};
use crate::handle::{DescriptorHandle, SessionHandle, SettingsHandle, TorrentHandle};
use crate::raw::{
    RawAlert, RawPeerAlert, RawPerformanceAlert, RawTorrentRemovedAlert, RawTorrentStatusAlert,
};

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STRIDE: usize = 0x10;

const STATE_DOWNLOADING: i32 = 4;
const STATE_FINISHED: i32 = 6;
const DEFAULT_PRIORITY: u8 = 4;

const CATEGORY_STATUS: i32 = 1 << 6;
const CATEGORY_PEER: i32 = 1 << 1;
const CATEGORY_PERFORMANCE: i32 = 1 << 9;

/// Value type of a known settings key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKind {
    Int,
    Bool,
    Str,
}

const KNOWN_SETTINGS: &[(&str, SettingKind)] = &[
    ("user_agent", SettingKind::Str),
    ("peer_fingerprint", SettingKind::Str),
    ("handshake_client_version", SettingKind::Str),
    ("listen_interfaces", SettingKind::Str),
    ("outgoing_interfaces", SettingKind::Str),
    ("dht_bootstrap_nodes", SettingKind::Str),
    ("anonymous_mode", SettingKind::Bool),
    ("seeding_outgoing_connections", SettingKind::Bool),
    ("enable_dht", SettingKind::Bool),
    ("enable_lsd", SettingKind::Bool),
    ("enable_upnp", SettingKind::Bool),
    ("enable_natpmp", SettingKind::Bool),
    ("prefer_rc4", SettingKind::Bool),
    ("connections_limit", SettingKind::Int),
    ("out_enc_policy", SettingKind::Int),
    ("in_enc_policy", SettingKind::Int),
    ("allowed_enc_level", SettingKind::Int),
    ("alert_mask", SettingKind::Int),
    ("alert_queue_size", SettingKind::Int),
    ("download_rate_limit", SettingKind::Int),
    ("upload_rate_limit", SettingKind::Int),
    ("active_downloads", SettingKind::Int),
    ("active_seeds", SettingKind::Int),
    ("active_limit", SettingKind::Int),
];

fn setting_kind(key: &str) -> Option<SettingKind> {
    KNOWN_SETTINGS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

/// A value held by a stub settings object or session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubSetting {
    /// Integer setting.
    Int(i32),
    /// Boolean setting.
    Bool(bool),
    /// String setting.
    Str(String),
}

/// Descriptor content understood by the stub parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentManifest {
    /// Torrent name.
    pub name: String,
    /// Creating program.
    #[serde(default)]
    pub creator: String,
    /// Free-form comment.
    #[serde(default)]
    pub comment: String,
    /// Creation time, seconds since the Unix epoch.
    #[serde(default)]
    pub creation_date: i64,
    /// Files in payload order.
    pub files: Vec<ManifestFile>,
}

/// One file of a [`TorrentManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the save directory, or absolute.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: i64,
    /// Whether this is an alignment pad file.
    #[serde(default)]
    pub pad: bool,
    /// Modification time, seconds since the Unix epoch.
    #[serde(default)]
    pub modified_time: i64,
}

impl TorrentManifest {
    /// Serialise into descriptor bytes accepted by [`StubEngine`].
    ///
    /// # Errors
    /// Returns the serialisation error, which only occurs for non-string map keys.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        let manifest: Self = serde_json::from_slice(bytes)
            .inspect_err(|err| debug!(error = %err, "stub parser rejected descriptor"))
            .ok()?;
        let valid = !manifest.name.is_empty()
            && !manifest.files.is_empty()
            && manifest.files.iter().all(|file| file.size >= 0);
        valid.then_some(manifest)
    }
}

#[derive(Debug, Clone)]
struct StubDescriptor {
    metadata: NativeMetadata,
    files: Vec<NativeFile>,
}

impl StubDescriptor {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let manifest = TorrentManifest::parse(bytes)?;
        let digest = Sha1::digest(bytes);
        let mut info_hash_v1 = [0_u8; 20];
        info_hash_v1.copy_from_slice(&digest);

        let mut offset = 0_i64;
        let mut files = Vec::with_capacity(manifest.files.len());
        for (index, entry) in manifest.files.iter().enumerate() {
            let name = entry
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(NativeFile {
                index: i32::try_from(index).ok()?,
                offset,
                size: entry.size,
                modified_time: entry.modified_time,
                name,
                path: entry.path.clone(),
                path_is_absolute: entry.path.is_absolute(),
                pad_file: entry.pad,
            });
            offset = offset.checked_add(entry.size)?;
        }

        Some(Self {
            metadata: NativeMetadata {
                name: manifest.name,
                creator: manifest.creator,
                comment: manifest.comment,
                total_files: i32::try_from(files.len()).ok()?,
                total_size: offset,
                creation_date: manifest.creation_date,
                info_hash_v1,
                info_hash_v2: [0; 32],
            },
            files,
        })
    }
}

#[derive(Default)]
struct StubSession {
    sink: Option<Arc<dyn AlertSink>>,
    include_unmapped: bool,
    settings: HashMap<String, StubSetting>,
}

#[derive(Debug)]
struct StubTorrent {
    session: usize,
    in_session: bool,
    descriptor: StubDescriptor,
    save_path: PathBuf,
    priorities: Vec<u8>,
    completed: Vec<bool>,
    running: bool,
    state: i32,
    reannounce: Option<(i32, bool)>,
}

impl StubTorrent {
    fn wanted(&self) -> impl Iterator<Item = (usize, &NativeFile)> {
        self.descriptor
            .files
            .iter()
            .enumerate()
            .filter(|(index, file)| !file.pad_file && self.priorities[*index] > 0)
    }

    fn computed_state(&self) -> i32 {
        if self.wanted().all(|(index, _)| self.completed[index]) {
            STATE_FINISHED
        } else {
            STATE_DOWNLOADING
        }
    }

    fn progress(&self) -> f32 {
        let (done, total) = self.wanted().fold((0_i64, 0_i64), |(done, total), (index, file)| {
            let done = if self.completed[index] {
                done + file.size
            } else {
                done
            };
            (done, total + file.size)
        });
        if total == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let ratio = (done as f64 / total as f64) as f32;
        ratio
    }

    fn bytes_downloaded(&self) -> i64 {
        self.descriptor
            .files
            .iter()
            .zip(&self.completed)
            .filter(|(_, done)| **done)
            .map(|(file, _)| file.size)
            .sum()
    }

    fn file_path(&self, file: &NativeFile) -> PathBuf {
        if file.path_is_absolute {
            file.path.clone()
        } else {
            self.save_path.join(&file.path)
        }
    }
}

#[derive(Debug, Clone)]
enum QueuedAlert {
    Generic {
        category: i32,
        message: String,
    },
    Status {
        old_state: u32,
        new_state: u32,
        info_hash: [u8; 20],
        message: String,
    },
    Removed {
        info_hash: [u8; 20],
        message: String,
    },
    Performance {
        warning: u8,
        message: String,
    },
    Peer {
        event: u8,
        info_hash: [u8; 20],
        address: [u8; 16],
        message: String,
    },
}

#[derive(Default)]
struct EngineState {
    next_handle: usize,
    sessions: HashMap<usize, StubSession>,
    packs: HashMap<usize, HashMap<String, StubSetting>>,
    descriptors: HashMap<usize, StubDescriptor>,
    torrents: HashMap<usize, StubTorrent>,
    releases: HashMap<usize, usize>,
    double_frees: usize,
    invalid_calls: usize,
    queue: VecDeque<(usize, QueuedAlert)>,
}

impl EngineState {
    fn allocate(&mut self) -> usize {
        if self.next_handle == 0 {
            self.next_handle = FIRST_HANDLE;
        }
        let handle = self.next_handle;
        self.next_handle += HANDLE_STRIDE;
        handle
    }

    fn record_release(&mut self, raw: usize, was_live: bool) {
        *self.releases.entry(raw).or_default() += 1;
        if !was_live {
            self.double_frees += 1;
            warn!(handle = raw, "stub engine observed a double free");
        }
    }

    fn torrent_mut(&mut self, torrent: TorrentHandle) -> Option<&mut StubTorrent> {
        let found = self
            .torrents
            .get_mut(&torrent.as_raw())
            .filter(|entry| self.sessions.contains_key(&entry.session));
        if found.is_none() {
            self.invalid_calls += 1;
            warn!(handle = torrent.as_raw(), "stub engine call on a dead torrent handle");
        }
        found
    }

    fn enqueue(&mut self, session: usize, alert: QueuedAlert) {
        self.queue.push_back((session, alert));
    }
}

/// In-memory [`NativeApi`] used by tests and builds without the engine shim.
#[derive(Default)]
pub struct StubEngine {
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for StubEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("StubEngine")
            .field("sessions", &state.sessions.len())
            .field("descriptors", &state.descriptors.len())
            .field("torrents", &state.torrents.len())
            .field("queued_alerts", &state.queue.len())
            .finish_non_exhaustive()
    }
}

impl StubEngine {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of release calls seen for a raw handle value.
    #[must_use]
    pub fn release_count(&self, raw: usize) -> usize {
        self.lock().releases.get(&raw).copied().unwrap_or(0)
    }

    /// Release calls issued for handles that were not live.
    #[must_use]
    pub fn double_frees(&self) -> usize {
        self.lock().double_frees
    }

    /// Torrent calls issued against handles that were detached or orphaned.
    #[must_use]
    pub fn invalid_calls(&self) -> usize {
        self.lock().invalid_calls
    }

    /// Live sessions.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Live settings objects.
    #[must_use]
    pub fn live_settings_packs(&self) -> usize {
        self.lock().packs.len()
    }

    /// Live descriptors.
    #[must_use]
    pub fn live_descriptors(&self) -> usize {
        self.lock().descriptors.len()
    }

    /// Torrent handles not yet freed.
    #[must_use]
    pub fn live_torrents(&self) -> usize {
        self.lock().torrents.len()
    }

    /// Value a live session holds for `key`.
    #[must_use]
    pub fn session_setting(&self, session: SessionHandle, key: &str) -> Option<StubSetting> {
        self.lock()
            .sessions
            .get(&session.as_raw())
            .and_then(|entry| entry.settings.get(key).cloned())
    }

    /// Whether an alert sink is registered for the session.
    #[must_use]
    pub fn callback_registered(&self, session: SessionHandle) -> bool {
        self.lock()
            .sessions
            .get(&session.as_raw())
            .is_some_and(|entry| entry.sink.is_some())
    }

    /// Whether the session forwards alerts without a dedicated layout.
    #[must_use]
    pub fn includes_unmapped(&self, session: SessionHandle) -> bool {
        self.lock()
            .sessions
            .get(&session.as_raw())
            .is_some_and(|entry| entry.sink.is_some() && entry.include_unmapped)
    }

    /// Whether the torrent is currently resumed.
    #[must_use]
    pub fn is_running(&self, torrent: TorrentHandle) -> bool {
        self.lock()
            .torrents
            .get(&torrent.as_raw())
            .is_some_and(|entry| entry.running)
    }

    /// Save path the torrent was attached with.
    #[must_use]
    pub fn save_path(&self, torrent: TorrentHandle) -> Option<PathBuf> {
        self.lock()
            .torrents
            .get(&torrent.as_raw())
            .map(|entry| entry.save_path.clone())
    }

    /// Arguments of the most recent reannounce call.
    #[must_use]
    pub fn last_reannounce(&self, torrent: TorrentHandle) -> Option<(i32, bool)> {
        self.lock()
            .torrents
            .get(&torrent.as_raw())
            .and_then(|entry| entry.reannounce)
    }

    /// Alerts waiting for [`StubEngine::deliver_pending`].
    #[must_use]
    pub fn pending_alerts(&self) -> usize {
        self.lock().queue.len()
    }

    /// Complete every wanted file of every running torrent.
    ///
    /// Completed files are created on disk at their reported size. Returns the
    /// number of torrents that transitioned to finished.
    ///
    /// # Errors
    /// Returns the first I/O error raised while materialising files.
    pub fn advance(&self) -> std::io::Result<usize> {
        let mut state = self.lock();
        let mut finished = 0;
        let mut alerts = Vec::new();

        for entry in state.torrents.values_mut() {
            if !entry.running || !entry.in_session {
                continue;
            }
            let before = entry.state;
            let wanted: Vec<usize> = entry.wanted().map(|(index, _)| index).collect();
            for index in wanted {
                if entry.completed[index] {
                    continue;
                }
                let file = &entry.descriptor.files[index];
                let path = entry.file_path(file);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let handle = fs::File::create(&path)?;
                handle.set_len(u64::try_from(file.size).unwrap_or_default())?;
                entry.completed[index] = true;
            }
            entry.state = entry.computed_state();
            if before != entry.state {
                if entry.state == STATE_FINISHED {
                    finished += 1;
                }
                alerts.push((
                    entry.session,
                    QueuedAlert::Status {
                        old_state: before.cast_unsigned(),
                        new_state: entry.state.cast_unsigned(),
                        info_hash: entry.descriptor.metadata.info_hash_v1,
                        message: format!("{}: state changed", entry.descriptor.metadata.name),
                    },
                ));
            }
        }

        for (session, alert) in alerts {
            state.enqueue(session, alert);
        }
        Ok(finished)
    }

    /// Drop the torrent from its session as the engine would after an error.
    ///
    /// The handle itself stays allocated until detached; a removal alert is queued.
    pub fn remove_externally(&self, torrent: TorrentHandle) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.torrents.get_mut(&torrent.as_raw()) else {
            return false;
        };
        if !entry.in_session {
            return false;
        }
        entry.in_session = false;
        entry.running = false;
        let session = entry.session;
        let alert = QueuedAlert::Removed {
            info_hash: entry.descriptor.metadata.info_hash_v1,
            message: format!("{} removed", entry.descriptor.metadata.name),
        };
        state.enqueue(session, alert);
        true
    }

    /// Queue a peer event for the torrent.
    pub fn emit_peer(&self, torrent: TorrentHandle, event: u8, address: IpAddr) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.torrents.get(&torrent.as_raw()) else {
            return false;
        };
        let mapped = match address {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        let session = entry.session;
        let alert = QueuedAlert::Peer {
            event,
            info_hash: entry.descriptor.metadata.info_hash_v1,
            address: mapped.octets(),
            message: format!("peer {address} event {event}"),
        };
        state.enqueue(session, alert);
        true
    }

    /// Queue a performance warning for the session.
    pub fn emit_performance_warning(&self, session: SessionHandle, warning: u8) -> bool {
        let mut state = self.lock();
        if !state.sessions.contains_key(&session.as_raw()) {
            return false;
        }
        state.enqueue(
            session.as_raw(),
            QueuedAlert::Performance {
                warning,
                message: format!("performance warning {warning}"),
            },
        );
        true
    }

    /// Queue an alert with no dedicated layout.
    pub fn emit_generic(&self, session: SessionHandle, category: i32, message: &str) -> bool {
        let mut state = self.lock();
        if !state.sessions.contains_key(&session.as_raw()) {
            return false;
        }
        state.enqueue(
            session.as_raw(),
            QueuedAlert::Generic {
                category,
                message: message.to_owned(),
            },
        );
        true
    }

    /// Deliver queued alerts to their sessions' sinks.
    ///
    /// Alerts for sessions without a sink are discarded, as are generic alerts
    /// when the session does not include unmapped ones. Sinks run without the
    /// engine lock held. Returns the number of alerts that reached a sink.
    pub fn deliver_pending(&self) -> usize {
        let batch: Vec<(Arc<dyn AlertSink>, QueuedAlert)> = {
            let mut state = self.lock();
            let queued: Vec<_> = state.queue.drain(..).collect();
            queued
                .into_iter()
                .filter_map(|(session, alert)| {
                    let entry = state.sessions.get(&session)?;
                    let sink = entry.sink.clone()?;
                    let unmapped = matches!(alert, QueuedAlert::Generic { .. });
                    (!unmapped || entry.include_unmapped).then_some((sink, alert))
                })
                .collect()
        };

        batch
            .into_iter()
            .filter(|(sink, alert)| deliver(alert, sink.as_ref()))
            .count()
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

fn header(kind: NativeAlertKind, category: i32, message: &CString) -> RawAlert {
    RawAlert {
        kind: kind.code(),
        category,
        epoch: now_epoch(),
        message: message.as_ptr(),
    }
}

fn deliver(alert: &QueuedAlert, sink: &dyn AlertSink) -> bool {
    let text = match alert {
        QueuedAlert::Generic { message, .. }
        | QueuedAlert::Status { message, .. }
        | QueuedAlert::Removed { message, .. }
        | QueuedAlert::Performance { message, .. }
        | QueuedAlert::Peer { message, .. } => message.replace('\0', " "),
    };
    let Ok(message) = CString::new(text) else {
        return false;
    };

    // SAFETY: every buffer and its message outlive the dispatch call.
    unsafe {
        match *alert {
            QueuedAlert::Generic { category, .. } => {
                let raw = header(NativeAlertKind::Generic, category, &message);
                dispatch((&raw const raw).cast(), sink)
            }
            QueuedAlert::Status {
                old_state,
                new_state,
                info_hash,
                ..
            } => {
                let raw = RawTorrentStatusAlert {
                    alert: header(NativeAlertKind::TorrentStatus, CATEGORY_STATUS, &message),
                    old_state,
                    new_state,
                    info_hash,
                };
                dispatch((&raw const raw).cast(), sink)
            }
            QueuedAlert::Removed { info_hash, .. } => {
                let raw = RawTorrentRemovedAlert {
                    alert: header(NativeAlertKind::TorrentRemoved, CATEGORY_STATUS, &message),
                    info_hash,
                };
                dispatch((&raw const raw).cast(), sink)
            }
            QueuedAlert::Performance { warning, .. } => {
                let raw = RawPerformanceAlert {
                    alert: header(
                        NativeAlertKind::PerformanceWarning,
                        CATEGORY_PERFORMANCE,
                        &message,
                    ),
                    warning_type: warning,
                };
                dispatch((&raw const raw).cast(), sink)
            }
            QueuedAlert::Peer {
                event,
                info_hash,
                address,
                ..
            } => {
                let raw = RawPeerAlert {
                    alert: header(NativeAlertKind::Peer, CATEGORY_PEER, &message),
                    handle: std::ptr::null_mut(),
                    peer_event: event,
                    info_hash,
                    address,
                };
                dispatch((&raw const raw).cast(), sink)
            }
        }
    }
}

impl NativeApi for StubEngine {
    fn create_session(&self, settings: Option<SettingsHandle>) -> Option<SessionHandle> {
        let mut state = self.lock();
        let initial = match settings {
            Some(pack) => state.packs.get(&pack.as_raw())?.clone(),
            None => HashMap::new(),
        };
        let raw = state.allocate();
        state.sessions.insert(
            raw,
            StubSession {
                settings: initial,
                ..StubSession::default()
            },
        );
        debug!(handle = raw, "stub session created");
        SessionHandle::from_raw(raw)
    }

    fn destroy_session(&self, session: SessionHandle) {
        let mut state = self.lock();
        let was_live = state.sessions.remove(&session.as_raw()).is_some();
        state.record_release(session.as_raw(), was_live);
        state.queue.retain(|(owner, _)| *owner != session.as_raw());
        for entry in state.torrents.values_mut() {
            if entry.session == session.as_raw() {
                entry.in_session = false;
                entry.running = false;
            }
        }
    }

    fn set_event_callback(
        &self,
        session: SessionHandle,
        sink: Arc<dyn AlertSink>,
        include_unmapped: bool,
    ) {
        if let Some(entry) = self.lock().sessions.get_mut(&session.as_raw()) {
            entry.sink = Some(sink);
            entry.include_unmapped = include_unmapped;
        }
    }

    fn clear_event_callback(&self, session: SessionHandle) {
        if let Some(entry) = self.lock().sessions.get_mut(&session.as_raw()) {
            entry.sink = None;
        }
    }

    fn apply_settings(&self, session: SessionHandle, settings: SettingsHandle) {
        let mut state = self.lock();
        let Some(values) = state.packs.get(&settings.as_raw()).cloned() else {
            return;
        };
        if let Some(entry) = state.sessions.get_mut(&session.as_raw()) {
            entry.settings.extend(values);
        }
    }

    fn create_settings_pack(&self) -> Option<SettingsHandle> {
        let mut state = self.lock();
        let raw = state.allocate();
        state.packs.insert(raw, HashMap::new());
        SettingsHandle::from_raw(raw)
    }

    fn destroy_settings_pack(&self, settings: SettingsHandle) {
        let mut state = self.lock();
        let was_live = state.packs.remove(&settings.as_raw()).is_some();
        state.record_release(settings.as_raw(), was_live);
    }

    fn settings_set_int(&self, settings: SettingsHandle, key: &str, value: i32) -> bool {
        store_setting(self, settings, key, SettingKind::Int, StubSetting::Int(value))
    }

    fn settings_set_bool(&self, settings: SettingsHandle, key: &str, value: bool) -> bool {
        store_setting(self, settings, key, SettingKind::Bool, StubSetting::Bool(value))
    }

    fn settings_set_str(&self, settings: SettingsHandle, key: &str, value: &str) -> bool {
        store_setting(
            self,
            settings,
            key,
            SettingKind::Str,
            StubSetting::Str(value.to_owned()),
        )
    }

    fn create_torrent_from_file(&self, path: &Path) -> Option<DescriptorHandle> {
        let bytes = fs::read(path)
            .inspect_err(|err| debug!(path = %path.display(), error = %err, "stub read failed"))
            .ok()?;
        self.create_torrent_from_bytes(&bytes)
    }

    fn create_torrent_from_bytes(&self, bytes: &[u8]) -> Option<DescriptorHandle> {
        let descriptor = StubDescriptor::from_bytes(bytes)?;
        let mut state = self.lock();
        let raw = state.allocate();
        state.descriptors.insert(raw, descriptor);
        DescriptorHandle::from_raw(raw)
    }

    fn destroy_torrent(&self, descriptor: DescriptorHandle) {
        let mut state = self.lock();
        let was_live = state.descriptors.remove(&descriptor.as_raw()).is_some();
        state.record_release(descriptor.as_raw(), was_live);
    }

    fn torrent_metadata(&self, descriptor: DescriptorHandle) -> Option<NativeMetadata> {
        self.lock()
            .descriptors
            .get(&descriptor.as_raw())
            .map(|entry| entry.metadata.clone())
    }

    fn torrent_files(&self, descriptor: DescriptorHandle) -> Option<Vec<NativeFile>> {
        self.lock()
            .descriptors
            .get(&descriptor.as_raw())
            .map(|entry| entry.files.clone())
    }

    fn attach_torrent(
        &self,
        session: SessionHandle,
        descriptor: DescriptorHandle,
        save_path: &Path,
    ) -> Option<TorrentHandle> {
        let mut state = self.lock();
        if !state.sessions.contains_key(&session.as_raw()) {
            return None;
        }
        let descriptor = state.descriptors.get(&descriptor.as_raw())?.clone();
        let info_hash = descriptor.metadata.info_hash_v1;
        let duplicate = state.torrents.values().any(|entry| {
            entry.session == session.as_raw()
                && entry.in_session
                && entry.descriptor.metadata.info_hash_v1 == info_hash
        });
        if duplicate {
            return None;
        }

        let count = descriptor.files.len();
        let name = descriptor.metadata.name.clone();
        let raw = state.allocate();
        state.torrents.insert(
            raw,
            StubTorrent {
                session: session.as_raw(),
                in_session: true,
                descriptor,
                save_path: save_path.to_path_buf(),
                priorities: vec![DEFAULT_PRIORITY; count],
                completed: vec![false; count],
                running: false,
                state: STATE_DOWNLOADING,
                reannounce: None,
            },
        );
        state.enqueue(
            session.as_raw(),
            QueuedAlert::Generic {
                category: CATEGORY_STATUS,
                message: format!("{name} added"),
            },
        );
        TorrentHandle::from_raw(raw)
    }

    fn detach_torrent(&self, session: SessionHandle, torrent: TorrentHandle) {
        let mut state = self.lock();
        let removed = state.torrents.remove(&torrent.as_raw());
        state.record_release(torrent.as_raw(), removed.is_some());
        let Some(entry) = removed else {
            return;
        };
        if entry.in_session && entry.session == session.as_raw() {
            state.enqueue(
                session.as_raw(),
                QueuedAlert::Removed {
                    info_hash: entry.descriptor.metadata.info_hash_v1,
                    message: format!("{} removed", entry.descriptor.metadata.name),
                },
            );
        }
    }

    fn file_priority(&self, torrent: TorrentHandle, index: i32) -> u8 {
        let mut state = self.lock();
        state
            .torrent_mut(torrent)
            .and_then(|entry| {
                let index = usize::try_from(index).ok()?;
                entry.priorities.get(index).copied()
            })
            .unwrap_or(0)
    }

    fn set_file_priority(&self, torrent: TorrentHandle, index: i32, priority: u8) {
        let mut state = self.lock();
        let Some(entry) = state.torrent_mut(torrent) else {
            return;
        };
        let Ok(index) = usize::try_from(index) else {
            return;
        };
        let Some(slot) = entry.priorities.get_mut(index) else {
            return;
        };
        *slot = priority.min(7);
        entry.state = entry.computed_state();
    }

    fn start_torrent(&self, torrent: TorrentHandle) {
        if let Some(entry) = self.lock().torrent_mut(torrent) {
            entry.running = entry.in_session;
        }
    }

    fn stop_torrent(&self, torrent: TorrentHandle) {
        if let Some(entry) = self.lock().torrent_mut(torrent) {
            entry.running = false;
        }
    }

    fn reannounce_torrent(&self, torrent: TorrentHandle, seconds: i32, ignore_min_interval: bool) {
        if let Some(entry) = self.lock().torrent_mut(torrent) {
            entry.reannounce = Some((seconds, ignore_min_interval));
        }
    }

    fn torrent_status(&self, torrent: TorrentHandle) -> NativeStatus {
        let mut state = self.lock();
        let Some(entry) = state.torrent_mut(torrent) else {
            return NativeStatus {
                state: 0,
                progress: 0.0,
                peers: 0,
                seeds: 0,
                bytes_uploaded: 0,
                bytes_downloaded: 0,
                upload_rate: 0,
                download_rate: 0,
            };
        };
        NativeStatus {
            state: entry.state,
            progress: entry.progress(),
            peers: 0,
            seeds: 0,
            bytes_uploaded: 0,
            bytes_downloaded: entry.bytes_downloaded(),
            upload_rate: 0,
            download_rate: 0,
        }
    }
}

fn store_setting(
    engine: &StubEngine,
    settings: SettingsHandle,
    key: &str,
    expected: SettingKind,
    value: StubSetting,
) -> bool {
    if setting_kind(key) != Some(expected) {
        debug!(key, "stub engine rejected setting");
        return false;
    }
    let mut state = engine.lock();
    let Some(pack) = state.packs.get_mut(&settings.as_raw()) else {
        return false;
    };
    pack.insert(key.to_owned(), value);
    true
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use super::*;
    use crate::alert::NativeAlert;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<NativeAlert>>);

    impl AlertSink for Recorder {
        fn on_alert(&self, alert: NativeAlert) {
            self.0.lock().expect("recorder").push(alert);
        }
    }

    fn manifest(name: &str, sizes: &[i64]) -> Vec<u8> {
        TorrentManifest {
            name: name.to_owned(),
            creator: "stub".to_owned(),
            comment: String::new(),
            creation_date: 1_700_000_000,
            files: sizes
                .iter()
                .enumerate()
                .map(|(index, size)| ManifestFile {
                    path: PathBuf::from(name).join(format!("file-{index}.bin")),
                    size: *size,
                    pad: false,
                    modified_time: 0,
                })
                .collect(),
        }
        .to_bytes()
        .expect("manifest bytes")
    }

    #[test]
    fn unknown_and_mistyped_settings_are_rejected() {
        let engine = StubEngine::default();
        let pack = engine.create_settings_pack().expect("pack");

        assert!(engine.settings_set_str(pack, "user_agent", "tether/0.1"));
        assert!(engine.settings_set_int(pack, "connections_limit", 50));
        assert!(!engine.settings_set_bool(pack, "connections_limit", true));
        assert!(!engine.settings_set_int(pack, "no_such_key", 1));
    }

    #[test]
    fn descriptors_hash_their_content() {
        let engine = StubEngine::default();
        let bytes = manifest("alpha", &[10, 20]);
        let first = engine.create_torrent_from_bytes(&bytes).expect("descriptor");
        let second = engine.create_torrent_from_bytes(&bytes).expect("descriptor");

        let a = engine.torrent_metadata(first).expect("metadata");
        let b = engine.torrent_metadata(second).expect("metadata");
        assert_ne!(first, second);
        assert_eq!(a.info_hash_v1, b.info_hash_v1);
        assert_eq!(a.total_size, 30);
        assert_eq!(a.total_files, 2);

        let files = engine.torrent_files(first).expect("files");
        assert_eq!(files[1].offset, 10);
        assert_eq!(files[1].name, "file-1.bin");

        assert!(engine.create_torrent_from_bytes(b"not a torrent").is_none());
    }

    #[test]
    fn detaching_twice_is_recorded_as_double_free() {
        let engine = StubEngine::default();
        let session = engine.create_session(None).expect("session");
        let descriptor = engine
            .create_torrent_from_bytes(&manifest("beta", &[1]))
            .expect("descriptor");
        let torrent = engine
            .attach_torrent(session, descriptor, Path::new("/tmp/beta"))
            .expect("torrent");

        engine.detach_torrent(session, torrent);
        assert_eq!(engine.double_frees(), 0);
        engine.detach_torrent(session, torrent);
        assert_eq!(engine.double_frees(), 1);
        assert_eq!(engine.release_count(torrent.as_raw()), 2);
    }

    #[test]
    fn queued_alerts_reach_registered_sinks() {
        let engine = StubEngine::default();
        let session = engine.create_session(None).expect("session");
        let descriptor = engine
            .create_torrent_from_bytes(&manifest("gamma", &[1]))
            .expect("descriptor");
        let torrent = engine
            .attach_torrent(session, descriptor, Path::new("/tmp/gamma"))
            .expect("torrent");
        let sink = Arc::new(Recorder::default());
        engine.set_event_callback(session, sink.clone(), false);

        assert!(engine.remove_externally(torrent));
        assert!(engine.emit_peer(torrent, 0, "10.0.0.1".parse().expect("ip")));
        assert_eq!(engine.deliver_pending(), 2);

        let alerts = sink.0.lock().expect("recorder");
        assert!(matches!(alerts[0], NativeAlert::TorrentRemoved { .. }));
        match &alerts[1] {
            NativeAlert::Peer { address, .. } => {
                assert_eq!(
                    Ipv6Addr::from(*address).to_canonical(),
                    "10.0.0.1".parse::<IpAddr>().expect("ip")
                );
            }
            other => panic!("unexpected alert {other:?}"),
        }
    }
}
