//! A torrent bound into a session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, Weak};

use chrono::TimeDelta;
use tether_native::{AttachedTorrent, NativeApi, Owned, TorrentHandle};
use tracing::debug;

use crate::descriptor::TorrentDescriptor;
use crate::error::{TetherError, TetherResult};
use crate::types::{FileEntry, FilePriority, InfoHash, TorrentStatus};

const OBJECT: &str = "torrent attachment";

/// Where an attachment is in its lifecycle. `Detached` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Bound to the session and paused.
    Attached,
    /// Bound to the session and resumed.
    Running,
    /// No longer bound; every operation fails.
    Detached,
}

struct AttachmentState {
    lifecycle: Lifecycle,
    handle: Owned<AttachedTorrent>,
}

/// One torrent bound into a [`Session`](crate::Session).
///
/// Operations hold the state lock for the duration of their native call, so
/// detaching waits for in-flight calls and nothing reaches the engine after
/// the handle is freed.
pub struct TorrentAttachment {
    descriptor: TorrentDescriptor,
    info_hash: InfoHash,
    save_path: PathBuf,
    state: RwLock<AttachmentState>,
    files: OnceLock<Vec<AttachmentFile>>,
}

impl TorrentAttachment {
    pub(crate) fn new(
        api: Arc<dyn NativeApi>,
        handle: AttachedTorrent,
        descriptor: TorrentDescriptor,
        info_hash: InfoHash,
        save_path: PathBuf,
    ) -> Self {
        Self {
            descriptor,
            info_hash,
            save_path,
            state: RwLock::new(AttachmentState {
                lifecycle: Lifecycle::Attached,
                handle: Owned::new(api, handle),
            }),
            files: OnceLock::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AttachmentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_torrent<T>(&self, call: impl FnOnce(&dyn NativeApi, TorrentHandle) -> T) -> TetherResult<T> {
        let state = self.read();
        if state.lifecycle == Lifecycle::Detached {
            return Err(TetherError::disposed(OBJECT));
        }
        let attached = state.handle.get().ok_or(TetherError::disposed(OBJECT))?;
        Ok(call(state.handle.api().as_ref(), attached.torrent))
    }

    fn transition(
        &self,
        next: Lifecycle,
        call: impl FnOnce(&dyn NativeApi, TorrentHandle),
    ) -> TetherResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.lifecycle == Lifecycle::Detached {
            return Err(TetherError::disposed(OBJECT));
        }
        let attached = state.handle.get().ok_or(TetherError::disposed(OBJECT))?;
        call(state.handle.api().as_ref(), attached.torrent);
        state.lifecycle = next;
        Ok(())
    }

    /// Content hash this attachment is keyed under.
    #[must_use]
    pub const fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Directory the payload is stored in.
    #[must_use]
    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Descriptor the torrent was attached from.
    #[must_use]
    pub const fn descriptor(&self) -> &TorrentDescriptor {
        &self.descriptor
    }

    /// Current lifecycle position.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.read().lifecycle
    }

    /// Native torrent handle, `None` once detached.
    #[must_use]
    pub fn native_handle(&self) -> Option<TorrentHandle> {
        let state = self.read();
        if state.lifecycle == Lifecycle::Detached {
            return None;
        }
        state.handle.get().map(|attached| attached.torrent)
    }

    /// Whether the attachment reached its terminal state.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.lifecycle() == Lifecycle::Detached
    }

    /// Query the engine for a status snapshot.
    ///
    /// # Errors
    /// [`TetherError::Disposed`] after detach.
    pub fn current_status(&self) -> TetherResult<TorrentStatus> {
        self.with_torrent(|api, torrent| api.torrent_status(torrent).into())
    }

    /// Resume transfers.
    ///
    /// # Errors
    /// [`TetherError::Disposed`] after detach.
    pub fn start(&self) -> TetherResult<()> {
        self.transition(Lifecycle::Running, |api, torrent| api.start_torrent(torrent))
    }

    /// Pause transfers.
    ///
    /// # Errors
    /// [`TetherError::Disposed`] after detach.
    pub fn stop(&self) -> TetherResult<()> {
        self.transition(Lifecycle::Attached, |api, torrent| api.stop_torrent(torrent))
    }

    /// Announce to every tracker after `delay`.
    ///
    /// # Errors
    /// [`TetherError::OutOfRange`] when `delay` is negative or beyond the
    /// engine's range, [`TetherError::Disposed`] after detach.
    pub fn reannounce_all_trackers(&self, delay: TimeDelta, force: bool) -> TetherResult<()> {
        if delay < TimeDelta::zero() {
            return Err(TetherError::out_of_range("delay", delay));
        }
        let seconds =
            i32::try_from(delay.num_seconds()).map_err(|_| TetherError::out_of_range("delay", delay))?;
        self.with_torrent(|api, torrent| api.reannounce_torrent(torrent, seconds, force))
    }

    fn native_index(&self, index: usize) -> TetherResult<i32> {
        let count = self.descriptor.files()?.len();
        if index >= count {
            return Err(TetherError::out_of_range("file_index", index));
        }
        i32::try_from(index).map_err(|_| TetherError::out_of_range("file_index", index))
    }

    /// Download priority of file `index`, read from the engine.
    ///
    /// # Errors
    /// [`TetherError::OutOfRange`] for an unknown index,
    /// [`TetherError::Disposed`] after detach.
    pub fn file_priority(&self, index: usize) -> TetherResult<FilePriority> {
        let index = self.native_index(index)?;
        self.with_torrent(|api, torrent| FilePriority::from_native(api.file_priority(torrent, index)))
    }

    /// Change the download priority of file `index`.
    ///
    /// # Errors
    /// [`TetherError::OutOfRange`] for an unknown index,
    /// [`TetherError::Disposed`] after detach.
    pub fn set_file_priority(&self, index: usize, priority: FilePriority) -> TetherResult<()> {
        let index = self.native_index(index)?;
        self.with_torrent(|api, torrent| {
            api.set_file_priority(torrent, index, priority.to_native());
        })
    }

    /// Files bound to this attachment's save path.
    ///
    /// # Errors
    /// Propagates descriptor file-list failures.
    pub fn files(self: &Arc<Self>) -> TetherResult<&[AttachmentFile]> {
        if let Some(files) = self.files.get() {
            return Ok(files);
        }
        let owner = Arc::downgrade(self);
        let files: Vec<AttachmentFile> = self
            .descriptor
            .files()?
            .iter()
            .map(|entry| AttachmentFile::new(entry.clone(), &self.save_path, owner.clone()))
            .collect();
        Ok(self.files.get_or_init(|| files))
    }

    /// Move to `Detached` and free the native handle.
    ///
    /// Returns whether this call performed the transition.
    pub(crate) fn mark_detached(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.lifecycle == Lifecycle::Detached {
            return false;
        }
        state.lifecycle = Lifecycle::Detached;
        state.handle.release();
        debug!(info_hash = %self.info_hash, "attachment detached");
        true
    }
}

impl fmt::Debug for TorrentAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorrentAttachment")
            .field("info_hash", &self.info_hash)
            .field("save_path", &self.save_path)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

/// A file of an attachment, resolved against its save path.
///
/// Priority reads and writes go straight to the engine and are never cached.
#[derive(Debug, Clone)]
pub struct AttachmentFile {
    entry: FileEntry,
    path: PathBuf,
    owner: Weak<TorrentAttachment>,
}

impl AttachmentFile {
    fn new(entry: FileEntry, save_path: &Path, owner: Weak<TorrentAttachment>) -> Self {
        let path = if entry.path_is_absolute {
            entry.path.clone()
        } else {
            save_path.join(&entry.path)
        };
        Self { entry, path, owner }
    }

    /// Descriptor entry.
    #[must_use]
    pub const fn entry(&self) -> &FileEntry {
        &self.entry
    }

    /// Absolute location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn owner(&self) -> TetherResult<Arc<TorrentAttachment>> {
        self.owner.upgrade().ok_or(TetherError::disposed(OBJECT))
    }

    /// Current download priority.
    ///
    /// # Errors
    /// [`TetherError::Disposed`] once the attachment is detached or dropped.
    pub fn priority(&self) -> TetherResult<FilePriority> {
        self.owner()?.file_priority(self.entry.index)
    }

    /// Change the download priority.
    ///
    /// # Errors
    /// [`TetherError::Disposed`] once the attachment is detached or dropped.
    pub fn set_priority(&self, priority: FilePriority) -> TetherResult<()> {
        self.owner()?.set_file_priority(self.entry.index, priority)
    }
}
