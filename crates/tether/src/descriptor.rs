//! Parsed torrent content shared between sessions.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tether_native::{DescriptorHandle, NativeApi, Owned};
use tracing::debug;

use crate::error::{TetherError, TetherResult};
use crate::types::{FileEntry, InfoHash, TorrentMetadata};

/// Parsed .torrent content.
///
/// Clones share one native handle, released when the last clone (including
/// the ones held by attachments) is dropped. Metadata and the file list are
/// read from the engine once and cached.
#[derive(Clone)]
pub struct TorrentDescriptor {
    inner: Arc<DescriptorInner>,
}

struct DescriptorInner {
    handle: Owned<DescriptorHandle>,
    metadata: OnceLock<TorrentMetadata>,
    files: OnceLock<Vec<FileEntry>>,
}

impl TorrentDescriptor {
    /// Parse a .torrent file.
    ///
    /// # Errors
    /// [`TetherError::NotFound`] when `path` is not a file,
    /// [`TetherError::Parse`] when the engine rejects the content.
    pub fn from_file(api: &Arc<dyn NativeApi>, path: impl AsRef<Path>) -> TetherResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TetherError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let handle = api
            .create_torrent_from_file(path)
            .ok_or_else(|| TetherError::Parse {
                path: Some(path.to_path_buf()),
            })?;
        debug!(path = %path.display(), ?handle, "parsed torrent file");
        Ok(Self::wrap(api, handle))
    }

    /// Parse .torrent content held in memory.
    ///
    /// # Errors
    /// [`TetherError::Parse`] when the content is empty or rejected.
    pub fn from_bytes(api: &Arc<dyn NativeApi>, bytes: &[u8]) -> TetherResult<Self> {
        if bytes.is_empty() {
            return Err(TetherError::Parse { path: None });
        }
        let handle = api
            .create_torrent_from_bytes(bytes)
            .ok_or(TetherError::Parse { path: None })?;
        debug!(len = bytes.len(), ?handle, "parsed torrent bytes");
        Ok(Self::wrap(api, handle))
    }

    fn wrap(api: &Arc<dyn NativeApi>, handle: DescriptorHandle) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                handle: Owned::new(Arc::clone(api), handle),
                metadata: OnceLock::new(),
                files: OnceLock::new(),
            }),
        }
    }

    /// Torrent metadata.
    ///
    /// # Errors
    /// [`TetherError::InvalidHandle`] when the engine returns no metadata.
    pub fn metadata(&self) -> TetherResult<&TorrentMetadata> {
        if let Some(metadata) = self.inner.metadata.get() {
            return Ok(metadata);
        }
        let handle = self.handle()?;
        let metadata = self
            .inner
            .handle
            .api()
            .torrent_metadata(handle)
            .ok_or(TetherError::InvalidHandle {
                operation: "get_torrent_info",
            })?;
        Ok(self.inner.metadata.get_or_init(|| metadata.into()))
    }

    /// Files in payload order.
    ///
    /// # Errors
    /// [`TetherError::InvalidHandle`] when the engine returns no file list.
    pub fn files(&self) -> TetherResult<&[FileEntry]> {
        if let Some(files) = self.inner.files.get() {
            return Ok(files);
        }
        let handle = self.handle()?;
        let files = self
            .inner
            .handle
            .api()
            .torrent_files(handle)
            .ok_or(TetherError::InvalidHandle {
                operation: "get_torrent_file_list",
            })?;
        let files = self
            .inner
            .files
            .get_or_init(|| files.into_iter().map(FileEntry::from).collect());
        Ok(files)
    }

    /// Key this content is attached and routed under.
    ///
    /// # Errors
    /// Propagates [`TorrentDescriptor::metadata`] failures.
    pub fn routing_key(&self) -> TetherResult<InfoHash> {
        self.metadata().map(TorrentMetadata::routing_key)
    }

    pub(crate) fn handle(&self) -> TetherResult<DescriptorHandle> {
        self.inner
            .handle
            .get()
            .ok_or(TetherError::disposed("torrent descriptor"))
    }

    /// Whether two values share the same native descriptor.
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TorrentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TorrentDescriptor")
            .field("handle", &self.inner.handle)
            .field("metadata", &self.inner.metadata.get().map(|m| &m.name))
            .finish_non_exhaustive()
    }
}
