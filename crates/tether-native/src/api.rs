use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::alert::AlertSink;
use crate::handle::{DescriptorHandle, SessionHandle, SettingsHandle, TorrentHandle};

/// Metadata copied out of a parsed torrent descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMetadata {
    /// Torrent name.
    pub name: String,
    /// Creating program, empty when absent.
    pub creator: String,
    /// Free-form comment, empty when absent.
    pub comment: String,
    /// Number of files, including pad files.
    pub total_files: i32,
    /// Sum of all file sizes in bytes.
    pub total_size: i64,
    /// Creation time as seconds since the Unix epoch.
    pub creation_date: i64,
    /// SHA-1 info-hash; all zero for v2-only content.
    pub info_hash_v1: [u8; 20],
    /// SHA-256 info-hash; all zero for v1-only content.
    pub info_hash_v2: [u8; 32],
}

/// One entry of a descriptor's file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFile {
    /// Position in the torrent's file list.
    pub index: i32,
    /// Byte offset inside the concatenated torrent payload.
    pub offset: i64,
    /// File size in bytes.
    pub size: i64,
    /// Modification time as seconds since the Unix epoch, zero when unknown.
    pub modified_time: i64,
    /// File name without directories.
    pub name: String,
    /// Path relative to the save directory unless `path_is_absolute`.
    pub path: PathBuf,
    /// Whether `path` is already absolute.
    pub path_is_absolute: bool,
    /// Whether the entry is alignment padding.
    pub pad_file: bool,
}

/// Point-in-time status of an attached torrent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeStatus {
    /// Raw state code.
    pub state: i32,
    /// Completion ratio between 0 and 1.
    pub progress: f32,
    /// Connected peers.
    pub peers: i32,
    /// Connected seeds.
    pub seeds: i32,
    /// Total payload bytes uploaded.
    pub bytes_uploaded: i64,
    /// Total payload bytes downloaded.
    pub bytes_downloaded: i64,
    /// Upload rate in bytes per second.
    pub upload_rate: i64,
    /// Download rate in bytes per second.
    pub download_rate: i64,
}

/// Every call the binding makes across the foreign boundary.
///
/// Methods returning `Option` map the native null/zero result to `None`;
/// methods returning `bool` report whether the native side accepted the call.
/// Implementations never panic across the boundary and never block on the
/// alert sink.
pub trait NativeApi: Send + Sync + 'static {
    /// Create a session, optionally seeded with a settings object.
    fn create_session(&self, settings: Option<SettingsHandle>) -> Option<SessionHandle>;
    /// Destroy a session and every torrent still bound to it.
    fn destroy_session(&self, session: SessionHandle);

    /// Route alerts of `session` into `sink`, replacing any previous sink.
    fn set_event_callback(
        &self,
        session: SessionHandle,
        sink: Arc<dyn AlertSink>,
        include_unmapped: bool,
    );
    /// Stop delivering alerts for `session`.
    fn clear_event_callback(&self, session: SessionHandle);
    /// Apply a settings object to a live session.
    fn apply_settings(&self, session: SessionHandle, settings: SettingsHandle);

    /// Allocate an empty settings object.
    fn create_settings_pack(&self) -> Option<SettingsHandle>;
    /// Free a settings object.
    fn destroy_settings_pack(&self, settings: SettingsHandle);
    /// Set an integer key; `false` when the key is unknown or not an integer.
    fn settings_set_int(&self, settings: SettingsHandle, key: &str, value: i32) -> bool;
    /// Set a boolean key; `false` when the key is unknown or not a boolean.
    fn settings_set_bool(&self, settings: SettingsHandle, key: &str, value: bool) -> bool;
    /// Set a string key; `false` when the key is unknown or not a string.
    fn settings_set_str(&self, settings: SettingsHandle, key: &str, value: &str) -> bool;

    /// Parse a .torrent file on disk.
    fn create_torrent_from_file(&self, path: &Path) -> Option<DescriptorHandle>;
    /// Parse .torrent content held in memory.
    fn create_torrent_from_bytes(&self, bytes: &[u8]) -> Option<DescriptorHandle>;
    /// Free a parsed descriptor.
    fn destroy_torrent(&self, descriptor: DescriptorHandle);
    /// Copy the descriptor's metadata.
    fn torrent_metadata(&self, descriptor: DescriptorHandle) -> Option<NativeMetadata>;
    /// Copy the descriptor's file list.
    fn torrent_files(&self, descriptor: DescriptorHandle) -> Option<Vec<NativeFile>>;

    /// Bind a descriptor into a session; the torrent starts paused and unmanaged.
    fn attach_torrent(
        &self,
        session: SessionHandle,
        descriptor: DescriptorHandle,
        save_path: &Path,
    ) -> Option<TorrentHandle>;
    /// Remove a torrent from its session and free the handle.
    fn detach_torrent(&self, session: SessionHandle, torrent: TorrentHandle);

    /// Download priority of one file.
    fn file_priority(&self, torrent: TorrentHandle, index: i32) -> u8;
    /// Change the download priority of one file.
    fn set_file_priority(&self, torrent: TorrentHandle, index: i32, priority: u8);

    /// Resume the torrent.
    fn start_torrent(&self, torrent: TorrentHandle);
    /// Pause the torrent.
    fn stop_torrent(&self, torrent: TorrentHandle);
    /// Announce to every tracker after `seconds`.
    fn reannounce_torrent(&self, torrent: TorrentHandle, seconds: i32, ignore_min_interval: bool);
    /// Current status snapshot.
    fn torrent_status(&self, torrent: TorrentHandle) -> NativeStatus;
}
