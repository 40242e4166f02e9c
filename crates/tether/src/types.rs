//! Value types exposed by the client: hashes, states, priorities and snapshots.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tether_native::{NativeFile, NativeMetadata, NativeStatus};

/// SHA-1 content hash identifying a torrent; displayed as upper-case hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Placeholder the engine sends when a torrent has no v1 hash.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0xFF)
    }

    fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({self})")
    }
}

impl FromStr for InfoHash {
    type Err = hex::FromHexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0_u8; 20];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Torrent lifecycle state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Checking existing files on disk.
    CheckingFiles,
    /// Validating resume data.
    CheckingResume,
    /// Fetching metadata from peers.
    DownloadingMetadata,
    /// Downloading payload.
    Downloading,
    /// Complete and uploading.
    Seeding,
    /// Every wanted file is complete.
    Finished,
    /// The engine reported an error.
    Errored,
    /// Code zero or one this client does not know.
    Unknown(i32),
}

impl TorrentState {
    /// Map a native state code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::CheckingFiles,
            2 => Self::CheckingResume,
            3 => Self::DownloadingMetadata,
            4 => Self::Downloading,
            5 => Self::Seeding,
            6 => Self::Finished,
            7 => Self::Errored,
            other => Self::Unknown(other),
        }
    }

    /// Map the unsigned code carried by state-change alerts.
    #[must_use]
    pub fn from_alert_code(code: u32) -> Self {
        i32::try_from(code).map_or(Self::Unknown(-1), Self::from_code)
    }
}

/// Per-file download priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    /// Not downloaded.
    Skip,
    /// Lowest non-zero priority.
    Low,
    /// Engine default.
    Normal,
    /// Highest priority.
    High,
}

impl FilePriority {
    /// Bucket a native priority level (0-7).
    #[must_use]
    pub const fn from_native(level: u8) -> Self {
        match level {
            0 => Self::Skip,
            1..=3 => Self::Low,
            4..=6 => Self::Normal,
            _ => Self::High,
        }
    }

    /// Native priority level.
    #[must_use]
    pub const fn to_native(self) -> u8 {
        match self {
            Self::Skip => 0,
            Self::Low => 1,
            Self::Normal => 4,
            Self::High => 7,
        }
    }
}

/// What happened in a peer alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerAlertKind {
    /// The peer connected to us.
    ConnectedIncoming,
    /// We connected to the peer.
    ConnectedOutgoing,
    /// The connection closed.
    Disconnected,
    /// The peer was banned.
    Banned,
    /// The peer stopped sending data.
    Snubbed,
    /// The peer resumed sending data.
    Unsnubbed,
    /// The connection failed.
    Errored,
    /// Unrecognised event code.
    Unknown(u8),
}

impl PeerAlertKind {
    /// Map a native peer event code.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::ConnectedIncoming,
            1 => Self::ConnectedOutgoing,
            2 => Self::Disconnected,
            3 => Self::Banned,
            4 => Self::Snubbed,
            5 => Self::Unsnubbed,
            6 => Self::Errored,
            other => Self::Unknown(other),
        }
    }
}

/// Engine performance warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceWarning {
    /// Disk write queue is full.
    OutstandingDiskBufferLimitReached,
    /// Per-peer request queue is full.
    OutstandingRequestLimitReached,
    /// Upload limit throttles downloads.
    UploadLimitTooLow,
    /// Download limit throttles uploads.
    DownloadLimitTooLow,
    /// Send buffer watermark too low for the rate.
    SendBufferWatermarkTooLow,
    /// Optimistic unchoke slots exceed total slots.
    TooManyOptimisticUnchokeSlots,
    /// Disk queue limit is too high for the cache.
    TooHighDiskQueueLimit,
    /// Async I/O limit reached.
    AioLimitReached,
    /// Deprecated choker without an upload limit.
    DeprecatedBittyrantWithNoUplimit,
    /// Too few ports for outgoing connections.
    TooFewOutgoingPorts,
    /// Process file descriptor limit is too low.
    TooFewFileDescriptors,
    /// Unrecognised warning code.
    Unknown(u8),
}

impl PerformanceWarning {
    /// Map a native warning code.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::OutstandingDiskBufferLimitReached,
            1 => Self::OutstandingRequestLimitReached,
            2 => Self::UploadLimitTooLow,
            3 => Self::DownloadLimitTooLow,
            4 => Self::SendBufferWatermarkTooLow,
            5 => Self::TooManyOptimisticUnchokeSlots,
            6 => Self::TooHighDiskQueueLimit,
            7 => Self::AioLimitReached,
            8 => Self::DeprecatedBittyrantWithNoUplimit,
            9 => Self::TooFewOutgoingPorts,
            10 => Self::TooFewFileDescriptors,
            other => Self::Unknown(other),
        }
    }
}

/// Status snapshot of an attached torrent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TorrentStatus {
    /// Lifecycle state.
    pub state: TorrentState,
    /// Completion of the wanted files, 0.0 to 1.0.
    pub progress: f32,
    /// Connected peers.
    pub peers: u32,
    /// Connected seeds.
    pub seeds: u32,
    /// Payload bytes uploaded.
    pub bytes_uploaded: u64,
    /// Payload bytes downloaded.
    pub bytes_downloaded: u64,
    /// Upload rate in bytes per second.
    pub upload_rate: u64,
    /// Download rate in bytes per second.
    pub download_rate: u64,
}

fn unsigned<T: TryFrom<i64> + Default>(value: impl Into<i64>) -> T {
    T::try_from(value.into()).unwrap_or_default()
}

impl From<NativeStatus> for TorrentStatus {
    fn from(raw: NativeStatus) -> Self {
        Self {
            state: TorrentState::from_code(raw.state),
            progress: raw.progress.clamp(0.0, 1.0),
            peers: unsigned(raw.peers),
            seeds: unsigned(raw.seeds),
            bytes_uploaded: unsigned(raw.bytes_uploaded),
            bytes_downloaded: unsigned(raw.bytes_downloaded),
            upload_rate: unsigned(raw.upload_rate),
            download_rate: unsigned(raw.download_rate),
        }
    }
}

/// Descriptive metadata of parsed torrent content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    /// Torrent name.
    pub name: String,
    /// Creating program, empty when absent.
    pub creator: String,
    /// Comment, empty when absent.
    pub comment: String,
    /// Number of files, pad files included.
    pub total_files: usize,
    /// Payload size in bytes.
    pub total_size: u64,
    /// Creation time, when recorded.
    pub creation_date: Option<DateTime<Utc>>,
    /// v1 (SHA-1) info-hash.
    pub info_hash_v1: Option<InfoHash>,
    /// v2 (SHA-256) info-hash as lower-case hex.
    pub info_hash_v2: Option<String>,
}

impl TorrentMetadata {
    /// Key used to route attach, detach and alerts.
    ///
    /// The v1 hash when present, otherwise the v2 digest truncated to 20 bytes.
    #[must_use]
    pub fn routing_key(&self) -> InfoHash {
        if let Some(v1) = self.info_hash_v1 {
            return v1;
        }
        let mut bytes = [0_u8; 20];
        if let Some(v2) = self.info_hash_v2.as_deref() {
            let mut full = [0_u8; 32];
            if hex::decode_to_slice(v2, &mut full).is_ok() {
                bytes.copy_from_slice(&full[..20]);
            }
        }
        InfoHash(bytes)
    }
}

impl From<NativeMetadata> for TorrentMetadata {
    fn from(raw: NativeMetadata) -> Self {
        let v1 = InfoHash(raw.info_hash_v1);
        let v2_present = raw.info_hash_v2.iter().any(|byte| *byte != 0);
        Self {
            name: raw.name,
            creator: raw.creator,
            comment: raw.comment,
            total_files: unsigned(raw.total_files),
            total_size: unsigned(raw.total_size),
            creation_date: timestamp(raw.creation_date),
            info_hash_v1: (!v1.is_zero()).then_some(v1),
            info_hash_v2: v2_present.then(|| hex::encode(raw.info_hash_v2)),
        }
    }
}

/// One file inside parsed torrent content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Position in the file list.
    pub index: usize,
    /// Byte offset in the concatenated payload.
    pub offset: u64,
    /// File name without directories.
    pub name: String,
    /// Path relative to the save directory unless `path_is_absolute`.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, when recorded.
    pub modified: Option<DateTime<Utc>>,
    /// Whether `path` is absolute.
    pub path_is_absolute: bool,
    /// Whether the entry is alignment padding.
    pub pad_file: bool,
}

impl From<NativeFile> for FileEntry {
    fn from(raw: NativeFile) -> Self {
        Self {
            index: unsigned(raw.index),
            offset: unsigned(raw.offset),
            name: raw.name,
            path: raw.path,
            size: unsigned(raw.size),
            modified: timestamp(raw.modified_time),
            path_is_absolute: raw.path_is_absolute,
            pad_file: raw.pad_file,
        }
    }
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    (seconds > 0)
        .then(|| DateTime::from_timestamp(seconds, 0))
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_displays_upper_case_and_parses_back() {
        let hash = InfoHash::from_bytes([0xab; 20]);
        let text = hash.to_string();
        assert_eq!(text, "AB".repeat(20));
        assert_eq!(text.to_lowercase().parse::<InfoHash>(), Ok(hash));
        assert!(InfoHash::from_bytes([0xFF; 20]).is_placeholder());
        assert_eq!(
            serde_json::to_string(&hash).expect("json"),
            format!("\"{text}\"")
        );
    }

    #[test]
    fn unknown_codes_are_preserved() {
        assert_eq!(TorrentState::from_code(0), TorrentState::Unknown(0));
        assert_eq!(TorrentState::from_code(42), TorrentState::Unknown(42));
        assert_eq!(TorrentState::from_alert_code(6), TorrentState::Finished);
        assert_eq!(PeerAlertKind::from_code(9), PeerAlertKind::Unknown(9));
        assert_eq!(PerformanceWarning::from_code(10), PerformanceWarning::TooFewFileDescriptors);
        assert_eq!(PerformanceWarning::from_code(11), PerformanceWarning::Unknown(11));
    }

    #[test]
    fn priorities_bucket_native_levels() {
        assert_eq!(FilePriority::from_native(0), FilePriority::Skip);
        assert_eq!(FilePriority::from_native(2), FilePriority::Low);
        assert_eq!(FilePriority::from_native(5), FilePriority::Normal);
        assert_eq!(FilePriority::from_native(7), FilePriority::High);
        assert_eq!(FilePriority::High.to_native(), 7);
    }

    #[test]
    fn v2_only_content_routes_by_truncated_digest() {
        let metadata = TorrentMetadata::from(NativeMetadata {
            name: "v2".into(),
            creator: String::new(),
            comment: String::new(),
            total_files: 1,
            total_size: 1,
            creation_date: 0,
            info_hash_v1: [0; 20],
            info_hash_v2: [0x11; 32],
        });

        assert!(metadata.info_hash_v1.is_none());
        assert!(metadata.creation_date.is_none());
        assert_eq!(metadata.routing_key(), InfoHash::from_bytes([0x11; 20]));
    }
}
