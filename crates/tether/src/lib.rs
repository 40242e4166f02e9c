#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Safe client for a native torrent engine.
//!
//! Layout: `descriptor.rs` (parsed torrent content), `session.rs` (session
//! and attachment registry), `attachment.rs` (per-torrent operations),
//! `alerts/` (typed alerts, routing and the broadcast bus), `client.rs`
//! (`TorrentClient` facade), `types.rs` (hashes, states and snapshots).

pub mod alerts;
pub mod attachment;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod session;
pub mod types;

pub use alerts::{Alert, AlertBus, AlertInfo, AlertKind};
pub use attachment::{AttachmentFile, Lifecycle, TorrentAttachment};
pub use client::{AlertSubscription, TorrentClient};
pub use descriptor::TorrentDescriptor;
pub use error::{TetherError, TetherResult};
pub use session::Session;
pub use types::{
    FileEntry, FilePriority, InfoHash, PeerAlertKind, PerformanceWarning, TorrentMetadata,
    TorrentState, TorrentStatus,
};

pub use tether_config::{
    AlertCategories, ListenFlags, ListenInterface, SessionConfig, SettingsError, SettingsPack,
};
pub use tether_native::{NativeApi, default_api};
