#![deny(unsafe_code)]
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

//! Native call surface of the torrent engine shim.
//!
//! Layout: `handle.rs` (typed handles and the `Owned` release guard), `api.rs`
//! (the `NativeApi` trait and owned records), `raw.rs` (C wire structs),
//! `alert.rs` (alert buffer decoding and sinks), `ffi.rs` (the `extern "C"`
//! binding, behind the `native` feature), `sinks.rs` (callback registrations)
//! and `stub.rs` (in-memory engine, built without `native` or with `stub`).

/// Alert buffer decoding and dispatch into Rust sinks.
#[allow(unsafe_code)]
pub mod alert;
/// Trait describing every native call and the records it returns.
pub mod api;
/// Binding to the compiled engine shim.
#[cfg(feature = "native")]
#[allow(unsafe_code)]
pub mod ffi;
/// Typed handles and single-owner release.
pub mod handle;
/// `#[repr(C)]` layouts shared with the engine shim.
#[allow(unsafe_code)]
pub mod raw;
#[cfg(any(test, feature = "native"))]
mod sinks;
/// In-memory engine used by tests and builds without the native shim.
#[cfg(any(test, feature = "stub", not(feature = "native")))]
#[allow(unsafe_code)]
pub mod stub;

use std::sync::Arc;

pub use alert::{AlertSink, NativeAlert, NativeAlertHeader, NativeAlertKind};
pub use api::{NativeApi, NativeFile, NativeMetadata, NativeStatus};
pub use handle::{
    AttachedTorrent, DescriptorHandle, NativeResource, Owned, SessionHandle, SettingsHandle,
    TorrentHandle,
};
#[cfg(any(test, feature = "stub", not(feature = "native")))]
pub use stub::StubEngine;

/// Construct the default native surface for this build.
///
/// With the `native` feature this is the linked engine shim; otherwise an
/// in-memory [`StubEngine`].
#[must_use]
pub fn default_api() -> Arc<dyn NativeApi> {
    #[cfg(feature = "native")]
    {
        Arc::new(ffi::FfiApi::default())
    }

    #[cfg(not(feature = "native"))]
    {
        Arc::new(StubEngine::default())
    }
}
