#![forbid(unsafe_code)]
#![deny(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (descriptor manifests on disk), engine.rs (stub engine wiring).

pub mod engine;
pub mod fixtures;

pub use engine::{init_test_logging, stub_api};
pub use fixtures::{LARGE_FILE_THRESHOLD, sample_manifest, write_manifest};
pub use tether_native::StubEngine;
pub use tether_native::stub::{ManifestFile, StubSetting, TorrentManifest};
