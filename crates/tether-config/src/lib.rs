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

//! Typed engine settings staged in Rust and flushed to native settings objects.
//!
//! Layout: `pack.rs` (`SettingsPack` and typed values), `listen.rs`
//! (listen interface rendering), `categories.rs` (alert category bitmask),
//! `session.rs` (`SessionConfig`), `error.rs` (`SettingsError`).

pub mod categories;
pub mod error;
pub mod listen;
pub mod pack;
pub mod session;

pub use categories::AlertCategories;
pub use error::{SettingsError, SettingsResult};
pub use listen::{ListenFlags, ListenInterface};
pub use pack::{FromSettingValue, SettingValue, SettingsPack, ValueKind};
pub use session::SessionConfig;
