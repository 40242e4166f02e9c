use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::api::NativeApi;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wrap a raw value returned by the native surface; zero means failure.
            #[must_use]
            pub const fn from_raw(raw: usize) -> Option<Self> {
                match NonZeroUsize::new(raw) {
                    Some(value) => Some(Self(value)),
                    None => None,
                }
            }

            /// Pointer-sized value handed back to the native surface.
            #[must_use]
            pub const fn as_raw(self) -> usize {
                self.0.get()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0.get())
            }
        }
    };
}

native_handle!(
    /// Handle to a native engine session.
    SessionHandle
);
native_handle!(
    /// Handle to parsed .torrent content, independent of any session.
    DescriptorHandle
);
native_handle!(
    /// Handle to a torrent bound into a specific session.
    TorrentHandle
);
native_handle!(
    /// Handle to a native settings object.
    SettingsHandle
);

/// A torrent handle paired with the session that must detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachedTorrent {
    /// Session the torrent was attached to.
    pub session: SessionHandle,
    /// Torrent-session handle returned by the attach call.
    pub torrent: TorrentHandle,
}

/// Native resource with exactly one release call.
pub trait NativeResource: Copy + fmt::Debug + Send + Sync + 'static {
    /// Short label used in logs.
    const KIND: &'static str;

    /// Issue the native release call for this resource.
    fn release(self, api: &dyn NativeApi);
}

impl NativeResource for SessionHandle {
    const KIND: &'static str = "session";

    fn release(self, api: &dyn NativeApi) {
        api.destroy_session(self);
    }
}

impl NativeResource for DescriptorHandle {
    const KIND: &'static str = "descriptor";

    fn release(self, api: &dyn NativeApi) {
        api.destroy_torrent(self);
    }
}

impl NativeResource for SettingsHandle {
    const KIND: &'static str = "settings";

    fn release(self, api: &dyn NativeApi) {
        api.destroy_settings_pack(self);
    }
}

impl NativeResource for AttachedTorrent {
    const KIND: &'static str = "torrent";

    fn release(self, api: &dyn NativeApi) {
        api.detach_torrent(self.session, self.torrent);
    }
}

/// Single owner of a native resource.
///
/// The resource is released at most once: either through [`Owned::release`]
/// or when the guard is dropped. Callers that use the raw handle concurrently
/// with release must serialise the two themselves.
pub struct Owned<R: NativeResource> {
    api: Arc<dyn NativeApi>,
    resource: R,
    released: AtomicBool,
}

impl<R: NativeResource> Owned<R> {
    /// Take ownership of `resource`.
    #[must_use]
    pub fn new(api: Arc<dyn NativeApi>, resource: R) -> Self {
        Self {
            api,
            resource,
            released: AtomicBool::new(false),
        }
    }

    /// The resource, unless it has already been released.
    #[must_use]
    pub fn get(&self) -> Option<R> {
        (!self.released.load(Ordering::Acquire)).then_some(self.resource)
    }

    /// Whether the release call has been issued.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Native surface the resource belongs to.
    #[must_use]
    pub const fn api(&self) -> &Arc<dyn NativeApi> {
        &self.api
    }

    /// Release the resource; returns `false` when it was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!(kind = R::KIND, handle = ?self.resource, "releasing native handle");
        self.resource.release(self.api.as_ref());
        true
    }
}

impl<R: NativeResource> Drop for Owned<R> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

impl<R: NativeResource> fmt::Debug for Owned<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("resource", &self.resource)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubEngine;

    #[test]
    fn zero_is_never_a_handle() {
        assert!(SessionHandle::from_raw(0).is_none());
        assert!(TorrentHandle::from_raw(0).is_none());
        let handle = DescriptorHandle::from_raw(0x10).expect("non-zero handle");
        assert_eq!(handle.as_raw(), 0x10);
        assert_eq!(format!("{handle:?}"), "DescriptorHandle(0x10)");
    }

    #[test]
    fn release_happens_once() {
        let engine = Arc::new(StubEngine::default());
        let api: Arc<dyn NativeApi> = engine.clone();
        let pack = api.create_settings_pack().expect("settings pack");

        let owned = Owned::new(api, pack);
        assert_eq!(owned.get(), Some(pack));
        assert!(owned.release());
        assert!(!owned.release());
        assert!(owned.get().is_none());
        drop(owned);

        assert_eq!(engine.release_count(pack.as_raw()), 1);
        assert_eq!(engine.double_frees(), 0);
    }

    #[test]
    fn drop_releases_unreleased_guard() {
        let engine = Arc::new(StubEngine::default());
        let api: Arc<dyn NativeApi> = engine.clone();
        let pack = api.create_settings_pack().expect("settings pack");

        drop(Owned::new(api, pack));

        assert_eq!(engine.release_count(pack.as_raw()), 1);
        assert_eq!(engine.live_settings_packs(), 0);
    }
}
