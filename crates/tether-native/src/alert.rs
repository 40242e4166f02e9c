use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

use crate::raw::{
    RawAlert, RawPeerAlert, RawPerformanceAlert, RawTorrentRemovedAlert, RawTorrentStatusAlert,
    c_string,
};

/// Discriminator leading every alert buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeAlertKind {
    /// Any alert without a dedicated layout.
    Generic,
    /// Torrent state transition.
    TorrentStatus,
    /// Session performance warning.
    PerformanceWarning,
    /// Peer lifecycle event.
    Peer,
    /// Torrent removed from its session.
    TorrentRemoved,
}

impl NativeAlertKind {
    /// Map a wire discriminator; unknown values yield `None`.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Generic),
            1 => Some(Self::TorrentStatus),
            2 => Some(Self::PerformanceWarning),
            3 => Some(Self::Peer),
            4 => Some(Self::TorrentRemoved),
            _ => None,
        }
    }

    /// Wire discriminator.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Generic => 0,
            Self::TorrentStatus => 1,
            Self::PerformanceWarning => 2,
            Self::Peer => 3,
            Self::TorrentRemoved => 4,
        }
    }
}

/// Header fields copied out of an alert buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAlertHeader {
    /// Alert kind.
    pub kind: NativeAlertKind,
    /// Category bitmask.
    pub category: u32,
    /// Seconds since the Unix epoch.
    pub epoch: i64,
    /// Engine message.
    pub message: String,
}

/// Owned copy of one alert buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeAlert {
    /// Header only.
    Generic(NativeAlertHeader),
    /// State transition of the torrent identified by `info_hash`.
    TorrentStatus {
        /// Header.
        header: NativeAlertHeader,
        /// Previous state code.
        old_state: u32,
        /// New state code.
        new_state: u32,
        /// Subject v1 info-hash.
        info_hash: [u8; 20],
    },
    /// Performance warning.
    PerformanceWarning {
        /// Header.
        header: NativeAlertHeader,
        /// Warning code.
        warning_code: u8,
    },
    /// Peer event on the torrent identified by `info_hash`.
    Peer {
        /// Header.
        header: NativeAlertHeader,
        /// Peer event code.
        peer_event: u8,
        /// Subject v1 info-hash.
        info_hash: [u8; 20],
        /// Peer address in IPv6 form.
        address: [u8; 16],
    },
    /// The torrent identified by `info_hash` left its session.
    TorrentRemoved {
        /// Header.
        header: NativeAlertHeader,
        /// Subject v1 info-hash.
        info_hash: [u8; 20],
    },
}

impl NativeAlert {
    /// Header shared by every variant.
    #[must_use]
    pub const fn header(&self) -> &NativeAlertHeader {
        match self {
            Self::Generic(header)
            | Self::TorrentStatus { header, .. }
            | Self::PerformanceWarning { header, .. }
            | Self::Peer { header, .. }
            | Self::TorrentRemoved { header, .. } => header,
        }
    }
}

/// Receiver of decoded alerts, invoked on engine threads.
///
/// Implementations must not block and must tolerate being called concurrently
/// with client operations.
pub trait AlertSink: Send + Sync {
    /// Handle one decoded alert.
    fn on_alert(&self, alert: NativeAlert);
}

/// Decode an alert buffer into owned data.
///
/// Returns `None` for null buffers and unknown discriminators.
///
/// # Safety
/// `buffer` must be null or point to a buffer laid out as the header's kind
/// describes, valid for the duration of the call.
#[must_use]
pub unsafe fn decode(buffer: *const c_void) -> Option<NativeAlert> {
    if buffer.is_null() {
        return None;
    }
    // SAFETY: every layout starts with `RawAlert`.
    let raw = unsafe { &*buffer.cast::<RawAlert>() };
    let Some(kind) = NativeAlertKind::from_code(raw.kind) else {
        debug!(kind = raw.kind, "dropping alert with unknown kind");
        return None;
    };
    let header = NativeAlertHeader {
        kind,
        category: raw.category.cast_unsigned(),
        epoch: raw.epoch,
        // SAFETY: message is valid for the callback.
        message: unsafe { c_string(raw.message) },
    };

    // SAFETY: the discriminator selects the concrete layout.
    let alert = unsafe {
        match kind {
            NativeAlertKind::Generic => NativeAlert::Generic(header),
            NativeAlertKind::TorrentStatus => {
                let raw = &*buffer.cast::<RawTorrentStatusAlert>();
                NativeAlert::TorrentStatus {
                    header,
                    old_state: raw.old_state,
                    new_state: raw.new_state,
                    info_hash: raw.info_hash,
                }
            }
            NativeAlertKind::PerformanceWarning => {
                let raw = &*buffer.cast::<RawPerformanceAlert>();
                NativeAlert::PerformanceWarning {
                    header,
                    warning_code: raw.warning_type,
                }
            }
            NativeAlertKind::Peer => {
                let raw = &*buffer.cast::<RawPeerAlert>();
                NativeAlert::Peer {
                    header,
                    peer_event: raw.peer_event,
                    info_hash: raw.info_hash,
                    address: raw.address,
                }
            }
            NativeAlertKind::TorrentRemoved => {
                let raw = &*buffer.cast::<RawTorrentRemovedAlert>();
                NativeAlert::TorrentRemoved {
                    header,
                    info_hash: raw.info_hash,
                }
            }
        }
    };
    Some(alert)
}

/// Decode `buffer` and hand it to `sink`; nothing unwinds out of this call.
///
/// Returns whether an alert reached the sink.
///
/// # Safety
/// Same contract as [`decode`].
pub unsafe fn dispatch(buffer: *const c_void, sink: &dyn AlertSink) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: forwarded from the caller.
        let Some(alert) = (unsafe { decode(buffer) }) else {
            return false;
        };
        sink.on_alert(alert);
        true
    }));
    outcome.unwrap_or_else(|_| {
        warn!("alert sink panicked; alert dropped");
        false
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<NativeAlert>>);

    impl AlertSink for Recorder {
        fn on_alert(&self, alert: NativeAlert) {
            self.0.lock().expect("recorder").push(alert);
        }
    }

    struct Exploding;

    impl AlertSink for Exploding {
        fn on_alert(&self, _alert: NativeAlert) {
            panic!("sink failure");
        }
    }

    fn header(kind: i32, message: &CString) -> RawAlert {
        RawAlert {
            kind,
            category: 1 << 6,
            epoch: 1_700_000_000,
            message: message.as_ptr(),
        }
    }

    #[test]
    fn status_alerts_decode_their_payload() {
        let message = CString::new("state changed").expect("cstring");
        let raw = RawTorrentStatusAlert {
            alert: header(1, &message),
            old_state: 4,
            new_state: 6,
            info_hash: [0xAB; 20],
        };

        // SAFETY: `raw` and its message outlive the call.
        let alert = unsafe { decode((&raw const raw).cast()) }.expect("decoded");
        match alert {
            NativeAlert::TorrentStatus {
                header,
                old_state,
                new_state,
                info_hash,
            } => {
                assert_eq!(header.kind, NativeAlertKind::TorrentStatus);
                assert_eq!(header.category, 1 << 6);
                assert_eq!(header.message, "state changed");
                assert_eq!((old_state, new_state), (4, 6));
                assert_eq!(info_hash, [0xAB; 20]);
            }
            other => panic!("unexpected alert {other:?}"),
        }
    }

    #[test]
    fn unknown_kinds_and_null_buffers_are_dropped() {
        let message = CString::new("mystery").expect("cstring");
        let raw = header(42, &message);
        let sink = Recorder::default();

        // SAFETY: `raw` outlives the call; null is allowed.
        unsafe {
            assert!(!dispatch((&raw const raw).cast(), &sink));
            assert!(!dispatch(std::ptr::null(), &sink));
        }
        assert!(sink.0.lock().expect("recorder").is_empty());
    }

    #[test]
    fn sink_panics_do_not_escape() {
        let message = CString::new("generic").expect("cstring");
        let raw = header(0, &message);

        // SAFETY: `raw` outlives the call.
        let delivered = unsafe { dispatch((&raw const raw).cast(), &Exploding) };
        assert!(!delivered);
    }
}
