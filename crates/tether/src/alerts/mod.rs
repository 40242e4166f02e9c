//! Typed alerts and their delivery pipeline.
//!
//! Layout: `bus.rs` (broadcast fan-out to subscribers), `router.rs` (native
//! sink that resolves subjects and publishes).

mod bus;
mod router;

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tether_config::AlertCategories;
use tether_native::NativeAlertHeader;
use tracing::debug;

pub use bus::{AlertBus, AlertStream, DEFAULT_ALERT_CAPACITY};
pub(crate) use router::AlertRouter;
pub use tether_native::NativeAlertKind as AlertKind;

use crate::attachment::TorrentAttachment;
use crate::types::{PeerAlertKind, PerformanceWarning, TorrentState};

/// Fields every alert carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertInfo {
    /// Alert kind.
    pub kind: AlertKind,
    /// Categories the engine filed the alert under.
    pub category: AlertCategories,
    /// When the engine raised the alert.
    pub timestamp: DateTime<Utc>,
    /// Human-readable engine message.
    pub message: String,
}

impl From<NativeAlertHeader> for AlertInfo {
    fn from(header: NativeAlertHeader) -> Self {
        Self {
            kind: header.kind,
            category: AlertCategories::from_bits(header.category),
            timestamp: DateTime::from_timestamp(header.epoch, 0).unwrap_or_else(|| {
                debug!(epoch = header.epoch, "alert epoch out of range; using the Unix epoch");
                DateTime::<Utc>::UNIX_EPOCH
            }),
            message: header.message,
        }
    }
}

/// Alert delivered to subscribers.
#[derive(Debug, Clone)]
pub enum Alert {
    /// An alert without a dedicated payload.
    Generic(AlertInfo),
    /// A torrent changed state.
    TorrentStatus {
        /// Common fields.
        info: AlertInfo,
        /// Torrent that changed.
        subject: Arc<TorrentAttachment>,
        /// State before the change.
        old_state: TorrentState,
        /// State after the change.
        new_state: TorrentState,
    },
    /// The engine reported a performance problem.
    PerformanceWarning {
        /// Common fields.
        info: AlertInfo,
        /// Reported problem.
        warning: PerformanceWarning,
    },
    /// A peer event on a torrent.
    Peer {
        /// Common fields.
        info: AlertInfo,
        /// Torrent the peer belongs to.
        subject: Arc<TorrentAttachment>,
        /// What happened.
        kind: PeerAlertKind,
        /// Peer address; IPv4-mapped addresses are unmapped.
        address: IpAddr,
    },
    /// A torrent left the session.
    TorrentRemoved {
        /// Common fields.
        info: AlertInfo,
        /// Torrent that was removed; already detached.
        subject: Arc<TorrentAttachment>,
    },
}

impl Alert {
    /// Common fields.
    #[must_use]
    pub const fn info(&self) -> &AlertInfo {
        match self {
            Self::Generic(info)
            | Self::TorrentStatus { info, .. }
            | Self::PerformanceWarning { info, .. }
            | Self::Peer { info, .. }
            | Self::TorrentRemoved { info, .. } => info,
        }
    }

    /// Alert kind.
    #[must_use]
    pub const fn kind(&self) -> AlertKind {
        self.info().kind
    }

    /// Torrent the alert is about, for subject-bearing kinds.
    #[must_use]
    pub const fn subject(&self) -> Option<&Arc<TorrentAttachment>> {
        match self {
            Self::TorrentStatus { subject, .. }
            | Self::Peer { subject, .. }
            | Self::TorrentRemoved { subject, .. } => Some(subject),
            Self::Generic(_) | Self::PerformanceWarning { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(epoch: i64) -> NativeAlertHeader {
        NativeAlertHeader {
            kind: AlertKind::Generic,
            category: AlertCategories::STATUS.bits(),
            epoch,
            message: "tick".into(),
        }
    }

    #[test]
    fn header_epoch_becomes_the_timestamp() {
        let info = AlertInfo::from(header(1_700_000_000));
        assert_eq!(info.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(info.category, AlertCategories::STATUS);
    }

    #[test]
    fn out_of_range_epoch_maps_to_the_unix_epoch() {
        let info = AlertInfo::from(header(i64::MAX));
        assert_eq!(info.timestamp, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(info.message, "tick");
    }
}
