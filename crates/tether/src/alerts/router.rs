//! Native alert sink: resolves subjects and republishes typed alerts.

use std::net::Ipv6Addr;
use std::sync::Weak;

use tether_native::{AlertSink, NativeAlert};
use tracing::debug;

use super::{Alert, AlertBus, AlertInfo};
use crate::session::SessionShared;
use crate::types::{InfoHash, PeerAlertKind, PerformanceWarning, TorrentState};

/// Sink registered with the engine for one session.
pub(crate) struct AlertRouter {
    session: Weak<SessionShared>,
    bus: AlertBus,
}

impl AlertRouter {
    pub(crate) const fn new(session: Weak<SessionShared>, bus: AlertBus) -> Self {
        Self { session, bus }
    }

    fn translate(shared: &SessionShared, alert: NativeAlert) -> Option<Alert> {
        let resolved = match alert {
            NativeAlert::Generic(header) => Alert::Generic(header.into()),
            NativeAlert::PerformanceWarning {
                header,
                warning_code,
            } => Alert::PerformanceWarning {
                info: header.into(),
                warning: PerformanceWarning::from_code(warning_code),
            },
            NativeAlert::TorrentStatus {
                header,
                old_state,
                new_state,
                info_hash,
            } => Alert::TorrentStatus {
                subject: shared.lookup(&routable(info_hash)?)?,
                info: header.into(),
                old_state: TorrentState::from_alert_code(old_state),
                new_state: TorrentState::from_alert_code(new_state),
            },
            NativeAlert::Peer {
                header,
                peer_event,
                info_hash,
                address,
            } => Alert::Peer {
                subject: shared.lookup(&routable(info_hash)?)?,
                info: AlertInfo::from(header),
                kind: PeerAlertKind::from_code(peer_event),
                address: Ipv6Addr::from(address).to_canonical(),
            },
            NativeAlert::TorrentRemoved { header, info_hash } => Alert::TorrentRemoved {
                subject: shared.take_removed(&routable(info_hash)?)?,
                info: header.into(),
            },
        };
        Some(resolved)
    }
}

fn routable(bytes: [u8; 20]) -> Option<InfoHash> {
    let key = InfoHash::from_bytes(bytes);
    (!key.is_placeholder()).then_some(key)
}

impl AlertSink for AlertRouter {
    fn on_alert(&self, alert: NativeAlert) {
        let Some(shared) = self.session.upgrade() else {
            debug!("alert arrived after the session was dropped");
            return;
        };
        let Some(_live) = shared.try_live() else {
            debug!("alert arrived while the session was being disposed");
            return;
        };
        let kind = alert.header().kind;
        match Self::translate(&shared, alert) {
            Some(alert) => {
                let receivers = self.bus.publish(alert);
                debug!(?kind, receivers, "alert published");
            }
            None => debug!(?kind, "alert subject not attached; dropped"),
        }
    }
}
