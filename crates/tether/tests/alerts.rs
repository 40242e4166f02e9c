//! Alert subscription and routing against the stub engine.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;
use tether::{
    Alert, AlertCategories, AlertKind, AlertSubscription, PeerAlertKind, PerformanceWarning,
    SessionConfig, TetherError, TorrentAttachment, TorrentClient, TorrentState,
};
use tether_native::SessionHandle;
use tether_test_support::{StubEngine, init_test_logging, sample_manifest, stub_api};
use tokio::time::timeout;
use tokio_stream::StreamExt;

const WAIT: Duration = Duration::from_secs(1);

struct Harness {
    engine: Arc<StubEngine>,
    client: TorrentClient,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Result<Self> {
        init_test_logging();
        let (engine, api) = stub_api();
        let client = TorrentClient::new(api, &SessionConfig::default())?;
        let dir = tempfile::tempdir()?;
        client.session().set_default_download_path(dir.path());
        Ok(Self {
            engine,
            client,
            _dir: dir,
        })
    }

    fn session(&self) -> Result<SessionHandle> {
        self.client.session().native_handle().context("live session")
    }

    fn attach(&self, name: &str) -> Result<Arc<TorrentAttachment>> {
        let bytes = sample_manifest(name).to_bytes()?;
        let descriptor = self.client.load_descriptor_bytes(&bytes)?;
        Ok(self.client.attach(&descriptor, None)?)
    }
}

async fn next_alert(subscription: &mut AlertSubscription) -> Result<Alert> {
    timeout(WAIT, subscription.next())
        .await
        .context("timed out waiting for an alert")?
        .context("alert stream ended")
}

#[tokio::test]
async fn callback_is_registered_while_subscribed() -> Result<()> {
    let harness = Harness::new()?;
    let session = harness.session()?;
    assert!(!harness.engine.callback_registered(session));

    let first = harness.client.subscribe()?;
    let second = harness.client.subscribe()?;
    assert!(harness.engine.callback_registered(session));
    assert_eq!(harness.client.subscriber_count(), 2);

    drop(first);
    assert!(harness.engine.callback_registered(session));
    drop(second);
    assert!(!harness.engine.callback_registered(session));
    assert_eq!(harness.client.subscriber_count(), 0);
    Ok(())
}

#[tokio::test]
async fn state_changes_are_routed_to_the_attachment() -> Result<()> {
    let harness = Harness::new()?;
    let mut alerts = harness.client.subscribe()?;
    let attachment = harness.attach("status")?;
    attachment.start()?;
    harness.engine.advance()?;
    assert_eq!(harness.engine.deliver_pending(), 1);

    let Alert::TorrentStatus {
        info,
        subject,
        old_state,
        new_state,
    } = next_alert(&mut alerts).await?
    else {
        bail!("expected a status alert");
    };
    assert!(Arc::ptr_eq(&subject, &attachment));
    assert_eq!(info.kind, AlertKind::TorrentStatus);
    assert!(info.category.contains(AlertCategories::STATUS));
    assert_eq!(old_state, TorrentState::Downloading);
    assert_eq!(new_state, TorrentState::Finished);
    Ok(())
}

#[tokio::test]
async fn unmapped_alerts_follow_the_toggle() -> Result<()> {
    let harness = Harness::new()?;
    let session = harness.session()?;
    let mut alerts = harness.client.subscribe()?;

    assert!(harness.engine.emit_generic(session, 1, "dropped"));
    assert_eq!(harness.engine.deliver_pending(), 0);

    harness.client.set_include_unmapped(true)?;
    assert!(harness.client.include_unmapped());
    assert!(harness.engine.includes_unmapped(session));

    assert!(harness.engine.emit_generic(session, 1, "hello"));
    assert_eq!(harness.engine.deliver_pending(), 1);
    let Alert::Generic(info) = next_alert(&mut alerts).await? else {
        bail!("expected a generic alert");
    };
    assert_eq!(info.kind, AlertKind::Generic);
    assert_eq!(info.message, "hello");
    Ok(())
}

#[tokio::test]
async fn peer_and_performance_alerts_are_typed() -> Result<()> {
    let harness = Harness::new()?;
    let mut alerts = harness.client.subscribe()?;
    let attachment = harness.attach("peers")?;
    let torrent = attachment.native_handle().context("live handle")?;
    let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

    assert!(harness.engine.emit_peer(torrent, 1, peer));
    assert!(harness.engine.emit_performance_warning(harness.session()?, 2));
    assert_eq!(harness.engine.deliver_pending(), 2);

    let Alert::Peer {
        subject,
        kind,
        address,
        ..
    } = next_alert(&mut alerts).await?
    else {
        bail!("expected a peer alert");
    };
    assert!(Arc::ptr_eq(&subject, &attachment));
    assert_eq!(kind, PeerAlertKind::ConnectedOutgoing);
    assert_eq!(address, peer);

    let Alert::PerformanceWarning { warning, .. } = next_alert(&mut alerts).await? else {
        bail!("expected a performance warning");
    };
    assert_eq!(warning, PerformanceWarning::UploadLimitTooLow);
    Ok(())
}

#[tokio::test]
async fn engine_removal_detaches_exactly_once() -> Result<()> {
    let harness = Harness::new()?;
    let mut alerts = harness.client.subscribe()?;
    let attachment = harness.attach("removed")?;
    let torrent = attachment.native_handle().context("live handle")?;

    assert!(harness.engine.remove_externally(torrent));
    assert_eq!(harness.engine.deliver_pending(), 1);

    let Alert::TorrentRemoved { subject, .. } = next_alert(&mut alerts).await? else {
        bail!("expected a removal alert");
    };
    assert!(Arc::ptr_eq(&subject, &attachment));
    assert!(attachment.is_detached());
    assert!(harness.client.active_torrents().is_empty());
    assert!(matches!(
        attachment.current_status(),
        Err(TetherError::Disposed { .. })
    ));
    assert!(matches!(
        harness.client.detach(&attachment),
        Err(TetherError::NotAttached { .. })
    ));

    assert_eq!(harness.engine.release_count(torrent.as_raw()), 1);
    assert_eq!(harness.engine.double_frees(), 0);
    Ok(())
}

#[tokio::test]
async fn explicit_detach_is_confirmed_with_its_subject() -> Result<()> {
    let harness = Harness::new()?;
    let mut alerts = harness.client.subscribe()?;
    let attachment = harness.attach("confirmed")?;

    harness.client.detach(&attachment)?;
    assert!(attachment.is_detached());
    assert_eq!(harness.engine.deliver_pending(), 1);

    let Alert::TorrentRemoved { subject, .. } = next_alert(&mut alerts).await? else {
        bail!("expected a removal alert");
    };
    assert!(Arc::ptr_eq(&subject, &attachment));
    assert_eq!(harness.engine.double_frees(), 0);
    Ok(())
}

#[tokio::test]
async fn repeated_detach_confirmations_keep_their_subjects() -> Result<()> {
    let harness = Harness::new()?;
    let mut alerts = harness.client.subscribe()?;
    let first = harness.attach("dup")?;
    harness.client.detach(&first)?;
    let second = harness.attach("dup")?;
    harness.client.detach(&second)?;

    assert_eq!(harness.engine.deliver_pending(), 2);
    let Alert::TorrentRemoved { subject, .. } = next_alert(&mut alerts).await? else {
        bail!("expected the first removal");
    };
    assert!(Arc::ptr_eq(&subject, &first));
    let Alert::TorrentRemoved { subject, .. } = next_alert(&mut alerts).await? else {
        bail!("expected the second removal");
    };
    assert!(Arc::ptr_eq(&subject, &second));

    assert!(harness.client.active_torrents().is_empty());
    assert_eq!(harness.engine.double_frees(), 0);
    Ok(())
}

#[tokio::test]
async fn reattaching_after_removal_routes_to_the_new_attachment() -> Result<()> {
    let harness = Harness::new()?;
    let mut alerts = harness.client.subscribe()?;
    let first = harness.attach("again")?;
    harness.client.detach(&first)?;
    assert_eq!(harness.engine.deliver_pending(), 1);
    next_alert(&mut alerts).await?;

    let second = harness.attach("again")?;
    let torrent = second.native_handle().context("live handle")?;
    assert!(
        harness
            .engine
            .emit_peer(torrent, 2, IpAddr::V4(Ipv4Addr::LOCALHOST))
    );
    assert_eq!(harness.engine.deliver_pending(), 1);

    let Alert::Peer { subject, kind, .. } = next_alert(&mut alerts).await? else {
        bail!("expected a peer alert");
    };
    assert!(Arc::ptr_eq(&subject, &second));
    assert!(!Arc::ptr_eq(&subject, &first));
    assert_eq!(kind, PeerAlertKind::Disconnected);
    Ok(())
}

#[tokio::test]
async fn dispose_stops_alert_delivery() -> Result<()> {
    let harness = Harness::new()?;
    let alerts = harness.client.subscribe()?;
    let session = harness.session()?;
    harness.attach("quiet")?;

    harness.client.dispose();
    assert!(!harness.engine.callback_registered(session));
    assert_eq!(harness.engine.deliver_pending(), 0);

    drop(alerts);
    assert_eq!(harness.engine.live_torrents(), 0);
    assert_eq!(harness.engine.double_frees(), 0);
    Ok(())
}
