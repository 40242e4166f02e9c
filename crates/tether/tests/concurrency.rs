//! Cross-thread use of one client against the stub engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tether::{SessionConfig, TetherError, TorrentAttachment, TorrentClient};
use tether_test_support::{StubEngine, init_test_logging, sample_manifest, stub_api};

const ROUNDS: usize = 32;
const THREADS: usize = 8;

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

    fn attach(&self, name: &str) -> Result<Arc<TorrentAttachment>> {
        let bytes = sample_manifest(name).to_bytes()?;
        let descriptor = self.client.load_descriptor_bytes(&bytes)?;
        Ok(self.client.attach(&descriptor, None)?)
    }
}

#[test]
fn detach_racing_engine_removal_releases_once() -> Result<()> {
    let harness = Harness::new()?;
    let _alerts = harness.client.subscribe()?;

    for round in 0..ROUNDS {
        let attachment = harness.attach(&format!("race-{round}"))?;
        let torrent = attachment.native_handle().context("live handle")?;

        thread::scope(|scope| {
            scope.spawn(|| match harness.client.detach(&attachment) {
                Ok(()) | Err(TetherError::NotAttached { .. }) => {}
                Err(other) => panic!("unexpected detach error: {other}"),
            });
            scope.spawn(|| {
                harness.engine.remove_externally(torrent);
                harness.engine.deliver_pending();
            });
        });
        harness.engine.deliver_pending();

        assert_eq!(harness.engine.release_count(torrent.as_raw()), 1, "round {round}");
        assert!(attachment.is_detached(), "round {round}");
        assert!(harness.client.active_torrents().is_empty(), "round {round}");
    }
    assert_eq!(harness.engine.double_frees(), 0);
    Ok(())
}

#[test]
fn concurrent_subscriptions_settle_to_zero() -> Result<()> {
    let harness = Harness::new()?;
    let session = harness
        .client
        .session()
        .native_handle()
        .context("live session")?;

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    let subscription = harness.client.subscribe();
                    assert!(subscription.is_ok());
                    drop(subscription);
                }
            });
        }
    });

    assert_eq!(harness.client.subscriber_count(), 0);
    assert!(!harness.engine.callback_registered(session));
    Ok(())
}

#[test]
fn dispose_while_alerts_are_delivered() -> Result<()> {
    let harness = Harness::new()?;
    let _alerts = harness.client.subscribe()?;
    let session = harness
        .client
        .session()
        .native_handle()
        .context("live session")?;
    for round in 0..4 {
        harness.attach(&format!("busy-{round}"))?;
    }
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                harness.engine.emit_performance_warning(session, 2);
                harness.engine.deliver_pending();
            }
        });
        scope.spawn(|| {
            harness.client.dispose();
            done.store(true, Ordering::Release);
        });
    });
    harness.engine.deliver_pending();

    assert!(harness.client.session().is_disposed());
    assert_eq!(harness.engine.live_sessions(), 0);
    assert_eq!(harness.engine.live_torrents(), 0);
    assert_eq!(harness.engine.double_frees(), 0);
    Ok(())
}
