//! Stub engine behaviour against real files.
#![cfg(any(feature = "stub", not(feature = "native")))]

use std::fs;
use std::path::PathBuf;

use tether_native::stub::{ManifestFile, TorrentManifest};
use tether_native::{NativeApi, StubEngine};

fn manifest() -> TorrentManifest {
    TorrentManifest {
        name: "disk".into(),
        creator: String::new(),
        comment: String::new(),
        creation_date: 0,
        files: vec![
            ManifestFile {
                path: PathBuf::from("disk/a.bin"),
                size: 128,
                pad: false,
                modified_time: 0,
            },
            ManifestFile {
                path: PathBuf::from("disk/.pad/0"),
                size: 16,
                pad: true,
                modified_time: 0,
            },
            ManifestFile {
                path: PathBuf::from("disk/b.bin"),
                size: 4096,
                pad: false,
                modified_time: 0,
            },
        ],
    }
}

#[test]
fn descriptor_from_file_matches_bytes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let bytes = manifest().to_bytes()?;
    let path = dir.path().join("disk.torrent");
    fs::write(&path, &bytes)?;

    let engine = StubEngine::default();
    let from_file = engine.create_torrent_from_file(&path).ok_or("file rejected")?;
    let from_bytes = engine
        .create_torrent_from_bytes(&bytes)
        .ok_or("bytes rejected")?;

    assert_eq!(
        engine.torrent_metadata(from_file),
        engine.torrent_metadata(from_bytes)
    );
    assert_eq!(
        engine.torrent_files(from_file),
        engine.torrent_files(from_bytes)
    );
    assert!(
        engine
            .create_torrent_from_file(&dir.path().join("missing.torrent"))
            .is_none()
    );

    engine.destroy_torrent(from_file);
    engine.destroy_torrent(from_bytes);
    assert_eq!(engine.live_descriptors(), 0);
    Ok(())
}

#[test]
fn advance_materialises_wanted_files_only() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = StubEngine::default();
    let session = engine.create_session(None).ok_or("session")?;
    let descriptor = engine
        .create_torrent_from_bytes(&manifest().to_bytes()?)
        .ok_or("descriptor")?;
    let torrent = engine
        .attach_torrent(session, descriptor, dir.path())
        .ok_or("attach")?;

    engine.set_file_priority(torrent, 2, 0);
    engine.start_torrent(torrent);
    assert_eq!(engine.advance()?, 1);

    let status = engine.torrent_status(torrent);
    assert_eq!(status.state, 6);
    assert!((status.progress - 1.0).abs() < f32::EPSILON);
    assert_eq!(fs::metadata(dir.path().join("disk/a.bin"))?.len(), 128);
    assert!(!dir.path().join("disk/b.bin").exists());
    assert!(!dir.path().join("disk/.pad/0").exists());

    engine.detach_torrent(session, torrent);
    engine.destroy_torrent(descriptor);
    engine.destroy_session(session);
    assert_eq!(engine.live_torrents(), 0);
    assert_eq!(engine.double_frees(), 0);
    assert_eq!(engine.invalid_calls(), 0);
    Ok(())
}
