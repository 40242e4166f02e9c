//! Descriptor fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tether_native::stub::{ManifestFile, TorrentManifest};

/// Files larger than this are the "large" entries tests usually skip.
pub const LARGE_FILE_THRESHOLD: i64 = 10 * 1024 * 1024;

/// Three-file torrent: two small files and one above [`LARGE_FILE_THRESHOLD`].
#[must_use]
pub fn sample_manifest(name: &str) -> TorrentManifest {
    TorrentManifest {
        name: name.to_string(),
        creator: "tether-test-support".to_string(),
        comment: "fixture".to_string(),
        creation_date: 1_700_000_000,
        files: vec![
            ManifestFile {
                path: PathBuf::from(name).join("readme.txt"),
                size: 1_024,
                pad: false,
                modified_time: 1_700_000_000,
            },
            ManifestFile {
                path: PathBuf::from(name).join("data").join("small.bin"),
                size: 64 * 1024,
                pad: false,
                modified_time: 1_700_000_100,
            },
            ManifestFile {
                path: PathBuf::from(name).join("data").join("large.bin"),
                size: 24 * 1024 * 1024,
                pad: false,
                modified_time: 1_700_000_200,
            },
        ],
    }
}

/// Serialise `manifest` to `<dir>/<name>.torrent`.
///
/// # Errors
/// Fails when the manifest cannot be serialised or the file cannot be written.
pub fn write_manifest(dir: &Path, manifest: &TorrentManifest) -> Result<PathBuf> {
    let bytes = manifest.to_bytes().context("serialising manifest")?;
    let path = dir.join(format!("{}.torrent", manifest.name));
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_has_exactly_one_large_file() {
        let manifest = sample_manifest("fixture");
        let large = manifest
            .files
            .iter()
            .filter(|file| file.size > LARGE_FILE_THRESHOLD)
            .count();
        assert_eq!(manifest.files.len(), 3);
        assert_eq!(large, 1);
    }

    #[test]
    fn written_manifest_reads_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let manifest = sample_manifest("roundtrip");
        let path = write_manifest(dir.path(), &manifest)?;
        assert_eq!(fs::read(path)?, manifest.to_bytes()?);
        Ok(())
    }
}
