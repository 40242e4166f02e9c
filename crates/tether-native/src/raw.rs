//! C layouts exchanged with the engine shim. Every struct is 8-byte aligned on
//! the native side, mirrored here with `align(8)`.

use std::ffi::{CStr, c_char, c_void};
use std::path::PathBuf;

use crate::api::{NativeFile, NativeMetadata, NativeStatus};

/// Parsed descriptor metadata as returned by `get_torrent_info`.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawTorrentMetadata {
    /// Nul-terminated torrent name.
    pub name: *const c_char,
    /// Nul-terminated creator string.
    pub creator: *const c_char,
    /// Nul-terminated comment.
    pub comment: *const c_char,
    /// File count.
    pub total_files: i32,
    /// Payload size in bytes.
    pub total_size: i64,
    /// Creation time (`time_t`).
    pub creation_date: i64,
    /// SHA-1 info-hash.
    pub info_hash_v1: [u8; 20],
    /// SHA-256 info-hash.
    pub info_hash_v2: [u8; 32],
}

/// One entry of a native file list.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawFileInformation {
    /// File index.
    pub index: i32,
    /// Payload offset.
    pub offset: i64,
    /// Size in bytes.
    pub file_size: i64,
    /// Modification time (`time_t`).
    pub modified_time: i64,
    /// Nul-terminated file name.
    pub file_name: *const c_char,
    /// Nul-terminated file path.
    pub file_path: *const c_char,
    /// Path is absolute.
    pub file_path_is_absolute: bool,
    /// Entry is padding.
    pub pad_file: bool,
}

/// File list filled by `get_torrent_file_list`.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawFileList {
    /// Number of entries behind `files`.
    pub length: i32,
    /// First entry.
    pub files: *mut RawFileInformation,
}

impl Default for RawFileList {
    fn default() -> Self {
        Self {
            length: 0,
            files: std::ptr::null_mut(),
        }
    }
}

/// Status record filled by `get_torrent_status`.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTorrentStatus {
    /// State code.
    pub state: i32,
    /// Completion ratio.
    pub progress: f32,
    /// Connected peers.
    pub count_peers: i32,
    /// Connected seeds.
    pub count_seeds: i32,
    /// Bytes uploaded.
    pub bytes_uploaded: i64,
    /// Bytes downloaded.
    pub bytes_downloaded: i64,
    /// Upload rate.
    pub upload_rate: i64,
    /// Download rate.
    pub download_rate: i64,
}

impl From<RawTorrentStatus> for NativeStatus {
    fn from(raw: RawTorrentStatus) -> Self {
        Self {
            state: raw.state,
            progress: raw.progress,
            peers: raw.count_peers,
            seeds: raw.count_seeds,
            bytes_uploaded: raw.bytes_uploaded,
            bytes_downloaded: raw.bytes_downloaded,
            upload_rate: raw.upload_rate,
            download_rate: raw.download_rate,
        }
    }
}

/// Header shared by every alert buffer.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawAlert {
    /// Alert kind discriminator.
    pub kind: i32,
    /// Category bitmask.
    pub category: i32,
    /// Seconds since the Unix epoch.
    pub epoch: i64,
    /// Nul-terminated message, valid for the callback only.
    pub message: *const c_char,
}

/// Torrent state transition.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawTorrentStatusAlert {
    /// Common header.
    pub alert: RawAlert,
    /// Previous state code.
    pub old_state: u32,
    /// New state code.
    pub new_state: u32,
    /// Subject v1 info-hash, `0xFF`-filled when unavailable.
    pub info_hash: [u8; 20],
}

/// Torrent removed from its session.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawTorrentRemovedAlert {
    /// Common header.
    pub alert: RawAlert,
    /// Subject v1 info-hash.
    pub info_hash: [u8; 20],
}

/// Session performance warning.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawPerformanceAlert {
    /// Common header.
    pub alert: RawAlert,
    /// Warning code.
    pub warning_type: u8,
}

/// Peer lifecycle event.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy)]
pub struct RawPeerAlert {
    /// Common header.
    pub alert: RawAlert,
    /// Engine-internal torrent handle; never dereferenced on this side.
    pub handle: *mut c_void,
    /// Peer event code.
    pub peer_event: u8,
    /// Subject v1 info-hash.
    pub info_hash: [u8; 20],
    /// Peer address, IPv4 addresses mapped into IPv6.
    pub address: [u8; 16],
}

/// Copy a nul-terminated string, replacing invalid UTF-8; null yields an empty string.
///
/// # Safety
/// `ptr` must be null or point to a nul-terminated string valid for the call.
#[must_use]
pub unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: caller guarantees a valid nul-terminated string.
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

/// Copy a metadata record into owned Rust data.
///
/// # Safety
/// String pointers inside `raw` must satisfy [`c_string`].
#[must_use]
pub unsafe fn metadata_from_raw(raw: &RawTorrentMetadata) -> NativeMetadata {
    // SAFETY: forwarded from the caller.
    unsafe {
        NativeMetadata {
            name: c_string(raw.name),
            creator: c_string(raw.creator),
            comment: c_string(raw.comment),
            total_files: raw.total_files,
            total_size: raw.total_size,
            creation_date: raw.creation_date,
            info_hash_v1: raw.info_hash_v1,
            info_hash_v2: raw.info_hash_v2,
        }
    }
}

/// Copy a native file list into owned Rust data.
///
/// # Safety
/// `list.files` must be null or point to `list.length` initialised entries
/// whose string pointers satisfy [`c_string`].
#[must_use]
pub unsafe fn files_from_raw(list: &RawFileList) -> Vec<NativeFile> {
    let Ok(length) = usize::try_from(list.length) else {
        return Vec::new();
    };
    if list.files.is_null() || length == 0 {
        return Vec::new();
    }
    // SAFETY: caller guarantees `length` initialised entries.
    let entries = unsafe { std::slice::from_raw_parts(list.files, length) };
    entries
        .iter()
        .map(|entry| {
            // SAFETY: forwarded from the caller.
            let (name, path) = unsafe { (c_string(entry.file_name), c_string(entry.file_path)) };
            NativeFile {
                index: entry.index,
                offset: entry.offset,
                size: entry.file_size,
                modified_time: entry.modified_time,
                name,
                path: PathBuf::from(path),
                path_is_absolute: entry.file_path_is_absolute,
                pad_file: entry.pad_file,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::mem::{align_of, offset_of};

    use super::*;

    #[test]
    fn alert_layouts_match_the_shim() {
        assert_eq!(align_of::<RawAlert>(), 8);
        assert_eq!(offset_of!(RawAlert, epoch), 8);
        assert_eq!(offset_of!(RawAlert, message), 16);
        assert_eq!(offset_of!(RawTorrentStatusAlert, old_state), 24);
        assert_eq!(offset_of!(RawTorrentStatusAlert, info_hash), 32);
        assert_eq!(offset_of!(RawPerformanceAlert, warning_type), 24);
        assert_eq!(offset_of!(RawPeerAlert, handle), 24);
        assert_eq!(offset_of!(RawPeerAlert, peer_event), 32);
        assert_eq!(offset_of!(RawPeerAlert, info_hash), 33);
        assert_eq!(offset_of!(RawPeerAlert, address), 53);
    }

    #[test]
    fn null_strings_become_empty() {
        // SAFETY: null is explicitly allowed.
        assert_eq!(unsafe { c_string(std::ptr::null()) }, "");
    }

    #[test]
    fn file_lists_are_copied() {
        let name = CString::new("b.bin").expect("cstring");
        let path = CString::new("pack/b.bin").expect("cstring");
        let mut entries = [RawFileInformation {
            index: 1,
            offset: 512,
            file_size: 1024,
            modified_time: 0,
            file_name: name.as_ptr(),
            file_path: path.as_ptr(),
            file_path_is_absolute: false,
            pad_file: false,
        }];
        let list = RawFileList {
            length: 1,
            files: entries.as_mut_ptr(),
        };

        // SAFETY: entries and strings outlive the call.
        let files = unsafe { files_from_raw(&list) };
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "b.bin");
        assert_eq!(files[0].path, PathBuf::from("pack/b.bin"));
        assert_eq!(files[0].offset, 512);

        // SAFETY: a default list holds no entries.
        assert!(unsafe { files_from_raw(&RawFileList::default()) }.is_empty());
    }
}
