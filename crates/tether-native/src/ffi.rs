//! `extern "C"` binding to the engine shim.

use std::ffi::{CString, c_char, c_int, c_long, c_void};
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::alert::{AlertSink, dispatch};
use crate::api::{NativeApi, NativeFile, NativeMetadata, NativeStatus};
use crate::handle::{DescriptorHandle, SessionHandle, SettingsHandle, TorrentHandle};
use crate::raw::{
    RawFileList, RawTorrentMetadata, RawTorrentStatus, files_from_raw, metadata_from_raw,
};
use crate::sinks::SinkRegistry;

type AlertCallback = unsafe extern "C" fn(alert: *mut c_void, user_data: *mut c_void);

unsafe extern "C" {
    fn create_session_from_pack(pack: *mut c_void) -> *mut c_void;
    fn destroy_session(session: *mut c_void);
    fn set_event_callback(
        session: *mut c_void,
        callback: AlertCallback,
        user_data: *mut c_void,
        include_unmapped: bool,
    );
    fn clear_event_callback(session: *mut c_void);
    fn apply_settings(session: *mut c_void, pack: *mut c_void);

    fn create_settings_pack() -> *mut c_void;
    fn destroy_settings_pack(pack: *mut c_void);
    fn set_int(pack: *mut c_void, key: *const c_char, value: c_int) -> bool;
    fn set_bool(pack: *mut c_void, key: *const c_char, value: bool) -> bool;
    fn set_str(pack: *mut c_void, key: *const c_char, value: *const c_char) -> bool;

    fn create_torrent_file(path: *const c_char) -> *mut c_void;
    fn create_torrent_bytes(data: *const c_char, length: c_long) -> *mut c_void;
    fn destroy_torrent(torrent: *mut c_void);
    fn get_torrent_info(torrent: *mut c_void) -> *mut RawTorrentMetadata;
    fn destroy_torrent_info(info: *mut RawTorrentMetadata);
    fn get_torrent_file_list(torrent: *mut c_void, list: *mut RawFileList);
    fn destroy_torrent_file_list(list: *mut RawFileList);

    fn attach_torrent(
        session: *mut c_void,
        torrent: *mut c_void,
        save_path: *const c_char,
    ) -> *mut c_void;
    fn detach_torrent(session: *mut c_void, torrent: *mut c_void);

    fn get_file_dl_priority(torrent: *mut c_void, index: i32) -> u8;
    fn set_file_dl_priority(torrent: *mut c_void, index: i32, priority: u8);
    fn start_torrent(torrent: *mut c_void);
    fn stop_torrent(torrent: *mut c_void);
    fn reannounce_torrent(torrent: *mut c_void, seconds: i32, ignore_min_interval: u8);
    fn get_torrent_status(torrent: *mut c_void, status: *mut RawTorrentStatus);
}

static SINKS: Lazy<Mutex<SinkRegistry>> = Lazy::new(|| Mutex::new(SinkRegistry::new()));

fn sinks() -> MutexGuard<'static, SinkRegistry> {
    SINKS.lock().unwrap_or_else(PoisonError::into_inner)
}

unsafe extern "C" fn trampoline(alert: *mut c_void, user_data: *mut c_void) {
    let Some(sink) = sinks().sink(user_data.addr()) else {
        debug!("alert arrived for a released sink registration");
        return;
    };
    // SAFETY: the shim keeps the buffer alive for the callback.
    unsafe {
        dispatch(alert.cast_const(), sink.as_ref());
    }
}

fn pointer(raw: usize) -> *mut c_void {
    ptr::with_exposed_provenance_mut(raw)
}

fn address(ptr: *mut c_void) -> usize {
    ptr.expose_provenance()
}

fn c_path(path: &Path) -> Option<CString> {
    CString::new(path.as_os_str().as_encoded_bytes())
        .inspect_err(|err| warn!(path = %path.display(), error = %err, "path holds a nul byte"))
        .ok()
}

fn c_key(key: &str) -> Option<CString> {
    CString::new(key).ok()
}

/// [`NativeApi`] over the linked engine shim.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfiApi;

impl NativeApi for FfiApi {
    fn create_session(&self, settings: Option<SettingsHandle>) -> Option<SessionHandle> {
        let pack = settings.map_or(ptr::null_mut(), |handle| pointer(handle.as_raw()));
        // SAFETY: pack is null or a live settings object.
        let session = unsafe { create_session_from_pack(pack) };
        SessionHandle::from_raw(address(session))
    }

    fn destroy_session(&self, session: SessionHandle) {
        sinks().unregister(session.as_raw());
        // SAFETY: handle came from `create_session_from_pack` and is released once.
        unsafe { destroy_session(pointer(session.as_raw())) }
    }

    fn set_event_callback(
        &self,
        session: SessionHandle,
        sink: Arc<dyn AlertSink>,
        include_unmapped: bool,
    ) {
        let id = sinks().register(session.as_raw(), sink);
        let user_data = ptr::without_provenance_mut(id);
        // SAFETY: the session is live and the trampoline outlives it.
        unsafe {
            set_event_callback(
                pointer(session.as_raw()),
                trampoline,
                user_data,
                include_unmapped,
            );
        }
    }

    fn clear_event_callback(&self, session: SessionHandle) {
        // SAFETY: the session is live.
        unsafe { clear_event_callback(pointer(session.as_raw())) }
        sinks().unregister(session.as_raw());
    }

    fn apply_settings(&self, session: SessionHandle, settings: SettingsHandle) {
        // SAFETY: both handles are live.
        unsafe { apply_settings(pointer(session.as_raw()), pointer(settings.as_raw())) }
    }

    fn create_settings_pack(&self) -> Option<SettingsHandle> {
        // SAFETY: no preconditions.
        let pack = unsafe { create_settings_pack() };
        SettingsHandle::from_raw(address(pack))
    }

    fn destroy_settings_pack(&self, settings: SettingsHandle) {
        // SAFETY: released once by `Owned`.
        unsafe { destroy_settings_pack(pointer(settings.as_raw())) }
    }

    fn settings_set_int(&self, settings: SettingsHandle, key: &str, value: i32) -> bool {
        let Some(key) = c_key(key) else { return false };
        // SAFETY: live pack, nul-terminated key.
        unsafe { set_int(pointer(settings.as_raw()), key.as_ptr(), value) }
    }

    fn settings_set_bool(&self, settings: SettingsHandle, key: &str, value: bool) -> bool {
        let Some(key) = c_key(key) else { return false };
        // SAFETY: live pack, nul-terminated key.
        unsafe { set_bool(pointer(settings.as_raw()), key.as_ptr(), value) }
    }

    fn settings_set_str(&self, settings: SettingsHandle, key: &str, value: &str) -> bool {
        let (Some(key), Ok(value)) = (c_key(key), CString::new(value)) else {
            return false;
        };
        // SAFETY: live pack, nul-terminated strings.
        unsafe { set_str(pointer(settings.as_raw()), key.as_ptr(), value.as_ptr()) }
    }

    fn create_torrent_from_file(&self, path: &Path) -> Option<DescriptorHandle> {
        let path = c_path(path)?;
        // SAFETY: nul-terminated path.
        let descriptor = unsafe { create_torrent_file(path.as_ptr()) };
        DescriptorHandle::from_raw(address(descriptor))
    }

    fn create_torrent_from_bytes(&self, bytes: &[u8]) -> Option<DescriptorHandle> {
        let length = c_long::try_from(bytes.len()).ok()?;
        // SAFETY: the shim copies `length` bytes before returning.
        let descriptor = unsafe { create_torrent_bytes(bytes.as_ptr().cast(), length) };
        DescriptorHandle::from_raw(address(descriptor))
    }

    fn destroy_torrent(&self, descriptor: DescriptorHandle) {
        // SAFETY: released once by `Owned`.
        unsafe { destroy_torrent(pointer(descriptor.as_raw())) }
    }

    fn torrent_metadata(&self, descriptor: DescriptorHandle) -> Option<NativeMetadata> {
        // SAFETY: live descriptor; the record is copied then freed by its owner.
        unsafe {
            let info = get_torrent_info(pointer(descriptor.as_raw()));
            if info.is_null() {
                return None;
            }
            let metadata = metadata_from_raw(&*info);
            destroy_torrent_info(info);
            Some(metadata)
        }
    }

    fn torrent_files(&self, descriptor: DescriptorHandle) -> Option<Vec<NativeFile>> {
        let mut list = RawFileList::default();
        // SAFETY: live descriptor; the list is copied then freed by its owner.
        unsafe {
            get_torrent_file_list(pointer(descriptor.as_raw()), &raw mut list);
            let files = files_from_raw(&list);
            destroy_torrent_file_list(&raw mut list);
            Some(files)
        }
    }

    fn attach_torrent(
        &self,
        session: SessionHandle,
        descriptor: DescriptorHandle,
        save_path: &Path,
    ) -> Option<TorrentHandle> {
        let save_path = c_path(save_path)?;
        // SAFETY: live handles; the shim copies the descriptor.
        let torrent = unsafe {
            attach_torrent(
                pointer(session.as_raw()),
                pointer(descriptor.as_raw()),
                save_path.as_ptr(),
            )
        };
        TorrentHandle::from_raw(address(torrent))
    }

    fn detach_torrent(&self, session: SessionHandle, torrent: TorrentHandle) {
        // SAFETY: released once by `Owned`.
        unsafe { detach_torrent(pointer(session.as_raw()), pointer(torrent.as_raw())) }
    }

    fn file_priority(&self, torrent: TorrentHandle, index: i32) -> u8 {
        // SAFETY: live torrent.
        unsafe { get_file_dl_priority(pointer(torrent.as_raw()), index) }
    }

    fn set_file_priority(&self, torrent: TorrentHandle, index: i32, priority: u8) {
        // SAFETY: live torrent.
        unsafe { set_file_dl_priority(pointer(torrent.as_raw()), index, priority) }
    }

    fn start_torrent(&self, torrent: TorrentHandle) {
        // SAFETY: live torrent.
        unsafe { start_torrent(pointer(torrent.as_raw())) }
    }

    fn stop_torrent(&self, torrent: TorrentHandle) {
        // SAFETY: live torrent.
        unsafe { stop_torrent(pointer(torrent.as_raw())) }
    }

    fn reannounce_torrent(&self, torrent: TorrentHandle, seconds: i32, ignore_min_interval: bool) {
        // SAFETY: live torrent.
        unsafe {
            reannounce_torrent(
                pointer(torrent.as_raw()),
                seconds,
                u8::from(ignore_min_interval),
            );
        }
    }

    fn torrent_status(&self, torrent: TorrentHandle) -> NativeStatus {
        let mut status = RawTorrentStatus::default();
        // SAFETY: live torrent, writable status record.
        unsafe { get_torrent_status(pointer(torrent.as_raw()), &raw mut status) };
        status.into()
    }
}
