//! Helpers for working with Windows native types.
use std::marker::PhantomData;
use std::ops::Deref;
use std::pin::Pin;

use windows::{
    core::{Error as WinError, HRESULT},
    Win32::Networking::WindowsWebServices::WebAuthNGetErrorName,
};

use crate::error::{BridgeError, Result};

/// Smart pointer type to automatically `free()` bare pointers we got from
/// Windows' API when dropped.
pub struct WinPtr<'a, T: 'a> {
    free: unsafe fn(*const T),
    ptr: *const T,
    phantom: PhantomData<&'a T>,
}

impl<'a, T> WinPtr<'a, T> {
    /// Creates a wrapper around a `*const T` pointer which automatically calls
    /// the `free` function when dropped.
    ///
    /// Returns `None` if `ptr` is null.
    ///
    /// Unsafe if `ptr` is unaligned or does not point to a `T`.
    pub unsafe fn new(ptr: *const T, free: unsafe fn(*const T)) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self {
                free,
                ptr,
                phantom: PhantomData,
            })
        }
    }
}

impl<'a, T> Deref for WinPtr<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &(*self.ptr) }
    }
}

impl<'a, T> Drop for WinPtr<'a, T> {
    fn drop(&mut self) {
        trace!("freeing platform result at {:?}", self.ptr);
        unsafe { (self.free)(self.ptr) }
    }
}

/// Wrapper for a request value (`T`) which converts it to a Windows WebAuthn
/// API type (`NativeType`), keeping everything the native type points to
/// alive and pinned.
pub trait WinWrapper<T> {
    /// Windows equivalent type for `T`
    type NativeType;
    /// Converts `T` to a Windows type
    fn new(v: T) -> Result<Pin<Box<Self>>>;
    /// Returns a pointer to the Windows equivalent type
    fn native_ptr(&self) -> &Self::NativeType;
}

/// Copies a `(length, pointer)` buffer out of a platform result.
///
/// Unsafe if `ptr` does not point to `len` readable bytes.
pub unsafe fn copy_buffer(ptr: *const u8, len: u32) -> Vec<u8> {
    if ptr.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    }
}

/// Gets the WebAuthn error name for a platform error code, eg:
/// `NotAllowedError`.
fn error_name(hr: HRESULT) -> String {
    unsafe { WebAuthNGetErrorName(hr).to_string() }.unwrap_or_else(|_| "UnknownError".to_string())
}

// HRESULTs with a more specific meaning than their WebAuthn error name.
const NTE_NOT_FOUND: u32 = 0x8009_0011;
const NTE_EXISTS: u32 = 0x8009_000F;
const NTE_USER_CANCELLED: u32 = 0x8009_0036;
const HRESULT_ERROR_CANCELLED: u32 = 0x8007_04C7;

/// Maps a platform error code and its WebAuthn error name to a
/// [BridgeError].
pub fn map_error(code: u32, name: &str) -> BridgeError {
    match code {
        NTE_NOT_FOUND => return BridgeError::NoMatchingCredential,
        NTE_EXISTS => return BridgeError::CredentialExcluded,
        NTE_USER_CANCELLED | HRESULT_ERROR_CANCELLED => return BridgeError::Cancelled,
        _ => (),
    }

    match name {
        // User cancelled, timed out, or no authenticator responded.
        "NotAllowedError" => BridgeError::Cancelled,
        "InvalidStateError" => BridgeError::CredentialExcluded,
        "NotSupportedError" => BridgeError::NotSupported,
        _ => BridgeError::Platform {
            code,
            name: name.to_string(),
        },
    }
}

/// Logs a failed platform call, and maps it to a [BridgeError].
pub fn platform_error(call: &str, e: WinError) -> BridgeError {
    let hr = e.code();
    let name = error_name(hr);
    let code = hr.0 as u32;
    error!("{} failed: {} ({:#010x}): {}", call, name, code, e.message());
    map_error(code, &name)
}
