//! C ABI for callers in other languages.
//!
//! All functions return `0` on success and `1` on failure. The reason for a
//! failure is logged with `tracing` (see the `ffi-logging` feature), but not
//! returned.
//!
//! Strings are NUL-terminated UTF-16 (`PCWSTR`). Output structures are
//! zeroed on entry, so a failed call never leaves stale pointers behind, and
//! must be released with [FreeRegister] / [FreeValidate] after a successful
//! call.
//!
//! Equivalent C declarations:
//!
//! ```c
//! typedef struct { DWORD size; PBYTE keyHandle; } KEY_HANDLE;
//! typedef struct { DWORD cbAttestationObject; PBYTE pbAttestationObject; } REGISTER_ATTESTATION;
//! typedef struct {
//!   DWORD keyHandleLength; PBYTE keyHandle;
//!   DWORD authenticatorDataLength; PBYTE authenticatorData;
//!   DWORD signatureLength; PBYTE signature;
//! } VALIDATE_ATTESTATION;
//! ```
#![allow(non_snake_case)]

use std::ffi::{c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use crate::{
    cancel::CancellationToken,
    error::{BridgeError, Result},
    platform_backend,
    types::{AuthenticateRequest, KeyHandle, RegisterRequest, UiContext},
    Bridge, PlatformAuthenticator,
};

pub type DWORD = u32;

pub const SUCCESS: c_int = 0;
pub const FAILURE: c_int = 1;

/// `KEY_HANDLE`: a caller-owned credential ID.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiKeyHandle {
    pub size: DWORD,
    pub key_handle: *const u8,
}

/// `REGISTER_ATTESTATION`: output of [RegisterFIDO2Token].
#[repr(C)]
#[derive(Debug)]
pub struct RegisterAttestation {
    pub cb_attestation_object: DWORD,
    pub pb_attestation_object: *mut u8,
}

impl Default for RegisterAttestation {
    fn default() -> Self {
        Self {
            cb_attestation_object: 0,
            pb_attestation_object: ptr::null_mut(),
        }
    }
}

/// `VALIDATE_ATTESTATION`: output of [ValidateFIDO2Tokens].
#[repr(C)]
#[derive(Debug)]
pub struct ValidateAttestation {
    pub key_handle_length: DWORD,
    pub key_handle: *mut u8,
    pub authenticator_data_length: DWORD,
    pub authenticator_data: *mut u8,
    pub signature_length: DWORD,
    pub signature: *mut u8,
}

impl Default for ValidateAttestation {
    fn default() -> Self {
        Self {
            key_handle_length: 0,
            key_handle: ptr::null_mut(),
            authenticator_data_length: 0,
            authenticator_data: ptr::null_mut(),
            signature_length: 0,
            signature: ptr::null_mut(),
        }
    }
}

#[cfg(feature = "ffi-logging")]
static TRACING_INIT: std::sync::Once = std::sync::Once::new();

/// Installs a `tracing` subscriber, honouring `RUST_LOG`, unless the host
/// process already has one.
fn init_logging() {
    #[cfg(feature = "ffi-logging")]
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Reads a NUL-terminated UTF-16 string. Returns `None` for a null pointer
/// or invalid UTF-16.
unsafe fn read_wide(p: *const u16) -> Option<String> {
    if p.is_null() {
        return None;
    }
    let mut len = 0;
    while *p.add(len) != 0 {
        len += 1;
    }
    String::from_utf16(std::slice::from_raw_parts(p, len))
        .map_err(|e| error!("string is not valid UTF-16: {:?}", e))
        .ok()
}

unsafe fn read_bytes(len: DWORD, p: *const u8) -> Option<Vec<u8>> {
    if len == 0 {
        Some(Vec::new())
    } else if p.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(p, len as usize).to_vec())
    }
}

unsafe fn read_key_handles(count: DWORD, p: *const FfiKeyHandle) -> Result<Vec<KeyHandle>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if p.is_null() {
        error!("{} key handles, but no key handle array", count);
        return Err(BridgeError::InvalidKeyHandle);
    }
    std::slice::from_raw_parts(p, count as usize)
        .iter()
        .map(|k| {
            read_bytes(k.size, k.key_handle)
                .map(KeyHandle::from)
                .ok_or(BridgeError::InvalidKeyHandle)
        })
        .collect()
}

/// Moves `v` to a caller-visible buffer, released by [free_buffer].
fn into_buffer(v: Vec<u8>) -> (DWORD, *mut u8) {
    if v.is_empty() {
        return (0, ptr::null_mut());
    }
    // Lengths were checked to fit in a DWORD by buffer_len.
    let len = v.len() as DWORD;
    (len, Box::into_raw(v.into_boxed_slice()) as *mut u8)
}

fn buffer_len(v: &[u8]) -> Result<DWORD> {
    DWORD::try_from(v.len()).map_err(|_| {
        error!("result buffer too large for the C ABI");
        BridgeError::Internal
    })
}

/// Releases a buffer from [into_buffer], and zeroes the caller's fields.
unsafe fn free_buffer(len: &mut DWORD, p: &mut *mut u8) {
    if !p.is_null() {
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
            *p,
            *len as usize,
        )));
    }
    *p = ptr::null_mut();
    *len = 0;
}

/// Runs `f`, turning errors and panics into [FAILURE].
fn guard<F>(op: &str, f: F) -> c_int
where
    F: FnOnce() -> Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => SUCCESS,
        Ok(Err(e)) => {
            error!("{} failed: {}", op, e);
            FAILURE
        }
        Err(_) => {
            error!("{} panicked", op);
            FAILURE
        }
    }
}

/// Borrows the caller's cancellation handle, or makes a fresh token that
/// nothing can cancel.
unsafe fn cancel_or_default(cancellation: *const CancellationToken) -> CancellationToken {
    if cancellation.is_null() {
        CancellationToken::new()
    } else {
        (*cancellation).clone()
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn register_with<B: PlatformAuthenticator>(
    backend: B,
    ui: UiContext,
    cancel: &CancellationToken,
    client_data_length: DWORD,
    client_data: *const u8,
    app_id: *const u16,
    name: *const u16,
    display_name: *const u16,
    key_handles_count: DWORD,
    key_handles: *const FfiKeyHandle,
    timeout: DWORD,
    attestation: *mut RegisterAttestation,
) -> c_int {
    init_logging();
    if attestation.is_null() {
        error!("RegisterFIDO2Token: attestation output is null");
        return FAILURE;
    }
    ptr::write(attestation, RegisterAttestation::default());

    guard("RegisterFIDO2Token", || {
        let request = RegisterRequest {
            client_data: read_bytes(client_data_length, client_data)
                .ok_or(BridgeError::InvalidClientData)?,
            rp_id: read_wide(app_id).ok_or(BridgeError::InvalidRelyingParty)?,
            user_name: read_wide(name).ok_or(BridgeError::InvalidUser)?,
            display_name: if display_name.is_null() {
                String::new()
            } else {
                read_wide(display_name).ok_or(BridgeError::InvalidUser)?
            },
            exclude_credentials: read_key_handles(key_handles_count, key_handles)?,
            timeout_ms: timeout,
        };

        let r = Bridge::new(backend).register(ui, &request, cancel)?;
        buffer_len(&r.attestation_object)?;

        let (cb, pb) = into_buffer(r.attestation_object);
        (*attestation).cb_attestation_object = cb;
        (*attestation).pb_attestation_object = pb;
        Ok(())
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn validate_with<B: PlatformAuthenticator>(
    backend: B,
    ui: UiContext,
    cancel: &CancellationToken,
    client_data_length: DWORD,
    client_data: *const u8,
    app_id: *const u16,
    key_handles_count: DWORD,
    key_handles: *const FfiKeyHandle,
    timeout: DWORD,
    validate: *mut ValidateAttestation,
) -> c_int {
    init_logging();
    if validate.is_null() {
        error!("ValidateFIDO2Tokens: validate output is null");
        return FAILURE;
    }
    ptr::write(validate, ValidateAttestation::default());

    guard("ValidateFIDO2Tokens", || {
        let request = AuthenticateRequest {
            client_data: read_bytes(client_data_length, client_data)
                .ok_or(BridgeError::InvalidClientData)?,
            rp_id: read_wide(app_id).ok_or(BridgeError::InvalidRelyingParty)?,
            allow_credentials: read_key_handles(key_handles_count, key_handles)?,
            timeout_ms: timeout,
        };

        let r = Bridge::new(backend).authenticate(ui, &request, cancel)?;
        buffer_len(&r.credential_id)?;
        buffer_len(&r.authenticator_data)?;
        buffer_len(&r.signature)?;

        let v = &mut *validate;
        (v.key_handle_length, v.key_handle) = into_buffer(r.credential_id);
        (v.authenticator_data_length, v.authenticator_data) = into_buffer(r.authenticator_data);
        (v.signature_length, v.signature) = into_buffer(r.signature);
        Ok(())
    })
}

/// Registers a new credential with the platform authenticator, attaching
/// the platform UI to the current foreground window.
///
/// # Safety
///
/// `clientData` must point to `clientDataLength` bytes. `appId` and `name`
/// must be NUL-terminated UTF-16 strings; `displayName` may also be null.
/// `keyHandles` must point to `keyHandlesCount` entries, each pointing to
/// `size` bytes. `attestation` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn RegisterFIDO2Token(
    clientDataLength: DWORD,
    clientData: *const u8,
    appId: *const u16,
    name: *const u16,
    displayName: *const u16,
    keyHandlesCount: DWORD,
    keyHandles: *const FfiKeyHandle,
    timeout: DWORD,
    attestation: *mut RegisterAttestation,
) -> c_int {
    RegisterFIDO2TokenEx(
        ptr::null_mut(),
        ptr::null(),
        clientDataLength,
        clientData,
        appId,
        name,
        displayName,
        keyHandlesCount,
        keyHandles,
        timeout,
        attestation,
    )
}

/// [RegisterFIDO2Token], with an explicit parent window (or null for the
/// foreground window) and cancellation handle (or null).
///
/// # Safety
///
/// As for [RegisterFIDO2Token]. `cancellation` must be null or a live handle
/// from [CreateCancellation].
#[no_mangle]
pub unsafe extern "C" fn RegisterFIDO2TokenEx(
    hwnd: *mut c_void,
    cancellation: *const CancellationToken,
    clientDataLength: DWORD,
    clientData: *const u8,
    appId: *const u16,
    name: *const u16,
    displayName: *const u16,
    keyHandlesCount: DWORD,
    keyHandles: *const FfiKeyHandle,
    timeout: DWORD,
    attestation: *mut RegisterAttestation,
) -> c_int {
    register_with(
        platform_backend(),
        UiContext::from_raw(hwnd),
        &cancel_or_default(cancellation),
        clientDataLength,
        clientData,
        appId,
        name,
        displayName,
        keyHandlesCount,
        keyHandles,
        timeout,
        attestation,
    )
}

/// Signs client data with one of the given credentials, attaching the
/// platform UI to the current foreground window.
///
/// # Safety
///
/// As for [RegisterFIDO2Token]. `validate` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn ValidateFIDO2Tokens(
    clientDataLength: DWORD,
    clientData: *const u8,
    appId: *const u16,
    keyHandlesCount: DWORD,
    keyHandles: *const FfiKeyHandle,
    timeout: DWORD,
    validate: *mut ValidateAttestation,
) -> c_int {
    ValidateFIDO2TokensEx(
        ptr::null_mut(),
        ptr::null(),
        clientDataLength,
        clientData,
        appId,
        keyHandlesCount,
        keyHandles,
        timeout,
        validate,
    )
}

/// [ValidateFIDO2Tokens], with an explicit parent window (or null for the
/// foreground window) and cancellation handle (or null).
///
/// # Safety
///
/// As for [ValidateFIDO2Tokens]. `cancellation` must be null or a live
/// handle from [CreateCancellation].
#[no_mangle]
pub unsafe extern "C" fn ValidateFIDO2TokensEx(
    hwnd: *mut c_void,
    cancellation: *const CancellationToken,
    clientDataLength: DWORD,
    clientData: *const u8,
    appId: *const u16,
    keyHandlesCount: DWORD,
    keyHandles: *const FfiKeyHandle,
    timeout: DWORD,
    validate: *mut ValidateAttestation,
) -> c_int {
    validate_with(
        platform_backend(),
        UiContext::from_raw(hwnd),
        &cancel_or_default(cancellation),
        clientDataLength,
        clientData,
        appId,
        keyHandlesCount,
        keyHandles,
        timeout,
        validate,
    )
}

/// Releases the buffer from a successful [RegisterFIDO2Token], and zeroes
/// `attestation`. Releasing a zeroed or already released structure does
/// nothing.
///
/// # Safety
///
/// `attestation` must be null, zeroed, or filled in by
/// [RegisterFIDO2Token].
#[no_mangle]
pub unsafe extern "C" fn FreeRegister(attestation: *mut RegisterAttestation) -> c_int {
    if let Some(a) = attestation.as_mut() {
        free_buffer(&mut a.cb_attestation_object, &mut a.pb_attestation_object);
    }
    SUCCESS
}

/// Releases the buffers from a successful [ValidateFIDO2Tokens], and zeroes
/// `validate`. Releasing a zeroed or already released structure does
/// nothing.
///
/// # Safety
///
/// `validate` must be null, zeroed, or filled in by [ValidateFIDO2Tokens].
#[no_mangle]
pub unsafe extern "C" fn FreeValidate(validate: *mut ValidateAttestation) -> c_int {
    if let Some(v) = validate.as_mut() {
        free_buffer(&mut v.key_handle_length, &mut v.key_handle);
        free_buffer(&mut v.authenticator_data_length, &mut v.authenticator_data);
        free_buffer(&mut v.signature_length, &mut v.signature);
    }
    SUCCESS
}

/// Creates a cancellation handle for the `*Ex` functions. Release it with
/// [FreeCancellation].
#[no_mangle]
pub extern "C" fn CreateCancellation() -> *mut CancellationToken {
    init_logging();
    Box::into_raw(Box::new(CancellationToken::new()))
}

/// Cancels the ceremony using `cancellation`, from any thread. Ceremonies
/// started with a cancelled handle fail immediately.
///
/// # Safety
///
/// `cancellation` must be null or a live handle from [CreateCancellation].
#[no_mangle]
pub unsafe extern "C" fn CancelOperation(cancellation: *const CancellationToken) -> c_int {
    match cancellation.as_ref() {
        Some(c) => guard("CancelOperation", || {
            c.cancel();
            Ok(())
        }),
        None => FAILURE,
    }
}

/// Releases a handle from [CreateCancellation].
///
/// # Safety
///
/// `cancellation` must be null or a handle from [CreateCancellation] which
/// no ceremony is still using.
#[no_mangle]
pub unsafe extern "C" fn FreeCancellation(cancellation: *mut CancellationToken) -> c_int {
    if !cancellation.is_null() {
        drop(Box::from_raw(cancellation));
    }
    SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::Unsupported;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    #[test]
    fn release_zeroed_and_null_is_noop() {
        let mut a = RegisterAttestation::default();
        assert_eq!(unsafe { FreeRegister(&mut a) }, SUCCESS);
        assert_eq!(unsafe { FreeRegister(ptr::null_mut()) }, SUCCESS);

        let mut v = ValidateAttestation::default();
        assert_eq!(unsafe { FreeValidate(&mut v) }, SUCCESS);
        assert_eq!(unsafe { FreeValidate(ptr::null_mut()) }, SUCCESS);
        assert!(v.signature.is_null());
    }

    #[test]
    fn release_nulls_pointers() {
        let (cb, pb) = into_buffer(vec![1, 2, 3]);
        let mut a = RegisterAttestation {
            cb_attestation_object: cb,
            pb_attestation_object: pb,
        };
        assert_eq!(unsafe { FreeRegister(&mut a) }, SUCCESS);
        assert_eq!(a.cb_attestation_object, 0);
        assert!(a.pb_attestation_object.is_null());
        // Second release is a no-op.
        assert_eq!(unsafe { FreeRegister(&mut a) }, SUCCESS);
    }

    #[test]
    fn failed_call_leaves_output_zeroed() {
        let _ = tracing_subscriber::fmt::try_init();
        let app_id = wide("example.com");
        let name = wide("alice");
        let client_data = b"{}";
        // Stale values from a previous call are not freed, only overwritten.
        let mut a = RegisterAttestation {
            cb_attestation_object: 99,
            pb_attestation_object: 0x10 as *mut u8,
        };

        let r = unsafe {
            register_with(
                Unsupported,
                UiContext::None,
                &CancellationToken::new(),
                client_data.len() as DWORD,
                client_data.as_ptr(),
                app_id.as_ptr(),
                name.as_ptr(),
                ptr::null(),
                0,
                ptr::null(),
                1000,
                &mut a,
            )
        };
        assert_eq!(r, FAILURE);
        assert_eq!(a.cb_attestation_object, 0);
        assert!(a.pb_attestation_object.is_null());
        assert_eq!(unsafe { FreeRegister(&mut a) }, SUCCESS);
    }

    #[test]
    fn invalid_arguments_fail() {
        let app_id = wide("example.com");
        let client_data = b"{}";
        let kh = [7u8; 4];
        let handles = [FfiKeyHandle {
            size: kh.len() as DWORD,
            key_handle: kh.as_ptr(),
        }];
        let mut v = ValidateAttestation::default();
        let validate = |client_data_length: DWORD,
                        app_id: *const u16,
                        count: DWORD,
                        timeout: DWORD,
                        v: &mut ValidateAttestation| unsafe {
            validate_with(
                Unsupported,
                UiContext::None,
                &CancellationToken::new(),
                client_data_length,
                client_data.as_ptr(),
                app_id,
                count,
                handles.as_ptr(),
                timeout,
                v,
            )
        };

        // Empty allow list.
        assert_eq!(validate(2, app_id.as_ptr(), 0, 1000, &mut v), FAILURE);
        // Zero timeout.
        assert_eq!(validate(2, app_id.as_ptr(), 1, 0, &mut v), FAILURE);
        // Empty client data.
        assert_eq!(validate(0, app_id.as_ptr(), 1, 1000, &mut v), FAILURE);
        // Null appId.
        assert_eq!(validate(2, ptr::null(), 1, 1000, &mut v), FAILURE);
        assert!(v.key_handle.is_null());

        // Null output.
        let r = unsafe {
            validate_with(
                Unsupported,
                UiContext::None,
                &CancellationToken::new(),
                2,
                client_data.as_ptr(),
                app_id.as_ptr(),
                1,
                handles.as_ptr(),
                1000,
                ptr::null_mut(),
            )
        };
        assert_eq!(r, FAILURE);
    }

    #[test]
    fn read_wide_strings() {
        let s = wide("h\u{e9}llo");
        assert_eq!(unsafe { read_wide(s.as_ptr()) }, Some("h\u{e9}llo".to_string()));
        assert_eq!(unsafe { read_wide(ptr::null()) }, None);
        // Unpaired surrogate.
        let bad = [0xd800u16, 0];
        assert_eq!(unsafe { read_wide(bad.as_ptr()) }, None);
    }

    #[test]
    fn cancellation_handles() {
        let c = CreateCancellation();
        assert!(!c.is_null());
        assert_eq!(unsafe { CancelOperation(c) }, SUCCESS);
        assert!(unsafe { (*c).is_cancelled() });
        assert_eq!(unsafe { FreeCancellation(c) }, SUCCESS);

        assert_eq!(unsafe { CancelOperation(ptr::null()) }, FAILURE);
        assert_eq!(unsafe { FreeCancellation(ptr::null_mut()) }, SUCCESS);
    }

    #[cfg(feature = "softtoken")]
    #[test]
    fn register_and_validate_with_softtoken() {
        use crate::attestation::AttestationObject;
        use crate::crypto::compute_sha256;
        use crate::softtoken::SoftToken;

        let _ = tracing_subscriber::fmt::try_init();
        let mut token = SoftToken::new().unwrap();
        let cancel = CancellationToken::new();
        let app_id = wide("example.com");
        let name = wide("alice");

        let h1 = b"registration";
        let mut a = RegisterAttestation::default();
        let r = unsafe {
            register_with(
                &mut token,
                UiContext::None,
                &cancel,
                h1.len() as DWORD,
                h1.as_ptr(),
                app_id.as_ptr(),
                name.as_ptr(),
                ptr::null(),
                0,
                ptr::null(),
                30_000,
                &mut a,
            )
        };
        assert_eq!(r, SUCCESS);
        let ao_bytes = unsafe {
            std::slice::from_raw_parts(a.pb_attestation_object, a.cb_attestation_object as usize)
        };
        let ao = AttestationObject::try_from(ao_bytes).unwrap();
        let cred_id = ao.credential_id().unwrap().to_vec();
        let key = ao.public_key().unwrap().clone();
        assert_eq!(unsafe { FreeRegister(&mut a) }, SUCCESS);
        assert!(a.pb_attestation_object.is_null());

        let h2 = b"authentication";
        let handles = [FfiKeyHandle {
            size: cred_id.len() as DWORD,
            key_handle: cred_id.as_ptr(),
        }];
        let mut v = ValidateAttestation::default();
        let r = unsafe {
            validate_with(
                &mut token,
                UiContext::None,
                &cancel,
                h2.len() as DWORD,
                h2.as_ptr(),
                app_id.as_ptr(),
                1,
                handles.as_ptr(),
                30_000,
                &mut v,
            )
        };
        assert_eq!(r, SUCCESS);
        let (kh, ad, sig) = unsafe {
            (
                std::slice::from_raw_parts(v.key_handle, v.key_handle_length as usize),
                std::slice::from_raw_parts(v.authenticator_data, v.authenticator_data_length as usize),
                std::slice::from_raw_parts(v.signature, v.signature_length as usize),
            )
        };
        assert_eq!(kh, cred_id.as_slice());
        assert!(key.verify_assertion(ad, &compute_sha256(h2), sig).unwrap());
        assert_eq!(unsafe { FreeValidate(&mut v) }, SUCCESS);
        assert!(v.signature.is_null());
        assert_eq!(v.authenticator_data_length, 0);
    }
}
