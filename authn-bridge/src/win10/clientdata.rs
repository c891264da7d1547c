//! Wrappers for caller-supplied client data.
use std::pin::Pin;

use super::WinWrapper;
use crate::error::{BridgeError, Result};

use windows::{
    core::HSTRING,
    w,
    Win32::Networking::WindowsWebServices::{
        WEBAUTHN_CLIENT_DATA, WEBAUTHN_CLIENT_DATA_CURRENT_VERSION,
    },
};
// Most constants are `&str`, but APIs expect `HSTRING`... there's no good work-around.
// https://github.com/microsoft/windows-rs/issues/2049
/// [windows::Win32::Networking::WindowsWebServices::WEBAUTHN_HASH_ALGORITHM_SHA_256]
const SHA_256: &HSTRING = w!("SHA-256");

/// Wrapper for [WEBAUTHN_CLIENT_DATA] to ensure pointer lifetime.
///
/// The client data is passed through as-is; the platform hashes it with
/// SHA-256.
pub struct WinClientData {
    native: WEBAUTHN_CLIENT_DATA,
    client_data: Vec<u8>,
}

impl<'a> WinWrapper<&'a [u8]> for WinClientData {
    type NativeType = WEBAUTHN_CLIENT_DATA;
    fn new(client_data: &'a [u8]) -> Result<Pin<Box<Self>>> {
        let res = Self {
            native: WEBAUTHN_CLIENT_DATA::default(),
            client_data: client_data.to_vec(),
        };

        let mut boxed = Box::pin(res);

        let native = WEBAUTHN_CLIENT_DATA {
            dwVersion: WEBAUTHN_CLIENT_DATA_CURRENT_VERSION,
            cbClientDataJSON: u32::try_from(boxed.client_data.len())
                .map_err(|_| BridgeError::InvalidClientData)?,
            pbClientDataJSON: boxed.client_data.as_ptr() as *mut _,
            pwszHashAlgId: SHA_256.into(),
        };

        unsafe {
            let mut_ref: Pin<&mut Self> = Pin::as_mut(&mut boxed);
            Pin::get_unchecked_mut(mut_ref).native = native;
        }

        Ok(boxed)
    }

    fn native_ptr(&self) -> &WEBAUTHN_CLIENT_DATA {
        &self.native
    }
}
