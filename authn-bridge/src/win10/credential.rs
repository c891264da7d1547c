//! Wrappers for allow and exclude credential lists.
use std::pin::Pin;

use super::{cose::CREDENTIAL_TYPE_PUBLIC_KEY, WinWrapper};
use crate::error::{BridgeError, Result};
use crate::types::{transport, KeyHandle};

use windows::Win32::Networking::WindowsWebServices::{
    WEBAUTHN_CREDENTIAL_EX, WEBAUTHN_CREDENTIAL_EX_CURRENT_VERSION, WEBAUTHN_CREDENTIAL_LIST,
    WEBAUTHN_CTAP_TRANSPORT_BLE, WEBAUTHN_CTAP_TRANSPORT_INTERNAL, WEBAUTHN_CTAP_TRANSPORT_NFC,
    WEBAUTHN_CTAP_TRANSPORT_TEST, WEBAUTHN_CTAP_TRANSPORT_USB,
};

/// Converts a bitmask of native transports into a [transport] bitmask.
pub fn native_to_transports(t: u32) -> u32 {
    [
        (WEBAUTHN_CTAP_TRANSPORT_USB, transport::USB),
        (WEBAUTHN_CTAP_TRANSPORT_NFC, transport::NFC),
        (WEBAUTHN_CTAP_TRANSPORT_BLE, transport::BLE),
        (WEBAUTHN_CTAP_TRANSPORT_TEST, transport::TEST),
        (WEBAUTHN_CTAP_TRANSPORT_INTERNAL, transport::INTERNAL),
    ]
    .iter()
    .filter(|(native, _)| t & native != 0)
    .fold(0, |acc, (_, ours)| acc | ours)
}

/// Wrapper for [WEBAUTHN_CREDENTIAL_LIST] to ensure pointer lifetime.
///
/// Every key handle is offered over USB, NFC and BLE.
pub struct WinCredentialList {
    /// Native structure, which points to everything else here.
    pub(crate) native: WEBAUTHN_CREDENTIAL_LIST,
    /// One pointer per entry in `creds`, because
    /// [WEBAUTHN_CREDENTIAL_LIST::ppCredentials] is an array of pointers.
    ptrs: Vec<*mut WEBAUTHN_CREDENTIAL_EX>,
    creds: Vec<WEBAUTHN_CREDENTIAL_EX>,
    /// Credential IDs, referenced by [WEBAUTHN_CREDENTIAL_EX::pbId]
    ids: Vec<Vec<u8>>,
}

impl WinWrapper<&[KeyHandle]> for WinCredentialList {
    type NativeType = WEBAUTHN_CREDENTIAL_LIST;
    fn new(credentials: &[KeyHandle]) -> Result<Pin<Box<Self>>> {
        let len = u32::try_from(credentials.len()).map_err(|_| BridgeError::InvalidKeyHandle)?;
        let res = Self {
            native: Default::default(),
            ptrs: Vec::with_capacity(credentials.len()),
            creds: Vec::with_capacity(credentials.len()),
            ids: credentials.iter().map(|c| c.as_bytes().to_vec()).collect(),
        };

        // Box the struct so it doesn't move.
        let mut boxed = Box::pin(res);

        unsafe {
            let mut_ref: Pin<&mut Self> = Pin::as_mut(&mut boxed);
            let this = Pin::get_unchecked_mut(mut_ref);

            for id in this.ids.iter_mut() {
                this.creds.push(WEBAUTHN_CREDENTIAL_EX {
                    dwVersion: WEBAUTHN_CREDENTIAL_EX_CURRENT_VERSION,
                    cbId: u32::try_from(id.len()).map_err(|_| BridgeError::InvalidKeyHandle)?,
                    pbId: id.as_mut_ptr(),
                    pwszCredentialType: CREDENTIAL_TYPE_PUBLIC_KEY.into(),
                    dwTransports: transport::ROAMING,
                });
            }

            // `creds` is fully populated, so its elements won't move again.
            let creds_ptr = this.creds.as_mut_ptr();
            for i in 0..this.creds.len() {
                this.ptrs.push(creds_ptr.add(i));
            }

            this.native = WEBAUTHN_CREDENTIAL_LIST {
                cCredentials: len,
                ppCredentials: this.ptrs.as_mut_ptr(),
            };
        }

        trace!(credentials = len, "built credential list");
        Ok(boxed)
    }

    fn native_ptr(&self) -> &WEBAUTHN_CREDENTIAL_LIST {
        &self.native
    }
}
