//! Wrappers for the credential algorithm list.
use std::pin::Pin;

use super::WinWrapper;
use crate::error::Result;

use windows::{
    core::HSTRING,
    w,
    Win32::Networking::WindowsWebServices::{
        WEBAUTHN_COSE_CREDENTIAL_PARAMETER, WEBAUTHN_COSE_CREDENTIAL_PARAMETERS,
        WEBAUTHN_COSE_CREDENTIAL_PARAMETER_CURRENT_VERSION,
    },
};

/// [windows::Win32::Networking::WindowsWebServices::WEBAUTHN_CREDENTIAL_TYPE_PUBLIC_KEY]
pub(super) const CREDENTIAL_TYPE_PUBLIC_KEY: &HSTRING = w!("public-key");

/// Wrapper for [WEBAUTHN_COSE_CREDENTIAL_PARAMETERS] to ensure pointer
/// lifetime.
pub struct WinCoseCredentialParameters {
    native: WEBAUTHN_COSE_CREDENTIAL_PARAMETERS,
    params: Vec<WEBAUTHN_COSE_CREDENTIAL_PARAMETER>,
}

impl WinWrapper<&[i32]> for WinCoseCredentialParameters {
    type NativeType = WEBAUTHN_COSE_CREDENTIAL_PARAMETERS;

    fn new(algs: &[i32]) -> Result<Pin<Box<Self>>> {
        let res = Self {
            native: Default::default(),
            params: algs
                .iter()
                .map(|alg| WEBAUTHN_COSE_CREDENTIAL_PARAMETER {
                    dwVersion: WEBAUTHN_COSE_CREDENTIAL_PARAMETER_CURRENT_VERSION,
                    pwszCredentialType: CREDENTIAL_TYPE_PUBLIC_KEY.into(),
                    lAlg: *alg,
                })
                .collect(),
        };

        // Box and pin the struct so it's on the heap and doesn't move.
        let mut boxed = Box::pin(res);

        let native = WEBAUTHN_COSE_CREDENTIAL_PARAMETERS {
            cCredentialParameters: boxed.params.len() as u32,
            pCredentialParameters: boxed.params.as_ptr() as *mut _,
        };

        unsafe {
            let mut_ref: Pin<&mut Self> = Pin::as_mut(&mut boxed);
            Pin::get_unchecked_mut(mut_ref).native = native;
        }

        Ok(boxed)
    }

    fn native_ptr(&self) -> &WEBAUTHN_COSE_CREDENTIAL_PARAMETERS {
        &self.native
    }
}
