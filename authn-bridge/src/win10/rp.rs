//! Wrappers for the relying party entity.
use std::pin::Pin;

use windows::{
    core::{HSTRING, PCWSTR},
    Win32::Networking::WindowsWebServices::{
        WEBAUTHN_RP_ENTITY_INFORMATION, WEBAUTHN_RP_ENTITY_INFORMATION_CURRENT_VERSION,
    },
};

use super::WinWrapper;
use crate::error::Result;

/// Relying party ID and display name.
pub struct RelyingParty<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Wrapper for [WEBAUTHN_RP_ENTITY_INFORMATION] to ensure pointer lifetime.
pub struct WinRpEntityInformation {
    native: WEBAUTHN_RP_ENTITY_INFORMATION,
    id: HSTRING,
    name: HSTRING,
}

impl<'a> WinWrapper<RelyingParty<'a>> for WinRpEntityInformation {
    type NativeType = WEBAUTHN_RP_ENTITY_INFORMATION;
    fn new(rp: RelyingParty<'a>) -> Result<Pin<Box<Self>>> {
        let res = Self {
            native: Default::default(),
            id: rp.id.into(),
            name: rp.name.into(),
        };

        let mut boxed = Box::pin(res);

        let native = WEBAUTHN_RP_ENTITY_INFORMATION {
            dwVersion: WEBAUTHN_RP_ENTITY_INFORMATION_CURRENT_VERSION,
            pwszId: (&boxed.id).into(),
            pwszName: (&boxed.name).into(),
            pwszIcon: PCWSTR::null(),
        };

        unsafe {
            let mut_ref: Pin<&mut Self> = Pin::as_mut(&mut boxed);
            Pin::get_unchecked_mut(mut_ref).native = native;
        }

        Ok(boxed)
    }

    fn native_ptr(&self) -> &WEBAUTHN_RP_ENTITY_INFORMATION {
        &self.native
    }
}
