//! Wrappers for the user entity.
use std::pin::Pin;

use windows::{
    core::{HSTRING, PCWSTR},
    Win32::Networking::WindowsWebServices::{
        WEBAUTHN_USER_ENTITY_INFORMATION, WEBAUTHN_USER_ENTITY_INFORMATION_CURRENT_VERSION,
    },
};

use super::WinWrapper;
use crate::error::{BridgeError, Result};

/// Wrapper for [WEBAUTHN_USER_ENTITY_INFORMATION] to ensure pointer lifetime.
///
/// The user ID is the UTF-8 encoding of the user name.
pub struct WinUserEntityInformation {
    native: WEBAUTHN_USER_ENTITY_INFORMATION,
    id: Vec<u8>,
    name: HSTRING,
    display_name: HSTRING,
}

impl<'a> WinWrapper<(&'a str, &'a str)> for WinUserEntityInformation {
    type NativeType = WEBAUTHN_USER_ENTITY_INFORMATION;
    fn new((name, display_name): (&'a str, &'a str)) -> Result<Pin<Box<Self>>> {
        // Construct an incomplete type first, so that all the pointers are fixed.
        let res = Self {
            native: WEBAUTHN_USER_ENTITY_INFORMATION::default(),
            id: name.as_bytes().to_vec(),
            name: name.into(),
            display_name: display_name.into(),
        };

        let mut boxed = Box::pin(res);

        let native = WEBAUTHN_USER_ENTITY_INFORMATION {
            dwVersion: WEBAUTHN_USER_ENTITY_INFORMATION_CURRENT_VERSION,
            cbId: u32::try_from(boxed.id.len()).map_err(|_| BridgeError::InvalidUser)?,
            pbId: boxed.id.as_ptr() as *mut _,
            pwszName: (&boxed.name).into(),
            pwszIcon: PCWSTR::null(),
            pwszDisplayName: (&boxed.display_name).into(),
        };

        unsafe {
            let mut_ref: Pin<&mut Self> = Pin::as_mut(&mut boxed);
            Pin::get_unchecked_mut(mut_ref).native = native;
        }

        Ok(boxed)
    }

    fn native_ptr(&self) -> &WEBAUTHN_USER_ENTITY_INFORMATION {
        &self.native
    }
}
