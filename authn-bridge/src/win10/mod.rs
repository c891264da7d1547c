//! Bindings for Windows 10 WebAuthn API.
//!
//! This API is available in Windows 10 bulid 1903 and later.
//!
//! ## API docs
//!
//! * [MSDN: WebAuthn API](https://learn.microsoft.com/en-us/windows/win32/api/webauthn/)
//! * [webauthn.h](github.com/microsoft/webauthn) (describes versions)
//! * [windows-rs API](https://microsoft.github.io/windows-docs-rs/doc/windows/Win32/Networking/WindowsWebServices/index.html)
mod clientdata;
mod cose;
mod credential;
mod native;
mod rp;
mod user;

use crate::win10::{
    clientdata::WinClientData,
    cose::WinCoseCredentialParameters,
    credential::{native_to_transports, WinCredentialList},
    native::{copy_buffer, platform_error, WinPtr, WinWrapper},
    rp::{RelyingParty, WinRpEntityInformation},
    user::WinUserEntityInformation,
};
use crate::{
    cancel::{CancelRegistration, CancellationToken},
    error::{BridgeError, Result},
    options::{AttestationConveyance, AuthenticatorAttachment, CeremonyOptions, UserVerification},
    types::{
        AssertionResult, AuthenticateRequest, RegisterRequest, RegistrationResult, UiContext,
        COSE_ALG_ES256,
    },
    PlatformAuthenticator,
};

use windows::{
    core::{GUID, HSTRING},
    Win32::{
        Foundation::HWND, Networking::WindowsWebServices::*,
        UI::WindowsAndMessaging::GetForegroundWindow,
    },
};

/// Authenticator backend for Windows 10 WebAuthn API.
pub struct Win10 {}

impl Default for Win10 {
    fn default() -> Self {
        unsafe {
            trace!(
                "WebAuthNGetApiVersionNumber(): {}",
                WebAuthNGetApiVersionNumber()
            );
        }

        Self {}
    }
}

/// Resolves the window the platform dialog attaches to.
fn ui_to_hwnd(ui: UiContext) -> HWND {
    match ui {
        UiContext::Window(w) => HWND(w.0 as isize),
        UiContext::Foreground => unsafe { GetForegroundWindow() },
        UiContext::None => HWND(0),
    }
}

/// Platform cancellation ID, wired to a [CancellationToken] for as long as
/// this lives.
struct WinCancellation {
    id: GUID,
    _registration: CancelRegistration,
}

impl WinCancellation {
    /// Gets a cancellation ID from the platform, and registers it with
    /// `cancel`.
    ///
    /// Returns `Ok(None)` if the platform can't provide one; the ceremony
    /// then runs until it completes or times out.
    fn new(cancel: &CancellationToken) -> Result<Option<Self>> {
        let id = match unsafe { WebAuthNGetCancellationId() } {
            Ok(id) => id,
            Err(e) => {
                warn!("WebAuthNGetCancellationId failed, ceremony can't be cancelled: {:?}", e);
                return Ok(None);
            }
        };

        let registration = cancel.register(move || {
            debug!("cancelling platform operation");
            if let Err(e) = unsafe { WebAuthNCancelCurrentOperation(&id) } {
                error!("WebAuthNCancelCurrentOperation failed: {:?}", e);
            }
        })?;

        Ok(Some(Self {
            id,
            _registration: registration,
        }))
    }

    fn native_ptr(this: &mut Option<Self>) -> *mut GUID {
        match this {
            Some(c) => &mut c.id,
            None => std::ptr::null_mut(),
        }
    }
}

impl PlatformAuthenticator for Win10 {
    /// Registers a credential using Windows WebAuth API.
    ///
    /// This wraps [WebAuthNAuthenticatorMakeCredential].
    ///
    /// [WebAuthNAuthenticatorMakeCredential]: https://learn.microsoft.com/en-us/windows/win32/api/webauthn/nf-webauthn-webauthnauthenticatormakecredential
    fn make_credential(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        let rp = WinRpEntityInformation::new(RelyingParty {
            id: &request.rp_id,
            name: &options.rp_name,
        })?;
        let userinfo = WinUserEntityInformation::new((
            request.user_name.as_str(),
            request.display_name.as_str(),
        ))?;
        let pubkeycredparams = WinCoseCredentialParameters::new(&[COSE_ALG_ES256][..])?;
        let clientdata = WinClientData::new(request.client_data.as_slice())?;
        let mut exclude_credentials =
            WinCredentialList::new(request.exclude_credentials.as_slice())?;
        let mut cancellation = WinCancellation::new(cancel)?;

        let makecredopts = WEBAUTHN_AUTHENTICATOR_MAKE_CREDENTIAL_OPTIONS {
            dwVersion: WEBAUTHN_AUTHENTICATOR_MAKE_CREDENTIAL_OPTIONS_CURRENT_VERSION,
            dwTimeoutMilliseconds: request.timeout_ms,
            // Superceded by pExcludeCredentialList for v3 (API v1, baseline)
            CredentialList: WEBAUTHN_CREDENTIALS {
                cCredentials: 0,
                pCredentials: [].as_mut_ptr(),
            },
            Extensions: Default::default(),
            dwAuthenticatorAttachment: attachment_to_native(options.attachment),
            bRequireResidentKey: false.into(),
            dwUserVerificationRequirement: user_verification_to_native(options.user_verification),
            dwAttestationConveyancePreference: attestation_to_native(options.attestation),
            dwFlags: 0,
            pCancellationId: WinCancellation::native_ptr(&mut cancellation),
            pExcludeCredentialList: if request.exclude_credentials.is_empty() {
                std::ptr::null_mut()
            } else {
                &mut exclude_credentials.native
            },
            dwEnterpriseAttestation: 0,
            dwLargeBlobSupport: 0,
            bPreferResidentKey: false.into(),
        };

        let hwnd = ui_to_hwnd(ui);
        trace!(?hwnd, "WebAuthNAuthenticatorMakeCredential()");
        let a = unsafe {
            let r = WebAuthNAuthenticatorMakeCredential(
                hwnd,
                rp.native_ptr(),
                userinfo.native_ptr(),
                pubkeycredparams.native_ptr(),
                clientdata.native_ptr(),
                Some(&makecredopts),
            )
            .map_err(|e| platform_error("WebAuthNAuthenticatorMakeCredential", e))?;

            WinPtr::new(r, |a| WebAuthNFreeCredentialAttestation(Some(a)))
                .ok_or(BridgeError::MissingRequiredField)?
        };
        // These needed to live until WebAuthNAuthenticatorMakeCredential returned.
        drop(cancellation);
        drop(exclude_credentials);

        let (attestation_object, credential_id) = unsafe {
            (
                copy_buffer(a.pbAttestationObject, a.cbAttestationObject),
                copy_buffer(a.pbCredentialId, a.cbCredentialId),
            )
        };
        let used_transports = if a.dwVersion >= 3 {
            native_to_transports(a.dwUsedTransport)
        } else {
            0
        };

        Ok(RegistrationResult {
            attestation_object,
            credential_id,
            used_transports,
        })
    }

    /// Gets an assertion using Windows WebAuth API.
    ///
    /// This wraps [WebAuthNAuthenticatorGetAssertion].
    ///
    /// [WebAuthNAuthenticatorGetAssertion]: https://learn.microsoft.com/en-us/windows/win32/api/webauthn/nf-webauthn-webauthnauthenticatorgetassertion
    fn get_assertion(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &AuthenticateRequest,
        cancel: &CancellationToken,
    ) -> Result<AssertionResult> {
        let rp_id: HSTRING = request.rp_id.as_str().into();
        let clientdata = WinClientData::new(request.client_data.as_slice())?;
        let mut allow_credentials = WinCredentialList::new(request.allow_credentials.as_slice())?;
        let mut cancellation = WinCancellation::new(cancel)?;

        let getassertopts = WEBAUTHN_AUTHENTICATOR_GET_ASSERTION_OPTIONS {
            dwVersion: WEBAUTHN_AUTHENTICATOR_GET_ASSERTION_OPTIONS_CURRENT_VERSION,
            dwTimeoutMilliseconds: request.timeout_ms,
            // Supersceded by pAllowCredentialList in v4 (API v1, baseline)
            CredentialList: WEBAUTHN_CREDENTIALS {
                cCredentials: 0,
                pCredentials: [].as_mut_ptr(),
            },
            Extensions: Default::default(),
            dwAuthenticatorAttachment: attachment_to_native(options.attachment),
            dwUserVerificationRequirement: user_verification_to_native(options.user_verification),
            dwFlags: 0,
            pwszU2fAppId: windows::core::PCWSTR::null(),
            pbU2fAppId: std::ptr::null_mut(),
            pCancellationId: WinCancellation::native_ptr(&mut cancellation),
            pAllowCredentialList: &mut allow_credentials.native,
            dwCredLargeBlobOperation: 0,
            cbCredLargeBlob: 0,
            pbCredLargeBlob: std::ptr::null_mut(),
        };

        let hwnd = ui_to_hwnd(ui);
        trace!(?hwnd, "WebAuthNAuthenticatorGetAssertion()");
        let a = unsafe {
            let r = WebAuthNAuthenticatorGetAssertion(
                hwnd,
                &rp_id,
                clientdata.native_ptr(),
                Some(&getassertopts),
            )
            .map_err(|e| platform_error("WebAuthNAuthenticatorGetAssertion", e))?;

            WinPtr::new(r, WebAuthNFreeAssertion).ok_or(BridgeError::MissingRequiredField)?
        };
        // These needed to live until WebAuthNAuthenticatorGetAssertion returned.
        drop(cancellation);
        drop(allow_credentials);

        unsafe {
            let user_id = copy_buffer(a.pbUserId, a.cbUserId);
            Ok(AssertionResult {
                // The credential which signed, not the user ID.
                credential_id: copy_buffer(a.Credential.pbId, a.Credential.cbId),
                authenticator_data: copy_buffer(a.pbAuthenticatorData, a.cbAuthenticatorData),
                signature: copy_buffer(a.pbSignature, a.cbSignature),
                user_handle: if user_id.is_empty() {
                    None
                } else {
                    Some(user_id)
                },
            })
        }
    }
}

/// Converts an [AuthenticatorAttachment] into a value for
/// [WEBAUTHN_AUTHENTICATOR_MAKE_CREDENTIAL_OPTIONS::dwAuthenticatorAttachment]
fn attachment_to_native(attachment: AuthenticatorAttachment) -> u32 {
    use AuthenticatorAttachment::*;
    match attachment {
        Any => WEBAUTHN_AUTHENTICATOR_ATTACHMENT_ANY,
        Platform => WEBAUTHN_AUTHENTICATOR_ATTACHMENT_PLATFORM,
        CrossPlatform => WEBAUTHN_AUTHENTICATOR_ATTACHMENT_CROSS_PLATFORM,
        CrossPlatformU2fV2 => WEBAUTHN_AUTHENTICATOR_ATTACHMENT_CROSS_PLATFORM_U2F_V2,
    }
}

/// Converts a [UserVerification] into a value for
/// [WEBAUTHN_AUTHENTICATOR_MAKE_CREDENTIAL_OPTIONS::dwUserVerificationRequirement]
fn user_verification_to_native(policy: UserVerification) -> u32 {
    use UserVerification::*;
    match policy {
        Any => WEBAUTHN_USER_VERIFICATION_REQUIREMENT_ANY,
        Required => WEBAUTHN_USER_VERIFICATION_REQUIREMENT_REQUIRED,
        Preferred => WEBAUTHN_USER_VERIFICATION_REQUIREMENT_PREFERRED,
        Discouraged => WEBAUTHN_USER_VERIFICATION_REQUIREMENT_DISCOURAGED,
    }
}

/// Converts an [AttestationConveyance] into a value for
/// [WEBAUTHN_AUTHENTICATOR_MAKE_CREDENTIAL_OPTIONS::dwAttestationConveyancePreference]
fn attestation_to_native(conveyance: AttestationConveyance) -> u32 {
    use AttestationConveyance::*;
    match conveyance {
        Any => WEBAUTHN_ATTESTATION_CONVEYANCE_PREFERENCE_ANY,
        None => WEBAUTHN_ATTESTATION_CONVEYANCE_PREFERENCE_NONE,
        Indirect => WEBAUTHN_ATTESTATION_CONVEYANCE_PREFERENCE_INDIRECT,
        Direct => WEBAUTHN_ATTESTATION_CONVEYANCE_PREFERENCE_DIRECT,
    }
}
