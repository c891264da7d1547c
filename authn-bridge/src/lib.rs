//! authn-bridge is a thin layer between a managed caller and the platform's
//! WebAuthn / FIDO2 authenticator API.
//!
//! It performs the two ceremonies a client needs to log in with a security
//! key:
//!
//! * registration ("make credential"), which returns an attestation object
//!   for the relying party to verify, and
//! * authentication ("get assertion"), which returns the authenticator data,
//!   signature and credential ID for the relying party to verify.
//!
//! All cryptography, authenticator discovery, transports and user interface
//! are handled by the operating system. This library only builds requests,
//! calls the platform, and copies the results into memory the caller owns.
//!
//! Callers from other languages use the C ABI in [ffi]; Rust callers use
//! [Bridge] directly.
//!
//! ## Features
//!
//! * `win10`: [Windows 10][crate::win10] WebAuthn API backend (default)
//! * `softtoken`: [SoftToken][crate::softtoken::SoftToken], an in-memory
//!   software authenticator for testing [^openssl]
//! * `crypto`: OpenSSL support, for verifying signatures against
//!   [COSE keys][crate::attestation::CoseKey] [^openssl]
//! * `ffi-logging`: install a `tracing` subscriber on the first C ABI call
//!   (default)
//!
//! [^openssl]: Feature requires OpenSSL.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

pub mod attestation;
pub mod cancel;
#[cfg(feature = "crypto")]
pub mod crypto;
pub mod error;
pub mod ffi;
pub mod options;
#[cfg(feature = "softtoken")]
pub mod softtoken;
pub mod stub;
pub mod types;
#[cfg(all(windows, feature = "win10"))]
pub mod win10;

use crate::cancel::CancellationToken;
use crate::error::{BridgeError, Result};
use crate::options::CeremonyOptions;
use crate::types::{
    AssertionResult, AuthenticateRequest, KeyHandle, RegisterRequest, RegistrationResult,
    UiContext,
};

pub mod prelude {
    pub use crate::cancel::CancellationToken;
    pub use crate::error::BridgeError;
    pub use crate::options::CeremonyOptions;
    pub use crate::types::{
        AssertionResult, AuthenticateRequest, KeyHandle, RegisterRequest, RegistrationResult,
        UiContext,
    };
    pub use crate::{platform_backend, Bridge, PlatformAuthenticator};
}

/// A platform authenticator API.
///
/// Implementations get requests which [Bridge] has already validated, and
/// with timeouts already clamped.
pub trait PlatformAuthenticator {
    fn make_credential(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult>;

    fn get_assertion(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &AuthenticateRequest,
        cancel: &CancellationToken,
    ) -> Result<AssertionResult>;
}

impl<T: PlatformAuthenticator + ?Sized> PlatformAuthenticator for Box<T> {
    fn make_credential(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        (**self).make_credential(ui, options, request, cancel)
    }

    fn get_assertion(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &AuthenticateRequest,
        cancel: &CancellationToken,
    ) -> Result<AssertionResult> {
        (**self).get_assertion(ui, options, request, cancel)
    }
}

impl<T: PlatformAuthenticator + ?Sized> PlatformAuthenticator for &mut T {
    fn make_credential(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        (**self).make_credential(ui, options, request, cancel)
    }

    fn get_assertion(
        &mut self,
        ui: UiContext,
        options: &CeremonyOptions,
        request: &AuthenticateRequest,
        cancel: &CancellationToken,
    ) -> Result<AssertionResult> {
        (**self).get_assertion(ui, options, request, cancel)
    }
}

/// Returns the platform authenticator for this build: the Windows WebAuthn
/// API where available, otherwise a backend which always fails with
/// [BridgeError::NotSupported].
pub fn platform_backend() -> Box<dyn PlatformAuthenticator> {
    #[cfg(all(windows, feature = "win10"))]
    {
        Box::<win10::Win10>::default()
    }

    #[cfg(not(all(windows, feature = "win10")))]
    {
        Box::new(stub::Unsupported)
    }
}

/// Validates requests and results around a [PlatformAuthenticator].
pub struct Bridge<T>
where
    T: PlatformAuthenticator,
{
    backend: T,
    options: CeremonyOptions,
}

impl<T> Bridge<T>
where
    T: PlatformAuthenticator,
{
    pub fn new(backend: T) -> Self {
        Self::with_options(backend, CeremonyOptions::default())
    }

    pub fn with_options(backend: T, options: CeremonyOptions) -> Self {
        Bridge { backend, options }
    }

    pub fn options(&self) -> &CeremonyOptions {
        &self.options
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut T {
        &mut self.backend
    }

    /// Registers a new credential.
    ///
    /// This blocks until the user completes the platform's UI, the ceremony
    /// times out, or `cancel` is cancelled.
    pub fn register(
        &mut self,
        ui: UiContext,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        check_client_data(&request.client_data)?;
        check_rp_id(&request.rp_id)?;
        check_user(&request.user_name, &request.display_name)?;
        check_key_handles(&request.exclude_credentials)?;
        let timeout_ms = self.check_timeout(request.timeout_ms)?;
        cancel.check()?;

        let mut request = request.clone();
        request.timeout_ms = timeout_ms;
        if request.display_name.is_empty() {
            request.display_name = request.user_name.clone();
        }

        debug!(
            rp_id = %request.rp_id,
            excluded = request.exclude_credentials.len(),
            timeout_ms,
            "starting registration"
        );

        let r = self
            .backend
            .make_credential(ui, &self.options, &request, cancel)
            .inspect_err(|e| error!(?e, "registration failed"))?;

        if r.attestation_object.is_empty() {
            error!("platform returned an empty attestation object");
            return Err(BridgeError::MissingRequiredField);
        }

        trace!(?r);
        Ok(r)
    }

    /// Signs `request.client_data` with one of `request.allow_credentials`.
    ///
    /// This blocks the same way as [Bridge::register].
    pub fn authenticate(
        &mut self,
        ui: UiContext,
        request: &AuthenticateRequest,
        cancel: &CancellationToken,
    ) -> Result<AssertionResult> {
        check_client_data(&request.client_data)?;
        check_rp_id(&request.rp_id)?;
        if request.allow_credentials.is_empty() {
            error!("no credentials to assert");
            return Err(BridgeError::NoAllowedCredentials);
        }
        check_key_handles(&request.allow_credentials)?;
        let timeout_ms = self.check_timeout(request.timeout_ms)?;
        cancel.check()?;

        let mut request = request.clone();
        request.timeout_ms = timeout_ms;

        debug!(
            rp_id = %request.rp_id,
            allowed = request.allow_credentials.len(),
            timeout_ms,
            "starting authentication"
        );

        let r = self
            .backend
            .get_assertion(ui, &self.options, &request, cancel)
            .inspect_err(|e| error!(?e, "authentication failed"))?;

        if r.credential_id.is_empty() || r.authenticator_data.is_empty() || r.signature.is_empty()
        {
            error!("platform returned an incomplete assertion");
            return Err(BridgeError::MissingRequiredField);
        }

        trace!(?r);
        Ok(r)
    }

    fn check_timeout(&self, timeout_ms: u32) -> Result<u32> {
        if timeout_ms == 0 {
            error!("timeout must be greater than zero");
            return Err(BridgeError::InvalidTimeout);
        }
        let clamped = self.options.clamp_timeout(timeout_ms);
        if clamped != timeout_ms {
            debug!("timeout clamped from {} to {} ms", timeout_ms, clamped);
        }
        Ok(clamped)
    }
}

fn check_client_data(client_data: &[u8]) -> Result<()> {
    if client_data.is_empty() {
        error!("client data is empty");
        Err(BridgeError::InvalidClientData)
    } else {
        Ok(())
    }
}

fn check_rp_id(rp_id: &str) -> Result<()> {
    if rp_id.is_empty() || rp_id.contains('\0') {
        error!("relying party id is empty or contains NUL");
        Err(BridgeError::InvalidRelyingParty)
    } else {
        Ok(())
    }
}

fn check_user(user_name: &str, display_name: &str) -> Result<()> {
    if user_name.is_empty() || user_name.contains('\0') || display_name.contains('\0') {
        error!("user name is empty, or a user name contains NUL");
        Err(BridgeError::InvalidUser)
    } else {
        Ok(())
    }
}

fn check_key_handles(handles: &[KeyHandle]) -> Result<()> {
    if handles.iter().any(KeyHandle::is_empty) {
        error!("key handle list contains an empty key handle");
        Err(BridgeError::InvalidKeyHandle)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend which records whether it was called, and returns canned
    /// results.
    #[derive(Default)]
    struct Canned {
        calls: usize,
        last_timeout_ms: u32,
        last_display_name: String,
        registration: Option<RegistrationResult>,
        assertion: Option<AssertionResult>,
    }

    impl PlatformAuthenticator for Canned {
        fn make_credential(
            &mut self,
            _ui: UiContext,
            _options: &CeremonyOptions,
            request: &RegisterRequest,
            _cancel: &CancellationToken,
        ) -> Result<RegistrationResult> {
            self.calls += 1;
            self.last_timeout_ms = request.timeout_ms;
            self.last_display_name = request.display_name.clone();
            self.registration.clone().ok_or(BridgeError::Cancelled)
        }

        fn get_assertion(
            &mut self,
            _ui: UiContext,
            _options: &CeremonyOptions,
            request: &AuthenticateRequest,
            _cancel: &CancellationToken,
        ) -> Result<AssertionResult> {
            self.calls += 1;
            self.last_timeout_ms = request.timeout_ms;
            self.assertion.clone().ok_or(BridgeError::NoMatchingCredential)
        }
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            client_data: b"{}".to_vec(),
            rp_id: "example.com".to_string(),
            user_name: "alice".to_string(),
            display_name: String::new(),
            exclude_credentials: vec![],
            timeout_ms: 30_000,
        }
    }

    fn authenticate_request() -> AuthenticateRequest {
        AuthenticateRequest {
            client_data: b"{}".to_vec(),
            rp_id: "example.com".to_string(),
            allow_credentials: vec![KeyHandle::new(vec![1, 2, 3])],
            timeout_ms: 30_000,
        }
    }

    fn canned() -> Canned {
        Canned {
            registration: Some(RegistrationResult {
                attestation_object: vec![0xa0],
                credential_id: vec![1],
                used_transports: 0,
            }),
            assertion: Some(AssertionResult {
                credential_id: vec![1, 2, 3],
                authenticator_data: vec![0; 37],
                signature: vec![0x30],
                user_handle: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_register_requests_never_reach_backend() {
        let _ = tracing_subscriber::fmt::try_init();
        let mut b = Bridge::new(canned());
        let cancel = CancellationToken::new();
        let mut reject = |r: RegisterRequest, expected: BridgeError| {
            assert_eq!(b.register(UiContext::None, &r, &cancel), Err(expected));
        };

        let mut r = register_request();
        r.client_data.clear();
        reject(r, BridgeError::InvalidClientData);

        let mut r = register_request();
        r.rp_id.clear();
        reject(r, BridgeError::InvalidRelyingParty);

        let mut r = register_request();
        r.rp_id = "example.com\0".to_string();
        reject(r, BridgeError::InvalidRelyingParty);

        let mut r = register_request();
        r.user_name.clear();
        reject(r, BridgeError::InvalidUser);

        let mut r = register_request();
        r.user_name = "al\0ice".to_string();
        reject(r, BridgeError::InvalidUser);

        let mut r = register_request();
        r.display_name = "Alice\0Smith".to_string();
        reject(r, BridgeError::InvalidUser);

        let mut r = register_request();
        r.timeout_ms = 0;
        reject(r, BridgeError::InvalidTimeout);

        let mut r = register_request();
        r.exclude_credentials.push(KeyHandle::new(vec![]));
        reject(r, BridgeError::InvalidKeyHandle);

        assert_eq!(b.backend().calls, 0);
    }

    #[test]
    fn invalid_authenticate_requests_never_reach_backend() {
        let _ = tracing_subscriber::fmt::try_init();
        let mut b = Bridge::new(canned());
        let cancel = CancellationToken::new();
        let mut reject = |r: AuthenticateRequest, expected: BridgeError| {
            assert_eq!(b.authenticate(UiContext::None, &r, &cancel), Err(expected));
        };

        let mut r = authenticate_request();
        r.client_data.clear();
        reject(r, BridgeError::InvalidClientData);

        let mut r = authenticate_request();
        r.rp_id.clear();
        reject(r, BridgeError::InvalidRelyingParty);

        let mut r = authenticate_request();
        r.timeout_ms = 0;
        reject(r, BridgeError::InvalidTimeout);

        let mut r = authenticate_request();
        r.allow_credentials.clear();
        reject(r, BridgeError::NoAllowedCredentials);

        let mut r = authenticate_request();
        r.allow_credentials.push(KeyHandle::new(vec![]));
        reject(r, BridgeError::InvalidKeyHandle);

        assert_eq!(b.backend().calls, 0);
    }

    #[test]
    fn cancelled_token_fails_before_backend() {
        let mut b = Bridge::new(canned());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            b.register(UiContext::None, &register_request(), &cancel),
            Err(BridgeError::Cancelled)
        );
        assert_eq!(
            b.authenticate(UiContext::None, &authenticate_request(), &cancel),
            Err(BridgeError::Cancelled)
        );
        assert_eq!(b.backend().calls, 0);
    }

    #[test]
    fn timeout_is_clamped_and_display_name_defaulted() {
        let mut b = Bridge::with_options(canned(), CeremonyOptions::default().max_timeout_ms(1000));
        let cancel = CancellationToken::new();

        let r = b
            .register(UiContext::None, &register_request(), &cancel)
            .unwrap();
        assert_eq!(r.attestation_object, vec![0xa0]);
        assert_eq!(b.backend().last_timeout_ms, 1000);
        assert_eq!(b.backend().last_display_name, "alice");

        b.authenticate(UiContext::None, &authenticate_request(), &cancel)
            .unwrap();
        assert_eq!(b.backend().last_timeout_ms, 1000);
        assert_eq!(b.backend().calls, 2);
    }

    #[test]
    fn empty_platform_results_are_rejected() {
        let mut backend = canned();
        backend.registration.as_mut().unwrap().attestation_object.clear();
        backend.assertion.as_mut().unwrap().signature.clear();
        let mut b = Bridge::new(backend);
        let cancel = CancellationToken::new();

        assert_eq!(
            b.register(UiContext::None, &register_request(), &cancel),
            Err(BridgeError::MissingRequiredField)
        );
        assert_eq!(
            b.authenticate(UiContext::None, &authenticate_request(), &cancel),
            Err(BridgeError::MissingRequiredField)
        );
    }

    #[test]
    fn backend_errors_pass_through() {
        let mut b = Bridge::new(Canned::default());
        let cancel = CancellationToken::new();
        assert_eq!(
            b.authenticate(UiContext::None, &authenticate_request(), &cancel),
            Err(BridgeError::NoMatchingCredential)
        );
    }

    #[test]
    fn stub_backend_is_not_supported() {
        let mut b = Bridge::new(stub::Unsupported);
        let cancel = CancellationToken::new();
        assert_eq!(
            b.register(UiContext::None, &register_request(), &cancel),
            Err(BridgeError::NotSupported)
        );
        assert_eq!(
            b.authenticate(UiContext::None, &authenticate_request(), &cancel),
            Err(BridgeError::NotSupported)
        );
    }
}
