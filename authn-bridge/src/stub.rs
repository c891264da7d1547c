//! Backend for platforms without a supported WebAuthn API.
use crate::{
    cancel::CancellationToken,
    error::{BridgeError, Result},
    options::CeremonyOptions,
    types::{AssertionResult, AuthenticateRequest, RegisterRequest, RegistrationResult, UiContext},
    PlatformAuthenticator,
};

/// Always fails with [BridgeError::NotSupported].
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl PlatformAuthenticator for Unsupported {
    fn make_credential(
        &mut self,
        _ui: UiContext,
        _options: &CeremonyOptions,
        _request: &RegisterRequest,
        _cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        error!("no platform authenticator API on this build");
        Err(BridgeError::NotSupported)
    }

    fn get_assertion(
        &mut self,
        _ui: UiContext,
        _options: &CeremonyOptions,
        _request: &AuthenticateRequest,
        _cancel: &CancellationToken,
    ) -> Result<AssertionResult> {
        error!("no platform authenticator API on this build");
        Err(BridgeError::NotSupported)
    }
}
