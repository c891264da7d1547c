use std::sync::PoisonError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The client data was empty.
    #[error("client data must not be empty")]
    InvalidClientData,
    /// The relying party identifier was empty or not valid text.
    #[error("relying party id must be non-empty text")]
    InvalidRelyingParty,
    /// The user name was empty or not valid text.
    #[error("user name must be non-empty text")]
    InvalidUser,
    /// A key handle in an allow or exclude list was empty.
    #[error("key handles must not be empty")]
    InvalidKeyHandle,
    /// The ceremony timeout was zero.
    #[error("timeout must be a positive number of milliseconds")]
    InvalidTimeout,
    /// An assertion was requested without any credentials to assert.
    #[error("no allowed credentials were supplied")]
    NoAllowedCredentials,
    /// The ceremony was cancelled, either by the caller, the user, or because
    /// it timed out.
    #[error("operation was cancelled")]
    Cancelled,
    /// The authenticator already holds one of the excluded credentials.
    #[error("authenticator already contains an excluded credential")]
    CredentialExcluded,
    /// None of the allowed credentials are known to the authenticator.
    #[error("no matching credential on the authenticator")]
    NoMatchingCredential,
    /// The backend or the authenticator does not support this request.
    #[error("not supported by this backend")]
    NotSupported,
    /// The platform reported success but left out a required value. This may
    /// indicate a bug in this library, or in the platform.
    #[error("platform response was missing a required field")]
    MissingRequiredField,
    /// The platform API returned an error code.
    #[error("platform error {name} ({code:#010x})")]
    Platform { code: u32, name: String },
    #[error("CBOR encoding error")]
    Cbor,
    #[error("could not parse authenticator data")]
    ParseNOMFailure,
    #[error("OpenSSL error: {0}")]
    OpenSSL(String),
    /// See [PoisonError]; generally indicates that a method holding a prior
    /// lock on the mutex failed.
    #[error("poisoned mutex")]
    PoisonedMutex,
    #[error("internal error, likely library bug")]
    Internal,
}

impl<T> From<PoisonError<T>> for BridgeError {
    fn from(_: PoisonError<T>) -> Self {
        Self::PoisonedMutex
    }
}

#[cfg(feature = "crypto")]
impl From<openssl::error::ErrorStack> for BridgeError {
    fn from(v: openssl::error::ErrorStack) -> Self {
        Self::OpenSSL(v.to_string())
    }
}

impl From<serde_cbor_2::Error> for BridgeError {
    fn from(_: serde_cbor_2::Error) -> Self {
        Self::Cbor
    }
}
