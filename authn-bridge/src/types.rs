//! Request and response values for a single ceremony.
//!
//! None of these outlive the call they are used in: the bridge copies
//! everything it needs out of platform-owned memory into these types, and
//! releases the platform's copy before returning.
use std::ffi::c_void;
use std::fmt;

/// The only credential type in use: `"public-key"`.
pub const CREDENTIAL_TYPE_PUBLIC_KEY: &str = "public-key";

/// COSE algorithm identifier for ECDSA with P-256 and SHA-256 (`ES256`).
pub const COSE_ALG_ES256: i32 = -7;

/// Bitmask of transports, matching `WEBAUTHN_CTAP_TRANSPORT_*`.
pub mod transport {
    pub const USB: u32 = 0x0000_0001;
    pub const NFC: u32 = 0x0000_0002;
    pub const BLE: u32 = 0x0000_0004;
    pub const TEST: u32 = 0x0000_0008;
    pub const INTERNAL: u32 = 0x0000_0010;

    /// Transports offered for every key handle we pass to the platform.
    pub const ROAMING: u32 = USB | NFC | BLE;
}

/// Opaque reference to a previously registered credential.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle(Vec<u8>);

impl KeyHandle {
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self(id.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHandle({:02x?})", self.0)
    }
}

impl From<Vec<u8>> for KeyHandle {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for KeyHandle {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl AsRef<[u8]> for KeyHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Parameters for a "make credential" ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Collected client data. The platform hashes this with SHA-256 to get
    /// the client data hash which the authenticator signs.
    pub client_data: Vec<u8>,
    pub rp_id: String,
    pub user_name: String,
    /// Shown by the platform UI. Falls back to `user_name` when empty.
    pub display_name: String,
    /// Credentials which must not be registered again.
    pub exclude_credentials: Vec<KeyHandle>,
    pub timeout_ms: u32,
}

/// Parameters for a "get assertion" ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateRequest {
    /// Collected client data; see [RegisterRequest::client_data].
    pub client_data: Vec<u8>,
    pub rp_id: String,
    /// Credentials which may be used to sign. Must not be empty.
    pub allow_credentials: Vec<KeyHandle>,
    pub timeout_ms: u32,
}

/// Output of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationResult {
    /// CBOR attestation object, returned as-is for the relying party to
    /// verify.
    pub attestation_object: Vec<u8>,
    /// Credential ID, as reported by the platform.
    pub credential_id: Vec<u8>,
    /// Bitmask of [transport]s the platform used, or 0 if unknown.
    pub used_transports: u32,
}

/// Output of a successful assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    /// The credential which produced [AssertionResult::signature].
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    /// Signature over `authenticator_data || SHA-256(client_data)`.
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

/// Native window handle (`HWND` on Windows).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawWindowHandle(pub *mut c_void);

impl fmt::Debug for RawWindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawWindowHandle({:p})", self.0)
    }
}

/// Window the platform UI should attach its dialog to.
///
/// This is passed into every ceremony explicitly, so that nothing below
/// [crate::Bridge] needs to look up ambient UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiContext {
    /// Attach to this window.
    Window(RawWindowHandle),
    /// Look up the current foreground window when the ceremony starts.
    #[default]
    Foreground,
    /// Don't attach to any window.
    None,
}

impl UiContext {
    /// Converts a possibly-null native handle. A null handle means
    /// [UiContext::Foreground].
    pub fn from_raw(hwnd: *mut c_void) -> Self {
        if hwnd.is_null() {
            UiContext::Foreground
        } else {
            UiContext::Window(RawWindowHandle(hwnd))
        }
    }
}
