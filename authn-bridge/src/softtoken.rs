//! In-memory software authenticator.
//!
//! ## Warning
//!
//! **[SoftToken] is intended for testing purposes only.** Its credentials
//! live in memory, are never protected, and are lost when it is dropped.
use std::collections::{BTreeMap, HashMap};
use std::iter;
use std::sync::mpsc;
use std::time::Duration;

use openssl::x509::{
    extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier},
    X509NameBuilder, X509,
};
use openssl::{asn1, bn, ec, hash, pkey, rand, sign};
use serde_cbor_2::Value;
use uuid::Uuid;

use crate::{
    attestation::{CoseKey, FLAG_AT, FLAG_UP},
    cancel::CancellationToken,
    crypto::{compute_sha256, get_group},
    error::{BridgeError, Result},
    options::{AttestationConveyance, AuthenticatorAttachment, CeremonyOptions, UserVerification},
    types::{
        transport, AssertionResult, AuthenticateRequest, KeyHandle, RegisterRequest,
        RegistrationResult, UiContext, COSE_ALG_ES256,
    },
    PlatformAuthenticator,
};

pub const AAGUID: Uuid = uuid::uuid!("6e7c3f0a-52b4-4d1e-9a38-1c2f0b7d5e91");

const CREDENTIAL_ID_LEN: usize = 32;

pub struct SoftToken {
    attestation_key: pkey::PKey<pkey::Private>,
    attestation_cert: X509,
    /// Credential ID -> DER private key.
    tokens: HashMap<Vec<u8>, Vec<u8>>,
    counter: u32,
    presence_delay: Option<Duration>,
}

impl std::fmt::Debug for SoftToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftToken")
            .field("credentials", &self.tokens.len())
            .field("counter", &self.counter)
            .field("presence_delay", &self.presence_delay)
            .finish()
    }
}

/// Builds the self-signed certificate used for `packed` attestation.
fn build_attestation_cert() -> Result<(pkey::PKey<pkey::Private>, X509)> {
    let ecgroup = get_group()?;
    let eckey = ec::EcKey::generate(&ecgroup)?;
    let key = pkey::PKey::from_ec_key(eckey)?;

    let mut x509_name = X509NameBuilder::new()?;
    x509_name.append_entry_by_text("C", "AU")?;
    x509_name.append_entry_by_text("O", "authn-bridge")?;
    // Requirement of packed attestation.
    x509_name.append_entry_by_text("OU", "Authenticator Attestation")?;
    x509_name.append_entry_by_text("CN", "SoftToken Attestation")?;
    let x509_name = x509_name.build();

    let mut cert_builder = X509::builder()?;
    // Yes, 2 actually means 3 here ...
    cert_builder.set_version(2)?;

    let mut serial = bn::BigNum::new()?;
    serial.rand(64, bn::MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;
    cert_builder.set_serial_number(&serial)?;
    cert_builder.set_subject_name(&x509_name)?;
    cert_builder.set_issuer_name(&x509_name)?;

    let not_before = asn1::Asn1Time::days_from_now(0)?;
    cert_builder.set_not_before(&not_before)?;
    let not_after = asn1::Asn1Time::days_from_now(1)?;
    cert_builder.set_not_after(&not_after)?;

    cert_builder.append_extension(BasicConstraints::new().build()?)?;
    cert_builder.append_extension(KeyUsage::new().critical().digital_signature().build()?)?;
    let subject_key_identifier =
        SubjectKeyIdentifier::new().build(&cert_builder.x509v3_context(None, None))?;
    cert_builder.append_extension(subject_key_identifier)?;

    cert_builder.set_pubkey(&key)?;
    cert_builder.sign(&key, hash::MessageDigest::sha256())?;

    Ok((key, cert_builder.build()))
}

/// Extracts the affine coordinates of an EC public key, left-padded to 32
/// bytes each.
fn public_key_coords(eckey: &ec::EcKeyRef<pkey::Private>) -> Result<CoseKey> {
    let ecgroup = get_group()?;
    let mut bnctx = bn::BigNumContext::new()?;
    let mut xbn = bn::BigNum::new()?;
    let mut ybn = bn::BigNum::new()?;
    eckey
        .public_key()
        .affine_coordinates_gfp(&ecgroup, &mut xbn, &mut ybn, &mut bnctx)?;

    Ok(CoseKey {
        x: xbn.to_vec_padded(32)?,
        y: ybn.to_vec_padded(32)?,
    })
}

fn sign_with(key: &pkey::PKeyRef<pkey::Private>, parts: &[&[u8]]) -> Result<Vec<u8>> {
    let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), key)?;
    for p in parts {
        signer.update(p)?;
    }
    Ok(signer.sign_to_vec()?)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

impl SoftToken {
    pub fn new() -> Result<Self> {
        let (attestation_key, attestation_cert) = build_attestation_cert()?;
        Ok(SoftToken {
            attestation_key,
            attestation_cert,
            tokens: HashMap::new(),
            counter: 0,
            presence_delay: None,
        })
    }

    /// Simulates the user taking `delay` to touch the token. Ceremonies with
    /// a shorter timeout fail with [BridgeError::Cancelled], as do ceremonies
    /// cancelled while waiting.
    pub fn with_presence_delay(mut self, delay: Duration) -> Self {
        self.presence_delay = Some(delay);
        self
    }

    /// Certificate in the `x5c` of every `packed` attestation statement.
    pub fn attestation_cert(&self) -> &X509 {
        &self.attestation_cert
    }

    /// Global signature counter, shared by all credentials.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn credential_count(&self) -> usize {
        self.tokens.len()
    }

    fn check_options(options: &CeremonyOptions) -> Result<()> {
        if options.attachment == AuthenticatorAttachment::Platform {
            error!("Platform Attachment not supported by softtoken");
            return Err(BridgeError::NotSupported);
        }
        if options.user_verification == UserVerification::Required {
            error!("User Verification not supported by softtoken");
            return Err(BridgeError::NotSupported);
        }
        Ok(())
    }

    /// Waits for the simulated user, bailing out on cancellation or timeout.
    fn wait_for_presence(&self, timeout_ms: u32, cancel: &CancellationToken) -> Result<()> {
        let delay = match self.presence_delay {
            Some(d) => d,
            None => return cancel.check(),
        };

        let (tx, rx) = mpsc::channel();
        let _registration = cancel.register(move || {
            let _ = tx.send(());
        })?;

        let timeout = Duration::from_millis(u64::from(timeout_ms));
        match rx.recv_timeout(delay.min(timeout)) {
            Ok(()) => {
                debug!("softtoken ceremony cancelled");
                Err(BridgeError::Cancelled)
            }
            Err(mpsc::RecvTimeoutError::Timeout) if delay > timeout => {
                debug!("softtoken ceremony timed out");
                Err(BridgeError::Cancelled)
            }
            Err(_) => Ok(()),
        }
    }

    fn attestation_statement(
        &self,
        conveyance: AttestationConveyance,
        authdata: &[u8],
        client_data_hash: &[u8],
    ) -> Result<(&'static str, Value)> {
        if conveyance == AttestationConveyance::None {
            return Ok(("none", Value::Map(BTreeMap::new())));
        }

        let signature = sign_with(&self.attestation_key, &[authdata, client_data_hash])?;

        let mut att_stmt_map = BTreeMap::new();
        att_stmt_map.insert(text("alg"), Value::Integer(i128::from(COSE_ALG_ES256)));
        att_stmt_map.insert(
            text("x5c"),
            Value::Array(vec![Value::Bytes(self.attestation_cert.to_der()?)]),
        );
        att_stmt_map.insert(text("sig"), Value::Bytes(signature));
        Ok(("packed", Value::Map(att_stmt_map)))
    }
}

impl PlatformAuthenticator for SoftToken {
    fn make_credential(
        &mut self,
        _ui: UiContext,
        options: &CeremonyOptions,
        request: &RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegistrationResult> {
        Self::check_options(options)?;

        if let Some(k) = request
            .exclude_credentials
            .iter()
            .find(|k| self.tokens.contains_key(k.as_bytes()))
        {
            error!(?k, "softtoken already holds an excluded credential");
            return Err(BridgeError::CredentialExcluded);
        }

        self.wait_for_presence(request.timeout_ms, cancel)?;

        let client_data_hash = compute_sha256(&request.client_data);
        let rp_id_hash = compute_sha256(request.rp_id.as_bytes());

        let mut key_handle = vec![0; CREDENTIAL_ID_LEN];
        rand::rand_bytes(key_handle.as_mut_slice())?;

        let group = get_group()?;
        let eckey = ec::EcKey::generate(&group)?;
        let cose_key = public_key_coords(&eckey)?;
        let ecpriv_der = eckey.private_key_to_der()?;

        let pk_cbor_bytes = serde_cbor_2::to_vec(&Value::from(&cose_key))?;
        let key_handle_len =
            u16::try_from(key_handle.len()).map_err(|_| BridgeError::Internal)?;

        // Registrations always start the counter at 0.
        let authdata: Vec<u8> = rp_id_hash
            .iter()
            .copied()
            .chain(iter::once(FLAG_AT | FLAG_UP))
            .chain(0u32.to_be_bytes())
            .chain(AAGUID.as_bytes().iter().copied())
            .chain(key_handle_len.to_be_bytes())
            .chain(key_handle.iter().copied())
            .chain(pk_cbor_bytes)
            .collect();

        let (fmt, att_stmt) =
            self.attestation_statement(options.attestation, &authdata, &client_data_hash)?;

        let mut attest_map = BTreeMap::new();
        attest_map.insert(text("fmt"), text(fmt));
        attest_map.insert(text("attStmt"), att_stmt);
        attest_map.insert(text("authData"), Value::Bytes(authdata));
        let attestation_object = serde_cbor_2::to_vec(&Value::Map(attest_map))?;

        // Nothing can fail from here.
        self.tokens.insert(key_handle.clone(), ecpriv_der);
        debug!(credential_id = ?KeyHandle::from(key_handle.as_slice()), "softtoken registered");

        Ok(RegistrationResult {
            attestation_object,
            credential_id: key_handle,
            used_transports: transport::TEST,
        })
    }

    fn get_assertion(
        &mut self,
        _ui: UiContext,
        options: &CeremonyOptions,
        request: &AuthenticateRequest,
        cancel: &CancellationToken,
    ) -> Result<AssertionResult> {
        Self::check_options(options)?;

        let (key_handle, pkder) = request
            .allow_credentials
            .iter()
            .find_map(|k| self.tokens.get(k.as_bytes()).map(|v| (k.clone(), v.clone())))
            .ok_or_else(|| {
                error!("Credential ID not found");
                BridgeError::NoMatchingCredential
            })?;
        debug!("Using -> {:?}", key_handle);

        self.wait_for_presence(request.timeout_ms, cancel)?;

        let client_data_hash = compute_sha256(&request.client_data);
        let rp_id_hash = compute_sha256(request.rp_id.as_bytes());

        let eckey = ec::EcKey::private_key_from_der(pkder.as_slice())?;
        let pkey = pkey::PKey::from_ec_key(eckey)?;

        let counter = self.counter.checked_add(1).ok_or(BridgeError::Internal)?;

        let authdata: Vec<u8> = rp_id_hash
            .iter()
            .copied()
            .chain(iter::once(FLAG_UP))
            .chain(counter.to_be_bytes())
            .collect();

        trace!("Signing: {:?}", authdata);
        let signature = sign_with(&pkey, &[authdata.as_slice(), &client_data_hash[..]])?;
        self.counter = counter;

        Ok(AssertionResult {
            credential_id: key_handle.as_bytes().to_vec(),
            authenticator_data: authdata,
            signature,
            user_handle: None,
        })
    }
}
