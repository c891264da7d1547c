//! Parsers for the attestation object returned by registration.
//!
//! The bridge itself never verifies attestations; that's the relying
//! party's job. These parsers exist so that callers (and tests) can pull the
//! credential ID and public key out of a registration, to use for later
//! authentications.
//!
//! Layout reference: <https://www.w3.org/TR/webauthn-2/#sctn-attestation>
use std::collections::BTreeMap;

use nom::bytes::complete::take;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u32, be_u8};
use serde_cbor_2::Value;

use crate::error::{BridgeError, Result};
use crate::types::COSE_ALG_ES256;

/// User Present
pub const FLAG_UP: u8 = 1 << 0;
/// User Verified
pub const FLAG_UV: u8 = 1 << 2;
/// Attested credential data included
pub const FLAG_AT: u8 = 1 << 6;
/// Extension data included
pub const FLAG_ED: u8 = 1 << 7;

/// ES256 public key, in uncompressed affine coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseKey {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl TryFrom<&Value> for CoseKey {
    type Error = BridgeError;

    fn try_from(v: &Value) -> Result<Self> {
        let m = cbor_try_map!(v)?;
        let get = |k: i128| m.get(&Value::Integer(k)).ok_or(BridgeError::Cbor);

        // kty: EC2
        if cbor_try_i128!(get(1)?)? != 2 {
            error!("COSE key is not EC2");
            return Err(BridgeError::NotSupported);
        }
        // alg is optional, but if present must be ES256.
        if let Some(alg) = m.get(&Value::Integer(3)) {
            if cbor_try_i128!(alg)? != i128::from(COSE_ALG_ES256) {
                error!("COSE key algorithm is not ES256");
                return Err(BridgeError::NotSupported);
            }
        }
        // crv: P-256
        if cbor_try_i128!(get(-1)?)? != 1 {
            error!("COSE key curve is not P-256");
            return Err(BridgeError::NotSupported);
        }

        let x = cbor_try_bytes!(get(-2)?)?;
        let y = cbor_try_bytes!(get(-3)?)?;
        if x.len() != 32 || y.len() != 32 {
            error!("COSE key coordinates are not 32 bytes");
            return Err(BridgeError::Cbor);
        }

        Ok(CoseKey {
            x: x.clone(),
            y: y.clone(),
        })
    }
}

impl From<&CoseKey> for Value {
    fn from(k: &CoseKey) -> Value {
        let mut map = BTreeMap::new();
        // KeyType -> EC2
        map.insert(Value::Integer(1), Value::Integer(2));
        // Alg -> ES256
        map.insert(
            Value::Integer(3),
            Value::Integer(i128::from(COSE_ALG_ES256)),
        );
        // Curve -> P-256
        map.insert(Value::Integer(-1), Value::Integer(1));
        map.insert(Value::Integer(-2), Value::Bytes(k.x.clone()));
        map.insert(Value::Integer(-3), Value::Bytes(k.y.clone()));
        Value::Map(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub counter: u32,
    pub attested_credential: Option<AttestedCredentialData>,
    /// Raw CBOR extension outputs, if [FLAG_ED] is set.
    pub extensions: Option<Vec<u8>>,
}

impl AuthenticatorData {
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }
}

fn auth_data_header_parser(i: &[u8]) -> nom::IResult<&[u8], (&[u8], u8, u32)> {
    let (i, rp_id_hash) = take(32usize)(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, counter) = be_u32(i)?;
    Ok((i, (rp_id_hash, flags, counter)))
}

fn acd_header_parser(i: &[u8]) -> nom::IResult<&[u8], (&[u8], &[u8])> {
    let (i, aaguid) = take(16usize)(i)?;
    let (i, credential_id) = length_data(be_u16)(i)?;
    Ok((i, (aaguid, credential_id)))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = BridgeError;

    fn try_from(data: &[u8]) -> Result<Self> {
        let (rest, (rp_id_hash, flags, counter)) =
            auth_data_header_parser(data).map_err(|e| {
                error!(?e, "invalid authenticator data header");
                BridgeError::ParseNOMFailure
            })?;
        let rp_id_hash: [u8; 32] = rp_id_hash
            .try_into()
            .map_err(|_| BridgeError::ParseNOMFailure)?;

        let mut rest = rest;
        let attested_credential = if flags & FLAG_AT != 0 {
            let (r, (aaguid, credential_id)) = acd_header_parser(rest).map_err(|e| {
                error!(?e, "invalid attested credential data");
                BridgeError::ParseNOMFailure
            })?;
            let aaguid: [u8; 16] = aaguid
                .try_into()
                .map_err(|_| BridgeError::ParseNOMFailure)?;

            let (public_key, used) = if flags & FLAG_ED == 0 {
                // The key runs to the end of the buffer.
                let v: Value = serde_cbor_2::from_slice(r)?;
                (v, r.len())
            } else {
                // Extensions follow the key.
                let mut de = serde_cbor_2::Deserializer::from_slice(r).into_iter::<Value>();
                let v = de.next().ok_or(BridgeError::Cbor)??;
                let used = de.byte_offset();
                (v, used)
            };

            rest = r.get(used..).ok_or(BridgeError::ParseNOMFailure)?;
            Some(AttestedCredentialData {
                aaguid,
                credential_id: credential_id.to_vec(),
                public_key: CoseKey::try_from(&public_key)?,
            })
        } else {
            None
        };

        let extensions = if flags & FLAG_ED != 0 {
            let e = rest.to_vec();
            rest = &[];
            Some(e)
        } else {
            None
        };

        if !rest.is_empty() {
            error!("{} trailing bytes in authenticator data", rest.len());
            return Err(BridgeError::ParseNOMFailure);
        }

        Ok(AuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            attested_credential,
            extensions,
        })
    }
}

/// Decoded CBOR attestation object.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: Value,
    pub auth_data_bytes: Vec<u8>,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    /// The new credential's ID, from the attested credential data.
    pub fn credential_id(&self) -> Option<&[u8]> {
        self.auth_data
            .attested_credential
            .as_ref()
            .map(|acd| acd.credential_id.as_slice())
    }

    /// The new credential's public key, from the attested credential data.
    pub fn public_key(&self) -> Option<&CoseKey> {
        self.auth_data
            .attested_credential
            .as_ref()
            .map(|acd| &acd.public_key)
    }
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = BridgeError;

    fn try_from(data: &[u8]) -> Result<Self> {
        let v: Value = serde_cbor_2::from_slice(data).map_err(|e| {
            error!(?e, "attestation object is not CBOR");
            BridgeError::Cbor
        })?;
        let mut m = cbor_try_map!(v)?;

        let mut take_field = |k: &str| {
            m.remove(&Value::Text(k.to_string())).ok_or_else(|| {
                error!("attestation object has no {}", k);
                BridgeError::MissingRequiredField
            })
        };

        let fmt = cbor_try_string!(take_field("fmt")?)?;
        let att_stmt = take_field("attStmt")?;
        let auth_data_bytes = cbor_try_bytes!(take_field("authData")?)?;
        let auth_data = AuthenticatorData::try_from(auth_data_bytes.as_slice())?;

        Ok(AttestationObject {
            fmt,
            att_stmt,
            auth_data_bytes,
            auth_data,
        })
    }
}
