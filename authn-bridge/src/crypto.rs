//! Common cryptographic routines.
use openssl::{
    bn::{BigNum, BigNumContext},
    ec::{EcGroup, EcKey, EcPoint},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Public},
    sha::Sha256,
    sign::Verifier,
};

use crate::attestation::CoseKey;
use crate::error::{BridgeError, Result};

pub type SHA256Hash = [u8; 32];

pub fn compute_sha256(data: &[u8]) -> SHA256Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finish()
}

/// Gets an [EcGroup] for P-256
pub fn get_group() -> Result<EcGroup> {
    Ok(EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?)
}

impl CoseKey {
    /// Converts an ES256 [CoseKey] into an OpenSSL public key.
    pub fn to_openssl_pkey(&self) -> Result<PKey<Public>> {
        let group = get_group()?;
        let mut ctx = BigNumContext::new()?;
        let x = BigNum::from_slice(&self.x)?;
        let y = BigNum::from_slice(&self.y)?;

        let mut point = EcPoint::new(&group)?;
        point.set_affine_coordinates_gfp(&group, &x, &y, &mut ctx)?;
        let key = EcKey::from_public_key(&group, &point)?;
        key.check_key()?;
        Ok(PKey::from_ec_key(key)?)
    }

    /// Verifies an ES256 `signature` over `authenticator_data ||
    /// client_data_hash`.
    pub fn verify_assertion(
        &self,
        authenticator_data: &[u8],
        client_data_hash: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let pkey = self.to_openssl_pkey()?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)?;
        verifier.update(authenticator_data)?;
        verifier.update(client_data_hash)?;
        verifier.verify(signature).map_err(|e| {
            error!("signature verification error: {:?}", e);
            BridgeError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_answer() {
        assert_eq!(
            compute_sha256(b"abc"),
            [
                0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
                0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
                0xf2, 0x00, 0x15, 0xad,
            ]
        );
    }

    #[test]
    fn cose_key_off_curve_is_rejected() {
        let _ = tracing_subscriber::fmt::try_init();
        let k = CoseKey {
            x: vec![1; 32],
            y: vec![2; 32],
        };
        assert!(matches!(k.to_openssl_pkey(), Err(BridgeError::OpenSSL(_))));
    }
}
