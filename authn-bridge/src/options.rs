//! Ceremony configuration.
//!
//! These are the knobs which are fixed for a given deployment, rather than
//! per request. The defaults reproduce what a U2F-style roaming key login
//! expects: a cross-platform authenticator, no user verification, and
//! direct attestation.
use serde::{Deserialize, Serialize};

/// Longest ceremony we let the platform run, in milliseconds. Requests above
/// this are clamped.
pub const DEFAULT_MAX_TIMEOUT_MS: u32 = 600_000;

/// Relying party display name used when none is configured.
pub const DEFAULT_RP_NAME: &str = "U2F";

/// How the authenticator should be attached to the client machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Any,
    Platform,
    CrossPlatform,
    /// Cross-platform, with the platform also allowed to use the CTAP1/U2F
    /// protocol.
    #[default]
    CrossPlatformU2fV2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Any,
    Required,
    Preferred,
    #[default]
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    Any,
    None,
    Indirect,
    /// Ask for the authenticator's real attestation statement.
    #[default]
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CeremonyOptions {
    /// Relying party name shown in the platform UI.
    pub rp_name: String,
    pub attachment: AuthenticatorAttachment,
    pub user_verification: UserVerification,
    pub attestation: AttestationConveyance,
    pub max_timeout_ms: u32,
}

impl Default for CeremonyOptions {
    fn default() -> Self {
        Self {
            rp_name: DEFAULT_RP_NAME.to_string(),
            attachment: AuthenticatorAttachment::default(),
            user_verification: UserVerification::default(),
            attestation: AttestationConveyance::default(),
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
        }
    }
}

impl CeremonyOptions {
    pub fn rp_name(mut self, rp_name: impl Into<String>) -> Self {
        self.rp_name = rp_name.into();
        self
    }

    pub fn attachment(mut self, attachment: AuthenticatorAttachment) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn user_verification(mut self, user_verification: UserVerification) -> Self {
        self.user_verification = user_verification;
        self
    }

    pub fn attestation(mut self, attestation: AttestationConveyance) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn max_timeout_ms(mut self, max_timeout_ms: u32) -> Self {
        self.max_timeout_ms = max_timeout_ms;
        self
    }

    /// Clamps a requested timeout to [CeremonyOptions::max_timeout_ms].
    ///
    /// A zero timeout is left alone, so that validation can reject it.
    pub(crate) fn clamp_timeout(&self, timeout_ms: u32) -> u32 {
        if self.max_timeout_ms > 0 && timeout_ms > self.max_timeout_ms {
            self.max_timeout_ms
        } else {
            timeout_ms
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_roaming_key_login() {
        let o = CeremonyOptions::default();
        assert_eq!(o.rp_name, "U2F");
        assert_eq!(o.attachment, AuthenticatorAttachment::CrossPlatformU2fV2);
        assert_eq!(o.user_verification, UserVerification::Discouraged);
        assert_eq!(o.attestation, AttestationConveyance::Direct);
        assert_eq!(o.max_timeout_ms, DEFAULT_MAX_TIMEOUT_MS);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let o: CeremonyOptions = serde_json::from_str(
            r#"{"rpName": "Example", "userVerification": "preferred"}"#,
        )
        .unwrap();
        assert_eq!(o.rp_name, "Example");
        assert_eq!(o.user_verification, UserVerification::Preferred);
        assert_eq!(o.attachment, AuthenticatorAttachment::CrossPlatformU2fV2);
        assert_eq!(o.attestation, AttestationConveyance::Direct);

        let o: CeremonyOptions =
            serde_json::from_str(r#"{"attachment": "cross-platform-u2f-v2"}"#).unwrap();
        assert_eq!(o.attachment, AuthenticatorAttachment::CrossPlatformU2fV2);
    }

    #[test]
    fn clamp_timeout() {
        let o = CeremonyOptions::default().max_timeout_ms(30_000);
        assert_eq!(o.clamp_timeout(0), 0);
        assert_eq!(o.clamp_timeout(1), 1);
        assert_eq!(o.clamp_timeout(30_000), 30_000);
        assert_eq!(o.clamp_timeout(30_001), 30_000);

        let o = CeremonyOptions::default().max_timeout_ms(0);
        assert_eq!(o.clamp_timeout(u32::MAX), u32::MAX);
    }
}
