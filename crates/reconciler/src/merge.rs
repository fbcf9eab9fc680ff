//! Bundle merge.
//!
//! Output order is `provider ++ user ++ system`:
//!
//! - system certificates are always present and always last;
//! - user certificates come right before them when the user bundle is valid;
//! - provider certificates lead, but only when the provider bundle is valid
//!   and its raw bytes differ from the user bundle's raw bytes.
//!
//! The provider map frequently mirrors the user bundle, so adding it again
//! would duplicate every user certificate. No other de-duplication happens.

use crate::codec::{self, CertificateRecord};
use crate::source::{SourceRole, SourceState, ValidBundle};

/// Result of one merge. Built fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedBundle {
    certificates: Vec<CertificateRecord>,
    pem: String,
    contributors: Vec<SourceRole>,
}

impl MergedBundle {
    pub fn certificates(&self) -> &[CertificateRecord] {
        &self.certificates
    }

    /// Serialized form written to the output artifact.
    pub fn as_bytes(&self) -> &[u8] {
        self.pem.as_bytes()
    }

    pub fn as_pem(&self) -> &str {
        &self.pem
    }

    /// Sources that added certificates, in output order.
    pub fn contributors(&self) -> &[SourceRole] {
        &self.contributors
    }

    /// BLAKE3 digest of the serialized bundle, hex encoded.
    pub fn digest(&self) -> String {
        hex::encode(blake3::hash(self.pem.as_bytes()).as_bytes())
    }
}

/// Combine the three source readings.
pub fn merge(system: &ValidBundle, user: &SourceState, provider: &SourceState) -> MergedBundle {
    let user = user.as_valid();
    let user_raw: &[u8] = user.map(ValidBundle::raw).unwrap_or_default();
    let provider = provider
        .as_valid()
        .filter(|bundle| bundle.raw() != user_raw);

    let segments = [
        (SourceRole::Provider, provider),
        (SourceRole::User, user),
        (SourceRole::System, Some(system)),
    ];

    let mut certificates = Vec::new();
    let mut contributors = Vec::new();
    for (role, bundle) in segments {
        if let Some(bundle) = bundle {
            certificates.extend_from_slice(bundle.certificates());
            contributors.push(role);
        }
    }

    let pem = codec::encode(&certificates);
    MergedBundle {
        certificates,
        pem,
        contributors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_BUNDLE: &str = include_str!("../tests/fixtures/trust_bundle_valid.pem");
    const AMAZON_CA: &str = include_str!("../tests/fixtures/additional_ca_amazon.pem");
    const MICROSOFT_CA: &str = include_str!("../tests/fixtures/additional_ca_ms.pem");

    fn system() -> ValidBundle {
        ValidBundle::parse(SYSTEM_BUNDLE).unwrap()
    }

    fn valid(pem: &str) -> SourceState {
        SourceState::from_value(Some(pem))
    }

    fn organizations(bundle: &MergedBundle) -> Vec<&str> {
        bundle
            .certificates()
            .iter()
            .map(|cert| cert.issuer_organization().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_user_bundle_precedes_system() {
        let merged = merge(&system(), &valid(AMAZON_CA), &SourceState::Absent);
        assert_eq!(organizations(&merged), ["Amazon", "GlobalSign", "GlobalSign"]);
        assert_eq!(merged.contributors(), [SourceRole::User, SourceRole::System]);
    }

    #[test]
    fn test_invalid_user_bundle_falls_back_to_system() {
        let user = SourceState::from_value(Some("garbage bytes"));
        assert!(matches!(user, SourceState::Invalid(_)));

        let merged = merge(&system(), &user, &SourceState::Absent);
        assert_eq!(organizations(&merged), ["GlobalSign", "GlobalSign"]);
    }

    #[test]
    fn test_absent_user_bundle_falls_back_to_system() {
        let merged = merge(&system(), &SourceState::Absent, &SourceState::Absent);
        assert_eq!(merged.certificates(), system().certificates());
        assert_eq!(merged.contributors(), [SourceRole::System]);
    }

    #[test]
    fn test_distinct_provider_bundle_leads() {
        let merged = merge(&system(), &valid(AMAZON_CA), &valid(MICROSOFT_CA));
        assert_eq!(
            organizations(&merged),
            ["Microsoft Corporation", "Amazon", "GlobalSign", "GlobalSign"]
        );
        assert_eq!(
            merged.contributors(),
            [SourceRole::Provider, SourceRole::User, SourceRole::System]
        );
    }

    #[test]
    fn test_provider_identical_to_user_is_skipped() {
        let merged = merge(&system(), &valid(AMAZON_CA), &valid(AMAZON_CA));
        assert_eq!(organizations(&merged), ["Amazon", "GlobalSign", "GlobalSign"]);
        assert!(!merged.contributors().contains(&SourceRole::Provider));
    }

    #[test]
    fn test_provider_kept_when_user_invalid() {
        let user = SourceState::Invalid("failed to parse certificate PEM".to_string());
        let merged = merge(&system(), &user, &valid(MICROSOFT_CA));
        assert_eq!(
            organizations(&merged),
            ["Microsoft Corporation", "GlobalSign", "GlobalSign"]
        );
    }

    #[test]
    fn test_invalid_provider_is_ignored() {
        let provider = SourceState::from_value(Some("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"));
        let merged = merge(&system(), &valid(AMAZON_CA), &provider);
        assert_eq!(organizations(&merged), ["Amazon", "GlobalSign", "GlobalSign"]);
    }

    #[test]
    fn test_byte_comparison_not_semantic() {
        // same certificate, different trailing whitespace: both segments are kept
        let padded = format!("{AMAZON_CA}\n\n");
        let merged = merge(&system(), &valid(AMAZON_CA), &valid(&padded));
        assert_eq!(
            organizations(&merged),
            ["Amazon", "Amazon", "GlobalSign", "GlobalSign"]
        );
    }

    #[test]
    fn test_system_duplicates_are_retained() {
        let merged = merge(&system(), &valid(SYSTEM_BUNDLE), &SourceState::Absent);
        assert_eq!(merged.certificates().len(), 4);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let first = merge(&system(), &valid(AMAZON_CA), &valid(MICROSOFT_CA));
        let second = merge(&system(), &valid(AMAZON_CA), &valid(MICROSOFT_CA));
        assert_eq!(first.as_bytes(), second.as_bytes());
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);

        let reparsed = codec::parse(first.as_bytes()).unwrap();
        assert_eq!(reparsed, first.certificates());
    }
}
