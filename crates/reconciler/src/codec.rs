//! PEM certificate bundle codec.
//!
//! A bundle is either fully decodable into one or more certificates or it is
//! rejected as a whole. Non-certificate PEM blocks (keys, CRLs) are skipped,
//! so a blob holding only those counts as "no certificates" and fails.

use pem::{EncodeConfig, LineEnding, Pem};
use thiserror::Error;
use x509_parser::error::X509Error;

/// PEM label of an X.509 certificate block.
pub const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Bundle could not be turned into certificates.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Well-formed (or empty) input without a single certificate block
    #[error("failed to parse certificate PEM")]
    NoCertificates,

    /// Broken PEM armour or base64 payload
    #[error("failed to parse certificate PEM")]
    MalformedPem(#[from] pem::PemError),

    /// A CERTIFICATE block whose payload is not a DER X.509 certificate
    #[error("failed to parse certificate PEM")]
    MalformedCertificate(#[source] X509Error),

    /// A CERTIFICATE block with bytes left over after the certificate
    #[error("failed to parse certificate PEM")]
    TrailingData { len: usize },
}

/// One parsed certificate. Only the fields the engine reports on are
/// extracted; the DER encoding is kept verbatim for re-serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    issuer_organizations: Vec<String>,
    subject: String,
    der: Vec<u8>,
}

impl CertificateRecord {
    /// Parse a single DER encoded certificate. Trailing bytes are rejected.
    pub fn from_der(der: Vec<u8>) -> Result<Self, ParseError> {
        let (issuer_organizations, subject) = {
            let (rest, cert) = x509_parser::parse_x509_certificate(&der).map_err(|e| {
                ParseError::MalformedCertificate(match e {
                    x509_parser::nom::Err::Error(e) | x509_parser::nom::Err::Failure(e) => e,
                    x509_parser::nom::Err::Incomplete(_) => X509Error::InvalidCertificate,
                })
            })?;
            if !rest.is_empty() {
                return Err(ParseError::TrailingData { len: rest.len() });
            }

            let organizations = cert
                .issuer()
                .iter_organization()
                .filter_map(|attr| attr.as_str().ok())
                .map(str::to_string)
                .collect::<Vec<_>>();
            (organizations, cert.subject().to_string())
        };

        Ok(Self {
            issuer_organizations,
            subject,
            der,
        })
    }

    /// First issuer organization (`O=`), if the issuer name carries one.
    pub fn issuer_organization(&self) -> Option<&str> {
        self.issuer_organizations.first().map(String::as_str)
    }

    pub fn issuer_organizations(&self) -> &[String] {
        &self.issuer_organizations
    }

    /// Subject distinguished name in RFC 4514 form.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Raw DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }
}

/// Parse a PEM bundle into its certificates, preserving order.
pub fn parse(bytes: &[u8]) -> Result<Vec<CertificateRecord>, ParseError> {
    let certificates = pem::parse_many(bytes)?
        .into_iter()
        .filter(|block| block.tag() == CERTIFICATE_TAG)
        .map(|block| CertificateRecord::from_der(block.into_contents()))
        .collect::<Result<Vec<_>, _>>()?;

    if certificates.is_empty() {
        return Err(ParseError::NoCertificates);
    }
    Ok(certificates)
}

/// Encode certificates as concatenated, LF terminated PEM blocks.
pub fn encode(certificates: &[CertificateRecord]) -> String {
    let blocks = certificates
        .iter()
        .map(|cert| Pem::new(CERTIFICATE_TAG, cert.der.clone()))
        .collect::<Vec<_>>();

    pem::encode_many_config(&blocks, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Byte form of [`encode`].
pub fn serialize(certificates: &[CertificateRecord]) -> Vec<u8> {
    encode(certificates).into_bytes()
}
