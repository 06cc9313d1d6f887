//! PKI operations for operator-issued TLS certificates
//!
//! The operator runs its own certificate authority. Its key pair lives in a
//! Secret in the operator namespace and signs the serving certificates of
//! the components it renders.
//!
//! # Model
//!
//! - One CA per cluster ("tigera-operator-signer"), created on first use
//! - Leaf certificates carry the service DNS names as SANs
//! - A leaf is reissued when it is expired, does not cover the required
//!   names, or was signed by a different CA
//! - Certificates brought by the user are never reissued

mod certificate_manager;

pub use certificate_manager::{
    CertificateManager, KeyPair, SecretReader, TrustedBundle, CA_SECRET_NAME,
    TRUSTED_BUNDLE_KEY, TRUSTED_BUNDLE_NAME,
};

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    IsCa, Issuer, KeyPair as RcgenKeyPair, KeyUsagePurpose, SanType,
};
use thiserror::Error;
use x509_parser::prelude::*;

/// Common name of the operator CA
pub const CA_COMMON_NAME: &str = "tigera-operator-signer";

/// Validity of issued leaf certificates
pub const LEAF_VALIDITY_DAYS: i64 = 825;

const CA_VALIDITY_DAYS: i64 = 3650;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// CA not initialized
    #[error("CA not initialized")]
    CaNotInitialized,

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Parse PEM-encoded data and return the DER bytes of the first block
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Calendar date `days` from today, as rcgen expects it
fn days_from_now(days: i64) -> (i32, u8, u8) {
    use chrono::Datelike;
    let date = chrono::Utc::now() + chrono::Duration::days(days);
    (date.year(), date.month() as u8, date.day() as u8)
}

fn set_validity(params: &mut CertificateParams, days: i64) {
    let (y, m, d) = days_from_now(-1);
    params.not_before = rcgen::date_time_ymd(y, m, d);
    let (y, m, d) = days_from_now(days);
    params.not_after = rcgen::date_time_ymd(y, m, d);
}

/// Certificate Authority that signs component serving certificates
pub struct CertificateAuthority {
    /// CA key pair serialized as PEM (rcgen key pairs are not Clone)
    ca_key_pem: String,
    /// PEM-encoded CA certificate for distribution
    ca_cert_pem: String,
}

impl CertificateAuthority {
    /// Create a new self-signed CA
    pub fn new(common_name: &str) -> Result<Self> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(common_name.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        set_validity(&mut params, CA_VALIDITY_DAYS);

        let key_pair = RcgenKeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate CA key: {}", e))
        })?;
        let ca_key_pem = key_pair.serialize_pem();

        let cert = params.self_signed(&key_pair).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
        })?;

        Ok(Self {
            ca_key_pem,
            ca_cert_pem: cert.pem(),
        })
    }

    /// Load CA from PEM
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let _ = RcgenKeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {}", e)))?;
        let _ = parse_pem(cert_pem)?;

        Ok(Self {
            ca_key_pem: key_pem.to_string(),
            ca_cert_pem: cert_pem.to_string(),
        })
    }

    /// CA certificate in PEM format
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// CA private key in PEM format
    pub fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    fn load_key_pair(&self) -> Result<RcgenKeyPair> {
        RcgenKeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {}", e)))
    }

    /// Issue a serving certificate for `dns_names`
    ///
    /// The first name becomes the common name. Returns `(cert_pem, key_pem)`.
    pub fn sign_server_cert(&self, dns_names: &[String]) -> Result<(String, String)> {
        let common_name = dns_names.first().ok_or_else(|| {
            PkiError::CertificateGenerationFailed("at least one DNS name is required".to_string())
        })?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, DnValue::Utf8String(common_name.clone()));
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            rcgen::ExtendedKeyUsagePurpose::ServerAuth,
            rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        ];
        set_validity(&mut params, LEAF_VALIDITY_DAYS);
        params.subject_alt_names = dns_names
            .iter()
            .map(|name| {
                Ia5String::try_from(name.clone())
                    .map(SanType::DnsName)
                    .map_err(|e| {
                        PkiError::CertificateGenerationFailed(format!(
                            "invalid DNS name {name}: {e}"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let leaf_key = RcgenKeyPair::generate().map_err(|e| {
            PkiError::KeyGenerationFailed(format!("failed to generate leaf key: {}", e))
        })?;

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to sign certificate: {}", e))
        })?;

        Ok((cert.pem(), leaf_key.serialize_pem()))
    }

    /// Whether `cert_pem` carries a valid signature from this CA
    pub fn signed(&self, cert_pem: &str) -> Result<bool> {
        verify_signed_by(cert_pem, &self.ca_cert_pem)
    }
}

/// Facts about a certificate needed to decide whether to reissue it
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateInfo {
    /// Subject common name
    pub common_name: String,
    /// Issuer common name
    pub issuer_common_name: String,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
    /// Expiry as a unix timestamp
    pub not_after: i64,
}

impl CertificateInfo {
    /// Whether the certificate has expired
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() > self.not_after
    }

    /// Whether every name in `required` is covered by the SANs
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|name| self.dns_names.contains(name))
    }
}

/// Read the fields of a PEM certificate
pub fn inspect(cert_pem: &str) -> Result<CertificateInfo> {
    let der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

    let cn = |name: &X509Name<'_>| {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let dns_names = cert
        .subject_alternative_name()
        .map_err(|e| PkiError::ParseError(format!("invalid SAN extension: {}", e)))?
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|n| match n {
                    GeneralName::DNSName(d) => Some(d.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CertificateInfo {
        common_name: cn(cert.subject()),
        issuer_common_name: cn(cert.issuer()),
        dns_names,
        not_after: cert.validity().not_after.timestamp(),
    })
}

/// Verify that `cert_pem` was signed by the CA in `ca_cert_pem`
pub fn verify_signed_by(cert_pem: &str, ca_cert_pem: &str) -> Result<bool> {
    let cert_der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

    let ca_der = parse_pem(ca_cert_pem)?;
    let (_, ca_cert) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

    Ok(cert.verify_signature(Some(ca_cert.public_key())).is_ok())
}
