use certwatch_common::types::{CertificateFacts, DistinguishedName, UNKNOWN};
use chrono::{DateTime, Utc};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use x509_parser::oid_registry;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

/// Decodes a DER leaf certificate into [`CertificateFacts`].
///
/// Returns the parser's message when `der` is not a valid X.509 certificate.
pub fn parse_leaf(
    host: &str,
    der: &[u8],
    chain_valid: bool,
    fetched_at: DateTime<Utc>,
) -> Result<CertificateFacts, String> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| e.to_string())?;

    let not_before = asn1_to_utc(&cert.validity().not_before)?;
    let not_after = asn1_to_utc(&cert.validity().not_after)?;

    Ok(CertificateFacts {
        host: host.to_string(),
        issuer: distinguished_name(cert.issuer()),
        subject: distinguished_name(cert.subject()),
        subject_alt_names: subject_alt_names(&cert),
        not_before,
        not_after,
        serial_number: cert.raw_serial_as_string().to_uppercase(),
        fingerprint_sha256: hex_encode(&Sha256::digest(der)),
        fingerprint_sha1: hex_encode(&Sha1::digest(der)),
        signature_algorithm: oid_to_sig_name(&cert.signature_algorithm.algorithm),
        public_key_algorithm: oid_to_pk_name(&cert.public_key().algorithm.algorithm),
        public_key_bits: estimate_key_bits(&cert),
        key_usage: extract_key_usage(&cert),
        version: cert.version().0 + 1,
        chain_valid,
        fetched_at,
    })
}

fn asn1_to_utc(time: &ASN1Time) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(time.timestamp(), 0)
        .ok_or_else(|| format!("validity timestamp out of range: {}", time.timestamp()))
}

fn first_attr<'a, 'b: 'a>(mut values: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>) -> String {
    values
        .next()
        .and_then(|v| v.as_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn distinguished_name(name: &X509Name<'_>) -> DistinguishedName {
    DistinguishedName {
        common_name: first_attr(name.iter_common_name()),
        organization: first_attr(name.iter_organization()),
        organizational_unit: first_attr(name.iter_organizational_unit()),
        country: first_attr(name.iter_country()),
        locality: first_attr(name.iter_locality()),
        state: first_attr(name.iter_state_or_province()),
    }
}

fn subject_alt_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                GeneralName::DNSName(dns) => names.push(dns.to_string()),
                GeneralName::IPAddress(ip_bytes) => {
                    if let Ok(octets) = <[u8; 4]>::try_from(*ip_bytes) {
                        names.push(IpAddr::from(octets).to_string());
                    } else if let Ok(octets) = <[u8; 16]>::try_from(*ip_bytes) {
                        names.push(IpAddr::from(octets).to_string());
                    }
                }
                _ => {}
            }
        }
    }
    names
}

/// Colon separated upper-case hex, e.g. `AB:CD:01`.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn oid_to_sig_name(oid: &asn1_rs::Oid) -> String {
    let known = [
        (oid_registry::OID_PKCS1_SHA256WITHRSA, "SHA256withRSA"),
        (oid_registry::OID_PKCS1_SHA384WITHRSA, "SHA384withRSA"),
        (oid_registry::OID_PKCS1_SHA512WITHRSA, "SHA512withRSA"),
        (oid_registry::OID_PKCS1_SHA1WITHRSA, "SHA1withRSA"),
        (oid_registry::OID_SIG_ECDSA_WITH_SHA256, "ECDSAwithSHA256"),
        (oid_registry::OID_SIG_ECDSA_WITH_SHA384, "ECDSAwithSHA384"),
        (oid_registry::OID_SIG_ECDSA_WITH_SHA512, "ECDSAwithSHA512"),
        (oid_registry::OID_SIG_ED25519, "Ed25519"),
    ];
    known
        .iter()
        .find(|(known_oid, _)| oid == known_oid)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| oid.to_id_string())
}

fn oid_to_pk_name(oid: &asn1_rs::Oid) -> String {
    let known = [
        (oid_registry::OID_PKCS1_RSAENCRYPTION, "RSA"),
        (oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY, "ECDSA"),
        (oid_registry::OID_SIG_ED25519, "Ed25519"),
    ];
    known
        .iter()
        .find(|(known_oid, _)| oid == known_oid)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| oid.to_id_string())
}

fn estimate_key_bits(cert: &X509Certificate<'_>) -> Option<u32> {
    let pk = cert.public_key();
    let alg = &pk.algorithm.algorithm;

    if *alg == oid_registry::OID_PKCS1_RSAENCRYPTION {
        match pk.parsed() {
            Ok(PublicKey::RSA(rsa)) => Some(rsa.key_size() as u32),
            _ => None,
        }
    } else if *alg == oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY {
        let curve = pk.algorithm.parameters.as_ref()?.as_oid().ok()?;
        if curve == oid_registry::OID_EC_P256 {
            Some(256)
        } else if curve == oid_registry::OID_NIST_EC_P384 {
            Some(384)
        } else if curve == oid_registry::OID_NIST_EC_P521 {
            Some(521)
        } else {
            None
        }
    } else if *alg == oid_registry::OID_SIG_ED25519 {
        Some(256)
    } else {
        None
    }
}

fn extract_key_usage(cert: &X509Certificate<'_>) -> Vec<String> {
    let ku = match cert.key_usage() {
        Ok(Some(ku)) => ku,
        _ => return Vec::new(),
    };

    let flags = &ku.value;
    [
        (flags.digital_signature(), "digital_signature"),
        (flags.non_repudiation(), "non_repudiation"),
        (flags.key_encipherment(), "key_encipherment"),
        (flags.data_encipherment(), "data_encipherment"),
        (flags.key_agreement(), "key_agreement"),
        (flags.key_cert_sign(), "key_cert_sign"),
        (flags.crl_sign(), "crl_sign"),
        (flags.encipher_only(), "encipher_only"),
        (flags.decipher_only(), "decipher_only"),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| name.to_string())
    .collect()
}
