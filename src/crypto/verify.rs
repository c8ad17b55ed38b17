//! Signature verification.

use chrono::Utc;
use pgp::composed::{Deserializable, StandaloneSignature};
use pgp::types::KeyTrait;

use crate::error::{Error, Result};
use crate::types::{Fingerprint, VerifyOutcome};

use super::certs;

fn no_match() -> VerifyOutcome {
    VerifyOutcome {
        valid: false,
        signer_fingerprint: None,
        trust_level: None,
        verified_at: Utc::now(),
    }
}

/// Verify an inline-signed message. Candidates are tried in order; the
/// first certificate that validates identifies the signer (primary-key
/// fingerprint only).
pub(super) fn verify_inline(
    signed_data: &[u8],
    candidate_certs: &[Vec<u8>],
) -> Result<VerifyOutcome> {
    let message = certs::parse_message(signed_data)?;

    for cert_data in candidate_certs {
        let Ok(cert) = certs::parse_public_cert(cert_data) else {
            continue;
        };
        if certs::verify_with_cert(&message, &cert) {
            return Ok(VerifyOutcome {
                valid: true,
                signer_fingerprint: Some(Fingerprint::from_bytes(&cert.fingerprint())?),
                trust_level: None,
                verified_at: Utc::now(),
            });
        }
    }

    Ok(no_match())
}

/// Verify a detached armored signature over `data`.
pub(super) fn verify_detached(
    signature: &[u8],
    data: &[u8],
    candidate_certs: &[Vec<u8>],
) -> Result<VerifyOutcome> {
    let text = std::str::from_utf8(signature).map_err(|_| Error::MalformedCiphertext)?;
    let (signature, _headers) =
        StandaloneSignature::from_string(text).map_err(|_| Error::MalformedCiphertext)?;

    for cert_data in candidate_certs {
        let Ok(cert) = certs::parse_public_cert(cert_data) else {
            continue;
        };
        let primary_ok = signature.verify(&cert, data).is_ok();
        let subkey_ok = || {
            cert.public_subkeys
                .iter()
                .any(|sk| signature.verify(sk, data).is_ok())
        };
        if primary_ok || subkey_ok() {
            return Ok(VerifyOutcome {
                valid: true,
                signer_fingerprint: Some(Fingerprint::from_bytes(&cert.fingerprint())?),
                trust_level: None,
                verified_at: Utc::now(),
            });
        }
    }

    Ok(no_match())
}
