//! Framed bundle plaintext.
//!
//! The bundle payload is self-describing: a version byte followed by
//! length-prefixed entry records, parseable without out-of-band
//! knowledge.
//!
//! ```text
//! version:u8
//! repeat:
//!   kind:u8        0 = public-only, 1 = with-secret
//!   trust:u8
//!   fp_len:u8      fingerprint, ASCII hex
//!   fp:[u8]
//!   cert_len:u32be
//!   cert:[u8]
//!   secret_len:u32be   (kind = 1 only)
//!   secret:[u8]
//! ```

use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};
use crate::types::{Fingerprint, TrustLevel};

/// Bundle payload format version.
pub const BUNDLE_VERSION: u8 = 1;

const KIND_PUBLIC: u8 = 0;
const KIND_WITH_SECRET: u8 = 1;

/// One key inside a transfer bundle.
pub struct BundleEntry {
    pub fingerprint: Fingerprint,
    pub trust_level: TrustLevel,
    /// ASCII-armored public certificate.
    pub certificate: Vec<u8>,
    /// ASCII-armored secret key, present for own keys only.
    pub secret_key: Option<Vec<u8>>,
}

impl Drop for BundleEntry {
    fn drop(&mut self) {
        if let Some(ref mut secret) = self.secret_key {
            secret.zeroize();
        }
    }
}

/// Serialize entries into the framed plaintext.
pub fn encode_bundle(entries: &[BundleEntry]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![BUNDLE_VERSION]);
    for entry in entries {
        out.push(if entry.secret_key.is_some() {
            KIND_WITH_SECRET
        } else {
            KIND_PUBLIC
        });
        out.push(entry.trust_level.as_i64() as u8);

        let fp = entry.fingerprint.as_str().as_bytes();
        out.push(fp.len() as u8);
        out.extend_from_slice(fp);

        out.extend_from_slice(&(entry.certificate.len() as u32).to_be_bytes());
        out.extend_from_slice(&entry.certificate);

        if let Some(ref secret) = entry.secret_key {
            out.extend_from_slice(&(secret.len() as u32).to_be_bytes());
            out.extend_from_slice(secret);
        }
    }
    out
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(Error::TruncatedBundle)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::TruncatedBundle);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u32be(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Parse framed plaintext back into entries.
pub fn decode_bundle(data: &[u8]) -> Result<Vec<BundleEntry>> {
    let mut reader = Reader::new(data);

    let version = reader.byte().map_err(|_| Error::CorruptFraming)?;
    if version != BUNDLE_VERSION {
        return Err(Error::UnsupportedVersion { version });
    }

    let mut entries = Vec::new();
    while reader.remaining() > 0 {
        let kind = reader.byte()?;
        if kind != KIND_PUBLIC && kind != KIND_WITH_SECRET {
            return Err(Error::CorruptFraming);
        }
        let trust = reader.byte()?;

        let fp_len = reader.byte()? as usize;
        let fp_raw = reader.take(fp_len)?;
        let fp_str = std::str::from_utf8(fp_raw).map_err(|_| Error::CorruptFraming)?;
        let fingerprint = Fingerprint::parse(fp_str).map_err(|_| Error::CorruptFraming)?;

        let cert_len = reader.u32be()? as usize;
        let certificate = reader.take(cert_len)?.to_vec();
        if certificate.is_empty() {
            return Err(Error::CorruptFraming);
        }

        let secret_key = if kind == KIND_WITH_SECRET {
            let secret_len = reader.u32be()? as usize;
            Some(reader.take(secret_len)?.to_vec())
        } else {
            None
        };

        entries.push(BundleEntry {
            fingerprint,
            trust_level: TrustLevel::from_i64(i64::from(trust)),
            certificate,
            secret_key,
        });
    }

    Ok(entries)
}
