//! QR part chunking and reassembly.
//!
//! The armored envelope is split into uniform parts of the form
//! `KCPGP:<n>/<total>:<chunk>`. Part sizes are chosen so each QR code
//! stays scannable at typical display/camera distances. Reassembly is
//! order-invariant and duplicate-idempotent.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Maximum payload bytes per QR part. 500 bytes plus the header lands
/// around QR version 10-15 at ECC-L, which phone cameras pick up quickly
/// even from rotating codes.
pub const QR_PART_SIZE: usize = 500;

/// Prefix for data parts.
const QR_PREFIX: &str = "KCPGP:";

/// Prefix for the optional companion passphrase part.
pub const PASS_PREFIX: &str = "KCPGP-PASS:";

/// Split an armored envelope into ordered QR parts.
#[must_use]
pub fn split_into_parts(armored: &str) -> Vec<String> {
    if armored.is_empty() {
        return vec![format!("{QR_PREFIX}1/1:")];
    }

    let total = armored.len().div_ceil(QR_PART_SIZE);
    armored
        .as_bytes()
        .chunks(QR_PART_SIZE)
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "{}{}/{}:{}",
                QR_PREFIX,
                i + 1,
                total,
                String::from_utf8_lossy(chunk)
            )
        })
        .collect()
}

/// The companion part carrying the transfer passphrase. Off by default;
/// the passphrase normally travels out-of-band.
#[must_use]
pub fn passphrase_part(passphrase: &str) -> String {
    format!("{PASS_PREFIX}{passphrase}")
}

/// Extract the passphrase from a companion part, if the payload is one.
#[must_use]
pub fn parse_passphrase_part(payload: &str) -> Option<&str> {
    payload.strip_prefix(PASS_PREFIX)
}

/// Strict decimal: no sign, no leading zeros, at least 1.
fn parse_strict(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

/// Parse `KCPGP:<n>/<total>:<chunk>`. Anything else is not a bundle part.
#[must_use]
pub fn parse_part(payload: &str) -> Option<(usize, usize, &str)> {
    let rest = payload.strip_prefix(QR_PREFIX)?;
    let (header, data) = rest.split_once(':')?;
    let (part_s, total_s) = header.split_once('/')?;
    let part = parse_strict(part_s)?;
    let total = parse_strict(total_s)?;
    if part > total {
        return None;
    }
    Some((part, total, data))
}

/// Accumulates QR parts scanned in arbitrary order.
#[derive(Default)]
pub struct PartCollector {
    total: Option<usize>,
    chunks: HashMap<usize, String>,
}

impl PartCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one scanned payload. Returns whether the bundle is complete.
    ///
    /// Duplicates are idempotent; a part disagreeing with an earlier
    /// part (different `total`, or different data under the same `n`)
    /// aborts the scan with `InconsistentBundle`.
    pub fn accept(&mut self, payload: &str) -> Result<bool> {
        let (part, total, data) = parse_part(payload).ok_or(Error::CorruptFraming)?;

        match self.total {
            None => self.total = Some(total),
            Some(seen) if seen != total => return Err(Error::InconsistentBundle),
            Some(_) => {}
        }

        match self.chunks.get(&part) {
            Some(existing) if existing != data => return Err(Error::InconsistentBundle),
            Some(_) => {}
            None => {
                self.chunks.insert(part, data.to_string());
            }
        }

        Ok(self.is_complete())
    }

    /// Whether all declared parts have been seen.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|total| self.chunks.len() == total)
    }

    /// Number of distinct parts collected so far.
    #[must_use]
    pub fn seen(&self) -> usize {
        self.chunks.len()
    }

    /// Declared part count, once known.
    #[must_use]
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Concatenate the collected parts back into the armored envelope.
    pub fn assemble(&self) -> Result<String> {
        let total = self.total.ok_or(Error::TruncatedBundle)?;
        let mut assembled = String::new();
        for n in 1..=total {
            let chunk = self.chunks.get(&n).ok_or(Error::TruncatedBundle)?;
            assembled.push_str(chunk);
        }
        Ok(assembled)
    }
}
