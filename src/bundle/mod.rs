//! Multi-key transfer bundles.
//!
//! Packages selected keys (public certificates plus, for own keys, their
//! secret material) into an encrypted envelope chunked for QR transport:
//!
//! 1. frame the entries into self-describing plaintext (`frame`)
//! 2. derive a key from a fresh transfer passphrase and AEAD-encrypt
//!    (`envelope`)
//! 3. base64-armor the envelope and split it into `KCPGP:<n>/<total>:`
//!    parts (`qr`)
//!
//! Import reverses the pipeline; the passphrase is re-entered by the
//! user and never stored with the bundle.

mod envelope;
mod frame;
mod passphrase;
pub mod qr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::types::Fingerprint;

pub use envelope::ENVELOPE_VERSION;
pub use frame::{BundleEntry, BUNDLE_VERSION};
pub use passphrase::generate_transfer_passphrase;
pub use qr::{parse_passphrase_part, passphrase_part, PartCollector};

/// A sealed bundle ready for transport.
pub struct ExportedBundle {
    /// The transfer passphrase, shown to the user once at export time.
    pub passphrase: String,
    /// Ordered QR part payloads.
    pub qr_parts: Vec<String>,
    /// The armored envelope for file-based transfer.
    pub file_blob: String,
}

/// Aggregate outcome of a bundle import.
#[derive(Debug, Default)]
pub struct BundleImportReport {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub imported: Vec<Fingerprint>,
}

/// Frame, encrypt, armor, and chunk the given entries under a freshly
/// generated transfer passphrase.
///
/// `include_passphrase_part` additionally emits a `KCPGP-PASS:` part;
/// by default the passphrase travels out-of-band.
pub fn seal_bundle(
    entries: &[BundleEntry],
    include_passphrase_part: bool,
) -> Result<ExportedBundle> {
    let passphrase = generate_transfer_passphrase();

    let plaintext = frame::encode_bundle(entries);
    let sealed = envelope::seal(&plaintext, passphrase.as_bytes())?;
    let file_blob = STANDARD.encode(&sealed);

    let mut qr_parts = Vec::new();
    if include_passphrase_part {
        qr_parts.push(qr::passphrase_part(&passphrase));
    }
    qr_parts.extend(qr::split_into_parts(&file_blob));

    Ok(ExportedBundle {
        passphrase,
        qr_parts,
        file_blob,
    })
}

/// Decrypt an armored envelope and parse its entries.
pub fn open_bundle(file_blob: &str, passphrase: &str) -> Result<Vec<BundleEntry>> {
    let compact: String = file_blob.split_whitespace().collect();
    let sealed = STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| Error::CorruptFraming)?;

    let plaintext: Zeroizing<Vec<u8>> = envelope::open(&sealed, passphrase.as_bytes())?;
    frame::decode_bundle(&plaintext)
}
