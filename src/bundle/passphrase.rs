//! Transfer passphrase generation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Nine groups of four digits, e.g. `1234-5678-...`.
const GROUPS: usize = 9;
const GROUP_LEN: usize = 4;

/// Generate a transfer passphrase: nine hyphen-separated groups of four
/// digits, every digit drawn uniformly.
#[must_use]
pub fn generate_transfer_passphrase() -> String {
    let mut groups = Vec::with_capacity(GROUPS);
    for _ in 0..GROUPS {
        let mut group = String::with_capacity(GROUP_LEN);
        for _ in 0..GROUP_LEN {
            group.push(char::from(b'0' + uniform_digit()));
        }
        groups.push(group);
    }
    groups.join("-")
}

/// One uniform digit via rejection sampling. 250 is the largest multiple
/// of 10 that fits in a byte, so accepted bytes map to 0-9 without bias.
fn uniform_digit() -> u8 {
    loop {
        let mut byte = [0u8; 1];
        OsRng.fill_bytes(&mut byte);
        if byte[0] < 250 {
            return byte[0] % 10;
        }
    }
}
