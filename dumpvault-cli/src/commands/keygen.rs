//! Key generation.

use anyhow::Result;
use dumpvault::CryptoKey;

/// Print a fresh random 256-bit key suitable for `crypto.key` or the key env var.
pub fn run_keygen(base64: bool) -> Result<()> {
    let key = CryptoKey::generate();
    if base64 {
        println!("{}", key.to_base64());
    } else {
        println!("{}", key.to_hex());
    }
    Ok(())
}
