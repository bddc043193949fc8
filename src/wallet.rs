//! Wallet address format check.
//!
//! This is a structural check only: a `0x` prefix and a total length of 42
//! characters. It does not verify the checksum or the hex alphabet, and
//! existing registrations depend on that exact behaviour. Length is counted in
//! UTF-16 code units.

/// Required prefix for a wallet address (case-sensitive)
pub const WALLET_PREFIX: &str = "0x";

/// Total length of a wallet address in UTF-16 code units, prefix included
pub const WALLET_LENGTH: usize = 42;

/// Returns `true` when `address` looks like a Zetachain wallet address.
pub fn is_valid_wallet(address: &str) -> bool {
    address.starts_with(WALLET_PREFIX) && address.encode_utf16().count() == WALLET_LENGTH
}
