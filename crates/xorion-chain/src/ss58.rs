//! SS58 address encoding.

const SS58_PREFIX: &[u8] = b"SS58PRE";

/// Fallback network prefix for prefixes outside the two-byte range.
const GENERIC_PREFIX: u8 = 42;

fn prefix_bytes(prefix: u16) -> Vec<u8> {
    if prefix < 64 {
        vec![prefix as u8]
    } else if prefix < 16384 {
        let first = ((prefix & 0x00FC) >> 2) as u8 | 0x40;
        let second = ((prefix >> 8) as u8) | ((prefix & 0x03) << 6) as u8;
        vec![first, second]
    } else {
        vec![GENERIC_PREFIX]
    }
}

/// Encode raw account bytes with the chain's SS58 prefix.
pub fn encode_ss58(account: &[u8; 32], prefix: u16) -> String {
    let mut payload = prefix_bytes(prefix);
    payload.extend_from_slice(account);

    let mut checksum_input = Vec::with_capacity(SS58_PREFIX.len() + payload.len());
    checksum_input.extend_from_slice(SS58_PREFIX);
    checksum_input.extend_from_slice(&payload);
    let hash = sp_crypto_hashing::blake2_512(&checksum_input);

    payload.push(hash[0]);
    payload.push(hash[1]);

    bs58::encode(payload).into_string()
}

/// `0x`-prefixed lowercase hex of a 32-byte hash.
pub fn hex_hash(hash: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(hash))
}
