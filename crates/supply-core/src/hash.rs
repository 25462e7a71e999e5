//! SHA256 helpers and hash byte-order conversion.

use sha2::{Digest, Sha256};

/// Double SHA256: SHA256(SHA256(data)).
///
/// Used for Base58Check checksums.
#[inline]
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second);
    result
}

/// Reverse the byte order of a 32-byte array.
///
/// Nodes display hashes in reverse byte order.
#[inline]
pub fn reverse_bytes(bytes: &[u8; 32]) -> [u8; 32] {
    let mut reversed = *bytes;
    reversed.reverse();
    reversed
}

/// Convert a hash to its display format (reversed hex).
pub fn hash_to_display_hex(hash: &[u8; 32]) -> String {
    hex::encode(reverse_bytes(hash))
}

/// Parse a display-format (reversed) hex hash into internal byte order.
///
/// Returns `None` for invalid hex or a length other than 32 bytes.
pub fn display_hex_to_hash(display: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(display).ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    Some(reverse_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_sha256() {
        // Test vector: SHA256d("hello")
        let data = b"hello";
        let hash = double_sha256(data);

        let expected = hex::decode(
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        ).unwrap();

        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_reverse_bytes() {
        let mut original = [0u8; 32];
        for (i, byte) in original.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
        let reversed = reverse_bytes(&original);

        assert_eq!(reversed[0], 0x20);
        assert_eq!(reversed[31], 0x01);
    }

    #[test]
    fn test_display_hex_roundtrip() {
        let display = "00040fe8ec8471911baa1db1266ea15dd06b4a8a5c453883c000b031973dce08";
        let internal = display_hex_to_hash(display).unwrap();

        // Display order puts the leading zeros first; internally they are last
        assert_eq!(internal[31], 0x00);
        assert_eq!(internal[0], 0x08);
        assert_eq!(hash_to_display_hex(&internal), display);
    }

    #[test]
    fn test_display_hex_rejects_bad_input() {
        assert!(display_hex_to_hash("zz").is_none());
        assert!(display_hex_to_hash("0011").is_none());
    }
}
