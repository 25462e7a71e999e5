//! Transparent address validation and scriptPubKey generation.
//!
//! Supports:
//! - P2PKH (Pay to Public Key Hash) - `t1...` on mainnet, `tm...` on testnet/regtest
//! - P2SH (Pay to Script Hash) - `t3...` on mainnet, `t2...` on testnet/regtest
//!
//! Shielded and unified addresses are not decoded here.

use thiserror::Error;

use crate::hash::double_sha256;
use crate::network::Network;

/// Address validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Invalid address format
    #[error("Invalid address format")]
    InvalidFormat,
    /// Invalid Base58 character
    #[error("Invalid Base58 character: {0}")]
    InvalidBase58Char(char),
    /// Invalid checksum
    #[error("Invalid checksum")]
    InvalidChecksum,
    /// Version prefix not used by any known network
    #[error("Unknown address prefix: {0:02x}{1:02x}")]
    UnknownPrefix(u8, u8),
    /// Address network mismatch
    #[error("Address network mismatch: expected {expected}, got {got}")]
    NetworkMismatch { expected: String, got: String },
}

/// Transparent address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// P2PKH: OP_DUP OP_HASH160 <20-byte-hash> OP_EQUALVERIFY OP_CHECKSIG
    P2PKH,
    /// P2SH: OP_HASH160 <20-byte-hash> OP_EQUAL
    P2SH,
}

/// A validated transparent address with its scriptPubKey.
#[derive(Debug, Clone)]
pub struct ValidatedAddress {
    /// The type of address.
    pub address_type: AddressType,
    /// The network this address belongs to.
    pub network: Network,
    /// The scriptPubKey for this address.
    pub script_pubkey: Vec<u8>,
    /// The original address string.
    pub display: String,
}

/// Validate a transparent address and return its details.
///
/// Testnet and regtest share prefixes, so a `tm...` address validates for both.
pub fn validate_address(address: &str, expected_network: Network) -> Result<ValidatedAddress, AddressError> {
    let trimmed = address.trim();
    let decoded = base58_decode(trimmed)?;

    // 2-byte version + 20-byte hash + 4-byte checksum
    if decoded.len() != 26 {
        return Err(AddressError::InvalidFormat);
    }

    let payload = &decoded[..22];
    let checksum = &decoded[22..];
    let computed_checksum = &double_sha256(payload)[..4];

    if checksum != computed_checksum {
        return Err(AddressError::InvalidChecksum);
    }

    let hash = &payload[2..];
    let (address_type, mainnet) = match (payload[0], payload[1]) {
        (0x1c, 0xb8) => (AddressType::P2PKH, true),
        (0x1c, 0xbd) => (AddressType::P2SH, true),
        (0x1d, 0x25) => (AddressType::P2PKH, false),
        (0x1c, 0xba) => (AddressType::P2SH, false),
        (a, b) => return Err(AddressError::UnknownPrefix(a, b)),
    };

    let network_matches = match expected_network {
        Network::Mainnet => mainnet,
        Network::Testnet | Network::Regtest => !mainnet,
    };
    if !network_matches {
        return Err(AddressError::NetworkMismatch {
            expected: expected_network.name().into(),
            got: if mainnet { "mainnet" } else { "testnet" }.into(),
        });
    }

    let script_pubkey = match address_type {
        AddressType::P2PKH => {
            let mut script = Vec::with_capacity(25);
            script.push(0x76); // OP_DUP
            script.push(0xa9); // OP_HASH160
            script.push(0x14); // Push 20 bytes
            script.extend_from_slice(hash);
            script.push(0x88); // OP_EQUALVERIFY
            script.push(0xac); // OP_CHECKSIG
            script
        }
        AddressType::P2SH => {
            let mut script = Vec::with_capacity(23);
            script.push(0xa9); // OP_HASH160
            script.push(0x14); // Push 20 bytes
            script.extend_from_slice(hash);
            script.push(0x87); // OP_EQUAL
            script
        }
    };

    Ok(ValidatedAddress {
        address_type,
        network: expected_network,
        script_pubkey,
        display: trimmed.to_string(),
    })
}

// ============================================================================
// Base58 Implementation
// ============================================================================

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn base58_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidFormat);
    }

    let mut result: Vec<u8> = Vec::new();

    // Leading '1's become leading zero bytes
    let leading_zeros = input.chars().take_while(|&c| c == '1').count();

    for c in input.chars() {
        let value = BASE58_ALPHABET
            .iter()
            .position(|&x| x as char == c)
            .ok_or(AddressError::InvalidBase58Char(c))? as u32;

        // Multiply result by 58 and add value
        let mut carry = value;
        for byte in result.iter_mut().rev() {
            let temp = (*byte as u32) * 58 + carry;
            *byte = (temp & 0xFF) as u8;
            carry = temp >> 8;
        }

        while carry > 0 {
            result.insert(0, (carry & 0xFF) as u8);
            carry >>= 8;
        }
    }

    let mut final_result = vec![0u8; leading_zeros];
    final_result.extend(result);

    Ok(final_result)
}
