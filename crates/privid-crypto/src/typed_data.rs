//! EIP-712 typed-data hashing for decryption authorizations.
//!
//! A decryption grant is authorized by the user signing a
//! `UserDecryptRequestVerification` struct under the coprocessor's
//! EIP-712 domain. The signature covers the ephemeral public key, the
//! contract set, and the validity window, so a grant cannot be widened
//! or extended after signing.

use privid_types::{ChainId, EvmAddress};
use serde::{Deserialize, Serialize};

use crate::hash::{keccak256, keccak256_concat};

/// Canonical EIP-712 type string of the domain.
pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Canonical EIP-712 type string of the decryption authorization.
pub const DECRYPT_REQUEST_TYPE: &str = "UserDecryptRequestVerification(bytes publicKey,address[] contractAddresses,uint256 startTimestamp,uint256 durationDays)";

/// Encodes a `u64` as a big-endian `uint256` word.
fn uint256_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

// ---------------------------------------------------------------------------
// Eip712Domain
// ---------------------------------------------------------------------------

/// EIP-712 signing domain published by the FHE capability.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Eip712Domain {
    /// Human-readable signing domain name.
    pub name: String,
    /// Domain version.
    pub version: String,
    /// Chain the signature is valid on.
    pub chain_id: ChainId,
    /// Contract that verifies the signature.
    pub verifying_contract: EvmAddress,
}

impl Eip712Domain {
    /// Computes the domain separator `hashStruct(domain)`.
    pub fn separator(&self) -> [u8; 32] {
        let type_hash = keccak256(DOMAIN_TYPE.as_bytes());
        let name_hash = keccak256(self.name.as_bytes());
        let version_hash = keccak256(self.version.as_bytes());
        let chain = uint256_word(self.chain_id.value());
        let contract = self.verifying_contract.to_word();
        keccak256_concat(&[&type_hash, &name_hash, &version_hash, &chain, &contract])
    }
}

// ---------------------------------------------------------------------------
// DecryptRequest
// ---------------------------------------------------------------------------

/// The `UserDecryptRequestVerification` message a user signs to obtain a
/// decryption grant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecryptRequest {
    /// Ephemeral public key the results are re-encrypted for.
    pub public_key: Vec<u8>,
    /// Authorized contracts, in the order they will be signed.
    pub contract_addresses: Vec<EvmAddress>,
    /// Window start, unix seconds.
    pub start_timestamp: u64,
    /// Window length in days.
    pub duration_days: u32,
}

impl DecryptRequest {
    /// Computes `hashStruct(message)`.
    pub fn struct_hash(&self) -> [u8; 32] {
        let type_hash = keccak256(DECRYPT_REQUEST_TYPE.as_bytes());
        let key_hash = keccak256(&self.public_key);
        let words: Vec<[u8; 32]> = self
            .contract_addresses
            .iter()
            .map(EvmAddress::to_word)
            .collect();
        let word_refs: Vec<&[u8]> = words.iter().map(|w| w.as_slice()).collect();
        let contracts_hash = keccak256_concat(&word_refs);
        let start = uint256_word(self.start_timestamp);
        let duration = uint256_word(u64::from(self.duration_days));
        keccak256_concat(&[&type_hash, &key_hash, &contracts_hash, &start, &duration])
    }

    /// Computes the final digest `keccak256(0x1901 || domainSeparator ||
    /// hashStruct(message))` that the wallet signs.
    pub fn signing_digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        keccak256_concat(&[&[0x19, 0x01], &domain.separator(), &self.struct_hash()])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Eip712Domain {
        Eip712Domain {
            name: "Decryption".into(),
            version: "1".into(),
            chain_id: ChainId::new(31337),
            verifying_contract: EvmAddress::new([0xDD; 20]),
        }
    }

    #[test]
    fn domain_type_hash_matches_well_known_value() {
        assert_eq!(
            hex::encode(keccak256(DOMAIN_TYPE.as_bytes())),
            "8b73c3c69bb8fe3d512ecc4cf759cc79239f7b179b0ffacaa9a75d522b39400f"
        );
    }

    #[test]
    fn uint256_word_is_big_endian() {
        let word = uint256_word(0x0102);
        assert_eq!(&word[..30], &[0u8; 30]);
        assert_eq!(&word[30..], &[0x01, 0x02]);
    }

    #[test]
    fn digest_binds_every_field() {
        let base = DecryptRequest {
            public_key: vec![0x02; 33],
            contract_addresses: vec![EvmAddress::new([0x01; 20])],
            start_timestamp: 1_700_000_000,
            duration_days: 365,
        };
        let digest = base.signing_digest(&domain());

        let variants = [
            DecryptRequest {
                public_key: vec![0x04; 33],
                ..base.clone()
            },
            DecryptRequest {
                contract_addresses: vec![EvmAddress::new([0x03; 20])],
                ..base.clone()
            },
            DecryptRequest {
                start_timestamp: 1_700_000_001,
                ..base.clone()
            },
            DecryptRequest {
                duration_days: 366,
                ..base.clone()
            },
        ];
        for variant in &variants {
            assert_ne!(variant.signing_digest(&domain()), digest);
        }

        let other_domain = Eip712Domain {
            chain_id: ChainId::new(11_155_111),
            ..domain()
        };
        assert_ne!(base.signing_digest(&other_domain), digest);
    }

    #[test]
    fn digest_is_deterministic() {
        let request = DecryptRequest {
            public_key: vec![0x02; 33],
            contract_addresses: vec![EvmAddress::new([0x01; 20]), EvmAddress::new([0x02; 20])],
            start_timestamp: 42,
            duration_days: 1,
        };
        assert_eq!(
            request.signing_digest(&domain()),
            request.signing_digest(&domain())
        );
    }
}
