use ethers::types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const APPROVAL_SIGNATURE: &str = "Approval(address,address,uint256)";
pub const APPROVAL_FOR_ALL_SIGNATURE: &str = "ApprovalForAll(address,address,bool)";
pub const TRANSFER_SINGLE_SIGNATURE: &str =
    "TransferSingle(address,address,address,uint256,uint256)";

/// Compute the event topic (full Keccak-256) for a signature string,
/// e.g. "Transfer(address,address,uint256)".
pub fn topic_from_signature(signature: &str) -> H256 {
    let mut keccak = Keccak256::new();
    keccak.update(signature.as_bytes());
    H256::from_slice(&keccak.finalize())
}

/// Read an address out of a 32-byte ABI word (right-most 20 bytes).
pub fn address_from_word(word: &[u8]) -> Option<Address> {
    if word.len() != 32 {
        return None;
    }
    Some(Address::from_slice(&word[12..]))
}

/// Read a big-endian uint256 out of a 32-byte ABI word.
pub fn uint_from_word(word: &[u8]) -> Option<U256> {
    if word.len() != 32 {
        return None;
    }
    Some(U256::from_big_endian(word))
}

/// Read a bool out of a 32-byte ABI word; anything but 0 or 1 is rejected.
pub fn bool_from_word(word: &[u8]) -> Option<bool> {
    let value = uint_from_word(word)?;
    if value.is_zero() {
        Some(false)
    } else if value == U256::one() {
        Some(true)
    } else {
        None
    }
}

/// Split log data into 32-byte words; `None` when the length is not a multiple of 32.
pub fn data_words(data: &[u8]) -> Option<Vec<&[u8]>> {
    if data.len() % 32 != 0 {
        return None;
    }
    Some(data.chunks(32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_from_signature() {
        // keccak256("Transfer(address,address,uint256)")
        let topic = topic_from_signature(TRANSFER_SIGNATURE);
        assert_eq!(
            hex::encode(topic.as_bytes()),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );

        let topic = topic_from_signature(APPROVAL_SIGNATURE);
        assert_eq!(
            hex::encode(topic.as_bytes()),
            "8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"
        );
    }

    #[test]
    fn test_address_word() {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0x11; 20]);
        assert_eq!(address_from_word(&word), Some(Address::repeat_byte(0x11)));
        assert_eq!(address_from_word(&word[1..]), None);
    }

    #[test]
    fn test_bool_word() {
        let mut word = [0u8; 32];
        assert_eq!(bool_from_word(&word), Some(false));
        word[31] = 1;
        assert_eq!(bool_from_word(&word), Some(true));
        word[31] = 2;
        assert_eq!(bool_from_word(&word), None);
    }

    #[test]
    fn test_data_words() {
        assert_eq!(data_words(&[0u8; 64]).map(|w| w.len()), Some(2));
        assert!(data_words(&[0u8; 33]).is_none());
        assert_eq!(data_words(&[]).map(|w| w.len()), Some(0));
    }
}
