//! Decoded chain events consumed by the correlation engine
//!
//! Each approval/transfer standard is its own variant carrying only the fields
//! that standard emits, so the engine never has to check for optional fields.

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Approval-class event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalEvent {
    /// ERC-20 `Approval(owner, spender, value)`
    Erc20 {
        asset: Address,
        owner: Address,
        spender: Address,
        value: U256,
    },
    /// ERC-721 `Approval(owner, approved, tokenId)`
    Erc721 {
        asset: Address,
        owner: Address,
        spender: Address,
        token_id: U256,
    },
    /// ERC-721 / ERC-1155 `ApprovalForAll(owner, operator, approved)`
    ApprovalForAll {
        asset: Address,
        owner: Address,
        operator: Address,
        approved: bool,
    },
}

impl ApprovalEvent {
    pub fn asset(&self) -> Address {
        match self {
            Self::Erc20 { asset, .. }
            | Self::Erc721 { asset, .. }
            | Self::ApprovalForAll { asset, .. } => *asset,
        }
    }

    pub fn owner(&self) -> Address {
        match self {
            Self::Erc20 { owner, .. }
            | Self::Erc721 { owner, .. }
            | Self::ApprovalForAll { owner, .. } => *owner,
        }
    }

    pub fn spender(&self) -> Address {
        match self {
            Self::Erc20 { spender, .. } | Self::Erc721 { spender, .. } => *spender,
            Self::ApprovalForAll { operator, .. } => *operator,
        }
    }

    /// Token id for single-NFT approvals
    pub fn token_id(&self) -> Option<U256> {
        match self {
            Self::Erc721 { token_id, .. } => Some(*token_id),
            _ => None,
        }
    }

    pub fn is_approval_for_all(&self) -> bool {
        matches!(self, Self::ApprovalForAll { .. })
    }

    pub fn is_fungible(&self) -> bool {
        matches!(self, Self::Erc20 { .. })
    }

    /// Revocations and clears never grant anything and are never tracked
    pub fn is_revoke(&self) -> bool {
        if self.spender().is_zero() {
            return true;
        }
        match self {
            Self::Erc20 { value, .. } => value.is_zero(),
            Self::Erc721 { .. } => false,
            Self::ApprovalForAll { approved, .. } => !approved,
        }
    }
}

/// Transfer-class event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferEvent {
    /// ERC-20 `Transfer(from, to, value)`
    Erc20 {
        asset: Address,
        from: Address,
        to: Address,
        value: U256,
    },
    /// ERC-721 `Transfer(from, to, tokenId)`
    Erc721 {
        asset: Address,
        from: Address,
        to: Address,
        token_id: U256,
    },
    /// ERC-1155 `TransferSingle(operator, from, to, id, value)`
    Erc1155 {
        asset: Address,
        operator: Address,
        from: Address,
        to: Address,
        token_id: U256,
        value: U256,
    },
}

impl TransferEvent {
    pub fn asset(&self) -> Address {
        match self {
            Self::Erc20 { asset, .. }
            | Self::Erc721 { asset, .. }
            | Self::Erc1155 { asset, .. } => *asset,
        }
    }

    pub fn from(&self) -> Address {
        match self {
            Self::Erc20 { from, .. }
            | Self::Erc721 { from, .. }
            | Self::Erc1155 { from, .. } => *from,
        }
    }

    pub fn to(&self) -> Address {
        match self {
            Self::Erc20 { to, .. } | Self::Erc721 { to, .. } | Self::Erc1155 { to, .. } => *to,
        }
    }

    pub fn token_id(&self) -> Option<U256> {
        match self {
            Self::Erc20 { .. } => None,
            Self::Erc721 { token_id, .. } | Self::Erc1155 { token_id, .. } => Some(*token_id),
        }
    }

    pub fn is_fungible(&self) -> bool {
        matches!(self, Self::Erc20 { .. })
    }
}

/// One transaction's worth of decoded events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub hash: H256,
    /// Originating account (`tx.from`)
    pub from: Address,
    pub block_number: u64,
    /// Block timestamp (seconds)
    pub timestamp: u64,
    #[serde(default)]
    pub approvals: Vec<ApprovalEvent>,
    #[serde(default)]
    pub transfers: Vec<TransferEvent>,
}

impl TransactionEvent {
    pub fn new(hash: H256, from: Address, block_number: u64, timestamp: u64) -> Self {
        Self {
            hash,
            from,
            block_number,
            timestamp,
            approvals: Vec::new(),
            transfers: Vec::new(),
        }
    }

    pub fn with_approval(mut self, approval: ApprovalEvent) -> Self {
        self.approvals.push(approval);
        self
    }

    pub fn with_transfer(mut self, transfer: TransferEvent) -> Self {
        self.transfers.push(transfer);
        self
    }
}

/// Block boundary notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub number: u64,
    /// Block timestamp (seconds)
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_revoke_detection() {
        let zero_value = ApprovalEvent::Erc20 {
            asset: addr(1),
            owner: addr(2),
            spender: addr(3),
            value: U256::zero(),
        };
        assert!(zero_value.is_revoke());

        let cleared = ApprovalEvent::Erc721 {
            asset: addr(1),
            owner: addr(2),
            spender: Address::zero(),
            token_id: U256::from(7),
        };
        assert!(cleared.is_revoke());

        let revoked_operator = ApprovalEvent::ApprovalForAll {
            asset: addr(1),
            owner: addr(2),
            operator: addr(3),
            approved: false,
        };
        assert!(revoked_operator.is_revoke());

        let grant = ApprovalEvent::ApprovalForAll {
            asset: addr(1),
            owner: addr(2),
            operator: addr(3),
            approved: true,
        };
        assert!(!grant.is_revoke());
        assert_eq!(grant.spender(), addr(3));
        assert!(grant.is_approval_for_all());
    }

    #[test]
    fn test_serde_tagging() {
        let event = TransferEvent::Erc721 {
            asset: addr(1),
            from: addr(2),
            to: addr(3),
            token_id: U256::from(42),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "erc721");

        let back: TransferEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.token_id(), Some(U256::from(42)));
    }
}
