use std::str::FromStr;

use alloy_primitives::Address;
use dgw_common::Wei;
use log::*;
use thiserror::Error;

use crate::traits::{ChainRpc, RpcError};

/// What a transaction has to satisfy to count as payment.
#[derive(Debug, Clone)]
pub struct TransferCheck<'a> {
    pub tx_hash: &'a str,
    pub merchant_address: &'a str,
    pub expected_amount: Wei,
    pub chain_id: u64,
    /// If set, the transaction must come from this address
    pub from_address: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransfer {
    pub sender: String,
    pub recipient: String,
    pub value: Wei,
    pub block_number: Option<u64>,
}

/// The transaction was found but does not pay for the order. Not retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Transaction not found")]
    TxNotFound,
    #[error("Transaction receipt not found")]
    ReceiptNotFound,
    #[error("Transaction failed on chain")]
    TxFailedOnChain,
    #[error("Transaction is on chain {actual}, expected {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },
    #[error("Transaction pays {actual}, expected {expected}")]
    RecipientMismatch { expected: String, actual: String },
    #[error("Transaction transfers {actual} wei, expected at least {expected}")]
    AmountInsufficient { expected: Wei, actual: Wei },
    #[error("Transaction was sent by {actual}, expected {expected}")]
    SenderMismatch { expected: String, actual: String },
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TxNotFound => "tx_not_found",
            Self::ReceiptNotFound => "receipt_not_found",
            Self::TxFailedOnChain => "tx_failed_on_chain",
            Self::ChainIdMismatch { .. } => "chain_id_mismatch",
            Self::RecipientMismatch { .. } => "recipient_mismatch",
            Self::AmountInsufficient { .. } => "amount_insufficient",
            Self::SenderMismatch { .. } => "sender_mismatch",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    #[error("{0}")]
    Rejected(#[from] Rejection),
    #[error("{0}")]
    Rpc(#[from] RpcError),
}

/// Address equality, ignoring case and checksums. Strings that aren't addresses only match themselves (ignoring
/// case).
pub fn same_address(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    match (Address::from_str(a), Address::from_str(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.eq_ignore_ascii_case(b),
    }
}

fn parse_u64_quantity(s: &str) -> Option<u64> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 16).ok()
}

#[derive(Clone)]
pub struct OnChainVerifier<C: ChainRpc> {
    rpc: C,
}

impl<C: ChainRpc> OnChainVerifier<C> {
    pub fn new(rpc: C) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &C {
        &self.rpc
    }

    /// Checks, in order, that
    /// 1. the transaction exists,
    /// 2. it has a receipt,
    /// 3. the receipt reports success,
    /// 4. it is on the expected chain (when the node reports a chain id),
    /// 5. it pays the merchant,
    /// 6. it transfers at least the expected amount (overpayment is fine), and
    /// 7. it comes from the required sender, if there is one.
    ///
    /// The first failed check is the rejection. RPC failures are reported separately and say nothing about the
    /// transaction.
    pub async fn verify(&self, check: &TransferCheck<'_>) -> Result<VerifiedTransfer, VerifyError> {
        let tx_hash = check.tx_hash;
        debug!("⛓️ Verifying transaction {tx_hash}");
        let tx = self.rpc.get_transaction(tx_hash).await?.ok_or(Rejection::TxNotFound)?;
        let receipt = self.rpc.get_receipt(tx_hash).await?.ok_or(Rejection::ReceiptNotFound)?;
        let succeeded = receipt.status.as_deref().and_then(parse_u64_quantity) == Some(1);
        if !succeeded {
            info!("⛓️ Transaction {tx_hash} did not succeed on chain. Status: {:?}", receipt.status);
            return Err(Rejection::TxFailedOnChain.into());
        }
        if let Some(actual) = tx.chain_id.as_deref().and_then(parse_u64_quantity) {
            if actual != check.chain_id {
                return Err(Rejection::ChainIdMismatch { expected: check.chain_id, actual }.into());
            }
        }
        let recipient = tx.to.clone().unwrap_or_default();
        if !same_address(&recipient, check.merchant_address) {
            return Err(
                Rejection::RecipientMismatch { expected: check.merchant_address.to_string(), actual: recipient }.into()
            );
        }
        let value = Wei::from_hex_quantity(tx.value.as_deref()).unwrap_or_else(|e| {
            warn!("⛓️ Transaction {tx_hash} has an unreadable value. Treating it as zero. {e}");
            Wei::ZERO
        });
        if value < check.expected_amount {
            return Err(Rejection::AmountInsufficient { expected: check.expected_amount, actual: value }.into());
        }
        let sender = tx.from.clone().unwrap_or_default();
        if let Some(expected) = check.from_address {
            if !same_address(&sender, expected) {
                return Err(Rejection::SenderMismatch { expected: expected.to_string(), actual: sender }.into());
            }
        }
        let block_number =
            receipt.block_number.as_deref().or(tx.block_number.as_deref()).and_then(parse_u64_quantity);
        info!("⛓️ Transaction {tx_hash} verified: {value} wei from {sender} in block {block_number:?}");
        Ok(VerifiedTransfer { sender, recipient, value, block_number })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        test_utils::{FixtureChain, BUYER, MERCHANT},
        traits::{ChainReceipt, ChainTransaction},
    };

    const EXPECTED: u64 = 116_000_000_000_000_000;

    fn check(tx_hash: &str) -> TransferCheck<'_> {
        TransferCheck {
            tx_hash,
            merchant_address: MERCHANT,
            expected_amount: Wei::from(EXPECTED),
            chain_id: 1,
            from_address: None,
        }
    }

    async fn rejection(chain: &FixtureChain, check: &TransferCheck<'_>) -> Rejection {
        match OnChainVerifier::new(chain.clone()).verify(check).await {
            Err(VerifyError::Rejected(r)) => r,
            other => panic!("Expected a rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exact_and_over_payments_pass() {
        let chain = FixtureChain::new(1);
        chain.add_transfer("0x01", BUYER, MERCHANT, Wei::from(EXPECTED));
        chain.add_transfer("0x02", BUYER, &MERCHANT.to_uppercase().replace("0X", "0x"), Wei::from(EXPECTED + 1));
        let verifier = OnChainVerifier::new(chain.clone());
        let transfer = verifier.verify(&check("0x01")).await.unwrap();
        assert_eq!(transfer.value, Wei::from(EXPECTED));
        assert!(same_address(&transfer.sender, BUYER));
        assert!(verifier.verify(&check("0x02")).await.is_ok());
    }

    #[tokio::test]
    async fn underpayment_by_one_wei_is_rejected() {
        let chain = FixtureChain::new(1);
        chain.add_transfer("0x01", BUYER, MERCHANT, Wei::from(EXPECTED - 1));
        let r = rejection(&chain, &check("0x01")).await;
        assert_eq!(r.kind(), "amount_insufficient");
    }

    #[tokio::test]
    async fn rejections_in_order() {
        let chain = FixtureChain::new(1);
        assert_eq!(rejection(&chain, &check("0x404")).await, Rejection::TxNotFound);

        let tx = ChainTransaction {
            hash: "0x05".into(),
            from: Some(BUYER.into()),
            to: Some(MERCHANT.into()),
            value: Some("0x19c1d62a9f20000".into()),
            chain_id: Some("0x1".into()),
            block_number: None,
        };
        chain.add_transaction(tx.clone(), None);
        assert_eq!(rejection(&chain, &check("0x05")).await, Rejection::ReceiptNotFound);

        let failed = ChainReceipt { status: Some("0x0".into()), ..Default::default() };
        chain.add_transaction(tx.clone(), Some(failed));
        assert_eq!(rejection(&chain, &check("0x05")).await, Rejection::TxFailedOnChain);

        chain.add_transfer("0x06", BUYER, "0x000000000000000000000000000000000000dEaD", Wei::from(EXPECTED));
        assert_eq!(rejection(&chain, &check("0x06")).await.kind(), "recipient_mismatch");

        let mut wrong_sender = check("0x01");
        chain.add_transfer("0x01", BUYER, MERCHANT, Wei::from(EXPECTED));
        wrong_sender.from_address = Some(MERCHANT);
        assert_eq!(rejection(&chain, &wrong_sender).await.kind(), "sender_mismatch");
        wrong_sender.from_address = Some(BUYER);
        assert!(OnChainVerifier::new(chain.clone()).verify(&wrong_sender).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_chain() {
        let chain = FixtureChain::new(8453);
        chain.add_transfer("0x01", BUYER, MERCHANT, Wei::from(EXPECTED));
        assert_eq!(rejection(&chain, &check("0x01")).await, Rejection::ChainIdMismatch { expected: 1, actual: 8453 });
    }

    #[tokio::test]
    async fn missing_values_are_zero() {
        let chain = FixtureChain::new(1);
        let tx = ChainTransaction {
            hash: "0x07".into(),
            from: Some(BUYER.into()),
            to: Some(MERCHANT.into()),
            value: Some("0x".into()),
            ..Default::default()
        };
        chain.add_transaction(tx, Some(ChainReceipt { status: Some("0x1".into()), ..Default::default() }));
        let r = rejection(&chain, &check("0x07")).await;
        assert_eq!(r, Rejection::AmountInsufficient { expected: Wei::from(EXPECTED), actual: Wei::ZERO });
        let mut free = check("0x07");
        free.expected_amount = Wei::ZERO;
        assert!(OnChainVerifier::new(chain).verify(&free).await.is_ok());
    }

    #[tokio::test]
    async fn rpc_failures_are_not_rejections() {
        let chain = FixtureChain::new(1);
        chain.add_transfer("0x01", BUYER, MERCHANT, Wei::from(EXPECTED));
        chain.set_offline(true);
        let err = OnChainVerifier::new(chain).verify(&check("0x01")).await.unwrap_err();
        assert!(matches!(err, VerifyError::Rpc(_)));
    }

    #[test]
    fn address_comparison() {
        assert!(same_address(MERCHANT, &MERCHANT.to_lowercase()));
        assert!(same_address(" 0xAbC ", "0xabc"));
        assert!(!same_address(MERCHANT, BUYER));
        assert!(!same_address("", MERCHANT));
    }
}
