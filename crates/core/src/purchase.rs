//! Purchase-flow status vocabulary
//!
//! Transitions are produced by the client and pushed into the per-session
//! tracker; the pipeline only annotates LLM context with them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Funnel states for the product discovery/payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PurchaseFlowStatus {
    #[default]
    Idle,
    ProductsDisplayed,
    ProductSelected,
    WalletConnecting,
    WalletConnected,
    WalletDisconnected,
    CryptoPaymentInitiated,
    TransactionPending,
    TransactionConfirming,
    PurchaseExecuting,
    PurchaseCompleted,
    PurchaseFailed,
    InsufficientFunds,
    PriceExpired,
    TransactionFailed,
}

impl fmt::Display for PurchaseFlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", s.trim_matches('"'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&PurchaseFlowStatus::CryptoPaymentInitiated).unwrap(),
            "\"crypto-payment-initiated\""
        );
        assert_eq!(PurchaseFlowStatus::PurchaseCompleted.to_string(), "purchase-completed");
    }
}
