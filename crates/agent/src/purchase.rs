//! Purchase-flow tracker
//!
//! In-memory per-session funnel state, driven entirely by client events.
//! The pipeline never advances the funnel itself; the state's only use is
//! the guidance paragraph prepended to the system prompt. Completed
//! purchases clear themselves 60 s after the final transition.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use avatar_core::PurchaseFlowStatus;

const COMPLETED_CLEAR_AFTER: Duration = Duration::from_secs(60);

/// Tracked state for one session.
#[derive(Debug, Clone)]
pub struct PurchaseFlowEntry {
    pub status: PurchaseFlowStatus,
    pub data: Map<String, Value>,
    pub updated_at: Instant,
}

impl Default for PurchaseFlowEntry {
    fn default() -> Self {
        Self {
            status: PurchaseFlowStatus::Idle,
            data: Map::new(),
            updated_at: Instant::now(),
        }
    }
}

/// Session-keyed purchase-flow map.
#[derive(Default)]
pub struct PurchaseFlowTracker {
    entries: DashMap<String, PurchaseFlowEntry>,
}

impl PurchaseFlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition, merging the data bag and bumping the timestamp.
    /// Reaching `purchase-completed` schedules a clear after 60 s.
    pub fn set(
        self: &Arc<Self>,
        session_id: &str,
        status: PurchaseFlowStatus,
        data: Map<String, Value>,
    ) {
        let updated_at = Instant::now();
        {
            let mut entry = self.entries.entry(session_id.to_string()).or_default();
            entry.status = status;
            entry.updated_at = updated_at;
            for (key, value) in data {
                entry.data.insert(key, value);
            }
        }
        tracing::debug!(session_id = %session_id, status = %status, "purchase flow transition");

        if status == PurchaseFlowStatus::PurchaseCompleted {
            let tracker = Arc::clone(self);
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(COMPLETED_CLEAR_AFTER).await;
                // Only clear if no later transition touched the entry.
                tracker.entries.remove_if(&session_id, |_, entry| {
                    entry.status == PurchaseFlowStatus::PurchaseCompleted
                        && entry.updated_at == updated_at
                });
            });
        }
    }

    /// Current state, defaulting to idle.
    pub fn get(&self, session_id: &str) -> PurchaseFlowEntry {
        self.entries
            .get(session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        self.entries.remove(session_id);
    }
}

/// Status-specific paragraph prepended to the system prompt. `None` for
/// idle sessions.
pub fn guidance(entry: &PurchaseFlowEntry) -> Option<String> {
    let product = entry
        .data
        .get("product_name")
        .and_then(Value::as_str)
        .unwrap_or("the selected product");
    let error = entry.data.get("error").and_then(Value::as_str);

    let text = match entry.status {
        PurchaseFlowStatus::Idle => return None,
        PurchaseFlowStatus::ProductsDisplayed => {
            "The user is looking at the trending products you just surfaced. Help them compare \
             the items and nudge them toward picking one they like."
                .to_string()
        }
        PurchaseFlowStatus::ProductSelected => format!(
            "The user selected {product}. Answer questions about it and, when they are ready, \
             guide them to connect a wallet to pay."
        ),
        PurchaseFlowStatus::WalletConnecting => {
            "The user is connecting their wallet right now. Keep responses short and reassuring \
             until the connection finishes."
                .to_string()
        }
        PurchaseFlowStatus::WalletConnected => {
            "The user's wallet is connected. They can now confirm the purchase; walk them \
             through the final step."
                .to_string()
        }
        PurchaseFlowStatus::WalletDisconnected => {
            "The user's wallet disconnected. Offer to retry the connection before continuing \
             the purchase."
                .to_string()
        }
        PurchaseFlowStatus::CryptoPaymentInitiated => format!(
            "The user initiated a crypto payment for {product}. Tell them to approve the \
             transaction in their wallet."
        ),
        PurchaseFlowStatus::TransactionPending => {
            "The payment transaction is pending on-chain. Reassure the user that this can take \
             a little while; do not ask them to pay again."
                .to_string()
        }
        PurchaseFlowStatus::TransactionConfirming => {
            "The transaction is confirming. Let the user know the purchase is almost done."
                .to_string()
        }
        PurchaseFlowStatus::PurchaseExecuting => {
            "Payment confirmed; the purchase is executing. Tell the user their order is being \
             finalized."
                .to_string()
        }
        PurchaseFlowStatus::PurchaseCompleted => format!(
            "The purchase of {product} just completed successfully. Congratulate the user and \
             offer help with anything else."
        ),
        PurchaseFlowStatus::PurchaseFailed => format!(
            "The purchase failed{}. Apologize briefly and offer to try again.",
            error.map(|e| format!(" ({e})")).unwrap_or_default()
        ),
        PurchaseFlowStatus::InsufficientFunds => {
            "The user's wallet has insufficient funds for this purchase. Suggest topping up or \
             choosing a cheaper item; do not pressure them."
                .to_string()
        }
        PurchaseFlowStatus::PriceExpired => {
            "The quoted price expired before payment. Offer to refresh the price and try again."
                .to_string()
        }
        PurchaseFlowStatus::TransactionFailed => format!(
            "The on-chain transaction failed{}. Apologize and offer to retry the payment.",
            error.map(|e| format!(" ({e})")).unwrap_or_default()
        ),
    };
    Some(format!("Current purchase context: {text}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn set_merges_data_and_get_defaults_to_idle() {
        let tracker = Arc::new(PurchaseFlowTracker::new());
        assert_eq!(tracker.get("s1").status, PurchaseFlowStatus::Idle);

        tracker.set(
            "s1",
            PurchaseFlowStatus::ProductSelected,
            map(&[("product_name", json!("Neon Jacket"))]),
        );
        tracker.set(
            "s1",
            PurchaseFlowStatus::CryptoPaymentInitiated,
            map(&[("amount", json!("0.05 ETH"))]),
        );

        let entry = tracker.get("s1");
        assert_eq!(entry.status, PurchaseFlowStatus::CryptoPaymentInitiated);
        assert_eq!(entry.data["product_name"], "Neon Jacket");
        assert_eq!(entry.data["amount"], "0.05 ETH");
    }

    #[tokio::test(start_paused = true)]
    async fn completed_entries_clear_after_a_minute() {
        let tracker = Arc::new(PurchaseFlowTracker::new());
        tracker.set("s1", PurchaseFlowStatus::PurchaseCompleted, Map::new());

        tokio::time::advance(Duration::from_secs(59)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get("s1").status, PurchaseFlowStatus::PurchaseCompleted);

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get("s1").status, PurchaseFlowStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn later_transition_defuses_scheduled_clear() {
        let tracker = Arc::new(PurchaseFlowTracker::new());
        tracker.set("s1", PurchaseFlowStatus::PurchaseCompleted, Map::new());

        tokio::time::advance(Duration::from_secs(30)).await;
        tracker.set("s1", PurchaseFlowStatus::ProductsDisplayed, Map::new());

        tokio::time::advance(Duration::from_secs(40)).await;
        tokio::task::yield_now().await;
        assert_eq!(tracker.get("s1").status, PurchaseFlowStatus::ProductsDisplayed);
    }

    #[test]
    fn guidance_is_none_only_for_idle() {
        assert!(guidance(&PurchaseFlowEntry::default()).is_none());

        let entry = PurchaseFlowEntry {
            status: PurchaseFlowStatus::InsufficientFunds,
            data: Map::new(),
            updated_at: Instant::now(),
        };
        let text = guidance(&entry).unwrap();
        assert!(text.contains("insufficient funds"));
    }

    #[test]
    fn guidance_uses_data_bag() {
        let entry = PurchaseFlowEntry {
            status: PurchaseFlowStatus::PurchaseCompleted,
            data: map(&[("product_name", json!("Neon Jacket"))]),
            updated_at: Instant::now(),
        };
        assert!(guidance(&entry).unwrap().contains("Neon Jacket"));
    }
}
