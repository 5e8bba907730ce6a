use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A credit purchase paid through VNPay.
///
/// The transaction id doubles as the gateway transaction reference
/// (vnp_TxnRef), so a callback always resolves to exactly one record.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub plan: CreditPlan,
    pub credits: u32,
    /// Amount in VND major units.
    pub amount: u64,
    pub status: TransactionStatus,
    /// Gateway result code from the callback ("00" = success).
    pub response_code: Option<String>,
    /// Gateway-side transaction number from the callback.
    pub provider_txn_no: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Whether a callback has already settled this transaction.
    pub fn is_settled(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// Purchasable credit packages.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CreditPlan {
    Basic,
    Advanced,
    Business,
}

impl CreditPlan {
    pub fn credits(&self) -> u32 {
        match self {
            CreditPlan::Basic => 100,
            CreditPlan::Advanced => 500,
            CreditPlan::Business => 5_000,
        }
    }

    /// Package price in VND major units.
    pub fn amount_vnd(&self) -> u64 {
        match self {
            CreditPlan::Basic => 10_000,
            CreditPlan::Advanced => 50_000,
            CreditPlan::Business => 100_000,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CreditPlan::Basic => "Basic",
            CreditPlan::Advanced => "Advanced",
            CreditPlan::Business => "Business",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_from_client_payload() {
        let plan: CreditPlan = serde_json::from_str("\"Advanced\"").unwrap();
        assert_eq!(plan, CreditPlan::Advanced);
        assert_eq!(plan.credits(), 500);
        assert_eq!(plan.amount_vnd(), 50_000);
    }

    #[test]
    fn unknown_plan_is_rejected() {
        assert!(serde_json::from_str::<CreditPlan>("\"Premium\"").is_err());
    }

    #[test]
    fn only_pending_transactions_are_unsettled() {
        assert!(!TransactionStatus::Pending.is_settled());
        assert!(TransactionStatus::Completed.is_settled());
        assert!(TransactionStatus::Failed.is_settled());
    }
}
