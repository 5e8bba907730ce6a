use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CreditPlan, Transaction, TransactionStatus};

/// Request to start a VNPay payment for a credit package.
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub plan_id: CreditPlan,
}

/// Response after a payment URL has been issued.
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    /// Internal transaction ID; also the gateway transaction reference.
    pub transaction_id: Uuid,
    /// Signed gateway URL to redirect the customer to.
    pub payment_url: String,
}

/// Outcome reported to the customer after the return callback.
#[derive(Debug, Serialize)]
pub struct PaymentResultResponse {
    pub success: bool,
    pub transaction_id: Uuid,
    /// Gateway result code ("00" = success).
    pub response_code: String,
    /// Credits purchased; granted to the balance by the account service.
    pub credits: u32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> i64 {
    20
}

/// Transaction response DTO.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub plan: CreditPlan,
    pub credits: u32,
    pub amount: u64,
    pub status: TransactionStatus,
    pub response_code: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Transaction> for TransactionResponse {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            plan: t.plan,
            credits: t.credits,
            amount: t.amount,
            status: t.status,
            response_code: t.response_code,
            created_at: t.created_at.to_string(),
            updated_at: t.updated_at.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    pub transactions: Vec<TransactionResponse>,
    pub total_count: i64,
}
