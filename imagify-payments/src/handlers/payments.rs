//! VNPay payment handlers.
//!
//! Implements payment initiation (signed redirect URL) and the return
//! callback that settles the pending transaction.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use imagify_core::error::AppError;
use imagify_core::middleware::auth::AuthUser;
use mongodb::bson::DateTime;
use uuid::Uuid;

use crate::{
    dtos::{CreatePaymentRequest, CreatePaymentResponse, PaymentResultResponse},
    models::{Transaction, TransactionStatus},
    services::metrics,
    services::vnpay::{PaymentRequest, VNP_RESPONSE_SUCCESS},
    AppState,
};

/// Create a pending transaction and issue the signed VNPay redirect URL.
///
/// The transaction is persisted before the URL is built, so the gateway's
/// transaction reference always resolves to a known pending payment.
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError> {
    let plan = payload.plan_id;

    tracing::info!(
        user_id = %user.user_id,
        plan = plan.name(),
        amount_vnd = plan.amount_vnd(),
        "Creating VNPay payment"
    );

    if !state.vnpay.is_configured() {
        return Err(AppError::InternalError(anyhow::anyhow!(
            "VNPay is not configured for this environment"
        )));
    }

    let now = DateTime::now();
    let transaction = Transaction {
        id: Uuid::new_v4(),
        user_id: user.user_id.clone(),
        plan,
        credits: plan.credits(),
        amount: plan.amount_vnd(),
        status: TransactionStatus::Pending,
        response_code: None,
        provider_txn_no: None,
        created_at: now,
        updated_at: now,
    };

    state
        .repository
        .create_transaction(transaction.clone())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to save transaction");
            AppError::InternalError(anyhow::anyhow!("Failed to save transaction"))
        })?;

    let order_info = format!(
        "Thanh toan goi {} - {} credits",
        plan.name(),
        plan.credits()
    );
    let request = PaymentRequest {
        txn_ref: transaction.id.to_string(),
        amount: transaction.amount,
        order_info,
        ip_addr: client_ip(&headers),
    };

    let payment_url = state.vnpay.payment_url(&request, Utc::now()).map_err(|e| {
        tracing::error!(error = %e, "Failed to build VNPay redirect URL");
        AppError::InternalError(anyhow::anyhow!("Failed to build payment URL: {}", e))
    })?;

    metrics::record_payment_initiated(plan.name());

    tracing::info!(
        transaction_id = %transaction.id,
        "VNPay payment URL issued"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            transaction_id: transaction.id,
            payment_url,
        }),
    ))
}

/// Settle a pending transaction from the gateway's return callback.
///
/// The signature is checked before any parameter is trusted, and the
/// echoed amount is cross-checked against the stored transaction.
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PaymentResultResponse>, AppError> {
    let is_valid = state.vnpay.verify_callback(&params).map_err(|e| {
        tracing::error!(error = %e, "Callback verification error");
        AppError::InternalError(anyhow::anyhow!("Callback verification failed"))
    })?;

    if !is_valid {
        metrics::record_callback("invalid_signature");
        tracing::warn!("Invalid VNPay callback signature");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid signature")));
    }

    // Signature checked; the parameters can be trusted from here on.
    let txn_ref = params
        .get("vnp_TxnRef")
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing vnp_TxnRef")))?;
    let transaction_id = Uuid::parse_str(txn_ref)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Malformed vnp_TxnRef")))?;
    let response_code = params
        .get("vnp_ResponseCode")
        .cloned()
        .unwrap_or_default();

    let transaction = state
        .repository
        .get_transaction(transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    if transaction.status.is_settled() {
        // Replayed or refreshed callback; report the recorded outcome
        // without settling twice.
        tracing::warn!(
            transaction_id = %transaction.id,
            status = ?transaction.status,
            "Callback for already settled transaction"
        );
        return Ok(Json(PaymentResultResponse {
            success: transaction.status == TransactionStatus::Completed,
            transaction_id: transaction.id,
            response_code: transaction.response_code.unwrap_or_default(),
            credits: transaction.credits,
            message: "Transaction already settled".to_string(),
        }));
    }

    // The gateway echoes the amount in minor units; a mismatch means the
    // callback does not belong to this transaction.
    let echoed_amount = params.get("vnp_Amount").map(String::as_str).unwrap_or("");
    let expected_amount = (transaction.amount * 100).to_string();
    if echoed_amount != expected_amount {
        metrics::record_callback("amount_mismatch");
        tracing::warn!(
            transaction_id = %transaction.id,
            expected = %expected_amount,
            received = %echoed_amount,
            "Callback amount mismatch"
        );
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Amount does not match transaction"
        )));
    }

    let provider_txn_no = params.get("vnp_TransactionNo").map(String::as_str);
    let (new_status, success, message) = if response_code == VNP_RESPONSE_SUCCESS {
        (TransactionStatus::Completed, true, "Payment successful")
    } else {
        (TransactionStatus::Failed, false, "Payment failed")
    };

    state
        .repository
        .settle_transaction(
            transaction.id,
            new_status.clone(),
            &response_code,
            provider_txn_no,
        )
        .await?;

    if success {
        metrics::record_callback("completed");
        metrics::record_completed_amount(transaction.plan.name(), transaction.amount);
    } else {
        metrics::record_callback("failed");
    }

    tracing::info!(
        transaction_id = %transaction.id,
        response_code = %response_code,
        status = ?new_status,
        "VNPay callback settled"
    );

    Ok(Json(PaymentResultResponse {
        success,
        transaction_id: transaction.id,
        response_code,
        credits: transaction.credits,
        message: message.to_string(),
    }))
}

/// First client hop from X-Forwarded-For, falling back to loopback.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_loopback() {
        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_ip(&headers), "127.0.0.1");
    }
}
