//! Transaction query handlers.
//!
//! All reads are scoped to the authenticated user.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use imagify_core::error::AppError;
use imagify_core::middleware::auth::AuthUser;
use uuid::Uuid;

use crate::{
    dtos::{ListTransactionsQuery, ListTransactionsResponse, TransactionResponse},
    AppState,
};

/// Get one of the caller's transactions by id.
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    tracing::info!(
        transaction_id = %transaction_id,
        user_id = %user.user_id,
        "Fetching transaction"
    );

    let transaction = state
        .repository
        .get_transaction_for_user(&user.user_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Transaction not found")))?;

    Ok(Json(TransactionResponse::from(transaction)))
}

/// List the caller's transactions, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, AppError> {
    let (transactions, total_count) = state
        .repository
        .list_transactions_for_user(&user.user_id, query.limit, query.offset)
        .await?;

    Ok(Json(ListTransactionsResponse {
        transactions: transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
        total_count,
    }))
}
