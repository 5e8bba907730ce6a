use crate::models::{Transaction, TransactionStatus};
use anyhow::Result;
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{bson::doc, Collection, Database, IndexModel};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentRepository {
    transactions: Collection<Transaction>,
}

impl PaymentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            transactions: db.collection("transactions"),
        }
    }

    /// Initialize database indexes for user-scoped queries.
    pub async fn init_indexes(&self) -> Result<()> {
        // Compound index on (user_id, created_at) for per-user history listings
        let user_history_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_history_idx".to_string())
                    .build(),
            )
            .build();

        // Compound index on (user_id, status) for pending-payment lookups
        let user_status_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_status_idx".to_string())
                    .build(),
            )
            .build();

        self.transactions
            .create_indexes([user_history_index, user_status_index], None)
            .await?;

        tracing::info!("Payment service indexes initialized");
        Ok(())
    }

    pub async fn create_transaction(&self, transaction: Transaction) -> Result<()> {
        self.transactions.insert_one(transaction, None).await?;
        Ok(())
    }

    /// Get a transaction by id, unscoped.
    ///
    /// Used by the gateway callback, which authenticates by signature
    /// rather than by user session.
    pub async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let filter = doc! { "_id": id.to_string() };
        let transaction = self.transactions.find_one(filter, None).await?;
        Ok(transaction)
    }

    /// Get a transaction by id, scoped to its owner.
    pub async fn get_transaction_for_user(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<Transaction>> {
        let filter = doc! {
            "_id": id.to_string(),
            "user_id": user_id
        };
        let transaction = self.transactions.find_one(filter, None).await?;
        Ok(transaction)
    }

    /// Record the callback outcome on a transaction.
    pub async fn settle_transaction(
        &self,
        id: Uuid,
        status: TransactionStatus,
        response_code: &str,
        provider_txn_no: Option<&str>,
    ) -> Result<()> {
        let filter = doc! { "_id": id.to_string() };
        let update = doc! {
            "$set": {
                "status": mongodb::bson::to_bson(&status)?,
                "response_code": response_code,
                "provider_txn_no": provider_txn_no,
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        self.transactions.update_one(filter, update, None).await?;
        Ok(())
    }

    /// List a user's transactions, newest first, with the total count.
    pub async fn list_transactions_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: u64,
    ) -> Result<(Vec<Transaction>, i64)> {
        use futures::TryStreamExt;

        let filter = doc! { "user_id": user_id };

        let total_count = self
            .transactions
            .count_documents(filter.clone(), None)
            .await? as i64;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(offset)
            .limit(limit)
            .build();

        let cursor = self.transactions.find(filter, Some(options)).await?;
        let transactions: Vec<Transaction> = cursor.try_collect().await?;

        Ok((transactions, total_count))
    }
}
