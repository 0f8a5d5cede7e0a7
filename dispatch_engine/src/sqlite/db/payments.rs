use chrono::Duration;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentRecord, PaymentRecord, PaymentStatusType},
    traits::DispatchError,
};

/// Registers a pending provider transaction for the order, returning the existing record unchanged if one is
/// already in flight for the same (order, provider) pair.
pub async fn idempotent_insert(
    record: NewPaymentRecord,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, DispatchError> {
    let existing: Option<PaymentRecord> = sqlx::query_as(
        "SELECT * FROM payment_records WHERE order_id = $1 AND provider = $2 AND status = 'Pending'",
    )
    .bind(record.order_id)
    .bind(&record.provider)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(existing) = existing {
        debug!(
            "💳️ Order {} already has a pending {} transaction ({}). Nothing to do.",
            record.order_id, record.provider, existing.provider_tx_id
        );
        return Ok(existing);
    }
    let inserted = sqlx::query_as(
        "INSERT INTO payment_records (order_id, provider, provider_tx_id, amount, idempotency_key) VALUES ($1, $2, \
         $3, $4, $5) RETURNING *",
    )
    .bind(record.order_id)
    .bind(&record.provider)
    .bind(&record.provider_tx_id)
    .bind(record.amount)
    .bind(&record.idempotency_key)
    .fetch_one(conn)
    .await?;
    Ok(inserted)
}

/// Marks any pending record matching the confirmed provider transaction as completed. Called inside the
/// payment-confirmation transaction; a missing record is not an error since the webhook may beat the registration.
pub(crate) async fn complete_matching_pending(
    order_id: i64,
    provider_tx_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE payment_records SET status = 'Completed', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         provider_tx_id = $2 AND status = 'Pending'",
    )
    .bind(order_id)
    .bind(provider_tx_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_record_status(
    id: i64,
    status: PaymentStatusType,
    raw_response: Option<&serde_json::Value>,
    conn: &mut SqliteConnection,
) -> Result<(), DispatchError> {
    let raw = raw_response.map(|v| v.to_string());
    let result = sqlx::query(
        "UPDATE payment_records SET status = $1, raw_response = COALESCE($2, raw_response), updated_at = \
         CURRENT_TIMESTAMP WHERE id = $3",
    )
    .bind(status)
    .bind(raw)
    .bind(id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DispatchError::PaymentRecordNotFound(id));
    }
    Ok(())
}

/// Pending records that have not moved for at least `older_than`. The expiry sweep re-queries the provider for
/// these; nothing is expired on guesswork.
pub async fn stale_pending(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRecord>, sqlx::Error> {
    let records = sqlx::query_as(
        format!(
            "SELECT * FROM payment_records WHERE status = 'Pending' AND (unixepoch(CURRENT_TIMESTAMP) - \
             unixepoch(updated_at)) > {} ORDER BY updated_at ASC",
            older_than.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(records)
}
