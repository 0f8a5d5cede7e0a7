use dsp_common::{geo::Coordinate, Kobo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::PaymentStatusType;

//-------------------------------------- DistanceService -------------------------------------------------------------
/// External mapping/distance service. Any error here puts distance resolution into degraded mode: the caller falls
/// back to the Haversine result and carries on.
#[allow(async_fn_in_trait)]
pub trait DistanceService {
    /// Road (or provider-defined) distance between two coordinates, in kilometres.
    async fn calculate_distance(&self, from: Coordinate, to: Coordinate) -> Result<f64, DistanceServiceError>;
}

#[derive(Debug, Clone, Error)]
pub enum DistanceServiceError {
    #[error("The mapping service is unreachable: {0}")]
    Unreachable(String),
    #[error("The mapping service returned an invalid response: {0}")]
    InvalidResponse(String),
}

//-------------------------------------- PaymentProvider -------------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_number: String,
    pub bank_name: String,
    pub reference: String,
}

/// A provider-side view of a transaction, as returned by a status query.
#[derive(Debug, Clone)]
pub struct ProviderTransaction {
    pub provider_tx_id: String,
    pub status: PaymentStatusType,
    pub amount: Kobo,
    pub raw: serde_json::Value,
}

/// The escrow-style payment provider. The raw wire protocol (virtual account issuance, webhook signatures) is
/// handled upstream; the engine only consumes these three calls.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider {
    async fn generate_virtual_account(
        &self,
        order_id: i64,
        amount: Kobo,
    ) -> Result<VirtualAccount, PaymentProviderError>;

    /// Re-queries the authoritative transaction status. The expiry sweep uses this to resolve ambiguous pending
    /// payments rather than guessing.
    async fn get_transaction_status(&self, provider_tx_id: &str) -> Result<ProviderTransaction, PaymentProviderError>;

    fn validate_webhook_payload(&self, payload: &[u8], signature: &str) -> Result<(), PaymentProviderError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentProviderError {
    #[error("The payment provider is unreachable: {0}")]
    Unreachable(String),
    #[error("The payment provider rejected the request: {0}")]
    Rejected(String),
    #[error("Unknown provider transaction {0}")]
    UnknownTransaction(String),
    #[error("Invalid webhook signature")]
    InvalidSignature,
}

//--------------------------------------   ChatService    ------------------------------------------------------------
/// Fire-and-forget chat transport. Activation failures are logged by callers and never fail the primary operation.
#[allow(async_fn_in_trait)]
pub trait ChatService {
    async fn activate_chat(&self, order_id: i64, activated_by: &str) -> Result<(), ChatServiceError>;

    async fn save_message(&self, order_id: i64, sender: &str, body: &str) -> Result<(), ChatServiceError>;
}

#[derive(Debug, Clone, Error)]
pub enum ChatServiceError {
    #[error("The chat service is unreachable: {0}")]
    Unreachable(String),
    #[error("Chat channel for order {0} could not be activated: {1}")]
    ActivationFailed(i64, String),
}
