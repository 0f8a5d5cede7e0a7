//! In-memory stand-ins for the external services the engine talks to.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use dsp_common::{
    geo::{haversine_distance, Coordinate},
    Kobo,
};

use crate::traits::{
    ChatService,
    ChatServiceError,
    DistanceService,
    DistanceServiceError,
    PaymentProvider,
    PaymentProviderError,
    ProviderTransaction,
    VirtualAccount,
};

/// A distance service that is always down. Exercises the Haversine fallback path.
#[derive(Debug, Clone, Default)]
pub struct OfflineMaps;

impl DistanceService for OfflineMaps {
    async fn calculate_distance(&self, _from: Coordinate, _to: Coordinate) -> Result<f64, DistanceServiceError> {
        Err(DistanceServiceError::Unreachable("maps double is configured offline".to_string()))
    }
}

/// A distance service that answers with the great-circle distance, as a stand-in for a healthy provider.
#[derive(Debug, Clone, Default)]
pub struct StraightLineMaps;

impl DistanceService for StraightLineMaps {
    async fn calculate_distance(&self, from: Coordinate, to: Coordinate) -> Result<f64, DistanceServiceError> {
        Ok(haversine_distance(from, to))
    }
}

/// A chat service that accepts everything and remembers nothing.
#[derive(Debug, Clone, Default)]
pub struct NullChat;

impl ChatService for NullChat {
    async fn activate_chat(&self, _order_id: i64, _activated_by: &str) -> Result<(), ChatServiceError> {
        Ok(())
    }

    async fn save_message(&self, _order_id: i64, _sender: &str, _body: &str) -> Result<(), ChatServiceError> {
        Ok(())
    }
}

/// A chat service that remembers every activation, so tests can assert who was invited to which order's channel.
#[derive(Debug, Clone, Default)]
pub struct RecordingChat {
    activations: Arc<Mutex<Vec<(i64, String)>>>,
}

impl RecordingChat {
    pub fn activations(&self) -> Vec<(i64, String)> {
        self.activations.lock().unwrap().clone()
    }
}

impl ChatService for RecordingChat {
    async fn activate_chat(&self, order_id: i64, activated_by: &str) -> Result<(), ChatServiceError> {
        self.activations.lock().unwrap().push((order_id, activated_by.to_string()));
        Ok(())
    }

    async fn save_message(&self, _order_id: i64, _sender: &str, _body: &str) -> Result<(), ChatServiceError> {
        Ok(())
    }
}

/// A scripted payment provider. Tests preload transaction statuses with [`TestProvider::set_transaction`] and the
/// sweep/confirmation flows read them back.
#[derive(Debug, Clone, Default)]
pub struct TestProvider {
    transactions: Arc<Mutex<HashMap<String, ProviderTransaction>>>,
}

impl TestProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_transaction(&self, tx: ProviderTransaction) {
        self.transactions.lock().unwrap().insert(tx.provider_tx_id.clone(), tx);
    }
}

impl PaymentProvider for TestProvider {
    async fn generate_virtual_account(
        &self,
        order_id: i64,
        _amount: Kobo,
    ) -> Result<VirtualAccount, PaymentProviderError> {
        Ok(VirtualAccount {
            account_number: format!("99000000{order_id:02}"),
            bank_name: "Test Bank".to_string(),
            reference: format!("VA-{order_id}"),
        })
    }

    async fn get_transaction_status(&self, provider_tx_id: &str) -> Result<ProviderTransaction, PaymentProviderError> {
        self.transactions
            .lock()
            .unwrap()
            .get(provider_tx_id)
            .cloned()
            .ok_or_else(|| PaymentProviderError::UnknownTransaction(provider_tx_id.to_string()))
    }

    fn validate_webhook_payload(&self, _payload: &[u8], _signature: &str) -> Result<(), PaymentProviderError> {
        Ok(())
    }
}
