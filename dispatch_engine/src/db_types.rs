use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use dsp_common::{geo::Coordinate, Kobo};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

//--------------------------------------    OrderNumber      ---------------------------------------------------------
/// The human-readable order reference, generated once at checkout and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNumber(pub String);

impl Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for OrderNumber {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------  OrderStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// Checkout is complete but no agent has been assigned yet.
    Pending,
    /// An agent has been assigned and has not yet started the job.
    Accepted,
    /// The agent is en route to the market.
    InProgress,
    /// The agent is shopping the list.
    Shopping,
    /// Shopping is done; the agent is preparing for delivery.
    ShoppingCompleted,
    /// The agent is delivering the order.
    Delivery,
    /// The order was delivered. Terminal.
    Completed,
    /// The order was cancelled by the customer, an admin, or the rejection loop. Terminal.
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Pending => "Pending",
            OrderStatusType::Accepted => "Accepted",
            OrderStatusType::InProgress => "InProgress",
            OrderStatusType::Shopping => "Shopping",
            OrderStatusType::ShoppingCompleted => "ShoppingCompleted",
            OrderStatusType::Delivery => "Delivery",
            OrderStatusType::Completed => "Completed",
            OrderStatusType::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Accepted" => Ok(Self::Accepted),
            "InProgress" => Ok(Self::InProgress),
            "Shopping" => Ok(Self::Shopping),
            "ShoppingCompleted" => Ok(Self::ShoppingCompleted),
            "Delivery" => Ok(Self::Delivery),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError("order status", s.to_string())),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

//-------------------------------------- PaymentStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatusType {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl Display for PaymentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatusType::Pending => "Pending",
            PaymentStatusType::Completed => "Completed",
            PaymentStatusType::Failed => "Failed",
            PaymentStatusType::Expired => "Expired",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Expired" => Ok(Self::Expired),
            s => Err(ConversionError("payment status", s.to_string())),
        }
    }
}

//------------------------------------ ShoppingListStatusType --------------------------------------------------------
/// Shopping list status is kept in lock-step with the owning order via [`crate::lifecycle::shopping_list_status_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ShoppingListStatusType {
    /// Priced but unpaid.
    Draft,
    /// Paid and awaiting an agent (or awaiting reassignment).
    Accepted,
    /// An agent is actively working the list.
    Processing,
    Completed,
    Cancelled,
}

impl Display for ShoppingListStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ShoppingListStatusType::Draft => "Draft",
            ShoppingListStatusType::Accepted => "Accepted",
            ShoppingListStatusType::Processing => "Processing",
            ShoppingListStatusType::Completed => "Completed",
            ShoppingListStatusType::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    AgentStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum AgentStatus {
    Available,
    Busy,
    Away,
    Offline,
}

impl Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Available => "Available",
            AgentStatus::Busy => "Busy",
            AgentStatus::Away => "Away",
            AgentStatus::Offline => "Offline",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    LocationType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LocationType {
    /// A declared circular coverage zone with a radius in km.
    ServiceArea,
    /// The agent's live GPS position. At most one active record per agent, overwritten in place.
    CurrentLocation,
}

impl Display for LocationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationType::ServiceArea => write!(f, "ServiceArea"),
            LocationType::CurrentLocation => write!(f, "CurrentLocation"),
        }
    }
}

//--------------------------------------        Actor        ---------------------------------------------------------
/// Who is requesting an order mutation. The lifecycle permission gate keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(i64),
    Agent(i64),
    System,
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer:{id}"),
            Actor::Agent(id) => write!(f, "agent:{id}"),
            Actor::System => write!(f, "system"),
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub customer_id: i64,
    pub agent_id: Option<i64>,
    pub shopping_list_id: i64,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatusType,
    pub payment_id: Option<String>,
    pub total: Kobo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub shopping_started_at: Option<DateTime<Utc>>,
    pub shopping_completed_at: Option<DateTime<Utc>>,
    pub delivery_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub payment_processed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatusType::Completed
    }
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
/// Checkout request: a priced shopping list being converted into an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: i64,
    pub market_id: i64,
    pub total: Kobo,
}

impl NewOrder {
    pub fn new(customer_id: i64, market_id: i64, total: Kobo) -> Self {
        Self { customer_id, market_id, total }
    }
}

//--------------------------------------   RejectedAgent     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RejectedAgent {
    pub order_id: i64,
    pub agent_id: i64,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

//--------------------------------------    ShoppingList     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: i64,
    pub customer_id: i64,
    pub market_id: i64,
    pub agent_id: Option<i64>,
    pub status: ShoppingListStatusType,
    pub total: Kobo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   AgentMetadata     ---------------------------------------------------------
/// Strongly typed agent availability metadata. Only the dispatch engine writes these fields; everything else reads.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub current_status: AgentStatus,
    pub is_accepting_orders: bool,
    pub last_status_update: DateTime<Utc>,
    pub kyc_complete: bool,
    pub nin: Option<String>,
}

//--------------------------------------    AgentProfile     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub is_kyc_verified: bool,
    pub is_deactivated: bool,
    #[sqlx(flatten)]
    pub metadata: AgentMetadata,
}

impl AgentProfile {
    /// Full days since the agent account was created. Used by the tenure scoring term.
    pub fn account_age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}

//--------------------------------------   AgentLocation     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AgentLocation {
    pub id: i64,
    pub agent_id: i64,
    pub location_type: LocationType,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: Option<f64>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl AgentLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

//--------------------------------------       Market        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Market {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Market {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

//--------------------------------------   PaymentRecord     ---------------------------------------------------------
/// A provider-side payment transaction tracked against an order. At most one Pending record exists per
/// (order, provider) pair; re-submissions are idempotent on that pair.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: i64,
    pub provider: String,
    pub provider_tx_id: String,
    pub amount: Kobo,
    pub status: PaymentStatusType,
    pub idempotency_key: Option<String>,
    pub raw_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub order_id: i64,
    pub provider: String,
    pub provider_tx_id: String,
    pub amount: Kobo,
    pub idempotency_key: Option<String>,
}

impl NewPaymentRecord {
    pub fn new(order_id: i64, provider: impl Into<String>, provider_tx_id: impl Into<String>, amount: Kobo) -> Self {
        Self { order_id, provider: provider.into(), provider_tx_id: provider_tx_id.into(), amount, idempotency_key: None }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

//--------------------------------------     TrailEvent      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TrailEvent {
    StatusChanged,
    AgentAssigned,
    AgentRejected,
    PaymentCompleted,
    OrderCancelled,
    Note,
}

impl Display for TrailEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrailEvent::StatusChanged => "status_changed",
            TrailEvent::AgentAssigned => "agent_assigned",
            TrailEvent::AgentRejected => "agent_rejected",
            TrailEvent::PaymentCompleted => "payment_completed",
            TrailEvent::OrderCancelled => "order_cancelled",
            TrailEvent::Note => "note",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------  OrderTrailEntry    ---------------------------------------------------------
/// Append-only audit log row. Never mutated or deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderTrailEntry {
    pub id: i64,
    pub order_id: i64,
    pub event: TrailEvent,
    pub previous_status: Option<OrderStatusType>,
    pub new_status: Option<OrderStatusType>,
    pub actor: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//------------------------------------- ConfirmationSource   ---------------------------------------------------------
/// How a payment confirmation reached the orchestrator. Both paths share the same idempotent entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationSource {
    Webhook,
    ApiSync,
}

impl Display for ConfirmationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationSource::Webhook => write!(f, "webhook"),
            ConfirmationSource::ApiSync => write!(f, "api_sync"),
        }
    }
}
