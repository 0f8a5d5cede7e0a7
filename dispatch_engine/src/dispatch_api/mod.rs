//! # Dispatch engine public API
//!
//! The `dispatch_api` module exposes the programmatic API for the order fulfillment dispatch engine.
//!
//! * [`order_flow_api`] is the primary API. It orchestrates checkout, payment confirmation, agent scoring and
//!   assignment, the rejection/reassignment loop, and lifecycle transitions, on top of any
//!   [`crate::traits::DispatchDatabase`] backend.
//! * [`dispatch_objects`] holds the composite result types the API returns.
//!
//! An API instance is created by supplying a database backend along with the external collaborators (distance
//! service and chat service):
//!
//! ```rust,ignore
//! use dispatch_engine::{
//!     db_types::{Actor, ConfirmationSource},
//!     DispatchApi,
//!     SqliteDatabase,
//! };
//! let db = SqliteDatabase::new_with_url("sqlite://data/dispatch.db", 25).await?;
//! let api = DispatchApi::new(db, maps_client, chat_client, producers);
//! let confirmation = api
//!     .confirm_payment(order_id, "tx-123", ConfirmationSource::Webhook, &Actor::System)
//!     .await?;
//! ```

pub mod dispatch_objects;
pub mod order_flow_api;

pub use dispatch_objects::{PaymentConfirmation, RejectionResolution};
pub use order_flow_api::DispatchApi;
