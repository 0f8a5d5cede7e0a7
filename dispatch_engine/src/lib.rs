//! Order Fulfillment Dispatch Engine
//!
//! The dispatch engine is the matchmaking core of a last-mile shopping marketplace: it takes paid customer orders
//! and places them with the best available shopping agent. This library contains the core logic and is
//! transport-agnostic; HTTP routing, authentication and the raw payment-provider wire protocol live upstream.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly;
//!    use the public API instead. The exception is the data types used in the database, which are defined in the
//!    public [`mod@db_types`] module.
//! 2. The public API ([`DispatchApi`]). This orchestrates checkout, payment confirmation, agent scoring and
//!    assignment, the bounded rejection/reassignment loop, and the order lifecycle. Any backend implementing
//!    [`DispatchDatabase`] can power it.
//!
//! Supporting modules:
//! * [`mod@scoring`] holds the pure weighted scoring and ranking functions.
//! * [`mod@lifecycle`] holds the order state machine: the transition table, the actor permission gate, and the
//!   shopping-list status mapping.
//! * [`mod@sweep`] is the background reconciliation loop that retries stranded assignments and resolves stale
//!   pending payments.
//! * [`mod@events`] provides a simple pub-sub hook system for reacting to dispatch events (payment confirmed,
//!   order assigned, agent rejected, order cancelled) without coupling subscribers to the engine's transactions.

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod lifecycle;
pub mod scoring;
pub mod sweep;
pub mod traits;

mod dispatch_api;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

pub use dispatch_api::{DispatchApi, PaymentConfirmation, RejectionResolution};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{DispatchDatabase, DispatchError};
