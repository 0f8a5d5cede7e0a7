//! Behaviour contracts for the dispatch engine.
//!
//! [`DispatchDatabase`] is the storage backend contract; every multi-entity write it defines executes inside a single
//! database transaction. The remaining traits wrap the external collaborators the engine consumes as black boxes:
//! the mapping/distance service, the payment provider, and the chat service.

mod data_objects;
mod dispatch_database;
mod external_services;

pub use data_objects::{
    AgentCandidate,
    AssignmentOutcome,
    PaymentConfirmOutcome,
    RejectionOutcome,
    StatusConsistencyReport,
};
pub use dispatch_database::{DispatchDatabase, DispatchError, MAX_REJECTIONS};
pub use external_services::{
    ChatService,
    ChatServiceError,
    DistanceService,
    DistanceServiceError,
    PaymentProvider,
    PaymentProviderError,
    ProviderTransaction,
    VirtualAccount,
};
