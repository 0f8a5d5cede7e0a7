//! Helpers for integration tests: environment/database preparation, data seeding, and in-memory stand-ins for the
//! external services.

pub mod doubles;
pub mod prepare_env;
pub mod seeds;
