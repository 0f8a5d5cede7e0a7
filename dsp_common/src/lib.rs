mod helpers;
mod kobo;

pub mod geo;
pub mod op;

pub use helpers::parse_boolean_flag;
pub use kobo::Kobo;
