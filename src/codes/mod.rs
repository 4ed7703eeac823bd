//! Access codes: issuance, validation and lifecycle.

pub mod config;
pub mod generator;
pub mod manager;
pub mod model;
pub mod store;

pub use config::AccessConfig;
pub use generator::{generate_code, normalize_code};
pub use manager::{
    AccessCodeManager, AccessGrant, DenyReason, LookupOutcome, LookupRequest, PUBLIC_DENY_REASON,
    PUBLIC_RATE_LIMITED_REASON, ValidationOutcome, ValidationRequest,
};
pub use model::{AccessCode, CodeScope, GenerateOptions, RegenerateOptions};
pub use store::{CodeStore, InMemoryCodeStore, InsertOutcome};
