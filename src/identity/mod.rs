//! Diacritic-insensitive, token-tolerant comparison of a submitted identity
//! (last name, first name, birth date) against stored profiles.

pub mod input;
pub mod matcher;
pub mod normalize;

pub use input::{IdentityInput, ValidatedIdentity};
pub use matcher::{IdentityMatchResult, MatchVerdict, match_any, match_identity, names_match};
pub use normalize::{normalize_birth_date, normalize_name};
