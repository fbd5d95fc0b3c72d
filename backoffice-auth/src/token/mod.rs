//! Token inspection and persistence

pub mod claims;
pub mod store;

pub use claims::{access_expiry, decode_claims, require_claims, TokenClaims};
pub use store::{
    FileStorage, KeyValueStorage, MemoryStorage, TokenStore, AUTH_TOKEN_KEY, AUTH_USER_KEY,
    REFRESH_TOKEN_KEY,
};
