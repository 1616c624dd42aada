// src/lib.rs

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod store;

/// The public prelude for the `nila-social` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::client::OAuth2RestClient;
    pub use crate::config::{ApiConfig, Config, ConfigBuilder, Credentials};
    pub use crate::error::NilaSocialError;
    pub use crate::identity::decode_identity_token;
    pub use crate::model::{
        ApiResponse, Author, AuthorizationInput, AuthorizationRequest, IdentityClaims, PostResult, Profile,
        Token, Visibility,
    };
    pub use crate::store::memory::MemoryStore;
    pub use crate::store::{is_expired, is_expired_at, KeyValueStore, TokenStore};
}
