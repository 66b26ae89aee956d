//! release-identity — wire-contract clients and DTOs for the Account
//! and Authorization collaborators (spec.md §6.5). These services are
//! consulted over HTTP only; their internals are out of scope.

pub mod account_client;
pub mod authorization_client;
pub mod credentials;
pub mod token;
pub mod wire;

pub use account_client::{AccountClient, AccountClientError};
pub use authorization_client::{AuthorizationClient, AuthorizationClientError};
pub use credentials::{
    generate_two_fa_key, hash_password, verify_password, verify_two_fa_code, CredentialError,
};
pub use token::{sign, verify, TokenClaims, TokenError};
pub use wire::*;
