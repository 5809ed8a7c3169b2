mod authorizer;
mod claims;
mod jwt;

pub use authorizer::{create_authorizer, StaticEntitlements, StreamAuthorizer};
pub use claims::{Claims, DEFAULT_TENANT_ID};
pub use jwt::JwtValidator;

use thiserror::Error;

/// Handshake-time authentication failures. Any of these terminates the
/// connection before it enters the registry.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication token")]
    CredentialMissing,

    #[error("Authentication token expired")]
    CredentialExpired,

    #[error("Invalid authentication token: {0}")]
    CredentialInvalid(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CredentialMissing => "CREDENTIAL_MISSING",
            Self::CredentialExpired => "CREDENTIAL_EXPIRED",
            Self::CredentialInvalid(_) => "CREDENTIAL_INVALID",
        }
    }
}
