//! Authentication: configuration, token minting and verification, password
//! handling, Rocket request guards, and the `/auth` routes.

use std::sync::Arc;

pub mod catchers;
pub mod claims;
pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod rate_limit;
pub mod responses;
pub mod routes;
pub mod store;

pub use claims::{Audience, IdentityClaims, Token, TokenClaims, TokenType};
pub use config::{AuthConfig, SecretSource, SigningSecret};
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, OptionalUser, RateLimit, RequireAdmin, require_admin};
pub use jwt::{TokenService, VerifyError};
pub use passwords::PasswordService;
pub use rate_limit::RateLimiter;
pub use store::{MemoryUserStore, PgUserStore, UserStore};

/// Everything the guards and routes need, managed once by Rocket.
#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub token_service: Arc<TokenService>,
    pub password_service: Arc<PasswordService>,
    pub users: Arc<dyn UserStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AuthState {
    pub fn new(config: AuthConfig, users: Arc<dyn UserStore>) -> AuthResult<Self> {
        let token_service = TokenService::from_config(&config)?;
        let password_service = PasswordService::new()?;
        let rate_limiter = RateLimiter::new(config.rate_limit_capacity);

        Ok(Self {
            config,
            token_service: Arc::new(token_service),
            password_service: Arc::new(password_service),
            users,
            rate_limiter: Arc::new(rate_limiter),
        })
    }
}
