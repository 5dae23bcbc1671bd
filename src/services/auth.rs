//! Local authentication service
//!
//! Usernames double as user ids. Passwords are stored as argon2 hashes and
//! sessions are stateless HS256 tokens whose subject is the user id.

use crate::common::{AuthConfig, Error, Result};
use crate::services::AuthService;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Token id
    pub jti: String,
}

pub struct LocalAuth {
    /// user id → argon2 password hash
    users: RwLock<HashMap<String, String>>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    argon2: Argon2<'static>,
    token_ttl: Duration,
}

impl LocalAuth {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            users: RwLock::new(HashMap::new()),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            argon2: Argon2::default(),
            token_ttl: Duration::from_secs(config.token_ttl_secs),
        }
    }

    fn issue_token(&self, user_id: &str) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + self.token_ttl.as_secs(),
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("token encoding failed: {}", e)))
    }

    fn check_credentials(username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(Error::InvalidInput(
                "username and password are required".into(),
            ));
        }
        Ok(())
    }
}

impl Default for LocalAuth {
    fn default() -> Self {
        Self::new(&AuthConfig::default())
    }
}

#[async_trait]
impl AuthService for LocalAuth {
    async fn verify(&self, token: &str) -> Result<Option<String>> {
        let claims = match decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                return Ok(None);
            }
        };
        if self.users.read().await.contains_key(&claims.sub) {
            Ok(Some(claims.sub))
        } else {
            Ok(None)
        }
    }

    async fn register(&self, username: &str, password: &str) -> Result<String> {
        Self::check_credentials(username, password)?;

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("password hashing failed: {}", e)))?
            .to_string();

        {
            let mut users = self.users.write().await;
            if users.contains_key(username) {
                return Err(Error::DuplicateRegistration(username.to_string()));
            }
            users.insert(username.to_string(), password_hash);
        }

        tracing::info!("Registered user {}", username);
        self.issue_token(username)
    }

    async fn login(&self, username: &str, password: &str) -> Result<Option<String>> {
        let stored = match self.users.read().await.get(username) {
            Some(hash) => hash.clone(),
            None => return Ok(None),
        };
        let parsed = PasswordHash::new(&stored)
            .map_err(|e| Error::Internal(format!("stored hash unreadable: {}", e)))?;
        if self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            tracing::debug!("Failed login for {}", username);
            return Ok(None);
        }
        Ok(Some(self.issue_token(username)?))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
