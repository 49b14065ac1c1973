//! Identity tokens, token storage and API key authentication

use crate::error::{AuthError, IdentityError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// An authenticated principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    username: String,
    roles: Vec<String>,
}

impl Token {
    pub fn new(username: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            username: username.into(),
            roles,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
}

/// Unauthenticated credential wrapping a raw API key.
/// Debug output never shows the key.
pub struct ApiKeyToken {
    key: String,
}

impl ApiKeyToken {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for ApiKeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyToken")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Read access to the current identity
pub trait IdentityProvider: Send + Sync {
    fn token(&self) -> Result<Option<Token>, IdentityError>;
}

/// Holder of the authenticated identity for one request
#[derive(Debug, Default)]
pub struct TokenStorage {
    token: RwLock<Option<Token>>,
}

impl TokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Token) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }

    pub fn set_token(&self, token: Option<Token>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    pub fn clear(&self) {
        self.set_token(None);
    }

    pub fn current(&self) -> Option<Token> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl IdentityProvider for TokenStorage {
    fn token(&self) -> Result<Option<Token>, IdentityError> {
        self.token
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| IdentityError::InvalidArgument("token storage lock poisoned".to_string()))
    }
}

/// Verifies a credential and returns the authenticated identity
pub trait AuthenticationManager: Send + Sync {
    fn authenticate(&self, credential: ApiKeyToken) -> Result<Token, AuthError>;
}

/// A consumer identified by one or more static API keys
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConsumerConfig {
    pub name: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Authenticates API keys against a fixed set of consumers
#[derive(Debug, Clone, Default)]
pub struct StaticKeyAuthenticator {
    consumers: HashMap<String, ConsumerConfig>, // name -> config
    key_to_consumer: HashMap<String, String>,   // api_key -> consumer name
}

impl StaticKeyAuthenticator {
    pub fn new(consumers: Vec<ConsumerConfig>) -> Self {
        let mut key_to_consumer = HashMap::new();
        for consumer in &consumers {
            for key in &consumer.keys {
                key_to_consumer.insert(key.clone(), consumer.name.clone());
            }
        }
        let consumers = consumers
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        Self {
            consumers,
            key_to_consumer,
        }
    }

    pub fn lookup_consumer_by_key(&self, key: &str) -> Option<&ConsumerConfig> {
        self.key_to_consumer
            .get(key)
            .and_then(|name| self.consumers.get(name))
    }
}

impl AuthenticationManager for StaticKeyAuthenticator {
    fn authenticate(&self, credential: ApiKeyToken) -> Result<Token, AuthError> {
        match self.lookup_consumer_by_key(credential.key()) {
            Some(consumer) => Ok(Token::new(consumer.name.clone(), consumer.roles.clone())),
            None => Err(AuthError::AuthenticationFailed(
                "unknown api key".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> StaticKeyAuthenticator {
        StaticKeyAuthenticator::new(vec![
            ConsumerConfig {
                name: "alice".to_string(),
                keys: vec!["valid123".to_string(), "valid456".to_string()],
                roles: vec!["ROLE_API".to_string()],
            },
            ConsumerConfig {
                name: "bob".to_string(),
                keys: vec!["bob-key".to_string()],
                roles: vec![],
            },
        ])
    }

    #[test]
    fn test_static_authenticator_accepts_known_keys() {
        let auth = authenticator();
        let token = auth.authenticate(ApiKeyToken::new("valid456")).unwrap();
        assert_eq!(token.username(), "alice");
        assert_eq!(token.roles(), ["ROLE_API".to_string()]);

        let token = auth.authenticate(ApiKeyToken::new("bob-key")).unwrap();
        assert_eq!(token.username(), "bob");
        assert!(token.roles().is_empty());
    }

    #[test]
    fn test_static_authenticator_rejects_unknown_key() {
        let result = authenticator().authenticate(ApiKeyToken::new("bad"));
        assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_api_key_token_debug_is_redacted() {
        let credential = ApiKeyToken::new("super-secret");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(credential.key(), "super-secret");
    }

    #[test]
    fn test_token_storage_set_and_clear() {
        let storage = TokenStorage::new();
        assert_eq!(storage.token().unwrap(), None);

        storage.set_token(Some(Token::new("alice", vec![])));
        assert_eq!(storage.current().map(|t| t.username().to_string()), Some("alice".to_string()));

        storage.clear();
        assert!(storage.current().is_none());
    }
}
