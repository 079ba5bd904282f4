//! Token claims and the tagged token variants produced by verification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire claims. Every token kind shares this shape; which fields are present
/// depends on how it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject user id. Older tokens may carry it as `userId`.
    #[serde(alias = "userId")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(rename = "isAdmin", default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(value) => value == audience,
            Audience::Many(values) => values.iter().any(|value| value == audience),
        }
    }
}

impl From<String> for Audience {
    fn from(audience: String) -> Self {
        Audience::Single(audience)
    }
}

/// Identity data a caller asks to embed in a new token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_admin: Option<bool>,
}

impl IdentityClaims {
    pub fn subject(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }
}

impl From<&User> for IdentityClaims {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: Some(user.email.clone()),
            role: Some(user.role.clone()),
            is_admin: user.is_admin.then_some(true),
        }
    }
}

/// A token whose signature and constraints have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Access(TokenClaims),
    Refresh(TokenClaims),
    /// No `type` discriminator; verified without issuer/audience constraints.
    Legacy(TokenClaims),
}

impl Token {
    pub fn claims(&self) -> &TokenClaims {
        match self {
            Token::Access(claims) | Token::Refresh(claims) | Token::Legacy(claims) => claims,
        }
    }

    pub fn into_claims(self) -> TokenClaims {
        match self {
            Token::Access(claims) | Token::Refresh(claims) | Token::Legacy(claims) => claims,
        }
    }

    pub fn subject(&self) -> &str {
        &self.claims().sub
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Token::Access(_) => "access",
            Token::Refresh(_) => "refresh",
            Token::Legacy(_) => "legacy",
        }
    }
}
