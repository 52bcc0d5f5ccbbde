//! Two-step login and credential verification.
//!
//! `init_login` checks a password and hands out a short-lived intermediary
//! token bound to a one-time code. `verify_login` trades that token plus the
//! code for a long-lived session token. Only session tokens pass the
//! authentication gate.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::repos::{RepoError, UsersRepo};

pub const SESSION_COOKIE: &str = "morpho_session";

const ISSUER: &str = "morpho";
const CODE_SPACE: u32 = 1_000_000;

/// Hash checked for unknown usernames so both rejection paths pay the argon2 cost.
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("morpho-decoy-password").ok());

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication is not configured")]
    Unavailable,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("invalid or expired one-time code")]
    InvalidCode,
    #[error("invalid token")]
    InvalidToken,
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("code delivery failed: {0}")]
    Delivery(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Identity attached to requests that passed the authentication gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub username: String,
}

/// Checks an opaque credential presented by a client.
///
/// `Ok(None)` means the credential is well-formed but not acceptable; callers
/// treat errors the same way.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Option<AuthenticatedIdentity>, AuthError>;
}

/// Verifier used when no signing secret is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl CredentialVerifier for DenyAll {
    fn verify(&self, _credential: &str) -> Result<Option<AuthenticatedIdentity>, AuthError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Intermediary,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: TokenKind,
    jti: String,
    iss: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

impl IssuedToken {
    pub fn max_age_secs(&self) -> i64 {
        (self.expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }
}

/// HS256 signer for intermediary and session tokens.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    intermediary_ttl: Duration,
    session_ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], intermediary_ttl: Duration, session_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            intermediary_ttl,
            session_ttl,
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<IssuedToken, AuthError> {
        self.issue_at(
            subject,
            kind,
            Uuid::new_v4().to_string(),
            OffsetDateTime::now_utc(),
        )
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Intermediary => self.intermediary_ttl,
            TokenKind::Session => self.session_ttl,
        }
    }

    fn issue_at(
        &self,
        subject: &str,
        kind: TokenKind,
        jti: String,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, AuthError> {
        let expires_at = now + self.ttl(kind);
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            jti,
            iss: ISSUER.to_string(),
            iat: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::Signing)?;
        Ok(IssuedToken { token, expires_at })
    }

    fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            debug!(target: "morpho::auth", error = %err, "token rejected");
            AuthError::InvalidToken
        })?;

        if data.claims.kind != expected {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

impl CredentialVerifier for TokenSigner {
    fn verify(&self, credential: &str) -> Result<Option<AuthenticatedIdentity>, AuthError> {
        match self.decode(credential, TokenKind::Session) {
            Ok(claims) => Ok(Some(AuthenticatedIdentity {
                username: claims.sub,
            })),
            Err(AuthError::InvalidToken) => Ok(None),
            Err(other) => Err(other),
        }
    }
}

/// Channel that hands a one-time code to the user it belongs to.
#[async_trait]
pub trait CodeDelivery: Send + Sync {
    async fn deliver(&self, username: &str, code: &str) -> Result<(), AuthError>;
}

/// Writes codes to the log stream; intended for single-operator deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCodeDelivery;

#[async_trait]
impl CodeDelivery for LogCodeDelivery {
    async fn deliver(&self, username: &str, code: &str) -> Result<(), AuthError> {
        info!(
            target: "morpho::auth::code",
            username, code, "one-time login code issued"
        );
        Ok(())
    }
}

struct PendingCode {
    username: String,
    digest: Vec<u8>,
    expires_at: OffsetDateTime,
}

pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    signer: Option<TokenSigner>,
    delivery: Arc<dyn CodeDelivery>,
    pending: DashMap<String, PendingCode>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        signer: Option<TokenSigner>,
        delivery: Arc<dyn CodeDelivery>,
    ) -> Self {
        Self {
            users,
            signer,
            delivery,
            pending: DashMap::new(),
        }
    }

    /// Verifier for the authentication gate; denies everything without a signer.
    pub fn verifier(&self) -> Arc<dyn CredentialVerifier> {
        match &self.signer {
            Some(signer) => Arc::new(signer.clone()),
            None => Arc::new(DenyAll),
        }
    }

    pub async fn init_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IssuedToken, AuthError> {
        let signer = self.signer.as_ref().ok_or(AuthError::Unavailable)?;
        let now = OffsetDateTime::now_utc();
        self.pending.retain(|_, pending| pending.expires_at > now);

        let Some(stored) = self.users.password_hash(username).await? else {
            verify_decoy(password.to_string()).await;
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(stored, password.to_string()).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let jti = Uuid::new_v4().to_string();
        let issued = signer.issue_at(username, TokenKind::Intermediary, jti.clone(), now)?;
        let code = generate_code();

        self.pending.insert(
            jti.clone(),
            PendingCode {
                username: username.to_string(),
                digest: code_digest(&code),
                expires_at: issued.expires_at,
            },
        );

        if let Err(err) = self.delivery.deliver(username, &code).await {
            self.pending.remove(&jti);
            return Err(err);
        }

        Ok(issued)
    }

    pub async fn verify_login(&self, token: &str, code: &str) -> Result<IssuedToken, AuthError> {
        let signer = self.signer.as_ref().ok_or(AuthError::Unavailable)?;
        let claims = signer.decode(token, TokenKind::Intermediary)?;

        // Codes are single use: consumed before comparison.
        let (_, pending) = self
            .pending
            .remove(&claims.jti)
            .ok_or(AuthError::InvalidCode)?;

        if pending.username != claims.sub || pending.expires_at <= OffsetDateTime::now_utc() {
            return Err(AuthError::InvalidCode);
        }

        let candidate = code_digest(code.trim());
        if !bool::from(pending.digest.as_slice().ct_eq(candidate.as_slice())) {
            return Err(AuthError::InvalidCode);
        }

        signer.issue(&claims.sub, TokenKind::Session)
    }

    pub fn pending_codes(&self) -> usize {
        self.pending.len()
    }
}

/// Produce an argon2id PHC string for storage in the users table.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hashing(err.to_string()))
}

async fn verify_password(stored: String, password: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored).map_err(|err| AuthError::Hashing(err.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

async fn verify_decoy(password: String) {
    let _ = tokio::task::spawn_blocking(move || {
        let decoy = DECOY_HASH.as_deref();
        if let Some(parsed) = decoy.and_then(|hash| PasswordHash::new(hash).ok()) {
            // Outcome is irrelevant; only the work matters.
            let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
        }
    })
    .await;
}

fn generate_code() -> String {
    let value = rand::thread_rng().gen_range(0..CODE_SPACE);
    format!("{value:06}")
}

fn code_digest(code: &str) -> Vec<u8> {
    Sha256::digest(code.as_bytes()).to_vec()
}
