use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{ApiError, LogInternal},
    models::Profile,
    repository::{Repository, RepositoryState},
};

/// Claims
///
/// The subset of a Supabase access token this service reads. Supabase signs these
/// with the project JWT secret (HS256) and the `authenticated` audience.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the auth.users id, also the key of `user_profiles`.
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
    pub exp: usize,
    pub iat: usize,
}

/// Profile data the user supplied at sign-up. Supabase carries it in both the token
/// and the `/auth/v1/user` response; unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
}

impl UserMetadata {
    fn into_full_name(self) -> Option<String> {
        self.full_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}

/// How an identity was established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentitySource {
    /// A session token checked by the identity provider.
    #[default]
    Session,
    /// The `x-user-id` development header, matched against an existing profile.
    LocalBypass,
}

/// Identity
///
/// The caller as resolved by the session provider. Read-only to this service.
/// Bypass identities never carry an email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub source: IdentitySource,
}

impl Identity {
    pub fn from_session(id: Uuid, email: Option<String>, metadata: Option<UserMetadata>) -> Self {
        Self {
            id,
            email: email.unwrap_or_default(),
            full_name: metadata.and_then(UserMetadata::into_full_name),
            source: IdentitySource::Session,
        }
    }

    pub fn is_bypass(&self) -> bool {
        self.source == IdentitySource::LocalBypass
    }
}

/// IdentityProvider
///
/// Turns an opaque session token into the identity it belongs to, or `None` if the
/// token does not represent a live session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_identity(&self, token: &str) -> Option<Identity>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

/// JwtIdentityProvider
///
/// Verifies Supabase access tokens locally. Signature, expiry and audience are all
/// checked; no network round trip.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

pub const SUPABASE_AUDIENCE: &str = "authenticated";

impl JwtIdentityProvider {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn current_identity(&self, token: &str) -> Option<Identity> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(Identity::from_session(
                data.claims.sub,
                data.claims.email,
                data.claims.user_metadata,
            )),
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("rejected expired session token"),
                    other => tracing::debug!(reason = ?other, "rejected session token"),
                }
                None
            }
        }
    }
}

/// SupabaseUser
///
/// Minimal shape of the `GET /auth/v1/user` response.
#[derive(Deserialize)]
struct SupabaseUser {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

/// SupabaseIdentityProvider
///
/// Asks the Supabase auth server who owns the token. Slower than local verification
/// but honours server-side revocation.
pub struct SupabaseIdentityProvider {
    client: reqwest::Client,
    user_url: String,
    anon_key: String,
}

impl SupabaseIdentityProvider {
    /// Every call to the auth server is bounded by `timeout`; an expired call counts
    /// as an unauthenticated request.
    pub fn new(project_url: &str, anon_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            user_url: format!("{}/auth/v1/user", project_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    async fn current_identity(&self, token: &str) -> Option<Identity> {
        let response = match self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!("supabase auth server timed out");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "supabase auth server unreachable");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        let user = response.json::<SupabaseUser>().await.ok()?;
        Some(Identity::from_session(user.id, user.email, user.user_metadata))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// Local development user id from `x-user-id`. Nothing else is read from headers.
fn local_bypass_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

/// authenticate
///
/// Resolves the caller from request headers. In `Env::Local` an `x-user-id` naming an
/// existing profile is accepted first; an unknown id falls through to the bearer
/// token. Everywhere else only a bearer token is accepted.
pub async fn authenticate(
    headers: &HeaderMap,
    provider: &dyn IdentityProvider,
    repo: &dyn Repository,
    config: &AppConfig,
) -> Result<Identity, ApiError> {
    if config.env == Env::Local {
        if let Some(user_id) = local_bypass_id(headers) {
            let profile = repo
                .get_profile(user_id)
                .await
                .or_internal("Failed to verify identity")?;
            match profile {
                Some(profile) => {
                    return Ok(Identity {
                        id: profile.user_id,
                        email: String::new(),
                        full_name: profile.full_name,
                        source: IdentitySource::LocalBypass,
                    });
                }
                None => tracing::debug!(%user_id, "bypass id has no profile"),
            }
        }
    }

    let token = bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    provider
        .current_identity(token)
        .await
        .ok_or(ApiError::Unauthenticated)
}

/// Role
///
/// Privileges that can be required of an identity. Each maps onto a flag of the
/// caller's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
}

impl Role {
    pub fn granted_by(self, profile: &Profile) -> bool {
        match self {
            Role::Admin => profile.is_admin,
        }
    }

    fn denial(self) -> &'static str {
        match self {
            Role::Admin => "Admin access required",
        }
    }
}

/// authorize
///
/// Single-record profile lookup keyed by the identity. A missing profile is a plain
/// denial, not an error.
pub async fn authorize(
    repo: &dyn Repository,
    identity: &Identity,
    role: Role,
) -> Result<(), ApiError> {
    let profile = repo
        .get_profile(identity.id)
        .await
        .or_internal("Failed to verify permissions")?;

    match profile {
        Some(profile) if role.granted_by(&profile) => Ok(()),
        _ => {
            tracing::info!(user_id = %identity.id, ?role, "authorization denied");
            Err(ApiError::Forbidden(role.denial()))
        }
    }
}

/// AuthUser
///
/// Extractor for any signed-in caller. Rejects with 401 before the handler body runs.
/// If `auth_middleware` already resolved the identity it is reused from the request
/// extensions.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    AppConfig: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser(identity.clone()));
        }

        let provider = IdentityState::from_ref(state);
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let identity =
            authenticate(&parts.headers, provider.as_ref(), repo.as_ref(), &config).await?;

        parts.extensions.insert(identity.clone());
        Ok(AuthUser(identity))
    }
}

/// AdminUser
///
/// Extractor for admin-only handlers: authenticate, then require `Role::Admin`.
/// 401 and 403 are both returned before any handler query executes.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Identity);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
    AppConfig: FromRef<S>,
    RepositoryState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        let repo = RepositoryState::from_ref(state);
        authorize(repo.as_ref(), &identity, Role::Admin).await?;
        Ok(AdminUser(identity))
    }
}
