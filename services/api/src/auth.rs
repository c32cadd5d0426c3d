//! Authorization gate: credential extraction, authentication and ownership checks

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::http::HeaderMap;
use axum_extra::{
    extract::cookie::{Cookie, CookieJar, SameSite},
    headers::{Authorization, HeaderMapExt, authorization::Basic},
};
use tracing::{debug, error, warn};

use crate::{
    error::{ApiError, ApiResult},
    models::{Todo, TodoGroup, User},
    repositories::{Store, StoreError},
};

/// Name of the cookie carrying `identity:password`
pub const AUTH_COOKIE: &str = "auth";

/// Identity and password presented by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: password.into(),
        }
    }

    /// Pull credentials out of a request.
    ///
    /// Basic-Auth wins when both of its parts are non-empty, otherwise the
    /// `auth` cookie is used.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        if let Some(basic) = headers.typed_get::<Authorization<Basic>>() {
            if !basic.username().is_empty() && !basic.password().is_empty() {
                return Some(Self::new(basic.username(), basic.password()));
            }
        }

        let jar = CookieJar::from_headers(headers);
        let cookie = jar.get(AUTH_COOKIE)?;
        Self::from_cookie_value(cookie.value())
    }

    /// Split at the first `:`; the password may itself contain colons
    pub fn from_cookie_value(value: &str) -> Option<Self> {
        let (identity, password) = value.split_once(':')?;
        Some(Self::new(identity, password))
    }

    pub fn cookie_value(&self) -> String {
        format!("{}:{}", self.identity, self.password)
    }
}

/// The authenticated caller, stored in request extensions by the middleware
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn email(&self) -> &str {
        &self.user.email
    }
}

/// Resolve credentials to a user.
///
/// Unknown identities, wrong passwords and (when `require_confirmed`)
/// unconfirmed accounts are all [`ApiError::Unauthenticated`].
pub async fn authenticate(
    store: &dyn Store,
    credentials: &Credentials,
    require_confirmed: bool,
) -> ApiResult<User> {
    let user = match store.get_user(&credentials.identity).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            warn!("Authentication failed: unknown identity {}", credentials.identity);
            return Err(ApiError::Unauthenticated);
        }
        Err(e) => return Err(e.into()),
    };

    if !password_matches(&user.password_hash, &credentials.password) {
        warn!("Authentication failed: wrong password for {}", user.email);
        return Err(ApiError::Unauthenticated);
    }

    if require_confirmed && !user.confirmed_email {
        warn!("Authentication failed: {} has not confirmed their email", user.email);
        return Err(ApiError::Unauthenticated);
    }

    Ok(user)
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            ApiError::InternalServerError
        })
}

pub fn password_matches(password_hash: &str, password: &str) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Failed to parse password hash: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Kinds of records that carry an owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Todo(i64),
    TodoGroup(i64),
}

/// Whether `identity` owns the resource. Any fetch error counts as "not owned".
pub async fn authorize_ownership(store: &dyn Store, identity: &str, resource: Resource) -> bool {
    let owned = match resource {
        Resource::Todo(id) => owned_todo(store, identity, id).await.map(|_| ()),
        Resource::TodoGroup(id) => owned_group(store, identity, id).await.map(|_| ()),
    };

    match owned {
        Ok(()) => true,
        Err(e) => {
            debug!("Ownership of {:?} denied for {}: {}", resource, identity, e);
            false
        }
    }
}

/// Fetch a todo, refusing it unless `identity` owns it
pub async fn owned_todo(store: &dyn Store, identity: &str, id: i64) -> ApiResult<Todo> {
    let todo = store.get_todo(id).await?;
    if todo.owner_email != identity {
        return Err(ApiError::Unauthorized);
    }
    Ok(todo)
}

/// Fetch a group, refusing it unless `identity` owns it
pub async fn owned_group(store: &dyn Store, identity: &str, id: i64) -> ApiResult<TodoGroup> {
    let group = store.get_todo_group(id).await?;
    if group.owner_email != identity {
        return Err(ApiError::Unauthorized);
    }
    Ok(group)
}

pub fn auth_cookie(credentials: &Credentials, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, credentials.cookie_value()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .build()
}

/// Cookie that clears `auth` on the client
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE).path("/").build()
}
