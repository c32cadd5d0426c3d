//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    auth::{
        AuthUser, Credentials, Resource, auth_cookie, authenticate, authorize_ownership,
        hash_password, owned_group, owned_todo, password_matches, removal_cookie,
    },
    deletion::delete_if_unconfirmed,
    error::{ApiError, ApiResult},
    middleware::auth_middleware,
    models::{
        CreateGroupRequest, CreateTodoRequest, LoginRequest, NewTodo, NewTodoGroup, NewUser,
        RegisterRequest, RegisterResponse, ResendRequest, UpdateGroupRequest, UpdateTodoRequest,
        UpdateUserRequest, UserResponse, UserSettingsUpdate, VerifyRequest, now_unix,
    },
    state::AppState,
    validation::{
        decode_attachment, validate_due_unix, validate_email, validate_group_name,
        validate_password, validate_todo_text,
    },
    verification::{CodeCheck, verification_email},
};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    // base64 inflates attachments by a third; two of them plus the text
    let body_limit = state.config.limits.max_attachment_bytes.saturating_mul(3) + 64 * 1024;

    let protected_routes = Router::new()
        .route("/api/user/get", get(get_user))
        .route("/api/user/update", post(update_user))
        .route("/api/user/delete", post(delete_user))
        .route("/api/todo/get", get(get_todos))
        .route("/api/todo/create", post(create_todo))
        .route("/api/todo/update/:id", post(update_todo))
        .route("/api/todo/markdone/:id", post(mark_todo_done))
        .route("/api/todo/delete/:id", post(delete_todo))
        .route("/api/group/create", post(create_group))
        .route("/api/group/get", get(get_groups))
        .route("/api/group/update/:id", post(update_group))
        .route("/api/group/delete/:id", post(delete_group))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/user/create", post(create_user))
        .route("/api/user/verify", post(verify_user))
        .route("/api/user/verify/resend", post(resend_verification))
        .route("/api/user/login", post(login))
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "todo-api"
    }))
}

/// Register a new account together with its default group
pub async fn create_user(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_email(&payload.email).map_err(ApiError::BadRequest)?;
    validate_password(&payload.password).map_err(ApiError::BadRequest)?;

    let now = now_unix();
    let verification_enabled = state.verification_enabled();

    let user = state
        .store
        .create_user(&NewUser {
            email: payload.email.clone(),
            password_hash: hash_password(&payload.password)?,
            created_unix: now,
            confirmed_email: !verification_enabled,
        })
        .await?;
    state
        .store
        .create_todo_group(&NewTodoGroup::default_for(&user.email, now))
        .await?;
    info!("Created account {}", user.email);

    if !verification_enabled {
        let credentials = Credentials::new(&user.email, &payload.password);
        let jar = jar.add(auth_cookie(&credentials, state.config.cookie_secure));
        return Ok((
            StatusCode::CREATED,
            jar,
            Json(RegisterResponse {
                confirm_email: false,
            }),
        ));
    }

    send_verification_code(&state, &user.email, now).await?;

    Ok((
        StatusCode::CREATED,
        jar,
        Json(RegisterResponse {
            confirm_email: true,
        }),
    ))
}

/// Issue a code, arm the deletion just past its expiry and mail it out
async fn send_verification_code(state: &AppState, email: &str, now: i64) -> ApiResult<()> {
    let verification = state.verifications.issue_code(email, now).await?;
    if let Some(previous) = state.deletions.pending_deadline(email) {
        debug!("Replacing deletion of {} pending at {}", email, previous);
    }
    state
        .deletions
        .schedule(email, verification.deletion_deadline(), now);

    let message = verification_email(&state.config.verification.sender, &verification);
    state.mailer.send(&message).await?;
    info!("Sent verification code to {}", email);
    Ok(())
}

/// Confirm an email with the code that was mailed to it
pub async fn verify_user(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<VerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    let limiter_key = format!("verify:{}", payload.email);
    if !state.rate_limiter.is_allowed(&limiter_key).await {
        return Err(ApiError::TooManyRequests);
    }

    let user = state.store.get_user(&payload.email).await?;
    if user.confirmed_email {
        return Err(ApiError::Unauthorized);
    }

    let now = now_unix();
    match state
        .verifications
        .check_code(&user.email, &payload.code, now)
        .await?
    {
        CodeCheck::Valid => {}
        CodeCheck::Mismatch => return Err(ApiError::Unauthorized),
        CodeCheck::Expired => {
            state.deletions.cancel(&user.email);
            delete_if_unconfirmed(state.store.as_ref(), &user.email).await;
            return Err(ApiError::Unauthorized);
        }
    }

    state.store.set_email_confirmed(&user.email).await?;
    state.deletions.cancel(&user.email);
    state.rate_limiter.reset(&limiter_key).await;
    info!("{} was successfully verified", user.email);

    // only the hash is stored, so the cookie needs the password once more
    let jar = match payload.password.as_deref() {
        Some(password) if password_matches(&user.password_hash, password) => {
            let credentials = Credentials::new(&user.email, password);
            jar.add(auth_cookie(&credentials, state.config.cookie_secure))
        }
        _ => jar,
    };

    let confirmed = state.store.get_user(&user.email).await?;
    Ok((jar, Json(UserResponse::from(&confirmed))))
}

/// Mail a fresh code to an account that is still unconfirmed
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.verification_enabled() {
        return Err(ApiError::BadRequest(
            "Email verification is disabled".to_string(),
        ));
    }

    let limiter_key = format!("resend:{}", payload.email);
    if !state.rate_limiter.is_allowed(&limiter_key).await {
        return Err(ApiError::TooManyRequests);
    }

    let user = state.store.get_user(&payload.email).await?;
    if user.confirmed_email {
        return Err(ApiError::Unauthorized);
    }

    send_verification_code(&state, &user.email, now_unix()).await?;

    Ok(Json(json!({"message": "Verification code sent"})))
}

/// Check credentials and hand out the `auth` cookie
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let limiter_key = format!("login:{}", payload.email);
    if !state.rate_limiter.is_allowed(&limiter_key).await {
        return Err(ApiError::TooManyRequests);
    }

    let credentials = Credentials::new(payload.email, payload.password);
    let user = authenticate(
        state.store.as_ref(),
        &credentials,
        state.verification_enabled(),
    )
    .await?;
    state.rate_limiter.reset(&limiter_key).await;
    info!("{} logged in", user.email);

    let jar = jar.add(auth_cookie(&credentials, state.config.cookie_secure));
    Ok((jar, Json(UserResponse::from(&user))))
}

/// Current user, without the password hash
pub async fn get_user(Extension(auth): Extension<AuthUser>) -> impl IntoResponse {
    Json(UserResponse::from(&auth.user))
}

/// Change the password and/or the notification preference
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut update = UserSettingsUpdate {
        password_hash: None,
        notify_on_todos: payload.notify_on_todos,
    };

    if let Some(password) = &payload.password {
        validate_password(password).map_err(ApiError::BadRequest)?;
        update.password_hash = Some(hash_password(password)?);
    }

    state
        .store
        .update_user_settings(auth.email(), &update)
        .await?;
    info!("Updated settings of {}", auth.email());

    // keep the session alive under the new password
    let jar = match &payload.password {
        Some(password) => {
            let credentials = Credentials::new(auth.email(), password);
            jar.add(auth_cookie(&credentials, state.config.cookie_secure))
        }
        None => jar,
    };

    let user = state.store.get_user(auth.email()).await?;
    Ok((jar, Json(UserResponse::from(&user))))
}

/// Remove the account and everything it owns
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_user_cascade(auth.email()).await?;
    state.deletions.cancel(auth.email());
    info!("Deleted account {}", auth.email());

    Ok((
        jar.remove(removal_cookie()),
        Json(json!({"message": "Account deleted successfully"})),
    ))
}

pub async fn get_todos(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let todos = state.store.get_all_user_todos(auth.email()).await?;
    Ok(Json(todos))
}

/// Create a todo inside one of the caller's groups
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateTodoRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.group_id == 0 {
        return Err(ApiError::BadRequest("group_id is required".to_string()));
    }
    let text = validate_todo_text(&payload.text).map_err(ApiError::BadRequest)?;
    validate_due_unix(payload.due_unix).map_err(ApiError::BadRequest)?;

    let max_bytes = state.config.limits.max_attachment_bytes;
    let image = decode_optional("image", payload.image.as_deref(), max_bytes)?;
    let file = decode_optional("file", payload.file.as_deref(), max_bytes)?;

    let group = owned_group(state.store.as_ref(), auth.email(), payload.group_id).await?;

    let todo = state
        .store
        .create_todo(&NewTodo {
            group_id: group.id,
            text,
            created_unix: now_unix(),
            due_unix: payload.due_unix,
            owner_email: auth.email().to_string(),
            image,
            file,
        })
        .await?;
    info!("{} created todo {} in group {}", auth.email(), todo.id, group.id);

    Ok((StatusCode::CREATED, Json(todo)))
}

fn decode_optional(field: &str, encoded: Option<&str>, max_bytes: usize) -> ApiResult<Option<Vec<u8>>> {
    match encoded {
        Some(encoded) => decode_attachment(field, encoded, max_bytes).map_err(ApiError::BadRequest),
        None => Ok(None),
    }
}

/// Partial update; moving a todo requires owning the target group
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTodoRequest>,
) -> ApiResult<impl IntoResponse> {
    let todo = owned_todo(state.store.as_ref(), auth.email(), id).await?;
    let mut update = todo.to_update();
    let max_bytes = state.config.limits.max_attachment_bytes;

    if let Some(text) = &payload.text {
        update.text = validate_todo_text(text).map_err(ApiError::BadRequest)?;
    }
    if let Some(due_unix) = payload.due_unix {
        validate_due_unix(due_unix).map_err(ApiError::BadRequest)?;
        update.due_unix = due_unix;
    }
    if let Some(group_id) = payload.group_id {
        if group_id != todo.group_id {
            let group = owned_group(state.store.as_ref(), auth.email(), group_id).await?;
            update.group_id = group.id;
        }
    }
    match payload.is_done {
        Some(true) if !todo.is_done => update.mark_done(now_unix()),
        Some(false) if todo.is_done => update.mark_undone(),
        _ => {}
    }
    if let Some(image) = &payload.image {
        update.image = decode_attachment("image", image, max_bytes).map_err(ApiError::BadRequest)?;
    }
    if let Some(file) = &payload.file {
        update.file = decode_attachment("file", file, max_bytes).map_err(ApiError::BadRequest)?;
    }

    state.store.update_todo(id, &update).await?;
    info!("{} updated todo {}", auth.email(), id);

    let updated = state.store.get_todo(id).await?;
    Ok(Json(updated))
}

pub async fn mark_todo_done(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let todo = owned_todo(state.store.as_ref(), auth.email(), id).await?;
    let mut update = todo.to_update();
    update.mark_done(now_unix());

    state.store.update_todo(id, &update).await?;
    info!("{} marked todo {} as done", auth.email(), id);

    let updated = state.store.get_todo(id).await?;
    Ok(Json(updated))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if !authorize_ownership(state.store.as_ref(), auth.email(), Resource::Todo(id)).await {
        return Err(ApiError::Unauthorized);
    }

    state.store.delete_todo(id).await?;
    info!("{} deleted todo {}", auth.email(), id);

    Ok(Json(json!({"message": "Todo deleted successfully"})))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = validate_group_name(&payload.name).map_err(ApiError::BadRequest)?;

    let group = state
        .store
        .create_todo_group(&NewTodoGroup::removable(name, auth.email(), now_unix()))
        .await?;
    info!("{} created group {}", auth.email(), group.id);

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_groups(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.store.get_all_user_todo_groups(auth.email()).await?;
    Ok(Json(groups))
}

pub async fn update_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let group = owned_group(state.store.as_ref(), auth.email(), id).await?;
    let name = validate_group_name(&payload.name).map_err(ApiError::BadRequest)?;

    state.store.rename_todo_group(group.id, &name).await?;
    info!("{} renamed group {}", auth.email(), group.id);

    let renamed = state.store.get_todo_group(group.id).await?;
    Ok(Json(renamed))
}

/// Delete a group and its todos; the default group stays
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let group = owned_group(state.store.as_ref(), auth.email(), id).await?;
    if !group.removable {
        return Err(ApiError::BadRequest("Group is not removable".to_string()));
    }

    let todos = state.store.get_group_todos(group.id).await?;
    state.store.delete_todo_group_cascade(group.id).await?;
    info!(
        "{} deleted group {} and its {} todos",
        auth.email(),
        group.id,
        todos.len()
    );

    Ok(Json(json!({"message": "Group deleted successfully"})))
}
