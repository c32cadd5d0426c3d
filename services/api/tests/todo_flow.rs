//! End-to-end flows through the router over the in-memory store

use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::{
    AppState,
    config::AppConfig,
    create_router,
    models::now_unix,
    repositories::{MemoryStore, Store, StoreError},
};
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use common::mail::{Email, MailError, Mailer};
use regex::Regex;
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
}

impl RecordingMailer {
    /// Code from the most recent verification email sent to `to`
    fn last_code_for(&self, to: &str) -> String {
        let code = Regex::new(r"<b>(\d+)</b>").unwrap();
        let sent = self.sent.lock().unwrap();
        let email = sent
            .iter()
            .rev()
            .find(|email| email.to.iter().any(|r| r == to))
            .expect("no email sent to recipient");
        code.captures(&email.html_body).unwrap()[1].to_string()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
}

fn test_app(verification: bool) -> TestApp {
    let mut config = AppConfig::default();
    config.verification.enabled = verification;
    test_app_with(config)
}

fn test_app_with(config: AppConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState::new(store.clone(), mailer.clone(), config);
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        mailer,
    }
}

fn basic(email: &str, password: &str) -> HeaderValue {
    let encoded = STANDARD.encode(format!("{}:{}", email, password));
    HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap()
}

async fn call(
    app: &TestApp,
    method: &str,
    uri: &str,
    auth: Option<HeaderValue>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        let name = if auth.to_str().unwrap().starts_with("Basic ") {
            header::AUTHORIZATION
        } else {
            header::COOKIE
        };
        builder = builder.header(name, auth);
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

/// `name=value` part of the first Set-Cookie header, ready to be sent back
fn returned_cookie(headers: &HeaderMap) -> HeaderValue {
    let set_cookie = headers
        .get(header::SET_COOKIE)
        .expect("no cookie set")
        .to_str()
        .unwrap();
    let pair = set_cookie.split(';').next().unwrap();
    HeaderValue::from_str(pair).unwrap()
}

/// Registers an account without verification and returns its Basic header
async fn confirmed_user(app: &TestApp, email: &str) -> HeaderValue {
    let (status, _, _) = call(
        app,
        "POST",
        "/api/user/create",
        None,
        Some(json!({"email": email, "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    basic(email, "secret")
}

async fn default_group_id(app: &TestApp, auth: &HeaderValue) -> i64 {
    let (_, _, groups) = call(app, "GET", "/api/group/get", Some(auth.clone()), None).await;
    groups[0]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app(true);
    let (status, _, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_verify_login_and_use_todos() {
    let app = test_app(true);

    let (status, _, body) = call(
        &app,
        "POST",
        "/api/user/create",
        None,
        Some(json!({"email": "a@b.com", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["confirm_email"], true);
    assert!(app.state.deletions.pending_deadline("a@b.com").is_some());

    // not confirmed yet
    let (status, _, _) = call(
        &app,
        "POST",
        "/api/user/login",
        None,
        Some(json!({"email": "a@b.com", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let code = app.mailer.last_code_for("a@b.com");
    assert_eq!(code.len(), 8);

    let wrong = if code == "00000000" { "11111111" } else { "00000000" };
    let (status, _, _) = call(
        &app,
        "POST",
        "/api/user/verify",
        None,
        Some(json!({"email": "a@b.com", "code": wrong})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, headers, body) = call(
        &app,
        "POST",
        "/api/user/verify",
        None,
        Some(json!({"email": "a@b.com", "code": code, "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["confirmed_email"], true);
    assert!(headers.get(header::SET_COOKIE).is_some());
    assert!(app.state.deletions.pending_deadline("a@b.com").is_none());

    let (status, _, _) = call(
        &app,
        "POST",
        "/api/user/login",
        None,
        Some(json!({"email": "a@b.com", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, headers, _) = call(
        &app,
        "POST",
        "/api/user/login",
        None,
        Some(json!({"email": "a@b.com", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cookie = returned_cookie(&headers);

    let (status, _, groups) = call(&app, "GET", "/api/group/get", Some(cookie.clone()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(groups.as_array().unwrap().len(), 1);
    assert_eq!(groups[0]["name"], "Notes");
    assert_eq!(groups[0]["removable"], false);
    let group_id = groups[0]["id"].as_i64().unwrap();

    let (status, _, todo) = call(
        &app,
        "POST",
        "/api/todo/create",
        Some(cookie.clone()),
        Some(json!({"group_id": group_id, "text": "Water the plants"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let todo_id = todo["id"].as_i64().unwrap();

    let (_, _, todos) = call(&app, "GET", "/api/todo/get", Some(cookie.clone()), None).await;
    assert_eq!(todos.as_array().unwrap().len(), 1);
    assert_eq!(todos[0]["text"], "Water the plants");
    assert_eq!(todos[0]["group_id"], group_id);

    let (status, _, done) = call(
        &app,
        "POST",
        &format!("/api/todo/markdone/{}", todo_id),
        Some(cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["is_done"], true);
    assert!(done["completion_unix"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_expired_code_deletes_unconfirmed_account() {
    let mut config = AppConfig::default();
    config.verification.life_seconds = 1;
    let app = test_app_with(config);

    let (status, _, _) = call(
        &app,
        "POST",
        "/api/user/create",
        None,
        Some(json!({"email": "a@b.com", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = app.mailer.last_code_for("a@b.com");

    // push the timer out so only the submitted code can remove the account
    let now = now_unix();
    app.state.deletions.schedule("a@b.com", now + 3600, now);
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(app.store.get_user("a@b.com").await.is_ok());

    let (status, _, body) = call(
        &app,
        "POST",
        "/api/user/verify",
        None,
        Some(json!({"email": "a@b.com", "code": code, "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");
    assert!(matches!(
        app.store.get_user("a@b.com").await,
        Err(StoreError::NotFound)
    ));
    assert!(app.state.deletions.pending_deadline("a@b.com").is_none());
}

#[tokio::test]
async fn test_resend_issues_a_new_code() {
    let app = test_app(true);
    call(
        &app,
        "POST",
        "/api/user/create",
        None,
        Some(json!({"email": "a@b.com", "password": "secret"})),
    )
    .await;

    let (status, _, _) = call(
        &app,
        "POST",
        "/api/user/verify/resend",
        None,
        Some(json!({"email": "a@b.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.mailer.sent.lock().unwrap().len(), 2);

    let latest = app.store.get_latest_verification("a@b.com").await.unwrap();
    assert_eq!(app.mailer.last_code_for("a@b.com"), latest.code);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = test_app(false);
    confirmed_user(&app, "a@b.com").await;

    let (status, _, _) = call(
        &app,
        "POST",
        "/api/user/create",
        None,
        Some(json!({"email": "a@b.com", "password": "other"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_without_verification_sets_cookie() {
    let app = test_app(false);
    let (status, headers, body) = call(
        &app,
        "POST",
        "/api/user/create",
        None,
        Some(json!({"email": "a@b.com", "password": "secret"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["confirm_email"], false);
    assert!(app.mailer.sent.lock().unwrap().is_empty());

    let cookie = returned_cookie(&headers);
    let (status, _, user) = call(&app, "GET", "/api/user/get", Some(cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["email"], "a@b.com");
    assert!(user.get("password_hash").is_none());
}

#[tokio::test]
async fn test_invalid_registration_is_rejected() {
    let app = test_app(false);
    for body in [
        json!({"email": "not-an-email", "password": "secret"}),
        json!({"email": "a@b.com", "password": "1234"}),
    ] {
        let (status, _, error) = call(&app, "POST", "/api/user/create", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error["error"].is_string());
    }
}

#[tokio::test]
async fn test_requests_without_credentials_are_forbidden() {
    let app = test_app(false);
    let (status, _, body) = call(&app, "GET", "/api/todo/get", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Forbidden");

    let (status, _, _) = call(&app, "GET", "/api/todo/get", Some(basic("x@y.com", "nope")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_default_group_cannot_be_deleted() {
    let app = test_app(false);
    let owner = confirmed_user(&app, "a@b.com").await;
    let other = confirmed_user(&app, "c@d.com").await;
    let group_id = default_group_id(&app, &owner).await;

    let uri = format!("/api/group/delete/{}", group_id);
    let (status, _, _) = call(&app, "POST", &uri, Some(owner.clone()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = call(&app, "POST", &uri, Some(other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(app.store.get_todo_group(group_id).await.is_ok());
}

#[tokio::test]
async fn test_group_delete_cascades_to_its_todos() {
    let app = test_app(false);
    let owner = confirmed_user(&app, "a@b.com").await;

    let (status, _, group) = call(
        &app,
        "POST",
        "/api/group/create",
        Some(owner.clone()),
        Some(json!({"name": "Work"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(group["removable"], true);
    let group_id = group["id"].as_i64().unwrap();

    call(
        &app,
        "POST",
        "/api/todo/create",
        Some(owner.clone()),
        Some(json!({"group_id": group_id, "text": "Report"})),
    )
    .await;

    let (status, _, _) = call(
        &app,
        "POST",
        &format!("/api/group/delete/{}", group_id),
        Some(owner.clone()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, _, todos) = call(&app, "GET", "/api/todo/get", Some(owner), None).await;
    assert!(todos.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_resources_are_forbidden() {
    let app = test_app(false);
    let owner = confirmed_user(&app, "a@b.com").await;
    let intruder = confirmed_user(&app, "c@d.com").await;
    let group_id = default_group_id(&app, &owner).await;

    let (_, _, todo) = call(
        &app,
        "POST",
        "/api/todo/create",
        Some(owner.clone()),
        Some(json!({"group_id": group_id, "text": "Private"})),
    )
    .await;
    let todo_id = todo["id"].as_i64().unwrap();

    let (status, _, _) = call(
        &app,
        "POST",
        "/api/todo/create",
        Some(intruder.clone()),
        Some(json!({"group_id": group_id, "text": "Sneaky"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for uri in [
        format!("/api/todo/markdone/{}", todo_id),
        format!("/api/todo/delete/{}", todo_id),
    ] {
        let (status, _, _) = call(&app, "POST", &uri, Some(intruder.clone()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, _, _) = call(
        &app,
        "POST",
        &format!("/api/todo/update/{}", todo_id),
        Some(intruder.clone()),
        Some(json!({"text": "Hijacked"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a record that does not exist looks exactly like a foreign one
    let (status, _, _) = call(&app, "POST", "/api/todo/markdone/9999", Some(intruder.clone()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, _, todos) = call(&app, "GET", "/api/todo/get", Some(intruder), None).await;
    assert!(todos.as_array().unwrap().is_empty());

    let stored = app.store.get_todo(todo_id).await.unwrap();
    assert_eq!(stored.text, "Private");
    assert!(!stored.is_done);
}

#[tokio::test]
async fn test_moving_a_todo_requires_owning_the_target_group() {
    let app = test_app(false);
    let owner = confirmed_user(&app, "a@b.com").await;
    let other = confirmed_user(&app, "c@d.com").await;
    let own_group = default_group_id(&app, &owner).await;
    let foreign_group = default_group_id(&app, &other).await;

    let (_, _, todo) = call(
        &app,
        "POST",
        "/api/todo/create",
        Some(owner.clone()),
        Some(json!({"group_id": own_group, "text": "Stay home"})),
    )
    .await;
    let uri = format!("/api/todo/update/{}", todo["id"].as_i64().unwrap());

    let (status, _, _) = call(
        &app,
        "POST",
        &uri,
        Some(owner.clone()),
        Some(json!({"group_id": foreign_group})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, updated) = call(
        &app,
        "POST",
        &uri,
        Some(owner),
        Some(json!({"text": "Go out", "due_unix": 1_900_000_000, "image": "3q2+7w=="})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["text"], "Go out");
    assert_eq!(updated["due_unix"], 1_900_000_000i64);
    assert_eq!(updated["image"], "3q2+7w==");
    assert_eq!(updated["group_id"], own_group);
}

#[tokio::test]
async fn test_user_delete_cascades() {
    let app = test_app(false);
    let owner = confirmed_user(&app, "a@b.com").await;
    let group_id = default_group_id(&app, &owner).await;
    call(
        &app,
        "POST",
        "/api/todo/create",
        Some(owner.clone()),
        Some(json!({"group_id": group_id, "text": "Soon gone"})),
    )
    .await;

    let (status, _, _) = call(&app, "POST", "/api/user/delete", Some(owner.clone()), None).await;
    assert_eq!(status, StatusCode::OK);

    assert!(app.store.get_all_user_todos("a@b.com").await.unwrap().is_empty());
    assert!(app.store.get_all_user_todo_groups("a@b.com").await.unwrap().is_empty());

    let (status, _, _) = call(&app, "GET", "/api/user/get", Some(owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_settings_update() {
    let app = test_app(false);
    let owner = confirmed_user(&app, "a@b.com").await;

    let (status, _, user) = call(
        &app,
        "POST",
        "/api/user/update",
        Some(owner.clone()),
        Some(json!({"notify_on_todos": true, "password": "newsecret"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["notify_on_todos"], true);

    let (status, _, _) = call(&app, "GET", "/api/user/get", Some(owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = call(&app, "GET", "/api/user/get", Some(basic("a@b.com", "newsecret")), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_repeated_failed_logins_are_throttled() {
    let app = test_app(false);
    confirmed_user(&app, "a@b.com").await;

    let attempt = json!({"email": "a@b.com", "password": "guess"});
    for _ in 0..5 {
        let (status, _, _) = call(&app, "POST", "/api/user/login", None, Some(attempt.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, _, _) = call(&app, "POST", "/api/user/login", None, Some(attempt)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
