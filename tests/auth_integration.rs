use std::net::TcpListener;
use std::sync::Arc;

use serde_json::{json, Value};
use tokenkeeper::auth::{AuthService, PasswordHasher};
use tokenkeeper::configuration::{ApplicationSettings, AuthSettings};
use tokenkeeper::startup::run;
use tokenkeeper::store::{CredentialStore, InMemoryCredentialStore, Role, UserRecord};

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryCredentialStore>,
}

impl TestApp {
    /// Put a user straight into the store, bypassing registration rules
    pub async fn seed_user(&self, identity: &str, password: &str, role: Role) {
        let hash = PasswordHasher::new(4).unwrap().hash(password).unwrap();
        self.store
            .insert(&UserRecord::new(identity, role, hash))
            .await
            .expect("Failed to seed user");
    }

    pub async fn post_login(&self, identity: &str, password: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}/auth/login", &self.address))
            .json(&json!({ "identity": identity, "password": password }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_refresh(&self, refresh_token: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}/auth/refresh", &self.address))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_me(&self, access_token: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(&format!("{}/users/me", &self.address))
            .bearer_auth(access_token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Log in and return the parsed token pair
    pub async fn tokens_for(&self, identity: &str, password: &str) -> Value {
        let response = self.post_login(identity, password).await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    pub async fn stored_refresh_token(&self, identity: &str) -> Option<String> {
        self.store
            .find_by_identity(identity)
            .await
            .expect("User missing from store")
            .refresh_token
    }
}

fn test_auth_settings() -> AuthSettings {
    AuthSettings {
        access_token_secret: "integration-access-secret-0123456789abcdef".to_string(),
        access_token_expiry: 900,
        refresh_token_secret: "integration-refresh-secret-0123456789abcdef".to_string(),
        refresh_token_expiry: 604_800,
        issuer: "tokenkeeper-test".to_string(),
        password_hash_cost: 4,
        store_timeout_ms: 1_000,
    }
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let store = Arc::new(InMemoryCredentialStore::new());
    let service = AuthService::new(store.clone(), &test_auth_settings())
        .expect("Failed to build auth service");
    let settings = ApplicationSettings {
        host: "127.0.0.1".to_string(),
        port,
        secure_cookies: false,
    };

    let server = run(listener, service, settings).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp { address, store }
}

fn set_cookies(response: &reqwest::Response) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_owned)
        .collect()
}

fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find_map(|cookie| cookie.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_owned)
}

// --- Registration ---

#[tokio::test]
async fn register_returns_201_without_secrets() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/register", &app.address))
        .json(&json!({ "identity": "alice@example.com", "password": "SecurePass123" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(201, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["identity"], "alice@example.com");
    assert_eq!(body["role"], "User");
    assert!(body.get("password_hash").is_none());
    assert!(body.get("refresh_token").is_none());

    let record = app.store.find_by_identity("alice@example.com").await.unwrap();
    assert_ne!(record.password_hash, "SecurePass123");
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let cases = vec![
        (json!({ "identity": "", "password": "SecurePass123" }), "empty identity"),
        (json!({ "identity": "has space", "password": "SecurePass123" }), "bad identity"),
        (json!({ "identity": "bob", "password": "short" }), "password too short"),
        (json!({ "identity": "bob", "password": "nouppercase123" }), "no uppercase"),
        (json!({ "identity": "bob", "password": "NoDigitsHere" }), "no digits"),
    ];

    for (body, reason) in cases {
        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(), "Should reject: {}", reason);
    }
}

#[tokio::test]
async fn register_returns_409_for_duplicate_identity() {
    let app = spawn_app().await;
    app.seed_user("bob", "SecurePass123", Role::User).await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/register", &app.address))
        .json(&json!({ "identity": "bob", "password": "OtherPass456" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(409, response.status().as_u16());
}

// --- Login ---

#[tokio::test]
async fn login_persists_returned_refresh_token_and_sets_cookies() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;

    let response = app.post_login("u1", "correct-horse").await;
    assert_eq!(200, response.status().as_u16());

    let cookies = set_cookies(&response);
    let body: Value = response.json().await.unwrap();
    let refresh_token = body["refresh_token"].as_str().unwrap();

    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(app.stored_refresh_token("u1").await.as_deref(), Some(refresh_token));

    assert_eq!(
        cookie_value(&cookies, "accessToken").as_deref(),
        body["access_token"].as_str()
    );
    assert_eq!(cookie_value(&cookies, "refreshToken").as_deref(), Some(refresh_token));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
}

#[tokio::test]
async fn wrong_password_and_unknown_identity_are_indistinguishable() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;

    let wrong_password = app.post_login("u1", "wrong").await;
    let unknown = app.post_login("nobody", "correct-horse").await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown.status().as_u16());

    let wrong_password: Value = wrong_password.json().await.unwrap();
    let unknown: Value = unknown.json().await.unwrap();
    assert_eq!(wrong_password["code"], unknown["code"]);
    assert_eq!(wrong_password["message"], unknown["message"]);

    assert!(app.stored_refresh_token("u1").await.is_none());
}

// --- Refresh rotation ---

#[tokio::test]
async fn credential_lifecycle_scenario() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;

    let first = app.tokens_for("u1", "correct-horse").await;
    let access = first["access_token"].as_str().unwrap();
    let refresh = first["refresh_token"].as_str().unwrap();
    assert_eq!(app.stored_refresh_token("u1").await.as_deref(), Some(refresh));

    assert_eq!(401, app.post_login("u1", "wrong").await.status().as_u16());

    let response = app.post_refresh(refresh).await;
    assert_eq!(200, response.status().as_u16());
    let second: Value = response.json().await.unwrap();
    let access2 = second["access_token"].as_str().unwrap();
    let refresh2 = second["refresh_token"].as_str().unwrap();
    assert_ne!(refresh, refresh2);
    assert_eq!(app.stored_refresh_token("u1").await.as_deref(), Some(refresh2));

    // superseded token
    assert_eq!(401, app.post_refresh(refresh).await.status().as_u16());
    assert_eq!(app.stored_refresh_token("u1").await.as_deref(), Some(refresh2));

    let me = app.get_me(access2).await;
    assert_eq!(200, me.status().as_u16());
    let me: Value = me.json().await.unwrap();
    assert_eq!(me["identity"], "u1");
    assert_eq!(me["role"], "User");

    // access tokens are not checked against the store
    assert_eq!(200, app.get_me(access).await.status().as_u16());
}

#[tokio::test]
async fn refresh_accepts_cookie() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;
    let pair = app.tokens_for("u1", "correct-horse").await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/refresh", &app.address))
        .header(
            "Cookie",
            format!("refreshToken={}", pair["refresh_token"].as_str().unwrap()),
        )
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let rotated = cookie_value(&set_cookies(&response), "refreshToken").unwrap();
    assert_eq!(app.stored_refresh_token("u1").await, Some(rotated));
}

#[tokio::test]
async fn refresh_rejects_missing_garbage_and_access_tokens() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;
    let pair = app.tokens_for("u1", "correct-horse").await;

    let missing = reqwest::Client::new()
        .post(&format!("{}/auth/refresh", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, missing.status().as_u16());
    let missing: Value = missing.json().await.unwrap();

    let garbage = app.post_refresh("not-a-token").await;
    assert_eq!(401, garbage.status().as_u16());
    let garbage: Value = garbage.json().await.unwrap();

    assert_eq!(missing["code"], "UNAUTHORIZED");
    assert_eq!(missing["code"], garbage["code"]);
    assert_eq!(missing["message"], garbage["message"]);

    assert_eq!(
        401,
        app.post_refresh(pair["access_token"].as_str().unwrap())
            .await
            .status()
            .as_u16()
    );
}

// --- Gate ---

#[tokio::test]
async fn gated_routes_reject_missing_or_invalid_tokens() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let no_token = client
        .get(&format!("{}/users/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, no_token.status().as_u16());
    let body: Value = no_token.json().await.unwrap();
    assert_eq!(body["code"], "UNAUTHENTICATED");

    assert_eq!(401, app.get_me("garbage.token.value").await.status().as_u16());
}

#[tokio::test]
async fn gate_accepts_access_token_cookie() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;
    let pair = app.tokens_for("u1", "correct-horse").await;

    let response = reqwest::Client::new()
        .get(&format!("{}/users/me", &app.address))
        .header(
            "Cookie",
            format!("accessToken={}", pair["access_token"].as_str().unwrap()),
        )
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
}

// --- Logout ---

#[tokio::test]
async fn logout_invalidates_refresh_token_and_clears_cookies() {
    let app = spawn_app().await;
    app.seed_user("u1", "correct-horse", Role::User).await;
    let pair = app.tokens_for("u1", "correct-horse").await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/logout", &app.address))
        .bearer_auth(pair["access_token"].as_str().unwrap())
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(204, response.status().as_u16());
    let cookies = set_cookies(&response);
    assert_eq!(cookie_value(&cookies, "accessToken").as_deref(), Some(""));
    assert_eq!(cookie_value(&cookies, "refreshToken").as_deref(), Some(""));

    assert!(app.stored_refresh_token("u1").await.is_none());
    assert_eq!(
        401,
        app.post_refresh(pair["refresh_token"].as_str().unwrap())
            .await
            .status()
            .as_u16()
    );
}

#[tokio::test]
async fn logout_requires_access_token() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .post(&format!("{}/auth/logout", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}
