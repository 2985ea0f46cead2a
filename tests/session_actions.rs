mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    RecordingNavigator, access_token, both_keys_empty, eventually, native_client, seeded_store,
    signed_in_native,
};
use dealboard_auth::auth::{ActionError, FieldErrors, TokenStore};
use dealboard_auth::push::{RetryPolicy, StaticPushToken};
use dealboard_auth::session::SignInOrigin;
use dealboard_auth::{Platform, Route, SessionClient, SessionEvent};

// ---------------------------------------------------------------------------
// Sign-in / sign-up
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sign_in_returns_field_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/authenticate"))
        .and(body_json(json!({ "email": "a@b.com", "password": "bad" })))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "fieldErrors": { "password": "wrong" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store(None, None).await;
    let client = native_client(&server.uri(), store.clone());

    let errors = client.sign_in_with_email("a@b.com", "bad").await.unwrap_err();

    assert_eq!(
        errors,
        FieldErrors {
            password: Some("wrong".into()),
            ..Default::default()
        }
    );
    assert!(client.state().user.is_none());
    assert!(!client.state().is_loading);
    assert!(both_keys_empty(&store).await);
}

#[tokio::test]
async fn test_sign_in_message_becomes_general_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/authenticate"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })))
        .mount(&server)
        .await;

    let client = native_client(&server.uri(), seeded_store(None, None).await);
    let errors = client.sign_in_with_email("a@b.com", "bad").await.unwrap_err();
    assert_eq!(errors, FieldErrors::general("Invalid credentials"));
    assert!(client.state().last_error.is_none());
}

#[tokio::test]
async fn test_sign_in_network_failure_is_general_error() {
    let client = native_client("http://127.0.0.1:1", seeded_store(None, None).await);

    let errors = client.sign_in_with_email("a@b.com", "pw").await.unwrap_err();

    assert_eq!(errors, FieldErrors::general("An unexpected error occurred"));
    assert!(client.state().last_error.is_some());
    assert!(!client.state().is_loading);
}

#[tokio::test]
async fn test_sign_in_stores_tokens() {
    let server = MockServer::start().await;
    let access = access_token("a@b.com", 3600);
    Mock::given(method("POST"))
        .and(path("/api/auth/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": access,
            "refreshToken": "refresh-1"
        })))
        .mount(&server)
        .await;

    let store = seeded_store(None, None).await;
    let client = native_client(&server.uri(), store.clone());
    let mut events = client.events();

    let user = client.sign_in_with_email("a@b.com", "pw").await.unwrap();

    assert_eq!(user.email, "a@b.com");
    assert_eq!(client.state().user, Some(user));
    assert_eq!(store.access_token().await.as_deref(), Some(access.as_str()));
    assert_eq!(store.refresh_token().await.as_deref(), Some("refresh-1"));
    match events.recv().await.unwrap() {
        SessionEvent::SignedIn { origin, .. } => assert_eq!(origin, SignInOrigin::Credentials),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_sign_up_registers_push_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(body_json(json!({ "name": "Ada", "email": "a@b.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "accessToken": access_token("a@b.com", 3600),
            "refreshToken": "refresh-1"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/register-push-token"))
        .and(body_json(json!({ "token": "ExponentPushToken[abc]" })))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = SessionClient::builder()
        .platform(Platform::Native)
        .base_url(server.uri())
        .push_source(Arc::new(StaticPushToken("ExponentPushToken[abc]".into())))
        .build()
        .unwrap();

    let user = client.sign_up("Ada", "a@b.com", "pw").await.unwrap();
    assert_eq!(user.email, "a@b.com");

    assert!(eventually(|| client.push_metrics().is_some_and(|m| m.successes == 1)).await);
}

#[tokio::test]
async fn test_push_registration_retries_then_gives_up_quietly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": access_token("a@b.com", 3600),
            "refreshToken": "refresh-1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/register-push-token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = SessionClient::builder()
        .base_url(server.uri())
        .push_source(Arc::new(StaticPushToken("t".into())))
        .push_policy(
            RetryPolicy::new()
                .with_max_retries(2)
                .with_initial_backoff(Duration::from_millis(5)),
        )
        .build()
        .unwrap();

    client.sign_in_with_email("a@b.com", "pw").await.unwrap();

    assert!(eventually(|| client.push_metrics().is_some_and(|m| m.failures == 1)).await);
    let metrics = client.push_metrics().unwrap();
    assert_eq!(metrics.attempts, 3);
    assert_eq!(metrics.successes, 0);
    assert_eq!(client.state().user.unwrap().email, "a@b.com");
}

// ---------------------------------------------------------------------------
// Sign-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sign_out_survives_logout_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/verify"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let token = access_token("a@b.com", 3600);
    let store = seeded_store(Some(&token), Some("refresh-1")).await;
    let navigator = Arc::new(RecordingNavigator::default());
    let client = SessionClient::builder()
        .base_url(server.uri())
        .token_store(store.clone())
        .navigator(navigator.clone())
        .build()
        .unwrap();
    client.restore_session().await;
    let mut events = client.events();

    client.sign_out().await;

    assert!(client.state().user.is_none());
    assert!(both_keys_empty(&store).await);
    assert_eq!(navigator.routes(), vec![Route::SignIn]);
    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
}

#[tokio::test]
async fn test_sign_out_offline() {
    let token = access_token("a@b.com", 3600);
    let store = seeded_store(Some(&token), Some("refresh-1")).await;
    let client = native_client("http://127.0.0.1:1", store.clone());
    client.restore_session().await;
    assert!(client.state().user.is_some());

    client.sign_out().await;

    assert!(client.state().user.is_none());
    assert!(both_keys_empty(&store).await);
}

// ---------------------------------------------------------------------------
// Account changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_change_password_field_errors() {
    let server = MockServer::start().await;
    let (client, _) = signed_in_native(&server, "a@b.com").await;
    Mock::given(method("POST"))
        .and(path("/api/auth/change-password"))
        .and(body_json(json!({ "oldPassword": "old", "newPassword": "new" })))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "fieldErrors": { "oldPassword": "Incorrect password" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    match client.change_password("old", "new").await {
        Err(ActionError::Fields(fields)) => {
            assert_eq!(fields.old_password.as_deref(), Some("Incorrect password"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_change_password_success() {
    let server = MockServer::start().await;
    let (client, _) = signed_in_native(&server, "a@b.com").await;
    Mock::given(method("POST"))
        .and(path("/api/auth/change-password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    assert_eq!(client.change_password("old", "new").await, Ok(()));
}

#[tokio::test]
async fn test_change_name_with_new_token_rebuilds_user() {
    let server = MockServer::start().await;
    let (client, _) = signed_in_native(&server, "a@b.com").await;
    let renamed = common::mint(json!({
        "email": "a@b.com",
        "name": "Grace",
        "exp": dealboard_auth::auth::jwt::now_seconds() + 3600
    }));
    Mock::given(method("POST"))
        .and(path("/api/users/change-name"))
        .and(body_json(json!({ "name": "Grace" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": renamed })))
        .mount(&server)
        .await;

    client.change_name("  Grace ").await.unwrap();

    assert_eq!(client.state().user.unwrap().name, "Grace");
    assert_eq!(client.store().access_token().await.as_deref(), Some(renamed.as_str()));
}

#[tokio::test]
async fn test_change_name_without_token_patches_locally() {
    let server = MockServer::start().await;
    let (client, token) = signed_in_native(&server, "a@b.com").await;
    Mock::given(method("POST"))
        .and(path("/api/users/change-name"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    client.change_name("Grace").await.unwrap();

    assert_eq!(client.state().user.unwrap().name, "Grace");
    assert_eq!(client.store().access_token().await.as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn test_change_name_text_error() {
    let server = MockServer::start().await;
    let (client, _) = signed_in_native(&server, "a@b.com").await;
    Mock::given(method("POST"))
        .and(path("/api/users/change-name"))
        .respond_with(ResponseTemplate::new(409).set_body_string("Name already taken"))
        .mount(&server)
        .await;

    assert_eq!(
        client.change_name("Grace").await,
        Err(ActionError::Message("Name already taken".into()))
    );
    assert_eq!(client.state().user.unwrap().name, "Test User");
}

#[tokio::test]
async fn test_complete_onboarding_without_token_flips_flag() {
    let server = MockServer::start().await;
    let (client, token) = signed_in_native(&server, "a@b.com").await;
    Mock::given(method("POST"))
        .and(path("/api/users/complete-onboarding"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    assert_eq!(client.route(), Route::Onboarding);

    client.complete_onboarding().await.unwrap();

    assert!(client.state().user.unwrap().onboarding_completed);
    assert_eq!(client.route(), Route::Home);
    assert_eq!(client.store().access_token().await.as_deref(), Some(token.as_str()));
    assert_eq!(client.store().refresh_token().await.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_complete_onboarding_with_token_persists_it() {
    let server = MockServer::start().await;
    let (client, _) = signed_in_native(&server, "a@b.com").await;
    let onboarded = common::mint(json!({
        "email": "a@b.com",
        "name": "Test User",
        "onboardingCompleted": true,
        "exp": dealboard_auth::auth::jwt::now_seconds() + 3600
    }));
    Mock::given(method("POST"))
        .and(path("/api/users/complete-onboarding"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accessToken": onboarded })))
        .mount(&server)
        .await;

    client.complete_onboarding().await.unwrap();

    assert!(client.state().user.unwrap().onboarding_completed);
    assert_eq!(client.store().access_token().await.as_deref(), Some(onboarded.as_str()));
}

#[tokio::test]
async fn test_account_action_with_dead_session() {
    let server = MockServer::start().await;
    let expired = access_token("a@b.com", -10);
    let store: TokenStore = seeded_store(Some(&expired), None).await;
    let client = native_client(&server.uri(), store);

    assert_eq!(
        client.complete_onboarding().await,
        Err(ActionError::Message(
            "Your session has expired. Please sign in again.".into()
        ))
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}
