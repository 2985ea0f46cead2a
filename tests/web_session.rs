mod common;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::web_client;
use dealboard_auth::auth::{AuthorizationResponse, ExchangeOutcome, FetchOptions, RestoreOutcome};

fn session_user(onboarded: bool) -> serde_json::Value {
    json!({
        "email": "w@b.com",
        "name": "Web User",
        "provider": "GOOGLE",
        "exp": 2_000_000_000,
        "cookieExpiration": 2_000_000_000,
        "onboardingCompleted": onboarded
    })
}

#[tokio::test]
async fn test_restore_from_cookie_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_user(true)))
        .expect(1)
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    let outcome = client.restore_session().await;

    let user = outcome.user().cloned().unwrap();
    assert_eq!(user.email, "w@b.com");
    assert_eq!(user.cookie_expiration, Some(2_000_000_000));
    assert_eq!(client.state().user, Some(user));
}

#[tokio::test]
async fn test_restore_without_cookie_is_signed_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    assert_eq!(client.restore_session().await, RestoreOutcome::NeedsLogin);
    assert!(client.state().user.is_none());
}

#[tokio::test]
async fn test_restore_offline_is_signed_out() {
    let client = web_client("http://127.0.0.1:1");
    assert_eq!(
        client.restore_session().await,
        RestoreOutcome::TransientFailure(None)
    );
    assert!(client.state().user.is_none());
    assert!(!client.state().is_loading);
}

#[tokio::test]
async fn test_sign_in_sets_cookie_for_later_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/authenticate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc123; Path=/; HttpOnly")
                .set_body_json(json!({ "user": session_user(false) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/deals/mine"))
        .and(header("cookie", "session=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [], "last": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    let user = client.sign_in_with_email("w@b.com", "pw").await.unwrap();
    assert_eq!(user.name, "Web User");
    assert!(client.store().access_token().await.is_none());

    let page = client.deals().mine(0, 20).await.unwrap();
    assert!(page.content.is_empty());
    assert!(page.last);
}

#[tokio::test]
async fn test_oauth_exchange_confirms_cookie_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .and(body_string_contains("platform=web"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_user(true)))
        .expect(1)
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    let response = AuthorizationResponse::success("abc", None);

    let outcome = client.handle_authorization_response(&response).await;
    assert!(matches!(outcome, ExchangeOutcome::SignedIn(ref u) if u.email == "w@b.com"));
    assert_eq!(
        client.handle_authorization_response(&response).await,
        ExchangeOutcome::Duplicate
    );
}

#[tokio::test]
async fn test_complete_onboarding_rereads_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": session_user(false) })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/complete-onboarding"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_user(true)))
        .expect(1)
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    client.sign_in_with_email("w@b.com", "pw").await.unwrap();
    assert!(!client.state().user.unwrap().onboarding_completed);

    client.complete_onboarding().await.unwrap();
    assert!(client.state().user.unwrap().onboarding_completed);
}

#[tokio::test]
async fn test_sign_out_posts_logout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_user(true)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    client.restore_session().await;
    assert!(client.state().user.is_some());

    client.sign_out().await;
    assert!(client.state().user.is_none());
}

#[tokio::test]
async fn test_web_fetch_sends_no_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/deals/recommended-store"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Lidl", "dealCount": 1 })))
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    client
        .fetch("/api/deals/recommended-store", FetchOptions::get())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_oauth_exchange_requires_success_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_user(true)))
        .expect(0)
        .mount(&server)
        .await;

    let client = web_client(&server.uri());
    let outcome = client
        .handle_authorization_response(&AuthorizationResponse::success("abc", None))
        .await;

    assert!(matches!(outcome, ExchangeOutcome::Failed(_)));
    assert!(client.state().user.is_none());
}
