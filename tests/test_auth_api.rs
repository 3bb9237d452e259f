//! Registration, login, refresh-cookie rotation and rate limiting.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use campus_desk::config::RateLimitConfig;
use campus_desk::store::Role;
use common::app;

fn refresh_token_from(cookies: &[String]) -> Option<String> {
    cookies.iter().find_map(|c| {
        let value = c.strip_prefix("refreshToken=")?.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[tokio::test]
async fn test_register_login_me_refresh_logout() {
    let app = app().build();

    let r = app
        .json(
            Method::POST,
            "/api/auth/register",
            None,
            json!({"name": "Ada Lovelace", "email": "Ada@Campus.edu", "password": "secret123"}),
        )
        .await;
    assert_eq!(r.status, StatusCode::CREATED, "{:?}", r.body);
    assert_eq!(r.message(), "Registration successful.");
    assert_eq!(r.data()["user"]["email"], "ada@campus.edu");
    assert_eq!(r.data()["user"]["role"], "student");
    assert!(refresh_token_from(&r.set_cookies()).is_some());
    assert!(r.set_cookies()[0].contains("HttpOnly"));
    let stored = app.db.find_user_by_email("ada@campus.edu").unwrap().unwrap().password_hash.unwrap();
    assert!(stored.starts_with("$argon2id$v=19$"), "{stored}");

    let r = app
        .json(Method::POST, "/api/auth/login", None, json!({"email": "ada@campus.edu", "password": "secret123"}))
        .await;
    assert_eq!(r.status, StatusCode::OK);
    let access = r.data()["accessToken"].as_str().unwrap().to_string();
    let refresh = refresh_token_from(&r.set_cookies()).unwrap();

    let r = app.get("/api/auth/me", Some(&access)).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.data()["user"]["name"], "Ada Lovelace");
    assert!(r.data()["user"].get("passwordHash").is_none());

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/refresh")
        .header(header::COOKIE, format!("refreshToken={refresh}"))
        .body(Body::empty())
        .unwrap();
    let r = app.send(req).await;
    assert_eq!(r.status, StatusCode::OK, "{:?}", r.body);
    assert!(r.data()["accessToken"].is_string());
    assert!(refresh_token_from(&r.set_cookies()).is_some());

    let r = app.json(Method::POST, "/api/auth/logout", None, json!({})).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.message(), "Logged out successfully.");
    assert!(r.set_cookies()[0].contains("Max-Age=0"));
}

#[tokio::test]
async fn test_auth_failures() {
    let app = app().build();
    app.user("Ada", "ada@campus.edu", Role::Student);

    let r = app
        .json(Method::POST, "/api/auth/register", None, json!({"name": "A", "email": "nope", "password": "123"}))
        .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        r.message(),
        "Name must be at least 2 characters, Please enter a valid email, Password must be at least 6 characters"
    );

    let r = app
        .json(
            Method::POST,
            "/api/auth/register",
            None,
            json!({"name": "Ada Again", "email": "ada@campus.edu", "password": "secret123"}),
        )
        .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.message(), "User with this email already exists.");

    let r = app
        .json(Method::POST, "/api/auth/login", None, json!({"email": "ada@campus.edu", "password": "wrong-one"}))
        .await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.message(), "Invalid email or password.");

    let r = app.get("/api/auth/me", None).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.message(), "Access denied. No token provided.");

    let r = app.get("/api/auth/me", Some("not-a-jwt")).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);

    let r = app.json(Method::POST, "/api/auth/refresh", None, json!({})).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    assert_eq!(r.message(), "No refresh token provided.");
    assert!(r.set_cookies().iter().any(|c| c.starts_with("refreshToken=;")));

    let r = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.body["success"], false);
}

#[tokio::test]
async fn test_deleted_user_token_is_rejected() {
    let app = app().build();
    let ada = app.user("Ada", "ada@campus.edu", Role::Student);
    let token = app.token(&ada);
    app.db.delete_user(&ada.id).unwrap();
    let r = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(r.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_is_rate_limited() {
    let app = app()
        .tune(|c| c.auth.auth_limit = RateLimitConfig { max_requests: 2, window_seconds: 60 })
        .build();
    let body = json!({"email": "ghost@campus.edu", "password": "whatever"});
    for _ in 0..2 {
        let r = app.json(Method::POST, "/api/auth/login", None, body.clone()).await;
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
    }
    let r = app.json(Method::POST, "/api/auth/login", None, body).await;
    assert_eq!(r.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(r.message(), "Too many authentication attempts. Please try again later.");
}

fn login_from(forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(json!({"email": "ghost@campus.edu", "password": "whatever"}).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_rotating_forwarded_header_does_not_reset_limit() {
    let app = app()
        .tune(|c| c.auth.auth_limit = RateLimitConfig { max_requests: 2, window_seconds: 60 })
        .build();
    let mut statuses = Vec::new();
    for i in 0..10 {
        statuses.push(app.send(login_from(&format!("10.0.0.{i}"))).await.status);
    }
    assert_eq!(&statuses[..2], &[StatusCode::UNAUTHORIZED; 2]);
    assert!(statuses[2..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS), "{statuses:?}");
}

#[tokio::test]
async fn test_trusted_proxy_keys_on_forwarded_client() {
    let app = app()
        .tune(|c| {
            c.auth.auth_limit = RateLimitConfig { max_requests: 1, window_seconds: 60 };
            c.server.trust_proxy = true;
        })
        .build();
    assert_eq!(app.send(login_from("10.0.0.1")).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.send(login_from("10.0.0.1")).await.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.send(login_from("10.0.0.2")).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_google_sign_in_disabled_without_credentials() {
    let app = app().build();
    assert_eq!(app.get("/api/auth/google", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/api/auth/google/callback?code=x&state=y", None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let app = app().build();
    let r = app.get("/api/nope", None).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    assert_eq!(r.body, json!({"success": false, "message": "Route not found."}));
}
