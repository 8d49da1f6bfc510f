//! Router-level tests using `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{header as header_eq, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use weblead_lib::config::AppConfig;
use weblead_lib::embed::SnippetStore;
use weblead_lib::web;

fn app_with(config: AppConfig) -> Router {
    let store = SnippetStore::open_in_memory().unwrap();
    web::router(weblead_lib::build_state(config, store).unwrap())
}

const ADMIN_KEY: &str = "admin-secret";

fn app(crm_url: &str) -> Router {
    app_with(AppConfig {
        crm_base_url: crm_url.to_string(),
        public_url: "https://forms.example.com".to_string(),
        admin_key: ADMIN_KEY.to_string(),
        ..AppConfig::default()
    })
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_form(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/form")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_KEY))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete_embed(id: &str, admin_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("DELETE")
        .uri(format!("/api/embeds/{}", id));
    if let Some(key) = admin_key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

async fn create_stored_embed(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post_json("/api/embeds", json!({ "token": "tok" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    created["id"].as_str().unwrap().to_string()
}

async fn mount_happy_crm(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contact"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "contact": { "key": "NEW1" } })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn health_check() {
    let response = app("http://127.0.0.1:9").oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("ok"));
}

#[tokio::test]
async fn form_without_token_explains_why() {
    let response = app("http://127.0.0.1:9").oneshot(get("/form")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.contains("API Token is required."));
    assert!(!body.contains("<form"));
}

#[tokio::test]
async fn form_with_token_carries_it() {
    let response = app("http://127.0.0.1:9")
        .oneshot(get("/form?token=tok-1&company_id=77"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#"name="token" value="tok-1""#));
    assert!(body.contains(r#"name="company_id" value="77""#));
}

#[tokio::test]
async fn default_token_never_reaches_the_page() {
    let response = app_with(AppConfig {
        default_token: "SERVER-SECRET".into(),
        ..AppConfig::default()
    })
    .oneshot(get("/form"))
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<form"));
    assert!(!body.contains("SERVER-SECRET"));
    assert!(!body.contains(r#"name="token""#));
}

#[tokio::test]
async fn submission_without_token_uses_default_server_side() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .and(header_eq("Authorization", "Bearer SERVER-SECRET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contact"))
        .and(header_eq("Authorization", "Bearer SERVER-SECRET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "contact": { "key": "NEW1" } })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/history"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let response = app_with(AppConfig {
        crm_base_url: server.uri(),
        default_token: "SERVER-SECRET".into(),
        ..AppConfig::default()
    })
    .oneshot(post_form("first_name=Jane&last_name=Doe&email=jane%40x.com"))
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn invalid_submission_rerenders_with_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_form("token=tok&first_name=Jane&last_name=Doe&email=nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(response).await;
    assert!(body.contains("Invalid email address."));
    assert!(body.contains(r#"value="Jane""#));
}

#[tokio::test]
async fn valid_submission_redirects_to_success() {
    let server = MockServer::start().await;
    mount_happy_crm(&server).await;

    let response = app(&server.uri())
        .oneshot(post_form(
            "token=tok&first_name=Jane&last_name=Doe&email=jane%40x.com&phone=555-123-4567",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert_eq!(location, "/success?first_name=Jane");
}

#[tokio::test]
async fn crm_failure_rerenders_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/contact"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_form("token=tok&first_name=Jane&last_name=Doe&email=jane%40x.com"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_text(response).await.contains("token expired"));
}

#[tokio::test]
async fn success_page_shows_submitted_name() {
    let response = app("http://127.0.0.1:9")
        .oneshot(get("/success?first_name=Jane"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Thanks, Jane."));
}

#[tokio::test]
async fn listing_snippet_requires_company() {
    let app = app("http://127.0.0.1:9");
    let response = app
        .clone()
        .oneshot(get("/snippet?snippet_type=listing&token=tok"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get("/snippet?snippet_type=listing&token=tok&company_id=5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stored_embed_round_trip() {
    let server = MockServer::start().await;
    mount_happy_crm(&server).await;
    let app = app(&server.uri());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/embeds",
            json!({ "token": "stored-tok", "snippet_type": "contact", "theme": "dark" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(
        created["url"],
        format!("https://forms.example.com/embed/{}", id)
    );
    assert!(created["iframe"].as_str().unwrap().contains("<iframe"));
    assert!(!created.to_string().contains("stored-tok"));

    let response = app
        .clone()
        .oneshot(get(&format!("/embed/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains(&format!(r#"name="embed" value="{}""#, id)));
    assert!(page.contains("theme-dark"));
    assert!(!page.contains("stored-tok"));

    let response = app
        .oneshot(post_form(&format!(
            "embed={}&first_name=Jane&last_name=Doe&email=jane%40x.com",
            id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn unknown_embed_is_not_found() {
    let response = app("http://127.0.0.1:9")
        .oneshot(get("/embed/ffffffffffff"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_embed_request_is_rejected() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_json(
            "/api/embeds",
            json!({ "token": "tok", "snippet_type": "listing" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("company id"));
}

#[tokio::test]
async fn deleted_embed_stops_serving() {
    let app = app("http://127.0.0.1:9");
    let id = create_stored_embed(&app).await;

    let response = app.clone().oneshot(delete_embed(&id, Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.clone().oneshot(delete_embed(&id, Some(ADMIN_KEY))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get(&format!("/embed/{}", id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn snippet_link_carries_token_in_url() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_json(
            "/api/snippets",
            json!({ "token": "tok", "snippet_type": "listing", "company_id": "42" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let link: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        link["url"],
        "https://forms.example.com/snippet?snippet_type=listing&token=tok&company_id=42"
    );
    assert!(link["iframe"].as_str().unwrap().contains(r#"height="600""#));
}

#[tokio::test]
async fn embed_id_alone_cannot_delete() {
    let app = app("http://127.0.0.1:9");
    let id = create_stored_embed(&app).await;

    let response = app.clone().oneshot(delete_embed(&id, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.clone().oneshot(delete_embed(&id, Some("guess"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.oneshot(get(&format!("/embed/{}", id))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn embed_management_is_closed_without_admin_key() {
    let response = app_with(AppConfig::default())
        .oneshot(post_json("/api/embeds", json!({ "token": "tok" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn oversized_ttl_is_rejected() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_json(
            "/api/embeds",
            json!({ "token": "t", "snippet_type": "contact", "ttl_days": 4_000_000_000u32 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("ttl_days"));
}
