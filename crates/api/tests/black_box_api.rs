use chrono::{Duration as ChronoDuration, Utc};
use facet_api::config::ApiConfig;
use facet_auth::{JwtClaims, PrincipalId, Role};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        Self::spawn_with(ApiConfig::new(jwt_secret)).await
    }

    async fn spawn_with(config: ApiConfig) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = facet_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn tee() -> Value {
    json!({ "key": "tee", "label": "T-Shirt", "price": 10, "description": "x" })
}

async fn create(client: &reqwest::Client, base_url: &str, token: &str, body: &Value) -> Value {
    let res = client
        .post(format!("{}/products", base_url))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;

    let client = reqwest::Client::new();
    for path in ["/whoami", "/products"] {
        let res = client
            .get(format!("{}{}", srv.base_url, path))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = client
        .get(format!("{}/products", srv.base_url))
        .bearer_auth(mint_jwt("other-secret", vec![Role::new("admin")]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("viewer")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "viewer"));
    assert_eq!(body["permissions"], json!(["product.find", "product.findone"]));
}

#[tokio::test]
async fn product_lifecycle_create_read_update_remove() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("catalog_manager")]);
    let client = reqwest::Client::new();

    // Create
    let created = create(&client, &srv.base_url, &token, &tee()).await;
    assert_eq!(created["product_type"], "simple");
    assert_eq!(created["stock"], 0);
    let id = created["_id"].as_str().unwrap().to_string();

    // Read by id
    let res = client
        .get(format!("{}/products/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched["key"], "tee");

    // Update
    let res = client
        .put(format!("{}/products/{}", srv.base_url, id))
        .bearer_auth(&token)
        .json(&json!({ "$inc": { "stock": 4 }, "label": "Tee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let updated: Value = res.json().await.unwrap();
    assert_eq!(updated, json!({ "matched": 1, "modified": 1 }));

    let res = client
        .get(format!("{}/products?key=tee&fields=label%20stock", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed, json!([{ "_id": id, "label": "Tee", "stock": 4 }]));

    // Remove (soft) then the product is gone from reads
    let res = client
        .delete(format!("{}/products/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/products/{}", srv.base_url, id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "No products matched your criteria.");

    let res = client
        .get(format!("{}/products?include_deleted=true", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let listed: Value = res.json().await.unwrap();
    assert!(listed[0]["date_deleted"].is_string());
}

#[tokio::test]
async fn invalid_records_are_reported_verbatim() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&token)
        .json(&json!({ "key": "tee", "label": "T", "price": "abc", "description": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Error creating product(s): Cast to Number failed for value \"abc\" at path `price`"
    );

    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&token)
        .json(&json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["message"], "No data supplied for creating new product.");
}

#[tokio::test]
async fn viewers_cannot_write() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("viewer")]);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/products", srv.base_url))
        .bearer_auth(&token)
        .json(&tee())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "You do not have the privileges to perform this operation."
    );
}

#[tokio::test]
async fn missing_products_are_not_found() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("viewer")]);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/products?key=missing", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn products_mount_under_the_configured_route() {
    let jwt_secret = "test-secret";
    let mut config = ApiConfig::new(jwt_secret);
    config.products_route = "/catalog".to_string();
    let srv = TestServer::spawn_with(config).await;
    let token = mint_jwt(jwt_secret, vec![Role::new("admin")]);

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/catalog", srv.base_url))
        .bearer_auth(&token)
        .json(&tee())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .get(format!("{}/products", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
