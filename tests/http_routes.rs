use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use futures::{StreamExt, stream, stream::BoxStream};
use http_body_util::BodyExt;
use tower::ServiceExt;

use morpho::application::auth::{AuthError, AuthService, CodeDelivery, TokenSigner, hash_password};
use morpho::application::catalog::CatalogService;
use morpho::application::repos::{
    CatalogRepo, ProjectRow, ProjectSelection, RepoError, SolutionAssetRow, SolutionSelection,
    UsersRepo,
};
use morpho::cache::{CacheConfig, PathCache};
use morpho::domain::assets::AssetUrlResolver;
use morpho::infra::http::{HttpState, build_router};

const SECRET: &[u8] = b"integration-secret-with-enough-entropy";

#[derive(Default)]
struct FakeCatalog {
    projects: Vec<ProjectRow>,
    solutions: Vec<(String, SolutionAssetRow)>,
    fail: bool,
    stall: bool,
    project_fetches: AtomicUsize,
    solution_fetches: AtomicUsize,
}

impl FakeCatalog {
    fn seeded() -> Self {
        Self {
            projects: vec![
                project_row("bridge", false),
                project_row("tower", false),
                project_row("retired", true),
            ],
            solutions: vec![
                ("bridge".to_string(), asset_row("1", "a", "x.png")),
                ("bridge".to_string(), asset_row("1", "b", "y.png")),
                ("bridge".to_string(), asset_row("2", "a", "z.png")),
                ("tower".to_string(), asset_row("9", "a", "t.png")),
            ],
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::seeded()
        }
    }

    fn failure<'a, T: Send + 'a>() -> BoxStream<'a, Result<T, RepoError>> {
        stream::iter(vec![Err(RepoError::from_persistence("connection refused"))]).boxed()
    }
}

#[async_trait]
impl CatalogRepo for FakeCatalog {
    fn project_rows<'a>(
        &'a self,
        selection: &'a ProjectSelection,
    ) -> BoxStream<'a, Result<ProjectRow, RepoError>> {
        self.project_fetches.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            return stream::pending().boxed();
        }
        if self.fail {
            return Self::failure();
        }
        let rows: Vec<_> = self
            .projects
            .iter()
            .filter(|row| !row.deleted)
            .filter(|row| match selection {
                ProjectSelection::All => true,
                ProjectSelection::Named(name) => &row.project_name == name,
            })
            .cloned()
            .map(Ok)
            .collect();
        stream::iter(rows).boxed()
    }

    fn solution_rows<'a>(
        &'a self,
        selection: &'a SolutionSelection,
    ) -> BoxStream<'a, Result<SolutionAssetRow, RepoError>> {
        self.solution_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Self::failure();
        }
        let rows: Vec<_> = self
            .solutions
            .iter()
            .filter(|(project, row)| match selection {
                SolutionSelection::All => true,
                SolutionSelection::Project(name) => project == name,
                SolutionSelection::One { project: name, solution } => {
                    project == name && &row.solution_id == solution
                }
            })
            .map(|(_, row)| Ok(row.clone()))
            .collect();
        stream::iter(rows).boxed()
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        if self.fail {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }
}

struct FakeUsers(HashMap<String, String>);

#[async_trait]
impl UsersRepo for FakeUsers {
    async fn password_hash(&self, username: &str) -> Result<Option<String>, RepoError> {
        Ok(self.0.get(username).cloned())
    }
}

#[derive(Default)]
struct Outbox(Mutex<Vec<String>>);

#[async_trait]
impl CodeDelivery for Outbox {
    async fn deliver(&self, _username: &str, code: &str) -> Result<(), AuthError> {
        self.0.lock().expect("outbox lock").push(code.to_string());
        Ok(())
    }
}

fn project_row(name: &str, deleted: bool) -> ProjectRow {
    ProjectRow {
        creation_date: "2023-04-01 10:00:00".to_string(),
        project_name: name.to_string(),
        variable_metadata: Some(r#"{"span":{"min":1,"max":20}}"#.to_string()),
        output_metadata: Some(r#"["weight"]"#.to_string()),
        assets: None,
        deleted,
        captions: Some(r#"{"a":"front"}"#.to_string()),
        slug: format!("{name}-slug"),
        markdown: "# Title".to_string(),
        human_name: name.to_uppercase(),
    }
}

fn asset_row(solution: &str, tag: &str, file: &str) -> SolutionAssetRow {
    SolutionAssetRow {
        solution_id: solution.to_string(),
        scoped_id: format!("s-{solution}"),
        parameters: Some(r#"{"span":12}"#.to_string()),
        output_parameters: Some("[1,2]".to_string()),
        tag: tag.to_string(),
        file: file.to_string(),
    }
}

struct Harness {
    app: Router,
    catalog: Arc<FakeCatalog>,
    cache: Arc<PathCache>,
    outbox: Arc<Outbox>,
}

fn harness(catalog: FakeCatalog, signer: Option<TokenSigner>) -> Harness {
    harness_with_deadline(catalog, signer, Duration::from_secs(5))
}

fn harness_with_deadline(
    catalog: FakeCatalog,
    signer: Option<TokenSigner>,
    query_timeout: Duration,
) -> Harness {
    let catalog = Arc::new(catalog);
    let cache = Arc::new(PathCache::new(&CacheConfig::default()));
    let outbox = Arc::new(Outbox::default());

    let service = CatalogService::new(
        catalog.clone(),
        AssetUrlResolver::new("https://s3.example/", "bkt"),
        query_timeout,
    );
    let users = FakeUsers(HashMap::from([(
        "ada".to_string(),
        hash_password("correct horse").expect("hash"),
    )]));
    let auth = AuthService::new(Arc::new(users), signer, outbox.clone());

    let state = HttpState::new(Arc::new(service), Arc::new(auth), Some(cache.clone()));
    Harness {
        app: build_router(state),
        catalog,
        cache,
        outbox,
    }
}

fn signer() -> TokenSigner {
    TokenSigner::new(SECRET, Duration::from_secs(300), Duration::from_secs(3600))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn body_bytes(response: Response) -> bytes::Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

#[tokio::test]
async fn project_listing_is_served_from_cache_on_repeat() {
    let h = harness(FakeCatalog::seeded(), None);

    let first = send(&h.app, get("/project/")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let first_body = body_bytes(first).await;

    let second = send(&h.app, get("/project/")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_bytes(second).await, first_body);

    assert_eq!(h.catalog.project_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.cache.stats().hits, 1);

    let json: serde_json::Value = serde_json::from_slice(&first_body).expect("json");
    let names: Vec<_> = json
        .as_array()
        .expect("array")
        .iter()
        .map(|p| p["project_name"].as_str().expect("name").to_string())
        .collect();
    assert_eq!(names, vec!["bridge", "tower"]);
    assert_eq!(json[0]["metadata"]["description"]["slug"], "bridge-slug");
    assert_eq!(json[0]["variable_metadata"]["span"]["max"], 20);
    assert!(json[0]["assets"].is_null());
}

#[tokio::test]
async fn single_project_route_returns_array_of_one() {
    let h = harness(FakeCatalog::seeded(), None);

    let response = send(&h.app, get("/project/tower/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().map(Vec::len), Some(1));
    assert_eq!(json[0]["project_name"], "tower");

    let missing = send(&h.app, get("/project/nowhere/")).await;
    assert_eq!(missing.status(), StatusCode::OK);
    assert_eq!(body_json(missing).await, serde_json::json!([]));
}

#[tokio::test]
async fn solutions_are_grouped_with_resolved_asset_urls() {
    let h = harness(FakeCatalog::seeded(), None);

    let response = send(&h.app, get("/project/bridge/model/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(
        json,
        serde_json::json!([
            {
                "id": "1",
                "scoped_id": "s-1",
                "parameters": {"span": 12},
                "output_parameters": [1, 2],
                "files": [
                    {"tag": "a", "file": "https://s3.example/bkt/media/x.png"},
                    {"tag": "b", "file": "https://s3.example/bkt/media/y.png"}
                ]
            },
            {
                "id": "2",
                "scoped_id": "s-2",
                "parameters": {"span": 12},
                "output_parameters": [1, 2],
                "files": [
                    {"tag": "a", "file": "https://s3.example/bkt/media/z.png"}
                ]
            }
        ])
    );
}

#[tokio::test]
async fn solution_route_narrows_to_one_solution() {
    let h = harness(FakeCatalog::seeded(), None);

    let response = send(&h.app, get("/project/bridge/model/2/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    assert_eq!(json.as_array().map(Vec::len), Some(1));
    assert_eq!(json[0]["id"], "2");
    assert!(h.cache.get("/project/bridge/model/2/").is_some());
}

#[tokio::test]
async fn store_failure_yields_generic_500_and_caches_nothing() {
    let h = harness(FakeCatalog::failing(), None);

    for uri in ["/project/", "/project/bridge/model/"] {
        let response = send(&h.app, get(uri)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "message": "Internal Server Error" })
        );
    }
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn stalled_query_hits_deadline_and_caches_nothing() {
    let h = harness_with_deadline(FakeCatalog::stalled(), None, Duration::from_millis(50));

    let response = send(&h.app, get("/project/")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "Internal Server Error" })
    );
    assert_eq!(h.catalog.project_fetches.load(Ordering::SeqCst), 1);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn disallowed_method_never_reaches_cache_or_store() {
    let h = harness(FakeCatalog::seeded(), None);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/project/")
        .body(Body::empty())
        .expect("request should build");
    let response = send(&h.app, request).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response
            .headers()
            .get(header::ALLOW)
            .and_then(|v| v.to_str().ok()),
        Some("GET")
    );
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "Method DELETE not allowed." })
    );
    assert_eq!(h.cache.stats().lookups, 0);
    assert_eq!(h.catalog.project_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_routes_reject_get() {
    let h = harness(FakeCatalog::seeded(), Some(signer()));

    let response = send(&h.app, get("/auth/init/")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response
            .headers()
            .get(header::ALLOW)
            .and_then(|v| v.to_str().ok()),
        Some("POST")
    );
}

#[tokio::test]
async fn unknown_path_returns_json_404() {
    let h = harness(FakeCatalog::seeded(), None);

    let response = send(&h.app, get("/nothing/here")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "Not found." })
    );
}

#[tokio::test]
async fn protected_route_denies_everyone_without_signing_secret() {
    let h = harness(FakeCatalog::seeded(), None);
    h.cache.put("/project/", bytes::Bytes::from_static(b"[]"));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/cache/purge/")
        .header(header::AUTHORIZATION, "Bearer forged.token.value")
        .body(Body::empty())
        .expect("request should build");
    let response = send(&h.app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "Not authenticated." })
    );
    assert_eq!(h.cache.len(), 1);

    let login = send(
        &h.app,
        post_json(
            "/auth/init/",
            serde_json::json!({"username": "ada", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(login.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn login_round_trip_unlocks_cache_purge() {
    let h = harness(FakeCatalog::seeded(), Some(signer()));

    let warm = send(&h.app, get("/project/bridge/")).await;
    assert_eq!(warm.status(), StatusCode::OK);
    let warm = send(&h.app, get("/project/tower/")).await;
    assert_eq!(warm.status(), StatusCode::OK);
    assert_eq!(h.cache.len(), 2);

    let init = send(
        &h.app,
        post_json(
            "/auth/init/",
            serde_json::json!({"username": "ada", "password": "correct horse"}),
        ),
    )
    .await;
    assert_eq!(init.status(), StatusCode::OK);
    let intermediary = body_json(init).await["token"]
        .as_str()
        .expect("token")
        .to_string();
    let code = h.outbox.0.lock().expect("outbox lock")[0].clone();

    let verify = send(
        &h.app,
        post_json(
            "/auth/verify/",
            serde_json::json!({"token": intermediary, "code": code}),
        ),
    )
    .await;
    assert_eq!(verify.status(), StatusCode::OK);
    let cookie = verify
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie")
        .to_string();
    assert!(cookie.starts_with("morpho_session="));
    assert!(cookie.contains("HttpOnly"));
    let session = body_json(verify).await["token"]
        .as_str()
        .expect("token")
        .to_string();

    let purge = Request::builder()
        .method(Method::POST)
        .uri("/admin/cache/purge/")
        .header(header::AUTHORIZATION, format!("Bearer {session}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"prefix": "/project/bridge/"}"#))
        .expect("request should build");
    let response = send(&h.app, purge).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "removed": 1 }));

    let cookie_pair = cookie.split(';').next().expect("cookie pair").to_string();
    let purge_all = Request::builder()
        .method(Method::POST)
        .uri("/admin/cache/purge/")
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .expect("request should build");
    let response = send(&h.app, purge_all).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "removed": 1 }));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn intermediary_token_does_not_pass_the_gate() {
    let h = harness(FakeCatalog::seeded(), Some(signer()));

    let init = send(
        &h.app,
        post_json(
            "/auth/init/",
            serde_json::json!({"username": "ada", "password": "correct horse"}),
        ),
    )
    .await;
    let intermediary = body_json(init).await["token"]
        .as_str()
        .expect("token")
        .to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/cache/purge/")
        .header(header::AUTHORIZATION, format!("Bearer {intermediary}"))
        .body(Body::empty())
        .expect("request should build");
    let response = send(&h.app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_login_body_is_a_json_400() {
    let h = harness(FakeCatalog::seeded(), Some(signer()));

    let response = send(
        &h.app,
        post_json("/auth/init/", serde_json::json!({"username": "ada"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "Invalid request body." })
    );
}

#[tokio::test]
async fn health_reports_store_availability() {
    let healthy = harness(FakeCatalog::seeded(), None);
    let response = send(&healthy.app, get("/_health/db")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let failing = harness(FakeCatalog::failing(), None);
    let response = send(&failing.app, get("/_health/db")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
