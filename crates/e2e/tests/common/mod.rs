//! In-process stand-in for a New Steps deployment.
//!
//! Serves the public pages, the public and admin APIs, cookie sessions, and
//! inventory bookkeeping for requests. `restore_on_reject` toggles the one
//! behavior the status workflow is meant to catch; `refuse_approval` makes
//! the admin API turn down every approval.

#![allow(dead_code)]

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use newsteps_qa_common::HarnessConfig;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

pub const ADMIN_EMAIL: &str = "admin@newsteps.test";
pub const ADMIN_PASSWORD: &str = "admin-pass";

const PAGES: [&str; 10] = [
    "/",
    "/about",
    "/contact",
    "/donate",
    "/donate/shoes",
    "/get-involved",
    "/volunteer",
    "/login",
    "/register",
    "/shoes",
];

#[derive(Debug, Clone)]
pub struct Behavior {
    pub restore_on_reject: bool,
    pub refuse_approval: bool,
    pub database: &'static str,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            restore_on_reject: true,
            refuse_approval: false,
            database: "connected",
        }
    }
}

#[derive(Default)]
struct Store {
    shoes: Vec<(String, i64)>,
    users: HashMap<String, (String, &'static str)>,
    sessions: HashMap<String, &'static str>,
    /// request id -> (shoe id, status)
    requests: Vec<(String, String, String)>,
    donations: Vec<(String, String)>,
    money: Vec<(String, String)>,
    counter: u32,
}

impl Store {
    fn next(&mut self) -> u32 {
        self.counter += 1;
        self.counter
    }

    fn stock_mut(&mut self, shoe: &str) -> Option<&mut i64> {
        self.shoes.iter_mut().find(|(id, _)| id == shoe).map(|(_, n)| n)
    }
}

#[derive(Clone)]
struct AppState {
    behavior: Behavior,
    store: Arc<Mutex<Store>>,
}

impl AppState {
    fn role(&self, headers: &HeaderMap) -> Option<&'static str> {
        let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
        let token = cookies
            .split(';')
            .filter_map(|c| c.trim().strip_prefix("session="))
            .next()?;
        self.store.lock().sessions.get(token).copied()
    }

    fn is_admin(&self, headers: &HeaderMap) -> bool {
        self.role(headers) == Some("admin")
    }
}

/// A running fake; dropped with the test runtime
pub struct FakeNewSteps {
    pub addr: SocketAddr,
    store: Arc<Mutex<Store>>,
}

impl FakeNewSteps {
    pub async fn start() -> Self {
        Self::with_behavior(Behavior::default()).await
    }

    pub async fn with_behavior(behavior: Behavior) -> Self {
        let mut store = Store::default();
        store.shoes = vec![("shoe-1".into(), 3), ("shoe-2".into(), 2)];
        store
            .users
            .insert(ADMIN_EMAIL.into(), (ADMIN_PASSWORD.into(), "admin"));
        let store = Arc::new(Mutex::new(store));
        let state = AppState {
            behavior,
            store: Arc::clone(&store),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake app");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });
        Self { addr, store }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Harness config pointed at this fake, admin credentials included
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.base_url = self.base_url();
        config.admin.email = Some(ADMIN_EMAIL.into());
        config.admin.password = Some(ADMIN_PASSWORD.into());
        config.timeouts.http_secs = 5;
        config.concurrency.tasks = 8;
        config.concurrency.workers = 4;
        config
    }

    pub fn inventory(&self) -> i64 {
        self.store.lock().shoes.iter().map(|(_, n)| n).sum()
    }

    pub fn request_status(&self, id: &str) -> Option<String> {
        self.store
            .lock()
            .requests
            .iter()
            .find(|(rid, _, _)| rid == id)
            .map(|(_, _, status)| status.clone())
    }
}

fn router(state: AppState) -> Router {
    let mut router = Router::new();
    for page in PAGES {
        router = router.route(page, get(move || async move { Html(format!("<h1>New Steps {}</h1>", page)) }));
    }
    router
        .route("/admin", get(admin_page))
        .route("/api/health", get(health))
        .route("/api/shoes", get(shoes))
        .route(
            "/api/settings",
            get(|| async { Json(json!({ "maxShoesPerRequest": 2, "shippingFee": 5 })) }),
        )
        .route("/api/contact", axum::routing::post(contact))
        .route("/api/donations", axum::routing::post(create_donation))
        .route("/api/donations/money", axum::routing::post(create_money_donation))
        .route("/api/volunteers", axum::routing::post(volunteer))
        .route("/api/requests", axum::routing::post(create_request))
        .route("/api/user/profile", get(profile))
        .route("/api/auth/register", axum::routing::post(register))
        .route("/api/auth/test-login", axum::routing::post(test_login))
        .route("/api/admin/requests", get(list_requests).patch(patch_request))
        .route("/api/admin/donations", get(list_donations).patch(patch_donation))
        .route(
            "/api/admin/money-donations",
            get(list_money_donations).patch(patch_money_donation),
        )
        .route("/api/admin/shoes", get(admin_only))
        .route("/api/admin/users", get(admin_only))
        .route("/api/admin/analytics", get(admin_only))
        .route("/api/admin/settings", get(admin_only))
        .with_state(state)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
}

async fn admin_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.is_admin(&headers) {
        Html("<h1>Admin Dashboard</h1>").into_response()
    } else {
        (StatusCode::FOUND, [(header::LOCATION, "/login")]).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "database": state.behavior.database,
        "environment": "test",
    }))
}

async fn shoes(State(state): State<AppState>) -> Json<Value> {
    let store = state.store.lock();
    let list: Vec<Value> = store
        .shoes
        .iter()
        .map(|(id, count)| json!({ "_id": id, "brand": "Nike", "inventoryCount": count }))
        .collect();
    Json(json!({ "shoes": list }))
}

async fn contact(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn create_donation(State(state): State<AppState>, Json(_body): Json<Value>) -> Response {
    let mut store = state.store.lock();
    let id = format!("DS-20261018-{:04}", store.next());
    store.donations.push((id.clone(), "submitted".into()));
    (StatusCode::CREATED, Json(json!({ "success": true, "donationId": id }))).into_response()
}

async fn create_money_donation(State(state): State<AppState>, Json(_body): Json<Value>) -> Response {
    let mut store = state.store.lock();
    let id = format!("DM-20261018-{:04}", store.next());
    store.money.push((id.clone(), "submitted".into()));
    (StatusCode::CREATED, Json(json!({ "success": true, "donationId": id }))).into_response()
}

async fn volunteer(State(state): State<AppState>, Json(_body): Json<Value>) -> Json<Value> {
    let n = state.store.lock().next();
    Json(json!({ "success": true, "volunteerId": format!("VOL-{:08}", n) }))
}

async fn create_request(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if state.role(&headers).is_none() {
        return unauthorized();
    }
    let Some(shoe) = body.pointer("/items/0/shoeId").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "no items" }))).into_response();
    };
    let mut store = state.store.lock();
    let id = format!("REQ-20261018-{:04}", store.next());
    store
        .requests
        .push((id.clone(), shoe.to_string(), "submitted".into()));
    (StatusCode::CREATED, Json(json!({ "success": true, "requestId": id }))).into_response()
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.role(&headers) {
        Some(role) => Json(json!({ "role": role })).into_response(),
        None => unauthorized(),
    }
}

async fn register(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let (Some(email), Some(password)) = (
        body.get("email").and_then(Value::as_str),
        body.get("password").and_then(Value::as_str),
    ) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing fields" }))).into_response();
    };
    state
        .store
        .lock()
        .users
        .insert(email.to_string(), (password.to_string(), "user"));
    (StatusCode::CREATED, Json(json!({ "success": true }))).into_response()
}

async fn test_login(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body.get("password").and_then(Value::as_str).unwrap_or_default();
    let mut store = state.store.lock();
    let role = match store.users.get(email) {
        Some((stored, role)) if stored == password => *role,
        _ => return unauthorized(),
    };
    let token = format!("tok{}", store.next());
    store.sessions.insert(token.clone(), role);
    (
        [(header::SET_COOKIE, format!("session={}; Path=/; HttpOnly", token))],
        Json(json!({ "success": true, "user": { "email": email, "role": role } })),
    )
        .into_response()
}

async fn admin_only(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.is_admin(&headers) {
        Json(json!({ "items": [] })).into_response()
    } else {
        unauthorized()
    }
}

async fn list_requests(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    let store = state.store.lock();
    let list: Vec<Value> = store
        .requests
        .iter()
        .map(|(id, shoe, status)| json!({ "requestId": id, "shoeId": shoe, "status": status }))
        .collect();
    Json(json!({ "requests": list })).into_response()
}

async fn patch_request(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    let id = body.get("requestId").and_then(Value::as_str).unwrap_or_default();
    let Some(to) = body.get("status").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "no status" }))).into_response();
    };
    if to == "approved" && state.behavior.refuse_approval {
        return (StatusCode::CONFLICT, Json(json!({ "error": "approval refused" }))).into_response();
    }
    let restore = state.behavior.restore_on_reject;
    let mut store = state.store.lock();
    let Some(index) = store.requests.iter().position(|(rid, _, _)| rid == id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response();
    };
    let (_, shoe, from) = store.requests[index].clone();
    let delta = match (from.as_str(), to) {
        ("submitted", "approved") => -1,
        ("approved", "rejected") if restore => 1,
        _ => 0,
    };
    if let Some(stock) = store.stock_mut(&shoe) {
        *stock += delta;
    }
    store.requests[index].2 = to.to_string();
    Json(json!({ "success": true, "status": to })).into_response()
}

fn listing(entries: &[(String, String)]) -> Value {
    let list: Vec<Value> = entries
        .iter()
        .map(|(id, status)| json!({ "donationId": id, "status": status }))
        .collect();
    json!({ "donations": list })
}

fn patch_entry(entries: &mut [(String, String)], body: &Value) -> Response {
    let id = body.get("donationId").and_then(Value::as_str).unwrap_or_default();
    let to = body.get("status").and_then(Value::as_str).unwrap_or_default();
    match entries.iter_mut().find(|(eid, _)| eid == id) {
        Some(entry) => {
            entry.1 = to.to_string();
            Json(json!({ "success": true, "status": to })).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response(),
    }
}

async fn list_donations(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    Json(listing(&state.store.lock().donations)).into_response()
}

async fn patch_donation(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    patch_entry(&mut state.store.lock().donations, &body)
}

async fn list_money_donations(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    Json(listing(&state.store.lock().money)).into_response()
}

async fn patch_money_donation(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !state.is_admin(&headers) {
        return unauthorized();
    }
    patch_entry(&mut state.store.lock().money, &body)
}
