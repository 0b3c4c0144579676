#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use social_relay_api::{
    app,
    config::AppConfig,
    database::MemoryStore,
    platforms::PlatformClients,
    services::LocalMediaStore,
    state::AppState,
};

/// A request the fake platform server received
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub bearer: Option<String>,
    pub body_len: usize,
}

#[derive(Default)]
struct FakeState {
    base_url: String,
    requests: Mutex<Vec<Recorded>>,
    publish_failures: Mutex<VecDeque<(u16, Value)>>,
    refresh_failures: Mutex<VecDeque<(u16, Value)>>,
    container_statuses: Mutex<VecDeque<&'static str>>,
}

/// Stand-in for the Graph, Instagram and Google endpoints
#[derive(Clone)]
pub struct FakePlatforms {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakePlatforms {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let state = Arc::new(FakeState {
            base_url: base_url.clone(),
            ..FakeState::default()
        });

        let router = Router::new().fallback(fake_handler).with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self { base_url, state })
    }

    /// Answer the next publish call (feed, photos, videos, media, upload) with this error
    pub fn fail_next_publish(&self, status: u16, body: Value) {
        self.state.publish_failures.lock().unwrap().push_back((status, body));
    }

    /// Answer the next token refresh call with this error
    pub fn fail_next_refresh(&self, status: u16, body: Value) {
        self.state.refresh_failures.lock().unwrap().push_back((status, body));
    }

    /// Container status answers, in order; FINISHED once exhausted
    pub fn container_statuses(&self, statuses: &[&'static str]) {
        self.state.container_statuses.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path_suffix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path.ends_with(path_suffix))
            .collect()
    }

    pub fn configure(&self, config: &mut AppConfig) {
        let base = &self.base_url;

        let fb = &mut config.platforms.facebook;
        fb.app_id = "fb-app".into();
        fb.app_secret = "fb-secret".into();
        fb.dialog_url = format!("{base}/fb-dialog");
        fb.graph_url = format!("{base}/fb");

        let ig = &mut config.platforms.instagram;
        ig.app_id = "ig-app".into();
        ig.app_secret = "ig-secret".into();
        ig.authorize_url = format!("{base}/ig-authorize");
        ig.api_url = format!("{base}/ig-api");
        ig.graph_url = format!("{base}/ig");
        ig.poll_interval_ms = 10;
        ig.poll_max_attempts = 3;

        let yt = &mut config.platforms.youtube;
        yt.client_id = "yt-client".into();
        yt.client_secret = "yt-secret".into();
        yt.authorize_url = format!("{base}/google/auth");
        yt.token_url = format!("{base}/google/token");
        yt.api_url = format!("{base}/yt");
        yt.upload_url = format!("{base}/yt-upload");

        config.platforms.request_timeout_secs = 10;
    }
}

fn params_of(uri: &Uri, body: &[u8]) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    params.extend(url::form_urlencoded::parse(body).into_owned());
    params
}

fn error(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn fake_handler(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    let params = params_of(&uri, if is_form { &body } else { &[] });
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        params: params.clone(),
        bearer,
        body_len: body.len(),
    });

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let param = |key: &str| params.get(key).map(String::as_str).unwrap_or_default();
    let publish_failure = || state.publish_failures.lock().unwrap().pop_front();
    let refresh_failure = || state.refresh_failures.lock().unwrap().pop_front();

    match (method.as_str(), segments.as_slice()) {
        // Facebook Graph
        ("GET", ["fb", _, "oauth", "access_token"]) => {
            if param("grant_type") == "fb_exchange_token" {
                if param("fb_exchange_token") != "fb-short-user" {
                    if let Some((status, body)) = refresh_failure() {
                        return error(status, body);
                    }
                }
                Json(json!({ "access_token": "fb-long-user", "token_type": "bearer", "expires_in": 5_184_000 }))
                    .into_response()
            } else {
                Json(json!({ "access_token": "fb-short-user", "token_type": "bearer", "expires_in": 3600 }))
                    .into_response()
            }
        }
        ("GET", ["fb", _, "me", "accounts"]) => Json(json!({
            "data": [{ "id": "page-1", "name": "Relay Page", "access_token": "fb-page-token" }]
        }))
        .into_response(),
        ("GET", ["fb", _, page]) => {
            Json(json!({ "id": page, "access_token": "fb-page-token-refreshed" })).into_response()
        }
        ("POST", ["fb", _, page, edge @ ("feed" | "photos" | "videos")]) => {
            if let Some((status, body)) = publish_failure() {
                return error(status, body);
            }
            match *edge {
                "feed" => Json(json!({ "id": format!("{page}_111") })).into_response(),
                "photos" => Json(json!({ "id": "photo-1", "post_id": format!("{page}_222") })).into_response(),
                _ => Json(json!({ "id": "fb-video-1" })).into_response(),
            }
        }

        // Instagram
        ("POST", ["ig-api", "oauth", "access_token"]) => Json(json!({
            "data": [{
                "access_token": "ig-short",
                "user_id": "17841400000",
                "permissions": "instagram_business_basic,instagram_business_content_publish"
            }]
        }))
        .into_response(),
        ("GET", ["ig", "access_token"]) => {
            Json(json!({ "access_token": "ig-long", "token_type": "bearer", "expires_in": 5_183_944 })).into_response()
        }
        ("GET", ["ig", "refresh_access_token"]) => {
            if let Some((status, body)) = refresh_failure() {
                return error(status, body);
            }
            Json(json!({ "access_token": "ig-long-refreshed", "token_type": "bearer", "expires_in": 5_183_944 }))
                .into_response()
        }
        ("GET", ["ig", _, "me"]) => Json(json!({ "user_id": "17841400000", "username": "relay.gram" })).into_response(),
        ("POST", ["ig", _, _, "media"]) => {
            if let Some((status, body)) = publish_failure() {
                return error(status, body);
            }
            Json(json!({ "id": "container-1" })).into_response()
        }
        ("POST", ["ig", _, _, "media_publish"]) => Json(json!({ "id": "ig-media-1" })).into_response(),
        ("GET", ["ig", _, id]) if param("fields") == "status_code" => {
            let status = state.container_statuses.lock().unwrap().pop_front().unwrap_or("FINISHED");
            Json(json!({ "id": id, "status_code": status })).into_response()
        }
        ("GET", ["ig", _, id]) if param("fields") == "permalink" => {
            Json(json!({ "id": id, "permalink": "https://www.instagram.com/reel/RELAY1/" })).into_response()
        }

        // Google / YouTube
        ("POST", ["google", "token"]) => match param("grant_type") {
            "authorization_code" => Json(json!({
                "access_token": "yt-access",
                "refresh_token": "yt-refresh",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube.readonly",
                "token_type": "Bearer"
            }))
            .into_response(),
            _ => {
                if let Some((status, body)) = refresh_failure() {
                    return error(status, body);
                }
                Json(json!({ "access_token": "yt-access-refreshed", "expires_in": 3599, "token_type": "Bearer" }))
                    .into_response()
            }
        },
        ("GET", ["yt", "channels"]) => Json(json!({
            "items": [{ "id": "UC-relay", "snippet": { "title": "Relay Channel" } }]
        }))
        .into_response(),
        ("POST", ["yt-upload", "videos"]) => {
            if let Some((status, body)) = publish_failure() {
                return error(status, body);
            }
            let location = format!("{}/upload-session/1", state.base_url);
            (StatusCode::OK, [(header::LOCATION, location)]).into_response()
        }
        ("PUT", ["upload-session", _]) => {
            Json(json!({ "id": "yt-video-1", "kind": "youtube#video" })).into_response()
        }

        _ => error(404, json!({ "error": { "message": format!("no fake for {method} {path}"), "code": 803 } })),
    }
}

/// The relay API served on an ephemeral port over a memory store
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub client: Client,
    pub fake: FakePlatforms,
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let fake = FakePlatforms::start().await?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let mut config = AppConfig::development();
        config.scheduler.enabled = false;
        config.scheduler.refresh_retry_delay_ms = 10;
        config.media.root_dir = std::env::temp_dir()
            .join(format!("relay-test-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();
        config.media.public_base_url = base_url.clone();
        config.security.cors_origins = vec!["http://app.test".to_string()];
        fake.configure(&mut config);
        customize(&mut config);

        let media = LocalMediaStore::open(&config.media.root_dir).await?;
        let platforms = PlatformClients::new(&config.platforms)?;
        let state = AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(media), platforms);

        let router = app(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build client")?;

        Ok(Self { base_url, state, client, fake })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn post(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token)
    }

    pub fn patch(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.patch(self.url(path)).bearer_auth(token)
    }

    pub fn delete(&self, token: &str, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(token)
    }

    /// Register a user and return its bearer token
    pub async fn register(&self, email: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({ "email": email, "password": "correct horse battery", "display_name": "Tester" }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == 201, "register failed: {}", res.status());
        let body: Value = res.json().await?;
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .context("register response without token")
    }

    /// Start a connect flow and return the `state` the provider would echo back
    pub async fn begin_connect(&self, token: &str, platform: &str, body: Value) -> Result<String> {
        let res = self.post(token, &format!("/api/connect/{platform}")).json(&body).send().await?;
        anyhow::ensure!(res.status() == 200, "connect failed: {}", res.status());
        let body: Value = res.json().await?;
        body["data"]["state"]
            .as_str()
            .map(str::to_string)
            .context("connect response without state")
    }

    pub async fn callback(&self, platform: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(self.url(&format!("/oauth/{platform}/callback")))
            .query(query)
            .send()
            .await?)
    }

    /// Run the whole connect flow and return the first connected account
    pub async fn connect(&self, token: &str, platform: &str) -> Result<Value> {
        let state = self.begin_connect(token, platform, json!({})).await?;
        let res = self.callback(platform, &[("code", "auth-code"), ("state", &state)]).await?;
        anyhow::ensure!(res.status() == 200, "callback failed: {}", res.status());
        let body: Value = res.json().await?;
        Ok(body["data"]["accounts"][0].clone())
    }

    pub async fn create_post(&self, token: &str, post: Value) -> Result<Value> {
        let res = self.post(token, "/api/posts").json(&post).send().await?;
        anyhow::ensure!(res.status() == 201, "create post failed: {} {}", res.status(), res.text().await?);
        let body: Value = res.json().await?;
        Ok(body["data"].clone())
    }

    pub async fn get_post(&self, token: &str, id: &str) -> Result<Value> {
        let body: Value = self.get(token, &format!("/api/posts/{id}")).send().await?.json().await?;
        Ok(body["data"].clone())
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap_or_default().to_string()
}
