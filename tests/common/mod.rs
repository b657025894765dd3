//! In-process registry used by the integration tests
//!
//! Serves `/v2/`, a `/token` endpoint and the manifest, blob and tag routes of
//! the registry API from memory, and records what the client asked for.

#![allow(dead_code)]

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use docker_image_puller::registry::token_manager::decode_claims;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;

pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `/v2/` answers 200 and nothing needs a token
    Anonymous,
    /// `/v2/` answers 401 with a bearer challenge
    Bearer,
    /// `/v2/` answers 401 with only a basic challenge
    BasicOnly,
    /// `/v2/` answers 503
    Unavailable,
}

pub struct MockState {
    pub auth: AuthMode,
    pub realm: String,
    pub token_status: StatusCode,
    /// Repositories the token endpoint answers 403 for
    pub denied_repositories: Vec<String>,
    /// Seconds added to now for the `exp` claim; negative issues expired tokens
    pub token_lifetime: i64,
    pub credentials: Option<(String, String)>,
    pub manifests: HashMap<(String, String), (String, Vec<u8>)>,
    pub blobs: HashMap<(String, String), Vec<u8>>,
    pub probes: usize,
    pub token_scopes: Vec<String>,
    pub requests: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            auth: AuthMode::Bearer,
            realm: String::new(),
            token_status: StatusCode::OK,
            denied_repositories: Vec::new(),
            token_lifetime: 300,
            credentials: None,
            manifests: HashMap::new(),
            blobs: HashMap::new(),
            probes: 0,
            token_scopes: Vec::new(),
            requests: Vec::new(),
        }
    }
}

/// Digests of an image stored in the mock
#[derive(Debug, Clone)]
pub struct ImageFixture {
    pub config_digest: String,
    pub layer_digests: Vec<String>,
    pub manifest_digest: String,
}

impl ImageFixture {
    pub fn config_file(&self) -> String {
        format!("{}.json", hex(&self.config_digest))
    }

    pub fn layer_files(&self) -> Vec<String> {
        self.layer_digests
            .iter()
            .map(|d| format!("{}.tar", hex(d)))
            .collect()
    }
}

pub fn hex(digest: &str) -> &str {
    digest.split_once(':').map(|(_, h)| h).unwrap_or(digest)
}

/// A fake but well-formed sha256 digest
pub fn digest(seed: u8) -> String {
    format!("sha256:{}", format!("{:02x}", seed).repeat(32))
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub fn jwt(exp: i64, repository: &str) -> String {
    let payload = json!({
        "iss": "mock-registry",
        "exp": exp,
        "access": [{ "type": "repository", "name": repository, "actions": ["pull"] }]
    });
    format!(
        "{}.{}.unsigned",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

pub struct MockRegistry {
    pub addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
}

impl MockRegistry {
    pub async fn start(auth: AuthMode) -> Self {
        Self::start_with(MockState {
            auth,
            ..MockState::default()
        })
        .await
    }

    pub async fn start_with(mut state: MockState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        state.realm = format!("http://{}/token", addr);

        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Registry domain as it appears in an image reference
    pub fn domain(&self) -> String {
        self.addr.to_string()
    }

    pub fn reference(&self, repository: &str, tag: &str) -> String {
        format!("{}/{}:{}", self.domain(), repository, tag)
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn probes(&self) -> usize {
        self.with_state(|s| s.probes)
    }

    pub fn token_scopes(&self) -> Vec<String> {
        self.with_state(|s| s.token_scopes.clone())
    }

    pub fn request_count(&self) -> usize {
        self.with_state(|s| s.requests.len())
    }

    pub fn requests(&self) -> Vec<String> {
        self.with_state(|s| s.requests.clone())
    }

    /// Store an image whose blobs are derived from `seed`
    pub fn add_image(&self, repository: &str, tag: &str, seed: u8, layers: &[&[u8]]) -> ImageFixture {
        let config_digest = digest(seed);
        let config = json!({ "architecture": "amd64", "os": "linux", "seed": seed }).to_string();
        let layer_digests: Vec<String> = (0..layers.len())
            .map(|i| digest(seed.wrapping_add(1 + i as u8)))
            .collect();

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_V2,
            "config": {
                "mediaType": CONFIG_MEDIA_TYPE,
                "size": config.len(),
                "digest": config_digest,
            },
            "layers": layer_digests.iter().zip(layers).map(|(d, data)| json!({
                "mediaType": LAYER_MEDIA_TYPE,
                "size": data.len(),
                "digest": d,
            })).collect::<Vec<_>>(),
        })
        .to_string();
        let manifest_digest = digest(seed.wrapping_add(200));

        self.with_state(|s| {
            s.blobs
                .insert((repository.to_string(), config_digest.clone()), config.into_bytes());
            for (d, data) in layer_digests.iter().zip(layers) {
                s.blobs.insert((repository.to_string(), d.clone()), data.to_vec());
            }
            let entry = (MANIFEST_V2.to_string(), manifest.into_bytes());
            s.manifests
                .insert((repository.to_string(), manifest_digest.clone()), entry.clone());
            s.manifests
                .insert((repository.to_string(), tag.to_string()), entry);
        });

        ImageFixture {
            config_digest,
            layer_digests,
            manifest_digest,
        }
    }

    /// Store a manifest list under `tag` pointing at per-platform manifests
    pub fn add_index(&self, repository: &str, tag: &str, entries: &[(&ImageFixture, &str, &str)]) {
        let list = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_LIST_V2,
            "manifests": entries.iter().map(|(image, os, arch)| json!({
                "mediaType": MANIFEST_V2,
                "size": 500,
                "digest": image.manifest_digest,
                "platform": { "os": os, "architecture": arch },
            })).collect::<Vec<_>>(),
        })
        .to_string();

        self.with_state(|s| {
            s.manifests.insert(
                (repository.to_string(), tag.to_string()),
                (MANIFEST_LIST_V2.to_string(), list.into_bytes()),
            );
        });
    }
}

async fn handle(
    State(state): State<Arc<Mutex<MockState>>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match state.lock() {
        Ok(mut state) => respond(&mut state, &uri, &headers),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn respond(state: &mut MockState, uri: &Uri, headers: &HeaderMap) -> Response {
    state.requests.push(uri.to_string());
    let path = uri.path();

    if path == "/token" {
        return issue_token(state, uri.query().unwrap_or_default(), headers);
    }

    if path == "/v2/" || path == "/v2" {
        state.probes += 1;
        return match state.auth {
            AuthMode::Anonymous => (StatusCode::OK, "{}").into_response(),
            AuthMode::Bearer => {
                let challenge = format!(
                    r#"Bearer realm="{}",service="mock-registry""#,
                    state.realm
                );
                (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, challenge)]).into_response()
            }
            AuthMode::BasicOnly => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, r#"Basic realm="mock""#.to_string())],
            )
                .into_response(),
            AuthMode::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        };
    }

    let Some(rest) = path.strip_prefix("/v2/") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (repository, route) = if let Some(repository) = rest.strip_suffix("/tags/list") {
        (repository, Route::Tags)
    } else if let Some((repository, reference)) = rest.rsplit_once("/manifests/") {
        (repository, Route::Manifest(reference))
    } else if let Some((repository, digest)) = rest.rsplit_once("/blobs/") {
        (repository, Route::Blob(digest))
    } else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if state.auth != AuthMode::Anonymous && !authorized(headers, repository) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match route {
        Route::Tags => {
            let mut tags: Vec<&str> = state
                .manifests
                .keys()
                .filter(|(repo, reference)| repo == repository && !reference.contains(':'))
                .map(|(_, reference)| reference.as_str())
                .collect();
            tags.sort();
            let body = json!({ "name": repository, "tags": tags }).to_string();
            (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Route::Manifest(reference) => {
            match state.manifests.get(&(repository.to_string(), reference.to_string())) {
                Some((content_type, body)) => (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, content_type.clone())],
                    body.clone(),
                )
                    .into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
        Route::Blob(digest) => match state.blobs.get(&(repository.to_string(), digest.to_string())) {
            Some(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                body.clone(),
            )
                .into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        },
    }
}

enum Route<'a> {
    Tags,
    Manifest(&'a str),
    Blob(&'a str),
}

fn authorized(headers: &HeaderMap, repository: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(decode_claims)
        .is_some_and(|claims| claims.grants(repository))
}

fn issue_token(state: &mut MockState, query: &str, headers: &HeaderMap) -> Response {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let scope = params.get("scope").cloned().unwrap_or_default();
    state.token_scopes.push(scope.clone());

    if params.get("service").map(String::as_str) != Some("mock-registry") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    if let Some((username, password)) = &state.credentials {
        let expected = format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)));
        let given = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    if state.token_status != StatusCode::OK {
        return state.token_status.into_response();
    }

    let repository = scope
        .strip_prefix("repository:")
        .and_then(|s| s.strip_suffix(":pull"))
        .unwrap_or_default();
    if state.denied_repositories.iter().any(|r| r == repository) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let token = jwt(now_unix() + state.token_lifetime, repository);
    let body = json!({ "token": token, "expires_in": state.token_lifetime }).to_string();
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
