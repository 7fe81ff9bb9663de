//! Exposes an in-process fake of the storage API for use in integration tests.
//!
//! The same server also acts as OAuth 2.0 token endpoint (`/token`) and as instance metadata
//! server (its root URL), so clients can be pointed at it for every outbound request:
//!
//! ```
//! use cloudstorage_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    server.create_bucket("bucket");
//!    let endpoint = server.url("/");
//!    // point the endpoint, token URI and metadata host of a client here...
//! }
//! ```
//!
//! Storage requests must carry a bearer token previously issued by this server. Every storage
//! request is recorded and can be inspected with [`TestServer::requests`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json, Router, routing};
use bytes::Bytes;
use serde_json::{Value, json};

const METADATA_FLAVOR: &str = "metadata-flavor";
const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// An error response returned by the next storage request, see [`TestServer::inject_failure`].
#[derive(Clone, Debug)]
struct InjectedFailure {
    status: StatusCode,
    content_type: String,
    body: String,
}

impl IntoResponse for InjectedFailure {
    fn into_response(self) -> Response {
        (self.status, [(CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

/// A storage request as received by the [`TestServer`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    /// The HTTP method, e.g. `GET`.
    pub method: String,
    /// The percent-encoded request path.
    pub path: String,
    /// The decoded query parameters.
    pub query: BTreeMap<String, String>,
    /// The value of the `Authorization` header.
    pub authorization: Option<String>,
}

impl RecordedRequest {
    /// Returns the value of the query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Debug)]
struct StoredObject {
    content: Bytes,
    content_type: String,
    generation: u64,
}

#[derive(Debug, Default)]
struct StoredBucket {
    project: String,
    objects: BTreeMap<String, StoredObject>,
    acl: BTreeMap<String, String>,
    default_object_acl: BTreeMap<String, String>,
}

impl StoredBucket {
    fn acl_mut(&mut self, list: &str) -> Option<&mut BTreeMap<String, String>> {
        match list {
            "acl" => Some(&mut self.acl),
            "defaultObjectAcl" => Some(&mut self.default_object_acl),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    buckets: BTreeMap<String, StoredBucket>,
    tokens: HashSet<String>,
    token_grants: Vec<String>,
    requests: Vec<RecordedRequest>,
    failures: VecDeque<InjectedFailure>,
    next_token: u64,
    next_generation: u64,
}

impl ServerState {
    fn issue_token(&mut self) -> String {
        self.next_token += 1;
        let token = format!("ya29.test-token-{}", self.next_token);
        self.tokens.insert(token.clone());
        token
    }

    fn bucket(&mut self, bucket: &str) -> Result<&mut StoredBucket, Response> {
        self.buckets.get_mut(bucket).ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                "notFound",
                "The specified bucket does not exist.",
            )
        })
    }
}

type SharedState = Arc<Mutex<ServerState>>;

/// Renders an error in the JSON format of the storage API.
fn error_response(status: StatusCode, reason: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "errors": [{"domain": "global", "reason": reason, "message": message}],
            "code": status.as_u16(),
            "message": message,
        }
    });
    (status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], body.to_string()).into_response()
}

fn token_response(token: String) -> Response {
    Json(json!({"access_token": token, "expires_in": 3599, "token_type": "Bearer"})).into_response()
}

fn bucket_json(name: &str, bucket: &StoredBucket) -> Value {
    json!({
        "kind": "storage#bucket",
        "id": name,
        "name": name,
        "projectNumber": bucket.project,
        "location": "US",
        "storageClass": "STANDARD",
    })
}

fn object_json(bucket: &str, name: &str, object: &StoredObject) -> Value {
    json!({
        "kind": "storage#object",
        "id": format!("{bucket}/{name}/{}", object.generation),
        "name": name,
        "bucket": bucket,
        "generation": object.generation.to_string(),
        "metageneration": "1",
        "contentType": object.content_type,
        "size": object.content.len().to_string(),
    })
}

fn access_control_json(bucket: &str, entity: &str, role: &str) -> Value {
    json!({
        "kind": "storage#bucketAccessControl",
        "id": format!("{bucket}/{entity}"),
        "bucket": bucket,
        "entity": entity,
        "role": role,
    })
}

/// Records storage requests, returns injected failures and checks bearer tokens.
async fn authorize(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    {
        let mut state = state.lock().unwrap();

        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let query = Query::<BTreeMap<String, String>>::try_from_uri(request.uri())
            .map(|Query(query)| query)
            .unwrap_or_default();

        tracing::debug!(method = %request.method(), path = request.uri().path(), "storage request");
        state.requests.push(RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_owned(),
            query,
            authorization: authorization.clone(),
        });

        if let Some(failure) = state.failures.pop_front() {
            return failure.into_response();
        }

        let token = authorization
            .as_deref()
            .and_then(|value| value.strip_prefix("Bearer "));
        if !token.is_some_and(|token| state.tokens.contains(token)) {
            return error_response(StatusCode::UNAUTHORIZED, "authError", "Invalid Credentials");
        }
    }

    next.run(request).await
}

async fn metadata_root() -> impl IntoResponse {
    ([(METADATA_FLAVOR, "Google")], "computeMetadata/\n")
}

async fn metadata_token(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if headers.get(METADATA_FLAVOR).is_none_or(|value| value != "Google") {
        return (StatusCode::FORBIDDEN, "Missing Metadata-Flavor:Google header.").into_response();
    }

    let token = state.lock().unwrap().issue_token();
    ([(METADATA_FLAVOR, "Google")], token_response(token)).into_response()
}

async fn token(
    State(state): State<SharedState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let grant_type = form.get("grant_type").cloned().unwrap_or_default();
    state.token_grants.push(grant_type.clone());

    let granted = match grant_type.as_str() {
        JWT_BEARER_GRANT => form
            .get("assertion")
            .is_some_and(|assertion| assertion.split('.').count() == 3),
        REFRESH_TOKEN_GRANT => {
            form.get("refresh_token").map(String::as_str) == Some(TestServer::REFRESH_TOKEN)
        }
        _ => false,
    };

    if !granted {
        let body = json!({"error": "invalid_grant", "error_description": "Bad Request"});
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    token_response(state.issue_token())
}

async fn list_buckets(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(project) = params.get("project") else {
        return error_response(StatusCode::BAD_REQUEST, "required", "Required parameter: project");
    };

    let state = state.lock().unwrap();
    let items: Vec<_> = state
        .buckets
        .iter()
        .filter(|(_, bucket)| &bucket.project == project)
        .map(|(name, bucket)| bucket_json(name, bucket))
        .collect();

    Json(json!({"kind": "storage#buckets", "items": items})).into_response()
}

async fn insert_bucket(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let Some(project) = params.get("project") else {
        return error_response(StatusCode::BAD_REQUEST, "required", "Required parameter: project");
    };
    let Some(name) = body.get("name").and_then(Value::as_str) else {
        return error_response(StatusCode::BAD_REQUEST, "required", "Required");
    };

    let mut state = state.lock().unwrap();
    if state.buckets.contains_key(name) {
        return error_response(
            StatusCode::CONFLICT,
            "conflict",
            "You already own this bucket. Please select another name.",
        );
    }

    let bucket = StoredBucket {
        project: project.clone(),
        ..Default::default()
    };
    let response = bucket_json(name, &bucket);
    state.buckets.insert(name.to_owned(), bucket);
    Json(response).into_response()
}

async fn get_bucket(State(state): State<SharedState>, Path(bucket): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    match state.bucket(&bucket) {
        Ok(stored) => Json(bucket_json(&bucket, stored)).into_response(),
        Err(response) => response,
    }
}

async fn delete_bucket(State(state): State<SharedState>, Path(bucket): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    let is_empty = match state.bucket(&bucket) {
        Ok(stored) => stored.objects.is_empty(),
        Err(response) => return response,
    };
    if !is_empty {
        return error_response(
            StatusCode::CONFLICT,
            "conflict",
            "The bucket you tried to delete is not empty.",
        );
    }

    state.buckets.remove(&bucket);
    StatusCode::NO_CONTENT.into_response()
}

async fn list_objects(
    State(state): State<SharedState>,
    Path(bucket): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };

    let prefix = params.get("prefix").map(String::as_str).unwrap_or_default();
    let delimiter = params.get("delimiter").filter(|d| !d.is_empty());
    let page_token = params.get("pageToken");
    let max_results = params
        .get("maxResults")
        .and_then(|max| max.parse::<usize>().ok())
        .unwrap_or(1000);

    let mut prefixes = Vec::new();
    let mut names = Vec::new();
    for name in stored.objects.keys() {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        match delimiter.and_then(|delimiter| rest.find(delimiter.as_str()).map(|i| (i, delimiter))) {
            Some((index, delimiter)) => {
                let common = format!("{prefix}{}", &rest[..index + delimiter.len()]);
                if !prefixes.contains(&common) {
                    prefixes.push(common);
                }
            }
            None => names.push(name),
        }
    }

    let remaining: Vec<_> = names
        .into_iter()
        .filter(|name| page_token.is_none_or(|token| name.as_str() > token.as_str()))
        .collect();
    let page = &remaining[..remaining.len().min(max_results)];
    let next_page_token = (remaining.len() > page.len())
        .then(|| page.last().map(|name| name.to_string()))
        .flatten();

    let items: Vec<_> = page
        .iter()
        .map(|name| object_json(&bucket, name, &stored.objects[name.as_str()]))
        .collect();
    let mut response = json!({"kind": "storage#objects", "items": items});
    if page_token.is_none() && !prefixes.is_empty() {
        response["prefixes"] = json!(prefixes);
    }
    if let Some(next_page_token) = next_page_token {
        response["nextPageToken"] = json!(next_page_token);
    }

    Json(response).into_response()
}

async fn get_object(
    State(state): State<SharedState>,
    Path((bucket, name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };
    let Some(object) = stored.objects.get(&name) else {
        let message = format!("No such object: {bucket}/{name}");
        return error_response(StatusCode::NOT_FOUND, "notFound", &message);
    };

    if params.get("alt").is_some_and(|alt| alt == "media") {
        let headers = [(CONTENT_TYPE, object.content_type.clone())];
        return (headers, object.content.clone()).into_response();
    }

    Json(object_json(&bucket, &name, object)).into_response()
}

async fn delete_object(
    State(state): State<SharedState>,
    Path((bucket, name)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };

    match stored.objects.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => {
            let message = format!("No such object: {bucket}/{name}");
            error_response(StatusCode::NOT_FOUND, "notFound", &message)
        }
    }
}

async fn upload_object(
    State(state): State<SharedState>,
    Path(bucket): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if params.get("uploadType").is_none_or(|upload_type| upload_type != "media") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "badRequest",
            "Only media uploads are supported.",
        );
    }
    let Some(name) = params.get("name").filter(|name| !name.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "required", "Required parameter: name");
    };

    let mut state = state.lock().unwrap();
    state.next_generation += 1;
    let generation = state.next_generation;
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_owned();
    let object = StoredObject {
        content: body,
        content_type,
        generation,
    };
    let response = object_json(&bucket, name, &object);
    stored.objects.insert(name.clone(), object);

    Json(response).into_response()
}

async fn list_access_controls(
    State(state): State<SharedState>,
    Path((bucket, list)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };
    let Some(acl) = stored.acl_mut(&list) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let items: Vec<_> = acl
        .iter()
        .map(|(entity, role)| access_control_json(&bucket, entity, role))
        .collect();
    Json(json!({"kind": "storage#bucketAccessControls", "items": items})).into_response()
}

async fn insert_access_control(
    State(state): State<SharedState>,
    Path((bucket, list)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let entity = body.get("entity").and_then(Value::as_str);
    let role = body.get("role").and_then(Value::as_str);
    let (Some(entity), Some(role)) = (entity, role) else {
        return error_response(StatusCode::BAD_REQUEST, "required", "Required");
    };
    if !matches!(role, "READER" | "WRITER" | "OWNER") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidParameter",
            &format!("Invalid value for role: {role}"),
        );
    }

    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };
    let Some(acl) = stored.acl_mut(&list) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    acl.insert(entity.to_owned(), role.to_owned());
    Json(access_control_json(&bucket, entity, role)).into_response()
}

async fn get_access_control(
    State(state): State<SharedState>,
    Path((bucket, list, entity)): Path<(String, String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };
    let Some(acl) = stored.acl_mut(&list) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match acl.get(&entity) {
        Some(role) => Json(access_control_json(&bucket, &entity, role)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "notFound", "Not Found"),
    }
}

async fn delete_access_control(
    State(state): State<SharedState>,
    Path((bucket, list, entity)): Path<(String, String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let stored = match state.bucket(&bucket) {
        Ok(stored) => stored,
        Err(response) => return response,
    };
    let Some(acl) = stored.acl_mut(&list) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match acl.remove(&entity) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_response(StatusCode::NOT_FOUND, "notFound", "Not Found"),
    }
}

async fn stop_channel(Json(body): Json<Value>) -> Response {
    let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
    let resource_id = body.get("resourceId").and_then(Value::as_str).unwrap_or_default();
    if id.is_empty() || resource_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "required", "Required");
    }

    StatusCode::NO_CONTENT.into_response()
}

/// An in-process fake of the storage API, the OAuth 2.0 token endpoint and the metadata server.
///
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: SharedState,
}

impl TestServer {
    /// The only refresh token accepted by the token endpoint.
    pub const REFRESH_TOKEN: &'static str = "1/test-refresh-token";

    /// The project that buckets created with [`create_bucket`](Self::create_bucket) belong to.
    pub const PROJECT: &'static str = "test-project";

    /// Starts a new server without any buckets.
    pub async fn new() -> Self {
        let state = SharedState::default();

        let storage = Router::new()
            .route("/storage/v1/b", routing::get(list_buckets).post(insert_bucket))
            .route(
                "/storage/v1/b/{bucket}",
                routing::get(get_bucket).delete(delete_bucket),
            )
            .route("/storage/v1/b/{bucket}/o", routing::get(list_objects))
            .route(
                "/storage/v1/b/{bucket}/o/{object}",
                routing::get(get_object).delete(delete_object),
            )
            .route(
                "/storage/v1/b/{bucket}/{list}",
                routing::get(list_access_controls).post(insert_access_control),
            )
            .route(
                "/storage/v1/b/{bucket}/{list}/{entity}",
                routing::get(get_access_control).delete(delete_access_control),
            )
            .route("/storage/v1/channels/stop", routing::post(stop_channel))
            .route("/upload/storage/v1/b/{bucket}/o", routing::post(upload_object))
            .route_layer(middleware::from_fn_with_state(state.clone(), authorize));

        let router = Router::new()
            .route("/", routing::get(metadata_root))
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/token",
                routing::get(metadata_token),
            )
            .route("/token", routing::post(token))
            .merge(storage)
            .with_state(state.clone());

        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `127.0.0.1` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://127.0.0.1:{}/{}", self.socket.port(), path)
    }

    /// Creates an empty bucket in [`PROJECT`](Self::PROJECT).
    pub fn create_bucket(&self, name: &str) {
        let bucket = StoredBucket {
            project: Self::PROJECT.to_owned(),
            ..Default::default()
        };
        self.state().buckets.insert(name.to_owned(), bucket);
    }

    /// Returns the content of a stored object.
    pub fn object(&self, bucket: &str, name: &str) -> Option<Bytes> {
        let state = self.state();
        let object = state.buckets.get(bucket)?.objects.get(name)?;
        Some(object.content.clone())
    }

    /// Makes the next storage request fail with the given response.
    ///
    /// Failures are queued and returned in order, one per request.
    pub fn inject_failure(&self, status: u16, content_type: &str, body: impl Into<String>) {
        let failure = InjectedFailure {
            status: StatusCode::from_u16(status).unwrap(),
            content_type: content_type.to_owned(),
            body: body.into(),
        };
        self.state().failures.push_back(failure);
    }

    /// Returns all storage requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    /// Issues a new access token accepted by the storage API.
    pub fn issue_token(&self) -> String {
        self.state().issue_token()
    }

    /// Returns `true` if `token` was issued by this server.
    pub fn is_valid_token(&self, token: &str) -> bool {
        self.state().tokens.contains(token)
    }

    /// Returns the `grant_type` of every request to the token endpoint so far.
    pub fn token_grants(&self) -> Vec<String> {
        self.state().token_grants.clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
