use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const PATH_LOGIN: &str = "/user/login";
pub const PATH_USER_INFO: &str = "/user/getUserInfo";
pub const PATH_RECOMMENDED: &str = "/song/getRecommendedSongs";
pub const PATH_DETAIL: &str = "/song/getSongDetail/{id}";
pub const PATH_OWN_UPLOADS: &str = "/song/getUserOriginalSongs/{user_id}";
pub const PATH_UPLOAD: &str = "/song/uploadOriginalSong";
pub const PATH_COLLECT: &str = "/favorite/collectSong";
pub const PATH_COMMENT: &str = "/comment/addSongComment";
pub const PATH_STORAGE: &str = "/music/{file}";

/// The only password the mock accepts, for any email.
pub const PASSWORD: &str = "123456ab";

/// Seeded catalog ids. Song 2 has no audio locator.
pub const SEEDED_SONGS: [i64; 3] = [1, 2, 3];
pub const SONG_WITHOUT_AUDIO: i64 = 2;
pub const SEED_AUDIO_LEN: usize = 64 * 1024;

const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;
const FIRST_USER_ID: i64 = 100;
const FIRST_UPLOAD_ID: i64 = 1000;

#[derive(Debug, Clone)]
struct Song {
    id: i64,
    name: String,
    owner: i64,
    locator: Option<String>,
    /// Uploads stay pending until moderated, which never happens here.
    approved: bool,
    /// Answer with `song_id` / `audio_url` instead of the camelCase keys.
    snake_keys: bool,
}

impl Song {
    fn to_json(&self) -> Value {
        let (id_key, name_key, url_key) = if self.snake_keys {
            ("song_id", "song_name", "audio_url")
        } else {
            ("songId", "songName", "audioUrl")
        };
        let mut obj = serde_json::Map::new();
        obj.insert(id_key.to_string(), json!(self.id));
        obj.insert(name_key.to_string(), json!(self.name));
        obj.insert("auditStatus".to_string(), json!(i32::from(self.approved)));
        if let Some(locator) = &self.locator {
            obj.insert(url_key.to_string(), json!(locator));
        }
        Value::Object(obj)
    }
}

#[derive(Debug, Default)]
struct Catalog {
    songs: BTreeMap<i64, Song>,
    /// Storage objects keyed by file name under `/music/`.
    blobs: HashMap<String, Bytes>,
    users: HashMap<String, i64>,
    tokens: HashMap<String, i64>,
    comments: u64,
}

impl Catalog {
    fn seeded() -> Self {
        let mut cat = Self::default();
        for id in SEEDED_SONGS {
            let file = format!("seed-{id}.mp3");
            let locator = match id {
                SONG_WITHOUT_AUDIO => None,
                // Relative without a leading slash, to exercise storage joining.
                3 => Some(format!("music/{file}")),
                _ => Some(format!("/music/{file}")),
            };
            if locator.is_some() {
                cat.blobs.insert(file, seed_audio(id));
            }
            cat.songs.insert(
                id,
                Song {
                    id,
                    name: format!("Seed Song {id}"),
                    owner: 0,
                    locator,
                    approved: true,
                    snake_keys: id == 3,
                },
            );
        }
        cat
    }
}

/// Deterministic audio bytes for a seeded song.
#[must_use]
pub fn seed_audio(id: i64) -> Bytes {
    (0..SEED_AUDIO_LEN)
        .map(|i| (i as u64).wrapping_mul(31).wrapping_add(id as u64) as u8)
        .collect::<Vec<u8>>()
        .into()
}

#[derive(Debug)]
struct Inner {
    catalog: Mutex<Catalog>,
    next_song_id: AtomicI64,
    dependency_down: AtomicBool,
    corrupt_storage: AtomicBool,
    truncate_storage: AtomicBool,
    recommended_window: AtomicUsize,
    recommended_calls: AtomicUsize,

    requests_total: AtomicU64,
    logins: AtomicU64,
    uploads: AtomicU64,
    collects: AtomicU64,
    comments: AtomicU64,
    downloads: AtomicU64,
}

/// Shared state of the mock service plus the knobs tests turn.
#[derive(Debug, Clone)]
pub struct ServiceState {
    inner: Arc<Inner>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog: Mutex::new(Catalog::seeded()),
                next_song_id: AtomicI64::new(FIRST_UPLOAD_ID),
                dependency_down: AtomicBool::new(false),
                corrupt_storage: AtomicBool::new(false),
                truncate_storage: AtomicBool::new(false),
                recommended_window: AtomicUsize::new(0),
                recommended_calls: AtomicUsize::new(0),
                requests_total: AtomicU64::new(0),
                logins: AtomicU64::new(0),
                uploads: AtomicU64::new(0),
                collects: AtomicU64::new(0),
                comments: AtomicU64::new(0),
                downloads: AtomicU64::new(0),
            }),
        }
    }
}

impl ServiceState {
    /// While down, every endpoint backed by the database answers with a business error
    /// envelope. Storage keeps serving.
    pub fn set_dependency_down(&self, down: bool) {
        self.inner.dependency_down.store(down, Ordering::Relaxed);
    }

    /// Flip the first byte of every full (non-ranged) storage download.
    pub fn set_corrupt_storage(&self, corrupt: bool) {
        self.inner.corrupt_storage.store(corrupt, Ordering::Relaxed);
    }

    /// Serve only the first half of every full (non-ranged) storage download.
    pub fn set_truncate_storage(&self, truncate: bool) {
        self.inner.truncate_storage.store(truncate, Ordering::Relaxed);
    }

    /// Answer the recommended list with `window` songs, rotating through the catalog on
    /// each call. 0 restores the full list.
    pub fn set_recommended_window(&self, window: usize) {
        self.inner.recommended_window.store(window, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.inner.requests_total.load(Ordering::Relaxed)
    }

    pub fn logins(&self) -> u64 {
        self.inner.logins.load(Ordering::Relaxed)
    }

    pub fn uploads(&self) -> u64 {
        self.inner.uploads.load(Ordering::Relaxed)
    }

    pub fn collects(&self) -> u64 {
        self.inner.collects.load(Ordering::Relaxed)
    }

    pub fn comments(&self) -> u64 {
        self.inner.comments.load(Ordering::Relaxed)
    }

    pub fn downloads(&self) -> u64 {
        self.inner.downloads.load(Ordering::Relaxed)
    }

    fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.inner
            .catalog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hit(&self) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn is_down(&self) -> bool {
        self.inner.dependency_down.load(Ordering::Relaxed)
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<i64> {
        let token = headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        self.catalog().tokens.get(token).copied()
    }

    /// Auth and dependency checks shared by every data endpoint.
    fn guard(&self, headers: &HeaderMap) -> Result<i64, Response> {
        self.hit();
        let Some(user_id) = self.user_for(headers) else {
            return Err((StatusCode::UNAUTHORIZED, "unauthorized").into_response());
        };
        if self.is_down() {
            return Err(dependency_down());
        }
        Ok(user_id)
    }
}

fn ok(data: Value) -> Response {
    Json(json!({ "code": 0, "message": "success", "data": data })).into_response()
}

fn fail(code: i64, message: &str) -> Response {
    Json(json!({ "code": code, "message": message, "data": null })).into_response()
}

fn dependency_down() -> Response {
    fail(500, "database unavailable")
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn handle_login(State(state): State<ServiceState>, body: Bytes) -> Response {
    state.hit();
    let Ok(req) = serde_json::from_slice::<LoginRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad json").into_response();
    };
    if state.is_down() {
        return dependency_down();
    }
    if req.password != PASSWORD {
        return fail(401, "invalid email or password");
    }

    state.inner.logins.fetch_add(1, Ordering::Relaxed);
    let mut cat = state.catalog();
    let next = FIRST_USER_ID + cat.users.len() as i64;
    let user_id = *cat.users.entry(req.email).or_insert(next);
    let token = format!("token-{user_id}-{}", cat.tokens.len());
    cat.tokens.insert(token.clone(), user_id);

    // Both token shapes exist in the wild.
    if user_id % 2 == 0 {
        ok(json!(token))
    } else {
        ok(json!({ "token": token }))
    }
}

async fn handle_user_info(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    match state.guard(&headers) {
        Ok(user_id) => ok(json!({ "userId": user_id })),
        Err(res) => res,
    }
}

async fn handle_recommended(State(state): State<ServiceState>) -> Response {
    state.hit();
    if state.is_down() {
        return dependency_down();
    }

    let window = state.inner.recommended_window.load(Ordering::Relaxed);
    let cat = state.catalog();
    let visible: Vec<&Song> = cat.songs.values().filter(|s| s.approved).collect();
    let songs: Vec<Value> = if window == 0 || visible.is_empty() {
        visible.iter().map(|s| s.to_json()).collect()
    } else {
        let start = state.inner.recommended_calls.fetch_add(1, Ordering::Relaxed);
        (0..window)
            .map(|k| visible[(start + k) % visible.len()].to_json())
            .collect()
    };
    ok(Value::Array(songs))
}

async fn handle_detail(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if let Err(res) = state.guard(&headers) {
        return res;
    }
    let cat = state.catalog();
    match cat.songs.get(&id) {
        Some(song) if song.approved => ok(song.to_json()),
        _ => fail(404, "song not found"),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnUploadsQuery {
    page_num: Option<usize>,
    page_size: Option<usize>,
    audit_status: Option<i32>,
}

async fn handle_own_uploads(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    Query(query): Query<OwnUploadsQuery>,
) -> Response {
    let caller = match state.guard(&headers) {
        Ok(id) => id,
        Err(res) => return res,
    };
    if caller != user_id {
        return fail(403, "forbidden");
    }

    let page = query.page_num.unwrap_or(1).max(1);
    let size = query.page_size.unwrap_or(10).max(1);
    let cat = state.catalog();
    let mine: Vec<&Song> = cat
        .songs
        .values()
        .rev()
        .filter(|s| s.owner == user_id)
        .filter(|s| match query.audit_status {
            Some(0) => !s.approved,
            Some(_) => s.approved,
            None => true,
        })
        .collect();
    let items: Vec<Value> = mine
        .iter()
        .skip((page - 1) * size)
        .take(size)
        .map(|s| s.to_json())
        .collect();
    ok(json!({ "items": items, "total": mine.len() }))
}

async fn handle_upload(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    mut form: Multipart,
) -> Response {
    let owner = match state.guard(&headers) {
        Ok(id) => id,
        Err(res) => return res,
    };

    let mut name = None;
    let mut audio = None;
    loop {
        match form.next_field().await {
            Ok(Some(field)) => {
                let field_name = field.name().unwrap_or_default().to_string();
                match field_name.as_str() {
                    "songName" => name = field.text().await.ok(),
                    "audioFile" => audio = field.bytes().await.ok(),
                    _ => {
                        let _ = field.bytes().await;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        }
    }
    let (Some(name), Some(audio)) = (name, audio) else {
        return fail(400, "songName and audioFile are required");
    };

    let id = state.inner.next_song_id.fetch_add(1, Ordering::Relaxed);
    let file = format!("upload-{id}.mp3");
    let mut cat = state.catalog();
    cat.blobs.insert(file.clone(), audio);
    cat.songs.insert(
        id,
        Song {
            id,
            name,
            owner,
            locator: Some(format!("/music/{file}")),
            approved: false,
            snake_keys: false,
        },
    );
    state.inner.uploads.fetch_add(1, Ordering::Relaxed);
    ok(json!({ "songId": id }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectQuery {
    song_id: i64,
}

async fn handle_collect(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<CollectQuery>,
) -> Response {
    if let Err(res) = state.guard(&headers) {
        return res;
    }
    if !state.catalog().songs.contains_key(&query.song_id) {
        return fail(404, "song not found");
    }
    state.inner.collects.fetch_add(1, Ordering::Relaxed);
    ok(Value::Null)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentRequest {
    song_id: i64,
    content: String,
}

async fn handle_comment(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(res) = state.guard(&headers) {
        return res;
    }
    let Ok(req) = serde_json::from_slice::<CommentRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "bad json").into_response();
    };
    if req.content.trim().is_empty() {
        return fail(400, "comment must not be empty");
    }

    let mut cat = state.catalog();
    if !cat.songs.contains_key(&req.song_id) {
        return fail(404, "song not found");
    }
    cat.comments += 1;
    let comment_id = cat.comments;
    state.inner.comments.fetch_add(1, Ordering::Relaxed);
    ok(json!({ "commentId": comment_id }))
}

async fn handle_storage(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(file): Path<String>,
) -> Response {
    state.hit();
    let Some(mut data) = state.catalog().blobs.get(&file).cloned() else {
        return (StatusCode::NOT_FOUND, "no such object").into_response();
    };
    state.inner.downloads.fetch_add(1, Ordering::Relaxed);

    let len = data.len();
    if let Some((start, end)) = parse_range(headers.get(header::RANGE), len) {
        return (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}"))],
            data.slice(start..=end),
        )
            .into_response();
    }

    if state.inner.corrupt_storage.load(Ordering::Relaxed) && !data.is_empty() {
        let mut tampered = data.to_vec();
        tampered[0] ^= 0xff;
        data = Bytes::from(tampered);
    }
    if state.inner.truncate_storage.load(Ordering::Relaxed) {
        data.truncate(len / 2);
    }
    (StatusCode::OK, data).into_response()
}

/// `bytes=start-end` or `bytes=start-`, clamped to the object; anything else is ignored.
fn parse_range(value: Option<&HeaderValue>, len: usize) -> Option<(usize, usize)> {
    let spec = value?.to_str().ok()?.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: usize = start.trim().parse().ok()?;
    if start >= len {
        return None;
    }
    let end = match end.trim() {
        "" => len - 1,
        e => e.parse::<usize>().ok()?.min(len - 1),
    };
    (start <= end).then_some((start, end))
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_USER_INFO, get(handle_user_info))
        .route(PATH_RECOMMENDED, get(handle_recommended))
        .route(PATH_DETAIL, get(handle_detail))
        .route(PATH_OWN_UPLOADS, get(handle_own_uploads))
        .route(PATH_UPLOAD, post(handle_upload))
        .route(PATH_COLLECT, post(handle_collect))
        .route(PATH_COMMENT, post(handle_comment))
        .route(PATH_STORAGE, get(handle_storage))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// The mock service on an ephemeral local port. Storage is served by the same listener,
/// so [`TestServer::base_url`] doubles as the storage base.
pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    state: ServiceState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = ServiceState::default();
        let app = router(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
