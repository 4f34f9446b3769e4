//! HTTP API.
//!
//! Handlers never touch the core on the async runtime. Inference runs on a
//! blocking thread while holding a permit from a fixed-size semaphore; when
//! every permit is taken the request is answered with 503 instead of
//! queueing.

mod error;
pub mod extract;
pub mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::HeaderValue;
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use regex::Regex;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::{CorsPolicyMode, EngineConfig};
use crate::core::load_core;
use crate::error::Result;
use crate::frontend::{Lexicon, TextAnalyzer};
use crate::manifest::EngineManifest;
use crate::tts_engine::TtsEngine;
use crate::user_dict::{UserDictionary, DEFAULT_DICT_FILE};

/// Large enough for `connect_waves` and `multi_synthesis` bodies.
const BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Shared application state passed to handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TtsEngine>,
    pub user_dict: Arc<UserDictionary>,
    pub manifest: Arc<EngineManifest>,
    pub resource_dir: Arc<PathBuf>,
    pub permits: Arc<Semaphore>,
}

impl AppState {
    /// Load the core, dictionaries and manifest named by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let core = load_core(&config.core)?;
        log::info!("Core version {}", core.version());

        let analyzer = Arc::new(TextAnalyzer::default());
        let user_dict = UserDictionary::new(
            &config.data_dir,
            &config.resource_dir,
            Arc::clone(&analyzer),
        );
        if let Err(e) = user_dict.update_dict() {
            log::warn!("Failed to apply user dictionary: {e}");
            let default_dict = config.resource_dir.join(DEFAULT_DICT_FILE);
            if default_dict.is_file() {
                analyzer.apply_lexicon(Lexicon::load(&default_dict)?);
            }
        }

        let manifest = EngineManifest::load_or_default(&config.resource_dir)?;

        Ok(Self::new(
            TtsEngine::new(core, analyzer),
            user_dict,
            manifest,
            config.resource_dir.clone(),
            config.max_pending,
        ))
    }

    pub fn new(
        engine: TtsEngine,
        user_dict: UserDictionary,
        manifest: EngineManifest,
        resource_dir: PathBuf,
        max_pending: usize,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            user_dict: Arc::new(user_dict),
            manifest: Arc::new(manifest),
            resource_dir: Arc::new(resource_dir),
            permits: Arc::new(Semaphore::new(max_pending)),
        }
    }
}

/// Build the router with all routes.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/version", get(routes::version))
        .route("/core_versions", get(routes::core_versions))
        .route("/engine_manifest", get(routes::engine_manifest))
        .route("/supported_devices", get(routes::supported_devices))
        .route("/speakers", get(routes::speakers))
        .route("/speaker_info", get(routes::speaker_info))
        .route("/initialize_speaker", post(routes::initialize_speaker))
        .route("/is_initialized_speaker", get(routes::is_initialized_speaker))
        .route("/audio_query", post(routes::audio_query))
        .route("/accent_phrases", post(routes::accent_phrases))
        .route("/mora_data", post(routes::mora_data))
        .route("/mora_length", post(routes::mora_length))
        .route("/mora_pitch", post(routes::mora_pitch))
        .route("/synthesis", post(routes::synthesis))
        .route("/multi_synthesis", post(routes::multi_synthesis))
        .route("/connect_waves", post(routes::connect_waves_handler))
        .route("/validate_kana", post(routes::validate_kana))
        .route("/user_dict", get(routes::get_user_dict))
        .route("/user_dict_word", post(routes::add_user_dict_word))
        .route(
            "/user_dict_word/{word_uuid}",
            put(routes::rewrite_user_dict_word).delete(routes::delete_user_dict_word),
        )
        .route("/import_user_dict", post(routes::import_user_dict))
        .fallback(routes::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
}

/// CORS for the configured policy.
///
/// `localapps` admits `app://` origins and http(s) localhost on any port,
/// plus the extra origins given.
pub fn cors_layer(mode: CorsPolicyMode, allow_origins: &[String]) -> CorsLayer {
    match mode {
        CorsPolicyMode::All => CorsLayer::permissive(),
        CorsPolicyMode::Localapps => {
            let local = Regex::new(r"^(app://.*|https?://(localhost|127\.0\.0\.1)(:\d+)?)$")
                .expect("static regex");
            let extra: Vec<String> = allow_origins.to_vec();
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(
                    move |origin: &HeaderValue, _: &Parts| {
                        origin.to_str().is_ok_and(|origin| {
                            local.is_match(origin) || extra.iter().any(|o| o == origin)
                        })
                    },
                ))
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{method} {path} -> {} ({:.1?})",
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

/// Handle returned by [`start`]; the server runs until the process gets
/// Ctrl-C or the handle is dropped with the runtime.
pub struct ServerHandle {
    pub addr: SocketAddr,
    server: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    pub async fn wait(self) -> std::io::Result<()> {
        self.server.await.map_err(std::io::Error::other)?
    }
}

/// Bind `addr` and start serving in the background.
pub async fn start(state: AppState, addr: SocketAddr, cors: CorsLayer) -> std::io::Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let router = build_router(state, cors);

    log::info!("Listening on http://{addr}");

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    Ok(ServerHandle { addr, server })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; serve until the task is dropped.
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
