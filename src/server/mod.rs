//! Web front-end: upload PDFs, look at each page next to its text, download
//! the results.
//!
//! Every browser gets one upload session, identified by the
//! `vlm_ocr_session` cookie. A new upload replaces the previous one. Sessions
//! live only in memory and are dropped once older than the session TTL, or
//! when more than [`MAX_SESSIONS`] are alive.

mod handlers;
mod routes;
mod templates;

pub use routes::create_router;

use crate::config::OcrConfig;
use crate::pipeline::client::InferenceClient;
use crate::session::SessionAggregator;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "vlm_ocr_session";

/// Largest accepted upload, across all files of one request.
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// How long an upload's results stay available.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on live sessions; the oldest are evicted first.
pub const MAX_SESSIONS: usize = 64;

/// One file of an upload and what became of it.
#[derive(Debug)]
pub struct UploadedDocument {
    pub name: String,
    pub size_bytes: usize,
    /// The finished aggregator, or why the document could not be processed.
    pub result: Result<SessionAggregator, String>,
}

/// Everything one browser uploaded last.
#[derive(Debug)]
pub struct UploadSession {
    pub documents: Vec<UploadedDocument>,
    pub created_at: Instant,
}

impl UploadSession {
    pub fn new(documents: Vec<UploadedDocument>) -> Self {
        Self {
            documents,
            created_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }

    pub fn aggregators(&self) -> impl Iterator<Item = &SessionAggregator> {
        self.documents.iter().filter_map(|d| d.result.as_ref().ok())
    }
}

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OcrConfig>,
    pub client: Arc<dyn InferenceClient>,
    pub sessions: Arc<RwLock<HashMap<Uuid, UploadSession>>>,
    pub session_ttl: Duration,
}

impl AppState {
    /// Page previews are always retained: the results view shows them.
    pub fn new(config: &OcrConfig, client: Arc<dyn InferenceClient>) -> Self {
        let mut config = config.clone();
        config.retain_page_images = true;
        Self {
            config: Arc::new(config),
            client,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Store a finished upload under a fresh id, dropping expired sessions
    /// and, past [`MAX_SESSIONS`], the oldest ones.
    pub async fn insert_session(&self, session: UploadSession) -> Uuid {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.session_ttl));

        while sessions.len() >= MAX_SESSIONS {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.created_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!("Dropped {} stale upload session(s)", pruned);
        }

        let id = Uuid::new_v4();
        sessions.insert(id, session);
        id
    }

    /// A live session, or `None` if unknown or expired.
    pub(crate) fn live<'a>(
        &self,
        sessions: &'a HashMap<Uuid, UploadSession>,
        id: &Uuid,
    ) -> Option<&'a UploadSession> {
        sessions.get(id).filter(|s| !s.is_expired(self.session_ttl))
    }
}

/// Start the web server.
pub async fn serve(
    config: &OcrConfig,
    client: Arc<dyn InferenceClient>,
    host: &str,
    port: u16,
    session_ttl: Duration,
) -> anyhow::Result<()> {
    let app = create_router(AppState::new(config, client).with_session_ttl(session_ttl));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);
    tracing::info!("Inference endpoint: {}", config.completions_url());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
