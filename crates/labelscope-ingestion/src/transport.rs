//! Document transports.
//!
//! `Transport` is the only place the pipeline touches the network or disk.
//! Failures are split into retryable (timeouts, truncated bodies, 5xx/429)
//! and fatal (disallowed host, 4xx, missing file); only the former are
//! retried by `retry::fetch_with_retry`.

use async_trait::async_trait;
use labelscope_common::sandbox::SandboxClient;
use labelscope_common::LabelscopeError;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::models::{DocumentKind, DocumentRef};

/// Raw document content.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Markup(String),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Bytes(b) => b.len(),
            Payload::Markup(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub payload: Payload,
    /// Session cookies the request was made with.
    pub cookies: Vec<(String, String)>,
}

impl FetchedDocument {
    pub fn new(payload: Payload) -> Self {
        Self { payload, cookies: Vec::new() }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("transient: {0}")]
    Retryable(String),
    #[error("{0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Retryable(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, doc: &DocumentRef) -> Result<FetchedDocument, TransportError>;

    /// Re-establish session state (cookies). No-op by default.
    async fn refresh_session(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Source of session cookies for agencies that require one.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, client: &SandboxClient) -> Result<Vec<(String, String)>, TransportError>;
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

fn classify_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_builder() || err.is_redirect() {
        TransportError::Fatal(err.to_string())
    } else {
        TransportError::Retryable(err.to_string())
    }
}

fn classify_status(status: StatusCode, url: &str) -> Result<(), TransportError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Err(TransportError::Retryable(format!("HTTP {} from {}", status, url)))
    } else {
        Err(TransportError::Fatal(format!("HTTP {} from {}", status, url)))
    }
}

/// `name=value` of one `Set-Cookie` header.
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Session established by visiting a landing page and keeping its cookies.
pub struct LandingPageSession {
    pub url: String,
}

#[async_trait]
impl SessionProvider for LandingPageSession {
    async fn acquire(&self, client: &SandboxClient) -> Result<Vec<(String, String)>, TransportError> {
        let response = client
            .get(&self.url)
            .map_err(|e| TransportError::Fatal(e.to_string()))?
            .send()
            .await
            .map_err(classify_reqwest)?;
        classify_status(response.status(), &self.url)?;
        Ok(response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect())
    }
}

/// Fetches documents over HTTP through the domain allowlist.
pub struct HttpTransport {
    client: SandboxClient,
    kind: DocumentKind,
    session: Option<Arc<dyn SessionProvider>>,
    cookies: RwLock<Vec<(String, String)>>,
}

impl HttpTransport {
    pub fn new(kind: DocumentKind) -> Result<Self, LabelscopeError> {
        Ok(Self::with_client(SandboxClient::new()?, kind))
    }

    pub fn with_client(client: SandboxClient, kind: DocumentKind) -> Self {
        Self {
            client,
            kind,
            session: None,
            cookies: RwLock::new(Vec::new()),
        }
    }

    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, doc), fields(url = %doc.location()))]
    async fn fetch(&self, doc: &DocumentRef) -> Result<FetchedDocument, TransportError> {
        let url = doc.location();
        let cookies = self.cookies.read().await.clone();

        let mut request = self
            .client
            .get(url)
            .map_err(|e| TransportError::Fatal(e.to_string()))?;
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookie_header(&cookies));
        }

        let response = request.send().await.map_err(classify_reqwest)?;
        classify_status(response.status(), url)?;
        let expected = response.content_length();

        let payload = match self.kind {
            DocumentKind::PagedBinary => {
                Payload::Bytes(response.bytes().await.map_err(classify_reqwest)?.to_vec())
            }
            DocumentKind::Markup | DocumentKind::StructuredXml => {
                Payload::Markup(response.text().await.map_err(classify_reqwest)?)
            }
        };

        if let Some(expected) = expected {
            if (payload.len() as u64) < expected {
                return Err(TransportError::Retryable(format!(
                    "truncated body: {} of {} bytes",
                    payload.len(),
                    expected
                )));
            }
        }

        debug!(bytes = payload.len(), "Fetched document");
        Ok(FetchedDocument { payload, cookies })
    }

    async fn refresh_session(&self) -> Result<(), TransportError> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let fresh = session.acquire(&self.client).await?;
        info!(cookies = fresh.len(), "Refreshed agency session");
        *self.cookies.write().await = fresh;
        Ok(())
    }
}

// ── Local files ───────────────────────────────────────────────────────────────

/// Reads documents from a local mirror; locations are relative to `root`.
pub struct FileTransport {
    root: PathBuf,
    kind: DocumentKind,
}

impl FileTransport {
    pub fn new(root: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self { root: root.into(), kind }
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn fetch(&self, doc: &DocumentRef) -> Result<FetchedDocument, TransportError> {
        let path = self.root.join(doc.location());
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::Fatal(format!("no such file: {}", path.display())),
            _ => TransportError::Retryable(format!("{}: {}", path.display(), e)),
        })?;
        let payload = match self.kind {
            DocumentKind::PagedBinary => Payload::Bytes(bytes),
            DocumentKind::Markup | DocumentKind::StructuredXml => {
                Payload::Markup(String::from_utf8_lossy(&bytes).into_owned())
            }
        };
        Ok(FetchedDocument::new(payload))
    }
}
