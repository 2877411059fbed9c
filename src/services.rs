//! Collaborator contracts consumed by the core, plus their HTTP clients.
//!
//! Four external services surround the engine: text/metadata extraction, the
//! AI rewrite service, the bibliographic registry, and artifact rendering.
//! The engine only ever sees these traits; the `ureq` implementations talk
//! to the backend named by `MHUB_BACKEND_URL`. One agent-wide timeout bounds
//! every call, and a timed-out or failed call surfaces as
//! `EngineError::ExternalService` with the Session Record untouched — the
//! caller retries by re-invoking the action.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use ureq::Agent;

use crate::error::{EngineError, EngineResult};
use crate::session::Metadata;

pub const BACKEND_URL_ENV: &str = "MHUB_BACKEND_URL";
pub const TIMEOUT_ENV: &str = "MHUB_TIMEOUT_SECS";

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Extraction response: raw text, structured metadata, and the lexical
/// digest the extractor computed over the manuscript.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionOutput {
    pub raw_text: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub lexical_hash: String,
}

/// Rewrite response for a fix action. `similarity` is the provider's [0,1]
/// meaning-retention measure; the orchestrator scales it to [0,100].
#[derive(Debug, Clone, Deserialize)]
pub struct RewriteOutput {
    pub fixed_abstract: String,
    pub new_lexical_hash: String,
    pub new_semantic_hash: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Verified,
    NotFound,
    Mismatch,
    LowConfidence,
    Error,
}

/// Per-reference registry verdict, ordered as the submitted reference list.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceCheck {
    pub status: ReferenceStatus,
    pub original: String,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportKind {
    Docx,
    Report,
}

impl ExportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportKind::Docx => "docx",
            ExportKind::Report => "report",
        }
    }
}

pub trait ExtractionService {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> EngineResult<ExtractionOutput>;
}

pub trait RewriteService {
    fn fix_abstract(&self, abstract_text: &str, raw_text: &str) -> EngineResult<RewriteOutput>;
}

pub trait RegistryService {
    /// Bulk-verify the ordered reference list. The returned verdicts keep
    /// the input order and length so indices map back for in-place
    /// replacement.
    fn verify(&self, references: &[String]) -> EngineResult<Vec<ReferenceCheck>>;
}

pub trait ExportService {
    fn render(&self, kind: ExportKind, metadata: &Metadata, raw_text: &str)
        -> EngineResult<Vec<u8>>;
}

/// Backend endpoint configuration, resolved from the environment.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = BackendConfig::default();
        if let Ok(url) = env::var(BACKEND_URL_ENV) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.is_empty() {
                config.base_url = url;
            }
        }
        if let Ok(raw) = env::var(TIMEOUT_ENV) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{TIMEOUT_ENV} must be an integer, got {raw:?}"))?;
            if secs == 0 {
                anyhow::bail!("{TIMEOUT_ENV} must be greater than zero");
            }
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// HTTP implementation of all four collaborator traits.
pub struct HttpBackend {
    agent: Agent,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .into();
        HttpBackend {
            agent,
            base_url: config.base_url,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Ok(HttpBackend::new(BackendConfig::from_env()?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[derive(Serialize)]
struct RewriteRequest<'a> {
    #[serde(rename = "abstract")]
    abstract_text: &'a str,
    raw_text: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    references: &'a [String],
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    results: Vec<ReferenceCheck>,
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    metadata: &'a Metadata,
    raw_text: &'a str,
}

impl ExtractionService for HttpBackend {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> EngineResult<ExtractionOutput> {
        let mut response = self
            .agent
            .post(&self.url("/extract"))
            .query("file_name", file_name)
            .header("content-type", "application/octet-stream")
            .send(bytes)
            .map_err(|err| external("extraction", err))?;
        response
            .body_mut()
            .read_json::<ExtractionOutput>()
            .map_err(|err| invalid("extraction", err))
    }
}

impl RewriteService for HttpBackend {
    fn fix_abstract(&self, abstract_text: &str, raw_text: &str) -> EngineResult<RewriteOutput> {
        let mut response = self
            .agent
            .post(&self.url("/fix-abstract"))
            .send_json(RewriteRequest {
                abstract_text,
                raw_text,
            })
            .map_err(|err| external("rewrite", err))?;
        response
            .body_mut()
            .read_json::<RewriteOutput>()
            .map_err(|err| invalid("rewrite", err))
    }
}

impl RegistryService for HttpBackend {
    fn verify(&self, references: &[String]) -> EngineResult<Vec<ReferenceCheck>> {
        let mut response = self
            .agent
            .post(&self.url("/verify-crossref"))
            .send_json(VerifyRequest { references })
            .map_err(|err| external("registry", err))?;
        let parsed = response
            .body_mut()
            .read_json::<VerifyResponse>()
            .map_err(|err| invalid("registry", err))?;
        if parsed.results.len() != references.len() {
            return Err(EngineError::validation(
                "registry",
                format!(
                    "got {} result(s) for {} reference(s)",
                    parsed.results.len(),
                    references.len()
                ),
            ));
        }
        Ok(parsed.results)
    }
}

impl ExportService for HttpBackend {
    fn render(
        &self,
        kind: ExportKind,
        metadata: &Metadata,
        raw_text: &str,
    ) -> EngineResult<Vec<u8>> {
        let mut response = self
            .agent
            .post(&self.url(&format!("/export/{}", kind.as_str())))
            .send_json(ExportRequest { metadata, raw_text })
            .map_err(|err| external(kind.service_name(), err))?;
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(|err| invalid(kind.service_name(), err))?;
        if bytes.is_empty() {
            return Err(EngineError::validation(
                kind.service_name(),
                "rendered artifact is empty",
            ));
        }
        Ok(bytes)
    }
}

impl ExportKind {
    /// Error label naming the artifact type, per the export contract.
    fn service_name(self) -> &'static str {
        match self {
            ExportKind::Docx => "docx export",
            ExportKind::Report => "report export",
        }
    }
}

fn external(service: &'static str, err: ureq::Error) -> EngineError {
    EngineError::external(service, err.to_string())
}

fn invalid(service: &'static str, err: ureq::Error) -> EngineError {
    EngineError::validation(service, err.to_string())
}
