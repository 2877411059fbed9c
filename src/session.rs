//! The Session Record: the single mutable aggregate for one manuscript pass.
//!
//! The record is the de-facto wire contract between phases, so it is
//! schema-versioned JSON on disk and every mutation goes through a named,
//! validated operation. Two invariants hold at all times:
//!
//! - the current fingerprints are always derived from the content exactly as
//!   last committed (never an intermediate state), and
//! - the phase only moves forward one step at a time, and only when that
//!   phase's exit condition holds.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::citations::STANDARDIZE_CITATIONS;
use crate::error::{EngineError, EngineResult};
use crate::fingerprint;

pub const SESSION_SCHEMA_VERSION: u32 = 1;

const SESSION_FILE: &str = "session.json";

/// The five ordered workflow phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Uploaded,
    Verifying,
    CompliancePending,
    Finalized,
    Exported,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Uploaded => "uploaded",
            Phase::Verifying => "verifying",
            Phase::CompliancePending => "compliance-pending",
            Phase::Finalized => "finalized",
            Phase::Exported => "exported",
        }
    }

    fn next(self) -> Option<Phase> {
        match self {
            Phase::Uploaded => Some(Phase::Verifying),
            Phase::Verifying => Some(Phase::CompliancePending),
            Phase::CompliancePending => Some(Phase::Finalized),
            Phase::Finalized => Some(Phase::Exported),
            Phase::Exported => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Extracted manuscript structure, verified and corrected by the reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub headings: String,
    #[serde(default)]
    pub references: Vec<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.authors.trim().is_empty()
            && self.abstract_text.trim().is_empty()
            && self.headings.trim().is_empty()
            && self.references.is_empty()
    }

    /// Extraction-confidence heuristic: how plausible the extracted structure
    /// looks before the reviewer has touched it. Clamped to [10, 100].
    pub fn confidence(&self) -> u8 {
        let mut confidence: i32 = 100;
        if self.title.trim().len() < 5 {
            confidence -= 25;
        }
        if self.authors.trim().len() < 3 {
            confidence -= 15;
        }
        if self.abstract_text.trim().len() < 40 {
            confidence -= 30;
        }
        if self.references.is_empty() {
            confidence -= 15;
        }
        if self.headings.trim().is_empty() {
            confidence -= 10;
        }
        confidence.clamp(10, 100) as u8
    }
}

/// Exact-content digest pair: `original` fixed at upload, `current` tracking
/// every committed mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexicalFingerprint {
    pub original: String,
    pub current: String,
}

/// Locality-sensitive signature pair plus the [0,100] similarity of current
/// to original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticFingerprint {
    pub original: String,
    pub current: String,
    pub similarity_score: f64,
}

impl Default for SemanticFingerprint {
    fn default() -> Self {
        SemanticFingerprint {
            original: String::new(),
            current: String::new(),
            similarity_score: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub schema_version: u32,
    pub phase: Phase,
    pub source_file: String,
    pub raw_text: String,
    pub metadata: Metadata,
    pub lexical: LexicalFingerprint,
    pub semantic: SemanticFingerprint,
    #[serde(default)]
    pub applied_fixes: Vec<String>,
}

impl SessionRecord {
    /// Create the record at Uploaded with original fingerprints set once.
    /// The lexical original comes from the extraction response; the semantic
    /// original is computed here over the same tracked content.
    pub fn new(
        source_file: String,
        raw_text: String,
        metadata: Metadata,
        lexical_original: String,
    ) -> EngineResult<Self> {
        let semantic = fingerprint::semantic_signature(&integrity_text(&raw_text, &metadata))?;
        let signature = semantic.to_string();
        Ok(SessionRecord {
            schema_version: SESSION_SCHEMA_VERSION,
            phase: Phase::Uploaded,
            source_file,
            raw_text,
            metadata,
            lexical: LexicalFingerprint {
                original: lexical_original.clone(),
                current: lexical_original,
            },
            semantic: SemanticFingerprint {
                original: signature.clone(),
                current: signature,
                similarity_score: 100.0,
            },
            applied_fixes: Vec::new(),
        })
    }

    /// Advance the phase by exactly one step, validating that phase's exit
    /// condition first. A blocked advance reports the unmet condition and
    /// changes nothing.
    pub fn advance_to(&mut self, target: Phase) -> EngineResult<()> {
        let action = format!("advance to {target}");
        match self.phase.next() {
            Some(next) if next == target => {}
            Some(next) => {
                return Err(EngineError::phase_guard(
                    self.phase,
                    action,
                    format!("phase advances one step at a time (next is {next})"),
                ));
            }
            None => {
                return Err(EngineError::phase_guard(
                    self.phase,
                    action,
                    "the workflow is already exported",
                ));
            }
        }
        if let Some(condition) = self.blocked_condition(target) {
            return Err(EngineError::phase_guard(self.phase, action, condition));
        }
        self.phase = target;
        Ok(())
    }

    fn blocked_condition(&self, target: Phase) -> Option<String> {
        match target {
            Phase::Verifying => {
                if self.raw_text.trim().is_empty() {
                    return Some("extracted raw text is empty".to_string());
                }
                if self.metadata.is_empty() {
                    return Some("extracted metadata is empty".to_string());
                }
                if self.lexical.original.is_empty() {
                    return Some("original lexical fingerprint is not set".to_string());
                }
                None
            }
            // Unconditional once the reviewer confirms.
            Phase::CompliancePending => None,
            Phase::Finalized => {
                let standardized = self.has_fix(STANDARDIZE_CITATIONS);
                if !standardized && !self.metadata.references.is_empty() {
                    return Some(format!(
                        "{} unresolved reference(s); run the citation check to completion",
                        self.metadata.references.len()
                    ));
                }
                None
            }
            Phase::Exported => {
                if self.lexical.current.is_empty() || self.semantic.current.is_empty() {
                    return Some("current fingerprints are not present".to_string());
                }
                None
            }
            Phase::Uploaded => Some("upload creates the session; it is never advanced to".into()),
        }
    }

    /// Guard for non-advancing operations that are only legal in one phase.
    pub fn require_phase(&self, required: Phase, action: &str) -> EngineResult<()> {
        if self.phase != required {
            return Err(EngineError::phase_guard(
                self.phase,
                action,
                format!("only allowed in phase {required}"),
            ));
        }
        Ok(())
    }

    /// Commit a metadata mutation together with freshly computed current
    /// fingerprints, as a single update. Both fingerprints and the
    /// similarity score are derived from the tentative content before any
    /// field is assigned, so a failure leaves the record untouched.
    pub fn commit_metadata(&mut self, metadata: Metadata) -> EngineResult<()> {
        let text = integrity_text(&self.raw_text, &metadata);
        let lexical = fingerprint::lexical_digest(&integrity_parts(&self.raw_text, &metadata))?;
        let signature = fingerprint::semantic_signature(&text)?;
        let score = fingerprint::similarity(
            fingerprint::parse_signature(&self.semantic.original),
            signature,
        );
        self.metadata = metadata;
        self.lexical.current = lexical;
        self.semantic.current = signature.to_string();
        self.semantic.similarity_score = score;
        Ok(())
    }

    pub fn has_fix(&self, name: &str) -> bool {
        self.applied_fixes.iter().any(|fix| fix == name)
    }

    /// Append a fix name to the checklist. Append-only; repeats are ignored.
    pub fn record_fix(&mut self, name: &str) {
        if !self.has_fix(name) {
            self.applied_fixes.push(name.to_string());
        }
    }
}

/// Tracked content as one text block, for the semantic signature.
fn integrity_text(raw_text: &str, metadata: &Metadata) -> String {
    let mut parts = vec![
        raw_text,
        &metadata.title,
        &metadata.authors,
        &metadata.abstract_text,
        &metadata.headings,
    ];
    parts.extend(metadata.references.iter().map(String::as_str));
    parts.join("\n")
}

/// Tracked content as ordered parts, for the length-framed lexical digest.
fn integrity_parts<'a>(raw_text: &'a str, metadata: &'a Metadata) -> Vec<&'a str> {
    let mut parts = vec![
        raw_text,
        metadata.title.as_str(),
        metadata.authors.as_str(),
        metadata.abstract_text.as_str(),
        metadata.headings.as_str(),
    ];
    parts.extend(metadata.references.iter().map(String::as_str));
    parts
}

pub fn session_path(session_dir: &Path) -> PathBuf {
    session_dir.join(SESSION_FILE)
}

pub fn session_exists(session_dir: &Path) -> bool {
    session_path(session_dir).is_file()
}

pub fn load(session_dir: &Path) -> Result<SessionRecord> {
    let path = session_path(session_dir);
    let bytes = fs::read(&path).with_context(|| {
        format!(
            "read {} (no active session? run `mhub upload` first)",
            path.display()
        )
    })?;
    let record: SessionRecord =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    if record.schema_version != SESSION_SCHEMA_VERSION {
        bail!(
            "unsupported session schema {} in {} (expected {})",
            record.schema_version,
            path.display(),
            SESSION_SCHEMA_VERSION
        );
    }
    Ok(record)
}

/// Write the record staged: serialize to a sibling temp file, then rename
/// into place. A crash mid-write never leaves a half-written record.
pub fn store(session_dir: &Path, record: &SessionRecord) -> Result<()> {
    fs::create_dir_all(session_dir)
        .with_context(|| format!("create {}", session_dir.display()))?;
    let path = session_path(session_dir);
    let bytes = serde_json::to_vec_pretty(record).context("serialize session record")?;
    let tmp_path = session_dir.join(format!(".{SESSION_FILE}.tmp"));
    fs::write(&tmp_path, &bytes).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("publish {}", path.display()))?;
    Ok(())
}

/// Discard the entire record, returning to the pre-upload state. Always
/// available, unconditional.
pub fn reset(session_dir: &Path) -> Result<bool> {
    let path = session_path(session_dir);
    if !path.is_file() {
        return Ok(false);
    }
    fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
    Ok(true)
}
