//! Citation Resolution Coordinator.
//!
//! Runs the interactive, one-at-a-time mismatch-resolution loop against the
//! bibliographic registry. A run bulk-verifies the ordered reference list,
//! filters the verdicts down to the ones needing a human decision, and then
//! presents them strictly sequentially. Accepting a suggestion splices it
//! into the reference list at the item's original position and refreshes the
//! current fingerprints; keeping leaves the reference as detected. The run
//! ends in Done (earning the `Standardize Citations` checklist entry) or
//! falls back to Idle if the registry call fails.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{EngineError, EngineResult};
use crate::services::{ReferenceCheck, ReferenceStatus, RegistryService};
use crate::session::{Phase, SessionRecord};

/// Checklist entry earned by a resolution run reaching Done.
pub const STANDARDIZE_CITATIONS: &str = "Standardize Citations";

/// One registry verdict that needs a human decision. Transient: exists only
/// during an active run and is discarded once resolved.
#[derive(Debug, Clone)]
pub struct ResolutionItem {
    /// Position in the session's reference list, for in-place replacement.
    pub original_index: usize,
    pub original: String,
    pub suggestion: Option<String>,
    pub score: Option<f64>,
    pub status: ReferenceStatus,
}

#[derive(Debug, Clone)]
pub enum ResolutionState {
    Idle,
    Checking,
    Resolving {
        items: Vec<ResolutionItem>,
        index: usize,
    },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Accept,
    Keep,
}

pub struct CitationCoordinator {
    state: ResolutionState,
}

impl Default for CitationCoordinator {
    fn default() -> Self {
        CitationCoordinator::new()
    }
}

impl CitationCoordinator {
    pub fn new() -> Self {
        CitationCoordinator {
            state: ResolutionState::Idle,
        }
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ResolutionState::Done)
    }

    /// The item currently awaiting a decision, with its 1-based position and
    /// the run's total count.
    pub fn current_item(&self) -> Option<(usize, usize, &ResolutionItem)> {
        match &self.state {
            ResolutionState::Resolving { items, index } => {
                items.get(*index).map(|item| (*index + 1, items.len(), item))
            }
            _ => None,
        }
    }

    /// Start a run: bulk-verify the reference list and enter Resolving on
    /// the first filtered item, or go straight to Done when there is nothing
    /// to resolve. A registry failure returns the coordinator to Idle with
    /// the checklist entry unearned.
    pub fn start(
        &mut self,
        session: &mut SessionRecord,
        registry: &dyn RegistryService,
    ) -> EngineResult<()> {
        session.require_phase(Phase::CompliancePending, "standardize citations")?;
        if !matches!(self.state, ResolutionState::Idle) {
            return Err(EngineError::validation(
                "citation resolution",
                "a resolution run is already active",
            ));
        }

        if session.metadata.references.is_empty() {
            tracing::info!("no references to verify");
            self.complete(session);
            return Ok(());
        }

        self.state = ResolutionState::Checking;
        let results = match registry.verify(&session.metadata.references) {
            Ok(results) => results,
            Err(err) => {
                self.state = ResolutionState::Idle;
                return Err(err);
            }
        };

        let items = filter_mismatches(&results);
        tracing::info!(
            references = results.len(),
            mismatches = items.len(),
            "registry verification complete"
        );
        if items.is_empty() {
            self.complete(session);
        } else {
            self.state = ResolutionState::Resolving { items, index: 0 };
        }
        Ok(())
    }

    /// Apply one human decision to the presented item and move on. Exactly N
    /// decisions take a run with N filtered items from Resolving(0) to Done.
    pub fn resolve(&mut self, session: &mut SessionRecord, choice: Choice) -> EngineResult<()> {
        let ResolutionState::Resolving { items, index } = &self.state else {
            return Err(EngineError::validation(
                "citation resolution",
                "no item is awaiting a decision",
            ));
        };
        let item = &items[*index];

        if choice == Choice::Accept {
            let Some(suggestion) = item.suggestion.clone() else {
                return Err(EngineError::validation(
                    "citation resolution",
                    "this item has no suggestion to accept",
                ));
            };
            let mut metadata = session.metadata.clone();
            metadata.references[item.original_index] = suggestion;
            session.commit_metadata(metadata)?;
        }

        let next = index + 1;
        match &mut self.state {
            ResolutionState::Resolving { items, index } if next < items.len() => {
                *index = next;
            }
            _ => self.complete(session),
        }
        Ok(())
    }

    fn complete(&mut self, session: &mut SessionRecord) {
        self.state = ResolutionState::Done;
        session.record_fix(STANDARDIZE_CITATIONS);
    }
}

/// Keep the verdicts that need a decision, preserving original list order
/// and index correspondence. `verified`, `not_found`, and `error` verdicts
/// are never presented.
fn filter_mismatches(results: &[ReferenceCheck]) -> Vec<ResolutionItem> {
    results
        .iter()
        .enumerate()
        .filter(|(_, check)| {
            matches!(
                check.status,
                ReferenceStatus::Mismatch | ReferenceStatus::LowConfidence
            )
        })
        .map(|(original_index, check)| ResolutionItem {
            original_index,
            original: check.original.clone(),
            suggestion: check.suggestion.clone(),
            score: check.score,
            status: check.status,
        })
        .collect()
}

/// Split a pasted bibliography block into an ordered reference list.
///
/// Splits on numbered items (`[1]`, `1.`), an author-year line start
/// (`Name, A. (2020)`), or blank lines; fragments of 15 characters or fewer
/// are dropped as noise.
pub fn split_references(block: &str) -> Vec<String> {
    static START: OnceLock<Regex> = OnceLock::new();
    let start = START.get_or_init(|| {
        Regex::new(r"^(?:\[\d+\]|\d+\.|[A-Z][a-z]+,?\s+[A-Z]\.?\s*\(?\d{4}\)?)")
            .unwrap_or_else(|err| panic!("reference start regex: {err}"))
    });

    let mut references = Vec::new();
    let mut current = String::new();
    let mut flush = |current: &mut String| {
        if current.len() > 15 {
            references.push(current.clone());
        }
        current.clear();
    };
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || start.is_match(line) {
            flush(&mut current);
        }
        if !line.is_empty() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(line);
        }
    }
    flush(&mut current);
    references
}
