//! Command-level orchestration of the five-phase workflow.
//!
//! Each `run_*` function is one user action: load the Session Record, guard,
//! call at most one external collaborator, commit, persist, report. A failed
//! action never persists a partially updated record — mutation happens in
//! memory through the record's validated operations, and the staged store
//! only runs after they succeed.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::citations::{
    split_references, Choice, CitationCoordinator, ResolutionItem, STANDARDIZE_CITATIONS,
};
use crate::error::EngineError;
use crate::fixes::{self, FixOutcome, Notifier, FORMAT_STRUCTURAL_LAYOUT};
use crate::services::{
    ExportKind, ExportService, ExtractionService, RegistryService, RewriteService,
};
use crate::session::{self, Phase, SessionRecord};
use crate::util;

pub fn run_upload(
    session_dir: &Path,
    file: &Path,
    extraction: &dyn ExtractionService,
) -> Result<()> {
    if session::session_exists(session_dir) {
        bail!(
            "a session already exists in {} (run `mhub reset` to discard it)",
            session_dir.display()
        );
    }
    let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("manuscript");

    eprintln!("Extracting {file_name}...");
    let output = extraction.extract(file_name, &bytes)?;
    if output.raw_text.trim().is_empty() {
        return Err(EngineError::validation("extraction", "raw text is empty").into());
    }
    if output.lexical_hash.is_empty() {
        return Err(EngineError::validation("extraction", "lexical hash is missing").into());
    }

    let record = SessionRecord::new(
        file_name.to_string(),
        output.raw_text,
        output.metadata,
        output.lexical_hash,
    )?;
    session::store(session_dir, &record)?;

    tracing::info!(
        file = file_name,
        confidence = record.metadata.confidence(),
        "session created"
    );
    println!(
        "Uploaded {file_name}: phase {}, extraction confidence {}%",
        record.phase,
        record.metadata.confidence()
    );
    println!("Lexical original: {}", record.lexical.original);
    Ok(())
}

pub fn run_verify(session_dir: &Path) -> Result<()> {
    let mut record = session::load(session_dir)?;
    record.advance_to(Phase::Verifying)?;
    session::store(session_dir, &record)?;

    println!("Phase {}. Review the extracted structure:", record.phase);
    println!("  title:      {}", record.metadata.title);
    println!("  authors:    {}", record.metadata.authors);
    println!(
        "  abstract:   {}",
        util::truncate_string(&record.metadata.abstract_text, 120)
    );
    println!("  references: {}", record.metadata.references.len());
    println!("  confidence: {}%", record.metadata.confidence());
    println!("Correct any field with `mhub edit`, then `mhub confirm`.");
    Ok(())
}

/// Reviewer corrections to the extracted structure. Only supplied fields
/// change.
#[derive(Debug, Default)]
pub struct EditFields {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub abstract_text: Option<String>,
    pub headings: Option<String>,
    pub references_file: Option<PathBuf>,
}

pub fn run_edit(session_dir: &Path, fields: EditFields) -> Result<()> {
    let mut record = session::load(session_dir)?;
    record.require_phase(Phase::Verifying, "edit metadata")?;

    let mut metadata = record.metadata.clone();
    if let Some(title) = fields.title {
        metadata.title = title;
    }
    if let Some(authors) = fields.authors {
        metadata.authors = authors;
    }
    if let Some(abstract_text) = fields.abstract_text {
        metadata.abstract_text = abstract_text;
    }
    if let Some(headings) = fields.headings {
        metadata.headings = headings;
    }
    if let Some(path) = fields.references_file {
        let block = fs::read_to_string(&path)
            .with_context(|| format!("read references from {}", path.display()))?;
        metadata.references = split_references(&block);
    }

    if metadata == record.metadata {
        println!("No changes.");
        return Ok(());
    }
    record.commit_metadata(metadata)?;
    session::store(session_dir, &record)?;
    println!(
        "Metadata updated; current lexical: {}",
        record.lexical.current
    );
    Ok(())
}

pub fn run_confirm(session_dir: &Path) -> Result<()> {
    let mut record = session::load(session_dir)?;
    record.advance_to(Phase::CompliancePending)?;
    session::store(session_dir, &record)?;
    println!(
        "Structure confirmed; phase {}. Apply fixes, then `mhub finalize`.",
        record.phase
    );
    Ok(())
}

pub fn run_fix(
    session_dir: &Path,
    fix_name: &str,
    rewrite: &dyn RewriteService,
    notifier: &mut dyn Notifier,
) -> Result<()> {
    let mut record = session::load(session_dir)?;
    let outcome = fixes::apply_fix(&mut record, fix_name, rewrite, notifier)?;
    if outcome == FixOutcome::Applied {
        session::store(session_dir, &record)?;
        println!(
            "Semantic similarity after fix: {}%",
            record.semantic.similarity_score
        );
    }
    Ok(())
}

/// Run the interactive citation-resolution loop, reading one decision per
/// presented item from `input`. The record is persisted after every
/// committed decision so an aborted run never loses accepted suggestions.
pub fn run_citations(
    session_dir: &Path,
    registry: &dyn RegistryService,
    input: &mut dyn BufRead,
) -> Result<()> {
    let mut record = session::load(session_dir)?;
    let mut coordinator = CitationCoordinator::new();

    eprintln!("Verifying citations against the registry...");
    coordinator.start(&mut record, registry)?;
    session::store(session_dir, &record)?;

    while let Some((position, total, item)) = coordinator.current_item() {
        let item = item.clone();
        present_item(position, total, &item);
        let choice = read_choice(input, item.suggestion.is_some())?;
        coordinator.resolve(&mut record, choice)?;
        session::store(session_dir, &record)?;
    }

    println!("Citation standardization complete.");
    Ok(())
}

fn present_item(position: usize, total: usize, item: &ResolutionItem) {
    println!();
    println!("Resolve mismatch ({position} of {total})");
    println!("  detected:   {}", item.original);
    match &item.suggestion {
        Some(suggestion) => {
            let score = item
                .score
                .map(|score| format!(" (score {})", score.round()))
                .unwrap_or_default();
            println!("  suggestion{score}: {suggestion}");
        }
        None => println!("  suggestion: none with sufficient confidence"),
    }
}

fn read_choice(input: &mut dyn BufRead, has_suggestion: bool) -> Result<Choice> {
    loop {
        if has_suggestion {
            eprint!("[a]ccept suggestion / [k]eep original: ");
        } else {
            eprint!("[k]eep original: ");
        }
        let mut line = String::new();
        if input.read_line(&mut line).context("read decision")? == 0 {
            bail!("citation resolution aborted: input closed");
        }
        match line.trim().to_lowercase().as_str() {
            "a" | "accept" if has_suggestion => return Ok(Choice::Accept),
            "k" | "keep" => return Ok(Choice::Keep),
            other => eprintln!("unrecognized choice {other:?}"),
        }
    }
}

pub fn run_finalize(session_dir: &Path) -> Result<()> {
    let mut record = session::load(session_dir)?;
    record.advance_to(Phase::Finalized)?;
    session::store(session_dir, &record)?;

    println!("Phase {}. Integrity proofs:", record.phase);
    println!("  lexical original:  {}", record.lexical.original);
    println!("  lexical current:   {}", record.lexical.current);
    println!("  semantic original: {}", record.semantic.original);
    println!("  semantic current:  {}", record.semantic.current);
    println!("  similarity:        {}%", record.semantic.similarity_score);
    Ok(())
}

pub fn run_export(
    session_dir: &Path,
    out: &Path,
    kind: ExportKind,
    export: &dyn ExportService,
) -> Result<()> {
    let mut record = session::load(session_dir)?;
    // Guard up front so a wrong-phase call never hits the renderer.
    record.require_phase(Phase::Finalized, &format!("export {}", kind.as_str()))?;

    eprintln!("Rendering {} artifact...", kind.as_str());
    let artifact = export.render(kind, &record.metadata, &record.raw_text)?;
    fs::write(out, &artifact).with_context(|| format!("write {}", out.display()))?;

    record.advance_to(Phase::Exported)?;
    session::store(session_dir, &record)?;

    println!(
        "Wrote {} ({} bytes, sha256 {})",
        out.display(),
        artifact.len(),
        util::sha256_hex(&artifact)
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct ChecklistEntry {
    label: &'static str,
    passed: bool,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    phase: Phase,
    source_file: &'a str,
    confidence: u8,
    lexical_original: &'a str,
    lexical_current: &'a str,
    semantic_original: &'a str,
    semantic_current: &'a str,
    similarity_score: f64,
    references: usize,
    applied_fixes: &'a [String],
    checklist: Vec<ChecklistEntry>,
}

fn checklist(record: &SessionRecord) -> Vec<ChecklistEntry> {
    let citations = record.has_fix(STANDARDIZE_CITATIONS);
    let prose = record.has_fix(FORMAT_STRUCTURAL_LAYOUT);
    vec![
        ChecklistEntry {
            label: "Academic Integrity (Plagiarism)",
            passed: true,
            detail: "raw text immutable since upload",
        },
        ChecklistEntry {
            label: "Citation Style (IEEE)",
            passed: citations,
            detail: if citations {
                "all citations verified"
            } else {
                "citations need formatting verification"
            },
        },
        ChecklistEntry {
            label: "Prose Integrity",
            passed: prose,
            detail: if prose {
                "human prose preserved"
            } else {
                "pending structural fix"
            },
        },
        ChecklistEntry {
            label: "Proper Formatting (Margins/Fonts)",
            passed: true,
            detail: "handled by the renderer",
        },
    ]
}

pub fn run_status(session_dir: &Path, json: bool) -> Result<()> {
    if !session::session_exists(session_dir) {
        println!(
            "No active session in {} (run `mhub upload`).",
            session_dir.display()
        );
        return Ok(());
    }
    let record = session::load(session_dir)?;
    let view = StatusView {
        phase: record.phase,
        source_file: &record.source_file,
        confidence: record.metadata.confidence(),
        lexical_original: &record.lexical.original,
        lexical_current: &record.lexical.current,
        semantic_original: &record.semantic.original,
        semantic_current: &record.semantic.current,
        similarity_score: record.semantic.similarity_score,
        references: record.metadata.references.len(),
        applied_fixes: &record.applied_fixes,
        checklist: checklist(&record),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("serialize status")?
        );
        return Ok(());
    }

    println!("Session: {} ({})", view.source_file, view.phase);
    println!("  references:  {}", view.references);
    println!("  confidence:  {}%", view.confidence);
    println!(
        "  lexical:     {} -> {}",
        view.lexical_original, view.lexical_current
    );
    println!("  similarity:  {}%", view.similarity_score);
    for entry in &view.checklist {
        let mark = if entry.passed { "pass" } else { "warn" };
        println!("  [{mark}] {} ({})", entry.label, entry.detail);
    }
    if !view.applied_fixes.is_empty() {
        println!("  applied fixes: {}", view.applied_fixes.join(", "));
    }
    Ok(())
}

pub fn run_reset(session_dir: &Path) -> Result<()> {
    if session::reset(session_dir)? {
        println!("Session discarded.");
    } else {
        println!("No active session to discard.");
    }
    Ok(())
}
