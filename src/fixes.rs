//! Compliance Fix Orchestrator.
//!
//! A fix action delegates to the rewrite collaborator and then commits the
//! replacement abstract, both current fingerprints, and the scaled
//! similarity score as one update. The Session Record is never observable
//! with the text changed but the fingerprints stale (or vice versa): every
//! validation runs against the tentative response before the first field is
//! assigned, and any failure discards the whole update.

use crate::error::{EngineError, EngineResult};
use crate::fingerprint;
use crate::services::RewriteService;
use crate::session::{Phase, SessionRecord};

/// The abstract-rewrite fix offered on the compliance checklist.
pub const FORMAT_STRUCTURAL_LAYOUT: &str = "Format Structural Layout Only";

/// Sink for the ephemeral status lines a fix emits (start, success,
/// failure). These are UI state, never part of the Session Record.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

/// Default notifier: progress lines on stderr, like every other command.
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixOutcome {
    Applied,
    /// The fix was already on the checklist; repeating it is a warning-level
    /// no-op.
    AlreadyApplied,
}

pub fn apply_fix(
    session: &mut SessionRecord,
    fix_name: &str,
    rewrite: &dyn RewriteService,
    notifier: &mut dyn Notifier,
) -> EngineResult<FixOutcome> {
    session.require_phase(Phase::CompliancePending, &format!("apply fix {fix_name:?}"))?;

    if session.has_fix(fix_name) {
        tracing::warn!(fix = fix_name, "fix already applied, skipping");
        notifier.notify(&format!("Already applied: {fix_name}"));
        return Ok(FixOutcome::AlreadyApplied);
    }

    notifier.notify(&format!("Processing: {fix_name}..."));
    let outcome = rewrite.fix_abstract(&session.metadata.abstract_text, &session.raw_text);
    let output = match outcome {
        Ok(output) => output,
        Err(err) => {
            notifier.notify(&format!("Error applying: {fix_name}"));
            return Err(err);
        }
    };

    if let Err(err) = validate_rewrite(&output.fixed_abstract, output.similarity) {
        notifier.notify(&format!("Error applying: {fix_name}"));
        return Err(err);
    }
    let score = fingerprint::round2(output.similarity * 100.0);

    // Single committed update: abstract, both fingerprints, score, checklist.
    session.metadata.abstract_text = output.fixed_abstract;
    session.lexical.current = output.new_lexical_hash;
    session.semantic.current = output.new_semantic_hash;
    session.semantic.similarity_score = score;
    session.record_fix(fix_name);

    tracing::info!(
        fix = fix_name,
        similarity_score = score,
        "fix committed"
    );
    notifier.notify(&format!("Applied: {fix_name}"));
    Ok(FixOutcome::Applied)
}

fn validate_rewrite(fixed_abstract: &str, similarity: f64) -> EngineResult<()> {
    if fixed_abstract.trim().is_empty() {
        return Err(EngineError::validation(
            "rewrite",
            "fixed abstract is empty",
        ));
    }
    if fingerprint::canonicalize(fixed_abstract).is_err() {
        return Err(EngineError::validation(
            "rewrite",
            "fixed abstract failed canonicalization",
        ));
    }
    if !(0.0..=1.0).contains(&similarity) || !similarity.is_finite() {
        return Err(EngineError::validation(
            "rewrite",
            format!("similarity {similarity} outside [0, 1]"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RewriteOutput;
    use crate::session;

    struct RecordingNotifier(Vec<String>);

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, message: &str) {
            self.0.push(message.to_string());
        }
    }

    struct FixedRewrite(RewriteOutput);

    impl RewriteService for FixedRewrite {
        fn fix_abstract(&self, _abstract_text: &str, _raw_text: &str) -> EngineResult<RewriteOutput> {
            Ok(self.0.clone())
        }
    }

    struct FailingRewrite;

    impl RewriteService for FailingRewrite {
        fn fix_abstract(&self, _abstract_text: &str, _raw_text: &str) -> EngineResult<RewriteOutput> {
            Err(EngineError::external("rewrite", "request timed out"))
        }
    }

    fn compliance_session() -> SessionRecord {
        let mut record = session::tests::uploaded_record();
        record.advance_to(Phase::Verifying).expect("verify");
        record.advance_to(Phase::CompliancePending).expect("confirm");
        record
    }

    fn rewrite_output() -> RewriteOutput {
        RewriteOutput {
            fixed_abstract: "B".to_string(),
            new_lexical_hash: "h1".to_string(),
            new_semantic_hash: "s1".to_string(),
            similarity: 0.998,
        }
    }

    #[test]
    fn successful_fix_commits_everything_from_the_same_response() {
        let mut record = compliance_session();
        let mut notifier = RecordingNotifier(Vec::new());
        let outcome = apply_fix(
            &mut record,
            FORMAT_STRUCTURAL_LAYOUT,
            &FixedRewrite(rewrite_output()),
            &mut notifier,
        )
        .expect("apply");

        assert_eq!(outcome, FixOutcome::Applied);
        assert_eq!(record.metadata.abstract_text, "B");
        assert_eq!(record.lexical.current, "h1");
        assert_eq!(record.semantic.current, "s1");
        assert_eq!(record.semantic.similarity_score, 99.8);
        assert_eq!(record.applied_fixes, vec![FORMAT_STRUCTURAL_LAYOUT.to_string()]);
        assert_eq!(
            notifier.0,
            vec![
                format!("Processing: {FORMAT_STRUCTURAL_LAYOUT}..."),
                format!("Applied: {FORMAT_STRUCTURAL_LAYOUT}"),
            ]
        );
    }

    #[test]
    fn failed_rewrite_call_leaves_the_record_untouched() {
        let mut record = compliance_session();
        let before = record.clone();
        let mut notifier = RecordingNotifier(Vec::new());
        let err = apply_fix(
            &mut record,
            FORMAT_STRUCTURAL_LAYOUT,
            &FailingRewrite,
            &mut notifier,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::ExternalService { .. }));
        assert_eq!(record, before);
        assert_eq!(
            notifier.0.last().map(String::as_str),
            Some(format!("Error applying: {FORMAT_STRUCTURAL_LAYOUT}").as_str())
        );
    }

    #[test]
    fn empty_fixed_abstract_is_a_validation_error_and_commits_nothing() {
        let mut record = compliance_session();
        let before = record.clone();
        let mut output = rewrite_output();
        output.fixed_abstract = "   ".to_string();
        let err = apply_fix(
            &mut record,
            FORMAT_STRUCTURAL_LAYOUT,
            &FixedRewrite(output),
            &mut StderrNotifier,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn out_of_range_similarity_is_rejected() {
        let mut record = compliance_session();
        let mut output = rewrite_output();
        output.similarity = 1.7;
        assert!(apply_fix(
            &mut record,
            FORMAT_STRUCTURAL_LAYOUT,
            &FixedRewrite(output),
            &mut StderrNotifier,
        )
        .is_err());
        assert!(record.applied_fixes.is_empty());
    }

    #[test]
    fn repeated_fix_is_an_idempotent_warning() {
        let mut record = compliance_session();
        let rewrite = FixedRewrite(rewrite_output());
        let mut notifier = RecordingNotifier(Vec::new());
        apply_fix(&mut record, FORMAT_STRUCTURAL_LAYOUT, &rewrite, &mut notifier).expect("first");
        let after_first = record.clone();

        let outcome =
            apply_fix(&mut record, FORMAT_STRUCTURAL_LAYOUT, &rewrite, &mut notifier).expect("repeat");
        assert_eq!(outcome, FixOutcome::AlreadyApplied);
        assert_eq!(record, after_first);
    }

    #[test]
    fn fixes_are_rejected_outside_compliance_pending() {
        let mut record = session::tests::uploaded_record();
        let err = apply_fix(
            &mut record,
            FORMAT_STRUCTURAL_LAYOUT,
            &FixedRewrite(rewrite_output()),
            &mut StderrNotifier,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::PhaseGuard { .. }));
        assert_eq!(record.phase, Phase::Uploaded);
    }
}
