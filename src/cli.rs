//! CLI argument parsing for the manuscript workflow.
//!
//! The CLI is intentionally thin: it wires a deterministic phase loop without
//! embedding policy, so the same core logic can be reused elsewhere.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::fixes::FORMAT_STRUCTURAL_LAYOUT;
use crate::services::ExportKind;

/// Root CLI entrypoint for the manuscript compliance workflow.
///
/// Keeping a single `RootArgs` type makes command routing obvious and avoids
/// hidden defaults in subcommand constructors.
#[derive(Parser, Debug)]
#[command(
    name = "mhub",
    version,
    about = "Document integrity and compliance workflow for manuscripts",
    after_help = "Commands:\n  upload --session <dir> --file <doc>   Extract a manuscript and open a session\n  verify --session <dir>                Enter structure review\n  edit --session <dir> [fields]         Correct extracted metadata\n  confirm --session <dir>               Confirm structure, enter compliance\n  fix --session <dir> [--name <fix>]    Apply a compliance fix via the rewrite service\n  citations --session <dir>             Verify and resolve citations interactively\n  finalize --session <dir>              Lock the manuscript for export\n  export --session <dir> --out <file>   Render the finalized artifact\n  status --session <dir> [--json]       Summarize the session and checklist\n  reset --session <dir>                 Discard the session\n\nExamples:\n  mhub upload --session /tmp/paper --file draft.docx\n  mhub verify --session /tmp/paper\n  mhub edit --session /tmp/paper --title \"Corrected Title\"\n  mhub confirm --session /tmp/paper\n  mhub fix --session /tmp/paper\n  mhub citations --session /tmp/paper\n  mhub finalize --session /tmp/paper\n  mhub export --session /tmp/paper --out paper.pdf --kind report\n  mhub status --session /tmp/paper --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level workflow commands, one per user action.
#[derive(Subcommand, Debug)]
pub enum Command {
    Upload(UploadArgs),
    Verify(VerifyArgs),
    Edit(EditArgs),
    Confirm(ConfirmArgs),
    Fix(FixArgs),
    Citations(CitationsArgs),
    Finalize(FinalizeArgs),
    Export(ExportArgs),
    Status(StatusArgs),
    Reset(ResetArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Extract a manuscript and open a session")]
pub struct UploadArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Manuscript file to upload (sent to the extraction service)
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Enter structure review for the extracted manuscript")]
pub struct VerifyArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Correct extracted metadata during structure review")]
pub struct EditArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Replace the extracted title
    #[arg(long, value_name = "TEXT")]
    pub title: Option<String>,

    /// Replace the extracted author line
    #[arg(long, value_name = "TEXT")]
    pub authors: Option<String>,

    /// Replace the extracted abstract
    #[arg(long = "abstract", value_name = "TEXT")]
    pub abstract_text: Option<String>,

    /// Replace the extracted heading outline
    #[arg(long, value_name = "TEXT")]
    pub headings: Option<String>,

    /// Replace the reference list from a text file (one block, split on
    /// reference boundaries)
    #[arg(long, value_name = "FILE")]
    pub references_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Confirm the structure and enter compliance review")]
pub struct ConfirmArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Apply a compliance fix via the rewrite service")]
pub struct FixArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Name of the fix to apply
    #[arg(long, value_name = "NAME", default_value = FORMAT_STRUCTURAL_LAYOUT)]
    pub name: String,
}

#[derive(Parser, Debug)]
#[command(about = "Verify citations against the registry and resolve mismatches")]
pub struct CitationsArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Lock the manuscript for export")]
pub struct FinalizeArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Render the finalized manuscript to an artifact")]
pub struct ExportArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Output path for the rendered artifact
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Artifact kind to render
    #[arg(long, value_enum, default_value_t = ExportKind::Report)]
    pub kind: ExportKind,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize the session phase, fingerprints, and checklist")]
pub struct StatusArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Discard the session")]
pub struct ResetArgs {
    /// Session directory holding session.json
    #[arg(long, value_name = "DIR")]
    pub session: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn upload_parses_session_and_file() {
        let args = RootArgs::parse_from([
            "mhub", "upload", "--session", "/tmp/s", "--file", "draft.docx",
        ]);
        match args.command {
            Command::Upload(upload) => {
                assert_eq!(upload.session, PathBuf::from("/tmp/s"));
                assert_eq!(upload.file, PathBuf::from("draft.docx"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn fix_defaults_to_the_structural_layout_fix() {
        let args = RootArgs::parse_from(["mhub", "fix", "--session", "/tmp/s"]);
        match args.command {
            Command::Fix(fix) => assert_eq!(fix.name, FORMAT_STRUCTURAL_LAYOUT),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn export_kind_accepts_docx_and_report() {
        for (raw, kind) in [("docx", ExportKind::Docx), ("report", ExportKind::Report)] {
            let args = RootArgs::parse_from([
                "mhub", "export", "--session", "/tmp/s", "--out", "a.bin", "--kind", raw,
            ]);
            match args.command {
                Command::Export(export) => assert_eq!(export.kind, kind),
                other => panic!("unexpected command: {other:?}"),
            }
        }
    }

    #[test]
    fn edit_with_no_fields_still_parses() {
        let args = RootArgs::parse_from(["mhub", "edit", "--session", "/tmp/s"]);
        match args.command {
            Command::Edit(edit) => {
                assert!(edit.title.is_none());
                assert!(edit.references_file.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
