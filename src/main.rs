use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod citations;
mod cli;
mod error;
mod fingerprint;
mod fixes;
mod services;
mod session;
mod util;
mod workflow;

use cli::{Command, RootArgs};
use fixes::StderrNotifier;
use services::HttpBackend;
use workflow::EditFields;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        tracing::error!("{err}");
        for cause in err.chain().skip(1) {
            tracing::error!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = RootArgs::parse();

    match args.command {
        Command::Upload(upload) => {
            let backend = HttpBackend::from_env()?;
            workflow::run_upload(&upload.session, &upload.file, &backend)
        }
        Command::Verify(verify) => workflow::run_verify(&verify.session),
        Command::Edit(edit) => workflow::run_edit(
            &edit.session,
            EditFields {
                title: edit.title,
                authors: edit.authors,
                abstract_text: edit.abstract_text,
                headings: edit.headings,
                references_file: edit.references_file,
            },
        ),
        Command::Confirm(confirm) => workflow::run_confirm(&confirm.session),
        Command::Fix(fix) => {
            let backend = HttpBackend::from_env()?;
            workflow::run_fix(&fix.session, &fix.name, &backend, &mut StderrNotifier)
        }
        Command::Citations(citations) => {
            let backend = HttpBackend::from_env()?;
            let stdin = std::io::stdin();
            workflow::run_citations(&citations.session, &backend, &mut stdin.lock())
        }
        Command::Finalize(finalize) => workflow::run_finalize(&finalize.session),
        Command::Export(export) => {
            let backend = HttpBackend::from_env()?;
            workflow::run_export(&export.session, &export.out, export.kind, &backend)
        }
        Command::Status(status) => workflow::run_status(&status.session, status.json),
        Command::Reset(reset) => workflow::run_reset(&reset.session),
    }
}
