use crate::commands::{
    run_audit, run_override, run_retry, run_status, run_upload, AuditArgs, OverrideArgs,
    RetryArgs, StatusArgs, UploadArgs,
};
use crate::demo::{run_demo, DemoArgs};
use crate::server;
use candidate_docs::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Candidate Document Verification",
    about = "Track, retry, and override candidate document verification from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Upload documents for a candidate and follow them until they settle
    Upload(UploadArgs),
    /// Show the verification status of a document
    Status(StatusArgs),
    /// Resubmit a rejected or failed document for verification
    Retry(RetryArgs),
    /// Force a rejected document to verified with admin credentials and a justification
    Override(OverrideArgs),
    /// Print the override audit trail
    Audit(AuditArgs),
    /// Run the whole verification flow against a simulated pipeline
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// CSV file that receives one row per confirmed override
    #[arg(long, default_value = crate::infra::DEFAULT_AUDIT_LOG)]
    pub(crate) audit_log: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| {
        Command::Serve(ServeArgs {
            audit_log: PathBuf::from(crate::infra::DEFAULT_AUDIT_LOG),
            ..ServeArgs::default()
        })
    });

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Upload(args) => run_upload(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Retry(args) => run_retry(args).await,
        Command::Override(args) => run_override(args).await,
        Command::Audit(args) => run_audit(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
