use crate::infra::{parse_date, read_audit_rows, remote_service, DEFAULT_AUDIT_LOG};
use candidate_docs::config::AppConfig;
use candidate_docs::error::AppError;
use candidate_docs::telemetry;
use candidate_docs::workflows::verification::{
    ActorCredential, CandidateId, CategoryOutcome, DocumentId, OverrideRequest, SyncReport,
    UploadFile, VerificationStatus,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::path::PathBuf;

const PASSWORD_ENV: &str = "OVERRIDE_PASSWORD";

#[derive(Args, Debug)]
pub(crate) struct UploadArgs {
    /// Candidate the documents belong to
    #[arg(long)]
    pub(crate) candidate: String,
    /// Files to upload (PDF, DOC, DOCX, JPEG, PNG, or plain text; 10 MiB each)
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct StatusArgs {
    /// Document identifier assigned by the pipeline
    pub(crate) document_id: String,
    /// Keep polling while the document is still processing
    #[arg(long)]
    pub(crate) watch: bool,
    /// Evaluate expiry as of this date (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct RetryArgs {
    /// Document identifier assigned by the pipeline
    pub(crate) document_id: String,
    /// Follow the document until the retry settles
    #[arg(long)]
    pub(crate) watch: bool,
}

#[derive(Args, Debug)]
pub(crate) struct OverrideArgs {
    /// Document identifier assigned by the pipeline
    pub(crate) document_id: String,
    /// Admin account used to re-authenticate
    #[arg(long)]
    pub(crate) email: String,
    /// Admin password; read from OVERRIDE_PASSWORD when omitted
    #[arg(long)]
    pub(crate) password: Option<String>,
    /// Why the rejection is being overridden (at least 10 characters)
    #[arg(long)]
    pub(crate) justification: String,
    /// CSV file that receives the audit row
    #[arg(long, default_value = DEFAULT_AUDIT_LOG)]
    pub(crate) audit_log: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct AuditArgs {
    /// CSV file written by `override` or `serve`
    #[arg(long, default_value = DEFAULT_AUDIT_LOG)]
    pub(crate) audit_log: PathBuf,
    /// Only show entries for this document
    #[arg(long)]
    pub(crate) document_id: Option<String>,
}

fn load_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

pub(crate) async fn run_upload(args: UploadArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = remote_service(&config, &PathBuf::from(DEFAULT_AUDIT_LOG))?;
    let candidate = CandidateId(args.candidate);

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = std::fs::read(path)?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(UploadFile::new(file_name, content_type, bytes));
    }

    let mut scope = service.sync_scope();
    for outcome in service.upload_all(&candidate, files).await {
        match outcome.result {
            Ok(tracked) => {
                println!("- {} -> {}", outcome.file_name, tracked.document.id);
                scope.spawn_status(tracked.document.id.clone());
                scope.spawn_category(tracked.document.id, candidate.clone());
            }
            Err(error) => {
                let facing = error.user_facing();
                println!("- {} failed: {}", outcome.file_name, facing.message);
                if let Some(detail) = facing.detail {
                    println!("  {detail}");
                }
            }
        }
    }

    while let Some(report) = scope.next_report().await {
        print_report(&report);
    }
    Ok(())
}

pub(crate) async fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = remote_service(&config, &PathBuf::from(DEFAULT_AUDIT_LOG))?;
    let document_id = DocumentId(args.document_id);
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());

    let tracked = service.refresh(&document_id).await?;
    if args.watch && tracked.document.verification_status == VerificationStatus::PendingAi {
        let mut scope = service.sync_scope();
        scope.spawn_status(document_id.clone());
        if let Some(report) = scope.next_report().await {
            print_report(&report);
        }
    }

    let view = service.status_view(&document_id, today).await?;
    print_json(&view);
    Ok(())
}

pub(crate) async fn run_retry(args: RetryArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = remote_service(&config, &PathBuf::from(DEFAULT_AUDIT_LOG))?;
    let document_id = DocumentId(args.document_id);

    let assessment = service.retry_eligibility(&document_id).await?;
    println!(
        "Retry budget: {}/{} used",
        assessment.retry_count, assessment.max_retries
    );

    let tracked = service.retry(&document_id).await?;
    println!(
        "Retry accepted; {} shows {} until the pipeline confirms",
        tracked.document.id,
        tracked.document.verification_status.label()
    );

    if args.watch {
        let mut scope = service.sync_scope();
        scope.spawn_status(document_id);
        if let Some(report) = scope.next_report().await {
            print_report(&report);
        }
    }
    Ok(())
}

pub(crate) async fn run_override(args: OverrideArgs) -> Result<(), AppError> {
    let config = load_config()?;
    let service = remote_service(&config, &args.audit_log)?;
    let password = args
        .password
        .or_else(|| std::env::var(PASSWORD_ENV).ok())
        .unwrap_or_default();

    let request = OverrideRequest {
        document_id: DocumentId(args.document_id),
        credential: ActorCredential::new(args.email, password),
        justification: args.justification,
    };
    let receipt = service.request_override(request).await?;
    println!(
        "{} overridden to {} by {} (was {})",
        receipt.document.document.id,
        receipt.document.document.verification_status.label(),
        receipt.audit.actor,
        receipt.audit.prior_code
    );
    println!("Audit entry written to {}", args.audit_log.display());
    Ok(())
}

pub(crate) fn run_audit(args: AuditArgs) -> Result<(), AppError> {
    let rows = read_audit_rows(&args.audit_log, args.document_id.as_deref())?;
    if rows.is_empty() {
        println!("No overrides recorded");
        return Ok(());
    }
    for row in rows {
        let field = |index: usize| row.get(index).unwrap_or("-");
        println!(
            "- {} | {} | {} | was {} | {}",
            field(2),
            field(0),
            field(1),
            field(4),
            field(3)
        );
    }
    Ok(())
}

pub(crate) fn print_report(report: &SyncReport) {
    match report {
        SyncReport::Status {
            document_id,
            outcome,
        } => println!("  {document_id}: {}", outcome.summary()),
        SyncReport::Category {
            document_id,
            outcome,
        } => println!("  {document_id}: {}", describe_category(outcome)),
    }
}

pub(crate) fn describe_category(outcome: &CategoryOutcome) -> String {
    match outcome {
        CategoryOutcome::Extracted { .. } => "classified as CV; profile extracted".to_string(),
        CategoryOutcome::ExtractionFailed { error, .. } => {
            format!("classified as CV but extraction failed: {error}")
        }
        CategoryOutcome::NotCv {
            attempts, category, ..
        } => match category {
            Some(category) => format!("classified as {}; no extraction needed", category.label()),
            None => format!("not classified after {attempts} checks; extraction skipped"),
        },
        CategoryOutcome::FetchFailed(error) => format!("category check failed: {error}"),
        CategoryOutcome::TimedOut { operation, after } => {
            format!("{operation} timed out after {}s", after.as_secs())
        }
        CategoryOutcome::Cancelled => "category check cancelled".to_string(),
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("status payload unavailable: {err}"),
    }
}
