use crate::commands::{print_json, print_report};
use crate::infra::parse_date;
use async_trait::async_trait;
use candidate_docs::config::{PipelineConfig, SyncConfig};
use candidate_docs::error::AppError;
use candidate_docs::workflows::verification::{
    ActorCredential, AuthenticatedActor, CandidateId, Document, DocumentCategory,
    DocumentId, DocumentVerificationService, ExtractionResult, GatewayError, IdentityVerifier,
    MemoryAuditLog, OverrideRequest, OverrideStamp, Rejection, RejectionCode, ReprocessAck, Role,
    UploadFile, VerificationGateway, VerificationSource, VerificationStatus,
};
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const DEMO_ADMIN: &str = "admin@agency.example";
const DEMO_STAFF: &str = "recruiter@agency.example";
const DEMO_PASSWORD: &str = "demo-password";
/// Status fetches a simulated document spends in `pending_ai` before settling.
const SIMULATED_POLLS: u32 = 2;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Evaluate expiry as of this date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Stop after the upload and retry portion of the demo.
    #[arg(long)]
    pub(crate) skip_override: bool,
}

type DemoService = DocumentVerificationService<SimulatedPipeline, SimulatedPipeline, MemoryAuditLog>;

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let pipeline = Arc::new(SimulatedPipeline::new(today));
    let audit = Arc::new(MemoryAuditLog::new());
    let service: DemoService = DocumentVerificationService::new(
        pipeline.clone(),
        pipeline,
        audit,
        PipelineConfig::default(),
        demo_sync_config(),
    );
    let candidate = CandidateId("cand-demo".to_string());

    println!("Candidate document verification demo");
    println!("\nUploading documents for {candidate}");
    let files = vec![
        demo_file("resume.pdf", mime::APPLICATION_PDF, 180_000),
        demo_file("passport.jpg", mime::IMAGE_JPEG, 420_000),
        demo_file("cnic.png", mime::IMAGE_PNG, 260_000),
        demo_file("selfie.png", mime::IMAGE_PNG, 90_000),
        demo_file("portfolio.zip", mime::APPLICATION_OCTET_STREAM, 2_000),
        demo_file("scan.pdf", mime::APPLICATION_PDF, 12 * 1024 * 1024),
    ];

    let mut scope = service.sync_scope();
    let mut uploaded = Vec::new();
    for outcome in service.upload_all(&candidate, files).await {
        match outcome.result {
            Ok(tracked) => {
                println!("- {} -> {}", outcome.file_name, tracked.document.id);
                scope.spawn_status(tracked.document.id.clone());
                scope.spawn_category(tracked.document.id.clone(), candidate.clone());
                uploaded.push((outcome.file_name, tracked.document.id));
            }
            Err(error) => {
                let facing = error.user_facing();
                println!("- {} rejected locally: {}", outcome.file_name, facing.message);
            }
        }
    }

    println!("\nWaiting for the pipeline");
    while let Some(report) = scope.next_report().await {
        print_report(&report);
    }
    scope.teardown().await;

    println!("\nStatus views as of {today}");
    for (_, document_id) in &uploaded {
        let view = service.status_view(document_id, today).await?;
        println!(
            "- {}: {} ({})",
            view.file_name, view.display_label, view.description
        );
        if let Some(rejection) = &view.rejection {
            println!(
                "  [{}] {}: {}",
                rejection.code, rejection.mismatch, rejection.description
            );
        }
    }

    let find = |file_name: &str| {
        uploaded
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, id)| id.clone())
            .unwrap_or_else(|| DocumentId(file_name.to_string()))
    };
    let cnic = find("cnic.png");
    let selfie = find("selfie.png");
    println!("\nRetrying {cnic}");
    let assessment = service.retry_eligibility(&cnic).await?;
    println!(
        "- can retry: {} ({} of {} retries used)",
        assessment.can_retry, assessment.retry_count, assessment.max_retries
    );
    match service.retry(&cnic).await {
        Ok(tracked) => {
            println!(
                "- accepted; showing {} until confirmed",
                tracked.document.verification_status.label()
            );
            let mut scope = service.sync_scope();
            scope.spawn_status(cnic.clone());
            if let Some(report) = scope.next_report().await {
                print_report(&report);
            }
        }
        Err(error) => println!("- retry refused: {error}"),
    }

    if args.skip_override {
        return Ok(());
    }

    println!("\nOverride attempts");
    let attempts = [
        (
            &selfie,
            DEMO_ADMIN,
            "face matches the candidate in person",
            "tampered selfie",
        ),
        (&cnic, DEMO_ADMIN, "looks ok", "short justification"),
        (
            &cnic,
            DEMO_STAFF,
            "CNIC verified against the NADRA record",
            "staff account",
        ),
        (
            &cnic,
            DEMO_ADMIN,
            "CNIC verified against the NADRA record",
            "admin with justification",
        ),
    ];
    for (document_id, email, justification, label) in attempts {
        let request = OverrideRequest {
            document_id: document_id.clone(),
            credential: ActorCredential::new(email, DEMO_PASSWORD),
            justification: justification.to_string(),
        };
        match service.request_override(request).await {
            Ok(receipt) => println!(
                "- {label}: {} is now {} (audited at {})",
                receipt.document.document.id,
                receipt.document.document.verification_status.label(),
                receipt.audit.recorded_at.to_rfc3339()
            ),
            Err(error) => println!("- {label}: {error}"),
        }
    }

    println!("\nCandidate health");
    print_json(&service.health(&candidate));

    println!("\nOverride audit (CSV)");
    service.export_audit(std::io::stdout())?;
    Ok(())
}

fn demo_sync_config() -> SyncConfig {
    SyncConfig {
        min_interval: Duration::from_millis(150),
        max_interval: Duration::from_millis(600),
        max_attempts: 10,
        max_wait: Duration::from_secs(10),
        category_attempts: 5,
        category_interval: Duration::from_millis(150),
    }
}

fn demo_file(name: &str, content_type: mime::Mime, len: usize) -> UploadFile {
    UploadFile::new(name, content_type, vec![0u8; len])
}

struct Simulated {
    document: Document,
    settled: Document,
    polls_left: u32,
}

/// In-process stand-in for the verification pipeline.
///
/// Each document stays in `pending_ai` for a couple of status reads, then settles to an
/// outcome chosen from its file name.
pub(crate) struct SimulatedPipeline {
    documents: Mutex<HashMap<DocumentId, Simulated>>,
    next_id: AtomicUsize,
    accounts: HashMap<&'static str, Role>,
    today: NaiveDate,
}

impl SimulatedPipeline {
    pub(crate) fn new(today: NaiveDate) -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
            accounts: HashMap::from([(DEMO_ADMIN, Role::Admin), (DEMO_STAFF, Role::Staff)]),
            today,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentId, Simulated>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, pending: &Document) -> Document {
        let mut settled = pending.clone();
        let name = pending.file_name.to_ascii_lowercase();
        if name.contains("resume") || name.contains("cv") {
            settled.category = Some(DocumentCategory::Cv);
            settled.verification_status = VerificationStatus::Verified;
            settled.verification_source = Some(VerificationSource::AiVerification);
            settled.extraction_confidence =
                BTreeMap::from([("name".to_string(), 0.94), ("email".to_string(), 0.88)]);
        } else if name.contains("passport") {
            settled.category = Some(DocumentCategory::Passport);
            settled.verification_status = VerificationStatus::Verified;
            settled.verification_source = Some(VerificationSource::AiVerification);
            settled.expiry_date = self.today.pred_opt();
        } else if name.contains("cnic") {
            settled.category = Some(DocumentCategory::Other);
            settled.verification_status = VerificationStatus::RejectedMismatch;
            let mut rejection =
                Rejection::new(RejectionCode::CnicMismatch, "CNIC number differs from profile");
            rejection.mismatch_fields.insert("cnic".to_string());
            rejection.retry_possible = true;
            rejection.is_overridable = true;
            rejection.ai_confidence = Some(0.71);
            settled.rejection = Some(rejection);
        } else if name.contains("selfie") || name.contains("photo") {
            settled.category = Some(DocumentCategory::Photo);
            settled.verification_status = VerificationStatus::RejectedMismatch;
            let mut rejection =
                Rejection::new(RejectionCode::DocumentTampered, "edited regions detected");
            // The pipeline flags this overridable; the client policy refuses it anyway.
            rejection.is_overridable = true;
            settled.rejection = Some(rejection);
        } else {
            settled.category = Some(DocumentCategory::Other);
            settled.verification_status = VerificationStatus::NeedsReview;
        }
        settled
    }
}

#[async_trait]
impl VerificationGateway for SimulatedPipeline {
    async fn upload_document(
        &self,
        file: &UploadFile,
        candidate_id: &CandidateId,
    ) -> Result<Document, GatewayError> {
        let number = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = DocumentId(format!("sim-{number}"));
        let document = Document {
            id: id.clone(),
            candidate_id: candidate_id.clone(),
            file_name: file.file_name.clone(),
            storage_ref: Some(format!("candidates/{candidate_id}/{}", file.file_name)),
            category: None,
            verification_status: VerificationStatus::PendingAi,
            verification_source: None,
            rejection: None,
            expiry_date: None,
            extraction_confidence: BTreeMap::new(),
        };
        let settled = self.settle(&document);
        self.lock().insert(
            id,
            Simulated {
                document: document.clone(),
                settled,
                polls_left: SIMULATED_POLLS,
            },
        );
        Ok(document)
    }

    async fn document_status(&self, document_id: &DocumentId) -> Result<Document, GatewayError> {
        let mut documents = self.lock();
        let simulated = documents
            .get_mut(document_id)
            .ok_or_else(|| GatewayError::NotFound(format!("document {document_id} not found")))?;
        if simulated.polls_left > 0 {
            simulated.polls_left -= 1;
            if simulated.polls_left == 0 {
                simulated.document = simulated.settled.clone();
            } else {
                simulated.document.category = simulated.settled.category;
            }
        }
        Ok(simulated.document.clone())
    }

    async fn trigger_extraction(
        &self,
        candidate_id: &CandidateId,
        storage_ref: &str,
    ) -> Result<ExtractionResult, GatewayError> {
        Ok(ExtractionResult::Extracted {
            data: json!({
                "candidate_id": candidate_id,
                "source": storage_ref,
                "skills": ["welding", "rigging"],
            }),
        })
    }

    async fn reprocess_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<ReprocessAck, GatewayError> {
        let mut documents = self.lock();
        let simulated = documents
            .get_mut(document_id)
            .ok_or_else(|| GatewayError::NotFound(document_id.to_string()))?;
        if !simulated.document.verification_status.is_soft_terminal() {
            return Err(GatewayError::Remote {
                status: 409,
                body: "document is not awaiting a retry".to_string(),
            });
        }

        let mut settled = simulated.document.clone();
        if let Some(rejection) = settled.rejection.as_mut() {
            rejection.retry_count += 1;
        }
        simulated.document.verification_status = VerificationStatus::PendingAi;
        simulated.settled = settled;
        simulated.polls_left = SIMULATED_POLLS;
        Ok(ReprocessAck {
            request_id: Some(format!("reprocess-{document_id}")),
            message: Some("queued for reprocessing".to_string()),
        })
    }

    async fn override_document(
        &self,
        document_id: &DocumentId,
        credential: &ActorCredential,
        justification: &str,
    ) -> Result<Document, GatewayError> {
        let mut documents = self.lock();
        let simulated = documents
            .get_mut(document_id)
            .ok_or_else(|| GatewayError::NotFound(document_id.to_string()))?;
        let document = &mut simulated.document;
        document.verification_status = VerificationStatus::Verified;
        document.verification_source = Some(VerificationSource::AdminOverride);
        if let Some(rejection) = document.rejection.as_mut() {
            rejection.overridden = Some(OverrideStamp {
                by: credential.email.clone(),
                at: Utc::now(),
                reason: justification.to_string(),
            });
        }
        simulated.settled = document.clone();
        Ok(document.clone())
    }
}

#[async_trait]
impl IdentityVerifier for SimulatedPipeline {
    async fn reauthenticate(
        &self,
        credential: &ActorCredential,
    ) -> Result<AuthenticatedActor, GatewayError> {
        match self.accounts.get(credential.email.as_str()) {
            Some(role) if credential.password == DEMO_PASSWORD => Ok(AuthenticatedActor {
                identity: credential.email.clone(),
                role: *role,
            }),
            _ => Err(GatewayError::Unauthorized("invalid credentials".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> SimulatedPipeline {
        SimulatedPipeline::new(NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date"))
    }

    #[tokio::test]
    async fn documents_settle_after_scripted_polls() {
        let pipeline = pipeline();
        let candidate = CandidateId("cand-1".to_string());
        let uploaded = pipeline
            .upload_document(
                &demo_file("cnic.png", mime::IMAGE_PNG, 10),
                &candidate,
            )
            .await
            .expect("upload");

        let first = pipeline
            .document_status(&uploaded.id)
            .await
            .expect("status");
        assert_eq!(first.verification_status, VerificationStatus::PendingAi);
        let second = pipeline
            .document_status(&uploaded.id)
            .await
            .expect("status");
        assert_eq!(
            second.verification_status,
            VerificationStatus::RejectedMismatch
        );

        pipeline
            .reprocess_document(&uploaded.id)
            .await
            .expect("reprocess");
        pipeline.document_status(&uploaded.id).await.expect("status");
        let retried = pipeline
            .document_status(&uploaded.id)
            .await
            .expect("status");
        assert_eq!(retried.rejection.map(|r| r.retry_count), Some(1));
    }

    #[tokio::test]
    async fn passports_expire_relative_to_the_demo_date() {
        let pipeline = pipeline();
        let uploaded = pipeline
            .upload_document(
                &demo_file("passport.jpg", mime::IMAGE_JPEG, 10),
                &CandidateId("cand-1".to_string()),
            )
            .await
            .expect("upload");
        for _ in 0..SIMULATED_POLLS {
            pipeline.document_status(&uploaded.id).await.expect("status");
        }
        let settled = pipeline
            .document_status(&uploaded.id)
            .await
            .expect("status");
        assert_eq!(settled.expiry_date, NaiveDate::from_ymd_opt(2025, 5, 31));
    }

    #[tokio::test]
    async fn only_known_accounts_reauthenticate() {
        let pipeline = pipeline();
        let admin = pipeline
            .reauthenticate(&ActorCredential::new(DEMO_ADMIN, DEMO_PASSWORD))
            .await
            .expect("admin");
        assert_eq!(admin.role, Role::Admin);
        assert!(pipeline
            .reauthenticate(&ActorCredential::new(DEMO_ADMIN, "wrong"))
            .await
            .is_err());
    }
}
