use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{PipelineConfig, SyncConfig};
use crate::workflows::verification::catalog::RejectionCode;
use crate::workflows::verification::domain::{
    ActorCredential, AuthenticatedActor, CandidateId, Document, DocumentCategory, DocumentId,
    OverrideRequest, OverrideStamp, Rejection, Role, VerificationSource, VerificationStatus,
};
use crate::workflows::verification::gateway::{
    ExtractionResult, GatewayError, IdentityVerifier, ReprocessAck, VerificationGateway,
};
use crate::workflows::verification::upload::UploadFile;
use crate::workflows::verification::{
    verification_router, DocumentVerificationService, MemoryAuditLog,
};

pub(super) const ADMIN_EMAIL: &str = "admin@agency.example";
pub(super) const ADMIN_PASSWORD: &str = "correct horse";
pub(super) const STAFF_EMAIL: &str = "staff@agency.example";
pub(super) const SUPER_EMAIL: &str = "root@agency.example";

pub(super) type TestService = DocumentVerificationService<FakeGateway, FakeVerifier, MemoryAuditLog>;

pub(super) fn doc_id(raw: &str) -> DocumentId {
    DocumentId(raw.to_string())
}

pub(super) fn candidate() -> CandidateId {
    CandidateId("cand-42".to_string())
}

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        base_url: "http://pipeline.test/api".to_string(),
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(10),
        upload_timeout: Duration::from_secs(20),
        extraction_timeout: Duration::from_secs(8),
    }
}

pub(super) fn sync_config() -> SyncConfig {
    SyncConfig {
        min_interval: Duration::from_millis(1_000),
        max_interval: Duration::from_millis(4_000),
        max_attempts: 50,
        max_wait: Duration::from_secs(120),
        category_attempts: 3,
        category_interval: Duration::from_millis(500),
    }
}

pub(super) fn document(id: &str, status: VerificationStatus) -> Document {
    Document {
        id: doc_id(id),
        candidate_id: candidate(),
        file_name: format!("{id}.pdf"),
        storage_ref: Some(format!("uploads/{id}.pdf")),
        category: Some(DocumentCategory::Other),
        verification_status: status,
        verification_source: None,
        rejection: None,
        expiry_date: None,
        extraction_confidence: BTreeMap::new(),
    }
}

pub(super) fn pending(id: &str) -> Document {
    let mut document = document(id, VerificationStatus::PendingAi);
    document.category = None;
    document
}

pub(super) fn rejected(id: &str, code: RejectionCode) -> Document {
    let mut document = document(id, VerificationStatus::RejectedMismatch);
    let mut rejection = Rejection::new(code, "extracted details disagree");
    rejection.mismatch_fields.insert("cnic".to_string());
    rejection.retry_possible = true;
    rejection.is_overridable = true;
    rejection.ai_confidence = Some(0.62);
    document.rejection = Some(rejection);
    document
}

pub(super) fn with_rejection(mut document: Document, edit: impl FnOnce(&mut Rejection)) -> Document {
    if let Some(rejection) = document.rejection.as_mut() {
        edit(rejection);
    }
    document
}

pub(super) fn override_request(id: &str, email: &str, justification: &str) -> OverrideRequest {
    OverrideRequest {
        document_id: doc_id(id),
        credential: ActorCredential::new(email, ADMIN_PASSWORD),
        justification: justification.to_string(),
    }
}

/// Scripted pipeline. Each document replays its queued responses, repeating the last one.
#[derive(Default)]
pub(super) struct FakeGateway {
    scripts: Mutex<HashMap<DocumentId, VecDeque<Document>>>,
    status_calls: Mutex<Vec<(DocumentId, Instant)>>,
    hanging_status: Mutex<HashSet<DocumentId>>,
    status_failures: Mutex<HashMap<DocumentId, GatewayError>>,
    upload_failures: Mutex<HashMap<String, GatewayError>>,
    hanging_uploads: Mutex<HashSet<String>>,
    uploads: AtomicUsize,
    reprocess_failure: Mutex<Option<GatewayError>>,
    reprocess_calls: AtomicUsize,
    override_response: Mutex<Option<Result<Document, GatewayError>>>,
    override_calls: AtomicUsize,
    extraction_calls: Mutex<Vec<(CandidateId, String)>>,
    extraction_result: Mutex<Option<ExtractionResult>>,
}

impl FakeGateway {
    pub(super) fn script(&self, document: Document) {
        self.script_sequence(vec![document]);
    }

    pub(super) fn script_sequence(&self, documents: Vec<Document>) {
        if let Some(first) = documents.first() {
            let id = first.id.clone();
            self.scripts
                .lock()
                .expect("script mutex poisoned")
                .insert(id, documents.into_iter().collect());
        }
    }

    pub(super) fn status_call_times(&self, id: &DocumentId) -> Vec<Instant> {
        self.status_calls
            .lock()
            .expect("call mutex poisoned")
            .iter()
            .filter(|(called, _)| called == id)
            .map(|(_, at)| *at)
            .collect()
    }

    pub(super) fn status_calls(&self, id: &DocumentId) -> usize {
        self.status_call_times(id).len()
    }

    pub(super) fn hang_status(&self, id: &DocumentId) {
        self.hanging_status
            .lock()
            .expect("hang mutex poisoned")
            .insert(id.clone());
    }

    pub(super) fn fail_status(&self, id: &DocumentId, error: GatewayError) {
        self.status_failures
            .lock()
            .expect("failure mutex poisoned")
            .insert(id.clone(), error);
    }

    pub(super) fn fail_upload(&self, file_name: &str, error: GatewayError) {
        self.upload_failures
            .lock()
            .expect("failure mutex poisoned")
            .insert(file_name.to_string(), error);
    }

    pub(super) fn hang_upload(&self, file_name: &str) {
        self.hanging_uploads
            .lock()
            .expect("hang mutex poisoned")
            .insert(file_name.to_string());
    }

    pub(super) fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub(super) fn fail_reprocess(&self, error: GatewayError) {
        *self.reprocess_failure.lock().expect("mutex poisoned") = Some(error);
    }

    pub(super) fn reprocess_calls(&self) -> usize {
        self.reprocess_calls.load(Ordering::SeqCst)
    }

    pub(super) fn respond_to_override(&self, response: Result<Document, GatewayError>) {
        *self.override_response.lock().expect("mutex poisoned") = Some(response);
    }

    pub(super) fn override_calls(&self) -> usize {
        self.override_calls.load(Ordering::SeqCst)
    }

    pub(super) fn extraction_calls(&self) -> Vec<(CandidateId, String)> {
        self.extraction_calls.lock().expect("mutex poisoned").clone()
    }

    pub(super) fn extraction_returns(&self, result: ExtractionResult) {
        *self.extraction_result.lock().expect("mutex poisoned") = Some(result);
    }

    fn current(&self, id: &DocumentId) -> Option<Document> {
        let mut scripts = self.scripts.lock().expect("script mutex poisoned");
        let queue = scripts.get_mut(id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl VerificationGateway for FakeGateway {
    async fn upload_document(
        &self,
        file: &UploadFile,
        candidate_id: &CandidateId,
    ) -> Result<Document, GatewayError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let hangs = self
            .hanging_uploads
            .lock()
            .expect("hang mutex poisoned")
            .contains(&file.file_name);
        if hangs {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self
            .upload_failures
            .lock()
            .expect("failure mutex poisoned")
            .get(&file.file_name)
            .cloned()
        {
            return Err(error);
        }

        let id = format!("doc-{}", file.file_name);
        let mut document = pending(&id);
        document.candidate_id = candidate_id.clone();
        document.file_name = file.file_name.clone();
        document.storage_ref = Some(format!("uploads/{}", file.file_name));
        self.scripts
            .lock()
            .expect("script mutex poisoned")
            .entry(document.id.clone())
            .or_insert_with(|| VecDeque::from(vec![document.clone()]));
        Ok(document)
    }

    async fn document_status(&self, document_id: &DocumentId) -> Result<Document, GatewayError> {
        self.status_calls
            .lock()
            .expect("call mutex poisoned")
            .push((document_id.clone(), Instant::now()));

        let hangs = self
            .hanging_status
            .lock()
            .expect("hang mutex poisoned")
            .contains(document_id);
        if hangs {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self
            .status_failures
            .lock()
            .expect("failure mutex poisoned")
            .get(document_id)
            .cloned()
        {
            return Err(error);
        }
        self.current(document_id)
            .ok_or_else(|| GatewayError::NotFound(format!("document {document_id} not found")))
    }

    async fn trigger_extraction(
        &self,
        candidate_id: &CandidateId,
        storage_ref: &str,
    ) -> Result<ExtractionResult, GatewayError> {
        self.extraction_calls
            .lock()
            .expect("mutex poisoned")
            .push((candidate_id.clone(), storage_ref.to_string()));
        Ok(self
            .extraction_result
            .lock()
            .expect("mutex poisoned")
            .clone()
            .unwrap_or(ExtractionResult::Extracted {
                data: Value::String("parsed".to_string()),
            }))
    }

    async fn reprocess_document(
        &self,
        _document_id: &DocumentId,
    ) -> Result<ReprocessAck, GatewayError> {
        self.reprocess_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.reprocess_failure.lock().expect("mutex poisoned").clone() {
            return Err(error);
        }
        Ok(ReprocessAck {
            request_id: Some("req-1".to_string()),
            message: Some("queued".to_string()),
        })
    }

    async fn override_document(
        &self,
        document_id: &DocumentId,
        credential: &ActorCredential,
        justification: &str,
    ) -> Result<Document, GatewayError> {
        self.override_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.override_response.lock().expect("mutex poisoned").take() {
            return response;
        }

        let mut document = self
            .current(document_id)
            .ok_or_else(|| GatewayError::NotFound(document_id.to_string()))?;
        document.verification_status = VerificationStatus::Verified;
        document.verification_source = Some(VerificationSource::AdminOverride);
        if let Some(rejection) = document.rejection.as_mut() {
            rejection.overridden = Some(OverrideStamp {
                by: credential.email.clone(),
                at: Utc::now(),
                reason: justification.to_string(),
            });
        }
        self.script(document.clone());
        Ok(document)
    }
}

/// Identity store keyed by email; every account shares [`ADMIN_PASSWORD`].
pub(super) struct FakeVerifier {
    roles: HashMap<String, Role>,
    calls: AtomicUsize,
    outage: Mutex<Option<GatewayError>>,
}

impl Default for FakeVerifier {
    fn default() -> Self {
        let roles = HashMap::from([
            (ADMIN_EMAIL.to_string(), Role::Admin),
            (STAFF_EMAIL.to_string(), Role::Staff),
            (SUPER_EMAIL.to_string(), Role::SuperAdmin),
        ]);
        Self {
            roles,
            calls: AtomicUsize::new(0),
            outage: Mutex::new(None),
        }
    }
}

impl FakeVerifier {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn fail_with(&self, error: GatewayError) {
        *self.outage.lock().expect("mutex poisoned") = Some(error);
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn reauthenticate(
        &self,
        credential: &ActorCredential,
    ) -> Result<AuthenticatedActor, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.outage.lock().expect("mutex poisoned").clone() {
            return Err(error);
        }
        match self.roles.get(&credential.email) {
            Some(role) if credential.password == ADMIN_PASSWORD => Ok(AuthenticatedActor {
                identity: credential.email.clone(),
                role: *role,
            }),
            _ => Err(GatewayError::Unauthorized("invalid credentials".to_string())),
        }
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) gateway: Arc<FakeGateway>,
    pub(super) verifier: Arc<FakeVerifier>,
    pub(super) audit: Arc<MemoryAuditLog>,
}

pub(super) fn harness() -> Harness {
    harness_with_audit(MemoryAuditLog::new())
}

pub(super) fn harness_with_audit(audit: MemoryAuditLog) -> Harness {
    let gateway = Arc::new(FakeGateway::default());
    let verifier = Arc::new(FakeVerifier::default());
    let audit = Arc::new(audit);
    let service = Arc::new(DocumentVerificationService::new(
        gateway.clone(),
        verifier.clone(),
        audit.clone(),
        pipeline_config(),
        sync_config(),
    ));
    Harness {
        service,
        gateway,
        verifier,
        audit,
    }
}

pub(super) fn router(harness: &Harness) -> axum::Router {
    verification_router(harness.service.clone())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn upload(file_name: &str, content_type: &str, len: usize) -> UploadFile {
    UploadFile::new(
        file_name,
        content_type.parse().expect("valid mime"),
        vec![7u8; len],
    )
}
