use candidate_docs::config::AppConfig;
use candidate_docs::error::AppError;
use candidate_docs::workflows::verification::{
    append_csv, AuditEntry, AuditError, AuditRecorder, AuditReservation, DocumentId,
    DocumentVerificationService, HttpVerificationGateway, MemoryAuditLog, VerificationError,
    EXPORT_HEADER,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) const DEFAULT_AUDIT_LOG: &str = "override-audit.csv";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type RemoteService =
    DocumentVerificationService<HttpVerificationGateway, HttpVerificationGateway, CsvAuditLog>;

/// Verification service backed by the configured pipeline, auditing to `audit_log`.
pub(crate) fn remote_service(
    config: &AppConfig,
    audit_log: &Path,
) -> Result<Arc<RemoteService>, AppError> {
    let gateway = Arc::new(
        HttpVerificationGateway::new(config.pipeline.clone()).map_err(VerificationError::from)?,
    );
    let audit = Arc::new(CsvAuditLog::new(audit_log));
    Ok(Arc::new(DocumentVerificationService::new(
        gateway.clone(),
        gateway,
        audit,
        config.pipeline.clone(),
        config.sync.clone(),
    )))
}

/// Audit log that mirrors every committed entry into an append-only CSV file.
///
/// Reservations fail when the file cannot be opened, so an override never reaches the
/// pipeline without somewhere to record it. Each reservation keeps its file handle until it is
/// committed or released.
pub(crate) struct CsvAuditLog {
    path: PathBuf,
    memory: MemoryAuditLog,
    handles: Mutex<HashMap<DocumentId, File>>,
}

impl CsvAuditLog {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            memory: MemoryAuditLog::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn handles(&self) -> MutexGuard<'_, HashMap<DocumentId, File>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entry(&self, file: Option<File>, entry: &AuditEntry) -> Result<(), AuditError> {
        let file = match file {
            Some(file) => file,
            None => self.open()?,
        };
        append_csv(std::slice::from_ref(entry), &file)
            .map_err(|err| err.to_string())
            .and_then(|()| file.sync_data().map_err(|err| err.to_string()))
            .map_err(|err| AuditError::Write(format!("{}: {err}", self.path.display())))?;
        if !self.path.is_file() {
            return Err(AuditError::Write(format!(
                "{} was removed while the override was in flight",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn open(&self) -> Result<File, AuditError> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| AuditError::Unavailable(format!("{}: {err}", self.path.display())))?;
        if is_new {
            let mut header = csv::Writer::from_writer(&file);
            header
                .write_record(EXPORT_HEADER)
                .map_err(|err| AuditError::Unavailable(err.to_string()))?;
            header
                .flush()
                .map_err(|err| AuditError::Unavailable(err.to_string()))?;
        }
        Ok(file)
    }
}

impl AuditRecorder for CsvAuditLog {
    fn reserve(&self, document_id: &DocumentId) -> Result<AuditReservation, AuditError> {
        let file = self.open()?;
        let reservation = self.memory.reserve(document_id)?;
        self.handles().insert(document_id.clone(), file);
        Ok(reservation)
    }

    fn commit(
        &self,
        reservation: AuditReservation,
        entry: AuditEntry,
    ) -> Result<AuditEntry, AuditError> {
        let file = self.handles().remove(reservation.document_id());
        if let Err(error) = self.write_entry(file, &entry) {
            tracing::error!(
                document_id = %entry.document_id,
                path = %self.path.display(),
                %error,
                "audit file write failed"
            );
            self.memory.release(reservation);
            return Err(error);
        }
        self.memory.commit(reservation, entry)
    }

    fn release(&self, reservation: AuditReservation) {
        self.handles().remove(reservation.document_id());
        self.memory.release(reservation);
    }

    fn entries_for(&self, document_id: &DocumentId) -> Vec<AuditEntry> {
        self.memory.entries_for(document_id)
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.memory.entries()
    }
}

/// Rows of an audit CSV file, optionally limited to one document.
pub(crate) fn read_audit_rows(
    path: &Path,
    document_id: Option<&str>,
) -> Result<Vec<csv::StringRecord>, AppError> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|err| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
        let matches = document_id
            .map(|wanted| record.get(0) == Some(wanted))
            .unwrap_or(true);
        if matches {
            rows.push(record);
        }
    }
    Ok(rows)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
