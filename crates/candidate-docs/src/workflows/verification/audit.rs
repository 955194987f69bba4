use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::RejectionCode;
use super::domain::DocumentId;

/// Immutable record of one successful override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub document_id: DocumentId,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
    pub justification: String,
    pub prior_code: RejectionCode,
}

/// Slot held for a document while its override is in flight.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct AuditReservation {
    document_id: DocumentId,
}

impl AuditReservation {
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }
}

/// Append-only override log.
///
/// A slot is reserved before the remote override call and committed only after the call
/// succeeds, so an override is either both applied and recorded or neither. Everything that can
/// fail should be acquired in `reserve`; a failed `commit` still frees the slot.
pub trait AuditRecorder: Send + Sync {
    fn reserve(&self, document_id: &DocumentId) -> Result<AuditReservation, AuditError>;
    fn commit(
        &self,
        reservation: AuditReservation,
        entry: AuditEntry,
    ) -> Result<AuditEntry, AuditError>;
    fn release(&self, reservation: AuditReservation);
    fn entries_for(&self, document_id: &DocumentId) -> Vec<AuditEntry>;
    fn entries(&self) -> Vec<AuditEntry>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("an override for {0} is already in progress")]
    OverrideInFlight(DocumentId),
    #[error("audit log is full ({0} entries)")]
    Full(usize),
    #[error("audit log unavailable: {0}")]
    Unavailable(String),
    #[error("audit entry could not be written: {0}")]
    Write(String),
    #[error("audit export failed: {0}")]
    Export(String),
}

#[derive(Default)]
struct AuditState {
    entries: Vec<AuditEntry>,
    reserved: HashSet<DocumentId>,
}

/// In-process audit log with optional capacity and read-only modes.
#[derive(Default)]
pub struct MemoryAuditLog {
    state: Mutex<AuditState>,
    capacity: Option<usize>,
    read_only: bool,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuditState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuditRecorder for MemoryAuditLog {
    fn reserve(&self, document_id: &DocumentId) -> Result<AuditReservation, AuditError> {
        if self.read_only {
            return Err(AuditError::Unavailable("log is read only".to_string()));
        }
        let mut state = self.lock();
        if let Some(capacity) = self.capacity {
            if state.entries.len() + state.reserved.len() >= capacity {
                return Err(AuditError::Full(capacity));
            }
        }
        if !state.reserved.insert(document_id.clone()) {
            return Err(AuditError::OverrideInFlight(document_id.clone()));
        }
        Ok(AuditReservation {
            document_id: document_id.clone(),
        })
    }

    fn commit(
        &self,
        reservation: AuditReservation,
        entry: AuditEntry,
    ) -> Result<AuditEntry, AuditError> {
        let mut state = self.lock();
        state.reserved.remove(&reservation.document_id);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    fn release(&self, reservation: AuditReservation) {
        self.lock().reserved.remove(&reservation.document_id);
    }

    fn entries_for(&self, document_id: &DocumentId) -> Vec<AuditEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| &entry.document_id == document_id)
            .cloned()
            .collect()
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.lock().entries.clone()
    }
}

pub const EXPORT_HEADER: [&str; 5] = [
    "document_id",
    "actor",
    "recorded_at",
    "justification",
    "prior_code",
];

/// Write entries as CSV, header first.
pub fn export_csv<W: std::io::Write>(entries: &[AuditEntry], writer: W) -> Result<(), AuditError> {
    write_csv(entries, writer, true)
}

/// Write entries as CSV rows without a header, for appending to an existing export.
pub fn append_csv<W: std::io::Write>(entries: &[AuditEntry], writer: W) -> Result<(), AuditError> {
    write_csv(entries, writer, false)
}

fn write_csv<W: std::io::Write>(
    entries: &[AuditEntry],
    writer: W,
    header: bool,
) -> Result<(), AuditError> {
    let mut csv = csv::Writer::from_writer(writer);
    if header {
        csv.write_record(EXPORT_HEADER)
            .map_err(|err| AuditError::Export(err.to_string()))?;
    }
    for entry in entries {
        let recorded_at = entry.recorded_at.to_rfc3339();
        csv.write_record([
            entry.document_id.0.as_str(),
            entry.actor.as_str(),
            recorded_at.as_str(),
            entry.justification.as_str(),
            entry.prior_code.as_str(),
        ])
        .map_err(|err| AuditError::Export(err.to_string()))?;
    }
    csv.flush()
        .map_err(|err| AuditError::Export(err.to_string()))
}
