//! Override authorization gate.
//!
//! Every check here runs before the remote override endpoint is contacted. A document that is
//! not overridable is refused before any credential or justification is looked at.

mod policy;

use std::sync::Arc;

use serde::Serialize;

use super::catalog::RejectionCode;
use super::domain::{
    AuthenticatedActor, Document, DocumentId, OverrideRequest, Role, VerificationStatus,
};
use super::gateway::{GatewayError, IdentityVerifier};

pub use policy::{OverridePolicy, MIN_JUSTIFICATION_CHARS, NON_OVERRIDABLE_CODES};

/// What the caller should do about a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialRemedy {
    /// Nothing the caller supplies can change the outcome.
    None,
    Reauthenticate,
    CorrectInput,
}

/// Local, pre-network override denial.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverrideDenial {
    #[error("rejection {code} cannot be overridden")]
    NotOverridable { code: RejectionCode },
    #[error("documents in {status} cannot be overridden")]
    InvalidState { status: VerificationStatus },
    #[error("document has no rejection to override")]
    MissingRejection,
    #[error("justification must be at least {required} characters (found {found})")]
    JustificationTooShort { found: usize, required: usize },
    #[error("re-authentication credentials are required")]
    MissingCredential,
    #[error("re-authentication failed: {0}")]
    ReauthenticationFailed(String),
    #[error("role {actual} cannot override; {required} required")]
    InsufficientRole { required: Role, actual: Role },
}

impl OverrideDenial {
    pub fn remedy(&self) -> DenialRemedy {
        match self {
            OverrideDenial::NotOverridable { .. }
            | OverrideDenial::InvalidState { .. }
            | OverrideDenial::MissingRejection => DenialRemedy::None,
            OverrideDenial::MissingCredential
            | OverrideDenial::ReauthenticationFailed(_)
            | OverrideDenial::InsufficientRole { .. } => DenialRemedy::Reauthenticate,
            OverrideDenial::JustificationTooShort { .. } => DenialRemedy::CorrectInput,
        }
    }
}

/// Whether the override prompt should be offered at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "eligibility", rename_all = "snake_case")]
pub enum OverrideEligibility {
    Eligible { required_role: Role },
    NotOverridable { reason: String },
}

impl OverrideEligibility {
    pub fn prompts_for_credentials(&self) -> bool {
        matches!(self, OverrideEligibility::Eligible { .. })
    }
}

/// Gate failure: a local denial, or a transport failure while re-authenticating.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateFailure {
    #[error(transparent)]
    Denied(#[from] OverrideDenial),
    #[error(transparent)]
    Transport(GatewayError),
}

/// Proof that every gate check passed for one document and one actor.
#[derive(Debug, Clone)]
pub struct AuthorizedOverride {
    pub document_id: DocumentId,
    pub actor: AuthenticatedActor,
    pub justification: String,
    pub prior_code: RejectionCode,
    pub(crate) request: OverrideRequest,
}

pub struct OverrideGate<V> {
    policy: OverridePolicy,
    verifier: Arc<V>,
}

impl<V> OverrideGate<V>
where
    V: IdentityVerifier + 'static,
{
    pub fn new(verifier: Arc<V>) -> Self {
        Self::with_policy(OverridePolicy::default(), verifier)
    }

    pub fn with_policy(policy: OverridePolicy, verifier: Arc<V>) -> Self {
        Self { policy, verifier }
    }

    pub fn policy(&self) -> &OverridePolicy {
        &self.policy
    }

    /// Decide whether an override may be attempted, without asking for anything.
    pub fn assess(&self, document: &Document) -> OverrideEligibility {
        match self.structural_check(document) {
            Ok(required_role) => OverrideEligibility::Eligible { required_role },
            Err(denial) => OverrideEligibility::NotOverridable {
                reason: denial.to_string(),
            },
        }
    }

    fn structural_check(&self, document: &Document) -> Result<Role, OverrideDenial> {
        if !matches!(
            document.verification_status,
            VerificationStatus::RejectedMismatch | VerificationStatus::Failed
        ) {
            return Err(OverrideDenial::InvalidState {
                status: document.verification_status,
            });
        }
        let rejection = document
            .rejection
            .as_ref()
            .ok_or(OverrideDenial::MissingRejection)?;
        if !self.policy.is_overridable(rejection) {
            return Err(OverrideDenial::NotOverridable {
                code: rejection.code.clone(),
            });
        }
        Ok(self.policy.required_role(rejection))
    }

    /// Run every check in order; the first failure aborts with nothing changed.
    pub async fn authorize(
        &self,
        document: &Document,
        request: OverrideRequest,
    ) -> Result<AuthorizedOverride, GateFailure> {
        let required_role = match self.structural_check(document) {
            Ok(role) => role,
            Err(denial) => {
                tracing::warn!(document_id = %document.id, %denial, "override refused");
                return Err(denial.into());
            }
        };

        if let Some(found) = self.policy.justification_shortfall(&request.justification) {
            let denial = OverrideDenial::JustificationTooShort {
                found,
                required: self.policy.min_justification_chars(),
            };
            tracing::warn!(document_id = %document.id, %denial, "override refused");
            return Err(denial.into());
        }

        if request.credential.is_blank() {
            tracing::warn!(document_id = %document.id, "override refused without credentials");
            return Err(OverrideDenial::MissingCredential.into());
        }

        let actor = match self.verifier.reauthenticate(&request.credential).await {
            Ok(actor) => actor,
            Err(GatewayError::Unauthorized(message)) => {
                tracing::warn!(document_id = %document.id, "override re-authentication rejected");
                return Err(OverrideDenial::ReauthenticationFailed(message).into());
            }
            Err(error) => return Err(GateFailure::Transport(error)),
        };

        if actor.role < required_role {
            tracing::warn!(
                document_id = %document.id,
                actor = %actor.identity,
                role = %actor.role,
                required = %required_role,
                "override refused for insufficient role"
            );
            return Err(OverrideDenial::InsufficientRole {
                required: required_role,
                actual: actor.role,
            }
            .into());
        }

        let prior_code = document
            .rejection_code()
            .cloned()
            .ok_or(OverrideDenial::MissingRejection)?;

        Ok(AuthorizedOverride {
            document_id: document.id.clone(),
            actor,
            justification: request.justification.trim().to_string(),
            prior_code,
            request,
        })
    }
}
