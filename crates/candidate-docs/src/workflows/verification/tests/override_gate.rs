use super::common::*;
use std::sync::Arc;

use crate::workflows::verification::authorization::{
    DenialRemedy, GateFailure, OverrideDenial, OverrideEligibility, OverrideGate,
};
use crate::workflows::verification::catalog::RejectionCode;
use crate::workflows::verification::domain::{Role, VerificationStatus};
use crate::workflows::verification::gateway::GatewayError;

fn gate() -> (OverrideGate<FakeVerifier>, Arc<FakeVerifier>) {
    let verifier = Arc::new(FakeVerifier::default());
    (OverrideGate::new(verifier.clone()), verifier)
}

#[tokio::test]
async fn tampered_documents_never_reach_credential_checks() {
    let (gate, verifier) = gate();
    let document = rejected("doc-t", RejectionCode::DocumentTampered);

    let eligibility = gate.assess(&document);
    assert!(!eligibility.prompts_for_credentials());

    let request = override_request("doc-t", ADMIN_EMAIL, "looks fine to me, verified by phone");
    match gate.authorize(&document, request).await {
        Err(GateFailure::Denied(denial @ OverrideDenial::NotOverridable { .. })) => {
            assert_eq!(denial.remedy(), DenialRemedy::None);
        }
        other => panic!("expected not-overridable denial, got {other:?}"),
    }
    assert_eq!(verifier.calls(), 0);
}

#[tokio::test]
async fn photo_mismatch_is_blocked_even_for_super_admins() {
    let (gate, verifier) = gate();
    let document = with_rejection(rejected("doc-p", RejectionCode::PhotoMismatch), |rejection| {
        rejection.required_role = Role::SuperAdmin;
    });

    let request = override_request("doc-p", SUPER_EMAIL, "photo compared in person today");
    assert!(matches!(
        gate.authorize(&document, request).await,
        Err(GateFailure::Denied(OverrideDenial::NotOverridable { .. }))
    ));
    assert_eq!(verifier.calls(), 0);
}

#[tokio::test]
async fn short_justification_is_refused_before_reauthentication() {
    let (gate, verifier) = gate();
    let document = rejected("doc-1", RejectionCode::CnicMismatch);

    let request = override_request("doc-1", ADMIN_EMAIL, "bad doc");
    match gate.authorize(&document, request).await {
        Err(GateFailure::Denied(denial)) => {
            assert_eq!(
                denial,
                OverrideDenial::JustificationTooShort {
                    found: 7,
                    required: 10
                }
            );
            assert_eq!(denial.remedy(), DenialRemedy::CorrectInput);
        }
        other => panic!("expected justification denial, got {other:?}"),
    }
    assert_eq!(verifier.calls(), 0);
}

#[tokio::test]
async fn whitespace_does_not_count_toward_justification() {
    let (gate, _) = gate();
    let document = rejected("doc-1", RejectionCode::CnicMismatch);
    let request = override_request("doc-1", ADMIN_EMAIL, "   ok ok    ");
    assert!(matches!(
        gate.authorize(&document, request).await,
        Err(GateFailure::Denied(
            OverrideDenial::JustificationTooShort { found: 5, .. }
        ))
    ));
}

#[tokio::test]
async fn staff_role_cannot_override() {
    let (gate, verifier) = gate();
    let document = rejected("doc-1", RejectionCode::NameMismatch);
    let request = override_request("doc-1", STAFF_EMAIL, "name spelled differently on CNIC");

    match gate.authorize(&document, request).await {
        Err(GateFailure::Denied(denial)) => {
            assert_eq!(
                denial,
                OverrideDenial::InsufficientRole {
                    required: Role::Admin,
                    actual: Role::Staff
                }
            );
            assert_eq!(denial.remedy(), DenialRemedy::Reauthenticate);
        }
        other => panic!("expected role denial, got {other:?}"),
    }
    assert_eq!(verifier.calls(), 1);
}

#[tokio::test]
async fn remote_super_admin_requirement_is_honoured() {
    let (gate, _) = gate();
    let document = with_rejection(rejected("doc-1", RejectionCode::DobMismatch), |rejection| {
        rejection.required_role = Role::SuperAdmin;
    });

    assert_eq!(
        gate.assess(&document),
        OverrideEligibility::Eligible {
            required_role: Role::SuperAdmin
        }
    );

    let denied = override_request("doc-1", ADMIN_EMAIL, "date format differs between systems");
    assert!(matches!(
        gate.authorize(&document, denied).await,
        Err(GateFailure::Denied(OverrideDenial::InsufficientRole { .. }))
    ));

    let allowed = override_request("doc-1", SUPER_EMAIL, "date format differs between systems");
    let authorized = gate
        .authorize(&document, allowed)
        .await
        .expect("super admin may override");
    assert_eq!(authorized.actor.role, Role::SuperAdmin);
    assert_eq!(authorized.prior_code, RejectionCode::DobMismatch);
}

#[tokio::test]
async fn wrong_password_and_blank_credentials_are_denied() {
    let (gate, verifier) = gate();
    let document = rejected("doc-1", RejectionCode::CnicMismatch);

    let mut request = override_request("doc-1", ADMIN_EMAIL, "verified against NADRA record");
    request.credential.password = "guess".to_string();
    assert!(matches!(
        gate.authorize(&document, request).await,
        Err(GateFailure::Denied(OverrideDenial::ReauthenticationFailed(_)))
    ));

    let mut blank = override_request("doc-1", "  ", "verified against NADRA record");
    blank.credential.password.clear();
    assert!(matches!(
        gate.authorize(&document, blank).await,
        Err(GateFailure::Denied(OverrideDenial::MissingCredential))
    ));
    assert_eq!(verifier.calls(), 1);
}

#[tokio::test]
async fn verifier_outage_is_a_transport_failure() {
    let (gate, verifier) = gate();
    verifier.fail_with(GatewayError::Network("connection refused".to_string()));
    let document = rejected("doc-1", RejectionCode::CnicMismatch);
    let request = override_request("doc-1", ADMIN_EMAIL, "verified against NADRA record");

    assert!(matches!(
        gate.authorize(&document, request).await,
        Err(GateFailure::Transport(GatewayError::Network(_)))
    ));
}

#[tokio::test]
async fn only_rejected_or_failed_documents_are_eligible() {
    let (gate, verifier) = gate();
    let mut review = rejected("doc-1", RejectionCode::LowConfidence);
    review.verification_status = VerificationStatus::NeedsReview;

    let request = override_request("doc-1", ADMIN_EMAIL, "reviewed manually by compliance");
    assert!(matches!(
        gate.authorize(&review, request).await,
        Err(GateFailure::Denied(OverrideDenial::InvalidState {
            status: VerificationStatus::NeedsReview
        }))
    ));

    let mut failed = rejected("doc-2", RejectionCode::OcrFailed);
    failed.verification_status = VerificationStatus::Failed;
    assert!(gate.assess(&failed).prompts_for_credentials());
    assert_eq!(verifier.calls(), 0);
}
