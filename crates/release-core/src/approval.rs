//! Approval quorum logic.
//!
//! Ported from `ActiveReleaseService.confirm_approve` /
//! `confirm_reject` in `original_source`: a release in
//! `manual_testing` collects approvals from a fixed operator list
//! (`required_approve_list`); the first reject fails the release
//! immediately, and the last required approval closes the quorum and
//! flips the release to `manual_test_passed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::release::ReleaseStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalVote {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub release_id: i64,
    pub approver: String,
    pub vote: ApprovalVote,
    pub decided_at: DateTime<Utc>,
}

/// Outcome of applying one decision to a release's approval state,
/// distinguishing a vote that merely records from one that closes the
/// quorum — the Operator Console needs to know which message to send
/// back and whether to fire the CI dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuorumOutcome {
    /// Recorded, quorum still open.
    AcceptedNotFinal,
    /// Recorded and this was the last required approval; release
    /// status moves to `ManualTestPassed`.
    AcceptedFinal,
    /// A reject was recorded; release status moves to
    /// `ManualTestFailed`.
    Rejected,
}

/// Checks whether `approver` may vote at all, and whether they have
/// already voted. Mirrors the eligibility + already-voted guard in
/// `confirm_approve`/`confirm_reject` before either touches the DB.
pub fn check_eligibility(
    required_approvers: &[String],
    approved_list: &[String],
    approver: &str,
) -> Result<(), EligibilityError> {
    if !required_approvers.iter().any(|a| a == approver) {
        return Err(EligibilityError::NotEligible);
    }
    if approved_list.iter().any(|a| a == approver) {
        return Err(EligibilityError::AlreadyVoted);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityError {
    NotEligible,
    AlreadyVoted,
}

/// Computes the quorum outcome of adding `approver` to `approved_list`
/// given the full `required_approvers` roster, without mutating
/// anything — the caller applies the resulting status transition
/// inside its own storage transaction.
pub fn quorum_outcome(
    required_approvers: &[String],
    approved_list: &[String],
    approver: &str,
) -> QuorumOutcome {
    let mut next = approved_list.to_vec();
    if !next.iter().any(|a| a == approver) {
        next.push(approver.to_string());
    }
    let all_in = required_approvers
        .iter()
        .all(|req| next.iter().any(|a| a == req));
    if all_in {
        QuorumOutcome::AcceptedFinal
    } else {
        QuorumOutcome::AcceptedNotFinal
    }
}

impl QuorumOutcome {
    pub fn resulting_status(self) -> Option<ReleaseStatus> {
        match self {
            QuorumOutcome::AcceptedFinal => Some(ReleaseStatus::ManualTestPassed),
            QuorumOutcome::Rejected => Some(ReleaseStatus::ManualTestFailed),
            QuorumOutcome::AcceptedNotFinal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<String> {
        vec!["alice".into(), "bob".into(), "carol".into()]
    }

    #[test]
    fn ineligible_approver_is_rejected() {
        let err = check_eligibility(&roster(), &[], "mallory").unwrap_err();
        assert_eq!(err, EligibilityError::NotEligible);
    }

    #[test]
    fn repeat_vote_is_rejected() {
        let approved = vec!["alice".to_string()];
        let err = check_eligibility(&roster(), &approved, "alice").unwrap_err();
        assert_eq!(err, EligibilityError::AlreadyVoted);
    }

    #[test]
    fn quorum_stays_open_until_last_required_approver_votes() {
        let approved = vec!["alice".to_string()];
        assert_eq!(
            quorum_outcome(&roster(), &approved, "bob"),
            QuorumOutcome::AcceptedNotFinal
        );
    }

    #[test]
    fn last_approver_closes_the_quorum() {
        let approved = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(
            quorum_outcome(&roster(), &approved, "carol"),
            QuorumOutcome::AcceptedFinal
        );
    }

    #[test]
    fn closed_quorum_maps_to_manual_test_passed() {
        assert_eq!(
            QuorumOutcome::AcceptedFinal.resulting_status(),
            Some(ReleaseStatus::ManualTestPassed)
        );
        assert_eq!(QuorumOutcome::AcceptedNotFinal.resulting_status(), None);
    }
}
