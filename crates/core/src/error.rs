//! Why messages get dropped and rounds get aborted.
//!
//! Neither type is ever returned as an `Err` out of the state machine: they
//! travel inside [`Action::EnvelopeDropped`](crate::Action::EnvelopeDropped)
//! and [`Action::RoundAborted`](crate::Action::RoundAborted).

use thiserror::Error;

/// Per-message validation failure. Only ever shrinks the round's vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Error)]
pub enum DropReason {
    #[error("envelope signature does not verify")]
    InvalidSignature,

    #[error("envelope body does not decode")]
    MalformedBody,

    #[error("public key is not an authorized pulsar")]
    UnauthorizedPeer,

    #[error("message is for a round that is already closed")]
    StaleRound,

    #[error("message is for a round that has not opened")]
    FutureRound,

    #[error("commitment arrived after the commit window closed")]
    CommitWindowClosed,

    #[error("message is not valid in the current phase")]
    UnexpectedPhase,

    #[error("revealed entropy does not match the commitment")]
    RevealMismatch,

    #[error("reveal has no commitment to check against")]
    MissingCommitment,

    #[error("pulse endorsement does not verify")]
    InvalidEndorsement,
}

impl DropReason {
    /// All variants, for pre-registering metric labels.
    pub const ALL: [DropReason; 10] = [
        DropReason::InvalidSignature,
        DropReason::MalformedBody,
        DropReason::UnauthorizedPeer,
        DropReason::StaleRound,
        DropReason::FutureRound,
        DropReason::CommitWindowClosed,
        DropReason::UnexpectedPhase,
        DropReason::RevealMismatch,
        DropReason::MissingCommitment,
        DropReason::InvalidEndorsement,
    ];

    /// Short label used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidSignature => "invalid_signature",
            DropReason::MalformedBody => "malformed_body",
            DropReason::UnauthorizedPeer => "unauthorized_peer",
            DropReason::StaleRound => "stale_round",
            DropReason::FutureRound => "future_round",
            DropReason::CommitWindowClosed => "commit_window_closed",
            DropReason::UnexpectedPhase => "unexpected_phase",
            DropReason::RevealMismatch => "reveal_mismatch",
            DropReason::MissingCommitment => "missing_commitment",
            DropReason::InvalidEndorsement => "invalid_endorsement",
        }
    }
}

/// Round-level failure. Reported, then retried with the next pulse number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortCause {
    #[error("quorum not reached: {collected} of {required} contributions")]
    QuorumNotReached { collected: usize, required: usize },

    #[error("endorsements missing: {collected} of {required} signed the pulse")]
    EndorsementsMissing { collected: usize, required: usize },

    #[error("local pulsar is not in the roster")]
    NotInRoster,
}

impl AbortCause {
    /// Short label used in metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortCause::QuorumNotReached { .. } => "quorum_not_reached",
            AbortCause::EndorsementsMissing { .. } => "endorsements_missing",
            AbortCause::NotInRoster => "not_in_roster",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_labels_are_unique() {
        let labels: HashSet<_> = DropReason::ALL.iter().map(DropReason::as_str).collect();
        assert_eq!(labels.len(), DropReason::ALL.len());
    }

    #[test]
    fn test_abort_cause_display() {
        let cause = AbortCause::QuorumNotReached {
            collected: 2,
            required: 3,
        };
        assert_eq!(
            cause.to_string(),
            "quorum not reached: 2 of 3 contributions"
        );
        let cause = AbortCause::EndorsementsMissing {
            collected: 1,
            required: 3,
        };
        assert_eq!(cause.as_str(), "endorsements_missing");
    }
}
