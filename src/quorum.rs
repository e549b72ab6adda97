// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Curation Collective
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::QuorumConfig;
use crate::dispatcher::Dispatcher;
use crate::notifier::Notifier;
use crate::store::{DirectoryStore, StoreError};
use crate::types::{CuratorResponse, QuorumDecision};

/// Errors from quorum tracking
#[derive(Debug, Error)]
pub enum QuorumError {
    #[error("proposal not found: {0}")]
    ProposalNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a response was silently dropped rather than recorded.
///
/// None of these are errors to the caller; they carry an informational
/// signal the front-end may choose to show the curator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The proposal was already resolved
    AlreadyCompleted,
    /// The curator already answered this proposal
    DuplicateResponse,
    /// Curators cannot respond to their own proposals
    SelfVote,
    /// The responder is not an active curator
    NotActiveCurator,
}

/// Result of recording one curator response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The response entered the tally
    Recorded {
        positives: u32,
        negatives: u32,
        /// Set when this response resolved the proposal
        decision: Option<QuorumDecision>,
    },
    /// The response was dropped as a no-op
    Ignored(IgnoreReason),
}

/// Records curator responses and resolves proposals once the response
/// count reaches the required threshold.
///
/// The resolution is guarded by the store's conditional completion, so
/// concurrent responses racing past the threshold resolve the proposal
/// exactly once.
pub struct QuorumTracker {
    store: Arc<dyn DirectoryStore>,
    dispatcher: Arc<dyn Dispatcher>,
    notifier: Arc<dyn Notifier>,
    config: QuorumConfig,
}

impl QuorumTracker {
    /// Create a tracker over the given collaborators
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        dispatcher: Arc<dyn Dispatcher>,
        notifier: Arc<dyn Notifier>,
        config: QuorumConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            config,
        }
    }

    /// Record one curator's approve/reject signal on a proposal.
    pub async fn record_response(
        &self,
        curator_user_id: i64,
        proposal_id: i64,
        approve: bool,
    ) -> Result<RecordOutcome, QuorumError> {
        let curator_active = self
            .store
            .curator_by_user(curator_user_id)
            .await?
            .map(|c| c.active)
            .unwrap_or(false);
        if !curator_active {
            debug!(
                "dropping response from non-curator {} on proposal {}",
                curator_user_id, proposal_id
            );
            return Ok(RecordOutcome::Ignored(IgnoreReason::NotActiveCurator));
        }

        let proposal = self
            .store
            .proposal_by_id(proposal_id)
            .await?
            .ok_or(QuorumError::ProposalNotFound(proposal_id))?;
        if proposal.completed {
            return Ok(RecordOutcome::Ignored(IgnoreReason::AlreadyCompleted));
        }
        if proposal.proposer_user_id == curator_user_id {
            debug!(
                "dropping self-vote from {} on proposal {}",
                curator_user_id, proposal_id
            );
            return Ok(RecordOutcome::Ignored(IgnoreReason::SelfVote));
        }

        let recorded = self
            .store
            .insert_response_if_absent(CuratorResponse::new(
                curator_user_id,
                proposal_id,
                approve,
            ))
            .await?;
        if !recorded {
            debug!(
                "duplicate response from {} on proposal {} ignored",
                curator_user_id, proposal_id
            );
            return Ok(RecordOutcome::Ignored(IgnoreReason::DuplicateResponse));
        }

        let responses = self.store.responses_for_proposal(proposal_id).await?;
        let positives = responses.iter().filter(|r| r.approve).count() as u32;
        let negatives = responses.len() as u32 - positives;

        if let Err(err) = self
            .notifier
            .update_quorum_display(proposal_id, positives, negatives)
            .await
        {
            warn!(
                "could not refresh tally display for proposal {}: {}",
                proposal_id, err
            );
        }

        let mut decision = None;
        if positives + negatives >= self.config.required_votes {
            // Only the caller that wins the conditional completion
            // resolves the proposal; racing responses past the
            // threshold fall through as plain recorded responses.
            if self.store.complete_proposal_if_open(proposal_id).await? {
                // Ties favor approval
                let resolved = if positives >= negatives {
                    QuorumDecision::Approved
                } else {
                    QuorumDecision::Rejected
                };
                info!(
                    "proposal {} resolved {} at {} for / {} against",
                    proposal_id, resolved, positives, negatives
                );

                match resolved {
                    QuorumDecision::Approved => {
                        self.dispatcher.dispatch(&proposal).await;
                    }
                    QuorumDecision::Rejected => {
                        if let Err(err) = self
                            .notifier
                            .report_decision(proposal_id, resolved)
                            .await
                        {
                            warn!(
                                "could not report rejection of proposal {}: {}",
                                proposal_id, err
                            );
                        }
                    }
                }
                decision = Some(resolved);
            }
        }

        Ok(RecordOutcome::Recorded {
            positives,
            negatives,
            decision,
        })
    }
}
