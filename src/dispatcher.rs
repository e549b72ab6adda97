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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::TransactionBroadcaster;
use crate::notifier::Notifier;
use crate::store::DirectoryStore;
use crate::types::Proposal;

/// Aggregate outcome of one dispatch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Accounts whose approval action was accepted by the chain
    pub success_count: usize,
    /// Accounts the dispatch attempted
    pub total_count: usize,
}

/// Fan-out of an approve decision across delegated accounts.
///
/// Behind a trait so the quorum tracker can be exercised against a
/// counting stand-in.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Broadcast weighted approvals for the proposal from every active
    /// credential. Never fails as a whole; per-account failures are
    /// absorbed into the summary.
    async fn dispatch(&self, proposal: &Proposal) -> DispatchSummary;
}

/// Production dispatcher: one concurrent task per active credential,
/// outcomes aggregated over a results channel.
pub struct VoteDispatcher {
    store: Arc<dyn DirectoryStore>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    notifier: Arc<dyn Notifier>,
}

impl VoteDispatcher {
    /// Create a dispatcher over the given collaborators
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            notifier,
        }
    }
}

#[async_trait]
impl Dispatcher for VoteDispatcher {
    async fn dispatch(&self, proposal: &Proposal) -> DispatchSummary {
        let batch_id = Uuid::new_v4();

        // Snapshot once; credentials deactivated mid-dispatch stay in
        // this run.
        let credentials = match self.store.active_credentials().await {
            Ok(credentials) => credentials,
            Err(err) => {
                error!(
                    "dispatch {} for proposal {} could not snapshot credentials: {}",
                    batch_id, proposal.id, err
                );
                let summary = DispatchSummary {
                    success_count: 0,
                    total_count: 0,
                };
                self.report(proposal, summary).await;
                return summary;
            }
        };

        let total_count = credentials.len();
        info!(
            "dispatch {} casting approvals for {} from {} accounts",
            batch_id, proposal.content_key, total_count
        );

        // Every outcome flows through the channel and is counted by
        // this task alone; the fan-out tasks share no mutable state.
        let (tx, mut rx) = mpsc::channel::<bool>(total_count.max(1));
        for credential in credentials {
            let tx = tx.clone();
            let broadcaster = self.broadcaster.clone();
            let author = proposal.content_key.author.clone();
            let permalink = proposal.content_key.permalink.clone();
            tokio::spawn(async move {
                let weight = credential.dispatch_weight();
                let outcome = broadcaster
                    .cast_approval(&credential.account_name, &author, &permalink, weight)
                    .await;
                let succeeded = match outcome {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(
                            "approval from {} failed: {}",
                            credential.account_name, err
                        );
                        false
                    }
                };
                // The receiver only drops once every sender is done
                let _ = tx.send(succeeded).await;
            });
        }
        drop(tx);

        let mut success_count = 0;
        while let Some(succeeded) = rx.recv().await {
            if succeeded {
                success_count += 1;
            }
        }

        let summary = DispatchSummary {
            success_count,
            total_count,
        };
        info!(
            "dispatch {} finished: {}/{} approvals accepted",
            batch_id, summary.success_count, summary.total_count
        );
        self.report(proposal, summary).await;
        summary
    }
}

impl VoteDispatcher {
    async fn report(&self, proposal: &Proposal, summary: DispatchSummary) {
        if let Err(err) = self
            .notifier
            .report_dispatch_outcome(proposal.id, summary.success_count, summary.total_count)
            .await
        {
            warn!(
                "could not report dispatch outcome for proposal {}: {}",
                proposal.id, err
            );
        }
    }
}
