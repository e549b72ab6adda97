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

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::{Proposal, QuorumDecision};

/// Outbound messaging gateway consumed by the core.
///
/// Implemented by the chat front-end; the core never depends on how
/// announcements are rendered. Notification failures are reported back
/// so callers can log them, but they never fail a core operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce a fresh proposal to the given curator chats
    async fn announce_proposal(&self, proposal: &Proposal, curator_chat_ids: &[i64])
        -> Result<()>;

    /// Refresh the running tally shown next to a proposal
    async fn update_quorum_display(
        &self,
        proposal_id: i64,
        positives: u32,
        negatives: u32,
    ) -> Result<()>;

    /// Report a quorum decision that did not lead to a dispatch
    async fn report_decision(&self, proposal_id: i64, decision: QuorumDecision) -> Result<()>;

    /// Report how many of the dispatched approval actions succeeded
    async fn report_dispatch_outcome(
        &self,
        proposal_id: i64,
        success_count: usize,
        total_count: usize,
    ) -> Result<()>;

    /// Report a completed referral payout
    async fn report_referral_payout(
        &self,
        referrer_account: &str,
        referee_account: &str,
        amount: &str,
    ) -> Result<()>;
}

/// Notifier that only writes to the log. Useful as a default wiring for
/// headless deployments and tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn announce_proposal(
        &self,
        proposal: &Proposal,
        curator_chat_ids: &[i64],
    ) -> Result<()> {
        info!(
            "announcing proposal {} ({}) to {} curators",
            proposal.id,
            proposal.content_key,
            curator_chat_ids.len()
        );
        Ok(())
    }

    async fn update_quorum_display(
        &self,
        proposal_id: i64,
        positives: u32,
        negatives: u32,
    ) -> Result<()> {
        info!(
            "proposal {} tally: {} for / {} against",
            proposal_id, positives, negatives
        );
        Ok(())
    }

    async fn report_decision(&self, proposal_id: i64, decision: QuorumDecision) -> Result<()> {
        info!("proposal {} {}", proposal_id, decision);
        Ok(())
    }

    async fn report_dispatch_outcome(
        &self,
        proposal_id: i64,
        success_count: usize,
        total_count: usize,
    ) -> Result<()> {
        info!(
            "proposal {} dispatched from {}/{} accounts",
            proposal_id, success_count, total_count
        );
        Ok(())
    }

    async fn report_referral_payout(
        &self,
        referrer_account: &str,
        referee_account: &str,
        amount: &str,
    ) -> Result<()> {
        info!(
            "referral payout of {} each to {} and {}",
            amount, referrer_account, referee_account
        );
        Ok(())
    }
}
