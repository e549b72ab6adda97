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

use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::chain::{ChainError, ContentInfo, ContentLedger};
use crate::config::IntakeConfig;
use crate::store::{DirectoryStore, NewProposal, StoreError};
use crate::types::{ContentKey, Proposal};

/// Reasons a proposal is refused at intake, plus the infrastructure
/// failures that can interrupt rule evaluation. Policy refusals are
/// caller outcomes, not system faults.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("content does not resolve on chain to the claimed key")]
    StaleContent,

    #[error("daily proposal quota exhausted")]
    QuotaExceeded,

    #[error("the immediately preceding proposal belongs to the same proposer")]
    ConsecutiveProposalRejected,

    #[error("content violates policy: {0}")]
    PolicyViolation(String),

    #[error("proposer holds no active credential")]
    NotAuthorized,

    #[error("content payout window already closed")]
    PayoutClosed,

    #[error("content has payouts disabled")]
    NoPayout,

    #[error("content body is too short")]
    ContentTooShort,

    #[error("an open proposal already exists for this content")]
    DuplicateProposal,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// A successfully admitted proposal together with the content that was
/// fetched while validating it, so downstream stages need not refetch.
#[derive(Debug, Clone)]
pub struct AdmittedProposal {
    pub proposal: Proposal,
    pub content: ContentInfo,
}

/// Validates proposed content items against the admission rules and
/// persists the ones that pass.
///
/// Rules run in a fixed order and the first failure wins; a refused
/// proposal leaves no trace in the store.
pub struct ProposalIntake {
    store: Arc<dyn DirectoryStore>,
    ledger: Arc<dyn ContentLedger>,
    config: IntakeConfig,
}

impl ProposalIntake {
    /// Create an intake over the given store and ledger
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        ledger: Arc<dyn ContentLedger>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    /// Evaluate all admission rules for a proposed content item and, if
    /// every rule passes, persist a new open proposal.
    pub async fn admit(
        &self,
        proposer_user_id: i64,
        content_key: ContentKey,
    ) -> Result<AdmittedProposal, AdmissionError> {
        // Rule 1: the content must exist and resolve to the claimed key
        let content = self
            .ledger
            .get_content(&content_key.author, &content_key.permalink)
            .await?
            .ok_or(AdmissionError::StaleContent)?;
        if content.author != content_key.author || content.permalink != content_key.permalink {
            return Err(AdmissionError::StaleContent);
        }

        // Rule 2: per-proposer daily quota since local midnight
        let today_count = self
            .store
            .proposal_count_for_user_since(proposer_user_id, local_midnight())
            .await?;
        if today_count >= self.config.max_daily_proposals {
            return Err(AdmissionError::QuotaExceeded);
        }

        // Rule 3: no back-to-back proposals from the same proposer,
        // measured globally across all proposers
        if let Some(latest) = self.store.latest_proposal().await? {
            if latest.proposer_user_id == proposer_user_id {
                return Err(AdmissionError::ConsecutiveProposalRejected);
            }
        }

        // Rule 4: content policy
        if self.config.censorship_enabled {
            if let Some(tag) = content
                .tags
                .iter()
                .find(|tag| self.config.banned_tags.contains(tag))
            {
                return Err(AdmissionError::PolicyViolation(format!(
                    "tag '{}' is banned",
                    tag
                )));
            }
        }
        if self.config.excluded_authors.contains(&content.author) {
            return Err(AdmissionError::PolicyViolation(format!(
                "author '{}' is excluded from curation",
                content.author
            )));
        }

        // Rule 5: only delegating users may propose
        let authorized = self
            .store
            .credential_by_owner(proposer_user_id)
            .await?
            .map(|c| c.active)
            .unwrap_or(false);
        if !authorized {
            return Err(AdmissionError::NotAuthorized);
        }

        // Rule 6: the payout window must still be open and payouts enabled
        if !content.payout_window_open {
            return Err(AdmissionError::PayoutClosed);
        }
        if content.payout_disabled {
            return Err(AdmissionError::NoPayout);
        }

        // Rule 7: minimum body length
        if content.body.chars().count() < self.config.min_content_length {
            return Err(AdmissionError::ContentTooShort);
        }

        // Rule 8: dedup — unique while incomplete, and optionally
        // blocked forever once a proposal for the key has completed
        if self
            .store
            .incomplete_proposal_by_content_key(&content_key)
            .await?
            .is_some()
        {
            return Err(AdmissionError::DuplicateProposal);
        }
        if !self.config.allow_reproposal
            && self
                .store
                .proposal_exists_for_content_key(&content_key)
                .await?
        {
            return Err(AdmissionError::DuplicateProposal);
        }

        let proposal = self
            .store
            .insert_proposal(NewProposal::new(proposer_user_id, content_key))
            .await?;
        info!(
            "admitted proposal {} for {} from user {}",
            proposal.id, proposal.content_key, proposer_user_id
        );
        debug!("content carries {} tags", content.tags.len());

        Ok(AdmittedProposal { proposal, content })
    }
}

/// Start of the current day in the deployment's local timezone.
fn local_midnight() -> DateTime<Utc> {
    let today = Local::now().date_naive();
    match Local.from_local_datetime(&today.and_time(NaiveTime::MIN)) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // A DST gap at midnight collapses the window to "now"
        LocalResult::None => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockContentLedger;
    use crate::store::MemoryStore;
    use crate::types::Credential;

    fn content(author: &str, permalink: &str) -> ContentInfo {
        ContentInfo {
            author: author.to_string(),
            permalink: permalink.to_string(),
            body: "a".repeat(2000),
            tags: vec!["life".to_string()],
            payout_window_open: true,
            payout_disabled: false,
        }
    }

    fn ledger_with(content_info: ContentInfo) -> Arc<MockContentLedger> {
        let mut ledger = MockContentLedger::new();
        ledger
            .expect_get_content()
            .returning(move |_, _| Ok(Some(content_info.clone())));
        Arc::new(ledger)
    }

    async fn store_with_credential(user_id: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_credential(Credential {
                owner_user_id: user_id,
                account_name: format!("account-{}", user_id),
                power_percent: 100,
                active: true,
            })
            .await
            .unwrap();
        store
    }

    fn intake(
        store: Arc<MemoryStore>,
        ledger: Arc<MockContentLedger>,
        config: IntakeConfig,
    ) -> ProposalIntake {
        ProposalIntake::new(store, ledger, config)
    }

    #[tokio::test]
    async fn happy_path_persists_open_proposal() {
        let store = store_with_credential(1).await;
        let intake = intake(
            store.clone(),
            ledger_with(content("alice", "post")),
            IntakeConfig::default(),
        );

        let admitted = intake
            .admit(1, ContentKey::new("alice", "post"))
            .await
            .unwrap();
        assert!(!admitted.proposal.completed);

        let stored = store
            .proposal_by_id(admitted.proposal.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.proposer_user_id, 1);
    }

    #[tokio::test]
    async fn missing_content_is_stale() {
        let mut ledger = MockContentLedger::new();
        ledger.expect_get_content().returning(|_, _| Ok(None));
        let intake = intake(
            store_with_credential(1).await,
            Arc::new(ledger),
            IntakeConfig::default(),
        );

        let result = intake.admit(1, ContentKey::new("alice", "gone")).await;
        assert!(matches!(result, Err(AdmissionError::StaleContent)));
    }

    #[tokio::test]
    async fn quota_is_enforced_per_day() {
        let store = store_with_credential(1).await;
        // A second proposer breaks the consecutive-proposal rule between admissions
        store
            .upsert_credential(Credential {
                owner_user_id: 2,
                account_name: "other".to_string(),
                power_percent: 100,
                active: true,
            })
            .await
            .unwrap();

        let config = IntakeConfig {
            max_daily_proposals: 2,
            ..IntakeConfig::default()
        };
        let ledger = {
            let mut ledger = MockContentLedger::new();
            ledger.expect_get_content().returning(|author, permalink| {
                Ok(Some(content(author, permalink)))
            });
            Arc::new(ledger)
        };
        let intake = intake(store.clone(), ledger, config);

        intake.admit(1, ContentKey::new("a", "p1")).await.unwrap();
        intake.admit(2, ContentKey::new("a", "p2")).await.unwrap();
        intake.admit(1, ContentKey::new("a", "p3")).await.unwrap();
        intake.admit(2, ContentKey::new("a", "p4")).await.unwrap();

        let result = intake.admit(1, ContentKey::new("a", "p5")).await;
        assert!(matches!(result, Err(AdmissionError::QuotaExceeded)));
    }

    #[tokio::test]
    async fn back_to_back_proposals_are_rejected() {
        let store = store_with_credential(1).await;
        store
            .upsert_credential(Credential {
                owner_user_id: 2,
                account_name: "other".to_string(),
                power_percent: 100,
                active: true,
            })
            .await
            .unwrap();
        let ledger = {
            let mut ledger = MockContentLedger::new();
            ledger.expect_get_content().returning(|author, permalink| {
                Ok(Some(content(author, permalink)))
            });
            Arc::new(ledger)
        };
        let intake = intake(store, ledger, IntakeConfig::default());

        intake.admit(1, ContentKey::new("a", "p1")).await.unwrap();
        let result = intake.admit(1, ContentKey::new("a", "p2")).await;
        assert!(matches!(
            result,
            Err(AdmissionError::ConsecutiveProposalRejected)
        ));

        // A different proposer in between clears the restriction
        intake.admit(2, ContentKey::new("a", "p3")).await.unwrap();
        intake.admit(1, ContentKey::new("a", "p4")).await.unwrap();
    }

    #[tokio::test]
    async fn banned_tags_are_refused_when_censorship_enabled() {
        let mut item = content("alice", "post");
        item.tags = vec!["politics".to_string()];
        let config = IntakeConfig {
            censorship_enabled: true,
            banned_tags: vec!["politics".to_string()],
            ..IntakeConfig::default()
        };
        let intake = intake(store_with_credential(1).await, ledger_with(item), config);

        let result = intake.admit(1, ContentKey::new("alice", "post")).await;
        assert!(matches!(result, Err(AdmissionError::PolicyViolation(_))));
    }

    #[tokio::test]
    async fn excluded_authors_are_refused() {
        let config = IntakeConfig {
            excluded_authors: vec!["alice".to_string()],
            ..IntakeConfig::default()
        };
        let intake = intake(
            store_with_credential(1).await,
            ledger_with(content("alice", "post")),
            config,
        );

        let result = intake.admit(1, ContentKey::new("alice", "post")).await;
        assert!(matches!(result, Err(AdmissionError::PolicyViolation(_))));
    }

    #[tokio::test]
    async fn proposer_without_active_credential_is_refused() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_credential(Credential {
                owner_user_id: 1,
                account_name: "account-1".to_string(),
                power_percent: 100,
                active: false,
            })
            .await
            .unwrap();
        let intake = intake(
            store,
            ledger_with(content("alice", "post")),
            IntakeConfig::default(),
        );

        let result = intake.admit(1, ContentKey::new("alice", "post")).await;
        assert!(matches!(result, Err(AdmissionError::NotAuthorized)));
    }

    #[tokio::test]
    async fn closed_or_disabled_payouts_are_refused() {
        let mut closed = content("alice", "post");
        closed.payout_window_open = false;
        let intake_closed = intake(
            store_with_credential(1).await,
            ledger_with(closed),
            IntakeConfig::default(),
        );
        assert!(matches!(
            intake_closed.admit(1, ContentKey::new("alice", "post")).await,
            Err(AdmissionError::PayoutClosed)
        ));

        let mut disabled = content("alice", "post");
        disabled.payout_disabled = true;
        let intake_disabled = intake(
            store_with_credential(1).await,
            ledger_with(disabled),
            IntakeConfig::default(),
        );
        assert!(matches!(
            intake_disabled
                .admit(1, ContentKey::new("alice", "post"))
                .await,
            Err(AdmissionError::NoPayout)
        ));
    }

    #[tokio::test]
    async fn short_content_is_refused() {
        let mut item = content("alice", "post");
        item.body = "too short".to_string();
        let intake = intake(
            store_with_credential(1).await,
            ledger_with(item),
            IntakeConfig::default(),
        );

        let result = intake.admit(1, ContentKey::new("alice", "post")).await;
        assert!(matches!(result, Err(AdmissionError::ContentTooShort)));
    }

    #[tokio::test]
    async fn duplicate_while_incomplete_is_refused() {
        let store = store_with_credential(1).await;
        store
            .upsert_credential(Credential {
                owner_user_id: 2,
                account_name: "other".to_string(),
                power_percent: 100,
                active: true,
            })
            .await
            .unwrap();
        let ledger = {
            let mut ledger = MockContentLedger::new();
            ledger.expect_get_content().returning(|author, permalink| {
                Ok(Some(content(author, permalink)))
            });
            Arc::new(ledger)
        };
        let intake = intake(store.clone(), ledger, IntakeConfig::default());

        intake.admit(1, ContentKey::new("alice", "post")).await.unwrap();
        let result = intake.admit(2, ContentKey::new("alice", "post")).await;
        assert!(matches!(result, Err(AdmissionError::DuplicateProposal)));
    }

    #[tokio::test]
    async fn reproposal_after_completion_follows_policy() {
        let store = store_with_credential(1).await;
        store
            .upsert_credential(Credential {
                owner_user_id: 2,
                account_name: "other".to_string(),
                power_percent: 100,
                active: true,
            })
            .await
            .unwrap();
        let ledger = {
            let mut ledger = MockContentLedger::new();
            ledger.expect_get_content().returning(|author, permalink| {
                Ok(Some(content(author, permalink)))
            });
            Arc::new(ledger)
        };

        // Default policy: a completed proposal blocks its key permanently
        let strict = intake(store.clone(), ledger.clone(), IntakeConfig::default());
        let admitted = strict
            .admit(1, ContentKey::new("alice", "post"))
            .await
            .unwrap();
        store
            .complete_proposal_if_open(admitted.proposal.id)
            .await
            .unwrap();
        assert!(matches!(
            strict.admit(2, ContentKey::new("alice", "post")).await,
            Err(AdmissionError::DuplicateProposal)
        ));

        // Permissive policy admits the same key again once completed
        let permissive = intake(
            store.clone(),
            ledger,
            IntakeConfig {
                allow_reproposal: true,
                ..IntakeConfig::default()
            },
        );
        permissive
            .admit(2, ContentKey::new("alice", "post"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_failing_rule_wins() {
        // Content that violates both the payout rules and the length
        // rule must report the payout failure, which runs first.
        let mut item = content("alice", "post");
        item.payout_window_open = false;
        item.body = "short".to_string();
        let intake = intake(
            store_with_credential(1).await,
            ledger_with(item),
            IntakeConfig::default(),
        );

        let result = intake.admit(1, ContentKey::new("alice", "post")).await;
        assert!(matches!(result, Err(AdmissionError::PayoutClosed)));
    }
}
