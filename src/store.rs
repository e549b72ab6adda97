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

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::types::{ContentKey, Credential, Curator, CuratorResponse, Proposal, Referral};

/// Errors that can occur during directory store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Fields of a proposal before the store has assigned it an id.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub proposer_user_id: i64,
    pub content_key: ContentKey,
    pub submitted_at: DateTime<Utc>,
}

impl NewProposal {
    /// Create a proposal record stamped with the current time
    pub fn new(proposer_user_id: i64, content_key: ContentKey) -> Self {
        Self {
            proposer_user_id,
            content_key,
            submitted_at: Utc::now(),
        }
    }
}

/// Persistence for proposals, responses, credentials, curators and
/// referrals.
///
/// The single non-CRUD operation is `complete_proposal_if_open`, the
/// atomic conditional transition that guards quorum resolution against
/// concurrent response arrival. Both implementations guarantee that at
/// most one caller ever observes the false -> true transition for a
/// given proposal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Persist a new proposal and return it with its assigned id
    async fn insert_proposal(&self, proposal: NewProposal) -> Result<Proposal, StoreError>;

    /// Fetch a proposal by id
    async fn proposal_by_id(&self, id: i64) -> Result<Option<Proposal>, StoreError>;

    /// Find an open proposal for the given content key, if any
    async fn incomplete_proposal_by_content_key(
        &self,
        key: &ContentKey,
    ) -> Result<Option<Proposal>, StoreError>;

    /// Whether any proposal, open or completed, exists for the key
    async fn proposal_exists_for_content_key(&self, key: &ContentKey)
        -> Result<bool, StoreError>;

    /// The most recently admitted proposal across all proposers
    async fn latest_proposal(&self) -> Result<Option<Proposal>, StoreError>;

    /// Number of proposals a user has had admitted since the cutoff
    async fn proposal_count_for_user_since(
        &self,
        proposer_user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Atomically transition `completed` from false to true.
    /// Returns true iff this call performed the transition.
    async fn complete_proposal_if_open(&self, id: i64) -> Result<bool, StoreError>;

    /// Record a curator response unless one already exists for the
    /// (curator, proposal) pair. Returns true iff the response was
    /// newly recorded.
    async fn insert_response_if_absent(
        &self,
        response: CuratorResponse,
    ) -> Result<bool, StoreError>;

    /// All responses recorded for a proposal
    async fn responses_for_proposal(
        &self,
        proposal_id: i64,
    ) -> Result<Vec<CuratorResponse>, StoreError>;

    /// Insert or replace the credential for its owner
    async fn upsert_credential(&self, credential: Credential) -> Result<(), StoreError>;

    /// Fetch the credential owned by a user, if any
    async fn credential_by_owner(
        &self,
        owner_user_id: i64,
    ) -> Result<Option<Credential>, StoreError>;

    /// Snapshot of all credentials with `active = true`
    async fn active_credentials(&self) -> Result<Vec<Credential>, StoreError>;

    /// Flip a credential's active flag
    async fn set_credential_active(
        &self,
        owner_user_id: i64,
        active: bool,
    ) -> Result<(), StoreError>;

    /// Insert or replace a curator record
    async fn upsert_curator(&self, curator: Curator) -> Result<(), StoreError>;

    /// Fetch a curator by user id
    async fn curator_by_user(&self, user_id: i64) -> Result<Option<Curator>, StoreError>;

    /// All curators with `active = true`
    async fn active_curators(&self) -> Result<Vec<Curator>, StoreError>;

    /// Record a pending referral for a referee
    async fn insert_referral(&self, referral: Referral) -> Result<(), StoreError>;

    /// Fetch the referral recorded for a referee, if any
    async fn referral_by_referee(
        &self,
        referee_user_id: i64,
    ) -> Result<Option<Referral>, StoreError>;

    /// Whether an account has already acted as a referrer
    async fn referrer_exists(&self, referrer_account: &str) -> Result<bool, StoreError>;

    /// Mark a referee's referral completed
    async fn complete_referral(&self, referee_user_id: i64) -> Result<(), StoreError>;
}

/// In-memory implementation of the directory store.
///
/// Used by tests and single-process deployments that do not need
/// durability across restarts.
pub struct MemoryStore {
    proposals: Arc<RwLock<HashMap<i64, Proposal>>>,
    next_proposal_id: AtomicI64,
    responses: Arc<RwLock<HashMap<(i64, i64), CuratorResponse>>>,
    credentials: Arc<RwLock<HashMap<i64, Credential>>>,
    curators: Arc<RwLock<HashMap<i64, Curator>>>,
    referrals: Arc<RwLock<HashMap<i64, Referral>>>,
}

impl MemoryStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self {
            proposals: Arc::new(RwLock::new(HashMap::new())),
            next_proposal_id: AtomicI64::new(1),
            responses: Arc::new(RwLock::new(HashMap::new())),
            credentials: Arc::new(RwLock::new(HashMap::new())),
            curators: Arc::new(RwLock::new(HashMap::new())),
            referrals: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn insert_proposal(&self, proposal: NewProposal) -> Result<Proposal, StoreError> {
        let id = self.next_proposal_id.fetch_add(1, Ordering::SeqCst);
        let record = Proposal {
            id,
            proposer_user_id: proposal.proposer_user_id,
            content_key: proposal.content_key,
            submitted_at: proposal.submitted_at,
            completed: false,
        };
        self.proposals.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn proposal_by_id(&self, id: i64) -> Result<Option<Proposal>, StoreError> {
        Ok(self.proposals.read().await.get(&id).cloned())
    }

    async fn incomplete_proposal_by_content_key(
        &self,
        key: &ContentKey,
    ) -> Result<Option<Proposal>, StoreError> {
        let proposals = self.proposals.read().await;
        Ok(proposals
            .values()
            .find(|p| !p.completed && &p.content_key == key)
            .cloned())
    }

    async fn proposal_exists_for_content_key(
        &self,
        key: &ContentKey,
    ) -> Result<bool, StoreError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.values().any(|p| &p.content_key == key))
    }

    async fn latest_proposal(&self) -> Result<Option<Proposal>, StoreError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.values().max_by_key(|p| p.id).cloned())
    }

    async fn proposal_count_for_user_since(
        &self,
        proposer_user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let proposals = self.proposals.read().await;
        let count = proposals
            .values()
            .filter(|p| p.proposer_user_id == proposer_user_id && p.submitted_at >= since)
            .count();
        Ok(count as u32)
    }

    async fn complete_proposal_if_open(&self, id: i64) -> Result<bool, StoreError> {
        // The check and the write happen under a single write lock, so
        // only one caller can observe the open state.
        let mut proposals = self.proposals.write().await;
        match proposals.get_mut(&id) {
            Some(proposal) if !proposal.completed => {
                proposal.completed = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("proposal {}", id))),
        }
    }

    async fn insert_response_if_absent(
        &self,
        response: CuratorResponse,
    ) -> Result<bool, StoreError> {
        let mut responses = self.responses.write().await;
        let key = (response.proposal_id, response.curator_user_id);
        if responses.contains_key(&key) {
            return Ok(false);
        }
        responses.insert(key, response);
        Ok(true)
    }

    async fn responses_for_proposal(
        &self,
        proposal_id: i64,
    ) -> Result<Vec<CuratorResponse>, StoreError> {
        let responses = self.responses.read().await;
        let mut found: Vec<CuratorResponse> = responses
            .values()
            .filter(|r| r.proposal_id == proposal_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.responded_at);
        Ok(found)
    }

    async fn upsert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        self.credentials
            .write()
            .await
            .insert(credential.owner_user_id, credential);
        Ok(())
    }

    async fn credential_by_owner(
        &self,
        owner_user_id: i64,
    ) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.read().await.get(&owner_user_id).cloned())
    }

    async fn active_credentials(&self) -> Result<Vec<Credential>, StoreError> {
        let credentials = self.credentials.read().await;
        Ok(credentials.values().filter(|c| c.active).cloned().collect())
    }

    async fn set_credential_active(
        &self,
        owner_user_id: i64,
        active: bool,
    ) -> Result<(), StoreError> {
        let mut credentials = self.credentials.write().await;
        match credentials.get_mut(&owner_user_id) {
            Some(credential) => {
                credential.active = active;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "credential for user {}",
                owner_user_id
            ))),
        }
    }

    async fn upsert_curator(&self, curator: Curator) -> Result<(), StoreError> {
        self.curators.write().await.insert(curator.user_id, curator);
        Ok(())
    }

    async fn curator_by_user(&self, user_id: i64) -> Result<Option<Curator>, StoreError> {
        Ok(self.curators.read().await.get(&user_id).cloned())
    }

    async fn active_curators(&self) -> Result<Vec<Curator>, StoreError> {
        let curators = self.curators.read().await;
        let mut active: Vec<Curator> = curators.values().filter(|c| c.active).cloned().collect();
        active.sort_by_key(|c| c.user_id);
        Ok(active)
    }

    async fn insert_referral(&self, referral: Referral) -> Result<(), StoreError> {
        self.referrals
            .write()
            .await
            .insert(referral.referee_user_id, referral);
        Ok(())
    }

    async fn referral_by_referee(
        &self,
        referee_user_id: i64,
    ) -> Result<Option<Referral>, StoreError> {
        Ok(self.referrals.read().await.get(&referee_user_id).cloned())
    }

    async fn referrer_exists(&self, referrer_account: &str) -> Result<bool, StoreError> {
        let referrals = self.referrals.read().await;
        Ok(referrals
            .values()
            .any(|r| r.referrer_account == referrer_account))
    }

    async fn complete_referral(&self, referee_user_id: i64) -> Result<(), StoreError> {
        let mut referrals = self.referrals.write().await;
        match referrals.get_mut(&referee_user_id) {
            Some(referral) => {
                referral.completed = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!(
                "referral for user {}",
                referee_user_id
            ))),
        }
    }
}

/// Create an in-memory directory store
pub fn create_memory_store() -> Arc<dyn DirectoryStore> {
    Arc::new(MemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn proposal_round_trip() {
        let store = MemoryStore::new();
        let created = store
            .insert_proposal(NewProposal::new(7, ContentKey::new("alice", "post")))
            .await
            .unwrap();
        assert!(!created.completed);

        let fetched = store.proposal_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.proposer_user_id, 7);
        assert_eq!(fetched.content_key, ContentKey::new("alice", "post"));
    }

    #[tokio::test]
    async fn complete_transition_happens_once() {
        let store = Arc::new(MemoryStore::new());
        let proposal = store
            .insert_proposal(NewProposal::new(1, ContentKey::new("alice", "post")))
            .await
            .unwrap();

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            let id = proposal.id;
            async move { store.complete_proposal_if_open(id).await.unwrap() }
        });
        let transitions: usize = join_all(attempts).await.into_iter().filter(|t| *t).count();
        assert_eq!(transitions, 1);
    }

    #[tokio::test]
    async fn duplicate_response_is_rejected() {
        let store = MemoryStore::new();
        let first = store
            .insert_response_if_absent(CuratorResponse::new(5, 1, true))
            .await
            .unwrap();
        let second = store
            .insert_response_if_absent(CuratorResponse::new(5, 1, false))
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        let responses = store.responses_for_proposal(1).await.unwrap();
        assert_eq!(responses.len(), 1);
        // The first answer stands
        assert!(responses[0].approve);
    }

    #[tokio::test]
    async fn daily_count_respects_cutoff() {
        let store = MemoryStore::new();
        store
            .insert_proposal(NewProposal::new(1, ContentKey::new("a", "p1")))
            .await
            .unwrap();
        store
            .insert_proposal(NewProposal::new(1, ContentKey::new("a", "p2")))
            .await
            .unwrap();
        store
            .insert_proposal(NewProposal::new(2, ContentKey::new("a", "p3")))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(
            store.proposal_count_for_user_since(1, cutoff).await.unwrap(),
            2
        );
        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(
            store.proposal_count_for_user_since(1, future).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn upsert_credential_keeps_latest_per_owner() {
        let store = MemoryStore::new();
        store
            .upsert_credential(Credential {
                owner_user_id: 3,
                account_name: "old-account".to_string(),
                power_percent: 100,
                active: true,
            })
            .await
            .unwrap();
        store
            .upsert_credential(Credential {
                owner_user_id: 3,
                account_name: "new-account".to_string(),
                power_percent: 40,
                active: true,
            })
            .await
            .unwrap();

        let credential = store.credential_by_owner(3).await.unwrap().unwrap();
        assert_eq!(credential.account_name, "new-account");
        assert_eq!(store.active_credentials().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inactive_credentials_are_not_snapshotted() {
        let store = MemoryStore::new();
        for (user, active) in [(1, true), (2, false), (3, true)] {
            store
                .upsert_credential(Credential {
                    owner_user_id: user,
                    account_name: format!("account-{}", user),
                    power_percent: 100,
                    active,
                })
                .await
                .unwrap();
        }
        let snapshot = store.active_credentials().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|c| c.active));
    }
}
