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

use anyhow::Result;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::authority::{create_authority_checker, AuthorityChecker};
use crate::chain::{ChainError, ContentLedger, TransactionBroadcaster};
use crate::config::EngineConfig;
use crate::dispatcher::VoteDispatcher;
use crate::intake::{AdmissionError, ProposalIntake};
use crate::notifier::Notifier;
use crate::quorum::{QuorumTracker, RecordOutcome};
use crate::referral::ReferralRewarder;
use crate::session::ResponseEvent;
use crate::similarity::SimilarityChecker;
use crate::store::{DirectoryStore, StoreError};
use crate::types::{ContentKey, Credential, Curator, Proposal, Referral};
use crate::uniqueness::{GateConfig, UniquenessGate};

/// Errors from credential management operations
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("power value {0} is outside 1..=100")]
    InvalidPowerValue(u8),

    #[error("no active credential for this user")]
    NoActiveCredential,

    #[error("account {0} does not exist on chain")]
    AccountNotFound(String),

    #[error("account has not delegated posting authority to the service")]
    AuthorityNotDelegated,

    #[error("account stake is below the minimum for power changes")]
    InsufficientStake,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Explicit context object tying the engine's components to their
/// collaborators. Constructed once at startup; every handle is shared,
/// nothing lives in process-wide state.
pub struct CurationEngine {
    config: EngineConfig,
    store: Arc<dyn DirectoryStore>,
    ledger: Arc<dyn ContentLedger>,
    notifier: Arc<dyn Notifier>,
    intake: ProposalIntake,
    gate: Arc<UniquenessGate>,
    quorum: QuorumTracker,
    authority: Arc<AuthorityChecker>,
    referral: ReferralRewarder,
}

impl CurationEngine {
    /// Wire up all components over the given collaborators
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DirectoryStore>,
        ledger: Arc<dyn ContentLedger>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        similarity: Arc<dyn SimilarityChecker>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let intake = ProposalIntake::new(store.clone(), ledger.clone(), config.intake.clone());
        let gate = Arc::new(UniquenessGate::new(
            similarity,
            store.clone(),
            broadcaster.clone(),
            GateConfig::from_similarity(&config.similarity, config.intake.min_content_length),
            config.operating_account.clone(),
        ));
        let dispatcher = Arc::new(VoteDispatcher::new(
            store.clone(),
            broadcaster.clone(),
            notifier.clone(),
        ));
        let quorum = QuorumTracker::new(
            store.clone(),
            dispatcher,
            notifier.clone(),
            config.quorum.clone(),
        );
        let authority = create_authority_checker(
            config.authority.clone(),
            store.clone(),
            broadcaster.clone(),
            config.operating_account.clone(),
        );
        let referral = ReferralRewarder::new(
            store.clone(),
            ledger.clone(),
            broadcaster,
            notifier.clone(),
            config.referral.clone(),
            config.operating_account.clone(),
        );

        Self {
            config,
            store,
            ledger,
            notifier,
            intake,
            gate,
            quorum,
            authority,
            referral,
        }
    }

    /// Start the engine's background work (authority revalidation)
    pub async fn start(&self) -> Result<()> {
        self.authority.start().await
    }

    /// Stop background work before process shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.authority.stop().await
    }

    /// Admit a proposed content item. On success the uniqueness gate
    /// runs asynchronously; proposals it passes are announced to every
    /// active curator chat except the one the proposal came from.
    pub async fn submit_proposal(
        &self,
        proposer_user_id: i64,
        origin_chat_id: Option<i64>,
        content_key: ContentKey,
    ) -> Result<Proposal, AdmissionError> {
        let admitted = self.intake.admit(proposer_user_id, content_key).await?;

        let gate = self.gate.clone();
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let proposal = admitted.proposal.clone();
        let body = admitted.content.body;
        tokio::spawn(async move {
            screen_and_announce(gate, store, notifier, proposal, body, origin_chat_id).await;
        });

        Ok(admitted.proposal)
    }

    /// Feed one decoded curator callback into the quorum tracker
    pub async fn record_response(
        &self,
        curator_user_id: i64,
        event: ResponseEvent,
    ) -> Result<RecordOutcome, crate::quorum::QuorumError> {
        self.quorum
            .record_response(curator_user_id, event.proposal_id, event.action.is_approve())
            .await
    }

    /// Activate (or re-activate) a user's delegated credential after
    /// verifying the on-chain authority grant. First-time activations
    /// settle any pending referral for the user.
    pub async fn activate_credential(
        &self,
        owner_user_id: i64,
        account_name: &str,
    ) -> Result<Credential, CredentialError> {
        let account = self
            .ledger
            .get_account(account_name)
            .await?
            .ok_or_else(|| CredentialError::AccountNotFound(account_name.to_string()))?;
        if !account.grants_authority_to(&self.config.operating_account) {
            return Err(CredentialError::AuthorityNotDelegated);
        }

        if let Err(err) = self.referral.maybe_reward(owner_user_id, account_name).await {
            warn!(
                "referral settlement for user {} failed: {}",
                owner_user_id, err
            );
        }

        let credential = Credential {
            owner_user_id,
            account_name: account_name.to_string(),
            power_percent: 100,
            active: true,
        };
        self.store.upsert_credential(credential.clone()).await?;
        info!(
            "credential for {} activated by user {}",
            account_name, owner_user_id
        );
        Ok(credential)
    }

    /// Deactivate a user's credential on explicit request
    pub async fn revoke_credential(&self, owner_user_id: i64) -> Result<(), CredentialError> {
        let credential = self
            .store
            .credential_by_owner(owner_user_id)
            .await?
            .filter(|c| c.active)
            .ok_or(CredentialError::NoActiveCredential)?;
        self.store
            .set_credential_active(owner_user_id, false)
            .await?;
        info!(
            "credential for {} revoked by user {}",
            credential.account_name, owner_user_id
        );
        Ok(())
    }

    /// Change the delegated power share of an active credential
    pub async fn update_credential_power(
        &self,
        owner_user_id: i64,
        power_percent: u8,
    ) -> Result<Credential, CredentialError> {
        if !(1..=100).contains(&power_percent) {
            return Err(CredentialError::InvalidPowerValue(power_percent));
        }
        let mut credential = self
            .store
            .credential_by_owner(owner_user_id)
            .await?
            .filter(|c| c.active)
            .ok_or(CredentialError::NoActiveCredential)?;

        let account = self
            .ledger
            .get_account(&credential.account_name)
            .await?
            .ok_or_else(|| CredentialError::AccountNotFound(credential.account_name.clone()))?;
        if account.vesting_shares <= self.config.credential.min_vesting_for_power_update {
            return Err(CredentialError::InsufficientStake);
        }

        credential.power_percent = power_percent;
        self.store.upsert_credential(credential.clone()).await?;
        Ok(credential)
    }

    /// Record a referral for a new user, unless they already hold a
    /// credential or the referrer was used before
    pub async fn record_referral(
        &self,
        referee_user_id: i64,
        referrer_account: &str,
    ) -> Result<()> {
        if self
            .store
            .credential_by_owner(referee_user_id)
            .await?
            .is_some()
        {
            return Ok(());
        }
        if self.store.referrer_exists(referrer_account).await? {
            info!("referrer {} was already used, skipping", referrer_account);
            return Ok(());
        }
        self.store
            .insert_referral(Referral {
                referee_user_id,
                referrer_account: referrer_account.to_string(),
                completed: false,
            })
            .await?;
        Ok(())
    }

    /// Register a curator record for a user; existing records are kept
    pub async fn enroll_curator(&self, user_id: i64, chat_id: i64) -> Result<Curator> {
        if let Some(existing) = self.store.curator_by_user(user_id).await? {
            return Ok(existing);
        }
        let curator = Curator {
            user_id,
            chat_id,
            active: false,
        };
        self.store.upsert_curator(curator.clone()).await?;
        Ok(curator)
    }

    /// Opt a curator in after they consented to the rules
    pub async fn activate_curator(&self, user_id: i64) -> Result<()> {
        let mut curator = self
            .store
            .curator_by_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} is not enrolled as a curator", user_id))?;
        curator.active = true;
        self.store.upsert_curator(curator).await?;
        Ok(())
    }

    /// Opt a curator out
    pub async fn deactivate_curator(&self, user_id: i64) -> Result<()> {
        let mut curator = self
            .store
            .curator_by_user(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {} is not enrolled as a curator", user_id))?;
        curator.active = false;
        self.store.upsert_curator(curator).await?;
        Ok(())
    }

    /// The engine's configuration, for front-end display purposes
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Run the uniqueness gate for an admitted proposal and announce it to
/// curators when the gate lets it through.
async fn screen_and_announce(
    gate: Arc<UniquenessGate>,
    store: Arc<dyn DirectoryStore>,
    notifier: Arc<dyn Notifier>,
    proposal: Proposal,
    body: String,
    origin_chat_id: Option<i64>,
) {
    let verdict = gate.run(&proposal, &body).await;
    if !verdict.should_announce() {
        info!(
            "proposal {} held back by the uniqueness gate: {:?}",
            proposal.id, verdict
        );
        return;
    }

    let curators = match store.active_curators().await {
        Ok(curators) => curators,
        Err(err) => {
            error!(
                "could not load curators to announce proposal {}: {}",
                proposal.id, err
            );
            return;
        }
    };
    let chat_ids: Vec<i64> = curators
        .iter()
        .map(|c| c.chat_id)
        .filter(|chat_id| Some(*chat_id) != origin_chat_id)
        .collect();

    if let Err(err) = notifier.announce_proposal(&proposal, &chat_ids).await {
        warn!("could not announce proposal {}: {}", proposal.id, err);
    }
}

/// Create a fully wired curation engine
pub fn create_engine(
    config: EngineConfig,
    store: Arc<dyn DirectoryStore>,
    ledger: Arc<dyn ContentLedger>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    similarity: Arc<dyn SimilarityChecker>,
    notifier: Arc<dyn Notifier>,
) -> Arc<CurationEngine> {
    Arc::new(CurationEngine::new(
        config, store, ledger, broadcaster, similarity, notifier,
    ))
}
