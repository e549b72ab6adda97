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

pub mod authority;
pub mod chain;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod intake;
pub mod notifier;
pub mod quorum;
pub mod referral;
pub mod session;
pub mod similarity;
pub mod sqlite_store;
pub mod store;
pub mod types;
pub mod uniqueness;

// Re-export common types
pub use types::{
    ContentKey, Credential, Curator, CuratorResponse, Proposal, QuorumDecision, Referral,
};
pub use config::{
    load_config, AuthorityConfig, CredentialConfig, EngineConfig, IntakeConfig, QuorumConfig,
    ReferralConfig, SimilarityConfig,
};
pub use store::{create_memory_store, DirectoryStore, MemoryStore, NewProposal, StoreError};
pub use sqlite_store::{create_sqlite_store, SqliteStore};
pub use chain::{
    AccountInfo, ChainError, ContentInfo, ContentLedger, TransactionBroadcaster,
};
pub use similarity::{
    create_similarity_checker, HttpSimilarityChecker, JobToken, PollOutcome, SimilarityChecker,
    SimilarityError,
};
pub use notifier::{LogNotifier, Notifier};
pub use session::{
    ConversationState, ResponseAction, ResponseEvent, SessionError, SessionTrigger,
};
pub use intake::{AdmissionError, AdmittedProposal, ProposalIntake};
pub use uniqueness::{GateConfig, GateVerdict, UniquenessGate};
pub use quorum::{IgnoreReason, QuorumError, QuorumTracker, RecordOutcome};
pub use dispatcher::{DispatchSummary, Dispatcher, VoteDispatcher};
pub use authority::{create_authority_checker, AuthorityChecker};
pub use referral::ReferralRewarder;
pub use engine::{create_engine, CredentialError, CurationEngine};

use std::sync::Arc;

/// Install the process-wide tracing subscriber. Filter defaults to
/// `info` and follows `RUST_LOG` when set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Create an engine over an in-memory store, for tests and ephemeral
/// deployments
pub fn create_memory_engine(
    config: EngineConfig,
    ledger: Arc<dyn ContentLedger>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    notifier: Arc<dyn Notifier>,
) -> Arc<CurationEngine> {
    let similarity = create_similarity_checker(config.similarity.clone());
    create_engine(
        config,
        create_memory_store(),
        ledger,
        broadcaster,
        similarity,
        notifier,
    )
}

/// Create an engine over a SQLite-backed store
pub async fn create_persistent_engine(
    config: EngineConfig,
    database_url: &str,
    ledger: Arc<dyn ContentLedger>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    notifier: Arc<dyn Notifier>,
) -> Result<Arc<CurationEngine>, StoreError> {
    let store = create_sqlite_store(database_url).await?;
    let similarity = create_similarity_checker(config.similarity.clone());
    Ok(create_engine(
        config,
        store,
        ledger,
        broadcaster,
        similarity,
        notifier,
    ))
}
