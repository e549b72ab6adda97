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
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chain::TransactionBroadcaster;
use crate::config::SimilarityConfig;
use crate::similarity::{PollOutcome, SimilarityChecker};
use crate::store::DirectoryStore;
use crate::types::Proposal;

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));

/// Number of distinct badge images the similarity service serves
const BADGE_IMAGE_COUNT: u32 = 18;

/// Terminal states of the uniqueness gate for one proposal.
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    /// Gate disabled or content under the length threshold
    Skipped,
    /// Scored at or above the threshold
    Unique { score: f64 },
    /// Scored below the threshold; the proposal was closed before
    /// reaching curators
    NotUnique { score: f64 },
    /// The service never produced a score within the attempt budget
    TimedOut,
}

impl GateVerdict {
    /// Whether the proposal goes on to be announced to curators.
    /// Timeouts fail open so service unavailability cannot starve
    /// valid content.
    pub fn should_announce(&self) -> bool {
        !matches!(self, GateVerdict::NotUnique { .. })
    }
}

/// Policy knobs for the gate, derived from the engine configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Whether the similarity service is configured at all
    pub enabled: bool,
    /// Content shorter than this skips the check
    pub min_length: usize,
    /// Score below this resolves NotUnique
    pub score_threshold: f64,
    /// Delay between poll attempts
    pub poll_interval: Duration,
    /// Poll attempts before failing open
    pub max_poll_attempts: u32,
    /// Submission cap in characters
    pub max_submission_chars: usize,
    /// Base URL for badge markup
    pub badge_base_url: String,
}

impl GateConfig {
    /// Derive gate policy from the similarity section of the engine
    /// configuration and the intake length threshold.
    pub fn from_similarity(config: &SimilarityConfig, min_length: usize) -> Self {
        Self {
            enabled: !config.api_key.is_empty(),
            min_length,
            score_threshold: config.score_threshold,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_poll_attempts: config.max_poll_attempts,
            max_submission_chars: config.max_submission_chars,
            badge_base_url: config.badge_base_url.clone(),
        }
    }
}

/// Pre-announcement filter that runs a proposal's content through the
/// external similarity service.
///
/// One polling task per proposal; state machine per §state:
/// Skipped | Submitted -> Polling -> Unique | NotUnique | TimedOut.
pub struct UniquenessGate {
    checker: Arc<dyn SimilarityChecker>,
    store: Arc<dyn DirectoryStore>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    config: GateConfig,
    operating_account: String,
    badge_rng: Mutex<StdRng>,
}

impl UniquenessGate {
    /// Create a gate with an entropy-seeded badge RNG
    pub fn new(
        checker: Arc<dyn SimilarityChecker>,
        store: Arc<dyn DirectoryStore>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        config: GateConfig,
        operating_account: String,
    ) -> Self {
        Self::with_rng(
            checker,
            store,
            broadcaster,
            config,
            operating_account,
            StdRng::from_entropy(),
        )
    }

    /// Create a gate with an explicit RNG, for deterministic badges
    pub fn with_rng(
        checker: Arc<dyn SimilarityChecker>,
        store: Arc<dyn DirectoryStore>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        config: GateConfig,
        operating_account: String,
        rng: StdRng,
    ) -> Self {
        Self {
            checker,
            store,
            broadcaster,
            config,
            operating_account,
            badge_rng: Mutex::new(rng),
        }
    }

    /// Run the gate to a terminal verdict for one proposal.
    ///
    /// Never fails: infrastructure problems degrade to the fail-open
    /// path and are logged.
    pub async fn run(&self, proposal: &Proposal, body: &str) -> GateVerdict {
        if !self.config.enabled {
            debug!("uniqueness gate disabled, skipping proposal {}", proposal.id);
            return GateVerdict::Skipped;
        }

        let text = prepare_submission(body, self.config.max_submission_chars);
        if text.chars().count() < self.config.min_length {
            debug!(
                "proposal {} content under gate threshold, skipping",
                proposal.id
            );
            return GateVerdict::Skipped;
        }

        let token = match self.checker.submit(&text).await {
            Ok(token) => token,
            Err(err) => {
                // Submission failure is treated like a timeout: the
                // service being down must not starve valid content.
                warn!(
                    "similarity submit failed for proposal {}: {}",
                    proposal.id, err
                );
                return GateVerdict::TimedOut;
            }
        };
        debug!("proposal {} polling similarity job {}", proposal.id, token);

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;
            match self.checker.poll(&token).await {
                Ok(PollOutcome::Score(score)) => {
                    if score < self.config.score_threshold {
                        info!(
                            "proposal {} scored {:.1}% unique, below threshold; closing",
                            proposal.id, score
                        );
                        if let Err(err) = self.store.complete_proposal_if_open(proposal.id).await {
                            error!(
                                "failed to close non-unique proposal {}: {}",
                                proposal.id, err
                            );
                        }
                        return GateVerdict::NotUnique { score };
                    }
                    info!("proposal {} scored {:.1}% unique", proposal.id, score);
                    self.post_badge(proposal, &token.0).await;
                    return GateVerdict::Unique { score };
                }
                Ok(PollOutcome::Pending) => {
                    debug!(
                        "proposal {} similarity poll attempt {} still pending",
                        proposal.id, attempt
                    );
                }
                Err(err) => {
                    // Transient; retry until the attempt budget runs out
                    warn!(
                        "proposal {} similarity poll attempt {} failed: {}",
                        proposal.id, attempt, err
                    );
                }
            }
        }

        warn!(
            "similarity check for proposal {} gave no score after {} attempts, failing open",
            proposal.id, self.config.max_poll_attempts
        );
        GateVerdict::TimedOut
    }

    /// Post the public uniqueness badge as a side comment. Failures are
    /// logged only.
    async fn post_badge(&self, proposal: &Proposal, job_uid: &str) {
        let image = self.badge_rng.lock().await.gen_range(1..=BADGE_IMAGE_COUNT);
        let body = format!(
            "[![Originality verified]({base}/image/get/{uid}/{image})]({base}/antiplagiat/{uid})",
            base = self.config.badge_base_url,
            uid = job_uid,
            image = image,
        );
        if let Err(err) = self
            .broadcaster
            .post_comment(
                &self.operating_account,
                &proposal.content_key.author,
                &proposal.content_key.permalink,
                &body,
            )
            .await
        {
            warn!(
                "failed to post uniqueness badge for proposal {}: {}",
                proposal.id, err
            );
        }
    }
}

/// Strip markup tags and cap the text on a character boundary.
fn prepare_submission(body: &str, max_chars: usize) -> String {
    let stripped = MARKUP_TAG.replace_all(body, "");
    stripped.chars().take(max_chars).collect()
}
