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

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
///
/// Every section has working defaults; deployments override the parts
/// they care about through a config file or `CURATION__`-prefixed
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Account the service operates as. Delegations are granted to this
    /// account and badge comments are posted from it.
    pub operating_account: String,
    /// Proposal admission policy
    pub intake: IntakeConfig,
    /// Quorum resolution policy
    pub quorum: QuorumConfig,
    /// Uniqueness gate / similarity-check service
    pub similarity: SimilarityConfig,
    /// Credential authority revalidation
    pub authority: AuthorityConfig,
    /// Referral reward payout
    pub referral: ReferralConfig,
    /// Credential power-change policy
    pub credential: CredentialConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operating_account: "curation-bot".to_string(),
            intake: IntakeConfig::default(),
            quorum: QuorumConfig::default(),
            similarity: SimilarityConfig::default(),
            authority: AuthorityConfig::default(),
            referral: ReferralConfig::default(),
            credential: CredentialConfig::default(),
        }
    }
}

/// Admission rules for proposal intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Maximum accepted proposals per proposer since local midnight
    pub max_daily_proposals: u32,
    /// Minimum content body length in characters
    pub min_content_length: usize,
    /// Whether the banned-tag filter is applied
    pub censorship_enabled: bool,
    /// Tags that disqualify a content item
    pub banned_tags: Vec<String>,
    /// Authors whose content is refused outright
    pub excluded_authors: Vec<String>,
    /// Whether a content key may be proposed again after its earlier
    /// proposal completed. When false, completed proposals permanently
    /// block their content key.
    pub allow_reproposal: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_daily_proposals: 5,
            min_content_length: 1000,
            censorship_enabled: false,
            banned_tags: Vec::new(),
            excluded_authors: Vec::new(),
            allow_reproposal: false,
        }
    }
}

/// Quorum threshold policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// Number of curator responses that resolves a proposal
    pub required_votes: u32,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self { required_votes: 3 }
    }
}

/// Similarity-check service and uniqueness gate policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// API key for the similarity service. Empty disables the gate.
    pub api_key: String,
    /// Endpoint the submit/poll requests go to
    pub api_url: String,
    /// Base URL for badge images and verification links
    pub badge_base_url: String,
    /// Uniqueness score below which content is treated as plagiarized
    pub score_threshold: f64,
    /// Seconds between poll attempts
    pub poll_interval_secs: u64,
    /// Maximum poll attempts before the gate fails open
    pub max_poll_attempts: u32,
    /// Submission cap in characters
    pub max_submission_chars: usize,
    /// Content domains excluded from the similarity search
    pub excluded_domains: Vec<String>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://api.text.ru/post".to_string(),
            badge_base_url: "https://text.ru".to_string(),
            score_threshold: 20.0,
            poll_interval_secs: 15,
            max_poll_attempts: 50,
            max_submission_chars: 2000,
            excluded_domains: Vec::new(),
        }
    }
}

/// Credential authority revalidation cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Seconds between revalidation cycles
    pub check_interval_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3600,
        }
    }
}

/// Referral reward payout policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    /// Stake amount transferred to each side of a completed referral
    pub fee_amount: f64,
    /// Symbol of the transferred stake
    pub stake_symbol: String,
    /// Minimum published posts the referee must have before a reward
    /// is handed out
    pub min_referee_posts: u32,
}

impl ReferralConfig {
    /// Amount formatted the way the chain expects transfer amounts
    pub fn formatted_amount(&self) -> String {
        format!("{:.3} {}", self.fee_amount, self.stake_symbol)
    }
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            fee_amount: 0.5,
            stake_symbol: "GOLOS".to_string(),
            min_referee_posts: 30,
        }
    }
}

/// Policy for credential power changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Vesting shares an account must hold before its delegated power
    /// may be adjusted
    pub min_vesting_for_power_update: f64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            min_vesting_for_power_update: 1_000_000.0,
        }
    }
}

/// Load configuration from an optional file plus the environment.
///
/// File values override defaults; `CURATION__`-prefixed environment
/// variables override both (`CURATION__QUORUM__REQUIRED_VOTES=5`).
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, config::ConfigError> {
    dotenv::dotenv().ok();

    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }
    builder = builder.add_source(config::Environment::with_prefix("CURATION").separator("__"));

    let loaded: EngineConfig = builder.build()?.try_deserialize()?;
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.quorum.required_votes, 3);
        assert_eq!(config.intake.max_daily_proposals, 5);
        assert!(config.similarity.api_key.is_empty());
        assert_eq!(config.similarity.score_threshold, 20.0);
        assert_eq!(config.authority.check_interval_secs, 3600);
    }

    #[test]
    fn referral_amount_formatting() {
        let referral = ReferralConfig {
            fee_amount: 1.25,
            stake_symbol: "GOLOS".to_string(),
            min_referee_posts: 30,
        };
        assert_eq!(referral.formatted_amount(), "1.250 GOLOS");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/curation-config")).unwrap();
        assert_eq!(config.quorum.required_votes, 3);
    }
}
