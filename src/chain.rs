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

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the chain collaborators
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("broadcast rejected for account {account}: {reason}")]
    BroadcastRejected { account: String, reason: String },

    #[error("malformed chain response: {0}")]
    Decode(String),
}

/// A content item as read from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentInfo {
    /// Author account name
    pub author: String,
    /// Permalink under the author
    pub permalink: String,
    /// Full body text (markup included)
    pub body: String,
    /// Tags attached by the author
    pub tags: Vec<String>,
    /// Whether the first payout window is still open
    pub payout_window_open: bool,
    /// Whether the author disabled payouts for this item
    pub payout_disabled: bool,
}

/// An account as read from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account name
    pub name: String,
    /// Accounts this one has granted delegated posting authority to
    pub delegated_authorities: Vec<String>,
    /// Vesting share balance
    pub vesting_shares: f64,
    /// Number of items the account has published
    pub post_count: u32,
}

impl AccountInfo {
    /// Whether posting authority has been delegated to `operating_account`
    pub fn grants_authority_to(&self, operating_account: &str) -> bool {
        self.delegated_authorities
            .iter()
            .any(|a| a == operating_account)
    }
}

/// Read-only view of the chain consumed by the core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentLedger: Send + Sync {
    /// Resolve a content item; `None` when it does not exist on chain
    async fn get_content(
        &self,
        author: &str,
        permalink: &str,
    ) -> Result<Option<ContentInfo>, ChainError>;

    /// Resolve an account; `None` when it does not exist on chain
    async fn get_account(&self, name: &str) -> Result<Option<AccountInfo>, ChainError>;
}

/// Signed-action submission consumed by the core. Signing internals
/// belong to the implementing client; the core only needs per-call
/// success or failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionBroadcaster: Send + Sync {
    /// Cast a weighted approval from `account` on the given content.
    /// Weight is in chain units (percent scaled by 100).
    async fn cast_approval(
        &self,
        account: &str,
        author: &str,
        permalink: &str,
        weight: i16,
    ) -> Result<(), ChainError>;

    /// Publish a comment from `account` under the given content
    async fn post_comment(
        &self,
        account: &str,
        author: &str,
        permalink: &str,
        body: &str,
    ) -> Result<(), ChainError>;

    /// Transfer stake between accounts
    async fn transfer_stake(&self, from: &str, to: &str, amount: &str) -> Result<(), ChainError>;

    /// Whether `account` currently grants the operating account
    /// delegated posting authority
    async fn verify_delegated_authority(
        &self,
        account: &str,
        operating_account: &str,
    ) -> Result<bool, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_grant_lookup() {
        let account = AccountInfo {
            name: "alice".to_string(),
            delegated_authorities: vec!["curation-bot".to_string(), "other".to_string()],
            vesting_shares: 2_000_000.0,
            post_count: 120,
        };
        assert!(account.grants_authority_to("curation-bot"));
        assert!(!account.grants_authority_to("stranger"));
    }
}
