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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a content item on the ledger: author plus permalink.
///
/// A content key is never reused by two open proposals at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    /// Account name of the content author
    pub author: String,
    /// Permalink of the content item under that author
    pub permalink: String,
}

impl ContentKey {
    /// Create a content key from an author and permalink pair
    pub fn new(author: impl Into<String>, permalink: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            permalink: permalink.into(),
        }
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}/{}", self.author, self.permalink)
    }
}

/// A content item put forward for curator approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Store-assigned identifier
    pub id: i64,
    /// User who proposed the content item
    pub proposer_user_id: i64,
    /// Content item the proposal refers to
    pub content_key: ContentKey,
    /// When the proposal was admitted
    pub submitted_at: DateTime<Utc>,
    /// Whether the proposal has been resolved. Transitions false -> true
    /// exactly once, either by the quorum tracker or by the uniqueness
    /// gate on a plagiarism verdict.
    pub completed: bool,
}

/// A single curator's approve/reject signal on a proposal.
///
/// Unique per (curator, proposal); immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratorResponse {
    /// Curator who answered
    pub curator_user_id: i64,
    /// Proposal the response belongs to
    pub proposal_id: i64,
    /// true = approve, false = reject
    pub approve: bool,
    /// When the response was recorded
    pub responded_at: DateTime<Utc>,
}

impl CuratorResponse {
    /// Create a response stamped with the current time
    pub fn new(curator_user_id: i64, proposal_id: i64, approve: bool) -> Self {
        Self {
            curator_user_id,
            proposal_id,
            approve,
            responded_at: Utc::now(),
        }
    }
}

/// A delegated account authorizing the service to cast weighted
/// approval actions on its behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Owning user
    pub owner_user_id: i64,
    /// Delegated account name on the chain
    pub account_name: String,
    /// Share of the account's voting power the service may use, 1..=100
    pub power_percent: u8,
    /// Whether the delegation is currently usable. Flips to false on
    /// explicit revocation or when the authority checker finds the
    /// on-chain grant missing.
    pub active: bool,
}

impl Credential {
    /// Approval weight in chain units (percent scaled by 100)
    pub fn dispatch_weight(&self) -> i16 {
        i16::from(self.power_percent) * 100
    }
}

/// A participant entitled to cast approve/reject responses on proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curator {
    /// User identity
    pub user_id: i64,
    /// Chat the curator receives announcements in
    pub chat_id: i64,
    /// Toggled by opt-in/opt-out
    pub active: bool,
}

/// Pending referral reward, completed once the referee activates a
/// credential and the payout conditions are met.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    /// Referred user
    pub referee_user_id: i64,
    /// Account name of the user who referred them
    pub referrer_account: String,
    /// Whether the reward has been handed out (or forfeited)
    pub completed: bool,
}

/// Outcome of a quorum resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuorumDecision {
    /// Positives reached or tied the negatives; dispatch follows
    Approved,
    /// Negatives outnumbered positives; no dispatch
    Rejected,
}

impl std::fmt::Display for QuorumDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuorumDecision::Approved => write!(f, "approved"),
            QuorumDecision::Rejected => write!(f, "rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_display() {
        let key = ContentKey::new("alice", "my-first-post");
        assert_eq!(key.to_string(), "@alice/my-first-post");
    }

    #[test]
    fn dispatch_weight_scales_percent() {
        let credential = Credential {
            owner_user_id: 1,
            account_name: "alice".to_string(),
            power_percent: 100,
            active: true,
        };
        assert_eq!(credential.dispatch_weight(), 10_000);

        let half = Credential {
            power_percent: 50,
            ..credential
        };
        assert_eq!(half.dispatch_weight(), 5_000);
    }
}
