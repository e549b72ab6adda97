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

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::store::{DirectoryStore, NewProposal, StoreError};
use crate::types::{ContentKey, Credential, Curator, CuratorResponse, Proposal, Referral};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS proposals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    proposer_user_id INTEGER NOT NULL,
    author TEXT NOT NULL,
    permalink TEXT NOT NULL,
    submitted_at TIMESTAMP NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_proposals_content_key ON proposals(author, permalink);
CREATE TABLE IF NOT EXISTS responses (
    curator_user_id INTEGER NOT NULL,
    proposal_id INTEGER NOT NULL,
    approve INTEGER NOT NULL,
    responded_at TIMESTAMP NOT NULL,
    PRIMARY KEY (curator_user_id, proposal_id)
);
CREATE TABLE IF NOT EXISTS credentials (
    owner_user_id INTEGER PRIMARY KEY,
    account_name TEXT NOT NULL,
    power_percent INTEGER NOT NULL,
    active INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS curators (
    user_id INTEGER PRIMARY KEY,
    chat_id INTEGER NOT NULL,
    active INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS referrals (
    referee_user_id INTEGER PRIMARY KEY,
    referrer_account TEXT NOT NULL,
    completed INTEGER NOT NULL
);
";

/// SQLite-backed implementation of the directory store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create, if missing) the database at the given path and
    /// apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("directory store ready at {}", database_url);
        Ok(Self { pool })
    }

    /// Wrap an existing pool, assuming the schema is already in place
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn proposal_from_row(row: &SqliteRow) -> Result<Proposal, StoreError> {
        Ok(Proposal {
            id: row.try_get("id")?,
            proposer_user_id: row.try_get("proposer_user_id")?,
            content_key: ContentKey {
                author: row.try_get("author")?,
                permalink: row.try_get("permalink")?,
            },
            submitted_at: row.try_get::<DateTime<Utc>, _>("submitted_at")?,
            completed: row.try_get::<i64, _>("completed")? != 0,
        })
    }

    fn credential_from_row(row: &SqliteRow) -> Result<Credential, StoreError> {
        Ok(Credential {
            owner_user_id: row.try_get("owner_user_id")?,
            account_name: row.try_get("account_name")?,
            power_percent: row.try_get::<i64, _>("power_percent")? as u8,
            active: row.try_get::<i64, _>("active")? != 0,
        })
    }
}

#[async_trait]
impl DirectoryStore for SqliteStore {
    async fn insert_proposal(&self, proposal: NewProposal) -> Result<Proposal, StoreError> {
        let result = sqlx::query(
            "INSERT INTO proposals (proposer_user_id, author, permalink, submitted_at, completed) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(proposal.proposer_user_id)
        .bind(&proposal.content_key.author)
        .bind(&proposal.content_key.permalink)
        .bind(proposal.submitted_at)
        .execute(&self.pool)
        .await?;

        Ok(Proposal {
            id: result.last_insert_rowid(),
            proposer_user_id: proposal.proposer_user_id,
            content_key: proposal.content_key,
            submitted_at: proposal.submitted_at,
            completed: false,
        })
    }

    async fn proposal_by_id(&self, id: i64) -> Result<Option<Proposal>, StoreError> {
        let row = sqlx::query("SELECT * FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::proposal_from_row(&r)).transpose()
    }

    async fn incomplete_proposal_by_content_key(
        &self,
        key: &ContentKey,
    ) -> Result<Option<Proposal>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM proposals WHERE author = ? AND permalink = ? AND completed = 0 LIMIT 1",
        )
        .bind(&key.author)
        .bind(&key.permalink)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::proposal_from_row(&r)).transpose()
    }

    async fn proposal_exists_for_content_key(
        &self,
        key: &ContentKey,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM proposals WHERE author = ? AND permalink = ?")
            .bind(&key.author)
            .bind(&key.permalink)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("cnt")? > 0)
    }

    async fn latest_proposal(&self) -> Result<Option<Proposal>, StoreError> {
        let row = sqlx::query("SELECT * FROM proposals ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::proposal_from_row(&r)).transpose()
    }

    async fn proposal_count_for_user_since(
        &self,
        proposer_user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM proposals WHERE proposer_user_id = ? AND submitted_at >= ?",
        )
        .bind(proposer_user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("cnt")? as u32)
    }

    async fn complete_proposal_if_open(&self, id: i64) -> Result<bool, StoreError> {
        // Conditional update: the row count tells us whether this call
        // won the false -> true transition.
        let result = sqlx::query("UPDATE proposals SET completed = 1 WHERE id = ? AND completed = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguish an already-completed proposal from a missing one
        let exists = sqlx::query("SELECT id FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        if exists {
            Ok(false)
        } else {
            Err(StoreError::NotFound(format!("proposal {}", id)))
        }
    }

    async fn insert_response_if_absent(
        &self,
        response: CuratorResponse,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO responses (curator_user_id, proposal_id, approve, responded_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(response.curator_user_id)
        .bind(response.proposal_id)
        .bind(response.approve)
        .bind(response.responded_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn responses_for_proposal(
        &self,
        proposal_id: i64,
    ) -> Result<Vec<CuratorResponse>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM responses WHERE proposal_id = ? ORDER BY responded_at ASC",
        )
        .bind(proposal_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CuratorResponse {
                    curator_user_id: row.try_get("curator_user_id")?,
                    proposal_id: row.try_get("proposal_id")?,
                    approve: row.try_get::<i64, _>("approve")? != 0,
                    responded_at: row.try_get::<DateTime<Utc>, _>("responded_at")?,
                })
            })
            .collect()
    }

    async fn upsert_credential(&self, credential: Credential) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO credentials (owner_user_id, account_name, power_percent, active) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(credential.owner_user_id)
        .bind(&credential.account_name)
        .bind(i64::from(credential.power_percent))
        .bind(credential.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn credential_by_owner(
        &self,
        owner_user_id: i64,
    ) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query("SELECT * FROM credentials WHERE owner_user_id = ?")
            .bind(owner_user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::credential_from_row(&r)).transpose()
    }

    async fn active_credentials(&self) -> Result<Vec<Credential>, StoreError> {
        let rows = sqlx::query("SELECT * FROM credentials WHERE active = 1 ORDER BY owner_user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::credential_from_row).collect()
    }

    async fn set_credential_active(
        &self,
        owner_user_id: i64,
        active: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE credentials SET active = ? WHERE owner_user_id = ?")
            .bind(active)
            .bind(owner_user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "credential for user {}",
                owner_user_id
            )));
        }
        Ok(())
    }

    async fn upsert_curator(&self, curator: Curator) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO curators (user_id, chat_id, active) VALUES (?, ?, ?)",
        )
        .bind(curator.user_id)
        .bind(curator.chat_id)
        .bind(curator.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn curator_by_user(&self, user_id: i64) -> Result<Option<Curator>, StoreError> {
        let row = sqlx::query("SELECT * FROM curators WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(Curator {
                user_id: r.try_get("user_id")?,
                chat_id: r.try_get("chat_id")?,
                active: r.try_get::<i64, _>("active")? != 0,
            })
        })
        .transpose()
    }

    async fn active_curators(&self) -> Result<Vec<Curator>, StoreError> {
        let rows = sqlx::query("SELECT * FROM curators WHERE active = 1 ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(Curator {
                    user_id: r.try_get("user_id")?,
                    chat_id: r.try_get("chat_id")?,
                    active: r.try_get::<i64, _>("active")? != 0,
                })
            })
            .collect()
    }

    async fn insert_referral(&self, referral: Referral) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO referrals (referee_user_id, referrer_account, completed) \
             VALUES (?, ?, ?)",
        )
        .bind(referral.referee_user_id)
        .bind(&referral.referrer_account)
        .bind(referral.completed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn referral_by_referee(
        &self,
        referee_user_id: i64,
    ) -> Result<Option<Referral>, StoreError> {
        let row = sqlx::query("SELECT * FROM referrals WHERE referee_user_id = ?")
            .bind(referee_user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(Referral {
                referee_user_id: r.try_get("referee_user_id")?,
                referrer_account: r.try_get("referrer_account")?,
                completed: r.try_get::<i64, _>("completed")? != 0,
            })
        })
        .transpose()
    }

    async fn referrer_exists(&self, referrer_account: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM referrals WHERE referrer_account = ?")
            .bind(referrer_account)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("cnt")? > 0)
    }

    async fn complete_referral(&self, referee_user_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE referrals SET completed = 1 WHERE referee_user_id = ?")
            .bind(referee_user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "referral for user {}",
                referee_user_id
            )));
        }
        Ok(())
    }
}

/// Open a SQLite-backed directory store
pub async fn create_sqlite_store(database_url: &str) -> Result<Arc<dyn DirectoryStore>, StoreError> {
    Ok(Arc::new(SqliteStore::connect(database_url).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curation.db");
        let url = format!("sqlite://{}", path.display());
        let store = SqliteStore::connect(&url).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn proposal_round_trip() {
        let (store, _dir) = temp_store().await;
        let created = store
            .insert_proposal(NewProposal::new(9, ContentKey::new("bob", "essay")))
            .await
            .unwrap();
        assert!(created.id > 0);

        let fetched = store.proposal_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.content_key, ContentKey::new("bob", "essay"));
        assert!(!fetched.completed);
    }

    #[tokio::test]
    async fn conditional_complete_is_single_shot() {
        let (store, _dir) = temp_store().await;
        let proposal = store
            .insert_proposal(NewProposal::new(1, ContentKey::new("bob", "essay")))
            .await
            .unwrap();

        assert!(store.complete_proposal_if_open(proposal.id).await.unwrap());
        assert!(!store.complete_proposal_if_open(proposal.id).await.unwrap());

        let fetched = store.proposal_by_id(proposal.id).await.unwrap().unwrap();
        assert!(fetched.completed);
    }

    #[tokio::test]
    async fn missing_proposal_cannot_be_completed() {
        let (store, _dir) = temp_store().await;
        let result = store.complete_proposal_if_open(42).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_response_is_ignored() {
        let (store, _dir) = temp_store().await;
        assert!(store
            .insert_response_if_absent(CuratorResponse::new(4, 1, true))
            .await
            .unwrap());
        assert!(!store
            .insert_response_if_absent(CuratorResponse::new(4, 1, false))
            .await
            .unwrap());

        let responses = store.responses_for_proposal(1).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].approve);
    }

    #[tokio::test]
    async fn credential_activation_round_trip() {
        let (store, _dir) = temp_store().await;
        store
            .upsert_credential(Credential {
                owner_user_id: 2,
                account_name: "carol".to_string(),
                power_percent: 80,
                active: true,
            })
            .await
            .unwrap();

        assert_eq!(store.active_credentials().await.unwrap().len(), 1);
        store.set_credential_active(2, false).await.unwrap();
        assert!(store.active_credentials().await.unwrap().is_empty());

        let credential = store.credential_by_owner(2).await.unwrap().unwrap();
        assert!(!credential.active);
        assert_eq!(credential.power_percent, 80);
    }
}
