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

use anyhow::{anyhow, Context, Result};
use tokio::sync::{Mutex, Notify};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::chain::TransactionBroadcaster;
use crate::config::AuthorityConfig;
use crate::store::DirectoryStore;

/// Background loop revalidating every active credential's on-chain
/// authority grant.
///
/// The sole writer that can flip a credential from active to inactive
/// outside an explicit user action. A failed credential-list load
/// aborts the cycle; a failed per-credential verification deactivates
/// that credential only.
pub struct AuthorityChecker {
    config: AuthorityConfig,
    store: Arc<dyn DirectoryStore>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    operating_account: String,
    task_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_signal: Arc<Notify>,
}

impl AuthorityChecker {
    /// Create a checker over the given store and chain client
    pub fn new(
        config: AuthorityConfig,
        store: Arc<dyn DirectoryStore>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        operating_account: String,
    ) -> Self {
        Self {
            config,
            store,
            broadcaster,
            operating_account,
            task_handle: Mutex::new(None),
            shutdown_signal: Arc::new(Notify::new()),
        }
    }

    /// Start the background revalidation task
    pub async fn start(&self) -> Result<()> {
        let mut handle_guard = self.task_handle.lock().await;
        if handle_guard.is_some() {
            return Err(anyhow!("authority checker is already running"));
        }

        // The task runs on its own copy; the shutdown signal is shared
        let checker = Arc::new(self.clone());
        let handle = tokio::spawn(async move {
            Self::background_task(checker).await;
        });
        *handle_guard = Some(handle);

        info!("authority checker started");
        Ok(())
    }

    /// Stop the background task and wait for it to wind down
    pub async fn stop(&self) -> Result<()> {
        let handle = self.task_handle.lock().await.take();
        match handle {
            Some(handle) => {
                self.shutdown_signal.notify_one();
                handle
                    .await
                    .context("authority checker task did not shut down cleanly")?;
                info!("authority checker stopped");
                Ok(())
            }
            None => {
                info!("authority checker is not running");
                Ok(())
            }
        }
    }

    async fn background_task(checker: Arc<AuthorityChecker>) {
        info!(
            "authority checker running every {}s",
            checker.config.check_interval_secs
        );
        let mut interval =
            time::interval(time::Duration::from_secs(checker.config.check_interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = checker.run_cycle().await {
                        error!("authority revalidation cycle failed: {}", err);
                    }
                }
                _ = checker.shutdown_signal.notified() => {
                    info!("authority checker shutting down");
                    break;
                }
            }
        }
    }

    /// Run one revalidation cycle over the active credential set.
    pub async fn run_cycle(&self) -> Result<()> {
        let credentials = self
            .store
            .active_credentials()
            .await
            .context("could not load active credentials")?;

        let mut revoked = 0;
        let mut verified = 0;
        for credential in credentials {
            // A verification error counts as "not authorized" for this
            // credential only; the cycle keeps going.
            let granted = match self
                .broadcaster
                .verify_delegated_authority(&credential.account_name, &self.operating_account)
                .await
            {
                Ok(granted) => granted,
                Err(err) => {
                    warn!(
                        "authority verification for {} failed, treating as revoked: {}",
                        credential.account_name, err
                    );
                    false
                }
            };

            if granted {
                verified += 1;
                continue;
            }
            info!(
                "authority for {} was revoked on chain, deactivating credential",
                credential.account_name
            );
            if let Err(err) = self
                .store
                .set_credential_active(credential.owner_user_id, false)
                .await
            {
                error!(
                    "could not deactivate credential for {}: {}",
                    credential.account_name, err
                );
            } else {
                revoked += 1;
            }
        }

        debug!(
            "authority cycle completed: {} verified, {} deactivated",
            verified, revoked
        );
        Ok(())
    }
}

impl Clone for AuthorityChecker {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            operating_account: self.operating_account.clone(),
            task_handle: Mutex::new(None),
            shutdown_signal: self.shutdown_signal.clone(),
        }
    }
}

/// Create an authority checker ready to be started
pub fn create_authority_checker(
    config: AuthorityConfig,
    store: Arc<dyn DirectoryStore>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    operating_account: String,
) -> Arc<AuthorityChecker> {
    Arc::new(AuthorityChecker::new(
        config,
        store,
        broadcaster,
        operating_account,
    ))
}
