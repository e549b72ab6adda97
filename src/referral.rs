use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chain::{ContentLedger, TransactionBroadcaster};
use crate::config::ReferralConfig;
use crate::notifier::Notifier;
use crate::store::DirectoryStore;

/// Hands out the referral reward once a referred user activates their
/// first credential. Forfeited rewards (self-referral, too few posts)
/// still mark the referral completed so it is never retried.
pub struct ReferralRewarder {
    store: Arc<dyn DirectoryStore>,
    ledger: Arc<dyn ContentLedger>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    notifier: Arc<dyn Notifier>,
    config: ReferralConfig,
    operating_account: String,
}

impl ReferralRewarder {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        ledger: Arc<dyn ContentLedger>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
        notifier: Arc<dyn Notifier>,
        config: ReferralConfig,
        operating_account: String,
    ) -> Self {
        Self {
            store,
            ledger,
            broadcaster,
            notifier,
            config,
            operating_account,
        }
    }

    /// Settle the pending referral for a referee, if one exists.
    pub async fn maybe_reward(&self, referee_user_id: i64, referee_account: &str) -> Result<()> {
        let referral = match self.store.referral_by_referee(referee_user_id).await? {
            Some(referral) if !referral.completed => referral,
            _ => return Ok(()),
        };

        // One settlement attempt per referral, rewarded or not
        self.store
            .complete_referral(referee_user_id)
            .await
            .context("could not mark referral completed")?;

        if referral.referrer_account == referee_account {
            info!(
                "referral for {} names itself as referrer, no reward",
                referee_account
            );
            return Ok(());
        }

        let account = self
            .ledger
            .get_account(referee_account)
            .await?
            .with_context(|| format!("referee account {} not found on chain", referee_account))?;
        if account.post_count < self.config.min_referee_posts {
            info!(
                "referee {} has only {} posts, reward withheld",
                referee_account, account.post_count
            );
            return Ok(());
        }

        let amount = self.config.formatted_amount();
        let to_referrer = self
            .broadcaster
            .transfer_stake(
                &self.operating_account,
                &referral.referrer_account,
                &amount,
            )
            .await;
        let to_referee = self
            .broadcaster
            .transfer_stake(&self.operating_account, referee_account, &amount)
            .await;

        if let Err(err) = &to_referrer {
            warn!(
                "stake transfer to referrer {} failed: {}",
                referral.referrer_account, err
            );
        }
        if let Err(err) = &to_referee {
            warn!("stake transfer to referee {} failed: {}", referee_account, err);
        }
        if to_referrer.is_err() || to_referee.is_err() {
            return Ok(());
        }

        info!(
            "referral reward of {} paid to {} and {}",
            amount, referral.referrer_account, referee_account
        );
        if let Err(err) = self
            .notifier
            .report_referral_payout(&referral.referrer_account, referee_account, &amount)
            .await
        {
            warn!("could not report referral payout: {}", err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{AccountInfo, ChainError, MockContentLedger, MockTransactionBroadcaster};
    use crate::notifier::MockNotifier;
    use crate::store::MemoryStore;
    use crate::types::Referral;

    fn account(name: &str, post_count: u32) -> AccountInfo {
        AccountInfo {
            name: name.to_string(),
            delegated_authorities: vec![],
            vesting_shares: 0.0,
            post_count,
        }
    }

    async fn store_with_referral(referrer: &str) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_referral(Referral {
                referee_user_id: 5,
                referrer_account: referrer.to_string(),
                completed: false,
            })
            .await
            .unwrap();
        store
    }

    fn rewarder(
        store: Arc<MemoryStore>,
        ledger: MockContentLedger,
        broadcaster: MockTransactionBroadcaster,
        notifier: MockNotifier,
    ) -> ReferralRewarder {
        ReferralRewarder::new(
            store,
            Arc::new(ledger),
            Arc::new(broadcaster),
            Arc::new(notifier),
            ReferralConfig::default(),
            "curation-bot".to_string(),
        )
    }

    #[tokio::test]
    async fn reward_is_paid_to_both_sides() {
        let store = store_with_referral("referrer-acc").await;

        let mut ledger = MockContentLedger::new();
        ledger
            .expect_get_account()
            .returning(|name| Ok(Some(account(name, 100))));

        let mut broadcaster = MockTransactionBroadcaster::new();
        broadcaster
            .expect_transfer_stake()
            .withf(|from, to, amount| {
                from == "curation-bot"
                    && (to == "referrer-acc" || to == "referee-acc")
                    && amount == "0.500 GOLOS"
            })
            .times(2)
            .returning(|_, _, _| Ok(()));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_report_referral_payout()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let rewarder = rewarder(store.clone(), ledger, broadcaster, notifier);
        rewarder.maybe_reward(5, "referee-acc").await.unwrap();

        let referral = store.referral_by_referee(5).await.unwrap().unwrap();
        assert!(referral.completed);
    }

    #[tokio::test]
    async fn self_referral_is_forfeited() {
        let store = store_with_referral("same-acc").await;
        // No ledger lookups, no transfers
        let rewarder = rewarder(
            store.clone(),
            MockContentLedger::new(),
            MockTransactionBroadcaster::new(),
            MockNotifier::new(),
        );
        rewarder.maybe_reward(5, "same-acc").await.unwrap();

        assert!(store.referral_by_referee(5).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn new_referee_with_few_posts_is_withheld() {
        let store = store_with_referral("referrer-acc").await;

        let mut ledger = MockContentLedger::new();
        ledger
            .expect_get_account()
            .returning(|name| Ok(Some(account(name, 3))));

        let rewarder = rewarder(
            store.clone(),
            ledger,
            MockTransactionBroadcaster::new(),
            MockNotifier::new(),
        );
        rewarder.maybe_reward(5, "referee-acc").await.unwrap();
        assert!(store.referral_by_referee(5).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn completed_referral_is_never_retried() {
        let store = store_with_referral("referrer-acc").await;
        store.complete_referral(5).await.unwrap();

        let rewarder = rewarder(
            store,
            MockContentLedger::new(),
            MockTransactionBroadcaster::new(),
            MockNotifier::new(),
        );
        rewarder.maybe_reward(5, "referee-acc").await.unwrap();
    }

    #[tokio::test]
    async fn transfer_failure_is_absorbed() {
        let store = store_with_referral("referrer-acc").await;

        let mut ledger = MockContentLedger::new();
        ledger
            .expect_get_account()
            .returning(|name| Ok(Some(account(name, 100))));

        let mut broadcaster = MockTransactionBroadcaster::new();
        broadcaster
            .expect_transfer_stake()
            .returning(|_, to, _| {
                if to == "referee-acc" {
                    Err(ChainError::Transport("node unreachable".to_string()))
                } else {
                    Ok(())
                }
            });

        // No payout report when either transfer failed
        let rewarder = rewarder(store, ledger, broadcaster, MockNotifier::new());
        rewarder.maybe_reward(5, "referee-acc").await.unwrap();
    }
}
