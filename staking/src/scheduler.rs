//! Daily verification batch driver.
//!
//! Once a day (plus on-demand manual triggers) every active stake is
//! verified against the chain and, if still owned, accrues rewards.
//! Stakes are processed in bounded batches with an inter-batch delay to
//! respect provider rate limits; each stake is fully independent, and one
//! stake's failure never aborts the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::chain_reader::ResilientChainReader;
use crate::lifecycle::{StakeError, StakeLifecycleManager, StakeTransition};
use crate::metrics::MetricsRegistry;
use crate::ownership::OwnershipVerifier;
use crate::storage::StakingStore;
use crate::types::{Stake, unix_now};

const SECONDS_PER_DAY: u64 = 86_400;

/// Scheduler tuning parameters.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Stakes verified concurrently within one batch.
    pub batch_size: usize,
    /// Pause between batches, to stay under provider rate limits.
    pub inter_batch_delay: Duration,
    /// Time of day the scheduled run starts, in seconds after UTC
    /// midnight.
    pub run_at_utc_secs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            inter_batch_delay: Duration::from_secs(2),
            // 03:00 UTC, after most indexers finish their nightly reorgs.
            run_at_utc_secs: 3 * 3600,
        }
    }
}

/// Counts emitted by one verification run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Active stakes the run visited.
    pub total: usize,
    /// Ownership confirmed (accrual attempted).
    pub verified: usize,
    /// Terminated because the NFT moved.
    pub ended: usize,
    /// Skipped on provider exhaustion; retried next run.
    pub skipped: usize,
    /// Ledger or task failures; logged, never fatal to the run.
    pub failed: usize,
    /// Sum of reward amounts written this run.
    pub total_reward: f64,
}

/// Drives the daily verification cycle over all active stakes.
pub struct VerificationScheduler {
    store: Arc<dyn StakingStore>,
    verifier: Arc<OwnershipVerifier>,
    lifecycle: Arc<StakeLifecycleManager>,
    reader: Arc<ResilientChainReader>,
    metrics: Arc<MetricsRegistry>,
    config: SchedulerConfig,
}

impl VerificationScheduler {
    pub fn new(
        store: Arc<dyn StakingStore>,
        verifier: Arc<OwnershipVerifier>,
        lifecycle: Arc<StakeLifecycleManager>,
        reader: Arc<ResilientChainReader>,
        metrics: Arc<MetricsRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            lifecycle,
            reader,
            metrics,
            config,
        }
    }

    /// Runs one full verification cycle at the current wall-clock time.
    pub async fn run_once(&self) -> RunSummary {
        self.run_once_at(unix_now()).await
    }

    /// Runs one full verification cycle, accruing intervals up to `now`.
    ///
    /// Each active stake is visited exactly once; the store updates the
    /// accrual anchor atomically, so a crashed run simply leaves some
    /// stakes to be picked up (with their full elapsed interval) by the
    /// next tick.
    pub async fn run_once_at(&self, now: u64) -> RunSummary {
        let started = Instant::now();
        self.reader.reset_health();

        let stakes = match self.store.active_stakes() {
            Ok(stakes) => stakes,
            Err(e) => {
                error!(error = %e, "could not list active stakes, aborting run");
                return RunSummary::default();
            }
        };

        let mut summary = RunSummary {
            total: stakes.len(),
            ..RunSummary::default()
        };

        let mut batches = stakes.chunks(self.config.batch_size.max(1)).peekable();
        while let Some(batch) = batches.next() {
            let handles: Vec<JoinHandle<Result<StakeTransition, StakeError>>> = batch
                .iter()
                .cloned()
                .map(|stake| self.spawn_stake_task(stake, now))
                .collect();

            for handle in handles {
                match handle.await {
                    Ok(Ok(StakeTransition::Accrued(record))) => {
                        summary.verified += 1;
                        if let Some(record) = record {
                            summary.total_reward += record.amount;
                        }
                    }
                    Ok(Ok(StakeTransition::Ended(_))) => summary.ended += 1,
                    Ok(Ok(StakeTransition::Skipped)) => summary.skipped += 1,
                    Ok(Err(e)) => {
                        warn!(error = %e, "stake processing failed");
                        summary.failed += 1;
                    }
                    Err(e) => {
                        error!(error = %e, "stake task panicked or was cancelled");
                        summary.failed += 1;
                    }
                }
            }

            if batches.peek().is_some() {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
        }

        self.observe(&summary, started.elapsed());
        info!(
            total = summary.total,
            verified = summary.verified,
            ended = summary.ended,
            skipped = summary.skipped,
            failed = summary.failed,
            total_reward = summary.total_reward,
            "verification run complete"
        );
        summary
    }

    fn spawn_stake_task(
        &self,
        stake: Stake,
        now: u64,
    ) -> JoinHandle<Result<StakeTransition, StakeError>> {
        let verifier = self.verifier.clone();
        let lifecycle = self.lifecycle.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = verifier.verify(&stake);
            lifecycle.apply_verification(&stake, &outcome, now)
        })
    }

    fn observe(&self, summary: &RunSummary, elapsed: Duration) {
        let m = &self.metrics.verification;
        m.run_seconds.observe(elapsed.as_secs_f64());
        m.runs_total.inc();
        m.stakes_verified.inc_by(summary.verified as u64);
        m.stakes_ended.inc_by(summary.ended as u64);
        m.stakes_skipped.inc_by(summary.skipped as u64);
        m.stake_failures.inc_by(summary.failed as u64);
        m.rewards_distributed.inc_by(summary.total_reward);
    }

    /// Runs forever: sleeps until the configured time of day, runs a
    /// cycle, repeats. Intended to be spawned onto the runtime.
    pub async fn run_forever(self: Arc<Self>) {
        loop {
            let wait = seconds_until_next_run(unix_now(), self.config.run_at_utc_secs);
            info!(seconds = wait, "next verification run scheduled");
            tokio::time::sleep(Duration::from_secs(wait)).await;
            self.run_once().await;
        }
    }
}

/// Seconds from `now` until the next occurrence of `run_at_utc_secs`
/// (seconds after UTC midnight). Exactly at the mark means the next run
/// is a full day away; the caller has just run.
pub fn seconds_until_next_run(now: u64, run_at_utc_secs: u32) -> u64 {
    let seconds_today = now % SECONDS_PER_DAY;
    let target = u64::from(run_at_utc_secs) % SECONDS_PER_DAY;
    if seconds_today < target {
        target - seconds_today
    } else {
        SECONDS_PER_DAY - seconds_today + target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::chain_reader::{
        NftMetadata, NftOwnershipSource, ProviderError, ProviderKind,
    };
    use crate::rarity::RarityResolver;
    use crate::rewards::{RewardAccrualEngine, RewardConfig};
    use crate::storage::{InMemoryStakingStore, StakingStore};
    use crate::types::{CanonicalAddress, EndReason, NewStake, RarityTier, TokenId};

    fn addr(tail: &str) -> CanonicalAddress {
        CanonicalAddress::normalize(&format!("0x{tail:0>40}")).unwrap()
    }

    /// Provider scripted per token id; missing ids fail as transport
    /// errors, standing in for a dead provider.
    struct PerTokenOwners {
        owners: HashMap<u64, CanonicalAddress>,
    }

    impl NftOwnershipSource for PerTokenOwners {
        fn kind(&self) -> ProviderKind {
            ProviderKind::JsonRpc
        }

        fn owner_of(
            &self,
            _contract: &CanonicalAddress,
            token: TokenId,
        ) -> Result<CanonicalAddress, ProviderError> {
            self.owners
                .get(&token.0)
                .cloned()
                .ok_or_else(|| ProviderError::Transport("no answer".to_string()))
        }

        fn balance_of(
            &self,
            _contract: &CanonicalAddress,
            _wallet: &CanonicalAddress,
        ) -> Result<u64, ProviderError> {
            Ok(self.owners.len() as u64)
        }

        fn token_metadata(
            &self,
            _contract: &CanonicalAddress,
            _token: TokenId,
        ) -> Result<NftMetadata, ProviderError> {
            Ok(NftMetadata::default())
        }
    }

    fn scheduler_with(
        owners: HashMap<u64, CanonicalAddress>,
        store: Arc<InMemoryStakingStore>,
    ) -> VerificationScheduler {
        let reader = Arc::new(
            ResilientChainReader::new(vec![Box::new(PerTokenOwners { owners })])
                .expect("build reader"),
        );
        let lifecycle = Arc::new(StakeLifecycleManager::new(
            store.clone() as Arc<dyn StakingStore>,
            reader.clone(),
            Arc::new(RarityResolver::new(reader.clone())),
            RewardAccrualEngine::new(RewardConfig::default()),
        ));
        VerificationScheduler::new(
            store as Arc<dyn StakingStore>,
            Arc::new(OwnershipVerifier::new(reader.clone())),
            lifecycle,
            reader,
            Arc::new(MetricsRegistry::new().expect("metrics")),
            SchedulerConfig {
                batch_size: 2,
                inter_batch_delay: Duration::from_millis(0),
                run_at_utc_secs: 0,
            },
        )
    }

    fn seed_stake(store: &InMemoryStakingStore, wallet: &CanonicalAddress, token: u64) {
        store
            .create_stake(NewStake {
                wallet_address: wallet.clone(),
                token_id: TokenId(token),
                contract_address: addr("c0ffee"),
                rarity_tier: RarityTier::Standard,
                daily_reward_rate: 33.33,
                start_time: 0,
            })
            .expect("seed stake");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mixed_batch_produces_correct_counts() {
        let store = Arc::new(InMemoryStakingStore::new());
        let staker = addr("beef");
        // Token 1 still owned, token 2 moved away, token 3 unanswerable.
        seed_stake(&store, &staker, 1);
        seed_stake(&store, &staker, 2);
        seed_stake(&store, &staker, 3);

        let owners =
            HashMap::from([(1, staker.clone()), (2, addr("dead"))]);
        let scheduler = scheduler_with(owners, store.clone());

        let summary = scheduler.run_once_at(86_400).await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.ended, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert!((summary.total_reward - 33.33).abs() < 0.01);

        // Skipped stake left untouched, ended stake closed, verified paid.
        let stakes: Vec<_> = (1..=3)
            .map(|id| {
                store
                    .get_stake(crate::types::StakeId(id))
                    .unwrap()
                    .unwrap()
            })
            .collect();
        assert!(stakes[0].active);
        assert_eq!(stakes[0].last_verification_time, 86_400);
        assert_eq!(stakes[1].end_reason, Some(EndReason::OwnershipChange));
        assert!(stakes[2].active);
        assert_eq!(stakes[2].last_verification_time, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ended_stakes_are_not_revisited() {
        let store = Arc::new(InMemoryStakingStore::new());
        let staker = addr("beef");
        seed_stake(&store, &staker, 2);

        let scheduler = scheduler_with(HashMap::from([(2, addr("dead"))]), store.clone());

        let first = scheduler.run_once_at(86_400).await;
        assert_eq!(first.ended, 1);

        let second = scheduler.run_once_at(172_800).await;
        assert_eq!(second.total, 0);
        assert!(store
            .rewards_for_stake(crate::types::StakeId(1))
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn skipped_cycle_accrues_full_interval_when_providers_recover() {
        let store = Arc::new(InMemoryStakingStore::new());
        let staker = addr("beef");
        seed_stake(&store, &staker, 1);

        // Day 1: provider down; day 3: recovered.
        let down = scheduler_with(HashMap::new(), store.clone());
        let summary = down.run_once_at(86_400).await;
        assert_eq!(summary.skipped, 1);

        let up = scheduler_with(HashMap::from([(1, staker.clone())]), store.clone());
        let summary = up.run_once_at(3 * 86_400).await;
        assert_eq!(summary.verified, 1);
        // Full three elapsed days, nothing lost to the outage.
        assert!((summary.total_reward - 33.33 * 3.0).abs() < 0.01);
    }

    #[test]
    fn next_run_wraps_across_midnight() {
        // 01:00, run at 03:00 -> two hours away.
        assert_eq!(seconds_until_next_run(3600, 3 * 3600), 2 * 3600);
        // 04:00, run at 03:00 -> tomorrow.
        assert_eq!(seconds_until_next_run(4 * 3600, 3 * 3600), 23 * 3600);
        // Exactly at the mark -> a full day away.
        assert_eq!(seconds_until_next_run(3 * 3600, 3 * 3600), SECONDS_PER_DAY);
    }
}
