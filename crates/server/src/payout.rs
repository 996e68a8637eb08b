//! Match results and prize distribution.
//!
//! A finished room hands its [`MatchResult`] to a background worker. The
//! worker calls the [`PrizeService`] and retries failed winners with
//! exponential backoff. Failures are logged; the result itself is final and
//! nothing here can touch live room state.

use protocol::RoomId;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Share of the prize pool per rank, best first.
pub const PRIZE_SHARES: [f64; 3] = [0.50, 0.30, 0.20];

/// A member's final standing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPlayer {
    pub rank: usize,
    pub name: String,
    pub score: u64,
    /// Wallet reference from the identity service. Never published.
    #[serde(skip)]
    pub wallet: Option<String>,
}

/// A ranked player eligible for a prize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub rank: usize,
    pub name: String,
    #[serde(skip)]
    pub wallet: String,
    /// Fraction of the prize pool.
    pub share: f64,
}

/// Final outcome of one match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub match_id: u64,
    pub room_id: RoomId,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    /// Every member left before the time limit; no prizes are paid.
    pub abandoned: bool,
    pub ranking: Vec<RankedPlayer>,
    pub winners: Vec<Winner>,
}

impl MatchResult {
    /// Pick prize winners from the top `count` ranks. Players without a
    /// wallet keep their rank but receive nothing.
    pub fn select_winners(ranking: &[RankedPlayer], count: usize) -> Vec<Winner> {
        ranking
            .iter()
            .take(count)
            .filter_map(|p| {
                let wallet = p.wallet.clone()?;
                Some(Winner {
                    rank: p.rank,
                    name: p.name.clone(),
                    wallet,
                    share: p
                        .rank
                        .checked_sub(1)
                        .and_then(|i| PRIZE_SHARES.get(i))
                        .copied()
                        .unwrap_or(0.0),
                })
            })
            .collect()
    }
}

/// Result of paying one winner.
#[derive(Debug, Clone, PartialEq)]
pub struct PayoutOutcome {
    pub wallet: String,
    pub success: bool,
    pub detail: Option<String>,
}

impl PayoutOutcome {
    pub fn paid(wallet: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            success: true,
            detail: None,
        }
    }

    pub fn failed(wallet: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Downstream prize service failures.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("Prize service unreachable: {0}")]
    Unreachable(String),

    #[error("Prize service rejected match {match_id}: {reason}")]
    Rejected { match_id: u64, reason: String },
}

/// External prize distribution.
pub trait PrizeService: Send + Sync + 'static {
    /// Pay `winners` of `match_id`. Returns one outcome per winner.
    fn distribute(
        &self,
        match_id: u64,
        winners: &[Winner],
    ) -> impl Future<Output = Result<Vec<PayoutOutcome>, PayoutError>> + Send;
}

/// Prize service that only records what it would pay.
#[derive(Debug, Clone, Default)]
pub struct LoggingPrizeService;

impl PrizeService for LoggingPrizeService {
    async fn distribute(
        &self,
        match_id: u64,
        winners: &[Winner],
    ) -> Result<Vec<PayoutOutcome>, PayoutError> {
        for winner in winners {
            info!(
                "Match {}: rank {} {} receives {:.0}% of the pool",
                match_id,
                winner.rank,
                winner.name,
                winner.share * 100.0
            );
        }
        Ok(winners.iter().map(|w| PayoutOutcome::paid(&w.wallet)).collect())
    }
}

/// Background payout processing.
pub struct PayoutWorker<P> {
    service: P,
    max_attempts: u32,
    backoff: Duration,
}

impl<P: PrizeService> PayoutWorker<P> {
    pub fn new(service: P) -> Self {
        Self {
            service,
            max_attempts: 5,
            backoff: Duration::from_millis(500),
        }
    }

    /// Override the retry policy. The delay doubles after each attempt.
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Run the worker on its own task.
    pub fn spawn(self) -> PayoutHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<MatchResult>();
        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                let outcomes = self.settle(&result).await;
                let paid = outcomes.iter().filter(|o| o.success).count();
                info!(
                    "Match {} payouts settled: {}/{} paid",
                    result.match_id,
                    paid,
                    outcomes.len()
                );
            }
        });
        PayoutHandle { tx }
    }

    /// Pay every winner of `result`, retrying failures.
    pub async fn settle(&self, result: &MatchResult) -> Vec<PayoutOutcome> {
        if result.abandoned || result.winners.is_empty() {
            return Vec::new();
        }

        let mut pending: Vec<Winner> = result.winners.clone();
        let mut settled = Vec::with_capacity(pending.len());
        let mut delay = self.backoff;

        for attempt in 1..=self.max_attempts {
            match self.service.distribute(result.match_id, &pending).await {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        if !outcome.success {
                            warn!(
                                "Match {} payout to {} failed (attempt {}): {}",
                                result.match_id,
                                outcome.wallet,
                                attempt,
                                outcome.detail.as_deref().unwrap_or("no detail")
                            );
                        }
                    }
                    pending.retain(|w| {
                        !outcomes
                            .iter()
                            .any(|o| o.success && o.wallet == w.wallet)
                    });
                    settled.extend(outcomes.into_iter().filter(|o| o.success));
                }
                Err(e) => warn!(
                    "Match {} payout attempt {} failed: {}",
                    result.match_id, attempt, e
                ),
            }

            if pending.is_empty() {
                return settled;
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        error!(
            "Match {}: giving up on {} payout(s) after {} attempts",
            result.match_id,
            pending.len(),
            self.max_attempts
        );
        settled.extend(
            pending
                .into_iter()
                .map(|w| PayoutOutcome::failed(w.wallet, "retries exhausted")),
        );
        settled
    }
}

/// Sending side of the payout worker.
#[derive(Debug, Clone)]
pub struct PayoutHandle {
    tx: mpsc::UnboundedSender<MatchResult>,
}

impl PayoutHandle {
    /// Queue a finished match. Abandoned matches are skipped by the worker.
    pub fn submit(&self, result: MatchResult) {
        let match_id = result.match_id;
        if self.tx.send(result).is_err() {
            error!("Payout worker is gone, match {} will not be paid", match_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ranking() -> Vec<RankedPlayer> {
        ["ann", "bob", "cid", "dee"]
            .iter()
            .enumerate()
            .map(|(i, name)| RankedPlayer {
                rank: i + 1,
                name: name.to_string(),
                score: 100 - i as u64 * 10,
                wallet: (*name != "bob").then(|| format!("W-{}", name)),
            })
            .collect()
    }

    fn result() -> MatchResult {
        let ranking = ranking();
        MatchResult {
            match_id: 7,
            room_id: RoomId(1),
            started_at_ms: 0,
            ended_at_ms: 1000,
            abandoned: false,
            winners: MatchResult::select_winners(&ranking, 3),
            ranking,
        }
    }

    /// Fails the first `outages` calls outright, then refuses `flaky` once.
    struct FlakyService {
        calls: AtomicU32,
        outages: u32,
        flaky: Mutex<Option<String>>,
    }

    impl PrizeService for FlakyService {
        async fn distribute(
            &self,
            match_id: u64,
            winners: &[Winner],
        ) -> Result<Vec<PayoutOutcome>, PayoutError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.outages {
                return Err(PayoutError::Unreachable(format!("call {}", call)));
            }
            let flaky = self.flaky.lock().unwrap().take();
            Ok(winners
                .iter()
                .map(|w| {
                    if flaky.as_deref() == Some(w.wallet.as_str()) {
                        PayoutOutcome::failed(&w.wallet, format!("match {}", match_id))
                    } else {
                        PayoutOutcome::paid(&w.wallet)
                    }
                })
                .collect())
        }
    }

    #[test]
    fn test_winners_skip_missing_wallets() {
        let winners = MatchResult::select_winners(&ranking(), 3);
        let names: Vec<&str> = winners.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["ann", "cid"]);
        assert_eq!(winners[0].share, 0.50);
        assert_eq!(winners[1].share, 0.20);
    }

    #[tokio::test]
    async fn test_retries_until_service_recovers() {
        let worker = PayoutWorker::new(FlakyService {
            calls: AtomicU32::new(0),
            outages: 2,
            flaky: Mutex::new(Some("W-cid".into())),
        })
        .with_retry(5, Duration::from_millis(1));

        let outcomes = worker.settle(&result()).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.success));
        // Two outages, one partial success, one retry for the refused wallet.
        assert_eq!(worker.service.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let worker = PayoutWorker::new(FlakyService {
            calls: AtomicU32::new(0),
            outages: u32::MAX,
            flaky: Mutex::new(None),
        })
        .with_retry(3, Duration::from_millis(1));

        let outcomes = worker.settle(&result()).await;

        assert_eq!(worker.service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| !o.success));
    }

    #[tokio::test]
    async fn test_abandoned_match_pays_nothing() {
        let worker = PayoutWorker::new(LoggingPrizeService);
        let mut abandoned = result();
        abandoned.abandoned = true;
        assert!(worker.settle(&abandoned).await.is_empty());
        assert_eq!(worker.settle(&result()).await.len(), 2);
    }
}
