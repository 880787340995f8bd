//! Notification sweeper.
//!
//! The one long-running, stateful part of the pipeline: at a fixed interval
//! it walks every registered path/row, forecasts the next acquisition, and
//! notifies every target that has entered its notification window, at most
//! once per prediction.
use crate::domain::{NotificationKey, NotificationRecord, PathRow, Target, User};
use crate::errors::SweepResult;
use crate::services::delivery::NotificationSender;
use crate::services::history::SceneHistorySource;
use crate::services::prediction;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Directory of registered users and their targets.
pub trait TargetDirectory {
    fn list_registered_path_rows(&self) -> impl Future<Output = SweepResult<Vec<PathRow>>> + Send;

    fn list_users_and_targets(
        &self,
        path: i32,
        row: i32,
    ) -> impl Future<Output = SweepResult<Vec<(User, Vec<Target>)>>> + Send;
}

/// Dedup ledger guaranteeing at-most-once delivery per prediction instance.
pub trait NotificationLedger {
    fn get_or_create(
        &self,
        key: &NotificationKey,
    ) -> impl Future<Output = SweepResult<NotificationRecord>> + Send;

    fn set_notified(
        &self,
        key: &NotificationKey,
        notified: bool,
    ) -> impl Future<Output = SweepResult<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Scenes requested per satellite query.
    pub sample_count: usize,
    /// Predictions further out than this are left for a later sweep.
    pub max_horizon: Duration,
    /// Delay between sweep starts.
    pub interval: std::time::Duration,
}

enum PairOutcome {
    Processed,
    Skipped,
    /// The predicted acquisition is already in the past: the sweep ran on
    /// stale data, so the remainder of the sweep is abandoned rather than
    /// cascading stale predictions across every pair.
    Stale(DateTime<Utc>),
}

pub struct NotificationSweeper<H, D, L> {
    history: H,
    directory: D,
    ledger: L,
    senders: Vec<Box<dyn NotificationSender>>,
    config: SweepConfig,
}

impl<H, D, L> NotificationSweeper<H, D, L>
where
    H: SceneHistorySource + Send + Sync,
    D: TargetDirectory + Send + Sync,
    L: NotificationLedger + Send + Sync,
{
    pub fn new(
        history: H,
        directory: D,
        ledger: L,
        senders: Vec<Box<dyn NotificationSender>>,
        config: SweepConfig,
    ) -> Self {
        Self {
            history,
            directory,
            ledger,
            senders,
            config,
        }
    }

    /// Loop forever, sweeping once per configured interval. Sweeps never
    /// overlap: the next tick is not honored until the current sweep body
    /// returns. The shutdown signal is observed between sweeps and between
    /// path/rows within a sweep.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut shutdown_changed = shutdown.clone();
        info!(
            interval_secs = self.config.interval.as_secs(),
            "notification sweeper started"
        );

        loop {
            tokio::select! {
                changed = shutdown_changed.changed() => {
                    if changed.is_err() || *shutdown_changed.borrow() {
                        info!("notification sweeper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    self.run_sweep(Utc::now(), &shutdown).await;
                }
            }
        }
    }

    /// One full pass over every registered path/row. Every per-pair failure
    /// is logged and skipped; only the staleness guard ends a sweep early.
    pub async fn run_sweep(&self, now: DateTime<Utc>, shutdown: &watch::Receiver<bool>) {
        let path_rows = match self.directory.list_registered_path_rows().await {
            Ok(pairs) => pairs,
            Err(err) => {
                error!(error = %err, "could not enumerate registered path/rows");
                return;
            }
        };

        info!(pairs = path_rows.len(), "starting notification sweep");

        for pair in path_rows {
            if *shutdown.borrow() {
                info!("sweep interrupted by shutdown");
                return;
            }

            match self.process_path_row(pair, now).await {
                Ok(PairOutcome::Processed) | Ok(PairOutcome::Skipped) => {}
                Ok(PairOutcome::Stale(predicted)) => {
                    warn!(
                        path = pair.path,
                        row = pair.row,
                        %predicted,
                        "predicted acquisition already passed; abandoning the rest of this sweep"
                    );
                    return;
                }
                Err(err) => {
                    warn!(
                        path = pair.path,
                        row = pair.row,
                        error = %err,
                        "skipping path/row this sweep"
                    );
                }
            }
        }

        info!("notification sweep finished");
    }

    async fn process_path_row(
        &self,
        pair: PathRow,
        now: DateTime<Utc>,
    ) -> SweepResult<PairOutcome> {
        let (landsat8, landsat9) = self
            .history
            .fetch(pair.path, pair.row, self.config.sample_count)
            .await?;

        // The provider returned fewer scenes than requested for at least one
        // satellite: the cadence estimate would be thin, so skip the pair
        // without failing the sweep. Checked per series; a deep history on
        // one satellite cannot mask a shallow one on the other.
        if landsat8.len() < self.config.sample_count
            || landsat9.len() < self.config.sample_count
        {
            info!(
                path = pair.path,
                row = pair.row,
                landsat8 = landsat8.len(),
                landsat9 = landsat9.len(),
                "insufficient scene history; skipping"
            );
            return Ok(PairOutcome::Skipped);
        }

        let prediction = prediction::predict(&landsat8, &landsat9)?;
        let predicted = prediction.predicted_acquisition_date;

        if predicted < now {
            return Ok(PairOutcome::Stale(predicted));
        }

        let time_until_acquisition = predicted - now;
        if time_until_acquisition > self.config.max_horizon {
            debug!(
                path = pair.path,
                row = pair.row,
                %predicted,
                "acquisition too far out; nothing to notify yet"
            );
            return Ok(PairOutcome::Skipped);
        }

        let subscriptions = self
            .directory
            .list_users_and_targets(pair.path, pair.row)
            .await?;

        for (user, targets) in &subscriptions {
            for target in targets {
                // Due when the target's offset reaches the remaining time,
                // boundary inclusive.
                if target.notification_offset < time_until_acquisition {
                    continue;
                }
                self.notify(user, target, pair, predicted).await;
            }
        }

        Ok(PairOutcome::Processed)
    }

    async fn notify(
        &self,
        user: &User,
        target: &Target,
        pair: PathRow,
        predicted: DateTime<Utc>,
    ) {
        let key = NotificationKey {
            path: pair.path,
            row: pair.row,
            user_id: user.id,
            target_id: target.id,
            predicted_acquisition: predicted,
        };

        let record = match self.ledger.get_or_create(&key).await {
            Ok(record) => record,
            Err(err) => {
                error!(
                    user = %user.id,
                    target = %target.id,
                    error = %err,
                    "ledger lookup failed; skipping this cycle"
                );
                return;
            }
        };

        if record.has_been_notified {
            debug!(
                user = %user.id,
                target = %target.id,
                "already notified for this prediction"
            );
            return;
        }

        for sender in &self.senders {
            sender.deliver(user, target);
        }

        if let Err(err) = self.ledger.set_notified(&key, true).await {
            // The next sweep may re-notify; preferable to losing the event.
            error!(
                user = %user.id,
                target = %target.id,
                error = %err,
                "failed to mark notification as sent"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SceneDateInfo;
    use crate::errors::SweepError;
    use crate::services::history::SceneHistoryPair;
    use chrono::TimeZone;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn sample(acquired: DateTime<Utc>) -> SceneDateInfo {
        SceneDateInfo {
            publish_date: acquired + Duration::days(2),
            acquisition_start: acquired,
            acquisition_end: acquired + Duration::minutes(1),
        }
    }

    /// Regular 16-day cadence for Landsat 8 with Landsat 9 interleaved 8 days
    /// later, so Landsat 8 is the due series and the next acquisition lands
    /// exactly at `latest + 16 days`.
    fn history_predicting(next_acquisition: DateTime<Utc>) -> SceneHistoryPair {
        let latest8 = next_acquisition - Duration::days(16);
        let landsat8 = vec![sample(latest8), sample(latest8 - Duration::days(16))];
        let landsat9 = vec![
            sample(latest8 + Duration::days(8)),
            sample(latest8 - Duration::days(8)),
        ];
        (landsat8, landsat9)
    }

    #[derive(Clone, Default)]
    struct SpyHistory {
        // None marks a pair whose upstream queries fail.
        results: Arc<Mutex<HashMap<(i32, i32), Option<SceneHistoryPair>>>>,
        fetched: Arc<Mutex<Vec<PathRow>>>,
    }

    impl SpyHistory {
        fn insert(&self, path: i32, row: i32, pair: Option<SceneHistoryPair>) {
            self.results.lock().unwrap().insert((path, row), pair);
        }

        fn fetch_count(&self) -> usize {
            self.fetched.lock().unwrap().len()
        }
    }

    impl SceneHistorySource for SpyHistory {
        async fn fetch(
            &self,
            path: i32,
            row: i32,
            _sample_count: usize,
        ) -> SweepResult<SceneHistoryPair> {
            self.fetched.lock().unwrap().push(PathRow { path, row });
            match self.results.lock().unwrap().get(&(path, row)) {
                Some(Some(pair)) => Ok(pair.clone()),
                Some(None) => Err(SweepError::Upstream("scene-search returned HTTP 500".into())),
                None => Ok((Vec::new(), Vec::new())),
            }
        }
    }

    #[derive(Clone, Default)]
    struct SpyDirectory {
        path_rows: Vec<PathRow>,
        subscriptions: Vec<(User, Vec<Target>)>,
        fan_out_calls: Arc<Mutex<usize>>,
    }

    impl TargetDirectory for SpyDirectory {
        async fn list_registered_path_rows(&self) -> SweepResult<Vec<PathRow>> {
            Ok(self.path_rows.clone())
        }

        async fn list_users_and_targets(
            &self,
            _path: i32,
            _row: i32,
        ) -> SweepResult<Vec<(User, Vec<Target>)>> {
            *self.fan_out_calls.lock().unwrap() += 1;
            Ok(self.subscriptions.clone())
        }
    }

    #[derive(Clone, Default)]
    struct MemoryLedger {
        records: Arc<Mutex<HashMap<NotificationKey, bool>>>,
        set_calls: Arc<Mutex<usize>>,
        fail: Arc<Mutex<bool>>,
    }

    impl NotificationLedger for MemoryLedger {
        async fn get_or_create(&self, key: &NotificationKey) -> SweepResult<NotificationRecord> {
            if *self.fail.lock().unwrap() {
                return Err(SweepError::Upstream("ledger unavailable".into()));
            }
            let has_been_notified = *self.records.lock().unwrap().entry(*key).or_insert(false);
            Ok(NotificationRecord {
                key: *key,
                has_been_notified,
            })
        }

        async fn set_notified(&self, key: &NotificationKey, notified: bool) -> SweepResult<()> {
            *self.set_calls.lock().unwrap() += 1;
            self.records.lock().unwrap().insert(*key, notified);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct SpySender {
        deliveries: Arc<Mutex<Vec<(Uuid, Uuid)>>>,
    }

    impl NotificationSender for SpySender {
        fn deliver(&self, user: &User, target: &Target) {
            self.deliveries.lock().unwrap().push((user.id, target.id));
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "watcher@example.com".to_string(),
        }
    }

    fn target(path: i32, row: i32, offset: Duration) -> Target {
        Target {
            id: Uuid::new_v4(),
            path,
            row,
            latitude: 45.5,
            longitude: -73.6,
            min_cloud_cover: None,
            max_cloud_cover: None,
            notification_offset: offset,
        }
    }

    fn config() -> SweepConfig {
        SweepConfig {
            sample_count: 2,
            max_horizon: Duration::days(1),
            interval: std::time::Duration::from_secs(600),
        }
    }

    fn sweeper(
        history: SpyHistory,
        directory: SpyDirectory,
        ledger: MemoryLedger,
        sender: SpySender,
        config: SweepConfig,
    ) -> NotificationSweeper<SpyHistory, SpyDirectory, MemoryLedger> {
        NotificationSweeper::new(history, directory, ledger, vec![Box::new(sender)], config)
    }

    fn no_shutdown() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_due_target_is_notified_once() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::hours(12);

        let history = SpyHistory::default();
        history.insert(14, 28, Some(history_predicting(predicted)));

        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(1))])],
            ..Default::default()
        };
        let ledger = MemoryLedger::default();
        let sender = SpySender::default();

        let sweeper = sweeper(
            history,
            directory,
            ledger.clone(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        assert_eq!(sender.deliveries.lock().unwrap().len(), 1);
        assert_eq!(*ledger.set_calls.lock().unwrap(), 1);

        let records = ledger.records.lock().unwrap();
        let (key, notified) = records.iter().next().unwrap();
        assert_eq!((key.path, key.row), (14, 28));
        assert_eq!(key.predicted_acquisition, predicted);
        assert!(*notified);
    }

    #[tokio::test]
    async fn test_second_sweep_does_not_renotify() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::hours(12);

        let history = SpyHistory::default();
        history.insert(14, 28, Some(history_predicting(predicted)));

        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(1))])],
            ..Default::default()
        };
        let ledger = MemoryLedger::default();
        let sender = SpySender::default();

        let sweeper = sweeper(
            history,
            directory,
            ledger.clone(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;
        sweeper.run_sweep(now + Duration::minutes(10), &shutdown).await;

        // Same prediction instance: exactly one delivery, one ledger write.
        assert_eq!(sender.deliveries.lock().unwrap().len(), 1);
        assert_eq!(*ledger.set_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::days(2);

        let history = SpyHistory::default();
        history.insert(14, 28, Some(history_predicting(predicted)));

        let exactly_due = target(14, 28, Duration::days(2));
        let not_yet_due = target(14, 28, Duration::hours(47));
        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![exactly_due.clone(), not_yet_due])],
            ..Default::default()
        };
        let sender = SpySender::default();

        let mut cfg = config();
        cfg.max_horizon = Duration::days(3);
        let sweeper = sweeper(
            history,
            directory,
            MemoryLedger::default(),
            sender.clone(),
            cfg,
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        let deliveries = sender.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].1, exactly_due.id);
    }

    #[tokio::test]
    async fn test_stale_prediction_abandons_the_sweep() {
        let now = date(2024, 6, 1);

        let history = SpyHistory::default();
        // First pair predicts a date far in the past.
        history.insert(14, 28, Some(history_predicting(date(2024, 1, 17))));
        history.insert(15, 30, Some(history_predicting(now + Duration::hours(6))));

        let directory = SpyDirectory {
            path_rows: vec![
                PathRow { path: 14, row: 28 },
                PathRow { path: 15, row: 30 },
            ],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(1))])],
            ..Default::default()
        };
        let sender = SpySender::default();
        let history_handle = history.clone();

        let sweeper = sweeper(
            history,
            directory,
            MemoryLedger::default(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        // The second pair was never fetched and nobody was notified.
        assert_eq!(history_handle.fetch_count(), 1);
        assert!(sender.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_far_future_prediction_skips_fan_out() {
        let predicted = date(2024, 1, 20);
        let now = predicted - Duration::days(3);

        let history = SpyHistory::default();
        history.insert(14, 28, Some(history_predicting(predicted)));

        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(5))])],
            ..Default::default()
        };
        let fan_out = directory.fan_out_calls.clone();
        let sender = SpySender::default();

        let sweeper = sweeper(
            history,
            directory,
            MemoryLedger::default(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        assert_eq!(*fan_out.lock().unwrap(), 0);
        assert!(sender.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_history_skips_pair_but_continues() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::hours(12);

        let history = SpyHistory::default();
        // First pair has a single Landsat 9 sample; second is healthy.
        let (landsat8, mut landsat9) = history_predicting(predicted);
        landsat9.truncate(1);
        history.insert(14, 28, Some((landsat8, landsat9)));
        history.insert(15, 30, Some(history_predicting(predicted)));

        let directory = SpyDirectory {
            path_rows: vec![
                PathRow { path: 14, row: 28 },
                PathRow { path: 15, row: 30 },
            ],
            subscriptions: vec![(user(), vec![target(15, 30, Duration::days(1))])],
            ..Default::default()
        };
        let sender = SpySender::default();
        let history_handle = history.clone();

        let sweeper = sweeper(
            history,
            directory,
            MemoryLedger::default(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        assert_eq!(history_handle.fetch_count(), 2);
        assert_eq!(sender.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deep_series_cannot_mask_a_thin_one() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::hours(12);

        // Five samples combined, but Landsat 9 alone falls short of the
        // requested count: the pair must be skipped.
        let history = SpyHistory::default();
        let (mut landsat8, landsat9) = history_predicting(predicted);
        landsat8.push(sample(date(2023, 11, 1)));
        history.insert(14, 28, Some((landsat8, landsat9)));

        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(1))])],
            ..Default::default()
        };
        let sender = SpySender::default();

        let mut cfg = config();
        cfg.sample_count = 3;
        let sweeper = sweeper(
            history,
            directory,
            MemoryLedger::default(),
            sender.clone(),
            cfg,
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        assert!(sender.deliveries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_skips_pair_but_continues() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::hours(12);

        let history = SpyHistory::default();
        history.insert(14, 28, None);
        history.insert(15, 30, Some(history_predicting(predicted)));

        let directory = SpyDirectory {
            path_rows: vec![
                PathRow { path: 14, row: 28 },
                PathRow { path: 15, row: 30 },
            ],
            subscriptions: vec![(user(), vec![target(15, 30, Duration::days(1))])],
            ..Default::default()
        };
        let sender = SpySender::default();
        let history_handle = history.clone();

        let sweeper = sweeper(
            history,
            directory,
            MemoryLedger::default(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        assert_eq!(history_handle.fetch_count(), 2);
        assert_eq!(sender.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_failure_skips_delivery() {
        let predicted = date(2024, 1, 17);
        let now = predicted - Duration::hours(12);

        let history = SpyHistory::default();
        history.insert(14, 28, Some(history_predicting(predicted)));

        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(1))])],
            ..Default::default()
        };
        let ledger = MemoryLedger::default();
        *ledger.fail.lock().unwrap() = true;
        let sender = SpySender::default();

        let sweeper = sweeper(
            history,
            directory,
            ledger.clone(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        assert!(sender.deliveries.lock().unwrap().is_empty());
        assert_eq!(*ledger.set_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_new_prediction_reopens_notification() {
        let first_predicted = date(2024, 1, 17);
        let now = first_predicted - Duration::hours(12);

        let history = SpyHistory::default();
        history.insert(14, 28, Some(history_predicting(first_predicted)));

        let directory = SpyDirectory {
            path_rows: vec![PathRow { path: 14, row: 28 }],
            subscriptions: vec![(user(), vec![target(14, 28, Duration::days(1))])],
            ..Default::default()
        };
        let ledger = MemoryLedger::default();
        let sender = SpySender::default();
        let history_handle = history.clone();

        let sweeper = sweeper(
            history,
            directory,
            ledger.clone(),
            sender.clone(),
            config(),
        );
        let (_tx, shutdown) = no_shutdown();

        sweeper.run_sweep(now, &shutdown).await;

        // New scenes arrive and the forecast moves: same target, new key.
        let second_predicted = first_predicted + Duration::days(16);
        history_handle.insert(14, 28, Some(history_predicting(second_predicted)));
        sweeper
            .run_sweep(second_predicted - Duration::hours(12), &shutdown)
            .await;

        assert_eq!(sender.deliveries.lock().unwrap().len(), 2);
        let keys: HashSet<_> = ledger.records.lock().unwrap().keys().copied().collect();
        assert_eq!(keys.len(), 2);
    }
}
