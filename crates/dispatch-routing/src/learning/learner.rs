//! Outcome-driven adaptation.
//!
//! The engine registers every decision's features and contributing patterns
//! under its routing id. When an outcome for that id arrives, the learner
//! nudges the pattern multipliers, folds the result into the outcome store
//! and the difficulty table, and every few outcomes retrains the scoring
//! model. Outcomes arrive over a bounded channel and are processed on a
//! background task, off the request path.

use super::model::{FeatureVector, ScoringModel, TrainingSample};
use super::weights::WeightStore;
use dashmap::DashMap;
use dispatch_core::{LearnerConfig, OutcomeRecord, OutcomeStore, TaskSignature};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What the learner remembers about a decision awaiting its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRouting {
    /// Signature of the routed description
    pub signature: TaskSignature,
    /// Model features at decision time
    pub features: FeatureVector,
    /// Weight-table patterns that contributed to the decision
    pub patterns: Vec<String>,
}

impl PendingRouting {
    /// Creates an entry.
    pub fn new(signature: TaskSignature, features: FeatureVector, patterns: Vec<String>) -> Self {
        Self {
            signature,
            features,
            patterns,
        }
    }
}

/// Learner counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearnerStats {
    /// Outcomes applied
    pub outcomes_processed: u64,
    /// Outcomes ignored for an unknown or consumed routing id
    pub outcomes_ignored: u64,
    /// Outcomes dropped because the queue was full
    pub outcomes_dropped: u64,
    /// Successful retrains
    pub retrains: u64,
    /// Failed retrains
    pub retrain_failures: u64,
    /// Decisions awaiting an outcome
    pub pending: usize,
    /// Buffered training samples
    pub training_samples: usize,
    /// Archived outcomes
    pub archived: usize,
    /// Weight table revision
    pub weights_revision: u64,
    /// Scoring model in use
    pub model: String,
}

/// Applies outcomes to weights, history and the scoring model.
pub struct AdaptiveLearner {
    config: LearnerConfig,
    weights: Arc<WeightStore>,
    model: Arc<dyn ScoringModel>,
    outcome_store: Arc<dyn OutcomeStore>,
    pending: DashMap<Uuid, PendingRouting>,
    /// Registration order; may hold ids whose outcome already arrived.
    pending_order: Mutex<VecDeque<Uuid>>,
    pending_capacity: usize,
    samples: Mutex<VecDeque<TrainingSample>>,
    archive: Mutex<VecDeque<OutcomeRecord>>,
    processed: AtomicU64,
    ignored: AtomicU64,
    dropped: AtomicU64,
    retrains: AtomicU64,
    retrain_failures: AtomicU64,
}

impl AdaptiveLearner {
    /// Creates a learner.
    pub fn new(
        config: LearnerConfig,
        weights: Arc<WeightStore>,
        model: Arc<dyn ScoringModel>,
        outcome_store: Arc<dyn OutcomeStore>,
        pending_capacity: usize,
    ) -> Self {
        Self {
            config,
            weights,
            model,
            outcome_store,
            pending: DashMap::new(),
            pending_order: Mutex::new(VecDeque::new()),
            pending_capacity: pending_capacity.max(1),
            samples: Mutex::new(VecDeque::new()),
            archive: Mutex::new(VecDeque::new()),
            processed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            retrains: AtomicU64::new(0),
            retrain_failures: AtomicU64::new(0),
        }
    }

    /// Weight store the learner updates.
    pub fn weights(&self) -> &Arc<WeightStore> {
        &self.weights
    }

    /// Scoring model the learner trains.
    pub fn model(&self) -> &Arc<dyn ScoringModel> {
        &self.model
    }

    /// Remembers a decision until its outcome arrives.
    ///
    /// When full, the oldest pending decision is forgotten.
    pub fn register(&self, routing_id: Uuid, pending: PendingRouting) {
        let mut order = self.pending_order.lock();
        while self.pending.len() >= self.pending_capacity {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            if self.pending.remove(&oldest).is_some() {
                debug!(routing_id = %oldest, "pending decision evicted");
            }
        }
        // Consumed ids linger in the queue until compaction.
        if order.len() >= self.pending_capacity.saturating_mul(2) {
            order.retain(|id| self.pending.contains_key(id));
        }
        order.push_back(routing_id);
        self.pending.insert(routing_id, pending);
    }

    /// Whether a decision still awaits its outcome.
    pub fn is_pending(&self, routing_id: Uuid) -> bool {
        self.pending.contains_key(&routing_id)
    }

    /// Applies one outcome. Returns `false` if it was ignored.
    pub async fn process(&self, record: OutcomeRecord) -> bool {
        let Some((_, pending)) = self.pending.remove(&record.routing_id) else {
            warn!(
                routing_id = %record.routing_id,
                "outcome for unknown or already consumed routing id ignored"
            );
            self.ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let score = record.score();
        let step = self.config.nudge_step;
        let delta = if record.success {
            step * record.satisfaction
        } else {
            -step
        };
        let retain = self.config.ema_retain;
        self.weights.update(|table| {
            for pattern in &pending.patterns {
                table.nudge(pattern, delta);
            }
            table.blend_difficulty(pending.signature, 1.0 - score, retain);
        });

        if let Err(error) = self.outcome_store.record(pending.signature, score).await {
            warn!(signature = %pending.signature, "outcome store update failed: {error}");
        }

        push_bounded(
            &mut self.samples.lock(),
            TrainingSample {
                features: pending.features,
                label: if record.success { 1.0 } else { 0.0 },
            },
            self.config.sample_capacity,
        );
        debug!(
            routing_id = %record.routing_id,
            success = record.success,
            patterns = pending.patterns.len(),
            "outcome applied"
        );
        push_bounded(&mut self.archive.lock(), record, self.config.archive_capacity);

        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let every = self.config.retrain_every.max(1) as u64;
        if processed % every == 0 {
            self.retrain();
        }
        true
    }

    /// Retrains the scoring model on the buffered samples.
    ///
    /// A failed retrain keeps the previous model; the next cycle tries again.
    pub fn retrain(&self) -> bool {
        let samples: Vec<TrainingSample> = self.samples.lock().iter().copied().collect();
        match self.model.train(&samples) {
            Ok(()) => {
                self.retrains.fetch_add(1, Ordering::Relaxed);
                info!(
                    model = self.model.name(),
                    samples = samples.len(),
                    "scoring model retrained"
                );
                true
            }
            Err(error) => {
                self.retrain_failures.fetch_add(1, Ordering::Relaxed);
                warn!(model = self.model.name(), "{error}; keeping previous model");
                false
            }
        }
    }

    /// Recently consumed outcomes, oldest first.
    pub fn archived(&self) -> Vec<OutcomeRecord> {
        self.archive.lock().iter().cloned().collect()
    }

    fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LearnerStats {
        LearnerStats {
            outcomes_processed: self.processed.load(Ordering::Relaxed),
            outcomes_ignored: self.ignored.load(Ordering::Relaxed),
            outcomes_dropped: self.dropped.load(Ordering::Relaxed),
            retrains: self.retrains.load(Ordering::Relaxed),
            retrain_failures: self.retrain_failures.load(Ordering::Relaxed),
            pending: self.pending.len(),
            training_samples: self.samples.lock().len(),
            archived: self.archive.lock().len(),
            weights_revision: self.weights.revision(),
            model: self.model.name().to_owned(),
        }
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    while buffer.len() >= capacity.max(1) {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

enum LearnerMessage {
    Outcome(OutcomeRecord),
    Flush(oneshot::Sender<()>),
}

/// Queue feeding a learner running on a background task.
pub struct LearnerHandle {
    sender: mpsc::Sender<LearnerMessage>,
    learner: Arc<AdaptiveLearner>,
}

impl LearnerHandle {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// The worker exits once the handle is dropped.
    pub fn spawn(learner: Arc<AdaptiveLearner>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel(capacity.max(1));
        let worker = Arc::clone(&learner);
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    LearnerMessage::Outcome(record) => {
                        worker.process(record).await;
                    }
                    LearnerMessage::Flush(done) => {
                        let _ignored = done.send(());
                    }
                }
            }
            debug!("learner worker stopped");
        });
        Self { sender, learner }
    }

    /// The learner behind the queue.
    pub fn learner(&self) -> &Arc<AdaptiveLearner> {
        &self.learner
    }

    /// Queues an outcome without waiting. Returns `false` if it was dropped.
    pub fn report(&self, record: OutcomeRecord) -> bool {
        let routing_id = record.routing_id;
        match self.sender.try_send(LearnerMessage::Outcome(record)) {
            Ok(()) => true,
            Err(error) => {
                warn!(%routing_id, "outcome dropped: {error}");
                self.learner.note_dropped();
                false
            }
        }
    }

    /// Waits until every outcome queued before this call is processed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(LearnerMessage::Flush(done)).await.is_ok() {
            let _ignored = wait.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryOutcomeStore;
    use crate::learning::model::LinearScoringModel;
    use dispatch_core::ConfidenceComponents;

    fn features() -> FeatureVector {
        FeatureVector::new(0.4, 1, ConfidenceComponents::default(), false, 6)
    }

    fn learner_with(config: LearnerConfig, store: Arc<InMemoryOutcomeStore>) -> AdaptiveLearner {
        AdaptiveLearner::new(
            config,
            Arc::new(WeightStore::default()),
            Arc::new(LinearScoringModel::default()),
            store,
            100,
        )
    }

    fn pending(signature: u64) -> PendingRouting {
        PendingRouting::new(
            TaskSignature(signature),
            features(),
            vec!["handler:security-auditor".to_owned()],
        )
    }

    #[tokio::test]
    async fn test_success_raises_contributing_pattern() {
        let store = Arc::new(InMemoryOutcomeStore::default());
        let learner = learner_with(LearnerConfig::default(), Arc::clone(&store));
        let routing_id = Uuid::new_v4();
        learner.register(routing_id, pending(1));

        assert!(learner.process(OutcomeRecord::new(routing_id, true, 1.0, 30)).await);
        let weights = learner.weights().snapshot();
        assert!((weights.multiplier("handler:security-auditor") - 1.05).abs() < 1e-9);
        assert!((weights.difficulty(TaskSignature(1)) - 0.4).abs() < 1e-9);

        let rate = store.success_rate(TaskSignature(1)).await.expect("lookup");
        assert_eq!(rate, Some(1.0));
    }

    #[tokio::test]
    async fn test_failure_lowers_pattern() {
        let learner = learner_with(LearnerConfig::default(), Arc::default());
        let routing_id = Uuid::new_v4();
        learner.register(routing_id, pending(2));
        learner.process(OutcomeRecord::new(routing_id, false, 0.9, 30)).await;
        let weights = learner.weights().snapshot();
        assert!((weights.multiplier("handler:security-auditor") - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_outcome_is_consumed_once() {
        let learner = learner_with(LearnerConfig::default(), Arc::default());
        let routing_id = Uuid::new_v4();
        learner.register(routing_id, pending(3));

        assert!(learner.process(OutcomeRecord::new(routing_id, true, 1.0, 5)).await);
        assert!(!learner.process(OutcomeRecord::new(routing_id, true, 1.0, 5)).await);
        assert!(!learner.process(OutcomeRecord::new(Uuid::new_v4(), true, 1.0, 5)).await);

        let stats = learner.stats();
        assert_eq!(stats.outcomes_processed, 1);
        assert_eq!(stats.outcomes_ignored, 2);
        assert_eq!(stats.archived, 1);
        assert_eq!(learner.archived()[0].routing_id, routing_id);
    }

    #[tokio::test]
    async fn test_multipliers_stay_bounded() {
        let learner = learner_with(
            LearnerConfig {
                nudge_step: 0.5,
                ..LearnerConfig::default()
            },
            Arc::default(),
        );
        for _ in 0..10 {
            let routing_id = Uuid::new_v4();
            learner.register(routing_id, pending(4));
            learner.process(OutcomeRecord::new(routing_id, false, 0.0, 5)).await;
        }
        let weights = learner.weights().snapshot();
        assert!((weights.multiplier("handler:security-auditor") - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_retrain_cadence_and_failure_accounting() {
        let learner = learner_with(
            LearnerConfig {
                retrain_every: 5,
                min_training_samples: 10,
                ..LearnerConfig::default()
            },
            Arc::default(),
        );
        for step in 0..10 {
            let routing_id = Uuid::new_v4();
            learner.register(routing_id, pending(step));
            learner.process(OutcomeRecord::new(routing_id, step % 2 == 0, 1.0, 5)).await;
        }
        let stats = learner.stats();
        assert_eq!(stats.retrain_failures, 1, "5 samples are too few");
        assert_eq!(stats.retrains, 1);
        assert_eq!(stats.training_samples, 10);
    }

    #[tokio::test]
    async fn test_pending_is_bounded() {
        let learner = AdaptiveLearner::new(
            LearnerConfig::default(),
            Arc::new(WeightStore::default()),
            Arc::new(LinearScoringModel::default()),
            Arc::new(InMemoryOutcomeStore::default()),
            2,
        );
        let first = Uuid::new_v4();
        learner.register(first, pending(1));
        learner.register(Uuid::new_v4(), pending(2));
        learner.register(Uuid::new_v4(), pending(3));
        assert_eq!(learner.stats().pending, 2);
        assert!(!learner.is_pending(first));
    }

    #[tokio::test]
    async fn test_eviction_skips_consumed_decisions() {
        let learner = AdaptiveLearner::new(
            LearnerConfig::default(),
            Arc::new(WeightStore::default()),
            Arc::new(LinearScoringModel::default()),
            Arc::new(InMemoryOutcomeStore::default()),
            2,
        );
        let consumed = Uuid::new_v4();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        learner.register(consumed, pending(1));
        learner.register(older, pending(2));
        assert!(learner.process(OutcomeRecord::new(consumed, true, 1.0, 5)).await);

        learner.register(newer, pending(3));
        assert!(learner.is_pending(older), "a free slot needs no eviction");

        let newest = Uuid::new_v4();
        learner.register(newest, pending(4));
        assert!(!learner.is_pending(older));
        assert!(learner.is_pending(newer));
        assert!(learner.is_pending(newest));
        assert_eq!(learner.stats().pending, 2);
    }

    #[tokio::test]
    async fn test_order_queue_stays_bounded_when_outcomes_keep_up() {
        let learner = learner_with(LearnerConfig::default(), Arc::default());
        for step in 0..1_000 {
            let routing_id = Uuid::new_v4();
            learner.register(routing_id, pending(step));
            learner.process(OutcomeRecord::new(routing_id, true, 1.0, 5)).await;
        }
        assert!(learner.pending_order.lock().len() <= 200);
        assert_eq!(learner.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_handle_flush_waits_for_processing() {
        let learner = Arc::new(learner_with(LearnerConfig::default(), Arc::default()));
        let handle = LearnerHandle::spawn(Arc::clone(&learner), 16);
        let routing_id = Uuid::new_v4();
        learner.register(routing_id, pending(9));

        assert!(handle.report(OutcomeRecord::new(routing_id, true, 0.5, 5)));
        handle.flush().await;
        assert_eq!(learner.stats().outcomes_processed, 1);
        assert!(!learner.is_pending(routing_id));
    }
}
