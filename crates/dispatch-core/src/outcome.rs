//! Outcome feedback and the learned weight table.

use crate::error::Result;
use crate::types::TaskSignature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Lower bound for a pattern multiplier.
pub const MIN_PATTERN_WEIGHT: f64 = 0.1;
/// Upper bound for a pattern multiplier.
pub const MAX_PATTERN_WEIGHT: f64 = 2.0;
/// Difficulty assumed for signatures with no history.
const DEFAULT_DIFFICULTY: f64 = 0.5;

/// Result of executing a previously routed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Decision this outcome refers to
    pub routing_id: Uuid,
    /// Whether the task succeeded
    pub success: bool,
    /// Caller satisfaction in `[0, 1]`
    pub satisfaction: f64,
    /// Execution latency
    pub latency_ms: u64,
    /// When the outcome was reported
    pub recorded_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Creates a record stamped with the current time.
    pub fn new(routing_id: Uuid, success: bool, satisfaction: f64, latency_ms: u64) -> Self {
        Self {
            routing_id,
            success,
            satisfaction: satisfaction.clamp(0.0, 1.0),
            latency_ms,
            recorded_at: Utc::now(),
        }
    }

    /// Success signal in `[0, 1]`: zero on failure, satisfaction on success.
    pub fn score(&self) -> f64 {
        if self.success { self.satisfaction } else { 0.0 }
    }
}

/// A single learned multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternWeight {
    /// Rule the multiplier applies to (`handler:<id>`, `complexity:<term>`)
    pub pattern_id: String,
    /// Multiplier in `[0.1, 2.0]`
    pub multiplier: f64,
}

/// Pattern multipliers and per-signature difficulty learned from outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    /// Incremented on every mutation
    pub revision: u64,
    #[serde(default)]
    patterns: BTreeMap<String, f64>,
    #[serde(default)]
    difficulty: BTreeMap<String, f64>,
}

impl WeightTable {
    /// Multiplier for a pattern, `1.0` when never adjusted.
    pub fn multiplier(&self, pattern_id: &str) -> f64 {
        self.patterns.get(pattern_id).copied().unwrap_or(1.0)
    }

    /// Adds `delta` to a multiplier, clamped to the allowed range.
    ///
    /// Returns the new multiplier.
    pub fn nudge(&mut self, pattern_id: &str, delta: f64) -> f64 {
        let updated =
            (self.multiplier(pattern_id) + delta).clamp(MIN_PATTERN_WEIGHT, MAX_PATTERN_WEIGHT);
        self.patterns.insert(pattern_id.to_owned(), updated);
        self.revision += 1;
        updated
    }

    /// Learned difficulty for a signature, `0.5` when unknown.
    pub fn difficulty(&self, signature: TaskSignature) -> f64 {
        self.difficulty
            .get(&signature.to_string())
            .copied()
            .unwrap_or(DEFAULT_DIFFICULTY)
    }

    /// Moves a signature's difficulty toward `observed` by exponential averaging.
    pub fn blend_difficulty(&mut self, signature: TaskSignature, observed: f64, retain: f64) {
        let current = self.difficulty(signature);
        let blended = retain.mul_add(current, (1.0 - retain) * observed.clamp(0.0, 1.0));
        self.difficulty.insert(signature.to_string(), blended);
        self.revision += 1;
    }

    /// All adjusted multipliers, sorted by pattern id.
    pub fn patterns(&self) -> Vec<PatternWeight> {
        self.patterns
            .iter()
            .map(|(pattern_id, multiplier)| PatternWeight {
                pattern_id: pattern_id.clone(),
                multiplier: *multiplier,
            })
            .collect()
    }

    /// Number of signatures with learned difficulty.
    pub fn difficulty_entries(&self) -> usize {
        self.difficulty.len()
    }

    /// Writes a JSON snapshot.
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reads a JSON snapshot, clamping any out-of-range multiplier.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut table: Self = serde_json::from_str(&contents)?;
        for multiplier in table.patterns.values_mut() {
            *multiplier = multiplier.clamp(MIN_PATTERN_WEIGHT, MAX_PATTERN_WEIGHT);
        }
        for difficulty in table.difficulty.values_mut() {
            *difficulty = difficulty.clamp(0.0, 1.0);
        }
        Ok(table)
    }
}
