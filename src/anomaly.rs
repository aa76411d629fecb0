use crate::error::{KpiEngineError, Result};
use crate::schema::TransactionRecord;
use crate::utils::percentile;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnomalyConfig {
    #[schemars(description = "Below this many transactions every row is tagged insufficient-data")]
    pub min_samples: usize,

    #[schemars(description = "Expected share of outliers, in (0, 0.5]")]
    pub contamination: f64,

    pub n_estimators: usize,

    #[schemars(description = "Rows sampled per tree, capped at the number of transactions")]
    pub max_samples: usize,

    pub seed: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            contamination: 0.01,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(KpiEngineError::InvalidAnomalyConfig(format!(
                "contamination {} must be in (0, 0.5]",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(KpiEngineError::InvalidAnomalyConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_samples < 2 {
            return Err(KpiEngineError::InvalidAnomalyConfig(
                "max_samples must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyTag {
    Normal,
    Anomaly,
    InsufficientData,
}

impl AnomalyTag {
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyTag::Normal => "Normal",
            AnomalyTag::Anomaly => "Anomaly",
            AnomalyTag::InsufficientData => "Not enough data",
        }
    }
}

pub fn count_anomalies(tags: &[AnomalyTag]) -> usize {
    tags.iter().filter(|t| **t == AnomalyTag::Anomaly).count()
}

/// Average path length of an unsuccessful search in a binary search tree
/// of `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Uniform draw in `[min, max)`. Spans wider than `f64::MAX` are drawn at
/// half scale; a draw that is not strictly below `max` falls back to `min`.
fn split_point(min: f64, max: f64, rng: &mut StdRng) -> f64 {
    let t: f64 = rng.gen();
    let point = if (max - min).is_finite() {
        min + t * (max - min)
    } else {
        (min / 2.0 + t * (max / 2.0 - min / 2.0)) * 2.0
    };
    if point >= min && point < max {
        point
    } else {
        min
    }
}

impl Node {
    fn build(values: Vec<f64>, depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
        if depth >= height_limit || values.len() <= 1 {
            return Node::Leaf { size: values.len() };
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min >= max {
            return Node::Leaf { size: values.len() };
        }

        let threshold = split_point(min, max, rng);
        let (left, right): (Vec<f64>, Vec<f64>) = values.into_iter().partition(|&v| v <= threshold);

        Node::Split {
            threshold,
            left: Box::new(Node::build(left, depth + 1, height_limit, rng)),
            right: Box::new(Node::build(right, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(&self, x: f64) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    threshold,
                    left,
                    right,
                } => {
                    node = if x <= *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Isolation forest over a single numeric feature.
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    pub fn fit(values: &[f64], config: &AnomalyConfig) -> Result<Self> {
        config.validate()?;
        if values.len() < 2 {
            return Err(KpiEngineError::InvalidAnomalyConfig(format!(
                "need at least 2 values to fit, got {}",
                values.len()
            )));
        }

        let sample_size = config.max_samples.min(values.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let trees = (0..config.n_estimators)
            .map(|_| {
                let sample: Vec<f64> =
                    rand::seq::index::sample(&mut rng, values.len(), sample_size)
                        .into_iter()
                        .map(|i| values[i])
                        .collect();
                Node::build(sample, 0, height_limit, &mut rng)
            })
            .collect();

        Ok(Self { trees, sample_size })
    }

    /// Anomaly score in (0, 1]; higher means easier to isolate.
    pub fn score(&self, x: f64) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / average_path_length(self.sample_size))
    }

    pub fn scores(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.score(v)).collect()
    }
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Tags each amount, in input order.
    ///
    /// The forest is refit on every call, so the same amount can be tagged
    /// differently depending on which other amounts are present.
    pub fn detect(&self, amounts: &[f64]) -> Result<Vec<AnomalyTag>> {
        if amounts.len() < self.config.min_samples.max(2) {
            debug!(
                "Skipping anomaly detection: {} transactions, need {}",
                amounts.len(),
                self.config.min_samples
            );
            return Ok(vec![AnomalyTag::InsufficientData; amounts.len()]);
        }

        let forest = IsolationForest::fit(amounts, &self.config)?;
        let scores = forest.scores(amounts);

        let mut sorted = scores.clone();
        sorted.sort_by(f64::total_cmp);
        let cutoff = percentile(&sorted, 100.0 * (1.0 - self.config.contamination))
            .unwrap_or(f64::INFINITY);

        let tags: Vec<AnomalyTag> = scores
            .into_iter()
            .map(|s| {
                if s > cutoff {
                    AnomalyTag::Anomaly
                } else {
                    AnomalyTag::Normal
                }
            })
            .collect();

        debug!(
            "Anomaly detection over {} transactions flagged {} (cutoff score {:.4})",
            amounts.len(),
            count_anomalies(&tags),
            cutoff
        );

        Ok(tags)
    }

    pub fn detect_records(&self, records: &[TransactionRecord]) -> Result<Vec<AnomalyTag>> {
        let amounts: Vec<f64> = records.iter().map(|r| r.amount).collect();
        self.detect(&amounts)
    }
}

pub fn detect_anomalies(amounts: &[f64], config: &AnomalyConfig) -> Result<Vec<AnomalyTag>> {
    AnomalyDetector::new(config.clone())?.detect(amounts)
}
