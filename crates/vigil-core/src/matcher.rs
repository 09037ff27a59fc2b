//! Embedding comparison metrics and identity-matching policies.
//!
//! Different encoder backends disagree about what a "close" score looks
//! like: a euclidean distance shrinks towards zero for similar faces while a
//! cosine similarity grows towards one. The matching algorithm is therefore
//! written once against a [`Metric`] that carries an explicit favorable
//! direction and threshold, instead of hardcoding comparison operators.

use crate::embedding::{Embedding, Identity};

/// Which way a comparison score improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    /// Smaller is closer (euclidean distance).
    Distance,
    /// Larger is closer (cosine similarity).
    Similarity,
}

/// A comparison metric: direction plus acceptance threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub direction: MetricDirection,
    pub threshold: f32,
}

impl Metric {
    pub fn distance(threshold: f32) -> Self {
        Self {
            direction: MetricDirection::Distance,
            threshold,
        }
    }

    pub fn similarity(threshold: f32) -> Self {
        Self {
            direction: MetricDirection::Similarity,
            threshold,
        }
    }

    /// Compare two embeddings under this metric.
    ///
    /// Returns `None` on dimensionality mismatch; callers skip such pairs.
    pub fn score(&self, a: &Embedding, b: &Embedding) -> Option<f32> {
        match self.direction {
            MetricDirection::Distance => euclidean_distance(&a.values, &b.values),
            MetricDirection::Similarity => cosine_similarity(&a.values, &b.values),
        }
    }

    /// Whether `candidate` is strictly better than `incumbent`.
    ///
    /// Strict comparison means an equal score never displaces the incumbent,
    /// so on ties the first identity in iteration order wins.
    pub fn beats(&self, candidate: f32, incumbent: f32) -> bool {
        match self.direction {
            MetricDirection::Distance => candidate < incumbent,
            MetricDirection::Similarity => candidate > incumbent,
        }
    }

    /// Whether a score passes the threshold in the favorable direction.
    pub fn passes(&self, score: f32) -> bool {
        match self.direction {
            MetricDirection::Distance => score <= self.threshold,
            MetricDirection::Similarity => score >= self.threshold,
        }
    }
}

/// Euclidean (L2) distance. `None` if the vectors differ in length.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Some(sum.sqrt())
}

/// Cosine similarity. `None` if the vectors differ in length; zero if either
/// vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }
    Some(dot / (norm_a * norm_b))
}

/// Outcome of a best-match query.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// The winning score passed the threshold.
    Identified { name: String, score: f32 },
    /// No stored embedding passed the threshold. The best raw score found is
    /// kept for observability; `None` when the store was empty.
    Unknown { best_score: Option<f32> },
}

/// Best-match policy: scan every (identity, embedding) pair, keep the single
/// extremal score, and identify only if it passes the threshold gate.
#[derive(Debug, Clone, Copy)]
pub struct BestMatch {
    pub metric: Metric,
}

impl BestMatch {
    pub fn evaluate(&self, query: &Embedding, identities: &[Identity]) -> MatchOutcome {
        let mut best: Option<(&Identity, f32)> = None;

        for identity in identities {
            for stored in &identity.embeddings {
                let Some(score) = self.metric.score(query, stored) else {
                    tracing::warn!(
                        identity_id = identity.id,
                        query_dim = query.dim(),
                        stored_dim = stored.dim(),
                        "skipping embedding with mismatched dimensionality"
                    );
                    continue;
                };
                let better = match best {
                    None => true,
                    Some((_, incumbent)) => self.metric.beats(score, incumbent),
                };
                if better {
                    best = Some((identity, score));
                }
            }
        }

        match best {
            Some((identity, score)) if self.metric.passes(score) => MatchOutcome::Identified {
                name: identity.name.clone(),
                score,
            },
            Some((_, score)) => MatchOutcome::Unknown {
                best_score: Some(score),
            },
            None => MatchOutcome::Unknown { best_score: None },
        }
    }
}

/// Legacy any-match policy: true if any stored embedding is within the
/// threshold, without identifying which identity matched.
#[derive(Debug, Clone, Copy)]
pub struct AnyMatch {
    pub metric: Metric,
}

impl AnyMatch {
    pub fn evaluate(&self, query: &Embedding, identities: &[Identity]) -> bool {
        identities.iter().any(|identity| {
            identity.embeddings.iter().any(|stored| {
                self.metric
                    .score(query, stored)
                    .is_some_and(|score| self.metric.passes(score))
            })
        })
    }
}

/// Named selection between the two matching policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    Best,
    Any,
}

impl std::str::FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(MatchPolicy::Best),
            "any" => Ok(MatchPolicy::Any),
            other => Err(format!("unknown match policy '{other}' (expected 'best' or 'any')")),
        }
    }
}
