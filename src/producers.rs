//! Producer policies: which generation stage the execution substrate pulls packets from.
//!
//! A [`Producers`] value is configuration only. [`Selector`] is a deterministic reference
//! implementation of the contract, used to sample a policy.

use crate::error::{Error, Result};
use crate::pipeline::StageId;

use rand_core::SeedableRng;
use rand_distr::{Distribution, WeightedIndex};
use rand_pcg::Pcg32;
use serde::Serialize;
use std::fmt;

/// What one weighted selection event accounts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionUnit {
    Count,
    Cycle,
    Packet,
    Bit,
}

impl fmt::Display for SelectionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionUnit::Count => write!(f, "count"),
            SelectionUnit::Cycle => write!(f, "cycle"),
            SelectionUnit::Packet => write!(f, "packet"),
            SelectionUnit::Bit => write!(f, "bit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum Producers {
    /// Every source gets one turn, in order
    RoundRobin { stages: Vec<StageId> },
    /// Sources are picked with a probability proportional to their weight
    Weighted {
        entries: Vec<(StageId, f64)>,
        unit: SelectionUnit,
    },
}

impl Producers {
    pub fn round_robin(stages: Vec<StageId>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::UnsupportedPolicy(
                "a round-robin producer set needs at least one source".to_string(),
            ));
        }
        Ok(Producers::RoundRobin { stages })
    }

    pub fn weighted(entries: Vec<(StageId, f64)>, unit: SelectionUnit) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::UnsupportedPolicy(
                "a weighted producer set needs at least one source".to_string(),
            ));
        }
        if let Some((id, weight)) = entries
            .iter()
            .find(|(_, weight)| !(weight.is_finite() && *weight > 0.0))
        {
            return Err(Error::UnsupportedPolicy(format!(
                "weight {weight} of producer {id} is not positive"
            )));
        }
        Ok(Producers::Weighted { entries, unit })
    }

    pub fn stages(&self) -> Vec<StageId> {
        match self {
            Producers::RoundRobin { stages } => stages.clone(),
            Producers::Weighted { entries, .. } => entries.iter().map(|(id, _)| *id).collect(),
        }
    }

    /// Weight of `id` relative to the sum of all weights, `None` if it is not a producer
    pub fn share(&self, id: StageId) -> Option<f64> {
        match self {
            Producers::RoundRobin { stages } => {
                let turns = stages.iter().filter(|s| **s == id).count();
                (turns > 0).then(|| turns as f64 / stages.len() as f64)
            }
            Producers::Weighted { entries, .. } => {
                let total: f64 = entries.iter().map(|(_, w)| w).sum();
                let weight: f64 = entries
                    .iter()
                    .filter(|(s, _)| *s == id)
                    .map(|(_, w)| w)
                    .sum();
                (weight > 0.0).then(|| weight / total)
            }
        }
    }

    pub fn selector(&self, seed: u64) -> Result<Selector> {
        let state = match self {
            Producers::RoundRobin { stages } => SelectorState::RoundRobin {
                stages: stages.clone(),
                next: 0,
            },
            Producers::Weighted { entries, .. } => {
                let dist = WeightedIndex::new(entries.iter().map(|(_, w)| *w))
                    .map_err(|e| Error::UnsupportedPolicy(e.to_string()))?;
                SelectorState::Weighted {
                    stages: entries.iter().map(|(id, _)| *id).collect(),
                    dist,
                    rng: Pcg32::seed_from_u64(seed),
                }
            }
        };
        Ok(Selector { state })
    }
}

impl fmt::Display for Producers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Producers::RoundRobin { stages } => {
                write!(f, "round-robin [")?;
                for (i, id) in stages.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "]")
            }
            Producers::Weighted { entries, unit } => {
                write!(f, "weighted per {unit} [")?;
                for (i, (id, weight)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}: {weight}")?;
                }
                write!(f, "]")
            }
        }
    }
}

enum SelectorState {
    RoundRobin {
        stages: Vec<StageId>,
        next: usize,
    },
    Weighted {
        stages: Vec<StageId>,
        dist: WeightedIndex<f64>,
        rng: Pcg32,
    },
}

/// Endless sequence of producer picks following a [`Producers`] policy
pub struct Selector {
    state: SelectorState,
}

impl Iterator for Selector {
    type Item = StageId;

    fn next(&mut self) -> Option<StageId> {
        match &mut self.state {
            SelectorState::RoundRobin { stages, next } => {
                let id = stages.get(*next).copied();
                *next = (*next + 1) % stages.len().max(1);
                id
            }
            SelectorState::Weighted { stages, dist, rng } => stages.get(dist.sample(rng)).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, PipelineKind};
    use crate::stage::StageHandle;

    /// Two producer ids from a throwaway pipeline
    fn two_sources() -> (StageId, StageId) {
        let mut pipeline = Pipeline::new(PipelineKind::Tx);
        let mut add = || {
            pipeline
                .add_stage(StageHandle {
                    class: "FlowGen".to_string(),
                    name: None,
                    args: serde_json::json!({}),
                    input_gates: 0,
                    output_gates: 1,
                })
                .unwrap()
        };
        (add(), add())
    }

    #[test]
    fn test_round_robin_alternates() {
        let (a, b) = two_sources();
        let producers = Producers::round_robin(vec![a, b]).unwrap();
        let picks: Vec<StageId> = producers.selector(0).unwrap().take(6).collect();
        assert_eq!(picks, vec![a, b, a, b, a, b]);
        assert_eq!(producers.share(a), Some(0.5));
        assert!(matches!(producers, Producers::RoundRobin { .. }));
    }

    #[test]
    fn test_weighted_converges() {
        let (a, b) = two_sources();
        let producers = Producers::weighted(vec![(a, 2.0), (b, 1.0)], SelectionUnit::Packet).unwrap();
        let draws = 30_000;
        let count_a = producers
            .selector(42)
            .unwrap()
            .take(draws)
            .filter(|id| *id == a)
            .count();
        let ratio = count_a as f64 / draws as f64;
        assert!((ratio - 2.0 / 3.0).abs() < 0.02, "ratio {ratio}");
        assert_eq!(producers.stages(), vec![a, b]);
        assert!((producers.share(b).unwrap() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_is_deterministic() {
        let (a, b) = two_sources();
        let producers = Producers::weighted(vec![(a, 3.0), (b, 1.0)], SelectionUnit::Packet).unwrap();
        let first: Vec<StageId> = producers.selector(7).unwrap().take(100).collect();
        let second: Vec<StageId> = producers.selector(7).unwrap().take(100).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_policies() {
        let (a, b) = two_sources();
        assert!(matches!(
            Producers::round_robin(vec![]),
            Err(Error::UnsupportedPolicy(_))
        ));
        assert!(matches!(
            Producers::weighted(vec![], SelectionUnit::Packet),
            Err(Error::UnsupportedPolicy(_))
        ));
        assert!(matches!(
            Producers::weighted(vec![(a, 0.0), (b, 0.0)], SelectionUnit::Packet),
            Err(Error::UnsupportedPolicy(_))
        ));
        assert!(matches!(
            Producers::weighted(vec![(a, 1.0), (b, -1.0)], SelectionUnit::Count),
            Err(Error::UnsupportedPolicy(_))
        ));
    }

    #[test]
    fn test_display() {
        let (a, b) = two_sources();
        let producers = Producers::weighted(vec![(a, 2.0), (b, 1.0)], SelectionUnit::Packet).unwrap();
        assert_eq!(producers.to_string(), "weighted per packet [#0: 2, #1: 1]");
        let producers = Producers::round_robin(vec![a]).unwrap();
        assert_eq!(producers.to_string(), "round-robin [#0]");
    }
}
