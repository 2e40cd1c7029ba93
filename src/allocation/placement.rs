//! Deposit target selection.
//!
//! A [`PlacementPolicy`] picks which known container receives the next batch of a
//! deposit. The engine hands it the containers still eligible for the current
//! operation; the policy only chooses. The default is [`RandomPlacement`], which
//! ignores what a container already holds.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::index::types::ContainerLocation;

/// One eligible deposit target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub location: ContainerLocation,
    /// Distance from the agent when the candidates were gathered.
    pub distance: f64,
    /// Total items the index records in this container.
    pub load: u64,
}

pub trait PlacementPolicy: Send {
    fn name(&self) -> &'static str;

    /// Pick one of `candidates` for the next batch of `item`. `None` when empty.
    fn choose(&mut self, item: &str, candidates: &[Candidate]) -> Option<ContainerLocation>;
}

/// Uniformly random target.
pub struct RandomPlacement {
    rng: StdRng,
}

impl RandomPlacement {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PlacementPolicy for RandomPlacement {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(&mut self, _item: &str, candidates: &[Candidate]) -> Option<ContainerLocation> {
        candidates.choose(&mut self.rng).map(|c| c.location)
    }
}

/// Closest container to the agent. Ties go to the earlier candidate.
#[derive(Debug, Default)]
pub struct NearestPlacement;

impl PlacementPolicy for NearestPlacement {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn choose(&mut self, _item: &str, candidates: &[Candidate]) -> Option<ContainerLocation> {
        candidates
            .iter()
            .reduce(|best, c| if c.distance < best.distance { c } else { best })
            .map(|c| c.location)
    }
}

/// Container holding the fewest items. Ties go to the earlier candidate.
#[derive(Debug, Default)]
pub struct LeastFullPlacement;

impl PlacementPolicy for LeastFullPlacement {
    fn name(&self) -> &'static str {
        "least_full"
    }

    fn choose(&mut self, _item: &str, candidates: &[Candidate]) -> Option<ContainerLocation> {
        candidates
            .iter()
            .reduce(|best, c| if c.load < best.load { c } else { best })
            .map(|c| c.location)
    }
}

/// Cycles through candidates in order.
#[derive(Debug, Default)]
pub struct RoundRobinPlacement {
    cursor: usize,
}

impl PlacementPolicy for RoundRobinPlacement {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn choose(&mut self, _item: &str, candidates: &[Candidate]) -> Option<ContainerLocation> {
        if candidates.is_empty() {
            return None;
        }
        let pick = candidates[self.cursor % candidates.len()].location;
        self.cursor = self.cursor.wrapping_add(1);
        Some(pick)
    }
}

/// Placement policies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    Random,
    Nearest,
    LeastFull,
    RoundRobin,
}

impl PlacementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Nearest => "nearest",
            Self::LeastFull => "least_full",
            Self::RoundRobin => "round_robin",
        }
    }

    /// Instantiate the policy. `seed` only affects [`PlacementKind::Random`].
    pub fn build(self, seed: Option<u64>) -> Box<dyn PlacementPolicy> {
        match self {
            Self::Random => Box::new(match seed {
                Some(seed) => RandomPlacement::seeded(seed),
                None => RandomPlacement::from_entropy(),
            }),
            Self::Nearest => Box::new(NearestPlacement),
            Self::LeastFull => Box::new(LeastFullPlacement),
            Self::RoundRobin => Box::<RoundRobinPlacement>::default(),
        }
    }
}

impl std::fmt::Display for PlacementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlacementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(Self::Random),
            "nearest" => Ok(Self::Nearest),
            "least_full" => Ok(Self::LeastFull),
            "round_robin" => Ok(Self::RoundRobin),
            _ => Err(format!("unknown placement policy: {s}")),
        }
    }
}
