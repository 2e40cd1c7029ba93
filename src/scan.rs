//! Storage area scanning.
//!
//! A scan pass walks every block in a [`ScanRegion`], keeps the primary halves of
//! recognized containers, visits each one exactly once, and records what it holds in
//! a fresh [`StorageIndex`]. Containers that cannot be reached or opened are logged
//! and left out until the next pass. There is no retry within a pass.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::{Result, StockpileError};
use crate::index::types::{BlockPos, ContainerLocation, ContainerRecord};
use crate::index::StorageIndex;
use crate::world::{Agent, WorldView};

/// An axis-aligned box of block coordinates, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanRegion {
    min: BlockPos,
    max: BlockPos,
}

impl ScanRegion {
    /// Build a region from two opposite corners given in any order.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Build a region from a configured corner list, which must hold exactly two corners.
    pub fn from_config(corners: &[[i32; 3]]) -> Result<Self> {
        match corners {
            [a, b] => Ok(Self::from_corners((*a).into(), (*b).into())),
            [] => Err(StockpileError::InvalidRegion(
                "storage corners not configured".into(),
            )),
            other => Err(StockpileError::InvalidRegion(format!(
                "expected 2 storage corners, got {}",
                other.len()
            ))),
        }
    }

    pub fn min(&self) -> BlockPos {
        self.min
    }

    pub fn max(&self) -> BlockPos {
        self.max
    }

    pub fn contains(&self, pos: &BlockPos) -> bool {
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    /// Number of blocks in the region, or `None` when it does not fit in a `u64`.
    pub fn volume(&self) -> Option<u64> {
        let span = |lo: i32, hi: i32| (hi as i64 - lo as i64 + 1) as u64;
        span(self.min.x, self.max.x)
            .checked_mul(span(self.min.y, self.max.y))?
            .checked_mul(span(self.min.z, self.max.z))
    }

    /// Reject regions holding more than `max_volume` blocks.
    pub fn check_volume(&self, max_volume: u64) -> Result<()> {
        match self.volume() {
            Some(volume) if volume <= max_volume => Ok(()),
            Some(volume) => Err(StockpileError::InvalidRegion(format!(
                "region {} to {} spans {volume} blocks, limit is {max_volume}",
                self.min, self.max
            ))),
            None => Err(StockpileError::InvalidRegion(format!(
                "region {} to {} is too large to scan",
                self.min, self.max
            ))),
        }
    }

    /// Every coordinate, x-major then y then z.
    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        (self.min.x..=self.max.x).flat_map(move |x| {
            (self.min.y..=self.max.y).flat_map(move |y| {
                (self.min.z..=self.max.z).map(move |z| BlockPos::new(x, y, z))
            })
        })
    }
}

/// Containers already opened during the current pass, keyed by the location the
/// world resolved each open to.
#[derive(Debug, Default)]
pub struct PendingOpenSet {
    opened: HashSet<ContainerLocation>,
}

impl PendingOpenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `loc` for this pass. Returns `false` if it was already claimed.
    pub fn claim(&mut self, loc: ContainerLocation) -> bool {
        self.opened.insert(loc)
    }

    pub fn len(&self) -> usize {
        self.opened.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedContainer {
    pub location: ContainerLocation,
    pub reason: String,
}

/// Summary of one scan pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Primary container halves found in the region.
    pub discovered: usize,
    /// Containers successfully opened and recorded.
    pub indexed: usize,
    pub skipped: Vec<SkippedContainer>,
}

/// Primary container halves inside `region`, in scan order.
pub fn discover<W>(world: &W, region: &ScanRegion, settings: &ScanConfig) -> Vec<ContainerLocation>
where
    W: WorldView + ?Sized,
{
    region
        .positions()
        .filter(|pos| {
            world
                .block_at(*pos)
                .map(|block| settings.is_container(&block.name) && !block.is_secondary_half())
                .unwrap_or(false)
        })
        .collect()
}

pub struct ScanCoordinator<'a> {
    settings: &'a ScanConfig,
    reach_tolerance: u32,
}

impl<'a> ScanCoordinator<'a> {
    pub fn new(settings: &'a ScanConfig, reach_tolerance: u32) -> Self {
        Self {
            settings,
            reach_tolerance,
        }
    }

    /// Run one full pass and return the rebuilt index with its report.
    pub async fn scan<A>(&self, agent: &mut A, region: &ScanRegion) -> (StorageIndex, ScanReport)
    where
        A: Agent + ?Sized,
    {
        let mut index = StorageIndex::new();
        let mut pending = PendingOpenSet::new();
        let candidates = discover(&*agent, region, self.settings);
        let mut report = ScanReport {
            discovered: candidates.len(),
            ..ScanReport::default()
        };
        info!(
            discovered = candidates.len(),
            volume = ?region.volume(),
            "found containers in storage area"
        );

        for loc in candidates {
            match self.visit(agent, loc, &mut pending).await {
                Ok(Some((resolved, record))) => {
                    debug!(location = %resolved, items = record.len(), "indexed container");
                    index.record_container(resolved, record);
                    report.indexed += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(location = %loc, error = %e, "skipping container");
                    report.skipped.push(SkippedContainer {
                        location: loc,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            indexed = report.indexed,
            skipped = report.skipped.len(),
            "finished loading containers"
        );
        (index, report)
    }

    /// Reach, open, read and close one container.
    ///
    /// Returns `None` when `loc` opened an inventory already read this pass.
    async fn visit<A>(
        &self,
        agent: &mut A,
        loc: ContainerLocation,
        pending: &mut PendingOpenSet,
    ) -> Result<Option<(ContainerLocation, ContainerRecord)>>
    where
        A: Agent + ?Sized,
    {
        let still_container = agent
            .block_at(loc)
            .map(|b| self.settings.is_container(&b.name) && !b.is_secondary_half())
            .unwrap_or(false);
        if !still_container {
            return Err(StockpileError::NotAContainer(loc));
        }

        agent.move_near(loc, self.reach_tolerance).await?;

        if self.settings.clear_obstructions {
            let above = loc.above();
            if let Some(block) = agent.block_at(above) {
                if !self.settings.is_passable(&block.name) {
                    info!(location = %above, block = %block.name, "breaking block over container");
                    if let Err(e) = agent.clear_block(above).await {
                        warn!(location = %above, error = %e, "could not clear block over container");
                    }
                }
            }
        }

        let mut handle = agent.open_container(loc).await?;
        let resolved = handle.location();
        if !pending.claim(resolved) {
            handle.close().await;
            debug!(location = %loc, resolved = %resolved, "container already read this pass");
            return Ok(None);
        }
        let stacks = handle.contents();
        handle.close().await;
        Ok(Some((resolved, ContainerRecord::from_stacks(&stacks))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_order_independent() {
        let a = BlockPos::new(5, 70, -3);
        let b = BlockPos::new(-1, 64, 2);
        let r1 = ScanRegion::from_corners(a, b);
        let r2 = ScanRegion::from_corners(b, a);
        assert_eq!(r1, r2);
        assert_eq!(r1.min(), BlockPos::new(-1, 64, -3));
        assert_eq!(r1.max(), BlockPos::new(5, 70, 2));
        assert_eq!(r1.volume(), Some(7 * 7 * 6));
    }

    #[test]
    fn oversized_regions_are_rejected() {
        let small = ScanRegion::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(9, 9, 9));
        assert!(small.check_volume(1000).is_ok());
        assert!(matches!(
            small.check_volume(999),
            Err(StockpileError::InvalidRegion(_))
        ));

        let everything = ScanRegion::from_corners(
            BlockPos::new(i32::MIN, i32::MIN, i32::MIN),
            BlockPos::new(i32::MAX, i32::MAX, i32::MAX),
        );
        assert_eq!(everything.volume(), None);
        assert!(matches!(
            everything.check_volume(u64::MAX),
            Err(StockpileError::InvalidRegion(_))
        ));
    }

    #[test]
    fn positions_are_lexicographic() {
        let r = ScanRegion::from_corners(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1));
        let all: Vec<BlockPos> = r.positions().collect();
        assert_eq!(all.len(), 8);
        assert_eq!(all[0], BlockPos::new(0, 0, 0));
        assert_eq!(all[1], BlockPos::new(0, 0, 1));
        assert_eq!(all[2], BlockPos::new(0, 1, 0));
        assert_eq!(all[7], BlockPos::new(1, 1, 1));
        assert!(all.iter().all(|p| r.contains(p)));
        assert!(!r.contains(&BlockPos::new(2, 0, 0)));
    }

    #[test]
    fn config_requires_two_corners() {
        assert!(ScanRegion::from_config(&[[0, 0, 0], [3, 3, 3]]).is_ok());
        assert!(matches!(
            ScanRegion::from_config(&[]),
            Err(StockpileError::InvalidRegion(_))
        ));
        assert!(ScanRegion::from_config(&[[0, 0, 0]]).is_err());
        assert!(ScanRegion::from_config(&[[0, 0, 0], [1, 1, 1], [2, 2, 2]]).is_err());
    }

    #[test]
    fn pending_set_claims_once() {
        let mut pending = PendingOpenSet::new();
        let loc = BlockPos::new(1, 2, 3);
        assert!(pending.claim(loc));
        assert!(!pending.claim(loc));
        assert_eq!(pending.len(), 1);
    }
}
