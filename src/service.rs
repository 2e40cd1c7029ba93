//! The request-facing storage service.
//!
//! [`Warehouse`] owns the storage index and the single agent. Every request that
//! moves the agent goes through one `tokio::sync::Mutex`, so physical work never
//! interleaves; read-only requests only touch the index lock and never wait on
//! travel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::allocation::placement::{PlacementKind, PlacementPolicy};
use crate::allocation::{
    search_index, AllocationEngine, DepositReport, WithdrawOutcome, WithdrawReport,
};
use crate::config::StockpileConfig;
use crate::error::{Result, StockpileError};
use crate::index::types::{Aggregate, BlockPos, ItemSummary};
use crate::index::StorageIndex;
use crate::scan::{ScanCoordinator, ScanRegion, SkippedContainer};
use crate::world::Agent;

/// How close the agent gets to the owner before handing items over.
const DELIVERY_TOLERANCE: u32 = 4;

/// What happens to a physical request that arrives while another is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Wait for the running request, first come first served.
    Queue,
    /// Fail immediately with [`StockpileError::Busy`].
    Reject,
}

impl std::str::FromStr for BusyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queue" => Ok(Self::Queue),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("unknown busy policy: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub recipient: String,
    pub delivered: u32,
    /// Set when the owner could not be reached and the agent emptied its inventory
    /// back into storage instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned_to_storage: Option<DepositReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawResponse {
    #[serde(flatten)]
    pub report: WithdrawReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub containers_indexed: usize,
    pub discovered: usize,
    pub skipped: Vec<SkippedContainer>,
    pub scanned_at: DateTime<Utc>,
}

/// Dashboard view of the whole index.
#[derive(Debug, Clone, Serialize)]
pub struct StorageListing {
    pub total: u64,
    pub matches: BTreeMap<String, ItemSummary>,
    pub containers_indexed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<DateTime<Utc>>,
}

/// Everything that may only be used by one physical request at a time.
struct Station {
    agent: Box<dyn Agent>,
    placement: Box<dyn PlacementPolicy>,
}

pub struct Warehouse {
    config: Arc<StockpileConfig>,
    index: RwLock<StorageIndex>,
    station: Mutex<Station>,
    busy: BusyPolicy,
    last_scan: RwLock<Option<DateTime<Utc>>>,
}

impl Warehouse {
    /// Build a warehouse with the placement policy named in the config.
    pub fn new(config: Arc<StockpileConfig>, agent: Box<dyn Agent>) -> anyhow::Result<Self> {
        let kind: PlacementKind = config
            .allocation
            .placement
            .parse()
            .map_err(anyhow::Error::msg)?;
        let placement = kind.build(config.allocation.placement_seed);
        Self::with_placement(config, agent, placement)
    }

    pub fn with_placement(
        config: Arc<StockpileConfig>,
        agent: Box<dyn Agent>,
        placement: Box<dyn PlacementPolicy>,
    ) -> anyhow::Result<Self> {
        let busy: BusyPolicy = config
            .allocation
            .busy_policy
            .parse()
            .map_err(anyhow::Error::msg)?;
        info!(placement = placement.name(), busy = ?busy, "warehouse ready");
        Ok(Self {
            config,
            index: RwLock::new(StorageIndex::new()),
            station: Mutex::new(Station { agent, placement }),
            busy,
            last_scan: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &StockpileConfig {
        &self.config
    }

    async fn station(&self) -> Result<MutexGuard<'_, Station>> {
        match self.busy {
            BusyPolicy::Queue => Ok(self.station.lock().await),
            BusyPolicy::Reject => self.station.try_lock().map_err(|_| StockpileError::Busy),
        }
    }

    fn engine(&self) -> AllocationEngine<'_> {
        AllocationEngine::new(&self.index, &self.config.allocation)
    }

    /// Withdraw `amount` of `item`, then hand it to the owner if one is configured.
    pub async fn request_withdraw(&self, item: &str, amount: u32) -> Result<WithdrawResponse> {
        let span = info_span!("withdraw", op = %Uuid::now_v7(), item, amount);
        async move {
            let mut station = self.station().await?;
            let Station { agent, placement } = &mut *station;
            let engine = self.engine();

            let report = engine.withdraw(agent.as_mut(), item, amount).await?;
            let delivery = match self.config.world.owner.as_deref() {
                Some(owner) if report.fulfilled > 0 => Some(
                    deliver(
                        &engine,
                        agent.as_mut(),
                        placement.as_mut(),
                        owner,
                        item,
                        report.fulfilled,
                    )
                    .await?,
                ),
                _ => None,
            };
            self.return_home(agent.as_mut()).await;

            info!(
                fulfilled = report.fulfilled,
                shortfall = report.shortfall,
                outcome = ?report.outcome,
                "withdraw finished"
            );
            Ok(WithdrawResponse { report, delivery })
        }
        .instrument(span)
        .await
    }

    /// Empty the agent's inventory into known containers.
    pub async fn request_deposit_all(&self) -> Result<DepositReport> {
        let span = info_span!("deposit_all", op = %Uuid::now_v7());
        async move {
            let mut station = self.station().await?;
            let Station { agent, placement } = &mut *station;

            let report = self
                .engine()
                .deposit_all(agent.as_mut(), placement.as_mut())
                .await?;
            self.return_home(agent.as_mut()).await;
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Rebuild the index from a full scan. `None` scans the configured storage area.
    pub async fn request_reload(&self, region: Option<ScanRegion>) -> Result<ReloadReport> {
        let span = info_span!("reload", op = %Uuid::now_v7());
        async move {
            let region = match region {
                Some(region) => region,
                None => ScanRegion::from_config(&self.config.world.storage_corners)?,
            };
            region.check_volume(self.config.scan.max_volume)?;
            let mut station = self.station().await?;
            let Station { agent, .. } = &mut *station;

            self.return_home(agent.as_mut()).await;
            let coordinator =
                ScanCoordinator::new(&self.config.scan, self.config.allocation.reach_tolerance);
            let (fresh, scan) = coordinator.scan(agent.as_mut(), &region).await;
            let containers_indexed = fresh.container_count();
            let scanned_at = Utc::now();
            {
                let mut index = self.index.write().map_err(|_| StockpileError::Poisoned)?;
                *index = fresh;
            }
            {
                let mut last = self.last_scan.write().map_err(|_| StockpileError::Poisoned)?;
                *last = Some(scanned_at);
            }
            self.return_home(agent.as_mut()).await;

            Ok(ReloadReport {
                containers_indexed,
                discovered: scan.discovered,
                skipped: scan.skipped,
                scanned_at,
            })
        }
        .instrument(span)
        .await
    }

    /// Case-insensitive substring search. Never waits on physical work.
    pub fn request_search(&self, query: &str) -> Result<Aggregate> {
        let index = self.index.read().map_err(|_| StockpileError::Poisoned)?;
        let result = search_index(&index, query);
        debug!(query, total = result.total, matches = result.matches.len(), "search");
        Ok(result)
    }

    pub fn request_listing(&self) -> Result<StorageListing> {
        let (all, containers_indexed) = {
            let index = self.index.read().map_err(|_| StockpileError::Poisoned)?;
            (index.aggregate(|_| true), index.container_count())
        };
        let last_scan = *self.last_scan.read().map_err(|_| StockpileError::Poisoned)?;
        Ok(StorageListing {
            total: all.total,
            matches: all.matches,
            containers_indexed,
            last_scan,
        })
    }

    /// A copy of the current index.
    pub fn index_snapshot(&self) -> Result<StorageIndex> {
        let index = self.index.read().map_err(|_| StockpileError::Poisoned)?;
        Ok(index.clone())
    }

    async fn return_home(&self, agent: &mut dyn Agent) {
        if !self.config.allocation.return_home {
            return;
        }
        let home = BlockPos::from(self.config.world.home);
        if let Err(e) = agent.move_to(home).await {
            warn!(home = %home, error = %e, "could not return home");
        }
    }
}

/// Hand `amount` of `item` to `owner`. If the owner cannot be reached, everything
/// the agent carries goes back into storage.
async fn deliver(
    engine: &AllocationEngine<'_>,
    agent: &mut dyn Agent,
    placement: &mut dyn PlacementPolicy,
    owner: &str,
    item: &str,
    amount: u32,
) -> Result<DeliveryReport> {
    match agent.move_near_player(owner, DELIVERY_TOLERANCE).await {
        Ok(()) => {
            let delivered = match agent.toss(item, amount).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(owner, item, error = %e, "hand-over failed");
                    0
                }
            };
            info!(owner, item, delivered, "delivered to owner");
            Ok(DeliveryReport {
                recipient: owner.to_string(),
                delivered,
                returned_to_storage: None,
            })
        }
        Err(e) => {
            warn!(owner, error = %e, "owner unreachable, returning items to storage");
            let returned = engine.deposit_all(agent, placement).await?;
            Ok(DeliveryReport {
                recipient: owner.to_string(),
                delivered: 0,
                returned_to_storage: Some(returned),
            })
        }
    }
}

impl WithdrawResponse {
    pub fn outcome(&self) -> WithdrawOutcome {
        self.report.outcome
    }
}
