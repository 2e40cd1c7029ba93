//! Withdraw, deposit, and search over the storage index.
//!
//! [`AllocationEngine`] decides which containers an operation touches and drives the
//! agent through them. Each successful transfer on one container is written to the
//! index right away, so a failure halfway through a plan leaves the index matching
//! what actually moved.
//!
//! Physical failures (unreachable container, refused open, broken transfer) skip
//! the rest of that container's step and the plan carries on. Only index faults
//! propagate as `Err`.

pub mod placement;

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::config::AllocationConfig;
use crate::error::{Result, StockpileError};
use crate::index::types::{Aggregate, ContainerLocation};
use crate::index::StorageIndex;
use crate::world::{Agent, Position};
use placement::{Candidate, PlacementPolicy};

// ── Plans and reports ────────────────────────────────────────────────────────

/// One container in a withdrawal plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStep {
    pub location: ContainerLocation,
    pub distance: f64,
    /// Indexed count of the item when the plan was made.
    pub available: u32,
    /// Amount this step is expected to supply. Zero for fallback steps.
    pub planned: u32,
}

/// Every container holding an item, nearest first.
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawPlan {
    pub item: String,
    pub requested: u32,
    pub steps: Vec<PlanStep>,
}

impl WithdrawPlan {
    pub fn locations(&self) -> Vec<ContainerLocation> {
        self.steps.iter().map(|s| s.location).collect()
    }

    /// Total the plan expects to supply; below `requested` means a shortfall up front.
    pub fn planned_total(&self) -> u32 {
        self.steps.iter().map(|s| s.planned).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawOutcome {
    /// The full requested amount was taken.
    Fulfilled,
    /// The item is indexed but fewer than requested could be taken.
    Shortfall,
    /// The item is not in the index at all.
    NotFound,
}

/// What happened at one container.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub location: ContainerLocation,
    pub taken: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawReport {
    pub item: String,
    pub requested: u32,
    pub fulfilled: u32,
    pub shortfall: u32,
    pub outcome: WithdrawOutcome,
    pub steps: Vec<StepReport>,
}

impl WithdrawReport {
    fn not_found(item: &str, requested: u32) -> Self {
        Self {
            item: item.to_string(),
            requested,
            fulfilled: 0,
            shortfall: requested,
            outcome: WithdrawOutcome::NotFound,
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositOutcome {
    /// Everything the agent held went into storage.
    Complete,
    /// Some items stayed with the agent.
    Partial,
    /// No containers are indexed; nothing was attempted.
    NoContainers,
    /// The agent held nothing.
    NothingHeld,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositStep {
    pub location: ContainerLocation,
    pub item: String,
    pub amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemDeposit {
    pub item: String,
    pub held: u32,
    pub deposited: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositReport {
    pub outcome: DepositOutcome,
    pub deposited: u64,
    pub remaining: u64,
    pub items: Vec<ItemDeposit>,
    pub steps: Vec<DepositStep>,
}

impl DepositReport {
    fn idle(outcome: DepositOutcome, remaining: u64) -> Self {
        Self {
            outcome,
            deposited: 0,
            remaining,
            items: Vec::new(),
            steps: Vec::new(),
        }
    }
}

/// Case-insensitive substring search over item identities. An empty query matches
/// everything.
pub fn search_index(index: &StorageIndex, query: &str) -> Aggregate {
    let needle = query.to_lowercase();
    index.aggregate(|name| name.to_lowercase().contains(&needle))
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct AllocationEngine<'a> {
    index: &'a RwLock<StorageIndex>,
    settings: &'a AllocationConfig,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(index: &'a RwLock<StorageIndex>, settings: &'a AllocationConfig) -> Self {
        Self { index, settings }
    }

    fn read(&self) -> Result<RwLockReadGuard<'a, StorageIndex>> {
        self.index.read().map_err(|_| StockpileError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'a, StorageIndex>> {
        self.index.write().map_err(|_| StockpileError::Poisoned)
    }

    /// Order every container holding `item` by distance from `origin`.
    ///
    /// Ties keep discovery order. Each step is assigned `min(available, remaining)`
    /// until the request is covered; later steps stay in the plan as fallbacks.
    pub fn plan_withdrawal(&self, item: &str, origin: &Position, amount: u32) -> Result<WithdrawPlan> {
        let index = self.read()?;
        let locations = index.locations_of(item);
        if locations.is_empty() {
            return Err(StockpileError::NotFound(item.to_string()));
        }

        let mut steps: Vec<PlanStep> = locations
            .iter()
            .map(|loc| PlanStep {
                location: *loc,
                distance: loc.distance_from(origin),
                available: index.count_at(loc, item),
                planned: 0,
            })
            .collect();
        steps.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let mut remaining = amount;
        for step in &mut steps {
            step.planned = step.available.min(remaining);
            remaining -= step.planned;
        }

        Ok(WithdrawPlan {
            item: item.to_string(),
            requested: amount,
            steps,
        })
    }

    /// Take up to `amount` of `item`, nearest container first.
    pub async fn withdraw<A>(&self, agent: &mut A, item: &str, amount: u32) -> Result<WithdrawReport>
    where
        A: Agent + ?Sized,
    {
        let plan = match self.plan_withdrawal(item, &agent.position(), amount) {
            Ok(plan) => plan,
            Err(StockpileError::NotFound(_)) => {
                info!(item, "item not found in any container");
                return Ok(WithdrawReport::not_found(item, amount));
            }
            Err(e) => return Err(e),
        };
        debug!(
            item,
            containers = plan.steps.len(),
            planned = plan.planned_total(),
            "withdrawal planned"
        );

        let mut remaining = amount;
        let mut steps = Vec::new();
        for step in &plan.steps {
            if remaining == 0 {
                break;
            }
            let report = self
                .withdraw_from(agent, step.location, item, &mut remaining)
                .await?;
            steps.push(report);
        }

        let fulfilled = amount - remaining;
        let outcome = if remaining == 0 {
            WithdrawOutcome::Fulfilled
        } else {
            info!(item, missing = remaining, "could not fulfil withdrawal");
            WithdrawOutcome::Shortfall
        };

        Ok(WithdrawReport {
            item: item.to_string(),
            requested: amount,
            fulfilled,
            shortfall: remaining,
            outcome,
            steps,
        })
    }

    /// Visit one container and take as much of `item` as the index says it holds,
    /// capped by `remaining`. Every individual transfer is applied to the index
    /// before the next one starts.
    async fn withdraw_from<A>(
        &self,
        agent: &mut A,
        loc: ContainerLocation,
        item: &str,
        remaining: &mut u32,
    ) -> Result<StepReport>
    where
        A: Agent + ?Sized,
    {
        let mut report = StepReport {
            location: loc,
            taken: 0,
            error: None,
        };

        if let Err(e) = agent.move_near(loc, self.settings.reach_tolerance).await {
            warn!(location = %loc, error = %e, "withdraw: container unreachable");
            report.error = Some(e.to_string());
            return Ok(report);
        }
        let mut handle = match agent.open_container(loc).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(location = %loc, error = %e, "withdraw: failed to open container");
                report.error = Some(e.to_string());
                return Ok(report);
            }
        };

        let stacks: Vec<_> = handle
            .contents()
            .into_iter()
            .filter(|s| s.item == item)
            .collect();

        for stack in stacks {
            if *remaining == 0 {
                break;
            }
            let indexed = {
                let index = self.read()?;
                index.count_at(&loc, item)
            };
            let want = stack.count.min(*remaining).min(indexed);
            if want == 0 {
                break;
            }

            match handle.withdraw(item, stack.slot, want).await {
                Ok(moved) => {
                    if moved > 0 {
                        let applied = {
                            let mut index = self.write()?;
                            index.apply_withdrawal(loc, item, moved)
                        };
                        if let Err(e) = applied {
                            error!(location = %loc, item, error = %e, "index rejected withdrawal");
                            handle.close().await;
                            return Err(e);
                        }
                    }
                    report.taken += moved;
                    *remaining -= moved;
                    if moved < want {
                        report.error = Some(format!("only {moved} of {want} moved"));
                        break;
                    }
                }
                Err(e) if e.is_fatal() => {
                    handle.close().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(location = %loc, error = %e, taken = report.taken, "withdraw: transfer failed");
                    report.error = Some(e.to_string());
                    break;
                }
            }
        }

        handle.close().await;
        debug!(location = %loc, item, taken = report.taken, "withdraw step done");
        Ok(report)
    }

    /// Put everything the agent holds into known containers chosen by `placement`.
    ///
    /// A container that cannot be reached or opened is dropped for the rest of the
    /// operation. One that accepts less than a full batch is considered full for the
    /// current item.
    pub async fn deposit_all<A>(
        &self,
        agent: &mut A,
        placement: &mut dyn PlacementPolicy,
    ) -> Result<DepositReport>
    where
        A: Agent + ?Sized,
    {
        let held = agent.current_items();
        let holding: u64 = held.iter().map(|s| s.count as u64).sum();
        if holding == 0 {
            return Ok(DepositReport::idle(DepositOutcome::NothingHeld, 0));
        }
        let known = self.read()?.container_count();
        if known == 0 {
            info!("no known containers, nothing deposited");
            return Ok(DepositReport::idle(DepositOutcome::NoContainers, holding));
        }

        let batch_cap = self.settings.batch_cap.max(1);
        let mut dead: HashSet<ContainerLocation> = HashSet::new();
        let mut items = Vec::new();
        let mut steps = Vec::new();

        for stack in held.into_iter().filter(|s| s.count > 0) {
            let mut remaining = stack.count;
            let mut full: HashSet<ContainerLocation> = HashSet::new();

            while remaining > 0 {
                let candidates = self.candidates(&agent.position(), |loc| {
                    !dead.contains(loc) && !full.contains(loc)
                })?;
                let Some(target) = placement.choose(&stack.item, &candidates) else {
                    warn!(item = %stack.item, remaining, "no container left to deposit into");
                    break;
                };
                if !candidates.iter().any(|c| c.location == target) {
                    return Err(StockpileError::IndexInconsistency(format!(
                        "placement policy {} chose {target}, which is not a candidate",
                        placement.name()
                    )));
                }

                let batch = remaining.min(batch_cap);
                match self.deposit_into(agent, target, &stack.item, batch).await? {
                    Ok(moved) => {
                        remaining -= moved;
                        if moved < batch {
                            full.insert(target);
                        }
                        steps.push(DepositStep {
                            location: target,
                            item: stack.item.clone(),
                            amount: moved,
                            error: None,
                        });
                    }
                    Err(e) => {
                        warn!(location = %target, error = %e, "deposit: skipping container");
                        dead.insert(target);
                        steps.push(DepositStep {
                            location: target,
                            item: stack.item.clone(),
                            amount: 0,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }

            items.push(ItemDeposit {
                item: stack.item,
                held: stack.count,
                deposited: stack.count - remaining,
            });
        }

        let deposited: u64 = items.iter().map(|i| i.deposited as u64).sum();
        let remaining = holding - deposited;
        let outcome = if remaining == 0 {
            DepositOutcome::Complete
        } else {
            DepositOutcome::Partial
        };
        info!(deposited, remaining, policy = placement.name(), "deposit complete");

        Ok(DepositReport {
            outcome,
            deposited,
            remaining,
            items,
            steps,
        })
    }

    /// One deposit visit. The outer `Result` carries index faults, the inner one
    /// physical failures.
    async fn deposit_into<A>(
        &self,
        agent: &mut A,
        loc: ContainerLocation,
        item: &str,
        amount: u32,
    ) -> Result<Result<u32>>
    where
        A: Agent + ?Sized,
    {
        if let Err(e) = agent.move_near(loc, self.settings.reach_tolerance).await {
            return Ok(Err(e));
        }
        let mut handle = match agent.open_container(loc).await {
            Ok(handle) => handle,
            Err(e) => return Ok(Err(e)),
        };

        let result = match handle.deposit(item, amount).await {
            Ok(moved) => {
                let applied = {
                    let mut index = self.write()?;
                    index.apply_deposit(loc, item, moved)
                };
                match applied {
                    Ok(_) => Ok(Ok(moved)),
                    Err(e) => {
                        error!(location = %loc, item, error = %e, "index rejected deposit");
                        Err(e)
                    }
                }
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Err(e)),
        };

        handle.close().await;
        debug!(location = %loc, item, amount, "deposit step done");
        result
    }

    fn candidates<F>(&self, origin: &Position, keep: F) -> Result<Vec<Candidate>>
    where
        F: Fn(&ContainerLocation) -> bool,
    {
        let index = self.read()?;
        Ok(index
            .containers()
            .filter(|(loc, _)| keep(loc))
            .map(|(loc, record)| Candidate {
                location: *loc,
                distance: loc.distance_from(origin),
                load: record.total(),
            })
            .collect())
    }

    /// Read-only substring search over the index.
    pub fn search(&self, query: &str) -> Result<Aggregate> {
        let index = self.read()?;
        Ok(search_index(&index, query))
    }
}
