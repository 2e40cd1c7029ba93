//! Storage index and allocation engine for a single item-fetching agent.
//!
//! Stockpile keeps a live inventory of items spread over many chests in a 3-D world
//! and decides which chests an operation touches. Withdrawals visit chests nearest
//! first, deposits spread over known chests through a pluggable placement policy,
//! and a scan of the storage area rebuilds the whole index.
//!
//! # Architecture
//!
//! - **Index**: in-memory, rebuilt by every reload, updated after each single
//!   container transfer so it always matches what actually moved
//! - **World**: the agent is reached through port traits; [`world::sim`] provides an
//!   in-memory world loaded from a JSON fixture
//! - **Serialization**: one physical request at a time, queued or rejected
//! - **Transport**: MCP over stdio, an HTTP dashboard, or a terminal console
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: Engine error taxonomy
//! - [`index`]: The storage index and its value types
//! - [`scan`]: Storage area scanning
//! - [`allocation`]: Withdraw planning, deposit placement, and search
//! - [`service`]: The request-facing [`service::Warehouse`]
//! - [`world`]: Agent ports and the simulated world

pub mod allocation;
pub mod config;
pub mod error;
pub mod index;
pub mod scan;
pub mod service;
pub mod world;
