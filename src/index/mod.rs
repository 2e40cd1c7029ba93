pub mod store;
pub mod types;

pub use store::StorageIndex;
pub use types::{Aggregate, BlockPos, ContainerLocation, ContainerRecord, ItemEntry, ItemSummary};
