//! 客户端查询缓存：读取、乐观更新与结算

pub mod key;
pub mod optimistic;
pub mod reconcile;
pub mod store;

pub use key::{EntityRef, KeyFilter, QueryKey, QueryKind};
pub use optimistic::{ContainsEntity, EntityVersions, Location, OptimisticEngine, Pending, Settlement};
pub use reconcile::Reconciler;
pub use store::{CacheEntry, CacheEvent, QueryCache, Snapshot};
