//! # Matflow Store
//!
//! 記錄表、鍵控鎖與髒標記追蹤

pub mod dirty_tracking;
pub mod locks;
pub mod memory;
pub mod reservation_table;
pub mod table;

use matflow_core::{EntityKind, ReconciliationRecord, ShortageAnalysis, SuggestionGroup};

// Re-export 主要類型
pub use dirty_tracking::DirtyTracker;
pub use locks::KeyedLocks;
pub use memory::{InMemoryCatalog, InMemoryDemand, InMemoryOrders, OrderDocuments, RecordingEventSink};
pub use reservation_table::ReservationTable;
pub use table::{Versioned, VersionedTable};

/// 四組持久化記錄集合
///
/// 於啟動時建立一次，由各引擎共用。
pub struct Store {
    pub reservations: ReservationTable,
    pub analyses: VersionedTable<ShortageAnalysis>,
    pub suggestions: VersionedTable<SuggestionGroup>,
    pub reconciliations: VersionedTable<ReconciliationRecord>,
}

impl Store {
    pub fn new() -> Self {
        tracing::debug!("初始化記錄表");
        Self {
            reservations: ReservationTable::new(),
            analyses: VersionedTable::new(EntityKind::ShortageAnalysis),
            suggestions: VersionedTable::new(EntityKind::SuggestionGroup),
            reconciliations: VersionedTable::new(EntityKind::Reconciliation),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
