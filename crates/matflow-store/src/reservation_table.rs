//! 預留記錄表（含資源索引）

use std::collections::HashMap;

use matflow_core::{EntityKind, Reservation, ResourceKey, Result};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::dirty_tracking::DirtyTracker;
use crate::table::{Versioned, VersionedTable};

/// 預留記錄表
///
/// 預留永不實體刪除；取消與耗用皆為狀態轉換。
pub struct ReservationTable {
    rows: VersionedTable<Reservation>,
    by_resource: RwLock<HashMap<ResourceKey, Vec<Uuid>>>,
    dirty: DirtyTracker,
}

impl ReservationTable {
    pub fn new() -> Self {
        Self {
            rows: VersionedTable::new(EntityKind::Reservation),
            by_resource: RwLock::new(HashMap::new()),
            dirty: DirtyTracker::new(),
        }
    }

    /// 新增預留
    pub fn insert(&self, reservation: Reservation) -> Result<()> {
        let key = reservation.selector.catalog_key().cloned();
        self.rows.insert(reservation.id, reservation.clone())?;
        if let Some(key) = key {
            self.by_resource
                .write()
                .entry(key.clone())
                .or_default()
                .push(reservation.id);
            self.dirty.mark_dirty(&key);
        }
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Result<Versioned<Reservation>> {
        self.rows.get(id)
    }

    /// 版本相符時寫入
    pub fn compare_and_swap(&self, id: &Uuid, expected_version: u64, reservation: Reservation) -> Result<u64> {
        let key = reservation.selector.catalog_key().cloned();
        let version = self.rows.compare_and_swap(id, expected_version, reservation)?;
        if let Some(key) = key {
            self.dirty.mark_dirty(&key);
        }
        Ok(version)
    }

    /// 指定資源的所有預留（含終態，依建立時間排序）
    pub fn for_resource(&self, key: &ResourceKey) -> Vec<Reservation> {
        let ids = self
            .by_resource
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default();
        let mut reservations: Vec<_> = ids
            .iter()
            .filter_map(|id| self.rows.record(id).ok())
            .collect();
        reservations.sort_by_key(|r| r.created_at);
        reservations
    }

    /// 指定資源的 RESERVED 總量，可排除某一筆預留
    pub fn reserved_sum(&self, key: &ResourceKey, excluding: Option<Uuid>) -> Decimal {
        self.for_resource(key)
            .iter()
            .filter(|r| Some(r.id) != excluding)
            .map(|r| r.held_quantity())
            .sum()
    }

    /// 所有資源的 RESERVED 總量（單次讀取快照）
    pub fn reserved_sums(&self) -> HashMap<ResourceKey, Decimal> {
        let mut sums: HashMap<ResourceKey, Decimal> = HashMap::new();
        for reservation in self.rows.filter(|r| r.is_active()) {
            if let Some(key) = reservation.selector.catalog_key() {
                *sums.entry(key.clone()).or_insert(Decimal::ZERO) += reservation.held_quantity();
            }
        }
        sums
    }

    /// 指定工作項目的預留
    pub fn for_work_item(&self, work_item_id: &str) -> Vec<Reservation> {
        let mut reservations = self.rows.filter(|r| r.work_item_id == work_item_id);
        reservations.sort_by_key(|r| r.created_at);
        reservations
    }

    /// 預留變動過的資源追蹤器
    pub fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for ReservationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matflow_core::{CustomSpec, Profile, Quantity, ResourceSelector};

    fn catalog(key: &ResourceKey, pieces: u32) -> Reservation {
        Reservation::new(
            "WI-1",
            ResourceSelector::catalog(key.clone()),
            Quantity::Pieces(pieces),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        )
    }

    #[test]
    fn test_reserved_sum_counts_only_active() {
        let table = ReservationTable::new();
        let key = ResourceKey::material("PLATE-A");

        let a = catalog(&key, 4);
        let b = catalog(&key, 6);
        let mut c = catalog(&key, 3);
        c.cancel(Utc::now()).unwrap();

        table.insert(a.clone()).unwrap();
        table.insert(b.clone()).unwrap();
        table.insert(c).unwrap();

        assert_eq!(table.reserved_sum(&key, None), Decimal::from(10));
        assert_eq!(table.reserved_sum(&key, Some(b.id)), Decimal::from(4));
        assert_eq!(table.reserved_sums().get(&key), Some(&Decimal::from(10)));
        assert_eq!(table.for_resource(&key).len(), 3);
    }

    #[test]
    fn test_custom_reservations_not_indexed() {
        let table = ReservationTable::new();
        let spec = CustomSpec::new(
            "Sonderblech",
            Profile::Flat {
                x: Decimal::from(10),
                y: Decimal::from(10),
                z: Decimal::ONE,
            },
            "S235",
        );
        let custom = Reservation::new(
            "WI-9",
            ResourceSelector::custom(spec),
            Quantity::Pieces(1),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        );
        table.insert(custom).unwrap();

        assert!(table.reserved_sums().is_empty());
        assert!(table.dirty().drain().is_empty());
        assert_eq!(table.for_work_item("WI-9").len(), 1);
    }

    #[test]
    fn test_writes_mark_resource_dirty() {
        let table = ReservationTable::new();
        let key = ResourceKey::tool("T-1");
        let reservation = catalog(&key, 1);
        table.insert(reservation.clone()).unwrap();
        assert_eq!(table.dirty().drain(), vec![key.clone()]);

        let mut cancelled = reservation.clone();
        cancelled.cancel(Utc::now()).unwrap();
        table.compare_and_swap(&reservation.id, 1, cancelled).unwrap();
        assert!(table.dirty().is_dirty(&key));
    }
}
