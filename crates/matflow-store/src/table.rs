//! 以 ID 為鍵、帶列版本的記錄表

use std::collections::HashMap;

use matflow_core::{AccountingError, EntityKind, Result};
use parking_lot::RwLock;
use uuid::Uuid;

/// 帶版本的記錄
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

/// 樂觀並行控制的記錄表
pub struct VersionedTable<T> {
    entity: EntityKind,
    rows: RwLock<HashMap<Uuid, Versioned<T>>>,
}

impl<T: Clone> VersionedTable<T> {
    /// 創建空表
    pub fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// 插入新記錄（版本 1）
    pub fn insert(&self, id: Uuid, record: T) -> Result<u64> {
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(AccountingError::conflict(self.entity, id));
        }
        rows.insert(id, Versioned { version: 1, record });
        Ok(1)
    }

    /// 讀取記錄與版本
    pub fn get(&self, id: &Uuid) -> Result<Versioned<T>> {
        self.rows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AccountingError::not_found(self.entity, id))
    }

    /// 讀取記錄
    pub fn record(&self, id: &Uuid) -> Result<T> {
        self.get(id).map(|v| v.record)
    }

    /// 版本相符時寫入，回傳新版本；否則為並行衝突
    pub fn compare_and_swap(&self, id: &Uuid, expected_version: u64, record: T) -> Result<u64> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(id)
            .ok_or_else(|| AccountingError::not_found(self.entity, id))?;

        if row.version != expected_version {
            tracing::debug!(
                entity = %self.entity,
                %id,
                expected_version,
                actual_version = row.version,
                "版本不符，拒絕寫入"
            );
            return Err(AccountingError::conflict(self.entity, id));
        }

        row.version += 1;
        row.record = record;
        Ok(row.version)
    }

    /// 讀取-修改-寫入，在寫鎖內完成
    pub fn update<R>(&self, id: &Uuid, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let mut rows = self.rows.write();
        let row = rows
            .get_mut(id)
            .ok_or_else(|| AccountingError::not_found(self.entity, id))?;

        let mut draft = row.record.clone();
        let out = f(&mut draft)?;
        row.record = draft;
        row.version += 1;
        Ok(out)
    }

    /// 所有記錄快照
    pub fn snapshot(&self) -> Vec<T> {
        self.rows.read().values().map(|v| v.record.clone()).collect()
    }

    /// 符合條件的記錄
    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .values()
            .filter(|v| predicate(&v.record))
            .map(|v| v.record.clone())
            .collect()
    }

    /// 第一筆符合條件的記錄
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<Versioned<T>> {
        self.rows.read().values().find(|v| predicate(&v.record)).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}
