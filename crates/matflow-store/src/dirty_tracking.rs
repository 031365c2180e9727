//! 髒標記追蹤（預留變動後需要重新分析的資源）

use std::collections::HashSet;

use matflow_core::ResourceKey;
use parking_lot::Mutex;

/// 髒標記追蹤器
#[derive(Debug, Default)]
pub struct DirtyTracker {
    dirty_resources: Mutex<HashSet<ResourceKey>>,
}

impl DirtyTracker {
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self::default()
    }

    /// 標記資源為髒
    pub fn mark_dirty(&self, key: &ResourceKey) {
        self.dirty_resources.lock().insert(key.clone());
    }

    /// 檢查資源是否為髒
    pub fn is_dirty(&self, key: &ResourceKey) -> bool {
        self.dirty_resources.lock().contains(key)
    }

    /// 取出並清除所有髒資源（依鍵排序）
    pub fn drain(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.dirty_resources.lock().drain().collect();
        keys.sort();
        keys
    }

    /// 清除所有髒標記
    pub fn clear(&self) {
        self.dirty_resources.lock().clear();
    }
}
