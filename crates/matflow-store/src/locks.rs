//! 依鍵分配的互斥鎖（同一資源 / 同一建議的檢查與寫入須為單一原子單位）

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// 鍵控鎖註冊表
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 取得鍵對應的鎖（不存在則建立）
    ///
    /// ```
    /// use matflow_store::KeyedLocks;
    ///
    /// let locks = KeyedLocks::new();
    /// let lock = locks.handle(&"PLATE-A");
    /// let _guard = lock.lock();
    /// assert!(locks.handle(&"PLATE-A").try_lock().is_none());
    /// assert!(locks.handle(&"PLATE-B").try_lock().is_some());
    /// ```
    pub fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 已註冊的鍵數量
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_same_key_shares_lock() {
        let locks = KeyedLocks::new();
        let a = locks.handle(&1u32);
        let b = locks.handle(&1u32);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_serializes_critical_section() {
        let locks = KeyedLocks::new();
        let inside = AtomicU32::new(0);
        let max_seen = AtomicU32::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let lock = locks.handle(&"R-1");
                    let _guard = lock.lock();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
