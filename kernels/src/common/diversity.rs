use lru::LruCache;
use std::{hash::Hash, num::NonZeroUsize, sync::Mutex};

/// 不同多样性等级的方案缓存容量。
#[derive(Clone, Debug)]
pub struct SchemeCacheSize {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl Default for SchemeCacheSize {
    fn default() -> Self {
        Self {
            low: 4,
            medium: 16,
            high: 64,
        }
    }
}

/// 算子执行方案的多样性。
///
/// 方案只依赖数据类型的算子是 `Low`；依赖形状的算子是 `Medium` 或 `High`。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SchemeDiversity {
    Low,
    Medium,
    High,
}

impl SchemeCacheSize {
    #[inline]
    pub fn capacity(&self, level: SchemeDiversity) -> usize {
        match level {
            SchemeDiversity::Low => self.low,
            SchemeDiversity::Medium => self.medium,
            SchemeDiversity::High => self.high,
        }
    }

    pub fn new_cache<K: Hash + Eq, V>(&self, level: SchemeDiversity) -> Mutex<LruCache<K, V>> {
        let size = NonZeroUsize::new(self.capacity(level)).unwrap_or(NonZeroUsize::MIN);
        Mutex::new(LruCache::new(size))
    }
}
