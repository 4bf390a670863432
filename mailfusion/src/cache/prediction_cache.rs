//! 预测结果缓存
//! 核心特性：
//! 1. 写满即止：容量满后新结果直接丢弃，不淘汰已有条目
//! 2. 代际计数：每次清空递增代际，旧代际算出的结果拒绝写入，避免变更竞争回填陈旧结果
//! 3. 失败结果永不缓存
//! 4. 以完整的规范化键文本为键，命中即等值匹配，不存在哈希碰撞串结果

use mailfusion_engine::PredictionResult;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheInsert {
    Stored,
    /// 同键已存在，保留旧值
    Exists,
    /// 容量已满，丢弃
    Full,
    /// 代际过期，拒绝
    Stale,
    /// 失败结果，拒绝
    Failure,
}

/// 缓存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: FxHashMap<String, PredictionResult>,
    generation: u64,
}

#[derive(Debug)]
pub struct PredictionCache {
    state: Mutex<CacheState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PredictionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前代际（预测开始前读取，写入时携带）
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// 读取缓存并计数命中/未命中
    pub fn get(&self, key: &str) -> Option<PredictionResult> {
        let found = self.lock().entries.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// 写入结果
    /// generation 为计算开始时读取的代际
    pub fn insert(&self, key: &str, generation: u64, result: &PredictionResult) -> CacheInsert {
        if result.is_failure() {
            return CacheInsert::Failure;
        }
        let mut state = self.lock();
        if state.generation != generation {
            log::debug!(
                "Refused stale cache insert (generation {} != {})",
                generation,
                state.generation
            );
            return CacheInsert::Stale;
        }
        if state.entries.contains_key(key) {
            return CacheInsert::Exists;
        }
        if state.entries.len() >= self.capacity {
            return CacheInsert::Full;
        }
        state.entries.insert(key.to_string(), result.clone());
        CacheInsert::Stored
    }

    /// 清空缓存并递增代际，返回新代际
    pub fn clear(&self) -> u64 {
        let mut state = self.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.generation += 1;
        log::debug!(
            "Prediction cache cleared | dropped={} generation={}",
            dropped,
            state.generation
        );
        state.generation
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generation: state.generation,
        }
    }
}
