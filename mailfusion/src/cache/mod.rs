//! 预测结果缓存
pub mod prediction_cache;

pub use prediction_cache::{CacheInsert, CacheStats, PredictionCache};
