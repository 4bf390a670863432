//! 评分融合：单模型基线、双打分器集成、策略覆盖
mod config;
mod engine;
mod ensemble;

pub use config::FusionConfig;
pub use engine::{DecisionSource, FusionEngine, FusionOutcome};
