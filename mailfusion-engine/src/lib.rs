// 核心公共结构体：分类、策略、邮件、预测结果、分类快照
pub mod core;
// 错误类型
pub mod error;
// 评分融合（基线/集成/策略覆盖）
pub mod fusion;
// 模型标签映射
pub mod label_map;
// 策略打分 + 规则匹配器
pub mod scorer;
// 日志格式化/字符串工具
pub mod utils;

// 顶层导出常用类型
pub use core::{
    Attachment, Category, CategoryPatch, ClassificationStrategy, EmailInput, PredictionResult,
    RegistrySnapshot, FALLBACK_CATEGORY,
};
pub use error::{CoreError, CoreResult};
pub use fusion::{DecisionSource, FusionConfig, FusionEngine, FusionOutcome};
pub use label_map::{LabelMapMode, ModelLabelMap};
pub use scorer::{EmailView, Matcher, StrategyCandidate, StrategyScorer};
