//! mailfusion - 动态分类邮件分类器
//! 模型概率 + 规则策略融合，分类可在运行期增删改

pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod registry;
pub mod scorer;

// 导出全局错误类型
pub use self::error::{MailFusionError, MfResult, RegistryError, ScorerError};

// 导出配置模块核心结构体与构建器
pub use crate::config::{ClassifierConfig, CustomConfigBuilder};

// 导出分类器核心接口
pub use crate::classifier::{
    CategoryOperation, ClassifierEvent, DynamicClassifier, ModelInfo, ModelStatus,
    PerformanceStats,
};

// 导出注册表与持久化
pub use crate::registry::{
    CategoryDraft, CategoryRegistry, JsonFileStore, MemoryStore, RegistryDocument, RegistryStore,
    TemplateCatalog,
};

// 导出打分器协作接口
pub use crate::scorer::{
    EmailFeatureExtractor, FeatureExtractor, FeatureMap, FeaturePipeline, FeatureScorer, MlScorer,
};

pub use crate::cache::{CacheStats, PredictionCache};

// 内核数据结构直接转出，调用方无需额外依赖 mailfusion-engine
pub use mailfusion_engine::{
    Attachment, Category, CategoryPatch, ClassificationStrategy, EmailInput, FusionConfig,
    LabelMapMode, PredictionResult, FALLBACK_CATEGORY,
};

/// 将 log 记录桥接到 tracing 订阅器（仅在开启 tracing 特性时编译）
/// 需在安装 tracing 订阅器之后、首次打日志之前调用
#[cfg(feature = "tracing")]
pub fn init_tracing_bridge() -> MfResult<()> {
    tracing_log::LogTracer::init()
        .map_err(|e| MailFusionError::Config(format!("failed to install log bridge: {}", e)))?;
    tracing::debug!("log -> tracing bridge installed");
    Ok(())
}
