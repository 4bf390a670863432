//! 全局分类器配置管理

use mailfusion_engine::{FusionConfig, FALLBACK_CATEGORY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MailFusionError, MfResult};

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// 完整分类器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 注册表JSON文件路径（None时仅驻留内存）
    pub registry_path: Option<PathBuf>,
    /// 分类模板目录文件（None时使用内置模板）
    pub templates_path: Option<PathBuf>,
    /// 兜底分类名
    pub fallback_category: String,
    /// 注册表文件不存在时是否写入内置种子分类
    pub seed_defaults: bool,
    /// 批处理分块大小
    pub batch_size: usize,
    /// 预测缓存容量
    pub cache_capacity: usize,
    /// 异步预测请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 变更事件通道容量
    pub event_capacity: usize,
    /// 融合参数
    pub fusion: FusionConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            registry_path: None,
            templates_path: None,
            fallback_category: FALLBACK_CATEGORY.to_string(),
            seed_defaults: true,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            fusion: FusionConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// 持久化到指定文件的配置
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// 从JSON文件加载（缺省字段取默认值）
    pub fn from_json_file(path: impl AsRef<Path>) -> MfResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        log::debug!("Classifier config loaded from {}", path.display());
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 校验配置合法性
    pub fn validate(&self) -> MfResult<()> {
        if self.fallback_category.trim().is_empty() {
            return Err(MailFusionError::Config(
                "fallback_category must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MailFusionError::Config("batch_size must be > 0".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(MailFusionError::Config(
                "request_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(MailFusionError::Config(
                "event_capacity must be > 0".to_string(),
            ));
        }
        self.fusion.normalized()?;
        Ok(())
    }
}

/// 自定义构建器（链式 API）
#[derive(Debug, Clone, Default)]
pub struct CustomConfigBuilder {
    config: ClassifierConfig,
}

impl CustomConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry_path = Some(path.into());
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.config.registry_path = None;
        self
    }

    pub fn templates_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.templates_path = Some(path.into());
        self
    }

    pub fn fallback_category(mut self, name: impl Into<String>) -> Self {
        self.config.fallback_category = name.into();
        self
    }

    pub fn seed_defaults(mut self, seed: bool) -> Self {
        self.config.seed_defaults = seed;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn fusion(mut self, fusion: FusionConfig) -> Self {
        self.config.fusion = fusion;
        self
    }

    /// 构建并校验
    pub fn build(self) -> MfResult<ClassifierConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ClassifierConfig::default();
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.cache_capacity, 10_000);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.fallback_category, "Other");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        assert!(CustomConfigBuilder::new().batch_size(0).build().is_err());
        assert!(CustomConfigBuilder::new().fallback_category(" ").build().is_err());
        let cfg = CustomConfigBuilder::new()
            .batch_size(8)
            .cache_capacity(2)
            .request_timeout(Duration::from_millis(250))
            .build()
            .unwrap();
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.request_timeout_ms, 250);
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"batch_size": 16, "fusion": {{"ml_weight": 3.0, "feature_weight": 1.0}}}}"#
        )
        .unwrap();
        let cfg = ClassifierConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.cache_capacity, 10_000);
        assert_eq!(cfg.fusion.ml_weight, 3.0);
    }

    #[test]
    fn test_from_json_file_rejects_bad_weights() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fusion": {{"ml_weight": 0.0, "feature_weight": 0.0}}}}"#).unwrap();
        let err = ClassifierConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, MailFusionError::Core(_)));
    }
}
