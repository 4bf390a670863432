//! 全局错误类型定义
use mailfusion_engine::CoreError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;

/// 分类注册表操作失败原因（Display 即面向调用方的可读原因）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Category '{0}' already exists")]
    DuplicateName(String),
    #[error("Category '{0}' not found")]
    NotFound(String),
    #[error("Cannot remove default category '{0}'")]
    DefaultProtected(String),
    #[error("Invalid category name: {0}")]
    InvalidName(String),
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),
    #[error("Category id space exhausted")]
    IdExhausted,
}

/// 打分器调用失败（统一走兜底结果，不向调用方抛出）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScorerError {
    #[error("No scorer loaded")]
    NotLoaded,
    #[error("Scorer '{name}' failed: {message}")]
    Compute { name: String, message: String },
    #[error("Malformed scorer output: {0}")]
    Malformed(String),
    #[error("Scorer timed out after {0} ms")]
    Timeout(u128),
    #[error("Scorer worker aborted: {0}")]
    WorkerAborted(String),
}

impl ScorerError {
    pub fn compute(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compute {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum MailFusionError {
    // 分类注册表
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // 打分器
    #[error("Scorer error: {0}")]
    Scorer(#[from] ScorerError),

    // 内核
    #[error("Engine error: {0}")]
    Core(#[from] CoreError),

    // 持久化/配置
    #[error("Persistence failed: {0}")]
    Persistence(String),
    #[error("Invalid configuration: {0}")]
    Config(String),

    // 序列化/反序列化错误
    #[error("JSON error: {0}")]
    JsonError(#[from] SerdeJsonError),

    // 基础错误
    #[error("IO error: {0}")]
    IoError(#[from] IoError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// 全局Result类型
pub type MfResult<T> = Result<T, MailFusionError>;
