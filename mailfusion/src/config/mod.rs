//! 分类器配置
pub mod classifier;

pub use classifier::{ClassifierConfig, CustomConfigBuilder};
