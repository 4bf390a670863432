//! 外部打分器协作接口
//! 模型/特征打分器由调用方实现，本crate只负责调度、校验与融合
pub mod features;
pub mod traits;

pub use features::EmailFeatureExtractor;
pub use traits::{FeatureExtractor, FeatureMap, FeaturePipeline, FeatureScorer, MlScorer};
