use mailfusion_engine::EmailInput;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ScorerError;

/// 数值特征表（特征名 → 归一化数值）
pub type FeatureMap = BTreeMap<String, f64>;

/// 模型打分器
/// 实现方需保证：输出行数 == 输入文本数，每行是模型标签下标上的概率向量
pub trait MlScorer: Send + Sync {
    /// 打分器名称（日志/模型信息用）
    fn name(&self) -> &str;

    /// 模型下标 → 标签名；None 时标签映射降级为恒等映射
    fn id2label(&self) -> Option<BTreeMap<usize, String>>;

    /// 批量打分（阻塞调用，由工作线程池执行）
    fn score_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ScorerError>;
}

/// 特征提取器：原始邮件字段 → 归一化数值特征
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, email: &EmailInput) -> FeatureMap;
}

/// 特征打分器：数值特征 → 分类名概率表
pub trait FeatureScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, features: &FeatureMap) -> Result<BTreeMap<String, f64>, ScorerError>;
}

/// 特征提取 + 特征打分组合（双打分器集成模式）
#[derive(Clone)]
pub struct FeaturePipeline {
    extractor: Arc<dyn FeatureExtractor>,
    scorer: Arc<dyn FeatureScorer>,
}

impl FeaturePipeline {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, scorer: Arc<dyn FeatureScorer>) -> Self {
        Self { extractor, scorer }
    }

    pub fn name(&self) -> &str {
        self.scorer.name()
    }

    /// 单封邮件的特征打分
    pub fn score(&self, email: &EmailInput) -> Result<BTreeMap<String, f64>, ScorerError> {
        let features = self.extractor.extract(email);
        let probabilities = self.scorer.score(&features)?;
        if probabilities.values().any(|p| !p.is_finite()) {
            return Err(ScorerError::Malformed(format!(
                "feature scorer '{}' returned non-finite probability",
                self.scorer.name()
            )));
        }
        Ok(probabilities)
    }
}

impl std::fmt::Debug for FeaturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePipeline")
            .field("scorer", &self.scorer.name())
            .finish()
    }
}
