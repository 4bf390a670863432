//! 单次预测的打分上下文
//! 预测开始时一次性捕获：缓存代际 → 分类快照 → 标签映射 → 打分器句柄
//! 上下文全部为 Arc，可整体移入工作线程；打分全程不持有任何注册表锁

use mailfusion_engine::utils::preview_compact;
use mailfusion_engine::{
    EmailInput, EmailView, FusionEngine, ModelLabelMap, PredictionResult, RegistrySnapshot,
    StrategyScorer,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ScorerError;
use crate::scorer::{FeaturePipeline, MlScorer};

/// 已加载的模型状态（打分器 + 对应标签映射，整体原子替换）
#[derive(Clone)]
pub struct ModelState {
    pub scorer: Arc<dyn MlScorer>,
    pub label_map: Arc<ModelLabelMap>,
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelState")
            .field("scorer", &self.scorer.name())
            .field("label_map_version", &self.label_map.version())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub generation: u64,
    pub snapshot: Arc<RegistrySnapshot>,
    pub model: Option<ModelState>,
    pub features: Option<FeaturePipeline>,
    pub engine: Arc<FusionEngine>,
}

impl ScoringContext {
    /// 失败结果（兜底分类）
    pub fn failure(&self, error: &ScorerError) -> PredictionResult {
        FusionEngine::failure(&self.snapshot, error.to_string())
    }

    fn fail_all(&self, count: usize, error: &ScorerError) -> Vec<PredictionResult> {
        log::warn!("Scorer failure for {} email(s): {}", count, error);
        (0..count).map(|_| self.failure(error)).collect()
    }

    /// 对一组邮件打分
    /// 模型调用一次覆盖整组；整组调用失败时每封邮件都得到兜底结果，
    /// 单封邮件的输出/特征异常只影响该邮件
    pub fn score_chunk(&self, emails: &[EmailInput]) -> Vec<PredictionResult> {
        if emails.is_empty() {
            return Vec::new();
        }
        let Some(model) = &self.model else {
            return self.fail_all(emails.len(), &ScorerError::NotLoaded);
        };

        let texts: Vec<String> = emails.iter().map(EmailInput::preprocess_text).collect();
        let rows = match model.scorer.score_batch(&texts) {
            Ok(rows) => rows,
            Err(e) => return self.fail_all(emails.len(), &e),
        };
        if rows.len() != emails.len() {
            let error = ScorerError::Malformed(format!(
                "scorer '{}' returned {} rows for {} inputs",
                model.scorer.name(),
                rows.len(),
                emails.len()
            ));
            return self.fail_all(emails.len(), &error);
        }

        emails
            .iter()
            .zip(rows.iter())
            .map(|(email, row)| match self.fuse_one(model, email, row) {
                Ok(result) => result,
                Err(e) => {
                    log::warn!(
                        "Prediction failed for \"{}\": {}",
                        preview_compact(&email.subject, 60),
                        e
                    );
                    self.failure(&e)
                }
            })
            .collect()
    }

    fn fuse_one(
        &self,
        model: &ModelState,
        email: &EmailInput,
        row: &[f64],
    ) -> Result<PredictionResult, ScorerError> {
        let ml_scores = model
            .label_map
            .remap(row, &self.snapshot)
            .map_err(|e| ScorerError::Malformed(e.to_string()))?;

        let feature_scores: Option<BTreeMap<String, f64>> = match &self.features {
            Some(pipeline) => Some(pipeline.score(email)?),
            None => None,
        };

        let view = EmailView::from_email(email);
        let candidates = StrategyScorer::score_categories(&self.snapshot, &view);
        let outcome =
            self.engine
                .fuse(&self.snapshot, &ml_scores, feature_scores.as_ref(), &candidates);

        log::debug!(
            "[Predict] \"{}\" -> {} ({:.4}, {:?})",
            preview_compact(&email.subject, 60),
            outcome.label,
            outcome.confidence,
            outcome.source
        );
        Ok(outcome.into_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailfusion_engine::Category;

    struct FixedScorer {
        rows: Vec<Vec<f64>>,
    }

    impl MlScorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }
        fn id2label(&self) -> Option<BTreeMap<usize, String>> {
            Some(
                [(0, "Spam"), (1, "Other")]
                    .into_iter()
                    .map(|(i, l)| (i, l.to_string()))
                    .collect(),
            )
        }
        fn score_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ScorerError> {
            Ok(self.rows.iter().take(texts.len()).cloned().collect())
        }
    }

    fn context(rows: Vec<Vec<f64>>) -> ScoringContext {
        let snapshot = RegistrySnapshot::new(
            1,
            vec![Category::new(0, "Spam"), Category::new(1, "Other").as_default()],
            "Other",
        )
        .unwrap()
        .into_shared();
        let scorer: Arc<dyn MlScorer> = Arc::new(FixedScorer { rows });
        let label_map = Arc::new(ModelLabelMap::build(scorer.id2label().as_ref(), &snapshot, 1));
        ScoringContext {
            generation: 0,
            snapshot,
            model: Some(ModelState { scorer, label_map }),
            features: None,
            engine: Arc::new(FusionEngine::default()),
        }
    }

    #[test]
    fn test_row_count_mismatch_fails_chunk() {
        let ctx = context(vec![vec![0.9, 0.1]]);
        let emails = vec![EmailInput::new("a", "b"), EmailInput::new("c", "d")];
        let results = ctx.score_chunk(&emails);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_failure() && r.label == "Other"));
    }

    #[test]
    fn test_nan_row_fails_single_item() {
        let ctx = context(vec![vec![0.9, 0.1], vec![f64::NAN, 0.1]]);
        let emails = vec![EmailInput::new("a", "b"), EmailInput::new("c", "d")];
        let results = ctx.score_chunk(&emails);
        assert_eq!(results[0].label, "Spam");
        assert!(!results[0].is_failure());
        assert!(results[1].is_failure());
        assert!(results[1].scores.is_empty());
    }

    #[test]
    fn test_no_model_is_failure() {
        let mut ctx = context(vec![]);
        ctx.model = None;
        let results = ctx.score_chunk(&[EmailInput::new("a", "b")]);
        assert_eq!(results[0].error.as_deref(), Some("No scorer loaded"));
        assert_eq!(results[0].confidence, 0.0);
    }
}
