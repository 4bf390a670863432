//! 双打分器集成（模型 + 特征打分器）
//! 核心逻辑：
//! 1. combined = w_ml × P_ml + w_feat × P_feat，取argmax
//! 2. 单侧高置信（>0.8）且另一侧低置信（<0.6）时，置信度向高置信一侧倾斜
//! 3. 融合置信度过低（<0.3）时放弃融合，改用原始置信度更高的打分器结果并打折

use log::debug;
use std::collections::BTreeMap;

use super::engine::{argmax, complete_scores, DecisionSource, FusionEngine, FusionOutcome};
use crate::core::{Category, RegistrySnapshot};

/// 单个打分器的最高分（仅统计已注册分类）
fn top<'a>(snapshot: &'a RegistrySnapshot, scores: &BTreeMap<String, f64>) -> Option<(&'a Category, f64)> {
    let (category, value) = argmax(snapshot, scores);
    (value > 0.0).then_some((category, value))
}

impl FusionEngine {
    /// 集成融合，输出分数表为加权后的 combined 分布
    pub fn ensemble(
        &self,
        snapshot: &RegistrySnapshot,
        ml_scores: &BTreeMap<String, f64>,
        feature_scores: &BTreeMap<String, f64>,
    ) -> FusionOutcome {
        let cfg = self.config();
        let ml = complete_scores(snapshot, ml_scores);
        let feature = complete_scores(snapshot, feature_scores);

        let ml_top = top(snapshot, &ml);
        let feature_top = top(snapshot, &feature);
        let conf_ml = ml_top.map_or(0.0, |(_, v)| v);
        let conf_feat = feature_top.map_or(0.0, |(_, v)| v);

        let combined: BTreeMap<String, f64> = ml
            .iter()
            .map(|(name, p)| {
                let q = feature.get(name).copied().unwrap_or(0.0);
                (name.clone(), cfg.ml_weight * p + cfg.feature_weight * q)
            })
            .collect();
        let (best, best_score) = argmax(snapshot, &combined);

        let (mut confidence, mut source) = (best_score, DecisionSource::Ensemble);
        if conf_ml > cfg.dominant_high && conf_feat < cfg.dominant_low {
            confidence = (cfg.dominant_share * conf_ml + (1.0 - cfg.dominant_share) * best_score)
                .min(cfg.max_confidence);
            source = DecisionSource::EnsembleDominant;
        } else if conf_feat > cfg.dominant_high && conf_ml < cfg.dominant_low {
            confidence = (cfg.dominant_share * conf_feat + (1.0 - cfg.dominant_share) * best_score)
                .min(cfg.max_confidence);
            source = DecisionSource::EnsembleDominant;
        }

        let (mut label, mut category_id) = (best.name.clone(), best.id);
        if confidence < cfg.low_confidence_floor {
            // 同分时模型优先
            let (chosen, raw) = if conf_ml >= conf_feat {
                (ml_top, conf_ml)
            } else {
                (feature_top, conf_feat)
            };
            let category = chosen.map_or_else(|| snapshot.fallback(), |(c, _)| c);
            debug!(
                "[Fusion] ensemble confidence {:.4} below floor, falling back to {} (raw={:.4})",
                confidence, category.name, raw
            );
            label = category.name.clone();
            category_id = category.id;
            confidence = raw * cfg.fallback_scale;
            source = DecisionSource::EnsembleFallback;
        }

        FusionOutcome {
            label,
            category_id,
            confidence,
            scores: combined,
            source,
        }
    }
}
