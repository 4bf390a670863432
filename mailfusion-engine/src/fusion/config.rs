//! 融合策略参数

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// 融合参数（全部带默认值，可从配置文件局部覆盖）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// 最终置信度上限
    pub max_confidence: f64,

    // ---------- 策略覆盖（Mode A） ----------
    /// 策略覆盖时模型概率权重
    pub strategy_ml_weight: f64,
    /// 策略覆盖时策略置信度权重
    pub strategy_weight: f64,
    /// 参与覆盖的门限比例：strategy_confidence ≥ ratio × confidenceThreshold
    pub strategy_gate_ratio: f64,

    // ---------- 双打分器集成（Mode B） ----------
    pub ml_weight: f64,
    pub feature_weight: f64,
    /// 单个打分器"高置信"判定线
    pub dominant_high: f64,
    /// 另一打分器"低置信"判定线
    pub dominant_low: f64,
    /// 高置信打分器在加权置信度中的占比
    pub dominant_share: f64,
    /// 低于该值时放弃融合结果，改用单打分器结果
    pub low_confidence_floor: f64,
    /// 单打分器回退时的置信度折扣
    pub fallback_scale: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            max_confidence: 0.95,
            strategy_ml_weight: 0.3,
            strategy_weight: 0.7,
            strategy_gate_ratio: 0.8,
            ml_weight: 0.6,
            feature_weight: 0.4,
            dominant_high: 0.8,
            dominant_low: 0.6,
            dominant_share: 0.8,
            low_confidence_floor: 0.3,
            fallback_scale: 0.7,
        }
    }
}

impl FusionConfig {
    /// 归一化集成权重（w_ml + w_feat = 1）
    pub fn normalized(mut self) -> CoreResult<Self> {
        let (ml, feature) = (self.ml_weight, self.feature_weight);
        let total = ml + feature;
        if !ml.is_finite() || !feature.is_finite() || ml < 0.0 || feature < 0.0 || total <= 0.0 {
            return Err(CoreError::InvalidWeights { ml, feature });
        }
        self.ml_weight = ml / total;
        self.feature_weight = feature / total;
        Ok(self)
    }

    pub fn with_weights(mut self, ml_weight: f64, feature_weight: f64) -> Self {
        self.ml_weight = ml_weight;
        self.feature_weight = feature_weight;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_weights() {
        let cfg = FusionConfig::default().with_weights(3.0, 1.0).normalized().unwrap();
        assert!((cfg.ml_weight - 0.75).abs() < 1e-12);
        assert!((cfg.feature_weight - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_weights() {
        assert!(FusionConfig::default().with_weights(0.0, 0.0).normalized().is_err());
        assert!(FusionConfig::default().with_weights(-1.0, 2.0).normalized().is_err());
    }

    #[test]
    fn test_partial_deserialize() {
        let cfg: FusionConfig = serde_json::from_str(r#"{"ml_weight": 0.5}"#).unwrap();
        assert_eq!(cfg.ml_weight, 0.5);
        assert_eq!(cfg.feature_weight, 0.4);
        assert_eq!(cfg.max_confidence, 0.95);
    }
}
