//! 融合引擎核心
//! 核心职责：
//! 1. 产出基线分布：单模型（argmax P_ml）或双打分器加权集成
//! 2. 在基线之上执行策略覆盖（0.3×P + 0.7×strategy_confidence）
//! 3. 统一置信度上限与精度，保证分数表覆盖全部已注册分类

use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

use super::config::FusionConfig;
use crate::core::{Category, PredictionResult, RegistrySnapshot};
use crate::error::CoreResult;
use crate::scorer::StrategyCandidate;

/// 决策来源（调试与统计用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// 单模型argmax
    MlBaseline,
    /// 双打分器加权融合
    Ensemble,
    /// 双打分器融合，单侧高置信加权
    EnsembleDominant,
    /// 融合置信度过低，回退到单打分器
    EnsembleFallback,
    /// 策略覆盖
    StrategyOverride,
}

/// 融合结果
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    pub label: String,
    pub category_id: u32,
    pub confidence: f64,
    pub scores: BTreeMap<String, f64>,
    pub source: DecisionSource,
}

impl FusionOutcome {
    pub fn into_result(self) -> PredictionResult {
        PredictionResult {
            label: self.label,
            confidence: self.confidence,
            scores: self.scores,
            category_id: self.category_id,
            error: None,
        }
    }
}

/// 保留4位小数
#[inline]
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// 将任意概率表补全为"恰好覆盖已注册分类"的分数表
/// 未注册的名称被忽略，缺省分类补0.0
pub(crate) fn complete_scores(
    snapshot: &RegistrySnapshot,
    probabilities: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let scores: BTreeMap<String, f64> = snapshot
        .names()
        .map(|name| {
            let p = probabilities
                .get(name)
                .copied()
                .filter(|p| p.is_finite())
                .map_or(0.0, |p| p.clamp(0.0, 1.0));
            (name.to_string(), p)
        })
        .collect();

    let ignored = probabilities.keys().filter(|k| !scores.contains_key(*k)).count();
    if ignored > 0 {
        debug!("Ignored {} scorer labels not present in registry", ignored);
    }
    scores
}

/// 按id升序取最大值，同分保留先出现者；全为0时返回兜底分类
pub(crate) fn argmax<'a>(
    snapshot: &'a RegistrySnapshot,
    scores: &BTreeMap<String, f64>,
) -> (&'a Category, f64) {
    let mut best: Option<(&Category, f64)> = None;
    for category in snapshot.categories() {
        let value = scores.get(&category.name).copied().unwrap_or(0.0);
        if best.map_or(true, |(_, b)| value > b) {
            best = Some((category, value));
        }
    }
    match best {
        Some((category, value)) if value > 0.0 => (category, value),
        _ => (snapshot.fallback(), 0.0),
    }
}

/// 融合引擎
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }
}

impl FusionEngine {
    /// 创建融合引擎（集成权重自动归一化）
    pub fn new(config: FusionConfig) -> CoreResult<Self> {
        Ok(Self {
            config: config.normalized()?,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// 完整融合流程
    /// 参数：
    /// - snapshot: 分类快照
    /// - ml_scores: 经标签映射后的模型概率表
    /// - feature_scores: 特征打分器概率表（存在时走双打分器集成）
    /// - candidates: 策略候选（id升序）
    pub fn fuse(
        &self,
        snapshot: &RegistrySnapshot,
        ml_scores: &BTreeMap<String, f64>,
        feature_scores: Option<&BTreeMap<String, f64>>,
        candidates: &[StrategyCandidate],
    ) -> FusionOutcome {
        let mut outcome = match feature_scores {
            Some(feature_scores) => self.ensemble(snapshot, ml_scores, feature_scores),
            None => self.baseline(snapshot, ml_scores),
        };
        self.apply_strategy_override(snapshot, &mut outcome, candidates);
        outcome.confidence = self.finalize_confidence(outcome.confidence);
        outcome
    }

    /// 单模型基线：argmax(P_ml)
    pub fn baseline(
        &self,
        snapshot: &RegistrySnapshot,
        ml_scores: &BTreeMap<String, f64>,
    ) -> FusionOutcome {
        let scores = complete_scores(snapshot, ml_scores);
        let (category, confidence) = argmax(snapshot, &scores);
        FusionOutcome {
            label: category.name.clone(),
            category_id: category.id,
            confidence,
            scores,
            source: DecisionSource::MlBaseline,
        }
    }

    /// 策略覆盖
    /// 门限通过的候选中取 combined 最大者（同分保留先出现者），
    /// combined 超过当前置信度时改判，置信度封顶 max_confidence
    pub fn apply_strategy_override(
        &self,
        snapshot: &RegistrySnapshot,
        outcome: &mut FusionOutcome,
        candidates: &[StrategyCandidate],
    ) {
        let cfg = &self.config;
        let mut best: Option<(&StrategyCandidate, f64)> = None;

        for candidate in candidates {
            if candidate.confidence < cfg.strategy_gate_ratio * candidate.threshold {
                continue;
            }
            let p = outcome.scores.get(&candidate.name).copied().unwrap_or(0.0);
            let combined = cfg.strategy_ml_weight * p + cfg.strategy_weight * candidate.confidence;
            if best.map_or(true, |(_, b)| combined > b) {
                best = Some((candidate, combined));
            }
        }

        let Some((candidate, combined)) = best else {
            return;
        };
        if combined <= outcome.confidence {
            return;
        }
        let Some(category) = snapshot.get(&candidate.name) else {
            return;
        };

        debug!(
            "[Fusion] strategy override {} -> {} | combined={:.4} previous={:.4}",
            outcome.label, category.name, combined, outcome.confidence
        );
        outcome.label = category.name.clone();
        outcome.category_id = category.id;
        outcome.confidence = combined.min(cfg.max_confidence);
        outcome.source = DecisionSource::StrategyOverride;
    }

    /// 置信度收口：[0, max_confidence] + 4位小数
    pub fn finalize_confidence(&self, confidence: f64) -> f64 {
        if !confidence.is_finite() {
            return 0.0;
        }
        round4(confidence.clamp(0.0, self.config.max_confidence))
    }

    /// 打分器失败时的兜底结果
    pub fn failure(snapshot: &RegistrySnapshot, error: impl Into<String>) -> PredictionResult {
        PredictionResult::failure(snapshot.fallback_name(), snapshot.fallback_id(), error)
    }
}
