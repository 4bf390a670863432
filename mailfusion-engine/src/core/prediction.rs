//! 预测结果结构与工具函数

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 预测结果（写入缓存后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f64,
    /// 键集合 = 当前已注册的全部分类名（失败结果为空）
    pub scores: BTreeMap<String, f64>,
    pub category_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    /// 失败结果：兜底分类 + 零置信度 + 空分数
    pub fn failure(fallback_name: &str, fallback_id: u32, error: impl Into<String>) -> Self {
        Self {
            label: fallback_name.to_string(),
            confidence: 0.0,
            scores: BTreeMap::new(),
            category_id: fallback_id,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// 分数键集合是否恰好覆盖给定分类名
    pub fn scores_complete<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut expected = 0usize;
        for name in names {
            if !self.scores.contains_key(name) {
                return false;
            }
            expected += 1;
        }
        expected == self.scores.len()
    }
}

impl std::fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            Some(err) => write!(f, "{} (id={}, error: {})", self.label, self.category_id, err),
            None => write!(
                f,
                "{} (id={}, confidence={:.4})",
                self.label, self.category_id, self.confidence
            ),
        }
    }
}
