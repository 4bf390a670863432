//! 模型标签映射表
//! 将打分模型的输出下标映射为当前分类id
//! 每次加载打分模型/分类变更后整体重建，构建完成后再替换，读方永远看不到半成品

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::RegistrySnapshot;
use crate::error::{CoreError, CoreResult};
use crate::utils::log_format::compress_name_list;

/// 映射模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMapMode {
    /// 基于 id2label 的名称映射
    Explicit,
    /// 降级模式：下标 == 分类id
    Identity,
}

#[derive(Debug, Clone)]
pub struct ModelLabelMap {
    version: u64,
    registry_version: u64,
    mode: LabelMapMode,
    index_to_id: FxHashMap<usize, u32>,
    known_ids: FxHashSet<u32>,
    fallback_id: u32,
    unmatched: Vec<String>,
}

impl ModelLabelMap {
    /// 构建映射表
    /// 参数：
    /// - id2label: 模型下标 → 标签名（None时降级为恒等映射）
    /// - snapshot: 当前分类快照
    /// - version: 映射表版本号（由调用方单调递增）
    pub fn build(
        id2label: Option<&BTreeMap<usize, String>>,
        snapshot: &RegistrySnapshot,
        version: u64,
    ) -> Self {
        let fallback_id = snapshot.fallback_id();
        let known_ids: FxHashSet<u32> = snapshot.categories().iter().map(|c| c.id).collect();

        let Some(id2label) = id2label.filter(|m| !m.is_empty()) else {
            warn!(
                "Scorer provides no id2label mapping, degraded to identity label map (version={})",
                version
            );
            return Self {
                version,
                registry_version: snapshot.version(),
                mode: LabelMapMode::Identity,
                index_to_id: FxHashMap::default(),
                known_ids,
                fallback_id,
                unmatched: Vec::new(),
            };
        };

        let mut index_to_id = FxHashMap::default();
        let mut unmatched = Vec::new();
        for (&index, label) in id2label {
            match snapshot.find_loose(label) {
                Some(category) => {
                    index_to_id.insert(index, category.id);
                }
                None => {
                    index_to_id.insert(index, fallback_id);
                    unmatched.push(label.clone());
                }
            }
        }

        if !unmatched.is_empty() {
            warn!(
                "Model labels without matching category mapped to fallback id {}: {}",
                fallback_id,
                compress_name_list(&unmatched)
            );
        }
        debug!(
            "Label map built | version={} registry_version={} labels={} unmatched={}",
            version,
            snapshot.version(),
            index_to_id.len(),
            unmatched.len()
        );

        Self {
            version,
            registry_version: snapshot.version(),
            mode: LabelMapMode::Explicit,
            index_to_id,
            known_ids,
            fallback_id,
            unmatched,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn registry_version(&self) -> u64 {
        self.registry_version
    }

    pub fn mode(&self) -> LabelMapMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.index_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_id.is_empty()
    }

    /// 未匹配到分类的模型标签
    pub fn unmatched_labels(&self) -> &[String] {
        &self.unmatched
    }

    /// 下标 → 分类id（未知下标落到兜底分类）
    pub fn resolve(&self, index: usize) -> u32 {
        match self.mode {
            LabelMapMode::Explicit => self
                .index_to_id
                .get(&index)
                .copied()
                .unwrap_or(self.fallback_id),
            LabelMapMode::Identity => u32::try_from(index)
                .ok()
                .filter(|id| self.known_ids.contains(id))
                .unwrap_or(self.fallback_id),
        }
    }

    /// 概率向量 → 分类名概率表
    /// 多个下标落到同一分类时取最大值；结果覆盖快照中全部分类名（缺省0.0）
    pub fn remap(
        &self,
        probabilities: &[f64],
        snapshot: &RegistrySnapshot,
    ) -> CoreResult<BTreeMap<String, f64>> {
        if probabilities.is_empty() {
            return Err(CoreError::MalformedScores("empty probability vector".into()));
        }

        let mut scores: BTreeMap<String, f64> =
            snapshot.names().map(|name| (name.to_string(), 0.0)).collect();

        for (index, &p) in probabilities.iter().enumerate() {
            if !p.is_finite() {
                return Err(CoreError::MalformedScores(format!(
                    "non-finite probability at index {}",
                    index
                )));
            }
            let category_id = self.resolve(index);
            // 快照与映射表版本不一致时分类可能已被删除，落到兜底分类
            let name = snapshot
                .get_by_id(category_id)
                .unwrap_or_else(|| snapshot.fallback())
                .name
                .as_str();
            if let Some(slot) = scores.get_mut(name) {
                let p = p.clamp(0.0, 1.0);
                if p > *slot {
                    *slot = p;
                }
            }
        }

        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Category;

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::new(
            7,
            vec![
                Category::new(0, "Academic"),
                Category::new(1, "Promotions"),
                Category::new(4, "Other").as_default(),
                Category::new(9, "Invoices"),
            ],
            "Other",
        )
        .unwrap()
    }

    fn id2label(labels: &[(usize, &str)]) -> BTreeMap<usize, String> {
        labels.iter().map(|(i, l)| (*i, l.to_string())).collect()
    }

    #[test]
    fn test_explicit_mapping() {
        let snap = snapshot();
        let labels = id2label(&[(0, "Promotions"), (1, "academic"), (2, "Legacy")]);
        let map = ModelLabelMap::build(Some(&labels), &snap, 1);
        assert_eq!(map.mode(), LabelMapMode::Explicit);
        assert_eq!(map.resolve(0), 1);
        assert_eq!(map.resolve(1), 0);
        assert_eq!(map.resolve(2), 4);
        assert_eq!(map.resolve(99), 4);
        assert_eq!(map.unmatched_labels(), &["Legacy".to_string()]);
        assert_eq!(map.registry_version(), 7);
    }

    #[test]
    fn test_identity_mapping() {
        let snap = snapshot();
        let map = ModelLabelMap::build(None, &snap, 2);
        assert_eq!(map.mode(), LabelMapMode::Identity);
        assert_eq!(map.resolve(0), 0);
        assert_eq!(map.resolve(9), 9);
        assert_eq!(map.resolve(3), 4);
    }

    #[test]
    fn test_remap_takes_max_on_alias() {
        let snap = snapshot();
        let labels = id2label(&[(0, "Promotions"), (1, "Gone"), (2, "Lost")]);
        let map = ModelLabelMap::build(Some(&labels), &snap, 1);
        let scores = map.remap(&[0.2, 0.3, 0.5], &snap).unwrap();
        assert_eq!(scores.len(), 4);
        assert_eq!(scores["Promotions"], 0.2);
        assert_eq!(scores["Other"], 0.5);
        assert_eq!(scores["Invoices"], 0.0);
    }

    #[test]
    fn test_remap_rejects_malformed() {
        let snap = snapshot();
        let map = ModelLabelMap::build(None, &snap, 1);
        assert!(map.remap(&[], &snap).is_err());
        assert!(map.remap(&[0.1, f64::NAN], &snap).is_err());
    }
}
