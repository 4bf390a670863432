//! 注册表持久化文档
//! 格式：{categories: {name: Category}, metadata: {...}, last_updated}
//! 每次变更整体重写，不做追加
//! 加载按条目宽松解析：单个分类格式非法时跳过该条并告警，其余分类照常加载

use chrono::{DateTime, Utc};
use mailfusion_engine::{Category, FALLBACK_CATEGORY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryMetadata {
    #[serde(default)]
    pub version: u64,
    /// 下一个可分配id（高水位，删除后不回退）；旧文档缺省时由最大id推导
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<u32>,
    #[serde(default = "default_fallback")]
    pub fallback_category: String,
    #[serde(default)]
    pub total_categories: usize,
}

fn default_fallback() -> String {
    FALLBACK_CATEGORY.to_string()
}

impl Default for RegistryMetadata {
    fn default() -> Self {
        Self {
            version: 0,
            next_id: None,
            fallback_category: default_fallback(),
            total_categories: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRegistryDocument")]
pub struct RegistryDocument {
    pub categories: BTreeMap<String, Category>,
    #[serde(default)]
    pub metadata: RegistryMetadata,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

/// 落盘格式的原样读取，分类体保留为JSON值逐条解析
#[derive(Deserialize)]
struct RawRegistryDocument {
    #[serde(default)]
    categories: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    metadata: RegistryMetadata,
    #[serde(default = "Utc::now")]
    last_updated: DateTime<Utc>,
}

impl From<RawRegistryDocument> for RegistryDocument {
    fn from(raw: RawRegistryDocument) -> Self {
        let mut metadata = raw.metadata;
        let mut categories = BTreeMap::new();
        for (name, value) in raw.categories {
            // 跳过的条目若带数字id，仍占用高水位，避免其id被新分类复用
            let raw_id = value
                .get("id")
                .and_then(serde_json::Value::as_u64)
                .and_then(|id| u32::try_from(id).ok());
            match serde_json::from_value::<Category>(value) {
                Ok(category) => {
                    categories.insert(name, category);
                }
                Err(e) => {
                    log::warn!("Malformed category '{}' skipped: {}", name, e);
                    if let Some(id) = raw_id {
                        let reserved = id.saturating_add(1);
                        metadata.next_id =
                            Some(metadata.next_id.map_or(reserved, |next| next.max(reserved)));
                    }
                }
            }
        }
        Self {
            categories,
            metadata,
            last_updated: raw.last_updated,
        }
    }
}

impl RegistryDocument {
    /// 以name为键回填分类名（文档中分类体可省略name字段）
    pub fn into_categories(self) -> Vec<Category> {
        self.categories
            .into_iter()
            .map(|(key, mut category)| {
                category.name = key;
                category
            })
            .collect()
    }
}
