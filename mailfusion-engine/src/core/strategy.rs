//! 分类策略模型
//! 每个分类可挂载一份规则策略，由四个互相独立的规则组构成：
//! headerAnalysis / bodyAnalysis / metadataAnalysis / tagsAnalysis
//! 任一规则组格式非法时只丢弃该组（记录warn），不影响分类本身加载

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// 策略置信度门限默认值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

/// 宽松反序列化：结构错误时降级为None
/// 用于四个规则组，以及分类上挂载的整份策略
pub(crate) fn lenient_group<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value::<T>(value) {
        Ok(group) => Ok(Some(group)),
        Err(e) => {
            log::warn!(
                "Malformed strategy section skipped: type={} error={}",
                std::any::type_name::<T>(),
                e
            );
            Ok(None)
        }
    }
}

/// 宽松反序列化：门限非数字时回退默认值
fn lenient_threshold<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_f64()
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD))
}

/// 分类策略（四个规则组 + 融合门限）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStrategy {
    #[serde(default, deserialize_with = "lenient_group", skip_serializing_if = "Option::is_none")]
    pub header_analysis: Option<HeaderAnalysis>,
    #[serde(default, deserialize_with = "lenient_group", skip_serializing_if = "Option::is_none")]
    pub body_analysis: Option<BodyAnalysis>,
    #[serde(default, deserialize_with = "lenient_group", skip_serializing_if = "Option::is_none")]
    pub metadata_analysis: Option<MetadataAnalysis>,
    #[serde(default, deserialize_with = "lenient_group", skip_serializing_if = "Option::is_none")]
    pub tags_analysis: Option<TagsAnalysis>,
    /// 策略覆盖门限：strategy_confidence ≥ gate_ratio × confidence_threshold 才参与融合
    #[serde(default = "default_confidence_threshold", deserialize_with = "lenient_threshold")]
    pub confidence_threshold: f64,
}

impl Default for ClassificationStrategy {
    fn default() -> Self {
        Self {
            header_analysis: None,
            body_analysis: None,
            metadata_analysis: None,
            tags_analysis: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ClassificationStrategy {
    /// 从JSON值解析策略（宽松模式）
    pub fn from_json(value: serde_json::Value) -> crate::CoreResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| crate::CoreError::StrategyParseError(e.to_string()))
    }

    /// 是否配置了任意规则组
    pub fn has_rules(&self) -> bool {
        self.header_analysis.as_ref().is_some_and(|g| !g.is_empty())
            || self.body_analysis.as_ref().is_some_and(|g| !g.is_empty())
            || self.metadata_analysis.as_ref().is_some_and(|g| !g.is_empty())
            || self.tags_analysis.as_ref().is_some_and(|g| !g.is_empty())
    }

    pub fn with_header(mut self, group: HeaderAnalysis) -> Self {
        self.header_analysis = Some(group);
        self
    }

    pub fn with_body(mut self, group: BodyAnalysis) -> Self {
        self.body_analysis = Some(group);
        self
    }

    pub fn with_metadata(mut self, group: MetadataAnalysis) -> Self {
        self.metadata_analysis = Some(group);
        self
    }

    pub fn with_tags(mut self, group: TagsAnalysis) -> Self {
        self.tags_analysis = Some(group);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

/// 邮件头规则组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderAnalysis {
    #[serde(default)]
    pub sender_domains: Vec<String>,
    /// 发件人正则（大小写不敏感）
    #[serde(default)]
    pub sender_patterns: Vec<String>,
    /// 主题子串（仅匹配主题）
    #[serde(default)]
    pub subject_patterns: Vec<String>,
}

impl HeaderAnalysis {
    pub fn is_empty(&self) -> bool {
        self.sender_domains.is_empty()
            && self.sender_patterns.is_empty()
            && self.subject_patterns.is_empty()
    }
}

/// 正文规则组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyAnalysis {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
    /// 词项 → 权重
    #[serde(default)]
    pub tfidf_scores: BTreeMap<String, f64>,
}

impl BodyAnalysis {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.phrases.is_empty() && self.tfidf_scores.is_empty()
    }
}

/// 长度区间（闭区间，任一端可缺省）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LengthPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

impl LengthPattern {
    pub fn contains(&self, len: usize) -> bool {
        self.min.map_or(true, |min| len >= min) && self.max.map_or(true, |max| len <= max)
    }
}

/// 元数据规则组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_patterns: Option<LengthPattern>,
    #[serde(default)]
    pub time_patterns: Vec<String>,
    #[serde(default)]
    pub attachment_patterns: Vec<String>,
}

impl MetadataAnalysis {
    pub fn is_empty(&self) -> bool {
        self.length_patterns.is_none()
            && self.time_patterns.is_empty()
            && self.attachment_patterns.is_empty()
    }
}

/// 实体规则（邮箱/URL/关键词）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPatterns {
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl EntityPatterns {
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.urls.is_empty() && self.keywords.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagThresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_match: Option<f64>,
}

/// 标签规则组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsAnalysis {
    #[serde(default)]
    pub common_tags: Vec<String>,
    #[serde(default)]
    pub label_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_patterns: Option<EntityPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_thresholds: Option<TagThresholds>,
}

impl TagsAnalysis {
    pub fn is_empty(&self) -> bool {
        self.common_tags.is_empty()
            && self.label_patterns.is_empty()
            && self.entity_patterns.as_ref().map_or(true, EntityPatterns::is_empty)
    }

    pub fn tag_match_threshold(&self) -> Option<f64> {
        self.confidence_thresholds.and_then(|t| t.tag_match)
    }
}
