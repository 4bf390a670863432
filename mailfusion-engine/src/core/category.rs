//! 通用分类模型
//! name 为对外主键，id 为模型侧主键

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::{lenient_group, ClassificationStrategy};

/// 兜底分类名称
pub const FALLBACK_CATEGORY: &str = "Other";
/// 默认展示颜色
pub const DEFAULT_COLOR: &str = "#6B7280";

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

/// 分类定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// 持久化文档中以name为键，反序列化时允许缺省，由注册表回填
    #[serde(default)]
    pub name: String,
    pub id: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_color")]
    pub color: String,
    /// 策略格式非法时分类照常加载，仅丢弃策略
    #[serde(default, deserialize_with = "lenient_group", skip_serializing_if = "Option::is_none")]
    pub classification_strategy: Option<ClassificationStrategy>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            description: String::new(),
            keywords: Vec::new(),
            color: default_color(),
            classification_strategy: None,
            is_default: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_strategy(mut self, strategy: Option<ClassificationStrategy>) -> Self {
        self.classification_strategy = strategy;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// 策略存在且配置了至少一个规则组
    pub fn has_strategy(&self) -> bool {
        self.classification_strategy
            .as_ref()
            .is_some_and(ClassificationStrategy::has_rules)
    }
}

/// 分类局部更新
/// classification_strategy: None=不修改，Some(None)=清除，Some(Some(s))=替换
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryPatch {
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub color: Option<String>,
    pub classification_strategy: Option<Option<ClassificationStrategy>>,
}

impl CategoryPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn strategy(mut self, strategy: ClassificationStrategy) -> Self {
        self.classification_strategy = Some(Some(strategy));
        self
    }

    pub fn clear_strategy(mut self) -> Self {
        self.classification_strategy = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.keywords.is_none()
            && self.color.is_none()
            && self.classification_strategy.is_none()
    }

    /// 应用到分类上，并刷新updated_at
    pub fn apply(self, category: &mut Category, now: DateTime<Utc>) {
        if let Some(description) = self.description {
            category.description = description;
        }
        if let Some(keywords) = self.keywords {
            category.keywords = keywords;
        }
        if let Some(color) = self.color {
            category.color = color;
        }
        if let Some(strategy) = self.classification_strategy {
            category.classification_strategy = strategy;
        }
        category.updated_at = Some(now);
    }
}

/// 获取内置种子分类（全部标记为默认分类，不可删除）
pub fn get_default_categories() -> Vec<Category> {
    let default_cats: [(&str, &str, &[&str], &str); 5] = [
        (
            "Academic",
            "Academic and educational content",
            &["lecture", "course", "assignment", "research", "university"],
            "#3B82F6",
        ),
        (
            "Promotions",
            "Promotional and marketing content",
            &["sale", "offer", "discount", "promotion", "deal"],
            "#10B981",
        ),
        (
            "Placement",
            "Job and career opportunities",
            &["job", "career", "hiring", "interview", "position"],
            "#F59E0B",
        ),
        (
            "Spam",
            "Spam and unwanted content",
            &["spam", "unwanted", "junk", "scam", "phishing"],
            "#EF4444",
        ),
        (
            FALLBACK_CATEGORY,
            "Miscellaneous content",
            &["other", "misc", "general"],
            DEFAULT_COLOR,
        ),
    ];

    default_cats
        .iter()
        .enumerate()
        .map(|(id, (name, description, keywords, color))| {
            Category::new(id as u32, *name)
                .with_description(*description)
                .with_keywords(keywords.iter().copied())
                .with_color(*color)
                .as_default()
        })
        .collect()
}

/// 单个兜底分类（持久化文件损坏时使用）
pub fn fallback_category(name: &str, id: u32) -> Category {
    Category::new(id, name)
        .with_description("Miscellaneous content")
        .with_keywords(["other", "misc", "general"])
        .as_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::strategy::BodyAnalysis;

    #[test]
    fn test_default_categories() {
        let cats = get_default_categories();
        assert_eq!(cats.len(), 5);
        assert!(cats.iter().all(|c| c.is_default));
        let ids: Vec<u32> = cats.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(cats[4].name, FALLBACK_CATEGORY);
    }

    #[test]
    fn test_patch_apply() {
        let mut cat = Category::new(7, "Invoices").with_color("#000000");
        let now = Utc::now();
        CategoryPatch::new()
            .description("billing")
            .strategy(ClassificationStrategy::default().with_body(BodyAnalysis {
                keywords: vec!["invoice".into()],
                ..Default::default()
            }))
            .apply(&mut cat, now);
        assert_eq!(cat.description, "billing");
        assert_eq!(cat.color, "#000000");
        assert!(cat.has_strategy());
        assert_eq!(cat.updated_at, Some(now));

        CategoryPatch::new().clear_strategy().apply(&mut cat, now);
        assert!(cat.classification_strategy.is_none());
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let cat: Category = serde_json::from_str(r#"{"id": 3, "description": "x"}"#).unwrap();
        assert_eq!(cat.id, 3);
        assert_eq!(cat.color, DEFAULT_COLOR);
        assert!(!cat.is_default);
        assert!(cat.name.is_empty());
    }

    #[test]
    fn test_malformed_strategy_keeps_category() {
        for bad in [r#""bogus""#, "[1, 2]", "42"] {
            let json = format!(
                r#"{{"id": 2, "keywords": ["trip"], "classification_strategy": {}}}"#,
                bad
            );
            let cat: Category = serde_json::from_str(&json).unwrap();
            assert_eq!(cat.id, 2);
            assert_eq!(cat.keywords, vec!["trip".to_string()]);
            assert!(cat.classification_strategy.is_none());
        }
        let cat: Category =
            serde_json::from_str(r#"{"id": 2, "classification_strategy": null}"#).unwrap();
        assert!(!cat.has_strategy());
    }
}
