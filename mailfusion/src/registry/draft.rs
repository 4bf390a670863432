//! 新建分类参数（也是分类模板的结构）

use mailfusion_engine::core::DEFAULT_COLOR;
use mailfusion_engine::ClassificationStrategy;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 展示颜色格式：#RRGGBB
static COLOR_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").ok());

/// 规范化颜色值，非法时回退默认色
pub(crate) fn normalize_color(color: &str) -> String {
    let color = color.trim();
    let valid = COLOR_RE.as_ref().is_some_and(|re| re.is_match(color));
    if valid {
        color.to_ascii_uppercase()
    } else {
        if !color.is_empty() {
            log::warn!("Invalid category color {:?}, using {}", color, DEFAULT_COLOR);
        }
        DEFAULT_COLOR.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryDraft {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification_strategy: Option<ClassificationStrategy>,
}

impl CategoryDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: DEFAULT_COLOR.to_string(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn strategy(mut self, strategy: ClassificationStrategy) -> Self {
        self.classification_strategy = Some(strategy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_color() {
        assert_eq!(normalize_color(" #3b82f6 "), "#3B82F6");
        assert_eq!(normalize_color("blue"), DEFAULT_COLOR);
        assert_eq!(normalize_color(""), DEFAULT_COLOR);
    }

    #[test]
    fn test_draft_builder() {
        let draft = CategoryDraft::new("Invoices")
            .description("Bills")
            .keywords(["invoice", "payment"])
            .color("#112233");
        assert_eq!(draft.keywords.len(), 2);
        assert!(draft.classification_strategy.is_none());
    }
}
