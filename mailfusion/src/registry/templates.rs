//! 分类模板目录
//! 模板即预填好的 CategoryDraft，通过 add_from_template 实例化为分类

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::draft::CategoryDraft;
use crate::error::{MfResult, RegistryError};

static BUILTIN_TEMPLATES_JSON: &str = include_str!("../../data/category_templates.json");

/// 内置模板（首次访问时解析）
static BUILTIN_CATALOG: Lazy<TemplateCatalog> = Lazy::new(|| {
    TemplateCatalog::from_json_str(BUILTIN_TEMPLATES_JSON).unwrap_or_else(|e| {
        log::error!("Built-in category templates are invalid: {}", e);
        TemplateCatalog::default()
    })
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateCatalog {
    #[serde(default)]
    pub templates: BTreeMap<String, CategoryDraft>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl TemplateCatalog {
    pub fn builtin() -> &'static TemplateCatalog {
        &BUILTIN_CATALOG
    }

    pub fn from_json_str(json: &str) -> MfResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> MfResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        let catalog: Self = serde_json::from_slice(&data)?;
        log::debug!(
            "Loaded {} category templates from {}",
            catalog.templates.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Result<&CategoryDraft, RegistryError> {
        self.templates
            .get(key)
            .ok_or_else(|| RegistryError::TemplateNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = TemplateCatalog::builtin();
        let invoices = catalog.get("invoices").unwrap();
        assert_eq!(invoices.name, "Invoices");
        let strategy = invoices.classification_strategy.as_ref().unwrap();
        assert!(strategy.has_rules());
        assert_eq!(strategy.confidence_threshold, 0.7);
        assert!(catalog.keys().any(|k| k == "security_alerts"));
    }

    #[test]
    fn test_unknown_template() {
        let catalog = TemplateCatalog::from_json_str(r#"{"templates": {}}"#).unwrap();
        assert_eq!(
            catalog.get("missing").unwrap_err(),
            RegistryError::TemplateNotFound("missing".into())
        );
    }

    #[test]
    fn test_malformed_group_dropped() {
        let json = r#"{"templates": {"x": {
            "name": "X",
            "classification_strategy": {
                "headerAnalysis": {"senderDomains": 42},
                "bodyAnalysis": {"keywords": ["x"]}
            }
        }}}"#;
        let catalog = TemplateCatalog::from_json_str(json).unwrap();
        let strategy = catalog.get("x").unwrap().classification_strategy.clone().unwrap();
        assert!(strategy.header_analysis.is_none());
        assert!(strategy.body_analysis.is_some());
    }
}
