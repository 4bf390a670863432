//! 邮件输入模型
//! subject/body 为必填，其余字段仅供策略打分的元数据/邮件头规则使用

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 主题与正文之间的分隔符
pub const TEXT_SEPARATOR: &str = "[SEP]";
/// 空邮件占位文本
pub const EMPTY_EMAIL_TEXT: &str = "Empty email";

/// 附件描述
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub filename: String,
    #[serde(default, alias = "contentType", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

/// 单封邮件输入
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailInput {
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, alias = "from_addr", skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, alias = "to_addr", skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl EmailInput {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 邮件头查询（名称大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 模型输入文本预处理："{subject} [SEP] {body}"，去首尾空白
    pub fn preprocess_text(&self) -> String {
        let subject = self.subject.trim();
        let body = self.body.trim();
        if subject.is_empty() && body.is_empty() {
            return EMPTY_EMAIL_TEXT.to_string();
        }
        format!("{} {} {}", subject, TEXT_SEPARATOR, body)
            .trim()
            .to_string()
    }

    /// 缓存键：规范化文本 + 已提供的可选元数据字段
    /// 每个字段以 "长度:内容" 编码拼接，缺省字段记为 "~"，不同输入得到不同的键
    pub fn cache_key(&self) -> String {
        let mut key = String::new();
        push_field(&mut key, &self.preprocess_text());

        for field in [&self.html, &self.from, &self.to, &self.date] {
            match field {
                Some(value) => push_field(&mut key, value),
                None => key.push('~'),
            }
        }
        key.push_str(&format!("a{}", self.attachments.len()));
        for attachment in &self.attachments {
            push_field(&mut key, &attachment.filename);
            match &attachment.content_type {
                Some(content_type) => push_field(&mut key, content_type),
                None => key.push('~'),
            }
            key.push_str(&format!("{};", attachment.size));
        }
        // BTreeMap 迭代有序
        key.push_str(&format!("h{}", self.headers.len()));
        for (name, value) in &self.headers {
            push_field(&mut key, &name.to_ascii_lowercase());
            push_field(&mut key, value);
        }
        key
    }
}

#[inline]
fn push_field(key: &mut String, value: &str) {
    key.push_str(&value.len().to_string());
    key.push(':');
    key.push_str(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_text() {
        let email = EmailInput::new("  Hello ", " world  ");
        assert_eq!(email.preprocess_text(), "Hello [SEP] world");
        assert_eq!(EmailInput::new("", "  ").preprocess_text(), EMPTY_EMAIL_TEXT);
        assert_eq!(EmailInput::new("Only subject", "").preprocess_text(), "Only subject [SEP]");
    }

    #[test]
    fn test_cache_key_normalization() {
        let a = EmailInput::new("Invoice", "Please pay");
        let b = EmailInput::new("  Invoice", "Please pay  ");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), EmailInput::new("Invoice", "Please pay now").cache_key());
    }

    #[test]
    fn test_cache_key_includes_metadata() {
        let a = EmailInput::new("Invoice", "Please pay");
        let b = a.clone().with_from("billing@vendor.com");
        let c = a.clone().with_header("X-Priority", "1");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn test_cache_key_field_boundaries() {
        // 字段拼接边界不同的输入不能得到相同的键
        let a = EmailInput::new("s", "b").with_from("x").with_to("y");
        let b = EmailInput::new("s", "b").with_from("x~").with_date("y");
        let c = EmailInput::new("s", "b").with_from("1:x");
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
        assert!(a.cache_key().starts_with("9:s [SEP] b1:x1:y~"));

        let one = EmailInput::new("s", "b").with_attachment(Attachment::new("a.pdf").with_size(12));
        let other = EmailInput::new("s", "b").with_attachment(Attachment::new("a.pdf").with_size(1));
        assert_ne!(one.cache_key(), other.cache_key());
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let email = EmailInput::new("s", "b").with_header("Reply-To", "a@b.com");
        assert_eq!(email.header("reply-to"), Some("a@b.com"));
        assert_eq!(email.header("from"), None);
    }

    #[test]
    fn test_deserialize_aliases() {
        let email: EmailInput = serde_json::from_str(
            r#"{"subject":"s","body":"b","from_addr":"x@y.com","attachments":[{"filename":"a.pdf","contentType":"application/pdf"}]}"#,
        )
        .unwrap();
        assert_eq!(email.from.as_deref(), Some("x@y.com"));
        assert_eq!(email.attachments[0].content_type.as_deref(), Some("application/pdf"));
    }
}
