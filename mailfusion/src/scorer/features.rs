//! 内置邮件特征提取器
//! 特性：
//! 1. 内容/结构/链接/附件/邮件头五类特征，全部输出为 f64
//! 2. 大数值特征统一归一化：>1000 时按 /1000 缩放并封顶 10.0
//! 3. 纯函数，无IO；正则全局懒编译

use mailfusion_engine::utils::safe_lowercase;
use mailfusion_engine::EmailInput;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use super::traits::{FeatureExtractor, FeatureMap};

static URL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#).ok());
static HREF_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).ok());
static DIGITS_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());

const URGENCY_PATTERNS: [&str; 6] = [
    "urgent",
    "immediately",
    "act now",
    "limited time",
    "expires",
    "asap",
];
const SHORTENER_HOSTS: [&str; 4] = ["bit.ly", "tinyurl", "goo.gl", "t.co"];
const SUSPICIOUS_EXTENSIONS: [&str; 7] = [".exe", ".scr", ".bat", ".js", ".vbs", ".jar", ".zip"];
const PRIORITY_HEADERS: [&str; 3] = ["x-priority", "x-msmail-priority", "priority"];

/// 需要缩放的大数值特征
const SCALED_FEATURES: [&str; 8] = [
    "subject_length",
    "total_text_length",
    "body_length",
    "html_length",
    "total_attachment_size",
    "avg_attachment_size",
    "link_count",
    "external_link_count",
];

#[derive(Debug, Clone, Default)]
pub struct EmailFeatureExtractor;

impl EmailFeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    fn content(email: &EmailInput, out: &mut FeatureMap) {
        let subject = email.subject.as_str();
        let body = email.body.as_str();
        let full_text = format!("{} {}", subject, body);

        out.insert("subject_length".into(), subject.chars().count() as f64);
        out.insert("subject_word_count".into(), subject.split_whitespace().count() as f64);
        out.insert("subject_has_urgency".into(), bool_f(has_urgency(subject)));
        out.insert("subject_caps_ratio".into(), caps_ratio(subject));
        out.insert("total_text_length".into(), full_text.trim().chars().count() as f64);
        out.insert("total_word_count".into(), full_text.split_whitespace().count() as f64);
        out.insert("body_length".into(), body.chars().count() as f64);
        out.insert("body_word_count".into(), body.split_whitespace().count() as f64);

        let html = email.html.as_deref().unwrap_or("");
        out.insert("has_html".into(), bool_f(!html.is_empty()));
        out.insert("html_length".into(), html.chars().count() as f64);
        let html_lower = safe_lowercase(html);
        out.insert("html_image_count".into(), html_lower.matches("<img").count() as f64);
    }

    fn structure(email: &EmailInput, out: &mut FeatureMap) {
        let subject = email.subject.as_str();
        out.insert("subject_exclamation_count".into(), subject.matches('!').count() as f64);
        out.insert("subject_question_count".into(), subject.matches('?').count() as f64);
        let numbers = DIGITS_RE
            .as_ref()
            .map_or(0, |re| re.find_iter(subject).count());
        out.insert("subject_number_count".into(), numbers as f64);

        let paragraphs = email
            .body
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count();
        out.insert("body_paragraph_count".into(), paragraphs as f64);
        out.insert(
            "avg_paragraph_length".into(),
            email.body.chars().count() as f64 / paragraphs.max(1) as f64,
        );

        let html_lower = safe_lowercase(email.html.as_deref().unwrap_or(""));
        out.insert("html_table_count".into(), html_lower.matches("<table").count() as f64);
        out.insert(
            "html_list_count".into(),
            (html_lower.matches("<ul").count() + html_lower.matches("<ol").count()) as f64,
        );
        out.insert("html_form_count".into(), html_lower.matches("<form").count() as f64);
    }

    fn links(email: &EmailInput, out: &mut FeatureMap) {
        let urls: Vec<&str> = match email.html.as_deref().filter(|h| !h.is_empty()) {
            Some(html) => HREF_RE.as_ref().map_or_else(Vec::new, |re| {
                re.captures_iter(html)
                    .filter_map(|c| c.get(1).map(|m| m.as_str()))
                    .collect()
            }),
            None => URL_RE.as_ref().map_or_else(Vec::new, |re| {
                re.find_iter(&email.subject)
                    .chain(re.find_iter(&email.body))
                    .map(|m| m.as_str())
                    .collect()
            }),
        };

        let mut external = 0usize;
        let mut shortened = 0usize;
        let mut domains = FxHashSet::default();
        for url in &urls {
            let lower = safe_lowercase(url);
            if lower.starts_with("http") {
                external += 1;
            }
            if let Some(host) = url_host(&lower) {
                if SHORTENER_HOSTS.iter().any(|s| host.contains(s)) {
                    shortened += 1;
                }
                domains.insert(host.to_string());
            }
        }

        out.insert("link_count".into(), urls.len() as f64);
        out.insert("has_links".into(), bool_f(!urls.is_empty()));
        out.insert("external_link_count".into(), external as f64);
        out.insert("unique_domain_count".into(), domains.len() as f64);
        out.insert("short_url_count".into(), shortened as f64);
    }

    fn attachments(email: &EmailInput, out: &mut FeatureMap) {
        let count = email.attachments.len();
        let total_size: u64 = email.attachments.iter().map(|a| a.size).sum();
        let extensions: Vec<String> = email
            .attachments
            .iter()
            .filter_map(|a| {
                a.filename
                    .rsplit_once('.')
                    .map(|(_, ext)| format!(".{}", safe_lowercase(ext)))
            })
            .collect();
        let unique: FxHashSet<&str> = extensions.iter().map(String::as_str).collect();
        let has = |list: &[&str]| extensions.iter().any(|e| list.contains(&e.as_str()));

        out.insert("attachment_count".into(), count as f64);
        out.insert("has_attachments".into(), bool_f(count > 0));
        out.insert("total_attachment_size".into(), total_size as f64);
        out.insert(
            "avg_attachment_size".into(),
            if count > 0 { total_size as f64 / count as f64 } else { 0.0 },
        );
        out.insert("unique_extension_count".into(), unique.len() as f64);
        out.insert(
            "suspicious_extension_count".into(),
            extensions
                .iter()
                .filter(|e| SUSPICIOUS_EXTENSIONS.contains(&e.as_str()))
                .count() as f64,
        );
        out.insert("has_pdf_attachment".into(), bool_f(has(&[".pdf"])));
        out.insert(
            "has_image_attachment".into(),
            bool_f(has(&[".jpg", ".jpeg", ".png", ".gif"])),
        );
        out.insert(
            "has_document_attachment".into(),
            bool_f(has(&[".doc", ".docx", ".txt", ".rtf"])),
        );
    }

    fn headers(email: &EmailInput, out: &mut FeatureMap) {
        let values: Vec<String> = email.headers.values().map(|v| safe_lowercase(v)).collect();
        let any_value = |needle: &str| values.iter().any(|v| v.contains(needle));
        out.insert("has_spf".into(), bool_f(any_value("spf")));
        out.insert("has_dkim".into(), bool_f(any_value("dkim")));
        out.insert("has_dmarc".into(), bool_f(any_value("dmarc")));
        out.insert("has_reply_to".into(), bool_f(email.header("reply-to").is_some()));
        out.insert(
            "has_priority_header".into(),
            bool_f(PRIORITY_HEADERS.iter().any(|h| email.header(h).is_some())),
        );
        let recipients = email
            .to
            .as_deref()
            .map_or(0, |to| to.split(',').filter(|r| !r.trim().is_empty()).count());
        out.insert("recipient_count".into(), recipients as f64);
    }
}

impl FeatureExtractor for EmailFeatureExtractor {
    fn extract(&self, email: &EmailInput) -> FeatureMap {
        let mut features = FeatureMap::new();
        Self::content(email, &mut features);
        Self::structure(email, &mut features);
        Self::links(email, &mut features);
        Self::attachments(email, &mut features);
        Self::headers(email, &mut features);
        normalize_features(&mut features);
        features
    }
}

/// 大数值特征缩放；非有限值置0
pub fn normalize_features(features: &mut FeatureMap) {
    for (name, value) in features.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
            continue;
        }
        if SCALED_FEATURES.contains(&name.as_str()) && *value > 1000.0 {
            *value = (*value / 1000.0).clamp(0.0, 10.0);
        }
    }
}

#[inline]
fn bool_f(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}

fn has_urgency(text: &str) -> bool {
    let lower = safe_lowercase(text);
    URGENCY_PATTERNS.iter().any(|p| lower.contains(p))
}

fn caps_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    text.chars().filter(|c| c.is_uppercase()).count() as f64 / total as f64
}

/// 提取URL主机名（已小写）
fn url_host(url: &str) -> Option<&str> {
    let rest = url.split_once("//").map_or(url, |(_, r)| r);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailfusion_engine::Attachment;

    #[test]
    fn test_plain_text_features() {
        let email = EmailInput::new(
            "URGENT: 50% off!!",
            "Visit https://bit.ly/abc and http://shop.example.com/sale\n\nThanks",
        )
        .with_to("a@x.com, b@y.com");
        let f = EmailFeatureExtractor::new().extract(&email);
        assert_eq!(f["subject_has_urgency"], 1.0);
        assert_eq!(f["subject_exclamation_count"], 2.0);
        assert_eq!(f["subject_number_count"], 1.0);
        assert_eq!(f["link_count"], 2.0);
        assert_eq!(f["short_url_count"], 1.0);
        assert_eq!(f["unique_domain_count"], 2.0);
        assert_eq!(f["body_paragraph_count"], 2.0);
        assert_eq!(f["recipient_count"], 2.0);
        assert_eq!(f["has_html"], 0.0);
    }

    #[test]
    fn test_html_and_attachment_features() {
        let email = EmailInput::new("Report", "")
            .with_html(r#"<table><tr><td><a href="https://example.com/x">x</a><img src="a.png"></td></tr></table>"#)
            .with_attachment(Attachment::new("report.PDF").with_size(4000))
            .with_attachment(Attachment::new("setup.exe").with_size(2000))
            .with_header("Authentication-Results", "spf=pass dkim=pass");
        let f = EmailFeatureExtractor::new().extract(&email);
        assert_eq!(f["has_html"], 1.0);
        assert_eq!(f["html_table_count"], 1.0);
        assert_eq!(f["html_image_count"], 1.0);
        assert_eq!(f["link_count"], 1.0);
        assert_eq!(f["attachment_count"], 2.0);
        assert_eq!(f["has_pdf_attachment"], 1.0);
        assert_eq!(f["suspicious_extension_count"], 1.0);
        // 6000 → 6.0，3000 → 3.0
        assert_eq!(f["total_attachment_size"], 6.0);
        assert_eq!(f["avg_attachment_size"], 3.0);
        assert_eq!(f["has_spf"], 1.0);
        assert_eq!(f["has_dmarc"], 0.0);
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://user@bit.ly:443/x?y"), Some("bit.ly"));
        assert_eq!(url_host("/relative/path"), None);
    }
}
