//! 策略打分器
//! 核心职责：
//! 1. 将邮件派生为各规则组所需的小写检索文本（EmailView）
//! 2. 按规则组独立计算 (score, max_score)，再求和
//! 3. 输出 strategy_confidence = score / max_score
//! 纯函数，无锁无IO，可在请求线程内直接执行

use log::debug;

use super::matcher::Matcher;
use crate::core::{
    BodyAnalysis, ClassificationStrategy, EmailInput, HeaderAnalysis, MetadataAnalysis,
    RegistrySnapshot, TagsAnalysis,
};
use crate::utils::safe_lower::safe_lowercase;

// ===================== 规则权重 =====================
const SENDER_DOMAIN_WEIGHT: f64 = 0.1;
const SENDER_PATTERN_WEIGHT: f64 = 0.15;
const SUBJECT_PATTERN_WEIGHT: f64 = 0.2;

const BODY_KEYWORD_WEIGHT: f64 = 0.1;
const BODY_PHRASE_WEIGHT: f64 = 0.15;
const TFIDF_GROUP_CAP: f64 = 1.0;

const LENGTH_MATCH_WEIGHT: f64 = 0.3;
const TIME_PATTERN_WEIGHT: f64 = 0.1;
const ATTACHMENT_PATTERN_WEIGHT: f64 = 0.1;
const METADATA_MAX_SCORE: f64 = 1.0;

const COMMON_TAG_WEIGHT: f64 = 0.1;
const LABEL_PATTERN_WEIGHT: f64 = 0.15;
const ENTITY_EMAIL_WEIGHT: f64 = 0.2;
const ENTITY_URL_WEIGHT: f64 = 0.15;
const ENTITY_KEYWORD_WEIGHT: f64 = 0.1;
const TAG_BOOST_FACTOR: f64 = 1.2;
const TAG_BOOST_RATIO: f64 = 0.8;

/// 参与发件人规则的邮件头
const SENDER_HEADERS: [&str; 4] = ["from", "sender", "reply-to", "return-path"];
const DATE_HEADERS: [&str; 1] = ["date"];

/// 邮件检索视图（一次构建，所有分类复用）
#[derive(Debug, Clone, Default)]
pub struct EmailView {
    /// 小写 subject + body + html
    text: String,
    /// 小写主题
    subject: String,
    /// 原始发件人字段（正则匹配用）
    sender_fields: Vec<String>,
    /// 小写发件人字段 + 正文（域名/实体邮箱匹配用）
    sender_text: String,
    /// 小写日期字段
    time_text: String,
    /// 小写附件名 + 类型
    attachment_text: String,
    /// subject + body 字符数
    length: usize,
}

impl EmailView {
    pub fn from_email(email: &EmailInput) -> Self {
        let mut text = String::with_capacity(
            email.subject.len() + email.body.len() + email.html.as_ref().map_or(0, String::len) + 2,
        );
        text.push_str(&safe_lowercase(&email.subject));
        text.push(' ');
        text.push_str(&safe_lowercase(&email.body));
        if let Some(html) = &email.html {
            text.push(' ');
            text.push_str(&safe_lowercase(html));
        }

        let mut sender_fields: Vec<String> = Vec::new();
        if let Some(from) = email.from.as_deref().filter(|f| !f.trim().is_empty()) {
            sender_fields.push(from.trim().to_string());
        }
        for name in SENDER_HEADERS {
            if let Some(value) = email.header(name).filter(|v| !v.trim().is_empty()) {
                sender_fields.push(value.trim().to_string());
            }
        }

        let mut sender_text = String::new();
        for field in &sender_fields {
            sender_text.push_str(&safe_lowercase(field));
            sender_text.push(' ');
        }
        sender_text.push_str(&text);

        let mut time_text = String::new();
        if let Some(date) = &email.date {
            time_text.push_str(&safe_lowercase(date));
        }
        for name in DATE_HEADERS {
            if let Some(value) = email.header(name) {
                time_text.push(' ');
                time_text.push_str(&safe_lowercase(value));
            }
        }

        let mut attachment_text = String::new();
        for attachment in &email.attachments {
            attachment_text.push_str(&safe_lowercase(&attachment.filename));
            attachment_text.push(' ');
            if let Some(ct) = &attachment.content_type {
                attachment_text.push_str(&safe_lowercase(ct));
                attachment_text.push(' ');
            }
        }

        Self {
            text,
            subject: safe_lowercase(&email.subject),
            sender_fields,
            sender_text,
            time_text,
            attachment_text,
            length: email.subject.chars().count() + email.body.chars().count(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

/// 单个规则组的得分
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupScore {
    pub score: f64,
    pub max_score: f64,
}

impl GroupScore {
    #[inline]
    fn add(&mut self, matched: usize, configured: usize, weight: f64) {
        self.score += matched as f64 * weight;
        self.max_score += configured as f64 * weight;
    }

    pub fn ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            (self.score / self.max_score).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// 一个分类策略的完整打分明细
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrategyScore {
    pub header: GroupScore,
    pub body: GroupScore,
    pub metadata: GroupScore,
    pub tags: GroupScore,
}

impl StrategyScore {
    pub fn score(&self) -> f64 {
        self.header.score + self.body.score + self.metadata.score + self.tags.score
    }

    pub fn max_score(&self) -> f64 {
        self.header.max_score + self.body.max_score + self.metadata.max_score + self.tags.max_score
    }

    /// 策略置信度（max_score为0时返回0）
    pub fn confidence(&self) -> f64 {
        let max_score = self.max_score();
        if max_score > 0.0 {
            (self.score() / max_score).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// 策略融合候选
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyCandidate {
    pub category_id: u32,
    pub name: String,
    pub confidence: f64,
    pub threshold: f64,
}

/// 统计命中数：返回 (命中数, 有效配置数)
#[inline]
fn count_matches(matchers: &[Matcher], haystack: &str) -> (usize, usize) {
    let configured = matchers.iter().filter(|m| m.is_valid()).count();
    let matched = matchers.iter().filter(|m| m.matches(haystack)).count();
    (matched, configured)
}

#[inline]
fn substring_matchers(patterns: &[String]) -> Vec<Matcher> {
    patterns.iter().filter_map(|p| Matcher::contains(p)).collect()
}

/// 域名规则：去掉前导@后做子串匹配
#[inline]
fn domain_matchers(domains: &[String]) -> Vec<Matcher> {
    domains
        .iter()
        .filter_map(|d| Matcher::contains(d.trim().trim_start_matches('@')))
        .collect()
}

pub struct StrategyScorer;

impl StrategyScorer {
    /// 对单个策略打分
    pub fn score(strategy: &ClassificationStrategy, view: &EmailView) -> StrategyScore {
        StrategyScore {
            header: strategy
                .header_analysis
                .as_ref()
                .map(|g| Self::score_header(g, view))
                .unwrap_or_default(),
            body: strategy
                .body_analysis
                .as_ref()
                .map(|g| Self::score_body(g, view))
                .unwrap_or_default(),
            metadata: strategy
                .metadata_analysis
                .as_ref()
                .map(|g| Self::score_metadata(g, view))
                .unwrap_or_default(),
            tags: strategy
                .tags_analysis
                .as_ref()
                .map(|g| Self::score_tags(g, view))
                .unwrap_or_default(),
        }
    }

    /// 策略置信度；max_score为0（无有效规则）时返回None，表示跳过该分类
    pub fn confidence(strategy: &ClassificationStrategy, view: &EmailView) -> Option<f64> {
        let score = Self::score(strategy, view);
        (score.max_score() > 0.0).then(|| score.confidence())
    }

    /// 对快照中所有带策略的分类打分，按id升序输出候选
    pub fn score_categories(snapshot: &RegistrySnapshot, view: &EmailView) -> Vec<StrategyCandidate> {
        let mut candidates = Vec::new();
        for category in snapshot.strategy_bearing() {
            let Some(strategy) = category.classification_strategy.as_ref() else {
                continue;
            };
            let Some(confidence) = Self::confidence(strategy, view) else {
                continue;
            };
            debug!(
                "[Strategy] category={} confidence={:.4} threshold={}",
                category.name, confidence, strategy.confidence_threshold
            );
            candidates.push(StrategyCandidate {
                category_id: category.id,
                name: category.name.clone(),
                confidence,
                threshold: strategy.confidence_threshold,
            });
        }
        candidates
    }

    fn score_header(group: &HeaderAnalysis, view: &EmailView) -> GroupScore {
        let mut out = GroupScore::default();

        let (matched, configured) =
            count_matches(&domain_matchers(&group.sender_domains), &view.sender_text);
        out.add(matched, configured, SENDER_DOMAIN_WEIGHT);

        // 发件人正则逐字段匹配；无发件人字段时退化为全文匹配
        let patterns: Vec<Matcher> = group
            .sender_patterns
            .iter()
            .filter_map(|p| Matcher::regex(p))
            .collect();
        let configured = patterns.iter().filter(|m| m.is_valid()).count();
        let matched = patterns
            .iter()
            .filter(|m| {
                if view.sender_fields.is_empty() {
                    m.matches(&view.text)
                } else {
                    view.sender_fields.iter().any(|f| m.matches(f))
                }
            })
            .count();
        out.add(matched, configured, SENDER_PATTERN_WEIGHT);

        let (matched, configured) =
            count_matches(&substring_matchers(&group.subject_patterns), &view.subject);
        out.add(matched, configured, SUBJECT_PATTERN_WEIGHT);

        out
    }

    fn score_body(group: &BodyAnalysis, view: &EmailView) -> GroupScore {
        let mut out = GroupScore::default();

        let (matched, configured) =
            count_matches(&substring_matchers(&group.keywords), &view.text);
        out.add(matched, configured, BODY_KEYWORD_WEIGHT);

        let (matched, configured) = count_matches(&substring_matchers(&group.phrases), &view.text);
        out.add(matched, configured, BODY_PHRASE_WEIGHT);

        let mut tfidf_total = 0.0;
        let mut tfidf_configured = false;
        for (term, weight) in &group.tfidf_scores {
            let Some(matcher) = Matcher::contains(term) else {
                continue;
            };
            tfidf_configured = true;
            if matcher.matches(&view.text) && weight.is_finite() {
                tfidf_total += weight.clamp(0.0, 1.0);
            }
        }
        if tfidf_configured {
            out.score += tfidf_total.min(TFIDF_GROUP_CAP);
            out.max_score += TFIDF_GROUP_CAP;
        }

        out
    }

    fn score_metadata(group: &MetadataAnalysis, view: &EmailView) -> GroupScore {
        let time_matchers = substring_matchers(&group.time_patterns);
        let attachment_matchers = substring_matchers(&group.attachment_patterns);
        if group.length_patterns.is_none() && time_matchers.is_empty() && attachment_matchers.is_empty()
        {
            return GroupScore::default();
        }

        let mut score = 0.0;
        if let Some(length) = &group.length_patterns {
            if length.contains(view.length) {
                score += LENGTH_MATCH_WEIGHT;
            }
        }
        let (matched, _) = count_matches(&time_matchers, &view.time_text);
        score += matched as f64 * TIME_PATTERN_WEIGHT;
        let (matched, _) = count_matches(&attachment_matchers, &view.attachment_text);
        score += matched as f64 * ATTACHMENT_PATTERN_WEIGHT;

        GroupScore {
            score: score.min(METADATA_MAX_SCORE),
            max_score: METADATA_MAX_SCORE,
        }
    }

    fn score_tags(group: &TagsAnalysis, view: &EmailView) -> GroupScore {
        let mut out = GroupScore::default();

        let (matched, configured) =
            count_matches(&substring_matchers(&group.common_tags), &view.text);
        out.add(matched, configured, COMMON_TAG_WEIGHT);

        let (matched, configured) =
            count_matches(&substring_matchers(&group.label_patterns), &view.text);
        out.add(matched, configured, LABEL_PATTERN_WEIGHT);

        if let Some(entities) = &group.entity_patterns {
            let (matched, configured) =
                count_matches(&substring_matchers(&entities.emails), &view.sender_text);
            out.add(matched, configured, ENTITY_EMAIL_WEIGHT);

            let (matched, configured) =
                count_matches(&substring_matchers(&entities.urls), &view.text);
            out.add(matched, configured, ENTITY_URL_WEIGHT);

            let (matched, configured) =
                count_matches(&substring_matchers(&entities.keywords), &view.text);
            out.add(matched, configured, ENTITY_KEYWORD_WEIGHT);
        }

        // 命中率接近tagMatch门限（≥80%）时加权1.2倍，不超过max_score
        if let Some(threshold) = group.tag_match_threshold() {
            if out.max_score > 0.0 && out.score / out.max_score >= TAG_BOOST_RATIO * threshold {
                out.score = (out.score * TAG_BOOST_FACTOR).min(out.max_score);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Attachment, Category, EntityPatterns, LengthPattern, TagThresholds};
    use std::collections::BTreeMap;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn invoice_strategy() -> ClassificationStrategy {
        ClassificationStrategy::default().with_body(BodyAnalysis {
            keywords: vec!["invoice".into(), "payment".into()],
            ..Default::default()
        })
    }

    #[test]
    fn test_body_keywords_full_match() {
        let email = EmailInput::new("Your Invoice", "Payment is due on Friday");
        let view = EmailView::from_email(&email);
        let score = StrategyScorer::score(&invoice_strategy(), &view);
        assert!(approx(score.body.score, 0.2));
        assert!(approx(score.body.max_score, 0.2));
        assert_eq!(score.confidence(), 1.0);
    }

    #[test]
    fn test_body_keywords_partial_match() {
        let view = EmailView::from_email(&EmailInput::new("Hello", "payment reminder"));
        let conf = StrategyScorer::confidence(&invoice_strategy(), &view).unwrap();
        assert!(approx(conf, 0.5));
    }

    #[test]
    fn test_header_rules() {
        let strategy = ClassificationStrategy::default().with_header(HeaderAnalysis {
            sender_domains: vec!["@university.edu".into(), "school.org".into()],
            sender_patterns: vec![r"^prof\..*@".into()],
            subject_patterns: vec!["Lecture".into()],
        });
        let email = EmailInput::new("Lecture notes", "see attached lecture")
            .with_from("Prof.Smith@University.edu");
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        // 域名 1/2，正则 1/1，主题 1/1
        assert!(approx(score.header.score, 0.1 + 0.15 + 0.2));
        assert!(approx(score.header.max_score, 0.2 + 0.15 + 0.2));
    }

    #[test]
    fn test_subject_patterns_only_match_subject() {
        let strategy = ClassificationStrategy::default().with_header(HeaderAnalysis {
            subject_patterns: vec!["urgent".into()],
            ..Default::default()
        });
        let email = EmailInput::new("Hello", "this is urgent");
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        assert_eq!(score.header.score, 0.0);
        assert!(approx(score.header.max_score, 0.2));
    }

    #[test]
    fn test_sender_pattern_falls_back_to_text() {
        let strategy = ClassificationStrategy::default().with_header(HeaderAnalysis {
            sender_patterns: vec![r"billing@\w+\.com".into()],
            ..Default::default()
        });
        let email = EmailInput::new("Hi", "contact billing@acme.com for help");
        let conf = StrategyScorer::confidence(&strategy, &EmailView::from_email(&email)).unwrap();
        assert_eq!(conf, 1.0);
    }

    #[test]
    fn test_invalid_regex_excluded_from_max() {
        let strategy = ClassificationStrategy::default().with_header(HeaderAnalysis {
            sender_patterns: vec!["(broken".into()],
            subject_patterns: vec!["sale".into()],
            ..Default::default()
        });
        let email = EmailInput::new("Big sale", "");
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        assert!(approx(score.header.max_score, 0.2));
        assert_eq!(score.confidence(), 1.0);
    }

    #[test]
    fn test_tfidf_group_clamped() {
        let mut tfidf = BTreeMap::new();
        tfidf.insert("exam".to_string(), 0.8);
        tfidf.insert("grade".to_string(), 3.0);
        tfidf.insert("absent".to_string(), 0.5);
        let strategy = ClassificationStrategy::default().with_body(BodyAnalysis {
            tfidf_scores: tfidf,
            ..Default::default()
        });
        let email = EmailInput::new("Exam results", "your grade is posted");
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        assert!(approx(score.body.score, 1.0));
        assert!(approx(score.body.max_score, 1.0));
    }

    #[test]
    fn test_metadata_group() {
        let strategy = ClassificationStrategy::default().with_metadata(MetadataAnalysis {
            length_patterns: Some(LengthPattern { min: Some(5), max: Some(100) }),
            time_patterns: vec!["mon".into(), "sat".into()],
            attachment_patterns: vec![".pdf".into()],
        });
        let email = EmailInput::new("Report", "weekly numbers")
            .with_date("Mon, 12 Feb 2024 09:00:00 +0000")
            .with_attachment(Attachment::new("report.PDF"));
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        assert!(approx(score.metadata.score, 0.3 + 0.1 + 0.1));
        assert_eq!(score.metadata.max_score, 1.0);
    }

    #[test]
    fn test_metadata_length_out_of_range() {
        let strategy = ClassificationStrategy::default().with_metadata(MetadataAnalysis {
            length_patterns: Some(LengthPattern { min: Some(1000), max: None }),
            ..Default::default()
        });
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&EmailInput::new("a", "b")));
        assert_eq!(score.metadata.score, 0.0);
        assert_eq!(score.metadata.max_score, 1.0);
    }

    #[test]
    fn test_tags_boost_capped() {
        let strategy = ClassificationStrategy::default().with_tags(TagsAnalysis {
            common_tags: vec!["newsletter".into(), "weekly".into()],
            label_patterns: vec![],
            entity_patterns: Some(EntityPatterns {
                emails: vec!["news@site.com".into()],
                urls: vec!["site.com/unsubscribe".into()],
                keywords: vec![],
            }),
            confidence_thresholds: Some(TagThresholds { tag_match: Some(0.5) }),
        });
        let email = EmailInput::new("Weekly newsletter", "visit site.com/unsubscribe")
            .with_from("news@site.com");
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        // 全部命中：0.1+0.1+0.2+0.15 = 0.55，加权后封顶于max_score
        assert!(approx(score.tags.max_score, 0.55));
        assert!(approx(score.tags.score, 0.55));
    }

    #[test]
    fn test_tags_boost_applied_when_near_threshold() {
        let strategy = ClassificationStrategy::default().with_tags(TagsAnalysis {
            common_tags: vec!["alpha".into(), "beta".into()],
            confidence_thresholds: Some(TagThresholds { tag_match: Some(0.5) }),
            ..Default::default()
        });
        let email = EmailInput::new("alpha", "");
        let score = StrategyScorer::score(&strategy, &EmailView::from_email(&email));
        // 原始比率 0.5 ≥ 0.8×0.5，0.1×1.2 = 0.12
        assert!(approx(score.tags.score, 0.12));
    }

    #[test]
    fn test_empty_strategy_skipped() {
        let view = EmailView::from_email(&EmailInput::new("a", "b"));
        assert!(StrategyScorer::confidence(&ClassificationStrategy::default(), &view).is_none());
        let blank = ClassificationStrategy::default().with_body(BodyAnalysis {
            keywords: vec!["  ".into()],
            ..Default::default()
        });
        assert!(StrategyScorer::confidence(&blank, &view).is_none());
    }

    #[test]
    fn test_score_categories_in_id_order() {
        let snapshot = RegistrySnapshot::new(
            1,
            vec![
                Category::new(5, "Invoices").with_strategy(Some(invoice_strategy())),
                Category::new(0, "Other").as_default(),
                Category::new(2, "Plain"),
                Category::new(1, "Billing").with_strategy(Some(invoice_strategy().with_threshold(0.5))),
            ],
            "Other",
        )
        .unwrap();
        let view = EmailView::from_email(&EmailInput::new("invoice", "payment"));
        let candidates = StrategyScorer::score_categories(&snapshot, &view);
        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Billing", "Invoices"]);
        assert_eq!(candidates[0].threshold, 0.5);
    }
}
