use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use std::sync::{Arc, RwLock};

/// 全局正则缓存类型定义
/// Key: (正则模式字符串, 是否忽略大小写)
/// Value: 编译结果（None表示编译失败，仅记录一次警告）
type RegexCacheKey = (Arc<str>, bool);
pub static REGEX_CACHE: Lazy<RwLock<FxHashMap<RegexCacheKey, Option<Arc<Regex>>>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// 规则匹配器
/// 核心特性：
/// 1. 子串匹配在调用前统一转小写，匹配时零分配
/// 2. 正则懒编译 + 全局缓存，同一模式进程内只编译一次
/// 3. 非法正则永不命中，不向上抛错
#[derive(Debug, Clone)]
pub enum Matcher {
    /// 包含匹配（子字符串，已转小写）
    Contains(Arc<str>),
    /// 懒加载正则匹配
    LazyRegex {
        pattern: Arc<str>,
        case_insensitive: bool,
    },
}

impl Matcher {
    /// 构建小写子串匹配器，空模式返回None
    pub fn contains(pattern: &str) -> Option<Self> {
        let needle = pattern.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        Some(Matcher::Contains(Arc::from(needle)))
    }

    /// 构建大小写不敏感正则匹配器，空模式返回None
    pub fn regex(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }
        Some(Matcher::LazyRegex {
            pattern: Arc::from(pattern),
            case_insensitive: true,
        })
    }

    /// 获取编译后的正则（懒加载+全局缓存）
    /// 核心逻辑：读锁查缓存 → 未命中则写锁编译并缓存
    fn get_compiled_regex(pattern: &Arc<str>, case_insensitive: bool) -> Option<Arc<Regex>> {
        let cache_key = (pattern.clone(), case_insensitive);

        {
            let cache_read = REGEX_CACHE.read().unwrap_or_else(|e| e.into_inner());
            if let Some(re) = cache_read.get(&cache_key) {
                return re.clone();
            }
        }

        let mut cache_write = REGEX_CACHE.write().unwrap_or_else(|e| e.into_inner());
        cache_write
            .entry(cache_key)
            .or_insert_with(|| Self::compile_regex(pattern, case_insensitive))
            .clone()
    }

    /// 正则编译公共逻辑（失败记录警告并返回None）
    #[inline]
    fn compile_regex(pattern: &str, case_insensitive: bool) -> Option<Arc<Regex>> {
        RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()
            .map_or_else(
                |e| {
                    log::warn!("Regex compilation failed: pattern={} error={}", pattern, e);
                    None
                },
                |re| Some(Arc::new(re)),
            )
    }

    /// 模式是否可用（正则可编译）
    pub fn is_valid(&self) -> bool {
        match self {
            Matcher::Contains(_) => true,
            Matcher::LazyRegex {
                pattern,
                case_insensitive,
            } => Self::get_compiled_regex(pattern, *case_insensitive).is_some(),
        }
    }

    /// 描述匹配器规则（用于日志/调试输出）
    pub fn describe(&self) -> String {
        match self {
            Matcher::Contains(s) => format!("contains: {}", s),
            Matcher::LazyRegex { pattern, .. } => format!("lazy_regex: {}", pattern),
        }
    }

    /// 执行匹配
    /// Contains 要求 input 已转小写
    #[inline(always)]
    pub fn matches(&self, input: &str) -> bool {
        match self {
            Matcher::Contains(s) => input.contains(s.as_ref()),
            Matcher::LazyRegex {
                pattern,
                case_insensitive,
            } => Self::get_compiled_regex(pattern, *case_insensitive)
                .is_some_and(|re| re.is_match(input)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_matcher() {
        let m = Matcher::contains("  Invoice ").unwrap();
        assert!(m.matches("your invoice is ready"));
        assert!(!m.matches("your bill is ready"));
        assert!(Matcher::contains("   ").is_none());
    }

    #[test]
    fn test_regex_matcher_case_insensitive() {
        let m = Matcher::regex(r"^noreply@.*\.edu$").unwrap();
        assert!(m.is_valid());
        assert!(m.matches("NoReply@campus.EDU"));
        assert!(!m.matches("someone@campus.edu"));
    }

    #[test]
    fn test_invalid_regex_never_matches() {
        let m = Matcher::regex(r"([unclosed").unwrap();
        assert!(!m.is_valid());
        assert!(!m.matches("([unclosed"));
        assert!(m.describe().starts_with("lazy_regex"));
    }
}
