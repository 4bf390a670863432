use std::borrow::Cow;

/// 安全转小写
/// 纯ASCII输入走快速路径；含非ASCII字符时使用Unicode小写，与规则模式的归一化保持一致
#[inline(always)]
pub fn safe_lowercase(s: &str) -> String {
    lowercase_cow(s).into_owned()
}

/// 已是小写时零分配返回借用
#[inline]
pub fn lowercase_cow(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(s.to_ascii_lowercase())
        } else {
            Cow::Borrowed(s)
        }
    } else {
        Cow::Owned(s.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_fast_path() {
        assert_eq!(safe_lowercase("Invoice DUE"), "invoice due");
        assert!(matches!(lowercase_cow("already lower"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_unicode_lowercase() {
        assert_eq!(safe_lowercase("École Überweisung"), "école überweisung");
    }
}
