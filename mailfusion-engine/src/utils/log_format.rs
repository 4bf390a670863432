use std::fmt::{self, Write};

// ======================== 核心：零堆分配字符串格式化 ========================
/// 空白字符折叠 + 截断 - 零堆分配的日志预览核心函数
/// 用于记录邮件主题/正文片段，避免整段正文进入日志
#[inline(always)]
pub fn preview_compact<'a>(s: &'a str, max_len: usize) -> impl fmt::Display + 'a {
    struct CompactView<'a> {
        source: &'a str,
        max_length: usize,
    }

    impl<'a> fmt::Display for CompactView<'a> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut char_count = 0;
            let mut last_was_whitespace = false;

            for ch in self.source.trim().chars() {
                if char_count >= self.max_length {
                    f.write_str("…")?;
                    break;
                }

                if ch.is_whitespace() {
                    if !last_was_whitespace {
                        f.write_str(" ")?;
                        char_count += 1;
                        last_was_whitespace = true;
                    }
                } else {
                    f.write_char(ch)?;
                    char_count += 1;
                    last_was_whitespace = false;
                }
            }
            Ok(())
        }
    }

    CompactView {
        source: s,
        max_length: max_len,
    }
}

// ======================== 衍生：名称列表日志格式化 ========================
/// 名称列表日志格式化（分类名/模型标签）
/// 格式：[name1, name2, ...] (total: N)
pub fn compress_name_list<S: AsRef<str>>(names: &[S]) -> String {
    const MAX_COUNT: usize = 10;
    const MAX_NAME_LEN: usize = 30;

    let total_count = names.len();
    if total_count == 0 {
        return "[empty]".to_string();
    }

    let mut result = String::with_capacity(MAX_COUNT * (MAX_NAME_LEN + 2) + 20);
    result.push('[');
    for (idx, name) in names.iter().take(MAX_COUNT).enumerate() {
        if idx > 0 {
            result.push_str(", ");
        }
        // 写入String不会失败
        let _ = write!(result, "{}", preview_compact(name.as_ref(), MAX_NAME_LEN));
    }
    if total_count > MAX_COUNT {
        let _ = write!(result, "… (total: {})", total_count);
    }
    result.push(']');

    result
}
