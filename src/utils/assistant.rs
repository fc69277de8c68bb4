use once_cell::sync::Lazy;
use regex::Regex;

/// 聊天助手回复中最多提取的候选回复数
pub const MAX_EXAMPLES: usize = 3;

static LABELED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"示例(\d+)[：:]\s*([^\n]+)").expect("valid labeled example regex"));
static NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)[.．]\s*([^\n]+)").expect("valid numbered list regex"));
static LABEL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^示例\d+[：:]\s*").expect("valid label prefix regex"));
static NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[.．]\s*").expect("valid number prefix regex"));

fn clean(content: &str) -> String {
    content.replace("**", "")
}

fn collect(pattern: &Regex, text: &str, examples: &mut Vec<String>) {
    for caps in pattern.captures_iter(text) {
        let content = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if !content.is_empty() {
            examples.push(clean(content));
        }
    }
}

/// 从助手回复中提取可直接发送的候选回复
///
/// 优先匹配 `示例N：` 格式，其次是数字列表；仍不足时逐行扫描。
pub fn extract_examples(text: &str) -> Vec<String> {
    let mut examples = Vec::new();

    collect(&LABELED, text, &mut examples);
    if examples.is_empty() {
        collect(&NUMBERED, text, &mut examples);
    }

    if examples.len() < MAX_EXAMPLES {
        for line in text.lines() {
            let looks_like_example = line.contains("示例") || NUMBER_PREFIX.is_match(line);
            if !looks_like_example || line.chars().count() <= 5 {
                continue;
            }

            let without_label = LABEL_PREFIX.replace(line, "");
            let content = NUMBER_PREFIX.replace(&without_label, "");
            let content = clean(content.trim());
            if !content.is_empty() && !examples.contains(&content) {
                examples.push(content);
            }
        }
    }

    examples.truncate(MAX_EXAMPLES);
    examples
}
