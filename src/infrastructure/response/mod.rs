use once_cell::sync::Lazy;
use regex::Regex;

static THINK_BLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

// Reasoning models sometimes stream an opening tag that is never closed before the answer.
static DANGLING_THINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<think>[\s\S]*$").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

/// Removes reasoning blocks emitted by thinking models. Text without such blocks comes back
/// byte-for-byte; otherwise the whitespace left around the removed blocks is trimmed.
pub fn clean_llm_response(response: &str) -> String {
    let mut cleaned = THINK_BLOCK_PATTERN.replace_all(response, "").into_owned();
    cleaned = DANGLING_THINK_PATTERN.replace(&cleaned, "").into_owned();
    cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "").into_owned();

    if cleaned.len() == response.len() {
        return cleaned;
    }
    cleaned.trim().to_string()
}

/// Collapses paragraph breaks to single newlines, as fed to the critique model.
pub fn collapse_blank_lines(text: &str) -> String {
    text.replace("\n\n", "\n").trim().to_string()
}
