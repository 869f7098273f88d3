//! Post-LLM output cleanup, applied before any lenient JSON parsing.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
static SPECIAL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:unused\d+|\|[a-z_]+\|)>").expect("valid regex"));

/// Strip model-specific artifacts from raw LLM output.
///
/// Handles:
/// 1. `<think>...</think>` reasoning blocks
/// 2. Gemma-style thinking prefixes (`<unusedN>thought\n...`)
/// 3. Stray special tokens (`<unusedN>`, `<|eot_id|>`)
pub fn sanitize_llm_output(raw: &str) -> String {
    let mut text = THINK_BLOCK_RE.replace_all(raw, "").to_string();

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = text[idx + thought_offset + 8..].to_string();
        }
    }

    text = SPECIAL_TOKEN_RE.replace_all(&text, "").to_string();
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_think_blocks() {
        let raw = "<think>the user wants [1]</think>\n[{\"value\": 2}]";
        assert_eq!(sanitize_llm_output(raw), "[{\"value\": 2}]");
    }

    #[test]
    fn strips_thinking_prefix() {
        let raw = "<unused94>thought\n[1, 2]";
        assert_eq!(sanitize_llm_output(raw), "[1, 2]");
    }

    #[test]
    fn strips_special_tokens() {
        let raw = "answer<|eot_id|> <unused3>";
        assert_eq!(sanitize_llm_output(raw), "answer");
    }

    #[test]
    fn plain_text_untouched() {
        assert_eq!(sanitize_llm_output("  plain  "), "plain");
    }
}
