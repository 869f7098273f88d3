use super::types::{FactExtractionRequest, FactKind};

/// Characters of content sent to the model.
pub const MAX_EXCERPT_CHARS: usize = 2000;

pub const FACT_EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a fact extraction assistant. Your ONLY role is to pull concrete,
verifiable facts out of web content so they can be compared over time.

RULES:
1. Extract ONLY values explicitly present in the content.
2. NEVER guess, round, or convert values.
3. Give every fact a confidence between 0.0 and 1.0.
4. Output a JSON array and nothing else.
"#;

/// First `max_chars` characters of `content`, cut on a char boundary.
pub fn content_excerpt(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &content[..byte_idx],
        None => content,
    }
}

fn kind_hint(kind: FactKind) -> &'static str {
    match kind {
        FactKind::Numerical => "numerical: prices, counts, percentages, measurements",
        FactKind::Temporal => "temporal: dates and times (prefer YYYY-MM-DD)",
        FactKind::Boolean => "boolean: yes/no states such as in stock, open, available",
        FactKind::Url => "url: absolute links",
        FactKind::Structured => "structured: small JSON objects grouping related values",
        FactKind::Text => "text: short labels, names, statuses",
    }
}

/// Build the extraction prompt for one request.
pub fn build_fact_prompt(request: &FactExtractionRequest) -> String {
    let excerpt = content_excerpt(&request.content, MAX_EXCERPT_CHARS);
    let source = request.source_url.as_deref().unwrap_or("unknown");

    let hints = if request.expected_types.is_empty() {
        String::from("Look for any numerical, temporal, boolean, url, structured or text facts.")
    } else {
        let lines: Vec<String> = request
            .expected_types
            .iter()
            .map(|k| format!("- {}", kind_hint(*k)))
            .collect();
        format!("Focus on these fact types:\n{}", lines.join("\n"))
    };

    format!(
        r#"Source: {source}
Content type: {content_type}

<content>
{excerpt}
</content>

{hints}

Return a JSON array where each element has this shape:
[
  {{"id": "f1", "type": "numerical", "value": 215.4, "confidence": 0.9, "unit": "USD", "location": "price header", "context": "Closing price"}}
]
If no facts are present, return []."#,
        content_type = request.content_type,
    )
}
