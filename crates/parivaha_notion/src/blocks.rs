//! Markdown bodies as Notion blocks.
//!
//! One markdown line becomes one block, except fenced code which becomes
//! a single code block. Inline formatting stays literal text. Numbered
//! items are renumbered `1.` and `*` bullets become `-`. Block types
//! without a markdown form are dropped when reading.

use crate::properties::{plain_text, rich_text};
use serde_json::{json, Value};

/// Most children the API accepts in one append.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;

const FENCE: &str = "```";
const PLAIN_LANGUAGE: &str = "plain text";
const LANGUAGES: &[&str] = &[
    "bash", "c", "c++", "c#", "css", "go", "html", "java", "javascript", "json", "kotlin",
    "markdown", "python", "ruby", "rust", "shell", "sql", "swift", "typescript", "yaml",
];

fn text_block(kind: &str, text: &str) -> Value {
    json!({ "object": "block", "type": kind, kind: { "rich_text": rich_text(text) } })
}

fn numbered_item(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once(". ")?;
    (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit())).then_some(rest)
}

/// Converts a markdown body to blocks.
pub fn markdown_to_blocks(body: &str) -> Vec<Value> {
    let mut blocks = Vec::new();
    let mut lines = body.lines();

    while let Some(line) = lines.next() {
        if let Some(language) = line.strip_prefix(FENCE) {
            let code: Vec<&str> = lines.by_ref().take_while(|l| l.trim_end() != FENCE).collect();
            let language = language.trim().to_lowercase();
            let language = if LANGUAGES.contains(&language.as_str()) {
                language
            } else {
                PLAIN_LANGUAGE.to_string()
            };
            blocks.push(json!({
                "object": "block",
                "type": "code",
                "code": { "rich_text": rich_text(&code.join("\n")), "language": language }
            }));
            continue;
        }

        let block = if let Some(text) = line.strip_prefix("### ") {
            text_block("heading_3", text)
        } else if let Some(text) = line.strip_prefix("## ") {
            text_block("heading_2", text)
        } else if let Some(text) = line.strip_prefix("# ") {
            text_block("heading_1", text)
        } else if let Some(text) = line.strip_prefix("- [ ] ") {
            json!({ "object": "block", "type": "to_do", "to_do": { "rich_text": rich_text(text), "checked": false } })
        } else if let Some(text) = line
            .strip_prefix("- [x] ")
            .or_else(|| line.strip_prefix("- [X] "))
        {
            json!({ "object": "block", "type": "to_do", "to_do": { "rich_text": rich_text(text), "checked": true } })
        } else if let Some(text) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            text_block("bulleted_list_item", text)
        } else if let Some(text) = numbered_item(line) {
            text_block("numbered_list_item", text)
        } else if let Some(text) = line.strip_prefix("> ") {
            text_block("quote", text)
        } else if line.trim_end() == "---" {
            json!({ "object": "block", "type": "divider", "divider": {} })
        } else {
            text_block("paragraph", line)
        };
        blocks.push(block);
    }
    blocks
}

/// Converts blocks to a markdown body, one line per block.
pub fn blocks_to_markdown(blocks: &[Value]) -> String {
    let mut out = String::new();
    for block in blocks {
        let Some(kind) = block.get("type").and_then(Value::as_str) else {
            continue;
        };
        let inner = block.get(kind).unwrap_or(&Value::Null);
        let text = plain_text(inner.get("rich_text").unwrap_or(&Value::Null));

        let line = match kind {
            "paragraph" => text,
            "heading_1" => format!("# {text}"),
            "heading_2" => format!("## {text}"),
            "heading_3" => format!("### {text}"),
            "bulleted_list_item" => format!("- {text}"),
            "numbered_list_item" => format!("1. {text}"),
            "quote" => format!("> {text}"),
            "divider" => "---".to_string(),
            "to_do" => {
                let checked = inner.get("checked").and_then(Value::as_bool).unwrap_or(false);
                format!("- [{}] {text}", if checked { 'x' } else { ' ' })
            }
            "code" => {
                let language = inner
                    .get("language")
                    .and_then(Value::as_str)
                    .filter(|l| *l != PLAIN_LANGUAGE)
                    .unwrap_or_default();
                format!("{FENCE}{language}\n{text}\n{FENCE}")
            }
            _ => continue,
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}
