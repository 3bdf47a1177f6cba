//! Tool directive extraction from model output.
//!
//! The model asks for a tool by embedding a block like:
//!
//! ```text
//! <func_call>
//! <tool_name>query_order</tool_name>
//! <arguments>
//! <orderNumber>ORD-1700000000</orderNumber>
//! </arguments>
//! </func_call>
//! ```
//!
//! This is a two-pass text scanner, not an XML parser. The outer block is
//! cut out first, then flat `<key>value</key>` pairs are read from the
//! arguments block. Anything malformed yields no directive; nothing here
//! returns an error.

use serde_json::{Map, Value};
use shopdesk_core::tool::ToolDirective;

const BLOCK_OPEN: &str = "<func_call>";
const BLOCK_CLOSE: &str = "</func_call>";
const NAME_OPEN: &str = "<tool_name>";
const NAME_CLOSE: &str = "</tool_name>";
const ARGS_OPEN: &str = "<arguments>";
const ARGS_CLOSE: &str = "</arguments>";

/// Fields that stay strings even when they look numeric.
pub const TEXT_FIELDS: [&str; 2] = ["customerPhone", "orderId"];

/// Find the first `open` that has a `close` after it.
///
/// Returns the byte range of the whole match and of the inner text.
fn enclosed(text: &str, open: &str, close: &str) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let start = text.find(open)?;
    let inner_start = start + open.len();
    let inner_end = inner_start + text[inner_start..].find(close)?;
    Some((start..inner_end + close.len(), inner_start..inner_end))
}

/// The tool name field may not span lines. An opening tag whose nearest
/// close is on a later line is passed over for the next opening tag.
fn tool_name(block: &str) -> Option<&str> {
    let mut offset = 0;
    while let Some(found) = block[offset..].find(NAME_OPEN) {
        let inner_start = offset + found + NAME_OPEN.len();
        let rest = &block[inner_start..];
        let close = rest.find(NAME_CLOSE)?;
        let inner = &rest[..close];
        if !inner.contains('\n') {
            return Some(inner);
        }
        offset = inner_start;
    }
    None
}

/// Extract the directive from `text`, if a complete one is present.
pub fn extract(text: &str) -> Option<ToolDirective> {
    let (_, inner) = enclosed(text, BLOCK_OPEN, BLOCK_CLOSE)?;
    let block = &text[inner];

    let name = tool_name(block)?.trim();
    if name.is_empty() {
        return None;
    }

    let (_, args) = enclosed(block, ARGS_OPEN, ARGS_CLOSE)?;
    Some(ToolDirective {
        name: name.to_string(),
        arguments: parse_arguments(&block[args]),
    })
}

/// Read every `<key>value</key>` pair in an arguments block.
///
/// Keys are ASCII word characters. A pair whose closing name differs from
/// its opening name is consumed and skipped. Later duplicates win.
pub fn parse_arguments(block: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    let mut pos = 0;
    while let Some(found) = block[pos..].find('<') {
        let at = pos + found;
        match scan_pair(block, at) {
            Some((open, value, close, end)) => {
                if open == close {
                    arguments.insert(open.to_string(), typed_value(open, value.trim()));
                }
                pos = end;
            }
            None => pos = at + 1,
        }
    }
    arguments
}

fn word_len(s: &str) -> usize {
    s.bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count()
}

/// Match `<open>value</close>` starting at `at`, where `value` holds no `<`.
fn scan_pair(s: &str, at: usize) -> Option<(&str, &str, &str, usize)> {
    let open_start = at + 1;
    let open_len = word_len(&s[open_start..]);
    if open_len == 0 {
        return None;
    }
    let open_end = open_start + open_len;
    if !s[open_end..].starts_with('>') {
        return None;
    }

    let value_start = open_end + 1;
    let value_end = value_start + s[value_start..].find('<')?;
    if !s[value_end..].starts_with("</") {
        return None;
    }

    let close_start = value_end + 2;
    let close_len = word_len(&s[close_start..]);
    if close_len == 0 {
        return None;
    }
    let close_end = close_start + close_len;
    if !s[close_end..].starts_with('>') {
        return None;
    }

    Some((
        &s[open_start..open_end],
        &s[value_start..value_end],
        &s[close_start..close_end],
        close_end + 1,
    ))
}

fn typed_value(key: &str, value: &str) -> Value {
    if TEXT_FIELDS.contains(&key) {
        return Value::String(value.to_string());
    }
    match value.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(value.to_string()),
    }
}

/// Remove every complete directive block and trim what remains.
pub fn strip_directives(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;
    while let Some((span, _)) = enclosed(rest, BLOCK_OPEN, BLOCK_CLOSE) {
        cleaned.push_str(&rest[..span.start]);
        rest = &rest[span.end..];
    }
    cleaned.push_str(rest);
    cleaned.trim().to_string()
}

/// Join the cleaned narrative and a tool result into the final reply.
pub fn splice_reply(narrative: &str, tool_result: &str) -> String {
    if narrative.is_empty() {
        tool_result.to_string()
    } else {
        format!("{narrative}\n\n{tool_result}")
    }
}
