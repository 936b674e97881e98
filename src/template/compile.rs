use super::{ScriptCatalog, TemplateError};
use std::collections::BTreeMap;

/// Substitutes `##TOKEN_NAME##` placeholders. Token names match keys
/// case-insensitively against their upper-cased form; unresolved placeholders
/// pass through verbatim.
pub fn substitute_tokens(template: &str, tokens: &BTreeMap<String, String>) -> String {
    let upper: BTreeMap<String, &str> = tokens
        .iter()
        .map(|(key, value)| (key.to_uppercase(), value.as_str()))
        .collect();

    let mut rendered = String::with_capacity(template.len());
    let mut cursor = template;
    while let Some(start) = cursor.find("##") {
        let after_open = &cursor[start + 2..];
        let Some(close_offset) = after_open.find("##") else {
            break;
        };
        let token = &after_open[..close_offset];
        match upper.get(&token.to_uppercase()) {
            Some(value) if is_token_name(token) => {
                rendered.push_str(&cursor[..start]);
                rendered.push_str(value);
                cursor = &after_open[close_offset + 2..];
            }
            _ => {
                // Unknown token stays verbatim; re-scan from after its
                // opening marker so back-to-back placeholders still resolve.
                rendered.push_str(&cursor[..start + 2]);
                cursor = after_open;
            }
        }
    }
    rendered.push_str(cursor);
    rendered
}

fn is_token_name(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn shell_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Appends resource-type custom fields to the template's `export` preamble
/// line, creating one when the template has none.
fn apply_custom_fields(text: &str, custom_fields: &BTreeMap<String, String>) -> String {
    if custom_fields.is_empty() {
        return text.to_string();
    }
    let exports = custom_fields
        .iter()
        .map(|(key, value)| format!("{}={}", key.to_uppercase(), shell_quote(value)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    for line in lines.iter_mut() {
        if line.trim_start().starts_with("export ") {
            line.push(' ');
            line.push_str(&exports);
            return lines.join("\n");
        }
    }
    lines.insert(0, format!("export {exports}"));
    lines.join("\n")
}

/// Resolves a script template and renders the final command text. Missing
/// templates surface as an explicit error; callers that want the historical
/// "nothing to run" behavior handle `TemplateError::NotFound` themselves.
pub fn compile(
    catalog: &ScriptCatalog,
    provider: Option<&str>,
    script: &str,
    tokens: &BTreeMap<String, String>,
    custom_fields: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let text = catalog.resolve(provider, script)?;
    let text = apply_custom_fields(&text, custom_fields);
    let rendered = substitute_tokens(&text, tokens);
    // Remote hosts expect unix line endings.
    Ok(rendered.replace("\r\n", "\n"))
}
