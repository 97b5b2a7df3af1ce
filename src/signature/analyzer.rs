// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::OnceLock;

/// How a node's code expects to be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    /// The node defines `RunScript`; inputs bind by keyword.
    Script,
    /// The node defines `main`, or no recognized entry point at all.
    Basic,
    /// The source could not be analyzed.
    Unknown,
}

/// One declared parameter of the dispatch target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_hint: String,
    /// Extracted default literal; `None` means the parameter has no default.
    /// Defaults too complex to extract statically surface as JSON null, the
    /// parameter still counts as optional.
    pub default: Option<Value>,
    pub required: bool,
}

/// One output key visible in the dispatch target's return statements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_hint: String,
}

/// Result of analyzing a node source artifact.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSignature {
    pub mode: SignatureMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    pub inputs: Vec<ParamInfo>,
    pub outputs: Vec<OutputInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeSignature {
    fn unknown(error: String) -> Self {
        Self {
            mode: SignatureMode::Unknown,
            function_name: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            error: Some(error),
        }
    }

    fn generic_basic() -> Self {
        Self {
            mode: SignatureMode::Basic,
            function_name: None,
            inputs: vec![ParamInfo {
                name: "input_data".into(),
                type_hint: "Any".into(),
                default: Some(Value::Null),
                required: false,
            }],
            outputs: vec![OutputInfo {
                name: "output".into(),
                type_hint: "Any".into(),
            }],
            error: None,
        }
    }
}

/// Analyze a node source artifact on disk.
///
/// A missing or unreadable file reports mode `unknown` with a diagnostic,
/// mirroring the vertex-level error the evaluator would raise.
pub fn analyze_node_file(path: &Path) -> NodeSignature {
    match std::fs::read_to_string(path) {
        Ok(source) => analyze_source(&source),
        Err(err) => NodeSignature::unknown(format!(
            "Node file '{}' not readable: {}",
            path.display(),
            err
        )),
    }
}

/// Analyze node source text.
///
/// Locates `RunScript` (mode `script`), failing that `main` (mode `basic`),
/// failing that reports the generic basic shape. Analysis is purely lexical;
/// the source is never executed.
pub fn analyze_source(source: &str) -> NodeSignature {
    for (name, mode) in [("RunScript", SignatureMode::Script), ("main", SignatureMode::Basic)] {
        match find_function(source, name) {
            Ok(Some(decl)) => {
                let inputs = match split_top_level(&decl.params, ',') {
                    Ok(parts) => parts.iter().filter_map(|p| parse_param(p)).collect(),
                    Err(message) => return NodeSignature::unknown(message),
                };
                return NodeSignature {
                    mode,
                    function_name: Some(name.to_string()),
                    inputs,
                    outputs: extract_outputs(&decl.body),
                    error: None,
                };
            }
            Ok(None) => continue,
            Err(message) => return NodeSignature::unknown(message),
        }
    }
    NodeSignature::generic_basic()
}

struct FunctionDecl {
    params: String,
    body: String,
}

/// Locate `def {name}(...)` and slice out its parameter list and body.
///
/// Returns `Err` when a header is present but unterminated, which is the
/// lexical stand-in for a syntax error.
fn find_function(source: &str, name: &str) -> Result<Option<FunctionDecl>, String> {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    let header = HEADER.get_or_init(|| {
        Regex::new(r"(?m)^(?P<indent>[ \t]*)def[ \t]+(?P<name>\w+)[ \t]*\(").expect("valid regex")
    });

    for caps in header.captures_iter(source) {
        if &caps["name"] != name {
            continue;
        }
        let indent = caps.name("indent").map(|m| m.as_str().len()).unwrap_or(0);
        let open = caps.get(0).map(|m| m.end()).unwrap_or(0);

        let close = match matching_close(&source[open..]) {
            Some(offset) => open + offset,
            None => {
                return Err(format!(
                    "Syntax error in node code: unterminated parameter list for '{name}'"
                ))
            }
        };
        let params = source[open..close].to_string();

        // Skip over a possible return annotation to the header's colon.
        let after = &source[close + 1..];
        let colon = match top_level_colon(after) {
            Some(offset) => close + 1 + offset,
            None => {
                return Err(format!(
                    "Syntax error in node code: missing ':' after '{name}' header"
                ))
            }
        };

        let body = function_body(&source[colon + 1..], indent);
        return Ok(Some(FunctionDecl { params, body }));
    }
    Ok(None)
}

/// Offset of the `)` matching an already-consumed `(`.
fn matching_close(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut chars = text.char_indices();
    let mut in_string: Option<char> = None;
    while let Some((i, c)) = chars.next() {
        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the header-terminating `:` on the first line after the
/// parameter list, skipping a bracketed return annotation.
fn top_level_colon(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some(i),
            '\n' => return None,
            _ => {}
        }
    }
    None
}

/// The indented block following a function header.
fn function_body(text: &str, header_indent: usize) -> String {
    let mut body = String::new();
    for line in text.lines().skip_while(|l| l.trim().is_empty()) {
        let trimmed = line.trim_start();
        if !trimmed.is_empty() {
            let indent = line.len() - trimmed.len();
            if indent <= header_indent {
                break;
            }
        }
        body.push_str(line);
        body.push('\n');
    }
    body
}

/// Split on `sep` at bracket/quote depth zero.
fn split_top_level(text: &str, sep: char) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            current.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                if depth == 0 {
                    return Err("Syntax error in node code: unbalanced brackets".into());
                }
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if in_string.is_some() || depth != 0 {
        return Err("Syntax error in node code: unbalanced brackets".into());
    }
    parts.push(current.trim().to_string());
    Ok(parts)
}

/// Parse one `name[: annotation][= default]` parameter entry.
///
/// Starred parameters (`*args`, `**kwargs`) carry no bindable name and are
/// skipped, matching what a positional-parameter walk would see.
fn parse_param(text: &str) -> Option<ParamInfo> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('*') {
        return None;
    }

    let (head, default_text) = match find_top_level(text, '=') {
        Some(i) => (&text[..i], Some(text[i + 1..].trim())),
        None => (text, None),
    };
    let (name, annotation) = match find_top_level(head, ':') {
        Some(i) => (head[..i].trim(), Some(head[i + 1..].trim())),
        None => (head.trim(), None),
    };
    if name.is_empty() {
        return None;
    }

    let type_hint = annotation
        .filter(|a| !a.is_empty())
        .map(normalize_annotation)
        .unwrap_or_else(|| "Any".to_string());

    let default = default_text.map(parse_default_literal);
    let required = default.is_none();

    Some(ParamInfo {
        name: name.to_string(),
        type_hint,
        default,
        required,
    })
}

/// First occurrence of `sep` at bracket/quote depth zero.
fn find_top_level(text: &str, sep: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Render an annotation as a printable string with collapsed whitespace.
fn normalize_annotation(annotation: &str) -> String {
    let mut out = String::with_capacity(annotation.len());
    let mut last_space = false;
    for c in annotation.chars() {
        if c.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
            }
            last_space = true;
        } else {
            // No space after an opening bracket or before punctuation.
            if last_space && matches!(c, ',' | ']' | ')' | '}') {
                out.pop();
            }
            out.push(c);
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Best-effort extraction of a default literal.
fn parse_default_literal(text: &str) -> Value {
    let text = text.trim();
    match text {
        "None" => return Value::Null,
        "True" => return json!(true),
        "False" => return json!(false),
        "[]" => return json!([]),
        "{}" => return json!({}),
        "()" => return json!([]),
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        return json!(f);
    }
    if text.len() >= 2 {
        let bytes = text.as_bytes();
        let quote = bytes[0];
        if (quote == b'"' || quote == b'\'') && bytes[bytes.len() - 1] == quote {
            return json!(text[1..text.len() - 1].to_string());
        }
    }
    // Expressions (calls, names, comprehensions) are not extractable.
    Value::Null
}

/// Collect output keys from the return statements of a function body.
///
/// Recognizes mapping literals (`return {"key": …}`) and keyword-style
/// constructors (`return dict(key=…)`); first occurrence wins.
fn extract_outputs(body: &str) -> Vec<OutputInfo> {
    static RETURN: OnceLock<Regex> = OnceLock::new();
    let re = RETURN.get_or_init(|| Regex::new(r"(?m)^[ \t]*return\b[ \t]*(?P<expr>.*)$").expect("valid regex"));

    let mut outputs: Vec<OutputInfo> = Vec::new();
    let mut push = |name: String| {
        if !outputs.iter().any(|o| o.name == name) {
            outputs.push(OutputInfo {
                name,
                type_hint: "Any".into(),
            });
        }
    };

    for caps in re.captures_iter(body) {
        let start = caps.name("expr").map(|m| m.start()).unwrap_or(0);
        let rest = &body[start..];
        let expr = rest.trim_start();
        if expr.starts_with('{') {
            if let Some(block) = balanced_block(expr, '{', '}') {
                for key in dict_literal_keys(block) {
                    push(key);
                }
            }
        } else if let Some(after) = expr.strip_prefix("dict") {
            let after = after.trim_start();
            if after.starts_with('(') {
                if let Some(block) = balanced_block(after, '(', ')') {
                    for key in dict_call_keys(block) {
                        push(key);
                    }
                }
            }
        }
    }

    if outputs.is_empty() {
        outputs.push(OutputInfo {
            name: "output".into(),
            type_hint: "Any".into(),
        });
    }
    outputs
}

/// The text between an opening bracket at position 0 and its match,
/// possibly spanning lines.
fn balanced_block(text: &str, open: char, close: char) -> Option<&str> {
    debug_assert!(text.starts_with(open));
    let mut depth = 0usize;
    let mut in_string: Option<char> = None;
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        if let Some(quote) = in_string {
            if c == '\\' {
                chars.next();
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// String-literal keys of a mapping literal's top level.
fn dict_literal_keys(block: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut depth = 0usize;
    let mut chars = block.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                let mut literal = String::new();
                for (_, sc) in chars.by_ref() {
                    if sc == quote {
                        break;
                    }
                    literal.push(sc);
                }
                if depth == 0 {
                    // A key only if a colon follows the literal.
                    let mut lookahead = chars.clone();
                    let mut is_key = false;
                    for (_, nc) in lookahead.by_ref() {
                        if nc.is_whitespace() {
                            continue;
                        }
                        is_key = nc == ':';
                        break;
                    }
                    if is_key {
                        keys.push(literal);
                    }
                }
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    keys
}

/// Keyword names of a `dict(key=value, ...)` constructor call.
fn dict_call_keys(block: &str) -> Vec<String> {
    let mut keys = Vec::new();
    for part in split_top_level(block, ',').unwrap_or_default() {
        let part = part.trim();
        if let Some(eq) = find_top_level(part, '=') {
            // Exclude `==` comparisons inside value expressions.
            if part.as_bytes().get(eq + 1) == Some(&b'=') {
                continue;
            }
            let name = part[..eq].trim();
            if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                keys.push(name.to_string());
            }
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_mode_with_defaults_and_annotations() {
        let sig = analyze_source(
            r#"
def RunScript(prompt: str = "hello", n: int = 2, flag: bool = True, data=None):
    return {"text": prompt * n, "count": n}
"#,
        );
        assert_eq!(sig.mode, SignatureMode::Script);
        assert_eq!(sig.function_name.as_deref(), Some("RunScript"));
        assert_eq!(sig.inputs.len(), 4);

        assert_eq!(sig.inputs[0].name, "prompt");
        assert_eq!(sig.inputs[0].type_hint, "str");
        assert_eq!(sig.inputs[0].default, Some(json!("hello")));
        assert!(!sig.inputs[0].required);

        assert_eq!(sig.inputs[1].default, Some(json!(2)));
        assert_eq!(sig.inputs[2].default, Some(json!(true)));
        assert_eq!(sig.inputs[3].type_hint, "Any");
        assert_eq!(sig.inputs[3].default, Some(Value::Null));

        let names: Vec<&str> = sig.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["text", "count"]);
    }

    #[test]
    fn test_required_parameters_have_no_default() {
        let sig = analyze_source("def RunScript(x: int, y: int = 0):\n    return {\"sum\": x + y}\n");
        assert!(sig.inputs[0].required);
        assert_eq!(sig.inputs[0].default, None);
        assert!(!sig.inputs[1].required);
    }

    #[test]
    fn test_subscripted_and_literal_annotations() {
        let sig = analyze_source(
            r#"
def RunScript(items: List[int] = [], mode: Literal["fast", "slow"] = "fast", table: Dict[str, int] = {}):
    return {"n": len(items)}
"#,
        );
        assert_eq!(sig.inputs[0].type_hint, "List[int]");
        assert_eq!(sig.inputs[0].default, Some(json!([])));
        assert_eq!(sig.inputs[1].type_hint, r#"Literal["fast", "slow"]"#);
        assert_eq!(sig.inputs[2].type_hint, "Dict[str, int]");
        assert_eq!(sig.inputs[2].default, Some(json!({})));
    }

    #[test]
    fn test_negative_number_default() {
        let sig = analyze_source("def RunScript(offset: int = -3, scale: float = -0.5):\n    return {}\n");
        assert_eq!(sig.inputs[0].default, Some(json!(-3)));
        assert_eq!(sig.inputs[1].default, Some(json!(-0.5)));
    }

    #[test]
    fn test_multiline_parameter_list() {
        let sig = analyze_source(
            "def RunScript(\n    prompt: str = \"\",\n    n: int = 1,\n):\n    return {\"out\": prompt * n}\n",
        );
        assert_eq!(sig.mode, SignatureMode::Script);
        assert_eq!(sig.inputs.len(), 2);
        assert_eq!(sig.outputs[0].name, "out");
    }

    #[test]
    fn test_starred_parameters_are_skipped() {
        let sig = analyze_source("def RunScript(x, *args, **kwargs):\n    return {\"x\": x}\n");
        assert_eq!(sig.inputs.len(), 1);
        assert_eq!(sig.inputs[0].name, "x");
    }

    #[test]
    fn test_main_fallback_is_basic_mode() {
        let sig = analyze_source("def main(input_data):\n    return input_data\n");
        assert_eq!(sig.mode, SignatureMode::Basic);
        assert_eq!(sig.function_name.as_deref(), Some("main"));
        assert_eq!(sig.outputs[0].name, "output");
    }

    #[test]
    fn test_no_entry_point_reports_generic_basic() {
        let sig = analyze_source("def helper(x):\n    return x\n");
        assert_eq!(sig.mode, SignatureMode::Basic);
        assert_eq!(sig.function_name, None);
        assert_eq!(sig.inputs.len(), 1);
        assert_eq!(sig.inputs[0].name, "input_data");
    }

    #[test]
    fn test_dict_constructor_outputs() {
        let sig = analyze_source(
            "def RunScript(x: int = 0):\n    if x > 0:\n        return dict(value=x, sign=1)\n    return dict(value=x, sign=-1)\n",
        );
        let names: Vec<&str> = sig.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["value", "sign"]);
    }

    #[test]
    fn test_nested_dict_keys_are_not_outputs() {
        let sig = analyze_source(
            "def RunScript(x: int = 0):\n    return {\"summary\": {\"inner\": x}, \"raw\": x}\n",
        );
        let names: Vec<&str> = sig.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["summary", "raw"]);
    }

    #[test]
    fn test_multiline_return_dict() {
        let sig = analyze_source(
            "def RunScript(x: int = 0):\n    return {\n        \"first\": x,\n        \"second\": x * 2,\n    }\n",
        );
        let names: Vec<&str> = sig.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_outputs_deduplicate_preserving_first() {
        let sig = analyze_source(
            "def RunScript(x: int = 0):\n    if x:\n        return {\"out\": 1, \"extra\": 2}\n    return {\"out\": 0}\n",
        );
        let names: Vec<&str> = sig.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["out", "extra"]);
    }

    #[test]
    fn test_unterminated_header_is_unknown() {
        let sig = analyze_source("def RunScript(x: int = 0:\n    return {\"out\": x}\n");
        assert_eq!(sig.mode, SignatureMode::Unknown);
        assert!(sig.error.as_deref().unwrap_or("").contains("Syntax error"));
        assert!(sig.inputs.is_empty());
        assert!(sig.outputs.is_empty());
    }

    #[test]
    fn test_missing_file_is_unknown() {
        let sig = analyze_node_file(Path::new("/nonexistent/node.py"));
        assert_eq!(sig.mode, SignatureMode::Unknown);
        assert!(sig.error.is_some());
    }

    #[test]
    fn test_runscript_wins_over_main() {
        let sig = analyze_source(
            "def main(x):\n    return x\n\ndef RunScript(y: int = 1):\n    return {\"y\": y}\n",
        );
        assert_eq!(sig.mode, SignatureMode::Script);
        assert_eq!(sig.function_name.as_deref(), Some("RunScript"));
    }
}
