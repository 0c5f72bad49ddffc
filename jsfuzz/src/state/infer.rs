//! Literal-based type facts for content that arrives without a state.
//!
//! Corpus states normally come from the preprocessing stage, which executes
//! testcases to record runtime types. When a testcase arrives as bare source,
//! this recovers the facts that can be read off declarations directly.

use crate::scanner::{self, IdentifierKind, find_matching_bracket, find_next, parse_numbered_identifier};
use crate::state::TestcaseState;
use crate::types::JsType;

/// The type of a right-hand side that is a literal or a constructor call.
pub fn literal_type(expression: &str) -> Option<JsType> {
    let expression = expression.trim().trim_end_matches(';').trim_end();
    let first = expression.bytes().next()?;
    match first {
        b'\'' | b'"' | b'`' => return Some(JsType::String),
        b'[' => return Some(JsType::Array),
        b'{' => return Some(JsType::Object),
        b'/' => return Some(JsType::RegExp),
        _ => {}
    }
    let numbers = scanner::number_positions(expression);
    if let [span] = numbers.as_slice() {
        if span.start == 0 && span.end == expression.len() {
            return Some(if expression.ends_with('n') {
                JsType::BigInt
            } else {
                JsType::RealNumber
            });
        }
    }
    match expression {
        "true" | "false" => return Some(JsType::Boolean),
        "null" => return Some(JsType::Null),
        "undefined" => return Some(JsType::Undefined),
        "NaN" | "Infinity" | "-Infinity" => return Some(JsType::RealNumber),
        _ => {}
    }
    if expression.starts_with("function") || expression.starts_with("async ") {
        return Some(JsType::Function);
    }
    if expression.starts_with("class") {
        return Some(JsType::Class);
    }
    if expression.starts_with("Symbol(") {
        return Some(JsType::Symbol);
    }
    if expression.starts_with("BigInt(") {
        return Some(JsType::BigInt);
    }
    if let Some(rest) = expression.strip_prefix("new ") {
        let constructor: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_')
            .collect();
        return constructor.parse().ok();
    }
    if find_next(expression, b'=', 0).is_some_and(|i| expression[i..].starts_with("=>")) {
        return Some(JsType::Function);
    }
    None
}

/// Number of elements of an array literal starting at offset 0.
pub fn array_literal_length(expression: &str) -> Option<usize> {
    let close = find_matching_bracket(expression, 0)?;
    if expression[1..close].trim().is_empty() {
        return Some(0);
    }
    let mut count = 1;
    let mut from = 1;
    while let Some(comma) = find_next(expression, b',', from) {
        if comma > close {
            break;
        }
        // A trailing comma does not add an element.
        if !expression[comma + 1..close].trim().is_empty() {
            count += 1;
        }
        from = comma + 1;
    }
    Some(count)
}

fn declared_name(line: &str) -> Option<(&str, &str, bool)> {
    let (hoisted, rest) = if let Some(rest) = line.strip_prefix("var ") {
        (true, rest)
    } else if let Some(rest) = line.strip_prefix("let ").or_else(|| line.strip_prefix("const ")) {
        (false, rest)
    } else {
        (false, line)
    };
    let (name, rhs) = rest.split_once('=')?;
    let name = name.trim();
    if rhs.starts_with(['=', '>']) {
        return None;
    }
    let (kind, _) = parse_numbered_identifier(name)?;
    (kind == IdentifierKind::Variable).then_some((name, rhs, hoisted))
}

fn function_arity(line: &str) -> Option<(&str, usize)> {
    let rest = line
        .strip_prefix("async ")
        .unwrap_or(line)
        .strip_prefix("function")?
        .trim_start_matches('*')
        .trim_start();
    let open = rest.find('(')?;
    let name = rest[..open].trim();
    parse_numbered_identifier(name).filter(|(kind, _)| *kind == IdentifierKind::Function)?;
    let close = find_matching_bracket(rest, open)?;
    let parameters = rest[open + 1..close].trim();
    let arity = if parameters.is_empty() {
        0
    } else {
        parameters.split(',').filter(|p| !p.trim().is_empty()).count()
    };
    Some((name, arity))
}

/// Records the facts readable from declarations in `content`.
pub fn infer_declaration_facts(state: &mut TestcaseState, content: &str) {
    for (line, text) in content.split('\n').enumerate() {
        let text = text.trim();
        if let Some((name, arity)) = function_arity(text) {
            state.function_arguments.insert(name.to_string(), arity);
            state.variable_types.insert(name, line + 1, JsType::Function);
            continue;
        }
        if let Some(rest) = text.strip_prefix("class ") {
            let name = rest.split(|c: char| !c.is_ascii_alphanumeric() && c != '_').next();
            if let Some(name) = name.filter(|name| parse_numbered_identifier(name).is_some()) {
                state.variable_types.insert(name, line + 1, JsType::Class);
            }
            continue;
        }
        let Some((name, rhs, hoisted)) = declared_name(text) else {
            continue;
        };
        if hoisted && line > 0 && !state.variable_types.contains(name) {
            state.variable_types.insert(name, 0, JsType::Undefined);
        }
        let Some(ty) = literal_type(rhs) else { continue };
        state.variable_types.insert(name, line + 1, ty);
        if ty == JsType::Array {
            if let Some(length) = array_literal_length(rhs.trim()) {
                state.array_lengths.insert(name, line + 1, vec![length]);
            }
        }
    }
}
