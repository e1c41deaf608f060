//! URI template expansion
//!
//! Covers the parts of RFC 6570 the Bitbucket link documents use: the simple,
//! reserved (`+`), fragment (`#`), label (`.`), path (`/`) and query (`?`, `&`)
//! operators, variable lists and the explode modifier. Expansion never fails:
//! undefined variables vanish and an unterminated expression is copied literally.

use serde_json::Value;

const RESERVED: &str = ":/?#[]@!$&'()*+,;=";

struct Operator {
    first: &'static str,
    sep: &'static str,
    named: bool,
    if_empty: &'static str,
    allow_reserved: bool,
}

impl Operator {
    fn parse(expression: &str) -> (Self, &str) {
        let (op, rest) = match expression.chars().next() {
            Some(c @ ('+' | '#' | '.' | '/' | '?' | '&')) => (c, &expression[1..]),
            _ => (' ', expression),
        };

        let operator = match op {
            '+' => Self::new("", ",", false, "", true),
            '#' => Self::new("#", ",", false, "", true),
            '.' => Self::new(".", ".", false, "", false),
            '/' => Self::new("/", "/", false, "", false),
            '?' => Self::new("?", "&", true, "=", false),
            '&' => Self::new("&", "&", true, "=", false),
            _ => Self::new("", ",", false, "", false),
        };
        (operator, rest)
    }

    fn new(
        first: &'static str,
        sep: &'static str,
        named: bool,
        if_empty: &'static str,
        allow_reserved: bool,
    ) -> Self {
        Self {
            first,
            sep,
            named,
            if_empty,
            allow_reserved,
        }
    }

    fn encode(&self, value: &str) -> String {
        if self.allow_reserved {
            encode_reserved(value)
        } else {
            urlencoding::encode(value).into_owned()
        }
    }
}

/// Expand `template` using the variables in the JSON object `vars`.
pub fn expand(template: &str, vars: &Value) -> String {
    expand_with(template, vars, false)
}

/// Like [`expand`], but expressions none of whose variables are defined are kept
/// verbatim, so the result can be expanded again later.
pub fn expand_partial(template: &str, vars: &Value) -> String {
    expand_with(template, vars, true)
}

fn expand_with(template: &str, vars: &Value, keep_undefined: bool) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let expression = &after[..end];
                if keep_undefined && !defines_any(expression, vars) {
                    out.push_str(&rest[start..start + end + 2]);
                } else {
                    out.push_str(&expand_expression(expression, vars));
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// True when `href` contains at least one expression
pub fn is_template(href: &str) -> bool {
    href.find('{')
        .map(|start| href[start..].contains('}'))
        .unwrap_or(false)
}

fn variable_names(varlist: &str) -> impl Iterator<Item = (&str, bool)> {
    varlist.split(',').map(|varspec| match varspec.strip_suffix('*') {
        Some(name) => (name, true),
        // Prefix modifiers are accepted but not applied
        None => (varspec.split(':').next().unwrap_or(varspec), false),
    })
}

fn defines_any(expression: &str, vars: &Value) -> bool {
    let (_, varlist) = Operator::parse(expression);
    variable_names(varlist).any(|(name, _)| lookup(vars, name).is_some())
}

fn expand_expression(expression: &str, vars: &Value) -> String {
    let (op, varlist) = Operator::parse(expression);
    let mut out = String::new();
    let mut first = true;

    for (name, explode) in variable_names(varlist) {
        let Some(values) = lookup(vars, name) else {
            continue;
        };

        out.push_str(if first { op.first } else { op.sep });
        first = false;

        match values {
            Expanded::Scalar(value) => {
                if op.named {
                    out.push_str(name);
                    if value.is_empty() {
                        out.push_str(op.if_empty);
                        continue;
                    }
                    out.push('=');
                }
                out.push_str(&op.encode(&value));
            }
            Expanded::List(items) if explode => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| {
                        if op.named {
                            format!("{}={}", name, op.encode(item))
                        } else {
                            op.encode(item)
                        }
                    })
                    .collect();
                out.push_str(&parts.join(op.sep));
            }
            Expanded::List(items) => {
                if op.named {
                    out.push_str(name);
                    out.push('=');
                }
                let parts: Vec<String> = items.iter().map(|item| op.encode(item)).collect();
                out.push_str(&parts.join(","));
            }
        }
    }

    out
}

enum Expanded {
    Scalar(String),
    List(Vec<String>),
}

fn lookup(vars: &Value, name: &str) -> Option<Expanded> {
    match vars.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(Expanded::Scalar(s.clone())),
        Value::Number(n) => Some(Expanded::Scalar(n.to_string())),
        Value::Bool(b) => Some(Expanded::Scalar(b.to_string())),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            if items.is_empty() {
                None
            } else {
                Some(Expanded::List(items))
            }
        }
        Value::Object(_) => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Percent-encode everything except unreserved and reserved characters,
/// leaving existing `%XX` triplets untouched.
fn encode_reserved(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < value.len() {
        let c = value[i..].chars().next().unwrap_or_default();
        let is_triplet = c == '%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();

        if is_triplet || c.is_ascii_alphanumeric() || "-._~".contains(c) || RESERVED.contains(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
        i += c.len_utf8();
    }

    out
}
