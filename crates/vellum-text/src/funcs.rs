//! Function registry and builtin functions.
//!
//! Functions receive evaluated arguments (with the piped value, if any,
//! appended last) and return a value or a message describing the failure.

use crate::value::Value;
use std::collections::HashMap;

/// Failure raised by a template function.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncError {
    pub message: String,
}

impl FuncError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl std::fmt::Display for FuncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

pub type TemplateFn = fn(&[Value]) -> Result<Value, FuncError>;

/// Named function table.
#[derive(Debug, Clone, Default)]
pub struct Funcs {
    map: HashMap<String, TemplateFn>,
}

impl Funcs {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table preloaded with the builtin functions.
    pub fn builtin() -> Self {
        let mut map: HashMap<String, TemplateFn> = HashMap::new();
        map.insert("html".into(), fn_html as TemplateFn);
        map.insert("urlquery".into(), fn_urlquery as TemplateFn);
        map.insert("print".into(), fn_print as TemplateFn);
        map.insert("printf".into(), fn_printf as TemplateFn);
        map.insert("println".into(), fn_println as TemplateFn);
        map.insert("len".into(), fn_len as TemplateFn);
        map.insert("index".into(), fn_index as TemplateFn);
        map.insert("not".into(), fn_not as TemplateFn);
        map.insert("and".into(), fn_and as TemplateFn);
        map.insert("or".into(), fn_or as TemplateFn);
        map.insert("eq".into(), fn_eq as TemplateFn);
        map.insert("ne".into(), fn_ne as TemplateFn);
        Self { map }
    }

    pub fn register(&mut self, name: impl Into<String>, func: TemplateFn) -> Option<TemplateFn> {
        self.map.insert(name.into(), func)
    }

    pub fn get(&self, name: &str) -> Option<TemplateFn> {
        self.map.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(|k| k.as_str())
    }
}

/// Concatenation with a space between operands when neither is a string.
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    let mut prev_str = true;
    for (i, v) in args.iter().enumerate() {
        let is_str = matches!(v, Value::Str(_));
        if i > 0 && !prev_str && !is_str {
            out.push(' ');
        }
        out.push_str(&v.display_string());
        prev_str = is_str;
    }
    out
}

fn fn_print(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(sprint(args)))
}

fn fn_println(args: &[Value]) -> Result<Value, FuncError> {
    let mut out = args
        .iter()
        .map(Value::display_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    Ok(Value::from(out))
}

fn fn_printf(args: &[Value]) -> Result<Value, FuncError> {
    let format = args
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| FuncError::new("printf: format must be a string"))?;
    let mut out = String::new();
    let mut operands = args[1..].iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('v') | Some('s') => {
                let v = operands.next().ok_or_else(|| FuncError::new("printf: missing operand"))?;
                out.push_str(&v.display_string());
            }
            Some('d') => {
                let v = operands.next().ok_or_else(|| FuncError::new("printf: missing operand"))?;
                match v {
                    Value::Int(n) => out.push_str(&n.to_string()),
                    Value::Float(f) => out.push_str(&(*f as i64).to_string()),
                    _ => return Err(FuncError::new("printf: %d requires a number")),
                }
            }
            Some('q') => {
                let v = operands.next().ok_or_else(|| FuncError::new("printf: missing operand"))?;
                out.push_str(&format!("{:?}", v.display_string()));
            }
            Some(other) => return Err(FuncError::new(format!("printf: unsupported verb %{other}"))),
            None => return Err(FuncError::new("printf: trailing %")),
        }
    }
    Ok(Value::from(out))
}

/// The predefined `html` escaper: print semantics, then escape.
fn fn_html(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(escape_html(&sprint(args))))
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The predefined `urlquery` escaper. Uppercase percent escapes and `+`
/// for space, the classic form-encoding shape.
fn fn_urlquery(args: &[Value]) -> Result<Value, FuncError> {
    let s = sprint(args);
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    Ok(Value::from(out))
}

fn fn_len(args: &[Value]) -> Result<Value, FuncError> {
    let v = args.first().ok_or_else(|| FuncError::new("len: missing argument"))?;
    let n = match v {
        Value::Str(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        _ => return Err(FuncError::new("len of unsupported type")),
    };
    Ok(Value::Int(n as i64))
}

fn fn_index(args: &[Value]) -> Result<Value, FuncError> {
    let mut v = args
        .first()
        .cloned()
        .ok_or_else(|| FuncError::new("index: missing collection"))?;
    for key in &args[1..] {
        v = match (&v, key) {
            (Value::Array(a), Value::Int(i)) =>

                a.get(*i as usize).cloned().unwrap_or(Value::Null),
            (Value::Object(o), Value::Str(k)) => o.get(k.as_ref()).cloned().unwrap_or(Value::Null),
            _ => return Err(FuncError::new("index of unsupported type")),
        };
    }
    Ok(v)
}

fn fn_not(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::Bool(!args.first().map(Value::is_truthy).unwrap_or(false)))
}

fn fn_and(args: &[Value]) -> Result<Value, FuncError> {
    let mut last = Value::Bool(false);
    for v in args {
        if !v.is_truthy() {
            return Ok(v.clone());
        }
        last = v.clone();
    }
    Ok(last)
}

fn fn_or(args: &[Value]) -> Result<Value, FuncError> {
    let mut last = Value::Bool(false);
    for v in args {
        if v.is_truthy() {
            return Ok(v.clone());
        }
        last = v.clone();
    }
    Ok(last)
}

fn fn_eq(args: &[Value]) -> Result<Value, FuncError> {
    let first = args.first().ok_or_else(|| FuncError::new("eq: missing argument"))?;
    Ok(Value::Bool(args[1..].iter().any(|v| v == first)))
}

fn fn_ne(args: &[Value]) -> Result<Value, FuncError> {
    match fn_eq(args)? {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        _ => Ok(Value::Bool(false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escapes_the_five_significant_chars() {
        let got = fn_html(&[Value::from(r#"<>'"&"#)]).expect("html");
        assert_eq!(got.as_str(), Some("&lt;&gt;&#39;&#34;&amp;"));
    }

    #[test]
    fn urlquery_uses_uppercase_hex() {
        let got = fn_urlquery(&[Value::from("b&c=d ")]).expect("urlquery");
        assert_eq!(got.as_str(), Some("b%26c%3Dd+"));
    }

    #[test]
    fn sprint_spacing_rule() {
        assert_eq!(sprint(&[Value::Int(1), Value::Int(2)]), "1 2");
        assert_eq!(sprint(&[Value::from("a"), Value::Int(2)]), "a2");
    }

    #[test]
    fn index_walks_collections() {
        let data = Value::from(serde_json::json!({"a": [10, 20]}));
        let got = fn_index(&[data, Value::from("a"), Value::Int(1)]).expect("index");
        assert_eq!(got, Value::Int(20));
    }

    #[test]
    fn and_or_return_operands() {
        assert_eq!(fn_and(&[Value::Int(1), Value::from("x")]).unwrap(), Value::from("x"));
        assert_eq!(fn_or(&[Value::Int(0), Value::from("x")]).unwrap(), Value::from("x"));
    }
}
