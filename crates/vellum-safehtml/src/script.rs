//! The Script trusted type.

use crate::Error;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use vellum_text::{OpaqueValue, Value};

/// JavaScript source known to be safe as the body of a `<script>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Script {
    s: String,
}

impl Script {
    pub fn from_constant(s: &'static str) -> Script {
        Script { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_script(s: impl Into<String>) -> Script {
    Script { s: s.into() }
}

impl OpaqueValue for Script {
    fn type_label(&self) -> &'static str {
        "safehtml.Script"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<Script> for Value {
    fn from(v: Script) -> Value {
        Value::opaque(v)
    }
}

/// ASCII-only JavaScript identifiers. Escape sequences and the
/// zero-width (non-)joiners that the language grammar would otherwise
/// admit are deliberately excluded.
pub static JS_IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z_$0-9]*$").expect("static pattern"));

/// Build a script of the form `var <name> = <json>;\n<script>`.
///
/// `data` is JSON-encoded; `<`, `>` and `&` in the encoding are replaced
/// with unicode escapes so the result can never close a script element.
pub fn script_from_data_and_constant<T: Serialize>(
    name: &'static str,
    data: &T,
    script: &'static str,
) -> Result<Script, Error> {
    if !JS_IDENTIFIER_PATTERN.is_match(name) {
        return Err(Error::new(format!(
            "variable name {name:?} is an invalid Javascript identifier"
        )));
    }
    let json = serde_json::to_string(data).map_err(|e| Error::new(format!("json: {e}")))?;
    let mut encoded = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => encoded.push_str("\\u003c"),
            '>' => encoded.push_str("\\u003e"),
            '&' => encoded.push_str("\\u0026"),
            _ => encoded.push(c),
        }
    }
    Ok(Script {
        s: format!("var {name} = {encoded};\n{script}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestStruct {
        #[serde(rename = "ID")]
        id: i32,
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Data")]
        data: Vec<String>,
    }

    #[test]
    fn string_data_with_html_special_characters() {
        let s = script_from_data_and_constant("myVar", &"</script>", "alert(myVar);").expect("script");
        assert_eq!(s.as_str(), "var myVar = \"\\u003c/script\\u003e\";\nalert(myVar);");
    }

    #[test]
    fn struct_data() {
        let data = TestStruct {
            id: 3,
            name: "Animals".into(),
            data: vec!["Cats".into(), "Dogs".into(), "Hamsters".into()],
        };
        let s = script_from_data_and_constant("myVar", &data, "alert(myVar);").expect("script");
        assert_eq!(
            s.as_str(),
            "var myVar = {\"ID\":3,\"Name\":\"Animals\",\"Data\":[\"Cats\",\"Dogs\",\"Hamsters\"]};\nalert(myVar);"
        );
    }

    #[test]
    fn multi_line_script() {
        let s = script_from_data_and_constant("myVar", &"<foo>", "alert(myVar);\nalert(\"hello world!\");")
            .expect("script");
        assert_eq!(
            s.as_str(),
            "var myVar = \"\\u003cfoo\\u003e\";\nalert(myVar);\nalert(\"hello world!\");"
        );
    }

    #[test]
    fn invalid_variable_names() {
        for name in ["", "café"] {
            // A non-static name cannot be passed here, so use the two
            // literals directly.
            let err = match name {
                "" => script_from_data_and_constant("", &"<foo>", "alert(1);"),
                _ => script_from_data_and_constant("café", &"<foo>", "alert(1);"),
            }
            .expect_err("should fail");
            assert!(
                err.message.contains("is an invalid Javascript identifier"),
                "{}",
                err.message
            );
        }
    }

    #[test]
    fn js_identifier_pattern() {
        for (input, want) in [
            ("foo", true),
            ("Foo", true),
            ("f0o", true),
            ("_f0o", true),
            ("$f0o", true),
            ("f0$_o", true),
            ("_f0$_o", true),
            ("2foo", false),
            ("café", false),
            ("Χαίρετε", false),
            ("你好", false),
            (r"\u0192oo", false),
            (r"f\u006Fo", false),
            ("dea\u{200C}ly", false),
            ("क्\u{200D}", false),
        ] {
            assert_eq!(JS_IDENTIFIER_PATTERN.is_match(input), want, "input: {input:?}");
        }
    }
}
