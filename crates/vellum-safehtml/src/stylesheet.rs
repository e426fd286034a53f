//! The StyleSheet trusted type and the CSS rule builder.

use crate::style::Style;
use crate::Error;
use std::fmt;
use vellum_text::{OpaqueValue, Value};

/// CSS rules safe as the body of a `<style>` element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StyleSheet {
    s: String,
}

impl StyleSheet {
    pub fn from_constant(s: &'static str) -> StyleSheet {
        StyleSheet { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for StyleSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_style_sheet(s: impl Into<String>) -> StyleSheet {
    StyleSheet { s: s.into() }
}

impl OpaqueValue for StyleSheet {
    fn type_label(&self) -> &'static str {
        "safehtml.StyleSheet"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<StyleSheet> for Value {
    fn from(v: StyleSheet) -> Value {
        Value::opaque(v)
    }
}

/// Build the rule `selector{style}` after validating the selector.
///
/// The selector may contain quoted CSS strings; outside of strings the
/// characters `"`, `\`, `/`, `@` and `{` are rejected, `(`/`)` and
/// `[`/`]` must be balanced, and `<` is rejected anywhere.
pub fn css_rule(selector: &str, style: &Style) -> Result<StyleSheet, Error> {
    if selector.contains('<') {
        return Err(Error::new(format!("selector {selector:?} contains '<'")));
    }
    let mut round = 0i32;
    let mut square = 0i32;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for c in selector.chars() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '\\' | '/' | '@' | '{' => {
                return Err(Error::new(format!(
                    "selector {selector:?} contains {:?}, which is disallowed outside of CSS strings",
                    c
                )))
            }
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            _ => {}
        }
        if round < 0 || square < 0 {
            return Err(Error::new(format!(
                "selector {selector:?} contains unbalanced () or [] brackets"
            )));
        }
    }
    if let Some(quote) = in_string {
        return Err(Error::new(format!(
            "selector {selector:?} contains {:?}, which is disallowed outside of CSS strings",
            quote
        )));
    }
    if round != 0 || square != 0 {
        return Err(Error::new(format!(
            "selector {selector:?} contains unbalanced () or [] brackets"
        )));
    }
    Ok(StyleSheet {
        s: format!("{}{{{}}}", selector, style.as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::raw_style;

    #[test]
    fn css_rule_cases() {
        struct Case {
            selector: &'static str,
            style: &'static str,
            want: &'static str,
            err: &'static str,
        }
        for case in [
            Case { selector: "#id", style: "top:0;left:0;", want: "#id{top:0;left:0;}", err: "" },
            Case { selector: ".class", style: "margin-left:5px;", want: ".class{margin-left:5px;}", err: "" },
            Case {
                selector: "tag #id, .class",
                style: "color:black !important;",
                want: "tag #id, .class{color:black !important;}",
                err: "",
            },
            Case { selector: r"[title='son\'s']", style: "", want: r"[title='son\'s']{}", err: "" },
            Case { selector: "[title=\"{\"]", style: "", want: "[title=\"{\"]{}", err: "" },
            Case { selector: ":nth-child(1)", style: "", want: ":nth-child(1){}", err: "" },
            Case {
                selector: "tag{color:black;}",
                style: "",
                want: "",
                err: "contains '{', which is disallowed outside of CSS strings",
            },
            Case { selector: "]", style: "", want: "", err: "contains unbalanced () or [] brackets" },
            Case { selector: "[title", style: "", want: "", err: "contains unbalanced () or [] brackets" },
            Case { selector: "[foo)bar]", style: "", want: "", err: "contains unbalanced () or [] brackets" },
            Case { selector: "[foo[bar]", style: "", want: "", err: "contains unbalanced () or [] brackets" },
            Case { selector: "foo(bar(baz)", style: "", want: "", err: "contains unbalanced () or [] brackets" },
            Case { selector: ":nth-child(1", style: "", want: "", err: "contains unbalanced () or [] brackets" },
            Case {
                selector: "[type=\"a]",
                style: "",
                want: "",
                err: "contains '\"', which is disallowed outside of CSS strings",
            },
            Case { selector: "<", style: "", want: "", err: "contains '<'" },
            Case {
                selector: "@import \"foo\";#id",
                style: "",
                want: "",
                err: "contains '@', which is disallowed outside of CSS strings",
            },
            Case {
                selector: "/* ",
                style: "",
                want: "",
                err: "contains '/', which is disallowed outside of CSS strings",
            },
        ] {
            let style = raw_style(case.style);
            match css_rule(case.selector, &style) {
                Ok(ss) => {
                    assert!(case.err.is_empty(), "{}: expected error", case.selector);
                    assert_eq!(ss.as_str(), case.want, "selector {}", case.selector);
                }
                Err(e) => {
                    assert!(!case.err.is_empty(), "{}: unexpected error: {}", case.selector, e.message);
                    assert!(
                        e.message.contains(case.err),
                        "selector {}: error {:?} does not contain {:?}",
                        case.selector,
                        e.message,
                        case.err
                    );
                }
            }
        }
    }
}
