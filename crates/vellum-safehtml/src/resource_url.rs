//! The TrustedResourceURL trusted type and its composition helpers.

use crate::urlutil::{is_safe_trusted_resource_url_prefix, query_escape_url, url_contains_double_dot_segment};
use crate::Error;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use vellum_text::{OpaqueValue, Value};

/// A URL safe for resource-loading contexts such as `<script src>`.
///
/// Values are origin-bound or path-absolute; neither scheme nor
/// authority can be influenced at composition time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TrustedResourceURL {
    s: String,
}

impl TrustedResourceURL {
    pub fn from_constant(s: &'static str) -> TrustedResourceURL {
        TrustedResourceURL { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for TrustedResourceURL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_trusted_resource_url(s: impl Into<String>) -> TrustedResourceURL {
    TrustedResourceURL { s: s.into() }
}

impl OpaqueValue for TrustedResourceURL {
    fn type_label(&self) -> &'static str {
        "safehtml.TrustedResourceURL"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<TrustedResourceURL> for Value {
    fn from(v: TrustedResourceURL) -> Value {
        Value::opaque(v)
    }
}

static FORMAT_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"));

/// Interpolate `%{name}` placeholders in a constant format string.
///
/// The static prefix of the format must itself be a safe
/// TrustedResourceURL prefix, every valid placeholder must be supplied
/// by `args`, values are percent-encoded, and values containing a
/// double dot segment are rejected. Placeholders with invalid names are
/// left literal.
pub fn trusted_resource_url_format(
    format: &'static str,
    args: &HashMap<String, String>,
) -> Result<TrustedResourceURL, Error> {
    let prefix_end = format.find("%{").unwrap_or(format.len());
    if !is_safe_trusted_resource_url_prefix(&format[..prefix_end]) {
        return Err(Error::new(format!(
            "{format:?} is a disallowed TrustedResourceURL format string"
        )));
    }
    let mut out = String::with_capacity(format.len());
    let mut last = 0;
    for caps in FORMAT_PLACEHOLDER.captures_iter(format) {
        let whole = caps.get(0).expect("whole match");
        let name = &caps[1];
        out.push_str(&format[last..whole.start()]);
        last = whole.end();
        let value = args.get(name).ok_or_else(|| {
            Error::new(format!("expected argument named {name:?}"))
        })?;
        if url_contains_double_dot_segment(value) {
            return Err(Error::new(format!(
                "argument {name:?} with value {value:?} must not contain \"..\""
            )));
        }
        out.push_str(&query_escape_url(value));
    }
    out.push_str(&format[last..]);
    Ok(TrustedResourceURL { s: out })
}

/// Percent-encode `suffix` and append it to `base`, which must begin
/// with `//` or `https://`.
pub fn trusted_resource_url_append(
    base: &TrustedResourceURL,
    suffix: &str,
) -> Result<TrustedResourceURL, Error> {
    let url = base.as_str();
    if !(url.starts_with("//") || url.starts_with("https://")) {
        return Err(Error::new(format!(
            "cannot append to TrustedResourceURL {url:?}: prefix must be \"//\" or \"https://\""
        )));
    }
    Ok(TrustedResourceURL {
        s: format!("{}{}", url, query_escape_url(suffix)),
    })
}

/// Append query parameters, sorted by key; empty keys and values are
/// skipped. An existing query string or fragment is preserved.
pub fn trusted_resource_url_with_params(
    url: &TrustedResourceURL,
    params: &HashMap<String, String>,
) -> TrustedResourceURL {
    let mut pairs: Vec<(&String, &String)> = params
        .iter()
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect();
    if pairs.is_empty() {
        return url.clone();
    }
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", query_escape_url(k), query_escape_url(v)))
        .collect();
    let (base, fragment) = match url.as_str().split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url.as_str(), None),
    };
    let sep = if base.ends_with('?') && !base.ends_with("??") {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };
    let mut s = format!("{}{}{}", base, sep, query.join("&"));
    if let Some(f) = fragment {
        s.push('#');
        s.push_str(f);
    }
    TrustedResourceURL { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn with_params() {
        struct Case {
            url: &'static str,
            params: Vec<(&'static str, &'static str)>,
            want: &'static str,
        }
        for case in [
            Case { url: "https://example.com/", params: vec![], want: "https://example.com/" },
            Case { url: "https://example.com/", params: vec![("", "")], want: "https://example.com/" },
            Case {
                url: "https://example.com/",
                params: vec![("b", "1"), ("c", ""), ("", "d")],
                want: "https://example.com/?b=1",
            },
            Case {
                url: "https://example.com/",
                params: vec![("b", "1"), ("a", "2"), ("c", "3")],
                want: "https://example.com/?a=2&b=1&c=3",
            },
            Case { url: "https://example.com/", params: vec![("a", "&")], want: "https://example.com/?a=%26" },
            Case {
                url: "https://example.com/?a=x",
                params: vec![("b", "y")],
                want: "https://example.com/?a=x&b=y",
            },
            Case { url: "https://example.com/?", params: vec![("b", "y")], want: "https://example.com/?b=y" },
            Case { url: "https://example.com/??", params: vec![("b", "y")], want: "https://example.com/??&b=y" },
            Case {
                url: "https://example.com/?a=x#foo",
                params: vec![("b", "y")],
                want: "https://example.com/?a=x&b=y#foo",
            },
        ] {
            let base = raw_trusted_resource_url(case.url);
            let got = trusted_resource_url_with_params(&base, &map(&case.params));
            assert_eq!(got.as_str(), case.want, "url {}", case.url);
        }
    }

    #[test]
    fn format() {
        struct Case {
            desc: &'static str,
            format: &'static str,
            args: Vec<(&'static str, &'static str)>,
            want: &'static str,
            err: &'static str,
        }
        for case in [
            Case {
                desc: "single arg with reserved characters",
                format: "/path/%{path}/",
                args: vec![("path", "d%/?#=")],
                want: "/path/d%25%2f%3f%23%3d/",
                err: "",
            },
            Case {
                desc: "multiple args",
                format: "/path/%{path1}/%{path2}?n1=v1",
                args: vec![("path1", "d%/?#="), ("path2", "2")],
                want: "/path/d%25%2f%3f%23%3d/2?n1=v1",
                err: "",
            },
            Case {
                desc: "extra arg ignored",
                format: "/path/%{path1}/%{path2}?n1=v1",
                args: vec![("path1", "d%/?#="), ("path2", "2"), ("path3", "foo")],
                want: "/path/d%25%2f%3f%23%3d/2?n1=v1",
                err: "",
            },
            Case {
                desc: "missing arg",
                format: "/path/%{path1}/%{path2}?n1=v1",
                args: vec![("path2", "x")],
                want: "",
                err: r#"expected argument named "path1""#,
            },
            Case {
                desc: "invalid arg name left literal",
                format: "/path/%{path!name}/",
                args: vec![("path", "x")],
                want: "/path/%{path!name}/",
                err: "",
            },
            Case {
                desc: "path ambiguity percent-encoded",
                format: "/%{path}/",
                args: vec![("path", "/example.com/")],
                want: "/%2fexample.com%2f/",
                err: "",
            },
            Case {
                desc: "unsafe format string",
                format: "javascript:%{data}",
                args: vec![("data", "alert(1)")],
                want: "",
                err: r#""javascript:%{data}" is a disallowed TrustedResourceURL format string"#,
            },
            Case {
                desc: "authority substitution",
                format: "https://%{authority}/%{path}",
                args: vec![("authority", "example.com"), ("path", "foo")],
                want: "",
                err: r#""https://%{authority}/%{path}" is a disallowed TrustedResourceURL format string"#,
            },
            Case {
                desc: "double dot segment disallowed",
                format: "/path/%{doubleDot}/%{path}?n1=v1",
                args: vec![("doubleDot", ".."), ("path", "foo")],
                want: "",
                err: r#"argument "doubleDot" with value ".." must not contain "..""#,
            },
        ] {
            match trusted_resource_url_format(case.format, &map(&case.args)) {
                Ok(got) => {
                    assert!(case.err.is_empty(), "{}: expected error, got {}", case.desc, got);
                    assert_eq!(got.as_str(), case.want, "{}", case.desc);
                }
                Err(e) => {
                    assert!(!case.err.is_empty(), "{}: unexpected error {}", case.desc, e.message);
                    assert_eq!(e.message, case.err, "{}", case.desc);
                }
            }
        }
    }

    #[test]
    fn append() {
        struct Case {
            base: &'static str,
            suffix: &'static str,
            want: &'static str,
            err: bool,
        }
        for case in [
            Case { base: "//base.url/", suffix: "", want: "//base.url/", err: false },
            Case { base: "//base.url/", suffix: "12-34-56-abc", want: "//base.url/12-34-56-abc", err: false },
            Case { base: "//base.url/", suffix: "sub/path/1", want: "//base.url/sub%2fpath%2f1", err: false },
            Case {
                base: "//base.url/",
                suffix: "sub/path/1?a=1&b=2",
                want: "//base.url/sub%2fpath%2f1%3fa%3d1%26b%3d2",
                err: false,
            },
            Case { base: "//base.url/", suffix: "-_.*", want: "//base.url/-_.%2a", err: false },
            Case { base: "//base.url/", suffix: "*", want: "//base.url/%2a", err: false },
            Case { base: "http://not.good", suffix: "foo", want: "", err: true },
            Case { base: "not.good", suffix: "foo", want: "", err: true },
        ] {
            let base = raw_trusted_resource_url(case.base);
            match trusted_resource_url_append(&base, case.suffix) {
                Ok(got) => {
                    assert!(!case.err, "{}: expected error", case.base);
                    assert_eq!(got.as_str(), case.want);
                }
                Err(_) => assert!(case.err, "{}: unexpected error", case.base),
            }
        }
    }
}
