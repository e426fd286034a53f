//! The Style trusted type and the property-based builder.

use crate::url::url_sanitized;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use vellum_text::{OpaqueValue, Value};

/// Sentinel substituted for CSS property values that fail validation.
pub const INVALID_PROPERTY_VALUE: &str = "zGoSafezInvalidPropertyValue";

/// A CSS declaration list safe as the value of a `style` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Style {
    s: String,
}

impl Style {
    /// Wrap a compile-time constant declaration list.
    ///
    /// Aborts unless the constant ends with `;`, contains at least one
    /// `:`, and contains no angle brackets. These checks catch obvious
    /// misuse, not arbitrary invalid CSS.
    pub fn from_constant(s: &'static str) -> Style {
        if s.contains('<') || s.contains('>') {
            panic!("style string {s:?} contains angle brackets");
        }
        if !s.ends_with(';') {
            panic!("style string {s:?} must end with ';'");
        }
        if !s.contains(':') {
            panic!("style string {s:?} must contain at least one ':' to specify a property-value pair");
        }
        Style { s: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.s
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.s)
    }
}

pub(crate) fn raw_style(s: impl Into<String>) -> Style {
    Style { s: s.into() }
}

impl OpaqueValue for Style {
    fn type_label(&self) -> &'static str {
        "safehtml.Style"
    }
    fn display_string(&self) -> String {
        self.s.clone()
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl From<Style> for Value {
    fn from(v: Style) -> Value {
        Value::opaque(v)
    }
}

/// Recognized properties for [`style_from_properties`]. Unset fields
/// (empty strings, empty vectors) are omitted from the result.
#[derive(Debug, Clone, Default)]
pub struct StyleProperties {
    pub background_image_urls: Vec<String>,
    pub font_family: Vec<String>,
    pub display: String,
    pub background_color: String,
    pub background_position: String,
    pub background_repeat: String,
    pub background_size: String,
    pub color: String,
    pub height: String,
    pub width: String,
    pub left: String,
    pub right: String,
    pub top: String,
    pub bottom: String,
    pub font_weight: String,
    pub padding: String,
    pub z_index: String,
}

static REGULAR_VALUE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[*+/\-.!#%_ \t0-9a-zA-Z]+$").expect("static pattern"));

const DISPLAY_VALUES: &[&str] = &[
    "block",
    "flex",
    "grid",
    "inline",
    "inline-block",
    "inline-flex",
    "inline-grid",
    "list-item",
    "none",
    "table",
    "table-cell",
    "table-row",
];

/// Build a Style from individually sanitized properties.
///
/// Emission order is fixed: background image URLs, font family, then the
/// remaining properties in declaration order of [`StyleProperties`].
pub fn style_from_properties(props: StyleProperties) -> Style {
    let mut out = String::new();
    if !props.background_image_urls.is_empty() {
        let urls: Vec<String> = props
            .background_image_urls
            .iter()
            .map(|u| format!("url(\"{}\")", css_escape_string(url_sanitized(u).as_str())))
            .collect();
        out.push_str(&format!("background-image:{};", urls.join(", ")));
    }
    if !props.font_family.is_empty() {
        let names: Vec<String> = props.font_family.iter().map(|n| font_family_name(n)).collect();
        out.push_str(&format!("font-family:{};", names.join(", ")));
    }
    let mut put = |name: &str, value: &str, enum_values: Option<&[&str]>| {
        if value.is_empty() {
            return;
        }
        let safe = match enum_values {
            Some(allowed) => {
                if allowed.contains(&value) {
                    value.to_string()
                } else {
                    INVALID_PROPERTY_VALUE.to_string()
                }
            }
            None => regular_property_value(value),
        };
        out.push_str(&format!("{name}:{safe};"));
    };
    put("display", &props.display, Some(DISPLAY_VALUES));
    put("background-color", &props.background_color, None);
    put("background-position", &props.background_position, None);
    put("background-repeat", &props.background_repeat, None);
    put("background-size", &props.background_size, None);
    put("color", &props.color, None);
    put("height", &props.height, None);
    put("width", &props.width, None);
    put("left", &props.left, None);
    put("right", &props.right, None);
    put("top", &props.top, None);
    put("bottom", &props.bottom, None);
    put("font-weight", &props.font_weight, None);
    put("padding", &props.padding, None);
    put("z-index", &props.z_index, None);
    Style { s: out }
}

fn regular_property_value(value: &str) -> String {
    if value.contains("//") || value.contains("/*") || value.contains("*/") {
        return INVALID_PROPERTY_VALUE.to_string();
    }
    if !REGULAR_VALUE_PATTERN.is_match(value) {
        return INVALID_PROPERTY_VALUE.to_string();
    }
    value.to_string()
}

static SAFE_UNQUOTED_FONT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z-]+$").expect("static pattern"));

fn font_family_name(name: &str) -> String {
    // A name already wrapped in double quotes is re-escaped and re-quoted.
    if name.len() > 2 && name.starts_with('"') && name.ends_with('"') {
        return format!("\"{}\"", css_escape_string(&name[1..name.len() - 1]));
    }
    if SAFE_UNQUOTED_FONT_NAME.is_match(name) {
        return name.to_string();
    }
    format!("\"{}\"", css_escape_string(name))
}

/// Escape a string for inclusion in a CSS `<string-token>`.
///
/// NUL becomes U+FFFD; quotes, backslashes, `<`, ASCII and C1 controls
/// and the unicode line separators are hex-escaped as six digits.
pub fn css_escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let n = c as u32;
        match c {
            '\u{0}' => out.push('\u{FFFD}'),
            '"' | '\\' | '<' => out.push_str(&format!("\\{n:06X}")),
            '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\{n:06X}")),
            _ if n < 0x20 || (0x7F..=0x9F).contains(&n) => out.push_str(&format!("\\{n:06X}")),
            _ => out.push(c),
        }
    }
    out
}
