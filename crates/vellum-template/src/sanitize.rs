//! The sanitizer table and the runtime sanitizers.
//!
//! The tables here are the single authoritative mapping from a
//! sanitization context to the pipeline commands that enforce it. The
//! runtime functions are registered under `_`-prefixed names, reachable
//! only from rewritten pipelines.

use crate::context::Name;
use regex::Regex;
use std::sync::LazyLock;
use vellum_safehtml::{
    html_escaped, is_safe_url, urlutil, Identifier, Script, Style, StyleSheet, TrustedResourceURL,
    INVALID_URL, URL,
};
use vellum_text::{FuncError, Funcs, Value};

/// Elements whose bodies are not parsed as HTML.
pub const SPECIAL_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Void elements: no content, the tracker leaves element content state.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content and attributes may carry sanitized actions.
/// Anything absent here rejects actions outright.
const ALLOWED_ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "bdi", "bdo", "blockquote",
    "body", "br", "button", "canvas", "caption", "cite", "code", "col", "colgroup", "data",
    "datalist", "dd", "del", "details", "dfn", "dialog", "div", "dl", "dt", "em", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header",
    "hgroup", "hr", "html", "i", "iframe", "img", "input", "ins", "kbd", "label", "legend", "li",
    "link", "main", "map", "mark", "menu", "meter", "nav", "ol", "optgroup", "option", "output",
    "p", "picture", "pre", "progress", "q", "rp", "rt", "ruby", "s", "samp", "script", "section",
    "select", "slot", "small", "source", "span", "strong", "style", "sub", "summary", "sup",
    "table", "tbody", "td", "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track",
    "u", "ul", "var", "video", "wbr",
];

/// Attributes whose untrusted values only need HTML escaping.
const PLAIN_ATTRS: &[&str] = &[
    "abbr", "accept", "accept-charset", "accesskey", "align", "alt", "autofocus", "autoplay",
    "bgcolor", "border", "cellpadding", "cellspacing", "checked", "class", "color", "cols",
    "colspan", "controls", "coords", "datetime", "default", "disabled", "download", "draggable",
    "enctype", "face", "height", "hidden", "high", "hreflang", "ismap", "label", "lang", "loop",
    "low", "max", "maxlength", "media", "method", "min", "minlength", "multiple", "muted",
    "nowrap", "open", "optimum", "pattern", "placeholder", "preload", "readonly", "rel",
    "required", "reversed", "rows", "rowspan", "selected", "shape", "size", "sizes", "span",
    "spellcheck", "start", "step", "summary", "tabindex", "title", "type", "value", "width",
    "wrap",
];

/// Attributes holding document-unique identifiers.
const IDENTIFIER_ATTRS: &[&str] = &["id", "name", "for", "form", "list", "headers"];

/// `link rel` tokens under which `href` may hold a navigational URL
/// instead of a TrustedResourceURL.
const LINK_URL_RELS: &[&str] = &[
    "alternate", "author", "bookmark", "canonical", "cite", "dns-prefetch", "help", "license",
    "next", "prev", "search", "tag",
];

/// `link rel` tokens under which no attribute accepts actions at all.
const LINK_UNSAFE_RELS: &[&str] = &["import", "serviceworker"];

/// Script MIME types executed as JavaScript. Absence of a type
/// attribute also means JavaScript.
const JS_MIME_TYPES: &[&str] = &[
    "application/ecmascript",
    "application/javascript",
    "application/x-ecmascript",
    "application/x-javascript",
    "module",
    "text/ecmascript",
    "text/javascript",
];

pub static DATA_ATTRIBUTE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data-[A-Za-z_][A-Za-z0-9_-]*$").expect("static pattern"));

/// Sanitization context of element content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Script,
    StyleSheet,
    Rcdata,
}

impl ContentKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ContentKind::Html => "HTML",
            ContentKind::Script => "Script",
            ContentKind::StyleSheet => "StyleSheet",
            ContentKind::Rcdata => "RCDATA",
        }
    }

    pub fn chain(&self) -> &'static [&'static str] {
        match self {
            ContentKind::Html => &["_sanitizeHTML"],
            ContentKind::Script => &["_sanitizeScript"],
            ContentKind::StyleSheet => &["_sanitizeStyleSheet"],
            ContentKind::Rcdata => &["_sanitizeRCDATA"],
        }
    }
}

/// Sanitization context of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    /// Plain string value, HTML-escaped.
    Plain,
    Identifier,
    Style,
    Srcdoc,
    Url,
    ResourceUrl,
    ResourceUrlOrUrl,
    Enum(EnumGroup),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumGroup {
    Target,
    Dir,
    Translate,
    Autocomplete,
    InputType,
    ButtonType,
}

impl EnumGroup {
    pub fn values(&self) -> &'static [&'static str] {
        match self {
            EnumGroup::Target => &["_blank", "_self"],
            EnumGroup::Dir => &["ltr", "rtl", "auto"],
            EnumGroup::Translate => &["yes", "no"],
            EnumGroup::Autocomplete => &["on", "off"],
            EnumGroup::InputType => &[
                "button", "checkbox", "color", "date", "datetime-local", "email", "hidden",
                "month", "number", "password", "radio", "range", "reset", "search", "submit",
                "tel", "text", "time", "url", "week",
            ],
            EnumGroup::ButtonType => &["button", "reset", "submit"],
        }
    }

    pub fn sanitizer(&self) -> &'static str {
        match self {
            EnumGroup::Target => "_sanitizeTargetEnum",
            EnumGroup::Dir => "_sanitizeDirEnum",
            EnumGroup::Translate => "_sanitizeTranslateEnum",
            EnumGroup::Autocomplete => "_sanitizeAutocompleteEnum",
            EnumGroup::InputType => "_sanitizeInputTypeEnum",
            EnumGroup::ButtonType => "_sanitizeButtonTypeEnum",
        }
    }
}

impl AttrKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            AttrKind::Plain => "None",
            AttrKind::Identifier => "Identifier",
            AttrKind::Style => "Style",
            AttrKind::Srcdoc => "HTML",
            AttrKind::Url => "URL",
            AttrKind::ResourceUrl => "TrustedResourceURL",
            AttrKind::ResourceUrlOrUrl => "TrustedResourceURLOrURL",
            AttrKind::Enum(g) => match g {
                EnumGroup::Target => "TargetEnum",
                EnumGroup::Dir => "DirEnum",
                EnumGroup::Translate => "TranslateEnum",
                EnumGroup::Autocomplete => "AutocompleteEnum",
                EnumGroup::InputType => "InputTypeEnum",
                EnumGroup::ButtonType => "ButtonTypeEnum",
            },
        }
    }
}

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub fn is_special_element(name: &str) -> bool {
    SPECIAL_ELEMENTS.contains(&name)
}

fn is_js_script_type(script_type: &Option<String>) -> bool {
    match script_type {
        None => true,
        Some(t) => JS_MIME_TYPES.contains(&t.as_str()),
    }
}

/// Sanitization context for the content of `element`.
pub fn content_kind(element: Option<&str>, script_type: &Option<String>) -> Result<ContentKind, String> {
    let name = match element {
        None => return Ok(ContentKind::Html),
        Some(n) => n,
    };
    match name {
        "script" => {
            if is_js_script_type(script_type) {
                Ok(ContentKind::Script)
            } else {
                Err(disallowed_content(name))
            }
        }
        "style" => Ok(ContentKind::StyleSheet),
        "textarea" | "title" => Ok(ContentKind::Rcdata),
        _ if ALLOWED_ELEMENTS.contains(&name) => Ok(ContentKind::Html),
        _ => Err(disallowed_content(name)),
    }
}

fn disallowed_content(element: &str) -> String {
    format!("actions must not occur in the element content context of a {element:?} element")
}

fn disallowed_attr(element: Option<&str>, attr: &str) -> String {
    format!(
        "actions must not occur in the {:?} attribute value context of a {:?} element",
        attr,
        element.unwrap_or("")
    )
}

/// Sanitization context for the value of `attr` on `element`.
pub fn attr_kind(
    element: Option<&str>,
    attr: &str,
    link_rel: Option<&str>,
    link_rel_dynamic: bool,
) -> Result<AttrKind, String> {
    if let Some(name) = element {
        if !ALLOWED_ELEMENTS.contains(&name) {
            return Err(disallowed_attr(element, attr));
        }
        if name == "link" {
            if let Some(rel) = link_rel {
                if rel.split_whitespace().any(|t| LINK_UNSAFE_RELS.contains(&t)) {
                    return Err(disallowed_attr(element, attr));
                }
            }
        }
    }
    // Element-specific contexts take precedence over the global table.
    if let Some(name) = element {
        match (name, attr) {
            ("a", "href") | ("area", "href") => return Ok(AttrKind::ResourceUrlOrUrl),
            ("img", "src") | ("audio", "src") | ("video", "src") | ("source", "src")
            | ("input", "src") => return Ok(AttrKind::ResourceUrlOrUrl),
            ("script", "src") | ("iframe", "src") | ("track", "src") => {
                return Ok(AttrKind::ResourceUrl)
            }
            ("link", "href") => {
                let url_ok = !link_rel_dynamic
                    && link_rel
                        .map(|rel| {
                            let mut tokens = rel.split_whitespace().peekable();
                            tokens.peek().is_some()
                                && rel.split_whitespace().all(|t| LINK_URL_RELS.contains(&t))
                        })
                        .unwrap_or(false);
                return Ok(if url_ok {
                    AttrKind::ResourceUrlOrUrl
                } else {
                    AttrKind::ResourceUrl
                });
            }
            ("video", "poster") => return Ok(AttrKind::Url),
            ("form", "action") | ("input", "formaction") | ("button", "formaction") => {
                return Ok(AttrKind::Url)
            }
            ("blockquote", "cite") | ("q", "cite") | ("del", "cite") | ("ins", "cite") => {
                return Ok(AttrKind::Url)
            }
            ("body", "background") => return Ok(AttrKind::Url),
            ("html", "manifest") => return Ok(AttrKind::ResourceUrl),
            ("iframe", "srcdoc") => return Ok(AttrKind::Srcdoc),
            ("input", "type") => return Ok(AttrKind::Enum(EnumGroup::InputType)),
            ("button", "type") => return Ok(AttrKind::Enum(EnumGroup::ButtonType)),
            ("form", "autocomplete") | ("input", "autocomplete") => {
                return Ok(AttrKind::Enum(EnumGroup::Autocomplete))
            }
            _ => {}
        }
    }
    if IDENTIFIER_ATTRS.contains(&attr) {
        return Ok(AttrKind::Identifier);
    }
    match attr {
        "style" => return Ok(AttrKind::Style),
        "target" => return Ok(AttrKind::Enum(EnumGroup::Target)),
        "dir" => return Ok(AttrKind::Enum(EnumGroup::Dir)),
        "translate" => return Ok(AttrKind::Enum(EnumGroup::Translate)),
        _ => {}
    }
    if PLAIN_ATTRS.contains(&attr) {
        return Ok(AttrKind::Plain);
    }
    if attr.starts_with("data-") {
        if DATA_ATTRIBUTE_NAME_PATTERN.is_match(attr) {
            return Ok(AttrKind::Plain);
        }
        return Err(disallowed_attr(element, attr));
    }
    Err(disallowed_attr(element, attr))
}

/// Resolve the content kind of a possibly conditional element name,
/// producing the branch-mismatch diagnostics when candidates disagree.
pub fn resolve_content_kind(
    element: &Name,
    script_type: &Option<String>,
) -> Result<ContentKind, String> {
    let candidates = element.candidates();
    let first = content_kind(candidates[0], script_type);
    for cand in &candidates[1..] {
        let other = content_kind(*cand, script_type);
        match (&first, &other) {
            (Ok(a), Ok(b)) if a == b => {}
            (Ok(a), Ok(b)) => {
                return Err(format!(
                    "conditional branches end in different element content sanitization contexts: \
                     element {:?} has sanitization context {:?}, element {:?} has sanitization context {:?}",
                    candidates[0].unwrap_or(""),
                    a.display_name(),
                    cand.unwrap_or(""),
                    b.display_name()
                ))
            }
            (Err(e), _) => {
                return Err(branch_error_element(candidates[0].unwrap_or(""), e));
            }
            (_, Err(e)) => {
                return Err(branch_error_element(cand.unwrap_or(""), e));
            }
        }
    }
    match first {
        Ok(k) => Ok(k),
        Err(e) => {
            if candidates.len() > 1 {
                Err(branch_error_element(candidates[0].unwrap_or(""), &e))
            } else {
                Err(e)
            }
        }
    }
}

pub fn branch_error_element(element: &str, inner: &str) -> String {
    format!("conditional branch with element {element:?} results in sanitization error: {inner}")
}

pub fn branch_error_attr(element: &str, attr: &str, inner: &str) -> String {
    format!(
        "conditional branch with {{element={element:?}, attribute={attr:?}}} results in sanitization error: {inner}"
    )
}

/// Resolve the attribute kind across conditional element and attribute
/// candidates.
pub fn resolve_attr_kind(
    element: &Name,
    attr: &Name,
    link_rel: Option<&str>,
    link_rel_dynamic: bool,
    conditional: bool,
) -> Result<AttrKind, String> {
    let elements = element.candidates();
    let attrs = attr.candidates();
    let conditional = conditional || elements.len() > 1 || attrs.len() > 1;
    let mut first: Option<(Option<&str>, &str, AttrKind)> = None;
    for e in &elements {
        for a in &attrs {
            let a = match a {
                Some(a) => *a,
                None => return Err(disallowed_attr(*e, "")),
            };
            match attr_kind(*e, a, link_rel, link_rel_dynamic) {
                Ok(kind) => match &first {
                    None => first = Some((*e, a, kind)),
                    Some((e0, a0, k0)) => {
                        if *k0 != kind {
                            return Err(format!(
                                "conditional branches end in different attribute value sanitization contexts: \
                                 {{element={:?}, attribute={:?}}} has sanitization context {:?}, \
                                 {{element={:?}, attribute={:?}}} has sanitization context {:?}",
                                e0.unwrap_or(""),
                                a0,
                                k0.display_name(),
                                e.unwrap_or(""),
                                a,
                                kind.display_name()
                            ));
                        }
                    }
                },
                Err(inner) => {
                    if conditional {
                        return Err(branch_error_attr(e.unwrap_or(""), a, &inner));
                    }
                    return Err(inner);
                }
            }
        }
    }
    match first {
        Some((_, _, kind)) => Ok(kind),
        None => Err(disallowed_attr(None, "")),
    }
}

// ---------------------------------------------------------------------------
// Runtime sanitizers.

fn downcast<T: 'static>(v: &Value) -> Option<&T> {
    match v {
        Value::Opaque(o) => o.as_any().downcast_ref::<T>(),
        _ => None,
    }
}

fn arg(args: &[Value]) -> Value {
    args.last().cloned().unwrap_or(Value::Null)
}

fn escape(s: &str) -> String {
    html_escaped(s).as_str().to_string()
}

fn sanitize_html(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    if let Some(h) = downcast::<vellum_safehtml::HTML>(&v) {
        return Ok(Value::from(h.as_str()));
    }
    Ok(Value::from(escape(&v.display_string())))
}

fn escape_html_attr(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(escape(&arg(args).display_string())))
}

fn sanitize_rcdata(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(escape(&arg(args).display_string())))
}

fn sanitize_script(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    match downcast::<Script>(&v) {
        Some(s) => Ok(Value::from(s.as_str())),
        None => Err(FuncError::new("expected a safehtml.Script value")),
    }
}

fn sanitize_style_sheet(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    match downcast::<StyleSheet>(&v) {
        Some(s) => Ok(Value::from(s.as_str())),
        None => Err(FuncError::new("expected a safehtml.StyleSheet value")),
    }
}

fn sanitize_style(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    match downcast::<Style>(&v) {
        Some(s) => Ok(Value::from(s.as_str())),
        None => Err(FuncError::new("expected a safehtml.Style value")),
    }
}

fn sanitize_identifier(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    match downcast::<Identifier>(&v) {
        Some(s) => Ok(Value::from(s.as_str())),
        None => Err(FuncError::new("expected a safehtml.Identifier value")),
    }
}

fn sanitize_srcdoc(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    match downcast::<vellum_safehtml::HTML>(&v) {
        Some(h) => Ok(Value::from(escape(h.as_str()))),
        None => Err(FuncError::new("expected a safehtml.HTML value")),
    }
}

fn sanitize_url(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    if let Some(u) = downcast::<URL>(&v) {
        return Ok(Value::from(urlutil::normalize_url(u.as_str())));
    }
    if let Some(u) = downcast::<TrustedResourceURL>(&v) {
        return Ok(Value::from(urlutil::normalize_url(u.as_str())));
    }
    let s = v.display_string();
    if is_safe_url(&s) {
        Ok(Value::from(urlutil::normalize_url(&s)))
    } else {
        Ok(Value::from(INVALID_URL))
    }
}

fn sanitize_trusted_resource_url(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    match downcast::<TrustedResourceURL>(&v) {
        Some(u) => Ok(Value::from(u.as_str())),
        None => Err(FuncError::new("expected a safehtml.TrustedResourceURL value")),
    }
}

fn sanitize_trusted_resource_url_or_url(args: &[Value]) -> Result<Value, FuncError> {
    let v = arg(args);
    if let Some(u) = downcast::<TrustedResourceURL>(&v) {
        return Ok(Value::from(urlutil::normalize_url(u.as_str())));
    }
    sanitize_url(args)
}

fn sanitize_trusted_resource_url_suffix(args: &[Value]) -> Result<Value, FuncError> {
    let s = arg(args).display_string();
    if urlutil::url_contains_double_dot_segment(&s) {
        return Err(FuncError::new(format!(
            "cannot substitute {s:?} after TrustedResourceURL prefix: \"..\" is disallowed"
        )));
    }
    Ok(Value::from(urlutil::query_escape_url(&s)))
}

fn normalize_url_fn(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(urlutil::normalize_url(&arg(args).display_string())))
}

fn query_escape_url_fn(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(urlutil::query_escape_url(&arg(args).display_string())))
}

fn enum_check(args: &[Value], group: EnumGroup) -> Result<Value, FuncError> {
    let s = arg(args).display_string();
    if group.values().contains(&s.as_str()) {
        return Ok(Value::from(s));
    }
    let list = group
        .values()
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(" ");
    Err(FuncError::new(format!("expected one of the following strings: [{list}]")))
}

fn sanitize_target_enum(args: &[Value]) -> Result<Value, FuncError> {
    enum_check(args, EnumGroup::Target)
}

fn sanitize_dir_enum(args: &[Value]) -> Result<Value, FuncError> {
    enum_check(args, EnumGroup::Dir)
}

fn sanitize_translate_enum(args: &[Value]) -> Result<Value, FuncError> {
    enum_check(args, EnumGroup::Translate)
}

fn sanitize_autocomplete_enum(args: &[Value]) -> Result<Value, FuncError> {
    enum_check(args, EnumGroup::Autocomplete)
}

fn sanitize_input_type_enum(args: &[Value]) -> Result<Value, FuncError> {
    enum_check(args, EnumGroup::InputType)
}

fn sanitize_button_type_enum(args: &[Value]) -> Result<Value, FuncError> {
    enum_check(args, EnumGroup::ButtonType)
}

fn eval_args(args: &[Value]) -> Result<Value, FuncError> {
    Ok(Value::from(vellum_text::funcs::sprint(args)))
}

/// Build the internal sanitizer registry consulted by rewritten
/// pipelines at execution time.
pub fn internal_funcs() -> Funcs {
    let mut f = Funcs::empty();
    f.register("_evalArgs", eval_args);
    f.register("_sanitizeHTML", sanitize_html);
    f.register("_escapeHTML", escape_html_attr);
    f.register("_sanitizeRCDATA", sanitize_rcdata);
    f.register("_sanitizeScript", sanitize_script);
    f.register("_sanitizeStyle", sanitize_style);
    f.register("_sanitizeStyleSheet", sanitize_style_sheet);
    f.register("_sanitizeIdentifier", sanitize_identifier);
    f.register("_sanitizeSrcdocHTML", sanitize_srcdoc);
    f.register("_sanitizeURL", sanitize_url);
    f.register("_sanitizeTrustedResourceURL", sanitize_trusted_resource_url);
    f.register("_sanitizeTrustedResourceURLOrURL", sanitize_trusted_resource_url_or_url);
    f.register("_sanitizeTrustedResourceURLSuffix", sanitize_trusted_resource_url_suffix);
    f.register("_normalizeURL", normalize_url_fn);
    f.register("_queryEscapeURL", query_escape_url_fn);
    f.register("_sanitizeTargetEnum", sanitize_target_enum);
    f.register("_sanitizeDirEnum", sanitize_dir_enum);
    f.register("_sanitizeTranslateEnum", sanitize_translate_enum);
    f.register("_sanitizeAutocompleteEnum", sanitize_autocomplete_enum);
    f.register("_sanitizeInputTypeEnum", sanitize_input_type_enum);
    f.register("_sanitizeButtonTypeEnum", sanitize_button_type_enum);
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_safehtml::testutil;

    #[test]
    fn content_kinds() {
        assert_eq!(content_kind(None, &None), Ok(ContentKind::Html));
        assert_eq!(content_kind(Some("span"), &None), Ok(ContentKind::Html));
        assert_eq!(content_kind(Some("script"), &None), Ok(ContentKind::Script));
        assert_eq!(
            content_kind(Some("script"), &Some("text/javascript".into())),
            Ok(ContentKind::Script)
        );
        assert!(content_kind(Some("script"), &Some("text/template".into())).is_err());
        assert_eq!(content_kind(Some("style"), &None), Ok(ContentKind::StyleSheet));
        assert_eq!(content_kind(Some("textarea"), &None), Ok(ContentKind::Rcdata));
        assert!(content_kind(Some("object"), &None).is_err());
        assert!(content_kind(Some("imaginaryelement"), &None).is_err());
    }

    #[test]
    fn attr_kinds() {
        assert_eq!(attr_kind(Some("a"), "href", None, false), Ok(AttrKind::ResourceUrlOrUrl));
        assert_eq!(attr_kind(Some("q"), "cite", None, false), Ok(AttrKind::Url));
        assert_eq!(attr_kind(Some("track"), "src", None, false), Ok(AttrKind::ResourceUrl));
        assert_eq!(attr_kind(Some("img"), "src", None, false), Ok(AttrKind::ResourceUrlOrUrl));
        assert_eq!(attr_kind(Some("p"), "id", None, false), Ok(AttrKind::Identifier));
        assert_eq!(attr_kind(Some("p"), "style", None, false), Ok(AttrKind::Style));
        assert_eq!(attr_kind(Some("iframe"), "srcdoc", None, false), Ok(AttrKind::Srcdoc));
        assert_eq!(
            attr_kind(Some("a"), "target", None, false),
            Ok(AttrKind::Enum(EnumGroup::Target))
        );
        assert_eq!(attr_kind(Some("p"), "data-foo", None, false), Ok(AttrKind::Plain));
        assert!(attr_kind(Some("p"), "data-4badname", None, false).is_err());
        assert!(attr_kind(Some("option"), "foo", None, false).is_err());
        assert!(attr_kind(Some("base"), "title", None, false).is_err());
    }

    #[test]
    fn data_attribute_name_pattern() {
        for (input, want) in [
            ("data-a", true),
            ("data-foo", true),
            ("data-foo-bar", true),
            ("data-f0o-b4r", true),
            ("data-_foo", true),
            ("data", false),
            ("foo", false),
            ("data-", false),
            ("data-4oo", false),
            // The tracker lowercases names before the table sees them.
            ("data-Foo", true),
            ("data-foo:bar", false),
            ("data-\u{37F}bar", false),
            ("data-fo\u{300}", false),
        ] {
            assert_eq!(DATA_ATTRIBUTE_NAME_PATTERN.is_match(input), want, "input: {input:?}");
        }
    }

    #[test]
    fn link_href_depends_on_rel() {
        assert_eq!(attr_kind(Some("link"), "href", None, false), Ok(AttrKind::ResourceUrl));
        assert_eq!(
            attr_kind(Some("link"), "href", Some(" alternate "), false),
            Ok(AttrKind::ResourceUrlOrUrl)
        );
        assert_eq!(
            attr_kind(Some("link"), "href", Some(" stylesheet "), false),
            Ok(AttrKind::ResourceUrl)
        );
        assert!(attr_kind(Some("link"), "media", Some(" import "), false).is_err());
    }

    #[test]
    fn runtime_type_assertions() {
        let err = sanitize_script(&[Value::from("alert(1)")]).expect_err("plain string");
        assert_eq!(err.message, "expected a safehtml.Script value");
        let ok = sanitize_script(&[Value::from(testutil::make_script_for_test("alert(1);"))])
            .expect("wrapper");
        assert_eq!(ok.as_str(), Some("alert(1);"));
    }

    #[test]
    fn runtime_url_sanitizer() {
        let got = sanitize_url(&[Value::from("javascript:evil()")]).expect("url");
        assert_eq!(got.as_str(), Some("about:invalid#zGoSafez"));
        let got = sanitize_url(&[Value::from("http://www.foo.com/a b")]).expect("url");
        assert_eq!(got.as_str(), Some("http://www.foo.com/a%20b"));
        let wrapped = Value::from(testutil::make_url_for_test("data:,\"><script>"));
        let got = sanitize_url(&[wrapped]).expect("url");
        assert_eq!(got.as_str(), Some("data:,%22%3e%3cscript%3e"));
    }

    #[test]
    fn runtime_suffix_sanitizer() {
        let err = sanitize_trusted_resource_url_suffix(&[Value::from("..")]).expect_err("dots");
        assert_eq!(
            err.message,
            "cannot substitute \"..\" after TrustedResourceURL prefix: \"..\" is disallowed"
        );
        let got = sanitize_trusted_resource_url_suffix(&[Value::from("multiple/path/segments")])
            .expect("suffix");
        assert_eq!(got.as_str(), Some("multiple%2fpath%2fsegments"));
    }

    #[test]
    fn enum_error_lists_values() {
        let err = sanitize_target_enum(&[Value::from("blah")]).expect_err("bad value");
        assert_eq!(err.message, r#"expected one of the following strings: ["_blank" "_self"]"#);
    }

    #[test]
    fn html_sanitizer_unwraps_only_html() {
        let got = sanitize_html(&[Value::from(testutil::make_html_for_test("<b>x</b>"))]).expect("html");
        assert_eq!(got.as_str(), Some("<b>x</b>"));
        let got = sanitize_html(&[Value::from(testutil::make_script_for_test("alert(\"foo\");"))])
            .expect("script");
        assert_eq!(got.as_str(), Some("alert(&#34;foo&#34;);"));
    }
}
