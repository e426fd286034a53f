//! Byte-by-byte HTML context tracking over literal template text.
//!
//! [`context_after_text`] consumes one state-homogeneous chunk of text
//! and returns the context after it. The escaper drives it in a loop,
//! rewriting text as it goes (comment stripping, stray `<` escaping).
//! Only enough HTML5 is modeled to classify substitution sites.

use crate::context::{AttrState, Context, Delim, Name, State, UrlPart};
use crate::error::{Error, ErrorCode};
use crate::sanitize::{self, AttrKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackOpts {
    pub csp_compatible: bool,
}

pub(crate) const JS_TEMPLATE_MSG: &str = "unbalanced JS template literal in script element; \
Missing closing ` makes Mixing template systems unsafe";

/// Advance `c` over a prefix of `s`, returning the context after the
/// consumed bytes and how many were consumed. Callers loop until the
/// whole string is consumed.
pub fn context_after_text(c: &Context, s: &str, opts: &TrackOpts) -> Result<(Context, usize), Error> {
    match c.state {
        State::Text => t_text(c, s),
        State::Tag => t_tag(c, s, opts),
        State::AttrName => t_attr_name(c, s),
        State::AfterName => t_after_name(c, s, opts),
        State::BeforeValue => t_before_value(c, s),
        State::Attr => t_attr_value(c, s, opts),
        State::HtmlComment => t_comment(c, s),
        State::SpecialElementBody => t_special(c, s),
    }
}

fn is_element_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b':' || b == b'-'
}

fn t_text(c: &Context, s: &str) -> Result<(Context, usize), Error> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while let Some(rel) = s[i..].find('<') {
        let lt = i + rel;
        let rest = &bytes[lt + 1..];
        if s[lt..].starts_with("<!--") {
            let mut c1 = c.clone();
            c1.state = State::HtmlComment;
            return Ok((c1, lt + 4));
        }
        let (closing, name_start) = match rest.first().copied() {
            Some(b'/') if rest.get(1).copied().is_some_and(|b| b.is_ascii_alphabetic()) => {
                (true, lt + 2)
            }
            Some(b) if b.is_ascii_alphabetic() => (false, lt + 1),
            _ => {
                // Stray '<' (or a doctype); not a state transition.
                i = lt + 1;
                continue;
            }
        };
        let mut end = name_start;
        while end < bytes.len() && is_element_name_byte(bytes[end]) {
            end += 1;
        }
        let name = s[name_start..end].to_ascii_lowercase();
        let mut c1 = Context::start();
        c1.state = State::Tag;
        c1.closing = closing;
        c1.element = Name::one(name);
        c1.js_odd = false;
        return Ok((c1, end));
    }
    Ok((c.clone(), s.len()))
}

fn t_tag(c: &Context, s: &str, opts: &TrackOpts) -> Result<(Context, usize), Error> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return Ok((c.clone(), s.len()));
    }
    match bytes[i] {
        b'>' => {
            let c1 = close_tag(c)?;
            Ok((c1, i + 1))
        }
        b'=' => Err(Error::new(
            ErrorCode::BadHtml,
            format!("expected space, attr name, or end of tag, but got {:?}", &s[i..]),
        )),
        _ => {
            let mut c1 = c.clone();
            c1.attr = AttrState::default();
            c1.state = State::AttrName;
            scan_attr_name(&mut c1, s, i, opts)
        }
    }
}

/// Accumulate attribute name characters starting at `start`.
fn scan_attr_name(
    c1: &mut Context,
    s: &str,
    start: usize,
    _opts: &TrackOpts,
) -> Result<(Context, usize), Error> {
    let bytes = s.as_bytes();
    let mut end = start;
    while end < bytes.len() {
        match bytes[end] {
            b'<' => {
                return Err(Error::new(
                    ErrorCode::BadHtml,
                    format!("\"<\" in attribute name: {s:?}"),
                ))
            }
            b'=' | b'>' => break,
            b if b.is_ascii_whitespace() => break,
            _ => end += 1,
        }
    }
    if !c1.attr.frozen {
        let piece = s[start..end].to_ascii_lowercase();
        c1.attr.name = match std::mem::take(&mut c1.attr.name) {
            Name::None => Name::one(piece),
            Name::One(existing) => Name::one(existing + &piece),
            cond @ Name::Cond(_) => cond,
        };
    }
    if end >= bytes.len() {
        c1.state = State::AttrName;
        return Ok((c1.clone(), s.len()));
    }
    c1.state = State::AfterName;
    Ok((c1.clone(), end))
}

fn t_attr_name(c: &Context, s: &str) -> Result<(Context, usize), Error> {
    let mut c1 = c.clone();
    scan_attr_name(&mut c1, s, 0, &TrackOpts::default())
}

fn t_after_name(c: &Context, s: &str, opts: &TrackOpts) -> Result<(Context, usize), Error> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return Ok((c.clone(), s.len()));
    }
    csp_check_attr_name(c, opts)?;
    match bytes[i] {
        b'=' => {
            let mut c1 = c.clone();
            c1.state = State::BeforeValue;
            Ok((c1, i + 1))
        }
        b'>' => {
            let c1 = close_tag(c)?;
            Ok((c1, i + 1))
        }
        _ => {
            // Valueless attribute; a new attribute name begins here.
            let mut c1 = c.clone();
            c1.attr = AttrState::default();
            c1.state = State::Tag;
            Ok((c1, i))
        }
    }
}

fn t_before_value(c: &Context, s: &str) -> Result<(Context, usize), Error> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() {
        return Ok((c.clone(), s.len()));
    }
    match bytes[i] {
        b'"' => {
            let mut c1 = c.clone();
            c1.state = State::Attr;
            c1.delim = Delim::DoubleQuote;
            Ok((c1, i + 1))
        }
        b'\'' => {
            let mut c1 = c.clone();
            c1.state = State::Attr;
            c1.delim = Delim::SingleQuote;
            Ok((c1, i + 1))
        }
        b'>' => {
            let c1 = close_tag(c)?;
            Ok((c1, i + 1))
        }
        _ => {
            let mut c1 = c.clone();
            c1.state = State::Attr;
            c1.delim = Delim::None;
            Ok((c1, i))
        }
    }
}

fn t_attr_value(c: &Context, s: &str, opts: &TrackOpts) -> Result<(Context, usize), Error> {
    match c.delim {
        Delim::None => t_unquoted_value(c, s, opts),
        Delim::SingleQuote | Delim::DoubleQuote => {
            let quote = if c.delim == Delim::SingleQuote { '\'' } else { '"' };
            let mut c1 = c.clone();
            match s.find(quote) {
                Some(pos) => {
                    extend_attr_value(&mut c1, &s[..pos], opts)?;
                    close_attr(&mut c1);
                    Ok((c1, pos + 1))
                }
                None => {
                    extend_attr_value(&mut c1, s, opts)?;
                    Ok((c1, s.len()))
                }
            }
        }
    }
}

fn t_unquoted_value(c: &Context, s: &str, opts: &TrackOpts) -> Result<(Context, usize), Error> {
    let bytes = s.as_bytes();
    let mut end = 0;
    while end < bytes.len() && !(bytes[end].is_ascii_whitespace() || bytes[end] == b'>') {
        end += 1;
    }
    let token = &s[..end];
    for bad in ['"', '\'', '=', '`'] {
        if token.contains(bad) {
            return Err(Error::new(
                ErrorCode::BadHtml,
                format!("\"{bad}\" in unquoted attr: {token:?}"),
            ));
        }
    }
    let mut c1 = c.clone();
    extend_attr_value(&mut c1, token, opts)?;
    if end >= bytes.len() {
        return Ok((c1, s.len()));
    }
    close_attr(&mut c1);
    Ok((c1, end))
}

/// Append static text to the current attribute value, updating the URL
/// part and running the CSP and enumerated-partial checks.
fn extend_attr_value(c1: &mut Context, chunk: &str, opts: &TrackOpts) -> Result<(), Error> {
    if chunk.is_empty() {
        return Ok(());
    }
    c1.attr.value.push_str(chunk);
    if chunk.contains('?') || chunk.contains('#') {
        c1.attr.url.part = UrlPart::QueryOrFrag;
    } else if c1.attr.url.part == UrlPart::None {
        c1.attr.url.part = UrlPart::PreQuery;
    }
    if opts.csp_compatible && c1.attr.value.to_ascii_lowercase().starts_with("javascript:") {
        return Err(Error::new(
            ErrorCode::CspCompatibility,
            "\"javascript:\" URI disallowed for CSP compatibility",
        ));
    }
    if c1.attr.dynamic {
        if let Ok(AttrKind::Enum(_)) = sanitize::resolve_attr_kind(
            &c1.element,
            &c1.attr.name,
            c1.link_rel.as_deref(),
            c1.link_rel_dynamic,
            false,
        ) {
            return Err(Error::new(
                ErrorCode::PartialSubstitution,
                format!(
                    "partial substitutions are disallowed in the {:?} attribute value context of a {:?} element",
                    c1.attr.name.first().unwrap_or(""),
                    c1.element.first().unwrap_or("")
                ),
            ));
        }
    }
    Ok(())
}

fn csp_check_attr_name(c: &Context, opts: &TrackOpts) -> Result<(), Error> {
    if !opts.csp_compatible {
        return Ok(());
    }
    for cand in c.attr.name.candidates().into_iter().flatten() {
        if cand.len() > 2 && cand.starts_with("on") {
            return Err(Error::new(
                ErrorCode::CspCompatibility,
                format!("inline event handler {cand:?} is disallowed for CSP compatibility"),
            ));
        }
    }
    Ok(())
}

/// Capture per-element attribute metadata and return to tag state.
fn close_attr(c1: &mut Context) {
    if let Name::One(elem) = &c1.element {
        let attr_name = c1.attr.name.first().unwrap_or("");
        if elem == "script" && attr_name == "type" {
            c1.script_type = if c1.attr.dynamic {
                None
            } else {
                Some(c1.attr.value.to_ascii_lowercase())
            };
        }
        if elem == "link" && attr_name == "rel" {
            if c1.attr.dynamic {
                c1.link_rel = None;
                c1.link_rel_dynamic = true;
            } else {
                let tokens: Vec<&str> = c1.attr.value.split_ascii_whitespace().collect();
                let lower = tokens.join(" ").to_ascii_lowercase();
                c1.link_rel = Some(format!(" {lower} "));
            }
        }
    }
    c1.attr = AttrState::default();
    c1.delim = Delim::None;
    c1.state = State::Tag;
}

/// Handle `>`: element content, special element body, or plain text.
fn close_tag(c: &Context) -> Result<Context, Error> {
    let mut c1 = Context::start();
    if c.closing {
        return Ok(c1);
    }
    match &c.element {
        Name::None => Ok(c1),
        Name::One(name) => {
            if sanitize::is_special_element(name) {
                c1.state = State::SpecialElementBody;
                c1.element = c.element.clone();
                // The body's sanitization context depends on the type
                // attribute captured while parsing the tag.
                c1.script_type = c.script_type.clone();
                c1.js_odd = false;
            } else if sanitize::is_void_element(name) {
                c1.element = Name::None;
            } else {
                c1.element = c.element.clone();
            }
            Ok(c1)
        }
        Name::Cond(_) => {
            // Candidates must agree on the content sanitization context.
            match sanitize::resolve_content_kind(&c.element, &c.script_type) {
                Ok(_) => {
                    let any_void = c
                        .element
                        .candidates()
                        .into_iter()
                        .flatten()
                        .any(sanitize::is_void_element);
                    c1.element = if any_void { Name::None } else { c.element.clone() };
                    Ok(c1)
                }
                Err(msg) => {
                    c1.element = Name::one(c.element.first().unwrap_or(""));
                    c1.err_if = Some(msg);
                    Ok(c1)
                }
            }
        }
    }
}

fn t_comment(c: &Context, s: &str) -> Result<(Context, usize), Error> {
    match s.find("-->") {
        Some(pos) => {
            let mut c1 = c.clone();
            c1.state = State::Text;
            Ok((c1, pos + 3))
        }
        None => Ok((c.clone(), s.len())),
    }
}

fn t_special(c: &Context, s: &str) -> Result<(Context, usize), Error> {
    let name = c.element.first().unwrap_or("");
    let is_script = name == "script";
    let closer_at = find_special_end(s, name);
    let scanned = closer_at.unwrap_or(s.len());
    let mut c1 = c.clone();
    if is_script {
        let backticks = s[..scanned].bytes().filter(|&b| b == b'`').count();
        if backticks % 2 == 1 {
            c1.js_odd = !c1.js_odd;
        }
    }
    match closer_at {
        Some(pos) => {
            if is_script && c1.js_odd {
                return Err(Error::new(ErrorCode::UnbalancedJsTemplate, JS_TEMPLATE_MSG));
            }
            c1.state = State::Tag;
            c1.closing = true;
            c1.element = Name::None;
            c1.attr = AttrState::default();
            c1.delim = Delim::None;
            Ok((c1, pos + 2 + name.len()))
        }
        None => Ok((c1, s.len())),
    }
}

/// Find the case-insensitive `</name` followed by space, `/` or `>`.
fn find_special_end(s: &str, name: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while let Some(rel) = s[i..].find("</") {
        let pos = i + rel;
        let after = pos + 2;
        let end = after + name.len();
        if end < bytes.len()
            && s[after..end].eq_ignore_ascii_case(name)
            && (bytes[end].is_ascii_whitespace() || bytes[end] == b'/' || bytes[end] == b'>')
        {
            return Some(pos);
        }
        i = pos + 2;
    }
    None
}
