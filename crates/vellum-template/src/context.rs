//! Sanitization context threaded through template text.
//!
//! The context models just enough HTML parse state to classify action
//! sites: the coarse state, the current element and attribute, the value
//! delimiter, captured `link rel` and `script type` values, URL prefix
//! history, and a deferred branch error.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Ordinary markup text, or the content of a normal element.
    Text,
    /// Between `<` and `>`, outside attribute machinery.
    Tag,
    /// Accumulating an attribute name.
    AttrName,
    /// After an attribute name, before a possible `=`.
    AfterName,
    /// After `=`, before the value delimiter.
    BeforeValue,
    /// Inside an attribute value.
    Attr,
    /// Inside `<!-- ... -->`.
    HtmlComment,
    /// Body of `script`, `style`, `textarea` or `title`.
    SpecialElementBody,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Text => "Text",
            State::Tag => "Tag",
            State::AttrName => "AttrName",
            State::AfterName => "AfterName",
            State::BeforeValue => "BeforeValue",
            State::Attr => "Attr",
            State::HtmlComment => "HtmlComment",
            State::SpecialElementBody => "SpecialElementBody",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delim {
    #[default]
    None,
    SingleQuote,
    DoubleQuote,
}

impl fmt::Display for Delim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Delim::None => "None",
            Delim::SingleQuote => "SingleQuote",
            Delim::DoubleQuote => "DoubleQuote",
        })
    }
}

/// An element or attribute name that may be conditionally selected.
///
/// When sibling branches end with different names, the joined context
/// carries every candidate until the next decision point can check that
/// they all sanitize identically.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Name {
    #[default]
    None,
    One(String),
    Cond(Vec<String>),
}

impl Name {
    pub fn one(s: impl Into<String>) -> Name {
        Name::One(s.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Name::None)
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            Name::None => None,
            Name::One(s) => Some(s),
            Name::Cond(v) => v.first().map(|s| s.as_str()),
        }
    }

    /// Candidate names; `None` entries stand for "no element/attribute".
    pub fn candidates(&self) -> Vec<Option<&str>> {
        match self {
            Name::None => vec![None],
            Name::One(s) => vec![Some(s.as_str())],
            Name::Cond(v) => v
                .iter()
                .map(|s| if s.is_empty() { None } else { Some(s.as_str()) })
                .collect(),
        }
    }

    /// Merge two names into a candidate set, first operand first. A
    /// `None` operand survives as an empty-string candidate so the join
    /// remembers that one branch had no name at all.
    pub fn merge(&self, other: &Name) -> Name {
        if self == other {
            return self.clone();
        }
        let mut out: Vec<String> = Vec::new();
        for n in [self, other] {
            match n {
                Name::None => {
                    if !out.iter().any(String::is_empty) {
                        out.push(String::new());
                    }
                }
                Name::One(s) => {
                    if !out.contains(s) {
                        out.push(s.clone());
                    }
                }
                Name::Cond(v) => {
                    for s in v {
                        if !out.contains(s) {
                            out.push(s.clone());
                        }
                    }
                }
            }
        }
        match out.len() {
            0 => Name::None,
            1 if out[0].is_empty() => Name::None,
            1 => Name::One(out.remove(0)),
            _ => Name::Cond(out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlPart {
    /// No static value text seen yet.
    #[default]
    None,
    /// Inside scheme, authority or path.
    PreQuery,
    /// A `?` or `#` has been seen.
    QueryOrFrag,
}

/// URL prefix history of the attribute value being assembled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlState {
    pub part: UrlPart,
    /// A safe static TrustedResourceURL prefix has been validated.
    pub tru_established: bool,
    /// Sibling branches produced incompatible prefixes.
    pub ambiguous: bool,
}

/// The attribute currently being parsed, including its accumulated
/// static value text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttrState {
    pub name: Name,
    /// Name accumulation stopped after a conditional suffix.
    pub frozen: bool,
    /// Static value text seen so far.
    pub value: String,
    /// An action has already occurred inside this value.
    pub dynamic: bool,
    pub url: UrlState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub state: State,
    pub delim: Delim,
    pub element: Name,
    /// Inside a closing tag.
    pub closing: bool,
    pub attr: AttrState,
    /// Normalized space-padded rel token list of the current `<link>`.
    pub link_rel: Option<String>,
    /// The rel attribute contained an action.
    pub link_rel_dynamic: bool,
    /// Lowercased `type` attribute of the current `<script>`.
    pub script_type: Option<String>,
    /// Parity of backticks seen in the current script body.
    pub js_odd: bool,
    /// Error to report if an action is reached in this context.
    pub err_if: Option<String>,
}

impl Context {
    pub fn start() -> Context {
        Context {
            state: State::Text,
            delim: Delim::None,
            element: Name::None,
            closing: false,
            attr: AttrState::default(),
            link_rel: None,
            link_rel_dynamic: false,
            script_type: None,
            js_odd: false,
            err_if: None,
        }
    }

    /// Mangled suffix distinguishing derived per-context templates.
    pub fn mangle(&self) -> String {
        let mut out = format!("$ctx_{}_{}", self.state, self.delim);
        let name_part = |n: &Name| match n {
            Name::None => String::new(),
            Name::One(s) => s.clone(),
            Name::Cond(v) => v.join("-or-"),
        };
        if !self.element.is_none() {
            out.push_str("_element_");
            out.push_str(&name_part(&self.element));
        }
        if !self.attr.name.is_none() {
            out.push_str("_attr_");
            out.push_str(&name_part(&self.attr.name));
        }
        match self.attr.url.part {
            UrlPart::None => {}
            UrlPart::PreQuery => out.push_str("_PreQuery"),
            UrlPart::QueryOrFrag => out.push_str("_QueryOrFrag"),
        }
        if self.attr.dynamic {
            out.push_str("_dyn");
        }
        if self.attr.url.tru_established {
            out.push_str("_trusted");
        }
        if self.closing {
            out.push_str("_closing");
        }
        if self.js_odd {
            out.push_str("_jsopen");
        }
        out
    }

    /// True for the context templates start in.
    pub fn is_start(&self) -> bool {
        self == &Context::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_text_context() {
        let c = Context::start();
        assert_eq!(c.state, State::Text);
        assert!(c.is_start());
    }

    #[test]
    fn merge_names() {
        let a = Name::one("img");
        let b = Name::one("audio");
        assert_eq!(a.merge(&b), Name::Cond(vec!["img".into(), "audio".into()]));
        let c = a.merge(&b).merge(&Name::one("track"));
        assert_eq!(
            c,
            Name::Cond(vec!["img".into(), "audio".into(), "track".into()])
        );
        assert_eq!(a.merge(&a), a);
    }

    #[test]
    fn mangle_is_stable_and_context_sensitive() {
        let mut c = Context::start();
        c.state = State::Attr;
        c.delim = Delim::DoubleQuote;
        c.element = Name::one("select");
        c.attr.name = Name::one("size");
        assert_eq!(c.mangle(), "$ctx_Attr_DoubleQuote_element_select_attr_size");
        let mut d = c.clone();
        d.attr.dynamic = true;
        assert_ne!(c.mangle(), d.mangle());
    }
}
