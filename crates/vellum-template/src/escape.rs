//! The escape pass: walks parse trees, threads sanitization contexts
//! through literal text, and rewrites action pipelines so execution
//! applies the context-appropriate sanitizers.
//!
//! The pass is transactional: it collects edits (appended commands,
//! elided actions, rewritten text, renamed template calls, derived
//! per-context clones) and the caller commits them atomically after the
//! whole traversal succeeds. Nothing dangerous is ever half-applied.

use crate::context::{Context, Delim, Name, State, UrlPart};
use crate::error::{Error, ErrorCode};
use crate::sanitize::{self, AttrKind};
use crate::tracker::{context_after_text, TrackOpts, JS_TEMPLATE_MSG};
use std::collections::{HashMap, HashSet};
use vellum_safehtml::urlutil::is_safe_trusted_resource_url_prefix;
use vellum_text::{line_of, Arg, Node, NodeId, Pipeline, Tree};

/// Escapers that may only appear as the final command of a pipeline.
const PREDEFINED_ESCAPERS: &[&str] = &["html", "urlquery", "print", "printf", "println"];

/// Everything the escape pass wants applied to the namespace.
#[derive(Debug, Default, Clone)]
pub struct EscapeOutcome {
    pub derived: HashMap<String, Tree>,
    pub action_cmds: HashMap<(String, NodeId), Vec<&'static str>>,
    pub elided: HashSet<(String, NodeId)>,
    pub text_edits: HashMap<(String, NodeId), String>,
    pub call_renames: HashMap<(String, NodeId), String>,
    /// Final pipeline idents to replace, e.g. `html` -> `_evalArgs`.
    pub final_replacements: HashMap<(String, NodeId), &'static str>,
    pub output: HashMap<String, Context>,
}

/// Escape every template reachable from `name`, starting in the text
/// context. `pristine` holds unedited trees; `cached_output` carries
/// output contexts from earlier escape runs on the same namespace.
pub fn escape_templates(
    pristine: &HashMap<String, Tree>,
    cached_output: &HashMap<String, Context>,
    name: &str,
    csp_compatible: bool,
) -> Result<EscapeOutcome, Error> {
    if !pristine.contains_key(name) {
        return Err(Error::new(
            ErrorCode::NoSuchTemplate,
            format!("{name:?} is an incomplete or empty template"),
        ));
    }
    let mut e = Escaper {
        pristine,
        opts: TrackOpts { csp_compatible },
        output: cached_output.clone(),
        derived: HashMap::new(),
        action_cmds: HashMap::new(),
        elided: HashSet::new(),
        text_edits: HashMap::new(),
        call_renames: HashMap::new(),
        final_replacements: HashMap::new(),
        in_progress: HashSet::new(),
        used_assumption: HashSet::new(),
    };
    let c = e.compute_out_ctx(Context::start(), name)?;
    if c.state != State::Text {
        return Err(Error::new(
            ErrorCode::EndContext,
            format!("template {name:?} ends in non-text context: {}", c.state),
        ));
    }
    Ok(EscapeOutcome {
        derived: e.derived,
        action_cmds: e.action_cmds,
        elided: e.elided,
        text_edits: e.text_edits,
        call_renames: e.call_renames,
        final_replacements: e.final_replacements,
        output: e.output,
    })
}

#[derive(Clone)]
struct Escaper<'a> {
    pristine: &'a HashMap<String, Tree>,
    opts: TrackOpts,
    output: HashMap<String, Context>,
    derived: HashMap<String, Tree>,
    action_cmds: HashMap<(String, NodeId), Vec<&'static str>>,
    elided: HashSet<(String, NodeId)>,
    text_edits: HashMap<(String, NodeId), String>,
    call_renames: HashMap<(String, NodeId), String>,
    final_replacements: HashMap<(String, NodeId), &'static str>,
    in_progress: HashSet<String>,
    used_assumption: HashSet<String>,
}

impl<'a> Escaper<'a> {
    fn tree_for(&self, name: &str) -> Option<&Tree> {
        self.derived.get(name).or_else(|| self.pristine.get(name))
    }

    /// Compute the output context of template `dname` entered at `c`,
    /// escaping its body once. Recursive templates are given a second
    /// chance to reach a fixed point before being rejected.
    fn compute_out_ctx(&mut self, c: Context, dname: &str) -> Result<Context, Error> {
        if let Some(out) = self.output.get(dname) {
            if self.in_progress.contains(dname) {
                self.used_assumption.insert(dname.to_string());
            }
            return Ok(out.clone());
        }
        let tree = self
            .tree_for(dname)
            .ok_or_else(|| Error::new(ErrorCode::NoSuchTemplate, format!("no such template {dname:?}")))?;
        let root = tree.root.clone();
        let source = tree.source.clone();
        let save = self.clone();
        self.in_progress.insert(dname.to_string());
        self.used_assumption.remove(dname);
        self.output.insert(dname.to_string(), c.clone());
        let c1 = self.escape_list(c.clone(), &root, dname, &source)?;
        let recursive = self.used_assumption.contains(dname);
        self.in_progress.remove(dname);
        if !recursive || c1 == c {
            self.output.insert(dname.to_string(), c1.clone());
            return Ok(c1);
        }
        // Retry, assuming the first pass's exit context.
        *self = save.clone();
        self.in_progress.insert(dname.to_string());
        self.used_assumption.remove(dname);
        self.output.insert(dname.to_string(), c1.clone());
        match self.escape_list(c1.clone(), &root, dname, &source) {
            Ok(c2) if !self.used_assumption.contains(dname) || c2 == c1 => {
                self.in_progress.remove(dname);
                self.output.insert(dname.to_string(), c2.clone());
                Ok(c2)
            }
            Ok(_) => {
                *self = save;
                Err(Error::new(
                    ErrorCode::OutputContext,
                    format!("cannot compute output context for template {dname}"),
                ))
            }
            Err(e) => Err(e),
        }
    }

    fn escape_list(
        &mut self,
        c: Context,
        nodes: &[Node],
        tname: &str,
        source: &str,
    ) -> Result<Context, Error> {
        let mut c = c;
        for node in nodes {
            c = self.escape_node(c, node, tname, source)?;
        }
        Ok(c)
    }

    fn escape_node(
        &mut self,
        c: Context,
        node: &Node,
        tname: &str,
        source: &str,
    ) -> Result<Context, Error> {
        match node {
            Node::Text { id, text, offset } => self.escape_text(c, tname, *id, text, *offset, source),
            Node::Action { id, pipe, offset, end, .. } => {
                self.escape_action(c, tname, *id, pipe, *offset, *end, source)
            }
            Node::If { pipe: _, then_list, else_list, offset, .. } => {
                self.escape_branches(c, then_list, else_list, false, *offset, tname, source, "if")
            }
            Node::With { pipe: _, list, else_list, offset, .. } => {
                self.escape_branches(c, list, else_list, false, *offset, tname, source, "with")
            }
            Node::Range { pipe: _, list, else_list, offset, .. } => {
                self.escape_branches(c, list, else_list, true, *offset, tname, source, "range")
            }
            Node::TemplateCall { id, name, offset, .. } => {
                self.escape_call(c, name, tname, *id, *offset, source)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn escape_branches(
        &mut self,
        c: Context,
        list: &[Node],
        else_list: &[Node],
        looping: bool,
        offset: usize,
        tname: &str,
        source: &str,
        node_name: &str,
    ) -> Result<Context, Error> {
        let line = line_of(source, offset);
        let mut c0 = self.escape_list(c.clone(), list, tname, source)?;
        if looping {
            // The body of a range loops back to itself.
            let c0b = self.escape_list(c0.clone(), list, tname, source)?;
            c0 = join(&c, c0, c0b, node_name)
                .map_err(|m| Error::new(ErrorCode::BranchContext, m).at(tname, line))?;
        }
        let c1 = self.escape_list(c.clone(), else_list, tname, source)?;
        join(&c, c0, c1, node_name).map_err(|m| Error::new(ErrorCode::BranchContext, m).at(tname, line))
    }

    fn escape_call(
        &mut self,
        c: Context,
        callee: &str,
        tname: &str,
        id: NodeId,
        offset: usize,
        source: &str,
    ) -> Result<Context, Error> {
        let line = line_of(source, offset);
        if self.tree_for(callee).is_none() {
            return Err(
                Error::new(ErrorCode::NoSuchTemplate, format!("no such template {callee:?}"))
                    .at(tname, line),
            );
        }
        let dname = if c.is_start() {
            callee.to_string()
        } else {
            format!("{}{}", callee, c.mangle())
        };
        if dname != callee {
            self.call_renames.insert((tname.to_string(), id), dname.clone());
            if self.tree_for(&dname).is_none() {
                let mut clone = self
                    .pristine
                    .get(callee)
                    .cloned()
                    .ok_or_else(|| {
                        Error::new(ErrorCode::NoSuchTemplate, format!("no such template {callee:?}"))
                            .at(tname, line)
                    })?;
                clone.name = dname.clone();
                self.derived.insert(dname.clone(), clone);
            }
        }
        self.compute_out_ctx(c, &dname)
    }

    /// Escape one literal text node: advance the context chunk by chunk
    /// while normalizing the text (comments stripped, stray `<` escaped
    /// in text and RCDATA bodies).
    fn escape_text(
        &mut self,
        c: Context,
        tname: &str,
        id: NodeId,
        text: &str,
        offset: usize,
        source: &str,
    ) -> Result<Context, Error> {
        let s = text;
        let bytes = s.as_bytes();
        let mut c = c;
        let mut i = 0usize;
        let mut written = 0usize;
        let mut b = String::new();
        while i != s.len() {
            let (c1, nread) = context_after_text(&c, &s[i..], &self.opts)
                .map_err(|e| e.at(tname, line_of(source, offset + i)))?;
            let i1 = i + nread;
            let rcdata_body = c.state == State::SpecialElementBody
                && matches!(c.element.first(), Some("textarea") | Some("title"));
            if c.state == State::Text || rcdata_body {
                let mut end = i1;
                if c1.state != c.state {
                    for j in (i..i1).rev() {
                        if bytes[j] == b'<' {
                            end = j;
                            break;
                        }
                    }
                }
                for j in i..end {
                    if bytes[j] == b'<' && !starts_with_doctype(&s[j..]) {
                        b.push_str(&s[written..j]);
                        b.push_str("&lt;");
                        written = j + 1;
                    }
                }
            } else if c.state == State::HtmlComment {
                b.push_str(&s[written..i]);
                written = i1;
            }
            if c.state != c1.state && c1.state == State::HtmlComment {
                // Drop the "<!--" opener, keeping the text before it.
                let cs = i1 - 4;
                b.push_str(&s[written..cs]);
                written = i1;
            }
            c = c1;
            i = i1;
        }
        if written != 0 {
            if c.state != State::HtmlComment {
                b.push_str(&s[written..]);
            }
            self.text_edits.insert((tname.to_string(), id), b);
        }
        Ok(c)
    }

    #[allow(clippy::too_many_arguments)]
    fn escape_action(
        &mut self,
        c: Context,
        tname: &str,
        id: NodeId,
        pipe: &Pipeline,
        offset: usize,
        end: usize,
        source: &str,
    ) -> Result<Context, Error> {
        let line = line_of(source, offset);
        let at = |e: Error| e.at(tname, line);
        if !pipe.decls.is_empty() {
            // A local variable assignment produces no output.
            return Ok(c);
        }
        if let Some(msg) = &c.err_if {
            return Err(at(Error::new(ErrorCode::BranchContext, msg.clone())));
        }
        if let Some(last) = pipe.cmds.len().checked_sub(1) {
            for (i, cmd) in pipe.cmds.iter().enumerate() {
                if let Some(Arg::Ident(name)) = cmd.args.first() {
                    if PREDEFINED_ESCAPERS.contains(&name.as_str()) && i != last {
                        return Err(at(Error::new(
                            ErrorCode::PredefinedEscaper,
                            format!("predefined escaper {name:?} disallowed in template"),
                        )));
                    }
                }
            }
        }
        let mut c1 = c.clone();
        let chain: Vec<&'static str> = match c.state {
            State::HtmlComment => {
                self.elided.insert((tname.to_string(), id));
                return Ok(c1);
            }
            State::Text | State::SpecialElementBody => {
                if c.state == State::SpecialElementBody
                    && c.element.first() == Some("script")
                    && c.js_odd
                {
                    return Err(at(Error::new(ErrorCode::UnbalancedJsTemplate, JS_TEMPLATE_MSG)));
                }
                match sanitize::resolve_content_kind(&c.element, &c.script_type) {
                    Ok(kind) => kind.chain().to_vec(),
                    Err(msg) => {
                        let code = if msg.starts_with("conditional branch") {
                            ErrorCode::BranchContext
                        } else {
                            ErrorCode::DisallowedContext
                        };
                        return Err(at(Error::new(code, msg)));
                    }
                }
            }
            State::Tag | State::AttrName | State::AfterName => {
                return Err(at(Error::new(
                    ErrorCode::ElementOrAttributeName,
                    "actions must not affect element or attribute names",
                )))
            }
            State::BeforeValue => {
                return Err(at(Error::new(
                    ErrorCode::UnquotedAttribute,
                    format!(
                        "cannot escape action {}: unquoted attribute values disallowed",
                        &source[offset..end]
                    ),
                )))
            }
            State::Attr if c.delim == Delim::None => {
                return Err(at(Error::new(
                    ErrorCode::UnquotedAttribute,
                    format!(
                        "cannot escape action {}: unquoted attribute values disallowed",
                        &source[offset..end]
                    ),
                )))
            }
            State::Attr => {
                c1.attr.dynamic = true;
                let kind = sanitize::resolve_attr_kind(
                    &c.element,
                    &c.attr.name,
                    c.link_rel.as_deref(),
                    c.link_rel_dynamic,
                    false,
                )
                .map_err(|msg| {
                    let code = if msg.starts_with("conditional branch")
                        || msg.starts_with("conditional branches")
                    {
                        ErrorCode::BranchContext
                    } else {
                        ErrorCode::DisallowedContext
                    };
                    at(Error::new(code, msg))
                })?;
                self.attr_chain(&c, &mut c1, kind).map_err(at)?
            }
        };
        let final_ident = pipe.cmds.last().and_then(|cmd| match cmd.args.first() {
            Some(Arg::Ident(n)) => Some(n.as_str()),
            _ => None,
        });
        let url_chain = chain.iter().any(|f| {
            matches!(
                *f,
                "_sanitizeURL"
                    | "_normalizeURL"
                    | "_queryEscapeURL"
                    | "_sanitizeTrustedResourceURLOrURL"
            )
        });
        let chain: Vec<&'static str> = if final_ident == Some("html") && url_chain {
            // URL escaping subsumes HTML escaping here; demote the
            // trailing `html` to plain argument evaluation so output is
            // not double-escaped.
            self.final_replacements.insert((tname.to_string(), id), "_evalArgs");
            chain
        } else {
            chain
                .into_iter()
                .filter(|f| match final_ident {
                    // The predefined escapers subsume the matching
                    // internal ones, so common patterns stay
                    // single-escaped.
                    Some("html") => {
                        !matches!(*f, "_sanitizeHTML" | "_sanitizeRCDATA" | "_escapeHTML")
                    }
                    Some("urlquery") => !matches!(*f, "_normalizeURL" | "_queryEscapeURL"),
                    _ => true,
                })
                .collect()
        };
        self.action_cmds.insert((tname.to_string(), id), chain);
        Ok(c1)
    }

    /// Select the sanitizer chain for an action in an attribute value,
    /// updating the URL prefix history carried in `c1`.
    fn attr_chain(
        &mut self,
        c: &Context,
        c1: &mut Context,
        kind: AttrKind,
    ) -> Result<Vec<&'static str>, Error> {
        let attr_name = c.attr.name.first().unwrap_or("").to_string();
        let elem_name = c.element.first().unwrap_or("").to_string();
        let url_wrap = |m: String| {
            Error::new(
                ErrorCode::DisallowedContext,
                format!(
                    "action cannot be interpolated into the {attr_name:?} URL attribute value of this {elem_name:?} element: {m}"
                ),
            )
        };
        Ok(match kind {
            AttrKind::Plain => vec!["_escapeHTML"],
            AttrKind::Identifier => vec!["_sanitizeIdentifier"],
            AttrKind::Srcdoc => vec!["_sanitizeSrcdocHTML"],
            AttrKind::Style => {
                if !c.attr.value.is_empty() {
                    if ends_with_incomplete_charref(&c.attr.value) {
                        return Err(Error::new(
                            ErrorCode::BadHtml,
                            format!(
                                "action cannot be interpolated into the {attr_name:?} attribute value of this {elem_name:?} element: \
                                 prefix {:?} ends with an incomplete HTML character reference; did you mean \"&amp;\" instead of \"&\"?",
                                c.attr.value
                            ),
                        ));
                    }
                }
                vec!["_sanitizeStyle"]
            }
            AttrKind::Enum(group) => {
                if !c.attr.value.is_empty() || c.attr.dynamic {
                    return Err(Error::new(
                        ErrorCode::PartialSubstitution,
                        format!(
                            "partial substitutions are disallowed in the {attr_name:?} attribute value context of a {elem_name:?} element"
                        ),
                    ));
                }
                vec![group.sanitizer()]
            }
            AttrKind::Url | AttrKind::ResourceUrlOrUrl => {
                if c.attr.url.ambiguous {
                    return Err(Error::new(
                        ErrorCode::AmbiguousUrlPrefix,
                        "actions must not occur after an ambiguous URL prefix",
                    ));
                }
                if !c.attr.dynamic && !c.attr.value.is_empty() {
                    let decoded = decode_url_prefix(&c.attr.value).map_err(&url_wrap)?;
                    validate_url_prefix(&decoded, &c.attr.value).map_err(&url_wrap)?;
                }
                if !c.attr.dynamic && c.attr.value.is_empty() || c.attr.url.part == UrlPart::None {
                    match kind {
                        AttrKind::Url => vec!["_sanitizeURL"],
                        _ => vec!["_sanitizeTrustedResourceURLOrURL"],
                    }
                } else if c.attr.url.part == UrlPart::QueryOrFrag {
                    vec!["_queryEscapeURL"]
                } else {
                    vec!["_normalizeURL"]
                }
            }
            AttrKind::ResourceUrl => {
                if c.attr.url.ambiguous {
                    return Err(Error::new(
                        ErrorCode::AmbiguousUrlPrefix,
                        "actions must not occur after an ambiguous URL prefix",
                    ));
                }
                if c.attr.url.tru_established {
                    vec!["_sanitizeTrustedResourceURLSuffix"]
                } else if c.attr.value.is_empty() {
                    vec!["_sanitizeTrustedResourceURL"]
                } else {
                    let decoded = decode_url_prefix(&c.attr.value).map_err(&url_wrap)?;
                    if !is_safe_trusted_resource_url_prefix(&decoded) {
                        return Err(url_wrap(format!(
                            "{:?} is a disallowed TrustedResourceURL prefix",
                            c.attr.value
                        )));
                    }
                    c1.attr.url.tru_established = true;
                    vec!["_sanitizeTrustedResourceURLSuffix"]
                }
            }
        })
    }
}

fn starts_with_doctype(s: &str) -> bool {
    let probe = "<!doctype";
    s.len() >= probe.len() && s[..probe.len()].eq_ignore_ascii_case(probe)
}

/// A context reachable from `c` by following empty-string transitions;
/// lets a branch that stopped just short of the next token join with a
/// sibling that reached it.
fn nudged(mut c: Context) -> Context {
    c.state = match c.state {
        // `<foo {{.}}` would emit an attribute name next.
        State::Tag => State::AttrName,
        State::AfterName => State::AttrName,
        // `<foo bar={{.}}` would emit an attribute value next.
        State::BeforeValue => State::Attr,
        other => other,
    };
    c
}

/// Unify the exit contexts of sibling branches.
fn join(entry: &Context, a: Context, b: Context, node_name: &str) -> Result<Context, String> {
    if a == b {
        return Ok(a);
    }
    let incompatible = || Err(format!("{{{{{node_name}}}}} branches end in different contexts"));
    if a.state != b.state {
        let an = nudged(a.clone());
        let bn = nudged(b.clone());
        if an.state == bn.state && (an.state != a.state || bn.state != b.state) {
            return join(entry, an, bn, node_name);
        }
        return incompatible();
    }
    if a.delim != b.delim || a.closing != b.closing || a.js_odd != b.js_odd {
        return incompatible();
    }
    let mut out = a.clone();
    if a.script_type != b.script_type {
        out.script_type = None;
    }
    if a.link_rel != b.link_rel {
        out.link_rel = None;
        out.link_rel_dynamic = true;
    }
    if a.err_if != b.err_if {
        out.err_if = a.err_if.clone().or_else(|| b.err_if.clone());
    }
    match a.state {
        State::Text | State::Tag | State::HtmlComment => {
            if a.element != b.element {
                out.element = a.element.merge(&b.element);
            }
            Ok(out)
        }
        State::AttrName | State::AfterName | State::BeforeValue => {
            if a.element != b.element {
                out.element = a.element.merge(&b.element);
            }
            if a.attr.name != b.attr.name {
                // A statically known name prefix wins; the table will see
                // only the prefix. Otherwise carry every candidate.
                match &entry.attr.name {
                    Name::One(prefix)
                        if matches!(entry.state, State::AttrName | State::AfterName) =>
                    {
                        out.attr.name = Name::one(prefix.clone());
                    }
                    _ => out.attr.name = a.attr.name.merge(&b.attr.name),
                }
                out.attr.frozen = true;
            }
            Ok(out)
        }
        State::Attr => {
            if a.element != b.element || a.attr.name != b.attr.name {
                return incompatible();
            }
            let url_differs = a.attr.value != b.attr.value
                || a.attr.url.part != b.attr.url.part
                || a.attr.url.tru_established != b.attr.url.tru_established
                || a.attr.url.ambiguous != b.attr.url.ambiguous;
            if url_differs {
                out.attr.url.ambiguous = true;
                if b.attr.value.len() > out.attr.value.len() {
                    out.attr.value = b.attr.value.clone();
                }
            }
            out.attr.dynamic = a.attr.dynamic || b.attr.dynamic;
            Ok(out)
        }
        State::SpecialElementBody => {
            if a.element != b.element {
                return incompatible();
            }
            Ok(out)
        }
    }
}

/// True when `s` ends with `&` followed by a possibly incomplete
/// character reference.
pub(crate) fn ends_with_incomplete_charref(s: &str) -> bool {
    match s.rfind('&') {
        None => false,
        Some(pos) => {
            let tail = &s[pos + 1..];
            !tail.contains(';') && tail.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'#')
        }
    }
}

/// HTML-unescape character references in a static URL prefix, rejecting
/// whitespace and control characters, incomplete trailing references and
/// incomplete percent triplets. Percent-encodings themselves are left in
/// place.
pub(crate) fn decode_url_prefix(s: &str) -> Result<String, String> {
    let ws_err = || format!("URL prefix {s:?} contains whitespace or control characters");
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ws_err());
    }
    if ends_with_incomplete_charref(s) {
        return Err(format!(
            "URL prefix {s:?} ends with an incomplete HTML character reference; did you mean \"&amp;\" instead of \"&\"?"
        ));
    }
    let decoded = unescape_char_refs(s);
    if decoded.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ws_err());
    }
    let bytes = decoded.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return Err(format!(
                    "URL prefix {s:?} ends with an incomplete percent-encoding character triplet"
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(decoded)
}

const NAMED_REFS: &[(&str, char)] = &[
    ("amp", '&'),
    ("apos", '\''),
    ("colon", ':'),
    ("commat", '@'),
    ("equals", '='),
    ("excl", '!'),
    ("gt", '>'),
    ("lt", '<'),
    ("NewLine", '\n'),
    ("num", '#'),
    ("percnt", '%'),
    ("quest", '?'),
    ("quot", '"'),
    ("semi", ';'),
    ("sol", '/'),
    ("Tab", '\t'),
];

fn unescape_char_refs(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'&' {
            let ch_len = utf8_len(bytes[i]);
            out.push_str(&s[i..i + ch_len]);
            i += ch_len;
            continue;
        }
        if let Some((c, len)) = decode_one_ref(&s[i..]) {
            out.push(c);
            i += len;
        } else {
            out.push('&');
            i += 1;
        }
    }
    out
}

fn utf8_len(b: u8) -> usize {
    match b {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// Decode one reference starting at `&`; returns the character and the
/// consumed length. Numeric references decode even without a trailing
/// semicolon; named references require one.
fn decode_one_ref(s: &str) -> Option<(char, usize)> {
    let rest = &s[1..];
    if let Some(num) = rest.strip_prefix('#') {
        let (hex, digits_start) = match num.bytes().next() {
            Some(b'x') | Some(b'X') => (true, 1),
            _ => (false, 0),
        };
        let digits = &num[digits_start..];
        let end = digits
            .bytes()
            .position(|b| !(if hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() }))
            .unwrap_or(digits.len());
        if end == 0 {
            return None;
        }
        let n = u32::from_str_radix(&digits[..end], if hex { 16 } else { 10 }).ok()?;
        let mut len = 1 + 1 + digits_start + end;
        if s.as_bytes().get(len) == Some(&b';') {
            len += 1;
        }
        return Some((char::from_u32(n).unwrap_or('\u{FFFD}'), len));
    }
    for (name, c) in NAMED_REFS {
        if rest.len() > name.len()
            && rest.starts_with(name)
            && rest.as_bytes()[name.len()] == b';'
        {
            return Some((*c, 1 + name.len() + 1));
        }
    }
    None
}

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "ftp", "mailto"];

/// Validate a decoded static URL prefix. `raw` is the original prefix,
/// used in diagnostics.
pub(crate) fn validate_url_prefix(decoded: &str, raw: &str) -> Result<(), String> {
    let scheme_end = decoded.find(|c| matches!(c, ':' | '/' | '?' | '#'));
    match scheme_end {
        Some(i) if decoded.as_bytes()[i] == b':' => {
            let scheme = decoded[..i].to_ascii_lowercase();
            if ALLOWED_SCHEMES.contains(&scheme.as_str()) {
                return Ok(());
            }
            if scheme == "data" && is_safe_media_data_prefix(&decoded[i + 1..]) {
                return Ok(());
            }
            Err(format!("URL prefix {raw:?} contains an unsafe scheme"))
        }
        Some(_) if decoded.starts_with(['/', '?', '#']) => Ok(()),
        Some(_) => Ok(()),
        None => {
            if decoded.starts_with(['?', '#']) {
                return Ok(());
            }
            // Without a ':' yet, a suffix could still complete a scheme
            // unless some character here can never appear in one.
            let scheme_char =
                |c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-');
            if decoded.chars().all(scheme_char) {
                Err(format!(
                    "URL prefix {raw:?} is unsafe; it might be interpreted as part of a scheme"
                ))
            } else {
                Ok(())
            }
        }
    }
}

fn is_safe_media_data_prefix(rest: &str) -> bool {
    let lower = rest.to_ascii_lowercase();
    (lower.starts_with("image/") || lower.starts_with("video/") || lower.starts_with("audio/"))
        && lower.contains(";base64,")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_charref_detection() {
        for (input, incomplete) in [
            ("&", true),
            ("javascript&", true),
            ("javascript&c", true),
            ("javascript&colon", true),
            ("javascript&blk1", true),
            ("javascript&#", true),
            ("javascript&#5", true),
            ("javascript&#x", true),
            ("javascript&#xa", true),
            ("javascript&#XA", true),
            ("javascript&#X3", true),
            ("javascript&x3A;", false),
            ("javascript&colon;", false),
            ("javascript&#58;", false),
        ] {
            assert_eq!(ends_with_incomplete_charref(input), incomplete, "input: {input:?}");
        }
    }

    #[test]
    fn decode_url_prefix_cases() {
        const WS: &str = " contains whitespace or control characters";
        const REF: &str = " ends with an incomplete HTML character reference";
        const PCT: &str = " ends with an incomplete percent-encoding character triplet";
        for (input, want, err) in [
            (" ", "", WS),
            (" javascript", "", WS),
            ("java\nscript&#58", "", WS),
            ("java script&#58;", "", WS),
            ("javascript&#5\t8", "", WS),
            ("javascript&#5&NewLine;8", "", WS),
            ("https://www.foo.com?q=bar&", "", REF),
            ("javascript&colon", "", REF),
            ("javascript&colon;", "javascript:", ""),
            ("javascript&#58;", "javascript:", ""),
            ("/fo%", "", PCT),
            ("/fo%6", "", PCT),
            ("/fo%6f", "/fo%6f", ""),
            ("/fo%6F", "/fo%6F", ""),
            ("foo&#37;3a", "foo%3a", ""),
            ("foo&#37;3A", "foo%3A", ""),
        ] {
            match decode_url_prefix(input) {
                Ok(got) => {
                    assert!(err.is_empty(), "{input:?}: expected error");
                    assert_eq!(got, want, "input: {input:?}");
                }
                Err(e) => {
                    assert!(!err.is_empty(), "{input:?}: unexpected error {e}");
                    assert!(e.contains(err), "{input:?}: error {e:?} does not contain {err:?}");
                }
            }
        }
    }

    #[test]
    fn validate_url_prefix_cases() {
        for (input, valid) in [
            ("http:", true),
            ("http://www.foo.com/", true),
            ("https://www.foo.com/", true),
            ("mailto://foo@foo.com.com/", true),
            ("ftp://foo.com/", true),
            ("data:image/png;base64,abc", true),
            ("data:video/mpeg;base64,abc", true),
            ("data:audio/ogg;base64,abc", true),
            ("tel:+1-234-567-8901", false),
            ("javascript:foo()", false),
            ("data:image/png,abc", false),
            ("data:text/html;base64,abc", false),
            ("//www.foo.com/", true),
            ("/path", true),
            ("/path/x", true),
            ("/path#x", true),
            ("/path?x", true),
            ("?q=", true),
            ("j", false),
            ("java", false),
            ("on", false),
            ("data-", false),
            ("javascript:", false),
            ("javascript:alert", false),
        ] {
            let got = validate_url_prefix(input, input);
            assert_eq!(got.is_ok(), valid, "input: {input:?}, got: {got:?}");
        }
    }

    #[test]
    fn decoded_refs_flow_into_validation() {
        let decoded = decode_url_prefix("https&colon;").expect("decode");
        assert!(validate_url_prefix(&decoded, "https&colon;").is_ok());
        let decoded = decode_url_prefix("javascript&#58;").expect("decode");
        assert!(validate_url_prefix(&decoded, "javascript&#58;").is_err());
        assert!(decode_url_prefix("?q&equals;").is_ok());
    }
}
