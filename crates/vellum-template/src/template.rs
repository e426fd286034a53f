//! Template sets: named templates sharing one namespace, with the
//! parse / clone / execute lifecycle.
//!
//! A set is mutable until its first execution. The first `execute`
//! lazily runs escape annotation over every template reachable from the
//! executed root, commits the rewrites atomically, and freezes the set:
//! later parses and clones are rejected, later executions are read-only
//! and safe to run concurrently.

use crate::context::Context;
use crate::error::{Error, ErrorCode};
use crate::escape::{escape_templates, EscapeOutcome};
use crate::sanitize;
use crate::source::{base_name, split_glob_pattern, TrustedFS, TrustedSource, TrustedTemplate};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, RwLock};
use vellum_safehtml::{unchecked, HTML};
use vellum_text::{Arg, Command, Funcs, Node, Tree, Value};

/// Handle to one named template in a shared namespace.
#[derive(Debug)]
pub struct Template {
    name: String,
    ns: Arc<Namespace>,
}

#[derive(Debug)]
struct Namespace {
    inner: RwLock<NsInner>,
}

#[derive(Debug)]
struct NsInner {
    /// Working trees, mutated once by escape annotation.
    templates: HashMap<String, Tree>,
    /// Unedited trees; per-context derivations clone from here.
    pristine: HashMap<String, Tree>,
    declared: HashSet<String>,
    funcs: Funcs,
    internal: Funcs,
    csp_compatible: bool,
    executed: bool,
    escape_results: HashMap<String, Option<Error>>,
    escape_output: HashMap<String, Context>,
}

impl Template {
    /// Create a new, empty template named `name`.
    pub fn new(name: &str) -> Template {
        let mut declared = HashSet::new();
        declared.insert(name.to_string());
        Template {
            name: name.to_string(),
            ns: Arc::new(Namespace {
                inner: RwLock::new(NsInner {
                    templates: HashMap::new(),
                    pristine: HashMap::new(),
                    declared,
                    funcs: Funcs::builtin(),
                    internal: sanitize::internal_funcs(),
                    csp_compatible: false,
                    executed: false,
                    escape_results: HashMap::new(),
                    escape_output: HashMap::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare another template in this namespace and return its handle.
    pub fn new_associated(&self, name: &str) -> Template {
        self.write().declared.insert(name.to_string());
        self.handle(name)
    }

    fn handle(&self, name: &str) -> Template {
        Template {
            name: name.to_string(),
            ns: Arc::clone(&self.ns),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, NsInner> {
        self.ns.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, NsInner> {
        self.ns.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register template functions. Panics on names that are not valid
    /// identifiers or collide with the reserved sanitizer namespace.
    pub fn funcs(&self, funcs: &[(&str, vellum_text::TemplateFn)]) -> Template {
        let mut g = self.write();
        for (name, f) in funcs {
            if name.starts_with('_') {
                panic!("function name {name:?} is reserved");
            }
            let valid = !name.is_empty()
                && name
                    .chars()
                    .enumerate()
                    .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
            if !valid {
                panic!("function name {name:?} is not a valid identifier");
            }
            g.funcs.register(*name, *f);
        }
        drop(g);
        self.handle(&self.name)
    }

    /// Enable CSP-compatibility checking for this namespace.
    pub fn csp_compatible(&self) -> Template {
        self.write().csp_compatible = true;
        self.handle(&self.name)
    }

    /// Parse template text given as a compile-time constant.
    pub fn parse(&self, text: &'static str) -> Result<Template, Error> {
        self.parse_named(&self.name.clone(), text)
    }

    /// Parse template text from a trusted origin.
    pub fn parse_from_trusted_template(&self, text: &TrustedTemplate) -> Result<Template, Error> {
        self.parse_named(&self.name.clone(), text.as_str())
    }

    /// Reject structural mutation once the set has executed. Runs before
    /// any filesystem access so the error does not depend on whether the
    /// named sources exist.
    fn check_can_parse(&self) -> Result<(), Error> {
        if self.read().executed {
            return Err(Error::new(
                ErrorCode::AfterExecute,
                "cannot Parse after Execute",
            ));
        }
        Ok(())
    }

    fn parse_named(&self, name: &str, text: &str) -> Result<Template, Error> {
        let mut g = self.write();
        if g.executed {
            return Err(Error::new(
                ErrorCode::AfterExecute,
                "cannot Parse after Execute",
            ));
        }
        let funcs = g.funcs.clone();
        let trees = vellum_text::parse(name, text, &|n| funcs.contains(n))?;
        for (tname, tree) in trees {
            if let Some(existing) = g.templates.get(&tname) {
                // Redefinition with an empty body keeps the old body.
                if tree.is_empty() && !existing.is_empty() {
                    continue;
                }
            }
            g.declared.insert(tname.clone());
            g.pristine.insert(tname.clone(), tree.clone());
            g.templates.insert(tname, tree);
        }
        drop(g);
        Ok(self.handle(name))
    }

    /// Parse the named files; each becomes a template named after its
    /// base name.
    pub fn parse_files(&self, srcs: &[TrustedSource]) -> Result<Template, Error> {
        self.check_can_parse()?;
        if srcs.is_empty() {
            return Err(Error::new(ErrorCode::Io, "no files named in call to parse_files"));
        }
        let mut last = None;
        for src in srcs {
            let text = std::fs::read_to_string(src.as_str())
                .map_err(|e| Error::new(ErrorCode::Io, format!("{}: {e}", src.as_str())))?;
            let name = base_name(src.as_str()).to_string();
            last = Some(self.parse_named(&name, &text)?);
        }
        last.ok_or_else(|| Error::new(ErrorCode::Io, "no files named in call to parse_files"))
    }

    /// Parse every file matched by the glob pattern.
    pub fn parse_glob(&self, pattern: TrustedSource) -> Result<Template, Error> {
        self.check_can_parse()?;
        let (dir, file_pattern) = split_glob_pattern(pattern.as_str());
        let fs = crate::source::trusted_fs_from_trusted_source(crate::source::raw_trusted_source(
            if dir.is_empty() { "." } else { dir },
        ));
        let names = fs.glob(file_pattern)?;
        if names.is_empty() {
            return Err(Error::new(
                ErrorCode::Io,
                format!("pattern matches no files: {:?}", pattern.as_str()),
            ));
        }
        let mut last = None;
        for name in names {
            let text = fs.read(&name)?;
            last = Some(self.parse_named(&name, &text)?);
        }
        last.ok_or_else(|| Error::new(ErrorCode::Io, "pattern matches no files"))
    }

    /// Parse the files matched by `patterns` inside `fs`.
    pub fn parse_fs(&self, fs: &TrustedFS, patterns: &[&str]) -> Result<Template, Error> {
        self.check_can_parse()?;
        let mut last = None;
        for pattern in patterns {
            let names = fs.glob(pattern)?;
            if names.is_empty() {
                return Err(Error::new(
                    ErrorCode::Io,
                    format!("pattern matches no files: {pattern:?}"),
                ));
            }
            for name in names {
                let text = fs.read(&name)?;
                last = Some(self.parse_named(&name, &text)?);
            }
        }
        last.ok_or_else(|| Error::new(ErrorCode::Io, "no patterns named in call to parse_fs"))
    }

    /// Deep-copy the namespace. Rejected once the set has executed.
    pub fn try_clone(&self) -> Result<Template, Error> {
        let g = self.read();
        if g.executed {
            return Err(Error::new(
                ErrorCode::AfterExecute,
                format!("cannot Clone {:?} after it has executed", self.name),
            ));
        }
        let ns = Namespace {
            inner: RwLock::new(NsInner {
                templates: g.templates.clone(),
                pristine: g.pristine.clone(),
                declared: g.declared.clone(),
                funcs: g.funcs.clone(),
                internal: sanitize::internal_funcs(),
                csp_compatible: g.csp_compatible,
                executed: false,
                escape_results: HashMap::new(),
                escape_output: HashMap::new(),
            }),
        };
        Ok(Template {
            name: self.name.clone(),
            ns: Arc::new(ns),
        })
    }

    /// Handle to the named associated template, if it exists.
    pub fn lookup(&self, name: &str) -> Option<Template> {
        let g = self.read();
        if g.declared.contains(name) || g.templates.contains_key(name) {
            drop(g);
            return Some(self.handle(name));
        }
        None
    }

    /// Handles to every defined template in the namespace.
    pub fn templates(&self) -> Vec<Template> {
        let g = self.read();
        let mut names: Vec<String> = g.templates.keys().cloned().collect();
        drop(g);
        names.sort();
        names.iter().map(|n| self.handle(n)).collect()
    }

    /// Human-readable list of defined templates, or the empty string.
    pub fn defined_templates(&self) -> String {
        let g = self.read();
        let mut names: Vec<String> = g.templates.keys().map(|n| format!("{n:?}")).collect();
        drop(g);
        if names.is_empty() {
            return String::new();
        }
        names.sort();
        format!("; defined templates are: {}", names.join(", "))
    }

    /// Execute this template with `data`, writing sanitized output.
    pub fn execute(&self, w: &mut dyn Write, data: &Value) -> Result<(), Error> {
        self.execute_template(w, &self.name.clone(), data)
    }

    /// Execute the named associated template.
    pub fn execute_template(&self, w: &mut dyn Write, name: &str, data: &Value) -> Result<(), Error> {
        self.ensure_escaped(name)?;
        let g = self.read();
        let tree = g.templates.get(name).ok_or_else(|| {
            Error::new(
                ErrorCode::NoSuchTemplate,
                format!("{name:?} is an incomplete or empty template"),
            )
        })?;
        vellum_text::execute(tree, &g.templates, &g.funcs, &g.internal, w, data).map_err(Error::from)
    }

    /// Execute into an HTML value instead of a writer.
    pub fn execute_to_html(&self, data: &Value) -> Result<HTML, Error> {
        self.execute_template_to_html(&self.name.clone(), data)
    }

    pub fn execute_template_to_html(&self, name: &str, data: &Value) -> Result<HTML, Error> {
        let mut buf = Vec::new();
        self.execute_template(&mut buf, name, data)?;
        let s = String::from_utf8(buf)
            .map_err(|e| Error::new(ErrorCode::Exec, format!("output is not UTF-8: {e}")))?;
        Ok(unchecked::html_from_string_known_to_satisfy_type_contract(&s))
    }

    /// Run escape annotation for the root `name` exactly once, caching
    /// either success or the resulting error.
    fn ensure_escaped(&self, name: &str) -> Result<(), Error> {
        {
            let g = self.read();
            if let Some(res) = g.escape_results.get(name) {
                return match res {
                    None => Ok(()),
                    Some(e) => Err(e.clone()),
                };
            }
        }
        let mut g = self.write();
        g.executed = true;
        if !g.escape_results.contains_key(name) {
            let result = match escape_templates(&g.pristine, &g.escape_output, name, g.csp_compatible)
            {
                Ok(outcome) => {
                    commit(&mut g, outcome);
                    None
                }
                Err(e) => Some(e),
            };
            g.escape_results.insert(name.to_string(), result);
        }
        match g.escape_results.get(name) {
            Some(None) => Ok(()),
            Some(Some(e)) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Apply the outcome of an escape pass to the working trees.
fn commit(g: &mut NsInner, outcome: EscapeOutcome) {
    for (name, tree) in outcome.derived {
        g.declared.insert(name.clone());
        g.pristine.insert(name.clone(), tree.clone());
        g.templates.insert(name, tree);
    }
    let mut affected: HashSet<String> = HashSet::new();
    for key in outcome.action_cmds.keys() {
        affected.insert(key.0.clone());
    }
    for key in outcome.elided.iter() {
        affected.insert(key.0.clone());
    }
    for key in outcome.text_edits.keys() {
        affected.insert(key.0.clone());
    }
    for key in outcome.call_renames.keys() {
        affected.insert(key.0.clone());
    }
    for key in outcome.final_replacements.keys() {
        affected.insert(key.0.clone());
    }
    for tname in affected {
        let Some(tree) = g.templates.get_mut(&tname) else {
            continue;
        };
        tree.for_each_node_mut(&mut |node| match node {
            Node::Action { id, pipe, elided, .. } => {
                let key = (tname.clone(), *id);
                if outcome.elided.contains(&key) {
                    *elided = true;
                }
                if let Some(new_ident) = outcome.final_replacements.get(&key) {
                    if let Some(cmd) = pipe.cmds.last_mut() {
                        if let Some(Arg::Ident(name)) = cmd.args.first_mut() {
                            *name = (*new_ident).to_string();
                        }
                    }
                }
                if let Some(cmds) = outcome.action_cmds.get(&key) {
                    let offset = pipe.cmds.first().map(|c| c.offset).unwrap_or(0);
                    for fname in cmds {
                        pipe.cmds.push(Command {
                            args: vec![Arg::Ident((*fname).to_string())],
                            offset,
                        });
                    }
                }
            }
            Node::Text { id, text, .. } => {
                if let Some(new_text) = outcome.text_edits.get(&(tname.clone(), *id)) {
                    *text = new_text.clone();
                }
            }
            Node::TemplateCall { id, name, .. } => {
                if let Some(new_name) = outcome.call_renames.get(&(tname.clone(), *id)) {
                    *name = new_name.clone();
                }
            }
            _ => {}
        });
    }
    g.escape_output.extend(outcome.output);
}

/// Parse a constant template and execute it with no data, panicking on
/// any error. Convenience for statically known fragments.
pub fn must_parse_and_execute_to_html(text: &'static str) -> HTML {
    let t = Template::new("");
    let t = t.parse(text).unwrap_or_else(|e| panic!("parse: {e}"));
    t.execute_to_html(&Value::Null)
        .unwrap_or_else(|e| panic!("execute: {e}"))
}
