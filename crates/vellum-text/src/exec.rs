//! Tree-walking executor.
//!
//! Executes a parsed [`Tree`] against a data [`Value`], writing output to
//! a caller-provided sink. Output bytes are produced strictly in
//! traversal order; any sink error aborts execution immediately.
//!
//! Function resolution consults an internal table first. Internal names
//! start with `_` and cannot appear in parsed source (the parser rejects
//! them as undefined), so they are reachable only through rewritten
//! pipelines.

use crate::funcs::Funcs;
use crate::parse::{column_of, line_of, Arg, Command, Node, Pipeline, Tree};
use crate::value::Value;
use std::collections::HashMap;
use std::io::Write;

const MAX_TEMPLATE_DEPTH: usize = 10_000;

/// Runtime execution error; the message carries full location context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecError {
    pub message: String,
}

impl ExecError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExecError {}

/// Execute `tree` with `data`, writing output to `w`.
pub fn execute(
    tree: &Tree,
    trees: &HashMap<String, Tree>,
    funcs: &Funcs,
    internal: &Funcs,
    w: &mut dyn Write,
    data: &Value,
) -> Result<(), ExecError> {
    let mut ex = Executor {
        trees,
        funcs,
        internal,
        vars: Vec::new(),
        depth: 0,
    };
    ex.walk_list(tree, &tree.root, data, w)
}

struct Executor<'a> {
    trees: &'a HashMap<String, Tree>,
    funcs: &'a Funcs,
    internal: &'a Funcs,
    vars: Vec<(String, Value)>,
    depth: usize,
}

impl<'a> Executor<'a> {
    fn error(&self, tree: &Tree, offset: usize, msg: impl Into<String>) -> ExecError {
        ExecError::new(format!(
            "template: {}:{}:{}: {}",
            tree.name,
            line_of(&tree.source, offset),
            column_of(&tree.source, offset),
            msg.into()
        ))
    }

    fn walk_list(
        &mut self,
        tree: &Tree,
        nodes: &[Node],
        dot: &Value,
        w: &mut dyn Write,
    ) -> Result<(), ExecError> {
        for node in nodes {
            self.walk(tree, node, dot, w)?;
        }
        Ok(())
    }

    fn walk(
        &mut self,
        tree: &Tree,
        node: &Node,
        dot: &Value,
        w: &mut dyn Write,
    ) -> Result<(), ExecError> {
        match node {
            Node::Text { text, .. } => w
                .write_all(text.as_bytes())
                .map_err(|e| ExecError::new(format!("template: {}: write error: {e}", tree.name))),
            Node::Action { pipe, elided, .. } => {
                if *elided {
                    return Ok(());
                }
                let mark = self.vars.len();
                let v = self.eval_pipeline(tree, pipe, dot)?;
                // A pure declaration produces no output.
                if pipe.decls.is_empty() {
                    w.write_all(v.display_string().as_bytes()).map_err(|e| {
                        ExecError::new(format!("template: {}: write error: {e}", tree.name))
                    })?;
                }
                self.truncate_vars(mark, pipe, v);
                Ok(())
            }
            Node::If { pipe, then_list, else_list, .. } => {
                let mark = self.vars.len();
                let v = self.eval_pipeline(tree, pipe, dot)?;
                let truthy = v.is_truthy();
                self.push_decls(pipe, v);
                let r = if truthy {
                    self.walk_list(tree, then_list, dot, w)
                } else {
                    self.walk_list(tree, else_list, dot, w)
                };
                self.vars.truncate(mark);
                r
            }
            Node::With { pipe, list, else_list, .. } => {
                let mark = self.vars.len();
                let v = self.eval_pipeline(tree, pipe, dot)?;
                if v.is_truthy() {
                    self.push_decls(pipe, v.clone());
                    let r = self.walk_list(tree, list, &v, w);
                    self.vars.truncate(mark);
                    r
                } else {
                    self.vars.truncate(mark);
                    self.walk_list(tree, else_list, dot, w)
                }
            }
            Node::Range { pipe, list, else_list, offset, .. } => {
                let mark = self.vars.len();
                let v = self.eval_pipeline(tree, pipe, dot)?;
                match &v {
                    Value::Array(items) if !items.is_empty() => {
                        for (i, item) in items.iter().enumerate() {
                            self.push_range_vars(pipe, Value::Int(i as i64), item.clone());
                            let r = self.walk_list(tree, list, item, w);
                            self.vars.truncate(mark);
                            r?;
                        }
                        Ok(())
                    }
                    Value::Object(map) if !map.is_empty() => {
                        for (k, item) in map.iter() {
                            self.push_range_vars(pipe, Value::Str(k.clone()), item.clone());
                            let r = self.walk_list(tree, list, item, w);
                            self.vars.truncate(mark);
                            r?;
                        }
                        Ok(())
                    }
                    Value::Array(_) | Value::Object(_) | Value::Null => {
                        self.walk_list(tree, else_list, dot, w)
                    }
                    _ => Err(self.error(tree, *offset, "range can't iterate over value")),
                }
            }
            Node::TemplateCall { name, pipe, offset, .. } => {
                let called = self.trees.get(name).ok_or_else(|| {
                    ExecError::new(format!("template: {}: no such template {:?}", tree.name, name))
                })?;
                let dot2 = match pipe {
                    Some(p) => {
                        let mark = self.vars.len();
                        let v = self.eval_pipeline(tree, p, dot)?;
                        self.vars.truncate(mark);
                        v
                    }
                    None => Value::Null,
                };
                self.depth += 1;
                if self.depth > MAX_TEMPLATE_DEPTH {
                    return Err(self.error(tree, *offset, "exceeded maximum template depth"));
                }
                // Template invocations get a fresh variable scope.
                let saved = std::mem::take(&mut self.vars);
                let r = self.walk_list(called, &called.root, &dot2, w);
                self.vars = saved;
                self.depth -= 1;
                r
            }
        }
    }

    fn push_decls(&mut self, pipe: &Pipeline, v: Value) {
        if let Some(name) = pipe.decls.first() {
            self.vars.push((name.clone(), v));
        }
    }

    fn push_range_vars(&mut self, pipe: &Pipeline, key: Value, item: Value) {
        match pipe.decls.len() {
            0 => {}
            1 => self.vars.push((pipe.decls[0].clone(), item)),
            _ => {
                self.vars.push((pipe.decls[0].clone(), key));
                self.vars.push((pipe.decls[1].clone(), item));
            }
        }
    }

    fn truncate_vars(&mut self, mark: usize, pipe: &Pipeline, v: Value) {
        self.vars.truncate(mark);
        self.push_decls(pipe, v);
    }

    fn eval_pipeline(&mut self, tree: &Tree, pipe: &Pipeline, dot: &Value) -> Result<Value, ExecError> {
        let mut value: Option<Value> = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(tree, cmd, dot, value)?);
        }
        Ok(value.unwrap_or(Value::Null))
    }

    fn eval_command(
        &mut self,
        tree: &Tree,
        cmd: &Command,
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        match &cmd.args[0] {
            Arg::Ident(name) => {
                let func = if name.starts_with('_') {
                    self.internal.get(name)
                } else {
                    self.funcs.get(name)
                }
                .ok_or_else(|| {
                    self.error(tree, cmd.offset, format!("{name:?} is not a defined function"))
                })?;
                let mut args = Vec::with_capacity(cmd.args.len());
                for a in &cmd.args[1..] {
                    args.push(self.eval_arg(tree, cmd, a, dot)?);
                }
                if let Some(p) = piped {
                    args.push(p);
                }
                func(&args).map_err(|e| {
                    self.error(
                        tree,
                        cmd.offset,
                        format!(
                            "executing {:?} at <{}>: error calling {}: {}",
                            tree.name, name, name, e.message
                        ),
                    )
                })
            }
            first => {
                if cmd.args.len() > 1 {
                    return Err(self.error(tree, cmd.offset, "can't give argument to non-function"));
                }
                if piped.is_some() {
                    return Err(self.error(tree, cmd.offset, "non-function in pipeline stage"));
                }
                self.eval_arg(tree, cmd, first, dot)
            }
        }
    }

    fn eval_arg(&mut self, tree: &Tree, cmd: &Command, arg: &Arg, dot: &Value) -> Result<Value, ExecError> {
        Ok(match arg {
            Arg::Dot => dot.clone(),
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Int(n) => Value::Int(*n),
            Arg::Float(f) => Value::Float(*f),
            Arg::Str(s) => Value::from(s.as_str()),
            Arg::Field(chain) => lookup_fields(dot, chain),
            Arg::Var { name, fields } => {
                let base = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        self.error(tree, cmd.offset, format!("undefined variable ${name}"))
                    })?;
                lookup_fields(&base, fields)
            }
            Arg::Ident(name) => {
                return Err(self.error(
                    tree,
                    cmd.offset,
                    format!("unexpected function {name:?} in operand position"),
                ))
            }
        })
    }
}

fn lookup_fields(base: &Value, chain: &[String]) -> Value {
    let mut v = base.clone();
    for key in chain {
        v = match &v {
            Value::Object(map) => map.get(key.as_str()).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;
    use serde_json::json;

    fn run(src: &str, data: Value) -> Result<String, ExecError> {
        let funcs = Funcs::builtin();
        let trees = parse("t", src, &|n| funcs.contains(n)).expect("parse");
        let internal = Funcs::empty();
        let mut out = Vec::new();
        execute(&trees["t"], &trees, &funcs, &internal, &mut out, &data)?;
        Ok(String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn literal_and_field() {
        let got = run("Hello, {{.Name}}!", Value::from(json!({"Name": "World"}))).expect("exec");
        assert_eq!(got, "Hello, World!");
    }

    #[test]
    fn if_else() {
        let got = run("{{if .C}}yes{{else}}no{{end}}", Value::from(json!({"C": false}))).expect("exec");
        assert_eq!(got, "no");
    }

    #[test]
    fn range_over_array_and_else() {
        let got = run("{{range .A}}[{{.}}]{{else}}none{{end}}", Value::from(json!({"A": [1, 2]})))
            .expect("exec");
        assert_eq!(got, "[1][2]");
        let got = run("{{range .A}}x{{else}}none{{end}}", Value::from(json!({"A": []}))).expect("exec");
        assert_eq!(got, "none");
    }

    #[test]
    fn range_over_object_is_key_sorted() {
        let got = run(
            "{{range $k, $v := .M}}{{$k}}={{$v}};{{end}}",
            Value::from(json!({"M": {"b": 2, "a": 1}})),
        )
        .expect("exec");
        assert_eq!(got, "a=1;b=2;");
    }

    #[test]
    fn with_rebinds_dot() {
        let got = run("{{with .X}}<{{.}}>{{end}}", Value::from(json!({"X": "v"}))).expect("exec");
        assert_eq!(got, "<v>");
    }

    #[test]
    fn variables_declared_and_used() {
        let got = run(r#"{{with "w"}}{{$msg := .}}Hello, {{$msg}}!{{end}}"#, Value::Null).expect("exec");
        assert_eq!(got, "Hello, w!");
    }

    #[test]
    fn pipeline_pipes_value_as_last_arg() {
        let got = run(r#"{{"<x>" | html}}"#, Value::Null).expect("exec");
        assert_eq!(got, "&lt;x&gt;");
    }

    #[test]
    fn template_call_passes_dot() {
        let src = r#"{{template "inner" .X}}{{define "inner"}}[{{.}}]{{end}}"#;
        let got = run(src, Value::from(json!({"X": 7}))).expect("exec");
        assert_eq!(got, "[7]");
    }

    #[test]
    fn missing_template_errors() {
        let err = run(r#"{{template "foo"}}"#, Value::Null).expect_err("should fail");
        assert!(err.message.contains(r#"no such template "foo""#), "{}", err.message);
    }

    #[test]
    fn nil_renders_as_nil_literal() {
        let got = run("{{.}}", Value::Null).expect("exec");
        assert_eq!(got, "<nil>");
    }

    #[test]
    fn func_error_carries_location() {
        let err = run("a\n{{printf \"%z\" 1}}", Value::Null).expect_err("should fail");
        assert!(err.message.starts_with("template: t:2:"), "{}", err.message);
        assert!(err.message.contains("error calling printf"), "{}", err.message);
    }
}
