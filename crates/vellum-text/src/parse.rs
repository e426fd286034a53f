//! Parser producing rewritable template trees.
//!
//! A parse call yields one [`Tree`] per template: the main template plus
//! one per `{{define "name"}}` block. Action pipelines keep their source
//! offsets and every node carries a stable [`NodeId`] so a later pass can
//! address and rewrite individual nodes.

use crate::lexer::{lex, Item, Token};
use std::collections::HashMap;
use std::sync::Arc;

pub type NodeId = u32;

#[derive(Debug, Clone)]
pub enum Node {
    Text {
        id: NodeId,
        text: String,
        offset: usize,
    },
    Action {
        id: NodeId,
        pipe: Pipeline,
        /// Byte range of the whole `{{...}}` in the source.
        offset: usize,
        end: usize,
        /// Set by a rewrite pass; an elided action produces no output.
        elided: bool,
    },
    If {
        id: NodeId,
        pipe: Pipeline,
        then_list: Vec<Node>,
        else_list: Vec<Node>,
        offset: usize,
    },
    Range {
        id: NodeId,
        pipe: Pipeline,
        list: Vec<Node>,
        else_list: Vec<Node>,
        offset: usize,
    },
    With {
        id: NodeId,
        pipe: Pipeline,
        list: Vec<Node>,
        else_list: Vec<Node>,
        offset: usize,
    },
    TemplateCall {
        id: NodeId,
        name: String,
        pipe: Option<Pipeline>,
        offset: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Variables declared with `:=`, without the `$`.
    pub decls: Vec<String>,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone)]
pub struct Command {
    pub args: Vec<Arg>,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub enum Arg {
    Dot,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// `.A.B` relative to dot.
    Field(Vec<String>),
    /// `$name.A.B`.
    Var { name: String, fields: Vec<String> },
    /// Function name in command position.
    Ident(String),
}

/// A parsed template body plus the source it was parsed from.
#[derive(Debug, Clone)]
pub struct Tree {
    pub name: String,
    pub source: Arc<str>,
    pub root: Vec<Node>,
}

impl Tree {
    /// True when the tree contains nothing but whitespace text.
    pub fn is_empty(&self) -> bool {
        fn empty(nodes: &[Node]) -> bool {
            nodes.iter().all(|n| match n {
                Node::Text { text, .. } => text.trim().is_empty(),
                _ => false,
            })
        }
        empty(&self.root)
    }

    /// Apply `f` to every node in the tree, depth first.
    pub fn for_each_node_mut(&mut self, f: &mut dyn FnMut(&mut Node)) {
        fn walk(nodes: &mut [Node], f: &mut dyn FnMut(&mut Node)) {
            for n in nodes.iter_mut() {
                f(n);
                match n {
                    Node::If { then_list, else_list, .. } => {
                        walk(then_list, f);
                        walk(else_list, f);
                    }
                    Node::Range { list, else_list, .. } | Node::With { list, else_list, .. } => {
                        walk(list, f);
                        walk(else_list, f);
                    }
                    _ => {}
                }
            }
        }
        walk(&mut self.root, f);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub template: String,
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "template: {}:{}: {}", self.template, self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// 1-based line of a byte offset.
pub fn line_of(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    1 + source[..offset].matches('\n').count()
}

/// 0-based column (byte offset within the line) of a byte offset.
pub fn column_of(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    match source[..offset].rfind('\n') {
        Some(nl) => offset - nl - 1,
        None => offset,
    }
}

/// Parse `text` into the main tree named `name` plus any define blocks.
///
/// `known_func` is consulted for every identifier in command position;
/// unknown names are a parse error.
pub fn parse(
    name: &str,
    text: &str,
    known_func: &dyn Fn(&str) -> bool,
) -> Result<HashMap<String, Tree>, ParseError> {
    let source: Arc<str> = Arc::from(text);
    let items = lex(text).map_err(|e| ParseError {
        template: name.to_string(),
        line: line_of(text, e.offset),
        message: e.message,
    })?;
    let mut p = Parser {
        name: name.to_string(),
        source: source.clone(),
        items,
        idx: 0,
        next_id: 0,
        trees: HashMap::new(),
        known_func,
    };
    let root = p.parse_list(&mut ListEnd::Eof)?;
    let main = Tree {
        name: name.to_string(),
        source,
        root,
    };
    p.trees.insert(name.to_string(), main);
    Ok(p.trees)
}

enum ListEnd {
    Eof,
    /// `{{end}}` closes the list; `{{else}}` may also stop it.
    EndOrElse(EndState),
}

#[derive(PartialEq)]
enum EndState {
    End,
    Else,
    ElseIf,
}

struct Parser<'a> {
    name: String,
    source: Arc<str>,
    items: Vec<Item>,
    idx: usize,
    next_id: NodeId,
    trees: HashMap<String, Tree>,
    known_func: &'a dyn Fn(&str) -> bool,
}

impl<'a> Parser<'a> {
    fn error(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            template: self.name.clone(),
            line: line_of(&self.source, offset),
            message: message.into(),
        }
    }

    fn id(&mut self) -> NodeId {
        self.next_id += 1;
        self.next_id
    }

    fn peek(&self) -> Option<&Item> {
        self.items.get(self.idx)
    }

    fn next(&mut self) -> Option<Item> {
        let item = self.items.get(self.idx).cloned();
        if item.is_some() {
            self.idx += 1;
        }
        item
    }

    fn expect_right_delim(&mut self, context: &str) -> Result<usize, ParseError> {
        match self.next() {
            Some(Item { token: Token::RightDelim, offset }) => Ok(offset + 2),
            Some(item) => Err(self.error(item.offset, format!("unexpected {:?} in {}", item.token, context))),
            None => Err(self.error(self.source.len(), format!("unexpected EOF in {}", context))),
        }
    }

    /// Parse nodes until EOF or a closing `{{end}}`/`{{else}}`.
    fn parse_list(&mut self, end: &mut ListEnd) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            let item = match self.next() {
                Some(i) => i,
                None => {
                    if let ListEnd::EndOrElse(_) = end {
                        return Err(self.error(self.source.len(), "unexpected EOF: missing {{end}}"));
                    }
                    return Ok(nodes);
                }
            };
            match item.token {
                Token::Text(text) => {
                    let id = self.id();
                    nodes.push(Node::Text { id, text, offset: item.offset });
                }
                Token::LeftDelim => {
                    let action_offset = item.offset;
                    // Keywords are plain idents at this point.
                    let keyword = match self.peek() {
                        Some(Item { token: Token::Ident(w), .. }) => Some(w.clone()),
                        _ => None,
                    };
                    match keyword.as_deref() {
                        Some("if") => {
                            self.next();
                            nodes.push(self.parse_branch(action_offset, BranchKind::If)?);
                        }
                        Some("range") => {
                            self.next();
                            nodes.push(self.parse_branch(action_offset, BranchKind::Range)?);
                        }
                        Some("with") => {
                            self.next();
                            nodes.push(self.parse_branch(action_offset, BranchKind::With)?);
                        }
                        Some("template") => {
                            self.next();
                            nodes.push(self.parse_template_call(action_offset)?);
                        }
                        Some("define") => {
                            self.next();
                            self.parse_define(action_offset)?;
                        }
                        Some("end") => {
                            self.next();
                            self.expect_right_delim("end clause")?;
                            match end {
                                ListEnd::EndOrElse(state) => {
                                    *state = EndState::End;
                                    return Ok(nodes);
                                }
                                ListEnd::Eof => {
                                    return Err(self.error(action_offset, "unexpected {{end}}"))
                                }
                            }
                        }
                        Some("else") => {
                            self.next();
                            let else_if = matches!(
                                self.peek(),
                                Some(Item { token: Token::Ident(w), .. }) if w == "if"
                            );
                            match end {
                                ListEnd::EndOrElse(state) => {
                                    if else_if {
                                        self.next();
                                        *state = EndState::ElseIf;
                                    } else {
                                        self.expect_right_delim("else clause")?;
                                        *state = EndState::Else;
                                    }
                                    return Ok(nodes);
                                }
                                ListEnd::Eof => {
                                    return Err(self.error(action_offset, "unexpected {{else}}"))
                                }
                            }
                        }
                        _ => {
                            let pipe = self.parse_pipeline(action_offset)?;
                            let end_offset = self.expect_right_delim("action")?;
                            let id = self.id();
                            nodes.push(Node::Action {
                                id,
                                pipe,
                                offset: action_offset,
                                end: end_offset,
                                elided: false,
                            });
                        }
                    }
                }
                other => {
                    return Err(self.error(item.offset, format!("unexpected token {other:?}")));
                }
            }
        }
    }

    fn parse_branch(&mut self, offset: usize, kind: BranchKind) -> Result<Node, ParseError> {
        let pipe = self.parse_pipeline(offset)?;
        self.expect_right_delim(kind.name())?;
        let mut state = ListEnd::EndOrElse(EndState::End);
        let list = self.parse_list(&mut state)?;
        let else_list = match state {
            ListEnd::EndOrElse(EndState::End) => Vec::new(),
            ListEnd::EndOrElse(EndState::Else) => {
                let mut inner = ListEnd::EndOrElse(EndState::End);
                let l = self.parse_list(&mut inner)?;
                match inner {
                    ListEnd::EndOrElse(EndState::End) => l,
                    _ => return Err(self.error(offset, "expected {{end}} after {{else}}")),
                }
            }
            ListEnd::EndOrElse(EndState::ElseIf) => {
                // `{{else if ...}}` nests a fresh if node in the else list.
                vec![self.parse_branch(offset, BranchKind::If)?]
            }
            ListEnd::Eof => Vec::new(),
        };
        let id = self.id();
        Ok(match kind {
            BranchKind::If => Node::If { id, pipe, then_list: list, else_list, offset },
            BranchKind::Range => Node::Range { id, pipe, list, else_list, offset },
            BranchKind::With => Node::With { id, pipe, list, else_list, offset },
        })
    }

    fn parse_template_call(&mut self, offset: usize) -> Result<Node, ParseError> {
        let name = match self.next() {
            Some(Item { token: Token::Str(s), .. }) => s,
            Some(item) => {
                return Err(self.error(item.offset, "expected template name as a quoted string"))
            }
            None => return Err(self.error(offset, "unexpected EOF in template clause")),
        };
        let pipe = match self.peek() {
            Some(Item { token: Token::RightDelim, .. }) => None,
            _ => Some(self.parse_pipeline(offset)?),
        };
        self.expect_right_delim("template clause")?;
        let id = self.id();
        Ok(Node::TemplateCall { id, name, pipe, offset })
    }

    fn parse_define(&mut self, offset: usize) -> Result<(), ParseError> {
        let name = match self.next() {
            Some(Item { token: Token::Str(s), .. }) => s,
            Some(item) => {
                return Err(self.error(item.offset, "expected template name as a quoted string"))
            }
            None => return Err(self.error(offset, "unexpected EOF in define clause")),
        };
        self.expect_right_delim("define clause")?;
        let mut state = ListEnd::EndOrElse(EndState::End);
        let root = self.parse_list(&mut state)?;
        if !matches!(state, ListEnd::EndOrElse(EndState::End)) {
            return Err(self.error(offset, "expected {{end}} to close define"));
        }
        let tree = Tree {
            name: name.clone(),
            source: self.source.clone(),
            root,
        };
        // Redefinition with an empty body is a no-op.
        if let Some(existing) = self.trees.get(&name) {
            if tree.is_empty() && !existing.is_empty() {
                return Ok(());
            }
        }
        self.trees.insert(name, tree);
        Ok(())
    }

    fn parse_pipeline(&mut self, action_offset: usize) -> Result<Pipeline, ParseError> {
        let mut decls = Vec::new();
        // Lookahead for `$a :=` or `$a, $b :=`.
        if let Some(Item { token: Token::Variable(_), .. }) = self.peek() {
            let save = self.idx;
            let mut names = Vec::new();
            loop {
                match self.next() {
                    Some(Item { token: Token::Variable(n), .. }) => names.push(n),
                    _ => {
                        names.clear();
                        break;
                    }
                }
                match self.peek() {
                    Some(Item { token: Token::Comma, .. }) => {
                        self.next();
                    }
                    Some(Item { token: Token::Declare, .. }) => {
                        self.next();
                        break;
                    }
                    _ => {
                        names.clear();
                        break;
                    }
                }
            }
            if names.is_empty() {
                self.idx = save;
            } else {
                decls = names;
            }
        }
        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(action_offset)?;
            cmds.push(cmd);
            match self.peek() {
                Some(Item { token: Token::Pipe, .. }) => {
                    self.next();
                }
                _ => break,
            }
        }
        Ok(Pipeline { decls, cmds })
    }

    fn parse_command(&mut self, action_offset: usize) -> Result<Command, ParseError> {
        let mut args = Vec::new();
        let mut offset = action_offset;
        loop {
            let item = match self.peek() {
                Some(i) => i.clone(),
                None => return Err(self.error(action_offset, "unexpected EOF in pipeline")),
            };
            let arg = match item.token {
                Token::RightDelim | Token::Pipe => break,
                Token::Field(chain) => {
                    self.next();
                    if chain.is_empty() {
                        Arg::Dot
                    } else {
                        Arg::Field(chain)
                    }
                }
                Token::Variable(name) => {
                    self.next();
                    let fields = match self.peek() {
                        Some(Item { token: Token::Field(chain), .. }) if !chain.is_empty() => {
                            let chain = chain.clone();
                            self.next();
                            chain
                        }
                        _ => Vec::new(),
                    };
                    Arg::Var { name, fields }
                }
                Token::Str(s) => {
                    self.next();
                    Arg::Str(s)
                }
                Token::Int(n) => {
                    self.next();
                    Arg::Int(n)
                }
                Token::Float(n) => {
                    self.next();
                    Arg::Float(n)
                }
                Token::Bool(b) => {
                    self.next();
                    Arg::Bool(b)
                }
                Token::Ident(name) => {
                    self.next();
                    if !args.is_empty() {
                        return Err(self.error(
                            item.offset,
                            format!("unexpected function {name:?} in operand position"),
                        ));
                    }
                    if !(self.known_func)(&name) {
                        return Err(self.error(item.offset, format!("function {name:?} not defined")));
                    }
                    Arg::Ident(name)
                }
                other => {
                    return Err(self.error(item.offset, format!("unexpected token {other:?} in command")))
                }
            };
            if args.is_empty() {
                offset = item.offset;
            }
            args.push(arg);
        }
        if args.is_empty() {
            return Err(self.error(offset, "missing value for command"));
        }
        Ok(Command { args, offset })
    }
}

enum BranchKind {
    If,
    Range,
    With,
}

impl BranchKind {
    fn name(&self) -> &'static str {
        match self {
            BranchKind::If => "if clause",
            BranchKind::Range => "range clause",
            BranchKind::With => "with clause",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_func(_: &str) -> bool {
        true
    }

    fn parse_one(src: &str) -> Tree {
        let mut trees = parse("t", src, &any_func).expect("parse");
        trees.remove("t").expect("main tree")
    }

    #[test]
    fn text_and_action() {
        let tree = parse_one("a{{.X}}b");
        assert_eq!(tree.root.len(), 3);
        match &tree.root[1] {
            Node::Action { pipe, .. } => {
                assert_eq!(pipe.cmds.len(), 1);
                assert!(matches!(pipe.cmds[0].args[0], Arg::Field(_)));
            }
            n => panic!("unexpected node {n:?}"),
        }
    }

    #[test]
    fn if_else_chain() {
        let tree = parse_one("{{if .A}}x{{else if .B}}y{{else}}z{{end}}");
        match &tree.root[0] {
            Node::If { else_list, .. } => match &else_list[0] {
                Node::If { else_list, .. } => assert_eq!(else_list.len(), 1),
                n => panic!("expected nested if, got {n:?}"),
            },
            n => panic!("expected if, got {n:?}"),
        }
    }

    #[test]
    fn define_blocks_are_split_out() {
        let trees = parse("root", r#"{{define "a"}}foo{{end}} {{define "b"}}bar{{end}}"#, &any_func)
            .expect("parse");
        assert!(trees.contains_key("a"));
        assert!(trees.contains_key("b"));
        assert!(trees["root"].is_empty());
    }

    #[test]
    fn empty_redefinition_is_noop() {
        let trees = parse("root", r#"{{define "a"}}foo{{end}}{{define "a"}}{{end}}"#, &any_func)
            .expect("parse");
        assert!(!trees["a"].is_empty());
    }

    #[test]
    fn unknown_function_rejected() {
        let known = |n: &str| n == "html";
        let err = parse("t", "{{ bogus 1 }}", &known).expect_err("should fail");
        assert!(err.message.contains(r#"function "bogus" not defined"#), "{}", err.message);
    }

    #[test]
    fn range_decls() {
        let tree = parse_one("{{range $k, $v := .M}}{{$k}}={{$v}}{{end}}");
        match &tree.root[0] {
            Node::Range { pipe, .. } => assert_eq!(pipe.decls, vec!["k".to_string(), "v".to_string()]),
            n => panic!("expected range, got {n:?}"),
        }
    }

    #[test]
    fn missing_end_is_an_error() {
        assert!(parse("t", "{{if .X}}a", &any_func).is_err());
    }

    #[test]
    fn line_and_column() {
        let src = "a\nbb\n{{.X}}";
        assert_eq!(line_of(src, 5), 3);
        assert_eq!(column_of(src, 5), 0);
        assert_eq!(column_of(src, 8), 3);
    }
}
