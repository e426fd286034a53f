//! # vellum-text
//!
//! Generic text templating engine with rewritable action pipelines.
//!
//! ## Module Roles
//!
//! | Module | Responsibility | Public Entry Points |
//! |---|---|---|
//! | `lexer` | `{{ ... }}` tokenizer with byte offsets | [`lexer::lex`] |
//! | `parse` | Recursive-descent parser to addressable trees | [`parse::parse`], [`Tree`], [`Node`] |
//! | `exec` | Tree-walking executor over an `io::Write` sink | [`exec::execute`] |
//! | `funcs` | Function registry + builtins | [`Funcs`] |
//! | `value` | Template data values and the opaque-value seam | [`Value`], [`OpaqueValue`] |
//!
//! ## Execution Contract
//!
//! 1. Parse once into named trees.
//! 2. (Optionally) rewrite action pipelines: append command idents,
//!    elide actions, replace text nodes, rename template calls.
//! 3. Execute many times against data values.
//!
//! The engine itself attaches no meaning to the rewrites; a host layer
//! such as an HTML sanitizer owns that policy. Internal functions whose
//! names start with `_` are callable only from rewritten pipelines, never
//! from parsed source.

pub mod exec;
pub mod funcs;
pub mod lexer;
pub mod parse;
pub mod value;

pub use exec::{execute, ExecError};
pub use funcs::{FuncError, Funcs, TemplateFn};
pub use parse::{column_of, line_of, parse, Arg, Command, Node, NodeId, ParseError, Pipeline, Tree};
pub use value::{OpaqueValue, Value};
