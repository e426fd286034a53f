//! # vellum-template
//!
//! Contextually auto-sanitizing HTML template engine.
//!
//! Templates are parsed by `vellum-text`; before first execution every
//! action site is classified by the HTML parse state it occurs in and
//! its pipeline is rewritten to apply a context-appropriate sanitizer.
//! Attacker-controlled data can therefore never introduce elements,
//! change attribute meaning, inject script, or navigate to dangerous
//! schemes. Values of the `vellum-safehtml` trusted types short-circuit
//! sanitizers that recognize them.
//!
//! ## Module Roles
//!
//! | Module | Responsibility | Public Entry Points |
//! |---|---|---|
//! | `template` | Template sets, parse/clone/execute lifecycle | [`Template`] |
//! | `tracker` | HTML context state machine over literal text | |
//! | `context` | Sanitization context record and unification | |
//! | `sanitize` | Context tables + runtime sanitizers | |
//! | `escape` | Pipeline rewriting pass | |
//! | `source` | TrustedSource / TrustedTemplate / TrustedFS | [`TrustedSource`], [`TrustedFS`] |
//! | `error` | Structured errors with [`ErrorCode`] | [`Error`] |
//!
//! ## Example
//!
//! ```
//! use vellum_template::Template;
//! use vellum_text::Value;
//!
//! let t = Template::new("t").parse(r#"Hello, {{"<Cincinnati>"}}!"#).unwrap();
//! let mut out = Vec::new();
//! t.execute(&mut out, &Value::Null).unwrap();
//! assert_eq!(out, b"Hello, &lt;Cincinnati&gt;!");
//! ```

mod context;
mod error;
mod escape;
mod sanitize;
mod source;
mod template;
mod tracker;

pub use error::{Error, ErrorCode};
pub use source::{
    trusted_fs_from_entries, trusted_fs_from_trusted_source, trusted_source_join, TrustedFS,
    TrustedSource, TrustedTemplate,
};
pub use template::{must_parse_and_execute_to_html, Template};

/// Unchecked conversions for the source types owned by this crate.
pub mod unchecked {
    use crate::source;

    pub fn trusted_source_from_string_known_to_satisfy_type_contract(s: &str) -> super::TrustedSource {
        source::raw_trusted_source(s)
    }

    pub fn trusted_template_from_string_known_to_satisfy_type_contract(
        s: &str,
    ) -> super::TrustedTemplate {
        source::raw_trusted_template(s)
    }
}

/// Test-only conversions for the source types owned by this crate.
pub mod testutil {
    /// Wrap arbitrary text as a TrustedTemplate. Tests only.
    pub fn make_trusted_template(s: &str) -> super::TrustedTemplate {
        crate::source::raw_trusted_template(s)
    }
}
