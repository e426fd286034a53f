//! # vellum-safehtml
//!
//! Trusted string wrapper types and the validators behind them.
//!
//! ## Module Roles
//!
//! | Module | Responsibility | Public Entry Points |
//! |---|---|---|
//! | `html` | HTML fragments, escaping, concatenation | [`HTML`], [`html_escaped`], [`html_concat`] |
//! | `script` | Script bodies, data-binding builder | [`Script`], [`script_from_data_and_constant`] |
//! | `style` | Declaration lists, property builder, CSS escaping | [`Style`], [`style_from_properties`] |
//! | `stylesheet` | Style sheets, rule builder | [`StyleSheet`], [`css_rule`] |
//! | `url` | Navigational URLs, string sanitization | [`URL`], [`url_sanitized`] |
//! | `resource_url` | Resource-loading URLs, composition helpers | [`TrustedResourceURL`] |
//! | `identifier` | HTML ids and names | [`Identifier`] |
//! | `coerce` | UTF-8 interchange validity | [`coerce_to_utf8_interchange_valid`] |
//! | `urlutil` | Prefix checks, normalization, query escaping | [`urlutil`] |
//! | `unchecked` | Quarantined raw constructors | |
//! | `testutil` | Test-only conversions | |
//!
//! ## Type Contracts
//!
//! Every wrapper holds a string satisfying its documented contract.
//! Wrappers are immutable and equal by contained string. No wrapper has
//! a public string-accepting constructor: values come from constant
//! constructors (taking `&'static str`, the compile-time-literal form),
//! from validating builders, or from [`unchecked`]. Constant
//! constructors fail fast with a panic when a syntactic precondition is
//! violated, since misuse there is a programmer bug rather than a data
//! error.

pub mod coerce;
pub mod html;
pub mod identifier;
pub mod resource_url;
pub mod script;
pub mod style;
pub mod stylesheet;
pub mod testutil;
pub mod unchecked;
pub mod url;
pub mod urlutil;

pub use coerce::coerce_to_utf8_interchange_valid;
pub use html::{html_concat, html_escaped, HTML};
pub use identifier::Identifier;
pub use resource_url::{
    trusted_resource_url_append, trusted_resource_url_format, trusted_resource_url_with_params,
    TrustedResourceURL,
};
pub use script::{script_from_data_and_constant, Script, JS_IDENTIFIER_PATTERN};
pub use style::{css_escape_string, style_from_properties, Style, StyleProperties, INVALID_PROPERTY_VALUE};
pub use stylesheet::{css_rule, StyleSheet};
pub use url::{is_safe_url, url_sanitized, INVALID_URL, URL};

/// Failure from a fallible builder in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub message: String,
}

impl Error {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}
