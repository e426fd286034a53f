//! Conversions for use by tests only.
//!
//! The created values may violate their type contracts. Prefer the
//! regular constructors whenever practical so tests reflect real usage.

use crate::html::HTML;
use crate::identifier::Identifier;
use crate::resource_url::TrustedResourceURL;
use crate::script::Script;
use crate::style::Style;
use crate::stylesheet::StyleSheet;
use crate::unchecked;
use crate::url::URL;

pub fn make_html_for_test(s: &str) -> HTML {
    unchecked::html_from_string_known_to_satisfy_type_contract(s)
}

pub fn make_script_for_test(s: &str) -> Script {
    unchecked::script_from_string_known_to_satisfy_type_contract(s)
}

pub fn make_style_for_test(s: &str) -> Style {
    unchecked::style_from_string_known_to_satisfy_type_contract(s)
}

pub fn make_style_sheet_for_test(s: &str) -> StyleSheet {
    unchecked::style_sheet_from_string_known_to_satisfy_type_contract(s)
}

pub fn make_url_for_test(s: &str) -> URL {
    unchecked::url_from_string_known_to_satisfy_type_contract(s)
}

pub fn make_trusted_resource_url_for_test(s: &str) -> TrustedResourceURL {
    unchecked::trusted_resource_url_from_string_known_to_satisfy_type_contract(s)
}

pub fn make_identifier_for_test(s: &str) -> Identifier {
    unchecked::identifier_from_string_known_to_satisfy_type_contract(s)
}
