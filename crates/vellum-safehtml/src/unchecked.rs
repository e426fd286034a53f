//! Unchecked conversions from plain strings to trusted types.
//!
//! These constructors bypass every validation the rest of the crate
//! enforces. A use of this module asserts that the caller has
//! established, by review, that the value satisfies the target type
//! contract. Keep imports of this module easy to audit.

use crate::html::{raw_html, HTML};
use crate::identifier::{raw_identifier, Identifier};
use crate::resource_url::{raw_trusted_resource_url, TrustedResourceURL};
use crate::script::{raw_script, Script};
use crate::style::{raw_style, Style};
use crate::stylesheet::{raw_style_sheet, StyleSheet};
use crate::url::{raw_url, URL};

pub fn html_from_string_known_to_satisfy_type_contract(s: &str) -> HTML {
    raw_html(s)
}

pub fn script_from_string_known_to_satisfy_type_contract(s: &str) -> Script {
    raw_script(s)
}

pub fn style_from_string_known_to_satisfy_type_contract(s: &str) -> Style {
    raw_style(s)
}

pub fn style_sheet_from_string_known_to_satisfy_type_contract(s: &str) -> StyleSheet {
    raw_style_sheet(s)
}

pub fn url_from_string_known_to_satisfy_type_contract(s: &str) -> URL {
    raw_url(s)
}

pub fn trusted_resource_url_from_string_known_to_satisfy_type_contract(s: &str) -> TrustedResourceURL {
    raw_trusted_resource_url(s)
}

pub fn identifier_from_string_known_to_satisfy_type_contract(s: &str) -> Identifier {
    raw_identifier(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        const HTML_STR: &str = "<script>this is not a valid safehtml.HTML";
        assert_eq!(html_from_string_known_to_satisfy_type_contract(HTML_STR).as_str(), HTML_STR);
        const SCRIPT: &str = "</script>this is not a valid safehtml.Script";
        assert_eq!(script_from_string_known_to_satisfy_type_contract(SCRIPT).as_str(), SCRIPT);
        const STYLE: &str = "width:expression(this is not valid safehtml.Style";
        assert_eq!(style_from_string_known_to_satisfy_type_contract(STYLE).as_str(), STYLE);
        const SHEET: &str = "P { text: <not a valid safehtml.StyleSheet> }";
        assert_eq!(style_sheet_from_string_known_to_satisfy_type_contract(SHEET).as_str(), SHEET);
        const URL_STR: &str = "data:this will not be sanitized";
        assert_eq!(url_from_string_known_to_satisfy_type_contract(URL_STR).as_str(), URL_STR);
        assert_eq!(
            trusted_resource_url_from_string_known_to_satisfy_type_contract(URL_STR).as_str(),
            URL_STR
        );
        const ID: &str = "1nvalid-identifier-starting-with-a-digit";
        assert_eq!(identifier_from_string_known_to_satisfy_type_contract(ID).as_str(), ID);
    }
}
