//! UTF-8 interchange-validity coercion.

/// Replace every codepoint outside the HTML5 interchange-valid set with
/// U+FFFD. That set excludes C0 controls other than HT, LF, FF and CR,
/// the noncharacters U+FDD0..=U+FDEF, and U+nFFFE/U+nFFFF for every
/// plane. Idempotent.
pub fn coerce_to_utf8_interchange_valid(s: &str) -> String {
    s.chars()
        .map(|c| if is_interchange_valid(c) { c } else { '\u{FFFD}' })
        .collect()
}

fn is_interchange_valid(c: char) -> bool {
    let n = c as u32;
    if n < 0x20 {
        return matches!(c, '\t' | '\n' | '\x0C' | '\r');
    }
    if (0xFDD0..=0xFDEF).contains(&n) {
        return false;
    }
    // U+nFFFE and U+nFFFF on every plane.
    !matches!(n & 0xFFFF, 0xFFFE | 0xFFFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaced_codepoints() {
        for bad in ["\u{0}", "\u{4}", "\u{8}", "\u{B}", "\u{E}", "\u{F}", "\u{FDD0}", "\u{FDEF}",
            "\u{FFFE}", "\u{FFFF}", "\u{1FFFE}", "\u{1FFFF}", "\u{10FFFE}", "\u{10FFFF}"]
        {
            assert_eq!(coerce_to_utf8_interchange_valid(bad), "\u{FFFD}", "input: {bad:?}");
        }
    }

    #[test]
    fn preserved_codepoints() {
        for good in ["\t", "\n", "\x0C", "\r", "\u{FDCF}", "\u{FDF0}", " ", "\u{FFFD}", "abcd",
            "\u{4E04}\u{12456}t"]
        {
            assert_eq!(coerce_to_utf8_interchange_valid(good), good, "input: {good:?}");
        }
    }

    #[test]
    fn mixed_string() {
        assert_eq!(
            coerce_to_utf8_interchange_valid("\n\u{4E04} \u{0}\u{1FFFE}a\u{FFFD}"),
            "\n\u{4E04} \u{FFFD}\u{FFFD}a\u{FFFD}"
        );
    }

    #[test]
    fn idempotent() {
        let once = coerce_to_utf8_interchange_valid("\u{0}x\u{FDD5}");
        assert_eq!(coerce_to_utf8_interchange_valid(&once), once);
    }
}
