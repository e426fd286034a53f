//! Tokenizer for template source.
//!
//! Splits source into literal text runs and `{{ ... }}` action items.
//! Every item carries the byte offset it starts at so later passes can
//! report 1-based line and column positions.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Literal text between actions, after trim markers are applied.
    Text(String),
    /// `{{`, start of an action.
    LeftDelim,
    /// `}}`, end of an action.
    RightDelim,
    Ident(String),
    /// `$name`; the `$` itself is `Variable("")`.
    Variable(String),
    /// `.A.B`; a bare `.` is an empty chain.
    Field(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Pipe,
    Declare,
    Comma,
}

#[derive(Debug, Clone)]
pub struct Item {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

/// Tokenize a full template source string.
pub fn lex(source: &str) -> Result<Vec<Item>, LexError> {
    let mut items = Vec::new();
    let mut pos = 0usize;
    let mut trim_next_text = false;
    while pos <= source.len() {
        let rest = &source[pos..];
        let (text_end, has_action) = match rest.find("{{") {
            Some(i) => (pos + i, true),
            None => (source.len(), false),
        };
        let mut text = &source[pos..text_end];
        let mut text_offset = pos;
        let mut action_pos = text_end + 2;
        let mut left_trim = false;
        if has_action {
            let after = &source[action_pos..];
            if after.starts_with('-')
                && after[1..].starts_with(|c: char| c.is_ascii_whitespace())
            {
                left_trim = true;
                action_pos += 1;
            }
        }
        if trim_next_text {
            let trimmed = text.trim_start();
            text_offset += text.len() - trimmed.len();
            text = trimmed;
            trim_next_text = false;
        }
        if left_trim {
            text = text.trim_end();
        }
        if !text.is_empty() {
            items.push(Item {
                token: Token::Text(text.to_string()),
                offset: text_offset,
            });
        }
        if !has_action {
            break;
        }
        items.push(Item {
            token: Token::LeftDelim,
            offset: text_end,
        });
        let comment_body = source[action_pos..].trim_start();
        if comment_body.starts_with("/*") {
            let skipped = source[action_pos..].len() - comment_body.len();
            let cstart = action_pos + skipped + 2;
            let close = source[cstart..]
                .find("*/")
                .ok_or_else(|| err(action_pos, "unclosed comment"))?;
            let mut end = cstart + close + 2;
            if source[end..].starts_with("-}}") {
                trim_next_text = true;
                end += 3;
            } else if source[end..].starts_with("}}") {
                end += 2;
            } else {
                return Err(err(end, "comment ends before closing delimiter"));
            }
            // The comment produces no items; drop the left delimiter too.
            items.pop();
            pos = end;
            continue;
        }
        let (next_pos, trimmed) = lex_action(source, action_pos, &mut items)?;
        items.push(Item {
            token: Token::RightDelim,
            offset: next_pos - 2,
        });
        trim_next_text = trimmed;
        pos = next_pos;
        if pos == source.len() {
            break;
        }
    }
    Ok(items)
}

fn err(offset: usize, message: impl Into<String>) -> LexError {
    LexError {
        offset,
        message: message.into(),
    }
}

/// Lex the inside of one action. Returns the position just past the
/// closing delimiter and whether a right trim marker was present.
fn lex_action(source: &str, start: usize, items: &mut Vec<Item>) -> Result<(usize, bool), LexError> {
    let bytes = source.as_bytes();
    let mut i = start;
    loop {
        while i < bytes.len() && (bytes[i] as char).is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return Err(err(start, "unclosed action"));
        }
        if source[i..].starts_with("}}") {
            return Ok((i + 2, false));
        }
        if source[i..].starts_with("-}}") {
            return Ok((i + 3, true));
        }
        let c = bytes[i] as char;
        match c {
            '|' => {
                items.push(Item { token: Token::Pipe, offset: i });
                i += 1;
            }
            ',' => {
                items.push(Item { token: Token::Comma, offset: i });
                i += 1;
            }
            ':' => {
                if source[i..].starts_with(":=") {
                    items.push(Item { token: Token::Declare, offset: i });
                    i += 2;
                } else {
                    return Err(err(i, "unexpected ':' in action"));
                }
            }
            '$' => {
                let name_start = i + 1;
                let mut j = name_start;
                while j < bytes.len() && is_ident_char(bytes[j] as char) {
                    j += 1;
                }
                items.push(Item {
                    token: Token::Variable(source[name_start..j].to_string()),
                    offset: i,
                });
                i = j;
            }
            '.' => {
                let (chain, j) = lex_field_chain(source, i);
                items.push(Item { token: Token::Field(chain), offset: i });
                i = j;
            }
            '"' => {
                let (s, j) = lex_string(source, i)?;
                items.push(Item { token: Token::Str(s), offset: i });
                i = j;
            }
            '-' | '0'..='9' => {
                if c == '-' && !source[i + 1..].starts_with(|c: char| c.is_ascii_digit()) {
                    return Err(err(i, "unexpected '-' in action"));
                }
                let mut j = i + 1;
                let mut is_float = false;
                while j < bytes.len() {
                    let d = bytes[j] as char;
                    if d.is_ascii_digit() {
                        j += 1;
                    } else if d == '.' && !is_float && source[j + 1..].starts_with(|c: char| c.is_ascii_digit()) {
                        is_float = true;
                        j += 1;
                    } else {
                        break;
                    }
                }
                let text = &source[i..j];
                let token = if is_float {
                    Token::Float(
                        text.parse::<f64>()
                            .map_err(|_| err(i, format!("bad number syntax: {text:?}")))?,
                    )
                } else {
                    Token::Int(
                        text.parse::<i64>()
                            .map_err(|_| err(i, format!("bad number syntax: {text:?}")))?,
                    )
                };
                items.push(Item { token, offset: i });
                i = j;
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < bytes.len() && is_ident_char(bytes[j] as char) {
                    j += 1;
                }
                let word = &source[i..j];
                let token = match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_string()),
                };
                items.push(Item { token, offset: i });
                i = j;
            }
            _ => return Err(err(i, format!("unrecognized character in action: {c:?}"))),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn lex_field_chain(source: &str, start: usize) -> (Vec<String>, usize) {
    let bytes = source.as_bytes();
    let mut chain = Vec::new();
    let mut i = start;
    while i < bytes.len() && bytes[i] == b'.' {
        let seg_start = i + 1;
        let mut j = seg_start;
        while j < bytes.len() && is_ident_char(bytes[j] as char) {
            j += 1;
        }
        if j == seg_start {
            // A bare dot terminates the chain.
            i += 1;
            break;
        }
        chain.push(source[seg_start..j].to_string());
        i = j;
    }
    if chain.is_empty() {
        // `i` already advanced past the lone dot above.
        return (chain, start + 1);
    }
    (chain, i)
}

fn lex_string(source: &str, start: usize) -> Result<(String, usize), LexError> {
    let mut out = String::new();
    let mut chars = source[start + 1..].char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((out, start + 1 + idx + 1)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '\'')) => out.push('\''),
                Some((_, other)) => {
                    return Err(err(start, format!("unknown escape sequence \\{other}")))
                }
                None => return Err(err(start, "unterminated string")),
            },
            _ => out.push(c),
        }
    }
    Err(err(start, "unterminated string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        lex(src).expect("lex").into_iter().map(|i| i.token).collect()
    }

    #[test]
    fn text_only() {
        assert_eq!(tokens("hello"), vec![Token::Text("hello".into())]);
    }

    #[test]
    fn simple_action() {
        assert_eq!(
            tokens("a{{ .X }}b"),
            vec![
                Token::Text("a".into()),
                Token::LeftDelim,
                Token::Field(vec!["X".into()]),
                Token::RightDelim,
                Token::Text("b".into()),
            ]
        );
    }

    #[test]
    fn pipeline_tokens() {
        assert_eq!(
            tokens(r#"{{"x" | html}}"#),
            vec![
                Token::LeftDelim,
                Token::Str("x".into()),
                Token::Pipe,
                Token::Ident("html".into()),
                Token::RightDelim,
            ]
        );
    }

    #[test]
    fn declaration_and_variable() {
        assert_eq!(
            tokens("{{$x := .}}{{$x}}"),
            vec![
                Token::LeftDelim,
                Token::Variable("x".into()),
                Token::Declare,
                Token::Field(vec![]),
                Token::RightDelim,
                Token::LeftDelim,
                Token::Variable("x".into()),
                Token::RightDelim,
            ]
        );
    }

    #[test]
    fn trim_markers() {
        assert_eq!(
            tokens("a {{- .X -}} b"),
            vec![
                Token::Text("a".into()),
                Token::LeftDelim,
                Token::Field(vec!["X".into()]),
                Token::RightDelim,
                Token::Text("b".into()),
            ]
        );
    }

    #[test]
    fn comment_is_dropped() {
        assert_eq!(tokens("a{{/* note */}}b"), vec![Token::Text("a".into()), Token::Text("b".into())]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            tokens(r#"{{"a\"b\n"}}"#),
            vec![
                Token::LeftDelim,
                Token::Str("a\"b\n".into()),
                Token::RightDelim,
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("{{eq 1 -2 1.5}}"),
            vec![
                Token::LeftDelim,
                Token::Ident("eq".into()),
                Token::Int(1),
                Token::Int(-2),
                Token::Float(1.5),
                Token::RightDelim,
            ]
        );
    }

    #[test]
    fn unterminated_action_errors() {
        assert!(lex("{{ .X ").is_err());
        assert!(lex(r#"{{"abc}}"#).is_err());
    }

    #[test]
    fn offsets_point_into_source() {
        let items = lex("ab{{ .X }}").expect("lex");
        assert_eq!(items[1].offset, 2);
        assert_eq!(items[2].offset, 5);
    }
}
