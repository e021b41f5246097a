//! Decoder for list-of-statements model output
//!
//! The optimize task asks the model for a literal array of SQL strings such as
//! `["CREATE INDEX ...;", "SELECT ...;"]`. The text is never evaluated; this
//! module accepts exactly brackets, commas and quoted strings:
//!
//! ```text
//! list   := ws '[' ws ( string ( ws ',' ws string )* ( ws ',' )? )? ws ']' ws
//! string := piece ( ws piece )*        adjacent pieces concatenate
//! piece  := '"' chars '"' | "'" chars "'"
//! ```
//!
//! Escapes `\\ \' \" \n \t \r \0` are decoded; any other backslash is kept.

use crate::ai_sql::normalize::NormalizedText;
use std::iter::Peekable;
use std::str::CharIndices;
use tracing::{debug, warn};

/// Outcome of decoding a statement list
#[derive(Debug, Clone, PartialEq)]
pub enum StatementListParse {
    /// Statements in source order
    Parsed(Vec<String>),
    /// The text is not a literal list of non-empty strings
    Failed { reason: String, original: String },
}

impl StatementListParse {
    pub fn is_parsed(&self) -> bool {
        matches!(self, StatementListParse::Parsed(_))
    }

    /// Statements if decoding succeeded
    pub fn statements(&self) -> Option<&[String]> {
        match self {
            StatementListParse::Parsed(statements) => Some(statements),
            StatementListParse::Failed { .. } => None,
        }
    }
}

/// Decode normalized model output as an ordered list of SQL statements.
///
/// Malformed input yields [`StatementListParse::Failed`]; this function
/// never returns an error or panics.
pub fn parse_statement_list(text: &NormalizedText) -> StatementListParse {
    match ListDecoder::new(text.as_str()).decode() {
        Ok(statements) => {
            debug!("Decoded statement list with {} element(s)", statements.len());
            StatementListParse::Parsed(statements)
        }
        Err(reason) => {
            warn!("Model output could not be decoded as a statement list: {}", reason);
            StatementListParse::Failed {
                reason,
                original: text.to_string(),
            }
        }
    }
}

struct ListDecoder<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> ListDecoder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn decode(mut self) -> Result<Vec<String>, String> {
        self.skip_whitespace();
        self.expect('[')?;

        let mut statements = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek_char() {
                Some(']') => {
                    self.chars.next();
                    break;
                }
                Some('"') | Some('\'') => {
                    let position = self.position();
                    let statement = self.string()?;
                    if statement.trim().is_empty() {
                        return Err(format!(
                            "empty statement at element {} (offset {})",
                            statements.len() + 1,
                            position
                        ));
                    }
                    statements.push(statement);

                    self.skip_whitespace();
                    match self.peek_char() {
                        Some(',') => {
                            self.chars.next();
                        }
                        Some(']') => {
                            self.chars.next();
                            break;
                        }
                        Some(other) => {
                            return Err(format!(
                                "expected ',' or ']' at offset {}, found {:?}",
                                self.position(),
                                other
                            ));
                        }
                        None => return Err("unterminated list: missing ']'".to_string()),
                    }
                }
                Some(other) => {
                    return Err(format!(
                        "expected a quoted string at offset {}, found {:?}",
                        self.position(),
                        other
                    ));
                }
                None => return Err("unterminated list: missing ']'".to_string()),
            }
        }

        self.skip_whitespace();
        if let Some((pos, _)) = self.chars.peek() {
            return Err(format!(
                "unexpected trailing text at offset {}: {:?}",
                pos,
                truncate(&self.text[*pos..], 40)
            ));
        }
        Ok(statements)
    }

    /// One string: a quoted piece plus any adjacent quoted pieces
    fn string(&mut self) -> Result<String, String> {
        let mut value = self.piece()?;
        loop {
            let mut lookahead = self.chars.clone();
            while lookahead.next_if(|(_, c)| c.is_whitespace()).is_some() {}
            match lookahead.peek() {
                Some((_, '"')) | Some((_, '\'')) => {
                    self.skip_whitespace();
                    value.push_str(&self.piece()?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn piece(&mut self) -> Result<String, String> {
        let (start, quote) = match self.chars.next() {
            Some((pos, c @ ('"' | '\''))) => (pos, c),
            Some((pos, c)) => return Err(format!("expected a quote at offset {pos}, found {c:?}")),
            None => return Err("unexpected end of input, expected a string".to_string()),
        };

        let mut value = String::new();
        while let Some((_, ch)) = self.chars.next() {
            match ch {
                '\\' => match self.chars.next() {
                    Some((_, escaped)) => match escaped {
                        '\\' | '\'' | '"' => value.push(escaped),
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\n' => {}
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    },
                    None => break,
                },
                c if c == quote => return Ok(value),
                '\n' | '\r' => {
                    return Err(format!("line break inside string starting at offset {start}"));
                }
                c => value.push(c),
            }
        }
        Err(format!("unterminated string starting at offset {start}"))
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((pos, c)) => Err(format!("expected {expected:?} at offset {pos}, found {c:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map(|(pos, _)| *pos).unwrap_or(self.text.len())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_sql::normalize::normalize;
    use rstest::rstest;

    fn parse(raw: &str) -> StatementListParse {
        parse_statement_list(&normalize(raw))
    }

    fn parsed(raw: &str) -> Vec<String> {
        match parse(raw) {
            StatementListParse::Parsed(statements) => statements,
            StatementListParse::Failed { reason, .. } => panic!("failed to parse {raw:?}: {reason}"),
        }
    }

    #[test]
    fn test_index_then_query_order() {
        let statements = parsed(
            r#"["CREATE INDEX idx_customer_id ON orders(customer_id);", "SELECT * FROM orders WHERE customer_id = 123;"]"#,
        );
        assert_eq!(
            statements,
            vec![
                "CREATE INDEX idx_customer_id ON orders(customer_id);",
                "SELECT * FROM orders WHERE customer_id = 123;",
            ]
        );
    }

    #[test]
    fn test_multiline_layout_and_trailing_comma() {
        let raw = "[\n  \"CREATE INDEX a ON t(a);\",\n  \"CREATE INDEX b ON t(b);\",\n  \"SELECT a, b FROM t;\",\n]";
        assert_eq!(
            parsed(raw),
            vec!["CREATE INDEX a ON t(a);", "CREATE INDEX b ON t(b);", "SELECT a, b FROM t;"]
        );
    }

    #[test]
    fn test_returns_every_element_in_source_order() {
        let items: Vec<String> = (0..25).map(|i| format!("SELECT {i};")).collect();
        let raw = format!(
            "[{}]",
            items.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(", ")
        );
        assert_eq!(parsed(&raw), items);
    }

    #[rstest]
    #[case(r#"["SELECT * FROM t WHERE name = 'name';"]"#, "SELECT * FROM t WHERE name = 'name';")]
    #[case(r#"['SELECT "col" FROM t;']"#, r#"SELECT "col" FROM t;"#)]
    #[case(r#"["a \"quoted\" word"]"#, r#"a "quoted" word"#)]
    #[case(r#"["line\nbreak"]"#, "line\nbreak")]
    #[case(r#"["SELECT '\d+' ~ x"]"#, r"SELECT '\d+' ~ x")]
    #[case(r#"["SELECT 1 " "FROM t;"]"#, "SELECT 1 FROM t;")]
    #[case(r#"["back\\slash"]"#, r"back\slash")]
    fn test_decodes_literal_content(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(parsed(raw), vec![expected.to_string()]);
    }

    #[test]
    fn test_empty_list_is_a_valid_result() {
        assert_eq!(parse("[]"), StatementListParse::Parsed(vec![]));
        assert_eq!(parse("  [ \n ]  "), StatementListParse::Parsed(vec![]));
    }

    #[rstest]
    #[case("")]
    #[case("SELECT * FROM t;")]
    #[case("Here are the statements: [\"SELECT 1;\"]")]
    #[case("[\"SELECT 1;\"] I hope this helps")]
    #[case("[\"SELECT 1;\"")]
    #[case("[\"SELECT 1;]")]
    #[case("[\"SELECT 1;\" \n , ]extra")]
    #[case("[SELECT 1]")]
    #[case("[\"a\", , \"b\"]")]
    #[case("[\"a\" \"b\" ; \"c\"]")]
    #[case("[\"\"]")]
    #[case("[\"   \"]")]
    #[case("[1, 2]")]
    #[case("{\"sql\": \"SELECT 1\"}")]
    #[case("[\"unterminated\n\"]")]
    #[case("[\"a\"] [\"b\"]")]
    fn test_malformed_input_reports_failure(#[case] raw: &str) {
        match parse(raw) {
            StatementListParse::Failed { reason, original } => {
                assert!(!reason.is_empty());
                assert_eq!(original, normalize(raw).to_string());
            }
            other => panic!("expected failure for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_curly_quoted_list_decodes_after_normalize() {
        let raw = "[\u{201C}CREATE INDEX idx_a ON t(a);\u{201D}, \u{201C}SELECT * FROM t WHERE a=1;\u{201D}]";
        let statements = parsed(raw);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE INDEX"));
        assert!(statements[1].contains("SELECT"));
    }

    #[test]
    fn test_accessors() {
        let ok = parse("[\"SELECT 1;\"]");
        assert!(ok.is_parsed());
        assert_eq!(ok.statements(), Some(&["SELECT 1;".to_string()][..]));

        let failed = parse("nope");
        assert!(!failed.is_parsed());
        assert_eq!(failed.statements(), None);
    }
}
