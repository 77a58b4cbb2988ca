//! Parser for the textual query syntax.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{MetacatError, Result};
use crate::query::expression::{Comparison, QueryExpression};

/// Parses query strings into [`QueryExpression`]s.
///
/// Supported syntax:
/// - Terms: `title:rust`, `year>=2001`, `year<2010`, `kind!=draft`
/// - Wildcards: `title:ru*` (`*` and `?` turn `:` into a like-match)
/// - Quoted values: `title:"rust in action"`
/// - Boolean operators: `AND`, `OR`, `NOT` (case-insensitive); adjacent
///   clauses are joined with `AND`
/// - Parentheses: `(a:1 OR b:2) AND NOT c:3`
/// - `*` on its own matches everything, as does an empty string
#[derive(Debug, Default, Clone)]
pub struct QueryParser;

impl QueryParser {
    /// Create a new query parser.
    pub fn new() -> Self {
        QueryParser
    }

    /// Parse a query string.
    pub fn parse(&self, query_str: &str) -> Result<QueryExpression> {
        let trimmed = query_str.trim();
        if trimmed.is_empty() {
            return Ok(QueryExpression::All);
        }

        let mut parser = QueryStringParser::new(trimmed);
        let expression = parser.parse_or_expression()?;
        parser.skip_whitespace();
        match parser.chars.peek() {
            None => Ok(expression),
            Some(ch) => Err(MetacatError::invalid_argument(format!(
                "Unexpected '{ch}' in query '{trimmed}'"
            ))),
        }
    }
}

struct QueryStringParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> QueryStringParser<'a> {
    fn new(query_str: &'a str) -> Self {
        QueryStringParser {
            chars: query_str.chars().peekable(),
        }
    }

    fn parse_or_expression(&mut self) -> Result<QueryExpression> {
        let mut clauses = vec![self.parse_and_expression()?];

        while self.peek_keyword() == Some("OR") {
            self.consume_keyword("OR");
            clauses.push(self.parse_and_expression()?);
        }

        Ok(collapse(clauses, QueryExpression::Or))
    }

    fn parse_and_expression(&mut self) -> Result<QueryExpression> {
        let mut clauses = vec![self.parse_unary()?];

        loop {
            match self.peek_keyword() {
                Some("AND") => {
                    self.consume_keyword("AND");
                    clauses.push(self.parse_unary()?);
                }
                Some("OR") => break,
                _ if self.at_clause_start() => clauses.push(self.parse_unary()?),
                _ => break,
            }
        }

        Ok(collapse(clauses, QueryExpression::And))
    }

    fn parse_unary(&mut self) -> Result<QueryExpression> {
        if self.peek_keyword() == Some("NOT") {
            self.consume_keyword("NOT");
            return Ok(self.parse_unary()?.negate());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryExpression> {
        self.skip_whitespace();

        match self.chars.peek() {
            None => Err(MetacatError::invalid_argument(
                "Expected a clause but found end of query",
            )),
            Some('(') => {
                self.chars.next();
                let inner = self.parse_or_expression()?;
                self.skip_whitespace();
                match self.chars.next() {
                    Some(')') => Ok(inner),
                    _ => Err(MetacatError::invalid_argument("Unbalanced parentheses")),
                }
            }
            Some(_) => self.parse_term(),
        }
    }

    fn parse_term(&mut self) -> Result<QueryExpression> {
        let mut field = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.' | '/') {
                field.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }

        if field.is_empty() {
            if self.chars.peek() == Some(&'*') {
                self.chars.next();
                return Ok(QueryExpression::All);
            }
            let found = self.chars.peek().copied().unwrap_or(' ');
            return Err(MetacatError::invalid_argument(format!(
                "Expected a field name but found '{found}'"
            )));
        }

        let op = self.parse_comparison().ok_or_else(|| {
            MetacatError::invalid_argument(format!("Missing comparison after field '{field}'"))
        })?;
        let (value, quoted) = self.parse_value()?;

        let op = if op == Comparison::Eq && !quoted && value.contains(['*', '?']) {
            Comparison::Like
        } else {
            op
        };

        Ok(QueryExpression::compare(field, op, value))
    }

    fn parse_comparison(&mut self) -> Option<Comparison> {
        let first = *self.chars.peek()?;
        let op = match first {
            ':' | '=' => {
                self.chars.next();
                Comparison::Eq
            }
            '!' => {
                self.chars.next();
                if self.chars.next() != Some('=') {
                    return None;
                }
                Comparison::Ne
            }
            '<' | '>' => {
                self.chars.next();
                let inclusive = self.chars.peek() == Some(&'=');
                if inclusive {
                    self.chars.next();
                }
                match (first, inclusive) {
                    ('<', false) => Comparison::Lt,
                    ('<', true) => Comparison::Le,
                    ('>', false) => Comparison::Gt,
                    _ => Comparison::Ge,
                }
            }
            _ => return None,
        };
        Some(op)
    }

    fn parse_value(&mut self) -> Result<(String, bool)> {
        if self.chars.peek() == Some(&'"') {
            self.chars.next();
            let mut value = String::new();
            loop {
                match self.chars.next() {
                    Some('"') => return Ok((value, true)),
                    Some('\\') => {
                        if let Some(escaped) = self.chars.next() {
                            value.push(escaped);
                        }
                    }
                    Some(ch) => value.push(ch),
                    None => {
                        return Err(MetacatError::invalid_argument("Unterminated quoted value"));
                    }
                }
            }
        }

        let mut value = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            value.push(ch);
            self.chars.next();
        }

        if value.is_empty() {
            Err(MetacatError::invalid_argument("Expected a value but found none"))
        } else {
            Ok((value, false))
        }
    }

    fn at_clause_start(&mut self) -> bool {
        self.skip_whitespace();
        matches!(self.chars.peek(), Some(ch) if *ch != ')')
    }

    fn peek_keyword(&mut self) -> Option<&'static str> {
        self.skip_whitespace();

        let word: String = self
            .chars
            .clone()
            .take_while(|ch| !ch.is_whitespace() && *ch != '(' && *ch != ')')
            .collect();

        ["AND", "OR", "NOT"]
            .into_iter()
            .find(|keyword| word.eq_ignore_ascii_case(keyword))
    }

    fn consume_keyword(&mut self, keyword: &str) {
        for _ in 0..keyword.len() {
            self.chars.next();
        }
        self.skip_whitespace();
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.chars.peek() {
            if ch.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }
}

fn collapse(
    mut clauses: Vec<QueryExpression>,
    group: fn(Vec<QueryExpression>) -> QueryExpression,
) -> QueryExpression {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        group(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> QueryExpression {
        QueryParser::new().parse(query).unwrap()
    }

    #[test]
    fn test_simple_terms() {
        assert_eq!(parse("title:rust"), QueryExpression::term("title", "rust"));
        assert_eq!(
            parse("year>=2001"),
            QueryExpression::compare("year", Comparison::Ge, "2001")
        );
        assert_eq!(
            parse("kind!=draft"),
            QueryExpression::compare("kind", Comparison::Ne, "draft")
        );
        assert_eq!(
            parse("title:ru*"),
            QueryExpression::compare("title", Comparison::Like, "ru*")
        );
        assert_eq!(
            parse(r#"title:"rust in action""#),
            QueryExpression::term("title", "rust in action")
        );
    }

    #[test]
    fn test_match_all() {
        assert_eq!(parse(""), QueryExpression::All);
        assert_eq!(parse("  * "), QueryExpression::All);
    }

    #[test]
    fn test_boolean_precedence() {
        let parsed = parse("a:1 OR b:2 AND NOT c:3");
        let expected = QueryExpression::Or(vec![
            QueryExpression::term("a", "1"),
            QueryExpression::And(vec![
                QueryExpression::term("b", "2"),
                QueryExpression::term("c", "3").negate(),
            ]),
        ]);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parentheses_and_implicit_and() {
        let parsed = parse("(a:1 or b:2) c:3");
        let expected = QueryExpression::And(vec![
            QueryExpression::Or(vec![
                QueryExpression::term("a", "1"),
                QueryExpression::term("b", "2"),
            ]),
            QueryExpression::term("c", "3"),
        ]);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_display_reparses() {
        let original = parse(r#"(title:"a b" OR year<3) AND NOT kind:x*"#);
        assert_eq!(parse(&original.to_string()), original);
    }

    #[test]
    fn test_errors() {
        let parser = QueryParser::new();
        assert!(parser.parse("(a:1").is_err());
        assert!(parser.parse("a:1)").is_err());
        assert!(parser.parse("title").is_err());
        assert!(parser.parse("title:").is_err());
        assert!(parser.parse(r#"title:"open"#).is_err());
    }
}
