//! Query expression AST.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison applied by a term expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Some value equals the operand.
    Eq,
    /// No value equals the operand.
    Ne,
    /// Some value is less than the operand.
    Lt,
    /// Some value is less than or equal to the operand.
    Le,
    /// Some value is greater than the operand.
    Gt,
    /// Some value is greater than or equal to the operand.
    Ge,
    /// Some value matches the operand, where `*` matches any run of
    /// characters and `?` a single character.
    Like,
}

impl Comparison {
    /// Operator token used by the textual query syntax.
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => ":",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Like => ":",
        }
    }
}

/// A boolean query over named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryExpression {
    /// Matches every record.
    All,
    /// Compares the values of one field against an operand.
    Term {
        /// Field (term name) to test.
        field: String,
        /// Comparison to apply.
        op: Comparison,
        /// Operand.
        value: String,
    },
    /// Every clause matches.
    And(Vec<QueryExpression>),
    /// At least one clause matches.
    Or(Vec<QueryExpression>),
    /// The inner expression does not match.
    Not(Box<QueryExpression>),
}

impl QueryExpression {
    /// `field = value`.
    pub fn term<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::compare(field, Comparison::Eq, value)
    }

    /// `field <op> value`.
    pub fn compare<F: Into<String>, V: Into<String>>(field: F, op: Comparison, value: V) -> Self {
        QueryExpression::Term {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Negate this expression.
    pub fn negate(self) -> Self {
        QueryExpression::Not(Box::new(self))
    }

    /// Names of all fields referenced anywhere in the expression.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields<'a>(&'a self, fields: &mut BTreeSet<&'a str>) {
        match self {
            QueryExpression::All => {}
            QueryExpression::Term { field, .. } => {
                fields.insert(field.as_str());
            }
            QueryExpression::And(clauses) | QueryExpression::Or(clauses) => {
                for clause in clauses {
                    clause.collect_fields(fields);
                }
            }
            QueryExpression::Not(inner) => inner.collect_fields(fields),
        }
    }

    /// Evaluate the expression against a record.
    ///
    /// `lookup` returns the values of a field, or `None` when the record
    /// lacks it. Comparisons are numeric when both sides parse as numbers
    /// and lexical otherwise. An empty `And` matches, an empty `Or` does not.
    pub fn matches<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<&'a [String]>,
    {
        match self {
            QueryExpression::All => true,
            QueryExpression::Term { field, op, value } => {
                let values = lookup(field).unwrap_or(&[]);
                match op {
                    Comparison::Ne => !values.iter().any(|v| v == value),
                    Comparison::Eq => values.iter().any(|v| v == value),
                    Comparison::Like => values.iter().any(|v| wildcard_match(value, v)),
                    Comparison::Lt => values.iter().any(|v| compare(v, value) == Ordering::Less),
                    Comparison::Le => values.iter().any(|v| compare(v, value) != Ordering::Greater),
                    Comparison::Gt => values.iter().any(|v| compare(v, value) == Ordering::Greater),
                    Comparison::Ge => values.iter().any(|v| compare(v, value) != Ordering::Less),
                }
            }
            QueryExpression::And(clauses) => clauses.iter().all(|c| c.matches(lookup)),
            QueryExpression::Or(clauses) => clauses.iter().any(|c| c.matches(lookup)),
            QueryExpression::Not(inner) => !inner.matches(lookup),
        }
    }
}

impl fmt::Display for QueryExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExpression::All => f.write_str("*"),
            QueryExpression::Term { field, op, value } => {
                if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '(' || c == ')') {
                    write!(f, "{field}{}\"{value}\"", op.symbol())
                } else {
                    write!(f, "{field}{}{value}", op.symbol())
                }
            }
            QueryExpression::And(clauses) => write_group(f, clauses, " AND "),
            QueryExpression::Or(clauses) => write_group(f, clauses, " OR "),
            QueryExpression::Not(inner) => write!(f, "NOT {inner}"),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, clauses: &[QueryExpression], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{clause}")?;
    }
    f.write_str(")")
}

fn compare(left: &str, right: &str) -> Ordering {
    match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => left.cmp(right),
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn record() -> HashMap<String, Vec<String>> {
        let mut record = HashMap::new();
        record.insert("title".to_string(), vec!["Rust in Action".to_string()]);
        record.insert("year".to_string(), vec!["2021".to_string()]);
        record.insert("tag".to_string(), vec!["lang".to_string(), "systems".to_string()]);
        record
    }

    fn eval(query: &QueryExpression) -> bool {
        let record = record();
        query.matches(&|field: &str| record.get(field).map(Vec::as_slice))
    }

    #[test]
    fn test_term_comparisons() {
        assert!(eval(&QueryExpression::term("tag", "systems")));
        assert!(!eval(&QueryExpression::term("tag", "web")));
        assert!(eval(&QueryExpression::compare("year", Comparison::Ge, "2021")));
        assert!(eval(&QueryExpression::compare("year", Comparison::Gt, "999")));
        assert!(!eval(&QueryExpression::compare("year", Comparison::Lt, "2000")));
        assert!(eval(&QueryExpression::compare("missing", Comparison::Ne, "x")));
    }

    #[test]
    fn test_wildcards() {
        assert!(eval(&QueryExpression::compare("title", Comparison::Like, "Rust*")));
        assert!(eval(&QueryExpression::compare("title", Comparison::Like, "*in Act?on")));
        assert!(!eval(&QueryExpression::compare("title", Comparison::Like, "Go*")));
    }

    #[test]
    fn test_boolean_composition() {
        let query = QueryExpression::And(vec![
            QueryExpression::term("tag", "lang"),
            QueryExpression::Or(vec![
                QueryExpression::term("year", "1999"),
                QueryExpression::term("year", "2021"),
            ]),
            QueryExpression::term("tag", "web").negate(),
        ]);
        assert!(eval(&query));
        assert!(eval(&QueryExpression::All));
        assert!(!eval(&QueryExpression::Or(vec![])));
    }

    #[test]
    fn test_fields() {
        let query = QueryExpression::And(vec![
            QueryExpression::term("b", "1"),
            QueryExpression::term("a", "2").negate(),
        ]);
        assert_eq!(query.fields().into_iter().collect::<Vec<_>>(), ["a", "b"]);
        assert!(QueryExpression::All.fields().is_empty());
    }
}
