//! Search query language.
//!
//! A query is a list of whitespace-separated values matched against a
//! default field. Double quotes group values containing whitespace, and
//! `\` protects a following space or quote. Tokens starting with `@` change
//! how the following values are matched:
//!
//! | Token       | Effect                                             |
//! |-------------|----------------------------------------------------|
//! | `@FIELD`    | switch field (must be allowed), reset modifiers    |
//! | `@not`      | negate the following values                        |
//! | `@like`     | match the following values with SQL `like`         |
//! | `@file`     | following values are files with one value per line |
//! | `@null`     | field is null                                      |
//! | `@notnull`  | field is not null                                  |
//! | `@true`     | field is true                                      |
//! | `@false`    | field is false                                     |
//!
//! Conditions on the same field are OR-ed together, different fields are
//! AND-ed.

use std::fs;
use std::path::Path;

use crate::error::CoreError;

/// The value side of a query condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Null,
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperation {
    Is,
    IsNot,
    Eq,
    NotEq,
    Like,
    NotLike,
    In,
    NotIn,
}

/// A single condition: `field operation value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryToken {
    pub field: String,
    pub value: QueryValue,
    pub operation: QueryOperation,
}

impl QueryToken {
    fn new(field: &str, value: QueryValue, operation: QueryOperation) -> Self {
        Self {
            field: field.to_string(),
            value,
            operation,
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split a query string into raw words.
///
/// Quoted sections always form their own word, even when adjacent to other
/// text. An unterminated quote is kept as a literal character.
fn split_words(query: &str) -> Vec<String> {
    let chars: Vec<char> = query.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    let escaped = |i: usize| i > 0 && chars[i - 1] == '\\';

    while i < chars.len() {
        let c = chars[i];

        if c == '"' && !escaped(i) {
            let close = (i + 1..chars.len()).find(|&j| chars[j] == '"' && !escaped(j));
            if let Some(close) = close {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                let quoted: String = chars[i + 1..close].iter().collect();
                if !quoted.is_empty() {
                    words.push(quoted);
                }
                i = close + 1;
                continue;
            }
        }

        if c.is_whitespace() && !escaped(i) {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
        i += 1;
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

fn read_lines(path: &Path) -> Result<Vec<String>, CoreError> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse a query string into conditions.
///
/// Fails on an `@FIELD` token naming a field not in `allowed_fields`, or
/// when a `@file` value cannot be read.
pub fn tokenize(query: &str, default_field: &str, allowed_fields: &[&str]) -> Result<Vec<QueryToken>, CoreError> {
    use QueryOperation::*;

    let mut field = default_field.to_string();
    let mut like = false;
    let mut neg = false;
    let mut from_file = false;
    let mut tokens = Vec::new();

    for word in split_words(query) {
        let (positive, negative) = if neg { (IsNot, Is) } else { (Is, IsNot) };

        match word.as_str() {
            "@null" => tokens.push(QueryToken::new(&field, QueryValue::Null, positive)),
            "@notnull" => tokens.push(QueryToken::new(&field, QueryValue::Null, negative)),
            "@true" => tokens.push(QueryToken::new(&field, QueryValue::Bool(true), positive)),
            "@false" => tokens.push(QueryToken::new(&field, QueryValue::Bool(true), negative)),
            "@not" => neg = true,
            "@like" => like = true,
            "@file" => from_file = true,
            w if w.starts_with('@') => {
                let (_, name) = w.split_at(1);
                if !allowed_fields.contains(&name) {
                    return Err(CoreError::Validation(format!("Invalid field name {name}")));
                }
                field = name.to_string();
                like = false;
                neg = false;
                from_file = false;
            }
            path if from_file => {
                let values = read_lines(Path::new(path))?;
                let operation = if neg { NotIn } else { In };
                tokens.push(QueryToken::new(&field, QueryValue::List(values), operation));
            }
            _ => {
                let operation = match (neg, like) {
                    (true, true) => NotLike,
                    (false, true) => Like,
                    (true, false) => NotEq,
                    (false, false) => Eq,
                };
                tokens.push(QueryToken::new(&field, QueryValue::Text(word), operation));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// SQL rendering
// ---------------------------------------------------------------------------

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Render conditions as an SQL `where` clause (without the keyword) and its
/// positional parameters.
///
/// Combinations with no SQL meaning, such as `like` on a null value, are
/// skipped. Field names are inserted verbatim, so they must come from an
/// allow-list.
pub fn tokens_to_where(tokens: &[QueryToken]) -> (String, Vec<String>) {
    use QueryOperation::*;

    let mut fields: Vec<(&str, Vec<&QueryToken>)> = Vec::new();
    for token in tokens {
        match fields.iter_mut().find(|(f, _)| *f == token.field) {
            Some((_, group)) => group.push(token),
            None => fields.push((&token.field, vec![token])),
        }
    }

    let mut clauses = Vec::with_capacity(fields.len());
    let mut params = Vec::new();

    for (field, group) in fields {
        let mut conditions = Vec::with_capacity(group.len());

        for token in group {
            let condition = match (&token.value, token.operation) {
                (QueryValue::Null, Is) => format!("{field} is null"),
                (QueryValue::Null, IsNot) => format!("{field} is not null"),
                (QueryValue::Bool(b), Is) => format!("{field} is {b}"),
                (QueryValue::Bool(b), IsNot) => format!("{field} is {}", !b),
                (QueryValue::List(values), In | NotIn) => {
                    params.extend(values.iter().cloned());
                    let not = if token.operation == NotIn { "not " } else { "" };
                    format!("{field} {not}in ({})", placeholders(values.len()))
                }
                (QueryValue::Text(value), In) => {
                    params.push(value.clone());
                    format!("instr({field}, ?) != 0")
                }
                (QueryValue::Text(value), NotIn) => {
                    params.push(value.clone());
                    format!("instr({field}, ?) = 0")
                }
                (QueryValue::Text(value), op @ (Eq | NotEq | Like | NotLike)) => {
                    params.push(value.clone());
                    let sql_op = match op {
                        Eq => "=",
                        NotEq => "!=",
                        Like => "like",
                        _ => "not like",
                    };
                    format!("{field} {sql_op} ?")
                }
                _ => continue,
            };
            conditions.push(condition);
        }

        if !conditions.is_empty() {
            clauses.push(format!("({})", conditions.join(" or ")));
        }
    }

    (clauses.join(" and "), params)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    const FIELDS: &[&str] = &["relative_path", "puid", "action", "is_binary"];

    #[test]
    fn split_respects_quotes_and_escapes() {
        assert_eq!(split_words(r#"a  "b c"d e\ f"#), vec!["a", "b c", "d", r"e\ f"]);
        assert_eq!(split_words(r#""x \" y""#), vec![r#"x \" y"#]);
        assert_eq!(split_words(r#"open"quote"#), vec![r#"open"quote"#]);
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn plain_values_use_default_field() {
        let tokens = tokenize("a.pdf b.pdf", "relative_path", FIELDS).unwrap();
        let (sql, params) = tokens_to_where(&tokens);
        assert_eq!(sql, "(relative_path = ? or relative_path = ?)");
        assert_eq!(params, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn modifiers_apply_until_field_switch() {
        let tokens = tokenize("@puid @not @like fmt/% @action convert @null", "relative_path", FIELDS).unwrap();
        let (sql, params) = tokens_to_where(&tokens);
        assert_eq!(sql, "(puid not like ?) and (action = ? or action is null)");
        assert_eq!(params, vec!["fmt/%", "convert"]);
    }

    #[test]
    fn boolean_and_null_tokens() {
        let tokens = tokenize("@is_binary @false @puid @not @notnull", "relative_path", FIELDS).unwrap();
        assert_eq!(
            tokens,
            vec![
                QueryToken::new("is_binary", QueryValue::Bool(true), QueryOperation::IsNot),
                QueryToken::new("puid", QueryValue::Null, QueryOperation::Is),
            ]
        );
        let (sql, params) = tokens_to_where(&tokens);
        assert_eq!(sql, "(is_binary is false) and (puid is null)");
        assert!(params.is_empty());
    }

    #[test]
    fn file_values_become_in_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fmt/18\r\n\nfmt/19").unwrap();
        let query = format!("@puid @not @file \"{}\"", file.path().display());

        let tokens = tokenize(&query, "relative_path", FIELDS).unwrap();
        let (sql, params) = tokens_to_where(&tokens);
        assert_eq!(sql, "(puid not in (?,?))");
        assert_eq!(params, vec!["fmt/18", "fmt/19"]);
    }

    #[test]
    fn text_in_uses_instr() {
        let tokens = vec![
            QueryToken::new("relative_path", QueryValue::Text("docs".into()), QueryOperation::In),
            QueryToken::new("relative_path", QueryValue::Text("tmp".into()), QueryOperation::NotIn),
        ];
        let (sql, params) = tokens_to_where(&tokens);
        assert_eq!(sql, "(instr(relative_path, ?) != 0 or instr(relative_path, ?) = 0)");
        assert_eq!(params, vec!["docs", "tmp"]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert_matches!(tokenize("@checksum abc", "relative_path", FIELDS), Err(CoreError::Validation(_)));
    }

    #[test]
    fn empty_query_gives_empty_where() {
        let (sql, params) = tokens_to_where(&tokenize("", "relative_path", FIELDS).unwrap());
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }
}
