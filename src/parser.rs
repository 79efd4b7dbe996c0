//! SQL tokenizer using nom.
//!
//! Splits SQL file text into statements, recognizes read-only queries and
//! produces the normalized text recorded for audit.
//!
//! The tokenizer only understands the lexical structure PostgreSQL needs to
//! find statement boundaries:
//!
//! ```text
//! -- line comment            /* block /* nested */ comment */
//! 'string'  'it''s'          E'escaped \' string'
//! "quoted identifier"        $tag$ dollar quoted $tag$
//! ;                          statement terminator
//! ```

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_till1, take_until, take_while},
    character::complete::{anychar, char, multispace1, satisfy},
    combinator::{cut, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, terminated},
    IResult,
};
use serde::Serialize;

use crate::error::{LoadResult, LoaderError};

/// A syntactically complete statement and where it starts in its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub text: String,
    pub line: usize,
    pub column: usize,
}

/// Decomposes SQL file text into statements.
pub trait Splitter {
    /// Split `text` into statements, in file order.
    fn split(&self, text: &str) -> LoadResult<Vec<Statement>>;
}

/// The nom-based PostgreSQL statement splitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSplitter;

impl Splitter for SqlSplitter {
    fn split(&self, text: &str) -> LoadResult<Vec<Statement>> {
        split(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Space,
    Comment,
    Literal,
    Word,
    Semicolon,
    Punct,
}

/// A token with its text and byte offset in the input.
type Token<'a> = (TokenKind, &'a str, usize);

/// Split SQL text into statements.
///
/// Statement text starts at the first significant token and ends at the last
/// one before `;`, so surrounding comments and the terminator are excluded.
/// Statements made only of whitespace and comments are dropped.
pub fn split(input: &str) -> LoadResult<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;

    for (kind, text, offset) in tokenize(input)? {
        match kind {
            TokenKind::Space | TokenKind::Comment => {}
            TokenKind::Semicolon => {
                if let Some(s) = start.take() {
                    statements.push(statement(input, s, end));
                }
            }
            _ => {
                start.get_or_insert(offset);
                end = offset + text.len();
            }
        }
    }
    if let Some(s) = start {
        statements.push(statement(input, s, end));
    }

    Ok(statements)
}

fn statement(input: &str, start: usize, end: usize) -> Statement {
    let (line, column) = position(input, start);
    Statement {
        text: input[start..end].to_string(),
        line,
        column,
    }
}

/// Whether `stmt` only reads: it starts with `SELECT`, `VALUES` or `TABLE`,
/// or is a `WITH` query without data-modifying parts, and does not
/// `SELECT ... INTO` a new table.
pub fn is_query(stmt: &str) -> bool {
    let Ok(tokens) = tokenize(stmt) else {
        return false;
    };

    let mut depth = 0i32;
    let mut first: Option<String> = None;
    let mut top_level_into = false;
    let mut modifies = false;

    for (kind, text, _) in tokens {
        match kind {
            TokenKind::Punct if text == "(" => depth += 1,
            TokenKind::Punct if text == ")" => depth -= 1,
            TokenKind::Word => {
                let word = text.to_ascii_uppercase();
                if depth == 0 && word == "INTO" {
                    top_level_into = true;
                }
                if matches!(word.as_str(), "INSERT" | "UPDATE" | "DELETE" | "MERGE") {
                    modifies = true;
                }
                first.get_or_insert(word);
            }
            _ => {}
        }
    }

    match first.as_deref() {
        Some("SELECT" | "VALUES" | "TABLE") => !top_level_into,
        Some("WITH") => !modifies && !top_level_into,
        _ => false,
    }
}

/// Canonical form of a statement: comments dropped, whitespace outside
/// literals collapsed to single spaces, trailing terminators removed.
///
/// Text that does not tokenize is returned trimmed.
pub fn normalize(stmt: &str) -> String {
    let Ok(tokens) = tokenize(stmt) else {
        return stmt.trim().to_string();
    };

    let significant = tokens
        .iter()
        .rposition(|(kind, _, _)| {
            !matches!(
                kind,
                TokenKind::Space | TokenKind::Comment | TokenKind::Semicolon
            )
        })
        .map_or(0, |i| i + 1);

    let mut out = String::with_capacity(stmt.len());
    let mut pending_space = false;
    for (kind, text, _) in &tokens[..significant] {
        match kind {
            TokenKind::Space | TokenKind::Comment => pending_space = !out.is_empty(),
            _ => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push_str(text);
            }
        }
    }
    out
}

/// 1-based line and column of a byte offset.
pub fn position(input: &str, offset: usize) -> (usize, usize) {
    let before = &input[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |l| l.chars().count())
        + 1;
    (line, column)
}

fn tokenize(input: &str) -> LoadResult<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let offset = input.len() - rest.len();
        match token(rest) {
            Ok((next, kind)) => {
                tokens.push((kind, &rest[..rest.len() - next.len()], offset));
                rest = next;
            }
            Err(_) => {
                let (line, column) = position(input, offset);
                return Err(LoaderError::parse(line, column, unterminated(rest)));
            }
        }
    }

    Ok(tokens)
}

fn unterminated(rest: &str) -> &'static str {
    if rest.starts_with("/*") {
        "unterminated /* comment"
    } else if rest.starts_with('$') {
        "unterminated dollar-quoted string"
    } else if rest.starts_with('"') {
        "unterminated quoted identifier"
    } else {
        "unterminated quoted string"
    }
}

/// Parse a single token.
fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Space, multispace1),
        value(TokenKind::Comment, line_comment),
        value(TokenKind::Comment, block_comment),
        value(TokenKind::Literal, escape_string),
        value(TokenKind::Literal, dollar_quoted),
        value(TokenKind::Literal, single_quoted),
        value(TokenKind::Literal, double_quoted),
        value(TokenKind::Semicolon, char(';')),
        value(TokenKind::Word, word),
        value(TokenKind::Punct, anychar),
    ))(input)
}

/// Identifiers may contain `$` after their first character.
fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphanumeric() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), take_while(|c| c != '\n')))(input)
}

/// Block comments nest in PostgreSQL.
fn block_comment(input: &str) -> IResult<&str, &str> {
    let (mut rest, _) = tag("/*")(input)?;
    let mut depth = 1;

    while depth > 0 {
        if let Some(r) = rest.strip_prefix("/*") {
            depth += 1;
            rest = r;
        } else if let Some(r) = rest.strip_prefix("*/") {
            depth -= 1;
            rest = r;
        } else {
            match anychar::<_, Error<&str>>(rest) {
                Ok((r, _)) => rest = r,
                Err(_) => return Err(nom::Err::Failure(Error::new(input, ErrorKind::TakeUntil))),
            }
        }
    }

    Ok((rest, &input[..input.len() - rest.len()]))
}

fn quoted(input: &str, delim: char) -> IResult<&str, &str> {
    recognize(pair(
        char(delim),
        cut(pair(
            many0(alt((
                recognize(pair(char(delim), char(delim))),
                take_till1(move |c| c == delim),
            ))),
            char(delim),
        )),
    ))(input)
}

fn single_quoted(input: &str) -> IResult<&str, &str> {
    quoted(input, '\'')
}

fn double_quoted(input: &str) -> IResult<&str, &str> {
    quoted(input, '"')
}

/// `E'...'` strings allow backslash escapes.
fn escape_string(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c == 'e' || c == 'E'),
        pair(
            char('\''),
            cut(pair(
                many0(alt((
                    recognize(pair(char('\\'), anychar)),
                    tag("''"),
                    is_not("\\'"),
                ))),
                char('\''),
            )),
        ),
    ))(input)
}

fn dollar_tag(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// `$tag$ ... $tag$`, where the tag may be empty.
fn dollar_quoted(input: &str) -> IResult<&str, &str> {
    let (rest, opener) = recognize(delimited(char('$'), opt(dollar_tag), char('$')))(input)?;
    let (rest, _) = cut(terminated(take_until(opener), tag(opener)))(rest)?;
    Ok((rest, &input[..input.len() - rest.len()]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(input: &str) -> Vec<String> {
        split(input).unwrap().into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(
            texts("create table a (id int);\ninsert into a values (1);"),
            vec!["create table a (id int)", "insert into a values (1)"]
        );
    }

    #[test]
    fn test_split_positions() {
        let stmts = split("select 1;\n\n  -- lead\n  select 2;").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!((stmts[0].line, stmts[0].column), (1, 1));
        assert_eq!((stmts[1].line, stmts[1].column), (4, 3));
        assert_eq!(stmts[1].text, "select 2");
    }

    #[test]
    fn test_split_ignores_semicolons_in_literals() {
        assert_eq!(
            texts("select 'a;b', \"c;d\"; select E'it\\'s;'; select 'x''y;'"),
            vec!["select 'a;b', \"c;d\"", "select E'it\\'s;'", "select 'x''y;'"]
        );
    }

    #[test]
    fn test_split_dollar_quoted_body() {
        let sql = "create function f() returns int language sql as $body$ select 1; $body$;\n\
                   create function g() returns int language sql as $$ select 2; $$";
        let stmts = texts(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].ends_with("$body$ select 1; $body$"));
        assert!(stmts[1].ends_with("$$ select 2; $$"));
    }

    #[test]
    fn test_split_parameter_is_not_dollar_quote() {
        assert_eq!(texts("prepare p as select $1; select 2"), vec!["prepare p as select $1", "select 2"]);
    }

    #[test]
    fn test_split_dollar_inside_identifier() {
        let stmts = split("create table t (a$b$c int);\nselect 1;").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].text, "create table t (a$b$c int)");
        assert_eq!((stmts[1].line, stmts[1].column), (2, 1));
    }

    #[test]
    fn test_split_comments_and_empty_statements() {
        assert_eq!(
            texts("/* a /* nested; */ still; */ ; -- only; comment\n;select 1 -- tail\n;"),
            vec!["select 1"]
        );
    }

    #[test]
    fn test_split_unterminated_string() {
        let err = split("select 1;\nselect 'oops").unwrap_err();
        match err {
            LoaderError::Parse { line, column, message } => {
                assert_eq!((line, column), (2, 8));
                assert_eq!(message, "unterminated quoted string");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_split_unterminated_comment_and_dollar() {
        assert!(matches!(split("/* open"), Err(LoaderError::Parse { .. })));
        let err = split("select $x$ never closed").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parse error at line 1, column 8: unterminated dollar-quoted string"
        );
    }

    #[test]
    fn test_is_query() {
        assert!(is_query("select 1"));
        assert!(is_query("(select 1) union (select 2)"));
        assert!(is_query("values (1), (2)"));
        assert!(is_query("table users"));
        assert!(is_query("with x as (select 1) select * from x"));
        assert!(is_query("select * from t where s = 'insert'"));
        assert!(!is_query("select 1 into new_table"));
        assert!(!is_query("with x as (delete from t returning *) select * from x"));
        assert!(!is_query("insert into t select 1"));
        assert!(!is_query("create view v as select 1"));
        assert!(!is_query("select 'unterminated"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize("select  1,\n  -- note\n  'a   b' /* c */ from\tt ;"),
            "select 1, 'a   b' from t"
        );
        assert_eq!(normalize("  select 1  "), "select 1");
    }

    #[test]
    fn test_position() {
        assert_eq!(position("ab\ncd", 0), (1, 1));
        assert_eq!(position("ab\ncd", 4), (2, 2));
    }
}
