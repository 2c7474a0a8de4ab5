//! Structural validation of generated SQL
//!
//! Generated queries run against a shared warehouse, so before execution a
//! query must be:
//!
//! - a single `SELECT` / `WITH` statement, without comments
//! - free of write or administrative keywords outside string literals
//! - limited to the target table (plus its own CTEs and `UNNEST`)
//! - filtered by `restaurant_id = @restaurant_id` as a top-level `AND`
//!   conjunct of the `WHERE` clause of every scope that reads the table
//! - capped at the row limit
//!
//! The checks run on a small tokenizer, not a full SQL parser.

use crate::warehouse::{SqlDialect, RESTAURANT_COLUMN, RESTAURANT_PARAM};

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT",
    "REVOKE", "CALL", "EXECUTE", "EXPORT", "LOAD", "ATTACH", "DETACH", "PRAGMA", "VACUUM",
];

/// Functions whose argument list may contain `FROM` that is not a table clause.
const FROM_FUNCTIONS: &[&str] = &["EXTRACT", "SUBSTRING", "TRIM", "OVERLAY"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("the query is empty")]
    Empty,
    #[error("only a single statement is allowed")]
    MultipleStatements,
    #[error("only SELECT or WITH queries are allowed")]
    NotSelect,
    #[error("comments are not allowed in the query")]
    Comment,
    #[error("forbidden keyword {0}")]
    ForbiddenKeyword(String),
    #[error("the query may only read from {expected}, found {found}")]
    ForeignTable { expected: String, found: String },
    #[error("the query does not read from {0}")]
    MissingTable(String),
    #[error("the query must filter with restaurant_id = @{}", RESTAURANT_PARAM)]
    MissingTenantFilter,
    #[error("unterminated quoted text")]
    Unterminated,
    #[error("LIMIT must be a number")]
    InvalidLimit,
}

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Word(String),
    QuotedIdent(String),
    StringLit,
    Number(String),
    Param(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
}

impl Token {
    fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, Kind::Word(w) if w.eq_ignore_ascii_case(word))
    }

    fn is_punct(&self, c: char) -> bool {
        self.kind == Kind::Punct(c)
    }

    fn name_part(&self) -> Option<&str> {
        match &self.kind {
            Kind::Word(w) | Kind::QuotedIdent(w) => Some(w),
            _ => None,
        }
    }
}

fn tokenize(sql: &str, dialect: SqlDialect) -> Result<Vec<Token>, GuardError> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let end_of = |i: usize| chars.get(i).map_or(sql.len(), |(pos, _)| *pos);
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (start, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if (c == '-' && next == Some('-'))
            || (c == '/' && next == Some('*'))
            || (c == '#' && dialect == SqlDialect::BigQuery)
        {
            return Err(GuardError::Comment);
        }

        let string_quote = c == '\'' || (c == '"' && dialect == SqlDialect::BigQuery);
        let ident_quote = c == '`' || (c == '"' && dialect == SqlDialect::Sqlite);

        if string_quote || ident_quote {
            let quote = c;
            let mut content = String::new();
            let mut j = i + 1;
            loop {
                let Some(&(_, ch)) = chars.get(j) else {
                    return Err(GuardError::Unterminated);
                };
                if ch == '\\' && string_quote {
                    if let Some(&(_, escaped)) = chars.get(j + 1) {
                        content.push(escaped);
                    }
                    j += 2;
                    continue;
                }
                if ch == quote {
                    if chars.get(j + 1).map(|(_, c)| *c) == Some(quote) {
                        content.push(quote);
                        j += 2;
                        continue;
                    }
                    break;
                }
                content.push(ch);
                j += 1;
            }
            let kind = if string_quote {
                Kind::StringLit
            } else {
                Kind::QuotedIdent(content)
            };
            tokens.push(Token {
                kind,
                start,
                end: end_of(j + 1),
            });
            i = j + 1;
            continue;
        }

        if c == '[' && dialect == SqlDialect::Sqlite {
            let Some(close) = chars[i + 1..].iter().position(|(_, ch)| *ch == ']') else {
                return Err(GuardError::Unterminated);
            };
            let j = i + 1 + close;
            tokens.push(Token {
                kind: Kind::QuotedIdent(sql[end_of(i + 1)..end_of(j)].to_string()),
                start,
                end: end_of(j + 1),
            });
            i = j + 1;
            continue;
        }

        if c == '@' && next.is_some_and(|n| n.is_alphanumeric() || n == '_') {
            let mut j = i + 1;
            while chars
                .get(j)
                .is_some_and(|(_, ch)| ch.is_alphanumeric() || *ch == '_')
            {
                j += 1;
            }
            tokens.push(Token {
                kind: Kind::Param(sql[end_of(i + 1)..end_of(j)].to_string()),
                start,
                end: end_of(j),
            });
            i = j;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut j = i;
            while chars
                .get(j)
                .is_some_and(|(_, ch)| ch.is_alphanumeric() || *ch == '_')
            {
                j += 1;
            }
            tokens.push(Token {
                kind: Kind::Word(sql[start..end_of(j)].to_string()),
                start,
                end: end_of(j),
            });
            i = j;
            continue;
        }

        if c.is_ascii_digit() {
            let mut j = i;
            while chars
                .get(j)
                .is_some_and(|(_, ch)| ch.is_ascii_alphanumeric() || *ch == '.')
            {
                j += 1;
            }
            tokens.push(Token {
                kind: Kind::Number(sql[start..end_of(j)].to_string()),
                start,
                end: end_of(j),
            });
            i = j;
            continue;
        }

        tokens.push(Token {
            kind: Kind::Punct(c),
            start,
            end: end_of(i + 1),
        });
        i += 1;
    }

    Ok(tokens)
}

fn normalize_name(name: &str) -> String {
    name.trim_matches(|c| c == '`' || c == '"')
        .split('.')
        .map(|part| part.trim_matches(|c| c == '`' || c == '"'))
        .collect::<Vec<_>>()
        .join(".")
        .to_lowercase()
}

/// Paren nesting level of each token. A `(` and its `)` sit at the level
/// outside them.
fn depths(tokens: &[Token]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|t| {
            if t.is_punct(')') {
                depth = depth.saturating_sub(1);
            }
            let at = depth;
            if t.is_punct('(') {
                depth += 1;
            }
            at
        })
        .collect()
}

/// Index of the `)` closing the `(` at `open`.
fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if t.is_punct('(') {
            depth += 1;
        } else if t.is_punct(')') {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

enum TableRef {
    Name(String),
    /// Subquery or `UNNEST(...)`.
    Derived,
    /// Anything else in table position, such as a string literal.
    Unsupported(String),
}

/// Validates and caps generated SQL for one target table.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    dialect: SqlDialect,
    qualified: String,
    bare: String,
    row_cap: usize,
}

impl SqlGuard {
    /// `qualified_table` is the reference given to the model, `table` the
    /// bare table name.
    pub fn new(dialect: SqlDialect, qualified_table: &str, table: &str, row_cap: usize) -> Self {
        Self {
            dialect,
            qualified: normalize_name(qualified_table),
            bare: table.to_lowercase(),
            row_cap,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// The query to execute, with its row cap applied.
    pub fn check(&self, sql: &str) -> Result<String, GuardError> {
        let sql = sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if sql.is_empty() {
            return Err(GuardError::Empty);
        }

        let tokens = tokenize(sql, self.dialect)?;
        if tokens.iter().any(|t| t.is_punct(';')) {
            return Err(GuardError::MultipleStatements);
        }

        match tokens.first() {
            Some(t) if t.is_word("SELECT") || t.is_word("WITH") => {}
            _ => return Err(GuardError::NotSelect),
        }

        for token in &tokens {
            if let Kind::Word(w) = &token.kind {
                let upper = w.to_ascii_uppercase();
                if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                    return Err(GuardError::ForbiddenKeyword(upper));
                }
            }
        }

        let target_refs = self.check_tables(sql, &tokens)?;
        check_tenant_filter(&tokens, &target_refs)?;

        self.apply_limit(sql, &tokens)
    }

    /// Names declared by the leading `WITH` list.
    fn cte_names(tokens: &[Token]) -> Vec<String> {
        let mut names = Vec::new();
        if !tokens.first().is_some_and(|t| t.is_word("WITH")) {
            return names;
        }
        let mut i = 1;
        if tokens.get(i).is_some_and(|t| t.is_word("RECURSIVE")) {
            i += 1;
        }

        while let Some(name) = tokens.get(i).and_then(Token::name_part) {
            let mut j = i + 1;
            if tokens.get(j).is_some_and(|t| t.is_punct('(')) {
                match matching_paren(tokens, j) {
                    Some(close) => j = close + 1,
                    None => break,
                }
            }
            if !tokens.get(j).is_some_and(|t| t.is_word("AS")) {
                break;
            }
            j += 1;
            if tokens.get(j).is_some_and(|t| t.is_word("NOT")) {
                j += 1;
            }
            if tokens.get(j).is_some_and(|t| t.is_word("MATERIALIZED")) {
                j += 1;
            }
            if !tokens.get(j).is_some_and(|t| t.is_punct('(')) {
                break;
            }
            names.push(name.to_lowercase());
            let Some(close) = matching_paren(tokens, j) else {
                break;
            };
            if !tokens.get(close + 1).is_some_and(|t| t.is_punct(',')) {
                break;
            }
            i = close + 2;
        }
        names
    }

    /// Returns the token indices of every reference to the target table.
    fn check_tables(&self, sql: &str, tokens: &[Token]) -> Result<Vec<usize>, GuardError> {
        struct Level {
            function: bool,
            in_from: bool,
        }

        let ctes = Self::cte_names(tokens);
        let mut levels = vec![Level {
            function: false,
            in_from: false,
        }];
        let mut target_refs = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            if token.is_punct('(') {
                let function = i > 0 && FROM_FUNCTIONS.iter().any(|f| tokens[i - 1].is_word(f));
                levels.push(Level {
                    function,
                    in_from: false,
                });
                continue;
            }
            if token.is_punct(')') {
                if levels.len() > 1 {
                    levels.pop();
                }
                continue;
            }
            let Some(level) = levels.last_mut() else {
                continue;
            };

            // Inside a FROM clause, a comma at the same level separates tables.
            let starts_ref = if token.is_word("FROM") || token.is_word("JOIN") {
                let table_clause = !level.function && !is_distinct_from(tokens, i);
                level.in_from |= table_clause;
                table_clause
            } else if token.is_punct(',') {
                level.in_from
            } else {
                if ends_from_clause(token) {
                    level.in_from = false;
                }
                false
            };
            if !starts_ref {
                continue;
            }

            match Self::read_table_ref(sql, tokens, i + 1) {
                Some(TableRef::Name(name)) => {
                    let normalized = normalize_name(&name);
                    if normalized == self.qualified || normalized == self.bare {
                        target_refs.push(i + 1);
                    } else if !ctes.contains(&normalized) {
                        return Err(GuardError::ForeignTable {
                            expected: self.qualified.clone(),
                            found: name,
                        });
                    }
                }
                Some(TableRef::Unsupported(found)) => {
                    return Err(GuardError::ForeignTable {
                        expected: self.qualified.clone(),
                        found,
                    });
                }
                Some(TableRef::Derived) | None => {}
            }
        }

        if target_refs.is_empty() {
            Err(GuardError::MissingTable(self.qualified.clone()))
        } else {
            Ok(target_refs)
        }
    }

    /// Reads the (possibly dotted) table reference at `start`.
    fn read_table_ref(sql: &str, tokens: &[Token], start: usize) -> Option<TableRef> {
        let first = tokens.get(start)?;
        if first.is_punct('(')
            || (first.is_word("UNNEST") && tokens.get(start + 1).is_some_and(|t| t.is_punct('(')))
        {
            return Some(TableRef::Derived);
        }

        let unsupported = |t: &Token| TableRef::Unsupported(sql[t.start..t.end].to_string());
        let Some(name) = first.name_part() else {
            return Some(unsupported(first));
        };
        let mut parts = vec![name.to_string()];
        let mut j = start + 1;
        while tokens.get(j).is_some_and(|t| t.is_punct('.')) {
            let Some(next) = tokens.get(j + 1) else {
                break;
            };
            match next.name_part() {
                Some(part) => parts.push(part.to_string()),
                None => return Some(unsupported(next)),
            }
            j += 2;
        }
        Some(TableRef::Name(parts.join(".")))
    }

    fn apply_limit(&self, sql: &str, tokens: &[Token]) -> Result<String, GuardError> {
        let mut depth = 0i32;
        let mut limit_at = None;
        for (i, token) in tokens.iter().enumerate() {
            match &token.kind {
                Kind::Punct('(') => depth += 1,
                Kind::Punct(')') => depth -= 1,
                Kind::Word(w) if depth == 0 && w.eq_ignore_ascii_case("LIMIT") => {
                    limit_at = Some(i)
                }
                _ => {}
            }
        }

        let Some(i) = limit_at else {
            return Ok(format!("{}\nLIMIT {}", sql, self.row_cap));
        };

        let value = tokens.get(i + 1).ok_or(GuardError::InvalidLimit)?;
        let Kind::Number(n) = &value.kind else {
            return Err(GuardError::InvalidLimit);
        };
        let n: usize = n.parse().map_err(|_| GuardError::InvalidLimit)?;
        if n <= self.row_cap {
            return Ok(sql.to_string());
        }
        Ok(format!(
            "{}{}{}",
            &sql[..value.start],
            self.row_cap,
            &sql[value.end..]
        ))
    }
}

/// Every scope that reads the target table must have `restaurant_id =
/// @restaurant_id` as an `AND` conjunct of its own `WHERE`, with no top-level
/// `OR` beside it.
fn check_tenant_filter(tokens: &[Token], target_refs: &[usize]) -> Result<(), GuardError> {
    let depths = depths(tokens);
    for &at in target_refs {
        let depth = depths[at];
        let is_boundary = |i: usize| {
            depths[i] < depth || (depths[i] == depth && is_set_operator(&tokens[i]))
        };

        let mut start = at;
        while start > 0 && !is_boundary(start - 1) {
            start -= 1;
        }
        let mut end = at;
        while end < tokens.len() && !is_boundary(end) {
            end += 1;
        }

        if !scope_is_filtered(tokens, &depths, depth, start..end) {
            return Err(GuardError::MissingTenantFilter);
        }
    }
    Ok(())
}

fn scope_is_filtered(
    tokens: &[Token],
    depths: &[usize],
    depth: usize,
    scope: std::ops::Range<usize>,
) -> bool {
    let Some(where_at) = scope
        .clone()
        .find(|&i| depths[i] == depth && tokens[i].is_word("WHERE"))
    else {
        return false;
    };

    let mut conjuncts = Vec::new();
    let mut conjunct_start = where_at + 1;
    let mut case_depth = 0usize;
    let mut in_between = false;
    let mut i = where_at + 1;
    while i < scope.end {
        let t = &tokens[i];
        if depths[i] != depth {
            i += 1;
            continue;
        }
        if is_where_terminator(t) {
            break;
        }
        if t.is_word("CASE") {
            case_depth += 1;
        } else if t.is_word("END") {
            case_depth = case_depth.saturating_sub(1);
        } else if case_depth == 0 {
            if t.is_word("OR") {
                return false;
            }
            if t.is_word("BETWEEN") {
                in_between = true;
            } else if t.is_word("AND") {
                if in_between {
                    in_between = false;
                } else {
                    conjuncts.push(conjunct_start..i);
                    conjunct_start = i + 1;
                }
            }
        }
        i += 1;
    }
    conjuncts.push(conjunct_start..i);

    conjuncts
        .into_iter()
        .any(|range| is_tenant_conjunct(&tokens[range]))
}

fn is_tenant_conjunct(conjunct: &[Token]) -> bool {
    let Some(eq) = conjunct.iter().position(|t| t.is_punct('=')) else {
        return false;
    };
    let (lhs, rhs) = (&conjunct[..eq], &conjunct[eq + 1..]);
    (is_tenant_column(lhs) && is_tenant_param(rhs)) || (is_tenant_param(lhs) && is_tenant_column(rhs))
}

fn is_tenant_param(side: &[Token]) -> bool {
    matches!(side, [t] if matches!(&t.kind, Kind::Param(p) if p.eq_ignore_ascii_case(RESTAURANT_PARAM)))
}

/// `restaurant_id`, optionally qualified (`v.restaurant_id`).
fn is_tenant_column(side: &[Token]) -> bool {
    let Some((column, qualifier)) = side.split_last() else {
        return false;
    };
    column
        .name_part()
        .is_some_and(|n| n.eq_ignore_ascii_case(RESTAURANT_COLUMN))
        && qualifier.len() % 2 == 0
        && qualifier
            .chunks(2)
            .all(|pair| pair[0].name_part().is_some() && pair[1].is_punct('.'))
}

fn is_set_operator(token: &Token) -> bool {
    token.is_word("UNION") || token.is_word("EXCEPT") || token.is_word("INTERSECT")
}

fn is_where_terminator(token: &Token) -> bool {
    ["GROUP", "ORDER", "HAVING", "LIMIT", "WINDOW", "QUALIFY", "OFFSET"]
        .iter()
        .any(|w| token.is_word(w))
}

/// `IS [NOT] DISTINCT FROM` compares values, it names no table.
fn is_distinct_from(tokens: &[Token], i: usize) -> bool {
    tokens[i].is_word("FROM")
        && i >= 2
        && tokens[i - 1].is_word("DISTINCT")
        && (tokens[i - 2].is_word("IS")
            || (i >= 3 && tokens[i - 2].is_word("NOT") && tokens[i - 3].is_word("IS")))
}

fn ends_from_clause(token: &Token) -> bool {
    is_where_terminator(token)
        || is_set_operator(token)
        || token.is_word("WHERE")
        || token.is_word("SELECT")
}
