use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Hard upper bound for any LIMIT the executor runs.
pub const MAX_LIMIT: u64 = 1000;

/// LIMIT appended to queries that carry none.
pub const DEFAULT_LIMIT: u64 = 50;

/// Keywords that make a statement non-read-only.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "MERGE", "REPLACE",
    "EXEC", "GRANT", "REVOKE", "CALL",
];

/// Words that end a table reference inside a FROM list.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "CROSS", "FULL", "NATURAL", "ON",
    "USING", "GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "UNION", "EXCEPT", "INTERSECT",
    "WINDOW", "INDEXED", "NOT",
];

/// Table-level constraints that are not column definitions.
const CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

/// Result of checking one query candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// The query may run; `sql` is the normalized text to execute.
    Approved { sql: String },
    Rejected { reason: String },
}

impl Verdict {
    fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// The normalized SQL of an approved verdict.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Approved { sql } => Some(sql),
            Self::Rejected { .. } => None,
        }
    }
}

/// Read-only query policy: allow-list, single statement, schema presence
/// and LIMIT normalization. Rules are checked in that order and the first
/// failing rule decides the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlPolicy {
    pub max_limit: u64,
    pub default_limit: u64,
}

impl Default for SqlPolicy {
    fn default() -> Self {
        Self::new(MAX_LIMIT, DEFAULT_LIMIT)
    }
}

impl SqlPolicy {
    pub fn new(max_limit: u64, default_limit: u64) -> Self {
        Self {
            max_limit,
            default_limit,
        }
    }

    /// Check `sql` against the CREATE statements in `schema`.
    pub fn validate(&self, sql: &str, schema: &str) -> Verdict {
        let tokens = match tokenize(sql) {
            Ok(tokens) => tokens,
            Err(reason) => return Verdict::rejected(reason),
        };

        let Some(first) = tokens.first() else {
            return Verdict::rejected("empty query");
        };
        if !(first.is_kw("SELECT") || first.is_kw("WITH")) {
            return Verdict::rejected("only SELECT queries are allowed");
        }
        if let Some(t) = tokens
            .iter()
            .find(|t| FORBIDDEN_KEYWORDS.iter().any(|k| t.is_kw(k)))
        {
            return Verdict::rejected(format!(
                "forbidden keyword: {}",
                t.text.to_ascii_uppercase()
            ));
        }

        if let Some(pos) = tokens.iter().position(|t| t.is_punct(';')) {
            if pos + 1 < tokens.len() {
                return Verdict::rejected("multiple statements are not allowed");
            }
        }

        let names = SchemaNames::parse(schema);
        if let Err(reason) = check_references(&tokens, &names) {
            return Verdict::rejected(reason);
        }

        Verdict::Approved {
            sql: self.normalize_limit(sql, &tokens),
        }
    }

    /// Clamp a top-level LIMIT to `max_limit`, or append the default one.
    ///
    /// A count that is not a plain integer literal (negative, parenthesized,
    /// an expression, or too large for `u64`) is replaced by `max_limit`.
    fn normalize_limit(&self, sql: &str, tokens: &[Token<'_>]) -> String {
        let mut depth = 0i32;
        for (i, t) in tokens.iter().enumerate() {
            if t.is_punct('(') {
                depth += 1;
            } else if t.is_punct(')') {
                depth -= 1;
            } else if depth == 0 && t.is_kw("LIMIT") {
                // LIMIT n | LIMIT offset, n | LIMIT n OFFSET m
                let rest = &tokens[i + 1..];
                let (first, stop) = limit_operand(rest);
                let count = match stop {
                    Some(comma) if rest[comma].is_punct(',') => limit_operand(&rest[comma + 1..]).0,
                    _ => first,
                };
                let (Some(head), Some(tail)) = (count.first(), count.last()) else {
                    return sql.trim().to_string();
                };
                let within = match count {
                    [n] if n.kind == Kind::Number => {
                        literal_value(n.text).is_some_and(|v| v <= self.max_limit)
                    }
                    _ => false,
                };
                if within {
                    return sql.trim().to_string();
                }
                return format!("{}{}{}", &sql[..head.start], self.max_limit, &sql[tail.end..])
                    .trim()
                    .to_string();
            }
        }

        // Cut at the last real token so trailing semicolons and comments go
        let body_end = tokens
            .iter()
            .rev()
            .find(|t| !t.is_punct(';'))
            .map(|t| t.end)
            .unwrap_or(0);
        format!(
            "{} LIMIT {}",
            sql[..body_end].trim(),
            self.default_limit.min(self.max_limit)
        )
    }
}

/// Tokens of one LIMIT operand and the index of the token that ended it
/// (a top-level `,`, `OFFSET` or `;`).
fn limit_operand<'t, 'a>(tokens: &'t [Token<'a>]) -> (&'t [Token<'a>], Option<usize>) {
    let mut depth = 0i32;
    for (i, t) in tokens.iter().enumerate() {
        if t.is_punct('(') {
            depth += 1;
        } else if t.is_punct(')') {
            depth -= 1;
        } else if depth == 0 && (t.is_punct(',') || t.is_punct(';') || t.is_kw("OFFSET")) {
            return (&tokens[..i], Some(i));
        }
    }
    (tokens, None)
}

/// Value of a decimal or hex integer literal. `None` when it is anything
/// else or does not fit in `u64`.
fn literal_value(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Validate with the default LIMIT of 50.
pub fn validate(sql: &str, schema: &str, max_limit: u64) -> Verdict {
    SqlPolicy::new(max_limit, DEFAULT_LIMIT).validate(sql, schema)
}

// ── Lexer ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    /// "ident", `ident` or [ident]
    Quoted,
    /// 'literal'
    Str,
    Number,
    Punct,
}

#[derive(Debug, Clone)]
struct Token<'a> {
    kind: Kind,
    text: &'a str,
    start: usize,
    end: usize,
}

impl Token<'_> {
    fn is_kw(&self, kw: &str) -> bool {
        self.kind == Kind::Word && self.text.eq_ignore_ascii_case(kw)
    }

    fn is_punct(&self, c: char) -> bool {
        self.kind == Kind::Punct && self.text.starts_with(c)
    }

    /// Lowercased identifier name of a bare word or quoted identifier.
    fn ident(&self) -> Option<String> {
        match self.kind {
            Kind::Word => Some(self.text.to_lowercase()),
            Kind::Quoted => Some(unquote(self.text).to_lowercase()),
            _ => None,
        }
    }

    /// Like `ident`, but also accepts a string literal (SQLite allows 'name' in DDL).
    fn name(&self) -> Option<String> {
        match self.kind {
            Kind::Str => Some(unquote(self.text).to_lowercase()),
            _ => self.ident(),
        }
    }
}

fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let (Some(open), Some(_)) = (chars.next(), chars.next_back()) else {
        return text.to_string();
    };
    let inner = chars.as_str();
    match open {
        '[' => inner.to_string(),
        q => inner.replace(&format!("{q}{q}"), &q.to_string()),
    }
}

fn tokenize(sql: &str) -> std::result::Result<Vec<Token<'_>>, String> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let offset = |i: usize| chars.get(i).map(|(p, _)| *p).unwrap_or(sql.len());
    let at = |i: usize| chars.get(i).map(|(_, c)| *c);

    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(c) = at(i) {
        let start = offset(i);

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '-' && at(i + 1) == Some('-') {
            while at(i).is_some_and(|c| c != '\n') {
                i += 1;
            }
            continue;
        }
        if c == '/' && at(i + 1) == Some('*') {
            i += 2;
            loop {
                match at(i) {
                    None => return Err("unterminated comment".into()),
                    Some('*') if at(i + 1) == Some('/') => {
                        i += 2;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            continue;
        }

        let kind = match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                i += 1;
                loop {
                    let Some(ch) = at(i) else {
                        return Err("unterminated quoted text".into());
                    };
                    i += 1;
                    if ch == close {
                        // A doubled delimiter escapes itself
                        if close != ']' && at(i) == Some(close) {
                            i += 1;
                            continue;
                        }
                        break;
                    }
                }
                if c == '\'' {
                    Kind::Str
                } else {
                    Kind::Quoted
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                while at(i).is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    i += 1;
                }
                Kind::Word
            }
            c if c.is_ascii_digit() => {
                while at(i).is_some_and(|c| c.is_ascii_alphanumeric() || c == '.') {
                    i += 1;
                }
                Kind::Number
            }
            _ => {
                i += 1;
                Kind::Punct
            }
        };

        let end = offset(i);
        tokens.push(Token {
            kind,
            text: &sql[start..end],
            start,
            end,
        });
    }
    Ok(tokens)
}

// ── Schema presence ─────────────────────────────────────────────

/// Table and column names declared by a schema snippet, lowercased.
#[derive(Debug, Default)]
struct SchemaNames {
    tables: HashSet<String>,
    columns: HashSet<String>,
}

impl SchemaNames {
    fn parse(snippet: &str) -> Self {
        let mut names = Self::default();
        let Ok(tokens) = tokenize(snippet) else {
            return names;
        };

        let mut i = 0;
        while i < tokens.len() {
            if !tokens[i].is_kw("CREATE") {
                i += 1;
                continue;
            }
            i += 1;
            while tokens
                .get(i)
                .is_some_and(|t| t.is_kw("TEMP") || t.is_kw("TEMPORARY") || t.is_kw("VIRTUAL"))
            {
                i += 1;
            }
            let is_view = match tokens.get(i) {
                Some(t) if t.is_kw("TABLE") => false,
                Some(t) if t.is_kw("VIEW") => true,
                _ => continue,
            };
            i += 1;
            if tokens.get(i).is_some_and(|t| t.is_kw("IF")) {
                // IF NOT EXISTS
                i += 3;
            }

            let Some(mut name) = tokens.get(i).and_then(Token::name) else {
                continue;
            };
            i += 1;
            if tokens.get(i).is_some_and(|t| t.is_punct('.')) {
                if let Some(qualified) = tokens.get(i + 1).and_then(Token::name) {
                    name = qualified;
                    i += 2;
                }
            }
            names.tables.insert(name);

            if is_view {
                // Every identifier of the view body counts as a column name
                while i < tokens.len() && !tokens[i].is_punct(';') {
                    if let Some(ident) = tokens[i].ident() {
                        names.columns.insert(ident);
                    }
                    i += 1;
                }
                continue;
            }

            if !tokens.get(i).is_some_and(|t| t.is_punct('(')) {
                continue;
            }
            i += 1;
            let mut depth = 1;
            let mut expect_column = true;
            while i < tokens.len() && depth > 0 {
                let t = &tokens[i];
                if t.is_punct('(') {
                    depth += 1;
                } else if t.is_punct(')') {
                    depth -= 1;
                } else if depth == 1 && t.is_punct(',') {
                    expect_column = true;
                } else if depth == 1 && expect_column {
                    if !CONSTRAINT_KEYWORDS.iter().any(|k| t.is_kw(k)) {
                        if let Some(column) = t.name() {
                            names.columns.insert(column);
                        }
                    }
                    expect_column = false;
                }
                i += 1;
            }
        }
        names
    }
}

/// Names a query declares for itself: CTEs, their column lists and AS aliases.
#[derive(Debug, Default)]
struct LocalNames {
    ctes: HashSet<String>,
    aliases: HashSet<String>,
}

impl LocalNames {
    fn collect(tokens: &[Token<'_>]) -> Self {
        let mut local = Self::default();
        for (i, t) in tokens.iter().enumerate() {
            if !t.is_kw("AS") {
                continue;
            }
            match tokens.get(i + 1) {
                // name AS ( ... )  or  name(col, ...) AS ( ... )
                Some(next) if next.is_punct('(') && i > 0 => {
                    let prev = &tokens[i - 1];
                    if let Some(name) = prev.ident() {
                        local.ctes.insert(name);
                    } else if prev.is_punct(')') {
                        let mut j = i - 1;
                        while j > 0 && !tokens[j].is_punct('(') {
                            j -= 1;
                            if let Some(column) = tokens[j].ident() {
                                local.aliases.insert(column);
                            }
                        }
                        if let Some(name) = j.checked_sub(1).and_then(|k| tokens[k].ident()) {
                            local.ctes.insert(name);
                        }
                    }
                }
                Some(next) => {
                    if let Some(alias) = next.ident() {
                        local.aliases.insert(alias);
                    }
                }
                None => {}
            }
        }
        local
    }
}

fn check_references(
    tokens: &[Token<'_>],
    schema: &SchemaNames,
) -> std::result::Result<(), String> {
    let local = LocalNames::collect(tokens);
    let known = |name: &str| {
        schema.columns.contains(name)
            || schema.tables.contains(name)
            || local.aliases.contains(name)
            || local.ctes.contains(name)
    };

    // Tables after FROM / JOIN
    for (i, t) in tokens.iter().enumerate() {
        if !(t.is_kw("FROM") || t.is_kw("JOIN")) {
            continue;
        }
        let mut j = i + 1;
        loop {
            let Some(tok) = tokens.get(j) else { break };
            // Subqueries are checked through their own FROM clauses
            let Some(mut table) = tok.ident() else { break };
            let mut shown = tok.text.to_string();
            j += 1;
            if tokens.get(j).is_some_and(|t| t.is_punct('.')) {
                if let Some(next) = tokens.get(j + 1) {
                    if let Some(qualified) = next.ident() {
                        table = qualified;
                        shown = next.text.to_string();
                        j += 2;
                    }
                }
            }
            if tokens.get(j).is_some_and(|t| t.is_punct('(')) {
                // Table-valued function
                break;
            }
            if !schema.tables.contains(&table) && !local.ctes.contains(&table) {
                return Err(format!("unknown table: {}", shown));
            }

            match tokens.get(j) {
                Some(t) if t.is_kw("AS") => j += 2,
                Some(t)
                    if t.kind == Kind::Quoted
                        || (t.kind == Kind::Word
                            && !CLAUSE_KEYWORDS.iter().any(|k| t.is_kw(k))) =>
                {
                    j += 1
                }
                _ => {}
            }
            if tokens.get(j).is_some_and(|t| t.is_punct(',')) {
                j += 1;
                continue;
            }
            break;
        }
    }

    // Qualified columns: alias.column
    for window in tokens.windows(3) {
        let [qualifier, dot, column] = window else {
            continue;
        };
        if !dot.is_punct('.') || qualifier.ident().is_none() {
            continue;
        }
        if let Some(name) = column.ident() {
            if !known(&name) {
                return Err(format!("unknown column: {}.{}", qualifier.text, column.text));
            }
        }
    }

    // Quoted identifiers anywhere
    for t in tokens.iter().filter(|t| t.kind == Kind::Quoted) {
        if let Some(name) = t.ident() {
            if !known(&name) {
                return Err(format!("unknown identifier: {}", t.text));
            }
        }
    }

    Ok(())
}
