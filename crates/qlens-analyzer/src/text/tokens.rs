//! Tokenization of query text for the heuristic checks

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static COMMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--[^\n]*|/\*[\s\S]*?\*/").expect("valid regex"));

static STRING_LITERAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid regex"));

static QUOTE_CHARS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["`\[\]]"#).expect("valid regex"));

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[a-z_][a-z0-9_$]*(?:\.[a-z_][a-z0-9_$]*)*|\d+(?:\.\d+)?|<>|!=|>=|<=|\|\||::|[=<>(),*;?+\-/%.]",
    )
    .expect("valid regex")
});

/// Words that terminate a table reference or can never be an alias
const KEYWORDS: &[&str] = &[
    "select", "from", "where", "join", "inner", "left", "right", "full", "outer", "cross",
    "natural", "lateral", "on", "using", "group", "order", "by", "having", "limit", "offset",
    "union", "intersect", "except", "all", "as", "and", "or", "not", "in", "is", "null", "like",
    "ilike", "between", "case", "when", "then", "else", "end", "set", "values", "into", "insert",
    "update", "delete", "distinct", "exists", "with", "returning", "fetch", "first", "next",
    "rows", "only", "top", "asc", "desc", "window", "for", "default",
];

/// Keywords that end the WHERE clause of the statement they belong to
const CLAUSE_TERMINATORS: &[&str] = &[
    "group", "order", "limit", "offset", "having", "union", "intersect", "except", "returning",
    "window", "fetch", "for",
];

pub(crate) fn is_keyword(token: &str) -> bool {
    KEYWORDS.contains(&token)
}

pub(crate) fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && !is_keyword(token)
}

/// A table referenced in a FROM/JOIN/UPDATE/INTO position
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

/// Query text prepared once and shared by every check
#[derive(Debug, Clone)]
pub(crate) struct PreparedQuery {
    /// Lower-cased text with comments removed (string literals intact)
    pub lower: String,
    /// Lower-cased text with comments, literals and identifier quotes removed
    pub masked: String,
    /// Tokens of `masked`
    pub tokens: Vec<String>,
    /// Tables in order of first reference
    pub tables: Vec<TableRef>,
    /// Token range of the outermost WHERE clause (exclusive of `where` itself)
    pub where_range: Option<(usize, usize)>,
    /// Number of comma-separated entries in the outermost FROM list
    pub from_list_len: usize,
}

impl PreparedQuery {
    pub fn new(text: &str) -> Self {
        let lower = COMMENT_REGEX.replace_all(text, " ").to_lowercase();
        let masked_literals = STRING_LITERAL_REGEX.replace_all(&lower, "?");
        let masked = QUOTE_CHARS_REGEX
            .replace_all(&masked_literals, "")
            .into_owned();
        let tokens: Vec<String> = TOKEN_REGEX
            .find_iter(&masked)
            .map(|m| m.as_str().to_string())
            .collect();

        let (tables, from_list_len) = collect_tables(&tokens);
        let where_range = find_where_range(&tokens);

        Self {
            lower,
            masked,
            tokens,
            tables,
            where_range,
            from_list_len,
        }
    }

    pub fn first_keyword(&self) -> Option<&str> {
        self.tokens
            .iter()
            .map(String::as_str)
            .find(|t| *t != "(")
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn count_token(&self, token: &str) -> usize {
        self.tokens.iter().filter(|t| *t == token).count()
    }

    /// Tokens of the outermost WHERE clause, empty if there is none
    pub fn where_tokens(&self) -> &[String] {
        match self.where_range {
            Some((start, end)) => &self.tokens[start..end],
            None => &[],
        }
    }

    /// Maps aliases (and bare table names) to the referenced table
    pub fn alias_map(&self) -> HashMap<&str, &str> {
        let mut map = HashMap::new();
        for table in &self.tables {
            map.entry(table.name.as_str()).or_insert(table.name.as_str());
            if let Some(last) = table.name.rsplit('.').next() {
                map.entry(last).or_insert(table.name.as_str());
            }
            if let Some(alias) = &table.alias {
                map.insert(alias.as_str(), table.name.as_str());
            }
        }
        map
    }
}

/// Walks the token stream collecting table references.
///
/// A `from` that appears inside a function call's parentheses
/// (e.g. `extract(year from created_at)`) is ignored; one inside a
/// subquery's parentheses is not.
fn collect_tables(tokens: &[String]) -> (Vec<TableRef>, usize) {
    let mut tables: Vec<TableRef> = Vec::new();
    let mut paren_is_subquery: Vec<bool> = Vec::new();
    let mut outer_from_len = 0;
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();
        match token {
            "(" => {
                let is_subquery = tokens.get(i + 1).map(|t| t == "select").unwrap_or(false);
                paren_is_subquery.push(is_subquery);
                i += 1;
            }
            ")" => {
                paren_is_subquery.pop();
                i += 1;
            }
            "from" | "join" | "update" | "into" => {
                let inside_function = paren_is_subquery.last().map(|s| !s).unwrap_or(false);
                if inside_function {
                    i += 1;
                    continue;
                }

                let allow_list = token == "from";
                let depth = paren_is_subquery.len();
                let mut j = i + 1;
                let mut entries = 0;

                loop {
                    let Some(name) = tokens.get(j).filter(|t| is_identifier(t)) else {
                        break;
                    };
                    // `update t set`, `into t (cols)` and `from t` all start here
                    let mut table = TableRef {
                        name: name.clone(),
                        alias: None,
                    };
                    j += 1;

                    if tokens.get(j).map(|t| t == "as").unwrap_or(false) {
                        j += 1;
                    }
                    if let Some(alias) = tokens.get(j).filter(|t| is_identifier(t)) {
                        table.alias = Some(alias.clone());
                        j += 1;
                    }

                    entries += 1;
                    if !tables.iter().any(|t| t.name == table.name && t.alias == table.alias) {
                        tables.push(table);
                    }

                    if allow_list && tokens.get(j).map(|t| t == ",").unwrap_or(false) {
                        j += 1;
                        continue;
                    }
                    break;
                }

                if allow_list && depth == 0 && outer_from_len == 0 {
                    outer_from_len = entries;
                }
                i = j.max(i + 1);
            }
            _ => i += 1,
        }
    }

    (tables, outer_from_len)
}

/// Locates the outermost WHERE clause.
fn find_where_range(tokens: &[String]) -> Option<(usize, usize)> {
    let mut depth: i32 = 0;
    let mut start = None;

    for (idx, token) in tokens.iter().enumerate() {
        match token.as_str() {
            "(" => depth += 1,
            ")" => {
                depth -= 1;
                if depth < 0 {
                    if let Some(s) = start {
                        return Some((s, idx));
                    }
                    depth = 0;
                }
            }
            "where" if depth == 0 && start.is_none() => start = Some(idx + 1),
            ";" if depth == 0 => {
                if let Some(s) = start {
                    return Some((s, idx));
                }
            }
            t if depth == 0 && start.is_some() && CLAUSE_TERMINATORS.contains(&t) => {
                return start.map(|s| (s, idx));
            }
            _ => {}
        }
    }

    start.map(|s| (s, tokens.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokens_mask_literals_and_quotes() {
        let q = PreparedQuery::new(r#"SELECT "Name" FROM users WHERE email = 'x@y.z' -- c"#);
        assert_eq!(
            q.tokens,
            vec!["select", "name", "from", "users", "where", "email", "=", "?"]
        );
    }

    #[test]
    fn test_table_aliases() {
        let q = PreparedQuery::new(
            "select o.id from orders o join customers as c on c.id = o.customer_id",
        );
        assert_eq!(
            q.tables,
            vec![
                TableRef {
                    name: "orders".into(),
                    alias: Some("o".into())
                },
                TableRef {
                    name: "customers".into(),
                    alias: Some("c".into())
                },
            ]
        );
        let aliases = q.alias_map();
        assert_eq!(aliases.get("o"), Some(&"orders"));
        assert_eq!(aliases.get("customers"), Some(&"customers"));
    }

    #[test]
    fn test_from_list() {
        let q = PreparedQuery::new("select * from a, b x, c where a.id = b.id");
        assert_eq!(q.from_list_len, 3);
        assert_eq!(q.tables.len(), 3);
        assert_eq!(q.tables[1].alias.as_deref(), Some("x"));
    }

    #[test]
    fn test_function_from_is_not_a_table() {
        let q = PreparedQuery::new("select extract(year from created_at) from events");
        let names: Vec<_> = q.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["events"]);
    }

    #[test]
    fn test_subquery_tables_are_collected() {
        let q = PreparedQuery::new("select * from a where id in (select a_id from b)");
        let names: Vec<_> = q.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_where_range_stops_at_clause() {
        let q = PreparedQuery::new("select * from t where a = 1 and b = 2 order by a limit 5");
        assert_eq!(q.where_tokens().join(" "), "a = 1 and b = 2");
    }

    #[test]
    fn test_where_range_ignores_subquery_where() {
        let q = PreparedQuery::new("select * from t where id in (select id from u where x = 1)");
        assert_eq!(
            q.where_tokens().join(" "),
            "id in ( select id from u where x = 1 )"
        );

        let q = PreparedQuery::new("select (select max(x) from u where u.t = t.id) from t");
        assert!(q.where_range.is_none());
    }
}
