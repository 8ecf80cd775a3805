//! Anti-pattern checks
//!
//! Each check is an independent pure predicate over a [`PreparedQuery`].
//! Checks never depend on one another and several may match the same query.

use std::sync::LazyLock;

use qlens_core::QueryType;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::tokens::{PreparedQuery, is_identifier};

static LIKE_LEADING_WILDCARD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:i?like)\s+'%").expect("valid regex"));

/// Tokens that may directly follow a function call used as a predicate operand
const COMPARISON_FOLLOWERS: &[&str] = &[
    "=", "<>", "!=", ">", "<", ">=", "<=", "like", "ilike", "in", "between", "is",
];

/// Words followed by `(` that are not function calls
const NON_FUNCTIONS: &[&str] = &["in", "exists", "not", "and", "or", "any", "all", "values"];

/// Named structural weakness detectable from query text alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AntiPattern {
    /// SELECT/UPDATE/DELETE over a table without a WHERE clause
    MissingWhere,
    /// `SELECT *` or `alias.*` projection
    SelectStar,
    /// SELECT without LIMIT/FETCH/TOP
    MissingLimit,
    /// CROSS JOIN, a join without a condition, or a comma join without WHERE
    CartesianJoin,
    /// Correlated or scalar subquery in the projection list
    SubqueryInSelect,
    /// OR inside the WHERE clause
    OrConditions,
    /// A function applied to a predicate operand in the WHERE clause
    FunctionInWhere,
    /// LIKE pattern beginning with `%`
    LikeLeadingWildcard,
}

impl AntiPattern {
    /// Every check, in declaration order
    pub const ALL: [AntiPattern; 8] = [
        Self::MissingWhere,
        Self::SelectStar,
        Self::MissingLimit,
        Self::CartesianJoin,
        Self::SubqueryInSelect,
        Self::OrConditions,
        Self::FunctionInWhere,
        Self::LikeLeadingWildcard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingWhere => "missing-where",
            Self::SelectStar => "select-star",
            Self::MissingLimit => "missing-limit",
            Self::CartesianJoin => "cartesian-join",
            Self::SubqueryInSelect => "subquery-in-select",
            Self::OrConditions => "or-conditions",
            Self::FunctionInWhere => "function-in-where",
            Self::LikeLeadingWildcard => "like-leading-wildcard",
        }
    }

    /// Runs this check against a prepared query
    pub(crate) fn detect(&self, query: &PreparedQuery, query_type: QueryType) -> bool {
        match self {
            Self::MissingWhere => missing_where(query, query_type),
            Self::SelectStar => select_star(query),
            Self::MissingLimit => missing_limit(query, query_type),
            Self::CartesianJoin => cartesian_join(query),
            Self::SubqueryInSelect => subquery_in_select(query),
            Self::OrConditions => or_conditions(query),
            Self::FunctionInWhere => function_in_where(query),
            Self::LikeLeadingWildcard => like_leading_wildcard(query),
        }
    }
}

impl std::fmt::Display for AntiPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn missing_where(query: &PreparedQuery, query_type: QueryType) -> bool {
    matches!(
        query_type,
        QueryType::Select | QueryType::Update | QueryType::Delete
    ) && !query.tables.is_empty()
        && !query.has_token("where")
}

fn select_star(query: &PreparedQuery) -> bool {
    query.tokens.iter().enumerate().any(|(idx, token)| {
        token == "*"
            && idx > 0
            && matches!(
                query.tokens[idx - 1].as_str(),
                "select" | "distinct" | "," | "."
            )
    })
}

fn missing_limit(query: &PreparedQuery, query_type: QueryType) -> bool {
    query_type == QueryType::Select
        && !query.tables.is_empty()
        && !query.has_token("limit")
        && !query.has_token("fetch")
        && !query.has_token("top")
}

fn cartesian_join(query: &PreparedQuery) -> bool {
    if query.has_token("cross") {
        return true;
    }

    if query.from_list_len > 1 && query.where_range.is_none() {
        return true;
    }

    let natural = query.count_token("natural");
    let joins = query.count_token("join").saturating_sub(natural);
    let conditions = query.count_token("on") + query.count_token("using");
    joins > conditions
}

fn subquery_in_select(query: &PreparedQuery) -> bool {
    let tokens = &query.tokens;
    let Some(start) = tokens.iter().position(|t| t == "select") else {
        return false;
    };

    let mut depth = 0i32;
    for idx in start + 1..tokens.len() {
        match tokens[idx].as_str() {
            "(" => {
                if tokens.get(idx + 1).map(|t| t == "select").unwrap_or(false) {
                    return true;
                }
                depth += 1;
            }
            ")" => depth -= 1,
            "from" if depth == 0 => return false,
            _ => {}
        }
    }
    false
}

fn or_conditions(query: &PreparedQuery) -> bool {
    query.where_tokens().iter().any(|t| t == "or")
}

fn function_in_where(query: &PreparedQuery) -> bool {
    let tokens = query.where_tokens();

    for (idx, token) in tokens.iter().enumerate() {
        if !is_identifier(token) || NON_FUNCTIONS.contains(&token.as_str()) {
            continue;
        }
        if tokens.get(idx + 1).map(|t| t != "(").unwrap_or(true) {
            continue;
        }

        // Find the matching close paren and check whether the call feeds a comparison
        let mut depth = 0i32;
        let mut has_column_arg = false;
        for (offset, inner) in tokens[idx + 1..].iter().enumerate() {
            match inner.as_str() {
                "(" => depth += 1,
                ")" => {
                    depth -= 1;
                    if depth == 0 {
                        let after = tokens.get(idx + 1 + offset + 1).map(String::as_str);
                        if has_column_arg
                            && after.map(|a| COMPARISON_FOLLOWERS.contains(&a)).unwrap_or(false)
                        {
                            return true;
                        }
                        break;
                    }
                }
                t if is_identifier(t) => has_column_arg = true,
                _ => {}
            }
        }
    }
    false
}

fn like_leading_wildcard(query: &PreparedQuery) -> bool {
    LIKE_LEADING_WILDCARD_REGEX.is_match(&query.lower)
}
