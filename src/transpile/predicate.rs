//! Compiled predicates.
//!
//! A [`Predicate`] is a plain value: sub-predicates are combined by value
//! and never share builder state, so AND/OR branches cannot leak into one
//! another. Rendering produces a parameterised SQLite WHERE fragment.

use rusqlite::types::Value as SqlValue;

use crate::kind::ResourceKind;
use crate::schema::descriptor::EdgeLink;

/// Alias of the root table in rendered queries
pub const ROOT_ALIAS: &str = "t0";

/// Unicode lowercase scalar function registered on every store connection
pub const FOLD_FUNCTION: &str = "casefold";

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A compiled condition on one kind's rows
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row
    True,
    Compare {
        column: &'static str,
        op: CmpOp,
        value: SqlValue,
    },
    /// Unicode case-insensitive LIKE against an already escaped pattern
    ContainsFold {
        column: &'static str,
        pattern: String,
    },
    /// Column is NULL or the empty string
    EmptyOrNull { column: &'static str },
    IsNull { column: &'static str },
    IsNotNull { column: &'static str },
    /// Boolean column explicitly true
    IsTrue { column: &'static str },
    /// Boolean column false or never set
    FalseOrNull { column: &'static str },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    /// There exists a related row of `target` matching `inner`
    Related {
        target: ResourceKind,
        link: EdgeLink,
        inner: Box<Predicate>,
    },
}

/// Rendered SQL with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    pub fn and(lhs: Predicate, rhs: Predicate) -> Predicate {
        match (lhs, rhs) {
            (Predicate::True, other) | (other, Predicate::True) => other,
            (lhs, rhs) => Predicate::And(Box::new(lhs), Box::new(rhs)),
        }
    }

    pub fn or(lhs: Predicate, rhs: Predicate) -> Predicate {
        match (lhs, rhs) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (lhs, rhs) => Predicate::Or(Box::new(lhs), Box::new(rhs)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: Predicate) -> Predicate {
        match operand {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Number of relationship hops in the deepest branch
    pub fn depth(&self) -> usize {
        match self {
            Predicate::Not(p) => p.depth(),
            Predicate::And(l, r) | Predicate::Or(l, r) => l.depth().max(r.depth()),
            Predicate::Related { inner, .. } => 1 + inner.depth(),
            _ => 0,
        }
    }

    /// Render against the root alias
    pub fn to_sql(&self) -> SqlFragment {
        let mut params = Vec::new();
        let sql = self.render(ROOT_ALIAS, 0, &mut params);
        SqlFragment { sql, params }
    }

    fn render(&self, alias: &str, depth: usize, params: &mut Vec<SqlValue>) -> String {
        match self {
            Predicate::True => "1 = 1".to_string(),
            Predicate::Compare { column, op, value } => {
                params.push(value.clone());
                format!("{}.{} {} ?", alias, column, op.sql())
            }
            Predicate::ContainsFold { column, pattern } => {
                params.push(SqlValue::Text(pattern.clone()));
                format!(
                    "{f}({}.{}) LIKE {f}(?) ESCAPE '\\'",
                    alias,
                    column,
                    f = FOLD_FUNCTION
                )
            }
            Predicate::EmptyOrNull { column } => {
                format!("({a}.{c} IS NULL OR {a}.{c} = '')", a = alias, c = column)
            }
            Predicate::IsNull { column } => format!("{}.{} IS NULL", alias, column),
            Predicate::IsNotNull { column } => format!("{}.{} IS NOT NULL", alias, column),
            Predicate::IsTrue { column } => format!("{}.{} = 1", alias, column),
            Predicate::FalseOrNull { column } => {
                format!("({a}.{c} = 0 OR {a}.{c} IS NULL)", a = alias, c = column)
            }
            Predicate::Not(inner) => format!("NOT ({})", inner.render(alias, depth, params)),
            Predicate::And(lhs, rhs) => {
                let l = lhs.render(alias, depth, params);
                let r = rhs.render(alias, depth, params);
                format!("({} AND {})", l, r)
            }
            Predicate::Or(lhs, rhs) => {
                let l = lhs.render(alias, depth, params);
                let r = rhs.render(alias, depth, params);
                format!("({} OR {})", l, r)
            }
            Predicate::Related {
                target,
                link,
                inner,
            } => {
                let sub = format!("t{}", depth + 1);
                let join = match link {
                    EdgeLink::Forward { column } => {
                        format!("{}.resource_id = {}.{}", sub, alias, column)
                    }
                    EdgeLink::Reverse { column } => {
                        format!("{}.{} = {}.resource_id", sub, column, alias)
                    }
                };
                let inner_sql = inner.render(&sub, depth + 1, params);
                format!(
                    "EXISTS (SELECT 1 FROM {table} {sub} WHERE {join} AND {sub}.tenant_id = {alias}.tenant_id AND {inner_sql})",
                    table = target.table(),
                )
            }
        }
    }
}

/// Translate a filter string value into a LIKE containment pattern.
///
/// `*` becomes the multi-character wildcard; LIKE's own reserved
/// characters are escaped with `\`.
pub fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for c in value.chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('%');
    out
}
