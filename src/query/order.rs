//! `orderBy` parsing.
//!
//! A comma-separated list of column names, each optionally followed by
//! `asc` or `desc` (any case). The first occurrence of a column wins.
//! Relationship names and unknown tokens are rejected.

use std::fmt;

use crate::filter::canonical_segment;
use crate::kind::ResourceKind;
use crate::schema::descriptor::descriptor;
use crate::transpile::predicate::ROOT_ALIAS;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: &'static str,
    pub direction: Direction,
}

impl fmt::Display for OrderTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", ROOT_ALIAS, self.column, self.direction.as_sql())
    }
}

fn parse_term(kind: ResourceKind, token: &str) -> Result<OrderTerm> {
    let mut parts = token.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| Error::invalid("empty orderBy entry"))?;

    let direction = match parts.next() {
        None => Direction::Asc,
        Some(dir) if dir.eq_ignore_ascii_case("asc") => Direction::Asc,
        Some(dir) if dir.eq_ignore_ascii_case("desc") => Direction::Desc,
        Some(dir) => {
            return Err(Error::invalid(format!(
                "invalid orderBy direction '{}' for '{}'",
                dir, name
            )));
        }
    };
    if let Some(extra) = parts.next() {
        return Err(Error::invalid(format!(
            "unexpected token '{}' in orderBy entry '{}'",
            extra, token
        )));
    }

    let desc = descriptor(kind);
    let canonical = canonical_segment(name);
    if desc.edge(&canonical).is_some() {
        return Err(Error::invalid(format!(
            "cannot order {} by relationship '{}'",
            kind, name
        )));
    }
    let field = desc.column(&canonical).ok_or_else(|| {
        Error::invalid(format!("unknown orderBy column '{}' for {}", name, kind))
    })?;

    Ok(OrderTerm {
        column: field.name,
        direction,
    })
}

/// Parse an `orderBy` string for a kind
pub fn parse_order_by(kind: ResourceKind, order_by: &str) -> Result<Vec<OrderTerm>> {
    if order_by.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut terms: Vec<OrderTerm> = Vec::new();
    for token in order_by.split(',') {
        let term = parse_term(kind, token)?;
        if terms.iter().all(|t| t.column != term.column) {
            terms.push(term);
        }
    }
    Ok(terms)
}

/// Render terms as an ORDER BY list on the root alias
pub fn to_sql(terms: &[OrderTerm]) -> String {
    terms
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use test_case::test_case;

    #[test]
    fn test_default_and_explicit_direction() {
        let terms = parse_order_by(ResourceKind::Host, "name, memoryBytes DESC").unwrap();
        assert_eq!(
            terms,
            vec![
                OrderTerm { column: "name", direction: Direction::Asc },
                OrderTerm { column: "memory_bytes", direction: Direction::Desc },
            ]
        );
        assert_eq!(to_sql(&terms), "t0.name ASC, t0.memory_bytes DESC");
    }

    #[test]
    fn test_duplicates_first_wins() {
        assert_eq!(
            parse_order_by(ResourceKind::Host, "name,name").unwrap(),
            parse_order_by(ResourceKind::Host, "name").unwrap()
        );
        let terms = parse_order_by(ResourceKind::Host, "name desc, name asc").unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].direction, Direction::Desc);
    }

    #[test]
    fn test_direction_is_case_insensitive() {
        let terms = parse_order_by(ResourceKind::Site, "name DeSc").unwrap();
        assert_eq!(terms[0].direction, Direction::Desc);
    }

    #[test_case("site" ; "forward relationship")]
    #[test_case("instance" ; "reverse relationship")]
    #[test_case("bogus" ; "unknown column")]
    #[test_case("name sideways" ; "bad direction")]
    #[test_case("name asc extra" ; "trailing token")]
    #[test_case("name,,uuid" ; "empty entry")]
    fn test_rejected(order_by: &str) {
        let err = parse_order_by(ResourceKind::Host, order_by).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_empty_is_no_ordering() {
        assert!(parse_order_by(ResourceKind::Host, "  ").unwrap().is_empty());
    }
}
