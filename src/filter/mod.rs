//! Filter expressions - parse, type-check and normalise
//!
//! A filter string is parsed into an [`Expr`] tree, checked against the
//! root kind's declarations and rewritten to canonical identifier casing.
//! The result is consumed by the transpiler.

pub mod ast;
pub mod check;
pub mod normalize;
pub mod parser;

pub use ast::{Expr, Function, Literal};
pub use normalize::{canonical_path, canonical_segment};

use crate::schema::declarations::Declarations;
use crate::Result;

/// Parse, type-check and normalise a filter for the declarations' kind
pub fn parse(filter: &str, decls: &Declarations) -> Result<Expr> {
    let expr = parser::parse_expr(filter)?;
    check::check(&expr, decls)?;
    let normalized = normalize::normalize(expr);

    tracing::debug!(kind = %decls.kind(), filter, normalized = %normalized, "parsed filter");
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ResourceKind;

    #[test]
    fn test_parse_pipeline() {
        let decls = Declarations::build(ResourceKind::Instance);
        let expr = parse(r#"host.desiredState = HOST_STATE_ONBOARDED"#, &decls).unwrap();
        assert_eq!(expr.to_string(), "host.desired_state = HOST_STATE_ONBOARDED");
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let decls = Declarations::build(ResourceKind::Instance);
        assert!(parse("host.nope = 1", &decls).is_err());
    }
}
