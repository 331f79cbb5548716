//! Type-checking of parsed filters against a kind's declarations.

use crate::filter::ast::{Expr, Function, Literal};
use crate::schema::declarations::{DeclType, Declarations, OverloadFn, MAX_DEPTH};
use crate::schema::descriptor::FieldType;
use crate::{Error, Result};

/// Standard functions that type-check but have no compiled form
pub const STANDARD_FUNCTIONS: &[&str] = &["startsWith", "endsWith", "matches", "size"];

/// Validate an expression tree against declarations.
///
/// Unknown identifiers, arity mismatches and type mismatches are all
/// reported as invalid arguments.
pub fn check(expr: &Expr, decls: &Declarations) -> Result<()> {
    match expr {
        Expr::Const(Literal::Bool(_)) => Ok(()),
        Expr::Const(lit) => Err(Error::invalid(format!(
            "filter must be a boolean expression, found {} literal {}",
            lit.type_name(),
            lit
        ))),
        Expr::Ident(_) | Expr::Select { .. } => Err(Error::invalid(format!(
            "'{}' must be compared against a value",
            expr
        ))),
        Expr::Call { function, args } => check_call(function, args, decls),
    }
}

fn arity(function: &Function, args: &[Expr], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::invalid(format!(
            "'{}' expects {} argument(s), got {}",
            function.symbol(),
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn check_call(function: &Function, args: &[Expr], decls: &Declarations) -> Result<()> {
    match function {
        Function::And | Function::Or => {
            arity(function, args, 2)?;
            args.iter().try_for_each(|arg| check(arg, decls))
        }
        Function::Not => {
            arity(function, args, 1)?;
            check(&args[0], decls)
        }
        Function::Has => {
            arity(function, args, 1)?;
            let ty = resolve(&args[0], decls)?;
            if !decls.has_overload(OverloadFn::Has, ty.type_name()) {
                return Err(Error::invalid(format!(
                    "found no matching overload for 'has' applied to '{}' ({})",
                    args[0], ty
                )));
            }
            Ok(())
        }
        f if f.is_comparison() => {
            arity(function, args, 2)?;
            let ty = resolve(&args[0], decls)?;
            match &args[1] {
                Expr::Const(lit) => check_comparison(function, &args[0], ty, lit, decls),
                other => Err(Error::invalid(format!(
                    "right-hand side of '{}' must be a literal, found '{}'",
                    function.symbol(),
                    other
                ))),
            }
        }
        Function::Named(name) if STANDARD_FUNCTIONS.contains(&name.as_str()) => {
            let Some((target, rest)) = args.split_first() else {
                return Err(Error::invalid(format!("'{}' expects arguments", name)));
            };
            resolve(target, decls)?;
            match rest.iter().find(|arg| !matches!(arg, Expr::Const(_))) {
                Some(arg) => Err(Error::invalid(format!(
                    "'{}' arguments must be literals, found '{}'",
                    name, arg
                ))),
                None => Ok(()),
            }
        }
        Function::Named(name) => Err(Error::invalid(format!(
            "undeclared reference to function '{}'",
            name
        ))),
        _ => Err(Error::invalid(format!(
            "unsupported function '{}'",
            function.symbol()
        ))),
    }
}

/// Resolve a path operand to its declared type
fn resolve(operand: &Expr, decls: &Declarations) -> Result<DeclType> {
    let segments = operand.flatten_path().ok_or_else(|| {
        Error::invalid(format!("expected a field or relationship, found '{}'", operand))
    })?;

    if segments.len() > MAX_DEPTH {
        return Err(Error::invalid(format!(
            "relationship chain '{}' exceeds the maximum depth of {}",
            segments.join("."),
            MAX_DEPTH
        )));
    }

    let path = segments.join(".");
    decls.lookup(&path).ok_or_else(|| {
        Error::invalid(format!(
            "undeclared reference to '{}' (in {} filter)",
            path,
            decls.kind()
        ))
    })
}

fn check_comparison(
    function: &Function,
    lhs: &Expr,
    ty: DeclType,
    lit: &Literal,
    decls: &Declarations,
) -> Result<()> {
    let equality = matches!(function, Function::Equals | Function::NotEquals);
    let mismatch = || {
        Error::invalid(format!(
            "found no matching overload for '{}' applied to '{}' ({}, {})",
            function.symbol(),
            lhs,
            ty,
            lit.type_name()
        ))
    };

    match (ty, lit) {
        (_, Literal::Null) => {
            let overload = match function {
                Function::Equals => OverloadFn::EqualsNull,
                Function::NotEquals => OverloadFn::NotEqualsNull,
                _ => return Err(mismatch()),
            };
            if decls.has_overload(overload, ty.type_name()) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        (DeclType::Message(_), _) => Err(Error::invalid(format!(
            "relationship '{}' can only be compared with null, use has()",
            lhs
        ))),
        (DeclType::Scalar(FieldType::String), Literal::String(_))
        | (DeclType::Scalar(FieldType::Int), Literal::Int(_)) => Ok(()),
        (DeclType::Scalar(FieldType::Bool), Literal::Bool(_)) if equality => Ok(()),
        (DeclType::Scalar(FieldType::Enum(e)), Literal::Enum(value)) if equality => {
            if e.contains(value) {
                Ok(())
            } else {
                Err(Error::invalid(format!(
                    "'{}' is not a value of enum {}",
                    value,
                    e.name()
                )))
            }
        }
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parser::parse_expr;
    use crate::kind::ResourceKind;
    use crate::ErrorKind;

    fn check_filter(kind: ResourceKind, filter: &str) -> Result<()> {
        let decls = Declarations::build(kind);
        check(&parse_expr(filter)?, &decls)
    }

    #[test]
    fn test_valid_filters() {
        for filter in [
            "",
            r#"name = "h*""#,
            "desiredState = HOST_STATE_ONBOARDED",
            "current_state != null",
            "bmc_enabled = false",
            "memory_bytes > 1024",
            "has(site.region)",
            "has(instance)",
            "site = null",
            r#"site.region.parentRegion.name = "emea""#,
            r#"startsWith(name, "edge")"#,
            r#"NOT (has(provider) OR name = "x")"#,
        ] {
            assert!(check_filter(ResourceKind::Host, filter).is_ok(), "{}", filter);
        }
    }

    #[test]
    fn test_invalid_filters() {
        for filter in [
            r#"nonexistent = "x""#,
            "name = 1",
            "bmc_enabled > true",
            "desired_state = INSTANCE_STATE_RUNNING",
            "desired_state < null",
            r#"site = "abc""#,
            "has(name)",
            "has(site, provider)",
            r#"unknownFn(name)"#,
            "42",
            "name",
        ] {
            let err = check_filter(ResourceKind::Host, filter).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", filter);
        }
    }

    #[test]
    fn test_mixed_casing_chain_is_undeclared() {
        let err = check_filter(ResourceKind::Host, r#"site.region.parent_region.parentRegion.name = "x""#);
        assert!(err.is_err());
    }

    #[test]
    fn test_chain_too_deep() {
        let filter = "has(parent_region.parent_region.parent_region.parent_region.parent_region.parent_region)";
        let err = check_filter(ResourceKind::Region, filter).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("maximum depth"));
    }
}
