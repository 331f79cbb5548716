//! Filter grammar.
//!
//! ```text
//! expr       := or
//! or         := and ("OR" and)*
//! and        := unary ("AND" unary)*
//! unary      := "NOT"* atom
//! atom       := "(" expr ")" | call | comparison
//! call       := ident "(" [arg ("," arg)*] ")"
//! comparison := path op literal
//! ```

use chumsky::extra;
use chumsky::prelude::*;

use crate::filter::ast::{Expr, Function, Literal};
use crate::{Error, Result};

/// Extra type for parsers - uses Rich errors for better messages
pub type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Parser for identifiers: a letter or underscore, then alphanumerics/underscores
fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
                .repeated(),
        )
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("identifier")
}

/// Case-sensitive keyword parser
fn kw<'src>(keyword: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    text::keyword::<&str, _, Extra<'src>>(keyword).ignored()
}

fn quoted<'src>(quote: char) -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just(quote)
        .ignore_then(
            any()
                .filter(move |c: &char| *c != quote)
                .repeated()
                .to_slice()
                .map(|s: &str| s.to_string()),
        )
        .then_ignore(just(quote))
}

/// Parser for string literals (single or double quoted)
fn string_literal<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    quoted('"').or(quoted('\'')).labelled("string literal")
}

/// Parser for signed integer literals
fn integer<'src>() -> impl Parser<'src, &'src str, i64, Extra<'src>> + Clone {
    just('-')
        .or_not()
        .then(any().filter(|c: &char| c.is_ascii_digit()).repeated().at_least(1))
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<i64>()
                .map_err(|_| Rich::custom(span, "integer out of range"))
        })
        .labelled("integer")
}

/// Tokens written entirely in upper case are enum value names
pub fn is_enum_token(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_uppercase())
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn literal<'src>() -> impl Parser<'src, &'src str, Literal, Extra<'src>> + Clone {
    let enum_value = ident().try_map(|s: String, span| {
        if is_enum_token(&s) {
            Ok(Literal::Enum(s))
        } else {
            Err(Rich::custom(span, format!("expected a literal, found identifier {}", s)))
        }
    });

    choice((
        kw("true").to(Literal::Bool(true)),
        kw("false").to(Literal::Bool(false)),
        kw("null").to(Literal::Null),
        string_literal().map(Literal::String),
        integer().map(Literal::Int),
        enum_value,
    ))
    .labelled("literal")
}

/// Parser for dotted identifier chains: `a.b.c`
fn path<'src>() -> impl Parser<'src, &'src str, Expr, Extra<'src>> + Clone {
    ident()
        .separated_by(just('.'))
        .at_least(1)
        .collect::<Vec<_>>()
        .try_map(|segments, span| {
            Expr::path(segments).ok_or_else(|| Rich::custom(span, "empty identifier"))
        })
        .labelled("field or relationship")
}

fn comparator<'src>() -> impl Parser<'src, &'src str, Function, Extra<'src>> + Clone {
    choice((
        just("<=").to(Function::LessEquals),
        just(">=").to(Function::GreaterEquals),
        just("!=").to(Function::NotEquals),
        just("=").to(Function::Equals),
        just("<").to(Function::Less),
        just(">").to(Function::Greater),
    ))
    .padded()
    .labelled("comparison operator")
}

fn function_named(name: &str) -> Function {
    match name {
        "has" => Function::Has,
        other => Function::Named(other.to_string()),
    }
}

/// Parser for a complete boolean filter expression
pub fn filter_parser<'src>() -> impl Parser<'src, &'src str, Expr, Extra<'src>> + Clone {
    recursive(|expr| {
        let arg = choice((
            string_literal().map(|s| Expr::Const(Literal::String(s))),
            integer().map(|i| Expr::Const(Literal::Int(i))),
            path(),
        ))
        .padded();

        let call = ident()
            .then(
                arg.separated_by(just(','))
                    .collect::<Vec<_>>()
                    .delimited_by(just('(').padded(), just(')').padded()),
            )
            .map(|(name, args)| Expr::call(function_named(&name), args));

        let comparison = path()
            .then(comparator())
            .then(literal().padded())
            .map(|((lhs, function), rhs)| Expr::call(function, vec![lhs, Expr::Const(rhs)]));

        let atom = choice((
            expr.delimited_by(just('(').padded(), just(')').padded()),
            call,
            comparison,
        ))
        .padded();

        let unary = kw("NOT")
            .padded()
            .repeated()
            .foldr(atom, |_, operand| Expr::call(Function::Not, vec![operand]));

        let and = unary.clone().foldl(
            kw("AND").padded().ignore_then(unary).repeated(),
            |lhs, rhs| Expr::call(Function::And, vec![lhs, rhs]),
        );

        and.clone().foldl(
            kw("OR").padded().ignore_then(and).repeated(),
            |lhs, rhs| Expr::call(Function::Or, vec![lhs, rhs]),
        )
    })
}

/// Format chumsky errors for a human reader
pub fn format_errors(errs: &[Rich<'_, char>], input: &str) -> String {
    errs.iter()
        .map(|e| {
            let start = e.span().start;
            let before = &input[..start];
            let line_start = before.rfind('\n').map_or(0, |i| i + 1);
            let line = before.matches('\n').count() + 1;
            let col = before[line_start..].chars().count();

            let found = e
                .found()
                .map_or("end of input".to_string(), |c| format!("'{}'", c));

            format!(
                "line {}, column {}: {} (found {})",
                line,
                col + 1,
                e.reason(),
                found
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse a filter string into an untyped expression tree.
///
/// An empty (or all-whitespace) filter yields the no-op tree.
pub fn parse_expr(filter: &str) -> Result<Expr> {
    if filter.trim().is_empty() {
        return Ok(Expr::no_op());
    }

    filter_parser()
        .padded()
        .then_ignore(end())
        .parse(filter)
        .into_result()
        .map_err(|errs| {
            Error::invalid(format!(
                "malformed filter {:?}: {}",
                filter,
                format_errors(&errs, filter)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(function: Function, path: &[&str], lit: Literal) -> Expr {
        Expr::call(
            function,
            vec![Expr::path(path.iter().copied()).unwrap(), Expr::Const(lit)],
        )
    }

    #[test]
    fn test_empty_filter_is_no_op() {
        assert!(parse_expr("").unwrap().is_no_op());
        assert!(parse_expr("   ").unwrap().is_no_op());
    }

    #[test]
    fn test_simple_comparison() {
        let expr = parse_expr(r#"name = "edge-1""#).unwrap();
        assert_eq!(
            expr,
            cmp(Function::Equals, &["name"], Literal::String("edge-1".into()))
        );
    }

    #[test]
    fn test_single_quoted_and_negative_int() {
        let expr = parse_expr("site_lat >= -12").unwrap();
        assert_eq!(expr, cmp(Function::GreaterEquals, &["site_lat"], Literal::Int(-12)));

        let expr = parse_expr("note != 'x'").unwrap();
        assert_eq!(expr, cmp(Function::NotEquals, &["note"], Literal::String("x".into())));
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expr("bmc_enabled = true").unwrap(),
            cmp(Function::Equals, &["bmc_enabled"], Literal::Bool(true))
        );
        assert_eq!(
            parse_expr("site = null").unwrap(),
            cmp(Function::Equals, &["site"], Literal::Null)
        );
        assert_eq!(
            parse_expr("desired_state = HOST_STATE_ONBOARDED").unwrap(),
            cmp(
                Function::Equals,
                &["desired_state"],
                Literal::Enum("HOST_STATE_ONBOARDED".into())
            )
        );
    }

    #[test]
    fn test_chain_nests_inside_out() {
        let expr = parse_expr(r#"site.region.name = "r""#).unwrap();
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args[0].flatten_path().unwrap(), vec!["site", "region", "name"]);
        assert!(matches!(&args[0], Expr::Select { field, .. } if field == "name"));
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let expr = parse_expr("a = 1 AND b = 2 OR c = 3").unwrap();
        let Expr::Call { function, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(function, Function::Or);
        assert!(matches!(&args[0], Expr::Call { function: Function::And, .. }));
    }

    #[test]
    fn test_parentheses_and_not() {
        let expr = parse_expr("NOT (a = 1 OR b = 2) AND has(site)").unwrap();
        let Expr::Call { function, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(function, Function::And);
        assert!(matches!(&args[0], Expr::Call { function: Function::Not, .. }));
        assert_eq!(
            args[1],
            Expr::call(Function::Has, vec![Expr::Ident("site".into())])
        );
    }

    #[test]
    fn test_double_not() {
        let expr = parse_expr("NOT NOT a = 1").unwrap();
        let Expr::Call { function, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(function, Function::Not);
        assert!(matches!(&args[0], Expr::Call { function: Function::Not, .. }));
    }

    #[test]
    fn test_named_function_call() {
        let expr = parse_expr(r#"startsWith(name, "edge")"#).unwrap();
        assert_eq!(
            expr,
            Expr::call(
                Function::Named("startsWith".into()),
                vec![
                    Expr::Ident("name".into()),
                    Expr::Const(Literal::String("edge".into()))
                ]
            )
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let expr = parse_expr("NOTE = 1").unwrap();
        assert_eq!(expr, cmp(Function::Equals, &["NOTE"], Literal::Int(1)));
    }

    #[test]
    fn test_malformed_filters() {
        for filter in [
            "name =",
            "= 1",
            "name = \"unterminated",
            "a = 1 AND",
            "(a = 1",
            "name = other_field",
            "has(site",
        ] {
            let err = parse_expr(filter).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument, "{}", filter);
        }
    }

    fn error_column(filter: &str) -> usize {
        let err = parse_expr(filter).unwrap_err().to_string();
        let (_, rest) = err.split_once("column ").unwrap();
        rest.split(':').next().unwrap().parse().unwrap()
    }

    #[test]
    fn test_error_columns_count_characters() {
        let ascii = r#"name = "eee" AND"#;
        let accented = r#"name = "ééé" AND"#;
        assert_eq!(error_column(accented), error_column(ascii));
        assert!(error_column(accented) <= accented.chars().count() + 1);
    }
}
