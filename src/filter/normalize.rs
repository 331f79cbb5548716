//! Identifier normalisation.
//!
//! Rewrites every identifier and relationship-chain segment from its
//! declared casing (`desiredState`) to the internal canonical snake form
//! (`desired_state`). Upper-case tokens are enum values and stay untouched.

use crate::filter::ast::Expr;
use crate::filter::parser::is_enum_token;

/// Canonical names that the generic casing rule gets wrong
const IRREGULAR: &[(&str, &str)] = &[("sha_256", "sha256")];

fn is_canonical(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn to_snake(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 4);
    let mut prev: Option<char> = None;

    for c in token.chars() {
        if let Some(p) = prev {
            let boundary = (c.is_ascii_uppercase() && (p.is_ascii_lowercase() || p.is_ascii_digit()))
                || (c.is_ascii_digit() && p.is_ascii_alphabetic());
            if boundary {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
        prev = Some(c);
    }

    out
}

/// Canonical form of a single identifier segment
pub fn canonical_segment(token: &str) -> String {
    if is_enum_token(token) || is_canonical(token) {
        return token.to_string();
    }

    let mut snake = to_snake(token);
    for (generic, canonical) in IRREGULAR {
        if snake.contains(generic) {
            snake = snake.replace(generic, canonical);
        }
    }
    snake
}

/// Canonical form of a dotted identifier
pub fn canonical_path(path: &str) -> String {
    path.split('.')
        .map(canonical_segment)
        .collect::<Vec<_>>()
        .join(".")
}

/// Rewrite every identifier in the tree to canonical form.
///
/// Recurses into relationship-chain operands, not only the outermost
/// segment.
pub fn normalize(expr: Expr) -> Expr {
    match expr {
        Expr::Ident(name) => Expr::Ident(canonical_segment(&name)),
        Expr::Select { operand, field } => Expr::Select {
            operand: Box::new(normalize(*operand)),
            field: canonical_segment(&field),
        },
        Expr::Call { function, args } => Expr::Call {
            function,
            args: args.into_iter().map(normalize).collect(),
        },
        Expr::Const(lit) => Expr::Const(lit),
    }
}
