//! Filter expression tree.

use std::fmt;

/// Constant operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    /// Upper-case enum value name, e.g. `HOST_STATE_ONBOARDED`
    Enum(String),
}

impl Literal {
    /// Runtime type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::String(_) => "string",
            Literal::Enum(_) => "enum",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Enum(e) => write!(f, "{}", e),
        }
    }
}

/// Functions a call node may apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    And,
    Or,
    Not,
    Has,
    /// Any other named function, e.g. `startsWith(name, "a")`
    Named(String),
}

impl Function {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Function::Equals
                | Function::NotEquals
                | Function::Less
                | Function::LessEquals
                | Function::Greater
                | Function::GreaterEquals
        )
    }

    pub fn symbol(&self) -> &str {
        match self {
            Function::Equals => "=",
            Function::NotEquals => "!=",
            Function::Less => "<",
            Function::LessEquals => "<=",
            Function::Greater => ">",
            Function::GreaterEquals => ">=",
            Function::And => "AND",
            Function::Or => "OR",
            Function::Not => "NOT",
            Function::Has => "has",
            Function::Named(name) => name,
        }
    }
}

/// A node of a parsed filter.
///
/// Relationship chains nest from the inside out: `a.b.c` is
/// `Select(Select(Ident(a), b), c)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    Select { operand: Box<Expr>, field: String },
    Call { function: Function, args: Vec<Expr> },
    Const(Literal),
}

impl Expr {
    /// The trivially-true tree an empty filter parses to
    pub fn no_op() -> Self {
        Expr::Const(Literal::Bool(true))
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, Expr::Const(Literal::Bool(true)))
    }

    pub fn call(function: Function, args: Vec<Expr>) -> Self {
        Expr::Call { function, args }
    }

    /// Build a (possibly dotted) identifier from its segments
    pub fn path<I, S>(segments: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments = segments.into_iter();
        let mut expr = Expr::Ident(segments.next()?.into());
        for field in segments {
            expr = Expr::Select {
                operand: Box::new(expr),
                field: field.into(),
            };
        }
        Some(expr)
    }

    /// Flatten an identifier chain into its segments, outermost hop first.
    ///
    /// `a.b.c` flattens to `[a, b, c]`. Returns `None` for non-path nodes.
    pub fn flatten_path(&self) -> Option<Vec<&str>> {
        match self {
            Expr::Ident(name) => Some(vec![name.as_str()]),
            Expr::Select { operand, field } => {
                let mut segments = operand.flatten_path()?;
                segments.push(field.as_str());
                Some(segments)
            }
            _ => None,
        }
    }

    /// Dotted form of an identifier chain
    pub fn path_string(&self) -> Option<String> {
        self.flatten_path().map(|segments| segments.join("."))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Select { operand, field } => write!(f, "{}.{}", operand, field),
            Expr::Const(lit) => write!(f, "{}", lit),
            Expr::Call { function, args } => match (function, args.as_slice()) {
                (Function::And | Function::Or, [lhs, rhs]) => {
                    write!(f, "({} {} {})", lhs, function.symbol(), rhs)
                }
                (Function::Not, [operand]) => write!(f, "NOT {}", operand),
                (func, [lhs, rhs]) if func.is_comparison() => {
                    write!(f, "{} {} {}", lhs, func.symbol(), rhs)
                }
                (func, args) => {
                    write!(f, "{}(", func.symbol())?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_is_outermost_first() {
        let expr = Expr::path(["a", "b", "c"]).unwrap();
        assert_eq!(expr.flatten_path().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(expr.to_string(), "a.b.c");
    }

    #[test]
    fn test_flatten_rejects_non_paths() {
        assert!(Expr::no_op().flatten_path().is_none());
        let call = Expr::call(Function::Has, vec![Expr::Ident("site".into())]);
        assert!(call.flatten_path().is_none());
        assert_eq!(call.to_string(), "has(site)");
    }
}
