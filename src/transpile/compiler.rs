//! Expression tree to predicate compiler.
//!
//! Walks a checked, normalised [`Expr`] and produces a [`Predicate`] on the
//! root kind. Relationship chains are flattened outermost-first and
//! evaluated one hop at a time: a column binds the selected operator, an
//! edge wraps the rest of the chain in a relationship predicate.

use rusqlite::types::Value as SqlValue;

use crate::filter::ast::{Expr, Function, Literal};
use crate::kind::ResourceKind;
use crate::schema::declarations::MAX_DEPTH;
use crate::transpile::predicate::{like_pattern, CmpOp, Predicate};
use crate::transpile::registry::TranspilerRegistry;
use crate::{Error, Result};

/// Operator applied at the end of a path
#[derive(Debug, Clone)]
enum Operator {
    /// No-op leaf: the relationship itself must be set
    Exists,
    Compare(CmpOp, SqlValue),
    ContainsFold(String),
    NotContainsFold(String),
    EmptyOrNull,
    NotEmptyOrNull,
    IsNull,
    IsNotNull,
    IsTrue,
    FalseOrNull,
}

impl Operator {
    /// Pick the operator for `lhs <function> literal`
    fn select(function: &Function, lit: &Literal) -> Result<Self> {
        let op = match (function, lit) {
            (Function::Equals, Literal::Null) => Operator::IsNull,
            (Function::NotEquals, Literal::Null) => Operator::IsNotNull,
            (Function::Equals, Literal::String(s)) if s.is_empty() => Operator::EmptyOrNull,
            (Function::Equals, Literal::String(s)) => Operator::ContainsFold(like_pattern(s)),
            (Function::NotEquals, Literal::String(s)) if s.is_empty() => Operator::NotEmptyOrNull,
            (Function::NotEquals, Literal::String(s)) => Operator::NotContainsFold(like_pattern(s)),
            (Function::Equals, Literal::Bool(true)) | (Function::NotEquals, Literal::Bool(false)) => {
                Operator::IsTrue
            }
            (Function::Equals, Literal::Bool(false)) | (Function::NotEquals, Literal::Bool(true)) => {
                Operator::FalseOrNull
            }
            (_, Literal::Null) | (_, Literal::Bool(_)) => {
                return Err(Error::invalid(format!(
                    "operator '{}' cannot be applied to {}",
                    function.symbol(),
                    lit
                )));
            }
            (f, Literal::Int(i)) => Operator::Compare(cmp_op(f)?, SqlValue::Integer(*i)),
            (f, Literal::String(s)) | (f, Literal::Enum(s)) => {
                Operator::Compare(cmp_op(f)?, SqlValue::Text(s.clone()))
            }
        };
        Ok(op)
    }

    /// Operators that also match rows where the value is unset
    fn matches_unset(&self) -> bool {
        matches!(
            self,
            Operator::IsNull | Operator::EmptyOrNull | Operator::FalseOrNull | Operator::NotContainsFold(_)
        )
    }

    /// The operator selecting exactly the rows this one rejects
    fn complement(&self) -> Option<Operator> {
        let op = match self {
            Operator::IsNull => Operator::IsNotNull,
            Operator::IsNotNull => Operator::IsNull,
            Operator::EmptyOrNull => Operator::NotEmptyOrNull,
            Operator::NotEmptyOrNull => Operator::EmptyOrNull,
            Operator::IsTrue => Operator::FalseOrNull,
            Operator::FalseOrNull => Operator::IsTrue,
            Operator::ContainsFold(p) => Operator::NotContainsFold(p.clone()),
            Operator::NotContainsFold(p) => Operator::ContainsFold(p.clone()),
            Operator::Exists | Operator::Compare(..) => return None,
        };
        Some(op)
    }

    fn bind(&self, column: &'static str) -> Result<Predicate> {
        let pred = match self {
            Operator::Exists => {
                return Err(Error::invalid(format!(
                    "has() requires a relationship, '{}' is a field",
                    column
                )));
            }
            Operator::Compare(op, value) => Predicate::Compare {
                column,
                op: *op,
                value: value.clone(),
            },
            Operator::ContainsFold(pattern) => Predicate::ContainsFold {
                column,
                pattern: pattern.clone(),
            },
            Operator::NotContainsFold(pattern) => Predicate::or(
                Predicate::IsNull { column },
                Predicate::not(Predicate::ContainsFold {
                    column,
                    pattern: pattern.clone(),
                }),
            ),
            Operator::EmptyOrNull => Predicate::EmptyOrNull { column },
            Operator::NotEmptyOrNull => Predicate::not(Predicate::EmptyOrNull { column }),
            Operator::IsNull => Predicate::IsNull { column },
            Operator::IsNotNull => Predicate::IsNotNull { column },
            Operator::IsTrue => Predicate::IsTrue { column },
            Operator::FalseOrNull => Predicate::FalseOrNull { column },
        };
        Ok(pred)
    }
}

fn cmp_op(function: &Function) -> Result<CmpOp> {
    match function {
        Function::Equals => Ok(CmpOp::Eq),
        Function::NotEquals => Ok(CmpOp::Ne),
        Function::Less => Ok(CmpOp::Lt),
        Function::LessEquals => Ok(CmpOp::Le),
        Function::Greater => Ok(CmpOp::Gt),
        Function::GreaterEquals => Ok(CmpOp::Ge),
        other => Err(Error::invalid(format!(
            "'{}' is not a comparison",
            other.symbol()
        ))),
    }
}

/// Compiles filter trees using a transpiler registry
pub struct Compiler<'a> {
    registry: &'a TranspilerRegistry,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a TranspilerRegistry) -> Self {
        Self { registry }
    }

    /// Compile a checked expression into a predicate on `root`
    pub fn compile(&self, expr: &Expr, root: ResourceKind) -> Result<Predicate> {
        match expr {
            Expr::Const(Literal::Bool(true)) => Ok(Predicate::True),
            Expr::Const(Literal::Bool(false)) => Ok(Predicate::not(Predicate::True)),
            Expr::Call { function, args } => self.compile_call(function, args, root),
            other => Err(Error::invalid(format!(
                "'{}' is not a boolean expression",
                other
            ))),
        }
    }

    fn compile_call(&self, function: &Function, args: &[Expr], root: ResourceKind) -> Result<Predicate> {
        match (function, args) {
            (Function::And, [lhs, rhs]) => {
                let l = self.compile(lhs, root)?;
                let r = self.compile(rhs, root)?;
                Ok(Predicate::and(l, r))
            }
            (Function::Or, [lhs, rhs]) => {
                let l = self.compile(lhs, root)?;
                let r = self.compile(rhs, root)?;
                Ok(Predicate::or(l, r))
            }
            (Function::Not, [operand]) => Ok(Predicate::not(self.compile(operand, root)?)),
            (Function::Has, [target]) => self.compile_has(target, root),
            (f, [lhs, Expr::Const(lit)]) if f.is_comparison() => {
                let op = Operator::select(f, lit)?;
                self.eval_operand(lhs, root, &op)
            }
            (Function::Named(name), _) => Err(Error::Unimplemented(format!(
                "function '{}' is not supported by the filter compiler",
                name
            ))),
            (f, args) => Err(Error::invalid(format!(
                "unsupported call '{}' with {} argument(s)",
                f.symbol(),
                args.len()
            ))),
        }
    }

    fn compile_has(&self, target: &Expr, root: ResourceKind) -> Result<Predicate> {
        if let Expr::Ident(name) = target {
            let entry = self.registry.entry(root)?;
            return entry.exists(name).ok_or_else(|| {
                Error::invalid(format!("'{}' is not a relationship of {}", name, root))
            });
        }
        self.eval_operand(target, root, &Operator::Exists)
    }

    fn eval_operand(&self, operand: &Expr, root: ResourceKind, op: &Operator) -> Result<Predicate> {
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
        self.eval_path(root, &segments, op)
    }

    fn eval_path(&self, kind: ResourceKind, segments: &[&str], op: &Operator) -> Result<Predicate> {
        let entry = self.registry.entry(kind)?;
        let Some((head, tail)) = segments.split_first() else {
            return Err(Error::invalid("empty field path"));
        };

        if let Some((column, _)) = entry.column(head) {
            if !tail.is_empty() {
                return Err(Error::invalid(format!(
                    "'{}' is a field of {} and has no member '{}'",
                    head,
                    kind,
                    tail.join(".")
                )));
            }
            return op.bind(column);
        }

        let edge = entry.edge(head).ok_or_else(|| {
            Error::invalid(format!(
                "'{}' is neither a field nor a relationship of {}",
                head, kind
            ))
        })?;

        if tail.is_empty() {
            return match op {
                Operator::Exists | Operator::IsNotNull => Ok(edge.exists()),
                Operator::IsNull => Ok(Predicate::not(edge.exists())),
                _ => Err(Error::invalid(format!(
                    "relationship '{}' can only be compared with null",
                    head
                ))),
            };
        }

        // A missing related row leaves the value unset, so operators that
        // match unset values are compiled as "no related row matches the
        // complement".
        if op.matches_unset() {
            if let Some(complement) = op.complement() {
                let inner = self.eval_path(edge.target, tail, &complement)?;
                return Ok(Predicate::not(edge.derive(inner)));
            }
        }
        let inner = self.eval_path(edge.target, tail, op)?;
        Ok(edge.derive(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parser::parse_expr;
    use crate::filter::normalize::normalize;
    use crate::schema::descriptor::EdgeLink;
    use crate::ErrorKind;

    fn compile(kind: ResourceKind, filter: &str) -> Result<Predicate> {
        let registry = TranspilerRegistry::build();
        let expr = normalize(parse_expr(filter)?);
        Compiler::new(&registry).compile(&expr, kind)
    }

    #[test]
    fn test_no_op_matches_everything() {
        assert_eq!(compile(ResourceKind::Host, "").unwrap(), Predicate::True);
    }

    #[test]
    fn test_string_equality_is_containment() {
        assert_eq!(
            compile(ResourceKind::Host, r#"name = "Edge*1""#).unwrap(),
            Predicate::ContainsFold {
                column: "name",
                pattern: "%Edge%1%".into()
            }
        );
        assert_eq!(
            compile(ResourceKind::Host, r#"note = """#).unwrap(),
            Predicate::EmptyOrNull { column: "note" }
        );
        assert_eq!(
            compile(ResourceKind::Host, r#"name != "x""#).unwrap(),
            Predicate::or(
                Predicate::IsNull { column: "name" },
                Predicate::not(Predicate::ContainsFold {
                    column: "name",
                    pattern: "%x%".into()
                })
            )
        );
        assert_eq!(
            compile(ResourceKind::Host, r#"note != """#).unwrap(),
            Predicate::not(Predicate::EmptyOrNull { column: "note" })
        );
    }

    #[test]
    fn test_unset_matching_operators_negate_through_edges() {
        let site_link = EdgeLink::Forward { column: "site_id" };
        assert_eq!(
            compile(ResourceKind::Host, "site.address = null").unwrap(),
            Predicate::not(Predicate::Related {
                target: ResourceKind::Site,
                link: site_link,
                inner: Box::new(Predicate::IsNotNull { column: "address" }),
            })
        );
        assert_eq!(
            compile(ResourceKind::Host, "site.address != null").unwrap(),
            Predicate::Related {
                target: ResourceKind::Site,
                link: site_link,
                inner: Box::new(Predicate::IsNotNull { column: "address" }),
            }
        );
        assert_eq!(
            compile(ResourceKind::Host, "site.dns_enabled = false").unwrap(),
            Predicate::not(Predicate::Related {
                target: ResourceKind::Site,
                link: site_link,
                inner: Box::new(Predicate::IsTrue { column: "dns_enabled" }),
            })
        );
    }

    #[test]
    fn test_bool_overrides() {
        let is_true = Predicate::IsTrue { column: "bmc_enabled" };
        let false_or_null = Predicate::FalseOrNull { column: "bmc_enabled" };
        assert_eq!(compile(ResourceKind::Host, "bmc_enabled = true").unwrap(), is_true);
        assert_eq!(compile(ResourceKind::Host, "bmc_enabled != false").unwrap(), is_true);
        assert_eq!(compile(ResourceKind::Host, "bmc_enabled = false").unwrap(), false_or_null);
        assert_eq!(compile(ResourceKind::Host, "bmcEnabled != true").unwrap(), false_or_null);
    }

    #[test]
    fn test_null_tests() {
        assert_eq!(
            compile(ResourceKind::Host, "hostname = null").unwrap(),
            Predicate::IsNull { column: "hostname" }
        );
        assert_eq!(
            compile(ResourceKind::Host, "site != null").unwrap(),
            Predicate::IsNotNull { column: "site_id" }
        );
        assert_eq!(
            compile(ResourceKind::Host, "site = null").unwrap(),
            Predicate::not(Predicate::IsNotNull { column: "site_id" })
        );
    }

    #[test]
    fn test_has_bare_and_chain() {
        assert_eq!(
            compile(ResourceKind::Host, "has(site)").unwrap(),
            Predicate::IsNotNull { column: "site_id" }
        );
        assert_eq!(
            compile(ResourceKind::Host, "has(site.region)").unwrap(),
            Predicate::Related {
                target: ResourceKind::Site,
                link: EdgeLink::Forward { column: "site_id" },
                inner: Box::new(Predicate::IsNotNull { column: "region_id" }),
            }
        );
    }

    #[test]
    fn test_chain_becomes_nested_relationships() {
        let pred = compile(
            ResourceKind::Instance,
            r#"host.site.region.name = "emea""#,
        )
        .unwrap();
        assert_eq!(pred.depth(), 3);
        let sql = pred.to_sql();
        assert!(sql.sql.contains("FROM regions t3"));
        assert_eq!(sql.params, vec![SqlValue::Text("%emea%".into())]);
    }

    #[test]
    fn test_reverse_edge_chain() {
        let pred = compile(
            ResourceKind::Host,
            "instance.desired_state = INSTANCE_STATE_RUNNING",
        )
        .unwrap();
        assert!(matches!(
            pred,
            Predicate::Related {
                link: EdgeLink::Reverse { column: "host_id" },
                ..
            }
        ));
    }

    #[test]
    fn test_or_branches_stay_isolated() {
        let pred = compile(
            ResourceKind::Host,
            r#"site.name = "a" OR provider.name = "b""#,
        )
        .unwrap();
        let Predicate::Or(lhs, rhs) = pred else {
            panic!("expected OR");
        };
        assert!(matches!(*lhs, Predicate::Related { target: ResourceKind::Site, .. }));
        assert!(matches!(*rhs, Predicate::Related { target: ResourceKind::Provider, .. }));
    }

    #[test]
    fn test_not_negates() {
        assert_eq!(
            compile(ResourceKind::Host, "NOT memory_bytes > 5").unwrap(),
            Predicate::not(Predicate::Compare {
                column: "memory_bytes",
                op: CmpOp::Gt,
                value: SqlValue::Integer(5),
            })
        );
    }

    #[test]
    fn test_standard_functions_are_unimplemented() {
        let err = compile(ResourceKind::Host, r#"startsWith(name, "x")"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
    }

    #[test]
    fn test_unknown_head_is_invalid() {
        let err = compile(ResourceKind::Host, r#"region.name = "x""#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_too_deep_is_invalid() {
        let err = compile(
            ResourceKind::Region,
            r#"parent_region.parent_region.parent_region.parent_region.parent_region.name = "x""#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
