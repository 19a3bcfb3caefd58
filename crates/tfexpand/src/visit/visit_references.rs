use super::VisitMut;
use crate::expression::parser::Expr;
use crate::expression::template::{Template, TemplatePart};

/// Recursively visit all [Expr::Reference]s mutably
///
/// The visitor receives the enclosing [Expr] so it can replace the reference with any expression.
pub trait VisitReferencesMut {
    fn visit_references_mut(&mut self, visitor: &mut dyn VisitMut<Expr>);
}

impl VisitReferencesMut for Template {
    fn visit_references_mut(&mut self, visitor: &mut dyn VisitMut<Expr>) {
        for part in &mut self.parts {
            if let TemplatePart::Interpolation(expr) = part {
                expr.visit_references_mut(visitor);
            }
        }
    }
}

impl VisitReferencesMut for Expr {
    fn visit_references_mut(&mut self, visitor: &mut dyn VisitMut<Expr>) {
        if matches!(self, Expr::Reference(_)) {
            visitor.visit_mut(self);
            return;
        }

        match self {
            Expr::Literal(_) | Expr::Reference(_) => {}
            Expr::Template(template) => template.visit_references_mut(visitor),
            Expr::List(items) => {
                for item in items {
                    item.visit_references_mut(visitor);
                }
            }
            Expr::Map(entries) => {
                for (key, value) in entries {
                    key.visit_references_mut(visitor);
                    value.visit_references_mut(visitor);
                }
            }
            Expr::GetAttr { object, .. } => object.visit_references_mut(visitor),
            Expr::Index { object, index } => {
                object.visit_references_mut(visitor);
                index.visit_references_mut(visitor);
            }
            Expr::Unary { expr, .. } => expr.visit_references_mut(visitor),
            Expr::Binary { left, right, .. } => {
                left.visit_references_mut(visitor);
                right.visit_references_mut(visitor);
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.visit_references_mut(visitor);
                then_expr.visit_references_mut(visitor);
                else_expr.visit_references_mut(visitor);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit_references_mut(visitor);
                }
            }
        }
    }
}
