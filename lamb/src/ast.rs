//! Syntax tree consumed by the evaluator.
//!
//! Nodes are immutable once built. Children are reference counted so that
//! closures and thunks can hold on to a function body or a deferred operand
//! without copying the tree.

use std::rc::Rc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Gt,
    Lt,
    Eq,
}

impl BinaryOp {
    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Mod => '%',
            BinaryOp::Pow => '^',
            BinaryOp::Gt => '>',
            BinaryOp::Lt => '<',
            BinaryOp::Eq => '=',
        }
    }

    /// Applies the operator with IEEE semantics. Comparisons produce `1` or
    /// `0`.
    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => left / right,
            BinaryOp::Mod => left % right,
            BinaryOp::Pow => left.powf(right),
            BinaryOp::Gt => truth(left > right),
            BinaryOp::Lt => truth(left < right),
            BinaryOp::Eq => truth(left == right),
        }
    }
}

#[inline]
fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Ident(Rc<str>),
    Neg(Rc<Node>),
    Binary {
        op: BinaryOp,
        left: Rc<Node>,
        right: Rc<Node>,
    },
    And {
        left: Rc<Node>,
        right: Rc<Node>,
    },
    Or {
        left: Rc<Node>,
        right: Rc<Node>,
    },
    If {
        cond: Rc<Node>,
        then: Rc<Node>,
        otherwise: Rc<Node>,
    },
    Fn {
        param: Rc<str>,
        body: Rc<Node>,
    },
    Apply {
        callee: Rc<Node>,
        arg: Rc<Node>,
    },
    Let {
        name: Rc<str>,
        value: Rc<Node>,
    },
}

impl Node {
    pub fn number(value: f64) -> Self {
        Node::Number(value)
    }

    pub fn ident(name: &str) -> Self {
        Node::Ident(Rc::from(name))
    }

    pub fn neg(operand: Node) -> Self {
        Node::Neg(Rc::new(operand))
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node) -> Self {
        Node::Binary {
            op,
            left: Rc::new(left),
            right: Rc::new(right),
        }
    }

    pub fn and(left: Node, right: Node) -> Self {
        Node::And {
            left: Rc::new(left),
            right: Rc::new(right),
        }
    }

    pub fn or(left: Node, right: Node) -> Self {
        Node::Or {
            left: Rc::new(left),
            right: Rc::new(right),
        }
    }

    pub fn if_else(cond: Node, then: Node, otherwise: Node) -> Self {
        Node::If {
            cond: Rc::new(cond),
            then: Rc::new(then),
            otherwise: Rc::new(otherwise),
        }
    }

    pub fn func(param: &str, body: Node) -> Self {
        Node::Fn {
            param: Rc::from(param),
            body: Rc::new(body),
        }
    }

    pub fn apply(callee: Node, arg: Node) -> Self {
        Node::Apply {
            callee: Rc::new(callee),
            arg: Rc::new(arg),
        }
    }

    pub fn let_binding(name: &str, value: Node) -> Self {
        Node::Let {
            name: Rc::from(name),
            value: Rc::new(value),
        }
    }

    /// Name of the node kind as printed by the debug tree.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Number(_) => "NUMBER",
            Node::Ident(_) => "ID",
            Node::Neg(_) => "NEG",
            Node::Binary { op, .. } => match op {
                BinaryOp::Add | BinaryOp::Sub => "SUM",
                BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => "PRODUCT",
                BinaryOp::Pow => "EXPONENTIATION",
                BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Eq => "COMPARISON",
            },
            Node::And { .. } => "AND",
            Node::Or { .. } => "OR",
            Node::If { .. } => "IF",
            Node::Fn { .. } => "FN",
            Node::Apply { .. } => "APPLICATION",
            Node::Let { .. } => "LET",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(BinaryOp::Gt.apply(3.0, 2.0), 1.0);
        assert_eq!(BinaryOp::Lt.apply(3.0, 2.0), 0.0);
        assert_eq!(BinaryOp::Eq.apply(2.0, 2.0), 1.0);
    }

    #[test]
    fn arithmetic_follows_float_semantics() {
        assert_eq!(BinaryOp::Mod.apply(7.5, 2.0), 1.5);
        assert_eq!(BinaryOp::Pow.apply(2.0, 10.0), 1024.0);
        assert!(BinaryOp::Div.apply(1.0, 0.0).is_infinite());
        assert!(BinaryOp::Mod.apply(1.0, 0.0).is_nan());
    }

    #[test]
    fn kind_names_group_operators_like_the_debug_tree() {
        let sum = Node::binary(BinaryOp::Sub, Node::number(1.0), Node::number(2.0));
        let cmp = Node::binary(BinaryOp::Eq, Node::number(1.0), Node::number(2.0));
        assert_eq!(sum.kind_name(), "SUM");
        assert_eq!(cmp.kind_name(), "COMPARISON");
        assert_eq!(Node::ident("x").kind_name(), "ID");
    }
}
