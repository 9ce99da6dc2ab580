use std::fmt::{self, Write};

use crate::{
    Heap, HeapObject, Node, ObjRef,
    lexer::{Token, TokenKind},
};

/// Displays a heap value the way the REPL prints results.
///
/// Numbers use the shortest `f64` rendering, closures show their parameter
/// and every other object prints as `<kind-N>` where `N` is its slot index.
pub struct ObjectDisplay<'a> {
    heap: &'a Heap,
    obj: ObjRef,
}

impl<'a> ObjectDisplay<'a> {
    pub fn new(heap: &'a Heap, obj: ObjRef) -> Self {
        Self { heap, obj }
    }
}

impl fmt::Display for ObjectDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(object) = self.heap.try_get(self.obj) else {
            return write!(f, "<dangling-{}>", self.obj.index());
        };
        match object {
            HeapObject::Number(value) => write!(f, "{value}"),
            HeapObject::Closure(closure) => write!(f, "<fn {}>", closure.param),
            HeapObject::Environment(_) => write!(f, "<env-{}>", self.obj.index()),
            HeapObject::Thunk(_) => write!(f, "<thunk-{}>", self.obj.index()),
            HeapObject::RootStack(_) => write!(f, "<stack-{}>", self.obj.index()),
        }
    }
}

/// Fully parenthesized source form; parsing it back yields the same tree.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Number(value) => write!(f, "{value}"),
            Node::Ident(name) => write!(f, "{name}"),
            Node::Neg(operand) => write!(f, "(-{operand})"),
            Node::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Node::And { left, right } => write!(f, "({left} and {right})"),
            Node::Or { left, right } => write!(f, "({left} or {right})"),
            Node::If {
                cond,
                then,
                otherwise,
            } => write!(f, "(if {cond} then {then} else {otherwise})"),
            Node::Fn { param, body } => write!(f, "(fn {param}: {body})"),
            Node::Apply { callee, arg } => write!(f, "({callee} {arg})"),
            Node::Let { name, value } => write!(f, "let {name} = {value}"),
        }
    }
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push('\t');
    }
}

fn write_labeled(out: &mut String, label: &str, child: &Node, level: usize) {
    indent(out, level);
    let _ = writeln!(out, "{label}:");
    write_tree(out, child, level + 1);
}

fn write_tree(out: &mut String, node: &Node, level: usize) {
    indent(out, level);
    match node {
        Node::Number(value) => {
            let _ = writeln!(out, "NUMBER: {value}");
        }
        Node::Ident(name) => {
            let _ = writeln!(out, "ID: {name}");
        }
        Node::Neg(operand) => {
            out.push_str("NEG: {\n");
            write_tree(out, operand, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Node::Binary { op, left, right } => {
            let _ = writeln!(out, "{}({}): {{", node.kind_name(), op.symbol());
            write_tree(out, left, level + 1);
            write_tree(out, right, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Node::And { left, right }
        | Node::Or { left, right }
        | Node::Apply {
            callee: left,
            arg: right,
        } => {
            let _ = writeln!(out, "{}: {{", node.kind_name());
            write_tree(out, left, level + 1);
            write_tree(out, right, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Node::If {
            cond,
            then,
            otherwise,
        } => {
            out.push_str("IF: {\n");
            write_labeled(out, "CONDITION", cond, level + 1);
            write_labeled(out, "THEN", then, level + 1);
            write_labeled(out, "ELSE", otherwise, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Node::Fn { param, body } => {
            out.push_str("FN: {\n");
            write_labeled(out, "PARAM", &Node::Ident(param.clone()), level + 1);
            write_labeled(out, "BODY", body, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
        Node::Let { name, value } => {
            out.push_str("LET: {\n");
            write_labeled(out, "NAME", &Node::Ident(name.clone()), level + 1);
            write_labeled(out, "VALUE", value, level + 1);
            indent(out, level);
            out.push_str("}\n");
        }
    }
}

/// Tab-indented debug tree of `node`, one line per node.
pub fn tree(node: &Node) -> String {
    let mut out = String::new();
    write_tree(&mut out, node, 0);
    out
}

/// One-line token dump, e.g. `NUMBER('3')` or `END`.
pub fn token(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::End => "END".to_string(),
        kind => format!("{}('{}')", kind.name(), token.text.escape_debug()),
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{BinaryOp, lexer::tokenize};

    #[test]
    fn objects_print_by_kind() {
        let mut heap = Heap::default();
        let env = heap.alloc_environment(None);
        let n = heap.alloc_number(2.5);
        let whole = heap.alloc_number(8.0);
        let f = heap.alloc_closure(env, Rc::new(Node::ident("x")), Rc::from("x"));
        let t = heap.alloc_thunk(env, Rc::new(Node::number(1.0)));

        assert_eq!(ObjectDisplay::new(&heap, n).to_string(), "2.5");
        assert_eq!(ObjectDisplay::new(&heap, whole).to_string(), "8");
        assert_eq!(ObjectDisplay::new(&heap, f).to_string(), "<fn x>");
        assert_eq!(
            ObjectDisplay::new(&heap, env).to_string(),
            format!("<env-{}>", env.index())
        );
        assert_eq!(
            ObjectDisplay::new(&heap, t).to_string(),
            format!("<thunk-{}>", t.index())
        );
    }

    #[test]
    fn node_display_is_fully_parenthesized() {
        let node = Node::let_binding(
            "f",
            Node::func(
                "x",
                Node::if_else(
                    Node::and(Node::ident("x"), Node::neg(Node::number(1.0))),
                    Node::binary(BinaryOp::Pow, Node::ident("x"), Node::number(0.5)),
                    Node::apply(Node::ident("g"), Node::ident("x")),
                ),
            ),
        );
        assert_eq!(
            node.to_string(),
            "let f = (fn x: (if (x and (-1)) then (x ^ 0.5) else (g x)))"
        );
    }

    #[test]
    fn tree_lists_children_indented() {
        let node = Node::func(
            "x",
            Node::binary(BinaryOp::Add, Node::ident("x"), Node::number(1.0)),
        );
        assert_eq!(
            tree(&node),
            "FN: {\n\
             \tPARAM:\n\
             \t\tID: x\n\
             \tBODY:\n\
             \t\tSUM(+): {\n\
             \t\t\tID: x\n\
             \t\t\tNUMBER: 1\n\
             \t\t}\n\
             }\n"
        );
    }

    #[test]
    fn token_dump_names_each_token() {
        let lines: Vec<String> = tokenize("let x = 3\n").iter().map(token).collect();
        assert_eq!(
            lines,
            vec!["LET('let')", "ID('x')", "EQ('=')", "NUMBER('3')", "TERMINATOR('\\n')", "END"]
        );
    }
}
