//! Trampolined tree-walking evaluator.
//!
//! Conditionals and applications are in tail position: instead of recursing
//! they hand the next `(expression, environment)` pair back to the dispatch
//! loop, so tail-recursive programs run in constant native stack. Everything
//! else evaluates its operands through nested calls, rooting whatever is not
//! yet reachable from an environment while those calls run.
//!
//! The collector gets a chance to run once per loop iteration.

use std::{fmt, rc::Rc};

use log::{debug, trace};

use crate::{Closure, Context, Environment, EvalMode, Node, ObjRef, ObjectKind, Thunk};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    UnboundVariable {
        name: Rc<str>,
    },
    TypeMismatch {
        expected: ObjectKind,
        got: ObjectKind,
    },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnboundVariable { name } => write!(f, "unbound variable '{name}'"),
            EvalError::TypeMismatch { expected, got } => {
                write!(f, "expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for EvalError {}

enum Step {
    Done(ObjRef),
    Continue { expr: Rc<Node>, env: ObjRef },
}

impl Context {
    /// Evaluates a top-level form in the global scope.
    ///
    /// Transient roots left over from a previous form are dropped first. A
    /// failed form leaves the context usable for the next one.
    pub fn eval(&mut self, node: &Node) -> Result<ObjRef, EvalError> {
        self.clear_roots();
        let root = self.root;
        let result = self.actual_value(Rc::new(node.clone()), root);
        if let Err(err) = &result {
            debug!("evaluation failed: {err}");
        }
        result
    }

    /// Evaluates `expr` and forces the result until it is not a thunk.
    fn actual_value(&mut self, expr: Rc<Node>, env: ObjRef) -> Result<ObjRef, EvalError> {
        let value = self.dispatch(expr, env)?;
        self.force(value)
    }

    /// Resolves a thunk to its value, memoizing it. Anything else is
    /// returned unchanged.
    pub fn force(&mut self, value: ObjRef) -> Result<ObjRef, EvalError> {
        let (env, body) = match self.heap.thunk(value) {
            None => return Ok(value),
            Some(Thunk::Forced(memo)) => return Ok(*memo),
            Some(Thunk::Pending { env, body }) => (*env, body.clone()),
        };
        trace!("forcing thunk {value:?}");
        let result = self.with_rooted(value, |cx| cx.actual_value(body, env))?;
        if let Some(thunk) = self.heap.thunk_mut(value) {
            thunk.force_with(result);
        }
        Ok(result)
    }

    fn dispatch(&mut self, mut expr: Rc<Node>, mut env: ObjRef) -> Result<ObjRef, EvalError> {
        loop {
            self.collect(env);
            match self.step(&expr, env)? {
                Step::Done(value) => return Ok(value),
                Step::Continue {
                    expr: next,
                    env: next_env,
                } => {
                    expr = next;
                    env = next_env;
                }
            }
        }
    }

    fn step(&mut self, expr: &Node, env: ObjRef) -> Result<Step, EvalError> {
        match expr {
            Node::Number(value) => Ok(Step::Done(self.heap.alloc_number(*value))),
            Node::Ident(name) => Environment::lookup(&self.heap, env, name)
                .map(Step::Done)
                .ok_or_else(|| EvalError::UnboundVariable { name: name.clone() }),
            Node::Neg(operand) => {
                let value = self.eval_number(operand, env)?;
                Ok(Step::Done(self.heap.alloc_number(-value)))
            }
            Node::Binary { op, left, right } => {
                let left = self.eval_value(left, env)?;
                let right = self.with_rooted(left, |cx| cx.eval_value(right, env))?;
                let left = self.expect_number(left)?;
                let right = self.expect_number(right)?;
                Ok(Step::Done(self.heap.alloc_number(op.apply(left, right))))
            }
            Node::And { left, right } => {
                let left = self.eval_value(left, env)?;
                if self.expect_number(left)? == 0.0 {
                    return Ok(Step::Done(left));
                }
                self.eval_value(right, env).map(Step::Done)
            }
            Node::Or { left, right } => {
                let left = self.eval_value(left, env)?;
                if self.expect_number(left)? != 0.0 {
                    return Ok(Step::Done(left));
                }
                self.eval_value(right, env).map(Step::Done)
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.eval_number(cond, env)? != 0.0 {
                    then
                } else {
                    otherwise
                };
                Ok(Step::Continue {
                    expr: branch.clone(),
                    env,
                })
            }
            Node::Fn { param, body } => Ok(Step::Done(self.heap.alloc_closure(
                env,
                body.clone(),
                param.clone(),
            ))),
            Node::Apply { callee, arg } => {
                let callee = self.eval_value(callee, env)?;
                let Closure {
                    env: captured,
                    body,
                    param,
                } = self.expect_closure(callee)?;
                let arg = match self.mode {
                    EvalMode::Strict => self.with_rooted(callee, |cx| cx.eval_value(arg, env))?,
                    EvalMode::Lazy => self.heap.alloc_thunk(env, arg.clone()),
                };
                let call_env = self.heap.alloc_environment(Some(captured));
                Environment::bind(&mut self.heap, call_env, param, arg);
                Ok(Step::Continue {
                    expr: body,
                    env: call_env,
                })
            }
            Node::Let { name, value } => {
                let value = self.with_rooted(env, |cx| cx.dispatch(value.clone(), env))?;
                Environment::bind(&mut self.heap, env, name.clone(), value);
                Ok(Step::Done(value))
            }
        }
    }

    /// Non-tail evaluation of a sub-expression. `env` is rooted meanwhile: a
    /// tail call inside may move to an unrelated environment and collect.
    fn eval_value(&mut self, expr: &Rc<Node>, env: ObjRef) -> Result<ObjRef, EvalError> {
        self.with_rooted(env, |cx| cx.actual_value(expr.clone(), env))
    }

    fn eval_number(&mut self, expr: &Rc<Node>, env: ObjRef) -> Result<f64, EvalError> {
        let value = self.eval_value(expr, env)?;
        self.expect_number(value)
    }

    fn expect_number(&self, value: ObjRef) -> Result<f64, EvalError> {
        self.heap
            .number(value)
            .ok_or_else(|| EvalError::TypeMismatch {
                expected: ObjectKind::Number,
                got: self.heap.kind(value),
            })
    }

    fn expect_closure(&self, value: ObjRef) -> Result<Closure, EvalError> {
        self.heap
            .closure(value)
            .cloned()
            .ok_or_else(|| EvalError::TypeMismatch {
                expected: ObjectKind::Closure,
                got: self.heap.kind(value),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryOp, ContextSettings, GcSettings, parser::parse_form};

    fn run(cx: &mut Context, source: &str) -> Result<ObjRef, EvalError> {
        let node = parse_form(source).expect("valid source");
        cx.eval(&node)
    }

    fn number(cx: &mut Context, source: &str) -> f64 {
        let value = run(cx, source).expect("evaluation succeeds");
        cx.heap().number(value).expect("a number")
    }

    fn eager(mode: EvalMode) -> Context {
        Context::new(ContextSettings {
            mode,
            gc: GcSettings {
                initial_threshold: 1,
            },
        })
        .expect("valid settings")
    }

    #[test]
    fn let_then_use() {
        let mut cx = Context::default();
        assert_eq!(number(&mut cx, "let x = 5"), 5.0);
        assert_eq!(number(&mut cx, "x + 3"), 8.0);
    }

    #[test]
    fn apply_function_literal() {
        let mut cx = Context::default();
        assert_eq!(number(&mut cx, "(fn x: x + 1) 4"), 5.0);
    }

    #[test]
    fn arithmetic_and_comparisons() {
        let mut cx = Context::default();
        assert_eq!(number(&mut cx, "2 + 3 * 4"), 14.0);
        assert_eq!(number(&mut cx, "2 ^ 3 ^ 2"), 512.0);
        assert_eq!(number(&mut cx, "7 % 4"), 3.0);
        assert_eq!(number(&mut cx, "-(2 - 5)"), 3.0);
        assert_eq!(number(&mut cx, "3 > 2"), 1.0);
        assert_eq!(number(&mut cx, "3 < 2"), 0.0);
        assert_eq!(number(&mut cx, "2 = 2"), 1.0);
        assert!(number(&mut cx, "1 / 0").is_infinite());
        assert!(number(&mut cx, "0 / 0").is_nan());
    }

    #[test]
    fn ast_built_by_hand_evaluates() {
        let mut cx = Context::default();
        let node = Node::apply(
            Node::func("x", Node::binary(BinaryOp::Mul, Node::ident("x"), Node::ident("x"))),
            Node::number(7.0),
        );
        let value = cx.eval(&node).expect("evaluates");
        assert_eq!(cx.heap().number(value), Some(49.0));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        for mode in [EvalMode::Strict, EvalMode::Lazy] {
            let mut cx = Context::with_mode(mode);
            assert_eq!(number(&mut cx, "0 and nope"), 0.0);
            assert_eq!(number(&mut cx, "1 or nope"), 1.0);
            assert_eq!(number(&mut cx, "1 and 2"), 2.0);
            assert_eq!(number(&mut cx, "0 or 3"), 3.0);
            assert!(matches!(
                run(&mut cx, "1 and nope"),
                Err(EvalError::UnboundVariable { .. })
            ));
        }
    }

    #[test]
    fn conditional_only_evaluates_the_taken_branch() {
        let mut cx = Context::default();
        assert_eq!(number(&mut cx, "if 1 then 2 else nope"), 2.0);
        assert_eq!(number(&mut cx, "if 0 then nope else 3"), 3.0);
    }

    #[test]
    fn unbound_variable_is_reported() {
        let mut cx = Context::default();
        let err = run(&mut cx, "y + 1").expect_err("y is unbound");
        assert_eq!(err.to_string(), "unbound variable 'y'");
    }

    #[test]
    fn type_mismatch_leaves_context_usable() {
        let mut cx = Context::default();
        run(&mut cx, "let id = (fn x: x) (fn y: y)").expect("binds a closure");

        let err = run(&mut cx, "id + 1").expect_err("closure is not a number");
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                expected: ObjectKind::Number,
                got: ObjectKind::Closure,
            }
        );
        assert_eq!(err.to_string(), "expected Number, got Closure");

        assert_eq!(number(&mut cx, "id 2"), 2.0);
        assert_eq!(cx.root_stack().len(), 1);
    }

    #[test]
    fn applying_a_number_is_a_type_mismatch() {
        let mut cx = Context::default();
        let err = run(&mut cx, "3 4").expect_err("3 is not a function");
        assert_eq!(
            err,
            EvalError::TypeMismatch {
                expected: ObjectKind::Closure,
                got: ObjectKind::Number,
            }
        );
    }

    #[test]
    fn closures_capture_their_defining_scope() {
        let mut cx = Context::default();
        run(&mut cx, "let add = fn a b: a + b").expect("defines add");
        run(&mut cx, "let add2 = add 2").expect("partial application");
        run(&mut cx, "let a = 100").expect("global a");
        assert_eq!(number(&mut cx, "add2 5"), 7.0);
    }

    #[test]
    fn parameters_shadow_globals_without_touching_them() {
        let mut cx = Context::default();
        run(&mut cx, "let x = 1").expect("global x");
        assert_eq!(number(&mut cx, "(fn x: x * 10) 5"), 50.0);
        assert_eq!(number(&mut cx, "x"), 1.0);
    }

    #[test]
    fn let_rebinding_overwrites_in_the_global_scope() {
        let mut cx = Context::default();
        run(&mut cx, "let x = 1").expect("first");
        run(&mut cx, "let x = x + 1").expect("second");
        assert_eq!(number(&mut cx, "x"), 2.0);
        assert_eq!(cx.heap().environment(cx.root_env()).len(), 1);
    }

    #[test]
    fn recursion_through_the_global_scope() {
        let mut cx = eager(EvalMode::Strict);
        run(&mut cx, "let fact = fn n: if n < 2 then 1 else n * fact (n - 1)")
            .expect("defines fact");
        assert_eq!(number(&mut cx, "fact 10"), 3_628_800.0);
    }

    #[test]
    fn deep_tail_recursion_runs_in_constant_stack() {
        let mut cx = Context::default();
        run(&mut cx, "let count = fn n acc: if n = 0 then acc else count (n - 1) (acc + 1)")
            .expect("defines count");
        assert_eq!(number(&mut cx, "count 100000 0"), 100_000.0);
        assert!(cx.heap().stats().collections > 0);
        assert!(cx.heap().live_count() < 1_000);
    }

    #[test]
    fn lazy_mode_never_forces_the_untaken_branch() {
        let mut cx = Context::with_mode(EvalMode::Lazy);
        run(&mut cx, "let loop = fn x: loop x").expect("defines loop");
        assert_eq!(number(&mut cx, "if 1 then 2 else loop 0"), 2.0);
    }

    #[test]
    fn lazy_mode_ignores_unused_diverging_arguments() {
        let mut cx = Context::with_mode(EvalMode::Lazy);
        run(&mut cx, "let loop = fn x: loop x").expect("defines loop");
        run(&mut cx, "let const = fn a b: a").expect("defines const");
        assert_eq!(number(&mut cx, "const 4 (loop 0)"), 4.0);
        assert_eq!(number(&mut cx, "const 4 nope"), 4.0);
    }

    #[test]
    fn lazy_tail_recursion_keeps_forcing_shallow() {
        let mut cx = Context::with_mode(EvalMode::Lazy);
        run(&mut cx, "let count = fn n: if n = 0 then 7 else count (n - 1)")
            .expect("defines count");
        assert_eq!(number(&mut cx, "count 10000"), 7.0);
    }

    #[test]
    fn strict_mode_evaluates_arguments_eagerly() {
        let mut cx = Context::default();
        run(&mut cx, "let const = fn a b: a").expect("defines const");
        assert!(matches!(
            run(&mut cx, "const 4 nope"),
            Err(EvalError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn forcing_is_memoized() {
        let mut cx = Context::with_mode(EvalMode::Lazy);
        let env = cx.root_env();
        let body = Rc::new(Node::binary(BinaryOp::Add, Node::number(1.0), Node::number(2.0)));
        let thunk = cx.heap_mut().alloc_thunk(env, body);

        let first = cx
            .with_rooted(thunk, |cx| cx.force(thunk))
            .expect("forces");
        let second = cx.force(thunk).expect("forces again");

        assert_eq!(first, second);
        assert_eq!(cx.heap().number(first), Some(3.0));
        assert_eq!(
            cx.heap().thunk(thunk).and_then(Thunk::forced_value),
            Some(first)
        );
    }

    #[test]
    fn forced_thunks_bound_in_scope_are_shared() {
        let mut cx = Context::with_mode(EvalMode::Lazy);
        run(&mut cx, "let twice = fn x: x + x").expect("defines twice");
        assert_eq!(number(&mut cx, "twice (3 * 7)"), 42.0);
    }

    #[test]
    fn lazy_let_result_is_forced_at_top_level() {
        let mut cx = Context::with_mode(EvalMode::Lazy);
        let value = run(&mut cx, "let y = (fn a: a) 5").expect("binds y");
        assert_eq!(cx.heap().number(value), Some(5.0));
        assert_eq!(number(&mut cx, "y"), 5.0);
    }

    #[test]
    fn values_survive_collections_in_every_position() {
        for mode in [EvalMode::Strict, EvalMode::Lazy] {
            let mut cx = eager(mode);
            run(&mut cx, "let compose = fn f g x: f (g x)").expect("compose");
            run(&mut cx, "let inc = fn x: x + 1").expect("inc");
            run(&mut cx, "let dbl = fn x: x * 2").expect("dbl");
            assert_eq!(number(&mut cx, "(compose inc dbl 5) + (compose dbl inc 5)"), 23.0);
            assert_eq!(number(&mut cx, "(if 1 then inc else dbl) ((fn y: y - 1) 10)"), 10.0);
        }
    }

    #[test]
    fn failed_form_leaves_no_transient_roots() {
        let mut cx = eager(EvalMode::Lazy);
        run(&mut cx, "let f = fn x: x + nope").expect("defines f");
        assert!(run(&mut cx, "1 + (2 * f 3)").is_err());
        assert_eq!(cx.root_stack().len(), cx.root_stack().pinned());
        assert_eq!(number(&mut cx, "1 + 2"), 3.0);
    }

    #[test]
    fn destroy_after_evaluation_reclaims_everything() {
        let mut cx = Context::default();
        run(&mut cx, "let f = fn x: fn y: x + y").expect("defines f");
        run(&mut cx, "let g = f 1").expect("defines g");
        let live = cx.heap().live_count();
        let stats = cx.destroy();
        assert!(stats.freed >= live);
    }
}
