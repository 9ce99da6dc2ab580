mod ast;
mod context;
mod env;
mod heap;
mod interpreter;
mod object;
mod stack;
mod visitor;

pub mod format;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Node};
pub use context::{Context, ContextSettings, EvalMode, SettingsError};
pub use env::Environment;
pub use heap::{Collection, GC_INITIAL_THRESHOLD, GcSettings, GcStats, Heap};
pub use interpreter::EvalError;
pub use object::*;
pub use parser::{ParseError, parse_form, parse_program};
pub use stack::RootStack;
pub use visitor::Visitable;
