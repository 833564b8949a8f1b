//! The agent scripting surface
//!
//! A small, Python-flavoured language: functions, control flow, lists,
//! tuples, dicts, comprehensions and the `math`/`random` modules. Source is
//! tokenized, parsed into an [`ast::Module`], checked by the admission
//! validator and then run by a metered tree-walking [`Interpreter`].

pub mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;
mod value;

pub use builtins::ALLOWED_MODULES;
pub use interp::{Interpreter, Limits, Namespace, DEADLINE_POLL_INTERVAL};
pub use parser::parse;
pub use value::{Value, MAX_CONTAINER_LEN};
