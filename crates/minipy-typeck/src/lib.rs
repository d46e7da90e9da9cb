//! Static semantic analysis for minipy programs.
//!
//! The checker consumes the parser's [`Program`], validates every
//! declaration and statement against the language's typing rules (including
//! multiple inheritance and bounded generics), and produces a
//! [`TypeCheckResult`]: per-node types in arena-keyed side tables, resolved
//! constructor calls, and the extended global environment for the next
//! incremental run. Checking is fail-fast; the first violation is returned
//! as a [`TypeError`].

use minipy_ast::Program;

mod algebra;
mod checker;
mod env;
mod error;
mod inherit;
mod infer;
mod resolve;
mod result;

pub use algebra::{equal_type, is_assignable, is_subclass, is_subtype, is_valid_type, join,
    specialize_type, Subst};
pub use env::{ClassShape, FunSig, GlobalTypeEnv};
pub use error::TypeError;
pub use result::TypeCheckResult;

/// Checks a program against the default environment (the numeric builtins,
/// `print`, and `len`).
pub fn check(program: &Program) -> Result<TypeCheckResult, TypeError> {
    check_with_env(program, GlobalTypeEnv::with_defaults())
}

/// Checks a program against a caller-supplied environment, for incremental
/// (REPL) use: feed the returned environment into the next call.
pub fn check_with_env(
    program: &Program,
    env: GlobalTypeEnv,
) -> Result<TypeCheckResult, TypeError> {
    checker::run(program, env)
}

#[cfg(test)]
mod tests;
