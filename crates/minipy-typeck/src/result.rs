use la_arena::ArenaMap;
use minipy_ast::{ExprId, StmtId, Ty};
use smol_str::SmolStr;

use crate::env::GlobalTypeEnv;

/// Everything a successful check produces: per-node types, resolved
/// constructor calls, the type of the top-level block's last statement (the
/// REPL echo type), and the extended global environment for the next
/// incremental run.
#[derive(Debug, Clone)]
pub struct TypeCheckResult {
    pub expr_types: ArenaMap<ExprId, Ty>,
    pub stmt_types: ArenaMap<StmtId, Ty>,
    /// Call expressions that are really constructor invocations, mapped to
    /// the class they construct.
    pub constructor_calls: ArenaMap<ExprId, SmolStr>,
    pub last_type: Ty,
    pub env: GlobalTypeEnv,
}
