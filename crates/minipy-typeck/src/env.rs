//! Type environments and the pass that builds the global one from a program.

use std::collections::HashMap;

use minipy_ast::{Program, Ty};
use smol_str::SmolStr;

use crate::error::TypeError;

pub(crate) const OBJECT: &str = "object";

/// A function or method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunSig {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

impl FunSig {
    pub fn new(params: Vec<Ty>, ret: Ty) -> FunSig {
        FunSig { params, ret }
    }
}

/// Everything the checker knows about one declared class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassShape {
    pub fields: HashMap<SmolStr, Ty>,
    pub methods: HashMap<SmolStr, FunSig>,
    /// Direct superclasses with their type arguments, in declaration order.
    pub supers: Vec<(SmolStr, Vec<Ty>)>,
    pub type_params: Vec<SmolStr>,
}

/// The global typing context, threaded through every check and returned (with
/// the top-level block's variables folded in) for incremental use.
#[derive(Debug, Clone, Default)]
pub struct GlobalTypeEnv {
    pub globals: HashMap<SmolStr, Ty>,
    pub functions: HashMap<SmolStr, FunSig>,
    pub classes: HashMap<SmolStr, ClassShape>,
    /// Declared type variables, name to canonical name.
    pub typevars: HashMap<SmolStr, SmolStr>,
}

impl GlobalTypeEnv {
    pub fn new() -> GlobalTypeEnv {
        GlobalTypeEnv::default()
    }

    /// The environment the REPL starts from: the numeric builtins plus
    /// `print` and `len`.
    pub fn with_defaults() -> GlobalTypeEnv {
        let mut env = GlobalTypeEnv::new();
        let num2 = FunSig::new(vec![Ty::Number, Ty::Number], Ty::Number);
        env.functions
            .insert("abs".into(), FunSig::new(vec![Ty::Number], Ty::Number));
        env.functions.insert("max".into(), num2.clone());
        env.functions.insert("min".into(), num2.clone());
        env.functions.insert("pow".into(), num2);
        env.functions.insert(
            "print".into(),
            FunSig::new(vec![Ty::class(OBJECT)], Ty::Number),
        );
        env.functions.insert(
            "len".into(),
            FunSig::new(vec![Ty::list(Ty::Number)], Ty::Number),
        );
        env
    }

    pub(crate) fn class(&self, name: &str) -> Result<&ClassShape, TypeError> {
        self.classes
            .get(name)
            .ok_or_else(|| TypeError::new(format!("unknown class `{name}`")))
    }
}

/// The per-function (or top-level) scope.
#[derive(Debug, Clone)]
pub(crate) struct LocalTypeEnv {
    pub(crate) vars: HashMap<SmolStr, Ty>,
    pub(crate) expected_ret: Ty,
    pub(crate) actual_ret: Ty,
    pub(crate) top_level: bool,
}

impl LocalTypeEnv {
    pub(crate) fn top_level() -> LocalTypeEnv {
        LocalTypeEnv {
            vars: HashMap::new(),
            expected_ret: Ty::None,
            actual_ret: Ty::None,
            top_level: true,
        }
    }

    pub(crate) fn function() -> LocalTypeEnv {
        LocalTypeEnv {
            vars: HashMap::new(),
            expected_ret: Ty::None,
            actual_ret: Ty::None,
            top_level: false,
        }
    }
}

// ── Environment construction ────────────────────────────────────────────────

/// `int` and `bool` are valid superclass type arguments; any other name is
/// read as a class (a later resolution pass may turn it into a typevar).
fn typify_super_arg(name: &SmolStr) -> Ty {
    match name.as_str() {
        "int" => Ty::Number,
        "bool" => Ty::Bool,
        _ => Ty::class(name.clone()),
    }
}

/// Extends `env` with every declaration in `program`: global variables,
/// function signatures, class shapes, and type variables. Also verifies that
/// each named superclass exists and that no type-variable name collides with
/// an existing global, typevar, or class.
pub(crate) fn augment_env(
    env: &GlobalTypeEnv,
    program: &Program,
) -> Result<GlobalTypeEnv, TypeError> {
    let mut new_env = env.clone();

    for init in &program.inits {
        new_env.globals.insert(init.name.clone(), init.ty.clone());
    }
    for fun in &program.funs {
        let params: Vec<Ty> = fun.params.iter().map(|p| p.ty.clone()).collect();
        new_env
            .globals
            .insert(fun.name.clone(), Ty::callable(params, fun.ret.clone()));
    }
    for cls in &program.classes {
        let mut shape = ClassShape {
            type_params: cls.type_params.clone(),
            ..ClassShape::default()
        };
        for sup in &cls.supers {
            let args = sup.args.iter().map(typify_super_arg).collect();
            shape.supers.push((sup.name.clone(), args));
        }
        for field in &cls.fields {
            shape.fields.insert(field.name.clone(), field.ty.clone());
        }
        for method in &cls.methods {
            let params: Vec<Ty> = method.params.iter().map(|p| p.ty.clone()).collect();
            shape
                .methods
                .insert(method.name.clone(), FunSig::new(params, method.ret.clone()));
        }
        new_env.classes.insert(cls.name.clone(), shape);
    }

    for cls in &program.classes {
        for sup in &cls.supers {
            if sup.name != OBJECT && !program.classes.iter().any(|c| c.name == sup.name) {
                return Err(TypeError::at(
                    format!(
                        "class `{}` extends undeclared superclass `{}`",
                        cls.name, sup.name
                    ),
                    cls.span,
                ));
            }
        }
    }

    for tv in &program.typevars {
        if new_env.globals.contains_key(&tv.name)
            || new_env.typevars.contains_key(&tv.name)
            || new_env.classes.contains_key(&tv.name)
        {
            return Err(TypeError::at(
                format!("duplicate identifier `{}` for type variable", tv.name),
                tv.span,
            ));
        }
        new_env
            .typevars
            .insert(tv.name.clone(), tv.canonical_name.clone());
    }

    Ok(new_env)
}
