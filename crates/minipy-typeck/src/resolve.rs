//! The generic-parameter resolver: rewrites class-shaped names that are
//! really type variables into `Ty::TypeVar`, driven by a scope set of names.
//!
//! The parser cannot tell `T` from a class reference, so it always writes
//! `Class("T", [])`. Resolution is a pure rewrite and runs before any body
//! is checked: over every callable-typed global, and over every class's
//! fields and method signatures.

use minipy_ast::{ClassDef, FunDef, Ty};
use smol_str::SmolStr;

use crate::env::GlobalTypeEnv;
use crate::error::TypeError;

/// Rewrites `Class(n, _)` to `TypeVar(n)` wherever `n` is in `scope`,
/// recursing through lists, callables, and class arguments.
pub(crate) fn resolve_type(scope: &[SmolStr], ty: &Ty) -> Ty {
    match ty {
        Ty::Class(name, args) => {
            if scope.contains(name) {
                Ty::TypeVar(name.clone())
            } else {
                Ty::Class(
                    name.clone(),
                    args.iter().map(|a| resolve_type(scope, a)).collect(),
                )
            }
        }
        Ty::List(item) => Ty::list(resolve_type(scope, item)),
        Ty::Callable(params, ret) => Ty::callable(
            params.iter().map(|p| resolve_type(scope, p)).collect(),
            resolve_type(scope, ret),
        ),
        _ => ty.clone(),
    }
}

/// Collects declared type-variable names that make a function signature
/// generic. Only class-name positions and the parameters/return of a
/// callable count; arguments of an applied class do not.
pub(crate) fn collect_typevars(env: &GlobalTypeEnv, ty: &Ty, out: &mut Vec<SmolStr>) {
    match ty {
        Ty::Class(name, _) => {
            if env.typevars.contains_key(name) && !out.contains(name) {
                out.push(name.clone());
            }
        }
        Ty::Callable(params, ret) => {
            for p in params {
                collect_typevars(env, p, out);
            }
            collect_typevars(env, ret, out);
        }
        _ => {}
    }
}

/// The typevar scope a method body is checked under: the class's own type
/// parameters plus any typevars named in the method's parameter list.
pub(crate) fn method_scope(
    env: &GlobalTypeEnv,
    class_params: &[SmolStr],
    method: &FunDef,
) -> Vec<SmolStr> {
    let mut scope: Vec<SmolStr> = class_params.to_vec();
    let mut used = Vec::new();
    for p in &method.params {
        collect_typevars(env, &p.ty, &mut used);
    }
    for name in used {
        if !scope.contains(&name) {
            scope.push(name);
        }
    }
    scope
}

/// Rewrites every callable-typed global's signature so that class-shaped
/// names coinciding with declared typevars become real typevars.
pub(crate) fn resolve_global_callables(env: &mut GlobalTypeEnv) {
    let scope: Vec<SmolStr> = env.typevars.keys().cloned().collect();
    for ty in env.globals.values_mut() {
        if matches!(ty, Ty::Callable(..)) {
            *ty = resolve_type(&scope, ty);
        }
    }
}

/// Resolves one class's shape in the class table: validates its superclass
/// type arguments, then rewrites field types and method signatures under
/// each member's scope.
pub(crate) fn resolve_class(env: &mut GlobalTypeEnv, cls: &ClassDef) -> Result<(), TypeError> {
    let mut shape = env.class(&cls.name)?.clone();

    for (sup, sup_args) in &mut shape.supers {
        let expected = env.class(sup).map(|s| s.type_params.len()).unwrap_or(0);
        if sup_args.len() != expected {
            return Err(TypeError::at(
                format!(
                    "wrong number of type arguments to superclass `{sup}`: expected {expected}, got {}",
                    sup_args.len()
                ),
                cls.span,
            ));
        }
        for arg in sup_args.iter_mut() {
            let resolved = resolve_type(&cls.type_params, arg);
            if let Ty::Class(name, _) = &resolved {
                if !env.classes.contains_key(name) {
                    return Err(TypeError::at(
                        format!(
                            "class `{name}` used as type argument to superclass `{sup}` does not exist"
                        ),
                        cls.span,
                    ));
                }
            }
            *arg = resolved;
        }
    }

    for fty in shape.fields.values_mut() {
        *fty = resolve_type(&cls.type_params, fty);
    }

    for method in &cls.methods {
        let scope = method_scope(env, &cls.type_params, method);
        if let Some(sig) = shape.methods.get_mut(&method.name) {
            for p in sig.params.iter_mut() {
                *p = resolve_type(&scope, p);
            }
            sig.ret = resolve_type(&scope, &sig.ret);
        }
    }

    env.classes.insert(cls.name.clone(), shape);
    Ok(())
}
