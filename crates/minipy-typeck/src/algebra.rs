//! Structural operations on types: equality, validity, assignability, and
//! substitution-based specialization of generic member types.

use std::collections::HashMap;

use minipy_ast::Ty;
use smol_str::SmolStr;

use crate::env::{ClassShape, FunSig, GlobalTypeEnv, OBJECT};
use crate::error::TypeError;
use crate::inherit;

/// Structural type equality. `empty` compares equal to any list type (an
/// empty list literal fits wherever a list is expected) but not to itself.
pub fn equal_type(t1: &Ty, t2: &Ty) -> bool {
    match (t1, t2) {
        (Ty::Number, Ty::Number) | (Ty::Bool, Ty::Bool) | (Ty::None, Ty::None) => true,
        (Ty::TypeVar(a), Ty::TypeVar(b)) => a == b,
        (Ty::List(a), Ty::List(b)) => equal_type(a, b),
        (Ty::Empty, Ty::List(_)) | (Ty::List(_), Ty::Empty) => true,
        (Ty::Callable(p1, r1), Ty::Callable(p2, r2)) => {
            p1.len() == p2.len()
                && p1.iter().zip(p2).all(|(a, b)| equal_type(a, b))
                && equal_type(r1, r2)
        }
        (Ty::Class(n1, a1), Ty::Class(n2, a2)) => {
            n1 == n2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(a, b)| equal_type(a, b))
        }
        _ => false,
    }
}

/// Whether a written annotation denotes a type that exists: class names must
/// be declared and applied to the right number of valid arguments.
pub fn is_valid_type(env: &GlobalTypeEnv, ty: &Ty) -> bool {
    match ty {
        Ty::Number | Ty::Bool | Ty::None | Ty::Empty | Ty::TypeVar(_) => true,
        Ty::Either(l, r) => is_valid_type(env, l) && is_valid_type(env, r),
        Ty::List(item) => is_valid_type(env, item),
        Ty::Callable(params, ret) => {
            params.iter().all(|p| is_valid_type(env, p)) && is_valid_type(env, ret)
        }
        Ty::Class(name, args) => {
            if name == OBJECT {
                return args.is_empty();
            }
            match env.classes.get(name) {
                Some(shape) => {
                    shape.type_params.len() == args.len()
                        && args.iter().all(|a| is_valid_type(env, a))
                }
                None => false,
            }
        }
    }
}

/// `t1` is a subclass of `t2`: `t2` appears (with equal type arguments)
/// among `t1`'s transitive superclasses, or `t1` is `None` and `t2` a class.
pub fn is_subclass(env: &GlobalTypeEnv, t1: &Ty, t2: &Ty) -> bool {
    match (t1, t2) {
        (Ty::Class(name, args), Ty::Class(..)) => {
            match inherit::superclasses(env, name, args) {
                Ok(supers) => supers.iter().any(|s| equal_type(s, t2)),
                Err(_) => false,
            }
        }
        (Ty::None, Ty::Class(..)) => true,
        _ => false,
    }
}

/// Structural subtyping: equality, `None` into any object-like type, `empty`
/// into any list, or subclassing.
pub fn is_subtype(env: &GlobalTypeEnv, t1: &Ty, t2: &Ty) -> bool {
    if equal_type(t1, t2) {
        return true;
    }
    match (t1, t2) {
        (Ty::None, t) if t.is_object_like() => true,
        (Ty::Empty, Ty::List(_)) => true,
        _ => is_subclass(env, t1, t2),
    }
}

/// Assignability is subtyping; the two names are kept separate so call sites
/// read in the direction they check.
pub fn is_assignable(env: &GlobalTypeEnv, from: &Ty, to: &Ty) -> bool {
    is_subtype(env, from, to)
}

/// The join of two branch types. Deliberately collapses to `None`; diverging
/// return types are tracked with [`Ty::Either`] instead.
pub fn join(_env: &GlobalTypeEnv, _t1: &Ty, _t2: &Ty) -> Ty {
    Ty::None
}

// ── Specialization ──────────────────────────────────────────────────────────

/// A type-variable binding map.
pub type Subst = HashMap<SmolStr, Ty>;

/// Rewrites every bound typevar in `ty` to its binding. Unbound typevars are
/// left alone.
pub fn specialize_type(subst: &Subst, ty: &Ty) -> Ty {
    match ty {
        Ty::TypeVar(name) => subst.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Ty::List(item) => Ty::list(specialize_type(subst, item)),
        Ty::Either(l, r) => Ty::either(specialize_type(subst, l), specialize_type(subst, r)),
        Ty::Callable(params, ret) => Ty::callable(
            params.iter().map(|p| specialize_type(subst, p)).collect(),
            specialize_type(subst, ret),
        ),
        Ty::Class(name, args) => Ty::Class(
            name.clone(),
            args.iter().map(|a| specialize_type(subst, a)).collect(),
        ),
        _ => ty.clone(),
    }
}

pub(crate) fn zip_subst(
    type_params: &[SmolStr],
    args: &[Ty],
    class_name: &str,
) -> Result<Subst, TypeError> {
    if type_params.len() != args.len() {
        return Err(TypeError::new(format!(
            "type-parameter count mismatch for class `{class_name}`: expected {}, got {}",
            type_params.len(),
            args.len()
        )));
    }
    Ok(type_params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect())
}

fn receiver_subst(env: &GlobalTypeEnv, obj_ty: &Ty) -> Result<Subst, TypeError> {
    match obj_ty {
        Ty::Class(name, args) => {
            let shape: &ClassShape = env.class(name)?;
            zip_subst(&shape.type_params, args, name)
        }
        _ => Err(TypeError::new(format!(
            "cannot specialize members of non-class type `{obj_ty}`"
        ))),
    }
}

/// Specializes a field type against the receiver's type arguments.
pub(crate) fn specialize_field_type(
    env: &GlobalTypeEnv,
    obj_ty: &Ty,
    field_ty: &Ty,
) -> Result<Ty, TypeError> {
    let subst = receiver_subst(env, obj_ty)?;
    Ok(specialize_type(&subst, field_ty))
}

/// Specializes a method signature against the receiver's type arguments.
/// Typevars belonging to the method itself stay unbound.
pub(crate) fn specialize_method_type(
    env: &GlobalTypeEnv,
    obj_ty: &Ty,
    sig: &FunSig,
) -> Result<FunSig, TypeError> {
    let subst = receiver_subst(env, obj_ty)?;
    Ok(FunSig::new(
        sig.params
            .iter()
            .map(|p| specialize_type(&subst, p))
            .collect(),
        specialize_type(&subst, &sig.ret),
    ))
}
