//! The inheritance resolver: one specializing walk over the superclass DAG,
//! wrapped three ways (ancestor list, inherited fields, inherited methods).
//!
//! The walk visits each level's direct superclasses first and then recurses
//! into them, substituting the subclass's type arguments into each
//! superclass reference on the way up, so every visited member type is
//! already expressed in the original receiver's type arguments.

use std::collections::HashMap;

use minipy_ast::Ty;
use smol_str::SmolStr;

use crate::algebra::{specialize_field_type, specialize_method_type, specialize_type, zip_subst};
use crate::env::{FunSig, GlobalTypeEnv, OBJECT};
use crate::error::TypeError;

fn fold_superclasses<F>(
    env: &GlobalTypeEnv,
    name: &SmolStr,
    args: &[Ty],
    f: &mut F,
) -> Result<(), TypeError>
where
    F: FnMut(&GlobalTypeEnv, &SmolStr, &[Ty]) -> Result<(), TypeError>,
{
    if name == OBJECT {
        return f(env, name, &[]);
    }
    let shape = env.class(name)?;
    let subst = zip_subst(&shape.type_params, args, name)?;
    let supers: Vec<(SmolStr, Vec<Ty>)> = shape
        .supers
        .iter()
        .map(|(sup, sup_args)| {
            let specialized = sup_args
                .iter()
                .map(|a| specialize_type(&subst, a))
                .collect();
            (sup.clone(), specialized)
        })
        .collect();

    for (sup, sup_args) in &supers {
        if sup != OBJECT {
            f(env, sup, sup_args)?;
        }
    }
    for (sup, sup_args) in &supers {
        fold_superclasses(env, sup, sup_args, f)?;
    }
    Ok(())
}

/// All transitive superclasses of `Class(name, args)`, specialized, ending
/// with `object`.
pub(crate) fn superclasses(
    env: &GlobalTypeEnv,
    name: &SmolStr,
    args: &[Ty],
) -> Result<Vec<Ty>, TypeError> {
    let mut out = Vec::new();
    fold_superclasses(env, name, args, &mut |_, sup, sup_args| {
        out.push(Ty::Class(sup.clone(), sup_args.to_vec()));
        Ok(())
    })?;
    Ok(out)
}

/// Every field inherited by `Class(name, args)`, with types specialized to
/// the receiver's type arguments.
pub(crate) fn superclass_fields(
    env: &GlobalTypeEnv,
    name: &SmolStr,
    args: &[Ty],
) -> Result<HashMap<SmolStr, Ty>, TypeError> {
    let mut fields = HashMap::new();
    fold_superclasses(env, name, args, &mut |env, sup, sup_args| {
        if sup == OBJECT {
            return Ok(());
        }
        let shape = env.class(sup)?;
        let sup_ty = Ty::Class(sup.clone(), sup_args.to_vec());
        for (fname, fty) in &shape.fields {
            let specialized = specialize_field_type(env, &sup_ty, fty)?;
            fields.insert(fname.clone(), specialized);
        }
        Ok(())
    })?;
    Ok(fields)
}

/// Every method inherited by `Class(name, args)`, with signatures
/// specialized to the receiver's type arguments.
pub(crate) fn superclass_methods(
    env: &GlobalTypeEnv,
    name: &SmolStr,
    args: &[Ty],
) -> Result<HashMap<SmolStr, FunSig>, TypeError> {
    let mut methods = HashMap::new();
    fold_superclasses(env, name, args, &mut |env, sup, sup_args| {
        if sup == OBJECT {
            return Ok(());
        }
        let shape = env.class(sup)?;
        let sup_ty = Ty::Class(sup.clone(), sup_args.to_vec());
        for (mname, sig) in &shape.methods {
            let specialized = specialize_method_type(env, &sup_ty, sig)?;
            methods.insert(mname.clone(), specialized);
        }
        Ok(())
    })?;
    Ok(methods)
}
