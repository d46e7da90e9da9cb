//! Call-site matching for generic signatures: a one-way structural matcher
//! that accumulates typevar bindings, shared across a call's arguments.
//!
//! First binding wins; there is no occurs check and no back-substitution.
//! A later conflicting argument fails the assignability gate instead of
//! rebinding.

use minipy_ast::Ty;

use crate::algebra::{is_assignable, specialize_type, Subst};
use crate::env::GlobalTypeEnv;
use crate::error::TypeError;

/// Matches an argument type against a parameter type, binding any typevars
/// in the parameter. Shapes must agree where the parameter is generic.
pub(crate) fn match_generic_param(
    subst: &mut Subst,
    param: &Ty,
    arg: &Ty,
) -> Result<(), TypeError> {
    match param {
        Ty::TypeVar(name) => {
            if !subst.contains_key(name) {
                subst.insert(name.clone(), arg.clone());
            }
            Ok(())
        }
        Ty::Class(name, params) if !params.is_empty() => match arg {
            Ty::Class(_, args) if args.len() == params.len() => {
                for (p, a) in params.iter().zip(args) {
                    match_generic_param(subst, p, a)?;
                }
                Ok(())
            }
            _ => Err(TypeError::new(format!(
                "expected an instance of `{name}[...]`, got `{arg}`"
            ))),
        },
        Ty::Callable(params, ret) => match arg {
            Ty::Callable(arg_params, arg_ret) if arg_params.len() == params.len() => {
                for (p, a) in params.iter().zip(arg_params) {
                    match_generic_param(subst, p, a)?;
                }
                match_generic_param(subst, ret, arg_ret)
            }
            _ => Err(TypeError::new(format!(
                "expected a callable matching `{param}`, got `{arg}`"
            ))),
        },
        _ => Ok(()),
    }
}

fn is_generic_shaped(param: &Ty) -> bool {
    match param {
        Ty::TypeVar(_) | Ty::Callable(..) => true,
        Ty::Class(_, args) => !args.is_empty(),
        _ => false,
    }
}

/// Checks one argument against one parameter under the call's shared
/// substitution: generic-shaped parameters are matched (binding typevars)
/// and then specialized before the assignability test.
pub(crate) fn check_call_arg(
    env: &GlobalTypeEnv,
    subst: &mut Subst,
    param: &Ty,
    arg: &Ty,
) -> Result<bool, TypeError> {
    if is_generic_shaped(param) {
        match_generic_param(subst, param, arg)?;
        let specialized = specialize_type(subst, param);
        Ok(is_assignable(env, arg, &specialized))
    } else {
        Ok(is_assignable(env, arg, param))
    }
}
