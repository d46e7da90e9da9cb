//! The closed type algebra shared by the checker and later stages.

use std::fmt;

use smol_str::SmolStr;

/// A minipy static type.
///
/// The parser never produces `TypeVar`; a bare class name that happens to be
/// a declared type variable is written as `Class(name, [])` and rewritten by
/// the checker's resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// `int`.
    Number,
    /// `bool`.
    Bool,
    /// `None`, and the type of expressions with nothing to say.
    None,
    /// The type of `[]` before an element type is known.
    Empty,
    /// Two diverging branch result types. Never written by users.
    Either(Box<Ty>, Box<Ty>),
    /// A resolved reference to a declared type variable.
    TypeVar(SmolStr),
    /// `[T]`.
    List(Box<Ty>),
    /// `(T1, ..., Tn) -> R`.
    Callable(Vec<Ty>, Box<Ty>),
    /// A class instance type, possibly with type arguments.
    Class(SmolStr, Vec<Ty>),
}

impl Ty {
    pub fn class(name: impl Into<SmolStr>) -> Ty {
        Ty::Class(name.into(), Vec::new())
    }

    pub fn class_with(name: impl Into<SmolStr>, args: Vec<Ty>) -> Ty {
        Ty::Class(name.into(), args)
    }

    pub fn typevar(name: impl Into<SmolStr>) -> Ty {
        Ty::TypeVar(name.into())
    }

    pub fn list(item: Ty) -> Ty {
        Ty::List(Box::new(item))
    }

    pub fn callable(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Callable(params, Box::new(ret))
    }

    pub fn either(left: Ty, right: Ty) -> Ty {
        Ty::Either(Box::new(left), Box::new(right))
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Ty::Class(..))
    }

    /// Types that can hold a `None` value.
    pub fn is_object_like(&self) -> bool {
        matches!(self, Ty::Class(..) | Ty::List(_) | Ty::Callable(..))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Number => write!(f, "int"),
            Ty::Bool => write!(f, "bool"),
            Ty::None => write!(f, "None"),
            Ty::Empty => write!(f, "<empty>"),
            Ty::Either(l, r) => write!(f, "{l} | {r}"),
            Ty::TypeVar(name) => write!(f, "{name}"),
            Ty::List(item) => write!(f, "[{item}]"),
            Ty::Callable(params, ret) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {ret}")
            }
            Ty::Class(name, args) => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "[")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
        }
    }
}
