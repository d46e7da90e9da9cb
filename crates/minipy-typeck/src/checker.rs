//! The statement/expression checker: a recursive descent over the program
//! that threads a [`LocalTypeEnv`] per scope and records node types in
//! arena-keyed side tables. All checking is fail-fast.

use std::collections::HashMap;
use std::mem;

use la_arena::ArenaMap;
use minipy_ast::{
    AssignTarget, BinOp, ClassDef, Destructure, Expr, ExprId, FunDef, Literal, Program, Span,
    Stmt, StmtId, Ty, UnOp, VarInit,
};
use smol_str::SmolStr;

use crate::algebra::{
    equal_type, is_assignable, is_valid_type, specialize_field_type, specialize_method_type,
    specialize_type, Subst,
};
use crate::env::{augment_env, FunSig, GlobalTypeEnv, LocalTypeEnv};
use crate::error::TypeError;
use crate::inherit;
use crate::infer;
use crate::resolve;
use crate::result::TypeCheckResult;

pub(crate) struct TypeChecker<'a> {
    program: &'a Program,
    env: GlobalTypeEnv,
    expr_types: ArenaMap<ExprId, Ty>,
    stmt_types: ArenaMap<StmtId, Ty>,
    constructor_calls: ArenaMap<ExprId, SmolStr>,
}

/// Checks a whole program against a starting environment. The pipeline is:
/// extend the environment with every declaration, validate global
/// initializers, resolve generic parameters (globals, then classes), check
/// class bodies, check function bodies, then check the top-level block and
/// fold its variables back into the environment.
pub(crate) fn run(program: &Program, env: GlobalTypeEnv) -> Result<TypeCheckResult, TypeError> {
    let env = augment_env(&env, program)?;
    let mut ck = TypeChecker {
        program,
        env,
        expr_types: ArenaMap::default(),
        stmt_types: ArenaMap::default(),
        constructor_calls: ArenaMap::default(),
    };

    for init in &program.inits {
        ck.tc_init(init, &init.ty)?;
    }

    resolve::resolve_global_callables(&mut ck.env);
    for cls in &program.classes {
        resolve::resolve_class(&mut ck.env, cls)?;
    }

    for cls in &program.classes {
        if cls.type_params.is_empty() {
            ck.tc_class(cls)?;
        } else {
            ck.tc_generic_class(cls)?;
        }
    }

    for fun in &program.funs {
        let mut typevars = Vec::new();
        for p in &fun.params {
            resolve::collect_typevars(&ck.env, &p.ty, &mut typevars);
        }
        if typevars.is_empty() {
            ck.tc_def(fun, &[], &HashMap::new())?;
        } else {
            ck.tc_generic_def(fun, &typevars)?;
        }
    }

    let mut locals = LocalTypeEnv::top_level();
    let mut last = Ty::None;
    for &sid in &program.body {
        last = ck.tc_stmt(&mut locals, sid)?;
    }
    for (name, ty) in locals.vars {
        ck.env.globals.insert(name, ty);
    }

    Ok(TypeCheckResult {
        expr_types: ck.expr_types,
        stmt_types: ck.stmt_types,
        constructor_calls: ck.constructor_calls,
        last_type: last,
        env: ck.env,
    })
}

fn literal_type(lit: Literal, span: Span) -> Result<Ty, TypeError> {
    match lit {
        Literal::Num(_) => Ok(Ty::Number),
        Literal::Bool(_) => Ok(Ty::Bool),
        Literal::None => Ok(Ty::None),
        Literal::Zero => Err(TypeError::at(
            "`__ZERO__` may only appear as the initializer of a generic variable",
            span,
        )),
    }
}

fn fmt_tys(tys: &[Ty]) -> String {
    tys.iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> TypeChecker<'a> {
    // ── Declarations ────────────────────────────────────────────────────────

    /// Checks a variable declaration: the annotation must denote a type, a
    /// typevar-typed variable must be initialized with `__ZERO__`, and any
    /// other initializer must be assignable to the annotation. `ty` is the
    /// (possibly resolved) annotation to check against.
    fn tc_init(&self, init: &VarInit, ty: &Ty) -> Result<(), TypeError> {
        if !is_valid_type(&self.env, ty) {
            return Err(TypeError::at(
                format!("invalid type annotation `{ty}` for `{}`", init.name),
                init.span,
            ));
        }
        if matches!(ty, Ty::TypeVar(_)) {
            if init.value != Literal::Zero {
                return Err(TypeError::at(
                    format!(
                        "`{}` has a generic type and must be initialized with `__ZERO__`",
                        init.name
                    ),
                    init.span,
                ));
            }
            return Ok(());
        }
        let val_ty = literal_type(init.value, init.span)?;
        if !is_assignable(&self.env, &val_ty, ty) {
            return Err(TypeError::at(
                format!("expected type `{ty}` for `{}`, got `{val_ty}`", init.name),
                init.span,
            ));
        }
        Ok(())
    }

    fn tc_generic_def(&mut self, fun: &FunDef, typevars: &[SmolStr]) -> Result<(), TypeError> {
        let params: Vec<Ty> = fun
            .params
            .iter()
            .map(|p| resolve::resolve_type(typevars, &p.ty))
            .collect();
        let ret = resolve::resolve_type(typevars, &fun.ret);
        self.env
            .globals
            .insert(fun.name.clone(), Ty::callable(params, ret));
        self.tc_def(fun, typevars, &HashMap::new())
    }

    /// Checks a function body. `scope` is the set of typevar names the
    /// function's annotations may refer to; `nonlocal_env` is the enclosing
    /// function's variables for nested definitions.
    fn tc_def(
        &mut self,
        fun: &FunDef,
        scope: &[SmolStr],
        nonlocal_env: &HashMap<SmolStr, Ty>,
    ) -> Result<(), TypeError> {
        let mut locals = LocalTypeEnv::function();
        let params: Vec<Ty> = fun
            .params
            .iter()
            .map(|p| resolve::resolve_type(scope, &p.ty))
            .collect();
        let ret = resolve::resolve_type(scope, &fun.ret);
        locals.vars.insert(
            fun.name.clone(),
            Ty::callable(params.clone(), ret.clone()),
        );
        locals.expected_ret = ret;

        for (param, ty) in fun.params.iter().zip(&params) {
            if !is_valid_type(&self.env, ty) {
                return Err(TypeError::at(
                    format!(
                        "invalid type annotation `{ty}` for parameter `{}` in function `{}`",
                        param.name, fun.name
                    ),
                    fun.span,
                ));
            }
            locals.vars.insert(param.name.clone(), ty.clone());
        }
        for init in &fun.inits {
            let init_ty = resolve::resolve_type(scope, &init.ty);
            self.tc_init(init, &init_ty)?;
            locals.vars.insert(init.name.clone(), init_ty);
        }
        for name in &fun.nonlocals {
            let ty = nonlocal_env.get(name).cloned().ok_or_else(|| {
                TypeError::at(
                    format!("nonlocal `{name}` is not defined in the enclosing scope"),
                    fun.span,
                )
            })?;
            locals.vars.insert(name.clone(), ty);
        }

        // Nested definitions are checked against a copy of the environment
        // extended with every sibling's signature, then become callable
        // locals of this function.
        let mut env_copy = self.env.clone();
        for child in &fun.children {
            let child_params: Vec<Ty> = child.params.iter().map(|p| p.ty.clone()).collect();
            env_copy
                .functions
                .insert(child.name.clone(), FunSig::new(child_params, child.ret.clone()));
        }
        let saved = mem::replace(&mut self.env, env_copy);
        let parent_vars = locals.vars.clone();
        for child in &fun.children {
            self.tc_def(child, &[], &parent_vars)?;
        }
        for child in &fun.children {
            let child_params: Vec<Ty> = child.params.iter().map(|p| p.ty.clone()).collect();
            locals.vars.insert(
                child.name.clone(),
                Ty::callable(child_params, child.ret.clone()),
            );
        }

        self.tc_block(&mut locals, &fun.body)?;
        let ret_ok = is_assignable(&self.env, &locals.actual_ret, &locals.expected_ret);
        self.env = saved;
        if !ret_ok {
            return Err(TypeError::at(
                format!(
                    "expected return type `{}` for function `{}`, got `{}`",
                    locals.expected_ret, fun.name, locals.actual_ret
                ),
                fun.span,
            ));
        }
        Ok(())
    }

    fn tc_generic_class(&mut self, cls: &ClassDef) -> Result<(), TypeError> {
        for param in &cls.type_params {
            if !self.env.typevars.contains_key(param) {
                return Err(TypeError::at(
                    format!(
                        "undeclared type variable `{param}` used in definition of class `{}`",
                        cls.name
                    ),
                    cls.span,
                ));
            }
        }
        self.tc_class(cls)
    }

    fn tc_class(&mut self, cls: &ClassDef) -> Result<(), TypeError> {
        let tv_args: Vec<Ty> = cls.type_params.iter().cloned().map(Ty::TypeVar).collect();
        let self_ty = Ty::Class(cls.name.clone(), tv_args.clone());

        let inherited = inherit::superclass_fields(&self.env, &cls.name, &tv_args)
            .map_err(|e| TypeError::at(e.message, cls.span))?;
        for field in &cls.fields {
            if inherited.contains_key(&field.name) {
                return Err(TypeError::at(
                    format!(
                        "field `{}` in class `{}` redefines an inherited field",
                        field.name, cls.name
                    ),
                    field.span,
                ));
            }
        }

        for field in &cls.fields {
            let field_ty = self
                .env
                .class(&cls.name)?
                .fields
                .get(&field.name)
                .cloned()
                .ok_or_else(|| {
                    TypeError::at(
                        format!("unknown field `{}` in class `{}`", field.name, cls.name),
                        field.span,
                    )
                })?;
            self.tc_init(field, &field_ty)?;
        }

        for method in &cls.methods {
            let scope = resolve::method_scope(&self.env, &cls.type_params, method);
            self.tc_def(method, &scope, &HashMap::new())?;
        }

        let init = cls
            .methods
            .iter()
            .find(|m| m.name == "__init__")
            .ok_or_else(|| {
                TypeError::at(
                    format!("class `{}` is missing an `__init__` method", cls.name),
                    cls.span,
                )
            })?;
        let init_scope = resolve::method_scope(&self.env, &cls.type_params, init);
        let self_param_ok = init.params.len() == 1
            && init.params[0].name == "self"
            && equal_type(
                &resolve::resolve_type(&init_scope, &init.params[0].ty),
                &self_ty,
            );
        let ret_ok = matches!(resolve::resolve_type(&init_scope, &init.ret), Ty::None);
        if !self_param_ok || !ret_ok {
            return Err(TypeError::at(
                format!(
                    "`__init__` of class `{}` must take a single parameter `self` of type `{self_ty}` and return `None`",
                    cls.name
                ),
                init.span,
            ));
        }
        Ok(())
    }

    // ── Statements ──────────────────────────────────────────────────────────

    fn tc_block(&mut self, locals: &mut LocalTypeEnv, body: &[StmtId]) -> Result<(), TypeError> {
        for &sid in body {
            self.tc_stmt(locals, sid)?;
        }
        Ok(())
    }

    fn tc_stmt(&mut self, locals: &mut LocalTypeEnv, id: StmtId) -> Result<Ty, TypeError> {
        let ty = self.tc_stmt_inner(locals, id)?;
        self.stmt_types.insert(id, ty.clone());
        Ok(ty)
    }

    fn tc_stmt_inner(&mut self, locals: &mut LocalTypeEnv, id: StmtId) -> Result<Ty, TypeError> {
        let program = self.program;
        match &program.stmts[id] {
            Stmt::Pass { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => Ok(Ty::None),
            Stmt::Expr { expr, .. } => self.tc_expr(locals, *expr),
            Stmt::Return { value, span } => {
                if locals.top_level {
                    return Err(TypeError::at("cannot return outside of a function", *span));
                }
                let val_ty = self.tc_expr(locals, *value)?;
                if !is_assignable(&self.env, &val_ty, &locals.expected_ret) {
                    return Err(TypeError::at(
                        format!(
                            "expected return type `{}`, got `{val_ty}`",
                            locals.expected_ret
                        ),
                        *span,
                    ));
                }
                locals.actual_ret = val_ty.clone();
                Ok(val_ty)
            }
            Stmt::While { cond, body, span } => {
                let cond_ty = self.tc_expr(locals, *cond)?;
                self.tc_block(locals, body)?;
                if !equal_type(&cond_ty, &Ty::Bool) {
                    return Err(TypeError::at(
                        format!("condition expression must be of type `bool`, got `{cond_ty}`"),
                        *span,
                    ));
                }
                Ok(Ty::None)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                span,
            } => {
                let cond_ty = self.tc_expr(locals, *cond)?;
                self.tc_block(locals, then_body)?;
                let thn_ty = locals.actual_ret.clone();
                locals.actual_ret = Ty::None;
                self.tc_block(locals, else_body)?;
                let els_ty = locals.actual_ret.clone();
                if !equal_type(&cond_ty, &Ty::Bool) {
                    return Err(TypeError::at(
                        format!("condition expression must be of type `bool`, got `{cond_ty}`"),
                        *span,
                    ));
                }
                // Diverging branch return types are tracked as `either` so
                // the enclosing function's return check can reject them.
                if thn_ty != els_ty {
                    locals.actual_ret = Ty::either(thn_ty.clone(), els_ty);
                }
                Ok(thn_ty)
            }
            Stmt::Assign {
                destruct,
                value,
                span,
            } => self.tc_assign(locals, destruct, *value, *span),
            Stmt::FieldAssign {
                obj,
                field,
                value,
                span,
            } => self.tc_field_assign(locals, *obj, field, *value, *span),
            Stmt::IndexAssign {
                obj,
                index,
                value,
                span,
            } => {
                let obj_ty = self.tc_expr(locals, *obj)?;
                let index_ty = self.tc_expr(locals, *index)?;
                let val_ty = self.tc_expr(locals, *value)?;
                let item_ty = match &obj_ty {
                    Ty::List(item) => (**item).clone(),
                    _ => {
                        return Err(TypeError::at(
                            format!("index assignment requires a list, got `{obj_ty}`"),
                            *span,
                        ))
                    }
                };
                if !equal_type(&index_ty, &Ty::Number) {
                    return Err(TypeError::at(
                        format!("list index must be of type `int`, got `{index_ty}`"),
                        *span,
                    ));
                }
                if !is_assignable(&self.env, &val_ty, &item_ty) {
                    return Err(TypeError::at(
                        format!("expected element type `{item_ty}`, got `{val_ty}`"),
                        *span,
                    ));
                }
                Ok(Ty::None)
            }
            Stmt::For {
                var,
                iter,
                body,
                span,
            } => self.tc_for(locals, var, *iter, body, *span),
        }
    }

    fn tc_assign(
        &mut self,
        locals: &mut LocalTypeEnv,
        destruct: &Destructure,
        value: ExprId,
        span: Span,
    ) -> Result<Ty, TypeError> {
        let program = self.program;
        self.tc_destructure(locals, destruct, span)?;
        let mut val_ty = self.tc_expr(locals, value)?;

        if destruct.is_simple {
            let target = destruct.targets[0].target;
            let target_ty = self.expr_types[target].clone();
            // A bare constructor call takes its type arguments from the
            // assignment target.
            if let Ty::Class(target_name, target_args) = &target_ty {
                if !target_args.is_empty()
                    && self.constructor_calls.get(value).is_some()
                    && matches!(&val_ty, Ty::Class(val_name, _) if val_name == target_name)
                {
                    self.expr_types.insert(value, target_ty.clone());
                    val_ty = target_ty.clone();
                }
            }
            if !is_assignable(&self.env, &val_ty, &target_ty) {
                return Err(TypeError::at(
                    format!(
                        "assignment value must be assignable to type `{target_ty}`, got `{val_ty}`"
                    ),
                    span,
                ));
            }
            return Ok(Ty::None);
        }

        if let Expr::Tuple { items, .. } = &program.exprs[value] {
            let star_idx = destruct.targets.iter().position(|t| t.star);
            match star_idx {
                None => {
                    if items.len() != destruct.targets.len() {
                        return Err(TypeError::at(
                            format!(
                                "expected {} values to unpack, got {}",
                                destruct.targets.len(),
                                items.len()
                            ),
                            span,
                        ));
                    }
                    for (tgt, &item) in destruct.targets.iter().zip(items) {
                        self.check_unpack_target(tgt, item, span)?;
                    }
                }
                Some(si) => {
                    if items.len() + 1 < destruct.targets.len() {
                        return Err(TypeError::at(
                            format!(
                                "expected at least {} values to unpack, got {}",
                                destruct.targets.len() - 1,
                                items.len()
                            ),
                            span,
                        ));
                    }
                    let tail = destruct.targets.len() - si - 1;
                    for i in 0..si {
                        self.check_unpack_target(&destruct.targets[i], items[i], span)?;
                    }
                    for j in 0..tail {
                        self.check_unpack_target(
                            &destruct.targets[si + 1 + j],
                            items[items.len() - tail + j],
                            span,
                        )?;
                    }
                }
            }
            return Ok(Ty::None);
        }

        if matches!(
            &program.exprs[value],
            Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Id { .. }
        ) {
            match &val_ty {
                Ty::Class(name, _) if name == "iterator" => {
                    let shape = self
                        .env
                        .class("iterator")
                        .map_err(|e| TypeError::at(e.message, span))?;
                    let next = shape.methods.get("next").ok_or_else(|| {
                        TypeError::at("class `iterator` has no `next` method", span)
                    })?;
                    let item_ty = next.ret.clone();
                    for tgt in &destruct.targets {
                        if tgt.ignorable {
                            continue;
                        }
                        let target_ty = self.expr_types[tgt.target].clone();
                        if !is_assignable(&self.env, &item_ty, &target_ty) {
                            return Err(TypeError::at(
                                format!(
                                    "cannot unpack values of type `{item_ty}` into target of type `{target_ty}`"
                                ),
                                span,
                            ));
                        }
                    }
                    Ok(Ty::None)
                }
                _ => Err(TypeError::at(
                    format!("cannot unpack non-iterable value of type `{val_ty}`"),
                    span,
                )),
            }
        } else {
            Err(TypeError::at("cannot unpack non-iterable value", span))
        }
    }

    fn check_unpack_target(
        &self,
        tgt: &AssignTarget,
        item: ExprId,
        span: Span,
    ) -> Result<(), TypeError> {
        if tgt.ignorable || tgt.star {
            return Ok(());
        }
        let item_ty = self.expr_types[item].clone();
        let target_ty = self.expr_types[tgt.target].clone();
        if !is_assignable(&self.env, &item_ty, &target_ty) {
            return Err(TypeError::at(
                format!(
                    "cannot assign value of type `{item_ty}` to target of type `{target_ty}`"
                ),
                span,
            ));
        }
        Ok(())
    }

    fn tc_destructure(
        &mut self,
        locals: &mut LocalTypeEnv,
        destruct: &Destructure,
        span: Span,
    ) -> Result<(), TypeError> {
        if destruct.is_simple {
            if destruct.targets.len() != 1 {
                return Err(TypeError::at(
                    format!(
                        "expected a single assignment target, got {}",
                        destruct.targets.len()
                    ),
                    span,
                ));
            }
            if destruct.targets[0].star {
                return Err(TypeError::at(
                    "starred assignment target must be in a list or tuple",
                    span,
                ));
            }
            self.tc_assign_target(locals, destruct.targets[0].target)?;
            return Ok(());
        }
        if destruct.targets.is_empty() {
            return Err(TypeError::at("cannot destructure into zero targets", span));
        }
        if destruct.targets.iter().filter(|t| t.star).count() > 1 {
            return Err(TypeError::at("multiple starred assignment targets", span));
        }
        for tgt in &destruct.targets {
            self.tc_assign_target(locals, tgt.target)?;
        }
        Ok(())
    }

    /// Types an assignment target and rejects anything but a plain name or a
    /// field of a class instance (and for fields, only the class's own
    /// fields).
    fn tc_assign_target(
        &mut self,
        locals: &mut LocalTypeEnv,
        id: ExprId,
    ) -> Result<Ty, TypeError> {
        let ty = self.tc_expr(locals, id)?;
        let program = self.program;
        match &program.exprs[id] {
            Expr::Id { .. } => Ok(ty),
            Expr::Lookup { obj, field, span } => {
                let obj_ty = self.expr_types[*obj].clone();
                match &obj_ty {
                    Ty::Class(name, _) => {
                        let shape = self
                            .env
                            .class(name)
                            .map_err(|e| TypeError::at(e.message, *span))?;
                        if !shape.fields.contains_key(field) {
                            return Err(TypeError::at(
                                format!("could not find field `{field}` in class `{name}`"),
                                *span,
                            ));
                        }
                        Ok(ty)
                    }
                    _ => Err(TypeError::at(
                        format!("cannot assign to field of non-class type `{obj_ty}`"),
                        *span,
                    )),
                }
            }
            other => Err(TypeError::at("invalid assignment target", other.span())),
        }
    }

    fn tc_field_assign(
        &mut self,
        locals: &mut LocalTypeEnv,
        obj: ExprId,
        field: &SmolStr,
        value: ExprId,
        span: Span,
    ) -> Result<Ty, TypeError> {
        let obj_ty = self.tc_expr(locals, obj)?;
        let mut val_ty = self.tc_expr(locals, value)?;
        let Ty::Class(name, args) = &obj_ty else {
            return Err(TypeError::at(
                format!("cannot assign to field of non-class type `{obj_ty}`"),
                span,
            ));
        };
        let mut fields = inherit::superclass_fields(&self.env, name, args)
            .map_err(|e| TypeError::at(e.message, span))?;
        let own = self
            .env
            .class(name)
            .map_err(|e| TypeError::at(e.message, span))?
            .fields
            .clone();
        fields.extend(own);
        let field_ty = fields.get(field).cloned().ok_or_else(|| {
            TypeError::at(
                format!("could not find field `{field}` in class `{name}`"),
                span,
            )
        })?;
        let field_ty = specialize_field_type(&self.env, &obj_ty, &field_ty)
            .map_err(|e| TypeError::at(e.message, span))?;
        if let Ty::Class(field_class, field_args) = &field_ty {
            if !field_args.is_empty()
                && self.constructor_calls.get(value).is_some()
                && matches!(&val_ty, Ty::Class(val_name, _) if val_name == field_class)
            {
                self.expr_types.insert(value, field_ty.clone());
                val_ty = field_ty.clone();
            }
        }
        if !is_assignable(&self.env, &val_ty, &field_ty) {
            return Err(TypeError::at(
                format!("field `{field}` expects type `{field_ty}`, got `{val_ty}`"),
                span,
            ));
        }
        Ok(Ty::None)
    }

    /// Checks a for loop. The loop variable must already be declared; the
    /// iterated value must be a class whose (own or inherited) methods
    /// satisfy the iterator protocol: `hasnext() -> bool`, `next()` with the
    /// loop variable's type, `reset() -> None`.
    fn tc_for(
        &mut self,
        locals: &mut LocalTypeEnv,
        var: &SmolStr,
        iter: ExprId,
        body: &[StmtId],
        span: Span,
    ) -> Result<Ty, TypeError> {
        let var_ty = locals
            .vars
            .get(var)
            .or_else(|| self.env.globals.get(var))
            .cloned()
            .ok_or_else(|| {
                TypeError::at(format!("undefined loop variable `{var}`"), span)
            })?;
        let obj_ty = self.tc_expr(locals, iter)?;
        let Ty::Class(name, args) = &obj_ty else {
            return Err(TypeError::at(
                format!("cannot iterate over non-class type `{obj_ty}`"),
                span,
            ));
        };
        let mut methods = inherit::superclass_methods(&self.env, name, args)
            .map_err(|e| TypeError::at(e.message, span))?;
        let own = self
            .env
            .class(name)
            .map_err(|e| TypeError::at(e.message, span))?
            .methods
            .clone();
        methods.extend(own);

        let missing = |method: &str| {
            TypeError::at(
                format!("class `{name}` used in a for loop must have a `{method}` method"),
                span,
            )
        };
        let hasnext = methods.get("hasnext").ok_or_else(|| missing("hasnext"))?;
        if !matches!(hasnext.ret, Ty::Bool) {
            return Err(TypeError::at(
                format!("`hasnext` of class `{name}` must return `bool`"),
                span,
            ));
        }
        let next = methods.get("next").ok_or_else(|| missing("next"))?;
        let next = specialize_method_type(&self.env, &obj_ty, next)
            .map_err(|e| TypeError::at(e.message, span))?;
        if !equal_type(&next.ret, &var_ty) {
            return Err(TypeError::at(
                format!(
                    "`next` of class `{name}` must return the loop variable's type `{var_ty}`, got `{}`",
                    next.ret
                ),
                span,
            ));
        }
        let reset = methods.get("reset").ok_or_else(|| missing("reset"))?;
        if !matches!(reset.ret, Ty::None) {
            return Err(TypeError::at(
                format!("`reset` of class `{name}` must return `None`"),
                span,
            ));
        }

        self.tc_block(locals, body)?;
        Ok(var_ty)
    }

    // ── Expressions ─────────────────────────────────────────────────────────

    fn tc_expr(&mut self, locals: &mut LocalTypeEnv, id: ExprId) -> Result<Ty, TypeError> {
        let ty = self.tc_expr_inner(locals, id)?;
        self.expr_types.insert(id, ty.clone());
        Ok(ty)
    }

    fn tc_expr_inner(&mut self, locals: &mut LocalTypeEnv, id: ExprId) -> Result<Ty, TypeError> {
        let program = self.program;
        match &program.exprs[id] {
            Expr::Literal { value, span } => literal_type(*value, *span),
            Expr::Id { name, span } => {
                if name == "_" {
                    return Ok(Ty::None);
                }
                locals
                    .vars
                    .get(name)
                    .or_else(|| self.env.globals.get(name))
                    .cloned()
                    .ok_or_else(|| {
                        TypeError::at(format!("unbound identifier `{name}`"), *span)
                    })
            }
            Expr::UnOp { op, operand, span } => {
                let ty = self.tc_expr(locals, *operand)?;
                match op {
                    UnOp::Neg if equal_type(&ty, &Ty::Number) => Ok(Ty::Number),
                    UnOp::Not if equal_type(&ty, &Ty::Bool) => Ok(Ty::Bool),
                    UnOp::Neg => Err(TypeError::at(
                        format!("unary `-` expects type `int`, got `{ty}`"),
                        *span,
                    )),
                    UnOp::Not => Err(TypeError::at(
                        format!("`not` expects type `bool`, got `{ty}`"),
                        *span,
                    )),
                }
            }
            Expr::BinOp {
                op,
                left,
                right,
                span,
            } => self.tc_binop(locals, *op, *left, *right, *span),
            Expr::IfExpr {
                cond,
                then,
                els,
                span,
            } => {
                let thn_ty = self.tc_expr(locals, *then)?;
                let cond_ty = self.tc_expr(locals, *cond)?;
                let els_ty = self.tc_expr(locals, *els)?;
                if !equal_type(&cond_ty, &Ty::Bool) {
                    return Err(TypeError::at(
                        format!("condition expression must be of type `bool`, got `{cond_ty}`"),
                        *span,
                    ));
                }
                if !equal_type(&thn_ty, &els_ty) {
                    return Err(TypeError::at(
                        format!(
                            "branches of a conditional expression must have the same type, got `{thn_ty}` and `{els_ty}`"
                        ),
                        *span,
                    ));
                }
                Ok(thn_ty)
            }
            Expr::Lambda {
                params,
                ty,
                body,
                span,
            } => {
                let Ty::Callable(param_tys, ret) = ty else {
                    return Err(TypeError::at(
                        "lambda requires a `callable` type annotation",
                        *span,
                    ));
                };
                if params.len() != param_tys.len() {
                    return Err(TypeError::at(
                        format!(
                            "lambda takes {} parameters but its type has {}",
                            params.len(),
                            param_tys.len()
                        ),
                        *span,
                    ));
                }
                let mut inner = locals.clone();
                for (name, param_ty) in params.iter().zip(param_tys) {
                    inner.vars.insert(name.clone(), param_ty.clone());
                }
                let body_ty = self.tc_expr(&mut inner, *body)?;
                if !is_assignable(&self.env, &body_ty, ret) {
                    return Err(TypeError::at(
                        format!("lambda body has type `{body_ty}`, expected `{ret}`"),
                        *span,
                    ));
                }
                Ok(ty.clone())
            }
            Expr::Call { callee, args, span } => {
                if let Expr::Id { name, .. } = &program.exprs[*callee] {
                    if self.env.classes.contains_key(name) {
                        return self.tc_constructor(id, name.clone(), args, *span);
                    }
                }
                let callee_ty = self.tc_expr(locals, *callee)?;
                let Ty::Callable(param_tys, ret) = &callee_ty else {
                    return Err(TypeError::at(
                        format!("cannot call non-callable value of type `{callee_ty}`"),
                        *span,
                    ));
                };
                let mut arg_tys = Vec::with_capacity(args.len());
                for &arg in args {
                    arg_tys.push(self.tc_expr(locals, arg)?);
                }
                let mut subst = Subst::new();
                let mut ok = param_tys.len() == arg_tys.len();
                if ok {
                    for (p, a) in param_tys.iter().zip(&arg_tys) {
                        if !infer::check_call_arg(&self.env, &mut subst, p, a)? {
                            ok = false;
                            break;
                        }
                    }
                }
                if !ok {
                    return Err(TypeError::at(
                        format!(
                            "function call expects arguments of types ({}), got ({})",
                            fmt_tys(param_tys),
                            fmt_tys(&arg_tys)
                        ),
                        *span,
                    ));
                }
                // At the top level an unbound generic return takes the
                // call-site binding when one exists.
                if locals.top_level {
                    if let Ty::TypeVar(name) = ret.as_ref() {
                        if let Some(bound) = subst.get(name) {
                            return Ok(bound.clone());
                        }
                    }
                }
                Ok((**ret).clone())
            }
            Expr::MethodCall {
                obj,
                method,
                args,
                span,
            } => self.tc_method_call(locals, *obj, method, args, *span),
            Expr::Lookup { obj, field, span } => {
                let obj_ty = self.tc_expr(locals, *obj)?;
                let Ty::Class(name, targs) = &obj_ty else {
                    return Err(TypeError::at(
                        format!("cannot access field `{field}` on non-class type `{obj_ty}`"),
                        *span,
                    ));
                };
                let own = self
                    .env
                    .class(name)
                    .map_err(|e| TypeError::at(e.message, *span))?
                    .fields
                    .get(field)
                    .cloned();
                let field_ty = match own {
                    Some(field_ty) => field_ty,
                    None => {
                        let inherited = inherit::superclass_fields(&self.env, name, targs)
                            .map_err(|e| TypeError::at(e.message, *span))?;
                        inherited.get(field).cloned().ok_or_else(|| {
                            TypeError::at(
                                format!("could not find field `{field}` in class `{name}`"),
                                *span,
                            )
                        })?
                    }
                };
                specialize_field_type(&self.env, &obj_ty, &field_ty)
                    .map_err(|e| TypeError::at(e.message, *span))
            }
            Expr::Index { obj, index, span } => {
                let obj_ty = self.tc_expr(locals, *obj)?;
                match obj_ty {
                    Ty::Empty => Ok(Ty::Empty),
                    Ty::List(item) => {
                        let index_ty = self.tc_expr(locals, *index)?;
                        if !equal_type(&index_ty, &Ty::Number) {
                            return Err(TypeError::at(
                                format!("list index must be of type `int`, got `{index_ty}`"),
                                *span,
                            ));
                        }
                        Ok(*item)
                    }
                    _ => Err(TypeError::at(
                        format!("cannot index into type `{obj_ty}`"),
                        *span,
                    )),
                }
            }
            Expr::Slice {
                obj,
                start,
                end,
                span,
            } => {
                let obj_ty = self.tc_expr(locals, *obj)?;
                match &obj_ty {
                    Ty::Empty => Ok(Ty::Empty),
                    Ty::List(_) => {
                        for &bound in start.iter().chain(end.iter()) {
                            let bound_ty = self.tc_expr(locals, bound)?;
                            if !equal_type(&bound_ty, &Ty::Number) {
                                return Err(TypeError::at(
                                    format!(
                                        "slice bound must be of type `int`, got `{bound_ty}`"
                                    ),
                                    *span,
                                ));
                            }
                        }
                        Ok(obj_ty.clone())
                    }
                    _ => Err(TypeError::at(
                        format!("cannot slice type `{obj_ty}`"),
                        *span,
                    )),
                }
            }
            Expr::ListLit { items, span } => {
                let mut item_tys = Vec::with_capacity(items.len());
                for &item in items {
                    item_tys.push(self.tc_expr(locals, item)?);
                }
                if item_tys.is_empty() {
                    return Ok(Ty::Empty);
                }
                // The first non-empty item fixes the element type.
                let elem = item_tys
                    .iter()
                    .find(|t| !matches!(t, Ty::Empty))
                    .cloned()
                    .unwrap_or(Ty::Empty);
                if !matches!(elem, Ty::Empty) {
                    for item_ty in &item_tys {
                        if !is_assignable(&self.env, item_ty, &elem) {
                            return Err(TypeError::at(
                                format!("list items must have type `{elem}`, got `{item_ty}`"),
                                *span,
                            ));
                        }
                    }
                }
                Ok(Ty::list(elem))
            }
            Expr::Tuple { items, .. } => {
                for &item in items {
                    self.tc_expr(locals, item)?;
                }
                Ok(Ty::None)
            }
            Expr::Builtin1 { name, arg, span } => {
                let arg_ty = self.tc_expr(locals, *arg)?;
                if name == "print" {
                    if matches!(arg_ty, Ty::Number | Ty::Bool | Ty::None) {
                        return Ok(arg_ty);
                    }
                    return Err(TypeError::at(
                        format!("`print` expects `int`, `bool`, or `None`, got `{arg_ty}`"),
                        *span,
                    ));
                }
                let sig = self.env.functions.get(name).cloned().ok_or_else(|| {
                    TypeError::at(format!("undefined builtin `{name}`"), *span)
                })?;
                let expected = sig.params.first().cloned().ok_or_else(|| {
                    TypeError::at(format!("builtin `{name}` takes no arguments"), *span)
                })?;
                if !is_assignable(&self.env, &arg_ty, &expected) {
                    return Err(TypeError::at(
                        format!("`{name}` expects `{expected}`, got `{arg_ty}`"),
                        *span,
                    ));
                }
                Ok(sig.ret)
            }
            Expr::Builtin2 {
                name,
                left,
                right,
                span,
            } => {
                let left_ty = self.tc_expr(locals, *left)?;
                let right_ty = self.tc_expr(locals, *right)?;
                let sig = self.env.functions.get(name).cloned().ok_or_else(|| {
                    TypeError::at(format!("undefined builtin `{name}`"), *span)
                })?;
                if sig.params.len() != 2 {
                    return Err(TypeError::at(
                        format!(
                            "builtin `{name}` expects {} arguments, got 2",
                            sig.params.len()
                        ),
                        *span,
                    ));
                }
                if !is_assignable(&self.env, &left_ty, &sig.params[0])
                    || !is_assignable(&self.env, &right_ty, &sig.params[1])
                {
                    return Err(TypeError::at(
                        format!(
                            "`{name}` expects (`{}`, `{}`), got (`{left_ty}`, `{right_ty}`)",
                            sig.params[0], sig.params[1]
                        ),
                        *span,
                    ));
                }
                Ok(sig.ret)
            }
        }
    }

    fn tc_binop(
        &mut self,
        locals: &mut LocalTypeEnv,
        op: BinOp,
        left: ExprId,
        right: ExprId,
        span: Span,
    ) -> Result<Ty, TypeError> {
        let left_ty = self.tc_expr(locals, left)?;
        let right_ty = self.tc_expr(locals, right)?;
        match op {
            // `+` doubles as list concatenation.
            BinOp::Add
                if matches!(left_ty, Ty::List(_) | Ty::Empty)
                    || matches!(right_ty, Ty::List(_) | Ty::Empty) =>
            {
                if matches!(left_ty, Ty::Empty) {
                    Ok(right_ty)
                } else if matches!(right_ty, Ty::Empty) {
                    Ok(left_ty)
                } else if equal_type(&left_ty, &right_ty) {
                    Ok(left_ty)
                } else {
                    Err(TypeError::at(
                        format!("cannot concatenate `{right_ty}` to `{left_ty}`"),
                        span,
                    ))
                }
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::IDiv | BinOp::Mod => {
                if equal_type(&left_ty, &Ty::Number) && equal_type(&right_ty, &Ty::Number) {
                    Ok(Ty::Number)
                } else {
                    Err(TypeError::at(
                        format!(
                            "operator `{}` expects type `int` on both sides, got `{left_ty}` and `{right_ty}`",
                            op.symbol()
                        ),
                        span,
                    ))
                }
            }
            BinOp::Eq | BinOp::Neq => {
                if left_ty.is_class() || right_ty.is_class() {
                    Err(TypeError::at(
                        format!("cannot apply operator `{}` on class types", op.symbol()),
                        span,
                    ))
                } else if matches!(left_ty, Ty::TypeVar(_)) || matches!(right_ty, Ty::TypeVar(_)) {
                    Err(TypeError::at(
                        format!(
                            "cannot apply operator `{}` on unconstrained type parameters",
                            op.symbol()
                        ),
                        span,
                    ))
                } else if equal_type(&left_ty, &right_ty) {
                    Ok(Ty::Bool)
                } else {
                    Err(TypeError::at(
                        format!(
                            "operator `{}` expects the same type on both sides, got `{left_ty}` and `{right_ty}`",
                            op.symbol()
                        ),
                        span,
                    ))
                }
            }
            BinOp::Lt | BinOp::Gt | BinOp::Lte | BinOp::Gte => {
                if equal_type(&left_ty, &Ty::Number) && equal_type(&right_ty, &Ty::Number) {
                    Ok(Ty::Bool)
                } else {
                    Err(TypeError::at(
                        format!(
                            "operator `{}` expects type `int` on both sides, got `{left_ty}` and `{right_ty}`",
                            op.symbol()
                        ),
                        span,
                    ))
                }
            }
            BinOp::And | BinOp::Or => {
                if equal_type(&left_ty, &Ty::Bool) && equal_type(&right_ty, &Ty::Bool) {
                    Ok(Ty::Bool)
                } else {
                    Err(TypeError::at(
                        format!(
                            "operator `{}` expects type `bool` on both sides, got `{left_ty}` and `{right_ty}`",
                            op.symbol()
                        ),
                        span,
                    ))
                }
            }
            BinOp::Is => {
                let identity_comparable =
                    |ty: &Ty| matches!(ty, Ty::None | Ty::Class(..) | Ty::Callable(..));
                if identity_comparable(&left_ty) && identity_comparable(&right_ty) {
                    Ok(Ty::Bool)
                } else {
                    Err(TypeError::at(
                        format!(
                            "operator `is` expects `None`, a class, or a callable on both sides, got `{left_ty}` and `{right_ty}`"
                        ),
                        span,
                    ))
                }
            }
        }
    }

    /// A call whose callee names a class is a constructor invocation: it is
    /// recorded in the resolution table, the argument count is checked
    /// against `__init__`, and the result is the bare class instance type
    /// (type arguments are filled in from the assignment target, if any).
    fn tc_constructor(
        &mut self,
        expr: ExprId,
        name: SmolStr,
        args: &[ExprId],
        span: Span,
    ) -> Result<Ty, TypeError> {
        self.constructor_calls.insert(expr, name.clone());
        let shape = self
            .env
            .class(&name)
            .map_err(|e| TypeError::at(e.message, span))?;
        if let Some(init) = shape.methods.get("__init__") {
            let expected = init.params.len().saturating_sub(1);
            if args.len() != expected {
                return Err(TypeError::at(
                    format!(
                        "constructor of class `{name}` expects {expected} arguments, got {}",
                        args.len()
                    ),
                    span,
                ));
            }
            if !matches!(init.ret, Ty::None) {
                return Err(TypeError::at(
                    format!("`__init__` of class `{name}` must return `None`"),
                    span,
                ));
            }
        }
        Ok(Ty::Class(name, Vec::new()))
    }

    fn tc_method_call(
        &mut self,
        locals: &mut LocalTypeEnv,
        obj: ExprId,
        method: &SmolStr,
        args: &[ExprId],
        span: Span,
    ) -> Result<Ty, TypeError> {
        let obj_ty = self.tc_expr(locals, obj)?;
        let mut arg_tys = Vec::with_capacity(args.len() + 1);
        arg_tys.push(obj_ty.clone());
        for &arg in args {
            arg_tys.push(self.tc_expr(locals, arg)?);
        }
        let Ty::Class(name, targs) = &obj_ty else {
            return Err(TypeError::at(
                format!("cannot call method `{method}` on non-class type `{obj_ty}`"),
                span,
            ));
        };

        let own = self
            .env
            .class(name)
            .map_err(|e| TypeError::at(e.message, span))?
            .methods
            .get(method)
            .cloned();
        if let Some(sig) = own {
            let sig = specialize_method_type(&self.env, &obj_ty, &sig)
                .map_err(|e| TypeError::at(e.message, span))?;
            let mut subst = Subst::new();
            let mut ok = sig.params.len() == arg_tys.len();
            if ok {
                for (p, a) in sig.params.iter().zip(&arg_tys) {
                    if !infer::check_call_arg(&self.env, &mut subst, p, a)? {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok {
                return Err(TypeError::at(
                    format!(
                        "method `{method}` expects arguments of types ({}), got ({})",
                        fmt_tys(&sig.params),
                        fmt_tys(&arg_tys)
                    ),
                    span,
                ));
            }
            return Ok(specialize_type(&subst, &sig.ret));
        }

        let inherited = inherit::superclass_methods(&self.env, name, targs)
            .map_err(|e| TypeError::at(e.message, span))?;
        let sig = inherited.get(method).ok_or_else(|| {
            TypeError::at(
                format!("could not find method `{method}` in class `{name}`"),
                span,
            )
        })?;
        let ok = sig.params.len() == arg_tys.len()
            && sig
                .params
                .iter()
                .zip(&arg_tys)
                .all(|(p, a)| is_assignable(&self.env, a, p));
        if !ok {
            return Err(TypeError::at(
                format!(
                    "method `{method}` expects arguments of types ({}), got ({})",
                    fmt_tys(&sig.params),
                    fmt_tys(&arg_tys)
                ),
                span,
            ));
        }
        Ok(sig.ret.clone())
    }
}
