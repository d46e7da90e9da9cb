use minipy_ast::{
    AssignTarget, BinOp, ClassDef, Destructure, Expr, ExprId, FunDef, Literal, Param, Program,
    Span, Stmt, StmtId, SuperRef, Ty, TypeVarInit, VarInit,
};

use crate::algebra::{equal_type, is_assignable};
use crate::{check, check_with_env, GlobalTypeEnv, TypeCheckResult, TypeError};

fn sp() -> Span {
    Span::new(0, 0)
}

fn typevar(p: &mut Program, name: &str) {
    p.typevars.push(TypeVarInit {
        name: name.into(),
        canonical_name: name.into(),
        span: sp(),
    });
}

fn global(p: &mut Program, name: &str, ty: Ty, value: Literal) {
    p.inits.push(VarInit {
        name: name.into(),
        ty,
        value,
        span: sp(),
    });
}

fn field(name: &str, ty: Ty, value: Literal) -> VarInit {
    VarInit {
        name: name.into(),
        ty,
        value,
        span: sp(),
    }
}

fn num(p: &mut Program, n: i64) -> ExprId {
    p.alloc_expr(Expr::Literal {
        value: Literal::Num(n),
        span: sp(),
    })
}

fn boolean(p: &mut Program, b: bool) -> ExprId {
    p.alloc_expr(Expr::Literal {
        value: Literal::Bool(b),
        span: sp(),
    })
}

fn none(p: &mut Program) -> ExprId {
    p.alloc_expr(Expr::Literal {
        value: Literal::None,
        span: sp(),
    })
}

fn id(p: &mut Program, name: &str) -> ExprId {
    p.alloc_expr(Expr::Id {
        name: name.into(),
        span: sp(),
    })
}

fn lookup(p: &mut Program, obj: ExprId, field: &str) -> ExprId {
    p.alloc_expr(Expr::Lookup {
        obj,
        field: field.into(),
        span: sp(),
    })
}

fn call(p: &mut Program, callee: ExprId, args: Vec<ExprId>) -> ExprId {
    p.alloc_expr(Expr::Call {
        callee,
        args,
        span: sp(),
    })
}

fn method_call(p: &mut Program, obj: ExprId, method: &str, args: Vec<ExprId>) -> ExprId {
    p.alloc_expr(Expr::MethodCall {
        obj,
        method: method.into(),
        args,
        span: sp(),
    })
}

fn binop(p: &mut Program, op: BinOp, left: ExprId, right: ExprId) -> ExprId {
    p.alloc_expr(Expr::BinOp {
        op,
        left,
        right,
        span: sp(),
    })
}

fn expr_stmt(p: &mut Program, expr: ExprId) -> StmtId {
    p.alloc_stmt(Stmt::Expr { expr, span: sp() })
}

fn ret_stmt(p: &mut Program, value: ExprId) -> StmtId {
    p.alloc_stmt(Stmt::Return {
        value,
        span: sp(),
    })
}

fn pass_stmt(p: &mut Program) -> StmtId {
    p.alloc_stmt(Stmt::Pass { span: sp() })
}

fn simple_assign(p: &mut Program, target: ExprId, value: ExprId) -> StmtId {
    p.alloc_stmt(Stmt::Assign {
        destruct: Destructure {
            is_simple: true,
            targets: vec![AssignTarget {
                target,
                star: false,
                ignorable: false,
            }],
        },
        value,
        span: sp(),
    })
}

fn fun(name: &str, params: Vec<(&str, Ty)>, ret: Ty, body: Vec<StmtId>) -> FunDef {
    FunDef {
        name: name.into(),
        params: params
            .into_iter()
            .map(|(n, ty)| Param { name: n.into(), ty })
            .collect(),
        ret,
        inits: Vec::new(),
        nonlocals: Vec::new(),
        children: Vec::new(),
        body,
        span: sp(),
    }
}

/// The `__init__(self: C[..]) -> None` the parser always supplies.
fn init_method(class_name: &str, type_params: &[&str]) -> FunDef {
    let self_ty = Ty::Class(
        class_name.into(),
        type_params.iter().map(|t| Ty::class(*t)).collect(),
    );
    fun("__init__", vec![("self", self_ty)], Ty::None, Vec::new())
}

fn class(
    name: &str,
    type_params: &[&str],
    supers: Vec<SuperRef>,
    fields: Vec<VarInit>,
    mut methods: Vec<FunDef>,
) -> ClassDef {
    methods.insert(0, init_method(name, type_params));
    ClassDef {
        name: name.into(),
        type_params: type_params.iter().map(|t| (*t).into()).collect(),
        supers,
        fields,
        methods,
        span: sp(),
    }
}

fn super_ref(name: &str, args: &[&str]) -> SuperRef {
    SuperRef {
        name: name.into(),
        args: args.iter().map(|a| (*a).into()).collect(),
    }
}

fn check_ok(p: &Program) -> TypeCheckResult {
    match check(p) {
        Ok(result) => result,
        Err(err) => panic!("expected program to check, got: {err}"),
    }
}

fn check_err(p: &Program) -> TypeError {
    match check(p) {
        Ok(_) => panic!("expected a type error"),
        Err(err) => err,
    }
}

/// `class Box[T]: x: T = __ZERO__` with a `get` method, plus extra methods.
fn generic_box(p: &mut Program, extra_methods: Vec<FunDef>) {
    typevar(p, "T");
    let self_x = {
        let s = id(p, "self");
        lookup(p, s, "x")
    };
    let get_body = ret_stmt(p, self_x);
    let mut methods = vec![fun(
        "get",
        vec![("self", Ty::class_with("Box", vec![Ty::class("T")]))],
        Ty::class("T"),
        vec![get_body],
    )];
    methods.extend(extra_methods);
    p.classes.push(class(
        "Box",
        &["T"],
        vec![super_ref("object", &[])],
        vec![field("x", Ty::class("T"), Literal::Zero)],
        methods,
    ));
}

// ── Environment construction ────────────────────────────────────────────────

#[test]
fn typevar_declaration_extends_env() {
    let mut p = Program::new();
    typevar(&mut p, "T");
    let result = check_ok(&p);
    assert_eq!(result.env.typevars.get("T").map(|s| s.as_str()), Some("T"));
}

#[test]
fn duplicate_typevar_rejected() {
    let mut p = Program::new();
    typevar(&mut p, "T");
    typevar(&mut p, "T");
    let err = check_err(&p);
    assert!(err.message.contains("duplicate identifier"), "{err}");
}

#[test]
fn typevar_colliding_with_global_rejected() {
    let mut p = Program::new();
    global(&mut p, "T", Ty::Number, Literal::Num(0));
    typevar(&mut p, "T");
    let err = check_err(&p);
    assert!(err.message.contains("duplicate identifier"), "{err}");
}

#[test]
fn undeclared_superclass_rejected() {
    let mut p = Program::new();
    p.classes.push(class(
        "B",
        &[],
        vec![super_ref("Missing", &[])],
        Vec::new(),
        Vec::new(),
    ));
    let err = check_err(&p);
    assert!(err.message.contains("undeclared superclass"), "{err}");
}

// ── Generic-parameter resolution ────────────────────────────────────────────

#[test]
fn class_type_params_resolve_to_typevars() {
    let mut p = Program::new();
    generic_box(&mut p, Vec::new());
    let result = check_ok(&p);
    let shape = &result.env.classes["Box"];
    assert_eq!(shape.fields["x"], Ty::typevar("T"));
    assert_eq!(shape.methods["get"].ret, Ty::typevar("T"));
    assert_eq!(
        shape.methods["get"].params,
        vec![Ty::class_with("Box", vec![Ty::typevar("T")])]
    );
}

#[test]
fn undeclared_class_type_param_rejected() {
    let mut p = Program::new();
    p.classes.push(class(
        "Box",
        &["T"],
        Vec::new(),
        vec![field("x", Ty::class("T"), Literal::Zero)],
        Vec::new(),
    ));
    let err = check_err(&p);
    assert!(err.message.contains("undeclared type variable"), "{err}");
}

#[test]
fn superclass_type_argument_arity_checked() {
    let mut p = Program::new();
    typevar(&mut p, "T");
    p.classes.push(class(
        "Base",
        &["T"],
        Vec::new(),
        vec![field("x", Ty::class("T"), Literal::Zero)],
        Vec::new(),
    ));
    p.classes.push(class(
        "Sub",
        &[],
        vec![super_ref("Base", &[])],
        Vec::new(),
        Vec::new(),
    ));
    let err = check_err(&p);
    assert!(err.message.contains("wrong number of type arguments"), "{err}");
}

#[test]
fn generic_function_signature_resolves() {
    let mut p = Program::new();
    typevar(&mut p, "T");
    let x = id(&mut p, "x");
    let body = ret_stmt(&mut p, x);
    p.funs.push(fun(
        "identity",
        vec![("x", Ty::class("T"))],
        Ty::class("T"),
        vec![body],
    ));
    let result = check_ok(&p);
    assert_eq!(
        result.env.globals["identity"],
        Ty::callable(vec![Ty::typevar("T")], Ty::typevar("T"))
    );
}

// ── Declarations ────────────────────────────────────────────────────────────

#[test]
fn generic_field_requires_zero_initializer() {
    let mut p = Program::new();
    typevar(&mut p, "T");
    p.classes.push(class(
        "Box",
        &["T"],
        Vec::new(),
        vec![field("x", Ty::class("T"), Literal::None)],
        Vec::new(),
    ));
    let err = check_err(&p);
    assert!(err.message.contains("__ZERO__"), "{err}");
}

#[test]
fn zero_rejected_for_concrete_types() {
    let mut p = Program::new();
    global(&mut p, "x", Ty::Number, Literal::Zero);
    let err = check_err(&p);
    assert!(err.message.contains("__ZERO__"), "{err}");
}

#[test]
fn annotation_arity_validated() {
    let mut p = Program::new();
    generic_box(&mut p, Vec::new());
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Number, Ty::Bool]),
        Literal::None,
    );
    let err = check_err(&p);
    assert!(err.message.contains("invalid type annotation"), "{err}");
}

#[test]
fn missing_init_rejected() {
    let mut p = Program::new();
    p.classes.push(ClassDef {
        name: "C".into(),
        type_params: Vec::new(),
        supers: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
        span: sp(),
    });
    let err = check_err(&p);
    assert!(err.message.contains("__init__"), "{err}");
}

#[test]
fn init_signature_enforced() {
    let mut p = Program::new();
    let bad_init = fun(
        "__init__",
        vec![("self", Ty::class("C")), ("x", Ty::Number)],
        Ty::None,
        Vec::new(),
    );
    p.classes.push(ClassDef {
        name: "C".into(),
        type_params: Vec::new(),
        supers: Vec::new(),
        fields: Vec::new(),
        methods: vec![bad_init],
        span: sp(),
    });
    let err = check_err(&p);
    assert!(err.message.contains("single parameter `self`"), "{err}");
}

#[test]
fn inherited_field_redefinition_rejected() {
    let mut p = Program::new();
    p.classes.push(class(
        "A",
        &[],
        Vec::new(),
        vec![field("x", Ty::Number, Literal::Num(0))],
        Vec::new(),
    ));
    p.classes.push(class(
        "B",
        &[],
        vec![super_ref("A", &[])],
        vec![field("x", Ty::Number, Literal::Num(0))],
        Vec::new(),
    ));
    let err = check_err(&p);
    assert!(err.message.contains("redefines an inherited field"), "{err}");
}

// ── Inheritance and member resolution ───────────────────────────────────────

#[test]
fn subclass_assignable_to_superclass() {
    let mut p = Program::new();
    p.classes
        .push(class("A", &[], Vec::new(), Vec::new(), Vec::new()));
    p.classes.push(class(
        "B",
        &[],
        vec![super_ref("A", &[])],
        Vec::new(),
        Vec::new(),
    ));
    let result = check_ok(&p);
    assert!(is_assignable(&result.env, &Ty::class("B"), &Ty::class("A")));
    assert!(!is_assignable(&result.env, &Ty::class("A"), &Ty::class("B")));
    assert!(is_assignable(&result.env, &Ty::None, &Ty::class("A")));
}

#[test]
fn superclass_type_arguments_reorder_through_hierarchy() {
    // class SuperBox[T, V] has a field sv: V; class Box[T, U, V] extends
    // SuperBox[T, U], so for Box[int, bool, bool] the field sv is bool.
    let mut p = Program::new();
    typevar(&mut p, "T");
    typevar(&mut p, "U");
    typevar(&mut p, "V");
    p.classes.push(class(
        "SuperBox",
        &["T", "V"],
        Vec::new(),
        vec![field("sv", Ty::class("V"), Literal::Zero)],
        Vec::new(),
    ));
    p.classes.push(class(
        "Box",
        &["T", "U", "V"],
        vec![super_ref("SuperBox", &["T", "U"])],
        vec![field("bx", Ty::class("T"), Literal::Zero)],
        Vec::new(),
    ));
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Number, Ty::Bool, Ty::Bool]),
        Literal::None,
    );
    let b = id(&mut p, "b");
    let b_sv = lookup(&mut p, b, "sv");
    let stmt = expr_stmt(&mut p, b_sv);
    p.body.push(stmt);

    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(b_sv), Some(&Ty::Bool));
    assert_eq!(result.last_type, Ty::Bool);
}

#[test]
fn inherited_method_callable_on_subclass() {
    let mut p = Program::new();
    let zero = num(&mut p, 0);
    let ret = ret_stmt(&mut p, zero);
    p.classes.push(class(
        "A",
        &[],
        Vec::new(),
        Vec::new(),
        vec![fun(
            "value",
            vec![("self", Ty::class("A"))],
            Ty::Number,
            vec![ret],
        )],
    ));
    p.classes.push(class(
        "B",
        &[],
        vec![super_ref("A", &[])],
        Vec::new(),
        Vec::new(),
    ));
    global(&mut p, "b", Ty::class("B"), Literal::None);
    let b = id(&mut p, "b");
    let call_expr = method_call(&mut p, b, "value", Vec::new());
    let stmt = expr_stmt(&mut p, call_expr);
    p.body.push(stmt);

    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(call_expr), Some(&Ty::Number));
}

#[test]
fn missing_member_reported() {
    let mut p = Program::new();
    p.classes
        .push(class("A", &[], Vec::new(), Vec::new(), Vec::new()));
    global(&mut p, "a", Ty::class("A"), Literal::None);
    let a = id(&mut p, "a");
    let bad = lookup(&mut p, a, "nope");
    let stmt = expr_stmt(&mut p, bad);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("could not find field `nope`"), "{err}");
}

// ── Generic inference ───────────────────────────────────────────────────────

#[test]
fn constructor_call_takes_type_arguments_from_target() {
    let mut p = Program::new();
    generic_box(&mut p, Vec::new());
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Number]),
        Literal::None,
    );
    let target = id(&mut p, "b");
    let box_id = id(&mut p, "Box");
    let ctor = call(&mut p, box_id, Vec::new());
    let stmt = simple_assign(&mut p, target, ctor);
    p.body.push(stmt);

    let result = check_ok(&p);
    assert_eq!(result.constructor_calls.get(ctor).map(|s| s.as_str()), Some("Box"));
    assert_eq!(
        result.expr_types.get(ctor),
        Some(&Ty::class_with("Box", vec![Ty::Number]))
    );
}

#[test]
fn field_lookup_specializes_to_type_arguments() {
    let mut p = Program::new();
    generic_box(&mut p, Vec::new());
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Number]),
        Literal::None,
    );
    let b = id(&mut p, "b");
    let b_x = lookup(&mut p, b, "x");
    let stmt = expr_stmt(&mut p, b_x);
    p.body.push(stmt);

    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(b_x), Some(&Ty::Number));
}

#[test]
fn method_typevars_inferred_per_call() {
    let mut p = Program::new();
    let y = id(&mut p, "y");
    let bar_body = ret_stmt(&mut p, y);
    let bar = fun(
        "bar",
        vec![
            ("self", Ty::class_with("Box", vec![Ty::class("T")])),
            ("y", Ty::class("U")),
        ],
        Ty::class("U"),
        vec![bar_body],
    );
    generic_box(&mut p, vec![bar]);
    typevar(&mut p, "U");
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Bool]),
        Literal::None,
    );
    let b1 = id(&mut p, "b");
    let t = boolean(&mut p, true);
    let call_bool = method_call(&mut p, b1, "bar", vec![t]);
    let s1 = expr_stmt(&mut p, call_bool);
    p.body.push(s1);
    let b2 = id(&mut p, "b");
    let one = num(&mut p, 1);
    let call_num = method_call(&mut p, b2, "bar", vec![one]);
    let s2 = expr_stmt(&mut p, call_num);
    p.body.push(s2);

    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(call_bool), Some(&Ty::Bool));
    assert_eq!(result.expr_types.get(call_num), Some(&Ty::Number));
}

#[test]
fn generic_function_inferred_at_top_level() {
    let mut p = Program::new();
    typevar(&mut p, "T");
    let x = id(&mut p, "x");
    let body = ret_stmt(&mut p, x);
    p.funs.push(fun(
        "identity",
        vec![("x", Ty::class("T"))],
        Ty::class("T"),
        vec![body],
    ));
    let f = id(&mut p, "identity");
    let five = num(&mut p, 5);
    let call_expr = call(&mut p, f, vec![five]);
    let stmt = expr_stmt(&mut p, call_expr);
    p.body.push(stmt);

    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(call_expr), Some(&Ty::Number));
    assert_eq!(result.last_type, Ty::Number);
}

#[test]
fn generic_method_receiver_specialized() {
    let mut p = Program::new();
    generic_box(&mut p, Vec::new());
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Number]),
        Literal::None,
    );
    let b = id(&mut p, "b");
    let get = method_call(&mut p, b, "get", Vec::new());
    let stmt = expr_stmt(&mut p, get);
    p.body.push(stmt);

    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(get), Some(&Ty::Number));
}

// ── Operators ───────────────────────────────────────────────────────────────

#[test]
fn equality_on_classes_rejected() {
    let mut p = Program::new();
    p.classes
        .push(class("A", &[], Vec::new(), Vec::new(), Vec::new()));
    global(&mut p, "a", Ty::class("A"), Literal::None);
    let l = id(&mut p, "a");
    let r = id(&mut p, "a");
    let cmp = binop(&mut p, BinOp::Eq, l, r);
    let stmt = expr_stmt(&mut p, cmp);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("on class types"), "{err}");
}

#[test]
fn is_on_type_parameter_rejected() {
    let mut p = Program::new();
    let l = {
        let s = id(&mut p, "self");
        lookup(&mut p, s, "x")
    };
    let r = {
        let s = id(&mut p, "self");
        lookup(&mut p, s, "x")
    };
    let cmp = binop(&mut p, BinOp::Is, l, r);
    let body = expr_stmt(&mut p, cmp);
    let probe = fun(
        "probe",
        vec![("self", Ty::class_with("Box", vec![Ty::class("T")]))],
        Ty::None,
        vec![body],
    );
    generic_box(&mut p, vec![probe]);
    let err = check_err(&p);
    assert!(err.message.contains("operator `is`"), "{err}");
}

#[test]
fn is_on_instances_allowed() {
    let mut p = Program::new();
    p.classes
        .push(class("A", &[], Vec::new(), Vec::new(), Vec::new()));
    global(&mut p, "a", Ty::class("A"), Literal::None);
    let l = id(&mut p, "a");
    let r = none(&mut p);
    let cmp = binop(&mut p, BinOp::Is, l, r);
    let stmt = expr_stmt(&mut p, cmp);
    p.body.push(stmt);
    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(cmp), Some(&Ty::Bool));
}

#[test]
fn arithmetic_requires_numbers() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let t = boolean(&mut p, true);
    let sum = binop(&mut p, BinOp::Add, one, t);
    let stmt = expr_stmt(&mut p, sum);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("expects type `int`"), "{err}");
}

#[test]
fn list_concatenation() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let left = p.alloc_expr(Expr::ListLit {
        items: vec![one],
        span: sp(),
    });
    let right = p.alloc_expr(Expr::ListLit {
        items: Vec::new(),
        span: sp(),
    });
    let cat = binop(&mut p, BinOp::Add, left, right);
    let stmt = expr_stmt(&mut p, cat);
    p.body.push(stmt);
    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(cat), Some(&Ty::list(Ty::Number)));
}

#[test]
fn mismatched_list_concatenation_rejected() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let t = boolean(&mut p, true);
    let left = p.alloc_expr(Expr::ListLit {
        items: vec![one],
        span: sp(),
    });
    let right = p.alloc_expr(Expr::ListLit {
        items: vec![t],
        span: sp(),
    });
    let cat = binop(&mut p, BinOp::Add, left, right);
    let stmt = expr_stmt(&mut p, cat);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("cannot concatenate"), "{err}");
}

// ── Statements ──────────────────────────────────────────────────────────────

#[test]
fn return_outside_function_rejected() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let stmt = ret_stmt(&mut p, one);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("cannot return"), "{err}");
}

#[test]
fn condition_must_be_bool() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let body = pass_stmt(&mut p);
    let stmt = p.alloc_stmt(Stmt::If {
        cond: one,
        then_body: vec![body],
        else_body: Vec::new(),
        span: sp(),
    });
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("must be of type `bool`"), "{err}");
}

#[test]
fn diverging_branch_returns_rejected() {
    // Only one branch returns, so the tracked return type becomes an
    // `either` and fails the function's return check.
    let mut p = Program::new();
    let cond = boolean(&mut p, true);
    let one = num(&mut p, 1);
    let then_ret = ret_stmt(&mut p, one);
    let else_pass = pass_stmt(&mut p);
    let if_stmt = p.alloc_stmt(Stmt::If {
        cond,
        then_body: vec![then_ret],
        else_body: vec![else_pass],
        span: sp(),
    });
    p.funs.push(fun("f", Vec::new(), Ty::Number, vec![if_stmt]));
    let err = check_err(&p);
    assert!(err.message.contains("expected return type"), "{err}");
}

#[test]
fn tuple_destructuring() {
    let mut p = Program::new();
    global(&mut p, "a", Ty::Number, Literal::Num(0));
    global(&mut p, "b", Ty::Bool, Literal::Bool(false));
    let one = num(&mut p, 1);
    let t = boolean(&mut p, true);
    let tuple = p.alloc_expr(Expr::Tuple {
        items: vec![one, t],
        span: sp(),
    });
    let ta = id(&mut p, "a");
    let tb = id(&mut p, "b");
    let stmt = p.alloc_stmt(Stmt::Assign {
        destruct: Destructure {
            is_simple: false,
            targets: vec![
                AssignTarget {
                    target: ta,
                    star: false,
                    ignorable: false,
                },
                AssignTarget {
                    target: tb,
                    star: false,
                    ignorable: false,
                },
            ],
        },
        value: tuple,
        span: sp(),
    });
    p.body.push(stmt);
    check_ok(&p);
}

#[test]
fn tuple_destructuring_arity_mismatch_rejected() {
    let mut p = Program::new();
    global(&mut p, "a", Ty::Number, Literal::Num(0));
    let one = num(&mut p, 1);
    let two = num(&mut p, 2);
    let tuple = p.alloc_expr(Expr::Tuple {
        items: vec![one, two],
        span: sp(),
    });
    let ta = id(&mut p, "a");
    let stmt = p.alloc_stmt(Stmt::Assign {
        destruct: Destructure {
            is_simple: false,
            targets: vec![AssignTarget {
                target: ta,
                star: false,
                ignorable: false,
            }],
        },
        value: tuple,
        span: sp(),
    });
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("values to unpack"), "{err}");
}

#[test]
fn for_loop_over_iterator_protocol() {
    let mut p = Program::new();
    let f = boolean(&mut p, false);
    let hasnext_ret = ret_stmt(&mut p, f);
    let zero = num(&mut p, 0);
    let next_ret = ret_stmt(&mut p, zero);
    p.classes.push(class(
        "Range",
        &[],
        Vec::new(),
        Vec::new(),
        vec![
            fun(
                "hasnext",
                vec![("self", Ty::class("Range"))],
                Ty::Bool,
                vec![hasnext_ret],
            ),
            fun(
                "next",
                vec![("self", Ty::class("Range"))],
                Ty::Number,
                vec![next_ret],
            ),
            fun(
                "reset",
                vec![("self", Ty::class("Range"))],
                Ty::None,
                Vec::new(),
            ),
        ],
    ));
    global(&mut p, "i", Ty::Number, Literal::Num(0));
    global(&mut p, "r", Ty::class("Range"), Literal::None);
    let r = id(&mut p, "r");
    let body = pass_stmt(&mut p);
    let loop_stmt = p.alloc_stmt(Stmt::For {
        var: "i".into(),
        iter: r,
        body: vec![body],
        span: sp(),
    });
    p.body.push(loop_stmt);

    let result = check_ok(&p);
    assert_eq!(result.stmt_types.get(loop_stmt), Some(&Ty::Number));
}

#[test]
fn for_loop_requires_full_protocol() {
    let mut p = Program::new();
    let f = boolean(&mut p, false);
    let hasnext_ret = ret_stmt(&mut p, f);
    p.classes.push(class(
        "Broken",
        &[],
        Vec::new(),
        Vec::new(),
        vec![fun(
            "hasnext",
            vec![("self", Ty::class("Broken"))],
            Ty::Bool,
            vec![hasnext_ret],
        )],
    ));
    global(&mut p, "i", Ty::Number, Literal::Num(0));
    global(&mut p, "b", Ty::class("Broken"), Literal::None);
    let b = id(&mut p, "b");
    let body = pass_stmt(&mut p);
    let loop_stmt = p.alloc_stmt(Stmt::For {
        var: "i".into(),
        iter: b,
        body: vec![body],
        span: sp(),
    });
    p.body.push(loop_stmt);
    let err = check_err(&p);
    assert!(err.message.contains("`next` method"), "{err}");
}

// ── Functions, lambdas, builtins ────────────────────────────────────────────

#[test]
fn nested_function_reads_nonlocal() {
    let mut p = Program::new();
    let x = id(&mut p, "x");
    let helper_body = ret_stmt(&mut p, x);
    let mut helper = fun("helper", Vec::new(), Ty::Number, vec![helper_body]);
    helper.nonlocals.push("x".into());
    let h = id(&mut p, "helper");
    let call_helper = call(&mut p, h, Vec::new());
    let outer_ret = ret_stmt(&mut p, call_helper);
    let mut outer = fun("outer", vec![("x", Ty::Number)], Ty::Number, vec![outer_ret]);
    outer.children.push(helper);
    p.funs.push(outer);
    check_ok(&p);
}

#[test]
fn lambda_checked_against_annotation() {
    let mut p = Program::new();
    let n = id(&mut p, "n");
    let lam = p.alloc_expr(Expr::Lambda {
        params: vec!["n".into()],
        ty: Ty::callable(vec![Ty::Number], Ty::Number),
        body: n,
        span: sp(),
    });
    let stmt = expr_stmt(&mut p, lam);
    p.body.push(stmt);
    let result = check_ok(&p);
    assert_eq!(
        result.expr_types.get(lam),
        Some(&Ty::callable(vec![Ty::Number], Ty::Number))
    );
}

#[test]
fn lambda_body_must_match_return() {
    let mut p = Program::new();
    let t = boolean(&mut p, true);
    let lam = p.alloc_expr(Expr::Lambda {
        params: vec!["n".into()],
        ty: Ty::callable(vec![Ty::Number], Ty::Number),
        body: t,
        span: sp(),
    });
    let stmt = expr_stmt(&mut p, lam);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("lambda body"), "{err}");
}

#[test]
fn print_echoes_scalar_argument_type() {
    let mut p = Program::new();
    let t = boolean(&mut p, true);
    let call_expr = p.alloc_expr(Expr::Builtin1 {
        name: "print".into(),
        arg: t,
        span: sp(),
    });
    let stmt = expr_stmt(&mut p, call_expr);
    p.body.push(stmt);
    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(call_expr), Some(&Ty::Bool));
}

#[test]
fn print_rejects_lists() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let list = p.alloc_expr(Expr::ListLit {
        items: vec![one],
        span: sp(),
    });
    let call_expr = p.alloc_expr(Expr::Builtin1 {
        name: "print".into(),
        arg: list,
        span: sp(),
    });
    let stmt = expr_stmt(&mut p, call_expr);
    p.body.push(stmt);
    let err = check_err(&p);
    assert!(err.message.contains("print"), "{err}");
}

#[test]
fn two_argument_builtin() {
    let mut p = Program::new();
    let one = num(&mut p, 1);
    let two = num(&mut p, 2);
    let call_expr = p.alloc_expr(Expr::Builtin2 {
        name: "max".into(),
        left: one,
        right: two,
        span: sp(),
    });
    let stmt = expr_stmt(&mut p, call_expr);
    p.body.push(stmt);
    let result = check_ok(&p);
    assert_eq!(result.expr_types.get(call_expr), Some(&Ty::Number));
}

// ── Whole-run properties ────────────────────────────────────────────────────

#[test]
fn checking_is_idempotent() {
    let mut p = Program::new();
    generic_box(&mut p, Vec::new());
    global(
        &mut p,
        "b",
        Ty::class_with("Box", vec![Ty::Number]),
        Literal::None,
    );
    let target = id(&mut p, "b");
    let box_id = id(&mut p, "Box");
    let ctor = call(&mut p, box_id, Vec::new());
    let assign = simple_assign(&mut p, target, ctor);
    p.body.push(assign);
    let b = id(&mut p, "b");
    let b_x = lookup(&mut p, b, "x");
    let stmt = expr_stmt(&mut p, b_x);
    p.body.push(stmt);

    let first = check_ok(&p);
    let second = check_ok(&p);
    let a: Vec<_> = first.expr_types.iter().collect();
    let b: Vec<_> = second.expr_types.iter().collect();
    assert_eq!(a, b);
    assert_eq!(first.last_type, second.last_type);
}

#[test]
fn top_level_variables_fold_into_env() {
    let mut p1 = Program::new();
    global(&mut p1, "x", Ty::Number, Literal::Num(1));
    let first = check_ok(&p1);

    let mut p2 = Program::new();
    let x = id(&mut p2, "x");
    let stmt = expr_stmt(&mut p2, x);
    p2.body.push(stmt);
    let second = match check_with_env(&p2, first.env) {
        Ok(result) => result,
        Err(err) => panic!("incremental check failed: {err}"),
    };
    assert_eq!(second.last_type, Ty::Number);
}

#[test]
fn assignability_basics() {
    let env = GlobalTypeEnv::with_defaults();
    assert!(is_assignable(&env, &Ty::Number, &Ty::Number));
    assert!(is_assignable(&env, &Ty::Empty, &Ty::list(Ty::Number)));
    assert!(is_assignable(&env, &Ty::None, &Ty::list(Ty::Number)));
    assert!(is_assignable(
        &env,
        &Ty::None,
        &Ty::callable(vec![], Ty::None)
    ));
    assert!(!is_assignable(&env, &Ty::Number, &Ty::Bool));
    assert!(!is_assignable(&env, &Ty::list(Ty::Number), &Ty::Number));
    assert!(equal_type(&Ty::Empty, &Ty::list(Ty::Bool)));
    assert!(!equal_type(&Ty::typevar("T"), &Ty::typevar("U")));
}
