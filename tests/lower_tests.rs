mod common;

use classfile_transpiler::code::{ConstOperand, Instruction};
use classfile_transpiler::descriptor::JavaType;
use classfile_transpiler::error::TranspileError;
use classfile_transpiler::lower;
use classfile_transpiler::lower::tir::{Local, LocalKind, TirExpr, TirStatement};
use classfile_transpiler::method_info::MethodAccessFlags;
use classfile_transpiler::model::ProgramModel;
use classfile_transpiler::resolve;

use common::asm::*;
use common::*;

/// Resolve and lower, returning the program.
fn lowered(mut p: ProgramModel) -> ProgramModel {
    resolve::resolve(&mut p, &test_config()).expect("links");
    lower::lower_program(&mut p).expect("lowers");
    p
}

fn body_of<'a>(
    p: &'a ProgramModel,
    class: &str,
    name: &str,
    descriptor: &str,
) -> &'a classfile_transpiler::lower::tir::TirBody {
    p.class(class)
        .unwrap()
        .find_method(name, descriptor)
        .unwrap()
        .tir
        .as_ref()
        .expect("body lowered")
}

fn count_statements(
    body: &classfile_transpiler::lower::tir::TirBody,
    pred: impl Fn(&TirStatement) -> bool,
) -> usize {
    body.statements.iter().filter(|s| pred(s)).count()
}

// ---- S6: constant folding ----

#[test]
fn test_constant_fold_add_to_single_return() {
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "five",
        "()I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, iconst(2)),
            at(1, iconst(3)),
            at(2, iadd()),
            at(3, ireturn()),
        ],
    ));
    let p = lowered(program(vec![a]));
    let body = body_of(&p, "pkg/A", "five", "()I");
    assert_eq!(body.statements.len(), 1, "exactly one statement, no temporaries");
    assert_eq!(
        body.statements[0],
        TirStatement::Return(Some(TirExpr::Const(ConstOperand::Int(5))))
    );
}

// ---- Property 4/5: stack flush and type merge at joins ----

#[test]
fn test_stack_flushed_at_join() {
    // return x == 0 ? 2 : 1, with the value merged across the branch
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "pick",
        "(I)I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, iload(0)),
            at(
                1,
                Instruction::IfZero {
                    op: classfile_transpiler::code::CompareOp::Eq,
                    target: 8,
                },
            ),
            at(4, iconst(1)),
            at(5, Instruction::Goto { target: 9 }),
            at(8, iconst(2)),
            at(9, ireturn()),
        ],
    ));
    let p = lowered(program(vec![a]));
    let body = body_of(&p, "pkg/A", "pick", "(I)I");

    // The return must read a flushed synthetic local, not a raw constant.
    let ret = body
        .statements
        .iter()
        .find_map(|s| match s {
            TirStatement::Return(Some(e)) => Some(e),
            _ => None,
        })
        .expect("return present");
    match ret {
        TirExpr::Local(Local {
            kind: LocalKind::StackFlush { offset: 9, .. },
            ..
        }) => {}
        other => panic!("return should read the join local, got {other:?}"),
    }

    // Both predecessors assign into the same join local.
    let assigns = count_statements(body, |s| {
        matches!(
            s,
            TirStatement::Assign {
                target: Local {
                    kind: LocalKind::StackFlush { offset: 9, .. },
                    ..
                },
                ..
            }
        )
    });
    assert_eq!(assigns, 2);
}

#[test]
fn test_join_types_merge_to_common_supertype() {
    use classfile_transpiler::field_info::FieldAccessFlags;

    let base = class("pkg/Base", "java/lang/Object");
    let s = class("pkg/S", "pkg/Base");
    let t = class("pkg/T", "pkg/Base");
    let mut holder = class("pkg/H", "java/lang/Object");
    holder
        .fields
        .push(field("pkg/H", "s", "Lpkg/S;", FieldAccessFlags::STATIC));
    holder
        .fields
        .push(field("pkg/H", "t", "Lpkg/T;", FieldAccessFlags::STATIC));
    holder.methods.push(method(
        "pkg/H",
        "pick",
        "(I)Lpkg/Base;",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, iload(0)),
            at(
                1,
                Instruction::IfZero {
                    op: classfile_transpiler::code::CompareOp::Eq,
                    target: 10,
                },
            ),
            at(4, getstatic("pkg/H", "s", "Lpkg/S;")),
            at(7, Instruction::Goto { target: 13 }),
            at(10, getstatic("pkg/H", "t", "Lpkg/T;")),
            at(13, areturn()),
        ],
    ));

    let p = lowered(program(vec![base, s, t, holder]));
    let body = body_of(&p, "pkg/H", "pick", "(I)Lpkg/Base;");
    let join_local = body
        .locals
        .iter()
        .find(|l| matches!(l.kind, LocalKind::StackFlush { offset: 13, .. }))
        .expect("join local exists");
    assert_eq!(
        join_local.ty,
        JavaType::Reference("pkg/Base".to_string()),
        "merged type is the least upper bound of pkg/S and pkg/T"
    );
}

#[test]
fn test_irreconcilable_join_is_verify_error() {
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "bad",
        "(I)V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, iload(0)),
            at(
                1,
                Instruction::IfZero {
                    op: classfile_transpiler::code::CompareOp::Eq,
                    target: 10,
                },
            ),
            at(4, iconst(1)),
            at(5, Instruction::Goto { target: 12 }),
            at(
                10,
                Instruction::Push(ConstOperand::Long(1)),
            ),
            at(12, Instruction::Pop { wide: false }),
            at(13, vreturn()),
        ],
    ));
    let mut p = program(vec![a]);
    resolve::resolve(&mut p, &test_config()).expect("links");
    let err = lower::lower_program(&mut p).unwrap_err();
    assert!(matches!(err, TranspileError::Verify(_)), "got {err:?}");
}

// ---- S4: try/finally handler shape ----

#[test]
fn test_try_finally_handler_region() {
    use classfile_transpiler::model::HandlerEntry;

    // try { throw new pkg/E(); } finally { F.x = 1; }
    let mut e = class("pkg/E", "java/lang/Object");
    e.methods.push(method(
        "pkg/E",
        "<init>",
        "()V",
        MethodAccessFlags::PUBLIC,
        vec![at(0, vreturn())],
    ));
    let mut f = class("pkg/F", "java/lang/Object");
    f.fields.push(field(
        "pkg/F",
        "x",
        "I",
        classfile_transpiler::field_info::FieldAccessFlags::STATIC,
    ));
    let mut m = method(
        "pkg/F",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, Instruction::New { class_name: "pkg/E".to_string() }),
            at(3, Instruction::Dup),
            at(4, invoke_special("pkg/E", "<init>", "()V")),
            at(7, Instruction::Throw),
            // catch-any handler: store exception, run finally, rethrow
            at(8, astore(0)),
            at(9, iconst(1)),
            at(10, putstatic("pkg/F", "x", "I")),
            at(13, aload(0)),
            at(14, Instruction::Throw),
        ],
    );
    m.handlers = vec![HandlerEntry {
        start_pc: 0,
        end_pc: 8,
        handler_pc: 8,
        catch_type: None,
    }];
    f.methods.push(m);

    let p = lowered(program(vec![e, f]));
    let body = body_of(&p, "pkg/F", "run", "()V");

    assert_eq!(body.regions.len(), 1, "one try region encloses the body");
    assert_eq!(
        count_statements(body, |s| matches!(s, TirStatement::TryBegin { .. })),
        1
    );
    assert_eq!(
        count_statements(body, |s| matches!(s, TirStatement::TryEnd { .. })),
        1
    );
    assert_eq!(
        count_statements(
            body,
            |s| matches!(s, TirStatement::CatchBegin { catch_type: None, .. })
        ),
        1
    );

    // The finally assignment is present exactly once, on the handler path.
    let finally_stores = count_statements(body, |s| {
        matches!(s, TirStatement::FieldStore { field, .. } if field.name == "x")
    });
    assert_eq!(finally_stores, 1, "x = 1 must never be dropped");

    // The handler rethrows what it caught.
    let rethrows = count_statements(body, |s| matches!(s, TirStatement::Throw(_)));
    assert_eq!(rethrows, 2, "original throw plus the handler rethrow");
}

// ---- S5: dup of an expression with side effects ----

#[test]
fn test_dup_of_effectful_load_materializes_once() {
    use classfile_transpiler::field_info::FieldAccessFlags;

    let mut foo = class("pkg/Foo", "java/lang/Object");
    foo.fields
        .push(field("pkg/Foo", "f", "I", FieldAccessFlags::PUBLIC));
    foo.methods.push(method(
        "pkg/Foo",
        "make",
        "()Lpkg/Foo;",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, Instruction::Push(ConstOperand::Null)), at(1, areturn())],
    ));

    let mut user = class("pkg/User", "java/lang/Object");
    user.fields
        .push(field("pkg/User", "a", "I", FieldAccessFlags::STATIC));
    user.fields
        .push(field("pkg/User", "b", "I", FieldAccessFlags::STATIC));
    user.methods.push(method(
        "pkg/User",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            // dup of getfield whose receiver is a side-effecting call
            at(0, invoke_static("pkg/Foo", "make", "()Lpkg/Foo;")),
            at(3, getfield("pkg/Foo", "f", "I")),
            at(6, Instruction::Dup),
            at(7, putstatic("pkg/User", "a", "I")),
            at(10, putstatic("pkg/User", "b", "I")),
            at(13, vreturn()),
        ],
    ));

    let p = lowered(program(vec![foo, user]));
    let body = body_of(&p, "pkg/User", "run", "()V");

    // The field is loaded exactly once, into a temporary.
    let mut field_loads = 0;
    for stmt in &body.statements {
        classfile_transpiler::lower::fold::for_each_stmt_expr(stmt, &mut |e| {
            if matches!(e, TirExpr::FieldLoad { field, .. } if field.name == "f") {
                field_loads += 1;
            }
        });
    }
    assert_eq!(field_loads, 1, "dup must not duplicate the load");

    // Both stores read the same temporary local.
    let stored: Vec<u32> = body
        .statements
        .iter()
        .filter_map(|s| match s {
            TirStatement::FieldStore {
                value: TirExpr::Local(l),
                ..
            } => Some(l.id),
            _ => None,
        })
        .collect();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0], stored[1]);
}

// ---- Invocation materialization order ----

#[test]
fn test_pending_call_spills_before_next_statement() {
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "f",
        "()I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, iconst(7)), at(1, ireturn())],
    ));
    a.methods.push(method(
        "pkg/A",
        "g",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, vreturn())],
    ));
    a.methods.push(method(
        "pkg/A",
        "run",
        "()I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, invoke_static("pkg/A", "f", "()I")),
            at(3, invoke_static("pkg/A", "g", "()V")),
            at(6, istore(0)),
            at(7, iload(0)),
            at(8, ireturn()),
        ],
    ));

    let p = lowered(program(vec![a]));
    let body = body_of(&p, "pkg/A", "run", "()I");

    // f() must be materialized before g() executes.
    let f_spill = body.statements.iter().position(|s| {
        matches!(s, TirStatement::Assign { value: TirExpr::Invoke { method, .. }, .. }
            if method.name == "f")
    });
    let g_eval = body.statements.iter().position(|s| {
        matches!(s, TirStatement::Eval(TirExpr::Invoke { method, .. }) if method.name == "g")
    });
    let (f_spill, g_eval) = (f_spill.expect("spill exists"), g_eval.expect("eval exists"));
    assert!(
        f_spill < g_eval,
        "evaluation order of f() and g() must be preserved"
    );
}

// ---- Subroutine inlining ----

#[test]
fn test_jsr_subroutine_inlined() {
    use classfile_transpiler::field_info::FieldAccessFlags;

    let mut a = class("pkg/A", "java/lang/Object");
    a.fields
        .push(field("pkg/A", "x", "I", FieldAccessFlags::STATIC));
    a.methods.push(method(
        "pkg/A",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, Instruction::Jsr { target: 8 }),
            at(3, Instruction::Jsr { target: 8 }),
            at(6, vreturn()),
            // subroutine: store return address, x = 1, ret
            at(8, astore(0)),
            at(9, iconst(1)),
            at(10, putstatic("pkg/A", "x", "I")),
            at(13, Instruction::Ret { index: 0 }),
        ],
    ));

    let p = lowered(program(vec![a]));
    let body = body_of(&p, "pkg/A", "run", "()V");
    let stores = count_statements(body, |s| {
        matches!(s, TirStatement::FieldStore { field, .. } if field.name == "x")
    });
    assert_eq!(stores, 2, "one clone of the subroutine body per call site");
}

#[test]
fn test_recursive_subroutine_rejected() {
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, Instruction::Jsr { target: 3 }),
            at(3, astore(0)),
            at(4, Instruction::Jsr { target: 3 }),
            at(7, Instruction::Ret { index: 0 }),
        ],
    ));
    let mut p = program(vec![a]);
    resolve::resolve(&mut p, &test_config()).expect("links");
    let err = lower::lower_program(&mut p).unwrap_err();
    assert!(matches!(err, TranspileError::Unsupported(_)), "got {err:?}");
}

// ---- Failure modes ----

#[test]
fn test_stack_underflow_is_verify_error() {
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "bad",
        "()I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, iadd()), at(1, ireturn())],
    ));
    let mut p = program(vec![a]);
    resolve::resolve(&mut p, &test_config()).expect("links");
    let err = lower::lower_program(&mut p).unwrap_err();
    assert!(matches!(err, TranspileError::Verify(_)), "got {err:?}");
}

#[test]
fn test_lowering_is_deterministic() {
    let build = || {
        let mut a = class("pkg/A", "java/lang/Object");
        a.methods.push(method(
            "pkg/A",
            "pick",
            "(I)I",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            vec![
                at(0, iload(0)),
                at(
                    1,
                    Instruction::IfZero {
                        op: classfile_transpiler::code::CompareOp::Eq,
                        target: 8,
                    },
                ),
                at(4, iconst(1)),
                at(5, Instruction::Goto { target: 9 }),
                at(8, iconst(2)),
                at(9, ireturn()),
            ],
        ));
        lowered(program(vec![a]))
    };
    let p1 = build();
    let p2 = build();
    assert_eq!(
        body_of(&p1, "pkg/A", "pick", "(I)I").statements,
        body_of(&p2, "pkg/A", "pick", "(I)I").statements
    );
}
