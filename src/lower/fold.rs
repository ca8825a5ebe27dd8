//! Constant folding at expression-build time plus the post-simulation
//! cleanup pass: dead temporaries out, adjacent labels coalesced.

use std::collections::BTreeMap;

use crate::code::{BinOp, ConstOperand};
use crate::descriptor::JavaType;
use crate::lower::tir::*;

/// Build a binary expression, folding when both sides are literals.
pub fn make_binary(op: BinOp, ty: JavaType, left: TirExpr, right: TirExpr) -> TirExpr {
    if let (TirExpr::Const(l), TirExpr::Const(r)) = (&left, &right) {
        if let Some(folded) = fold_binary(op, l, r) {
            return TirExpr::Const(folded);
        }
    }
    TirExpr::Binary {
        op,
        ty,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn fold_binary(op: BinOp, l: &ConstOperand, r: &ConstOperand) -> Option<ConstOperand> {
    use ConstOperand::*;
    Some(match (l, r) {
        (Int(a), Int(b)) => Int(match op {
            BinOp::Add => a.wrapping_add(*b),
            BinOp::Sub => a.wrapping_sub(*b),
            BinOp::Mul => a.wrapping_mul(*b),
            BinOp::Div => {
                if *b == 0 {
                    return None;
                }
                a.wrapping_div(*b)
            }
            BinOp::Rem => {
                if *b == 0 {
                    return None;
                }
                a.wrapping_rem(*b)
            }
            BinOp::Shl => a.wrapping_shl(*b as u32 & 0x1f),
            BinOp::Shr => a.wrapping_shr(*b as u32 & 0x1f),
            BinOp::Ushr => ((*a as u32) >> (*b as u32 & 0x1f)) as i32,
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
        }),
        (Long(a), Long(b)) => Long(match op {
            BinOp::Add => a.wrapping_add(*b),
            BinOp::Sub => a.wrapping_sub(*b),
            BinOp::Mul => a.wrapping_mul(*b),
            BinOp::Div => {
                if *b == 0 {
                    return None;
                }
                a.wrapping_div(*b)
            }
            BinOp::Rem => {
                if *b == 0 {
                    return None;
                }
                a.wrapping_rem(*b)
            }
            BinOp::Shl => a.wrapping_shl(*b as u32 & 0x3f),
            BinOp::Shr => a.wrapping_shr(*b as u32 & 0x3f),
            BinOp::Ushr => ((*a as u64) >> (*b as u32 & 0x3f)) as i64,
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
        }),
        // Shift counts for longs arrive as ints.
        (Long(a), Int(b)) => Long(match op {
            BinOp::Shl => a.wrapping_shl(*b as u32 & 0x3f),
            BinOp::Shr => a.wrapping_shr(*b as u32 & 0x3f),
            BinOp::Ushr => ((*a as u64) >> (*b as u32 & 0x3f)) as i64,
            _ => return None,
        }),
        (Float(a), Float(b)) => Float(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Rem => a % b,
            _ => return None,
        }),
        (Double(a), Double(b)) => Double(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Rem => a % b,
            _ => return None,
        }),
        _ => return None,
    })
}

/// Build a negation, folding literals.
pub fn make_neg(ty: JavaType, operand: TirExpr) -> TirExpr {
    if let TirExpr::Const(c) = &operand {
        match c {
            ConstOperand::Int(v) => return TirExpr::Const(ConstOperand::Int(v.wrapping_neg())),
            ConstOperand::Long(v) => return TirExpr::Const(ConstOperand::Long(v.wrapping_neg())),
            ConstOperand::Float(v) => return TirExpr::Const(ConstOperand::Float(-v)),
            ConstOperand::Double(v) => return TirExpr::Const(ConstOperand::Double(-v)),
            _ => {}
        }
    }
    TirExpr::Neg {
        ty,
        operand: Box::new(operand),
    }
}

/// Build a numeric conversion, folding literals.
pub fn make_convert(target: JavaType, operand: TirExpr) -> TirExpr {
    if let TirExpr::Const(c) = &operand {
        if let Some(folded) = fold_convert(&target, c) {
            return TirExpr::Const(folded);
        }
    }
    TirExpr::Convert {
        target,
        operand: Box::new(operand),
    }
}

fn fold_convert(target: &JavaType, c: &ConstOperand) -> Option<ConstOperand> {
    use ConstOperand::*;
    let as_f64 = match c {
        Int(v) => *v as f64,
        Long(v) => *v as f64,
        Float(v) => *v as f64,
        Double(v) => *v,
        _ => return None,
    };
    Some(match target {
        JavaType::Int => Int(match c {
            Int(v) => *v,
            Long(v) => *v as i32,
            Float(v) => *v as i32,
            Double(v) => *v as i32,
            _ => return None,
        }),
        JavaType::Long => Long(match c {
            Int(v) => *v as i64,
            Long(v) => *v,
            Float(v) => *v as i64,
            Double(v) => *v as i64,
            _ => return None,
        }),
        JavaType::Float => Float(as_f64 as f32),
        JavaType::Double => Double(as_f64),
        JavaType::Byte => Int(match c {
            Int(v) => *v as i8 as i32,
            _ => return None,
        }),
        JavaType::Char => Int(match c {
            Int(v) => *v as u16 as i32,
            _ => return None,
        }),
        JavaType::Short => Int(match c {
            Int(v) => *v as i16 as i32,
            _ => return None,
        }),
        _ => return None,
    })
}

/// Post-simulation cleanup: elide never-read side-effect-free temporaries,
/// coalesce adjacent labels, drop labels and locals nothing references.
pub fn cleanup(body: &mut TirBody) {
    elide_dead_assigns(body);
    coalesce_labels(body);
    prune_locals(body);
}

fn elide_dead_assigns(body: &mut TirBody) {
    loop {
        let mut reads: BTreeMap<u32, usize> = BTreeMap::new();
        for stmt in &body.statements {
            for_each_stmt_expr(stmt, &mut |e| {
                if let TirExpr::Local(l) = e {
                    *reads.entry(l.id).or_default() += 1;
                }
            });
        }
        let before = body.statements.len();
        body.statements.retain(|stmt| match stmt {
            TirStatement::Assign { target, value } => {
                let synthetic = matches!(
                    target.kind,
                    LocalKind::Temp { .. } | LocalKind::StackFlush { .. }
                );
                !(synthetic
                    && reads.get(&target.id).copied().unwrap_or(0) == 0
                    && !value.has_side_effects())
            }
            _ => true,
        });
        if body.statements.len() == before {
            break;
        }
    }
}

fn coalesce_labels(body: &mut TirBody) {
    // Adjacent labels merge into the first of the run.
    let mut remap: BTreeMap<u32, u32> = BTreeMap::new();
    let mut previous: Option<u32> = None;
    for stmt in &body.statements {
        match stmt {
            TirStatement::Label { offset } => {
                if let Some(first) = previous {
                    remap.insert(*offset, first);
                } else {
                    previous = Some(*offset);
                }
            }
            _ => previous = None,
        }
    }
    if !remap.is_empty() {
        let resolve = |mut t: u32| {
            while let Some(next) = remap.get(&t) {
                t = *next;
            }
            t
        };
        for stmt in &mut body.statements {
            stmt.retarget(resolve);
        }
        body.statements.retain(
            |s| !matches!(s, TirStatement::Label { offset } if remap.contains_key(offset)),
        );
    }

    // Labels nothing jumps to are noise.
    let mut referenced: Vec<u32> = body
        .statements
        .iter()
        .flat_map(|s| s.targets())
        .collect();
    referenced.sort_unstable();
    referenced.dedup();
    body.statements.retain(
        |s| !matches!(s, TirStatement::Label { offset } if referenced.binary_search(offset).is_err()),
    );
}

fn prune_locals(body: &mut TirBody) {
    let mut used: Vec<u32> = Vec::new();
    for stmt in &body.statements {
        for_each_stmt_expr(stmt, &mut |e| {
            if let TirExpr::Local(l) = e {
                used.push(l.id);
            }
        });
        match stmt {
            TirStatement::Assign { target, .. } => used.push(target.id),
            TirStatement::CatchBegin { local, .. } => used.push(local.id),
            _ => {}
        }
    }
    used.sort_unstable();
    used.dedup();
    body.locals.retain(|l| {
        matches!(l.kind, LocalKind::Param { .. }) || used.binary_search(&l.id).is_ok()
    });
}

/// Visit every expression (recursively) in a statement.
pub fn for_each_stmt_expr(stmt: &TirStatement, f: &mut impl FnMut(&TirExpr)) {
    match stmt {
        TirStatement::Assign { value, .. } => walk(value, f),
        TirStatement::FieldStore { object, value, .. } => {
            if let Some(o) = object {
                walk(o, f);
            }
            walk(value, f);
        }
        TirStatement::ArrayStore {
            array,
            index,
            value,
            ..
        } => {
            walk(array, f);
            walk(index, f);
            walk(value, f);
        }
        TirStatement::Eval(e)
        | TirStatement::MonitorEnter(e)
        | TirStatement::MonitorExit(e)
        | TirStatement::Throw(e) => walk(e, f),
        TirStatement::Branch { cond, .. } => {
            walk(&cond.left, f);
            walk(&cond.right, f);
        }
        TirStatement::Switch { key, .. } => walk(key, f),
        TirStatement::Return(Some(e)) => walk(e, f),
        TirStatement::Return(None)
        | TirStatement::Label { .. }
        | TirStatement::Goto { .. }
        | TirStatement::TryBegin { .. }
        | TirStatement::TryEnd { .. }
        | TirStatement::CatchBegin { .. } => {}
    }
}

fn walk(expr: &TirExpr, f: &mut impl FnMut(&TirExpr)) {
    f(expr);
    match expr {
        TirExpr::Neg { operand, .. }
        | TirExpr::Convert { operand, .. }
        | TirExpr::InstanceOf { operand, .. }
        | TirExpr::CheckCast { operand, .. } => walk(operand, f),
        TirExpr::Binary { left, right, .. } | TirExpr::Cmp { left, right, .. } => {
            walk(left, f);
            walk(right, f);
        }
        TirExpr::FieldLoad { object, .. } => {
            if let Some(o) = object {
                walk(o, f);
            }
        }
        TirExpr::ArrayLoad { array, index, .. } => {
            walk(array, f);
            walk(index, f);
        }
        TirExpr::ArrayLength { array } => walk(array, f),
        TirExpr::NewArray { length, .. } => walk(length, f),
        TirExpr::NewMultiArray { dims, .. } => {
            for d in dims {
                walk(d, f);
            }
        }
        TirExpr::NewObject { args, .. } => {
            for a in args {
                walk(a, f);
            }
        }
        TirExpr::Invoke { object, args, .. } => {
            if let Some(o) = object {
                walk(o, f);
            }
            for a in args {
                walk(a, f);
            }
        }
        TirExpr::Local(_) | TirExpr::This | TirExpr::Const(_) | TirExpr::UninitNew { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::BinOp;

    #[test]
    fn test_fold_int_add() {
        let e = make_binary(
            BinOp::Add,
            JavaType::Int,
            TirExpr::Const(ConstOperand::Int(2)),
            TirExpr::Const(ConstOperand::Int(3)),
        );
        assert_eq!(e, TirExpr::Const(ConstOperand::Int(5)));
    }

    #[test]
    fn test_no_fold_div_by_zero() {
        let e = make_binary(
            BinOp::Div,
            JavaType::Int,
            TirExpr::Const(ConstOperand::Int(1)),
            TirExpr::Const(ConstOperand::Int(0)),
        );
        assert!(matches!(e, TirExpr::Binary { .. }));
    }

    #[test]
    fn test_fold_shift_masks_count() {
        let e = make_binary(
            BinOp::Shl,
            JavaType::Int,
            TirExpr::Const(ConstOperand::Int(1)),
            TirExpr::Const(ConstOperand::Int(33)),
        );
        assert_eq!(e, TirExpr::Const(ConstOperand::Int(2)));
    }

    #[test]
    fn test_fold_narrowing_conversion() {
        let e = make_convert(JavaType::Byte, TirExpr::Const(ConstOperand::Int(0x1ff)));
        assert_eq!(e, TirExpr::Const(ConstOperand::Int(-1)));
        let e = make_convert(JavaType::Char, TirExpr::Const(ConstOperand::Int(-1)));
        assert_eq!(e, TirExpr::Const(ConstOperand::Int(0xffff)));
    }

    #[test]
    fn test_fold_neg() {
        assert_eq!(
            make_neg(JavaType::Int, TirExpr::Const(ConstOperand::Int(7))),
            TirExpr::Const(ConstOperand::Int(-7))
        );
    }
}
