//! Symbolic operand-stack simulation: walks a method's instruction stream in
//! program order, keeps a stack of expression nodes, and emits TIR
//! statements. At every join point (branch target, handler entry, the
//! instruction after a throw) the symbolic stack is flushed into per-offset
//! synthetic locals so no expression ever spans a branch.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::code::{
    CmpKind, CompareOp, ConstOperand, Instruction, InstructionStream, InvokeKind, ValueKind,
};
use crate::descriptor::{parse_method_descriptor, JavaType};
use crate::error::{TranspileError, Unsupported, VerifyError};
use crate::lower::fold;
use crate::lower::tir::*;
use crate::model::{ClassModel, MethodModel, ProgramModel};

/// Storage class of a local slot; separates reuses of one bytecode slot with
/// incompatible types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Tag {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

fn tag_of(ty: &JavaType) -> Tag {
    match ty.stack_kind() {
        JavaType::Long => Tag::Long,
        JavaType::Float => Tag::Float,
        JavaType::Double => Tag::Double,
        JavaType::Reference(_) | JavaType::Array(_) => Tag::Ref,
        _ => Tag::Int,
    }
}

fn kind_tag(kind: ValueKind) -> Tag {
    match kind {
        ValueKind::Int => Tag::Int,
        ValueKind::Long => Tag::Long,
        ValueKind::Float => Tag::Float,
        ValueKind::Double => Tag::Double,
        ValueKind::Reference => Tag::Ref,
    }
}

/// Lower one method body. `stream` is the subroutine-free instruction list.
pub fn lower_method(
    program: &ProgramModel,
    class: &ClassModel,
    method: &MethodModel,
    stream: &InstructionStream,
) -> Result<TirBody, TranspileError> {
    let mut sim = Simulator::new(program, class, method, stream);
    sim.run()?;
    let mut body = TirBody {
        statements: sim.stmts,
        locals: sim.locals,
        regions: sim.regions,
    };
    fold::cleanup(&mut body);
    Ok(body)
}

struct Simulator<'a> {
    program: &'a ProgramModel,
    class: &'a ClassModel,
    method: &'a MethodModel,
    stream: &'a InstructionStream,

    stack: Vec<TirExpr>,
    stmts: Vec<TirStatement>,
    locals: Vec<Local>,
    regions: Vec<TryRegion>,

    /// (bytecode slot, storage class) -> local id.
    var_locals: FxHashMap<(u16, Tag), u32>,
    /// Join offset -> flush local ids, bottom of stack first.
    join_state: BTreeMap<u32, Vec<u32>>,
    /// Handler entry -> exception local id.
    handler_locals: BTreeMap<u32, u32>,
    next_temp: u32,

    join_offsets: BTreeSet<u32>,
    valid_offsets: BTreeSet<u32>,
    /// Region ids beginning / ending at an offset.
    region_starts: BTreeMap<u32, Vec<u32>>,
    region_ends: BTreeMap<u32, Vec<u32>>,
    /// Handler entry -> (region id, catch type) pairs in table order.
    handlers_at: BTreeMap<u32, Vec<(u32, Option<String>)>>,

    /// Resolved-supertype memo for the LUB queries of this method.
    lub_memo: FxHashMap<(String, String), String>,
}

impl<'a> Simulator<'a> {
    fn new(
        program: &'a ProgramModel,
        class: &'a ClassModel,
        method: &'a MethodModel,
        stream: &'a InstructionStream,
    ) -> Self {
        let mut sim = Simulator {
            program,
            class,
            method,
            stream,
            stack: Vec::new(),
            stmts: Vec::new(),
            locals: Vec::new(),
            regions: Vec::new(),
            var_locals: FxHashMap::default(),
            join_state: BTreeMap::new(),
            handler_locals: BTreeMap::new(),
            next_temp: 0,
            join_offsets: BTreeSet::new(),
            valid_offsets: BTreeSet::new(),
            region_starts: BTreeMap::new(),
            region_ends: BTreeMap::new(),
            handlers_at: BTreeMap::new(),
            lub_memo: FxHashMap::default(),
        };
        sim.init_params();
        sim.init_regions();
        sim.init_joins();
        sim
    }

    /// Parameters claim their bytecode slots up front, in slot order.
    fn init_params(&mut self) {
        let method = self.method;
        let mut slot: u16 = if method.is_static() { 0 } else { 1 };
        for param in &method.params {
            let ty = param.stack_kind();
            let id = self.alloc_local(ty.clone(), LocalKind::Param { slot });
            self.var_locals.insert((slot, tag_of(&ty)), id);
            slot += if param.is_wide() { 2 } else { 1 };
        }
    }

    /// Handler table -> try regions (unique ranges) and handler entries.
    fn init_regions(&mut self) {
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for handler in &self.method.handlers {
            let range = (handler.start_pc, handler.end_pc);
            let region = match ranges.iter().position(|r| *r == range) {
                Some(i) => i as u32,
                None => {
                    ranges.push(range);
                    let id = (ranges.len() - 1) as u32;
                    self.regions.push(TryRegion {
                        id,
                        start_pc: range.0,
                        end_pc: range.1,
                    });
                    self.region_starts.entry(range.0).or_default().push(id);
                    self.region_ends.entry(range.1).or_default().push(id);
                    id
                }
            };
            self.handlers_at
                .entry(handler.handler_pc)
                .or_default()
                .push((region, handler.catch_type.clone()));
        }
        // Inner regions end first.
        for ids in self.region_ends.values_mut() {
            ids.reverse();
        }
    }

    /// Join points: branch targets, handler entries and the instruction
    /// following a throw.
    fn init_joins(&mut self) {
        for (i, insn) in self.stream.iter().enumerate() {
            self.valid_offsets.insert(insn.offset);
            for target in insn.instruction.branch_targets() {
                self.join_offsets.insert(target);
            }
            if matches!(insn.instruction, Instruction::Throw) {
                if let Some(next) = self.stream.get(i + 1) {
                    self.join_offsets.insert(next.offset);
                }
            }
        }
        let handler_offsets: Vec<u32> = self.handlers_at.keys().copied().collect();
        self.join_offsets.extend(handler_offsets);
    }

    fn alloc_local(&mut self, ty: JavaType, kind: LocalKind) -> u32 {
        let id = self.locals.len() as u32;
        self.locals.push(Local { id, ty, kind });
        id
    }

    fn local_read(&self, id: u32) -> TirExpr {
        TirExpr::Local(self.locals[id as usize].clone())
    }

    fn temp_for(&mut self, expr: TirExpr) -> TirExpr {
        let ty = expr.ty();
        let id = self.alloc_local(ty, LocalKind::Temp { n: self.next_temp });
        self.next_temp += 1;
        self.stmts.push(TirStatement::Assign {
            target: self.locals[id as usize].clone(),
            value: expr,
        });
        self.local_read(id)
    }

    fn verify<T>(&self, build: impl FnOnce(String, String, String) -> T) -> T {
        build(
            self.class.name.clone(),
            self.method.name.clone(),
            self.method.descriptor.clone(),
        )
    }

    fn pop(&mut self, offset: u32) -> Result<TirExpr, TranspileError> {
        self.stack.pop().ok_or_else(|| {
            TranspileError::Verify(self.verify(|class, method, descriptor| {
                VerifyError::StackUnderflow {
                    class,
                    method,
                    descriptor,
                    offset,
                }
            }))
        })
    }

    /// Pop `n` values pushed left-to-right, returning them in push order.
    fn pop_n(&mut self, n: usize, offset: u32) -> Result<Vec<TirExpr>, TranspileError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.pop(offset)?);
        }
        out.reverse();
        Ok(out)
    }

    /// Materialize side-effecting operands of a multi-operand consumer so the
    /// emitted expression cannot reorder them. An operand stays inline only
    /// when every other operand is trivial.
    fn sequence_operands(&mut self, ops: &mut [TirExpr]) {
        if ops.len() < 2 {
            return;
        }
        let effectful: Vec<usize> = ops
            .iter()
            .enumerate()
            .filter(|(_, o)| o.has_side_effects())
            .map(|(i, _)| i)
            .collect();
        for i in effectful {
            let others_nontrivial = ops
                .iter()
                .enumerate()
                .any(|(j, o)| j != i && !o.is_trivial());
            if others_nontrivial {
                ops[i] = self.temp_for(std::mem::replace(
                    &mut ops[i],
                    TirExpr::Const(ConstOperand::Null),
                ));
            }
        }
    }

    /// Spill every side-effecting expression still on the symbolic stack into
    /// a temporary, preserving push order. Called before a statement is
    /// emitted so pending evaluations are not reordered past it.
    fn spill_stack_effects(&mut self) {
        for i in 0..self.stack.len() {
            if self.stack[i].has_side_effects() {
                let expr = std::mem::replace(&mut self.stack[i], TirExpr::Const(ConstOperand::Null));
                self.stack[i] = self.temp_for(expr);
            }
        }
    }

    /// Emit a statement, spilling pending stack effects first.
    fn stmt(&mut self, stmt: TirStatement) {
        self.spill_stack_effects();
        self.stmts.push(stmt);
    }

    /// Evaluate leftover side-effecting stack entries before the stack is
    /// discarded at a return or throw.
    fn discard_stack(&mut self) {
        let leftovers = std::mem::take(&mut self.stack);
        for expr in leftovers {
            if expr.has_side_effects() {
                self.stmts.push(TirStatement::Eval(expr));
            }
        }
    }

    /// Verifier-style merge of two types at a join.
    fn merge_types(&mut self, a: &JavaType, b: &JavaType) -> Option<JavaType> {
        let (a, b) = (a.stack_kind(), b.stack_kind());
        if a == b {
            return Some(a);
        }
        match (&a, &b) {
            (JavaType::Int, JavaType::Int) => Some(JavaType::Int),
            (x, y) if x.is_reference() && y.is_reference() => {
                let an = x.referent().unwrap_or("java/lang/Object").to_string();
                let bn = y.referent().unwrap_or("java/lang/Object").to_string();
                let key = (an.clone(), bn.clone());
                let lub = if let Some(hit) = self.lub_memo.get(&key) {
                    hit.clone()
                } else {
                    let computed = self.program.least_upper_bound(&an, &bn);
                    self.lub_memo.insert(key, computed.clone());
                    computed
                };
                Some(JavaType::Reference(lub))
            }
            _ => None,
        }
    }

    /// Flush the symbolic stack into the join's synthetic locals and replace
    /// it with reads of those locals.
    fn flush_to(&mut self, target: u32) -> Result<(), TranspileError> {
        let entries = std::mem::take(&mut self.stack);

        let ids: Vec<u32> = match self.join_state.get(&target) {
            Some(existing) => {
                if existing.len() != entries.len() {
                    return Err(TranspileError::Verify(self.verify(
                        |class, method, descriptor| VerifyError::JoinDepthMismatch {
                            class,
                            method,
                            descriptor,
                            offset: target,
                            expected: existing.len(),
                            actual: entries.len(),
                        },
                    )));
                }
                let existing = existing.clone();
                for (id, expr) in existing.iter().zip(&entries) {
                    let declared = self.locals[*id as usize].ty.clone();
                    let incoming = expr.ty();
                    match self.merge_types(&declared, &incoming) {
                        Some(merged) => self.locals[*id as usize].ty = merged,
                        None => {
                            return Err(TranspileError::Verify(self.verify(
                                |class, method, descriptor| VerifyError::JoinMismatch {
                                    class,
                                    method,
                                    descriptor,
                                    offset: target,
                                    left: declared.to_descriptor(),
                                    right: incoming.to_descriptor(),
                                },
                            )))
                        }
                    }
                }
                existing
            }
            None => {
                let ids: Vec<u32> = entries
                    .iter()
                    .enumerate()
                    .map(|(depth, expr)| {
                        self.alloc_local(
                            expr.ty().stack_kind(),
                            LocalKind::StackFlush {
                                offset: target,
                                depth: depth as u16,
                            },
                        )
                    })
                    .collect();
                self.join_state.insert(target, ids.clone());
                ids
            }
        };

        for (id, expr) in ids.iter().zip(entries) {
            // Passing a flush local through to itself needs no assignment.
            if matches!(&expr, TirExpr::Local(l) if l.id == *id) {
                continue;
            }
            self.stmts.push(TirStatement::Assign {
                target: self.locals[*id as usize].clone(),
                value: expr,
            });
        }
        self.stack = ids.iter().map(|id| self.local_read(*id)).collect();
        Ok(())
    }

    fn check_target(&self, target: u32) -> Result<(), TranspileError> {
        if self.valid_offsets.contains(&target) {
            Ok(())
        } else {
            Err(TranspileError::Verify(self.verify(
                |class, method, descriptor| VerifyError::BadBranchTarget {
                    class,
                    method,
                    descriptor,
                    offset: target,
                },
            )))
        }
    }

    // -----------------------------------------------------------------
    // Main walk
    // -----------------------------------------------------------------

    fn run(&mut self) -> Result<(), TranspileError> {
        let mut flow_ended = true; // method entry is a label-free start
        for i in 0..self.stream.len() {
            let offset = self.stream[i].offset;
            let instruction = self.stream[i].instruction.clone();

            // Region bookkeeping and join handling, in marker order:
            // try-ends, label, catch entries, try-begins.
            if let Some(ids) = self.region_ends.get(&offset).cloned() {
                for id in ids {
                    self.stmts.push(TirStatement::TryEnd { region: id });
                }
            }
            if self.join_offsets.contains(&offset) {
                if !flow_ended && i > 0 {
                    self.flush_to(offset)?;
                }
                self.stmts.push(TirStatement::Label { offset });
                if let Some(handlers) = self.handlers_at.get(&offset).cloned() {
                    let id = match self.handler_locals.get(&offset) {
                        Some(id) => *id,
                        None => {
                            let ty = JavaType::Reference(
                                handlers[0]
                                    .1
                                    .clone()
                                    .unwrap_or_else(|| "java/lang/Throwable".to_string()),
                            );
                            let id =
                                self.alloc_local(ty, LocalKind::Exception { handler: offset });
                            self.handler_locals.insert(offset, id);
                            id
                        }
                    };
                    for (region, catch_type) in handlers {
                        self.stmts.push(TirStatement::CatchBegin {
                            region,
                            catch_type,
                            local: self.locals[id as usize].clone(),
                            handler: offset,
                        });
                    }
                    // On handler entry the stack holds exactly the exception.
                    self.stack = vec![self.local_read(id)];
                } else if flow_ended || i == 0 {
                    self.stack = self
                        .join_state
                        .get(&offset)
                        .cloned()
                        .unwrap_or_default()
                        .iter()
                        .map(|id| self.local_read(*id))
                        .collect();
                }
            }
            if let Some(ids) = self.region_starts.get(&offset).cloned() {
                for id in ids {
                    self.stmts.push(TirStatement::TryBegin { region: id });
                }
            }

            flow_ended = instruction.ends_flow();
            self.step(offset, instruction)?;
        }

        // Regions ending exactly at the end of the code array.
        let past_end: Vec<u32> = self
            .region_ends
            .iter()
            .filter(|(off, _)| !self.valid_offsets.contains(off))
            .flat_map(|(_, ids)| ids.clone())
            .collect();
        for id in past_end {
            self.stmts.push(TirStatement::TryEnd { region: id });
        }
        Ok(())
    }

    fn step(&mut self, offset: u32, instruction: Instruction) -> Result<(), TranspileError> {
        match instruction {
            Instruction::Nop => {}

            // ============================================================
            // Constants and locals
            // ============================================================
            Instruction::Push(c) => self.stack.push(TirExpr::Const(c)),

            Instruction::Load { kind, index } => {
                let expr = self.load_local(kind, index);
                self.stack.push(expr);
            }

            Instruction::Store { kind, index } => {
                let value = self.pop(offset)?;
                let target = self.store_target(kind, index, &value);
                self.stmt(TirStatement::Assign { target, value });
            }

            Instruction::Iinc { index, amount } => {
                let local = self.var_local(index, Tag::Int, JavaType::Int);
                let value = TirExpr::Binary {
                    op: crate::code::BinOp::Add,
                    ty: JavaType::Int,
                    left: Box::new(self.local_read(local.id)),
                    right: Box::new(TirExpr::Const(ConstOperand::Int(amount))),
                };
                self.stmt(TirStatement::Assign {
                    target: local,
                    value,
                });
            }

            // ============================================================
            // Arrays
            // ============================================================
            Instruction::ArrayLoad { elem } => {
                let mut ops = self.pop_n(2, offset)?;
                self.sequence_operands(&mut ops);
                let index = ops.pop().expect("two operands");
                let array = ops.pop().expect("two operands");
                let elem = refine_elem(&array, elem);
                self.stack.push(TirExpr::ArrayLoad {
                    array: Box::new(array),
                    index: Box::new(index),
                    elem,
                });
            }

            Instruction::ArrayStore { elem } => {
                let mut ops = self.pop_n(3, offset)?;
                self.sequence_operands(&mut ops);
                let value = ops.pop().expect("three operands");
                let index = ops.pop().expect("three operands");
                let array = ops.pop().expect("three operands");
                let elem = refine_elem(&array, elem);
                self.stmt(TirStatement::ArrayStore {
                    array,
                    index,
                    value,
                    elem,
                });
            }

            Instruction::ArrayLength => {
                let array = self.pop(offset)?;
                self.stack.push(TirExpr::ArrayLength {
                    array: Box::new(array),
                });
            }

            // ============================================================
            // Stack manipulation
            // ============================================================
            Instruction::Pop { wide } => {
                let top = self.pop(offset)?;
                let mut discard = vec![top];
                if wide && !discard[0].ty().is_wide() {
                    discard.push(self.pop(offset)?);
                }
                // Evaluate in original push order.
                for expr in discard.into_iter().rev() {
                    if expr.has_side_effects() {
                        self.stmt(TirStatement::Eval(expr));
                    }
                }
            }

            Instruction::Dup => {
                let v = self.pop(offset)?;
                let v = self.dupable(v);
                self.stack.push(v.clone());
                self.stack.push(v);
            }
            Instruction::DupX1 => {
                let v1 = self.pop(offset)?;
                let v2 = self.pop(offset)?;
                let v2 = self.dupable(v2);
                let v1 = self.dupable(v1);
                self.stack.push(v1.clone());
                self.stack.push(v2);
                self.stack.push(v1);
            }
            Instruction::DupX2 => {
                let v1 = self.pop(offset)?;
                let v2 = self.pop(offset)?;
                if v2.ty().is_wide() {
                    let v2 = self.dupable(v2);
                    let v1 = self.dupable(v1);
                    self.stack.push(v1.clone());
                    self.stack.push(v2);
                    self.stack.push(v1);
                } else {
                    let v3 = self.pop(offset)?;
                    let v3 = self.dupable(v3);
                    let v2 = self.dupable(v2);
                    let v1 = self.dupable(v1);
                    self.stack.push(v1.clone());
                    self.stack.push(v3);
                    self.stack.push(v2);
                    self.stack.push(v1);
                }
            }
            Instruction::Dup2 => {
                let v1 = self.pop(offset)?;
                if v1.ty().is_wide() {
                    let v1 = self.dupable(v1);
                    self.stack.push(v1.clone());
                    self.stack.push(v1);
                } else {
                    let v2 = self.pop(offset)?;
                    let v2 = self.dupable(v2);
                    let v1 = self.dupable(v1);
                    self.stack.push(v2.clone());
                    self.stack.push(v1.clone());
                    self.stack.push(v2);
                    self.stack.push(v1);
                }
            }
            Instruction::Dup2X1 => {
                let v1 = self.pop(offset)?;
                if v1.ty().is_wide() {
                    let v2 = self.pop(offset)?;
                    let v2 = self.dupable(v2);
                    let v1 = self.dupable(v1);
                    self.stack.push(v1.clone());
                    self.stack.push(v2);
                    self.stack.push(v1);
                } else {
                    let v2 = self.pop(offset)?;
                    let v3 = self.pop(offset)?;
                    let v3 = self.dupable(v3);
                    let v2 = self.dupable(v2);
                    let v1 = self.dupable(v1);
                    self.stack.push(v2.clone());
                    self.stack.push(v1.clone());
                    self.stack.push(v3);
                    self.stack.push(v2);
                    self.stack.push(v1);
                }
            }
            Instruction::Dup2X2 => {
                let v1 = self.pop(offset)?;
                if v1.ty().is_wide() {
                    let v2 = self.pop(offset)?;
                    if v2.ty().is_wide() {
                        let v2 = self.dupable(v2);
                        let v1 = self.dupable(v1);
                        self.stack.push(v1.clone());
                        self.stack.push(v2);
                        self.stack.push(v1);
                    } else {
                        let v3 = self.pop(offset)?;
                        let v3 = self.dupable(v3);
                        let v2 = self.dupable(v2);
                        let v1 = self.dupable(v1);
                        self.stack.push(v1.clone());
                        self.stack.push(v3);
                        self.stack.push(v2);
                        self.stack.push(v1);
                    }
                } else {
                    let v2 = self.pop(offset)?;
                    let v3 = self.pop(offset)?;
                    if v3.ty().is_wide() {
                        let v3 = self.dupable(v3);
                        let v2 = self.dupable(v2);
                        let v1 = self.dupable(v1);
                        self.stack.push(v2.clone());
                        self.stack.push(v1.clone());
                        self.stack.push(v3);
                        self.stack.push(v2);
                        self.stack.push(v1);
                    } else {
                        let v4 = self.pop(offset)?;
                        let v4 = self.dupable(v4);
                        let v3 = self.dupable(v3);
                        let v2 = self.dupable(v2);
                        let v1 = self.dupable(v1);
                        self.stack.push(v2.clone());
                        self.stack.push(v1.clone());
                        self.stack.push(v4);
                        self.stack.push(v3);
                        self.stack.push(v2);
                        self.stack.push(v1);
                    }
                }
            }
            Instruction::Swap => {
                let v1 = self.pop(offset)?;
                let v2 = self.pop(offset)?;
                let v2 = self.dupable(v2);
                let v1 = self.dupable(v1);
                self.stack.push(v1);
                self.stack.push(v2);
            }

            // ============================================================
            // Arithmetic, conversions, comparisons
            // ============================================================
            Instruction::Binary { op, kind } => {
                let mut ops = self.pop_n(2, offset)?;
                self.sequence_operands(&mut ops);
                let right = ops.pop().expect("two operands");
                let left = ops.pop().expect("two operands");
                let expr = fold::make_binary(op, kind.java_type(), left, right);
                self.stack.push(expr);
            }

            Instruction::Neg { kind } => {
                let operand = self.pop(offset)?;
                let expr = fold::make_neg(kind.java_type(), operand);
                self.stack.push(expr);
            }

            Instruction::Convert { target } => {
                let operand = self.pop(offset)?;
                let expr = fold::make_convert(target, operand);
                self.stack.push(expr);
            }

            Instruction::Cmp { kind } => {
                let mut ops = self.pop_n(2, offset)?;
                self.sequence_operands(&mut ops);
                let right = ops.pop().expect("two operands");
                let left = ops.pop().expect("two operands");
                self.stack.push(TirExpr::Cmp {
                    kind,
                    left: Box::new(left),
                    right: Box::new(right),
                });
            }

            // ============================================================
            // Branches
            // ============================================================
            Instruction::IfZero { op, target } => {
                let value = self.pop(offset)?;
                let cond = zero_condition(value, op);
                self.branch(cond, target, offset)?;
            }
            Instruction::IfIntCmp { op, target } => {
                let mut ops = self.pop_n(2, offset)?;
                self.sequence_operands(&mut ops);
                let right = ops.pop().expect("two operands");
                let left = ops.pop().expect("two operands");
                self.branch(
                    Condition {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    target,
                    offset,
                )?;
            }
            Instruction::IfRefCmp { equal, target } => {
                let mut ops = self.pop_n(2, offset)?;
                self.sequence_operands(&mut ops);
                let right = ops.pop().expect("two operands");
                let left = ops.pop().expect("two operands");
                self.branch(
                    Condition {
                        op: if equal { CompareOp::Eq } else { CompareOp::Ne },
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    target,
                    offset,
                )?;
            }
            Instruction::IfNull { is_null, target } => {
                let value = self.pop(offset)?;
                self.branch(
                    Condition {
                        op: if is_null { CompareOp::Eq } else { CompareOp::Ne },
                        left: Box::new(value),
                        right: Box::new(TirExpr::Const(ConstOperand::Null)),
                    },
                    target,
                    offset,
                )?;
            }

            Instruction::Goto { target } => {
                self.check_target(target)?;
                self.flush_to(target)?;
                self.stmts.push(TirStatement::Goto { target });
                self.stack.clear();
            }

            Instruction::TableSwitch {
                default,
                low,
                targets,
                ..
            } => {
                let key = self.pop(offset)?;
                let cases: Vec<(i32, u32)> = targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (low + i as i32, *t))
                    .collect();
                self.switch(key, cases, default, offset)?;
            }
            Instruction::LookupSwitch { default, pairs } => {
                let key = self.pop(offset)?;
                self.switch(key, pairs, default, offset)?;
            }

            // ============================================================
            // Returns and throw
            // ============================================================
            Instruction::Return { kind } => {
                let value = match kind {
                    Some(_) => Some(self.pop(offset)?),
                    None => None,
                };
                self.discard_stack();
                self.stmts.push(TirStatement::Return(value));
            }

            Instruction::Throw => {
                let exception = self.pop(offset)?;
                self.discard_stack();
                self.stmts.push(TirStatement::Throw(exception));
            }

            // ============================================================
            // Fields
            // ============================================================
            Instruction::GetStatic { field } => {
                let ty = field_type(&field);
                self.stack.push(TirExpr::FieldLoad {
                    object: None,
                    field,
                    ty,
                });
            }
            Instruction::PutStatic { field } => {
                let value = self.pop(offset)?;
                self.stmt(TirStatement::FieldStore {
                    object: None,
                    field,
                    value,
                });
            }
            Instruction::GetField { field } => {
                let object = self.pop(offset)?;
                let ty = field_type(&field);
                self.stack.push(TirExpr::FieldLoad {
                    object: Some(Box::new(object)),
                    field,
                    ty,
                });
            }
            Instruction::PutField { field } => {
                let mut ops = self.pop_n(2, offset)?;
                self.sequence_operands(&mut ops);
                let value = ops.pop().expect("two operands");
                let object = ops.pop().expect("two operands");
                self.stmt(TirStatement::FieldStore {
                    object: Some(object),
                    field,
                    value,
                });
            }

            // ============================================================
            // Invocations and object creation
            // ============================================================
            Instruction::Invoke { kind, method } => {
                self.invoke(kind, method, offset)?;
            }

            Instruction::InvokeDynamic { .. } => {
                return Err(Unsupported::InvokeDynamic {
                    class: self.class.name.clone(),
                    method: self.method.name.clone(),
                    offset,
                }
                .into());
            }

            Instruction::New { class_name } => {
                self.stack.push(TirExpr::UninitNew { class_name });
            }

            Instruction::NewArray { elem } => {
                let length = self.pop(offset)?;
                self.stack.push(TirExpr::NewArray {
                    elem,
                    length: Box::new(length),
                });
            }

            Instruction::MultiNewArray { array_type, dims } => {
                let mut dim_exprs = self.pop_n(dims as usize, offset)?;
                self.sequence_operands(&mut dim_exprs);
                self.stack.push(TirExpr::NewMultiArray {
                    array_type,
                    dims: dim_exprs,
                });
            }

            // ============================================================
            // Type tests and monitors
            // ============================================================
            Instruction::CheckCast { class_name } => {
                let operand = self.pop(offset)?;
                self.stack.push(TirExpr::CheckCast {
                    operand: Box::new(operand),
                    class_name,
                });
            }
            Instruction::InstanceOf { class_name } => {
                let operand = self.pop(offset)?;
                self.stack.push(TirExpr::InstanceOf {
                    operand: Box::new(operand),
                    class_name,
                });
            }
            Instruction::MonitorEnter => {
                let object = self.pop(offset)?;
                self.stmt(TirStatement::MonitorEnter(object));
            }
            Instruction::MonitorExit => {
                let object = self.pop(offset)?;
                self.stmt(TirStatement::MonitorExit(object));
            }

            // Subroutines are inlined before simulation; reaching one here
            // means the inliner could not handle the shape.
            Instruction::Jsr { target } => {
                return Err(Unsupported::IrregularSubroutine {
                    class: self.class.name.clone(),
                    method: self.method.name.clone(),
                    offset: target,
                }
                .into());
            }
            Instruction::Ret { .. } => {
                return Err(Unsupported::IrregularSubroutine {
                    class: self.class.name.clone(),
                    method: self.method.name.clone(),
                    offset,
                }
                .into());
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn load_local(&mut self, kind: ValueKind, index: u16) -> TirExpr {
        let tag = kind_tag(kind);
        if kind == ValueKind::Reference
            && index == 0
            && !self.method.is_static()
            && !self.var_locals.contains_key(&(0, Tag::Ref))
        {
            return TirExpr::This;
        }
        let local = self.var_local(index, tag, kind.java_type());
        TirExpr::Local(local)
    }

    fn store_target(&mut self, kind: ValueKind, index: u16, value: &TirExpr) -> Local {
        let tag = kind_tag(kind);
        let value_ty = value.ty().stack_kind();
        let local = self.var_local(index, tag, value_ty.clone());
        // Widen a reference local when a second store brings another type.
        if tag == Tag::Ref {
            let declared = self.locals[local.id as usize].ty.clone();
            if declared != value_ty {
                if let Some(merged) = self.merge_types(&declared, &value_ty) {
                    self.locals[local.id as usize].ty = merged;
                }
            }
        }
        self.locals[local.id as usize].clone()
    }

    fn var_local(&mut self, index: u16, tag: Tag, ty: JavaType) -> Local {
        if let Some(id) = self.var_locals.get(&(index, tag)) {
            return self.locals[*id as usize].clone();
        }
        let id = self.alloc_local(ty, LocalKind::Var { slot: index });
        self.var_locals.insert((index, tag), id);
        self.locals[id as usize].clone()
    }

    /// Spillable copy of a value for the dup family: trivial expressions
    /// duplicate as-is, everything else goes through a temporary.
    fn dupable(&mut self, expr: TirExpr) -> TirExpr {
        if expr.is_trivial() {
            expr
        } else {
            self.temp_for(expr)
        }
    }

    fn branch(
        &mut self,
        cond: Condition,
        target: u32,
        _offset: u32,
    ) -> Result<(), TranspileError> {
        self.check_target(target)?;
        self.flush_to(target)?;
        self.stmts.push(TirStatement::Branch { cond, target });
        Ok(())
    }

    fn switch(
        &mut self,
        key: TirExpr,
        cases: Vec<(i32, u32)>,
        default: u32,
        _offset: u32,
    ) -> Result<(), TranspileError> {
        for (_, t) in &cases {
            self.check_target(*t)?;
        }
        self.check_target(default)?;
        let mut targets: Vec<u32> = cases.iter().map(|(_, t)| *t).collect();
        targets.push(default);
        targets.sort_unstable();
        targets.dedup();
        for t in targets {
            self.flush_to(t)?;
        }
        self.stmts.push(TirStatement::Switch {
            key,
            cases,
            default,
        });
        self.stack.clear();
        Ok(())
    }

    fn invoke(
        &mut self,
        kind: InvokeKind,
        method: crate::code::MethodRef,
        offset: u32,
    ) -> Result<(), TranspileError> {
        let (params, ret) = parse_method_descriptor(&method.descriptor).ok_or_else(|| {
            TranspileError::Malformed(crate::error::MalformedInput {
                class_name: self.class.name.clone(),
                offset: offset as u64,
                message: format!(
                    "invocation of {}.{} carries bad descriptor {}",
                    method.class_name, method.name, method.descriptor
                ),
            })
        })?;
        let args = self.pop_n(params.len(), offset)?;

        if kind == InvokeKind::Special && method.name == "<init>" {
            let receiver = self.pop(offset)?;
            return self.constructor_call(receiver, method, args);
        }

        let receiver = match kind {
            InvokeKind::Static => None,
            _ => Some(self.pop(offset)?),
        };

        let mut ops: Vec<TirExpr> = receiver.into_iter().chain(args).collect();
        self.sequence_operands(&mut ops);
        let (object, args) = match kind {
            InvokeKind::Static => (None, ops),
            _ => {
                let rest = ops.split_off(1);
                let mut object = ops.remove(0);
                // Dispatched calls name the receiver twice (table fetch and
                // self argument); it must be a single-evaluation expression.
                if matches!(kind, InvokeKind::Virtual | InvokeKind::Interface)
                    && !object.is_trivial()
                {
                    object = self.temp_for(object);
                }
                (Some(Box::new(object)), rest)
            }
        };

        let call = TirExpr::Invoke {
            kind,
            object,
            method,
            args,
            ty: ret.clone(),
        };
        if ret == JavaType::Void {
            self.stmt(TirStatement::Eval(call));
        } else {
            self.stack.push(call);
        }
        Ok(())
    }

    /// `invokespecial <init>`: collapse the `new; dup; <init>` pattern into a
    /// single constructor expression, or emit super()/this() calls directly.
    fn constructor_call(
        &mut self,
        receiver: TirExpr,
        method: crate::code::MethodRef,
        mut args: Vec<TirExpr>,
    ) -> Result<(), TranspileError> {
        self.sequence_operands(&mut args);
        match receiver {
            TirExpr::UninitNew { class_name } => {
                let ctor = TirExpr::NewObject {
                    class_name: class_name.clone(),
                    ctor_descriptor: method.descriptor,
                    args,
                };
                // The dup'd copy (if any) still sits on the stack; replace
                // the topmost matching marker with the constructed value.
                let marker = self.stack.iter().rposition(
                    |e| matches!(e, TirExpr::UninitNew { class_name: cn } if *cn == class_name),
                );
                match marker {
                    Some(i) if i == self.stack.len() - 1 => self.stack[i] = ctor,
                    Some(i) => {
                        let read = self.temp_for(ctor);
                        self.stack[i] = read;
                    }
                    // No copy left on the stack: the object was built only
                    // for its constructor's effect.
                    None => self.stmt(TirStatement::Eval(ctor)),
                }
            }
            other => {
                let call = TirExpr::Invoke {
                    kind: InvokeKind::Special,
                    object: Some(Box::new(other)),
                    method,
                    args,
                    ty: JavaType::Void,
                };
                self.stmt(TirStatement::Eval(call));
            }
        }
        Ok(())
    }
}

/// Narrow an array access's element type from the array expression when it
/// is more precise than the opcode family.
fn refine_elem(array: &TirExpr, fallback: JavaType) -> JavaType {
    match array.ty() {
        JavaType::Array(inner) => *inner,
        _ => fallback,
    }
}

fn field_type(field: &crate::code::FieldRef) -> JavaType {
    crate::descriptor::parse_type_descriptor(&field.descriptor)
        .unwrap_or(JavaType::Reference("java/lang/Object".into()))
}

/// Branch condition for the if<cond> zero-compare opcodes. A pending
/// three-way compare folds directly into a two-operand comparison when the
/// pairing is NaN-exact.
fn zero_condition(value: TirExpr, op: CompareOp) -> Condition {
    if let TirExpr::Cmp { kind, left, right } = &value {
        let exact = match kind {
            CmpKind::Long => true,
            CmpKind::FloatG | CmpKind::DoubleG => matches!(op, CompareOp::Lt | CompareOp::Le),
            CmpKind::FloatL | CmpKind::DoubleL => matches!(op, CompareOp::Gt | CompareOp::Ge),
        } || matches!(op, CompareOp::Eq | CompareOp::Ne);
        if exact {
            return Condition {
                op,
                left: left.clone(),
                right: right.clone(),
            };
        }
    }
    Condition {
        op,
        left: Box::new(value),
        right: Box::new(TirExpr::Const(ConstOperand::Int(0))),
    }
}
