//! Translation IR: statement-oriented, operand-stack-free method bodies.
//! Produced by stack simulation, consumed by the emitter.

use crate::code::{BinOp, CmpKind, CompareOp, ConstOperand, FieldRef, InvokeKind, MethodRef};
use crate::descriptor::JavaType;

/// Where a TIR local came from. Decides its emitted name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalKind {
    /// Parameter occupying the given bytecode slot.
    Param { slot: u16 },
    /// Ordinary bytecode local-variable slot.
    Var { slot: u16 },
    /// Materialization temporary.
    Temp { n: u32 },
    /// Synthetic local holding one flushed operand-stack slot at a join.
    StackFlush { offset: u32, depth: u16 },
    /// Synthetic local receiving the caught exception at a handler entry.
    Exception { handler: u32 },
}

/// A typed local. The id orders declarations; the kind names them.
#[derive(Clone, Debug, PartialEq)]
pub struct Local {
    pub id: u32,
    pub ty: JavaType,
    pub kind: LocalKind,
}

/// Expression node: a value-producing computation with a known type.
#[derive(Clone, Debug, PartialEq)]
pub enum TirExpr {
    Local(Local),
    This,
    Const(ConstOperand),
    Neg {
        ty: JavaType,
        operand: Box<TirExpr>,
    },
    Binary {
        op: BinOp,
        ty: JavaType,
        left: Box<TirExpr>,
        right: Box<TirExpr>,
    },
    Convert {
        target: JavaType,
        operand: Box<TirExpr>,
    },
    /// Three-way comparison result (-1/0/1) of the lcmp/fcmp/dcmp family,
    /// kept only when not folded into a branch condition.
    Cmp {
        kind: CmpKind,
        left: Box<TirExpr>,
        right: Box<TirExpr>,
    },
    FieldLoad {
        object: Option<Box<TirExpr>>,
        field: FieldRef,
        ty: JavaType,
    },
    ArrayLoad {
        array: Box<TirExpr>,
        index: Box<TirExpr>,
        elem: JavaType,
    },
    ArrayLength {
        array: Box<TirExpr>,
    },
    InstanceOf {
        operand: Box<TirExpr>,
        class_name: String,
    },
    CheckCast {
        operand: Box<TirExpr>,
        class_name: String,
    },
    NewObject {
        class_name: String,
        ctor_descriptor: String,
        args: Vec<TirExpr>,
    },
    NewArray {
        elem: JavaType,
        length: Box<TirExpr>,
    },
    NewMultiArray {
        array_type: JavaType,
        dims: Vec<TirExpr>,
    },
    Invoke {
        kind: InvokeKind,
        object: Option<Box<TirExpr>>,
        method: MethodRef,
        args: Vec<TirExpr>,
        ty: JavaType,
    },
    /// Marker for an allocated-but-unconstructed `new`. Internal to the
    /// simulation; a finished body never contains one.
    UninitNew {
        class_name: String,
    },
}

fn named_type(class_name: &str) -> JavaType {
    if class_name.starts_with('[') {
        crate::descriptor::parse_type_descriptor(class_name)
            .unwrap_or(JavaType::Reference("java/lang/Object".into()))
    } else {
        JavaType::Reference(class_name.to_string())
    }
}

impl TirExpr {
    /// Static type of this expression.
    pub fn ty(&self) -> JavaType {
        match self {
            TirExpr::Local(l) => l.ty.clone(),
            TirExpr::This => JavaType::Reference("java/lang/Object".into()),
            TirExpr::Const(c) => match c {
                ConstOperand::Int(_) => JavaType::Int,
                ConstOperand::Long(_) => JavaType::Long,
                ConstOperand::Float(_) => JavaType::Float,
                ConstOperand::Double(_) => JavaType::Double,
                ConstOperand::Str(_) => JavaType::Reference("java/lang/String".into()),
                ConstOperand::Class(_) => JavaType::Reference("java/lang/Class".into()),
                ConstOperand::Null => JavaType::Reference("java/lang/Object".into()),
            },
            TirExpr::Neg { ty, .. } => ty.clone(),
            TirExpr::Binary { ty, .. } => ty.clone(),
            TirExpr::Convert { target, .. } => target.stack_kind(),
            TirExpr::Cmp { .. } => JavaType::Int,
            TirExpr::FieldLoad { ty, .. } => ty.stack_kind(),
            TirExpr::ArrayLoad { elem, .. } => elem.stack_kind(),
            TirExpr::ArrayLength { .. } => JavaType::Int,
            TirExpr::InstanceOf { .. } => JavaType::Int,
            TirExpr::CheckCast { class_name, .. } => named_type(class_name),
            TirExpr::NewObject { class_name, .. } => JavaType::Reference(class_name.clone()),
            TirExpr::NewArray { elem, .. } => JavaType::Array(Box::new(elem.clone())),
            TirExpr::NewMultiArray { array_type, .. } => array_type.clone(),
            TirExpr::Invoke { ty, .. } => ty.stack_kind(),
            TirExpr::UninitNew { class_name } => JavaType::Reference(class_name.clone()),
        }
    }

    /// Expressions whose evaluation is observable and therefore must not be
    /// reordered, duplicated or dropped.
    pub fn has_side_effects(&self) -> bool {
        match self {
            TirExpr::Invoke { .. }
            | TirExpr::NewObject { .. }
            | TirExpr::NewArray { .. }
            | TirExpr::NewMultiArray { .. } => true,
            TirExpr::Neg { operand, .. } | TirExpr::Convert { operand, .. } => {
                operand.has_side_effects()
            }
            TirExpr::Binary { left, right, .. } | TirExpr::Cmp { left, right, .. } => {
                left.has_side_effects() || right.has_side_effects()
            }
            TirExpr::FieldLoad { object, .. } => object
                .as_ref()
                .map(|o| o.has_side_effects())
                .unwrap_or(false),
            TirExpr::ArrayLoad { array, index, .. } => {
                array.has_side_effects() || index.has_side_effects()
            }
            TirExpr::ArrayLength { array } => array.has_side_effects(),
            TirExpr::InstanceOf { operand, .. } | TirExpr::CheckCast { operand, .. } => {
                operand.has_side_effects()
            }
            _ => false,
        }
    }

    /// Cheap to re-read: safe to duplicate for the dup family without a
    /// temporary.
    pub fn is_trivial(&self) -> bool {
        matches!(
            self,
            TirExpr::Local(_) | TirExpr::This | TirExpr::Const(_) | TirExpr::UninitNew { .. }
        )
    }

    /// True if any subexpression reads the given local.
    pub fn reads_local(&self, id: u32) -> bool {
        match self {
            TirExpr::Local(l) => l.id == id,
            TirExpr::This | TirExpr::Const(_) | TirExpr::UninitNew { .. } => false,
            TirExpr::Neg { operand, .. }
            | TirExpr::Convert { operand, .. }
            | TirExpr::InstanceOf { operand, .. }
            | TirExpr::CheckCast { operand, .. } => operand.reads_local(id),
            TirExpr::Binary { left, right, .. } | TirExpr::Cmp { left, right, .. } => {
                left.reads_local(id) || right.reads_local(id)
            }
            TirExpr::FieldLoad { object, .. } => {
                object.as_ref().map(|o| o.reads_local(id)).unwrap_or(false)
            }
            TirExpr::ArrayLoad { array, index, .. } => {
                array.reads_local(id) || index.reads_local(id)
            }
            TirExpr::ArrayLength { array } => array.reads_local(id),
            TirExpr::NewObject { args, .. } => args.iter().any(|a| a.reads_local(id)),
            TirExpr::NewArray { length, .. } => length.reads_local(id),
            TirExpr::NewMultiArray { dims, .. } => dims.iter().any(|d| d.reads_local(id)),
            TirExpr::Invoke { object, args, .. } => {
                object.as_ref().map(|o| o.reads_local(id)).unwrap_or(false)
                    || args.iter().any(|a| a.reads_local(id))
            }
        }
    }
}

/// Branch condition: a comparison of two operands.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub op: CompareOp,
    pub left: Box<TirExpr>,
    pub right: Box<TirExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TirStatement {
    /// Branch target marker.
    Label { offset: u32 },
    Assign {
        target: Local,
        value: TirExpr,
    },
    FieldStore {
        object: Option<TirExpr>,
        field: FieldRef,
        value: TirExpr,
    },
    ArrayStore {
        array: TirExpr,
        index: TirExpr,
        value: TirExpr,
        elem: JavaType,
    },
    /// Evaluate for effect, discard the value.
    Eval(TirExpr),
    MonitorEnter(TirExpr),
    MonitorExit(TirExpr),
    Branch {
        cond: Condition,
        target: u32,
    },
    Goto { target: u32 },
    Switch {
        key: TirExpr,
        cases: Vec<(i32, u32)>,
        default: u32,
    },
    Return(Option<TirExpr>),
    Throw(TirExpr),
    TryBegin { region: u32 },
    TryEnd { region: u32 },
    /// Handler entry: the caught exception is already assigned into `local`.
    CatchBegin {
        region: u32,
        catch_type: Option<String>,
        local: Local,
        handler: u32,
    },
}

impl TirStatement {
    /// Branch targets referenced by this statement.
    pub fn targets(&self) -> Vec<u32> {
        match self {
            TirStatement::Branch { target, .. } | TirStatement::Goto { target } => vec![*target],
            TirStatement::Switch { cases, default, .. } => {
                let mut all: Vec<u32> = cases.iter().map(|(_, t)| *t).collect();
                all.push(*default);
                all
            }
            TirStatement::CatchBegin { handler, .. } => vec![*handler],
            _ => Vec::new(),
        }
    }

    /// Rewrite every referenced target through `f` (label coalescing).
    pub fn retarget(&mut self, f: impl Fn(u32) -> u32) {
        match self {
            TirStatement::Branch { target, .. } | TirStatement::Goto { target } => {
                *target = f(*target)
            }
            TirStatement::Switch { cases, default, .. } => {
                for (_, t) in cases.iter_mut() {
                    *t = f(*t);
                }
                *default = f(*default);
            }
            TirStatement::CatchBegin { handler, .. } => *handler = f(*handler),
            _ => {}
        }
    }
}

/// One exception-handler range, identified by id.
#[derive(Clone, Debug, PartialEq)]
pub struct TryRegion {
    pub id: u32,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// A lowered method body.
#[derive(Clone, Debug, Default)]
pub struct TirBody {
    pub statements: Vec<TirStatement>,
    /// Every local in declaration order: parameters first, then synthetics
    /// in allocation order.
    pub locals: Vec<Local>,
    pub regions: Vec<TryRegion>,
}

impl TirBody {
    /// Locals that are parameters (in slot order).
    pub fn params(&self) -> impl Iterator<Item = &Local> {
        self.locals
            .iter()
            .filter(|l| matches!(l.kind, LocalKind::Param { .. }))
    }

    /// Locals needing a declaration in the emitted body.
    pub fn body_locals(&self) -> impl Iterator<Item = &Local> {
        self.locals
            .iter()
            .filter(|l| !matches!(l.kind, LocalKind::Param { .. }))
    }
}
