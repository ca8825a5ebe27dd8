//! Bytecode decoding: one linear pass from the raw code array to a
//! normalized instruction stream. Normalization folds the per-index opcode
//! families (`iload_0`..`iload_3`, wide forms) into a single variant per
//! operation, converts branch offsets from relative to absolute, and
//! resolves constant-pool operands to names and descriptors immediately.

use crate::constant_info::{self, ConstantInfo};
use crate::descriptor::{newarray_type, JavaType};

/// Computational kind of a stack slot, as the load/store/arith opcode
/// families distinguish them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// The default JavaType for a slot of this kind when nothing more
    /// precise is known.
    pub fn java_type(self) -> JavaType {
        match self {
            ValueKind::Int => JavaType::Int,
            ValueKind::Long => JavaType::Long,
            ValueKind::Float => JavaType::Float,
            ValueKind::Double => JavaType::Double,
            ValueKind::Reference => JavaType::Reference("java/lang/Object".into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl BinOp {
    /// C-family source token.
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CompareOp {
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// The lcmp/fcmpl/fcmpg/dcmpl/dcmpg family. The L/G suffix decides which
/// way NaN compares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpKind {
    Long,
    FloatL,
    FloatG,
    DoubleL,
    DoubleG,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Constant operand pushed by the ldc family and the short const forms.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstOperand {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Class(String),
    Null,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

/// One normalized instruction. Branch targets are absolute byte offsets.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    Push(ConstOperand),
    Load { kind: ValueKind, index: u16 },
    Store { kind: ValueKind, index: u16 },
    ArrayLoad { elem: JavaType },
    ArrayStore { elem: JavaType },
    Pop { wide: bool },
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Binary { op: BinOp, kind: ValueKind },
    Neg { kind: ValueKind },
    Iinc { index: u16, amount: i32 },
    Convert { target: JavaType },
    Cmp { kind: CmpKind },
    IfZero { op: CompareOp, target: u32 },
    IfIntCmp { op: CompareOp, target: u32 },
    IfRefCmp { equal: bool, target: u32 },
    IfNull { is_null: bool, target: u32 },
    Goto { target: u32 },
    Jsr { target: u32 },
    Ret { index: u16 },
    TableSwitch { default: u32, low: i32, high: i32, targets: Vec<u32> },
    LookupSwitch { default: u32, pairs: Vec<(i32, u32)> },
    Return { kind: Option<ValueKind> },
    GetStatic { field: FieldRef },
    PutStatic { field: FieldRef },
    GetField { field: FieldRef },
    PutField { field: FieldRef },
    Invoke { kind: InvokeKind, method: MethodRef },
    InvokeDynamic { bootstrap: u16, name: String, descriptor: String },
    New { class_name: String },
    NewArray { elem: JavaType },
    MultiNewArray { array_type: JavaType, dims: u8 },
    ArrayLength,
    Throw,
    CheckCast { class_name: String },
    InstanceOf { class_name: String },
    MonitorEnter,
    MonitorExit,
}

impl Instruction {
    /// All branch targets this instruction can transfer control to,
    /// excluding fallthrough.
    pub fn branch_targets(&self) -> Vec<u32> {
        match self {
            Instruction::IfZero { target, .. }
            | Instruction::IfIntCmp { target, .. }
            | Instruction::IfRefCmp { target, .. }
            | Instruction::IfNull { target, .. }
            | Instruction::Goto { target }
            | Instruction::Jsr { target } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut all: Vec<u32> = pairs.iter().map(|(_, t)| *t).collect();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }

    /// True if control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Instruction::Goto { .. }
                | Instruction::TableSwitch { .. }
                | Instruction::LookupSwitch { .. }
                | Instruction::Return { .. }
                | Instruction::Throw
                | Instruction::Ret { .. }
        )
    }
}

/// An instruction paired with its bytecode offset.
#[derive(Clone, Debug, PartialEq)]
pub struct AddressedInstruction {
    pub offset: u32,
    pub instruction: Instruction,
}

pub type InstructionStream = Vec<AddressedInstruction>;

/// Decode failure: byte offset into the code array plus a description.
#[derive(Clone, Debug)]
pub struct DecodeError {
    pub offset: u32,
    pub message: String,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(((self.u8()? as u16) << 8) | self.u8()? as u16)
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(self.u16()? as i16)
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(((self.u16()? as i32) << 16) | self.u16()? as i32 & 0xffff)
    }

    fn truncated(&self) -> DecodeError {
        DecodeError {
            offset: self.pos as u32,
            message: "code array ends mid-instruction".into(),
        }
    }

    fn fail(&self, at: u32, message: impl Into<String>) -> DecodeError {
        DecodeError {
            offset: at,
            message: message.into(),
        }
    }
}

fn abs_target(base: u32, rel: i32) -> u32 {
    (base as i64 + rel as i64) as u32
}

/// Decode the whole code array in one linear pass.
pub fn decode_code(
    code: &[u8],
    const_pool: &[ConstantInfo],
) -> Result<InstructionStream, DecodeError> {
    let mut cur = Cursor {
        bytes: code,
        pos: 0,
    };
    let mut stream = Vec::new();
    while cur.pos < code.len() {
        let offset = cur.pos as u32;
        let instruction = decode_one(&mut cur, offset, const_pool)?;
        stream.push(AddressedInstruction {
            offset,
            instruction,
        });
    }
    Ok(stream)
}

fn field_ref(
    cur: &Cursor<'_>,
    offset: u32,
    const_pool: &[ConstantInfo],
    index: u16,
) -> Result<FieldRef, DecodeError> {
    let (class_name, name, descriptor, _) = constant_info::resolve_ref(const_pool, index)
        .ok_or_else(|| cur.fail(offset, format!("bad field ref #{index}")))?;
    Ok(FieldRef {
        class_name: class_name.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    })
}

fn method_ref(
    cur: &Cursor<'_>,
    offset: u32,
    const_pool: &[ConstantInfo],
    index: u16,
) -> Result<MethodRef, DecodeError> {
    let (class_name, name, descriptor, _) = constant_info::resolve_ref(const_pool, index)
        .ok_or_else(|| cur.fail(offset, format!("bad method ref #{index}")))?;
    Ok(MethodRef {
        class_name: class_name.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
    })
}

fn class_operand(
    cur: &Cursor<'_>,
    offset: u32,
    const_pool: &[ConstantInfo],
    index: u16,
) -> Result<String, DecodeError> {
    constant_info::get_class_name(const_pool, index)
        .map(str::to_string)
        .ok_or_else(|| cur.fail(offset, format!("bad class ref #{index}")))
}

fn loadable_constant(
    cur: &Cursor<'_>,
    offset: u32,
    const_pool: &[ConstantInfo],
    index: u16,
) -> Result<ConstOperand, DecodeError> {
    match const_pool.get((index as usize).wrapping_sub(1)) {
        Some(ConstantInfo::Integer(c)) => Ok(ConstOperand::Int(c.value)),
        Some(ConstantInfo::Float(c)) => Ok(ConstOperand::Float(c.value)),
        Some(ConstantInfo::Long(c)) => Ok(ConstOperand::Long(c.value)),
        Some(ConstantInfo::Double(c)) => Ok(ConstOperand::Double(c.value)),
        Some(ConstantInfo::String(c)) => constant_info::get_utf8(const_pool, c.string_index)
            .map(|s| ConstOperand::Str(s.to_string()))
            .ok_or_else(|| cur.fail(offset, format!("bad string constant #{index}"))),
        Some(ConstantInfo::Class(c)) => constant_info::get_utf8(const_pool, c.name_index)
            .map(|s| ConstOperand::Class(s.to_string()))
            .ok_or_else(|| cur.fail(offset, format!("bad class constant #{index}"))),
        _ => Err(cur.fail(offset, format!("constant #{index} is not loadable"))),
    }
}

fn decode_one(
    cur: &mut Cursor<'_>,
    offset: u32,
    const_pool: &[ConstantInfo],
) -> Result<Instruction, DecodeError> {
    use Instruction::*;

    let opcode = cur.u8()?;
    let insn = match opcode {
        0x00 => Nop,
        0x01 => Push(ConstOperand::Null),
        0x02..=0x08 => Push(ConstOperand::Int(opcode as i32 - 0x03)),
        0x09 | 0x0a => Push(ConstOperand::Long((opcode - 0x09) as i64)),
        0x0b..=0x0d => Push(ConstOperand::Float((opcode - 0x0b) as f32)),
        0x0e | 0x0f => Push(ConstOperand::Double((opcode - 0x0e) as f64)),
        0x10 => Push(ConstOperand::Int(cur.u8()? as i8 as i32)),
        0x11 => Push(ConstOperand::Int(cur.i16()? as i32)),
        0x12 => {
            let index = cur.u8()? as u16;
            Push(loadable_constant(cur, offset, const_pool, index)?)
        }
        0x13 | 0x14 => {
            let index = cur.u16()?;
            Push(loadable_constant(cur, offset, const_pool, index)?)
        }

        // Loads
        0x15..=0x19 => {
            let kind = kind_of(opcode - 0x15);
            Load {
                kind,
                index: cur.u8()? as u16,
            }
        }
        0x1a..=0x2d => {
            let family = (opcode - 0x1a) / 4;
            Load {
                kind: kind_of(family),
                index: ((opcode - 0x1a) % 4) as u16,
            }
        }
        0x2e..=0x35 => ArrayLoad {
            elem: array_elem(opcode - 0x2e),
        },

        // Stores
        0x36..=0x3a => {
            let kind = kind_of(opcode - 0x36);
            Store {
                kind,
                index: cur.u8()? as u16,
            }
        }
        0x3b..=0x4e => {
            let family = (opcode - 0x3b) / 4;
            Store {
                kind: kind_of(family),
                index: ((opcode - 0x3b) % 4) as u16,
            }
        }
        0x4f..=0x56 => ArrayStore {
            elem: array_elem(opcode - 0x4f),
        },

        // Stack manipulation
        0x57 => Pop { wide: false },
        0x58 => Pop { wide: true },
        0x59 => Dup,
        0x5a => DupX1,
        0x5b => DupX2,
        0x5c => Dup2,
        0x5d => Dup2X1,
        0x5e => Dup2X2,
        0x5f => Swap,

        // Arithmetic
        0x60..=0x63 => binary(BinOp::Add, opcode - 0x60),
        0x64..=0x67 => binary(BinOp::Sub, opcode - 0x64),
        0x68..=0x6b => binary(BinOp::Mul, opcode - 0x68),
        0x6c..=0x6f => binary(BinOp::Div, opcode - 0x6c),
        0x70..=0x73 => binary(BinOp::Rem, opcode - 0x70),
        0x74..=0x77 => Neg {
            kind: kind_of(opcode - 0x74),
        },
        0x78 | 0x79 => binary(BinOp::Shl, opcode - 0x78),
        0x7a | 0x7b => binary(BinOp::Shr, opcode - 0x7a),
        0x7c | 0x7d => binary(BinOp::Ushr, opcode - 0x7c),
        0x7e | 0x7f => binary(BinOp::And, opcode - 0x7e),
        0x80 | 0x81 => binary(BinOp::Or, opcode - 0x80),
        0x82 | 0x83 => binary(BinOp::Xor, opcode - 0x82),

        0x84 => Iinc {
            index: cur.u8()? as u16,
            amount: cur.u8()? as i8 as i32,
        },

        // Conversions
        0x85 => Convert { target: JavaType::Long },
        0x86 => Convert { target: JavaType::Float },
        0x87 => Convert { target: JavaType::Double },
        0x88 => Convert { target: JavaType::Int },
        0x89 => Convert { target: JavaType::Float },
        0x8a => Convert { target: JavaType::Double },
        0x8b => Convert { target: JavaType::Int },
        0x8c => Convert { target: JavaType::Long },
        0x8d => Convert { target: JavaType::Double },
        0x8e => Convert { target: JavaType::Int },
        0x8f => Convert { target: JavaType::Long },
        0x90 => Convert { target: JavaType::Float },
        0x91 => Convert { target: JavaType::Byte },
        0x92 => Convert { target: JavaType::Char },
        0x93 => Convert { target: JavaType::Short },

        // Comparisons
        0x94 => Cmp { kind: CmpKind::Long },
        0x95 => Cmp { kind: CmpKind::FloatL },
        0x96 => Cmp { kind: CmpKind::FloatG },
        0x97 => Cmp { kind: CmpKind::DoubleL },
        0x98 => Cmp { kind: CmpKind::DoubleG },

        // Branches
        0x99..=0x9e => IfZero {
            op: compare_of(opcode - 0x99),
            target: abs_target(offset, cur.i16()? as i32),
        },
        0x9f..=0xa4 => IfIntCmp {
            op: compare_of(opcode - 0x9f),
            target: abs_target(offset, cur.i16()? as i32),
        },
        0xa5 | 0xa6 => IfRefCmp {
            equal: opcode == 0xa5,
            target: abs_target(offset, cur.i16()? as i32),
        },
        0xa7 => Goto {
            target: abs_target(offset, cur.i16()? as i32),
        },
        0xa8 => Jsr {
            target: abs_target(offset, cur.i16()? as i32),
        },
        0xa9 => Ret {
            index: cur.u8()? as u16,
        },

        0xaa => {
            // 0-3 bytes of alignment padding after the opcode
            while (cur.pos % 4) != 0 {
                cur.u8()?;
            }
            let default = abs_target(offset, cur.i32()?);
            let low = cur.i32()?;
            let high = cur.i32()?;
            if high < low {
                return Err(cur.fail(offset, "tableswitch high < low"));
            }
            let n = (high - low + 1) as usize;
            let mut targets = Vec::with_capacity(n);
            for _ in 0..n {
                targets.push(abs_target(offset, cur.i32()?));
            }
            TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        0xab => {
            while (cur.pos % 4) != 0 {
                cur.u8()?;
            }
            let default = abs_target(offset, cur.i32()?);
            let npairs = cur.i32()?;
            if npairs < 0 {
                return Err(cur.fail(offset, "lookupswitch negative pair count"));
            }
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let key = cur.i32()?;
                pairs.push((key, abs_target(offset, cur.i32()?)));
            }
            LookupSwitch { default, pairs }
        }

        // Returns
        0xac..=0xb0 => Return {
            kind: Some(kind_of(opcode - 0xac)),
        },
        0xb1 => Return { kind: None },

        // Field access
        0xb2 => {
            let index = cur.u16()?;
            GetStatic {
                field: field_ref(cur, offset, const_pool, index)?,
            }
        }
        0xb3 => {
            let index = cur.u16()?;
            PutStatic {
                field: field_ref(cur, offset, const_pool, index)?,
            }
        }
        0xb4 => {
            let index = cur.u16()?;
            GetField {
                field: field_ref(cur, offset, const_pool, index)?,
            }
        }
        0xb5 => {
            let index = cur.u16()?;
            PutField {
                field: field_ref(cur, offset, const_pool, index)?,
            }
        }

        // Invocations
        0xb6 => {
            let index = cur.u16()?;
            Invoke {
                kind: InvokeKind::Virtual,
                method: method_ref(cur, offset, const_pool, index)?,
            }
        }
        0xb7 => {
            let index = cur.u16()?;
            Invoke {
                kind: InvokeKind::Special,
                method: method_ref(cur, offset, const_pool, index)?,
            }
        }
        0xb8 => {
            let index = cur.u16()?;
            Invoke {
                kind: InvokeKind::Static,
                method: method_ref(cur, offset, const_pool, index)?,
            }
        }
        0xb9 => {
            let index = cur.u16()?;
            cur.u8()?; // historical arg count
            cur.u8()?; // always zero
            Invoke {
                kind: InvokeKind::Interface,
                method: method_ref(cur, offset, const_pool, index)?,
            }
        }
        0xba => {
            let index = cur.u16()?;
            cur.u8()?;
            cur.u8()?;
            match const_pool.get((index as usize).wrapping_sub(1)) {
                Some(ConstantInfo::InvokeDynamic(indy)) => {
                    let (name, descriptor) =
                        constant_info::get_name_and_type(const_pool, indy.name_and_type_index)
                            .ok_or_else(|| cur.fail(offset, "bad invokedynamic name-and-type"))?;
                    InvokeDynamic {
                        bootstrap: indy.bootstrap_method_attr_index,
                        name: name.to_string(),
                        descriptor: descriptor.to_string(),
                    }
                }
                _ => return Err(cur.fail(offset, format!("bad invokedynamic ref #{index}"))),
            }
        }

        // Object creation
        0xbb => {
            let index = cur.u16()?;
            New {
                class_name: class_operand(cur, offset, const_pool, index)?,
            }
        }
        0xbc => {
            let atype = cur.u8()?;
            NewArray {
                elem: newarray_type(atype)
                    .ok_or_else(|| cur.fail(offset, format!("bad newarray type {atype}")))?,
            }
        }
        0xbd => {
            let index = cur.u16()?;
            let name = class_operand(cur, offset, const_pool, index)?;
            let elem = if name.starts_with('[') {
                crate::descriptor::parse_type_descriptor(&name)
                    .ok_or_else(|| cur.fail(offset, format!("bad array component {name}")))?
            } else {
                JavaType::Reference(name)
            };
            NewArray { elem }
        }
        0xbe => ArrayLength,
        0xbf => Throw,

        0xc0 => {
            let index = cur.u16()?;
            CheckCast {
                class_name: class_operand(cur, offset, const_pool, index)?,
            }
        }
        0xc1 => {
            let index = cur.u16()?;
            InstanceOf {
                class_name: class_operand(cur, offset, const_pool, index)?,
            }
        }
        0xc2 => MonitorEnter,
        0xc3 => MonitorExit,

        0xc4 => {
            // wide prefix: 16-bit local index forms
            let widened = cur.u8()?;
            match widened {
                0x15..=0x19 => Load {
                    kind: kind_of(widened - 0x15),
                    index: cur.u16()?,
                },
                0x36..=0x3a => Store {
                    kind: kind_of(widened - 0x36),
                    index: cur.u16()?,
                },
                0x84 => Iinc {
                    index: cur.u16()?,
                    amount: cur.i16()? as i32,
                },
                0xa9 => Ret { index: cur.u16()? },
                other => {
                    return Err(cur.fail(offset, format!("wide prefix on opcode {other:#04x}")))
                }
            }
        }
        0xc5 => {
            let index = cur.u16()?;
            let dims = cur.u8()?;
            let name = class_operand(cur, offset, const_pool, index)?;
            let array_type = crate::descriptor::parse_type_descriptor(&name)
                .ok_or_else(|| cur.fail(offset, format!("bad array type {name}")))?;
            MultiNewArray { array_type, dims }
        }
        0xc6 => IfNull {
            is_null: true,
            target: abs_target(offset, cur.i16()? as i32),
        },
        0xc7 => IfNull {
            is_null: false,
            target: abs_target(offset, cur.i16()? as i32),
        },
        0xc8 => Goto {
            target: abs_target(offset, cur.i32()?),
        },
        0xc9 => Jsr {
            target: abs_target(offset, cur.i32()?),
        },

        other => return Err(cur.fail(offset, format!("unknown opcode {other:#04x}"))),
    };
    Ok(insn)
}

fn compare_of(family: u8) -> CompareOp {
    match family {
        0 => CompareOp::Eq,
        1 => CompareOp::Ne,
        2 => CompareOp::Lt,
        3 => CompareOp::Ge,
        4 => CompareOp::Gt,
        _ => CompareOp::Le,
    }
}

fn kind_of(family: u8) -> ValueKind {
    match family {
        0 => ValueKind::Int,
        1 => ValueKind::Long,
        2 => ValueKind::Float,
        3 => ValueKind::Double,
        _ => ValueKind::Reference,
    }
}

fn binary(op: BinOp, family: u8) -> Instruction {
    Instruction::Binary {
        op,
        kind: kind_of(family),
    }
}

fn array_elem(family: u8) -> JavaType {
    match family {
        0 => JavaType::Int,
        1 => JavaType::Long,
        2 => JavaType::Float,
        3 => JavaType::Double,
        4 => JavaType::Reference("java/lang/Object".into()),
        5 => JavaType::Byte,
        6 => JavaType::Char,
        _ => JavaType::Short,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_const_add_return() {
        // iconst_2, iconst_3, iadd, ireturn
        let stream = decode_code(&[0x05, 0x06, 0x60, 0xac], &[]).unwrap();
        assert_eq!(stream.len(), 4);
        assert_eq!(stream[0].instruction, Instruction::Push(ConstOperand::Int(2)));
        assert_eq!(stream[1].instruction, Instruction::Push(ConstOperand::Int(3)));
        assert_eq!(
            stream[2].instruction,
            Instruction::Binary {
                op: BinOp::Add,
                kind: ValueKind::Int
            }
        );
        assert_eq!(
            stream[3].instruction,
            Instruction::Return {
                kind: Some(ValueKind::Int)
            }
        );
    }

    #[test]
    fn test_decode_short_load_store_forms() {
        // iload_1, istore_2, aload_0
        let stream = decode_code(&[0x1b, 0x3d, 0x2a], &[]).unwrap();
        assert_eq!(
            stream[0].instruction,
            Instruction::Load {
                kind: ValueKind::Int,
                index: 1
            }
        );
        assert_eq!(
            stream[1].instruction,
            Instruction::Store {
                kind: ValueKind::Int,
                index: 2
            }
        );
        assert_eq!(
            stream[2].instruction,
            Instruction::Load {
                kind: ValueKind::Reference,
                index: 0
            }
        );
    }

    #[test]
    fn test_decode_branch_targets_absolute() {
        // 0: iload_0; 1: ifeq +5 (-> 6); 4: iconst_0; 5: ireturn; 6: iconst_1; 7: ireturn
        let code = [0x1a, 0x99, 0x00, 0x05, 0x03, 0xac, 0x04, 0xac];
        let stream = decode_code(&code, &[]).unwrap();
        assert_eq!(
            stream[1].instruction,
            Instruction::IfZero {
                op: CompareOp::Eq,
                target: 6
            }
        );
        assert_eq!(stream[1].offset, 1);
    }

    #[test]
    fn test_decode_tableswitch_padding() {
        // offset 0: tableswitch with 3 bytes padding, default +16, low 0, high 1,
        // two targets
        let mut code = vec![0xaa, 0, 0, 0];
        code.extend_from_slice(&16i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&24i32.to_be_bytes());
        let stream = decode_code(&code, &[]).unwrap();
        match &stream[0].instruction {
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            } => {
                assert_eq!(*default, 16);
                assert_eq!((*low, *high), (0, 1));
                assert_eq!(targets, &vec![20, 24]);
            }
            other => panic!("expected tableswitch, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_truncated_is_error() {
        assert!(decode_code(&[0x10], &[]).is_err()); // bipush missing operand
    }

    #[test]
    fn test_decode_wide_forms() {
        // wide iload 256; wide iinc 256 by -1
        let code = [0xc4, 0x15, 0x01, 0x00, 0xc4, 0x84, 0x01, 0x00, 0xff, 0xff];
        let stream = decode_code(&code, &[]).unwrap();
        assert_eq!(
            stream[0].instruction,
            Instruction::Load {
                kind: ValueKind::Int,
                index: 256
            }
        );
        assert_eq!(
            stream[1].instruction,
            Instruction::Iinc {
                index: 256,
                amount: -1
            }
        );
    }
}
