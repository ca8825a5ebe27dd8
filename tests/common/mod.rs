//! Shared builders for constructing small in-memory programs without class
//! files on disk.

#![allow(dead_code)]

use classfile_transpiler::code::{AddressedInstruction, Instruction, InstructionStream};
use classfile_transpiler::config::Config;
use classfile_transpiler::descriptor::parse_method_descriptor;
use classfile_transpiler::field_info::FieldAccessFlags;
use classfile_transpiler::method_info::MethodAccessFlags;
use classfile_transpiler::model::{
    mangle, ClassKind, ClassModel, FieldModel, HandlerEntry, MethodModel, ProgramModel,
    OBJECT_CLASS,
};
use classfile_transpiler::types::ClassAccessFlags;

pub fn object_class() -> ClassModel {
    let mut object = ClassModel::new(
        OBJECT_CLASS.to_string(),
        ClassKind::Class,
        ClassAccessFlags::PUBLIC,
    );
    object.methods.push(method(
        OBJECT_CLASS,
        "<init>",
        "()V",
        MethodAccessFlags::PUBLIC,
        vec![at(0, Instruction::Return { kind: None })],
    ));
    object
}

pub fn class(name: &str, super_name: &str) -> ClassModel {
    let mut c = ClassModel::new(
        name.to_string(),
        ClassKind::Class,
        ClassAccessFlags::PUBLIC,
    );
    c.super_name = Some(super_name.to_string());
    c
}

pub fn interface(name: &str) -> ClassModel {
    let mut c = ClassModel::new(
        name.to_string(),
        ClassKind::Interface,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
    );
    c.super_name = Some(OBJECT_CLASS.to_string());
    c
}

pub fn method(
    owner: &str,
    name: &str,
    descriptor: &str,
    access: MethodAccessFlags,
    instructions: InstructionStream,
) -> MethodModel {
    let (params, return_type) =
        parse_method_descriptor(descriptor).expect("test descriptor parses");
    let mut max_locals = params.len() as u16 + 1;
    for insn in &instructions {
        if let Instruction::Store { index, .. } | Instruction::Load { index, .. } =
            &insn.instruction
        {
            max_locals = max_locals.max(index + 2);
        }
    }
    MethodModel {
        owner: owner.to_string(),
        emission_name: mangle::method_emission_name(name, descriptor),
        name: name.to_string(),
        access,
        descriptor: descriptor.to_string(),
        params,
        return_type,
        max_locals,
        handlers: Vec::new(),
        instructions,
        annotations: Vec::new(),
        annotation_default: None,
        vslot: -1,
        tir: None,
    }
}

pub fn abstract_method(owner: &str, name: &str, descriptor: &str) -> MethodModel {
    method(
        owner,
        name,
        descriptor,
        MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        Vec::new(),
    )
}

pub fn field(owner: &str, name: &str, descriptor: &str, access: FieldAccessFlags) -> FieldModel {
    FieldModel {
        owner: owner.to_string(),
        name: name.to_string(),
        emission_name: mangle::field_emission_name(
            owner,
            name,
            access.contains(FieldAccessFlags::STATIC),
        ),
        access,
        descriptor: descriptor.to_string(),
        ty: classfile_transpiler::descriptor::parse_type_descriptor(descriptor)
            .expect("test descriptor parses"),
        constant_value: None,
        annotations: Vec::new(),
    }
}

pub fn handler(start: u32, end: u32, target: u32, catch_type: Option<&str>) -> HandlerEntry {
    HandlerEntry {
        start_pc: start,
        end_pc: end,
        handler_pc: target,
        catch_type: catch_type.map(str::to_string),
    }
}

pub fn at(offset: u32, instruction: Instruction) -> AddressedInstruction {
    AddressedInstruction {
        offset,
        instruction,
    }
}

/// A program containing the root class plus the given classes.
pub fn program(classes: Vec<ClassModel>) -> ProgramModel {
    let mut p = ProgramModel::new();
    let object = object_class();
    p.classes.insert(object.name.clone(), object);
    for c in classes {
        p.classes.insert(c.name.clone(), c);
    }
    p
}

/// Config that keeps everything and emits nowhere interesting.
pub fn test_config() -> Config {
    Config {
        keep_unreachable: true,
        elide_dead_code: false,
        ..Config::default()
    }
}

/// Shorthands for common instruction shapes.
pub mod asm {
    use classfile_transpiler::code::*;

    pub fn iconst(v: i32) -> Instruction {
        Instruction::Push(ConstOperand::Int(v))
    }

    pub fn iload(slot: u16) -> Instruction {
        Instruction::Load {
            kind: ValueKind::Int,
            index: slot,
        }
    }

    pub fn istore(slot: u16) -> Instruction {
        Instruction::Store {
            kind: ValueKind::Int,
            index: slot,
        }
    }

    pub fn aload(slot: u16) -> Instruction {
        Instruction::Load {
            kind: ValueKind::Reference,
            index: slot,
        }
    }

    pub fn astore(slot: u16) -> Instruction {
        Instruction::Store {
            kind: ValueKind::Reference,
            index: slot,
        }
    }

    pub fn iadd() -> Instruction {
        Instruction::Binary {
            op: BinOp::Add,
            kind: ValueKind::Int,
        }
    }

    pub fn ireturn() -> Instruction {
        Instruction::Return {
            kind: Some(ValueKind::Int),
        }
    }

    pub fn areturn() -> Instruction {
        Instruction::Return {
            kind: Some(ValueKind::Reference),
        }
    }

    pub fn vreturn() -> Instruction {
        Instruction::Return { kind: None }
    }

    pub fn invoke_static(class_name: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::Invoke {
            kind: InvokeKind::Static,
            method: method_ref(class_name, name, descriptor),
        }
    }

    pub fn invoke_virtual(class_name: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: method_ref(class_name, name, descriptor),
        }
    }

    pub fn invoke_special(class_name: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::Invoke {
            kind: InvokeKind::Special,
            method: method_ref(class_name, name, descriptor),
        }
    }

    pub fn method_ref(class_name: &str, name: &str, descriptor: &str) -> MethodRef {
        MethodRef {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn field_ref(class_name: &str, name: &str, descriptor: &str) -> FieldRef {
        FieldRef {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    pub fn getstatic(class_name: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::GetStatic {
            field: field_ref(class_name, name, descriptor),
        }
    }

    pub fn putstatic(class_name: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::PutStatic {
            field: field_ref(class_name, name, descriptor),
        }
    }

    pub fn getfield(class_name: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::GetField {
            field: field_ref(class_name, name, descriptor),
        }
    }
}
