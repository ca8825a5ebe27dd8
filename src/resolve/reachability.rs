//! Reachability marking: from the configured entry classes, mark the closure
//! of every referenced class so the emitter can elide the rest.

use std::collections::BTreeSet;

use log::{debug, warn};

use crate::code::Instruction;
use crate::config::Config;
use crate::descriptor::{parse_method_descriptor, parse_type_descriptor, JavaType};
use crate::model::{AnnotationModel, AnnotationValue, ClassModel, ProgramModel};

/// Mark every class reachable from the root set. With `keep_unreachable`
/// everything is marked.
pub fn mark_reachable(program: &mut ProgramModel, config: &Config) {
    if config.keep_unreachable || config.entry_classes.is_empty() {
        for class in program.classes.values_mut() {
            class.reachable = true;
        }
        return;
    }

    let mut marked: BTreeSet<String> = BTreeSet::new();
    let mut worklist: Vec<String> = Vec::new();
    for entry in &config.entry_classes {
        if program.classes.contains_key(entry) {
            worklist.push(entry.clone());
        } else {
            warn!("entry class {entry} is not in the input set");
        }
    }

    while let Some(name) = worklist.pop() {
        if !marked.insert(name.clone()) {
            continue;
        }
        let Some(class) = program.classes.get(&name) else {
            continue;
        };
        let mut refs = BTreeSet::new();
        collect_class_references(class, &mut refs);
        for referenced in refs {
            if config.is_runtime_provided(&referenced) {
                continue;
            }
            if program.classes.contains_key(&referenced) && !marked.contains(&referenced) {
                worklist.push(referenced);
            }
        }
    }

    debug!("{} of {} classes reachable", marked.len(), program.classes.len());
    for class in program.classes.values_mut() {
        class.reachable = marked.contains(&class.name);
    }
}

/// Every class name a class pulls in: supertypes, signature types, handler
/// catch types, annotation types and everything its method bodies touch.
fn collect_class_references(class: &ClassModel, refs: &mut BTreeSet<String>) {
    if let Some(super_name) = &class.super_name {
        refs.insert(super_name.clone());
    }
    for iface in &class.interface_names {
        refs.insert(iface.clone());
    }
    for ann in &class.annotations {
        collect_annotation(ann, refs);
    }
    for field in &class.fields {
        collect_type(&field.ty, refs);
        for ann in &field.annotations {
            collect_annotation(ann, refs);
        }
    }
    for method in &class.methods {
        for p in &method.params {
            collect_type(p, refs);
        }
        collect_type(&method.return_type, refs);
        for handler in &method.handlers {
            if let Some(t) = &handler.catch_type {
                refs.insert(t.clone());
            }
        }
        for ann in &method.annotations {
            collect_annotation(ann, refs);
        }
        for insn in &method.instructions {
            collect_instruction(&insn.instruction, refs);
        }
    }
}

fn collect_type(ty: &JavaType, refs: &mut BTreeSet<String>) {
    if let Some(name) = ty.referent() {
        refs.insert(name.to_string());
    }
}

fn collect_named(name: &str, refs: &mut BTreeSet<String>) {
    // Array class operands carry descriptors; take the element class.
    if name.starts_with('[') {
        if let Some(ty) = parse_type_descriptor(name) {
            collect_type(&ty, refs);
        }
    } else {
        refs.insert(name.to_string());
    }
}

fn collect_descriptor(descriptor: &str, refs: &mut BTreeSet<String>) {
    if let Some((params, ret)) = parse_method_descriptor(descriptor) {
        for p in &params {
            collect_type(p, refs);
        }
        collect_type(&ret, refs);
    }
}

fn collect_annotation(ann: &AnnotationModel, refs: &mut BTreeSet<String>) {
    refs.insert(ann.type_name.clone());
    for value in ann.values.values() {
        collect_annotation_value(value, refs);
    }
}

fn collect_annotation_value(value: &AnnotationValue, refs: &mut BTreeSet<String>) {
    match value {
        AnnotationValue::EnumConst { type_name, .. } => {
            refs.insert(type_name.clone());
        }
        AnnotationValue::ClassRef(name) => collect_named(name, refs),
        AnnotationValue::Nested(nested) => collect_annotation(nested, refs),
        AnnotationValue::Array(items) => {
            for item in items {
                collect_annotation_value(item, refs);
            }
        }
        AnnotationValue::Const(_) => {}
    }
}

fn collect_instruction(insn: &Instruction, refs: &mut BTreeSet<String>) {
    match insn {
        Instruction::GetStatic { field }
        | Instruction::PutStatic { field }
        | Instruction::GetField { field }
        | Instruction::PutField { field } => {
            collect_named(&field.class_name, refs);
            if let Some(ty) = parse_type_descriptor(&field.descriptor) {
                collect_type(&ty, refs);
            }
        }
        Instruction::Invoke { method, .. } => {
            collect_named(&method.class_name, refs);
            collect_descriptor(&method.descriptor, refs);
        }
        Instruction::InvokeDynamic { descriptor, .. } => collect_descriptor(descriptor, refs),
        Instruction::New { class_name }
        | Instruction::CheckCast { class_name }
        | Instruction::InstanceOf { class_name } => collect_named(class_name, refs),
        Instruction::NewArray { elem } => collect_type(elem, refs),
        Instruction::MultiNewArray { array_type, .. } => collect_type(array_type, refs),
        Instruction::Push(crate::code::ConstOperand::Class(name)) => collect_named(name, refs),
        _ => {}
    }
}
