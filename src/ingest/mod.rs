//! Ingest: walk the input set, parse each class file and build a
//! [`ProgramModel`] with raw metadata and decoded instruction streams.
//! No cross-class reference is resolved here.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use binrw::BinRead;
use log::{debug, info};
use walkdir::WalkDir;

use crate::attribute_info::{self, AttributeInfo, ElementValue};
use crate::code;
use crate::config::Config;
use crate::constant_info::{self, ConstantInfo};
use crate::descriptor::{parse_method_descriptor, parse_type_descriptor};
use crate::error::{MalformedInput, TranspileError};
use crate::model::{
    mangle, AnnotationModel, AnnotationValue, ClassKind, ClassModel, FieldModel, HandlerEntry,
    MethodModel, ProgramModel,
};
use crate::types::{ClassAccessFlags, ClassFile};

/// Ingest everything under the configured input root.
pub fn ingest(config: &Config) -> Result<ProgramModel, TranspileError> {
    let mut program = ProgramModel::new();
    let root = &config.input_root;

    if root.is_dir() {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                TranspileError::io(root.clone(), e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir failure")
                }))
            })?;
            if entry.file_type().is_file()
                && entry.path().extension().is_some_and(|e| e == "class")
            {
                let bytes = fs::read(entry.path())
                    .map_err(|e| TranspileError::io(entry.path(), e))?;
                add_class_blob(&mut program, &bytes, &entry.path().display().to_string())?;
            }
        }
    } else if is_archive(root) {
        let file = fs::File::open(root).map_err(|e| TranspileError::io(root.clone(), e))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| TranspileError::io(root.clone(), std::io::Error::other(e)))?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| TranspileError::io(root.clone(), std::io::Error::other(e)))?;
            if !entry.name().ends_with(".class") {
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| TranspileError::io(root.clone(), e))?;
            let origin = format!("{}!{}", root.display(), entry.name());
            add_class_blob(&mut program, &bytes, &origin)?;
        }
    } else {
        return Err(TranspileError::io(
            root.clone(),
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "input root is neither a directory nor an archive",
            ),
        ));
    }

    info!("ingested {} classes", program.classes.len());
    Ok(program)
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e == "jar" || e == "zip")
}

fn add_class_blob(
    program: &mut ProgramModel,
    bytes: &[u8],
    origin: &str,
) -> Result<(), TranspileError> {
    let model = ingest_class_bytes(bytes, origin)?;
    debug!("ingested {} from {}", model.name, origin);
    if program.classes.contains_key(&model.name) {
        return Err(MalformedInput {
            class_name: model.name,
            offset: 0,
            message: format!("duplicate class (second copy from {origin})"),
        }
        .into());
    }
    program.classes.insert(model.name.clone(), model);
    Ok(())
}

/// Parse one class-file blob into an unlinked [`ClassModel`].
pub fn ingest_class_bytes(bytes: &[u8], origin: &str) -> Result<ClassModel, MalformedInput> {
    let class_file = ClassFile::read_be(&mut Cursor::new(bytes)).map_err(|e| MalformedInput {
        class_name: origin.to_string(),
        offset: binrw_error_pos(&e),
        message: e.to_string(),
    })?;
    build_class_model(&class_file)
}

fn binrw_error_pos(err: &binrw::Error) -> u64 {
    match err {
        binrw::Error::BadMagic { pos, .. }
        | binrw::Error::AssertFail { pos, .. }
        | binrw::Error::NoVariantMatch { pos }
        | binrw::Error::EnumErrors { pos, .. }
        | binrw::Error::Custom { pos, .. } => *pos,
        binrw::Error::Backtrace(bt) => binrw_error_pos(&bt.error),
        _ => 0,
    }
}

/// Build the class model from a parsed container.
pub fn build_class_model(cf: &ClassFile) -> Result<ClassModel, MalformedInput> {
    let pool = &cf.const_pool;
    let name = cf
        .this_class_name()
        .ok_or_else(|| malformed("<unknown>", "this_class does not resolve"))?
        .to_string();

    let kind = if cf.access_flags.contains(ClassAccessFlags::ANNOTATION) {
        ClassKind::Annotation
    } else if cf.access_flags.contains(ClassAccessFlags::INTERFACE) {
        ClassKind::Interface
    } else if cf.access_flags.contains(ClassAccessFlags::ENUM) {
        ClassKind::Enum
    } else {
        ClassKind::Class
    };

    let mut model = ClassModel::new(name.clone(), kind, cf.access_flags);

    model.super_name = if cf.super_class == 0 {
        None
    } else {
        Some(
            constant_info::get_class_name(pool, cf.super_class)
                .ok_or_else(|| malformed(&name, "super_class does not resolve"))?
                .to_string(),
        )
    };

    for &iface in &cf.interfaces {
        let iface_name = constant_info::get_class_name(pool, iface)
            .ok_or_else(|| malformed(&name, "interface index does not resolve"))?;
        model.interface_names.push(iface_name.to_string());
    }

    for field in &cf.fields {
        let field_name = constant_info::get_utf8(pool, field.name_index)
            .ok_or_else(|| malformed(&name, "field name does not resolve"))?
            .to_string();
        let descriptor = constant_info::get_utf8(pool, field.descriptor_index)
            .ok_or_else(|| malformed(&name, "field descriptor does not resolve"))?
            .to_string();
        let ty = parse_type_descriptor(&descriptor)
            .ok_or_else(|| malformed(&name, format!("bad field descriptor {descriptor}")))?;
        let is_static = field
            .access_flags
            .contains(crate::field_info::FieldAccessFlags::STATIC);

        let mut constant_value = None;
        if let Some(info) = find_attribute(&field.attributes, pool, "ConstantValue") {
            let (_, cv) = attribute_info::constant_value_attribute(info)
                .map_err(|_| malformed(&name, "bad ConstantValue attribute"))?;
            constant_value = constant_operand(pool, cv.constant_value_index);
        }

        let annotations = read_annotations(&field.attributes, pool, &name)?;

        model.fields.push(FieldModel {
            owner: name.clone(),
            emission_name: mangle::field_emission_name(&name, &field_name, is_static),
            name: field_name,
            access: field.access_flags,
            descriptor,
            ty,
            constant_value,
            annotations,
        });
    }

    for method in &cf.methods {
        let method_name = constant_info::get_utf8(pool, method.name_index)
            .ok_or_else(|| malformed(&name, "method name does not resolve"))?
            .to_string();
        let descriptor = constant_info::get_utf8(pool, method.descriptor_index)
            .ok_or_else(|| malformed(&name, "method descriptor does not resolve"))?
            .to_string();
        let (params, return_type) = parse_method_descriptor(&descriptor)
            .ok_or_else(|| malformed(&name, format!("bad method descriptor {descriptor}")))?;

        let mut max_locals = 0;
        let mut handlers = Vec::new();
        let mut instructions = Vec::new();
        if let Some(info) = find_attribute(&method.attributes, pool, "Code") {
            let (_, code_attr) = attribute_info::code_attribute(info)
                .map_err(|_| malformed(&name, format!("bad Code attribute in {method_name}")))?;
            max_locals = code_attr.max_locals;
            for entry in &code_attr.exception_table {
                let catch_type = if entry.catch_type == 0 {
                    None
                } else {
                    Some(
                        constant_info::get_class_name(pool, entry.catch_type)
                            .ok_or_else(|| malformed(&name, "handler catch type does not resolve"))?
                            .to_string(),
                    )
                };
                handlers.push(HandlerEntry {
                    start_pc: entry.start_pc as u32,
                    end_pc: entry.end_pc as u32,
                    handler_pc: entry.handler_pc as u32,
                    catch_type,
                });
            }
            instructions = code::decode_code(&code_attr.code, pool).map_err(|e| MalformedInput {
                class_name: name.clone(),
                offset: e.offset as u64,
                message: format!("{} in {}{}", e.message, method_name, descriptor),
            })?;
        }

        let annotations = read_annotations(&method.attributes, pool, &name)?;
        let mut annotation_default = None;
        if let Some(info) = find_attribute(&method.attributes, pool, "AnnotationDefault") {
            let (_, attr) = attribute_info::annotation_default_attribute(info)
                .map_err(|_| malformed(&name, "bad AnnotationDefault attribute"))?;
            annotation_default = Some(element_value(pool, &attr.default_value, &name)?);
        }

        model.methods.push(MethodModel {
            owner: name.clone(),
            emission_name: mangle::method_emission_name(&method_name, &descriptor),
            name: method_name,
            access: method.access_flags,
            descriptor,
            params,
            return_type,
            max_locals,
            handlers,
            instructions,
            annotations,
            annotation_default,
            vslot: -1,
            tir: None,
        });
    }

    model.annotations = read_annotations(&cf.attributes, pool, &name)?;
    if let Some(info) = find_attribute(&cf.attributes, pool, "SourceFile") {
        let (_, sf) = attribute_info::source_file_attribute(info)
            .map_err(|_| malformed(&name, "bad SourceFile attribute"))?;
        model.source_file = constant_info::get_utf8(pool, sf.sourcefile_index).map(str::to_string);
    }

    Ok(model)
}

fn malformed(class_name: &str, message: impl Into<String>) -> MalformedInput {
    MalformedInput {
        class_name: class_name.to_string(),
        offset: 0,
        message: message.into(),
    }
}

fn find_attribute<'a>(
    attrs: &'a [AttributeInfo],
    pool: &[ConstantInfo],
    name: &str,
) -> Option<&'a [u8]> {
    attrs.iter().find_map(|a| {
        (constant_info::get_utf8(pool, a.attribute_name_index) == Some(name))
            .then_some(a.info.as_slice())
    })
}

fn constant_operand(pool: &[ConstantInfo], index: u16) -> Option<code::ConstOperand> {
    match pool.get((index as usize).checked_sub(1)?)? {
        ConstantInfo::Integer(c) => Some(code::ConstOperand::Int(c.value)),
        ConstantInfo::Long(c) => Some(code::ConstOperand::Long(c.value)),
        ConstantInfo::Float(c) => Some(code::ConstOperand::Float(c.value)),
        ConstantInfo::Double(c) => Some(code::ConstOperand::Double(c.value)),
        ConstantInfo::String(c) => {
            constant_info::get_utf8(pool, c.string_index).map(|s| code::ConstOperand::Str(s.into()))
        }
        _ => None,
    }
}

fn read_annotations(
    attrs: &[AttributeInfo],
    pool: &[ConstantInfo],
    class_name: &str,
) -> Result<Vec<AnnotationModel>, MalformedInput> {
    let mut out = Vec::new();
    for attr_name in ["RuntimeVisibleAnnotations", "RuntimeInvisibleAnnotations"] {
        if let Some(info) = find_attribute(attrs, pool, attr_name) {
            let (_, parsed) = attribute_info::annotations_attribute(info)
                .map_err(|_| malformed(class_name, format!("bad {attr_name} attribute")))?;
            for ann in &parsed.annotations {
                out.push(annotation_model(pool, ann, class_name)?);
            }
        }
    }
    Ok(out)
}

fn annotation_model(
    pool: &[ConstantInfo],
    ann: &attribute_info::RuntimeAnnotation,
    class_name: &str,
) -> Result<AnnotationModel, MalformedInput> {
    let type_desc = constant_info::get_utf8(pool, ann.type_index)
        .ok_or_else(|| malformed(class_name, "annotation type does not resolve"))?;
    let type_name = parse_type_descriptor(type_desc)
        .and_then(|t| t.referent().map(str::to_string))
        .ok_or_else(|| malformed(class_name, format!("bad annotation type {type_desc}")))?;

    let mut values = std::collections::BTreeMap::new();
    for pair in &ann.element_value_pairs {
        let element = constant_info::get_utf8(pool, pair.element_name_index)
            .ok_or_else(|| malformed(class_name, "annotation element name does not resolve"))?
            .to_string();
        values.insert(element, element_value(pool, &pair.value, class_name)?);
    }
    Ok(AnnotationModel { type_name, values })
}

fn element_value(
    pool: &[ConstantInfo],
    value: &ElementValue,
    class_name: &str,
) -> Result<AnnotationValue, MalformedInput> {
    Ok(match value {
        ElementValue::ConstValueIndex { tag, value } => {
            let operand = match tag {
                's' => constant_info::get_utf8(pool, *value).map(|s| code::ConstOperand::Str(s.into())),
                _ => constant_operand(pool, *value),
            }
            .ok_or_else(|| malformed(class_name, "annotation constant does not resolve"))?;
            AnnotationValue::Const(operand)
        }
        ElementValue::EnumConst {
            type_name_index,
            const_name_index,
        } => {
            let type_desc = constant_info::get_utf8(pool, *type_name_index)
                .ok_or_else(|| malformed(class_name, "enum element type does not resolve"))?;
            let type_name = parse_type_descriptor(type_desc)
                .and_then(|t| t.referent().map(str::to_string))
                .unwrap_or_else(|| type_desc.to_string());
            let const_name = constant_info::get_utf8(pool, *const_name_index)
                .ok_or_else(|| malformed(class_name, "enum element name does not resolve"))?
                .to_string();
            AnnotationValue::EnumConst {
                type_name,
                const_name,
            }
        }
        ElementValue::ClassInfoIndex(index) => {
            let desc = constant_info::get_utf8(pool, *index)
                .ok_or_else(|| malformed(class_name, "class element does not resolve"))?;
            let referent = parse_type_descriptor(desc)
                .and_then(|t| t.referent().map(str::to_string))
                .unwrap_or_else(|| desc.to_string());
            AnnotationValue::ClassRef(referent)
        }
        ElementValue::AnnotationValue(nested) => {
            AnnotationValue::Nested(annotation_model(pool, nested, class_name)?)
        }
        ElementValue::ElementArray(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(element_value(pool, item, class_name)?);
            }
            AnnotationValue::Array(out)
        }
    })
}
