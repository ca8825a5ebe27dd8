use std::io::Cursor;

use binrw::BinWrite;

use classfile_transpiler::attribute_info::AttributeInfo;
use classfile_transpiler::code::{BinOp, Instruction, ValueKind};
use classfile_transpiler::constant_info::*;
use classfile_transpiler::field_info::{FieldAccessFlags, FieldInfo};
use classfile_transpiler::ingest;
use classfile_transpiler::method_info::{MethodAccessFlags, MethodInfo};
use classfile_transpiler::types::{ClassAccessFlags, ClassFile};

fn utf8(s: &str) -> ConstantInfo {
    ConstantInfo::Utf8(Utf8Constant {
        utf8_string: s.to_string(),
    })
}

fn class_const(name_index: u16) -> ConstantInfo {
    ConstantInfo::Class(ClassConstant { name_index })
}

/// Big-endian payload of a Code attribute.
fn code_attribute_bytes(max_stack: u16, max_locals: u16, code: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&max_stack.to_be_bytes());
    out.extend_from_slice(&max_locals.to_be_bytes());
    out.extend_from_slice(&(code.len() as u32).to_be_bytes());
    out.extend_from_slice(code);
    out.extend_from_slice(&0u16.to_be_bytes()); // exception table
    out.extend_from_slice(&0u16.to_be_bytes()); // attributes
    out
}

/// A minimal but complete class file: one int field, one static method
/// `add(II)I` whose body is iload_0, iload_1, iadd, ireturn.
fn sample_class_file() -> ClassFile {
    let const_pool = vec![
        utf8("pkg/Sample"),        // 1
        class_const(1),            // 2
        utf8("java/lang/Object"),  // 3
        class_const(3),            // 4
        utf8("x"),                 // 5
        utf8("I"),                 // 6
        utf8("add"),               // 7
        utf8("(II)I"),             // 8
        utf8("Code"),              // 9
    ];
    let code = code_attribute_bytes(2, 2, &[0x1a, 0x1b, 0x60, 0xac]);
    ClassFile {
        minor_version: 0,
        major_version: 52,
        const_pool_size: const_pool.len() as u16 + 1,
        const_pool,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class: 2,
        super_class: 4,
        interfaces_count: 0,
        interfaces: vec![],
        fields_count: 1,
        fields: vec![FieldInfo {
            access_flags: FieldAccessFlags::PRIVATE,
            name_index: 5,
            descriptor_index: 6,
            attributes_count: 0,
            attributes: vec![],
        }],
        methods_count: 1,
        methods: vec![MethodInfo {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            name_index: 7,
            descriptor_index: 8,
            attributes_count: 1,
            attributes: vec![AttributeInfo {
                attribute_name_index: 9,
                attribute_length: code.len() as u32,
                info: code,
            }],
        }],
        attributes_count: 0,
        attributes: vec![],
    }
}

fn serialize(class_file: &ClassFile) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    class_file.write_be(&mut cursor).expect("serializes");
    cursor.into_inner()
}

#[test]
fn test_ingest_round_trip_metadata() {
    let bytes = serialize(&sample_class_file());
    let model = ingest::ingest_class_bytes(&bytes, "sample").expect("ingests");

    assert_eq!(model.name, "pkg/Sample");
    assert_eq!(model.super_name.as_deref(), Some("java/lang/Object"));
    assert!(model.interface_names.is_empty());

    assert_eq!(model.fields.len(), 1);
    assert_eq!(model.fields[0].name, "x");
    assert_eq!(model.fields[0].descriptor, "I");
    assert!(model.fields[0].access.contains(FieldAccessFlags::PRIVATE));
    assert!(!model.fields[0].is_static());

    assert_eq!(model.methods.len(), 1);
    let method = &model.methods[0];
    assert_eq!(method.name, "add");
    assert_eq!(method.descriptor, "(II)I");
    assert!(method.is_static());
    assert_eq!(method.max_locals, 2);
    assert!(method.handlers.is_empty());
}

#[test]
fn test_ingest_decodes_code_in_order() {
    let bytes = serialize(&sample_class_file());
    let model = ingest::ingest_class_bytes(&bytes, "sample").expect("ingests");
    let insns: Vec<&Instruction> = model.methods[0]
        .instructions
        .iter()
        .map(|a| &a.instruction)
        .collect();
    assert_eq!(
        insns,
        vec![
            &Instruction::Load {
                kind: ValueKind::Int,
                index: 0
            },
            &Instruction::Load {
                kind: ValueKind::Int,
                index: 1
            },
            &Instruction::Binary {
                op: BinOp::Add,
                kind: ValueKind::Int
            },
            &Instruction::Return {
                kind: Some(ValueKind::Int)
            },
        ]
    );
    let offsets: Vec<u32> = model.methods[0]
        .instructions
        .iter()
        .map(|a| a.offset)
        .collect();
    assert_eq!(offsets, vec![0, 1, 2, 3]);
}

#[test]
fn test_ingest_rejects_bad_magic() {
    let mut bytes = serialize(&sample_class_file());
    bytes[0] = 0xde;
    assert!(ingest::ingest_class_bytes(&bytes, "sample").is_err());
}

#[test]
fn test_ingest_rejects_truncated_file() {
    let bytes = serialize(&sample_class_file());
    let err = ingest::ingest_class_bytes(&bytes[..bytes.len() / 2], "sample").unwrap_err();
    assert_eq!(err.class_name, "sample");
}

#[test]
fn test_pipeline_over_directory_input() {
    use classfile_transpiler::{transpile, Config};

    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("Sample.class"), serialize(&sample_class_file())).unwrap();

    let config = Config {
        input_root: input.path().to_path_buf(),
        output_root: output.path().join("gen"),
        keep_unreachable: true,
        elide_dead_code: false,
        runtime_provided: ["java/lang/Object".to_string()].into_iter().collect(),
        ..Config::default()
    };
    let summary = transpile(&config).expect("pipeline runs");
    assert_eq!(summary.classes, vec!["pkg/Sample".to_string()]);
    assert!(config.output_root.join("pkg_Sample.h").exists());
    assert!(config.output_root.join("pkg_Sample.cpp").exists());
    assert!(config.output_root.join("manifest.txt").exists());
    assert!(config.output_root.join("program_table.cpp").exists());
}
