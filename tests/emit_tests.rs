mod common;

use std::collections::BTreeSet;
use std::fs;

use classfile_transpiler::emit;
use classfile_transpiler::lower;
use classfile_transpiler::method_info::MethodAccessFlags;
use classfile_transpiler::model::ProgramModel;
use classfile_transpiler::resolve;

use common::asm::*;
use common::*;

fn build_override_program() -> ProgramModel {
    // S1: A.f / B.f override, call site on an A-typed receiver.
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "<init>",
        "()V",
        MethodAccessFlags::PUBLIC,
        vec![at(0, vreturn())],
    ));
    a.methods.push(method(
        "pkg/A",
        "f",
        "()I",
        MethodAccessFlags::PUBLIC,
        vec![at(0, iconst(1)), at(1, ireturn())],
    ));
    let mut b = class("pkg/B", "pkg/A");
    b.methods.push(method(
        "pkg/B",
        "<init>",
        "()V",
        MethodAccessFlags::PUBLIC,
        vec![at(0, vreturn())],
    ));
    b.methods.push(method(
        "pkg/B",
        "f",
        "()I",
        MethodAccessFlags::PUBLIC,
        vec![at(0, iconst(2)), at(1, ireturn())],
    ));
    let mut caller = class("pkg/Caller", "java/lang/Object");
    caller.methods.push(method(
        "pkg/Caller",
        "call",
        "(Lpkg/A;)I",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![
            at(0, aload(0)),
            at(1, invoke_virtual("pkg/A", "f", "()I")),
            at(4, ireturn()),
        ],
    ));

    let mut p = program(vec![a, b, caller]);
    resolve::resolve(&mut p, &test_config()).expect("links");
    lower::lower_program(&mut p).expect("lowers");
    p
}

#[test]
fn test_override_dispatch_goes_through_vtable() {
    let p = build_override_program();
    let config = test_config();

    let caller = p.class("pkg/Caller").unwrap();
    let caller_cpp: String = {
        // Definition unit is deterministic text; check its dispatch shape.
        let out = tempfile::tempdir().unwrap();
        let mut config = config.clone();
        config.output_root = out.path().to_path_buf();
        emit::emit_program(&p, &config).expect("emits");
        fs::read_to_string(out.path().join(format!("{}.cpp", caller.emission_name))).unwrap()
    };

    assert!(
        caller_cpp.contains("jrt_vtable("),
        "virtual call must go through the v-table:\n{caller_cpp}"
    );
    assert!(
        !caller_cpp.contains("pkg_A_m_f_"),
        "no direct symbol reference to A.f at the call site:\n{caller_cpp}"
    );

    // Both v-tables populate the shared slot with their own implementation.
    let a = p.class("pkg/A").unwrap();
    let b = p.class("pkg/B").unwrap();
    let slot = a.find_method("f", "()I").unwrap().vslot as usize;
    assert_eq!(a.vtable[slot].impl_class, "pkg/A");
    assert_eq!(b.vtable[slot].impl_class, "pkg/B");
}

#[test]
fn test_emission_idempotent() {
    let p = build_override_program();

    let emit_once = || {
        let out = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.output_root = out.path().to_path_buf();
        emit::emit_program(&p, &config).expect("emits");
        let mut files: Vec<(String, String)> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (
                    e.file_name().to_string_lossy().into_owned(),
                    fs::read_to_string(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    };

    assert_eq!(emit_once(), emit_once(), "emission must be byte-identical");
}

#[test]
fn test_mangled_symbols_injective() {
    // Overloads and cross-class same-name members must all emit distinct
    // symbols.
    let mut a = class("pkg/A", "java/lang/Object");
    a.methods.push(method(
        "pkg/A",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, vreturn())],
    ));
    a.methods.push(method(
        "pkg/A",
        "run",
        "(I)V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, vreturn())],
    ));
    a.methods.push(method(
        "pkg/A",
        "run",
        "(J)V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, vreturn())],
    ));
    let mut b = class("pkg/B", "java/lang/Object");
    b.methods.push(method(
        "pkg/B",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, vreturn())],
    ));

    let mut p = program(vec![a, b]);
    resolve::resolve(&mut p, &test_config()).expect("links");

    let mut symbols = BTreeSet::new();
    for class in p.classes.values() {
        for m in &class.methods {
            let symbol = emit::method_symbol(&class.name, &m.name, &m.descriptor);
            assert!(
                symbols.insert(symbol.clone()),
                "duplicate emitted symbol {symbol}"
            );
        }
    }
}

#[test]
fn test_manifest_lists_every_class() {
    let p = build_override_program();
    let out = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.output_root = out.path().to_path_buf();
    emit::emit_program(&p, &config).expect("emits");

    let manifest = fs::read_to_string(out.path().join("manifest.txt")).unwrap();
    let lines: Vec<&str> = manifest.lines().collect();
    assert_eq!(lines.len(), p.classes.len());
    for (line, class) in lines.iter().zip(p.classes.values()) {
        let mut parts = line.split(' ');
        assert_eq!(parts.next(), Some(class.name.as_str()));
        assert_eq!(
            parts.next(),
            Some(format!("{}.h", class.emission_name).as_str())
        );
        assert_eq!(parts.next(), Some(class.class_id.to_string().as_str()));
    }
}

#[test]
fn test_header_carries_layout_and_statics() {
    use classfile_transpiler::field_info::FieldAccessFlags;

    let mut a = class("pkg/A", "java/lang/Object");
    a.fields.push(field("pkg/A", "x", "I", FieldAccessFlags::PUBLIC));
    a.fields
        .push(field("pkg/A", "cnt", "J", FieldAccessFlags::STATIC));
    let mut b = class("pkg/B", "pkg/A");
    b.fields
        .push(field("pkg/B", "y", "Ljava/lang/Object;", FieldAccessFlags::PUBLIC));

    let mut p = program(vec![a, b]);
    resolve::resolve(&mut p, &test_config()).expect("links");
    lower::lower_program(&mut p).expect("lowers");

    let out = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.output_root = out.path().to_path_buf();
    emit::emit_program(&p, &config).expect("emits");

    let header = fs::read_to_string(out.path().join("pkg_B.h")).unwrap();
    // Flattened layout: the inherited field precedes the own field.
    let inherited = header.find("f_A_x").expect("inherited field present");
    let own = header.find("f_B_y").expect("own field present");
    assert!(inherited < own, "layout must flatten super fields first");
    assert!(header.contains("struct jrt_header hdr;"));

    let a_header = fs::read_to_string(out.path().join("pkg_A.h")).unwrap();
    assert!(a_header.contains("extern jlong pkg_A_sf_A_cnt;"));
}

#[test]
fn test_dead_code_elision_respects_config() {
    let mut main = class("pkg/Main", "java/lang/Object");
    main.methods.push(method(
        "pkg/Main",
        "run",
        "()V",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        vec![at(0, vreturn())],
    ));
    let unused = class("pkg/Unused", "java/lang/Object");

    let mut p = program(vec![main, unused]);
    let mut config = test_config();
    config.keep_unreachable = false;
    config.elide_dead_code = true;
    config.entry_classes = vec!["pkg/Main".to_string()];
    resolve::resolve(&mut p, &config).expect("links");
    lower::lower_program(&mut p).expect("lowers");

    let out = tempfile::tempdir().unwrap();
    config.output_root = out.path().to_path_buf();
    emit::emit_program(&p, &config).expect("emits");

    assert!(out.path().join("pkg_Main.h").exists());
    assert!(
        !out.path().join("pkg_Unused.h").exists(),
        "unreachable class must be elided"
    );
}
