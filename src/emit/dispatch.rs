//! The program-wide dispatch module: class-id constants, interface-dispatch
//! tables, runtime registration of every emitted class, and the build
//! driver's manifest. All walks are in lexicographic class-name order so the
//! output is identical regardless of how earlier stages were scheduled.

use crate::config::Config;
use crate::emit::{emitted_classes, interface_slot, method_symbol, CppWriter};
use crate::model::{mangle, ProgramModel};

pub fn program_table_header(program: &ProgramModel, config: &Config) -> String {
    let mut w = CppWriter::new();
    w.line("// Generated program table. Do not edit.");
    w.line("#pragma once");
    w.blank();
    w.line("#include \"jrt.h\"");
    w.blank();
    w.line(&format!("#define JRT_PROGRAM_ABI {}", config.abi_version));
    w.blank();
    // Ids are dense and assigned in lexicographic name order during Resolve;
    // emitting them as an enum keeps checkcast/instanceof sites constant.
    w.open("enum jrt_program_class_id {");
    for class in program.classes.values() {
        w.line(&format!(
            "CID_{} = {},",
            class.emission_name, class.class_id
        ));
    }
    w.close("};");
    w.blank();
    w.line("void jrt_register_program(void);");
    w.finish()
}

pub fn program_table_unit(program: &ProgramModel, config: &Config) -> String {
    let mut w = CppWriter::new();
    w.line("// Generated program table. Do not edit.");
    w.line("// Interface dispatch is a two-level lookup: class id to");
    w.line("// interface id to slot array. No inline caches.");
    w.line("#include \"program_table.h\"");
    for class in emitted_classes(program, config) {
        w.line(&format!("#include \"{}.h\"", class.emission_name));
    }
    w.blank();
    w.line(&format!(
        "JRT_STATIC_ASSERT(JRT_ABI_VERSION == {});",
        config.abi_version
    ));
    w.blank();

    // Interface-dispatch tables, one per class that implements anything.
    for class in emitted_classes(program, config) {
        if class.itable.is_empty() {
            continue;
        }
        w.open(&format!(
            "static const struct jrt_iface_entry {}_itable[] = {{",
            class.emission_name
        ));
        for entry in &class.itable {
            let slot = program
                .classes
                .get(&entry.interface)
                .and_then(|i| interface_slot(i, &entry.name, &entry.descriptor))
                .unwrap_or(0);
            w.line(&format!(
                "{{ CID_{}, {}, (void*)&{} }}, // {}.{}{}",
                mangle::class_symbol(&entry.interface),
                slot,
                method_symbol(&entry.impl_class, &entry.name, &entry.descriptor),
                entry.interface,
                entry.name,
                entry.descriptor
            ));
        }
        w.close("};");
    }
    w.blank();

    w.open("void jrt_register_program(void) {");
    for class in emitted_classes(program, config) {
        let sym = &class.emission_name;
        let (vtable, size) = if class.is_interface() {
            ("(void*)0".to_string(), "0".to_string())
        } else {
            (
                format!("(void*)&vt_inst_{}", sym),
                format!("sizeof(struct jc_{})", sym),
            )
        };
        let (itable, itable_len) = if class.itable.is_empty() {
            ("(const struct jrt_iface_entry*)0".to_string(), 0)
        } else {
            (format!("{}_itable", sym), class.itable.len())
        };
        w.line(&format!(
            "jrt_register_class(CID_{}, \"{}\", {}, {}, {}, {}, &{}_clinit);",
            sym,
            crate::emit::escape_c(&class.name),
            vtable,
            size,
            itable,
            itable_len,
            sym
        ));
    }
    w.close("}");
    w.finish()
}

/// One line per emitted class: fully-qualified name, header filename,
/// class-id. Plain UTF-8 for the build driver.
pub fn manifest(program: &ProgramModel, config: &Config) -> String {
    let mut out = String::new();
    for class in emitted_classes(program, config) {
        out.push_str(&format!(
            "{} {}.h {}\n",
            class.name, class.emission_name, class.class_id
        ));
    }
    out
}
