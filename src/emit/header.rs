//! Declaration units: per-class `.h` files with the object struct in
//! flattened layout order, the v-table type, static-field externs and
//! method prototypes.

use crate::config::Config;
use crate::descriptor::parse_method_descriptor;
use crate::emit::{cpp_type, method_symbol, new_symbol, static_field_symbol, CppWriter};
use crate::model::{mangle, ClassModel, ProgramModel};

pub fn declaration_unit(_program: &ProgramModel, class: &ClassModel, config: &Config) -> String {
    let mut w = CppWriter::new();
    let sym = &class.emission_name;

    match &class.source_file {
        Some(source) => w.line(&format!(
            "// Generated from {} ({}). Do not edit.",
            class.name, source
        )),
        None => w.line(&format!("// Generated from {}. Do not edit.", class.name)),
    }
    w.line(&format!("// Runtime ABI {}.", config.abi_version));
    w.line("#pragma once");
    w.blank();
    w.line("#include \"jrt.h\"");
    w.blank();

    if class.is_interface() {
        interface_declarations(class, &mut w);
        return w.finish();
    }

    // V-table type: one function pointer per slot, in slot order.
    w.open(&format!("struct vt_{} {{", sym));
    for entry in &class.vtable {
        let (params, ret) =
            parse_method_descriptor(&entry.descriptor).unwrap_or((Vec::new(), crate::descriptor::JavaType::Void));
        let mut args: Vec<String> = vec!["jobject*".to_string()];
        args.extend(params.iter().map(|p| cpp_type(p).to_string()));
        w.line(&format!(
            "{} (*{})({});",
            cpp_type(&ret),
            mangle::method_emission_name(&entry.name, &entry.descriptor),
            args.join(", ")
        ));
    }
    w.close("};");
    w.blank();

    // Object struct: runtime header slot, then the flattened instance fields.
    w.open(&format!("struct jc_{} {{", sym));
    w.line("struct jrt_header hdr;");
    for slot in &class.layout {
        w.line(&format!("{} {};", cpp_type(&slot.ty), slot.emission_name));
    }
    w.close("};");
    w.blank();

    w.line(&format!("extern struct vt_{0} vt_inst_{0};", sym));

    let statics: Vec<String> = class
        .static_fields()
        .map(|f| {
            format!(
                "extern {} {};",
                cpp_type(&f.ty),
                static_field_symbol(&class.name, f)
            )
        })
        .collect();
    if !statics.is_empty() {
        w.blank();
        for line in statics {
            w.line(&line);
        }
    }

    w.blank();
    w.line(&format!("void {}_clinit(void);", sym));
    method_prototypes(class, &mut w);

    w.finish()
}

/// Interfaces carry no struct or v-table; their dispatch goes through the
/// runtime's interface tables. Defaults and statics still have bodies, and
/// the slot constants let provided code dispatch without the program table.
fn interface_declarations(class: &ClassModel, w: &mut CppWriter) {
    let sym = &class.emission_name;
    let mut slot = 0usize;
    for method in &class.methods {
        if method.is_static() || method.is_class_initializer() {
            continue;
        }
        w.line(&format!(
            "#define JRT_ISLOT_{}_{} {}",
            sym, method.emission_name, slot
        ));
        slot += 1;
    }
    w.blank();
    w.line(&format!("void {}_clinit(void);", sym));

    for method in &class.methods {
        if method.is_abstract() {
            continue;
        }
        w.line(&prototype(&class.name, method));
    }
}

fn method_prototypes(class: &ClassModel, w: &mut CppWriter) {
    for method in &class.methods {
        if method.is_abstract() {
            continue;
        }
        if method.is_native() {
            w.line("// native, provided by the runtime bridge:");
        }
        w.line(&prototype(&class.name, method));
        if method.is_constructor() {
            // Allocation helper pairing jrt_alloc with this constructor.
            let params: Vec<String> = method
                .params
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{} a{}", cpp_type(p), i))
                .collect();
            w.line(&format!(
                "jobject* {}({});",
                new_symbol(&class.name, &method.descriptor),
                params.join(", ")
            ));
        }
    }
}

fn prototype(class_name: &str, method: &crate::model::MethodModel) -> String {
    let mut params: Vec<String> = Vec::new();
    if !method.is_static() {
        params.push("jobject* self".to_string());
    }
    for (i, p) in method.params.iter().enumerate() {
        params.push(format!("{} a{}", cpp_type(p), i));
    }
    if params.is_empty() {
        params.push("void".to_string());
    }
    format!(
        "{} {}({});",
        cpp_type(&method.return_type),
        method_symbol(class_name, &method.name, &method.descriptor),
        params.join(", ")
    )
}
