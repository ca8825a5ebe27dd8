//! Emit: serialize the frozen program model plus TIR bodies into C++
//! translation units targeting the jrt runtime ABI. One declaration unit and
//! one definition unit per class, a program-wide dispatch module, and a
//! manifest for the build driver.
//!
//! Output is staged in a temporary directory and renamed into place so a
//! failed run never leaves partial output behind.

mod body;
mod dispatch;
mod header;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::Config;
use crate::descriptor::JavaType;
use crate::error::TranspileError;
use crate::model::{mangle, ClassModel, FieldModel, ProgramModel};

/// What got emitted, for callers and logs.
#[derive(Clone, Debug, Default)]
pub struct EmitSummary {
    pub classes: Vec<String>,
    pub files: usize,
}

/// Emit every (reachable) class plus the program table and manifest.
pub fn emit_program(
    program: &ProgramModel,
    config: &Config,
) -> Result<EmitSummary, TranspileError> {
    let staging = make_staging_dir(config)?;
    let mut summary = EmitSummary::default();
    let mut files: Vec<(PathBuf, String)> = Vec::new();

    for class in emitted_classes(program, config) {
        let decl = header::declaration_unit(program, class, config);
        let defn = body::definition_unit(program, class, config);
        files.push((
            staging.path().join(format!("{}.h", class.emission_name)),
            decl,
        ));
        files.push((
            staging.path().join(format!("{}.cpp", class.emission_name)),
            defn,
        ));
        summary.classes.push(class.name.clone());
    }

    files.push((
        staging.path().join("program_table.h"),
        dispatch::program_table_header(program, config),
    ));
    files.push((
        staging.path().join("program_table.cpp"),
        dispatch::program_table_unit(program, config),
    ));
    files.push((
        staging.path().join("manifest.txt"),
        dispatch::manifest(program, config),
    ));

    for (path, content) in &files {
        fs::write(path, content).map_err(|e| TranspileError::io(path.clone(), e))?;
    }

    fs::create_dir_all(&config.output_root)
        .map_err(|e| TranspileError::io(config.output_root.clone(), e))?;
    let mut moved: Vec<PathBuf> = Vec::new();
    for (path, _) in &files {
        let file_name = path.file_name().expect("staged file has a name");
        let dest = config.output_root.join(file_name);
        if let Err(e) = rename_or_copy(path, &dest) {
            // Half-written output is worse than no output.
            for m in &moved {
                let _ = fs::remove_file(m);
            }
            return Err(TranspileError::io(dest, e));
        }
        moved.push(dest);
    }

    summary.files = files.len();
    info!(
        "emitted {} classes ({} files) to {}",
        summary.classes.len(),
        summary.files,
        config.output_root.display()
    );
    Ok(summary)
}

fn make_staging_dir(config: &Config) -> Result<tempfile::TempDir, TranspileError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("transpiler-stage-");
    let dir = match &config.temp_dir {
        Some(hint) => builder.tempdir_in(hint),
        None => builder.tempdir(),
    }
    .map_err(|e| TranspileError::io(config.output_root.clone(), e))?;
    debug!("staging output in {}", dir.path().display());
    Ok(dir)
}

fn rename_or_copy(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Staging may sit on another filesystem.
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
    }
}

/// Classes that get translation units, in lexicographic name order.
pub fn emitted_classes<'a>(
    program: &'a ProgramModel,
    config: &'a Config,
) -> impl Iterator<Item = &'a ClassModel> {
    program
        .classes
        .values()
        .filter(move |c| c.reachable || !config.elide_dead_code)
}

// ---------------------------------------------------------------------------
// Shared lowering of names and types to C
// ---------------------------------------------------------------------------

/// C type for a JavaType. Every reference is a `jobject*`; structs are only
/// named at field-access casts.
pub fn cpp_type(ty: &JavaType) -> &'static str {
    match ty {
        JavaType::Void => "void",
        JavaType::Boolean => "jbool",
        JavaType::Byte => "jbyte",
        JavaType::Char => "jchar",
        JavaType::Short => "jshort",
        JavaType::Int => "jint",
        JavaType::Long => "jlong",
        JavaType::Float => "jfloat",
        JavaType::Double => "jdouble",
        JavaType::Reference(_) | JavaType::Array(_) => "jobject*",
    }
}

/// Symbol of a method on a class, by the shared mangling convention. Works
/// for runtime-provided classes too, which follow the same convention.
pub fn method_symbol(class_name: &str, method_name: &str, descriptor: &str) -> String {
    format!(
        "{}_{}",
        mangle::class_symbol(class_name),
        mangle::method_emission_name(method_name, descriptor)
    )
}

/// Symbol of the generated per-constructor allocation helper.
pub fn new_symbol(class_name: &str, ctor_descriptor: &str) -> String {
    format!(
        "{}_new_{}",
        mangle::class_symbol(class_name),
        mangle::descriptor_hash(ctor_descriptor)
    )
}

/// Symbol of a static field.
pub fn static_field_symbol(class_name: &str, field: &FieldModel) -> String {
    format!("{}_{}", mangle::class_symbol(class_name), field.emission_name)
}

/// Class-id expression: a compile-time constant for program classes, a
/// runtime lookup for everything else (runtime-provided classes, arrays).
pub fn cid_expr(program: &ProgramModel, class_name: &str) -> String {
    if program.classes.contains_key(class_name) {
        format!("CID_{}", mangle::class_symbol(class_name))
    } else {
        format!("jrt_find_class(\"{}\")", escape_c(class_name))
    }
}

/// Find a field by original name, walking up the class chain from the
/// reference's named class.
pub fn resolve_field<'a>(
    program: &'a ProgramModel,
    class_name: &str,
    field_name: &str,
) -> Option<&'a FieldModel> {
    let mut cursor = Some(class_name.to_string());
    while let Some(current) = cursor {
        let class = program.classes.get(&current)?;
        if let Some(f) = class.fields.iter().find(|f| f.name == field_name) {
            return Some(f);
        }
        cursor = class.super_name.clone();
    }
    None
}

/// Slot of an interface method: its position among the interface's instance
/// methods in declaration order.
pub fn interface_slot(iface: &ClassModel, name: &str, descriptor: &str) -> Option<usize> {
    iface
        .methods
        .iter()
        .filter(|m| !m.is_static() && !m.is_class_initializer())
        .position(|m| m.name == name && m.descriptor == descriptor)
}

/// Escape a string for a C string literal. Octal escapes are three digits so
/// they cannot swallow a following digit.
pub fn escape_c(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            other => out.push_str(&format!("\\{:03o}", other)),
        }
    }
    out
}

/// Simple indent-tracking text writer for the generated units.
pub struct CppWriter {
    out: String,
    indent: usize,
}

impl CppWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    pub fn line(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("    ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn open(&mut self, text: &str) {
        self.line(text);
        self.indent += 1;
    }

    pub fn close(&mut self, text: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Default for CppWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_c() {
        assert_eq!(escape_c("plain"), "plain");
        assert_eq!(escape_c("a\"b\\c"), "a\\\"b\\\\c");
        assert_eq!(escape_c("line\nbreak"), "line\\nbreak");
        // Non-ASCII is escaped as fixed-width octal.
        assert_eq!(escape_c("\u{7f}1"), "\\1771");
    }

    #[test]
    fn test_cpp_type() {
        assert_eq!(cpp_type(&JavaType::Int), "jint");
        assert_eq!(
            cpp_type(&JavaType::Reference("java/lang/String".into())),
            "jobject*"
        );
        assert_eq!(cpp_type(&JavaType::Array(Box::new(JavaType::Int))), "jobject*");
    }
}
