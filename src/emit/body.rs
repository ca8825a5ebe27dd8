//! Definition units: per-class `.cpp` files with method bodies translated
//! from TIR, static-field definitions, the guarded static initializer,
//! per-constructor allocation helpers and the singleton v-table instance.

use std::collections::{BTreeMap, BTreeSet};

use crate::code::{BinOp, CmpKind, ConstOperand, InvokeKind};
use crate::config::Config;
use crate::descriptor::{parse_method_descriptor, JavaType};
use crate::emit::{
    cid_expr, cpp_type, escape_c, interface_slot, method_symbol, new_symbol, resolve_field,
    static_field_symbol, CppWriter,
};
use crate::lower::fold::for_each_stmt_expr;
use crate::lower::tir::*;
use crate::model::{mangle, ClassModel, MethodModel, ProgramModel};

pub fn definition_unit(program: &ProgramModel, class: &ClassModel, config: &Config) -> String {
    let emitter = BodyEmitter { program, class };
    let mut w = CppWriter::new();
    let sym = &class.emission_name;

    w.line(&format!("// Generated from {}. Do not edit.", class.name));
    if config.emit_assertions {
        w.line("#define JRT_CHECKS 1");
    }
    w.line(&format!("#include \"{}.h\"", sym));
    w.line("#include \"program_table.h\"");
    for dep in emitter.include_dependencies() {
        w.line(&format!("#include \"{}.h\"", dep));
    }
    w.blank();

    // Static initializer guard and static-field storage.
    w.line(&format!("static struct jrt_clinit_guard {}_guard;", sym));
    for field in class.static_fields() {
        let init = match &field.constant_value {
            Some(ConstOperand::Int(v)) => int_literal(*v),
            Some(ConstOperand::Long(v)) => long_literal(*v),
            Some(ConstOperand::Float(v)) => float_literal(*v),
            Some(ConstOperand::Double(v)) => double_literal(*v),
            // String constants intern at class-init time.
            _ => match field.ty {
                JavaType::Reference(_) | JavaType::Array(_) => "JRT_NULL".to_string(),
                _ => "0".to_string(),
            },
        };
        w.line(&format!(
            "{} {} = {};",
            cpp_type(&field.ty),
            static_field_symbol(&class.name, field),
            init
        ));
    }
    w.blank();

    if !class.is_interface() {
        emitter.vtable_instance(&mut w);
        w.blank();
    }

    emitter.clinit_function(&mut w);
    w.blank();

    for method in &class.methods {
        if method.is_constructor() && method.tir.is_some() {
            emitter.new_helper(method, &mut w);
            w.blank();
        }
    }

    for method in &class.methods {
        let Some(body) = &method.tir else { continue };
        emitter.method_definition(method, body, &mut w);
        w.blank();
    }

    w.finish()
}

struct BodyEmitter<'a> {
    program: &'a ProgramModel,
    class: &'a ClassModel,
}

impl<'a> BodyEmitter<'a> {
    /// Program classes whose headers this unit needs: the super (its clinit
    /// is chained), call targets, resolved field owners, constructed classes
    /// and v-table implementors.
    fn include_dependencies(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        let mut add = |name: &str| {
            if name != self.class.name && self.program.classes.contains_key(name) {
                names.insert(name.to_string());
            }
        };
        if let Some(super_name) = &self.class.super_name {
            add(super_name);
        }
        for entry in &self.class.vtable {
            add(&entry.impl_class);
        }
        for method in &self.class.methods {
            let Some(body) = &method.tir else { continue };
            for stmt in &body.statements {
                for_each_stmt_expr(stmt, &mut |e| match e {
                    TirExpr::Invoke { method, .. } => add(&method.class_name),
                    TirExpr::NewObject { class_name, .. } => add(class_name),
                    TirExpr::FieldLoad { field, .. } => {
                        let owner = resolve_field(self.program, &field.class_name, &field.name)
                            .map(|f| f.owner.clone())
                            .unwrap_or_else(|| field.class_name.clone());
                        add(&owner);
                    }
                    _ => {}
                });
                if let TirStatement::FieldStore { field, .. } = stmt {
                    let owner = resolve_field(self.program, &field.class_name, &field.name)
                        .map(|f| f.owner.clone())
                        .unwrap_or_else(|| field.class_name.clone());
                    add(&owner);
                }
            }
        }
        names
            .into_iter()
            .map(|n| mangle::class_symbol(&n))
            .collect()
    }

    fn vtable_instance(&self, w: &mut CppWriter) {
        let sym = &self.class.emission_name;
        w.open(&format!("struct vt_{0} vt_inst_{0} = {{", sym));
        for entry in &self.class.vtable {
            let target = self
                .program
                .classes
                .get(&entry.impl_class)
                .and_then(|c| c.find_method(&entry.name, &entry.descriptor));
            match target {
                Some(m) if !m.is_abstract() => w.line(&format!(
                    "&{}, // slot for {}{}",
                    method_symbol(&entry.impl_class, &entry.name, &entry.descriptor),
                    entry.name,
                    entry.descriptor
                )),
                _ => w.line(&format!("0, // abstract {}{}", entry.name, entry.descriptor)),
            }
        }
        w.close("};");
    }

    /// Idempotent class initializer: one-shot guard, constant-string statics,
    /// then the translated <clinit> body if the class has one.
    fn clinit_function(&self, w: &mut CppWriter) {
        let sym = &self.class.emission_name;
        w.open(&format!("void {}_clinit(void) {{", sym));
        w.line(&format!("if (!jrt_clinit_acquire(&{}_guard)) return;", sym));
        if let Some(super_name) = &self.class.super_name {
            if self.program.classes.contains_key(super_name) {
                w.line(&format!("{}_clinit();", mangle::class_symbol(super_name)));
            }
        }
        for field in self.class.static_fields() {
            if let Some(ConstOperand::Str(s)) = &field.constant_value {
                w.line(&format!(
                    "{} = jrt_intern(\"{}\");",
                    static_field_symbol(&self.class.name, field),
                    escape_c(s)
                ));
            }
        }
        if let Some(clinit) = self.class.methods.iter().find(|m| m.is_class_initializer()) {
            if clinit.tir.is_some() {
                w.line(&format!(
                    "{}();",
                    method_symbol(&self.class.name, &clinit.name, &clinit.descriptor)
                ));
            }
        }
        w.line(&format!("jrt_clinit_release(&{}_guard);", sym));
        w.close("}");
    }

    /// Allocation helper pairing jrt_alloc with one constructor.
    fn new_helper(&self, ctor: &MethodModel, w: &mut CppWriter) {
        let sym = &self.class.emission_name;
        let params: Vec<String> = ctor
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} a{}", cpp_type(p), i))
            .collect();
        w.open(&format!(
            "jobject* {}({}) {{",
            new_symbol(&self.class.name, &ctor.descriptor),
            params.join(", ")
        ));
        w.line(&format!("{}_clinit();", sym));
        w.line(&format!(
            "jobject* obj = jrt_alloc(CID_{0}, sizeof(struct jc_{0}), (void*)&vt_inst_{0});",
            sym
        ));
        let args: Vec<String> = (0..ctor.params.len()).map(|i| format!("a{}", i)).collect();
        let mut all_args = vec!["obj".to_string()];
        all_args.extend(args);
        w.line(&format!(
            "{}({});",
            method_symbol(&self.class.name, &ctor.name, &ctor.descriptor),
            all_args.join(", ")
        ));
        w.line("return obj;");
        w.close("}");
    }

    fn method_definition(&self, method: &MethodModel, body: &TirBody, w: &mut CppWriter) {
        let mut params: Vec<String> = Vec::new();
        if !method.is_static() {
            params.push("jobject* self".to_string());
        }
        for local in body.params() {
            params.push(format!("{} {}", cpp_type(&local.ty), local_name(local)));
        }
        if params.is_empty() {
            params.push("void".to_string());
        }
        w.open(&format!(
            "{} {}({}) {{",
            cpp_type(&method.return_type),
            method_symbol(&self.class.name, &method.name, &method.descriptor),
            params.join(", ")
        ));

        if method
            .access
            .contains(crate::method_info::MethodAccessFlags::SYNCHRONIZED)
        {
            // Scope guard from the runtime: released on every return path.
            if method.is_static() {
                w.line(&format!(
                    "jrt_sync_guard sync_(jrt_class_obj(CID_{}));",
                    self.class.emission_name
                ));
            } else {
                w.line("jrt_sync_guard sync_(self);");
            }
        }

        for region in &body.regions {
            w.line(&format!("struct jrt_try_ctx ctx_r{};", region.id));
        }
        for local in body.body_locals() {
            let init = match local.ty {
                JavaType::Reference(_) | JavaType::Array(_) => "JRT_NULL",
                _ => "0",
            };
            w.line(&format!(
                "{} {} = {};",
                cpp_type(&local.ty),
                local_name(local),
                init
            ));
        }

        // Catch dispatch per region, in statement order of the catch marks.
        let mut catches: BTreeMap<u32, Vec<(Option<String>, Local, u32)>> = BTreeMap::new();
        for stmt in &body.statements {
            if let TirStatement::CatchBegin {
                region,
                catch_type,
                local,
                handler,
            } = stmt
            {
                catches
                    .entry(*region)
                    .or_default()
                    .push((catch_type.clone(), local.clone(), *handler));
            }
        }

        for stmt in &body.statements {
            self.statement(stmt, &catches, w);
        }
        w.close("}");
    }

    fn statement(
        &self,
        stmt: &TirStatement,
        catches: &BTreeMap<u32, Vec<(Option<String>, Local, u32)>>,
        w: &mut CppWriter,
    ) {
        match stmt {
            TirStatement::Label { offset } => w.line(&format!("L{}:;", offset)),

            TirStatement::Assign { target, value } => w.line(&format!(
                "{} = ({})({});",
                local_name(target),
                cpp_type(&target.ty),
                self.expr(value)
            )),

            TirStatement::FieldStore {
                object,
                field,
                value,
            } => match object {
                Some(obj) => {
                    let (owner, name, ty) = self.field_parts(field, false);
                    w.line(&format!(
                        "((struct jc_{}*)({}))->{} = ({})({});",
                        mangle::class_symbol(&owner),
                        self.expr(obj),
                        name,
                        cpp_type(&ty),
                        self.expr(value)
                    ));
                }
                None => {
                    let (owner, symbol, ty) = self.static_field_parts(field);
                    if self.program.classes.contains_key(&owner) {
                        w.line(&format!("{}_clinit();", mangle::class_symbol(&owner)));
                    }
                    w.line(&format!(
                        "{} = ({})({});",
                        symbol,
                        cpp_type(&ty),
                        self.expr(value)
                    ));
                }
            },

            TirStatement::ArrayStore {
                array,
                index,
                value,
                elem,
            } => w.line(&format!(
                "jrt_astore_{}({}, {}, ({})({}));",
                array_letter(elem),
                self.expr(array),
                self.expr(index),
                elem_cpp_type(elem),
                self.expr(value)
            )),

            TirStatement::Eval(e) => w.line(&format!("{};", self.expr(e))),

            TirStatement::MonitorEnter(e) => {
                w.line(&format!("jrt_monitor_enter({});", self.expr(e)))
            }
            TirStatement::MonitorExit(e) => w.line(&format!("jrt_monitor_exit({});", self.expr(e))),

            TirStatement::Branch { cond, target } => w.line(&format!(
                "if (({}) {} ({})) goto L{};",
                self.expr(&cond.left),
                cond.op.as_str(),
                self.expr(&cond.right),
                target
            )),

            TirStatement::Goto { target } => w.line(&format!("goto L{};", target)),

            TirStatement::Switch {
                key,
                cases,
                default,
            } => {
                w.open(&format!("switch ({}) {{", self.expr(key)));
                for (value, target) in cases {
                    w.line(&format!("case {}: goto L{};", int_literal(*value), target));
                }
                w.line(&format!("default: goto L{};", default));
                w.close("}");
            }

            TirStatement::Return(None) => w.line("return;"),
            TirStatement::Return(Some(e)) => w.line(&format!("return {};", self.expr(e))),

            TirStatement::Throw(e) => w.line(&format!("jrt_throw({});", self.expr(e))),

            TirStatement::TryBegin { region } => {
                w.open(&format!("if (jrt_try_enter(&ctx_r{})) {{", region));
                match catches.get(region) {
                    Some(handlers) => {
                        for (catch_type, local, handler) in handlers {
                            match catch_type {
                                Some(t) => w.line(&format!(
                                    "if (jrt_exception_matches({})) {{ {} = jrt_caught(); goto L{}; }}",
                                    cid_expr(self.program, t),
                                    local_name(local),
                                    handler
                                )),
                                None => {
                                    w.line(&format!(
                                        "{} = jrt_caught(); goto L{};",
                                        local_name(local),
                                        handler
                                    ));
                                }
                            }
                        }
                        // Reached only when no handler of this range matched.
                        w.line("jrt_rethrow();");
                    }
                    None => w.line("jrt_rethrow();"),
                }
                w.close("}");
            }
            TirStatement::TryEnd { region } => {
                w.line(&format!("jrt_try_exit(&ctx_r{});", region))
            }
            TirStatement::CatchBegin {
                catch_type, local, ..
            } => {
                // Binding happened in the try-enter dispatch.
                w.line(&format!(
                    "/* catch {} -> {} */",
                    catch_type.as_deref().unwrap_or("<any>"),
                    local_name(local)
                ));
            }
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn expr(&self, e: &TirExpr) -> String {
        match e {
            TirExpr::Local(l) => local_name(l),
            TirExpr::This => "self".to_string(),
            TirExpr::Const(c) => self.constant(c),

            TirExpr::Neg { ty, operand } => match ty {
                JavaType::Int => format!("(jint)(0U - (juint)({}))", self.expr(operand)),
                JavaType::Long => format!("(jlong)(0ULL - (julong)({}))", self.expr(operand)),
                _ => format!("(-({}))", self.expr(operand)),
            },

            TirExpr::Binary {
                op,
                ty,
                left,
                right,
            } => self.binary(*op, ty, left, right),

            TirExpr::Convert { target, operand } => self.convert(target, operand),

            TirExpr::Cmp { kind, left, right } => {
                let helper = match kind {
                    CmpKind::Long => "jrt_lcmp",
                    CmpKind::FloatL => "jrt_fcmpl",
                    CmpKind::FloatG => "jrt_fcmpg",
                    CmpKind::DoubleL => "jrt_dcmpl",
                    CmpKind::DoubleG => "jrt_dcmpg",
                };
                format!("{}({}, {})", helper, self.expr(left), self.expr(right))
            }

            TirExpr::FieldLoad { object, field, .. } => match object {
                Some(obj) => {
                    let (owner, name, _) = self.field_parts(field, false);
                    format!(
                        "((struct jc_{}*)({}))->{}",
                        mangle::class_symbol(&owner),
                        self.expr(obj),
                        name
                    )
                }
                None => {
                    let (owner, symbol, _) = self.static_field_parts(field);
                    if self.program.classes.contains_key(&owner) {
                        format!("({}_clinit(), {})", mangle::class_symbol(&owner), symbol)
                    } else {
                        symbol
                    }
                }
            },

            TirExpr::ArrayLoad { array, index, elem } => format!(
                "jrt_aload_{}({}, {})",
                array_letter(elem),
                self.expr(array),
                self.expr(index)
            ),

            TirExpr::ArrayLength { array } => format!("jrt_array_length({})", self.expr(array)),

            TirExpr::InstanceOf {
                operand,
                class_name,
            } => format!(
                "jrt_instance_of({}, {})",
                self.expr(operand),
                self.type_id(class_name)
            ),

            TirExpr::CheckCast {
                operand,
                class_name,
            } => format!(
                "((jobject*)jrt_checkcast({}, {}))",
                self.expr(operand),
                self.type_id(class_name)
            ),

            TirExpr::NewObject {
                class_name,
                ctor_descriptor,
                args,
            } => {
                let (params, _) =
                    parse_method_descriptor(ctor_descriptor).unwrap_or((Vec::new(), JavaType::Void));
                format!(
                    "{}({})",
                    new_symbol(class_name, ctor_descriptor),
                    self.args(args, &params)
                )
            }

            TirExpr::NewArray { elem, length } => match elem {
                JavaType::Reference(name) => format!(
                    "jrt_new_array_a({}, {})",
                    cid_expr(self.program, name),
                    self.expr(length)
                ),
                JavaType::Array(_) => format!(
                    "jrt_new_array_a(jrt_find_class(\"{}\"), {})",
                    escape_c(&elem.to_descriptor()),
                    self.expr(length)
                ),
                prim => format!(
                    "jrt_new_array_{}({})",
                    array_letter(prim),
                    self.expr(length)
                ),
            },

            TirExpr::NewMultiArray { array_type, dims } => {
                let dim_args: Vec<String> = dims.iter().map(|d| self.expr(d)).collect();
                format!(
                    "jrt_new_multi_array(\"{}\", {}, {})",
                    escape_c(&array_type.to_descriptor()),
                    dims.len(),
                    dim_args.join(", ")
                )
            }

            TirExpr::Invoke {
                kind,
                object,
                method,
                args,
                ..
            } => self.invoke(*kind, object.as_deref(), method, args),

            // Never survives lowering; keep the output compilable anyway.
            TirExpr::UninitNew { class_name } => {
                format!("JRT_NULL /* unconstructed {} */", class_name)
            }
        }
    }

    fn invoke(
        &self,
        kind: InvokeKind,
        object: Option<&TirExpr>,
        method: &crate::code::MethodRef,
        args: &[TirExpr],
    ) -> String {
        let (params, ret) =
            parse_method_descriptor(&method.descriptor).unwrap_or((Vec::new(), JavaType::Void));
        match kind {
            InvokeKind::Static => {
                let call = format!(
                    "{}({})",
                    method_symbol(&method.class_name, &method.name, &method.descriptor),
                    self.args(args, &params)
                );
                if self.program.classes.contains_key(&method.class_name) {
                    format!(
                        "({}_clinit(), {})",
                        mangle::class_symbol(&method.class_name),
                        call
                    )
                } else {
                    call
                }
            }
            InvokeKind::Special => {
                let receiver = self.expr(object.expect("special invoke has a receiver"));
                let mut all = vec![receiver];
                all.push(self.args(args, &params));
                let all: Vec<String> = all.into_iter().filter(|s| !s.is_empty()).collect();
                format!(
                    "{}({})",
                    method_symbol(&method.class_name, &method.name, &method.descriptor),
                    all.join(", ")
                )
            }
            InvokeKind::Virtual => {
                let receiver = self.expr(object.expect("virtual invoke has a receiver"));
                let mut all = vec![receiver.clone()];
                all.push(self.args(args, &params));
                let all: Vec<String> = all.into_iter().filter(|s| !s.is_empty()).collect();
                format!(
                    "((struct vt_{}*)jrt_vtable({}))->{}({})",
                    mangle::class_symbol(&method.class_name),
                    receiver,
                    mangle::method_emission_name(&method.name, &method.descriptor),
                    all.join(", ")
                )
            }
            InvokeKind::Interface => {
                let receiver = self.expr(object.expect("interface invoke has a receiver"));
                let slot = match self
                    .program
                    .classes
                    .get(&method.class_name)
                    .and_then(|c| interface_slot(c, &method.name, &method.descriptor))
                {
                    Some(slot) => slot.to_string(),
                    None => format!(
                        "JRT_ISLOT_{}_{}",
                        mangle::class_symbol(&method.class_name),
                        mangle::method_emission_name(&method.name, &method.descriptor)
                    ),
                };
                let mut ptr_params = vec!["jobject*".to_string()];
                ptr_params.extend(params.iter().map(|p| cpp_type(p).to_string()));
                let mut all = vec![receiver.clone()];
                all.push(self.args(args, &params));
                let all: Vec<String> = all.into_iter().filter(|s| !s.is_empty()).collect();
                format!(
                    "(({} (*)({}))jrt_iface_lookup({}, {}, {}))({})",
                    cpp_type(&ret),
                    ptr_params.join(", "),
                    receiver,
                    cid_expr(self.program, &method.class_name),
                    slot,
                    all.join(", ")
                )
            }
        }
    }

    fn binary(&self, op: BinOp, ty: &JavaType, left: &TirExpr, right: &TirExpr) -> String {
        let l = self.expr(left);
        let r = self.expr(right);
        let (signed, unsigned) = match ty {
            JavaType::Long => ("jlong", "julong"),
            _ => ("jint", "juint"),
        };
        let shift_mask = if matches!(ty, JavaType::Long) { 63 } else { 31 };
        match op {
            // Two's-complement wrap-around arithmetic goes through the
            // unsigned type; signed overflow would be undefined in C.
            BinOp::Add | BinOp::Sub | BinOp::Mul
                if matches!(ty, JavaType::Int | JavaType::Long) =>
            {
                format!(
                    "({})(({})({}) {} ({})({}))",
                    signed,
                    unsigned,
                    l,
                    op.as_str(),
                    unsigned,
                    r
                )
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                format!("(({}) {} ({}))", l, op.as_str(), r)
            }
            BinOp::Div => match ty {
                JavaType::Int => format!("jrt_idiv({}, {})", l, r),
                JavaType::Long => format!("jrt_ldiv({}, {})", l, r),
                _ => format!("(({}) / ({}))", l, r),
            },
            BinOp::Rem => match ty {
                JavaType::Int => format!("jrt_irem({}, {})", l, r),
                JavaType::Long => format!("jrt_lrem({}, {})", l, r),
                JavaType::Float => format!("jrt_frem({}, {})", l, r),
                _ => format!("jrt_drem({}, {})", l, r),
            },
            BinOp::Shl => format!(
                "({})(({})({}) << (({}) & {}))",
                signed, unsigned, l, r, shift_mask
            ),
            BinOp::Shr => format!("(({}) >> (({}) & {}))", l, r, shift_mask),
            BinOp::Ushr => format!(
                "({})(({})({}) >> (({}) & {}))",
                signed, unsigned, l, r, shift_mask
            ),
            BinOp::And => format!("(({}) & ({}))", l, r),
            BinOp::Or => format!("(({}) | ({}))", l, r),
            BinOp::Xor => format!("(({}) ^ ({}))", l, r),
        }
    }

    fn convert(&self, target: &JavaType, operand: &TirExpr) -> String {
        let source = operand.ty();
        let x = self.expr(operand);
        // Float-to-integral saturates in Java; a plain C cast would be
        // undefined on overflow.
        match (target, &source) {
            (JavaType::Int, JavaType::Float) => format!("jrt_f2i({})", x),
            (JavaType::Int, JavaType::Double) => format!("jrt_d2i({})", x),
            (JavaType::Long, JavaType::Float) => format!("jrt_f2l({})", x),
            (JavaType::Long, JavaType::Double) => format!("jrt_d2l({})", x),
            _ => format!("(({})({}))", conv_cpp_type(target), x),
        }
    }

    fn args(&self, args: &[TirExpr], params: &[JavaType]) -> String {
        let rendered: Vec<String> = args
            .iter()
            .enumerate()
            .map(|(i, a)| match params.get(i) {
                Some(p) => format!("({})({})", cpp_type(p), self.expr(a)),
                None => self.expr(a),
            })
            .collect();
        rendered.join(", ")
    }

    fn constant(&self, c: &ConstOperand) -> String {
        match c {
            ConstOperand::Int(v) => int_literal(*v),
            ConstOperand::Long(v) => long_literal(*v),
            ConstOperand::Float(v) => float_literal(*v),
            ConstOperand::Double(v) => double_literal(*v),
            ConstOperand::Str(s) => format!("jrt_intern(\"{}\")", escape_c(s)),
            ConstOperand::Class(name) => format!("jrt_class_obj({})", self.type_id(name)),
            ConstOperand::Null => "JRT_NULL".to_string(),
        }
    }

    /// Class-id expression for a checkcast/instanceof operand, which may be
    /// an array descriptor.
    fn type_id(&self, class_name: &str) -> String {
        if class_name.starts_with('[') {
            format!("jrt_find_class(\"{}\")", escape_c(class_name))
        } else {
            cid_expr(self.program, class_name)
        }
    }

    /// (declaring class, member name, declared type) of an instance field.
    fn field_parts(
        &self,
        field: &crate::code::FieldRef,
        is_static: bool,
    ) -> (String, String, JavaType) {
        let ty = crate::descriptor::parse_type_descriptor(&field.descriptor)
            .unwrap_or(JavaType::Reference("java/lang/Object".into()));
        match resolve_field(self.program, &field.class_name, &field.name) {
            Some(f) => (f.owner.clone(), f.emission_name.clone(), f.ty.clone()),
            None => (
                field.class_name.clone(),
                mangle::field_emission_name(&field.class_name, &field.name, is_static),
                ty,
            ),
        }
    }

    fn static_field_parts(&self, field: &crate::code::FieldRef) -> (String, String, JavaType) {
        let (owner, name, ty) = self.field_parts(field, true);
        let symbol = format!("{}_{}", mangle::class_symbol(&owner), name);
        (owner, symbol, ty)
    }
}

// ---------------------------------------------------------------------------
// Names and literals
// ---------------------------------------------------------------------------

/// Deterministic emitted name of a TIR local.
pub fn local_name(local: &Local) -> String {
    let tag = match local.ty.stack_kind() {
        JavaType::Long => "j",
        JavaType::Float => "f",
        JavaType::Double => "d",
        JavaType::Reference(_) | JavaType::Array(_) => "a",
        _ => "i",
    };
    match local.kind {
        LocalKind::Param { slot } | LocalKind::Var { slot } => format!("l{}_{}", slot, tag),
        LocalKind::Temp { n } => format!("t{}", n),
        LocalKind::StackFlush { offset, depth } => format!("s{}_{}", offset, depth),
        LocalKind::Exception { handler } => format!("e{}", handler),
    }
}

fn array_letter(elem: &JavaType) -> &'static str {
    match elem {
        JavaType::Boolean | JavaType::Byte => "b",
        JavaType::Char => "c",
        JavaType::Short => "s",
        JavaType::Int => "i",
        JavaType::Long => "j",
        JavaType::Float => "f",
        JavaType::Double => "d",
        _ => "a",
    }
}

fn elem_cpp_type(elem: &JavaType) -> &'static str {
    match elem {
        JavaType::Boolean | JavaType::Byte => "jbyte",
        other => cpp_type(other),
    }
}

/// Conversion target type; narrowing conversions cast through the narrow
/// type even though the result is an int on the stack.
fn conv_cpp_type(target: &JavaType) -> &'static str {
    match target {
        JavaType::Byte => "jbyte",
        JavaType::Char => "jchar",
        JavaType::Short => "jshort",
        other => cpp_type(other),
    }
}

fn int_literal(v: i32) -> String {
    if v == i32::MIN {
        "(-2147483647 - 1)".to_string()
    } else {
        v.to_string()
    }
}

fn long_literal(v: i64) -> String {
    if v == i64::MIN {
        "(-9223372036854775807LL - 1)".to_string()
    } else {
        format!("{}LL", v)
    }
}

fn float_literal(v: f32) -> String {
    if v.is_nan() {
        "jrt_nan_f()".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "jrt_inf_f()".to_string()
        } else {
            "(-jrt_inf_f())".to_string()
        }
    } else {
        format!("{:?}f", v)
    }
}

fn double_literal(v: f64) -> String {
    if v.is_nan() {
        "jrt_nan_d()".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "jrt_inf_d()".to_string()
        } else {
            "(-jrt_inf_d())".to_string()
        }
    } else {
        format!("{:?}", v)
    }
}
