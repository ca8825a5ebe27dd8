//! The in-memory class graph shared by every pipeline stage. Cross-references
//! between classes are by-name lookups through [`ProgramModel::class`], never
//! owning pointers, so the ownership graph stays acyclic while the type graph
//! may contain cycles.

pub mod mangle;

use std::collections::{BTreeMap, BTreeSet};

use crate::code::{ConstOperand, InstructionStream};
use crate::descriptor::JavaType;
use crate::field_info::FieldAccessFlags;
use crate::lower::tir::TirBody;
use crate::method_info::MethodAccessFlags;
use crate::types::ClassAccessFlags;

pub const OBJECT_CLASS: &str = "java/lang/Object";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
    Array,
    Primitive,
}

/// An annotation occurrence: type name plus explicit element values.
/// Elements left to their declared defaults are filled in during Resolve.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotationModel {
    pub type_name: String,
    pub values: BTreeMap<String, AnnotationValue>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    Const(ConstOperand),
    EnumConst {
        type_name: String,
        const_name: String,
    },
    ClassRef(String),
    Nested(AnnotationModel),
    Array(Vec<AnnotationValue>),
}

#[derive(Clone, Debug)]
pub struct FieldModel {
    pub owner: String,
    pub name: String,
    /// Collision-free name used in emitted code; deterministic from owner
    /// and original name.
    pub emission_name: String,
    pub access: FieldAccessFlags,
    pub descriptor: String,
    pub ty: JavaType,
    pub constant_value: Option<ConstOperand>,
    pub annotations: Vec<AnnotationModel>,
}

impl FieldModel {
    pub fn is_static(&self) -> bool {
        self.access.contains(FieldAccessFlags::STATIC)
    }
}

/// One entry of a method's exception-handler table, with the catch type
/// resolved to a name. `catch_type == None` is the catch-all used by finally.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerEntry {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    pub catch_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MethodModel {
    pub owner: String,
    pub name: String,
    pub emission_name: String,
    pub access: MethodAccessFlags,
    pub descriptor: String,
    pub params: Vec<JavaType>,
    pub return_type: JavaType,
    pub max_locals: u16,
    pub handlers: Vec<HandlerEntry>,
    pub instructions: InstructionStream,
    pub annotations: Vec<AnnotationModel>,
    /// Default value, present only on annotation-interface elements.
    pub annotation_default: Option<AnnotationValue>,
    /// Index into the owner's v-table, or -1 for anything dispatched
    /// without one. Assigned during Resolve.
    pub vslot: i32,
    /// Lowered body. Populated by Lower; absent for abstract/native methods.
    pub tir: Option<TirBody>,
}

impl MethodModel {
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_private(&self) -> bool {
        self.access.contains(MethodAccessFlags::PRIVATE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_native(&self) -> bool {
        self.access.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_final(&self) -> bool {
        self.access.contains(MethodAccessFlags::FINAL)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }

    /// Candidates for v-table slots: instance methods that subclasses can
    /// override.
    pub fn is_virtual(&self) -> bool {
        !self.is_static()
            && !self.is_private()
            && !self.is_constructor()
            && !self.is_class_initializer()
    }

    pub fn signature(&self) -> (&str, &str) {
        (&self.name, &self.descriptor)
    }
}

/// One flattened instance-field slot. Offsets are defined by position in the
/// owner class's `layout`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSlot {
    pub owner: String,
    pub emission_name: String,
    pub ty: JavaType,
    pub slot: u32,
}

/// One v-table slot: the method identity plus the class whose implementation
/// currently occupies the slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VtableEntry {
    pub name: String,
    pub descriptor: String,
    pub impl_class: String,
}

/// Interface-dispatch entry: interface method identity mapped to the class
/// (or default-declaring interface) that implements it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItableEntry {
    pub interface: String,
    pub name: String,
    pub descriptor: String,
    pub impl_class: String,
}

#[derive(Clone, Debug)]
pub struct ClassModel {
    /// Fully-qualified internal (slashed) name.
    pub name: String,
    /// Collision-free symbol prefix used in emitted code.
    pub emission_name: String,
    pub kind: ClassKind,
    pub access: ClassAccessFlags,
    /// Name of the super class; None only for the root class and absent
    /// supers of interfaces (which all report the root).
    pub super_name: Option<String>,
    pub interface_names: Vec<String>,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
    pub annotations: Vec<AnnotationModel>,
    pub source_file: Option<String>,

    // Link-derived fields, populated by Resolve and frozen afterwards.
    /// Transitive supertypes (classes and interfaces), excluding self.
    pub supertypes: BTreeSet<String>,
    /// Flattened instance-field layout: super's layout followed by own
    /// instance fields.
    pub layout: Vec<FieldSlot>,
    pub vtable: Vec<VtableEntry>,
    pub itable: Vec<ItableEntry>,
    /// Dense id assigned in lexicographic name order.
    pub class_id: u32,
    pub reachable: bool,
}

impl ClassModel {
    pub fn new(name: String, kind: ClassKind, access: ClassAccessFlags) -> Self {
        Self {
            emission_name: mangle::class_symbol(&name),
            name,
            kind,
            access,
            super_name: None,
            interface_names: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            source_file: None,
            supertypes: BTreeSet::new(),
            layout: Vec::new(),
            vtable: Vec::new(),
            itable: Vec::new(),
            class_id: 0,
            reachable: false,
        }
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface | ClassKind::Annotation)
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldModel> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    pub fn static_fields(&self) -> impl Iterator<Item = &FieldModel> {
        self.fields.iter().filter(|f| f.is_static())
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodModel> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn has_class_initializer(&self) -> bool {
        self.methods.iter().any(|m| m.is_class_initializer())
    }
}

/// Root container for the whole closed program. Built during Ingest,
/// link fields filled by Resolve, read-only afterwards. The BTreeMap keeps
/// every program-wide walk in lexicographic class-name order.
#[derive(Clone, Debug, Default)]
pub struct ProgramModel {
    pub classes: BTreeMap<String, ClassModel>,
}

impl ProgramModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(&self, name: &str) -> Option<&ClassModel> {
        self.classes.get(name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassModel> {
        self.classes.get_mut(name)
    }

    /// True if `sub` is `sup` or a transitive subtype of it. Valid only
    /// after Resolve.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        self.classes
            .get(sub)
            .map(|c| c.supertypes.contains(sup))
            .unwrap_or(false)
    }

    /// Least upper bound of two reference types in the resolved hierarchy.
    /// Walks `a`'s superclass chain for the first type that is also a
    /// supertype of `b`; anything unknown merges to the root class.
    pub fn least_upper_bound(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }
        let mut cursor = Some(a.to_string());
        while let Some(name) = cursor {
            if self.is_subtype(b, &name) {
                return name;
            }
            cursor = self
                .classes
                .get(&name)
                .and_then(|c| c.super_name.clone());
        }
        OBJECT_CLASS.to_string()
    }

    /// Find a method by (name, descriptor), walking the superclass chain.
    pub fn find_method_on(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(&ClassModel, &MethodModel)> {
        let mut cursor = Some(class_name.to_string());
        while let Some(current) = cursor {
            let class = self.classes.get(&current)?;
            if let Some(m) = class.find_method(name, descriptor) {
                return Some((class, m));
            }
            cursor = class.super_name.clone();
        }
        None
    }
}
