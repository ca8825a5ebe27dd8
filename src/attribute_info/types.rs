use binrw::binrw;

/// A raw attribute as stored in the class file: a name index plus an opaque
/// payload. The payloads the transpiler consumes are decoded on demand by
/// the `nom` parsers in this module's `parser`; everything else stays raw.
#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    #[br(count = attribute_length)]
    pub info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// Decoded Code attribute payload. `code` stays a byte array here; the
/// instruction decoder produces the normalized stream from it.
#[derive(Clone, Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Clone, Debug)]
pub struct ConstantValueAttribute {
    pub constant_value_index: u16,
}

#[derive(Clone, Debug)]
pub struct SourceFileAttribute {
    pub sourcefile_index: u16,
}

#[derive(Clone, Debug)]
pub struct RuntimeAnnotationsAttribute {
    pub annotations: Vec<RuntimeAnnotation>,
}

#[derive(Clone, Debug)]
pub struct RuntimeAnnotation {
    pub type_index: u16,
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Clone, Debug)]
pub struct ElementValuePair {
    pub element_name_index: u16,
    pub value: ElementValue,
}

#[derive(Clone, Debug)]
pub enum ElementValue {
    ConstValueIndex { tag: char, value: u16 },
    EnumConst { type_name_index: u16, const_name_index: u16 },
    ClassInfoIndex(u16),
    AnnotationValue(RuntimeAnnotation),
    ElementArray(Vec<ElementValue>),
}

/// AnnotationDefault payload: the default value of one annotation element.
#[derive(Clone, Debug)]
pub struct AnnotationDefaultAttribute {
    pub default_value: ElementValue,
}
