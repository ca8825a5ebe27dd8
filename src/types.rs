use crate::attribute_info::AttributeInfo;
use crate::constant_info::{get_class_name, get_utf8, read_constant_pool, ConstantInfo};
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;

use binrw::binrw;

/// The raw class-file container. Everything is declarative except the
/// constant pool, whose 1-based indexing and double-width entries need the
/// custom reader. Counts stay as fields so a parsed file serializes back
/// bit-for-bit for round-trip checks.
#[derive(Clone, Debug)]
#[binrw]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub const_pool_size: u16,
    #[br(parse_with = read_constant_pool, args(const_pool_size))]
    pub const_pool: Vec<ConstantInfo>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    pub fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    pub methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    /// Internal (slashed) name of this class.
    pub fn this_class_name(&self) -> Option<&str> {
        get_class_name(&self.const_pool, self.this_class)
    }

    /// Attribute name for one of this class's raw attributes.
    pub fn attribute_name(&self, attr: &AttributeInfo) -> Option<&str> {
        get_utf8(&self.const_pool, attr.attribute_name_index)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[binrw]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     // Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      // Declared final; no subclasses allowed.
        const SUPER = 0x0020;      // Treat superclass methods specially for invokespecial.
        const INTERFACE = 0x0200;  // Is an interface, not a class.
        const ABSTRACT = 0x0400;   // Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  // Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; // Declared as an annotation type.
        const ENUM = 0x4000;       // Declared as an enum type.
        const MODULE = 0x8000;     // Declared as a module type.
    }
}
