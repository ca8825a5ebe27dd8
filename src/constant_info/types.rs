use binrw::{binrw, BinRead, BinResult, Endian};

/// One constant-pool entry. Indices in the class file are 1-based; `Unusable`
/// fills the phantom slot after each 8-byte constant so lookups stay direct.
#[derive(Clone, Debug)]
#[binrw]
pub enum ConstantInfo {
    #[brw(magic(1u8))]
    Utf8(Utf8Constant),
    #[brw(magic(3u8))]
    Integer(IntegerConstant),
    #[brw(magic(4u8))]
    Float(FloatConstant),
    #[brw(magic(5u8))]
    Long(LongConstant),
    #[brw(magic(6u8))]
    Double(DoubleConstant),
    #[brw(magic(7u8))]
    Class(ClassConstant),
    #[brw(magic(8u8))]
    String(StringConstant),
    #[brw(magic(9u8))]
    FieldRef(RefConstant),
    #[brw(magic(10u8))]
    MethodRef(RefConstant),
    #[brw(magic(11u8))]
    InterfaceMethodRef(RefConstant),
    #[brw(magic(12u8))]
    NameAndType(NameAndTypeConstant),
    #[brw(magic(15u8))]
    MethodHandle(MethodHandleConstant),
    #[brw(magic(16u8))]
    MethodType(MethodTypeConstant),
    #[brw(magic(17u8))]
    Dynamic(DynamicConstant),
    #[brw(magic(18u8))]
    InvokeDynamic(DynamicConstant),
    #[brw(magic(19u8))]
    Module(ClassConstant),
    #[brw(magic(20u8))]
    Package(ClassConstant),
    Unusable,
}

/// Read `pool_size - 1` entries, inserting an `Unusable` placeholder after
/// every Long and Double so constant-pool indices map directly onto the Vec.
#[binrw::parser(reader)]
pub fn read_constant_pool(pool_size: u16) -> BinResult<Vec<ConstantInfo>> {
    let mut pool = Vec::with_capacity(pool_size.saturating_sub(1) as usize);
    while pool.len() + 1 < pool_size as usize {
        let entry = ConstantInfo::read_options(reader, Endian::Big, ())?;
        let wide = matches!(entry, ConstantInfo::Long(_) | ConstantInfo::Double(_));
        pool.push(entry);
        if wide {
            pool.push(ConstantInfo::Unusable);
        }
    }
    Ok(pool)
}

#[binrw::parser(reader)]
pub fn string_reader() -> BinResult<String> {
    let len = u16::read_options(reader, Endian::Big, ())?;
    let mut string_bytes = vec![0; len as usize];
    reader.read_exact(&mut string_bytes)?;
    let utf8_string = cesu8::from_java_cesu8(&string_bytes)
        .unwrap_or_else(|_| String::from_utf8_lossy(&string_bytes));
    Ok(utf8_string.to_string())
}

#[binrw::writer(writer)]
pub fn string_writer(s: &String) -> BinResult<()> {
    let encoded = cesu8::to_java_cesu8(s);
    writer.write_all(&u16::to_be_bytes(encoded.len() as u16))?;
    writer.write_all(&encoded)?;
    Ok(())
}

#[derive(Clone, Debug)]
#[binrw]
pub struct Utf8Constant {
    #[br(parse_with = string_reader)]
    #[bw(write_with = string_writer)]
    pub utf8_string: String,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct IntegerConstant {
    pub value: i32,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct FloatConstant {
    pub value: f32,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct LongConstant {
    pub value: i64,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct DoubleConstant {
    pub value: f64,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct ClassConstant {
    pub name_index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct StringConstant {
    pub string_index: u16,
}

/// Shared layout of FieldRef, MethodRef and InterfaceMethodRef.
#[derive(Clone, Debug)]
#[binrw]
pub struct RefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

/// Shared layout of Dynamic and InvokeDynamic.
#[derive(Clone, Debug)]
#[binrw]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

// ---------------------------------------------------------------------------
// Pool lookups (1-based indices, as stored in the class file)
// ---------------------------------------------------------------------------

pub fn get_utf8(const_pool: &[ConstantInfo], index: u16) -> Option<&str> {
    match const_pool.get((index as usize).checked_sub(1)?)? {
        ConstantInfo::Utf8(u) => Some(&u.utf8_string),
        _ => None,
    }
}

pub fn get_class_name(const_pool: &[ConstantInfo], class_index: u16) -> Option<&str> {
    match const_pool.get((class_index as usize).checked_sub(1)?)? {
        ConstantInfo::Class(c) => get_utf8(const_pool, c.name_index),
        _ => None,
    }
}

pub fn get_name_and_type(const_pool: &[ConstantInfo], nat_index: u16) -> Option<(&str, &str)> {
    match const_pool.get((nat_index as usize).checked_sub(1)?)? {
        ConstantInfo::NameAndType(nat) => {
            let name = get_utf8(const_pool, nat.name_index)?;
            let desc = get_utf8(const_pool, nat.descriptor_index)?;
            Some((name, desc))
        }
        _ => None,
    }
}

/// Resolve a FieldRef, MethodRef or InterfaceMethodRef to
/// (class_name, member_name, descriptor, is_interface).
pub fn resolve_ref(
    const_pool: &[ConstantInfo],
    index: u16,
) -> Option<(&str, &str, &str, bool)> {
    let entry = const_pool.get((index as usize).checked_sub(1)?)?;
    let (class_index, nat_index, iface) = match entry {
        ConstantInfo::FieldRef(r) => (r.class_index, r.name_and_type_index, false),
        ConstantInfo::MethodRef(r) => (r.class_index, r.name_and_type_index, false),
        ConstantInfo::InterfaceMethodRef(r) => (r.class_index, r.name_and_type_index, true),
        _ => return None,
    };
    let class_name = get_class_name(const_pool, class_index)?;
    let (name, desc) = get_name_and_type(const_pool, nat_index)?;
    Some((class_name, name, desc, iface))
}
