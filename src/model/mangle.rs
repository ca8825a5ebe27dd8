//! Deterministic emission-name construction. The emitted symbol for a member
//! encodes its owner, original name and a hash of the type descriptor, which
//! keeps overloads apart without depending on declaration order.

/// 32-bit FNV-1a. Stable across runs and platforms, unlike the std hasher.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Hex digest of a descriptor, used to disambiguate overloads.
pub fn descriptor_hash(descriptor: &str) -> String {
    format!("{:08x}", fnv1a(descriptor.as_bytes()))
}

/// Replace everything the target language rejects in an identifier.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.as_bytes()[0].is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}

/// Symbol prefix for a class: the internal name with separators flattened.
pub fn class_symbol(internal_name: &str) -> String {
    sanitize(internal_name)
}

/// Emission name for a field. Mixes the owner's simple name in so shadowed
/// fields from different classes stay distinct in the flattened layout.
pub fn field_emission_name(owner: &str, name: &str, is_static: bool) -> String {
    let owner_simple = crate::descriptor::simple_class_name(owner);
    let prefix = if is_static { "sf" } else { "f" };
    format!("{}_{}_{}", prefix, sanitize(owner_simple), sanitize(name))
}

/// Emission name for a method, overload-safe through the descriptor hash.
pub fn method_emission_name(name: &str, descriptor: &str) -> String {
    let base = match name {
        "<init>" => "init".to_string(),
        "<clinit>" => "clinit".to_string(),
        other => sanitize(other),
    };
    format!("m_{}_{}", base, descriptor_hash(descriptor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("value"), "value");
        assert_eq!(sanitize("lambda$0"), "lambda_0");
        assert_eq!(sanitize("2x"), "_2x");
        assert_eq!(sanitize(""), "_");
    }

    #[test]
    fn test_class_symbol() {
        assert_eq!(class_symbol("java/lang/Object"), "java_lang_Object");
        assert_eq!(class_symbol("Outer$Inner"), "Outer_Inner");
    }

    #[test]
    fn test_overloads_do_not_collide() {
        let a = method_emission_name("run", "()V");
        let b = method_emission_name("run", "(I)V");
        assert_ne!(a, b);
        assert!(a.starts_with("m_run_"));
    }

    #[test]
    fn test_emission_names_are_stable() {
        assert_eq!(
            method_emission_name("run", "()V"),
            method_emission_name("run", "()V")
        );
        assert_eq!(descriptor_hash("()V"), descriptor_hash("()V"));
    }

    #[test]
    fn test_constructor_names() {
        assert!(method_emission_name("<init>", "()V").starts_with("m_init_"));
        assert!(method_emission_name("<clinit>", "()V").starts_with("m_clinit_"));
    }

    #[test]
    fn test_field_names_mix_owner() {
        let base = field_emission_name("pkg/Base", "x", false);
        let derived = field_emission_name("pkg/Derived", "x", false);
        assert_ne!(base, derived);
        assert!(field_emission_name("pkg/Base", "x", true).starts_with("sf_"));
    }
}
