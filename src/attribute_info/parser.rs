//! nom parsers for the attribute payloads the transpiler consumes. Each
//! parser takes the raw `info` bytes of an [`AttributeInfo`] whose name has
//! already been matched against the pool.

use nom::{
    bytes::complete::take,
    combinator::map,
    error::{Error, ErrorKind},
    multi::length_count,
    number::complete::{be_u16, be_u32, be_u8},
    sequence::tuple,
    Err as NomErr, IResult,
};

use crate::attribute_info::*;

pub fn code_attribute(input: &[u8]) -> IResult<&[u8], CodeAttribute> {
    let (rest, (max_stack, max_locals, code_length)) = tuple((be_u16, be_u16, be_u32))(input)?;
    let (rest, code) = take(code_length)(rest)?;
    let (rest, exception_table) = length_count(be_u16, handler_range)(rest)?;
    let (rest, attributes) = length_count(be_u16, raw_attribute)(rest)?;
    Ok((
        rest,
        CodeAttribute {
            max_stack,
            max_locals,
            code: code.to_vec(),
            exception_table,
            attributes,
        },
    ))
}

fn handler_range(input: &[u8]) -> IResult<&[u8], ExceptionEntry> {
    map(
        tuple((be_u16, be_u16, be_u16, be_u16)),
        |(start_pc, end_pc, handler_pc, catch_type)| ExceptionEntry {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        },
    )(input)
}

/// Nested attributes inside a Code payload are kept raw, exactly like the
/// top-level table.
fn raw_attribute(input: &[u8]) -> IResult<&[u8], AttributeInfo> {
    let (rest, (attribute_name_index, attribute_length)) = tuple((be_u16, be_u32))(input)?;
    map(take(attribute_length), move |info: &[u8]| AttributeInfo {
        attribute_name_index,
        attribute_length,
        info: info.to_vec(),
    })(rest)
}

pub fn constant_value_attribute(input: &[u8]) -> IResult<&[u8], ConstantValueAttribute> {
    map(be_u16, |constant_value_index| ConstantValueAttribute {
        constant_value_index,
    })(input)
}

pub fn source_file_attribute(input: &[u8]) -> IResult<&[u8], SourceFileAttribute> {
    map(be_u16, |sourcefile_index| SourceFileAttribute { sourcefile_index })(input)
}

pub fn annotations_attribute(input: &[u8]) -> IResult<&[u8], RuntimeAnnotationsAttribute> {
    map(length_count(be_u16, annotation), |annotations| {
        RuntimeAnnotationsAttribute { annotations }
    })(input)
}

pub fn annotation_default_attribute(input: &[u8]) -> IResult<&[u8], AnnotationDefaultAttribute> {
    map(element_value, |default_value| AnnotationDefaultAttribute {
        default_value,
    })(input)
}

fn annotation(input: &[u8]) -> IResult<&[u8], RuntimeAnnotation> {
    let (rest, type_index) = be_u16(input)?;
    map(
        length_count(be_u16, element_value_pair),
        move |element_value_pairs| RuntimeAnnotation {
            type_index,
            element_value_pairs,
        },
    )(rest)
}

fn element_value_pair(input: &[u8]) -> IResult<&[u8], ElementValuePair> {
    let (rest, element_name_index) = be_u16(input)?;
    map(element_value, move |value| ElementValuePair {
        element_name_index,
        value,
    })(rest)
}

fn element_value(input: &[u8]) -> IResult<&[u8], ElementValue> {
    let (rest, tag) = be_u8(input)?;
    match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' | b'D' | b'F' | b'J' | b's' => {
            map(be_u16, |value| ElementValue::ConstValueIndex {
                tag: tag as char,
                value,
            })(rest)
        }
        b'e' => map(
            tuple((be_u16, be_u16)),
            |(type_name_index, const_name_index)| ElementValue::EnumConst {
                type_name_index,
                const_name_index,
            },
        )(rest),
        b'c' => map(be_u16, ElementValue::ClassInfoIndex)(rest),
        b'@' => map(annotation, ElementValue::AnnotationValue)(rest),
        b'[' => map(length_count(be_u16, element_value), ElementValue::ElementArray)(rest),
        _ => Err(NomErr::Error(Error::new(rest, ErrorKind::Switch))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be16(v: u16) -> [u8; 2] {
        v.to_be_bytes()
    }

    #[test]
    fn test_code_attribute_with_handler() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&be16(3)); // max_stack
        payload.extend_from_slice(&be16(2)); // max_locals
        payload.extend_from_slice(&5u32.to_be_bytes());
        payload.extend_from_slice(&[0x03, 0x3c, 0x1b, 0xac, 0x00]);
        payload.extend_from_slice(&be16(1)); // one handler
        for v in [0u16, 4, 4, 7] {
            payload.extend_from_slice(&be16(v));
        }
        payload.extend_from_slice(&be16(0)); // no nested attributes

        let (rest, code) = code_attribute(&payload).expect("parses");
        assert!(rest.is_empty());
        assert_eq!(code.max_stack, 3);
        assert_eq!(code.code.len(), 5);
        assert_eq!(
            code.exception_table,
            vec![ExceptionEntry {
                start_pc: 0,
                end_pc: 4,
                handler_pc: 4,
                catch_type: 7,
            }]
        );
    }

    #[test]
    fn test_element_value_array() {
        // '[' , two 'I' entries pointing at pool slots 5 and 6
        let payload = [b'[', 0, 2, b'I', 0, 5, b'I', 0, 6];
        let (rest, value) = element_value(&payload).expect("parses");
        assert!(rest.is_empty());
        match value {
            ElementValue::ElementArray(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_element_value_rejects_unknown_tag() {
        assert!(element_value(&[b'?', 0, 1]).is_err());
    }

    #[test]
    fn test_truncated_code_attribute_is_error() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&be16(1));
        payload.extend_from_slice(&be16(1));
        payload.extend_from_slice(&9u32.to_be_bytes()); // claims more code than present
        payload.extend_from_slice(&[0x00]);
        assert!(code_attribute(&payload).is_err());
    }
}
