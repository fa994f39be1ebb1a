//! Object-addressed address parsing: either a symbolic tag name (with an
//! optional array index, e.g. `Program:MainProgram.FlowRate[3]`) or an
//! explicit class/instance/attribute address (`class@instance` or
//! `class@instance.attribute`, attribute defaulting to 1 when omitted).

use crate::error::CodecError;
use gw_protocol::ParsedAddress;

const DEFAULT_ATTRIBUTE_ID: u16 = 1;

/// Parses an object address string into a `ParsedAddress`.
pub fn parse_address(s: &str) -> Result<ParsedAddress, CodecError> {
    if s.is_empty() {
        return Err(CodecError::InvalidAddress("address is empty".to_string()));
    }
    if s.contains('@') {
        return parse_instance_address(s);
    }
    parse_symbolic_address(s)
}

fn parse_symbolic_address(s: &str) -> Result<ParsedAddress, CodecError> {
    let valid_chars = s
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == ':' || c == '[' || c == ']');
    if !valid_chars {
        return Err(CodecError::InvalidAddress(format!(
            "invalid characters in tag address: {s}"
        )));
    }

    let (tag_name, array_index) = match s.find('[') {
        None => (s.to_string(), None),
        Some(open) => {
            if !s.ends_with(']') {
                return Err(CodecError::InvalidAddress(format!(
                    "unterminated array index: {s}"
                )));
            }
            let index_str = &s[open + 1..s.len() - 1];
            let index: u32 = index_str
                .parse()
                .map_err(|_| CodecError::InvalidAddress(format!("bad array index: {s}")))?;
            (s[..open].to_string(), Some(index))
        }
    };
    if tag_name.is_empty() {
        return Err(CodecError::InvalidAddress("tag name is empty".to_string()));
    }
    Ok(ParsedAddress::Symbolic {
        tag_name,
        array_index,
    })
}

/// Parses `class@instance` or `class@instance.attribute`. The attribute
/// defaults to 1 when omitted — there is no such thing as an attribute-less
/// CIP object address, only an unstated one.
fn parse_instance_address(s: &str) -> Result<ParsedAddress, CodecError> {
    let (class_str, rest) = s
        .split_once('@')
        .ok_or_else(|| CodecError::InvalidAddress(format!("missing '@': {s}")))?;
    if rest.contains('@') {
        return Err(CodecError::InvalidAddress(format!("malformed address: {s}")));
    }
    let class_id: u16 = class_str
        .parse()
        .map_err(|_| CodecError::InvalidAddress(format!("bad class id: {class_str}")))?;

    let (instance_str, attribute_id) = match rest.split_once('.') {
        None => (rest, DEFAULT_ATTRIBUTE_ID),
        Some((instance_str, attribute_str)) => {
            let attribute_id: u16 = attribute_str
                .parse()
                .map_err(|_| CodecError::InvalidAddress(format!("bad attribute id: {attribute_str}")))?;
            (instance_str, attribute_id)
        }
    };
    let instance_id: u32 = instance_str
        .parse()
        .map_err(|_| CodecError::InvalidAddress(format!("bad instance id: {instance_str}")))?;

    Ok(ParsedAddress::Instance {
        class_id,
        instance_id,
        attribute_id,
    })
}
