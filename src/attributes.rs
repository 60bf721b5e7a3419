//! Attributes B-tree specialization: extended-attribute listing and
//! inline-value lookup.

use byteorder::{BigEndian, ReadBytesExt};
use std::cmp::Ordering;
use std::io::{Cursor, Read, Seek};
use std::ops::ControlFlow;

use crate::btree::BTree;
use crate::cancel::CancelToken;
use crate::error::{Diagnostic, HfsError, Result};
use crate::unicode;

pub const RECORD_TYPE_INLINE_DATA: u32 = 0x10;
pub const RECORD_TYPE_FORK_DATA: u32 = 0x20;
pub const RECORD_TYPE_EXTENTS: u32 = 0x30;

#[derive(Debug, Clone)]
struct AttrKey {
    file_id: u32,
    start_block: u32,
    attr_name: Vec<u16>,
}

/// Parses an attribute key, returning the key, the byte offset of the
/// record that follows it, and `Some(raw_length)` if the stored name
/// length exceeded 127 UTF-16 code units and had to be clamped.
fn parse_attr_key(data: &[u8]) -> Result<(AttrKey, usize, Option<usize>)> {
    if data.len() < 12 {
        return Err(HfsError::corrupt("attribute key too short"));
    }
    let key_length = u16::from_be_bytes([data[0], data[1]]) as usize;
    let file_id = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let start_block = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
    let name_len_raw = u16::from_be_bytes([data[12], data[13]]) as usize;
    let name_len = name_len_raw.min(127);
    let clamped = (name_len_raw > 127).then_some(name_len_raw);

    let name_start = 14;
    let name_end = name_start + name_len * 2;
    if name_end > data.len() {
        return Err(HfsError::corrupt("attribute key name extends beyond data"));
    }
    let attr_name = unicode::utf16be_to_u16(&data[name_start..name_end]);

    let mut record_offset = 2 + key_length;
    if !record_offset.is_multiple_of(2) {
        record_offset += 1;
    }

    Ok((AttrKey { file_id, start_block, attr_name }, record_offset, clamped))
}

fn attr_key_ordering(record_data: &[u8], file_id: u32, attr_name: &[u16], start_block: u32) -> Ordering {
    let (key, _, _) = match parse_attr_key(record_data) {
        Ok(k) => k,
        Err(_) => return Ordering::Less,
    };

    match key.file_id.cmp(&file_id) {
        Ordering::Equal => {}
        ord => return ord,
    }

    let len = key.attr_name.len().min(attr_name.len());
    for (a, b) in key.attr_name[..len].iter().zip(&attr_name[..len]) {
        match a.cmp(b) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    match key.attr_name.len().cmp(&attr_name.len()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    key.start_block.cmp(&start_block)
}

/// The decoded value of an extended attribute. Only inline attributes
/// carry their bytes directly; fork-based attributes are surfaced by
/// shape without their payload (decoding them needs decmpfs-adjacent
/// overflow-extent machinery this crate does not implement).
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Inline(Vec<u8>),
    OutOfLine { logical_size: u64 },
}

/// List every attribute name stored for `file_id`, scanning forward from
/// the first leaf record with a matching `file_id`.
pub fn list_attributes<R: Read + Seek>(
    reader: &mut R,
    tree: &mut BTree,
    file_id: u32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<String>> {
    let empty_name: Vec<u16> = vec![];
    let start_node =
        tree.search_leaf(reader, &|record_data: &[u8]| attr_key_ordering(record_data, file_id, &empty_name, 0))?;
    let Some(start_node) = start_node else {
        return Ok(Vec::new());
    };

    let mut names = Vec::new();
    tree.walk(reader, start_node, &CancelToken::new(), &mut |record_data| {
        let (key, _, clamped) = match parse_attr_key(record_data) {
            Ok(k) => k,
            Err(_) => return ControlFlow::Continue(()),
        };
        if key.file_id < file_id {
            return ControlFlow::Continue(());
        }
        if key.file_id > file_id {
            return ControlFlow::Break(());
        }
        if let Some(raw) = clamped {
            diagnostics.push(Diagnostic::NameClamped { cnid: file_id, stored_length: raw });
        }
        let (name, invalid) = unicode::utf16_to_string(&key.attr_name);
        if invalid {
            diagnostics.push(Diagnostic::InvalidName { cnid: file_id });
        }
        names.push(name);
        ControlFlow::Continue(())
    })?;

    Ok(names)
}

/// Fetch the value of a single named attribute via an exact tree search.
pub fn get_attribute<R: Read + Seek>(
    reader: &mut R,
    tree: &mut BTree,
    file_id: u32,
    name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<AttributeValue> {
    let attr_name = unicode::string_to_utf16(name);
    let found = tree.search(reader, &|record_data: &[u8]| attr_key_ordering(record_data, file_id, &attr_name, 0))?;

    let (node_number, record_idx) = found.ok_or_else(|| HfsError::not_found(format!("attribute {name} on cnid {file_id}")))?;
    let node = tree.get_node(reader, node_number)?;
    let record_data = node.record_data(record_idx)?;
    let (_, record_offset, clamped) = parse_attr_key(record_data)?;
    if let Some(raw) = clamped {
        diagnostics.push(Diagnostic::NameClamped { cnid: file_id, stored_length: raw });
    }
    if record_offset >= record_data.len() {
        return Err(HfsError::corrupt("attribute record missing after key"));
    }

    let value_data = &record_data[record_offset..];
    if value_data.len() < 4 {
        return Err(HfsError::corrupt("attribute record too short"));
    }
    let record_type = u32::from_be_bytes([value_data[0], value_data[1], value_data[2], value_data[3]]);

    match record_type {
        RECORD_TYPE_INLINE_DATA => {
            let mut cursor = Cursor::new(value_data);
            cursor.set_position(4);
            let _reserved = [cursor.read_u32::<BigEndian>()?, cursor.read_u32::<BigEndian>()?];
            let attr_size = cursor.read_u32::<BigEndian>()? as usize;
            let data_start = cursor.position() as usize;
            let data_end = data_start + attr_size;
            if data_end > value_data.len() {
                return Err(HfsError::corrupt("inline attribute data extends beyond record"));
            }
            Ok(AttributeValue::Inline(value_data[data_start..data_end].to_vec()))
        }
        RECORD_TYPE_FORK_DATA => {
            let mut cursor = Cursor::new(value_data);
            cursor.set_position(8);
            let logical_size = cursor.read_u64::<BigEndian>()?;
            Ok(AttributeValue::OutOfLine { logical_size })
        }
        other => Err(HfsError::unsupported(format!("attribute record type 0x{other:02X}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attr_key_reports_clamp_for_oversized_name() {
        let name_len_raw: u16 = 200;
        let mut data = vec![0u8; 14 + 127 * 2];
        data[0..2].copy_from_slice(&40u16.to_be_bytes());
        data[4..8].copy_from_slice(&5u32.to_be_bytes());
        data[12..14].copy_from_slice(&name_len_raw.to_be_bytes());

        let (key, _, clamped) = parse_attr_key(&data).unwrap();
        assert_eq!(clamped, Some(200));
        assert_eq!(key.attr_name.len(), 127);
    }

    #[test]
    fn attr_key_ordering_sorts_by_file_id_then_name() {
        let mut record_a = vec![0u8; 14];
        record_a[0..2].copy_from_slice(&12u16.to_be_bytes());
        record_a[4..8].copy_from_slice(&5u32.to_be_bytes());
        record_a[12..14].copy_from_slice(&0u16.to_be_bytes());

        assert_eq!(attr_key_ordering(&record_a, 10, &[], 0), Ordering::Less);
        assert_eq!(attr_key_ordering(&record_a, 5, &[], 0), Ordering::Equal);
        assert_eq!(attr_key_ordering(&record_a, 1, &[], 0), Ordering::Greater);
    }
}
