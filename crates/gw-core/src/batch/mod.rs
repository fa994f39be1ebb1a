//! Read batching: groups tags addressed on the same device into the
//! fewest round trips the wire protocol allows.
//!
//! Register-addressed devices get contiguous-span merging bounded by the
//! protocol's per-request quantity limit (125 registers, MODBUS
//! Application Protocol v1.1b3 §6.3/§6.4). Object-addressed devices have
//! no notion of a contiguous span, so batching there is a simple
//! fixed-size chunking of independent Read Tag Service requests.

use gw_protocol::{FunctionCode, ParsedAddress};

/// A tag paired with its codec-parsed address, ready for batch planning.
#[derive(Debug, Clone)]
pub struct AddressedTag {
    pub tag_id: String,
    pub address: ParsedAddress,
}

/// One physical read request covering a contiguous register span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBatch {
    pub unit_id: u8,
    pub function_code: FunctionCode,
    pub start_address: u16,
    pub quantity: u16,
    pub tag_ids: Vec<String>,
}

fn function_code_key(fc: FunctionCode) -> u8 {
    match fc {
        FunctionCode::Coil => 0,
        FunctionCode::DiscreteInput => 1,
        FunctionCode::InputRegister => 2,
        FunctionCode::HoldingRegister => 3,
    }
}

fn function_code_from_key(key: u8) -> FunctionCode {
    match key {
        0 => FunctionCode::Coil,
        1 => FunctionCode::DiscreteInput,
        2 => FunctionCode::InputRegister,
        _ => FunctionCode::HoldingRegister,
    }
}

/// Groups register-addressed tags by `(unit_id, function_code)`, then
/// greedily merges adjacent-or-overlapping spans as long as the merged
/// span stays within `max_quantity` registers.
pub fn plan_register_batches(tags: &[AddressedTag], max_quantity: u16) -> Vec<RegisterBatch> {
    use std::collections::BTreeMap;

    let mut groups: BTreeMap<(u8, u8), Vec<(u16, u16, String)>> = BTreeMap::new();
    for tag in tags {
        if let ParsedAddress::Register {
            function_code,
            register_address,
            count,
            unit_id,
        } = &tag.address
        {
            groups
                .entry((*unit_id, function_code_key(*function_code)))
                .or_default()
                .push((*register_address, *count, tag.tag_id.clone()));
        }
    }

    let mut batches = Vec::new();
    for ((unit_id, fc_key), mut items) in groups {
        items.sort_by_key(|(addr, _, _)| *addr);
        let function_code = function_code_from_key(fc_key);
        let mut current: Option<RegisterBatch> = None;

        for (addr, count, tag_id) in items {
            let end = addr + count;
            match current.as_mut() {
                Some(batch) => {
                    let batch_end = batch.start_address + batch.quantity;
                    let merged_end = end.max(batch_end);
                    let span = merged_end - batch.start_address;
                    if span <= max_quantity {
                        batch.quantity = span;
                        batch.tag_ids.push(tag_id);
                        continue;
                    }
                }
                None => {}
            }
            if let Some(finished) = current.take() {
                batches.push(finished);
            }
            current = Some(RegisterBatch {
                unit_id,
                function_code,
                start_address: addr,
                quantity: count,
                tag_ids: vec![tag_id],
            });
        }
        if let Some(finished) = current {
            batches.push(finished);
        }
    }
    batches
}

/// Chunks object-addressed tags into groups of at most `max_tags_per_batch`,
/// preserving input order. Each chunk becomes one Multiple Service Packet
/// (or, for a single-element chunk, one plain Read Tag Service request).
pub fn plan_object_batches(tags: &[AddressedTag], max_tags_per_batch: usize) -> Vec<Vec<String>> {
    tags.chunks(max_tags_per_batch.max(1))
        .map(|chunk| chunk.iter().map(|t| t.tag_id.clone()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(tag_id: &str, address: u16, count: u16, unit_id: u8) -> AddressedTag {
        AddressedTag {
            tag_id: tag_id.to_string(),
            address: ParsedAddress::Register {
                function_code: FunctionCode::HoldingRegister,
                register_address: address,
                count,
                unit_id,
            },
        }
    }

    #[test]
    fn adjacent_tags_merge_into_one_batch() {
        let tags = vec![reg("t1", 0, 1, 1), reg("t2", 1, 1, 1), reg("t3", 2, 1, 1)];
        let batches = plan_register_batches(&tags, 125);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start_address, 0);
        assert_eq!(batches[0].quantity, 3);
        assert_eq!(batches[0].tag_ids, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn span_exceeding_max_quantity_splits_into_two_batches() {
        let tags = vec![reg("t1", 0, 1, 1), reg("t2", 200, 1, 1)];
        let batches = plan_register_batches(&tags, 125);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn different_unit_ids_never_share_a_batch() {
        let tags = vec![reg("t1", 0, 1, 1), reg("t2", 1, 1, 2)];
        let batches = plan_register_batches(&tags, 125);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn different_function_codes_never_share_a_batch() {
        let mut t2 = reg("t2", 1, 1, 1);
        t2.address = ParsedAddress::Register {
            function_code: FunctionCode::Coil,
            register_address: 1,
            count: 1,
            unit_id: 1,
        };
        let tags = vec![reg("t1", 0, 1, 1), t2];
        let batches = plan_register_batches(&tags, 125);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn object_batches_chunk_preserving_order() {
        let tags = vec![
            AddressedTag {
                tag_id: "a".to_string(),
                address: ParsedAddress::Symbolic {
                    tag_name: "A".to_string(),
                    array_index: None,
                },
            },
            AddressedTag {
                tag_id: "b".to_string(),
                address: ParsedAddress::Symbolic {
                    tag_name: "B".to_string(),
                    array_index: None,
                },
            },
            AddressedTag {
                tag_id: "c".to_string(),
                address: ParsedAddress::Symbolic {
                    tag_name: "C".to_string(),
                    array_index: None,
                },
            },
        ];
        let batches = plan_object_batches(&tags, 2);
        assert_eq!(batches, vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]]);
    }
}
