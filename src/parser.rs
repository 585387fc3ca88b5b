//! Turning the model's free-text answer back into one record per card.
//!
//! The model answers with blocks of `**Field:** value` lines. Values are
//! matched to cards either by position (the Nth `**City:**` belongs to the
//! Nth card) or, when the blocks carry a `**Record:** n` tag, by that number.

use regex::Regex;
use std::collections::BTreeMap;

use crate::completion::RECORD_LABEL;
use crate::normalize::clean_value;
use crate::types::{ContactRecord, Field};

/// Cleaned values per field, in the order the model emitted them.
pub type FieldValues = BTreeMap<Field, Vec<String>>;

fn field_re(label: &str) -> Regex {
    Regex::new(&format!(
        r"(?m)\*\*{}:\*\*[ \t]*(.*?)[ \t\r]*$",
        regex::escape(label)
    ))
    .expect("field regex")
}

fn record_re() -> Regex {
    Regex::new(&format!(
        r"^\s*\*\*{}:\*\*\s*#?(\d+)",
        regex::escape(RECORD_LABEL)
    ))
    .expect("record regex")
}

/// Collect every same-line value for each field. Placeholders become empty strings.
pub fn parse_response(raw: &str, fields: &[Field]) -> FieldValues {
    let mut values = FieldValues::new();
    for &field in fields {
        let re = field_re(field.label());
        let found: Vec<String> = re
            .captures_iter(raw)
            .map(|caps| clean_value(caps.get(1).map(|m| m.as_str()).unwrap_or("")))
            .collect();
        values.insert(field, found);
    }
    values
}

/// Positional join: value N of each field goes to record N, blanks past the end.
pub fn assemble_records(values: &FieldValues, count: usize) -> Vec<ContactRecord> {
    (0..count)
        .map(|idx| {
            let mut record = ContactRecord::default();
            for (field, list) in values {
                if let Some(v) = list.get(idx) {
                    record.set(*field, v.clone());
                }
            }
            record
        })
        .collect()
}

/// A block of the response introduced by `**Record:** n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBlock {
    pub index: usize,
    pub record: ContactRecord,
}

/// Split the response into numbered blocks. `None` when no block is numbered.
pub fn parse_tagged_records(raw: &str, fields: &[Field]) -> Option<Vec<TaggedBlock>> {
    let record_re = record_re();
    let field_res: Vec<(Field, Regex)> = fields
        .iter()
        .map(|&f| (f, field_re(f.label())))
        .collect();

    let mut blocks: Vec<TaggedBlock> = Vec::new();
    for line in raw.lines() {
        if let Some(caps) = record_re.captures(line) {
            let index = caps[1].parse::<usize>().unwrap_or(0);
            blocks.push(TaggedBlock {
                index,
                record: ContactRecord::default(),
            });
            continue;
        }
        // Lines before the first tag have no record to land in.
        let Some(current) = blocks.last_mut() else {
            continue;
        };
        for (field, re) in &field_res {
            if let Some(caps) = re.captures(line) {
                if current.record.get(*field).is_empty() {
                    let value = clean_value(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
                    current.record.set(*field, value);
                }
            }
        }
    }

    if blocks.is_empty() {
        None
    } else {
        Some(blocks)
    }
}

/// Problems found while matching the response to the batch. None of them are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    /// 1-based record numbers the model never answered.
    pub missing: Vec<usize>,
    /// Record numbers answered more than once; the first answer is kept.
    pub duplicates: Vec<usize>,
    /// Record numbers outside `1..=count`.
    pub out_of_range: Vec<usize>,
    /// Fields whose value count differs from the batch size (positional join only).
    pub short_fields: Vec<(Field, usize)>,
}

impl AlignmentReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
            && self.duplicates.is_empty()
            && self.out_of_range.is_empty()
            && self.short_fields.is_empty()
    }

    pub fn warning_count(&self) -> usize {
        self.missing.len() + self.duplicates.len() + self.out_of_range.len() + self.short_fields.len()
    }
}

/// Keyed join: place each block by its record number.
pub fn align_tagged(blocks: Vec<TaggedBlock>, count: usize) -> (Vec<ContactRecord>, AlignmentReport) {
    let mut slots: Vec<Option<ContactRecord>> = vec![None; count];
    let mut report = AlignmentReport::default();
    for block in blocks {
        if block.index == 0 || block.index > count {
            report.out_of_range.push(block.index);
            continue;
        }
        let slot = &mut slots[block.index - 1];
        if slot.is_some() {
            report.duplicates.push(block.index);
        } else {
            *slot = Some(block.record);
        }
    }
    let records = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or_else(|| {
                report.missing.push(i + 1);
                ContactRecord::default()
            })
        })
        .collect();
    (records, report)
}

/// Records for a batch of `count` cards, keyed when the response is numbered.
pub fn align_response(
    raw: &str,
    fields: &[Field],
    count: usize,
    tag_records: bool,
) -> (Vec<ContactRecord>, AlignmentReport) {
    if tag_records {
        if let Some(blocks) = parse_tagged_records(raw, fields) {
            return align_tagged(blocks, count);
        }
    }
    let values = parse_response(raw, fields);
    let mut report = AlignmentReport::default();
    for (field, list) in &values {
        if list.len() != count {
            report.short_fields.push((*field, list.len()));
        }
    }
    (assemble_records(&values, count), report)
}

/// Each field's values down the batch, for logging what was extracted.
pub fn field_columns<'r>(records: &'r [ContactRecord], fields: &[Field]) -> Vec<(Field, Vec<&'r str>)> {
    fields
        .iter()
        .map(|&field| (field, records.iter().map(|r| r.get(field)).collect()))
        .collect()
}
