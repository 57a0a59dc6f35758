//! I/O-class policy validation.
//!
//! An I/O-class policy is a CSV file with exactly four columns:
//!
//! ```text
//! IO class id,IO class name,Eviction priority,Allocation
//! 0,unclassified,22,1
//! 1,metadata&done,0,1
//! 11,file_size:le:4096&done,9,1
//! ```
//!
//! Validation is all-or-nothing: a single bad row rejects the whole file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

pub const FIELD_ID: &str = "IO class id";
pub const FIELD_NAME: &str = "IO class name";
pub const FIELD_EVICTION_PRIORITY: &str = "Eviction priority";
pub const FIELD_ALLOCATION: &str = "Allocation";

const REQUIRED_FIELDS: [&str; 4] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_EVICTION_PRIORITY,
    FIELD_ALLOCATION,
];

pub const MAX_IOCLASS_ID: u8 = 32;
pub const MAX_NAME_LEN: usize = 1024;

/// Reason a policy file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyFormatError {
    #[error("Invalid IO-class file format ({source_name}): {reason}")]
    Header { source_name: String, reason: String },

    #[error("Invalid IO-class file format ({source_name}): line {line} {reason}")]
    MalformedRow {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid IO-class id({id}) found in {source_name}")]
    InvalidId { source_name: String, id: String },

    #[error("Duplicate IO-class id({id}) found in {source_name}")]
    DuplicateId { source_name: String, id: u8 },

    #[error("Too long IO-class name({name}) found in {source_name}")]
    NameTooLong { source_name: String, name: String },

    #[error("Invalid character({ch:?}) in IO-class name({name}) found in {source_name}")]
    InvalidNameChar {
        source_name: String,
        name: String,
        ch: char,
    },

    #[error("Invalid IO-class priority({value}) found in {source_name}")]
    InvalidPriority { source_name: String, value: String },

    #[error("Invalid IO-class allocation({value}) found in {source_name}")]
    InvalidAllocation { source_name: String, value: String },

    #[error("{source_name} io class file wasn't found ({message})")]
    Unreadable {
        source_name: String,
        message: String,
    },
}

/// One classification entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoClassRule {
    pub id: u8,
    pub name: String,
    pub eviction_priority: u8,
    pub allocation: bool,
}

/// A validated, ordered set of classification rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoClassPolicy {
    name: String,
    rules: Vec<IoClassRule>,
}

impl IoClassPolicy {
    /// Validate raw file content. `name` identifies the policy in error messages.
    pub fn parse(name: &str, content: &str) -> Result<Self, PolicyFormatError> {
        let rules = parse_rules(name, content)?;
        debug!(policy = name, rules = rules.len(), "validated io class policy");
        Ok(Self {
            name: name.to_string(),
            rules,
        })
    }

    /// Read and validate a policy file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyFormatError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let content = std::fs::read_to_string(path).map_err(|e| PolicyFormatError::Unreadable {
            source_name: name.clone(),
            message: e.to_string(),
        })?;

        Self::parse(&name, &content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[IoClassRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: u8) -> Option<&IoClassRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// Location of a named policy inside the policy directory.
pub fn policy_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
}

fn parse_rules(source: &str, content: &str) -> Result<Vec<IoClassRule>, PolicyFormatError> {
    let header_err = |reason: String| PolicyFormatError::Header {
        source_name: source.to_string(),
        reason,
    };

    let mut lines = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.strip_suffix('\r').unwrap_or(line)))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| header_err("missing header".to_string()))?;
    let header = split_record(header).map_err(|reason| PolicyFormatError::MalformedRow {
        source_name: source.to_string(),
        line: header_line,
        reason,
    })?;

    let column = |field: &str| header.iter().position(|h| h == field);
    let mut seen = HashSet::new();
    for field in &header {
        if !REQUIRED_FIELDS.contains(&field.as_str()) {
            return Err(header_err(format!("unexpected field '{}'", field)));
        }
        if !seen.insert(field.as_str()) {
            return Err(header_err(format!("duplicate field '{}'", field)));
        }
    }
    let (Some(id_col), Some(name_col), Some(prio_col), Some(alloc_col)) = (
        column(FIELD_ID),
        column(FIELD_NAME),
        column(FIELD_EVICTION_PRIORITY),
        column(FIELD_ALLOCATION),
    ) else {
        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| column(f).is_none())
            .collect();
        return Err(header_err(format!("missing field(s) {}", missing.join(", "))));
    };

    let mut rules = Vec::new();
    let mut ids = HashSet::new();

    for (line_no, line) in lines {
        let row = split_record(line).map_err(|reason| PolicyFormatError::MalformedRow {
            source_name: source.to_string(),
            line: line_no,
            reason,
        })?;
        if row.len() > header.len() {
            return Err(PolicyFormatError::MalformedRow {
                source_name: source.to_string(),
                line: line_no,
                reason: format!(
                    "has {} fields, header declares {}",
                    row.len(),
                    header.len()
                ),
            });
        }
        let field = |col: usize| row.get(col).map(String::as_str);

        let raw_id = field(id_col).unwrap_or_default();
        let id = parse_bounded(field(id_col), MAX_IOCLASS_ID).ok_or_else(|| {
            PolicyFormatError::InvalidId {
                source_name: source.to_string(),
                id: raw_id.to_string(),
            }
        })?;
        if !ids.insert(id) {
            return Err(PolicyFormatError::DuplicateId {
                source_name: source.to_string(),
                id,
            });
        }

        let name = field(name_col)
            .ok_or_else(|| PolicyFormatError::MalformedRow {
                source_name: source.to_string(),
                line: line_no,
                reason: format!("missing '{}'", FIELD_NAME),
            })?
            .to_string();
        validate_name(source, &name)?;

        let eviction_priority = parse_bounded(field(prio_col), u8::MAX).ok_or_else(|| {
            PolicyFormatError::InvalidPriority {
                source_name: source.to_string(),
                value: field(prio_col).unwrap_or_default().to_string(),
            }
        })?;

        let allocation = match parse_bounded(field(alloc_col), 1) {
            Some(v) => v == 1,
            None => {
                return Err(PolicyFormatError::InvalidAllocation {
                    source_name: source.to_string(),
                    value: field(alloc_col).unwrap_or_default().to_string(),
                })
            }
        };

        rules.push(IoClassRule {
            id,
            name,
            eviction_priority,
            allocation,
        });
    }

    Ok(rules)
}

fn parse_bounded(value: Option<&str>, max: u8) -> Option<u8> {
    let n: i64 = value?.trim().parse().ok()?;
    if (0..=i64::from(max)).contains(&n) {
        u8::try_from(n).ok()
    } else {
        None
    }
}

fn validate_name(source: &str, name: &str) -> Result<(), PolicyFormatError> {
    if name.chars().count() >= MAX_NAME_LEN {
        return Err(PolicyFormatError::NameTooLong {
            source_name: source.to_string(),
            name: name.to_string(),
        });
    }
    if let Some(ch) = name
        .chars()
        .find(|&c| c == ',' || c == '"' || !(' '..='~').contains(&c))
    {
        return Err(PolicyFormatError::InvalidNameChar {
            source_name: source.to_string(),
            name: name.to_string(),
            ch,
        });
    }
    Ok(())
}

/// Split one CSV record. Double-quoted fields may contain commas and `""` escapes.
fn split_record(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                '"' => in_quotes = false,
                _ => current.push(c),
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut current)),
                '"' if current.is_empty() => in_quotes = true,
                _ => current.push(c),
            }
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(current);
    Ok(fields)
}
