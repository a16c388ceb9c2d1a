//! Single-clause field selector: `dot.path=value`, string equality only.

use gather_core::path::nested_str;
use gather_core::{GatherError, GatherResult, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub path: Vec<String>,
    pub value: String,
}

impl FieldSelector {
    /// Split on the first `=`. Anything after it, including further `=`, is the value.
    pub fn parse(raw: &str) -> GatherResult<Self> {
        let (field, value) = raw.split_once('=').ok_or_else(|| GatherError::InvalidFieldSelector(raw.to_string()))?;
        Ok(Self { path: field.split('.').map(|s| s.to_string()).collect(), value: value.to_string() })
    }

    /// True when the path resolves to a string leaf equal to the value.
    pub fn matches(&self, record: &Record) -> bool {
        nested_str(&record.body, &self.path) == Some(self.value.as_str())
    }
}
