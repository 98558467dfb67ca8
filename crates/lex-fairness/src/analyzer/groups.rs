//! Feature-value indexing and group resolution.

use crate::error::{BiasError, Result};
use crate::types::{FeatureValue, GroupSelector, GroupSplit};
use std::collections::HashMap;

/// Maps each observed value of one column to the rows holding it.
///
/// Built in a single pass. Values keep their first-seen order so group B in
/// one-vs-rest mode is assembled deterministically.
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    column: String,
    positions: HashMap<FeatureValue, usize>,
    groups: Vec<(FeatureValue, Vec<usize>)>,
}

impl FeatureIndex {
    pub fn build(column: impl Into<String>, values: &[FeatureValue]) -> Self {
        let mut positions: HashMap<FeatureValue, usize> = HashMap::new();
        let mut groups: Vec<(FeatureValue, Vec<usize>)> = Vec::new();

        for (row, value) in values.iter().enumerate() {
            match positions.get(value) {
                Some(&pos) => groups[pos].1.push(row),
                None => {
                    positions.insert(value.clone(), groups.len());
                    groups.push((value.clone(), vec![row]));
                }
            }
        }

        Self {
            column: column.into(),
            positions,
            groups,
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn contains(&self, value: &FeatureValue) -> bool {
        self.positions.contains_key(value)
    }

    /// Distinct values in first-seen order.
    pub fn values(&self) -> impl Iterator<Item = &FeatureValue> {
        self.groups.iter().map(|(value, _)| value)
    }

    /// Rows holding `value`; empty if the value was never observed.
    pub fn rows(&self, value: &FeatureValue) -> &[usize] {
        self.positions
            .get(value)
            .map(|&pos| self.groups[pos].1.as_slice())
            .unwrap_or(&[])
    }

    /// Fail with [`BiasError::UnknownFeatureValue`] on the first value the
    /// column never holds.
    pub fn ensure_known<'a>(&self, values: impl IntoIterator<Item = &'a FeatureValue>) -> Result<()> {
        for value in values {
            if !self.contains(value) {
                return Err(BiasError::UnknownFeatureValue {
                    column: self.column.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the two comparison groups for `selector`.
    ///
    /// Every referenced value is checked before any group is assembled.
    pub fn split(&self, selector: &GroupSelector) -> Result<GroupSplit> {
        self.ensure_known(selector.referenced_values())?;

        let split = match selector {
            GroupSelector::SingleValue(value) => GroupSplit {
                group_a: self.rows(value).to_vec(),
                group_b: self
                    .groups
                    .iter()
                    .filter(|(other, _)| other != value)
                    .flat_map(|(_, rows)| rows.iter().copied())
                    .collect(),
            },
            GroupSelector::TwoGroups(values_a, values_b) => GroupSplit {
                group_a: self.union(values_a),
                group_b: self.union(values_b),
            },
        };

        Ok(split)
    }

    /// Concatenated rows of each value, duplicates kept.
    fn union(&self, values: &[FeatureValue]) -> Vec<usize> {
        values
            .iter()
            .flat_map(|value| self.rows(value).iter().copied())
            .collect()
    }
}
