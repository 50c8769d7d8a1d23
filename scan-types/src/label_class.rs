use crate::meta::ColumnData;
use anyhow::{bail, format_err, Error};
use serde::{Deserialize, Serialize};

/// Observations grouped by the value of a categorical column. Group `i` owns
/// `indices[offsets[i]..offsets[i + 1]]` (or up to the end for the last group).
/// Observations with a missing value belong to no group.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LabelClass {
    pub labels: Vec<String>,
    pub offsets: Vec<usize>,
    pub indices: Vec<usize>,
}

impl LabelClass {
    pub fn new(labels: Vec<String>, offsets: Vec<usize>, indices: Vec<usize>) -> Result<LabelClass, Error> {
        if labels.len() != offsets.len() {
            bail!("Label and offsets length unequal");
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) || offsets.last().map_or(false, |&o| o > indices.len()) {
            bail!("LabelClass offsets are not monotone");
        }
        Ok(LabelClass {
            labels,
            offsets,
            indices,
        })
    }

    /// Group the observations of a categorical or string column. Labels follow the category order
    /// for categoricals and sorted order for strings; labels with no observation are kept as empty groups
    /// only for categoricals, mirroring how the categories are declared.
    pub fn from_column(column: &ColumnData) -> Result<LabelClass, Error> {
        let (labels, codes): (Vec<String>, Vec<Option<usize>>) = match column {
            ColumnData::Categorical { codes, categories } => {
                let codes = codes
                    .iter()
                    .map(|&c| if c < 0 { None } else { Some(c as usize) })
                    .collect::<Vec<_>>();
                if let Some(&bad) = codes.iter().flatten().find(|&&c| c >= categories.len()) {
                    bail!("category code {} out of range for {} categories", bad, categories.len());
                }
                (categories.clone(), codes)
            }
            ColumnData::Strings(values) => {
                let labels = column.unique_values();
                let codes = values
                    .iter()
                    .map(|v| v.as_ref().and_then(|s| labels.binary_search(s).ok()))
                    .collect();
                (labels, codes)
            }
            other => bail!("column of type {} cannot be used for grouping", other.type_name()),
        };

        let mut buckets = vec![Vec::new(); labels.len()];
        for (obs, code) in codes.into_iter().enumerate() {
            if let Some(c) = code {
                buckets[c].push(obs);
            }
        }

        let mut offsets = Vec::with_capacity(labels.len());
        let mut indices = Vec::new();
        for bucket in buckets {
            offsets.push(indices.len());
            indices.extend(bucket);
        }
        LabelClass::new(labels, offsets, indices)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Index of a label string, or None.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|x| x == label)
    }

    /// Observations in group `idx`.
    pub fn group(&self, idx: usize) -> &[usize] {
        let start = self.offsets[idx];
        let end = self.offsets.get(idx + 1).copied().unwrap_or(self.indices.len());
        &self.indices[start..end]
    }

    /// Observations carrying `label`, or None if the label doesn't exist.
    pub fn get_indices(&self, label: &str) -> Option<&[usize]> {
        self.label_index(label).map(|idx| self.group(idx))
    }

    /// Drop groups with no observations.
    pub fn drop_empty(&mut self) {
        let mut labels = Vec::new();
        let mut offsets = Vec::new();
        for idx in 0..self.len() {
            if !self.group(idx).is_empty() {
                labels.push(self.labels[idx].clone());
                offsets.push(self.offsets[idx]);
            }
        }
        self.labels = labels;
        self.offsets = offsets;
    }

    /// Map each grouped observation to its group index; ungrouped observations map to None.
    pub fn assignments(&self, n_obs: usize) -> Result<Vec<Option<usize>>, Error> {
        let mut out = vec![None; n_obs];
        for idx in 0..self.len() {
            for &obs in self.group(idx) {
                let slot = out
                    .get_mut(obs)
                    .ok_or_else(|| format_err!("observation {} out of range for {} observations", obs, n_obs))?;
                *slot = Some(idx);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_categorical() {
        let col = ColumnData::Categorical {
            codes: vec![1, 0, -1, 1, 2],
            categories: vec!["a".into(), "b".into(), "c".into()],
        };
        let lc = LabelClass::from_column(&col).unwrap();
        assert_eq!(lc.labels, vec!["a", "b", "c"]);
        assert_eq!(lc.get_indices("a"), Some(&[1][..]));
        assert_eq!(lc.get_indices("b"), Some(&[0, 3][..]));
        assert_eq!(lc.get_indices("c"), Some(&[4][..]));
        assert_eq!(lc.get_indices("d"), None);
        assert_eq!(lc.assignments(5).unwrap(), vec![Some(1), Some(0), None, Some(1), Some(2)]);
    }

    #[test]
    fn test_from_strings_sorted() {
        let col = ColumnData::Strings(vec![Some("y".into()), None, Some("x".into()), Some("y".into())]);
        let lc = LabelClass::from_column(&col).unwrap();
        assert_eq!(lc.labels, vec!["x", "y"]);
        assert_eq!(lc.group(0), &[2]);
        assert_eq!(lc.group(1), &[0, 3]);
    }

    #[test]
    fn test_drop_empty() {
        let col = ColumnData::Categorical {
            codes: vec![0, 2, 2],
            categories: vec!["a".into(), "b".into(), "c".into()],
        };
        let mut lc = LabelClass::from_column(&col).unwrap();
        lc.drop_empty();
        assert_eq!(lc.labels, vec!["a", "c"]);
        assert_eq!(lc.group(1), &[1, 2]);
    }

    #[test]
    fn test_numeric_not_groupable() {
        assert!(LabelClass::from_column(&ColumnData::Numeric(vec![1.0])).is_err());
        assert!(LabelClass::new(vec!["a".into()], vec![], vec![]).is_err());
    }
}
