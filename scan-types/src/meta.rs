use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Values of one metadata column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    /// Category codes into `categories`; `-1` marks a missing value.
    Categorical { codes: Vec<i32>, categories: Vec<String> },
    /// Free text; `None` marks a missing value.
    Strings(Vec<Option<String>>),
    /// `NaN` marks a missing value.
    Numeric(Vec<f64>),
    Boolean(Vec<bool>),
    Integer(Vec<i64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Categorical { codes, .. } => codes.len(),
            ColumnData::Strings(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Categorical { .. } => "categorical",
            ColumnData::Strings(_) => "string",
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Boolean(_) => "boolean",
            ColumnData::Integer(_) => "integer",
        }
    }

    /// True for columns whose values can partition observations into groups.
    pub fn is_groupable(&self) -> bool {
        matches!(self, ColumnData::Categorical { .. } | ColumnData::Strings(_))
    }

    /// Whether row `i` holds a missing value.
    pub fn is_missing(&self, i: usize) -> bool {
        match self {
            ColumnData::Categorical { codes, .. } => codes[i] < 0,
            ColumnData::Strings(v) => v[i].is_none(),
            ColumnData::Numeric(v) => v[i].is_nan(),
            ColumnData::Boolean(_) | ColumnData::Integer(_) => false,
        }
    }

    /// Non-missing distinct values. Categoricals list their categories that occur, in category
    /// order; everything else is sorted.
    pub fn unique_values(&self) -> Vec<String> {
        match self {
            ColumnData::Categorical { codes, categories } => {
                let used = codes.iter().filter(|&&c| c >= 0).map(|&c| c as usize).collect::<BTreeSet<_>>();
                categories
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| used.contains(i))
                    .map(|(_, c)| c.clone())
                    .collect()
            }
            ColumnData::Strings(v) => v.iter().flatten().cloned().collect::<BTreeSet<_>>().into_iter().collect(),
            other => (0..other.len())
                .filter(|&i| !other.is_missing(i))
                .map(|i| other.value_string(i))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// Row `i` rendered for display; missing values render as `NaN`.
    pub fn value_string(&self, i: usize) -> String {
        match self {
            ColumnData::Categorical { codes, categories } => match codes[i] {
                c if c < 0 => "NaN".to_string(),
                c => categories.get(c as usize).cloned().unwrap_or_else(|| "NaN".to_string()),
            },
            ColumnData::Strings(v) => v[i].clone().unwrap_or_else(|| "NaN".to_string()),
            ColumnData::Numeric(v) => format!("{}", v[i]),
            ColumnData::Boolean(v) => format!("{}", v[i]),
            ColumnData::Integer(v) => format!("{}", v[i]),
        }
    }

    /// Keep only the rows in `idx`, in that order.
    pub fn select(&self, idx: &[usize]) -> ColumnData {
        fn pick<T: Clone>(v: &[T], idx: &[usize]) -> Vec<T> {
            idx.iter().map(|&i| v[i].clone()).collect()
        }
        match self {
            ColumnData::Categorical { codes, categories } => ColumnData::Categorical {
                codes: pick(codes, idx),
                categories: categories.clone(),
            },
            ColumnData::Strings(v) => ColumnData::Strings(pick(v, idx)),
            ColumnData::Numeric(v) => ColumnData::Numeric(pick(v, idx)),
            ColumnData::Boolean(v) => ColumnData::Boolean(pick(v, idx)),
            ColumnData::Integer(v) => ColumnData::Integer(pick(v, idx)),
        }
    }

    /// Build a categorical column from per-row labels, with categories in the given order.
    pub fn categorical_from_labels(labels: &[String], categories: Vec<String>) -> Result<ColumnData, Error> {
        let codes = labels
            .iter()
            .map(|l| match categories.iter().position(|c| c == l) {
                Some(p) => Ok(p as i32),
                None => Err(anyhow::format_err!("label {} is not a declared category", l)),
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(ColumnData::Categorical { codes, categories })
    }
}

/// A table of named, equal-length columns with a string row index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaTable {
    pub index: Vec<String>,
    columns: Vec<(String, ColumnData)>,
}

impl MetaTable {
    /// Empty table with the given row names.
    pub fn new(index: Vec<String>) -> MetaTable {
        MetaTable {
            index,
            columns: Vec::new(),
        }
    }

    /// Table with row names `0, 1, ...`
    pub fn with_default_index(n: usize) -> MetaTable {
        MetaTable::new((0..n).map(|i| i.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnData)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn get(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace a column, keeping the position of a replaced column.
    pub fn insert(&mut self, name: impl Into<String>, data: ColumnData) -> Result<(), Error> {
        let name = name.into();
        if data.len() != self.len() {
            bail!(
                "column {} has {} values but the table has {} rows",
                name,
                data.len(),
                self.len()
            );
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = data,
            None => self.columns.push((name, data)),
        }
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<ColumnData> {
        let pos = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(pos).1)
    }

    /// Names of the columns usable as a grouping key, in column order.
    pub fn groupable_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, c)| c.is_groupable())
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Keep only the rows in `idx`, in that order.
    pub fn select(&self, idx: &[usize]) -> MetaTable {
        MetaTable {
            index: idx.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self.columns.iter().map(|(n, c)| (n.clone(), c.select(idx))).collect(),
        }
    }

    /// First `n` rows rendered as strings, one map of column name to value per row.
    pub fn head(&self, n: usize) -> Vec<Vec<(String, String)>> {
        (0..n.min(self.len()))
            .map(|i| {
                self.columns
                    .iter()
                    .map(|(name, col)| (name.clone(), col.value_string(i)))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn table() -> MetaTable {
        let mut t = MetaTable::new(vec!["c0".into(), "c1".into(), "c2".into()]);
        t.insert(
            "cell_type",
            ColumnData::Categorical {
                codes: vec![1, -1, 0],
                categories: vec!["B".into(), "T".into(), "NK".into()],
            },
        )
        .unwrap();
        t.insert("n_counts", ColumnData::Numeric(vec![1.0, 2.0, f64::NAN])).unwrap();
        t.insert("batch", ColumnData::Strings(vec![Some("b2".into()), Some("b1".into()), None]))
            .unwrap();
        t
    }

    #[test]
    fn test_groupable() {
        let t = table();
        assert_eq!(t.groupable_columns(), vec!["cell_type", "batch"]);
        assert!(!t.get("n_counts").unwrap().is_groupable());
    }

    #[test]
    fn test_unique_values() {
        let t = table();
        assert_eq!(t.get("cell_type").unwrap().unique_values(), vec!["B", "T"]);
        assert_eq!(t.get("batch").unwrap().unique_values(), vec!["b1", "b2"]);
        assert_eq!(t.get("n_counts").unwrap().unique_values(), vec!["1", "2"]);
    }

    #[test]
    fn test_insert_checks_length() {
        let mut t = table();
        assert!(t.insert("bad", ColumnData::Boolean(vec![true])).is_err());
        t.insert("n_counts", ColumnData::Integer(vec![1, 2, 3])).unwrap();
        assert_eq!(t.column_names(), vec!["cell_type", "n_counts", "batch"]);
    }

    #[test]
    fn test_select_and_head() {
        let t = table().select(&[2, 0]);
        assert_eq!(t.index, vec!["c2", "c0"]);
        let head = t.head(5);
        assert_eq!(head.len(), 2);
        assert_eq!(head[0][0], ("cell_type".to_string(), "B".to_string()));
        assert_eq!(head[1][2], ("batch".to_string(), "b2".to_string()));
        assert_eq!(head[0][2].1, "NaN");
    }
}
