use anyhow::{bail, ensure, Context, Result};
use polars::prelude::{AnyValue, DataFrame, Series};

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use crate::{Config, Label, Number};

/// Where a frame's value columns go when it is pivoted into a [`Table`].
#[derive(Clone, Copy, Debug)]
pub enum Values<'a> {
    /// A single value column, whose name is not kept.
    Single(&'a str),
    /// Several value columns, stacked into an extra level called `level`
    /// whose labels are the column names.
    Stacked { columns: &'a [String], level: &'a str },
}

impl Values<'_> {
    fn columns(&self) -> Vec<&str> {
        match self {
            Self::Single(column) => vec![*column],
            Self::Stacked { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }
}

/// An aggregated table: rows keyed by a multi-level label tuple, one column
/// per label of the pivoted dimension.
///
/// Every row has a cell for every column. Rows are kept sorted by key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    index: Vec<String>,
    column_name: String,
    columns: Vec<Label>,
    rows: BTreeMap<Vec<Label>, Vec<Number>>,
}

impl Table {
    /// Pivots `frame` so that the labels of level `on` become columns.
    ///
    /// The levels are the `keys` columns, plus the stacked level if `values`
    /// is [`Values::Stacked`]. Rows are keyed by every level but `on`.
    /// Missing cells are skipped, and combinations with no entry are filled
    /// with zero (a float zero if any value is a float).
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * `on` is not a level, or is the only level
    /// * A key or value column is missing or has an unsupported type
    /// * Two rows of `frame` share every level
    pub fn pivot(frame: &DataFrame, keys: &[&str], values: Values<'_>, on: &str) -> Result<Self> {
        let mut levels: Vec<&str> = keys.to_vec();
        if let Values::Stacked { level, .. } = values {
            levels.push(level);
        }
        let pos = levels
            .iter()
            .position(|level| *level == on)
            .with_context(|| format!("no level named {on:?} in {levels:?}"))?;
        ensure!(levels.len() > 1, "cannot pivot {on:?}, the only level");

        let key_cells = keys
            .iter()
            .map(|key| labels(column(frame, key)?))
            .collect::<Result<Vec<_>>>()?;
        let value_cells = values
            .columns()
            .into_iter()
            .map(|name| Ok((Label::from(name), numbers(column(frame, name)?)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut columns = BTreeSet::new();
        let mut cells: BTreeMap<Vec<Label>, BTreeMap<Label, Number>> = BTreeMap::new();
        let mut any_float = false;
        for row in 0..frame.height() {
            let Some(base) = key_cells
                .iter()
                .map(|cells| cells[row].clone())
                .collect::<Option<Vec<Label>>>()
            else {
                continue;
            };
            for (name, numbers) in &value_cells {
                let Some(value) = numbers[row] else {
                    continue;
                };
                let mut key = base.clone();
                if matches!(values, Values::Stacked { .. }) {
                    key.push(name.clone());
                }
                let column = key.remove(pos);
                any_float |= value.is_float();
                columns.insert(column.clone());
                if cells.entry(key).or_default().insert(column, value).is_some() {
                    bail!("more than one value for a single cell pivoting {on:?}");
                }
            }
        }

        let zero = if any_float {
            Number::Float(0.0)
        } else {
            Number::Int(0)
        };
        let columns: Vec<Label> = columns.into_iter().collect();
        let rows = cells
            .into_iter()
            .map(|(key, row)| {
                let row = columns
                    .iter()
                    .map(|c| row.get(c).copied().unwrap_or(zero))
                    .collect();
                (key, row)
            })
            .collect();
        levels.remove(pos);
        Ok(Self {
            index: levels.into_iter().map(ToString::to_string).collect(),
            column_name: on.to_string(),
            columns,
            rows,
        })
    }

    /// Names of the row index levels.
    #[must_use]
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Name of the dimension the columns were pivoted from.
    #[must_use]
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    #[must_use]
    pub fn columns(&self) -> &[Label] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[Label], &[Number])> {
        self.rows.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    #[must_use]
    pub fn get(&self, row: &[Label], column: &Label) -> Option<Number> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).map(|cells| cells[col])
    }

    /// Distinct labels of index level `level`, in row order.
    #[must_use]
    pub fn level_values(&self, level: usize) -> Vec<&Label> {
        let mut values: Vec<&Label> = Vec::new();
        for key in self.rows.keys() {
            if let Some(label) = key.get(level) {
                if !values.contains(&label) {
                    values.push(label);
                }
            }
        }
        values
    }

    /// Every cell value, row by row.
    pub fn cells(&self) -> impl Iterator<Item = Number> + '_ {
        self.rows.values().flatten().copied()
    }

    /// Replaces country codes with full names in every row label.
    ///
    /// Column labels are left alone.
    pub fn rename_labels(&mut self, config: &Config) {
        self.rows = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|(key, cells)| (key.into_iter().map(|l| config.rename(l)).collect(), cells))
            .collect();
    }
}

fn column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Series> {
    frame
        .column(name)
        .with_context(|| format!("no column named {name:?}"))
}

fn labels(series: &Series) -> Result<Vec<Option<Label>>> {
    (0..series.len())
        .map(|i| {
            let label = match series.get(i)? {
                AnyValue::Null => None,
                AnyValue::String(s) => Some(Label::from(s)),
                AnyValue::StringOwned(s) => Some(Label::from(s.as_str())),
                AnyValue::Int64(n) => Some(Label::Int(n)),
                AnyValue::Int32(n) => Some(Label::Int(n.into())),
                other => bail!("{}: unsupported label {other}", series.name()),
            };
            Ok(label)
        })
        .collect()
}

fn numbers(series: &Series) -> Result<Vec<Option<Number>>> {
    (0..series.len())
        .map(|i| {
            let number = match series.get(i)? {
                AnyValue::Null => None,
                AnyValue::Int64(n) => Some(Number::Int(n)),
                AnyValue::Int32(n) => Some(Number::Int(n.into())),
                AnyValue::UInt32(n) => Some(Number::Int(n.into())),
                AnyValue::Float64(x) => Some(Number::Float(x)),
                AnyValue::Float32(x) => Some(Number::Float(x.into())),
                other => bail!("{}: unsupported value {other}", series.name()),
            };
            Ok(number)
        })
        .collect()
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let head = format!("{} \\ {}", self.index.join(" / "), self.column_name);
        let labels: Vec<String> = self
            .rows
            .keys()
            .map(|key| {
                key.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" / ")
            })
            .collect();
        let width = labels
            .iter()
            .map(String::len)
            .chain([head.len()])
            .max()
            .unwrap_or_default();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(col, label)| {
                self.rows
                    .values()
                    .map(|cells| cells[col].to_string().len())
                    .chain([label.to_string().len()])
                    .max()
                    .unwrap_or_default()
            })
            .collect();

        write!(f, "{head:width$}")?;
        for (label, &w) in self.columns.iter().zip(&widths) {
            write!(f, " {:>w$}", label.to_string())?;
        }
        writeln!(f)?;
        let length = width + widths.iter().map(|w| w + 1).sum::<usize>();
        writeln!(f, "{:-<length$}", "")?;
        for (label, cells) in labels.iter().zip(self.rows.values()) {
            write!(f, "{label:width$}")?;
            for (n, &w) in cells.iter().zip(&widths) {
                write!(f, " {:>w$}", n.to_string())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn key(labels: &[&str]) -> Vec<Label> {
        labels.iter().copied().map(Label::from).collect()
    }

    fn sample() -> DataFrame {
        df!(
            "Country" => ["KE", "KE", "KE", "UK", "TZ"],
            "Scenario" => ["Base", "Base", "Green", "Base", "Base"],
            "Year" => [2020_i64, 2021, 2020, 2021, 2020],
            "Value" => [5_i64, 0, 2, 7, 1],
        )
        .unwrap()
    }

    fn by_year() -> Table {
        Table::pivot(
            &sample(),
            &["Country", "Scenario", "Year"],
            Values::Single("Value"),
            "Year",
        )
        .unwrap()
    }

    #[test]
    fn pivot_fn_moves_a_level_into_columns_filling_zeros() {
        let table = by_year();
        assert_eq!(table.index(), ["Country", "Scenario"]);
        assert_eq!(table.column_name(), "Year");
        assert_eq!(table.columns(), [Label::Int(2020), Label::Int(2021)]);
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.get(&key(&["KE", "Green"]), &Label::Int(2021)),
            Some(Number::Int(0))
        );
        assert_eq!(
            table.get(&key(&["UK", "Base"]), &Label::Int(2021)),
            Some(Number::Int(7))
        );
        assert_eq!(
            table.level_values(0),
            [&Label::from("KE"), &Label::from("TZ"), &Label::from("UK")]
        );
    }

    #[test]
    fn pivot_fn_can_pivot_stacked_value_columns() {
        let frame = df!(
            "Country" => ["KE", "RW"],
            "Steel" => [5_i64, 0],
            "Cement" => [1.5, 2.0],
        )
        .unwrap();
        let materials = ["Steel".to_string(), "Cement".to_string()];
        let stacked = Values::Stacked {
            columns: &materials,
            level: "Mat",
        };

        let by_mat = Table::pivot(&frame, &["Country"], stacked, "Mat").unwrap();
        assert_eq!(by_mat.index(), ["Country"]);
        assert_eq!(by_mat.columns(), [Label::from("Cement"), Label::from("Steel")]);
        assert_eq!(
            by_mat.get(&key(&["KE"]), &Label::from("Steel")),
            Some(Number::Int(5))
        );

        let by_country = Table::pivot(&frame, &["Country"], stacked, "Country").unwrap();
        assert_eq!(by_country.index(), ["Mat"]);
        assert_eq!(
            by_country.get(&key(&["Cement"]), &Label::from("RW")),
            Some(Number::Float(2.0))
        );
    }

    #[test]
    fn pivot_fn_fills_float_zeros_for_float_data() {
        let frame = df!("a" => ["x", "y"], "b" => [1_i64, 2], "v" => [0.5, 1.5]).unwrap();
        let table = Table::pivot(&frame, &["a", "b"], Values::Single("v"), "b").unwrap();
        assert_eq!(
            table.get(&key(&["x"]), &Label::Int(2)),
            Some(Number::Float(0.0))
        );
        assert!(Table::pivot(&frame, &["a"], Values::Single("v"), "a").is_err());
        assert!(Table::pivot(&frame, &["a", "b"], Values::Single("v"), "c").is_err());
    }

    #[test]
    fn pivot_fn_skips_missing_cells() {
        let frame = df!(
            "a" => ["x", "y", "z"],
            "b" => [Some(1_i64), Some(1), None],
            "v" => [Some(3_i64), None, Some(4)],
        )
        .unwrap();
        let table = Table::pivot(&frame, &["a", "b"], Values::Single("v"), "b").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&key(&["x"]), &Label::Int(1)), Some(Number::Int(3)));
    }

    #[test]
    fn pivot_fn_rejects_repeated_cells() {
        let frame = df!("a" => ["x", "x"], "b" => [1_i64, 1], "v" => [1_i64, 2]).unwrap();
        assert!(Table::pivot(&frame, &["a", "b"], Values::Single("v"), "b").is_err());
    }

    #[test]
    fn rename_labels_fn_only_relabels() {
        let mut table = Table::pivot(
            &sample(),
            &["Country", "Year", "Scenario"],
            Values::Single("Value"),
            "Scenario",
        )
        .unwrap();
        let mut before: Vec<String> = table.cells().map(|n| n.to_string()).collect();
        table.rename_labels(&Config::default());
        let mut after: Vec<String> = table.cells().map(|n| n.to_string()).collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
        assert_eq!(
            table.level_values(0),
            [
                &Label::from("Kenya"),
                &Label::from("TZ"),
                &Label::from("United Kingdom")
            ]
        );
        assert_eq!(table.columns(), [Label::from("Base"), Label::from("Green")]);
    }

    #[test]
    fn display_lists_every_row() {
        let table = by_year();
        let text = table.to_string();
        assert!(text.starts_with("Country / Scenario \\ Year"), "{text}");
        assert!(text.contains("KE / Green"));
        assert_eq!(text.lines().count(), 2 + table.len());
    }
}
