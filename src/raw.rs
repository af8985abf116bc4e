use anyhow::{ensure, Context, Result};
use polars::prelude::*;
use tracing::{debug, warn};

use std::path::Path;

/// Cell text read as missing, besides an empty cell.
pub const NULL_VALUES: [&str; 18] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// How records sharing a group key are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Agg {
    Sum,
    /// Keep the first present value. Later records in the group are
    /// discarded.
    First,
}

/// The records of one CSV file, as read.
///
/// The first column of the file is its row index and is not kept.
#[derive(Debug)]
pub struct RawTable {
    source: String,
    frame: DataFrame,
}

impl RawTable {
    /// Reads the CSV file at `path`.
    ///
    /// Column types are inferred from the whole file. Empty cells and the
    /// [`NULL_VALUES`] markers are read as missing.
    ///
    /// # Errors
    ///
    /// Returns any errors from opening or parsing the file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.is_file(), "{} not found", path.display());
        let source = path.display().to_string();
        let null_values = NULL_VALUES.iter().map(|s| (*s).into()).collect();
        let mut frame = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(None)
            .with_null_values(Some(NullValues::AllColumns(null_values)))
            .finish()
            .and_then(LazyFrame::collect)
            .with_context(|| format!("reading {source}"))?;
        let index = frame
            .get_column_names()
            .first()
            .map(|name| name.to_string());
        if let Some(index) = index {
            frame = frame.drop(&index)?;
        }
        debug!(
            %source,
            rows = frame.height(),
            columns = frame.width(),
            "read table"
        );
        Ok(Self { source, frame })
    }

    /// Replaces every missing numeric cell with zero.
    ///
    /// A column with no values at all is taken to be numeric.
    ///
    /// # Errors
    ///
    /// Returns any error from rewriting the columns.
    pub fn fill_missing(mut self) -> Result<Self> {
        let fills: Vec<Expr> = self
            .frame
            .get_columns()
            .iter()
            .filter_map(|column| {
                if column.dtype().is_numeric() {
                    Some(col(column.name()).fill_null(lit(0)))
                } else if !column.is_empty() && column.null_count() == column.len() {
                    Some(
                        col(column.name())
                            .cast(DataType::Float64)
                            .fill_null(lit(0.0)),
                    )
                } else {
                    None
                }
            })
            .collect();
        self.frame = std::mem::take(&mut self.frame)
            .lazy()
            .with_columns(fills)
            .collect()
            .with_context(|| format!("{}: filling missing values", self.source))?;
        Ok(self)
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn headers(&self) -> Vec<&str> {
        self.frame.get_column_names()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_names().contains(&name)
    }

    /// # Errors
    ///
    /// Returns an error if there is no column called `name`.
    pub fn dtype(&self, name: &str) -> Result<&DataType> {
        self.column(name).map(|s| s.dtype())
    }

    fn column(&self, name: &str) -> Result<&Series> {
        self.frame
            .column(name)
            .with_context(|| format!("{}: no column named {name:?}", self.source))
    }

    /// Removes the named columns.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the columns does not exist.
    pub fn drop_columns(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.column(name)?;
            self.frame = self.frame.drop(name)?;
        }
        Ok(())
    }

    /// Renames columns by `(from, to)` pairs. Names not present are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a new name is already taken.
    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) -> Result<()> {
        for (from, to) in renames {
            if self.has_column(from) {
                self.frame
                    .rename(from, to)
                    .with_context(|| format!("{}: renaming {from:?}", self.source))?;
            }
        }
        Ok(())
    }

    /// Keeps only the rows for which `predicate` is true.
    ///
    /// # Errors
    ///
    /// Returns an error if `predicate` refers to a missing column.
    pub fn retain(&mut self, predicate: Expr) -> Result<()> {
        let before = self.frame.height();
        self.frame = std::mem::take(&mut self.frame)
            .lazy()
            .filter(predicate)
            .collect()
            .with_context(|| format!("{}: filtering rows", self.source))?;
        debug!(
            source = %self.source,
            dropped = before - self.frame.height(),
            "filtered rows"
        );
        Ok(())
    }

    /// Names of the numeric columns that are not among `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the `keys` columns does not exist.
    pub fn value_columns(&self, keys: &[&str]) -> Result<Vec<String>> {
        for key in keys {
            self.column(key)?;
        }
        let names = self
            .frame
            .get_columns()
            .iter()
            .filter(|column| !keys.contains(&column.name()) && column.dtype().is_numeric())
            .map(|column| column.name().to_string())
            .collect();
        Ok(names)
    }

    /// Groups the records by the `keys` columns and combines every numeric
    /// column with `agg`.
    ///
    /// The result has one row per distinct key, with the `keys` columns
    /// followed by the value columns. Records with a missing key cell are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the `keys` columns does not exist.
    pub fn group(&self, keys: &[&str], agg: Agg) -> Result<DataFrame> {
        let values = self.value_columns(keys)?;
        let complete = keys
            .iter()
            .map(|key| col(key).is_not_null())
            .reduce(|all, present| all.and(present))
            .unwrap_or_else(|| lit(true));
        let kept = self.frame.clone().lazy().filter(complete).collect()?;

        let aggs: Vec<Expr> = values
            .iter()
            .map(|value| match agg {
                Agg::Sum => col(value).sum(),
                Agg::First => col(value).drop_nulls().first(),
            })
            .collect();
        let grouped = kept
            .clone()
            .lazy()
            .group_by(keys.iter().copied().map(col).collect::<Vec<_>>())
            .agg(aggs)
            .collect()
            .with_context(|| format!("{}: grouping by {keys:?}", self.source))?;

        let skipped = self.frame.height() - kept.height();
        if skipped > 0 {
            debug!(source = %self.source, skipped, "skipped records with a missing key");
        }
        let duplicates = kept.height() - grouped.height();
        if agg == Agg::First && duplicates > 0 {
            warn!(
                source = %self.source,
                keys = ?keys,
                discarded = duplicates,
                "records share a group key; kept only the first of each"
            );
        }
        Ok(grouped)
    }
}
