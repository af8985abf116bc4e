//! Conversion of aggregated tables into nested maps for a template context.

use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};

use crate::{Label, Number, Table};

/// Leaf rows: row label to (column label to value).
pub type Rows = BTreeMap<Label, BTreeMap<Label, Number>>;

/// A table reshaped into nested maps, one map level per row index level.
///
/// The outer levels become [`Nested::Groups`] keyed by label; the last level
/// becomes [`Nested::Rows`]. Both serialize as plain maps.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Nested {
    Groups(BTreeMap<Label, Nested>),
    Rows(Rows),
}

impl Nested {
    /// Returns the entry under `label`, if this is a group level.
    #[must_use]
    pub fn group(&self, label: &Label) -> Option<&Nested> {
        match self {
            Self::Groups(groups) => groups.get(label),
            Self::Rows(_) => None,
        }
    }

    /// Returns the leaf rows, if this is the last level.
    #[must_use]
    pub fn rows(&self) -> Option<&Rows> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Groups(_) => None,
        }
    }
}

type RowRef<'a> = (&'a [Label], &'a [Number]);

impl Table {
    /// Converts the table into nested maps keyed by its index levels.
    ///
    /// With `drop_zeros`, each leaf drops its all-zero rows and then its
    /// all-zero columns (see [`drop_zeros`]).
    #[must_use]
    pub fn to_nested(&self, drop_zeros: bool) -> Nested {
        let rows: Vec<RowRef<'_>> = self.rows().collect();
        nest(&rows, self.columns(), drop_zeros)
    }
}

fn nest(rows: &[RowRef<'_>], columns: &[Label], drop_zeros: bool) -> Nested {
    if rows.first().is_some_and(|(key, _)| key.len() > 1) {
        let mut groups: BTreeMap<&Label, Vec<RowRef<'_>>> = BTreeMap::new();
        for &(key, cells) in rows {
            groups.entry(&key[0]).or_default().push((&key[1..], cells));
        }
        return Nested::Groups(
            groups
                .into_iter()
                .map(|(label, group)| (label.clone(), nest(&group, columns, drop_zeros)))
                .collect(),
        );
    }

    let mut leaf: Rows = rows
        .iter()
        .filter_map(|(key, cells)| {
            let row = columns.iter().cloned().zip(cells.iter().copied()).collect();
            key.first().map(|label| (label.clone(), row))
        })
        .collect();
    if drop_zeros {
        self::drop_zeros(&mut leaf);
    }
    Nested::Rows(leaf)
}

/// Removes the rows whose values are all zero, then the columns whose
/// values are zero in every remaining row.
///
/// Applying it a second time changes nothing.
pub fn drop_zeros(rows: &mut Rows) {
    rows.retain(|_, cells| cells.values().any(|n| !n.is_zero()));
    let zero_columns: BTreeSet<Label> = rows
        .values()
        .flat_map(BTreeMap::keys)
        .filter(|col| {
            rows.values()
                .all(|cells| cells.get(*col).map_or(true, |n| n.is_zero()))
        })
        .cloned()
        .collect();
    for cells in rows.values_mut() {
        cells.retain(|col, _| !zero_columns.contains(col));
    }
}
