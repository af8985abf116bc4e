//! Aggregation of the raw data files into the seven report tables.

use anyhow::{bail, ensure, Context, Result};
use polars::prelude::*;
use tracing::debug;

use std::path::Path;

use crate::{raw::Agg, table::Values, Config, Nested, RawTable, Table};

const COUNTRY: &str = "Country";
const SCENARIO: &str = "Scenario";
const YEAR: &str = "Year";
const TECH: &str = "Tech";
const MAT: &str = "Mat";
const INDICATOR: &str = "Indicator";
const PARAMETER: &str = "parameter";
const VALUE: &str = "Value";

/// The seven aggregated tables a report is rendered from.
///
/// Country-indexed rows carry full country names (see
/// [`Table::rename_labels`]).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregates {
    /// Country / Scenario / Mat by Year.
    pub emissions_year: Table,
    /// Country / Scenario / Mat by Tech.
    pub emissions_tech: Table,
    /// Country / Scenario by Mat, summed over all years and technologies.
    pub emissions_mat: Table,
    /// Country / Scenario / Tech by Year.
    pub jobs_year: Table,
    /// Country / Scenario / Tech / Indicator by Year.
    pub jobs_year_full: Table,
    /// Country / Scenario / Indicator by Tech.
    pub jobs_tech: Table,
    /// Country / Scenario by Indicator.
    pub jobs_ind: Table,
}

impl Aggregates {
    pub const NAMES: [&'static str; 7] = [
        "emissions_year",
        "emissions_tech",
        "emissions_mat",
        "jobs_year",
        "jobs_year_full",
        "jobs_tech",
        "jobs_ind",
    ];

    /// Returns every table with its name, in [`Self::NAMES`] order.
    #[must_use]
    pub fn tables(&self) -> [(&'static str, &Table); 7] {
        [
            (Self::NAMES[0], &self.emissions_year),
            (Self::NAMES[1], &self.emissions_tech),
            (Self::NAMES[2], &self.emissions_mat),
            (Self::NAMES[3], &self.jobs_year),
            (Self::NAMES[4], &self.jobs_year_full),
            (Self::NAMES[5], &self.jobs_tech),
            (Self::NAMES[6], &self.jobs_ind),
        ]
    }

    /// Replaces country codes with full names in every table.
    pub fn rename_labels(&mut self, config: &Config) {
        for table in [
            &mut self.emissions_year,
            &mut self.emissions_tech,
            &mut self.emissions_mat,
            &mut self.jobs_year,
            &mut self.jobs_year_full,
            &mut self.jobs_tech,
            &mut self.jobs_ind,
        ] {
            table.rename_labels(config);
        }
    }

    /// Converts every table with [`Table::to_nested`].
    #[must_use]
    pub fn to_nested(&self, drop_zeros: bool) -> Vec<(&'static str, Nested)> {
        self.tables()
            .into_iter()
            .map(|(name, table)| (name, table.to_nested(drop_zeros)))
            .collect()
    }
}

/// Reads the data files in `dir` and builds every report table.
///
/// # Errors
///
/// Returns errors if:
/// * A data file cannot be opened or parsed
/// * A column the aggregation needs is missing
/// * A configured country has no data
/// * The jobs data does not have exactly one value column
pub fn load_aggregates(dir: impl AsRef<Path>, config: &Config) -> Result<Aggregates> {
    let dir = dir.as_ref();
    let read = |name: &str| -> Result<RawTable> {
        RawTable::from_path(dir.join(config.filename(name)?))
            .with_context(|| format!("loading {name} data"))
    };

    let emissions_year = emissions_by_year(&read("emissions_year")?.fill_missing()?, config)
        .context("aggregating emissions_year")?;
    let (emissions_tech, emissions_mat) =
        emissions_by_tech_and_mat(read("emissions_mat")?.fill_missing()?, config)
            .context("aggregating emissions_tech and emissions_mat")?;
    let jobs = jobs(read("jobs")?, config).context("aggregating jobs")?;

    let mut aggregates = Aggregates {
        emissions_year,
        emissions_tech,
        emissions_mat,
        jobs_year: jobs.year,
        jobs_year_full: jobs.year_full,
        jobs_tech: jobs.tech,
        jobs_ind: jobs.ind,
    };
    aggregates.rename_labels(config);
    for (name, table) in aggregates.tables() {
        debug!(
            table = name,
            rows = table.len(),
            columns = table.columns().len(),
            "aggregated"
        );
    }
    Ok(aggregates)
}

fn emissions_by_year(raw: &RawTable, config: &Config) -> Result<Table> {
    let materials = raw.value_columns(&[COUNTRY, SCENARIO, YEAR])?;
    let summed = raw.group(&[COUNTRY, SCENARIO, YEAR], Agg::Sum)?;
    let summed = select_countries(summed, &config.country_codes())?;
    Table::pivot(
        &summed,
        &[COUNTRY, SCENARIO, YEAR],
        stacked(&materials),
        YEAR,
    )
}

fn emissions_by_tech_and_mat(mut raw: RawTable, config: &Config) -> Result<(Table, Table)> {
    raw.rename_columns(&[("tech", TECH)])?;
    let keys = [COUNTRY, SCENARIO, YEAR, TECH];
    let materials = raw.value_columns(&keys)?;
    let firsts = raw.group(&keys, Agg::First)?;
    let firsts = select_countries(firsts, &config.country_codes())?;

    let by_tech = Table::pivot(
        &sum_over(&firsts, &[COUNTRY, SCENARIO, TECH], &materials)?,
        &[COUNTRY, SCENARIO, TECH],
        stacked(&materials),
        TECH,
    )?;
    let by_mat = Table::pivot(
        &sum_over(&firsts, &[COUNTRY, SCENARIO], &materials)?,
        &[COUNTRY, SCENARIO],
        stacked(&materials),
        MAT,
    )?;
    Ok((by_tech, by_mat))
}

struct Jobs {
    year_full: Table,
    year: Table,
    tech: Table,
    ind: Table,
}

fn jobs(mut raw: RawTable, config: &Config) -> Result<Jobs> {
    // country names live in `Country`, codes in `country`
    if raw.has_column("country") {
        raw.drop_columns(&[COUNTRY, "ISO3"])?;
    } else {
        raw.drop_columns(&["ISO3"])?;
    }
    raw.rename_columns(&[("tech", TECH), ("scenario", SCENARIO), ("country", COUNTRY)])?;
    raw.retain(col(PARAMETER).eq(lit(config.jobs_parameter())))?;
    raw.drop_columns(&[PARAMETER])?;
    raw.retain(col(INDICATOR).neq(lit(config.excluded_indicator())))?;

    let keys = [COUNTRY, SCENARIO, YEAR, TECH, INDICATOR];
    let value_columns = raw.value_columns(&keys)?;
    let [value] = value_columns.as_slice() else {
        bail!(
            "{}: expected a single value column, found {value_columns:?}",
            raw.source()
        );
    };
    let firsts = raw
        .group(&keys, Agg::First)?
        .lazy()
        .filter(col(value).is_not_null())
        .select([cols(keys), col(value).alias(VALUE)])
        .collect()?;
    let jobs = select_countries(firsts, &config.jobs_country_codes())?;
    let values = [VALUE.to_string()];

    let pivot = |keys: &[&str], on: &str| -> Result<Table> {
        Table::pivot(
            &sum_over(&jobs, keys, &values)?,
            keys,
            Values::Single(VALUE),
            on,
        )
    };
    Ok(Jobs {
        year_full: Table::pivot(&jobs, &keys, Values::Single(VALUE), YEAR)?,
        year: pivot(&[COUNTRY, SCENARIO, YEAR, TECH], YEAR)?,
        tech: pivot(&[COUNTRY, SCENARIO, INDICATOR, TECH], TECH)?,
        ind: pivot(&[COUNTRY, SCENARIO, INDICATOR], INDICATOR)?,
    })
}

fn stacked(materials: &[String]) -> Values<'_> {
    Values::Stacked {
        columns: materials,
        level: MAT,
    }
}

/// Keeps the rows of `frame` for the given country codes.
///
/// Every code must have at least one row.
fn select_countries(frame: DataFrame, codes: &[&str]) -> Result<DataFrame> {
    let countries = frame.column(COUNTRY)?.str()?;
    for code in codes {
        ensure!(
            countries.into_iter().any(|c| c == Some(*code)),
            "no data for {COUNTRY} {code}"
        );
    }
    let selected = frame
        .lazy()
        .filter(col(COUNTRY).is_in(lit(Series::new(COUNTRY, codes))))
        .collect()?;
    Ok(selected)
}

/// Sums the `values` columns of `frame` over every column not in `keys`.
fn sum_over(frame: &DataFrame, keys: &[&str], values: &[String]) -> Result<DataFrame> {
    let summed = frame
        .clone()
        .lazy()
        .group_by(keys.iter().copied().map(col).collect::<Vec<_>>())
        .agg(values.iter().map(|value| col(value).sum()).collect::<Vec<_>>())
        .collect()?;
    Ok(summed)
}
