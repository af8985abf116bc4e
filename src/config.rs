//! Fixed configuration: which files to read, which countries to keep, and how
//! the jobs data is filtered.

use anyhow::{Context, Result};

use crate::Label;

/// A configured country.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Country {
    /// Short code, as it appears in the data files.
    pub code: &'static str,
    /// Full name, as it appears in the report.
    pub name: &'static str,
    /// Whether the jobs data covers this country.
    pub has_jobs: bool,
}

pub const COUNTRIES: [Country; 5] = [
    Country { code: "KE", name: "Kenya", has_jobs: true },
    Country { code: "RW", name: "Rwanda", has_jobs: true },
    Country { code: "UG", name: "Uganda", has_jobs: true },
    Country { code: "UK", name: "United Kingdom", has_jobs: false },
    Country { code: "ZM", name: "Zambia", has_jobs: true },
];

/// Logical data set name to file name, relative to the data directory.
pub const FILENAMES: [(&str, &str); 3] = [
    ("emissions_year", "E_matbytech_bycountry.csv"),
    ("emissions_mat", "E_matbytech_bycountry.csv"),
    ("jobs", "jobs_forplot.csv"),
];

/// The only `parameter` value kept from the jobs data.
pub const JOBS_PARAMETER: &str = "Power Generation Capacity (Aggregate)";

/// A jobs `Indicator` value that is not a jobs figure.
pub const EXCLUDED_INDICATOR: &str = "Capacity";

/// Immutable settings for one run.
///
/// [`Config::default`] holds the constants above; nothing mutates a config
/// once built.
///
/// Tables keep their rows in label order, so [`COUNTRIES`] is listed in an
/// order that is sorted by both code and name.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    countries: &'static [Country],
    files: &'static [(&'static str, &'static str)],
    jobs_parameter: &'static str,
    excluded_indicator: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            countries: &COUNTRIES,
            files: &FILENAMES,
            jobs_parameter: JOBS_PARAMETER,
            excluded_indicator: EXCLUDED_INDICATOR,
        }
    }
}

impl Config {
    /// Returns the file name for the logical data set `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is configured under `name`.
    pub fn filename(&self, name: &str) -> Result<&'static str> {
        self.files
            .iter()
            .find(|(logical, _)| *logical == name)
            .map(|(_, file)| *file)
            .with_context(|| format!("no data file configured for {name:?}"))
    }

    /// Country codes to keep in the emissions tables, in configured order.
    #[must_use]
    pub fn country_codes(&self) -> Vec<&'static str> {
        self.countries.iter().map(|c| c.code).collect()
    }

    /// Country codes to keep in the jobs tables, in configured order.
    #[must_use]
    pub fn jobs_country_codes(&self) -> Vec<&'static str> {
        self.countries
            .iter()
            .filter(|c| c.has_jobs)
            .map(|c| c.code)
            .collect()
    }

    #[must_use]
    pub fn jobs_parameter(&self) -> &'static str {
        self.jobs_parameter
    }

    #[must_use]
    pub fn excluded_indicator(&self) -> &'static str {
        self.excluded_indicator
    }

    /// Replaces a country code with its full name; other labels pass through.
    #[must_use]
    pub fn rename(&self, label: Label) -> Label {
        let name = label
            .as_text()
            .and_then(|code| self.countries.iter().find(|c| c.code == code))
            .map(|c| c.name);
        match name {
            Some(name) => Label::Text(name.to_string()),
            None => label,
        }
    }
}
