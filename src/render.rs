use anyhow::{ensure, Context, Result};
use glob::{glob, Pattern};
use tera::{Template, Tera};
use tracing::{debug, info, warn};

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Component, Path, PathBuf},
};

use crate::Aggregates;

/// Template names that get HTML escaping.
const AUTOESCAPE_SUFFIXES: [&str; 2] = [".html", ".xml"];

/// A loaded entry template, plus every template it may include or extend.
#[derive(Debug)]
pub struct Renderer {
    tera: Tera,
    name: String,
}

impl Renderer {
    /// Loads the template at `path`.
    ///
    /// Other templates in the same directory (and below it) that share its
    /// extension are loaded too, so that it can include or extend them. One
    /// that cannot be read or parsed is skipped with a warning. Nothing
    /// outside that directory can be reached.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * `path` is not a file, or cannot be read
    /// * The template has a syntax error
    /// * The template extends a template that could not be loaded
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure!(path.is_file(), "template {} not found", path.display());
        let dir = path
            .parent()
            .with_context(|| format!("template {} has no directory", path.display()))?;
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        let name = path
            .file_name()
            .with_context(|| format!("template {} has no file name", path.display()))?
            .to_string_lossy()
            .into_owned();

        let source = fs::read_to_string(path)
            .with_context(|| format!("reading template {}", path.display()))?;
        Template::new(&name, None, &source)
            .with_context(|| format!("parsing template {}", path.display()))?;
        let mut templates = vec![(name.clone(), source)];
        for candidate in colocated(dir, path)? {
            match load_colocated(dir, &candidate) {
                Ok(template) => templates.push(template),
                Err(err) => warn!(
                    template = %candidate.display(),
                    error = %format!("{err:#}"),
                    "skipping template"
                ),
            }
        }

        let mut tera = Tera::default();
        tera.autoescape_on(AUTOESCAPE_SUFFIXES.to_vec());
        tera.add_raw_templates(templates)
            .with_context(|| format!("loading templates from {}", dir.display()))?;
        debug!(
            templates = tera.get_template_names().count(),
            dir = %dir.display(),
            "loaded templates"
        );
        Ok(Self { tera, name })
    }

    /// The entry template's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the template with each of the `aggregates` bound to its name
    /// as nested maps, streaming the result into `output`.
    ///
    /// `output` is created, or truncated if it exists.
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// * `output` cannot be created or written
    /// * The template uses an undefined variable or filter, or fails to
    ///   render for any other reason
    pub fn render(
        &self,
        aggregates: &Aggregates,
        drop_zeros: bool,
        output: impl AsRef<Path>,
    ) -> Result<()> {
        let output = output.as_ref();
        let mut context = tera::Context::new();
        for (name, nested) in aggregates.to_nested(drop_zeros) {
            context.insert(name, &nested);
        }

        let file =
            File::create(output).with_context(|| format!("creating {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        self.tera
            .render_to(&self.name, &context, &mut writer)
            .with_context(|| format!("rendering {}", self.name))?;
        writer
            .flush()
            .with_context(|| format!("writing {}", output.display()))?;
        info!(template = %self.name, output = %output.display(), "rendered");
        Ok(())
    }
}

/// Files under `dir` with the same extension as `entry`, other than `entry`.
fn colocated(dir: &Path, entry: &Path) -> Result<Vec<PathBuf>> {
    let dir = Pattern::escape(&dir.to_string_lossy());
    let pattern = match entry.extension() {
        Some(ext) => format!("{dir}/**/*.{}", Pattern::escape(&ext.to_string_lossy())),
        None => format!("{dir}/**/*"),
    };
    let paths = glob(&pattern)
        .with_context(|| format!("listing templates matching {pattern}"))?
        .filter_map(std::result::Result::ok)
        .filter(|path| path.is_file() && path != entry)
        .collect();
    Ok(paths)
}

/// Reads and parses `path`, naming it by its path relative to `dir`.
fn load_colocated(dir: &Path, path: &Path) -> Result<(String, String)> {
    let name = path
        .strip_prefix(dir)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");
    let source = fs::read_to_string(path)?;
    Template::new(&name, None, &source)?;
    Ok((name, source))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{load_aggregates, Config};

    fn aggregates() -> Aggregates {
        load_aggregates("testdata", &Config::default()).unwrap()
    }

    fn render(template: &str, drop_zeros: bool) -> Result<String> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, template).unwrap();
        let output = dir.path().join("out");
        Renderer::load(&path)?.render(&aggregates(), drop_zeros, &output)?;
        Ok(fs::read_to_string(output).unwrap())
    }

    #[test]
    fn render_fn_substitutes_summed_values() {
        let text = render("{{ emissions_mat['Kenya']['Base']['Steel'] }}", true).unwrap();
        assert_eq!(text, "5");
    }

    #[test]
    fn render_fn_accepts_a_whole_map_lookup() {
        assert!(render("{{ emissions_mat['Kenya']['Base'] }}", true).is_ok());
    }

    #[test]
    fn render_fn_binds_every_table_by_name() {
        let names = Aggregates::NAMES
            .iter()
            .map(|name| format!("{{% if {name} %}}{name} {{% endif %}}"))
            .collect::<String>();
        let text = render(&names, true).unwrap();
        assert_eq!(text.split_whitespace().collect::<Vec<_>>(), Aggregates::NAMES);
    }

    #[test]
    fn render_fn_honours_preserve_zeros() {
        let template = "{% for year, value in emissions_year['Kenya']['Base']['Steel'] %}\
                        {{ year }}={{ value }};{% endfor %}";
        assert_eq!(render(template, true).unwrap(), "2020=5;");
        assert_eq!(render(template, false).unwrap(), "2020=5;2021=0;");
    }

    #[test]
    fn render_fn_returns_error_for_undefined_variable() {
        let err = render("{{ emissions_by_planet }}", true).unwrap_err();
        assert!(format!("{err:#}").contains("report.txt"));
        assert!(render("{{ jobs_ind | no_such_filter }}", true).is_err());
    }

    #[test]
    fn load_fn_returns_error_for_missing_template() {
        assert!(Renderer::load("testdata/templates/missing.txt").is_err());
    }

    #[test]
    fn render_fn_can_include_colocated_templates() {
        let output = tempfile::tempdir().unwrap();
        let path = output.path().join("out.md");
        let renderer = Renderer::load("testdata/templates/report.md").unwrap();
        assert_eq!(renderer.name(), "report.md");
        renderer.render(&aggregates(), true, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Emissions and jobs by country"), "{text}");
        assert!(text.contains("# Kenya"), "{text}");
        assert!(text.contains("United Kingdom"), "{text}");
        assert!(text.contains("Manufacturing: 17"), "{text}");
    }

    #[test]
    fn load_fn_skips_broken_colocated_templates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        fs::write(&path, "hello {% include \"part.md\" %}").unwrap();
        fs::write(dir.path().join("part.md"), "world").unwrap();
        fs::write(dir.path().join("notes.md"), "a {{ b").unwrap();
        fs::write(dir.path().join("binary.md"), [0xff_u8, 0xfe, 0x00]).unwrap();
        let output = dir.path().join("out.md");
        Renderer::load(&path)
            .unwrap()
            .render(&aggregates(), true, &output)
            .unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "hello world");
        // the previous output is now a colocated template too
        assert!(Renderer::load(&path).is_ok());
    }

    #[test]
    fn load_fn_returns_error_for_broken_entry_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        fs::write(&path, "a {{ b").unwrap();
        let err = Renderer::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("report.md"), "{err:#}");
    }

    #[test]
    fn load_fn_handles_glob_characters_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports[2024]");
        fs::create_dir(&reports).unwrap();
        let path = reports.join("report.md");
        fs::write(&path, "{% include \"part.md\" %}!").unwrap();
        fs::write(reports.join("part.md"), "included").unwrap();
        let output = dir.path().join("out.md");
        Renderer::load(&path)
            .unwrap()
            .render(&aggregates(), true, &output)
            .unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "included!");
    }

    #[test]
    fn render_fn_truncates_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("t.txt");
        let output = dir.path().join("out");
        fs::write(&template, "short").unwrap();
        fs::write(&output, "a much longer previous report").unwrap();
        Renderer::load(&template)
            .unwrap()
            .render(&aggregates(), true, &output)
            .unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "short");
    }

    #[test]
    fn render_fn_escapes_only_html_and_xml_templates() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        for (file, expected) in [("t.html", "A &amp; B"), ("t.txt", "A & B")] {
            let template = dir.path().join(file);
            fs::write(&template, "{{ 'A & B' }}").unwrap();
            Renderer::load(&template)
                .unwrap()
                .render(&aggregates(), true, &output)
                .unwrap();
            assert_eq!(fs::read_to_string(&output).unwrap(), expected, "{file}");
        }
    }
}
