use anyhow::Result;
use clap::Parser;
use energy_report::{load_aggregates, Config, Renderer};
use tracing_subscriber::{fmt, EnvFilter};

use std::path::{self, PathBuf};

/// Renders a template report from country emissions and jobs data.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// An "outputs" directory containing the CSV data files
    data_dir: PathBuf,
    /// Tera template file to process
    input_template: PathBuf,
    /// Location for the processed template (will be overwritten)
    output_file: PathBuf,
    /// Keep rows and columns that are entirely zero
    #[arg(long)]
    preserve_zeros: bool,
    /// Print the resolved paths and every aggregated table
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let data_dir = path::absolute(&args.data_dir)?;
    let input_template = path::absolute(&args.input_template)?;
    let output_file = path::absolute(&args.output_file)?;
    if args.verbose {
        println!(
            "Rendering     {}\nusing data in {}\nand saving to {}",
            input_template.display(),
            data_dir.display(),
            output_file.display()
        );
    }

    let renderer = Renderer::load(&input_template)?;
    let aggregates = load_aggregates(&data_dir, &Config::default())?;
    if args.verbose {
        for (name, table) in aggregates.tables() {
            println!("Table {name}:\n{table}");
        }
    }
    renderer.render(&aggregates, !args.preserve_zeros, &output_file)?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,energy_report=info"
    } else {
        "warn"
    };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();
}
