use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dncore::{
    error::DeNovoError,
    system::Mass,
    tolerance::{Tolerance, TolerancedQuantity},
};
use dnident::export::ExportType;

/// Run de novo peptide sequencing tools and aggregate, map, annotate, and export their results.
///
/// Logging is controlled with the `RUST_LOG` environment variable, it defaults to `info`.
#[derive(Debug, Parser)]
#[command(version, about)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) session: SessionArgs,
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// The configuration of the results session, shared by all commands
#[derive(Debug, Args)]
pub(crate) struct SessionArgs {
    /// The cache directory of the identification, defaults to a directory in the user cache
    #[arg(long, global = true)]
    pub(crate) cache: Option<PathBuf>,
    /// The memory budget of the identification in MiB, above this spectra are written to the cache
    #[arg(long, global = true, default_value_t = 512)]
    pub(crate) memory_budget: usize,
    /// A JSON list of modifications to add to the built in catalog
    #[arg(long, global = true)]
    pub(crate) modifications: Option<PathBuf>,
    /// A JSON file with the tool specific modification names
    #[arg(long, global = true)]
    pub(crate) modification_mapping: Option<PathBuf>,
    /// A JSON file with the search parameters
    #[arg(long, global = true)]
    pub(crate) parameters: Option<PathBuf>,
    /// MGF files with the spectra the results refer to, separated by commas
    #[arg(long, global = true, value_delimiter = ',')]
    pub(crate) spectra: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the sequencing tools on a spectrum file and import their results
    Run(RunArgs),
    /// Import result files and show the best spectra per file
    Import(ImportArgs),
    /// Import result files and export them
    Export(ExportArgs),
    /// Import result files, map them to proteins, and export the peptides
    Map(MapArgs),
    /// Annotate one spectrum with the best assumption of every algorithm
    Annotate(AnnotateArgs),
    /// Write the default search parameters and annotation settings as JSON
    Defaults(DefaultsArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// The MGF file to sequence
    pub(crate) spectrum_file: PathBuf,
    /// The directory for the tool output
    #[arg(short, long)]
    pub(crate) output_dir: PathBuf,
    /// The PepNovo+ executable
    #[arg(long)]
    pub(crate) pepnovo: Option<PathBuf>,
    /// The DirecTag executable
    #[arg(long)]
    pub(crate) directag: Option<PathBuf>,
    /// The pNovo+ executable
    #[arg(long)]
    pub(crate) pnovo: Option<PathBuf>,
    /// The Novor executable
    #[arg(long)]
    pub(crate) novor: Option<PathBuf>,
    /// Export the tags of all tools to this file after importing
    #[arg(long)]
    pub(crate) export: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct ImportArgs {
    /// The result files (`.tags`, `.out`, `.txt`, `.csv`, optionally gzipped)
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,
    /// The number of spectra to show per spectrum file
    #[arg(long, default_value_t = 10)]
    pub(crate) top: usize,
}

/// Which assumptions pass
#[derive(Debug, Args)]
pub(crate) struct FilterArgs {
    /// The score threshold
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub(crate) threshold: f64,
    /// Keep scores at most the threshold instead of at least
    #[arg(long)]
    pub(crate) lower_is_better: bool,
    /// The number of best scores per algorithm per spectrum
    #[arg(long, default_value_t = 10)]
    pub(crate) max_matches: usize,
}

#[derive(Debug, Args)]
pub(crate) struct ExportArgs {
    /// The result files
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,
    /// The kind of export: tags, peptides, or blast
    #[arg(short = 't', long = "type", default_value = "tags")]
    pub(crate) export_type: ExportType,
    /// The output file
    #[arg(short, long)]
    pub(crate) output: PathBuf,
    /// Map to the proteins in this FASTA file before exporting
    #[arg(long)]
    pub(crate) fasta: Option<PathBuf>,
    #[command(flatten)]
    pub(crate) filter: FilterArgs,
}

#[derive(Debug, Args)]
pub(crate) struct MapArgs {
    /// The result files
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,
    /// The FASTA file with the proteins
    #[arg(long)]
    pub(crate) fasta: PathBuf,
    /// The peptide export file
    #[arg(short, long)]
    pub(crate) output: PathBuf,
    /// The shortest run of residues that is looked up
    #[arg(long, default_value_t = 4)]
    pub(crate) min_length: usize,
    /// The tolerance for matching the mass gaps of tags, eg `0.5da` or `10ppm`
    #[arg(long, default_value = "0.5 Da", value_parser = tolerance::<Mass>)]
    pub(crate) gap_tolerance: Tolerance<Mass>,
    #[command(flatten)]
    pub(crate) filter: FilterArgs,
}

#[derive(Debug, Args)]
pub(crate) struct AnnotateArgs {
    /// The result files
    #[arg(required = true)]
    pub(crate) files: Vec<PathBuf>,
    /// The title of the spectrum
    #[arg(long)]
    pub(crate) title: String,
    /// The spectrum file name, defaults to the first file given with `--spectra`
    #[arg(long)]
    pub(crate) spectrum_file: Option<String>,
    /// A JSON file with the annotation settings
    #[arg(long)]
    pub(crate) settings: Option<PathBuf>,
    /// Overrule the fragment tolerance of the settings
    #[arg(long, value_parser = tolerance::<dncore::system::MassOverCharge>)]
    pub(crate) tolerance: Option<Tolerance>,
}

fn tolerance<T: TolerancedQuantity + Send + Sync + 'static>(
    value: &str,
) -> Result<Tolerance<T>, String> {
    value
        .parse()
        .map_err(|error: DeNovoError| error.to_string())
}

#[derive(Debug, Args)]
pub(crate) struct DefaultsArgs {
    /// The directory to write `parameters.json` and `annotation.json` in
    #[arg(default_value = ".")]
    pub(crate) directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments() {
        Cli::command().debug_assert();
    }

    #[test]
    fn session_arguments_are_global() {
        let cli = Cli::try_parse_from([
            "denovo",
            "export",
            "run.tags",
            "-o",
            "out.txt",
            "-t",
            "peptides",
            "--spectra",
            "a.mgf,b.mgf",
            "--threshold",
            "-5",
            "--lower-is-better",
        ])
        .unwrap();
        assert_eq!(cli.session.spectra.len(), 2);
        assert_eq!(cli.session.memory_budget, 512);
        let Command::Export(export) = cli.command else {
            panic!("Not an export");
        };
        assert_eq!(export.export_type, ExportType::Peptides);
        assert_eq!(export.filter.threshold, -5.0);
        assert!(export.filter.lower_is_better);
        assert!(export.fasta.is_none());
    }

    #[test]
    fn tolerances() {
        let cli = Cli::try_parse_from([
            "denovo", "map", "run.csv", "--fasta", "db.fasta", "-o", "out.txt",
        ])
        .unwrap();
        let Command::Map(map) = cli.command else {
            panic!("Not a mapping");
        };
        assert_eq!(map.gap_tolerance, Tolerance::new_absolute(0.5));
        assert_eq!(map.min_length, 4);
    }
}
