use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use context_error::*;
use directories::ProjectDirs;
use tracing::{info, warn};

use dnannotate::prelude::*;
use dncore::{
    advocate::Advocate,
    error::{DeNovoError, DeNovoErrorKind, canceled, io_error},
    parameters::SearchParameters,
    spectrum::{InMemorySpectra, SpectrumIdentifier, SpectrumProvider},
};
use dnident::{
    import::ImportOutcome, mapping::MappingOutcome, prelude::*, ranking::leading_advocate,
    tools::ToolRunOutcome,
};

use crate::cli::{
    AnnotateArgs, DefaultsArgs, ExportArgs, FilterArgs, ImportArgs, MapArgs, RunArgs,
    SessionArgs,
};

/// Everything a command works with
struct Session {
    context: SessionContext,
    spectra: InMemorySpectra,
    store: IdentificationStore,
}

impl Session {
    fn open(args: &SessionArgs) -> Result<Self, DeNovoError> {
        let context = SessionContext::load(
            args.modifications.as_deref(),
            args.modification_mapping.as_deref(),
            args.parameters.as_deref(),
        )?;
        context.mapping_warnings();
        let mut spectra = InMemorySpectra::new();
        for file in &args.spectra {
            let count = load_mgf(file, &mut spectra)?;
            info!("Loaded {count} spectra from {}", file.display());
        }
        let directory = match &args.cache {
            Some(directory) => directory.clone(),
            None => default_cache_directory()?,
        };
        let store = IdentificationStore::open(
            directory,
            CacheSettings {
                memory_budget: args.memory_budget * 1024 * 1024,
                ..CacheSettings::default()
            },
        )?;
        Ok(Self {
            context,
            spectra,
            store,
        })
    }

    fn import(&mut self, files: &[PathBuf]) -> Result<ImportOutcome, DeNovoError> {
        let outcome = import_results(
            files,
            provider(&self.spectra),
            &self.context,
            &mut self.store,
            &Progress::new(),
        )?;
        print_import(&outcome);
        Ok(outcome)
    }

    /// All spectra in display order: per spectrum file the ranked titles
    fn ranked_order(&mut self) -> Result<Vec<SpectrumIdentifier>, DeNovoError> {
        let snapshot = self.store.snapshot()?;
        let mut order = Vec::with_capacity(snapshot.len());
        for file in self.store.spectrum_files() {
            let titles = self.spectra.spectrum_titles(file).map_or_else(
                || {
                    self.store
                        .spectrum_identifiers_in(file)
                        .map(|id| id.title().to_string())
                        .collect()
                },
                |titles| titles.into_owned(),
            );
            order.extend(
                order_titles_by_score(&snapshot, file, &titles)
                    .into_iter()
                    .map(|title| SpectrumIdentifier::new(file, title)),
            );
        }
        Ok(order)
    }

    fn close(self) -> Result<(), DeNovoError> {
        self.store.close()
    }
}

/// The loaded spectra, if any
fn provider(spectra: &InMemorySpectra) -> Option<&dyn SpectrumProvider> {
    if spectra.files().next().is_some() {
        Some(spectra)
    } else {
        None
    }
}

fn default_cache_directory() -> Result<PathBuf, DeNovoError> {
    ProjectDirs::from("org", "denovo", "denovo")
        .map(|dirs| dirs.cache_dir().join("identification"))
        .ok_or_else(|| {
            DeNovoError::small(
                DeNovoErrorKind::Configuration,
                "No cache directory",
                "No user cache directory could be found, set one with --cache",
            )
        })
}

fn print_import(outcome: &ImportOutcome) {
    println!(
        "Imported {} assumptions from {} files",
        outcome.total_assumptions(),
        outcome.files_read
    );
    for (advocate, count) in &outcome.assumptions {
        println!(
            "  {advocate}: {count} assumptions for {} spectra",
            outcome.spectra.get(advocate).copied().unwrap_or_default()
        );
    }
    if !outcome.warnings.is_empty() {
        println!("{} warnings, see the log for details", outcome.warnings.len());
    }
}

fn export_settings(filter: &FilterArgs) -> ExportSettings {
    ExportSettings {
        threshold: filter.threshold,
        greater_than: !filter.lower_is_better,
        max_matches: filter.max_matches,
    }
}

pub(crate) fn run(session: &SessionArgs, args: &RunArgs) -> Result<(), DeNovoError> {
    let mut runner = ToolRunner::new(&args.output_dir);
    for (advocate, executable) in [
        (Advocate::PepNovo, &args.pepnovo),
        (Advocate::DirecTag, &args.directag),
        (Advocate::PNovo, &args.pnovo),
        (Advocate::Novor, &args.novor),
    ] {
        if let Some(executable) = executable {
            runner = runner.with_executable(advocate, executable);
        }
    }
    if runner.advocates().next().is_none() {
        return Err(DeNovoError::small(
            DeNovoErrorKind::Configuration,
            "No sequencing tools",
            "Give the executable of at least one tool, eg --novor path/to/novor.sh",
        ));
    }

    let mut session = Session::open(session)?;
    if provider(&session.spectra).is_none() {
        load_mgf(&args.spectrum_file, &mut session.spectra)?;
    }
    let ToolRunOutcome { outputs, warnings } =
        runner.run_all(&args.spectrum_file, &session.context, &Progress::new())?;
    for (advocate, output) in &outputs {
        println!("{advocate}: {}", output.display());
    }
    if !warnings.is_empty() {
        println!("{} tools reported problems, see the log for details", warnings.len());
    }
    let files = outputs.into_iter().map(|(_, path)| path).collect::<Vec<_>>();
    session.import(&files)?;
    if let Some(path) = &args.export {
        let order = session.ranked_order()?;
        export_to_file(
            path,
            ExportType::Tags,
            &mut session.store,
            &order,
            &ExportSettings::default(),
            &Progress::new(),
        )?;
    }
    session.close()
}

pub(crate) fn import(session: &SessionArgs, args: &ImportArgs) -> Result<(), DeNovoError> {
    let mut session = Session::open(session)?;
    session.import(&args.files)?;
    let snapshot = session.store.snapshot()?;
    let order = session.ranked_order()?;
    let statistics = session.store.statistics();
    for advocate in Advocate::PRIORITY {
        let range = statistics.scores(advocate);
        if let (Some(min), Some(max)) = (range.min(), range.max()) {
            println!("{advocate} scores: {min} to {max}");
        }
    }
    let mut current_file = None;
    let mut shown = 0;
    for identifier in order {
        if current_file != Some(identifier.file().to_string()) {
            current_file = Some(identifier.file().to_string());
            shown = 0;
            println!("{}", identifier.file());
        }
        if shown >= args.top {
            continue;
        }
        shown += 1;
        match snapshot.assumptions(&identifier).and_then(leading_advocate) {
            Some((advocate, score)) => {
                println!("  {}\t{advocate}\t{score}", identifier.title());
            }
            None => println!("  {}\t-", identifier.title()),
        }
    }
    session.close()
}

pub(crate) fn export(session: &SessionArgs, args: &ExportArgs) -> Result<(), DeNovoError> {
    let mut session = Session::open(session)?;
    session.import(&args.files)?;
    if let Some(fasta) = &args.fasta {
        let mapper = FastaProteinMapper::new(
            FastaProtein::parse_file(fasta)?,
            session.context.catalog.clone(),
            session.context.parameters.fixed_modifications.clone(),
        );
        let settings = MappingSettings {
            threshold: args.filter.threshold,
            greater_than: !args.filter.lower_is_better,
            max_matches_per_spectrum: args.filter.max_matches,
            fragment_tolerance: session.context.parameters.fragment_tolerance.cast(),
            ..MappingSettings::default()
        };
        session = map_in_background(session, mapper, settings)?;
    }
    let order = session.ranked_order()?;
    let written = export_to_file(
        &args.output,
        args.export_type,
        &mut session.store,
        &order,
        &export_settings(&args.filter),
        &Progress::new(),
    )?;
    println!("Wrote {written} assumptions to {}", args.output.display());
    session.close()
}

pub(crate) fn map(session: &SessionArgs, args: &MapArgs) -> Result<(), DeNovoError> {
    let mut session = Session::open(session)?;
    session.import(&args.files)?;
    let mapper = FastaProteinMapper::new(
        FastaProtein::parse_file(&args.fasta)?,
        session.context.catalog.clone(),
        session.context.parameters.fixed_modifications.clone(),
    )
    .with_min_indexable_length(args.min_length);
    let settings = MappingSettings {
        threshold: args.filter.threshold,
        greater_than: !args.filter.lower_is_better,
        max_matches_per_spectrum: args.filter.max_matches,
        fragment_tolerance: args.gap_tolerance,
        ..MappingSettings::default()
    };
    let mut session = map_in_background(session, mapper, settings)?;
    let order = session.ranked_order()?;
    let written = export_to_file(
        &args.output,
        ExportType::Peptides,
        &mut session.store,
        &order,
        &export_settings(&args.filter),
        &Progress::new(),
    )?;
    println!("Wrote {written} peptides to {}", args.output.display());
    session.close()
}

/// Run the protein mapping on a worker thread, reporting its progress while waiting
fn map_in_background(
    session: Session,
    mapper: FastaProteinMapper,
    settings: MappingSettings,
) -> Result<Session, DeNovoError> {
    let Session {
        context,
        spectra,
        mut store,
    } = session;
    let order = store.spectrum_identifiers().to_vec();
    let mut handle = spawn_task("Protein mapping", Progress::new(), move |progress| {
        let outcome = map_to_proteins(&mut store, &order, &mapper, &settings, progress)?;
        Ok((store, outcome))
    });
    let outcome = loop {
        if let Some(outcome) = handle.try_outcome() {
            break outcome;
        }
        let (done, total) = handle.progress().counts();
        info!("{}: {done} of {total}", handle.progress().status());
        std::thread::sleep(Duration::from_secs(1));
    };
    match outcome {
        TaskOutcome::Completed((store, outcome)) => {
            print_mapping(&outcome);
            Ok(Session {
                context,
                spectra,
                store,
            })
        }
        TaskOutcome::Canceled => Err(canceled("Protein mapping")),
        TaskOutcome::Failed(error) => Err(error),
    }
}

fn print_mapping(outcome: &MappingOutcome) {
    if outcome.any_match_found {
        println!(
            "Mapped {} spectra, {} peptides derived from tags",
            outcome.spectra_processed, outcome.derived_peptides
        );
    } else {
        println!("No tag or peptide matched any protein");
    }
    if outcome.spilled_spectra > 0 {
        info!(
            "{} spectra were moved to the cache during mapping",
            outcome.spilled_spectra
        );
    }
    for warning in &outcome.warnings {
        warn!("{warning}");
    }
    if !outcome.warnings.is_empty() {
        println!(
            "{} assumptions could not be mapped, see the log for details",
            outcome.warnings.len()
        );
    }
}

pub(crate) fn annotate(session: &SessionArgs, args: &AnnotateArgs) -> Result<(), DeNovoError> {
    let mut settings = match &args.settings {
        Some(path) => read_json::<AnnotationSettings>(path)?,
        None => AnnotationSettings::default(),
    };
    if let Some(tolerance) = args.tolerance {
        settings.tolerance = tolerance;
    }
    let mut session = Session::open(session)?;
    let file = match &args.spectrum_file {
        Some(file) => file.clone(),
        None => session.spectra.files().next().map(str::to_string).ok_or_else(|| {
            DeNovoError::small(
                DeNovoErrorKind::Configuration,
                "No spectra",
                "Give the spectrum file to annotate with --spectra",
            )
        })?,
    };
    let Some(spectrum) = session
        .spectra
        .spectrum(&file, &args.title)
        .map(std::borrow::Cow::into_owned)
    else {
        return Err(DeNovoError::small(
            DeNovoErrorKind::Configuration,
            "Unknown spectrum",
            format!("There is no spectrum '{}' in '{file}'", args.title),
        ));
    };
    session.import(&args.files)?;
    let identifier = SpectrumIdentifier::new(file, args.title.clone());
    let Some(assumptions) = session.store.assumptions(&identifier)? else {
        warn!("No assumptions for {identifier}");
        return session.close();
    };
    let mut stdout = std::io::stdout().lock();
    let write_error = |e: std::io::Error| {
        DeNovoError::small(DeNovoErrorKind::Io, "Could not write annotation", e.to_string())
    };
    for advocate in Advocate::PRIORITY {
        let Some(scores) = assumptions.get(&advocate.index()) else {
            continue;
        };
        let Some(assumption) = scores
            .iter()
            .filter_map(|(score, list)| Some((score.0, list.first()?)))
            .min_by(|a, b| advocate.compare_scores(a.0, b.0))
            .map(|(_, assumption)| assumption)
        else {
            continue;
        };
        let matches = dnannotate::annotation::annotate(
            &spectrum,
            assumption,
            &settings,
            &session.context.catalog,
        );
        writeln!(
            stdout,
            "{advocate}\t{}\t{}\t{:.1}% intensity explained",
            assumption.sequence_string(),
            assumption.score(),
            explained_intensity(&spectrum, &matches) * 100.0
        )
        .map_err(write_error)?;
        for ion in &matches {
            writeln!(stdout, "  {ion}").map_err(write_error)?;
        }
    }
    drop(stdout);
    session.close()
}

pub(crate) fn defaults(args: &DefaultsArgs) -> Result<(), DeNovoError> {
    std::fs::create_dir_all(&args.directory)
        .map_err(|e| io_error(&args.directory, "Could not create directory", &e))?;
    let parameters = args.directory.join("parameters.json");
    SearchParameters::default().to_json_file(&parameters)?;
    let annotation = args.directory.join("annotation.json");
    let text = serde_json::to_string_pretty(&AnnotationSettings::default()).map_err(|e| {
        DeNovoError::small(
            DeNovoErrorKind::Configuration,
            "Could not write annotation settings",
            e.to_string(),
        )
    })?;
    std::fs::write(&annotation, text)
        .map_err(|e| io_error(&annotation, "Could not write annotation settings", &e))?;
    println!("Wrote {} and {}", parameters.display(), annotation.display());
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DeNovoError> {
    let file = std::fs::File::open(path)
        .map_err(|e| io_error(path, "Could not open settings", &e))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| {
        DeNovoError::small(
            DeNovoErrorKind::Configuration,
            format!("Invalid settings in {}", path.display()),
            e.to_string(),
        )
    })
}
