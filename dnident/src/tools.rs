//! Run the de novo sequencing tools as external processes.
//!
//! The command line (and for pNovo+ and Novor the parameter file) of every tool is derived from
//! the search parameters of the session. A tool that fails only loses its own results, the other
//! tools are run regardless.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use context_error::*;
use itertools::Itertools;
use tracing::{debug, info, warn};

use dncore::{
    advocate::Advocate,
    error::{DeNovoError, DeNovoErrorKind, canceled, file_context, io_error},
    modification::ModificationPosition,
    system::{mz, ppm},
    tolerance::Tolerance,
};

use crate::{session::SessionContext, task::Progress};

/// A fully prepared invocation of one tool
#[derive(Clone, Debug, Default)]
pub struct ToolRun {
    /// The tool
    pub advocate: Option<Advocate>,
    /// The executable
    pub program: PathBuf,
    /// The command line arguments
    pub arguments: Vec<String>,
    /// A parameter file to write before starting the tool, path and content
    pub parameter_file: Option<(PathBuf, String)>,
    /// If the standard output of the tool is the result file
    pub stdout_is_output: bool,
    /// The result file the tool writes
    pub output: PathBuf,
    /// Problems found while preparing, modifications that could not be passed to the tool
    pub warnings: Vec<DeNovoError>,
}

/// The results of running all configured tools
#[derive(Clone, Debug, Default)]
pub struct ToolRunOutcome {
    /// The result files of the tools that succeeded, in [`Advocate::PRIORITY`] order
    pub outputs: Vec<(Advocate, PathBuf)>,
    /// The problems of all tools, including the failures
    pub warnings: Vec<DeNovoError>,
}

/// Runs the tools for which an executable is configured
#[derive(Clone, Debug)]
pub struct ToolRunner {
    executables: BTreeMap<Advocate, PathBuf>,
    output_directory: PathBuf,
    poll_interval: Duration,
}

impl ToolRunner {
    /// A runner writing all results to the given directory, without any tools configured
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            executables: BTreeMap::new(),
            output_directory: output_directory.into(),
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Configure the executable for a tool
    #[must_use]
    pub fn with_executable(mut self, advocate: Advocate, executable: impl Into<PathBuf>) -> Self {
        self.executables.insert(advocate, executable.into());
        self
    }

    /// Set how often running tools are checked for exit and cancellation
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The configured tools
    pub fn advocates(&self) -> impl Iterator<Item = Advocate> + '_ {
        self.executables.keys().copied()
    }

    /// The directory the results are written to
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Prepare the invocation of one tool on one spectrum file
    /// # Errors
    /// A `Configuration` error if no executable is configured for this tool.
    pub fn plan(
        &self,
        advocate: Advocate,
        spectrum_file: &Path,
        session: &SessionContext,
    ) -> Result<ToolRun, DeNovoError> {
        let program = self.executables.get(&advocate).ok_or_else(|| {
            DeNovoError::small(
                DeNovoErrorKind::Configuration,
                format!("{advocate} is not configured"),
                format!("Set the location of the {advocate} executable to run it"),
            )
        })?;
        let name = spectrum_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stem = spectrum_file
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let spectra = spectrum_file.to_string_lossy().to_string();
        let mut run = ToolRun {
            advocate: Some(advocate),
            program: program.clone(),
            ..ToolRun::default()
        };
        let parameters = &session.parameters;
        let fragment = dalton(parameters.fragment_tolerance);
        let precursor = dalton(parameters.precursor_tolerance);

        match advocate {
            Advocate::PepNovo => {
                let settings = &parameters.pepnovo;
                run.output = self.output_directory.join(format!("{name}.out"));
                run.stdout_is_output = true;
                run.arguments = vec![
                    "-file".to_string(),
                    spectra,
                    "-model".to_string(),
                    settings.model.clone(),
                    "-fragment_tolerance".to_string(),
                    fragment.to_string(),
                    "-pm_tolerance".to_string(),
                    precursor.to_string(),
                    "-num_solutions".to_string(),
                    parameters.number_of_solutions.to_string(),
                ];
                if let Some(models) = program.parent() {
                    run.arguments.push("-model_dir".to_string());
                    run.arguments
                        .push(models.join("Models").to_string_lossy().to_string());
                }
                let tokens = self.tokens(advocate, session, &mut run.warnings);
                if !tokens.is_empty() {
                    run.arguments.push("-PTMs".to_string());
                    run.arguments
                        .push(tokens.iter().map(|(token, _)| token).join(":"));
                }
                if settings.generate_tags {
                    run.arguments.push("-tag_length".to_string());
                    run.arguments.push(settings.tag_length.to_string());
                }
                if !settings.discard_low_quality {
                    run.arguments.push("-no_quality_filter".to_string());
                }
                if settings.correct_precursor_mass {
                    run.arguments.push("-correct_pm".to_string());
                }
                if !settings.estimate_charge {
                    run.arguments.push("-use_spectrum_charge".to_string());
                }
            }
            Advocate::DirecTag => {
                let settings = &parameters.directag;
                run.output = self.output_directory.join(format!("{stem}.tags"));
                run.arguments = [
                    ("-TagLength", settings.tag_length.to_string()),
                    ("-MaxTagCount", settings.max_tag_count.to_string()),
                    ("-MaxPeakCount", settings.max_peak_count.to_string()),
                    ("-NumIntensityClasses", settings.intensity_classes.to_string()),
                    ("-FragmentMzTolerance", fragment.to_string()),
                    ("-PrecursorMzTolerance", precursor.to_string()),
                    ("-NumChargeStates", parameters.max_charge.to_string()),
                    (
                        "-AdjustPrecursorMass",
                        settings.adjust_precursor_mass.to_string(),
                    ),
                    (
                        "-UseChargeStateFromMS",
                        settings.use_charge_state_from_spectrum.to_string(),
                    ),
                ]
                .into_iter()
                .flat_map(|(flag, value)| [flag.to_string(), value])
                .collect();
                let fixed = parameters
                    .fixed_modifications
                    .iter()
                    .filter_map(|name| session.catalog.get(name))
                    .filter(|m| m.position == ModificationPosition::Anywhere)
                    .flat_map(|m| m.targets.iter().map(|aa| format!("{aa} {}", m.mass.value)))
                    .join(" ");
                if !fixed.is_empty() {
                    run.arguments.push("-StaticMods".to_string());
                    run.arguments.push(fixed);
                }
                let dynamic = self
                    .tokens(advocate, session, &mut run.warnings)
                    .into_iter()
                    .filter_map(|(token, mass)| {
                        let mut chars = token.chars();
                        let residue = chars.next()?;
                        Some(format!("{residue} {} {mass}", chars.as_str()))
                    })
                    .collect::<Vec<_>>();
                if !dynamic.is_empty() {
                    run.arguments.push("-DynamicMods".to_string());
                    run.arguments.push(dynamic.join(" "));
                }
                run.arguments.push("-workdir".to_string());
                run.arguments
                    .push(self.output_directory.to_string_lossy().to_string());
                run.arguments.push(spectra);
            }
            Advocate::PNovo => {
                let settings = &parameters.pnovo;
                run.output = self.output_directory.join(format!("{stem}.txt"));
                let mut content = String::from("[meta]\n");
                let _ = writeln!(content, "spec_path1={spectra}");
                let _ = writeln!(content, "spec_type=MGF");
                let _ = writeln!(content, "activation_type={}", settings.activation_type);
                let _ = writeln!(content, "enzyme={}", settings.enzyme);
                let _ = writeln!(content, "frag_tol={fragment}Da");
                let _ = writeln!(content, "pep_tol={precursor}Da");
                let _ = writeln!(content, "min_mass={}", settings.min_precursor_mass.value);
                let _ = writeln!(content, "max_mass={}", settings.max_precursor_mass.value);
                let _ = writeln!(content, "out_path={}", run.output.display());
                let _ = writeln!(content, "[modification]");
                for (index, (token, mass)) in self
                    .tokens(advocate, session, &mut run.warnings)
                    .into_iter()
                    .enumerate()
                {
                    let _ = writeln!(content, "mod{}={token}={mass}", index + 1);
                }
                let file = self.output_directory.join(format!("{stem}_pnovo.param"));
                run.arguments = vec![file.to_string_lossy().to_string()];
                run.parameter_file = Some((file, content));
            }
            Advocate::Novor => {
                let settings = &parameters.novor;
                run.output = self.output_directory.join(format!("{stem}.novor.csv"));
                let names = |list: &[String]| list.join(", ");
                let content = format!(
                    "enzyme = {}\nfragmentation = {}\nmassAnalyzer = {}\nfragmentIonErrorTol = {}\nprecursorErrorTol = {}\nvariableModifications = {}\nfixedModifications = {}\n",
                    settings.enzyme,
                    settings.fragmentation,
                    settings.mass_analyzer,
                    novor_tolerance(parameters.fragment_tolerance),
                    novor_tolerance(parameters.precursor_tolerance),
                    names(&parameters.variable_modifications),
                    names(&parameters.fixed_modifications),
                );
                let file = self.output_directory.join(format!("{stem}_novor.params"));
                run.arguments = vec![
                    "-p".to_string(),
                    file.to_string_lossy().to_string(),
                    "-o".to_string(),
                    run.output.to_string_lossy().to_string(),
                    "-f".to_string(),
                    spectra,
                ];
                run.parameter_file = Some((file, content));
            }
        }
        Ok(run)
    }

    /// The tool tokens and masses for the variable modifications, unmapped modifications are
    /// reported and left out
    fn tokens(
        &self,
        advocate: Advocate,
        session: &SessionContext,
        warnings: &mut Vec<DeNovoError>,
    ) -> Vec<(String, f64)> {
        let mut output = Vec::new();
        for name in &session.parameters.variable_modifications {
            match (
                session.mapping.token_for(advocate, name),
                session.catalog.mass(name),
            ) {
                (Some(token), Some(mass)) => output.push((token.to_string(), mass.value)),
                _ => warnings.push(DeNovoError::small(
                    DeNovoErrorKind::UnmappedModification,
                    format!("{advocate} cannot search for '{name}'"),
                    format!(
                        "There is no {advocate} notation for '{name}', the search runs without this modification"
                    ),
                )),
            }
        }
        output
    }

    /// Run a single prepared tool invocation and wait for it to exit, checking for cancellation
    /// while it runs. The tool is killed when the operation is canceled.
    /// # Errors
    /// A `Canceled` error if canceled, a `ToolExecution` error if the tool could not be started,
    /// exited unsuccessfully, or did not write its result file. An `Io` error if the parameter or
    /// output file could not be created.
    pub fn run(&self, run: &ToolRun, progress: &Progress) -> Result<PathBuf, DeNovoError> {
        let tool = run
            .advocate
            .map_or_else(|| run.program.display().to_string(), |a| a.to_string());
        if let Some((path, content)) = &run.parameter_file {
            std::fs::write(path, content)
                .map_err(|e| io_error(path, "Could not write parameter file", &e))?;
        }
        let mut command = Command::new(&run.program);
        command
            .args(&run.arguments)
            .current_dir(&self.output_directory)
            .stdin(Stdio::null())
            .stderr(Stdio::piped());
        if run.stdout_is_output {
            let file = File::create(&run.output)
                .map_err(|e| io_error(&run.output, "Could not create result file", &e))?;
            command.stdout(Stdio::from(file));
        } else {
            command.stdout(Stdio::null());
        }
        info!("Starting {tool}: {} {}", run.program.display(), run.arguments.join(" "));
        let mut child = command.spawn().map_err(|e| {
            DeNovoError::new(
                DeNovoErrorKind::ToolExecution,
                format!("Could not start {tool}"),
                e.to_string(),
                file_context(&run.program),
            )
        })?;

        let stderr = child.stderr.take();
        let name = tool.clone();
        let collector = thread::spawn(move || {
            let mut lines = Vec::new();
            if let Some(stderr) = stderr {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!("{name}: {line}");
                    lines.push(line);
                }
            }
            lines
        });

        let status = loop {
            if progress.is_canceled() {
                let _killed = child.kill();
                let _status = child.wait();
                let _output = collector.join();
                info!("{tool} was stopped");
                return Err(canceled(&format!("{tool} run")));
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => {
                    let _killed = child.kill();
                    return Err(DeNovoError::small(
                        DeNovoErrorKind::ToolExecution,
                        format!("Lost track of {tool}"),
                        e.to_string(),
                    ));
                }
            }
        };
        let stderr = collector.join().unwrap_or_default();

        if !status.success() {
            let tail = stderr
                .iter()
                .rev()
                .take(5)
                .rev()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(DeNovoError::small(
                DeNovoErrorKind::ToolExecution,
                format!("{tool} failed"),
                format!("{tool} exited with {status}\n{tail}"),
            ));
        }
        if !run.output.exists() {
            return Err(DeNovoError::new(
                DeNovoErrorKind::ToolExecution,
                format!("{tool} did not write results"),
                "The tool exited successfully but the expected result file is missing",
                file_context(&run.output),
            ));
        }
        info!("{tool} finished, results in {}", run.output.display());
        Ok(run.output.clone())
    }

    /// Run all configured tools on one spectrum file, one after the other. A failing tool is
    /// reported in the warnings, the other tools still run.
    /// # Errors
    /// A `Canceled` error if the run was canceled, or an `Io` error if the output directory
    /// cannot be created.
    pub fn run_all(
        &self,
        spectrum_file: &Path,
        session: &SessionContext,
        progress: &Progress,
    ) -> Result<ToolRunOutcome, DeNovoError> {
        std::fs::create_dir_all(&self.output_directory).map_err(|e| {
            io_error(&self.output_directory, "Could not create output directory", &e)
        })?;
        let mut outcome = ToolRunOutcome::default();
        let advocates = Advocate::PRIORITY
            .into_iter()
            .filter(|a| self.executables.contains_key(a))
            .collect::<Vec<_>>();
        progress.start(advocates.len(), "Running sequencing tools");
        for advocate in advocates {
            progress.check("Sequencing")?;
            progress.set_status(format!("Running {advocate}"));
            let result = self.plan(advocate, spectrum_file, session).and_then(|run| {
                outcome.warnings.extend(run.warnings.iter().cloned());
                self.run(&run, progress)
            });
            match result {
                Ok(output) => outcome.outputs.push((advocate, output)),
                Err(error) if error.get_kind() == DeNovoErrorKind::Canceled => return Err(error),
                Err(error) => {
                    warn!("{error}");
                    outcome.warnings.push(error);
                }
            }
            progress.increment();
        }
        Ok(outcome)
    }
}

/// The tolerance in Dalton, relative tolerances are taken at 1000 m/z
fn dalton(tolerance: Tolerance) -> f64 {
    tolerance.absolute_at(mz(1000.0)).value
}

fn novor_tolerance(tolerance: Tolerance) -> String {
    match tolerance {
        Tolerance::Absolute(deviation) => format!("{}Da", deviation.value),
        Tolerance::Relative(ratio) => format!("{}ppm", ratio.get::<ppm>()),
    }
}
