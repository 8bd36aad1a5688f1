use std::sync::LazyLock;

use context_error::*;
use regex::Regex;

use dncore::{
    advocate::Advocate,
    aminoacid::{AminoAcid, WATER},
    error::DeNovoError,
    sequence::{ModificationMatch, Tag},
    spectrum::SpectrumIdentifier,
    system::{Mass, da},
};

use super::{
    ReadOutcome, ReaderContext, RecordErrors, ResultFileReader, spectrum_file, tool_version_error,
};
use crate::{
    assumption::{AssumptionData, ResultAssumption},
    common_parser::{Line, Location},
    spectrum_match::SpectrumMatch,
};

static NUMBER_ERROR: (&str, &str) = (
    "Invalid DirecTag line",
    "This column is not a number but it is required to be a number in the DirecTag format",
);

/// A residue optionally followed by a modification symbol
static RESIDUE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z])([^A-Za-z])?").unwrap());

/// Gaps below this are rounding noise
const GAP_TOLERANCE: Mass = da(0.02);

/// Reads DirecTag `.tags` files: `H` header lines defining the columns, followed by `S` spectrum
/// lines each followed by their `T` tag lines
#[derive(Clone, Copy, Debug, Default)]
pub struct DirecTagReader;

/// The columns of the spectrum lines
#[derive(Debug)]
struct SpectrumColumns {
    index: usize,
    native_id: Option<usize>,
    charge: usize,
}

/// The columns of the tag lines
#[derive(Debug)]
struct TagColumns {
    sequence: usize,
    n_terminal_mass: usize,
    c_terminal_mass: usize,
    total_score: usize,
}

fn column(columns: &[&str], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.eq_ignore_ascii_case(name))
}

impl ResultFileReader for DirecTagReader {
    fn advocate(&self) -> Advocate {
        Advocate::DirecTag
    }

    fn recognises(&self, file_name: &str, first_line: &str) -> bool {
        first_line.contains("DirecTag")
            || (file_name.ends_with(".tags") && first_line.starts_with('H'))
    }

    fn read(
        &self,
        lines: &[Line],
        source: &str,
        context: &ReaderContext<'_>,
    ) -> Result<ReadOutcome, DeNovoError> {
        let mut errors = RecordErrors::default();
        let mut spectra = Vec::new();
        let mut spectrum_columns: Option<SpectrumColumns> = None;
        let mut tag_columns: Option<TagColumns> = None;
        let mut current: Option<(SpectrumMatch, usize, usize)> = None; // match, charge, rank
        let file = spectrum_file(source, ".tags");

        for line in lines {
            let fields = line.fields('\t');
            let Some(kind) = fields.first().map(|f| f.as_str().trim()) else {
                continue;
            };
            match kind {
                "H(S)" => {
                    let columns = fields.iter().map(|f| f.as_str().trim()).collect::<Vec<_>>();
                    spectrum_columns = match (
                        column(&columns, "Index"),
                        column(&columns, "ChargeState"),
                    ) {
                        (Some(index), Some(charge)) => Some(SpectrumColumns {
                            index,
                            native_id: column(&columns, "NativeID"),
                            charge,
                        }),
                        _ => {
                            return Err(tool_version_error(
                                Advocate::DirecTag,
                                source,
                                Some(line),
                                "The spectrum header should contain the columns 'Index' and 'ChargeState'",
                            ));
                        }
                    };
                }
                "H(T)" => {
                    let columns = fields.iter().map(|f| f.as_str().trim()).collect::<Vec<_>>();
                    tag_columns = match (
                        column(&columns, "Sequence"),
                        column(&columns, "NTerminalMass"),
                        column(&columns, "CTerminalMass"),
                        column(&columns, "TotalScore"),
                    ) {
                        (Some(sequence), Some(n), Some(c), Some(score)) => Some(TagColumns {
                            sequence,
                            n_terminal_mass: n,
                            c_terminal_mass: c,
                            total_score: score,
                        }),
                        _ => {
                            return Err(tool_version_error(
                                Advocate::DirecTag,
                                source,
                                Some(line),
                                "The tag header should contain the columns 'Sequence', 'NTerminalMass', 'CTerminalMass', and 'TotalScore'",
                            ));
                        }
                    };
                }
                "S" => {
                    let Some(columns) = &spectrum_columns else {
                        return Err(tool_version_error(
                            Advocate::DirecTag,
                            source,
                            Some(line),
                            "A spectrum line was found before the 'H(S)' header",
                        ));
                    };
                    if let Some((spectrum, ..)) = current.take() {
                        spectra.push(spectrum);
                    }
                    match parse_spectrum(&fields, columns, line, &file, context) {
                        Ok((identifier, charge)) => {
                            current = Some((SpectrumMatch::new(identifier), charge, 0));
                        }
                        Err(error) => errors.skip(error),
                    }
                }
                "T" => {
                    let Some(columns) = &tag_columns else {
                        return Err(tool_version_error(
                            Advocate::DirecTag,
                            source,
                            Some(line),
                            "A tag line was found before the 'H(T)' header",
                        ));
                    };
                    let Some((spectrum, charge, rank)) = current.as_mut() else {
                        errors.skip(line.error((
                            "Invalid DirecTag line",
                            "A tag line was found outside of a spectrum",
                        )));
                        continue;
                    };
                    *rank += 1;
                    match parse_tag(&fields, columns, line, source, *charge, *rank, context, &mut errors) {
                        Ok(assumption) => spectrum.add_assumption(assumption),
                        Err(error) => errors.skip(error),
                    }
                }
                _ => (), // Other header lines and empty lines
            }
        }
        if let Some((spectrum, ..)) = current.take() {
            spectra.push(spectrum);
        }
        spectra.retain(|s| !s.is_empty());

        Ok(ReadOutcome {
            spectra,
            warnings: errors.finish(source),
        })
    }
}

fn field<'a>(fields: &[Location<'a>], index: usize, line: &Line) -> Result<Location<'a>, DeNovoError> {
    fields.get(index).cloned().ok_or_else(|| {
        line.error((
            "Invalid DirecTag line",
            "This line contains fewer columns than defined in the header",
        ))
    })
}

fn parse_spectrum(
    fields: &[Location<'_>],
    columns: &SpectrumColumns,
    line: &Line,
    file: &str,
    context: &ReaderContext<'_>,
) -> Result<(SpectrumIdentifier, usize), DeNovoError> {
    let index: usize = field(fields, columns.index, line)?.parse(NUMBER_ERROR)?;
    let charge: usize = field(fields, columns.charge, line)?.parse(NUMBER_ERROR)?;
    let title = context
        .spectra
        .and_then(|s| s.title_for_scan(file, index + 1))
        .or_else(|| {
            columns
                .native_id
                .and_then(|c| fields.get(c))
                .and_then(|f| f.clone().or_empty())
                .map(|f| f.as_str().trim().to_string())
        })
        .unwrap_or_else(|| index.to_string());
    Ok((SpectrumIdentifier::new(file, title), charge))
}

#[expect(clippy::too_many_arguments)]
fn parse_tag(
    fields: &[Location<'_>],
    columns: &TagColumns,
    line: &Line,
    source: &str,
    charge: usize,
    rank: usize,
    context: &ReaderContext<'_>,
    errors: &mut RecordErrors,
) -> Result<ResultAssumption, DeNovoError> {
    let sequence = field(fields, columns.sequence, line)?.trim();
    let n_terminal_mass: f64 = field(fields, columns.n_terminal_mass, line)?.parse(NUMBER_ERROR)?;
    let c_terminal_mass: f64 = field(fields, columns.c_terminal_mass, line)?.parse(NUMBER_ERROR)?;
    let score: f64 = field(fields, columns.total_score, line)?.parse(NUMBER_ERROR)?;

    let mut residues = Vec::new();
    let mut modifications = Vec::new();
    let mut covered = 0;
    for captures in RESIDUE_REGEX.captures_iter(sequence.as_str()) {
        let (Some(whole), Some(residue)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() != covered {
            break;
        }
        covered = whole.end();
        let aa = residue
            .as_str()
            .chars()
            .next()
            .and_then(AminoAcid::from_char)
            .ok_or_else(|| sequence.error(("Invalid DirecTag tag", "Unknown residue")))?;
        residues.push(aa);
        if let Some(symbol) = captures.get(2) {
            let token = format!("{}{}", residue.as_str(), symbol.as_str());
            match context.mapping.resolve_or_warn(Advocate::DirecTag, &token) {
                Ok(name) => modifications.push(ModificationMatch::variable(residues.len(), name)),
                Err(warning) => errors.unmapped(warning.replace_context(line.context())),
            }
        }
    }
    if covered != sequence.as_str().len() || residues.is_empty() {
        return Err(sequence.error((
            "Invalid DirecTag tag",
            "A tag should consist of residues optionally followed by a modification symbol",
        )));
    }

    let gap = |mass: Mass| if mass < GAP_TOLERANCE { Mass::default() } else { mass };
    let mut tag = Tag::from_gapped_sequence(
        gap(da(n_terminal_mass)),
        &residues,
        modifications,
        gap(da(c_terminal_mass) - WATER),
    );
    context.attach_fixed_modifications(&mut tag);
    Ok(ResultAssumption::tag(
        tag,
        AssumptionData::new(Advocate::DirecTag, score, rank, charge, source),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::modification_mapping::ModificationMapping;
    use dncore::{
        error::DeNovoErrorKind,
        modification::ModificationCatalog,
        parameters::SearchParameters,
        spectrum::{InMemorySpectra, Precursor, Spectrum},
    };

    const FILE: &str = "H\tDirecTag 1.4.94\n\
        H(S)\tIndex\tNativeID\tChargeState\tTotalIonCurrent\n\
        H(T)\tSequence\tNTerminalMass\tCTerminalMass\tTotalScore\n\
        S\t0\tindex=0\t2\t1000\n\
        T\tPEM*K\t120.5\t318.2\t0.01\n\
        T\tPEPK\t120.5\t318.2\t0.5\n\
        S\t1\tindex=1\t3\t1000\n\
        T\tWW%\t0.0\t18.0106\t0.2\n";

    fn read(text: &str, spectra: Option<&InMemorySpectra>) -> Result<ReadOutcome, DeNovoError> {
        let source = Arc::new("run.tags".to_string());
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| Line::new(source.clone(), i, l.to_string()))
            .collect::<Vec<_>>();
        let catalog = ModificationCatalog::common();
        let mapping = ModificationMapping::default();
        let parameters = SearchParameters::default();
        DirecTagReader.read(
            &lines,
            "run.tags",
            &ReaderContext {
                catalog: &catalog,
                mapping: &mapping,
                parameters: &parameters,
                spectra: spectra.map(|s| s as &dyn dncore::spectrum::SpectrumProvider),
            },
        )
    }

    #[test]
    fn read_tags() {
        let outcome = read(FILE, None).unwrap();
        assert_eq!(outcome.spectra.len(), 2);
        let first = &outcome.spectra[0];
        assert_eq!(first.identifier().file(), "run.mgf");
        assert_eq!(first.identifier().title(), "index=0");
        let assumptions = first.iter().collect::<Vec<_>>();
        assert_eq!(assumptions.len(), 2);
        assert_eq!(assumptions[0].score(), 0.01);
        assert_eq!(assumptions[0].rank(), 1);
        assert_eq!(assumptions[0].identification_charge(), 2);
        assert_eq!(
            assumptions[0].sequence_string(),
            "<120.500>PEM[Oxidation of M]K<300.189>"
        );
        assert_eq!(outcome.spectra[1].len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(
            outcome.warnings[0].get_kind(),
            DeNovoErrorKind::UnmappedModification
        );
    }

    #[test]
    fn titles_from_provider() {
        let mut spectra = InMemorySpectra::new();
        for title in ["first spectrum", "second spectrum"] {
            spectra.add("run.mgf", Spectrum::new(title, Precursor::default(), Vec::new()));
        }
        let outcome = read(FILE, Some(&spectra)).unwrap();
        assert_eq!(outcome.spectra[1].identifier().title(), "second spectrum");
    }

    #[test]
    fn missing_header() {
        let error = read("H\tDirecTag\nS\t0\tindex=0\t2\t1000\n", None).unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::ToolVersion);
    }
}
