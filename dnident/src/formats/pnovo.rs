use context_error::*;

use dncore::{
    advocate::Advocate,
    aminoacid::AminoAcid,
    error::DeNovoError,
    modification::ModificationPosition,
    sequence::{ModificationMatch, Peptide},
    spectrum::SpectrumIdentifier,
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
    "Invalid pNovo+ line",
    "This column is not a number but it is required to be a number in the pNovo+ format",
);

/// Reads pNovo+ result `.txt` files: `S<n>` lines with the spectrum title followed by `P<rank>`
/// lines with the candidate peptides
#[derive(Clone, Copy, Debug, Default)]
pub struct PNovoReader;

fn is_spectrum_line(text: &str) -> bool {
    text.strip_prefix('S')
        .and_then(|rest| rest.split('\t').next())
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

impl ResultFileReader for PNovoReader {
    fn advocate(&self) -> Advocate {
        Advocate::PNovo
    }

    fn recognises(&self, file_name: &str, first_line: &str) -> bool {
        file_name.ends_with(".txt") && is_spectrum_line(first_line)
    }

    fn read(
        &self,
        lines: &[Line],
        source: &str,
        context: &ReaderContext<'_>,
    ) -> Result<ReadOutcome, DeNovoError> {
        let mut errors = RecordErrors::default();
        let mut spectra = Vec::new();
        let mut current: Option<(SpectrumMatch, usize)> = None; // match, charge
        let file = spectrum_file(source, ".txt");

        for line in lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            if is_spectrum_line(text) {
                if let Some((spectrum, _)) = current.take() {
                    spectra.push(spectrum);
                }
                let fields = line.fields('\t');
                let Some(title) = fields.get(1).and_then(|f| f.clone().or_empty()) else {
                    errors.skip(line.error((
                        "Invalid pNovo+ spectrum line",
                        "A spectrum line should be 'S<number>\\t<title>'",
                    )));
                    continue;
                };
                let title = title.as_str().trim();
                let charge = context
                    .spectra
                    .and_then(|s| s.spectrum(&file, title))
                    .and_then(|s| s.precursor().charges.first().copied())
                    .unwrap_or(context.parameters.min_charge);
                current = Some((
                    SpectrumMatch::new(SpectrumIdentifier::new(file.as_str(), title)),
                    charge,
                ));
            } else if text.starts_with('P') {
                let Some((spectrum, charge)) = current.as_mut() else {
                    errors.skip(line.error((
                        "Invalid pNovo+ line",
                        "A peptide line was found before any spectrum line",
                    )));
                    continue;
                };
                match parse_peptide(line, source, *charge, context, &mut errors) {
                    Ok(assumption) => spectrum.add_assumption(assumption),
                    Err(error) => errors.skip(error),
                }
            } else {
                return Err(tool_version_error(
                    Advocate::PNovo,
                    source,
                    Some(line),
                    "Every line should either be a spectrum line ('S<number>') or a peptide line ('P<rank>')",
                ));
            }
        }
        if let Some((spectrum, _)) = current.take() {
            spectra.push(spectrum);
        }
        spectra.retain(|s| !s.is_empty());

        Ok(ReadOutcome {
            spectra,
            warnings: errors.finish(source),
        })
    }
}

fn parse_peptide(
    line: &Line,
    source: &str,
    charge: usize,
    context: &ReaderContext<'_>,
    errors: &mut RecordErrors,
) -> Result<ResultAssumption, DeNovoError> {
    let fields = line.fields('\t');
    if fields.len() < 3 {
        return Err(line.error((
            "Invalid pNovo+ line",
            "A peptide line should be 'P<rank>\\t<sequence>\\t<score>'",
        )));
    }
    let rank: usize = fields[0].skip(1).parse(NUMBER_ERROR)?;
    let score: f64 = fields[2].parse(NUMBER_ERROR)?;
    let (sequence, modifications) = parse_sequence(&fields[1].trim(), context, line, errors)?;
    Ok(ResultAssumption::peptide(
        Peptide::new(sequence, modifications),
        AssumptionData::new(Advocate::PNovo, score, rank, charge, source),
    ))
}

/// Uppercase letters are plain residues, lowercase letters and digits are modified residues
/// defined in the modification mapping
fn parse_sequence(
    location: &Location<'_>,
    context: &ReaderContext<'_>,
    line: &Line,
    errors: &mut RecordErrors,
) -> Result<(Vec<AminoAcid>, Vec<ModificationMatch>), DeNovoError> {
    let mut residues = Vec::new();
    let mut modifications = Vec::new();
    for c in location.as_str().chars() {
        if c.is_ascii_uppercase() {
            residues.push(AminoAcid::from_char(c).ok_or_else(|| {
                location.error(("Invalid pNovo+ sequence", "Unknown residue"))
            })?);
            continue;
        }
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() {
            return Err(location.error((
                "Invalid pNovo+ sequence",
                "A sequence should only contain letters and digits",
            )));
        }
        let token = c.to_string();
        let name = match context.mapping.resolve_or_warn(Advocate::PNovo, &token) {
            Ok(name) => Some(name),
            Err(warning) => {
                errors.unmapped(warning.replace_context(line.context()));
                None
            }
        };
        let modification = name.and_then(|n| context.catalog.get(n));
        // The residue is implied by the letter, or by the modification for digits
        let residue = if c.is_ascii_lowercase() {
            AminoAcid::from_char(c)
        } else {
            modification.and_then(|m| match m.targets.as_slice() {
                [single] => Some(*single),
                _ => None,
            })
        };
        match (residue, modification) {
            (Some(aa), _) => {
                residues.push(aa);
                if let Some(name) = name {
                    modifications.push(ModificationMatch::variable(residues.len(), name));
                }
            }
            (None, Some(m)) if m.position == ModificationPosition::NTerminal && residues.is_empty() => {
                modifications.push(ModificationMatch::variable(1, m.name.as_str()));
            }
            (None, Some(_)) => {
                return Err(location.error((
                    "Invalid pNovo+ sequence",
                    "The modified residue could not be determined for this modification",
                )));
            }
            // Unmapped digit, the residue is unknown but the sequence is still usable
            (None, None) => residues.push(AminoAcid::Unknown),
        }
    }
    if residues.is_empty() {
        return Err(location.error(("Invalid pNovo+ sequence", "The sequence is empty")));
    }
    Ok((residues, modifications))
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
        spectrum::{InMemorySpectra, Precursor, Spectrum, SpectrumProvider},
    };

    fn read(text: &str, spectra: Option<&dyn SpectrumProvider>) -> Result<ReadOutcome, DeNovoError> {
        let source = Arc::new("run.txt".to_string());
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| Line::new(source.clone(), i, l.to_string()))
            .collect::<Vec<_>>();
        let catalog = ModificationCatalog::common();
        let mapping = ModificationMapping::default();
        let parameters = SearchParameters::default();
        PNovoReader.read(
            &lines,
            "run.txt",
            &ReaderContext {
                catalog: &catalog,
                mapping: &mapping,
                parameters: &parameters,
                spectra,
            },
        )
    }

    #[test]
    fn read_peptides() {
        let mut spectra = InMemorySpectra::new();
        spectra.add(
            "run.mgf",
            Spectrum::new(
                "scan 1",
                Precursor {
                    charges: vec![3],
                    ..Precursor::default()
                },
                Vec::new(),
            ),
        );
        let outcome = read(
            "S1\tscan 1\n\
             P1\tPEPmIDEK\t85.3\n\
             P2\t1PEPTIDEK\t80.1\n\
             S2\tscan 2\n\
             P1\tPEPTIDE\tnot a number\n",
            Some(&spectra),
        )
        .unwrap();
        assert_eq!(outcome.spectra.len(), 1);
        let spectrum = &outcome.spectra[0];
        assert_eq!(spectrum.identifier().file(), "run.mgf");
        let best = spectrum.iter().find(|a| a.rank() == 1).unwrap();
        assert_eq!(best.sequence_string(), "PEPM[Oxidation of M]IDEK");
        assert_eq!(best.identification_charge(), 3);
        let second = spectrum.iter().find(|a| a.rank() == 2).unwrap();
        assert_eq!(
            second.sequence_string(),
            "P[Acetylation of peptide N-term]EPTIDEK"
        );
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].get_kind(), DeNovoErrorKind::Parse);
    }

    #[test]
    fn unexpected_line() {
        let error = read("S1\tscan 1\nQ1\tPEPTIDE\t1.0\n", None).unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::ToolVersion);
    }
}
