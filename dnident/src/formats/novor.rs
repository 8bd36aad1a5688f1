use std::collections::HashMap;

use context_error::*;

use dncore::{
    advocate::Advocate,
    aminoacid::AminoAcid,
    error::DeNovoError,
    sequence::{ModificationMatch, Peptide},
    spectrum::SpectrumIdentifier,
};

use super::{
    ReadOutcome, ReaderContext, RecordErrors, ResultFileReader, spectrum_file, tool_version_error,
};
use crate::{
    assumption::{AssumptionData, ResultAssumption},
    common_parser::{Line, Location},
    helper_functions::end_of_enclosure,
    spectrum_match::SpectrumMatch,
};

static NUMBER_ERROR: (&str, &str) = (
    "Invalid Novor line",
    "This column is not a number but it is required to be a number in the Novor format",
);

/// Reads Novor `.novor.csv` files: comment lines starting with `#`, the last of which is the
/// column header, followed by one comma separated line per spectrum
#[derive(Clone, Copy, Debug, Default)]
pub struct NovorReader;

/// The positions of the used columns
#[derive(Debug)]
struct Columns {
    scan_number: usize,
    charge: usize,
    score: usize,
    peptide: usize,
    aa_score: Option<usize>,
}

impl Columns {
    fn from_header(line: &Line) -> Option<Self> {
        let columns = line
            .text
            .trim_start_matches('#')
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .collect::<Vec<_>>();
        let find = |name: &str| columns.iter().position(|c| c == name);
        Some(Self {
            scan_number: find("scannum")?,
            charge: find("z")?,
            score: find("score")?,
            peptide: find("peptide")?,
            aa_score: find("aascore"),
        })
    }
}

impl ResultFileReader for NovorReader {
    fn advocate(&self) -> Advocate {
        Advocate::Novor
    }

    fn recognises(&self, file_name: &str, first_line: &str) -> bool {
        file_name.ends_with(".novor.csv") && first_line.starts_with('#')
    }

    fn read(
        &self,
        lines: &[Line],
        source: &str,
        context: &ReaderContext<'_>,
    ) -> Result<ReadOutcome, DeNovoError> {
        let mut errors = RecordErrors::default();
        let mut spectra: Vec<SpectrumMatch> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut columns: Option<Columns> = None;
        let file = spectrum_file(source, ".novor.csv");

        for line in lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            if text.starts_with('#') {
                if text.to_ascii_lowercase().contains("scannum") {
                    columns = Some(Columns::from_header(line).ok_or_else(|| {
                        tool_version_error(
                            Advocate::Novor,
                            source,
                            Some(line),
                            "The header should contain the columns 'scanNum', 'z', 'score', and 'peptide'",
                        )
                    })?);
                }
                continue;
            }
            let Some(columns) = &columns else {
                return Err(tool_version_error(
                    Advocate::Novor,
                    source,
                    Some(line),
                    "A result line was found before the '# id, scanNum, ...' header",
                ));
            };
            match parse_line(line, columns, source, &file, context, &mut errors) {
                Ok((identifier, assumption)) => {
                    let position = *index.entry(identifier.title().to_string()).or_insert_with(|| {
                        spectra.push(SpectrumMatch::new(identifier));
                        spectra.len() - 1
                    });
                    spectra[position].add_assumption(assumption);
                }
                Err(error) => errors.skip(error),
            }
        }

        Ok(ReadOutcome {
            spectra,
            warnings: errors.finish(source),
        })
    }
}

fn field<'a>(fields: &[Location<'a>], index: usize, line: &Line) -> Result<Location<'a>, DeNovoError> {
    fields.get(index).cloned().ok_or_else(|| {
        line.error((
            "Invalid Novor line",
            "This line contains fewer columns than defined in the header",
        ))
    })
}

fn parse_line(
    line: &Line,
    columns: &Columns,
    source: &str,
    file: &str,
    context: &ReaderContext<'_>,
    errors: &mut RecordErrors,
) -> Result<(SpectrumIdentifier, ResultAssumption), DeNovoError> {
    let fields = line.fields(',');
    let scan_number: usize = field(&fields, columns.scan_number, line)?.parse(NUMBER_ERROR)?;
    let charge: usize = field(&fields, columns.charge, line)?
        .as_str()
        .trim()
        .trim_end_matches(".0")
        .parse()
        .map_err(|_| line.error(NUMBER_ERROR))?;
    let score: f64 = field(&fields, columns.score, line)?.parse(NUMBER_ERROR)?;
    let peptide = field(&fields, columns.peptide, line)?.trim();
    let (sequence, modifications) = parse_peptide(&peptide, context, line, errors)?;

    let mut data = AssumptionData::new(Advocate::Novor, score, 1, charge, source);
    if let Some(aa_score) = columns
        .aa_score
        .and_then(|c| fields.get(c))
        .and_then(|f| f.clone().or_empty())
    {
        let scores = aa_score
            .trim()
            .array('-')
            .map(|s| s.parse::<f64>(NUMBER_ERROR).map(|v| vec![v]))
            .collect::<Result<Vec<_>, _>>()?;
        if scores.len() != sequence.len() {
            return Err(aa_score.error((
                "Invalid Novor line",
                "The number of residue scores does not match the number of residues",
            )));
        }
        data.amino_acid_scores = Some(scores);
    }

    let title = context
        .spectra
        .and_then(|s| s.title_for_scan(file, scan_number))
        .unwrap_or_else(|| scan_number.to_string());
    Ok((
        SpectrumIdentifier::new(file, title),
        ResultAssumption::peptide(Peptide::new(sequence, modifications), data),
    ))
}

/// Residues followed by an optional `(name)`, a leading `(name)` is an N terminal modification
fn parse_peptide(
    location: &Location<'_>,
    context: &ReaderContext<'_>,
    line: &Line,
    errors: &mut RecordErrors,
) -> Result<(Vec<AminoAcid>, Vec<ModificationMatch>), DeNovoError> {
    let text = location.as_str();
    let mut residues = Vec::new();
    let mut modifications = Vec::new();
    let mut index = 0;
    while index < text.len() {
        let c = text[index..].chars().next().unwrap_or_default();
        if c == '(' {
            let end = end_of_enclosure(text, index + 1, b'(', b')').ok_or_else(|| {
                location.error(("Invalid Novor peptide", "Unclosed modification"))
            })?;
            let name = &text[index + 1..end];
            let token = residues
                .last()
                .map_or_else(|| format!("^({name})"), |aa: &AminoAcid| format!("{aa}({name})"));
            match context.mapping.resolve_or_warn(Advocate::Novor, &token) {
                Ok(canonical) => {
                    modifications.push(ModificationMatch::variable(residues.len().max(1), canonical));
                }
                Err(warning) => errors.unmapped(warning.replace_context(line.context())),
            }
            index = end + 1;
        } else {
            residues.push(AminoAcid::from_char(c).ok_or_else(|| {
                location.error(("Invalid Novor peptide", "Unknown residue"))
            })?);
            index += c.len_utf8();
        }
    }
    if residues.is_empty() {
        return Err(location.error(("Invalid Novor peptide", "The peptide is empty")));
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

    const FILE: &str = "#              ===========================================\n\
        # Novor output\n\
        # id, scanNum, RT, mz(data), z, pepMass(denovo), err(data-denovo), ppm(1e6*err/(mz*z)), score, peptide, aaScore, \n\
        1, 2, 10.5, 500.2, 2, 998.4, 0.0001, 0.1, 85.2, (Acetyl)PEPM(O)K, 80-90-85-70-60, \n\
        2, 1, 11.5, 600.3, 3.0, 1797.9, 0.0001, 0.1, 60.0, LLLK, 50-50-50-50, \n\
        3, 3, 12.5, 600.3, 3, 1797.9, 0.0001, 0.1, 60.0, LLLK, 50-50, \n";

    fn read(text: &str, spectra: Option<&dyn SpectrumProvider>) -> Result<ReadOutcome, DeNovoError> {
        let source = Arc::new("run.novor.csv".to_string());
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| Line::new(source.clone(), i, l.to_string()))
            .collect::<Vec<_>>();
        let catalog = ModificationCatalog::common();
        let mapping = ModificationMapping::default();
        let parameters = SearchParameters::default();
        NovorReader.read(
            &lines,
            "run.novor.csv",
            &ReaderContext {
                catalog: &catalog,
                mapping: &mapping,
                parameters: &parameters,
                spectra,
            },
        )
    }

    #[test]
    fn read_rows() {
        let mut spectra = InMemorySpectra::new();
        for title in ["first", "second"] {
            spectra.add("run.mgf", Spectrum::new(title, Precursor::default(), Vec::new()));
        }
        let outcome = read(FILE, Some(&spectra)).unwrap();
        assert_eq!(outcome.spectra.len(), 2);
        let first = &outcome.spectra[0];
        assert_eq!(first.identifier().title(), "second");
        let assumption = first.iter().next().unwrap();
        assert_eq!(
            assumption.sequence_string(),
            "P[Acetylation of peptide N-term]EPM[Oxidation of M]K"
        );
        assert_eq!(assumption.amino_acid_scores().unwrap().len(), 5);
        assert_eq!(outcome.spectra[1].identifier().title(), "first");
        assert_eq!(outcome.spectra[1].iter().next().unwrap().identification_charge(), 3);
        // The third line has too few residue scores
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].get_kind(), DeNovoErrorKind::Parse);
    }

    #[test]
    fn titles_fall_back_to_scan_numbers() {
        let outcome = read(FILE, None).unwrap();
        assert_eq!(outcome.spectra[0].identifier().title(), "2");
    }

    #[test]
    fn missing_header() {
        let error = read("# Novor\n1, 2, 10.5\n", None).unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::ToolVersion);
    }
}
