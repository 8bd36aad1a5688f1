use std::sync::LazyLock;

use context_error::*;
use regex::Regex;

use dncore::{
    advocate::Advocate,
    aminoacid::{AminoAcid, PROTON, WATER},
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
    common_parser::Line,
    spectrum_match::SpectrumMatch,
};

static NUMBER_ERROR: (&str, &str) = (
    "Invalid PepNovo+ line",
    "This column is not a number but it is required to be a number in the PepNovo+ format",
);

/// The columns every PepNovo+ solution table has to start with
const HEADER: [&str; 8] = [
    "#Index", "RnkScr", "PnvScr", "N-Gap", "C-Gap", "[M+H]", "Charge", "Sequence",
];

/// A residue optionally followed by a rounded mass shift, `^` denotes the N terminus
static RESIDUE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z^])([+-]\d+)?").unwrap());

/// The C terminal gap of a complete sequence is the mass of water and a proton, anything below
/// this tolerance after removing that is treated as no gap
const GAP_TOLERANCE: Mass = da(0.02);

/// Reads PepNovo+ `.out` files: blocks of solutions per spectrum, opened by a `>>` line
#[derive(Clone, Copy, Debug, Default)]
pub struct PepNovoReader;

impl ResultFileReader for PepNovoReader {
    fn advocate(&self) -> Advocate {
        Advocate::PepNovo
    }

    fn recognises(&self, file_name: &str, first_line: &str) -> bool {
        first_line.starts_with(">>")
            || (file_name.ends_with(".out") && first_line.starts_with("#Index"))
    }

    fn read(
        &self,
        lines: &[Line],
        source: &str,
        context: &ReaderContext<'_>,
    ) -> Result<ReadOutcome, DeNovoError> {
        let mut errors = RecordErrors::default();
        let mut spectra = Vec::new();
        let mut current: Option<SpectrumMatch> = None;
        let mut header_seen = false;

        for line in lines {
            let text = line.text.trim();
            if text.is_empty() {
                continue;
            }
            if let Some(rest) = text.strip_prefix(">>") {
                spectra.extend(current.take().filter(|m| !m.is_empty()));
                // `>> <file index> <scan index> <title>`, the title can contain spaces
                let mut parts = rest.trim().splitn(3, ' ');
                let title = match (parts.next(), parts.next(), parts.next()) {
                    (Some(_), Some(_), Some(title)) => title.trim(),
                    (Some(title), None, None) => title.trim(),
                    _ => {
                        errors.skip(line.error((
                            "Invalid PepNovo+ spectrum line",
                            "A spectrum line should be '>> <file index> <scan index> <title>'",
                        )));
                        continue;
                    }
                };
                current = Some(SpectrumMatch::new(SpectrumIdentifier::new(
                    spectrum_file(source, ".out"),
                    title,
                )));
            } else if text.starts_with("#Index") {
                let columns = text.split('\t').map(str::trim).collect::<Vec<_>>();
                if columns.len() < HEADER.len() || columns[..HEADER.len()] != HEADER {
                    return Err(tool_version_error(
                        Advocate::PepNovo,
                        source,
                        Some(line),
                        format!(
                            "The solution header should start with '{}'",
                            HEADER.join("\t")
                        ),
                    ));
                }
                header_seen = true;
            } else if text.starts_with('#') {
                // Comments such as `# Could not process spectrum...`
            } else if let Some(spectrum) = current.as_mut() {
                match parse_solution(line, source, context, &mut errors) {
                    Ok(assumption) => spectrum.add_assumption(assumption),
                    Err(error) => errors.skip(error),
                }
            } else {
                errors.skip(line.error((
                    "Invalid PepNovo+ line",
                    "A solution line was found before any spectrum line",
                )));
            }
        }
        spectra.extend(current.take().filter(|m| !m.is_empty()));

        if !header_seen && !spectra.is_empty() {
            return Err(tool_version_error(
                Advocate::PepNovo,
                source,
                None,
                "Solutions were found without a '#Index' header",
            ));
        }

        Ok(ReadOutcome {
            spectra,
            warnings: errors.finish(source),
        })
    }
}

fn parse_solution(
    line: &Line,
    source: &str,
    context: &ReaderContext<'_>,
    errors: &mut RecordErrors,
) -> Result<ResultAssumption, DeNovoError> {
    let fields = line.fields('\t');
    if fields.len() < HEADER.len() {
        return Err(line.error((
            "Invalid PepNovo+ line",
            "A solution line should contain eight tab separated columns",
        )));
    }
    let index: usize = fields[0].parse(NUMBER_ERROR)?;
    let rank_score: f64 = fields[1].parse(NUMBER_ERROR)?;
    let n_gap: f64 = fields[3].parse(NUMBER_ERROR)?;
    let c_gap: f64 = fields[4].parse(NUMBER_ERROR)?;
    let charge: usize = fields[6].parse(NUMBER_ERROR)?;
    let sequence = fields[7].trim();

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
        let is_terminal = residue.as_str() == "^";
        if !is_terminal {
            let aa = residue
                .as_str()
                .chars()
                .next()
                .and_then(AminoAcid::from_char)
                .ok_or_else(|| sequence.error(("Invalid PepNovo+ sequence", "Unknown residue")))?;
            residues.push(aa);
        }
        if let Some(shift) = captures.get(2) {
            let token = format!("{}{}", residue.as_str(), shift.as_str());
            match context.mapping.resolve_or_warn(Advocate::PepNovo, &token) {
                Ok(name) => modifications.push(ModificationMatch::variable(
                    if is_terminal { 1 } else { residues.len() },
                    name,
                )),
                Err(warning) => errors.unmapped(warning.replace_context(line.context())),
            }
        }
    }
    if covered != sequence.as_str().len() || residues.is_empty() {
        return Err(sequence.error((
            "Invalid PepNovo+ sequence",
            "The sequence should consist of residues optionally followed by a mass shift",
        )));
    }

    let mut tag = Tag::from_gapped_sequence(
        significant_gap(da(n_gap)),
        &residues,
        modifications,
        significant_gap(da(c_gap) - WATER - PROTON),
    );
    context.attach_fixed_modifications(&mut tag);
    Ok(ResultAssumption::tag(
        tag,
        AssumptionData::new(Advocate::PepNovo, rank_score, index + 1, charge, source),
    ))
}

fn significant_gap(gap: Mass) -> Mass {
    if gap < GAP_TOLERANCE {
        Mass::default()
    } else {
        gap
    }
}
