//! Match theoretical fragments to the peaks of a spectrum.

use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};
use tracing::warn;

use dncore::{
    modification::ModificationCatalog,
    spectrum::{Peak, Spectrum},
    system::{MassOverCharge, Ratio},
    tolerance::Tolerance,
};
use dnident::assumption::ResultAssumption;

use crate::fragment::{Fragment, IonType, NeutralLossPolicy, generate_fragments};

/// How a fragment picks its peak when more than one peak is within the tolerance
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TieBreaker {
    /// The peak closest to the theoretical m/z
    #[default]
    MostAccurateMz,
    /// The most intense peak
    MostIntense,
}

/// The settings for annotating a spectrum
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AnnotationSettings {
    /// The ion types to annotate
    pub ion_types: Vec<IonType>,
    /// The fragment charges to annotate, limited by the charge of the assumption
    pub charges: Vec<usize>,
    /// Which neutral losses to consider
    pub neutral_losses: NeutralLossPolicy,
    /// The tolerance for matching a fragment to a peak
    pub tolerance: Tolerance,
    /// How to choose between peaks
    pub tie_breaker: TieBreaker,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            ion_types: vec![
                IonType::B,
                IonType::Y,
                IonType::Precursor,
                IonType::Immonium,
                IonType::Reporter,
            ],
            charges: vec![1, 2],
            neutral_losses: NeutralLossPolicy::default(),
            tolerance: Tolerance::default(),
            tie_breaker: TieBreaker::default(),
        }
    }
}

/// A theoretical fragment matched to a peak
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IonMatch {
    /// The matched peak
    pub peak: Peak,
    /// The fragment explaining the peak
    pub fragment: Fragment,
}

impl IonMatch {
    /// The observed minus the theoretical m/z
    pub fn mz_error(&self) -> MassOverCharge {
        self.peak.mz - self.fragment.mz
    }

    /// The error relative to the theoretical m/z
    pub fn relative_error(&self) -> Ratio {
        self.mz_error() / self.fragment.mz
    }
}

impl Display for IonMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{:.4}\t{:.4}\t{}\t{:.4}",
            self.fragment,
            self.fragment.mz.value,
            self.peak.mz.value,
            self.peak.intensity,
            self.mz_error().value
        )
    }
}

/// Annotate a spectrum with the fragments of an assumption. Every theoretical fragment is matched
/// to at most one peak, a peak can explain multiple fragments. The matches are sorted on peak m/z.
///
/// Tags are fragmented with their terminal gaps as part of the ladder, so the ions are offset by
/// the gap masses. An assumption carrying a modification that is not in the catalog cannot be
/// fragmented and gives no matches.
pub fn annotate(
    spectrum: &Spectrum,
    assumption: &ResultAssumption,
    settings: &AnnotationSettings,
    catalog: &ModificationCatalog,
) -> Vec<IonMatch> {
    let ladder = match assumption {
        ResultAssumption::Tag { tag, .. } => tag.ladder(catalog),
        ResultAssumption::Peptide { peptide, .. } => peptide.ladder(catalog),
    };
    let Some(ladder) = ladder else {
        warn!(
            "Could not annotate {} in {}: unknown modification",
            assumption.sequence_string(),
            spectrum.title()
        );
        return Vec::new();
    };
    let fragments = generate_fragments(
        &ladder,
        &settings.ion_types,
        &settings.charges,
        assumption.identification_charge(),
        settings.neutral_losses,
        catalog,
    );

    let mut matches = fragments
        .into_iter()
        .filter_map(|fragment| {
            let (low, high) = settings.tolerance.bounds(fragment.mz);
            let peak = spectrum.peaks()[spectrum.peaks_within(low, high)]
                .iter()
                .min_by(|a, b| compare_peaks(settings.tie_breaker, fragment.mz, a, b))?;
            Some(IonMatch {
                peak: *peak,
                fragment,
            })
        })
        .collect::<Vec<_>>();
    matches.sort_by(|a, b| {
        a.peak
            .mz
            .value
            .total_cmp(&b.peak.mz.value)
            .then(a.fragment.mz.value.total_cmp(&b.fragment.mz.value))
    });
    matches
}

/// Order two peaks so that the preferred one comes first
fn compare_peaks(tie_breaker: TieBreaker, mz: MassOverCharge, a: &Peak, b: &Peak) -> Ordering {
    let accuracy = (a.mz - mz).value.abs().total_cmp(&(b.mz - mz).value.abs());
    match tie_breaker {
        TieBreaker::MostAccurateMz => accuracy.then(b.intensity.total_cmp(&a.intensity)),
        TieBreaker::MostIntense => b.intensity.total_cmp(&a.intensity).then(accuracy),
    }
}

/// The fraction of the total intensity of the spectrum explained by at least one match
pub fn explained_intensity(spectrum: &Spectrum, matches: &[IonMatch]) -> f64 {
    let total = spectrum.peaks().iter().map(|p| p.intensity).sum::<f64>();
    if total == 0.0 {
        return 0.0;
    }
    let mut explained = matches.iter().map(|m| m.peak).collect::<Vec<_>>();
    explained.sort_by(|a, b| a.mz.value.total_cmp(&b.mz.value));
    explained.dedup();
    explained.iter().map(|p| p.intensity).sum::<f64>() / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use dncore::{
        advocate::Advocate,
        aminoacid::{AminoAcid, PROTON, WATER, parse_sequence},
        sequence::Peptide,
        spectrum::Precursor,
        system::{charge, mz, ppm},
    };
    use dnident::assumption::AssumptionData;

    fn b_and_y_only() -> AnnotationSettings {
        AnnotationSettings {
            ion_types: vec![IonType::B, IonType::Y],
            charges: vec![1],
            neutral_losses: NeutralLossPolicy::None,
            tolerance: Tolerance::new_absolute(0.02),
            tie_breaker: TieBreaker::MostAccurateMz,
        }
    }

    fn peptide(sequence: &str) -> ResultAssumption {
        ResultAssumption::peptide(
            Peptide::new(parse_sequence(sequence).unwrap(), Vec::new()),
            AssumptionData::new(Advocate::Novor, 80.0, 1, 1, "run.novor.csv"),
        )
    }

    #[test]
    fn tie_breakers() {
        // y1 of PEK is 147.1128
        let spectrum = Spectrum::new(
            "s",
            Precursor::default(),
            vec![Peak::new(mz(147.112), 10.0), Peak::new(mz(147.125), 100.0)],
        );
        let mut settings = b_and_y_only();
        let matches = annotate(&spectrum, &peptide("PEK"), &settings, &ModificationCatalog::common());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].fragment.to_string(), "y1");
        assert_eq!(matches[0].peak.intensity, 10.0);

        settings.tie_breaker = TieBreaker::MostIntense;
        let matches = annotate(&spectrum, &peptide("PEK"), &settings, &ModificationCatalog::common());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].peak.intensity, 100.0);
        assert!(matches[0].mz_error().value > 0.0);
    }

    #[test]
    fn precursor_charge_limits_fragments() {
        let catalog = ModificationCatalog::common();
        let assumption = peptide("PEPTIDE");
        let y6_2 = (Peptide::new(parse_sequence("EPTIDE").unwrap(), Vec::new())
            .monoisotopic_mass(&catalog)
            .unwrap()
            + PROTON * 2.0)
            / charge(2);
        let spectrum = Spectrum::new("s", Precursor::default(), vec![Peak::new(y6_2, 5.0)]);
        let mut settings = b_and_y_only();
        settings.charges = vec![1, 2];
        assert!(annotate(&spectrum, &assumption, &settings, &catalog).is_empty());

        let doubly = ResultAssumption::peptide(
            Peptide::new(parse_sequence("PEPTIDE").unwrap(), Vec::new()),
            AssumptionData::new(Advocate::Novor, 80.0, 1, 2, "run.novor.csv"),
        );
        let matches = annotate(&spectrum, &doubly, &settings, &catalog);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].fragment.to_string(), "y6++");
        assert!(matches[0].relative_error().get::<ppm>().abs() < 1.0);
        assert!((explained_intensity(&spectrum, &matches) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_modifications_give_nothing() {
        let assumption = ResultAssumption::peptide(
            Peptide::new(
                parse_sequence("PEPK").unwrap(),
                vec![dncore::sequence::ModificationMatch::variable(4, "Sparkles of K")],
            ),
            AssumptionData::new(Advocate::Novor, 80.0, 1, 1, "run.novor.csv"),
        );
        let y1 = (AminoAcid::Lysine.monoisotopic_mass() + WATER + PROTON) / charge(1);
        let spectrum = Spectrum::new("s", Precursor::default(), vec![Peak::new(y1, 1.0)]);
        assert!(
            annotate(
                &spectrum,
                &assumption,
                &b_and_y_only(),
                &ModificationCatalog::common()
            )
            .is_empty()
        );
    }

    #[test]
    fn partial_settings() {
        let settings: AnnotationSettings =
            serde_json::from_str(r#"{"charges": [1], "tie_breaker": "MostIntense"}"#).unwrap();
        assert_eq!(settings.charges, [1]);
        assert_eq!(settings.tie_breaker, TieBreaker::MostIntense);
        assert_eq!(settings.ion_types, AnnotationSettings::default().ion_types);
        assert_eq!(settings.tolerance, Tolerance::new_absolute(0.5));
    }
}
