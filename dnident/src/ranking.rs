//! Ordering of scores and spectra, every score is interpreted through its advocate.

use std::collections::HashMap;

use ordered_float::OrderedFloat;

use dncore::{advocate::Advocate, spectrum::SpectrumIdentifier};

use crate::{spectrum_match::AssumptionMap, store::IdentificationSnapshot};

/// The best of these scores for this advocate, or 0.0 if there are no scores
pub fn best_score(advocate: Advocate, scores: impl IntoIterator<Item = f64>) -> f64 {
    scores
        .into_iter()
        .reduce(|best, score| {
            if advocate.is_better(score, best) {
                score
            } else {
                best
            }
        })
        .unwrap_or(0.0)
}

/// Sort scores best first for this advocate, equal scores keep their order
pub fn sort_scores(advocate: Advocate, scores: &mut [f64]) {
    scores.sort_by(|a, b| advocate.compare_scores(*a, *b));
}

/// The first advocate in [`Advocate::PRIORITY`] with any assumption for this spectrum, together
/// with its best score
pub fn leading_advocate(assumptions: &AssumptionMap) -> Option<(Advocate, f64)> {
    Advocate::PRIORITY.iter().find_map(|advocate| {
        let scores = assumptions.get(&advocate.index())?;
        let present = scores
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(score, _)| score.0);
        let mut present = present.peekable();
        present.peek()?;
        Some((*advocate, best_score(*advocate, present)))
    })
}

/// Order the titles of one spectrum file for display: spectra with assumptions are grouped by
/// the first advocate in priority order that has an assumption and sorted best first within each
/// group by that advocate's best score. Groups follow the advocate priority. Titles without any
/// assumption follow in their original order. Titles with equal scores keep their original order.
pub fn order_titles_by_score(
    snapshot: &IdentificationSnapshot,
    file: &str,
    titles: &[String],
) -> Vec<String> {
    let mut buckets: HashMap<Advocate, Vec<(f64, &String)>> = HashMap::new();
    let mut unmatched = Vec::new();
    for title in titles {
        let identifier = SpectrumIdentifier::new(file, title.as_str());
        match snapshot
            .assumptions(&identifier)
            .and_then(leading_advocate)
        {
            Some((advocate, score)) => buckets.entry(advocate).or_default().push((score, title)),
            None => unmatched.push(title),
        }
    }

    let mut output = Vec::with_capacity(titles.len());
    for advocate in Advocate::PRIORITY {
        if let Some(mut bucket) = buckets.remove(&advocate) {
            bucket.sort_by(|a, b| advocate.compare_scores(a.0, b.0));
            output.extend(bucket.into_iter().map(|(_, title)| title.clone()));
        }
    }
    output.extend(unmatched.into_iter().cloned());
    output
}

/// The best `count` scores of one advocate that pass the threshold, best first
pub fn top_scores(
    advocate: Advocate,
    scores: impl IntoIterator<Item = OrderedFloat<f64>>,
    threshold: f64,
    greater_than: bool,
    count: usize,
) -> Vec<OrderedFloat<f64>> {
    let mut passing = scores
        .into_iter()
        .filter(|s| {
            if greater_than {
                s.0 >= threshold
            } else {
                s.0 <= threshold
            }
        })
        .collect::<Vec<_>>();
    passing.sort_by(|a, b| advocate.compare_scores(a.0, b.0));
    passing.truncate(count);
    passing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assumption::{AssumptionData, ResultAssumption},
        spectrum_match::SpectrumMatch,
    };
    use dncore::{aminoacid::parse_sequence, sequence::Peptide};

    fn spectrum(title: &str, results: &[(Advocate, f64)]) -> SpectrumMatch {
        SpectrumMatch::with_assumptions(
            SpectrumIdentifier::new("run.mgf", title),
            results.iter().map(|(advocate, score)| {
                ResultAssumption::peptide(
                    Peptide::new(parse_sequence("PEPTIDE").unwrap(), Vec::new()),
                    AssumptionData::new(*advocate, *score, 1, 2, "file"),
                )
            }),
        )
    }

    #[test]
    fn sorting_follows_advocate() {
        let mut scores = [0.3, 0.05, 0.9];
        sort_scores(Advocate::DirecTag, &mut scores);
        assert_eq!(scores, [0.05, 0.3, 0.9]);
        let mut scores = [12.0, 40.0, 5.0];
        sort_scores(Advocate::PepNovo, &mut scores);
        assert_eq!(scores, [40.0, 12.0, 5.0]);
    }

    #[test]
    fn best_of_nothing() {
        for advocate in Advocate::PRIORITY {
            assert_eq!(best_score(advocate, []), 0.0);
        }
        assert_eq!(best_score(Advocate::DirecTag, [0.5, 0.01]), 0.01);
        assert_eq!(best_score(Advocate::Novor, [50.0, 80.0]), 80.0);
    }

    #[test]
    fn titles_grouped_by_priority() {
        let snapshot = IdentificationSnapshot::from_matches([
            spectrum("novor high", &[(Advocate::Novor, 90.0)]),
            spectrum("pepnovo", &[(Advocate::PepNovo, 3.0), (Advocate::Novor, 99.0)]),
            spectrum("directag worse", &[(Advocate::DirecTag, 0.5)]),
            spectrum("novor low", &[(Advocate::Novor, 10.0)]),
            spectrum("directag better", &[(Advocate::DirecTag, 0.01), (Advocate::DirecTag, 0.9)]),
        ]);
        let titles = [
            "novor low",
            "unmatched b",
            "novor high",
            "directag worse",
            "unmatched a",
            "pepnovo",
            "directag better",
        ]
        .map(String::from);
        let ordered = order_titles_by_score(&snapshot, "run.mgf", &titles);
        assert_eq!(
            ordered,
            [
                "directag better",
                "directag worse",
                "pepnovo",
                "novor high",
                "novor low",
                "unmatched b",
                "unmatched a"
            ]
        );
        assert_eq!(order_titles_by_score(&snapshot, "run.mgf", &titles), ordered);
    }

    #[test]
    fn threshold_and_count() {
        let scores = [0.5, 0.01, 0.05, 0.2].map(OrderedFloat);
        assert_eq!(
            top_scores(Advocate::DirecTag, scores, 0.1, false, 1),
            [OrderedFloat(0.01)]
        );
        assert_eq!(
            top_scores(Advocate::PepNovo, scores, 0.1, true, 10),
            [OrderedFloat(0.5), OrderedFloat(0.2)]
        );
    }
}
