//! Spectra and the interface to whatever provides them.

use std::{borrow::Cow, collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::{
    space::{Space, UsedSpace},
    system::{MassOverCharge, Time},
};

/// The identifier of a spectrum: the name of the file it is found in and its title within that
/// file. Immutable once created.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SpectrumIdentifier {
    file: String,
    title: String,
}

impl SpectrumIdentifier {
    /// Create a new identifier
    pub fn new(file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            title: title.into(),
        }
    }

    /// The spectrum file name
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The spectrum title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// A single string combining the file and title
    pub fn key(&self) -> String {
        format!("{}_cus_{}", self.file, self.title)
    }
}

impl Display for SpectrumIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.title)
    }
}

impl Space for SpectrumIdentifier {
    fn space(&self) -> UsedSpace {
        (self.file.space() + self.title.space()).set_total::<Self>()
    }
}

/// A single centroided peak
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Peak {
    /// The m/z
    pub mz: MassOverCharge,
    /// The intensity
    pub intensity: f64,
}

impl Peak {
    /// Create a new peak
    pub const fn new(mz: MassOverCharge, intensity: f64) -> Self {
        Self { mz, intensity }
    }
}

/// The precursor of a fragmentation spectrum
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Precursor {
    /// The m/z
    pub mz: MassOverCharge,
    /// The possible charges, empty if unknown
    pub charges: Vec<usize>,
    /// The intensity
    pub intensity: f64,
    /// The retention time
    pub retention_time: Option<Time>,
}

/// A fragmentation spectrum
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Spectrum {
    title: String,
    precursor: Precursor,
    peaks: Vec<Peak>,
}

impl Spectrum {
    /// Create a new spectrum, the peaks are sorted on m/z
    pub fn new(title: impl Into<String>, precursor: Precursor, mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by(|a, b| a.mz.value.total_cmp(&b.mz.value));
        Self {
            title: title.into(),
            precursor,
            peaks,
        }
    }

    /// The title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The precursor
    pub const fn precursor(&self) -> &Precursor {
        &self.precursor
    }

    /// The peaks sorted on m/z
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// The index of the first peak at or above `low` and the index past the last peak at or
    /// below `high`
    pub fn peaks_within(&self, low: MassOverCharge, high: MassOverCharge) -> std::ops::Range<usize> {
        let start = self.peaks.partition_point(|p| p.mz < low);
        let end = self.peaks.partition_point(|p| p.mz <= high);
        start..end.max(start)
    }

    /// The highest intensity, zero for an empty spectrum
    pub fn max_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).fold(0.0, f64::max)
    }
}

/// Something that can give spectra by file and title. Parsing of spectrum files happens behind
/// this interface.
pub trait SpectrumProvider: Send + Sync {
    /// Get a spectrum
    fn spectrum(&self, file: &str, title: &str) -> Option<Cow<'_, Spectrum>>;
    /// All titles in a file in file order, `None` if the file is not known
    fn spectrum_titles(&self, file: &str) -> Option<Cow<'_, [String]>>;
    /// The highest precursor m/z in a file
    fn max_precursor_mz(&self, file: &str) -> Option<MassOverCharge>;
    /// The highest precursor charge in a file
    fn max_charge(&self, file: &str) -> Option<usize>;
    /// The lowest retention time in a file
    fn min_rt(&self, file: &str) -> Option<Time>;
    /// The highest retention time in a file
    fn max_rt(&self, file: &str) -> Option<Time>;
    /// The highest number of peaks in a single spectrum in a file
    fn max_peak_count(&self, file: &str) -> Option<usize>;

    /// Get the title of the spectrum with the given one based scan number, used by tools that
    /// report scan numbers instead of titles
    fn title_for_scan(&self, file: &str, scan: usize) -> Option<String> {
        self.spectrum_titles(file)?
            .get(scan.checked_sub(1)?)
            .cloned()
    }
}

/// A provider holding all spectra in memory, grouped by file in insertion order
#[derive(Clone, Debug, Default)]
pub struct InMemorySpectra {
    files: BTreeMap<String, Vec<Spectrum>>,
}

impl InMemorySpectra {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spectrum to the given file
    pub fn add(&mut self, file: impl Into<String>, spectrum: Spectrum) {
        self.files.entry(file.into()).or_default().push(spectrum);
    }

    /// The names of all files
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    fn stat<T>(
        &self,
        file: &str,
        value: impl Fn(&Spectrum) -> Option<T>,
        pick: impl Fn(T, T) -> T,
    ) -> Option<T> {
        self.files
            .get(file)?
            .iter()
            .filter_map(value)
            .reduce(pick)
    }
}

impl SpectrumProvider for InMemorySpectra {
    fn spectrum(&self, file: &str, title: &str) -> Option<Cow<'_, Spectrum>> {
        self.files
            .get(file)?
            .iter()
            .find(|s| s.title == title)
            .map(Cow::Borrowed)
    }

    fn spectrum_titles(&self, file: &str) -> Option<Cow<'_, [String]>> {
        self.files
            .get(file)
            .map(|spectra| Cow::Owned(spectra.iter().map(|s| s.title.clone()).collect()))
    }

    fn max_precursor_mz(&self, file: &str) -> Option<MassOverCharge> {
        self.stat(file, |s| Some(s.precursor.mz), |a, b| if b > a { b } else { a })
    }

    fn max_charge(&self, file: &str) -> Option<usize> {
        self.stat(file, |s| s.precursor.charges.iter().copied().max(), usize::max)
    }

    fn min_rt(&self, file: &str) -> Option<Time> {
        self.stat(file, |s| s.precursor.retention_time, |a, b| if b < a { b } else { a })
    }

    fn max_rt(&self, file: &str) -> Option<Time> {
        self.stat(file, |s| s.precursor.retention_time, |a, b| if b > a { b } else { a })
    }

    fn max_peak_count(&self, file: &str) -> Option<usize> {
        self.stat(file, |s| Some(s.peaks.len()), usize::max)
    }
}
