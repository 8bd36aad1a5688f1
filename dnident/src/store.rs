//! The identification: all assumptions of all spectra of one results session.
//!
//! Spectra are kept in memory until the estimated size of the resident data passes the configured
//! fraction of the memory budget, then the least recently used spectra are written to the cache
//! directory and read back transparently when they are needed again. Long running operations can
//! release memory earlier with [`IdentificationStore::reduce_memory`]. The cache directory is
//! claimed with a lock file for the lifetime of the store.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};

use context_error::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dncore::{
    error::{DeNovoError, DeNovoErrorKind, file_context},
    space::{Space, display_bytes},
    spectrum::SpectrumIdentifier,
};

use crate::{
    spectrum_match::{AssumptionMap, SpectrumMatch},
    statistics::ScoreStatistics,
    task::OperationLock,
};

/// The name of the lock file in the cache directory
pub const LOCK_FILE: &str = ".lock";

/// The memory policy of the store
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// The memory budget in bytes for resident assumptions
    pub memory_budget: usize,
    /// The fraction of the budget above which spectra are written to disk. Operations that
    /// check the memory pressure themselves should do so below this fraction.
    pub eviction_fraction: f64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            memory_budget: 512 * 1024 * 1024,
            eviction_fraction: 1.0,
        }
    }
}

impl CacheSettings {
    /// The resident size above which spectra are evicted
    pub fn threshold(&self) -> usize {
        (self.memory_budget as f64 * self.eviction_fraction.clamp(0.0, 1.0)) as usize
    }

    /// The resident size eviction aims for, half the threshold
    pub fn target(&self) -> usize {
        self.threshold() / 2
    }
}

#[derive(Debug)]
enum Residence {
    Resident {
        assumptions: AssumptionMap,
        size: usize,
        /// Changed since it was last written to disk
        dirty: bool,
    },
    Spilled,
}

#[derive(Debug)]
struct Entry {
    identifier: SpectrumIdentifier,
    residence: Residence,
    /// The file this spectrum is written to when evicted
    file: PathBuf,
    /// If the file contains a copy of the data
    written: bool,
    last_used: u64,
}

/// All assumptions of one session, keyed by spectrum
#[derive(Debug)]
pub struct IdentificationStore {
    directory: PathBuf,
    settings: CacheSettings,
    order: Vec<SpectrumIdentifier>,
    entries: HashMap<SpectrumIdentifier, Entry>,
    statistics: ScoreStatistics,
    resident: usize,
    clock: u64,
    pinned: Option<SpectrumIdentifier>,
    operation: OperationLock,
    closed: bool,
}

impl IdentificationStore {
    /// Open a store in the given cache directory, the directory is created if needed
    /// # Errors
    /// A `Database` error if the directory cannot be created or is already locked by another
    /// session.
    pub fn open(directory: impl AsRef<Path>, settings: CacheSettings) -> Result<Self, DeNovoError> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)
            .map_err(|e| database_error(&directory, "Could not create the cache directory", &e))?;
        let lock = directory.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    drop(file);
                    if let Err(remove) = std::fs::remove_file(&lock) {
                        warn!("Could not remove the lock file {}: {remove}", lock.display());
                    }
                    return Err(database_error(&lock, "Could not lock the cache directory", &e));
                }
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(DeNovoError::new(
                    DeNovoErrorKind::Database,
                    "Cache directory already in use",
                    format!(
                        "Another session holds the lock file '{}', close that session or remove the lock file if no session is running",
                        lock.display()
                    ),
                    file_context(&lock),
                ));
            }
            Err(e) => return Err(database_error(&lock, "Could not lock the cache directory", &e)),
        }
        info!(
            "Opened identification cache at {} with a budget of {}",
            directory.display(),
            display_bytes(settings.memory_budget)
        );
        Ok(Self {
            directory,
            settings,
            order: Vec::new(),
            entries: HashMap::new(),
            statistics: ScoreStatistics::default(),
            resident: 0,
            clock: 0,
            pinned: None,
            operation: OperationLock::new(),
            closed: false,
        })
    }

    /// The cache directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The memory policy
    pub const fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// The lock serialising heavy operations on this identification
    pub const fn operation_lock(&self) -> &OperationLock {
        &self.operation
    }

    /// The ranges of all values added to this store
    pub const fn statistics(&self) -> &ScoreStatistics {
        &self.statistics
    }

    /// Merge new matches into the store. Existing assumptions for the same spectrum are never
    /// overwritten, lists with the same advocate and score are concatenated.
    /// # Errors
    /// If a spectrum had to be read from or written to the cache and that failed.
    pub fn add_spectrum_matches(
        &mut self,
        matches: impl IntoIterator<Item = SpectrumMatch>,
    ) -> Result<(), DeNovoError> {
        for spectrum_match in matches {
            let identifier = spectrum_match.identifier().clone();
            for assumption in spectrum_match.iter() {
                self.statistics.record(assumption);
            }
            let assumptions = spectrum_match.into_assumptions();
            if self.entries.contains_key(&identifier) {
                self.load(&identifier)?;
                let mut merged = SpectrumMatch::new(identifier.clone());
                merged.merge(self.take(&identifier));
                merged.merge(assumptions);
                self.statistics.record_spectrum(merged.len());
                self.replace(&identifier, merged.into_assumptions());
            } else {
                self.statistics.record_spectrum(
                    assumptions
                        .values()
                        .flat_map(|s| s.values().map(Vec::len))
                        .sum(),
                );
                let file = self.directory.join(format!("spectrum_{}.bin", self.order.len()));
                self.order.push(identifier.clone());
                self.entries.insert(
                    identifier.clone(),
                    Entry {
                        identifier: identifier.clone(),
                        residence: Residence::Spilled,
                        file,
                        written: false,
                        last_used: 0,
                    },
                );
                self.replace(&identifier, assumptions);
            }
            self.enforce_budget()?;
        }
        Ok(())
    }

    /// Get all assumptions for a spectrum, `None` if the spectrum is not part of this store
    /// # Errors
    /// If the spectrum was evicted and could not be read back.
    pub fn assumptions(
        &mut self,
        identifier: &SpectrumIdentifier,
    ) -> Result<Option<&AssumptionMap>, DeNovoError> {
        if !self.entries.contains_key(identifier) {
            return Ok(None);
        }
        self.load(identifier)?;
        self.enforce_budget()?;
        Ok(self.entries.get(identifier).and_then(|entry| match &entry.residence {
            Residence::Resident { assumptions, .. } => Some(assumptions),
            Residence::Spilled => None,
        }))
    }

    /// Check if there are assumptions for this spectrum
    pub fn match_exists(&self, identifier: &SpectrumIdentifier) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Replace all assumptions of a spectrum at once
    /// # Errors
    /// If making room for the new data failed.
    pub fn update_assumptions(
        &mut self,
        identifier: &SpectrumIdentifier,
        assumptions: AssumptionMap,
    ) -> Result<(), DeNovoError> {
        if self.entries.contains_key(identifier) {
            self.replace(identifier, assumptions);
            self.enforce_budget()
        } else {
            self.add_spectrum_matches([SpectrumMatch::new(identifier.clone())])?;
            self.update_assumptions(identifier, assumptions)
        }
    }

    /// All spectra in the order they were first added
    pub fn spectrum_identifiers(&self) -> &[SpectrumIdentifier] {
        &self.order
    }

    /// The spectra of one spectrum file in the order they were first added
    pub fn spectrum_identifiers_in(&self, file: &str) -> impl Iterator<Item = &SpectrumIdentifier> {
        self.order.iter().filter(move |id| id.file() == file)
    }

    /// The names of all spectrum files, in the order they were first seen
    pub fn spectrum_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for id in &self.order {
            if !files.contains(&id.file()) {
                files.push(id.file());
            }
        }
        files
    }

    /// The number of spectra with assumptions
    pub fn spectrum_count(&self) -> usize {
        self.order.len()
    }

    /// The estimated size of all assumptions held in memory
    pub const fn resident_size(&self) -> usize {
        self.resident
    }

    /// The resident size as fraction of the memory budget
    pub fn memory_pressure(&self) -> f64 {
        if self.settings.memory_budget == 0 {
            1.0
        } else {
            self.resident as f64 / self.settings.memory_budget as f64
        }
    }

    /// The number of spectra currently held in memory
    pub fn resident_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e.residence, Residence::Resident { .. }))
            .count()
    }

    /// Copy out all spectra, for readers that need a stable view while the store may change
    /// # Errors
    /// If an evicted spectrum could not be read back.
    pub fn snapshot(&mut self) -> Result<IdentificationSnapshot, DeNovoError> {
        let mut matches = HashMap::with_capacity(self.order.len());
        for identifier in self.order.clone() {
            if let Some(assumptions) = self.assumptions(&identifier)? {
                matches.insert(identifier, assumptions.clone());
            }
        }
        Ok(IdentificationSnapshot {
            order: self.order.clone(),
            matches,
        })
    }

    /// Write the least recently used spectra to disk until the resident size is below the
    /// eviction target. The spectrum used last is never evicted. Returns the number of spectra
    /// evicted.
    /// # Errors
    /// If a spectrum could not be written.
    pub fn reduce_memory(&mut self) -> Result<usize, DeNovoError> {
        let target = self.settings.target();
        if self.resident <= target {
            return Ok(0);
        }
        let mut candidates = self
            .entries
            .values()
            .filter(|e| {
                matches!(e.residence, Residence::Resident { .. })
                    && self.pinned.as_ref() != Some(&e.identifier)
            })
            .map(|e| (e.last_used, e.identifier.clone()))
            .collect::<Vec<_>>();
        candidates.sort_unstable_by_key(|(tick, _)| *tick);
        let before = self.resident;
        let mut evicted = 0;
        for (_, identifier) in candidates {
            if self.resident <= target {
                break;
            }
            self.evict(&identifier)?;
            evicted += 1;
        }
        debug!(
            "Evicted {evicted} spectra, resident {} -> {}",
            display_bytes(before),
            display_bytes(self.resident)
        );
        Ok(evicted)
    }

    /// Remove all cache files and release the lock
    /// # Errors
    /// If the lock file could not be removed.
    pub fn close(mut self) -> Result<(), DeNovoError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), DeNovoError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for entry in self.entries.values().filter(|e| e.written) {
            if let Err(e) = std::fs::remove_file(&entry.file) {
                warn!("Could not remove cache file {}: {e}", entry.file.display());
            }
        }
        let lock = self.directory.join(LOCK_FILE);
        std::fs::remove_file(&lock)
            .map_err(|e| database_error(&lock, "Could not release the cache directory", &e))?;
        info!("Closed identification cache at {}", self.directory.display());
        Ok(())
    }

    /// Make the spectrum resident, pin it, and mark it as used
    fn load(&mut self, identifier: &SpectrumIdentifier) -> Result<(), DeNovoError> {
        self.clock += 1;
        self.pinned = Some(identifier.clone());
        let entry = self.entries.get_mut(identifier).ok_or_else(|| {
            DeNovoError::small(
                DeNovoErrorKind::Database,
                "Unknown spectrum",
                format!("The spectrum {identifier} is not part of this identification"),
            )
        })?;
        entry.last_used = self.clock;
        if matches!(entry.residence, Residence::Spilled) {
            let assumptions = if entry.written {
                read_spilled(&entry.file)?
            } else {
                AssumptionMap::new()
            };
            let size = assumptions.space().total();
            self.resident += size;
            entry.residence = Residence::Resident {
                assumptions,
                size,
                dirty: false,
            };
        }
        Ok(())
    }

    /// Move the assumptions of a resident spectrum out, the entry has to be given new data with
    /// [`Self::replace`] afterwards
    fn take(&mut self, identifier: &SpectrumIdentifier) -> AssumptionMap {
        match self.entries.get_mut(identifier).map(|e| &mut e.residence) {
            Some(Residence::Resident { assumptions, .. }) => std::mem::take(assumptions),
            _ => AssumptionMap::new(),
        }
    }

    /// Replace the resident assumptions of an existing entry
    fn replace(&mut self, identifier: &SpectrumIdentifier, assumptions: AssumptionMap) {
        self.clock += 1;
        self.pinned = Some(identifier.clone());
        let Some(entry) = self.entries.get_mut(identifier) else {
            return;
        };
        entry.last_used = self.clock;
        if let Residence::Resident { size, .. } = &entry.residence {
            self.resident -= size;
        }
        let size = assumptions.space().total();
        self.resident += size;
        entry.residence = Residence::Resident {
            assumptions,
            size,
            dirty: true,
        };
    }

    fn enforce_budget(&mut self) -> Result<(), DeNovoError> {
        if self.resident > self.settings.threshold() {
            self.reduce_memory()?;
        }
        Ok(())
    }

    /// Write a spectrum to disk if needed and drop it from memory
    fn evict(&mut self, identifier: &SpectrumIdentifier) -> Result<(), DeNovoError> {
        let Some(entry) = self.entries.get_mut(identifier) else {
            return Ok(());
        };
        if let Residence::Resident {
            assumptions,
            size,
            dirty,
        } = &entry.residence
        {
            if *dirty || !entry.written {
                write_spilled(&entry.file, assumptions)?;
                entry.written = true;
            }
            self.resident -= size;
            entry.residence = Residence::Spilled;
        }
        Ok(())
    }
}

impl Drop for IdentificationStore {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            warn!("{error}");
        }
    }
}

/// A copy of all assumptions in a store at one point in time
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentificationSnapshot {
    order: Vec<SpectrumIdentifier>,
    matches: HashMap<SpectrumIdentifier, AssumptionMap>,
}

impl IdentificationSnapshot {
    /// Build a snapshot from matches directly
    pub fn from_matches(matches: impl IntoIterator<Item = SpectrumMatch>) -> Self {
        let mut output = Self::default();
        for m in matches {
            let identifier = m.identifier().clone();
            if !output.matches.contains_key(&identifier) {
                output.order.push(identifier.clone());
            }
            let mut merged = SpectrumMatch::new(identifier.clone());
            merged.merge(output.matches.remove(&identifier).unwrap_or_default());
            merged.merge(m.into_assumptions());
            output.matches.insert(identifier, merged.into_assumptions());
        }
        output
    }

    /// The assumptions for a spectrum
    pub fn assumptions(&self, identifier: &SpectrumIdentifier) -> Option<&AssumptionMap> {
        self.matches.get(identifier)
    }

    /// All spectra in the order they were first added
    pub fn spectrum_identifiers(&self) -> &[SpectrumIdentifier] {
        &self.order
    }

    /// The number of spectra
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// If there are no spectra
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn database_error(
    path: &Path,
    short_description: &'static str,
    error: &std::io::Error,
) -> DeNovoError {
    DeNovoError::new(
        DeNovoErrorKind::Database,
        short_description,
        error.to_string(),
        file_context(path),
    )
}

fn write_spilled(path: &Path, assumptions: &AssumptionMap) -> Result<(), DeNovoError> {
    let file = File::create(path)
        .map_err(|e| database_error(path, "Could not write cached spectrum", &e))?;
    let mut writer = BufWriter::new(file);
    bincode::serde::encode_into_std_write(assumptions, &mut writer, bincode::config::standard())
        .map_err(|e| {
            DeNovoError::new(
                DeNovoErrorKind::Database,
                "Could not write cached spectrum",
                e.to_string(),
                file_context(path),
            )
        })?;
    writer
        .flush()
        .map_err(|e| database_error(path, "Could not write cached spectrum", &e))
}

fn read_spilled(path: &Path) -> Result<AssumptionMap, DeNovoError> {
    let file = File::open(path)
        .map_err(|e| database_error(path, "Could not read cached spectrum", &e))?;
    bincode::serde::decode_from_std_read(&mut BufReader::new(file), bincode::config::standard())
        .map_err(|e| {
            DeNovoError::new(
                DeNovoErrorKind::Database,
                "Could not read cached spectrum",
                e.to_string(),
                file_context(path),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumption::{AssumptionData, ResultAssumption};
    use dncore::{advocate::Advocate, aminoacid::parse_sequence, sequence::Peptide};

    fn directory(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dnident_store_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        path
    }

    fn spectrum(title: &str, score: f64) -> SpectrumMatch {
        SpectrumMatch::with_assumptions(
            SpectrumIdentifier::new("run.mgf", title),
            [ResultAssumption::peptide(
                Peptide::new(parse_sequence("PEPTIDEK").unwrap(), Vec::new()),
                AssumptionData::new(Advocate::Novor, score, 1, 2, "run.novor.csv"),
            )],
        )
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = directory("lock");
        let store = IdentificationStore::open(&dir, CacheSettings::default()).unwrap();
        let pid = std::fs::read_to_string(dir.join(LOCK_FILE)).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
        let error = IdentificationStore::open(&dir, CacheSettings::default()).unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Database);
        store.close().unwrap();
        assert!(!dir.join(LOCK_FILE).exists());
        let store = IdentificationStore::open(&dir, CacheSettings::default()).unwrap();
        drop(store);
        assert!(!dir.join(LOCK_FILE).exists());
    }

    #[test]
    fn merge_never_overwrites() {
        let dir = directory("merge");
        let mut store = IdentificationStore::open(&dir, CacheSettings::default()).unwrap();
        store.add_spectrum_matches([spectrum("1", 50.0)]).unwrap();
        store
            .add_spectrum_matches([spectrum("1", 50.0), spectrum("2", 10.0)])
            .unwrap();
        let id = SpectrumIdentifier::new("run.mgf", "1");
        let map = store.assumptions(&id).unwrap().unwrap();
        assert_eq!(map[&Advocate::Novor.index()].values().map(Vec::len).sum::<usize>(), 2);
        assert_eq!(store.spectrum_count(), 2);
        assert!(store.match_exists(&id));
        assert!(!store.match_exists(&SpectrumIdentifier::new("run.mgf", "3")));
        assert_eq!(store.statistics().max_results_per_spectrum(), 2);
    }

    #[test]
    fn evicted_spectra_come_back() {
        let dir = directory("evict");
        let mut store = IdentificationStore::open(
            &dir,
            CacheSettings {
                memory_budget: 4096,
                eviction_fraction: 0.5,
            },
        )
        .unwrap();
        let matches = (0..50).map(|i| spectrum(&i.to_string(), f64::from(i)));
        store.add_spectrum_matches(matches).unwrap();
        assert!(store.resident_count() < 50);
        assert!(store.resident_size() <= store.settings().threshold());

        let mut updated = store
            .assumptions(&SpectrumIdentifier::new("run.mgf", "0"))
            .unwrap()
            .unwrap()
            .clone();
        updated.clear();
        store
            .update_assumptions(&SpectrumIdentifier::new("run.mgf", "0"), updated)
            .unwrap();
        // Touch everything else so the updated spectrum is evicted
        for i in 1..50 {
            let id = SpectrumIdentifier::new("run.mgf", i.to_string());
            let map = store.assumptions(&id).unwrap().unwrap();
            assert!(map[&Advocate::Novor.index()].contains_key(&ordered_float::OrderedFloat(f64::from(i))));
        }
        let first = store
            .assumptions(&SpectrumIdentifier::new("run.mgf", "0"))
            .unwrap()
            .unwrap();
        assert!(first.is_empty());
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.len(), 50);
        store.close().unwrap();
    }

    /// The estimated resident size of a single spectrum from [`spectrum`]
    fn single_spectrum_size() -> usize {
        let mut store =
            IdentificationStore::open(directory("measure"), CacheSettings::default()).unwrap();
        store.add_spectrum_matches([spectrum("measure", 1.0)]).unwrap();
        store.resident_size()
    }

    #[test]
    fn spectrum_in_use_survives_its_own_eviction() {
        let size = single_spectrum_size();
        let dir = directory("single");
        let mut store = IdentificationStore::open(
            &dir,
            CacheSettings {
                memory_budget: size,
                eviction_fraction: 1.0,
            },
        )
        .unwrap();
        store.add_spectrum_matches([spectrum("1", 1.0)]).unwrap();
        assert_eq!(store.resident_count(), 1);
        // Adding the second spectrum goes over budget, only the first one can make room
        store.add_spectrum_matches([spectrum("2", 2.0)]).unwrap();
        assert_eq!(store.resident_count(), 1);
        let second = SpectrumIdentifier::new("run.mgf", "2");
        let map = store.assumptions(&second).unwrap().unwrap();
        assert!(map[&Advocate::Novor.index()].contains_key(&ordered_float::OrderedFloat(2.0)));

        // Loading the first spectrum back evicts the second, never the one being read
        let first = SpectrumIdentifier::new("run.mgf", "1");
        let map = store.assumptions(&first).unwrap().unwrap();
        assert!(map[&Advocate::Novor.index()].contains_key(&ordered_float::OrderedFloat(1.0)));
        assert_eq!(store.resident_count(), 1);
        assert!(store.resident_size() > store.settings().target());
        assert_eq!(store.reduce_memory().unwrap(), 0);
        assert!(store.assumptions(&first).unwrap().is_some());
        store.close().unwrap();
    }
}
