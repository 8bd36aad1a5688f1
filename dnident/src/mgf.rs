//! Read spectra from Mascot Generic Format files so that they can be served by an
//! [`InMemorySpectra`] provider.

use std::{io::Read, path::Path};

use mzdata::{MGFReader, prelude::*, spectrum::MultiLayerSpectrum};
use tracing::{debug, warn};

use dncore::{
    error::DeNovoError,
    spectrum::{InMemorySpectra, Peak, Precursor, Spectrum},
    system::{Time, min, mz},
};

use crate::helper_functions::{open_result_file, plain_file_name};

/// Read all spectra from a (possibly gzipped) MGF file
/// # Errors
/// If the file cannot be opened.
pub fn parse_mgf_file(path: impl AsRef<Path>) -> Result<Vec<Spectrum>, DeNovoError> {
    let path = path.as_ref();
    Ok(parse_mgf_reader(
        open_result_file(path)?,
        &path.to_string_lossy(),
    ))
}

/// Read all spectra from MGF text. Spectra without a `TITLE` are named `index=<n>` after their
/// zero based position in the file.
pub fn parse_mgf_reader(reader: impl Read, source: &str) -> Vec<Spectrum> {
    let spectra = MGFReader::new(reader)
        .enumerate()
        .map(|(index, spectrum)| convert(index, spectrum))
        .collect::<Vec<_>>();
    debug!("Read {} spectra from {source}", spectra.len());
    spectra
}

/// Read an MGF file and add all its spectra to the provider under the file name, returns the
/// number of spectra added
/// # Errors
/// See [`parse_mgf_file`].
pub fn load_mgf(
    path: impl AsRef<Path>,
    provider: &mut InMemorySpectra,
) -> Result<usize, DeNovoError> {
    let path = path.as_ref();
    let spectra = parse_mgf_file(path)?;
    let count = spectra.len();
    let file = plain_file_name(path);
    for spectrum in spectra {
        provider.add(file.clone(), spectrum);
    }
    Ok(count)
}

fn convert(index: usize, mut spectrum: MultiLayerSpectrum) -> Spectrum {
    let title = match spectrum.description().id.trim() {
        "" => format!("index={index}"),
        id => id.to_string(),
    };
    let mut precursor = Precursor::default();
    if let Some(ion) = spectrum.precursor().and_then(|p| p.ions.first()) {
        precursor.mz = mz(ion.mz());
        precursor.intensity = f64::from(ion.intensity);
        precursor.charges = ion
            .charge()
            .and_then(|c| usize::try_from(c).ok())
            .filter(|c| *c > 0)
            .into_iter()
            .collect();
    }
    let start_time = spectrum.start_time();
    if start_time > 0.0 {
        precursor.retention_time = Some(Time::new::<min>(start_time));
    }
    let peaks = match spectrum.try_build_centroids() {
        Ok(centroids) => centroids
            .iter()
            .map(|p| Peak::new(mz(p.mz), f64::from(p.intensity)))
            .collect(),
        Err(error) => {
            warn!("Spectrum '{title}' has no usable peaks: {error}");
            Vec::new()
        }
    };
    Spectrum::new(title, precursor, peaks)
}
