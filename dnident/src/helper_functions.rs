use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use flate2::bufread::GzDecoder;

use dncore::error::{DeNovoError, io_error};

/// Check if the file has the given extension, ignoring case
pub(crate) fn check_extension(filename: impl AsRef<Path>, extension: impl AsRef<Path>) -> bool {
    filename
        .as_ref()
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension.as_ref()))
}

/// The file name without any directories and without a trailing `.gz`, lowercase
pub(crate) fn plain_file_name(path: impl AsRef<Path>) -> String {
    let name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.strip_suffix(".gz").map_or(name.clone(), str::to_string)
}

/// Open a file for reading, transparently decompressing gzipped files
/// # Errors
/// If the file could not be opened.
pub(crate) fn open_result_file(path: &Path) -> Result<Box<dyn BufRead + Send>, DeNovoError> {
    let file = File::open(path).map_err(|e| io_error(path, "Could not open file", &e))?;
    if check_extension(path, "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(BufReader::new(
            file,
        )))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Find the enclosed text by the given symbols, assumes a single open is already read just before
/// the start. Returns the index of the closing symbol.
pub(crate) fn end_of_enclosure(text: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let mut state = 1;
    for (i, ch) in text.as_bytes().get(start..)?.iter().enumerate() {
        if text.is_char_boundary(start + i) && text.is_char_boundary(start + i + 1) {
            if *ch == open {
                state += 1;
            } else if *ch == close {
                state -= 1;
                if state == 0 {
                    return Some(start + i);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(plain_file_name("/data/Run1.MGF.out.gz"), "run1.mgf.out");
        assert_eq!(plain_file_name("run.tags"), "run.tags");
        assert!(check_extension("a.TAGS", "tags"));
    }

    #[test]
    fn enclosure() {
        assert_eq!(end_of_enclosure("M(O)K", 2, b'(', b')'), Some(3));
        assert_eq!(end_of_enclosure("M(a(b))K", 2, b'(', b')'), Some(6));
        assert_eq!(end_of_enclosure("M(O", 2, b'(', b')'), None);
    }
}
