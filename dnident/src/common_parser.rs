//! Track the location of pieces of text while parsing result files, so that errors can point at
//! the exact line and field that could not be understood.

use std::{ops::Range, str::FromStr, sync::Arc};

use context_error::*;
use dncore::error::{DeNovoError, DeNovoErrorKind};

/// A single line of a result file
#[derive(Clone, Debug)]
pub(crate) struct Line {
    pub(crate) source: Arc<String>,
    pub(crate) line_index: usize,
    pub(crate) text: String,
}

impl Line {
    pub(crate) fn new(source: Arc<String>, line_index: usize, text: String) -> Self {
        Self {
            source,
            line_index,
            text,
        }
    }

    /// The whole line as a location
    pub(crate) fn full(&self) -> Location<'_> {
        Location {
            line: self,
            range: 0..self.text.len(),
        }
    }

    /// Split the line on the separator, keeping track of the ranges
    pub(crate) fn fields(&self, separator: char) -> Vec<Location<'_>> {
        self.full().array(separator).collect()
    }

    pub(crate) fn context(&self) -> Context<'static> {
        Context::full_line(self.line_index as u32, self.text.as_str())
            .source(self.source.as_str())
            .to_owned()
    }

    /// A parse error for the whole line
    pub(crate) fn error(&self, base_error: (&str, &str)) -> DeNovoError {
        DeNovoError::new(
            DeNovoErrorKind::Parse,
            base_error.0.to_string(),
            base_error.1.to_string(),
            self.context(),
        )
    }
}

/// A piece of a line
#[derive(Clone, Debug)]
pub(crate) struct Location<'a> {
    pub(crate) line: &'a Line,
    pub(crate) range: Range<usize>,
}

impl<'a> Location<'a> {
    pub(crate) fn as_str(&self) -> &'a str {
        &self.line.text[self.range.clone()]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }

    /// Split on the separator, every part keeps its own range in the line
    pub(crate) fn array(self, separator: char) -> std::vec::IntoIter<Self> {
        let mut offset = self.range.start;
        let mut output = Vec::new();
        for part in self.as_str().split(separator) {
            output.push(Location {
                line: self.line,
                range: offset..offset + part.len(),
            });
            offset += part.len() + separator.len_utf8();
        }
        output.into_iter()
    }

    pub(crate) fn trim(&self) -> Self {
        let text = self.as_str();
        let start = text.len() - text.trim_start().len();
        let end = text.len() - text.trim_end().len();
        Self {
            line: self.line,
            range: if start == text.len() {
                self.range.start..self.range.start
            } else {
                self.range.start + start..self.range.end - end
            },
        }
    }

    /// Skip the given number of bytes from the start
    pub(crate) fn skip(&self, bytes: usize) -> Self {
        Self {
            line: self.line,
            range: (self.range.start + bytes).min(self.range.end)..self.range.end,
        }
    }

    /// `None` if this location is empty or only a dash
    pub(crate) fn or_empty(self) -> Option<Self> {
        let text = self.as_str().trim();
        if text.is_empty() || text == "-" {
            None
        } else {
            Some(self)
        }
    }

    pub(crate) fn context(&self) -> Context<'static> {
        Context::line_range(
            Some(self.line.line_index as u32),
            self.line.text.as_str(),
            self.range.clone(),
        )
        .source(self.line.source.as_str())
        .to_owned()
    }

    /// An error pointing at this location
    pub(crate) fn error(&self, base_error: (&str, &str)) -> DeNovoError {
        DeNovoError::new(
            DeNovoErrorKind::Parse,
            base_error.0.to_string(),
            format!("{} (found '{}')", base_error.1, self.as_str().trim()),
            self.context(),
        )
    }

    /// # Errors
    /// If the text could not be parsed as `T`.
    pub(crate) fn parse<T: FromStr>(&self, base_error: (&str, &str)) -> Result<T, DeNovoError> {
        self.as_str()
            .trim()
            .parse()
            .map_err(|_| self.error(base_error))
    }
}

/// Read all lines from a reader, line endings are removed
/// # Errors
/// If the reader fails.
pub(crate) fn read_lines(
    reader: impl std::io::BufRead,
    source: &Arc<String>,
) -> Result<Vec<Line>, DeNovoError> {
    reader
        .lines()
        .enumerate()
        .map(|(index, line)| {
            line.map(|text| {
                Line::new(
                    source.clone(),
                    index,
                    text.trim_end_matches('\r').to_string(),
                )
            })
            .map_err(|e| {
                DeNovoError::new(
                    DeNovoErrorKind::Io,
                    "Could not read line",
                    e.to_string(),
                    Context::none()
                        .source(source.as_str())
                        .line_index(index as u32)
                        .to_owned(),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_ranges() {
        let line = Line::new(Arc::new("test".to_string()), 3, "a, 12.5 ,x".to_string());
        let fields = line.fields(',');
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].parse::<f64>(("", "")).unwrap(), 12.5);
        assert_eq!(fields[1].trim().as_str(), "12.5");
        let error = fields[2].parse::<f64>(("Invalid line", "Not a number")).unwrap_err();
        assert_eq!(error.get_kind(), DeNovoErrorKind::Parse);
        assert!(error.to_string().contains("a, 12.5 ,x"));
        assert!(error.get_long_description().contains("'x'"));
    }

    #[test]
    fn empty_values() {
        let line = Line::new(Arc::new("test".to_string()), 0, "-\t \tv".to_string());
        let fields = line.fields('\t');
        assert!(fields[0].clone().or_empty().is_none());
        assert!(fields[1].clone().or_empty().is_none());
        assert_eq!(fields[2].clone().or_empty().unwrap().as_str(), "v");
    }
}
