//! Coverage matrix files.
//!
//! One append-only file per coverage kind: every reporting call appends one
//! line of space-separated cell values, so each line is one run (or one
//! reporting window) and each column one coverage entity.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{runtime::CoverageKind, Result};

/// Appends matrix lines under one output directory.
#[derive(Debug)]
pub struct MatrixWriter {
    dir: PathBuf,
}

impl MatrixWriter {
    /// Creates a writer rooted at `dir`; the directory must already exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the file path of one kind's matrix.
    #[must_use]
    pub fn path(&self, kind: CoverageKind, inferred: bool) -> PathBuf {
        self.dir.join(kind.file_name(inferred))
    }

    /// Appends one line of values to the kind's matrix file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or
    /// written.
    pub fn append(&self, kind: CoverageKind, inferred: bool, values: &[u32]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(kind, inferred))?;

        let mut line = String::with_capacity(values.len() * 2);
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&value.to_string());
        }
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Returns the output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MatrixWriter::new(dir.path());

        writer.append(CoverageKind::Branch, false, &[1, 0, 1]).unwrap();
        writer.append(CoverageKind::Branch, false, &[0, 0, 1]).unwrap();
        writer.append(CoverageKind::Dua, true, &[2]).unwrap();

        let branch = std::fs::read_to_string(writer.path(CoverageKind::Branch, false)).unwrap();
        assert_eq!(branch, "1 0 1\n0 0 1\n");
        let dua = std::fs::read_to_string(writer.path(CoverageKind::Dua, true)).unwrap();
        assert_eq!(dua, "2\n");
    }
}
