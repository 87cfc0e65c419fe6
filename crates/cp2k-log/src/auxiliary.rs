//! Readers for files the log refers to: MD energy tables and XYZ trajectories.

use crate::error::AuxError;
use crate::value::parse_float;
use std::fs;
use std::path::Path;

/// A rectangular table of floats.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    pub rows: Vec<Vec<f64>>,
}

impl NumericTable {
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Values of one column, or `None` if any row is too short.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        self.rows.iter().map(|row| row.get(index).copied()).collect()
    }
}

/// One frame of an XYZ trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct XyzFrame {
    pub comment: String,
    pub labels: Vec<String>,
    pub positions: Vec<[f64; 3]>,
}

/// Reads and parses a numeric table such as an MD `.ener` file.
///
/// # Errors
///
/// [`AuxError::Io`] when the file cannot be read, [`AuxError::Malformed`]
/// for non-numeric fields or ragged rows.
pub fn read_numeric_table(path: &Path) -> Result<NumericTable, AuxError> {
    let text = read(path)?;
    parse_numeric_table(&text, path)
}

/// Whitespace or comma separated rows. Blank lines and `#` comments are
/// skipped; every row must be as wide as the first.
pub fn parse_numeric_table(text: &str, path: &Path) -> Result<NumericTable, AuxError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| {
                parse_float(t)
                    .ok_or_else(|| malformed(path, n + 1, format!("`{t}` is not a number")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(first) = rows.first()
            && first.len() != row.len()
        {
            return Err(malformed(
                path,
                n + 1,
                format!("expected {} columns, found {}", first.len(), row.len()),
            ));
        }
        rows.push(row);
    }
    Ok(NumericTable { rows })
}

/// Reads every frame of an XYZ trajectory.
pub fn read_xyz(path: &Path) -> Result<Vec<XyzFrame>, AuxError> {
    let text = read(path)?;
    parse_xyz(&text, path)
}

/// Concatenated XYZ frames: an atom count, a comment line, then one
/// `label x y z` line per atom.
pub fn parse_xyz(text: &str, path: &Path) -> Result<Vec<XyzFrame>, AuxError> {
    let mut frames = Vec::new();
    let mut lines = text.lines().enumerate();
    while let Some((n, line)) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let count: usize = line.parse().map_err(|_| {
            malformed(path, n + 1, format!("expected an atom count, found `{line}`"))
        })?;
        let comment = lines
            .next()
            .map(|(_, c)| c.trim().to_string())
            .ok_or_else(|| malformed(path, n + 2, "missing comment line".to_string()))?;

        // The count is untrusted; grow as atom lines arrive.
        let mut labels = Vec::new();
        let mut positions = Vec::new();
        for _ in 0..count {
            let Some((m, atom)) = lines.next() else {
                return Err(malformed(
                    path,
                    n + 3 + labels.len(),
                    format!("frame ends after {} of {count} atoms", labels.len()),
                ));
            };
            let mut parts = atom.split_whitespace();
            let label = parts.next().unwrap_or_default();
            let coords: Vec<f64> = parts.take(3).filter_map(parse_float).collect();
            let &[x, y, z] = coords.as_slice() else {
                return Err(malformed(path, m + 1, format!("bad atom line `{}`", atom.trim())));
            };
            labels.push(label.to_string());
            positions.push([x, y, z]);
        }
        frames.push(XyzFrame {
            comment,
            labels,
            positions,
        });
    }
    Ok(frames)
}

fn read(path: &Path) -> Result<String, AuxError> {
    fs::read_to_string(path).map_err(|source| AuxError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn malformed(path: &Path, line: usize, message: String) -> AuxError {
    AuxError::Malformed {
        path: path.to_path_buf(),
        line,
        message,
    }
}
