//! Row-indexed tables of configurations in experimental representation.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{MfResult, SearchSpaceError};
use crate::parameter::ParameterValue;
use crate::validation_error;

/// An ordered table of configurations.
///
/// Each row carries an index label. Two frames produced for the same batch
/// share labels so they can be joined column-wise with [`Frame::hconcat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    index: Vec<usize>,
    rows: Vec<Vec<ParameterValue>>,
}

impl Frame {
    /// An empty frame with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            index: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a frame from rows, labelled `0..rows.len()`.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<ParameterValue>>) -> MfResult<Self> {
        let mut frame = Self::new(columns);
        for (i, row) in rows.into_iter().enumerate() {
            frame.push_row(i, row)?;
        }
        Ok(frame)
    }

    /// Build a frame of floats from a numeric matrix.
    pub fn from_matrix(columns: Vec<String>, values: ArrayView2<'_, f64>) -> MfResult<Self> {
        let rows = values
            .rows()
            .into_iter()
            .map(|r| r.iter().copied().map(ParameterValue::Float).collect())
            .collect();
        Self::from_rows(columns, rows)
    }

    pub fn push_row(&mut self, label: usize, row: Vec<ParameterValue>) -> MfResult<()> {
        if row.len() != self.columns.len() {
            return Err(SearchSpaceError::DimensionMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            }
            .into());
        }
        self.index.push(label);
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<ParameterValue>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> Option<&[ParameterValue]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&ParameterValue>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[pos]).collect())
    }

    /// Replace the row labels.
    pub fn with_index(mut self, index: Vec<usize>) -> MfResult<Self> {
        if index.len() != self.rows.len() {
            return Err(validation_error!(
                "index of length {} does not match {} rows",
                index.len(),
                self.rows.len()
            ));
        }
        self.index = index;
        Ok(self)
    }

    /// Relabel rows as `0..len`.
    pub fn reset_index(self) -> Self {
        let n = self.rows.len();
        Self {
            index: (0..n).collect(),
            ..self
        }
    }

    /// Join two frames column-wise, matching rows by label.
    pub fn hconcat(&self, other: &Frame) -> MfResult<Frame> {
        if let Some(dup) = other.columns.iter().find(|c| self.columns.contains(c)) {
            return Err(validation_error!("duplicate column {dup}"));
        }
        if self.len() != other.len() {
            return Err(validation_error!(
                "cannot join frames of {} and {} rows",
                self.len(),
                other.len()
            ));
        }

        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        let mut joined = Frame::new(columns);
        for (label, left) in self.index.iter().zip(&self.rows) {
            let pos = other
                .index
                .iter()
                .position(|l| l == label)
                .ok_or_else(|| validation_error!("row label {label} missing"))?;
            let mut row = left.clone();
            row.extend(other.rows[pos].iter().cloned());
            joined.push_row(*label, row)?;
        }
        Ok(joined)
    }

    /// Whether any cell holds a missing value.
    pub fn has_missing(&self) -> bool {
        self.rows.iter().flatten().any(ParameterValue::is_missing)
    }

    /// Rows as name → value maps.
    pub fn records(&self) -> Vec<HashMap<String, ParameterValue>> {
        self.rows
            .iter()
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }
}
