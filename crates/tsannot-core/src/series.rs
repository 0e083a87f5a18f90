//! Series buffer
//!
//! A [`Series`] is one or more named `f64` columns of equal length N sharing
//! one strictly increasing integer index. Storage is reference counted and
//! never mutated: [`Series::slice`] returns a view over the same storage,
//! derived constructors such as [`Series::standardized`] allocate new
//! storage.
//!
//! Every position an annotator reports (breakpoints, labels, scores) is
//! relative to the view it was given; [`Series::index_at`] maps a view
//! position back to the external index.

use crate::{Error, Result};
use std::sync::Arc;

#[derive(Debug)]
struct SeriesData {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: Option<Vec<i64>>,
}

/// Immutable, cheaply clonable multivariate time series view
#[derive(Clone, Debug)]
pub struct Series {
    data: Arc<SeriesData>,
    start: usize,
    end: usize,
}

impl Series {
    /// Build a single-column series named `"x"`
    pub fn univariate(values: Vec<f64>) -> Result<Self> {
        Self::wrap(vec![("x".to_string(), values)], None)
    }

    /// Build a series from unnamed columns (`"x0"`, `"x1"`, ...)
    pub fn multivariate(columns: Vec<Vec<f64>>) -> Result<Self> {
        let named = columns
            .into_iter()
            .enumerate()
            .map(|(i, c)| (format!("x{i}"), c))
            .collect();
        Self::wrap(named, None)
    }

    /// Build a series from row-major data, one inner vector per time step
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let first = rows.first().ok_or_else(|| Error::empty_input("rows"))?;
        let d = first.len();
        if d == 0 {
            return Err(Error::Shape("rows have no columns".to_string()));
        }
        let mut columns = vec![Vec::with_capacity(rows.len()); d];
        for (t, row) in rows.iter().enumerate() {
            if row.len() != d {
                return Err(Error::size_mismatch(d, row.len(), &format!("row {t}")));
            }
            for (c, &v) in row.iter().enumerate() {
                columns[c].push(v);
            }
        }
        Self::multivariate(columns)
    }

    /// Build a series from named columns and an optional external index
    ///
    /// Fails with [`Error::Shape`] when the column set is empty, columns
    /// differ in length or are empty, any value is NaN or infinite, or the
    /// index length differs from N or is not strictly increasing.
    pub fn wrap(columns: Vec<(String, Vec<f64>)>, index: Option<Vec<i64>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::Shape("series needs at least one column".to_string()));
        }
        let n = columns[0].1.len();
        if n == 0 {
            return Err(Error::empty_input("series"));
        }
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if values.len() != n {
                return Err(Error::size_mismatch(
                    n,
                    values.len(),
                    &format!("column '{name}'"),
                ));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::non_finite(&format!("column '{name}'")));
            }
            names.push(name);
            data.push(values);
        }
        if let Some(idx) = &index {
            if idx.len() != n {
                return Err(Error::size_mismatch(n, idx.len(), "index"));
            }
            if idx.windows(2).any(|w| w[1] <= w[0]) {
                return Err(Error::Shape("index must be strictly increasing".to_string()));
            }
        }
        Ok(Self {
            data: Arc::new(SeriesData {
                names,
                columns: data,
                index,
            }),
            start: 0,
            end: n,
        })
    }

    /// Number of time steps in the view
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Always false; empty series cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_columns(&self) -> usize {
        self.data.columns.len()
    }

    pub fn is_univariate(&self) -> bool {
        self.n_columns() == 1
    }

    pub fn names(&self) -> &[String] {
        &self.data.names
    }

    /// Column `i` restricted to the view
    pub fn column(&self, i: usize) -> Result<&[f64]> {
        self.data
            .columns
            .get(i)
            .map(|c| &c[self.start..self.end])
            .ok_or_else(|| {
                Error::Shape(format!(
                    "column {i} out of range for {} columns",
                    self.n_columns()
                ))
            })
    }

    pub fn column_by_name(&self, name: &str) -> Result<&[f64]> {
        let i = self
            .data
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::Shape(format!("no column named '{name}'")))?;
        self.column(i)
    }

    /// Iterate over the view's columns
    pub fn columns(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data
            .columns
            .iter()
            .map(move |c| &c[self.start..self.end])
    }

    /// The single column of a univariate series
    pub fn values(&self) -> Result<&[f64]> {
        if !self.is_univariate() {
            return Err(Error::Shape(format!(
                "expected a univariate series, got {} columns",
                self.n_columns()
            )));
        }
        self.column(0)
    }

    /// External index of the view, materialized
    pub fn index(&self) -> Vec<i64> {
        (0..self.len()).map(|t| self.index_at(t)).collect()
    }

    /// External index value at view position `t`
    ///
    /// Without an explicit index the storage position is used, so a view
    /// starting at 10 maps position 0 to 10.
    pub fn index_at(&self, t: usize) -> i64 {
        let pos = self.start + t;
        match &self.data.index {
            Some(idx) => idx[pos],
            None => pos as i64,
        }
    }

    /// Row `t` of the view as an owned vector
    pub fn row(&self, t: usize) -> Result<Vec<f64>> {
        if t >= self.len() {
            return Err(Error::Shape(format!(
                "row {t} out of range for series of length {}",
                self.len()
            )));
        }
        let pos = self.start + t;
        Ok(self.data.columns.iter().map(|c| c[pos]).collect())
    }

    /// Iterate over the view's rows
    pub fn rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (self.start..self.end).map(move |pos| self.data.columns.iter().map(|c| c[pos]).collect())
    }

    pub fn to_row_major(&self) -> Vec<Vec<f64>> {
        self.rows().collect()
    }

    /// View over `[start, end)` of this view, sharing storage
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start >= end || end > self.len() {
            return Err(Error::Shape(format!(
                "slice [{start}, {end}) invalid for series of length {}",
                self.len()
            )));
        }
        Ok(Self {
            data: Arc::clone(&self.data),
            start: self.start + start,
            end: self.start + end,
        })
    }

    /// Owned copy of the view with its own storage
    pub fn materialize(&self) -> Self {
        let columns = self.columns().map(|c| c.to_vec()).collect();
        let index = self.view_index();
        self.rebuild(columns, index)
    }

    /// True when both views share storage and cover the same window
    pub fn shares_view(&self, other: &Series) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && self.start == other.start && self.end == other.end
    }

    /// Apply `f` to every column, producing a new series of the same length
    pub fn map_columns<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let columns: Vec<(String, Vec<f64>)> = self
            .names()
            .iter()
            .cloned()
            .zip(self.columns().map(f))
            .collect();
        let index = self.view_index();
        Self::wrap(columns, index)
    }

    /// Zero-mean, unit-variance columns (population variance); constant
    /// columns become all zeros
    pub fn standardized(&self) -> Result<Self> {
        self.map_columns(|c| {
            let n = c.len() as f64;
            let mean = c.iter().sum::<f64>() / n;
            let var = c.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let sd = var.sqrt();
            if sd > 0.0 {
                c.iter().map(|v| (v - mean) / sd).collect()
            } else {
                vec![0.0; c.len()]
            }
        })
    }

    /// Columns rescaled to `[0, 1]`; constant columns become all zeros
    pub fn min_max_scaled(&self) -> Result<Self> {
        self.map_columns(|c| {
            let (lo, hi) = c
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            let range = hi - lo;
            if range > 0.0 {
                c.iter().map(|v| (v - lo) / range).collect()
            } else {
                vec![0.0; c.len()]
            }
        })
    }

    /// First differences; the result has N−1 rows and drops the first index
    pub fn differenced(&self) -> Result<Self> {
        if self.len() < 2 {
            return Err(Error::InsufficientData {
                expected: 2,
                actual: self.len(),
            });
        }
        let columns = self
            .columns()
            .map(|c| c.windows(2).map(|w| w[1] - w[0]).collect())
            .collect();
        let index = self.index().split_off(1);
        Ok(self.rebuild(columns, Some(index)))
    }

    /// Index to carry into derived storage so positions keep mapping to
    /// the same external index
    fn view_index(&self) -> Option<Vec<i64>> {
        if self.data.index.is_none() && self.start == 0 {
            None
        } else {
            Some(self.index())
        }
    }

    fn rebuild(&self, columns: Vec<Vec<f64>>, index: Option<Vec<i64>>) -> Self {
        let end = columns.first().map_or(0, Vec::len);
        Self {
            data: Arc::new(SeriesData {
                names: self.data.names.clone(),
                columns,
                index,
            }),
            start: 0,
            end,
        }
    }
}
