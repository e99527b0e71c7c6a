//! Ordinary least squares fit of one merged series against the others.

use std::path::{Path, PathBuf};

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    error::{Error, Result},
    export::{write_atomically, MergedTable},
};

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionOptions {
    pub target: String,
    /// Explanatory columns. Empty means every column except the target.
    pub features: Vec<String>,
    pub test_fraction: f64,
    pub seed: u64,
}

/// Months where the target and every feature have a value, in date order.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    pub target: String,
    pub features: Vec<String>,
    pub dates: Vec<String>,
    pub x: DMatrix<f64>,
    pub y: DVector<f64>,
    /// Months skipped because a used column was empty.
    pub dropped: usize,
}

fn column_index(table: &MergedTable, name: &str) -> Result<usize> {
    table
        .columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| Error::Config(format!("no column named `{}`", name)))
}

fn parse_value(column: &str, date: &str, field: &str) -> Result<Option<f64>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    let value: f64 = field.parse().map_err(|_| {
        Error::Config(format!("{} on {}: `{}` is not a number", column, date, field))
    })?;

    Ok(value.is_finite().then_some(value))
}

pub fn observations(table: &MergedTable, target: &str, features: &[String]) -> Result<Observations> {
    let target_index = column_index(table, target)?;

    let features: Vec<String> = if features.is_empty() {
        table.columns.iter().filter(|c| *c != target).cloned().collect()
    } else {
        features.to_vec()
    };
    if features.is_empty() {
        return Err(Error::Config(format!("no feature columns besides `{}`", target)));
    }
    let mut indices = Vec::with_capacity(features.len());
    for name in &features {
        if name == target {
            return Err(Error::Config(format!("`{}` is both target and feature", name)));
        }
        let index = column_index(table, name)?;
        if indices.contains(&index) {
            return Err(Error::Config(format!("feature `{}` is listed twice", name)));
        }
        indices.push(index);
    }

    let mut dates = Vec::new();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut dropped = 0;
    'rows: for (date, values) in &table.rows {
        let Some(y) = parse_value(target, date, &values[target_index])? else {
            dropped += 1;
            continue;
        };
        let mut row = Vec::with_capacity(indices.len());
        for (name, &index) in features.iter().zip(&indices) {
            match parse_value(name, date, &values[index])? {
                Some(v) => row.push(v),
                None => {
                    dropped += 1;
                    continue 'rows;
                }
            }
        }
        dates.push(date.clone());
        xs.extend(row);
        ys.push(y);
    }
    debug!("{} complete months, {} dropped", dates.len(), dropped);

    Ok(Observations {
        target: target.to_string(),
        x: DMatrix::from_row_slice(dates.len(), features.len(), &xs),
        y: DVector::from_vec(ys),
        features,
        dates,
        dropped,
    })
}

/// Splits `0..n` into sorted `(train, test)` indices. The test set holds
/// `ceil(n * test_fraction)` indices drawn by a shuffle seeded with `seed`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::Config(format!(
            "test fraction must lie strictly between 0 and 1, got {}",
            test_fraction
        )));
    }
    let test_len = (n as f64 * test_fraction).ceil() as usize;
    if test_len >= n {
        return Err(Error::Regression(format!(
            "{} observations leave nothing to train on",
            n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut test = order[..test_len].to_vec();
    let mut train = order[test_len..].to_vec();
    test.sort_unstable();
    train.sort_unstable();

    Ok((train, test))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub intercept: f64,
    /// One per feature, in feature order.
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    /// Least squares fit of `y = intercept + x * coefficients`.
    pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<Self> {
        let (n, p) = x.shape();
        if n != y.len() {
            return Err(Error::Regression(format!(
                "{} feature rows but {} target values",
                n,
                y.len()
            )));
        }
        if n <= p {
            return Err(Error::Regression(format!(
                "{} observations cannot determine {} coefficients",
                n,
                p + 1
            )));
        }

        let svd = x.clone().insert_column(0, 1.0).svd(true, true);
        let largest = svd.singular_values.iter().copied().fold(0.0, f64::max);
        let tolerance = largest * n as f64 * f64::EPSILON;
        if svd.rank(tolerance) <= p {
            return Err(Error::Regression(
                "features are collinear, coefficients are not unique".to_string(),
            ));
        }

        let beta = svd
            .solve(y, tolerance)
            .map_err(|e| Error::Regression(e.to_string()))?;

        Ok(LinearModel {
            intercept: beta[0],
            coefficients: beta.iter().skip(1).copied().collect(),
        })
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        let coefficients = DVector::from_column_slice(&self.coefficients);
        (x * coefficients).add_scalar(self.intercept)
    }
}

pub fn mean_squared_error(actual: &DVector<f64>, predicted: &DVector<f64>) -> f64 {
    (actual - predicted).norm_squared() / actual.len() as f64
}

/// Coefficient of determination, undefined for a constant `actual`.
pub fn r2_score(actual: &DVector<f64>, predicted: &DVector<f64>) -> Option<f64> {
    let mean = actual.mean();
    let total: f64 = actual.iter().map(|v| (v - mean).powi(2)).sum();
    if total == 0.0 {
        return None;
    }

    Some(1.0 - (actual - predicted).norm_squared() / total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub date: String,
    pub actual: f64,
    pub predicted: f64,
    pub split: Split,
}

impl Residual {
    pub fn error(&self) -> f64 {
        (self.actual - self.predicted).abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionReport {
    pub target: String,
    pub features: Vec<String>,
    pub model: LinearModel,
    pub train_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: usize,
    /// Scores on the held out months.
    pub mse: f64,
    pub r2: Option<f64>,
    /// Every complete month, in date order.
    pub residuals: Vec<Residual>,
}

/// Fits `options.target` against its features on a seeded split of the
/// complete months and scores the fit on the held out part.
pub fn regress(table: &MergedTable, options: &RegressionOptions) -> Result<RegressionReport> {
    let data = observations(table, &options.target, &options.features)?;
    let (train, test) = train_test_split(data.dates.len(), options.test_fraction, options.seed)?;

    let model = LinearModel::fit(&data.x.select_rows(&train), &data.y.select_rows(&train))?;

    let y_test = data.y.select_rows(&test);
    let predicted_test = model.predict(&data.x.select_rows(&test));
    let mse = mean_squared_error(&y_test, &predicted_test);
    let r2 = r2_score(&y_test, &predicted_test);
    info!(
        "Fitted {} on {} months, test MSE {} over {} months",
        data.target,
        train.len(),
        mse,
        test.len()
    );

    let predicted = model.predict(&data.x);
    let residuals = data
        .dates
        .iter()
        .enumerate()
        .map(|(i, date)| Residual {
            date: date.clone(),
            actual: data.y[i],
            predicted: predicted[i],
            split: if test.binary_search(&i).is_ok() {
                Split::Test
            } else {
                Split::Train
            },
        })
        .collect();

    Ok(RegressionReport {
        target: data.target,
        features: data.features,
        model,
        train_rows: train.len(),
        test_rows: test.len(),
        dropped_rows: data.dropped,
        mse,
        r2,
        residuals,
    })
}

/// Writes `date,<target>,predicted,error,squared_error,split`, one row per month.
pub fn write_residuals(report: &RegressionReport, path: &Path) -> Result<PathBuf> {
    write_atomically(path, |file| {
        let mut wtr = ::csv::WriterBuilder::new()
            .terminator(::csv::Terminator::Any(b'\n'))
            .from_writer(file);

        wtr.write_record([
            "date",
            report.target.as_str(),
            "predicted",
            "error",
            "squared_error",
            "split",
        ])?;
        for r in &report.residuals {
            let error = r.error();
            wtr.write_record([
                r.date.clone(),
                r.actual.to_string(),
                r.predicted.to_string(),
                error.to_string(),
                (error * error).to_string(),
                r.split.as_str().to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    })
}

// -- Tests -------------------------------------------------------------------
