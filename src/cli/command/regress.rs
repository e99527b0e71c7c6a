use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{
    export::merge_csv_files,
    regression::{regress as fit, write_residuals, RegressionOptions, RegressionReport},
};

fn summary(report: &RegressionReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Fitted {} on {} months, tested on {} ({} incomplete months dropped)",
            report.target, report.train_rows, report.test_rows, report.dropped_rows
        ),
        format!("Mean Squared Error: {:.6}", report.mse),
        match report.r2 {
            Some(r2) => format!("R² Score: {:.6}", r2),
            None => "R² Score: undefined".to_string(),
        },
    ];
    for (feature, coefficient) in report.features.iter().zip(&report.model.coefficients) {
        lines.push(format!("{}: {:.4}", feature, coefficient));
    }
    lines.push(format!("Intercept: {:.4}", report.model.intercept));

    lines
}

/// Joins the series, fits the regression and writes the per-month residuals
/// to `output`. Returns the report lines and the written file.
pub fn regress(
    output: &Path,
    inputs: &[PathBuf],
    options: &RegressionOptions,
) -> Result<(Vec<String>, PathBuf)> {
    let merged = merge_csv_files(inputs).context("Merging series")?;
    let report = fit(&merged, options).with_context(|| format!("Regressing {}", options.target))?;
    let file = write_residuals(&report, output)?;

    Ok((summary(&report), file))
}

// -- Tests -------------------------------------------------------------------
