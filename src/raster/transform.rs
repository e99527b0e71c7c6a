//! Per-scene band transforms and band selection.

use std::collections::BTreeMap;

use ndarray::Zip;
use serde::Deserialize;

use super::{Band, Scene};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Transform {
    /// `v * factor` on the listed bands, or on every band.
    Multiply {
        factor: f64,
        #[serde(default)]
        bands: Option<Vec<String>>,
    },
    Add {
        value: f64,
        #[serde(default)]
        bands: Option<Vec<String>>,
    },
    Subtract {
        value: f64,
        #[serde(default)]
        bands: Option<Vec<String>>,
    },
    /// New band `name = (a - b) / (a + b)`.
    NormalizedDifference { a: String, b: String, name: String },
    Rename { from: String, to: String },
}

impl Transform {
    fn name(&self) -> &'static str {
        match self {
            Transform::Multiply { .. } => "multiply",
            Transform::Add { .. } => "add",
            Transform::Subtract { .. } => "subtract",
            Transform::NormalizedDifference { .. } => "normalized-difference",
            Transform::Rename { .. } => "rename",
        }
    }

    fn validate(&self) -> Result<()> {
        let constant = match self {
            Transform::Multiply { factor, .. } => Some(*factor),
            Transform::Add { value, .. } | Transform::Subtract { value, .. } => Some(*value),
            _ => None,
        };
        match constant {
            Some(c) if !c.is_finite() => Err(Error::TransformError(format!(
                "{} constant must be finite, got {}",
                self.name(),
                c
            ))),
            _ => Ok(()),
        }
    }

    fn apply(&self, bands: &mut BTreeMap<String, Band>) -> Result<()> {
        match self {
            Transform::Multiply { factor, bands: only } => {
                let factor = *factor;
                affine(bands, only.as_deref(), self.name(), |v| v * factor)
            }
            Transform::Add { value, bands: only } => {
                let value = *value;
                affine(bands, only.as_deref(), self.name(), |v| v + value)
            }
            Transform::Subtract { value, bands: only } => {
                let value = *value;
                affine(bands, only.as_deref(), self.name(), |v| v - value)
            }
            Transform::NormalizedDifference { a, b, name } => {
                let band_a = lookup(bands, a, self.name())?;
                let band_b = lookup(bands, b, self.name())?;
                if band_a.dim() != band_b.dim() {
                    return Err(Error::TransformError(format!(
                        "bands {} and {} have different shapes",
                        a, b
                    )));
                }

                let derived = Zip::from(band_a)
                    .and(band_b)
                    .map_collect(|&a, &b| normalized_difference(a, b));
                check_finite(&derived, name, self.name())?;
                bands.insert(name.clone(), derived);

                Ok(())
            }
            Transform::Rename { from, to } => {
                let band = bands.remove(from).ok_or_else(|| missing(from, self.name()))?;
                bands.insert(to.clone(), band);

                Ok(())
            }
        }
    }
}

fn normalized_difference(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if a.is_nan() || b.is_nan() || sum == 0.0 {
        return f64::NAN;
    }
    (a - b) / sum
}

fn affine(
    bands: &mut BTreeMap<String, Band>,
    only: Option<&[String]>,
    op: &str,
    f: impl Fn(f64) -> f64,
) -> Result<()> {
    let targets: Vec<String> = match only {
        Some(names) => {
            for name in names {
                lookup(bands, name, op)?;
            }
            names.to_vec()
        }
        None => bands.keys().cloned().collect(),
    };

    for name in targets {
        if let Some(band) = bands.get_mut(&name) {
            band.mapv_inplace(&f);
            check_finite(band, &name, op)?;
        }
    }

    Ok(())
}

fn lookup<'a>(bands: &'a BTreeMap<String, Band>, name: &str, op: &str) -> Result<&'a Band> {
    bands.get(name).ok_or_else(|| missing(name, op))
}

fn missing(name: &str, op: &str) -> Error {
    Error::TransformError(format!("{} references missing band {}", op, name))
}

fn check_finite(band: &Band, name: &str, op: &str) -> Result<()> {
    if band.iter().any(|v| v.is_infinite()) {
        return Err(Error::TransformError(format!(
            "{} produced non-finite values in band {}",
            op, name
        )));
    }
    Ok(())
}

/// Transforms to run on every scene of a series, followed by the band selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandPlan {
    pub transforms: Vec<Transform>,
    pub bands: Vec<String>,
}

impl BandPlan {
    pub fn new(transforms: Vec<Transform>, bands: Vec<String>) -> Result<Self> {
        if bands.is_empty() {
            return Err(Error::Config("at least one band must be selected".to_string()));
        }
        for transform in &transforms {
            transform.validate()?;
        }

        Ok(BandPlan { transforms, bands })
    }

    /// Runs the transforms in order, then keeps only the selected bands.
    pub fn apply(&self, mut scene: Scene) -> Result<Scene> {
        for transform in &self.transforms {
            transform.apply(&mut scene.bands)?;
        }

        let mut selected = BTreeMap::new();
        for name in &self.bands {
            let band = scene
                .bands
                .remove(name)
                .ok_or_else(|| missing(name, "select"))?;
            selected.insert(name.clone(), band);
        }
        scene.bands = selected;

        Ok(scene)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use chrono::Utc;
    use ndarray::arr2;
    use serde_json::Map;

    use super::*;

    fn scene(bands: &[(&str, Band)]) -> Scene {
        Scene {
            id: "scene".to_string(),
            time: Utc::now(),
            properties: Map::new(),
            footprint: crate::raster::test::unit_grid(1, 1).extent(),
            bands: bands
                .iter()
                .map(|(name, band)| (name.to_string(), band.clone()))
                .collect(),
        }
    }

    #[test]
    fn should_scale_and_offset_kelvin_to_celsius() {
        let plan = BandPlan::new(
            vec![
                Transform::Multiply { factor: 0.02, bands: None },
                Transform::Subtract { value: 273.15, bands: None },
            ],
            vec!["LST_Day_1km".to_string()],
        )
        .unwrap();

        let out = plan
            .apply(scene(&[("LST_Day_1km", arr2(&[[15000.0]]))]))
            .unwrap();

        let v = out.bands["LST_Day_1km"][[0, 0]];
        assert!((v - 26.85).abs() < 1e-9);
    }

    #[test]
    fn should_match_explicit_affine_offset() {
        let (a, b) = (0.02, -273.15);
        let plan = BandPlan::new(
            vec![
                Transform::Multiply { factor: a, bands: None },
                Transform::Add { value: b, bands: None },
            ],
            vec!["t".to_string()],
        )
        .unwrap();

        for v in [0.0, 13000.0, 15000.0, 16500.5] {
            let out = plan.apply(scene(&[("t", arr2(&[[v]]))])).unwrap();
            assert!((out.bands["t"][[0, 0]] - (v * a + b)).abs() < 1e-9);
        }
    }

    #[test]
    fn should_derive_normalized_difference() {
        let plan = BandPlan::new(
            vec![Transform::NormalizedDifference {
                a: "B8".to_string(),
                b: "B4".to_string(),
                name: "NDVI".to_string(),
            }],
            vec!["NDVI".to_string()],
        )
        .unwrap();

        let out = plan
            .apply(scene(&[("B8", arr2(&[[0.5]])), ("B4", arr2(&[[0.1]]))]))
            .unwrap();

        assert_eq!(out.bands.len(), 1);
        assert!((out.bands["NDVI"][[0, 0]] - 0.4 / 0.6).abs() < 1e-9);
    }

    #[test]
    fn should_leave_zero_sum_pixels_undefined() {
        let plan = BandPlan::new(
            vec![Transform::NormalizedDifference {
                a: "B8".to_string(),
                b: "B4".to_string(),
                name: "NDVI".to_string(),
            }],
            vec!["NDVI".to_string()],
        )
        .unwrap();

        let out = plan
            .apply(scene(&[
                ("B8", arr2(&[[0.0, f64::NAN]])),
                ("B4", arr2(&[[0.0, 0.2]])),
            ]))
            .unwrap();

        assert!(out.bands["NDVI"][[0, 0]].is_nan());
        assert!(out.bands["NDVI"][[0, 1]].is_nan());
    }

    #[test]
    fn should_apply_transforms_in_declared_order() {
        let add_then_multiply = BandPlan::new(
            vec![
                Transform::Add { value: 1.0, bands: None },
                Transform::Multiply { factor: 10.0, bands: None },
            ],
            vec!["x".to_string()],
        )
        .unwrap();
        let out = add_then_multiply
            .apply(scene(&[("x", arr2(&[[2.0]]))]))
            .unwrap();

        assert_eq!(out.bands["x"][[0, 0]], 30.0);
    }

    #[test]
    fn should_restrict_affine_to_named_bands() {
        let plan = BandPlan::new(
            vec![Transform::Multiply {
                factor: 2.0,
                bands: Some(vec!["a".to_string()]),
            }],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();

        let out = plan
            .apply(scene(&[("a", arr2(&[[1.0]])), ("b", arr2(&[[1.0]]))]))
            .unwrap();

        assert_eq!(out.bands["a"][[0, 0]], 2.0);
        assert_eq!(out.bands["b"][[0, 0]], 1.0);
    }

    #[test]
    fn should_fail_on_missing_band() {
        let plan = BandPlan::new(
            vec![Transform::NormalizedDifference {
                a: "B8".to_string(),
                b: "B4".to_string(),
                name: "NDVI".to_string(),
            }],
            vec!["NDVI".to_string()],
        )
        .unwrap();

        let result = plan.apply(scene(&[("B8", arr2(&[[0.5]]))]));
        assert!(matches!(result, Err(Error::TransformError(_))));
    }

    #[test]
    fn should_fail_on_missing_selected_band() {
        let plan = BandPlan::new(vec![], vec!["VV".to_string()]).unwrap();
        let result = plan.apply(scene(&[("VH", arr2(&[[1.0]]))]));
        assert!(matches!(result, Err(Error::TransformError(_))));
    }

    #[test]
    fn should_fail_on_overflow() {
        let plan = BandPlan::new(
            vec![Transform::Multiply { factor: 1e308, bands: None }],
            vec!["x".to_string()],
        )
        .unwrap();

        let result = plan.apply(scene(&[("x", arr2(&[[1e10]]))]));
        assert!(matches!(result, Err(Error::TransformError(_))));
    }

    #[test]
    fn should_reject_non_finite_constant() {
        let result = BandPlan::new(
            vec![Transform::Subtract { value: f64::NAN, bands: None }],
            vec!["x".to_string()],
        );
        assert!(matches!(result, Err(Error::TransformError(_))));
    }

    #[test]
    fn should_rename_band() {
        let plan = BandPlan::new(
            vec![Transform::Rename {
                from: "precipitation".to_string(),
                to: "precip".to_string(),
            }],
            vec!["precip".to_string()],
        )
        .unwrap();

        let out = plan
            .apply(scene(&[("precipitation", arr2(&[[3.0]]))]))
            .unwrap();
        assert_eq!(out.bands["precip"][[0, 0]], 3.0);
    }

    #[test]
    fn should_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Holder {
            transforms: Vec<Transform>,
        }
        let holder: Holder = toml::from_str(
            r#"transforms = [
                { op = "multiply", factor = 0.02 },
                { op = "subtract", value = 273.15 },
                { op = "normalized-difference", a = "B8", b = "B4", name = "NDVI" },
            ]"#,
        )
        .unwrap();

        assert_eq!(
            holder.transforms[0],
            Transform::Multiply { factor: 0.02, bands: None }
        );
        assert_eq!(holder.transforms.len(), 3);
    }
}
