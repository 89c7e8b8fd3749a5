//! Image-quality figures of merit used for convergence tracking.

use std::fmt;
use std::str::FromStr;

use ndarray::ArrayView3;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Metric {
    /// Root mean squared error between consecutive estimates
    #[serde(rename = "RMSE")]
    Rmse,
    /// Pearson correlation coefficient
    #[serde(rename = "CC")]
    Cc,
    /// Universal quality index (global form)
    #[serde(rename = "UQI")]
    Uqi,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Rmse => "RMSE",
            Metric::Cc => "CC",
            Metric::Uqi => "UQI",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Metric {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RMSE" => Ok(Metric::Rmse),
            "CC" => Ok(Metric::Cc),
            "UQI" => Ok(Metric::Uqi),
            other => Err(format!("unknown quality metric `{other}`")),
        }
    }
}

/// One quality-log entry: metric values in the caller's requested order.
pub type QualityRecord = Vec<(Metric, f32)>;

/// Capability computing the requested metrics between the current estimate
/// and the snapshot taken before this iteration's updates.
pub trait QualityMeasurement {
    fn measure(
        &self,
        current: ArrayView3<f32>,
        previous: ArrayView3<f32>,
        metrics: &[Metric],
    ) -> QualityRecord;
}

/// Reference implementation of the standard metric set.
pub struct StandardMetrics;

impl QualityMeasurement for StandardMetrics {
    fn measure(
        &self,
        current: ArrayView3<f32>,
        previous: ArrayView3<f32>,
        metrics: &[Metric],
    ) -> QualityRecord {
        metrics
            .iter()
            .map(|&m| {
                let value = match m {
                    Metric::Rmse => rmse(current, previous),
                    Metric::Cc => correlation(current, previous),
                    Metric::Uqi => uqi(current, previous),
                };
                (m, value)
            })
            .collect()
    }
}

/// Order-2 norm over a 3-D array (the residual-tracking norm).
pub fn l2_norm(a: ArrayView3<f32>) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn rmse(a: ArrayView3<f32>, b: ArrayView3<f32>) -> f32 {
    let n = a.len() as f32;
    let sum: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum / n).sqrt()
}

fn moments(a: ArrayView3<f32>, b: ArrayView3<f32>) -> (f32, f32, f32, f32, f32) {
    let n = a.len() as f32;
    let ma = a.sum() / n;
    let mb = b.sum() / n;
    let mut va = 0.0;
    let mut vb = 0.0;
    let mut cov = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        va += (x - ma) * (x - ma);
        vb += (y - mb) * (y - mb);
        cov += (x - ma) * (y - mb);
    }
    (ma, mb, va / n, vb / n, cov / n)
}

/// Pearson correlation coefficient; zero when either image is constant.
pub fn correlation(a: ArrayView3<f32>, b: ArrayView3<f32>) -> f32 {
    let (_, _, va, vb, cov) = moments(a, b);
    let denom = (va * vb).sqrt();
    if denom > 0.0 {
        cov / denom
    } else {
        0.0
    }
}

/// Universal quality index (Wang & Bovik), computed globally.
pub fn uqi(a: ArrayView3<f32>, b: ArrayView3<f32>) -> f32 {
    let (ma, mb, va, vb, cov) = moments(a, b);
    let denom = (va + vb) * (ma * ma + mb * mb);
    if denom > 0.0 {
        4.0 * cov * ma * mb / denom
    } else {
        0.0
    }
}
