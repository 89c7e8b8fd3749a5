//! Engine configuration: a fixed set of recognized, typed options.
//!
//! Unrecognized keys in a TOML configuration are collected as warnings and
//! execution continues with defaults; only malformed values are errors.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::fom::Metric;
use crate::init::InitStrategy;
use crate::sart::MinimizerKind;
use crate::subsets::OrderStrategy;
use crate::tv::RegularizerKind;

#[derive(Clone, Debug)]
pub struct Config {
    /// Number of angles per block of the ordered-subsets schedule
    pub blocksize: usize,
    /// Relaxation (step size) of the data-fidelity update
    pub lambda: f32,
    /// Geometric decay of `lambda`, applied once per iteration
    pub lambda_red: f32,
    pub order_strategy: OrderStrategy,
    pub init: InitStrategy,
    pub verbose: bool,
    /// Clamp the estimate to non-negative values (applied by the
    /// data-minimization capability, not the engine)
    pub noneg: bool,
    /// Track the L2 norm of `measured - reprojected` every iteration
    pub compute_l2: bool,
    pub data_minimizing: MinimizerKind,
    pub regularisation: RegularizerKind,
    /// Metrics to log each iteration; `None` disables quality tracking
    pub quality_metrics: Option<Vec<Metric>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            blocksize: 20,
            lambda: 1.0,
            lambda_red: 0.99,
            order_strategy: OrderStrategy::Ordered,
            init: InitStrategy::Zero,
            verbose: true,
            noneg: true,
            compute_l2: false,
            data_minimizing: MinimizerKind::ArtDataMinimizing,
            regularisation: RegularizerKind::MinimizeTv,
            quality_metrics: None,
        }
    }
}

/// A configuration key that was not recognized. Non-fatal: reported, then
/// ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` is not a recognized configuration option", self.key)
    }
}

/// Emit all warnings through the `log` facade.
pub fn log_warnings(warnings: &[ConfigWarning]) {
    for w in warnings {
        log::warn!("{w}");
    }
}

// Keep in sync with the fields of `RawConfig`.
const KNOWN_KEYS: &[&str] = &[
    "blocksize",
    "lambda",
    "lambda_red",
    "order_strategy",
    "init",
    "verbose",
    "noneg",
    "compute_l2",
    "data_minimizing",
    "regularisation",
    "quality_metrics",
];

/// The TOML-facing shape of the configuration. The user-supplied-volume
/// initialization has no file representation; it is set programmatically via
/// [`InitStrategy::Volume`].
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_blocksize")]
    blocksize: usize,
    #[serde(default = "default_lambda")]
    lambda: f32,
    #[serde(default = "default_lambda_red")]
    lambda_red: f32,
    #[serde(default)]
    order_strategy: OrderStrategy,
    #[serde(default)]
    init: InitKind,
    #[serde(default = "default_true")]
    verbose: bool,
    #[serde(default = "default_true")]
    noneg: bool,
    #[serde(default)]
    compute_l2: bool,
    #[serde(default)]
    data_minimizing: MinimizerKind,
    #[serde(default)]
    regularisation: RegularizerKind,
    #[serde(default)]
    quality_metrics: Option<Vec<Metric>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum InitKind {
    #[default]
    None,
    Multigrid,
    Direct,
}

fn default_blocksize() -> usize { 20 }
fn default_lambda() -> f32 { 1.0 }
fn default_lambda_red() -> f32 { 0.99 }
fn default_true() -> bool { true }

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Config {
            blocksize: raw.blocksize,
            lambda: raw.lambda,
            lambda_red: raw.lambda_red,
            order_strategy: raw.order_strategy,
            init: match raw.init {
                InitKind::None => InitStrategy::Zero,
                InitKind::Multigrid => InitStrategy::Multigrid,
                InitKind::Direct => InitStrategy::Direct,
            },
            verbose: raw.verbose,
            noneg: raw.noneg,
            compute_l2: raw.compute_l2,
            data_minimizing: raw.data_minimizing,
            regularisation: raw.regularisation,
            quality_metrics: raw.quality_metrics,
        }
    }
}

impl Config {
    /// Parse a TOML document. Unrecognized keys are returned as warnings;
    /// malformed values are fatal.
    pub fn from_toml_str(input: &str) -> Result<(Config, Vec<ConfigWarning>), Error> {
        let table: toml::value::Table =
            toml::from_str(input).map_err(|e| Error::BadConfig(e.to_string()))?;
        let mut known = toml::value::Table::new();
        let mut warnings = Vec::new();
        for (key, value) in table {
            if KNOWN_KEYS.contains(&key.as_str()) {
                known.insert(key, value);
            } else {
                warnings.push(ConfigWarning { key });
            }
        }
        let raw: RawConfig = toml::Value::Table(known)
            .try_into()
            .map_err(|e: toml::de::Error| Error::BadConfig(e.to_string()))?;
        Ok((raw.into(), warnings))
    }

    pub fn from_file(path: &Path) -> Result<(Config, Vec<ConfigWarning>), Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::BadConfig(format!("could not read {path:?}: {e}")))?;
        Self::from_toml_str(&text)
    }
}
