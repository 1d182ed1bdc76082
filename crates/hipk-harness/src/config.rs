//! Harness configuration.
//!
//! Precedence, lowest to highest: built-in defaults, TOML file, `HIPK_*`
//! environment variables. The CLI layers its flags on top.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::input::InputFill;
use crate::kernels::amax;
use crate::reference::ScaleConvention;
use crate::validate::Tolerance;

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "hipk.toml";

/// Serialize an `f32` as the `f64` with the same shortest decimal form.
///
/// TOML floats are 64-bit; widening `0.8f32` directly prints `0.800000011920929`.
pub(crate) fn short_f32<S>(value: &f32, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let shortest = value.to_string().parse::<f64>().unwrap_or(f64::from(*value));
    s.serialize_f64(shortest)
}

/// Which [`hipk_runtime::DeviceRuntime`] to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The ROCm HIP runtime, loaded at run time.
    Hip,
    /// In-process host emulation.
    Emulated,
    /// HIP when the runtime library is present, else the emulator.
    #[default]
    Auto,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hip" | "rocm" => Ok(Self::Hip),
            "emulated" | "emulator" | "host" => Ok(Self::Emulated),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown backend {other:?} (expected hip, emulated or auto)")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hip => "hip",
            Self::Emulated => "emulated",
            Self::Auto => "auto",
        })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Path to the precompiled code object.
    pub artifact: PathBuf,
    pub entry_point: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self { artifact: PathBuf::from(amax::CODE_OBJECT), entry_point: amax::ENTRY_POINT.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemConfig {
    pub m: u32,
    pub n: u32,
    #[serde(serialize_with = "short_f32")]
    pub scale: f32,
    pub fill: InputFill,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self { m: 256, n: 4, scale: 0.5, fill: InputFill::default() }
    }
}

impl ProblemConfig {
    pub fn num_elements(&self) -> Option<u32> {
        self.m.checked_mul(self.n)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    #[serde(flatten)]
    pub tolerance: Tolerance,
    pub convention: ScaleConvention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    pub device: i32,
    pub backend: Backend,
    /// Block on the end event and the device after launching.
    pub synchronous: bool,
    /// Extra timed runs after the validated launch; 0 disables benchmarking.
    pub runs: u32,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self { device: 0, backend: Backend::Auto, synchronous: true, runs: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::default() }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub kernel: KernelConfig,
    pub problem: ProblemConfig,
    pub validation: ValidationConfig,
    pub launch: LaunchSettings,
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| HarnessError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// Defaults, then `path` (or `hipk.toml` if present), then environment.
    pub fn load_with_precedence(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Apply `HIPK_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("HIPK_ARTIFACT") {
            self.kernel.artifact = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HIPK_ENTRY_POINT") {
            self.kernel.entry_point = val;
        }
        if let Some(m) = env_parse("HIPK_M")? {
            self.problem.m = m;
        }
        if let Some(n) = env_parse("HIPK_N")? {
            self.problem.n = n;
        }
        if let Some(scale) = env_parse("HIPK_SCALE")? {
            self.problem.scale = scale;
        }
        if let Some(value) = env_parse("HIPK_FILL")? {
            self.problem.fill = InputFill::Constant { value };
        }
        // A seed selects random input and wins over a constant fill.
        if let Some(seed) = env_parse("HIPK_SEED")? {
            self.problem.fill = InputFill::Random { seed };
        }
        if let Some(abs) = env_parse("HIPK_ABS_TOL")? {
            self.validation.tolerance.abs = abs;
        }
        if let Some(rel) = env_parse("HIPK_REL_TOL")? {
            self.validation.tolerance.rel = rel;
        }
        if let Some(convention) = env_parse("HIPK_SCALE_CONVENTION")? {
            self.validation.convention = convention;
        }
        if let Some(device) = env_parse("HIPK_DEVICE")? {
            self.launch.device = device;
        }
        if let Some(backend) = env_parse("HIPK_BACKEND")? {
            self.launch.backend = backend;
        }
        if let Ok(val) = std::env::var("HIPK_SYNC") {
            self.launch.synchronous = matches!(val.as_str(), "1" | "true" | "yes");
        }
        if let Some(runs) = env_parse("HIPK_RUNS")? {
            self.launch.runs = runs;
        }
        if let Ok(val) = std::env::var("HIPK_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(format) = env_parse("HIPK_LOG_FORMAT")? {
            self.logging.format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(HarnessError::Config(msg)) };
        if self.kernel.entry_point.is_empty() {
            return invalid("kernel.entry_point must not be empty".into());
        }
        let p = &self.problem;
        if p.m == 0 || p.n == 0 {
            return invalid(format!("problem size must be non-zero, got {}x{}", p.m, p.n));
        }
        if p.num_elements().is_none() {
            return invalid(format!("problem size {}x{} overflows u32", p.m, p.n));
        }
        if !p.scale.is_finite() {
            return invalid(format!("problem.scale must be finite, got {}", p.scale));
        }
        let tol = &self.validation.tolerance;
        if !(tol.abs >= 0.0 && tol.rel >= 0.0) {
            return invalid(format!(
                "tolerances must be non-negative, got abs={} rel={}",
                tol.abs, tol.rel
            ));
        }
        if self.launch.device < 0 {
            return invalid(format!("launch.device must be >= 0, got {}", self.launch.device));
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|e| HarnessError::Config(format!("{key}={val:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
