//! Campaign-wide experiment configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

/// Whether we are maximizing or minimizing the objective metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// True if `candidate` is strictly better than `incumbent`.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

impl FromStr for ObjectiveDirection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" | "maximize" => Ok(Self::Maximize),
            "min" | "minimize" => Ok(Self::Minimize),
            _ => Err(ConfigError::UnsupportedObjective {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ObjectiveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maximize => f.write_str("maximize"),
            Self::Minimize => f.write_str("minimize"),
        }
    }
}

/// Model architecture the workload trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[default]
    ResNet,
    AlexNet,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Self::ResNet, Self::AlexNet];

    /// Token passed to the workload's `--arch` flag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResNet => "resnet",
            Self::AlexNet => "alexnet",
        }
    }

    /// Parallelism strategies the workload implements for this architecture.
    pub fn supported_parallelism(self) -> &'static [Parallelism] {
        match self {
            Self::ResNet => &[
                Parallelism::None,
                Parallelism::DataParallel,
                Parallelism::ModelParallel,
                Parallelism::Pipeline,
            ],
            Self::AlexNet => &[
                Parallelism::None,
                Parallelism::DataParallel,
                Parallelism::ModelParallel,
            ],
        }
    }
}

impl FromStr for Architecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnsupportedArchitecture {
                value: s.to_string(),
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single trial spreads training across the devices of its machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Parallelism {
    None,
    #[default]
    DataParallel,
    ModelParallel,
    Pipeline,
}

impl Parallelism {
    pub const ALL: [Parallelism; 4] = [
        Self::None,
        Self::DataParallel,
        Self::ModelParallel,
        Self::Pipeline,
    ];

    /// Token passed to the workload's `--parallelism` flag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DataParallel => "dp",
            Self::ModelParallel => "mp",
            Self::Pipeline => "gpipe",
        }
    }

    /// Descriptive spelling accepted alongside [`Parallelism::as_str`].
    pub fn long_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DataParallel => "data-parallel",
            Self::ModelParallel => "model-parallel",
            Self::Pipeline => "pipeline-parallel",
        }
    }
}

impl FromStr for Parallelism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s) || p.long_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnsupportedParallelism {
                value: s.to_string(),
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication material for the remote machines.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    /// `None` means key-based authentication.
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Immutable campaign settings. Build through [`ExperimentConfigBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentConfig {
    workload: PathBuf,
    venv: Option<PathBuf>,
    dataset: Option<PathBuf>,
    architecture: Architecture,
    parallelism: Parallelism,
    epochs: u32,
    metric_key: String,
    direction: ObjectiveDirection,
    machines: Vec<String>,
    credentials: Credentials,
    trial_timeout: Option<Duration>,
}

impl ExperimentConfig {
    pub fn builder(workload: impl Into<PathBuf>, metric_key: impl Into<String>) -> ExperimentConfigBuilder {
        ExperimentConfigBuilder::new(workload, metric_key)
    }

    /// Training program run on the remote machine.
    pub fn workload(&self) -> &Path {
        &self.workload
    }

    /// Virtualenv holding the workload's interpreter, if any.
    pub fn venv(&self) -> Option<&Path> {
        self.venv.as_deref()
    }

    pub fn dataset(&self) -> Option<&Path> {
        self.dataset.as_deref()
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    pub fn epochs(&self) -> u32 {
        self.epochs
    }

    pub fn metric_key(&self) -> &str {
        &self.metric_key
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    pub fn machines(&self) -> &[String] {
        &self.machines
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// `None` waits for the workload indefinitely.
    pub fn trial_timeout(&self) -> Option<Duration> {
        self.trial_timeout
    }
}

/// Collects caller-supplied settings; [`build`](Self::build) validates them.
#[derive(Debug, Clone)]
pub struct ExperimentConfigBuilder {
    workload: PathBuf,
    venv: Option<PathBuf>,
    dataset: Option<PathBuf>,
    architecture: Architecture,
    parallelism: Parallelism,
    epochs: i64,
    metric_key: String,
    direction: ObjectiveDirection,
    machines: Vec<String>,
    credentials: Credentials,
    trial_timeout: Option<Duration>,
}

impl ExperimentConfigBuilder {
    pub fn new(workload: impl Into<PathBuf>, metric_key: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            venv: None,
            dataset: None,
            architecture: Architecture::default(),
            parallelism: Parallelism::default(),
            epochs: 1,
            metric_key: metric_key.into(),
            direction: ObjectiveDirection::default(),
            machines: Vec::new(),
            credentials: Credentials::new(String::new(), None),
            trial_timeout: None,
        }
    }

    pub fn with_venv(mut self, venv: impl Into<PathBuf>) -> Self {
        self.venv = Some(venv.into());
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<PathBuf>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_epochs(mut self, epochs: i64) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_machines<I, S>(mut self, machines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.machines = machines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_trial_timeout(mut self, timeout: Duration) -> Self {
        self.trial_timeout = Some(timeout);
        self
    }

    /// Validate every setting and freeze the configuration.
    pub fn build(self) -> Result<ExperimentConfig, ConfigError> {
        if self.workload.as_os_str().is_empty() {
            return Err(ConfigError::EmptyWorkload);
        }
        if self.metric_key.trim().is_empty() {
            return Err(ConfigError::EmptyMetricKey);
        }
        let epochs = u32::try_from(self.epochs)
            .ok()
            .filter(|e| *e > 0)
            .ok_or(ConfigError::NonPositiveEpochs { epochs: self.epochs })?;
        if !self
            .architecture
            .supported_parallelism()
            .contains(&self.parallelism)
        {
            return Err(ConfigError::UnsupportedCombination {
                architecture: self.architecture.to_string(),
                parallelism: self.parallelism.to_string(),
            });
        }
        if self.credentials.username.trim().is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if self.machines.is_empty() {
            return Err(ConfigError::NoMachines);
        }
        for (i, host) in self.machines.iter().enumerate() {
            if self.machines[..i].contains(host) {
                return Err(ConfigError::DuplicateMachine { host: host.clone() });
            }
        }
        if self.trial_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(ExperimentConfig {
            workload: self.workload,
            venv: self.venv,
            dataset: self.dataset,
            architecture: self.architecture,
            parallelism: self.parallelism,
            epochs,
            metric_key: self.metric_key,
            direction: self.direction,
            machines: self.machines,
            credentials: self.credentials,
            trial_timeout: self.trial_timeout,
        })
    }
}
