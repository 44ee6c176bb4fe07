//! Pipeline configuration types
//!
//! Every section rejects unknown keys and fills missing keys from defaults,
//! so a configuration file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::types::{Cycle, RowTag, MAX_PARTITIONS};
use crate::{Error, Result};

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Per-tag weighting requests
    pub weighting: WeightingConfig,

    /// External solver settings
    pub solver: SolverConfig,

    /// Compute slot layout of the solve job
    pub job: JobConfig,

    /// Cycle directory layout
    pub cycle: CycleConfig,
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_json(&json)
    }

    /// Check every section for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.weighting.validate()?;
        self.job.validate()?;
        if !self.solver.regularization.is_finite() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "solver.regularization must be finite, got {}",
                    self.solver.regularization
                ),
            });
        }
        Ok(())
    }
}

/// Weighting method identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightMethod {
    /// `w = p0`
    A,
    /// `w = p0 * max(cycle,1)^p1`
    B,
    /// `w = p0 * exp(p1 * |value| / p2)`
    C,
    /// `w = p0 * exp(p1 * (|value| - p2) / p3)`
    D,
    /// `w = natoms^p`
    E,
}

impl WeightMethod {
    /// Number of parameters the method requires
    pub fn param_count(self) -> usize {
        match self {
            WeightMethod::A => 1,
            WeightMethod::B => 2,
            WeightMethod::C => 3,
            WeightMethod::D => 4,
            WeightMethod::E => 1,
        }
    }
}

impl FromStr for WeightMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(WeightMethod::A),
            "B" => Ok(WeightMethod::B),
            "C" => Ok(WeightMethod::C),
            "D" => Ok(WeightMethod::D),
            "E" => Ok(WeightMethod::E),
            other => Err(Error::UnknownWeightMethod {
                method: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for WeightMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            WeightMethod::A => "A",
            WeightMethod::B => "B",
            WeightMethod::C => "C",
            WeightMethod::D => "D",
            WeightMethod::E => "E",
        };
        f.write_str(id)
    }
}

/// One method with its parameters, e.g. `{"method": "C", "params": [1, 2, 3]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightTerm {
    pub method: String,
    pub params: Vec<f64>,
}

impl WeightTerm {
    pub fn new(method: impl Into<String>, params: Vec<f64>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Resolve the method id and check the parameter count against it
    pub fn resolve(&self) -> Result<WeightMethod> {
        let method: WeightMethod = self.method.parse()?;
        if self.params.len() != method.param_count() {
            return Err(Error::WeightParamCount {
                method: self.method.clone(),
                expected: method.param_count(),
                actual: self.params.len(),
                params: self.params.clone(),
            });
        }
        Ok(method)
    }
}

/// Parallel lists of methods and parameter sets whose weights multiply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightSet {
    pub methods: Vec<String>,
    pub params: Vec<Vec<f64>>,
}

impl WeightSet {
    /// Pair up methods with their parameter sets
    pub fn terms(&self) -> Result<Vec<WeightTerm>> {
        if self.methods.len() != self.params.len() {
            return Err(Error::WeightSetMismatch {
                methods: self.methods.len(),
                param_sets: self.params.len(),
            });
        }
        Ok(self
            .methods
            .iter()
            .zip(&self.params)
            .map(|(m, p)| WeightTerm::new(m.clone(), p.clone()))
            .collect())
    }
}

/// A weighting request: a single term or a product of terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightRequest {
    Single(WeightTerm),
    Product(WeightSet),
}

impl WeightRequest {
    /// Constant weight (method A)
    pub fn constant(weight: f64) -> Self {
        WeightRequest::Single(WeightTerm::new("A", vec![weight]))
    }

    /// Flatten into validated `(method, params)` pairs
    pub fn terms(&self) -> Result<Vec<(WeightMethod, Vec<f64>)>> {
        let terms = match self {
            WeightRequest::Single(term) => vec![term.clone()],
            WeightRequest::Product(set) => set.terms()?,
        };
        terms
            .into_iter()
            .map(|t| t.resolve().map(|m| (m, t.params)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.terms().map(|_| ())
    }
}

/// Weighting requests keyed by row tag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeightingConfig {
    pub force: WeightRequest,
    pub force_gas: WeightRequest,
    pub energy: WeightRequest,
    pub energy_gas: WeightRequest,
    pub stress: WeightRequest,

    /// Weights file used verbatim for the first cycle instead of computing them
    pub alc0_weights: Option<PathBuf>,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            force: WeightRequest::constant(1.0),
            force_gas: WeightRequest::constant(5.0),
            energy: WeightRequest::constant(0.1),
            energy_gas: WeightRequest::constant(0.01),
            stress: WeightRequest::constant(250.0),
            alc0_weights: None,
        }
    }
}

impl WeightingConfig {
    /// Request that applies to rows with the given tag
    pub fn request_for(&self, tag: RowTag) -> &WeightRequest {
        match tag {
            RowTag::Force => &self.force,
            RowTag::ForceGas => &self.force_gas,
            RowTag::Energy => &self.energy,
            RowTag::EnergyGas => &self.energy_gas,
            RowTag::Stress => &self.stress,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, request) in [
            ("force", &self.force),
            ("force_gas", &self.force_gas),
            ("energy", &self.energy),
            ("energy_gas", &self.energy_gas),
            ("stress", &self.stress),
        ] {
            request.validate().map_err(|e| Error::InvalidConfig {
                message: format!("weighting.{}: {}", name, e),
            })?;
        }
        Ok(())
    }
}

/// Regression algorithm passed to the external solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionAlgorithm {
    Dlasso,
    Dlars,
    Lassolars,
    Lasso,
    Svd,
}

impl RegressionAlgorithm {
    /// Distributed solvers read dimension manifests and may use split inputs
    pub fn is_distributed(self) -> bool {
        matches!(self, RegressionAlgorithm::Dlasso | RegressionAlgorithm::Dlars)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegressionAlgorithm::Dlasso => "dlasso",
            RegressionAlgorithm::Dlars => "dlars",
            RegressionAlgorithm::Lassolars => "lassolars",
            RegressionAlgorithm::Lasso => "lasso",
            RegressionAlgorithm::Svd => "svd",
        }
    }
}

/// External solver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub algorithm: RegressionAlgorithm,

    /// SVD eps or Lasso alpha
    pub regularization: f64,

    /// Normalize the A-matrix before solving
    pub normalize: bool,

    /// Solver executable
    pub executable: String,

    /// MPI launcher command (srun, mpirun)
    pub mpi_exec: String,

    /// Solver log captured into run snapshots
    pub log_file: String,

    /// Solver trajectory record captured into run snapshots
    pub trajectory_file: String,

    /// Launch the solver after preparing its inputs
    pub launch: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: RegressionAlgorithm::Lassolars,
            regularization: 1.0e-4,
            normalize: true,
            executable: String::new(),
            mpi_exec: "srun".to_string(),
            log_file: "dlars.log".to_string(),
            trajectory_file: "traj.txt".to_string(),
            launch: false,
        }
    }
}

/// Compute slot layout of the solve job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub nodes: usize,

    /// Processes per node
    pub ppn: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self { nodes: 1, ppn: 36 }
    }
}

impl JobConfig {
    /// Total process slots available to the solver
    ///
    /// Saturates on overflow; `validate` rejects such layouts.
    pub fn slots(&self) -> usize {
        self.nodes.saturating_mul(self.ppn)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 || self.ppn == 0 {
            return Err(Error::InvalidConfig {
                message: format!(
                    "job.nodes and job.ppn must be at least 1, got {} and {}",
                    self.nodes, self.ppn
                ),
            });
        }
        let slots = self
            .nodes
            .checked_mul(self.ppn)
            .ok_or_else(|| Error::InvalidConfig {
                message: format!(
                    "job.nodes * job.ppn overflows ({} x {})",
                    self.nodes, self.ppn
                ),
            })?;
        if slots > MAX_PARTITIONS {
            return Err(Error::InvalidConfig {
                message: format!(
                    "job requests {} process slots; partition names support at most {}",
                    slots, MAX_PARTITIONS
                ),
            });
        }
        Ok(())
    }
}

/// Cycle directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CycleConfig {
    /// Directory containing the `ALC-<k>` cycle directories
    pub root: PathBuf,

    /// Whether cluster configurations are generated (cycle 1 then has a predecessor)
    pub do_cluster: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            do_cluster: true,
        }
    }
}

impl CycleConfig {
    /// True when the cycle starts a new lineage instead of extending one
    pub fn starts_lineage(&self, cycle: Cycle) -> bool {
        cycle == 0 || (cycle == 1 && !self.do_cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.job.slots(), 36);
        assert_eq!(config.solver.mpi_exec, "srun");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.weighting.request_for(RowTag::Stress),
            &WeightRequest::constant(250.0)
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(
            r#"{
                "solver": { "algorithm": "dlasso" },
                "job": { "nodes": 2, "ppn": 4 },
                "weighting": {
                    "energy": { "methods": ["A", "B"], "params": [[0.1], [1.0, 2.0]] },
                    "force": { "method": "C", "params": [1.0, 0.5, 10.0] }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.solver.algorithm, RegressionAlgorithm::Dlasso);
        assert_eq!(config.job.slots(), 8);
        assert_eq!(config.weighting.energy.terms().unwrap().len(), 2);
        assert_eq!(config.weighting.force_gas, WeightRequest::constant(5.0));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = PipelineConfig::from_json(r#"{ "job": { "nodes": 1, "cores": 4 } }"#)
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_bad_weighting_rejected_at_load() {
        let err = PipelineConfig::from_json(
            r#"{ "weighting": { "stress": { "method": "B", "params": [1.0] } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));

        let err = PipelineConfig::from_json(
            r#"{ "weighting": { "stress": { "method": "Z", "params": [1.0] } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown weighting method"));
    }

    #[test]
    fn test_slot_limit() {
        let job = JobConfig {
            nodes: 100,
            ppn: 101,
        };
        assert!(job.validate().is_err());
        let job = JobConfig { nodes: 0, ppn: 4 };
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_overflowing_slot_layout_rejected() {
        let err = PipelineConfig::from_json(r#"{ "job": { "nodes": 9223372036854775808, "ppn": 2 } }"#)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("overflows"));

        let job = JobConfig {
            nodes: usize::MAX,
            ppn: 2,
        };
        assert_eq!(job.slots(), usize::MAX);
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_starts_lineage() {
        let mut cycle = CycleConfig::default();
        assert!(cycle.starts_lineage(0));
        assert!(!cycle.starts_lineage(1));
        cycle.do_cluster = false;
        assert!(cycle.starts_lineage(1));
        assert!(!cycle.starts_lineage(2));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fitprep.json");
        tokio::fs::write(&path, r#"{ "cycle": { "do_cluster": false } }"#)
            .await
            .unwrap();

        let config = PipelineConfig::load(&path).await.unwrap();
        assert!(!config.cycle.do_cluster);

        let missing = PipelineConfig::load(dir.path().join("missing.json")).await;
        assert!(matches!(missing, Err(Error::PathNotFound { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed = PipelineConfig::from_json(&json).unwrap();
        assert_eq!(parsed.job.ppn, config.job.ppn);
        assert_eq!(parsed.weighting.energy, config.weighting.energy);
    }
}
