//! adya CLI -- check recorded histories and generate test fixtures.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use adya_core::anomaly::AnomalyType;
use adya_core::{Model, Options, Workload};

#[derive(Debug, Parser)]
#[command(
    name = "adya",
    about = "Black-box transactional consistency checking from recorded histories"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check history files against consistency models
    Check(CheckArgs),
    /// Generate random valid histories
    Generate(GenerateArgs),
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// History files (JSON op records)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Micro-operation dialect of the histories
    #[arg(long, value_enum)]
    pub workload: WorkloadArg,
    /// Consistency models to check
    #[arg(long = "consistency-model", value_enum, default_value = "strict-serializable")]
    pub consistency_models: Vec<ModelArg>,
    /// Extra anomaly tags to prohibit (kebab-case, e.g. g2-item)
    #[arg(long = "anomaly", value_parser = parse_anomaly)]
    pub anomalies: Vec<AnomalyType>,
    /// Per-component cycle search budget in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub cycle_search_timeout_ms: u64,
    /// Emit one JSON result object per file instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of histories to generate
    #[arg(long, default_value_t = 1)]
    pub n_hist: u64,
    /// Client processes per history
    #[arg(long, default_value_t = 3)]
    pub n_process: u64,
    /// Keys per history
    #[arg(long, default_value_t = 5)]
    pub n_key: u64,
    /// Transactions per history
    #[arg(long, default_value_t = 50)]
    pub n_txn: u64,
    /// Micro-operations per transaction
    #[arg(long, default_value_t = 4)]
    pub n_mop: u64,
    /// Micro-operation dialect to generate
    #[arg(long, value_enum, default_value = "list-append")]
    pub workload: WorkloadArg,
    /// Output directory for history files
    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WorkloadArg {
    ListAppend,
    RwRegister,
}

impl From<WorkloadArg> for Workload {
    fn from(arg: WorkloadArg) -> Self {
        match arg {
            WorkloadArg::ListAppend => Self::ListAppend,
            WorkloadArg::RwRegister => Self::RwRegister,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    ReadUncommitted,
    ReadCommitted,
    MonotonicAtomicView,
    RepeatableRead,
    SnapshotIsolation,
    Serializable,
    StrongSessionSerializable,
    StrictSerializable,
}

impl From<ModelArg> for Model {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::ReadUncommitted => Self::ReadUncommitted,
            ModelArg::ReadCommitted => Self::ReadCommitted,
            ModelArg::MonotonicAtomicView => Self::MonotonicAtomicView,
            ModelArg::RepeatableRead => Self::RepeatableRead,
            ModelArg::SnapshotIsolation => Self::SnapshotIsolation,
            ModelArg::Serializable => Self::Serializable,
            ModelArg::StrongSessionSerializable => Self::StrongSessionSerializable,
            ModelArg::StrictSerializable => Self::StrictSerializable,
        }
    }
}

fn parse_anomaly(s: &str) -> Result<AnomalyType, String> {
    s.parse()
}

impl CheckArgs {
    #[must_use]
    pub fn options(&self) -> Options {
        Options::builder()
            .consistency_models(
                self.consistency_models
                    .iter()
                    .map(|&m| Model::from(m))
                    .collect(),
            )
            .anomalies(self.anomalies.clone())
            .cycle_search_timeout(Duration::from_millis(self.cycle_search_timeout_ms))
            .build()
    }
}
