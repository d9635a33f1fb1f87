// servbench - Repeatable performance comparison of competing HTTP services
// Root library module

pub mod aggregate;
pub mod artifacts;
pub mod config;
pub mod errors;
pub mod health;
pub mod load;
pub mod machine;
pub mod observability;
pub mod orchestrator;
pub mod process;
pub mod publish;
pub mod pure;
pub mod sampler;
pub mod timing;
pub mod toolchain;
pub mod types;
pub mod validation;

// Re-export key types
pub use observability::{
    init_logging, init_logging_with_level, log_operation, record_metric, with_trace_id,
    MetricType, Operation, OperationContext, PerfTimer,
};

pub use config::{BenchConfig, CandidateSpec, SamplerMode, ToolSpec, DEFAULT_CONFIG_FILE};
pub use errors::{BenchError, BenchResult};

pub use types::{
    AggregatedReport, Candidate, CandidateId, CandidateResults, LatencyProfile, LoadTestResult,
    LoadTestSettings, MachineProfile, MetricSummary, ResourceSample, ResourceSummary,
    StatisticalSummary,
};

// Phase components
pub use aggregate::{aggregate, ReportContext};
pub use artifacts::RunLayout;
pub use health::{HealthPoller, PollOutcome};
pub use load::{Autocannon, LoadDriver, LoadRequest};
pub use orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use process::{PortGuard, ProcessSupervisor, ServiceHandle};
pub use publish::{Publisher, MARKER_END, MARKER_START};
pub use sampler::{ProcessProbe, ResourceSampler, SamplerExit, SamplerReport, SysinfoProbe};
pub use timing::{ColdStartTimer, Hyperfine};
pub use toolchain::{ToolReport, ToolStatus, ToolchainVerifier};

// Re-export pure functions
pub use pure::{average, percentile, render};
