// Result Aggregation
// Merges the raw artifacts of one run directory into an AggregatedReport.
//
// Every phase is optional per candidate. A missing or malformed artifact
// leaves that field absent and aggregation carries on.

use crate::artifacts::{
    read_hyperfine, read_load_test, read_resource_stream, HyperfineExport, RunLayout,
};
use crate::pure::stats::{relative_ratios, summarize_resources};
use crate::types::{
    AggregatedReport, Candidate, CandidateId, CandidateResults, LoadTestSettings, MachineProfile,
    StatisticalSummary,
};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Run-level facts carried into the report alongside the measurements
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub machine: MachineProfile,
    pub load_test_settings: LoadTestSettings,
    /// RFC 3339
    pub generated_at: String,
    pub runtime_label: Option<String>,
    pub raw_data: Option<String>,
}

/// Build the report for `candidates` from the artifacts in `layout`
pub fn aggregate(
    candidates: &[Candidate],
    layout: &RunLayout,
    context: ReportContext,
) -> AggregatedReport {
    let ids: Vec<CandidateId> = candidates.iter().map(|c| c.id.clone()).collect();

    let build = phase_summaries(&ids, read_hyperfine(&layout.build_json()).as_ref());
    let cold_start = phase_summaries(&ids, read_hyperfine(&layout.cold_start_json()).as_ref());

    let mut results = IndexMap::with_capacity(ids.len());
    for id in &ids {
        let load_test = read_load_test(&layout.load_test(id));
        let resources = read_resource_stream(&layout.resources(id))
            .and_then(|samples| summarize_resources(&samples));

        if load_test.is_none() {
            debug!(candidate = %id, "No load-test result");
        }

        results.insert(
            id.clone(),
            CandidateResults {
                build: build.get(id).copied(),
                cold_start: cold_start.get(id).copied(),
                load_test,
                resources,
            },
        );
    }

    AggregatedReport {
        generated_at: context.generated_at,
        machine: context.machine,
        load_test_settings: context.load_test_settings,
        runtime_label: context.runtime_label,
        raw_data: context.raw_data,
        results,
    }
}

/// Summaries for the candidates found in one hyperfine export, with relative
/// ratios recomputed over the candidates that are present
pub fn phase_summaries(
    ids: &[CandidateId],
    export: Option<&HyperfineExport>,
) -> IndexMap<CandidateId, StatisticalSummary> {
    let Some(export) = export else {
        return IndexMap::new();
    };

    let found: Vec<(CandidateId, StatisticalSummary)> = ids
        .iter()
        .filter_map(|id| {
            let Some(raw) = export.find(id) else {
                warn!(candidate = %id, "No hyperfine result for candidate");
                return None;
            };
            Some((
                id.clone(),
                StatisticalSummary {
                    mean: raw.mean,
                    median: raw.median,
                    stddev: raw.stddev.unwrap_or(0.0),
                    min: raw.min,
                    max: raw.max,
                    relative: 1.0,
                },
            ))
        })
        .collect();

    let means: Vec<f64> = found.iter().map(|(_, s)| s.mean).collect();
    found
        .into_iter()
        .zip(relative_ratios(&means))
        .map(|((id, summary), relative)| (id, StatisticalSummary { relative, ..summary }))
        .collect()
}
