//! Step timing and the tracing events a run emits.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use hopper_core::report::{RunReport, StepKind, StepReport};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct StepTimer {
    step: String,
    kind: StepKind,
    started: Instant,
}

impl StepTimer {
    pub fn start(step: &str, kind: StepKind) -> Self {
        tracing::info!(step = %step, kind = ?kind, "step started");
        Self {
            step: step.to_string(),
            kind,
            started: Instant::now(),
        }
    }

    pub fn finish(self, rows: Option<usize>) -> StepReport {
        let report = StepReport {
            step: self.step,
            kind: self.kind,
            rows,
            millis: self.started.elapsed().as_millis() as u64,
        };
        emit_step(&report);
        report
    }
}

pub fn emit_step(report: &StepReport) {
    match report.rows {
        Some(rows) => tracing::info!(
            step = %report.step,
            kind = ?report.kind,
            rows,
            millis = report.millis,
            "step finished"
        ),
        None => tracing::info!(
            step = %report.step,
            kind = ?report.kind,
            millis = report.millis,
            "step finished"
        ),
    }
}

pub fn emit_run(report: &RunReport) {
    tracing::info!(
        run = %report.id,
        backend = %report.backend,
        state = ?report.state,
        steps = report.steps.len(),
        millis = report.duration_ms(),
        "run finished"
    );
}

/// Sum of the row counts, if every table knows its own.
pub(crate) fn total_rows<I: IntoIterator<Item = Option<usize>>>(counts: I) -> Option<usize> {
    counts.into_iter().try_fold(0usize, |acc, n| n.map(|n| acc + n))
}
