//! The pipeline: one source, a chain of transforms, one target, one backend.
//!
//! A pipeline runs once. `run` moves it from `Built` to `Running` and ends in
//! `Completed` or `Failed`; the first error stops the run, so later
//! transforms and the target never see data.

use std::fmt::Write as _;
use std::sync::Arc;

use hopper_backend::{Ir, SharedBackend};
use hopper_core::error::{Error, Result};
use hopper_core::hash::{hash_serde, Hash256};
use hopper_core::report::{RunReport, RunState, StepKind};
use hopper_io::connectors::{SharedSource, SharedTarget, Source, Tables, Target};
use serde::Serialize;

use crate::metrics::{emit_run, now_ms, total_rows, StepTimer};
use crate::transforms::{SharedTransform, Transform};

pub struct Pipeline {
    backend: SharedBackend,
    source: Option<SharedSource>,
    transforms: Vec<SharedTransform>,
    target: Option<SharedTarget>,
    state: RunState,
}

/// Stable description hashed into the run report. Step names carry the
/// parameters that matter (locations, predicates, renames), so two outlines
/// differ whenever the steps do.
#[derive(Serialize)]
struct Outline<'a> {
    backend: String,
    source: Option<&'a str>,
    transforms: Vec<&'a str>,
    target: Option<&'a str>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.backend.tag())
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .field("target", &self.target.as_ref().map(|t| t.name().to_string()))
            .field("state", &self.state)
            .finish()
    }
}

impl Pipeline {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            source: None,
            transforms: Vec::new(),
            target: None,
            state: RunState::Built,
        }
    }

    pub fn with_source<S: Source + 'static>(self, source: S) -> Self {
        self.with_shared_source(Arc::new(source))
    }

    pub fn with_shared_source(mut self, source: SharedSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_transform<T: Transform + 'static>(self, transform: T) -> Self {
        self.with_shared_transform(Arc::new(transform))
    }

    pub fn with_shared_transform(mut self, transform: SharedTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_target<T: Target + 'static>(self, target: T) -> Self {
        self.with_shared_target(Arc::new(target))
    }

    pub fn with_shared_target(mut self, target: SharedTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn source(&self) -> Option<&SharedSource> {
        self.source.as_ref()
    }

    pub fn transforms(&self) -> &[SharedTransform] {
        &self.transforms
    }

    pub fn target(&self) -> Option<&SharedTarget> {
        self.target.as_ref()
    }

    pub fn hash(&self) -> Result<Hash256> {
        hash_serde(&Outline {
            backend: self.backend.kind().to_string(),
            source: self.source.as_ref().map(|s| s.name()),
            transforms: self.transforms.iter().map(|t| t.name()).collect(),
            target: self.target.as_ref().map(|t| t.name()),
        })
    }

    /// Human-readable plan of the run.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "backend:   {}", self.backend.tag());
        let _ = writeln!(
            out,
            "source:    {}",
            self.source.as_ref().map_or("<none>", |s| s.name())
        );
        for (i, t) in self.transforms.iter().enumerate() {
            let _ = writeln!(out, "transform: [{i}] {}", t.name());
        }
        let _ = writeln!(
            out,
            "target:    {}",
            self.target.as_ref().map_or("<none>", |t| t.name())
        );
        if let Ok(hash) = self.hash() {
            let _ = writeln!(out, "hash:      {hash}");
        }
        out
    }

    /// Load, transform every table, write every table.
    pub fn run(&mut self) -> Result<RunReport> {
        if self.state != RunState::Built {
            return Err(Error::InvalidState(format!(
                "run() needs a freshly built pipeline, this one is {:?}",
                self.state
            )));
        }
        let (source, target) = match (&self.source, &self.target) {
            (Some(s), Some(t)) => (Arc::clone(s), Arc::clone(t)),
            (None, _) => return Err(Error::config("pipeline has no source")),
            (_, None) => return Err(Error::config("pipeline has no target")),
        };
        let mine = self.backend.tag();
        for (role, tag) in [("source", source.backend().tag()), ("target", target.backend().tag())] {
            if tag != mine {
                return Err(Error::config(format!(
                    "{role} is bound to {tag} but the pipeline runs on {mine}"
                )));
            }
        }

        let mut report = RunReport::new(self.hash()?, self.backend.kind().name(), now_ms());
        self.state = RunState::Running;
        let span = tracing::info_span!("run", run = %report.id, backend = %mine);
        let _entered = span.enter();

        match self.execute(source.as_ref(), target.as_ref(), &mut report) {
            Ok(()) => {
                self.state = RunState::Completed;
                let report = report.finish(RunState::Completed, now_ms());
                emit_run(&report);
                Ok(report)
            }
            Err(e) => {
                self.state = RunState::Failed;
                let report = report.finish(RunState::Failed, now_ms());
                tracing::error!(error = %e, steps_done = report.steps.len(), "run failed");
                emit_run(&report);
                Err(e)
            }
        }
    }

    fn execute(&self, source: &dyn Source, target: &dyn Target, report: &mut RunReport) -> Result<()> {
        let timer = StepTimer::start(source.name(), StepKind::Load);
        let mut tables: Tables = source.load()?;
        report.record_rejects(source.rejects());
        report.record(timer.finish(total_rows(tables.iter().map(|(_, ir)| ir.num_rows()))));

        for transform in &self.transforms {
            let timer = StepTimer::start(transform.name(), StepKind::Transform);
            tables = tables
                .into_iter()
                .map(|(key, ir)| Ok((key, transform.apply(self.backend.as_ref(), ir)?)))
                .collect::<Result<Tables>>()?;
            report.record(timer.finish(total_rows(tables.iter().map(|(_, ir)| ir.num_rows()))));
        }

        let timer = StepTimer::start(target.name(), StepKind::Write);
        let rows = total_rows(tables.iter().map(|(_, ir)| ir.num_rows()));
        for (key, ir) in &tables {
            write_one(target, key.as_deref(), ir)?;
        }
        report.record(timer.finish(rows));
        Ok(())
    }
}

fn write_one(target: &dyn Target, key: Option<&str>, ir: &Ir) -> Result<()> {
    match key {
        Some(key) => target.write_keyed(key, ir),
        None => target.write(ir),
    }
}
