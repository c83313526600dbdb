//! Runs task graphs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use kiln_server::{LiveServer, LiveServerConfig, ReloadHub, ServerError};
use kiln_tasks::{Publisher, TaskContext, TaskError, TaskKind, TaskOutcome};
use tokio::task::{JoinError, JoinSet};

use crate::pipeline::Step;

/// Errors that stop a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("'{step}' failed: {source}")]
    Task {
        step: String,
        #[source]
        source: TaskError,
    },

    #[error("Live session failed: {0}")]
    Server(#[from] ServerError),

    #[error("'{step}' panicked: {message}")]
    Panicked { step: String, message: String },
}

impl PipelineError {
    fn task(step: impl ToString, source: TaskError) -> Self {
        Self::Task {
            step: step.to_string(),
            source,
        }
    }

    fn join(step: impl ToString, err: JoinError) -> Self {
        Self::Panicked {
            step: step.to_string(),
            message: err.to_string(),
        }
    }
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>>;

/// Executes steps against one project.
///
/// Cloning is cheap; parallel branches each hold a clone.
#[derive(Clone)]
pub struct Orchestrator {
    tasks: Arc<TaskContext>,
    publisher: Arc<dyn Publisher>,
    server: LiveServerConfig,
    hub: Option<ReloadHub>,
}

impl Orchestrator {
    pub fn new(
        tasks: Arc<TaskContext>,
        publisher: Arc<dyn Publisher>,
        server: LiveServerConfig,
    ) -> Self {
        Self {
            tasks,
            publisher,
            server,
            hub: None,
        }
    }

    /// Attach the hub of a live session. Style and script tasks then notify
    /// connected browsers.
    pub fn with_hub(mut self, hub: ReloadHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Run a named pipeline, logging its start and finish.
    pub async fn run_named(&self, name: &str, step: &Step) -> Result<(), PipelineError> {
        let started = Instant::now();
        tracing::info!("Starting '{}'...", name);
        self.run(step).await?;
        tracing::info!("Finished '{}' after {:?}", name, started.elapsed());
        Ok(())
    }

    /// Run one step to completion. The first failure stops the step.
    pub fn run<'a>(&'a self, step: &'a Step) -> StepFuture<'a> {
        Box::pin(async move {
            match step {
                Step::Task(kind) => self.timed(kind, self.run_task(*kind)).await,
                Step::Reload => {
                    self.reload();
                    Ok(())
                }
                Step::Publish => self.timed("publish", self.publish()).await,
                Step::Serve => self.serve().await,
                Step::Series(steps) => {
                    for step in steps {
                        self.run(step).await?;
                    }
                    Ok(())
                }
                Step::Parallel(steps) => self.run_parallel(steps).await,
            }
        })
    }

    async fn timed(
        &self,
        name: impl std::fmt::Display,
        work: impl Future<Output = Result<(), PipelineError>>,
    ) -> Result<(), PipelineError> {
        let started = Instant::now();
        tracing::info!("Starting '{}'...", name);
        work.await?;
        tracing::info!("Finished '{}' after {:?}", name, started.elapsed());
        Ok(())
    }

    async fn run_parallel(&self, steps: &[Step]) -> Result<(), PipelineError> {
        let mut set = JoinSet::new();
        for step in steps {
            let this = self.clone();
            let step = step.clone();
            set.spawn(async move { this.run(&step).await });
        }

        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| PipelineError::join("parallel", e))?;
            if let Err(e) = result {
                set.abort_all();
                return Err(e);
            }
        }
        Ok(())
    }

    async fn run_task(&self, kind: TaskKind) -> Result<(), PipelineError> {
        let tasks = Arc::clone(&self.tasks);
        let outcome = tokio::task::spawn_blocking(move || tasks.run(kind))
            .await
            .map_err(|e| PipelineError::join(kind, e))?
            .map_err(|e| PipelineError::task(kind, e))?;

        tracing::debug!("'{}': {}", kind, outcome.summary());
        if let TaskOutcome::Styles(report) = &outcome {
            for failure in &report.failed {
                tracing::warn!("Skipped {}: {}", failure.source.display(), failure.message);
            }
        }

        if let Some(hub) = &self.hub {
            match (&outcome, kind) {
                (TaskOutcome::Styles(_), _) => {
                    hub.push_styles(&outcome, &self.tasks.layout().output);
                }
                (_, TaskKind::Js) => hub.reload(),
                _ => {}
            }
        }
        Ok(())
    }

    fn reload(&self) {
        match &self.hub {
            Some(hub) => {
                tracing::info!("Reloading {} browser(s)", hub.subscriber_count());
                hub.reload();
            }
            None => tracing::info!("No live session; nothing to reload"),
        }
    }

    async fn publish(&self) -> Result<(), PipelineError> {
        let publisher = Arc::clone(&self.publisher);
        let dir = self.tasks.layout().output.clone();
        let report = tokio::task::spawn_blocking(move || publisher.publish(&dir))
            .await
            .map_err(|e| PipelineError::join("publish", e))?
            .map_err(|e| PipelineError::task("publish", e))?;

        if report.committed {
            tracing::info!(
                "Published {} files to {} ({})",
                report.files,
                report.remote,
                report.branch
            );
        } else {
            tracing::info!("{} ({}) is already up to date", report.remote, report.branch);
        }
        Ok(())
    }

    async fn serve(&self) -> Result<(), PipelineError> {
        let hub = self.hub.clone().unwrap_or_default();
        let session = LiveServer::new(self.server.clone())
            .start(hub, Arc::clone(&self.tasks))
            .await?;
        session.wait().await?;
        Ok(())
    }
}
