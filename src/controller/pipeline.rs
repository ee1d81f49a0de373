/*
 * File: controller/pipeline.rs
 *
 * The reconciler proper (§4.7): the eleven-step control flow that drives a
 * `Pipeline` from first observation to a terminal phase, plus the deletion
 * handler (§4.6). Wired up through the same `kube::runtime::finalizer`
 * pattern already used by this operator's other controllers.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::config::Config;
use crate::controller::{analyzer, conditions, dependency, launcher, status};
use crate::crds::{Pipeline, PipelinePhase, StepStatus};
use crate::error::Error;
use crate::Context;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Entry point registered with `kube::runtime::Controller::run`.
#[instrument(skip(pipeline, ctx), fields(namespace = pipeline.namespace().as_deref(), name = %pipeline.name_any()))]
pub async fn reconcile(pipeline: Arc<Pipeline>, ctx: Arc<Context>) -> Result<Action, Error> {
    let ns = pipeline.namespace().ok_or(Error::MissingNamespace)?;
    let api: Api<Pipeline> = Api::namespaced(ctx.client.clone(), &ns);

    finalizer(&api, &ctx.config.finalizer, pipeline, |event| async {
        match event {
            FinalizerEvent::Apply(pipeline) => apply(pipeline, ctx.clone()).await,
            FinalizerEvent::Cleanup(pipeline) => cleanup(pipeline, ctx.clone()).await,
        }
    })
    .await
    .map_err(Into::into)
}

/// `error_policy` for the `Pipeline` controller: every error is transient
/// from this reconciler's point of view, so it always requeues with the
/// configured backoff rather than giving up.
pub fn error_policy(_pipeline: Arc<Pipeline>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(error = %error, "reconcile failed");
    Action::requeue(ctx.config.error_requeue_interval)
}

/// Steps 2–11 of §4.7, run once the finalizer's presence/absence has
/// already been established by the `finalizer` helper wrapping this call.
async fn apply(pipeline: Arc<Pipeline>, ctx: Arc<Context>) -> Result<Action, Error> {
    let ns = pipeline.namespace().ok_or(Error::MissingNamespace)?;
    let pipelines: Api<Pipeline> = Api::namespaced(ctx.client.clone(), &ns);
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ns);
    let name = pipeline.name_any();

    let mut pipeline_status = pipeline.status.clone().unwrap_or_default();

    // Step 4: first observation.
    if pipeline_status.phase.is_none() {
        pipeline_status.phase = Some(PipelinePhase::Pending);
        pipeline_status.start_time = Some(chrono::Utc::now());
        patch_status(&pipelines, &name, &pipeline_status).await?;
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    // Step 5: terminal phases do not re-invoke.
    if pipeline_status.phase.map_or(false, PipelinePhase::is_terminal) {
        return Ok(Action::await_change());
    }

    // Step 6: initialize per-step status on first pass past Pending.
    if pipeline_status.steps.is_empty() {
        pipeline_status.steps = pipeline
            .spec
            .steps
            .iter()
            .map(|s| StepStatus::pending(s.name.clone()))
            .collect();
        patch_status(&pipelines, &name, &pipeline_status).await?;
        return Ok(Action::requeue(Duration::from_secs(0)));
    }

    // Step 7: refresh observed Job state for steps already launched. Kept
    // aside so steps 7+8's combined persist (below) only fires when the
    // refresh or the phase/condition mapping actually changed something
    // (testable property 7: an unchanged observed state produces no status
    // changes).
    let observed = pipeline_status.clone();
    status::refresh_step_statuses(&jobs, &mut pipeline_status.steps).await?;

    // Step 8: analyze and map to the next phase.
    let summary = analyzer::analyze(&pipeline.spec.steps, &pipeline_status.steps);
    if let Some(next) = conditions::next_phase(&summary) {
        let changed = pipeline_status.phase != Some(next);
        pipeline_status.phase = Some(next);
        if changed && next.is_terminal() {
            pipeline_status.completion_time = Some(chrono::Utc::now());
        }
        let previous_ready = conditions::find_ready(&pipeline_status.conditions).cloned();
        let ready = conditions::ready_condition(
            next,
            &summary,
            pipeline_status.start_time,
            chrono::Utc::now(),
            previous_ready.as_ref(),
        );
        conditions::upsert_ready(&mut pipeline_status.conditions, ready);
    }

    if pipeline_status != observed {
        patch_status(&pipelines, &name, &pipeline_status).await?;
    }

    // Step 9: terminal phases stop here.
    if pipeline_status.phase.map_or(false, PipelinePhase::is_terminal) {
        return Ok(Action::await_change());
    }

    // Step 10: launch every step that has become ready, or finalize the
    // ones that are now unreachable as skipped.
    let mut changed = false;
    for step in &pipeline.spec.steps {
        let idx = pipeline_status
            .steps
            .iter()
            .position(|s| s.name == step.name)
            .expect("status initialized with one entry per declared step");

        if pipeline_status.steps[idx].phase != crate::crds::StepPhase::Pending {
            continue;
        }

        let readiness = dependency::evaluate(&pipeline.spec, step, &pipeline_status.steps);
        match readiness {
            dependency::Readiness::Ready => {
                launcher::launch(&jobs, &pipeline, &ctx.config, step, &mut pipeline_status.steps[idx]).await?;
                changed = true;
            }
            dependency::Readiness::Skip => {
                launcher::skip(&mut pipeline_status.steps[idx]);
                changed = true;
            }
            dependency::Readiness::Wait => {}
        }
    }

    if changed {
        patch_status(&pipelines, &name, &pipeline_status).await?;
    }

    // Step 11: safety-timer requeue.
    Ok(Action::requeue(ctx.config.requeue_interval))
}

/// §4.6: on deletion, delete every Job this Pipeline owns, then let the
/// `finalizer` helper remove the finalizer once this returns `Ok`.
async fn cleanup(pipeline: Arc<Pipeline>, ctx: Arc<Context>) -> Result<Action, Error> {
    let ns = pipeline.namespace().ok_or(Error::MissingNamespace)?;
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &ns);
    let name = pipeline.name_any();

    let selector = format!("{}={}", ctx.config.pipeline_label(), name);
    let owned = jobs.list(&ListParams::default().labels(&selector)).await?;

    let dp = DeleteParams::background();
    for job in owned.items {
        let job_name = job.name_any();
        match jobs.delete(&job_name, &dp).await {
            Ok(_) => info!(job = %job_name, "deleted owned job"),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }

    info!(pipeline = %name, "teardown complete, releasing finalizer");
    Ok(Action::await_change())
}

async fn patch_status(
    api: &Api<Pipeline>,
    name: &str,
    status: &crate::crds::PipelineStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{PipelineSpec, PipelineStep, RunIfCondition, RunIfOperator, RunIfOutcome, StepPhase};
    use k8s_openapi::api::batch::v1::JobSpec;

    fn step(name: &str, run_if: Option<RunIfCondition>) -> PipelineStep {
        PipelineStep {
            name: name.into(),
            job_spec: JobSpec::default(),
            run_if,
        }
    }

    #[test]
    fn sequential_pipeline_phase_progression_is_consistent() {
        let spec = PipelineSpec {
            service_account_name: None,
            pod_template: None,
            shared_volume: None,
            steps: vec![step("build", None), step("test", None)],
        };

        let statuses = vec![
            StepStatus::pending("build"),
            StepStatus::pending("test"),
        ];
        let summary = analyzer::analyze(&spec.steps, &statuses);
        assert_eq!(conditions::next_phase(&summary), None);

        let mut running = statuses.clone();
        running[0].phase = StepPhase::Running;
        let summary = analyzer::analyze(&spec.steps, &running);
        assert_eq!(conditions::next_phase(&summary), Some(PipelinePhase::Running));

        let mut done = statuses;
        done[0].phase = StepPhase::Succeeded;
        done[1].phase = StepPhase::Succeeded;
        let summary = analyzer::analyze(&spec.steps, &done);
        assert_eq!(conditions::next_phase(&summary), Some(PipelinePhase::Succeeded));
    }

    #[test]
    fn failure_handler_keeps_pipeline_running_despite_failed_step() {
        let cleanup_step = step(
            "cleanup",
            Some(RunIfCondition {
                steps: vec!["build".into()],
                condition: RunIfOutcome::Fail,
                operator: RunIfOperator::And,
            }),
        );
        let spec = PipelineSpec {
            service_account_name: None,
            pod_template: None,
            shared_volume: None,
            steps: vec![step("build", None), cleanup_step],
        };
        let statuses = vec![
            StepStatus {
                phase: StepPhase::Failed,
                ..StepStatus::pending("build")
            },
            StepStatus::pending("cleanup"),
        ];
        let summary = analyzer::analyze(&spec.steps, &statuses);
        assert_eq!(conditions::next_phase(&summary), Some(PipelinePhase::Running));

        let readiness = dependency::evaluate(&spec, &spec.steps[1], &statuses);
        assert_eq!(readiness, dependency::Readiness::Ready);
    }
}
