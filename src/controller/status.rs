/*
 * File: controller/status.rs
 *
 * The step-status updater (§4.3). For every step already carrying a
 * `jobName`, fetches the materialized Job and folds its condition/active
 * count into the step's phase and `jobStatus` snapshot. Phases are a
 * one-way ratchet: once a step reaches a terminal phase it is never
 * touched again (invariant 3).
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::crds::{JobConditionSnapshot, JobStatusSnapshot, StepPhase, StepStatus};
use crate::error::Error;
use k8s_openapi::api::batch::v1::Job;
use kube::api::Api;
use tracing::warn;

/// Refreshes every non-terminal step whose Job has already been created,
/// in place. Steps with no `jobName` yet (not launched this pass) are
/// left untouched; the launcher owns those.
pub async fn refresh_step_statuses(jobs: &Api<Job>, steps: &mut [StepStatus]) -> Result<(), Error> {
    for step in steps.iter_mut() {
        if step.phase.is_terminal() {
            continue;
        }
        let Some(job_name) = step.job_name.clone() else {
            continue;
        };

        match jobs.get_opt(&job_name).await? {
            Some(job) => apply_job(step, &job),
            None => {
                // The Job we created has vanished from under us (e.g. an
                // operator was manually deleted). Not fatal: leave the step
                // pending its original phase and let the launcher's
                // idempotent create recreate it on the next pass.
                warn!(job = %job_name, "referenced Job not found, will retry");
            }
        }
    }
    Ok(())
}

/// Maps one observed Job onto the step's phase and status snapshot.
/// Precedence, most specific first: `Complete` condition, `Failed`
/// condition, `Suspended` condition, active pod count, else unchanged.
fn apply_job(step: &mut StepStatus, job: &Job) {
    let status = job.status.clone().unwrap_or_default();
    let conditions: Vec<JobConditionSnapshot> = status
        .conditions
        .unwrap_or_default()
        .into_iter()
        .map(|c| JobConditionSnapshot {
            type_: c.type_,
            status: c.status,
            reason: c.reason,
            message: c.message,
        })
        .collect();

    let is_true = |kind: &str| {
        conditions
            .iter()
            .any(|c| c.type_ == kind && c.status == "True")
    };

    step.phase = if is_true("Complete") {
        StepPhase::Succeeded
    } else if is_true("Failed") {
        StepPhase::Failed
    } else if is_true("Suspended") {
        StepPhase::Suspended
    } else if status.active.unwrap_or(0) > 0 {
        StepPhase::Running
    } else {
        step.phase
    };

    step.job_status = Some(JobStatusSnapshot {
        active: status.active,
        succeeded: status.succeeded,
        failed: status.failed,
        start_time: status.start_time.map(|t| t.0),
        completion_time: status.completion_time.map(|t| t.0),
        conditions,
    });
}
