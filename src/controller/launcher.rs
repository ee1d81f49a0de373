/*
 * File: controller/launcher.rs
 *
 * The job launcher (§4.4). Turns a `Ready` step into a materialized
 * `Job`, or a `Skip` step straight into a terminal `Skipped` status with
 * no API call at all. Job names are derived deterministically from the
 * pipeline and step names so a retried reconcile after a crash between
 * "create the Job" and "record its name" converges instead of
 * double-creating.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::config::Config;
use crate::controller::compose::compose_pod_template;
use crate::crds::{Pipeline, PipelineStep, StepPhase, StepStatus};
use crate::error::Error;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

/// Job names are `{pipelineName}-{stepName}`, which must itself satisfy
/// the DNS-subdomain charset Kubernetes enforces on object names.
pub fn job_name(pipeline_name: &str, step_name: &str) -> String {
    format!("{pipeline_name}-{step_name}")
}

/// Validates a step name against the same charset its derived Job name
/// must satisfy, before any API call is attempted for it.
pub fn validate_step_name(step_name: &str) -> Result<(), Error> {
    let valid = !step_name.is_empty()
        && step_name.len() <= 63
        && step_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !step_name.starts_with('-')
        && !step_name.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidStepName {
            step: step_name.to_string(),
            reason: "must be a lowercase RFC 1123 label no longer than 63 characters".to_string(),
        })
    }
}

/// Creates the Job for `step` if it does not already exist, and records
/// its name on `status`. Idempotent: a second call for the same step
/// after `status.job_name` is already set is a no-op other than the
/// phase transition.
pub async fn launch(
    jobs: &Api<Job>,
    pipeline: &Pipeline,
    config: &Config,
    step: &PipelineStep,
    status: &mut StepStatus,
) -> Result<(), Error> {
    validate_step_name(&step.name)?;

    let name = job_name(&pipeline.name_any(), &step.name);

    let mut job = Job {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: pipeline.namespace(),
            labels: Some(BTreeMap::from([
                (config.pipeline_label(), pipeline.name_any()),
                (config.step_label(), step.name.clone()),
            ])),
            owner_references: Some(vec![pipeline.controller_owner_ref(&()).ok_or(Error::MissingNamespace)?]),
            ..Default::default()
        },
        spec: Some(step.job_spec.clone()),
        status: None,
    };

    compose_pod_template(&pipeline.spec, step, &mut job);

    match jobs.create(&PostParams::default(), &job).await {
        Ok(_) => info!(job = %name, step = %step.name, "launched step"),
        Err(kube::Error::Api(e)) if e.code == 409 => {
            // Already exists: a previous pass created it and crashed
            // before the status patch landed. Converge without erroring.
            info!(job = %name, step = %step.name, "job already exists, continuing");
        }
        Err(e) => return Err(e.into()),
    }

    status.job_name = Some(name);
    status.phase = StepPhase::Running;
    Ok(())
}

/// Marks `status` as `Skipped` with no API interaction: a skipped step
/// never has a Job.
pub fn skip(status: &mut StepStatus) {
    status.phase = StepPhase::Skipped;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_name_combines_pipeline_and_step() {
        assert_eq!(job_name("build-release", "compile"), "build-release-compile");
    }

    #[test]
    fn valid_step_names_accepted() {
        assert!(validate_step_name("compile").is_ok());
        assert!(validate_step_name("step-2").is_ok());
    }

    #[test]
    fn empty_step_name_rejected() {
        assert!(validate_step_name("").is_err());
    }

    #[test]
    fn uppercase_step_name_rejected() {
        assert!(validate_step_name("Compile").is_err());
    }

    #[test]
    fn leading_hyphen_rejected() {
        assert!(validate_step_name("-compile").is_err());
    }

    #[test]
    fn skip_sets_terminal_skipped_phase() {
        let mut status = StepStatus::pending("cleanup");
        skip(&mut status);
        assert_eq!(status.phase, StepPhase::Skipped);
    }
}
