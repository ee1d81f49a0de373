/*
 * File: controller/compose.rs
 *
 * The pod-template composer (§4.1). Merges pipeline-wide defaults into a
 * nascent Job's pod template without overriding anything the step already
 * specified for itself. Pure function, no I/O: it mutates the `Job` it is
 * handed and returns nothing else, matching the "pure function plus
 * effectful writer" split the rest of this reconciler follows.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::crds::{PipelineSpec, PipelineStep};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Toleration, VolumeMount};
use std::collections::BTreeMap;

/// Applies every pipeline-wide default to `job`'s pod template, per the
/// merge-rule table in §4.1. Called once, right before the job launcher
/// submits a freshly constructed Job for a ready step.
pub fn compose_pod_template(pipeline: &PipelineSpec, _step: &PipelineStep, job: &mut Job) {
    let spec = job.spec.get_or_insert_with(Default::default);

    // Backoff default: fail-fast for pipeline steps unless the step set
    // its own limit.
    if spec.backoff_limit.is_none() {
        spec.backoff_limit = Some(0);
    }

    let pod_spec = spec.template.spec.get_or_insert_with(Default::default);

    // serviceAccountName: applied even when no podTemplate is given.
    if pod_spec.service_account_name.is_none() {
        if let Some(sa) = &pipeline.service_account_name {
            pod_spec.service_account_name = Some(sa.clone());
        }
    }

    let Some(defaults) = &pipeline.pod_template else {
        apply_shared_volume(pipeline, pod_spec);
        return;
    };

    // nodeSelector: union; step keys win on collision.
    if let Some(ns) = &defaults.node_selector {
        let existing = pod_spec.node_selector.get_or_insert_with(BTreeMap::new);
        for (k, v) in ns {
            existing.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    // affinity: set only if step has none.
    if pod_spec.affinity.is_none() {
        pod_spec.affinity = defaults.affinity.clone();
    }

    // tolerations: append pipeline's after step's.
    if let Some(tolerations) = &defaults.tolerations {
        let existing: &mut Vec<Toleration> = pod_spec.tolerations.get_or_insert_with(Vec::new);
        existing.extend(tolerations.iter().cloned());
    }

    // securityContext (pod-level): set only if step has none.
    if pod_spec.security_context.is_none() {
        pod_spec.security_context = defaults.security_context.clone();
    }

    // imagePullSecrets: append.
    if let Some(secrets) = &defaults.image_pull_secrets {
        let existing = pod_spec.image_pull_secrets.get_or_insert_with(Vec::new);
        existing.extend(secrets.iter().cloned());
    }

    // priorityClassName: set only if step's is empty.
    if pod_spec
        .priority_class_name
        .as_ref()
        .map_or(true, |v| v.is_empty())
    {
        pod_spec.priority_class_name = defaults.priority_class_name.clone();
    }

    // runtimeClassName: set only if step's is unset.
    if pod_spec.runtime_class_name.is_none() {
        pod_spec.runtime_class_name = defaults.runtime_class_name.clone();
    }

    // schedulerName: set only if step's is empty.
    if pod_spec
        .scheduler_name
        .as_ref()
        .map_or(true, |v| v.is_empty())
    {
        pod_spec.scheduler_name = defaults.scheduler_name.clone();
    }

    // pod labels / annotations: union; step keys win.
    let metadata = spec.template.metadata.get_or_insert_with(Default::default);
    if let Some(labels) = &defaults.labels {
        let existing = metadata.labels.get_or_insert_with(BTreeMap::new);
        for (k, v) in labels {
            existing.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    if let Some(annotations) = &defaults.annotations {
        let existing = metadata.annotations.get_or_insert_with(BTreeMap::new);
        for (k, v) in annotations {
            existing.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    let pod_spec = spec.template.spec.get_or_insert_with(Default::default);

    for container in pod_spec.containers.iter_mut() {
        // env (per container): append pipeline env to each container.
        if let Some(env) = &defaults.env {
            container
                .env
                .get_or_insert_with(Vec::new)
                .extend(env.iter().cloned());
        }

        // envFrom (per container): append.
        if let Some(env_from) = &defaults.env_from {
            container
                .env_from
                .get_or_insert_with(Vec::new)
                .extend(env_from.iter().cloned());
        }

        // defaultResources: apply only to containers that have no
        // requests *and* no limits.
        if let Some(default_resources) = &defaults.default_resources {
            let has_requests = container
                .resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
                .map_or(false, |r| !r.is_empty());
            let has_limits = container
                .resources
                .as_ref()
                .and_then(|r| r.limits.as_ref())
                .map_or(false, |r| !r.is_empty());
            if !has_requests && !has_limits {
                container.resources = Some(default_resources.clone());
            }
        }

        // image: apply to containers with empty image.
        if container.image.as_ref().map_or(true, |v| v.is_empty()) {
            if let Some(image) = &defaults.image {
                container.image = Some(image.clone());
            }
        }
    }

    apply_shared_volume(pipeline, pod_spec);
}

/// Appends one volume named `sharedVolume.name` and mounts it at
/// `sharedVolume.mountPath` in every container. Containers that already
/// declare a mount at the same path are left as-is (§9, Open Questions).
fn apply_shared_volume(
    pipeline: &PipelineSpec,
    pod_spec: &mut k8s_openapi::api::core::v1::PodSpec,
) {
    let Some(shared) = &pipeline.shared_volume else {
        return;
    };

    let mut volume = shared.source.clone();
    volume.name = shared.name.clone();
    pod_spec.volumes.get_or_insert_with(Vec::new).push(volume);

    for container in pod_spec.containers.iter_mut() {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        let already_mounted = mounts.iter().any(|m| m.mount_path == shared.mount_path);
        if !already_mounted {
            mounts.push(VolumeMount {
                name: shared.name.clone(),
                mount_path: shared.mount_path.clone(),
                ..Default::default()
            });
        }
    }
}
