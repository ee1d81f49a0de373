/*
 * File: crds.rs
 *
 * This file defines the Rust data structures that correspond to the
 * `Pipeline` Custom Resource Definition (CRD). By using the
 * `kube::CustomResource` derive macro, we get a strongly-typed
 * representation of the custom API, enabling safe and idiomatic
 * interaction with the Kubernetes API server.
 *
 * Architecture:
 * - `Pipeline`, decorated with `#[derive(CustomResource)]`, represents the
 *   single API Kind this operator manages. The `#[kube(...)]` attribute maps
 *   the Rust struct to its CRD (group, version, kind); this metadata MUST
 *   match the CRD manifest applied to the cluster.
 * - `PipelineSpec` holds the user's desired state: pipeline-wide pod
 *   defaults, an optional shared volume, and the ordered list of steps.
 * - `PipelineStatus` is managed exclusively by the reconciler and reports
 *   per-step and aggregate progress.
 * - `serde` attributes map idiomatic Rust `snake_case` field names onto the
 *   idiomatic Kubernetes `camelCase` wire format.
 * - `schemars` generates the OpenAPI v3 schema embedded in the CRD manifest,
 *   enabling server-side validation and typed `kubectl` integration.
 * - Phases and condition keywords are closed enums rather than open
 *   strings: an unrecognized tag read back from persisted status is a hard
 *   deserialization error, since `status` is author-controlled exclusively
 *   by this reconciler (see the "Polymorphic step outcomes" design note).
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use k8s_openapi::api::batch::v1::JobSpec;
use k8s_openapi::api::core::v1::{
    Affinity, EnvFromSource, EnvVar, LocalObjectReference, PodSecurityContext,
    ResourceRequirements, Toleration, Volume,
};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// # Pipeline
/// Groups an ordered sequence of single-shot Jobs ("steps") into a
/// dependency-aware execution plan. Creating a `Pipeline` resource causes
/// this operator to materialize each step's job template as a Kubernetes
/// `Job`, track its outcome, and decide what runs next.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "pipelines.io",
    version = "v1",
    kind = "Pipeline",
    namespaced,
    status = "PipelineStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    shortname = "pl"
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    /// Identity applied to every step's pod when the pod does not specify
    /// its own service account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Pipeline-wide pod defaults, merged into every step's pod template
    /// per the composer's field-by-field rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateDefaults>,

    /// A volume mounted into every container of every step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_volume: Option<SharedVolume>,

    /// Ordered sequence of steps. Order is significant for default
    /// sequential dependency semantics.
    pub steps: Vec<PipelineStep>,
}

/// Pipeline-wide defaults merged into every step's pod template by the
/// composer (§4.1). Each field is applied only where the step left the
/// corresponding setting unspecified, except where the merge table calls
/// for union/append semantics.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_from: Option<Vec<EnvFromSource>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A volume appended to every step's pod and mounted into every container.
/// `name` defaults to `workspace`, `mount_path` to `/workspace`.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SharedVolume {
    #[serde(default = "default_shared_volume_name")]
    pub name: String,

    #[serde(default = "default_shared_volume_mount_path")]
    pub mount_path: String,

    /// The volume itself (emptyDir, PVC claim, etc.), built the way the
    /// rest of this crate builds `Volume` values directly rather than
    /// through a separate source union type. `name` above is authoritative;
    /// whatever this carries in its own `name` field is overwritten when
    /// the volume is appended to a pod (§4.1).
    #[serde(flatten)]
    pub source: Volume,
}

fn default_shared_volume_name() -> String {
    "workspace".to_string()
}

fn default_shared_volume_mount_path() -> String {
    "/workspace".to_string()
}

/// One entry in a Pipeline's ordered step list.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// Unique within the pipeline; used as a stable identifier in
    /// dependencies and in the derived Job name (`{pipelineName}-{name}`).
    pub name: String,

    /// The Job template to materialize once this step becomes ready.
    pub job_spec: JobSpec,

    /// Replaces default sequential dependency semantics with an explicit
    /// boolean expression over other steps' outcomes. Absent implies
    /// sequential semantics (§4.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if: Option<RunIfCondition>,
}

/// An explicit readiness expression over the outcomes of other steps.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunIfCondition {
    /// Non-empty list of referenced step names. May refer forward or
    /// backward in declaration order.
    pub steps: Vec<String>,

    /// Which outcome on the referenced steps satisfies the clause.
    #[serde(default)]
    pub condition: RunIfOutcome,

    /// How the referenced steps' outcomes combine.
    #[serde(default)]
    pub operator: RunIfOperator,
}

/// The outcome a `runIf` clause is testing for.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RunIfOutcome {
    Success,
    Fail,
}

impl Default for RunIfOutcome {
    fn default() -> Self {
        RunIfOutcome::Success
    }
}

/// How a `runIf` clause combines multiple referenced steps.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RunIfOperator {
    And,
    Or,
}

impl Default for RunIfOperator {
    fn default() -> Self {
        RunIfOperator::And
    }
}

/// The observed state of a `Pipeline`, written exclusively by this
/// reconciler.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PipelinePhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<chrono::DateTime<chrono::Utc>>,

    /// One entry per declared step, in declaration order.
    #[serde(default)]
    pub steps: Vec<StepStatus>,

    #[serde(default)]
    pub conditions: Vec<PipelineCondition>,
}

/// The aggregate phase of a `Pipeline`. A closed enum: an unrecognized tag
/// read back from persisted status fails to deserialize rather than being
/// silently coerced, since only this reconciler ever writes this field.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum PipelinePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Suspended,
}

impl PipelinePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelinePhase::Succeeded | PipelinePhase::Failed)
    }
}

/// The phase of a single step within a `Pipeline`.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum StepPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    Suspended,
}

impl StepPhase {
    /// Sink phases per invariant 3: once reached, a step's phase never
    /// changes in any subsequent pass (testable property 2).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepPhase::Succeeded | StepPhase::Failed | StepPhase::Skipped
        )
    }
}

/// Per-step observed state.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    /// Mirror of the declared step name.
    pub name: String,

    pub phase: StepPhase,

    /// Name of the materialized Job once created; empty before. Per
    /// invariant 2, stable once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,

    /// Last-observed snapshot of the Job's status, copied for visibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatusSnapshot>,
}

impl StepStatus {
    pub fn pending(name: impl Into<String>) -> Self {
        StepStatus {
            name: name.into(),
            phase: StepPhase::Pending,
            job_name: None,
            job_status: None,
        }
    }
}

/// Subset of `k8s_openapi::api::batch::v1::JobStatus` this operator reads
/// and reports, copied rather than embedding the upstream type directly so
/// that `PipelineStatus`'s schema stays self-contained.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(default)]
    pub conditions: Vec<JobConditionSnapshot>,
}

/// A single condition copied from an observed Job's status.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobConditionSnapshot {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A typed condition in `status.conditions`. At minimum a `Ready`
/// condition is present once status is initialized.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}
