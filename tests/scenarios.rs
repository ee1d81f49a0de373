/*
 * File: tests/scenarios.rs
 *
 * End-to-end scenario tests (§8) driven entirely through the reconciler's
 * pure decision functions — dependency evaluation, phase analysis, and
 * phase mapping — without a live API server. Each test advances a
 * `Vec<StepStatus>` by hand, the way successive reconcile passes would,
 * and asserts the step/pipeline phases the scenario's prose describes.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use k8s_openapi::api::batch::v1::JobSpec;
use pipeline_operator::controller::{analyzer, conditions, dependency};
use pipeline_operator::crds::{
    PipelinePhase, PipelineSpec, PipelineStep, RunIfCondition, RunIfOperator, RunIfOutcome,
    StepPhase, StepStatus,
};

fn step(name: &str, run_if: Option<RunIfCondition>) -> PipelineStep {
    PipelineStep {
        name: name.into(),
        job_spec: JobSpec::default(),
        run_if,
    }
}

fn pipeline(steps: Vec<PipelineStep>) -> PipelineSpec {
    PipelineSpec {
        service_account_name: None,
        pod_template: None,
        shared_volume: None,
        steps,
    }
}

fn pipeline_phase(spec: &PipelineSpec, statuses: &[StepStatus]) -> Option<PipelinePhase> {
    let summary = analyzer::analyze(&spec.steps, statuses);
    conditions::next_phase(&summary)
}

/// Launches every step the dependency evaluator reports `Ready` or `Skip`
/// for, in declaration order, mutating `statuses` in place — mirroring
/// §4.4's ordering guarantee for a single reconcile pass.
fn launch_ready_and_skip(spec: &PipelineSpec, statuses: &mut [StepStatus]) {
    for s in &spec.steps {
        let idx = statuses.iter().position(|st| st.name == s.name).unwrap();
        if statuses[idx].phase != StepPhase::Pending {
            continue;
        }
        match dependency::evaluate(spec, s, statuses) {
            dependency::Readiness::Ready => statuses[idx].phase = StepPhase::Running,
            dependency::Readiness::Skip => statuses[idx].phase = StepPhase::Skipped,
            dependency::Readiness::Wait => {}
        }
    }
}

#[test]
fn scenario_a_sequential_happy_path() {
    let spec = pipeline(vec![step("a", None), step("b", None), step("c", None)]);
    let mut statuses = vec![
        StepStatus::pending("a"),
        StepStatus::pending("b"),
        StepStatus::pending("c"),
    ];

    // Pass 1: only `a` is ready.
    launch_ready_and_skip(&spec, &mut statuses);
    assert_eq!(statuses[0].phase, StepPhase::Running);
    assert_eq!(statuses[1].phase, StepPhase::Pending);
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Running));

    // `a` succeeds; pass 2 launches `b`.
    statuses[0].phase = StepPhase::Succeeded;
    launch_ready_and_skip(&spec, &mut statuses);
    assert_eq!(statuses[1].phase, StepPhase::Running);
    assert_eq!(statuses[2].phase, StepPhase::Pending);

    // `b` succeeds; pass 3 launches `c`.
    statuses[1].phase = StepPhase::Succeeded;
    launch_ready_and_skip(&spec, &mut statuses);
    assert_eq!(statuses[2].phase, StepPhase::Running);

    // `c` succeeds; pipeline converges to Succeeded.
    statuses[2].phase = StepPhase::Succeeded;
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Succeeded));
    assert_eq!(
        statuses.iter().map(|s| s.phase).collect::<Vec<_>>(),
        vec![StepPhase::Succeeded, StepPhase::Succeeded, StepPhase::Succeeded]
    );
}

#[test]
fn scenario_b_skip_on_failure() {
    let spec = pipeline(vec![step("a", None), step("b", None), step("c", None)]);
    let mut statuses = vec![
        StepStatus::pending("a"),
        StepStatus::pending("b"),
        StepStatus::pending("c"),
    ];

    launch_ready_and_skip(&spec, &mut statuses);
    statuses[0].phase = StepPhase::Failed;

    // One pass suffices: `b` skips once `a`'s failure is visible, and `c`
    // observes `b` already Skipped within the same declaration-ordered
    // pass, per §4.4's "steps unblocked by the same prior transition may
    // be launched in one pass" note.
    launch_ready_and_skip(&spec, &mut statuses);
    assert_eq!(statuses[1].phase, StepPhase::Skipped);
    assert_eq!(statuses[2].phase, StepPhase::Skipped);

    assert_eq!(
        statuses.iter().map(|s| s.phase).collect::<Vec<_>>(),
        vec![StepPhase::Failed, StepPhase::Skipped, StepPhase::Skipped]
    );
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Failed));
}

#[test]
fn scenario_c_failure_handler_keeps_pipeline_running_then_fails() {
    let cleanup = step(
        "cleanup",
        Some(RunIfCondition {
            steps: vec!["build".into()],
            condition: RunIfOutcome::Fail,
            operator: RunIfOperator::And,
        }),
    );
    let spec = pipeline(vec![step("build", None), cleanup]);
    let mut statuses = vec![StepStatus::pending("build"), StepStatus::pending("cleanup")];

    launch_ready_and_skip(&spec, &mut statuses);
    statuses[0].phase = StepPhase::Failed;

    // While `build` has just failed and `cleanup` is still pending, the
    // pipeline stays Running — cleanup is a pending failure handler.
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Running));

    launch_ready_and_skip(&spec, &mut statuses);
    assert_eq!(statuses[1].phase, StepPhase::Running);

    // `cleanup` fails too: pipeline phase is Failed, both steps Failed.
    statuses[1].phase = StepPhase::Failed;
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Failed));

    // `cleanup` succeeding instead still leaves the pipeline Failed — a
    // compensating step cannot un-fail the primary path (§8 scenario C).
    statuses[1].phase = StepPhase::Succeeded;
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Failed));
}

#[test]
fn scenario_d_run_if_success_or_does_not_suppress_primary_failure() {
    let notify = step(
        "notify",
        Some(RunIfCondition {
            steps: vec!["primary".into(), "fallback".into()],
            condition: RunIfOutcome::Success,
            operator: RunIfOperator::Or,
        }),
    );
    let spec = pipeline(vec![step("primary", None), step("fallback", None), notify]);
    let mut statuses = vec![
        StepStatus::pending("primary"),
        StepStatus::pending("fallback"),
        StepStatus::pending("notify"),
    ];

    statuses[0].phase = StepPhase::Failed;
    statuses[1].phase = StepPhase::Succeeded;
    launch_ready_and_skip(&spec, &mut statuses);
    assert_eq!(statuses[2].phase, StepPhase::Running);
    statuses[2].phase = StepPhase::Succeeded;

    assert_eq!(
        statuses.iter().map(|s| s.phase).collect::<Vec<_>>(),
        vec![StepPhase::Failed, StepPhase::Succeeded, StepPhase::Succeeded]
    );
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Failed));
}

#[test]
fn scenario_e_suspended_then_resumed() {
    let spec = pipeline(vec![step("a", None)]);
    let mut statuses = vec![StepStatus::pending("a")];

    statuses[0].phase = StepPhase::Suspended;
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Suspended));

    // Resumed externally: active count rises again, updater would map it
    // back to Running (exercised directly in controller::status's tests);
    // here we assert the pipeline-level consequence of that step phase.
    statuses[0].phase = StepPhase::Running;
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Running));
}

#[test]
fn boundary_zero_steps_is_vacuously_succeeded() {
    let spec = pipeline(vec![]);
    let statuses: Vec<StepStatus> = vec![];
    assert_eq!(pipeline_phase(&spec, &statuses), Some(PipelinePhase::Succeeded));
}
