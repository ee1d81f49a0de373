/*
 * File: controller/dependency.rs
 *
 * The dependency evaluator (§4.2). A pure function from a step's
 * declaration and the current status table to a `Readiness` verdict. No
 * I/O, no mutation: the orchestrator decides what to do with the verdict.
 *
 * Readiness is modeled as a three-variant enum rather than the spec's
 * `(ready: bool, skip: bool)` tuple: the mutual-exclusivity invariant
 * (testable property 6 — ready and skip are never both true) becomes a
 * type-level guarantee instead of a runtime assertion.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::crds::{PipelineSpec, PipelineStep, RunIfOperator, RunIfOutcome, StepPhase, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Wait,
    Skip,
}

/// Evaluates whether `step` is ready to launch, should be skipped, or must
/// keep waiting, given the current phases of every step in `statuses`.
///
/// `statuses` must contain one entry per declared step (invariant 1);
/// `pipeline.steps` gives the declaration order sequential mode depends on.
pub fn evaluate(pipeline: &PipelineSpec, step: &PipelineStep, statuses: &[StepStatus]) -> Readiness {
    match &step.run_if {
        None => evaluate_sequential(pipeline, step, statuses),
        Some(run_if) => {
            let refs: Vec<Option<StepPhase>> = run_if
                .steps
                .iter()
                .map(|name| phase_of(statuses, name))
                .collect();

            // Unknown step references block indefinitely (logged upstream by
            // the caller, not treated as a hard error here).
            let all_complete = refs.iter().all(|p| matches!(p, Some(p) if p.is_terminal()));
            if !all_complete {
                return Readiness::Wait;
            }

            let match_count = refs
                .iter()
                .filter(|p| match (run_if.condition, p) {
                    (RunIfOutcome::Success, Some(StepPhase::Succeeded)) => true,
                    (RunIfOutcome::Fail, Some(StepPhase::Failed)) => true,
                    _ => false,
                })
                .count();

            let condition_met = match run_if.operator {
                RunIfOperator::And => match_count == refs.len(),
                RunIfOperator::Or => match_count > 0,
            };

            if condition_met {
                Readiness::Ready
            } else {
                Readiness::Skip
            }
        }
    }
}

fn evaluate_sequential(pipeline: &PipelineSpec, step: &PipelineStep, statuses: &[StepStatus]) -> Readiness {
    let Some(index) = pipeline.steps.iter().position(|s| s.name == step.name) else {
        // Not a declared step; nothing this evaluator can do with it.
        return Readiness::Wait;
    };

    if index == 0 {
        return Readiness::Ready;
    }

    let mut any_incomplete = false;
    let mut any_terminal_failure = false;

    for prior in &pipeline.steps[..index] {
        match phase_of(statuses, &prior.name) {
            // Suspended counts as neither complete nor terminal; blocks
            // like Running.
            Some(StepPhase::Pending) | Some(StepPhase::Running) | Some(StepPhase::Suspended) => {
                any_incomplete = true;
            }
            Some(StepPhase::Failed) | Some(StepPhase::Skipped) => {
                any_terminal_failure = true;
            }
            Some(StepPhase::Succeeded) => {}
            None => any_incomplete = true,
        }
    }

    if any_incomplete {
        Readiness::Wait
    } else if any_terminal_failure {
        Readiness::Skip
    } else {
        Readiness::Ready
    }
}

/// A pending step whose `runIf.condition = fail` is a failure handler
/// (§4.5's `hasPendingFailureHandlers`).
pub fn is_failure_handler(step: &PipelineStep, status: &StepStatus) -> bool {
    status.phase == StepPhase::Pending
        && step
            .run_if
            .as_ref()
            .map_or(false, |r| r.condition == RunIfOutcome::Fail)
}

fn phase_of(statuses: &[StepStatus], name: &str) -> Option<StepPhase> {
    statuses.iter().find(|s| s.name == name).map(|s| s.phase)
}
