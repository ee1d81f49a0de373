/*
 * File: controller/analyzer.rs
 *
 * The pipeline-state analyzer (§4.5). Reduces the step-phase multiset to
 * the aggregate facts the phase-mapping table conditions on. Pure
 * function: takes a snapshot of `StepStatus`/`PipelineStep` pairs, returns
 * a plain summary struct. `conditions.rs` turns the summary into the new
 * phase and the `Ready` condition; this module only computes the facts.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::controller::dependency::is_failure_handler;
use crate::crds::{PipelineStep, StepPhase, StepStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub all_succeeded: bool,
    pub any_running: bool,
    pub any_pending: bool,
    pub any_failed: bool,
    pub any_suspended: bool,
    pub has_pending_failure_handlers: bool,
    pub suspended_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub succeeded_count: usize,
    pub total_count: usize,
}

/// `steps` and `statuses` must correspond index-for-index (both ordered by
/// declaration, invariant 1).
pub fn analyze(steps: &[PipelineStep], statuses: &[StepStatus]) -> Summary {
    let total_count = statuses.len();
    let mut summary = Summary {
        all_succeeded: true,
        total_count,
        ..Default::default()
    };

    for status in statuses {
        match status.phase {
            StepPhase::Succeeded => summary.succeeded_count += 1,
            StepPhase::Skipped => {}
            StepPhase::Running => {
                summary.any_running = true;
                summary.all_succeeded = false;
            }
            StepPhase::Pending => {
                summary.any_pending = true;
                summary.all_succeeded = false;
            }
            StepPhase::Failed => {
                summary.any_failed = true;
                summary.all_succeeded = false;
                summary.failed_steps.push(status.name.clone());
            }
            StepPhase::Suspended => {
                summary.any_suspended = true;
                summary.all_succeeded = false;
                summary.suspended_steps.push(status.name.clone());
            }
        }

        if status.phase == StepPhase::Pending {
            if let Some(step) = steps.iter().find(|s| s.name == status.name) {
                if is_failure_handler(step, status) {
                    summary.has_pending_failure_handlers = true;
                }
            }
        }
    }

    summary
}
