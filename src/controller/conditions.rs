/*
 * File: controller/conditions.rs
 *
 * Phase mapping and `Ready` condition derivation (§4.5, second half). Takes
 * the analyzer's `Summary` and the pipeline's current phase, and produces
 * the next phase plus the `Ready` condition text. Condition writes
 * preserve any condition type this reconciler did not itself author.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::controller::analyzer::Summary;
use crate::crds::{ConditionStatus, PipelineCondition, PipelinePhase};
use chrono::{DateTime, Utc};

pub const READY_CONDITION: &str = "Ready";

/// Phase-mapping table, evaluated in order; first match wins. Returns
/// `None` when no rule matches, meaning the phase is unchanged.
pub fn next_phase(summary: &Summary) -> Option<PipelinePhase> {
    if summary.any_suspended && !summary.any_running {
        Some(PipelinePhase::Suspended)
    } else if summary.any_failed
        && !summary.any_running
        && !summary.any_suspended
        && !summary.has_pending_failure_handlers
    {
        Some(PipelinePhase::Failed)
    } else if summary.all_succeeded {
        Some(PipelinePhase::Succeeded)
    } else if summary.any_running || summary.has_pending_failure_handlers {
        Some(PipelinePhase::Running)
    } else {
        None
    }
}

/// Builds the `Ready` condition for `phase`, given the analyzer summary
/// and (for `Succeeded`) the pipeline's recorded start time. `previous` is
/// the `Ready` condition currently in `status.conditions`, if any: per the
/// `metav1.Condition` convention, `lastTransitionTime` only advances when
/// `status` or `reason` actually changes, not on every message update (e.g.
/// the running step count ticking up leaves `lastTransitionTime` alone).
pub fn ready_condition(
    phase: PipelinePhase,
    summary: &Summary,
    start_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    previous: Option<&PipelineCondition>,
) -> PipelineCondition {
    let (status, reason, message) = match phase {
        PipelinePhase::Pending => (
            ConditionStatus::False,
            "Pending".to_string(),
            "Pipeline is pending".to_string(),
        ),
        PipelinePhase::Running => (
            ConditionStatus::False,
            "Running".to_string(),
            format!(
                "{}/{} steps completed, {} running",
                summary.succeeded_count,
                summary.total_count,
                running_count(summary)
            ),
        ),
        PipelinePhase::Suspended => (
            ConditionStatus::False,
            "Suspended".to_string(),
            format!("suspended steps: {}", summary.suspended_steps.join(", ")),
        ),
        PipelinePhase::Succeeded => {
            let duration = start_time
                .map(|s| format_duration(now - s))
                .unwrap_or_else(|| "unknown duration".to_string());
            (
                ConditionStatus::True,
                "Succeeded".to_string(),
                format!("pipeline completed in {duration}"),
            )
        }
        PipelinePhase::Failed => (
            ConditionStatus::False,
            "Failed".to_string(),
            format!("failed steps: {}", summary.failed_steps.join(", ")),
        ),
    };

    let last_transition_time = match previous {
        Some(prev) if prev.status == status && prev.reason == reason => prev.last_transition_time,
        _ => now,
    };

    PipelineCondition {
        type_: READY_CONDITION.to_string(),
        status,
        reason,
        message,
        last_transition_time,
    }
}

fn running_count(summary: &Summary) -> usize {
    summary.total_count - summary.succeeded_count - summary.failed_steps.len() - summary.suspended_steps.len()
}

fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{secs}s")
}

/// Finds the current `Ready` condition, if `status.conditions` has one yet.
pub fn find_ready(conditions: &[PipelineCondition]) -> Option<&PipelineCondition> {
    conditions.iter().find(|c| c.type_ == READY_CONDITION)
}

/// Replaces the `Ready` entry in `conditions` with `new_ready`, leaving
/// every other condition type untouched.
pub fn upsert_ready(conditions: &mut Vec<PipelineCondition>, new_ready: PipelineCondition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == READY_CONDITION) {
        *existing = new_ready;
    } else {
        conditions.push(new_ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(overrides: impl FnOnce(&mut Summary)) -> Summary {
        let mut s = Summary::default();
        overrides(&mut s);
        s
    }

    #[test]
    fn suspended_without_running_wins_over_failed() {
        let s = summary(|s| {
            s.any_suspended = true;
            s.any_failed = true;
        });
        assert_eq!(next_phase(&s), Some(PipelinePhase::Suspended));
    }

    #[test]
    fn failed_requires_no_running_and_no_pending_handlers() {
        let s = summary(|s| s.any_failed = true);
        assert_eq!(next_phase(&s), Some(PipelinePhase::Failed));
    }

    #[test]
    fn failed_is_suppressed_by_pending_failure_handler() {
        let s = summary(|s| {
            s.any_failed = true;
            s.has_pending_failure_handlers = true;
        });
        assert_eq!(next_phase(&s), Some(PipelinePhase::Running));
    }

    #[test]
    fn all_succeeded_maps_to_succeeded() {
        let s = summary(|s| s.all_succeeded = true);
        assert_eq!(next_phase(&s), Some(PipelinePhase::Succeeded));
    }

    #[test]
    fn running_maps_to_running() {
        let s = summary(|s| s.any_running = true);
        assert_eq!(next_phase(&s), Some(PipelinePhase::Running));
    }

    #[test]
    fn no_rule_matches_returns_none() {
        let s = summary(|s| s.any_pending = true);
        assert_eq!(next_phase(&s), None);
    }

    #[test]
    fn ready_condition_preserves_other_condition_types() {
        let mut conditions = vec![PipelineCondition {
            type_: "CustomProbe".to_string(),
            status: ConditionStatus::True,
            reason: "OK".to_string(),
            message: "fine".to_string(),
            last_transition_time: Utc::now(),
        }];
        let ready = PipelineCondition {
            type_: READY_CONDITION.to_string(),
            status: ConditionStatus::True,
            reason: "Succeeded".to_string(),
            message: "done".to_string(),
            last_transition_time: Utc::now(),
        };
        upsert_ready(&mut conditions, ready);
        assert_eq!(conditions.len(), 2);
        assert!(conditions.iter().any(|c| c.type_ == "CustomProbe"));
    }

    #[test]
    fn succeeded_message_includes_duration() {
        let s = summary(|s| s.all_succeeded = true);
        let start = Utc::now() - chrono::Duration::seconds(42);
        let now = Utc::now();
        let cond = ready_condition(PipelinePhase::Succeeded, &s, Some(start), now, None);
        assert!(cond.message.contains("42s"));
    }

    #[test]
    fn last_transition_time_carries_forward_when_status_and_reason_unchanged() {
        let s = summary(|s| s.any_running = true);
        let earlier = Utc::now() - chrono::Duration::seconds(120);
        let previous = PipelineCondition {
            type_: READY_CONDITION.to_string(),
            status: ConditionStatus::False,
            reason: "Running".to_string(),
            message: "0/3 steps completed, 1 running".to_string(),
            last_transition_time: earlier,
        };
        let now = Utc::now();
        let cond = ready_condition(PipelinePhase::Running, &s, None, now, Some(&previous));
        assert_eq!(cond.last_transition_time, earlier);
        assert_ne!(cond.message, previous.message);
    }

    #[test]
    fn last_transition_time_advances_when_reason_changes() {
        let s = summary(|s| s.all_succeeded = true);
        let earlier = Utc::now() - chrono::Duration::seconds(120);
        let previous = PipelineCondition {
            type_: READY_CONDITION.to_string(),
            status: ConditionStatus::False,
            reason: "Running".to_string(),
            message: "2/3 steps completed, 0 running".to_string(),
            last_transition_time: earlier,
        };
        let now = Utc::now();
        let cond = ready_condition(PipelinePhase::Succeeded, &s, Some(earlier), now, Some(&previous));
        assert_eq!(cond.last_transition_time, now);
    }
}
