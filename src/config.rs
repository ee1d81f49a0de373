/*
 * File: config.rs
 *
 * Environment-driven tunables for the operator. There is no config file
 * format and no CLI flags: the operator's only inputs are its environment
 * and the Kubernetes API itself, matching the scope of the operator this
 * design is grounded on. Every value has a compiled-in default matching
 * the specification, so an empty environment is a valid environment.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::Duration;

/// Domain prefix for labels, annotations, and the finalizer this operator
/// owns. Baked in alongside the `#[kube(group = "...")]` attribute on
/// `Pipeline`; retargeting either requires editing both together.
pub const DOMAIN: &str = "pipelines.io";

#[derive(Debug, Clone)]
pub struct Config {
    /// Safety-timer requeue interval after a reconcile pass makes no
    /// further progress this tick (§4.7 step 11). Default 10 seconds.
    pub requeue_interval: Duration,

    /// Backoff applied by `error_policy` after a failed pass.
    pub error_requeue_interval: Duration,

    /// Finalizer string added on first observation and released only
    /// after all owned Jobs have been deleted (§4.6).
    pub finalizer: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            requeue_interval: Duration::from_secs(10),
            error_requeue_interval: Duration::from_secs(10),
            finalizer: format!("{DOMAIN}/finalizer"),
        }
    }
}

impl Config {
    /// Reads overrides from the environment, falling back to the defaults
    /// above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Some(secs) = env_u64("PIPELINE_REQUEUE_SECONDS") {
            cfg.requeue_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PIPELINE_ERROR_REQUEUE_SECONDS") {
            cfg.error_requeue_interval = Duration::from_secs(secs);
        }
        if let Ok(finalizer) = std::env::var("PIPELINE_FINALIZER") {
            if !finalizer.is_empty() {
                cfg.finalizer = finalizer;
            }
        }

        cfg
    }

    pub fn pipeline_label(&self) -> String {
        format!("{DOMAIN}/pipeline")
    }

    pub fn step_label(&self) -> String {
        format!("{DOMAIN}/step")
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
