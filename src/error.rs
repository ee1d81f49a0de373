/*
 * File: error.rs
 *
 * Closed error taxonomy for the Pipeline reconciler, per the error handling
 * design (§7): transient I/O surfaces upward for the framework to retry;
 * not-found on the Pipeline itself or on a referenced Job is handled inline
 * as control flow and never reaches this type.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Any Kubernetes API failure: network, timeout, conflict on update,
    /// or a rejected create/patch. Surfaced to `error_policy`, which
    /// requeues with backoff; nothing is retried inside this crate.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A `Pipeline` object without a namespace. Cannot happen through the
    /// namespaced API in practice, but `kube-rs`'s types still model the
    /// field as optional.
    #[error("Pipeline object has no namespace")]
    MissingNamespace,

    /// A step name that does not satisfy the platform's DNS-subdomain
    /// label charset once combined with the pipeline name, checked before
    /// any Job is constructed for it.
    #[error("step {step:?} has an invalid name: {reason}")]
    InvalidStepName { step: String, reason: String },

    /// A `status` patch or a Job spec failed to serialize to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Propagated from the `kube::runtime::finalizer` helper, which wraps
    /// either our own apply/cleanup error or a finalizer-management
    /// failure of its own.
    #[error("finalizer error: {0}")]
    Finalizer(#[from] Box<kube::runtime::finalizer::Error<Error>>),
}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(e: kube::runtime::finalizer::Error<Error>) -> Self {
        Error::Finalizer(Box::new(e))
    }
}
