/*
 * File: lib.rs
 *
 * The library half of the pipeline-operator crate: everything that does not
 * depend on being inside the `main` binary lives here, so the `crdgen`
 * helper binary (src/bin/crdgen.rs) can pull in `crds` without duplicating
 * the module tree or linking against `main.rs`.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod config;
pub mod controller;
pub mod crds;
pub mod error;

pub use error::Error;

use config::Config;
use kube::Client;

/// The shared context struct passed to every reconcile/error_policy call.
/// It holds a Kubernetes client that can be cloned cheaply and the
/// operator's resolved configuration.
pub struct Context {
    pub client: Client,
    pub config: Config,
}
