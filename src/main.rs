/*
 * File: main.rs
 *
 * This file is the main entry point for the pipeline-operator. It is
 * responsible for setting up and running the controller manager, which in
 * turn hosts and executes the reconciliation loop for the `Pipeline`
 * custom resource.
 *
 * Architecture:
 * 1. **Initialization**: It begins by initializing a Kubernetes client, which
 *    provides the connection to the cluster's API server. Tracing (logging)
 *    is also set up to provide structured, observable output, controlled by
 *    the `RUST_LOG` environment variable.
 * 2. **Configuration**: environment-driven tunables (requeue interval,
 *    finalizer name) are read once at startup into a `Config`.
 * 3. **Controller Manager**: A single `Controller` from `kube-rs` is
 *    instantiated for the `Pipeline` CRD. The `Controller` is the core
 *    component that manages the "watch" and "reconcile" loop.
 *    - It watches for any changes (creations, updates, deletions) to
 *      `Pipeline` resources cluster-wide.
 *    - For each change event, it triggers `controller::pipeline::reconcile`.
 *    - It is configured with an error handling function (`error_policy`)
 *      that is invoked whenever the reconciliation logic returns an error.
 * 4. **Shared Context**: A shared `Context` object, containing the
 *    Kubernetes client and the resolved `Config`, is created. This context
 *    is passed down to every reconcile invocation, providing it with the
 *    tools needed to interact with the cluster without re-initializing a
 *    client on every event.
 *
 * This top-level orchestration ensures the operator's logic is properly
 * initialized and executed within the asynchronous `tokio` runtime.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use futures::stream::StreamExt;
use kube::runtime::controller::Controller;
use kube::runtime::watcher;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{error, info};

use pipeline_operator::config::Config;
use pipeline_operator::crds::Pipeline;
use pipeline_operator::{controller, Context};

/// The main entry point of the operator.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 1. Initialize Kubernetes Client.
    // This client is the main interface to the Kubernetes API server.
    let client = Client::try_default().await?;
    let config = Config::from_env();

    // 2. Create the API for our Custom Resource, scoped to all namespaces.
    let pipelines = Api::<Pipeline>::all(client.clone());

    // 3. Create the shared context. Arc is used for safe, concurrent access
    // across every reconcile invocation the Controller spawns.
    let context = Arc::new(Context { client, config });

    info!("pipeline-operator starting");

    // 4. Run the controller. `shutdown_on_signal` makes the run future
    // resolve on SIGTERM/SIGINT so the process exits cleanly under
    // Kubernetes' own pod termination handling.
    Controller::new(pipelines, watcher::Config::default())
        .shutdown_on_signal()
        .run(
            controller::pipeline::reconcile,
            controller::pipeline::error_policy,
            context,
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => info!(?o, "reconciled pipeline"),
                Err(e) => error!(error = %e, "reconcile error"),
            }
        })
        .await;

    info!("pipeline-operator shutting down");
    Ok(())
}
