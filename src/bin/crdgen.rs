/*
 * File: bin/crdgen.rs
 *
 * Emits the `Pipeline` CRD's OpenAPI schema, as derived by `schemars` via
 * the `kube::CustomResource` macro, to stdout as YAML. Cluster operators
 * apply the result with `kubectl apply -f -`; this binary performs no
 * cluster I/O itself (§1: CRD registration is out of scope for the
 * reconciler, but the schema the derive macro already computed would
 * otherwise go unused).
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kube::CustomResourceExt;
use pipeline_operator::crds::Pipeline;

fn main() {
    let crd = Pipeline::crd();
    print!(
        "{}",
        serde_yaml::to_string(&crd).expect("CRD serializes to YAML")
    );
}
