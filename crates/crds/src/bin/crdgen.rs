//! Prints the CustomResourceDefinitions as a multi-document YAML stream.

use crds::{Cluster, Machine};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [Machine::crd(), Cluster::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
