//! Prints the MinIOBucket CustomResourceDefinition as YAML.
//!
//! `MinIOInstance` is owned by the MinIO operator and is not emitted.

use crds::MinIOBucket;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&MinIOBucket::crd())?);
    Ok(())
}
