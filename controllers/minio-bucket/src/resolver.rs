//! Backend instance resolution.

use crate::error::ControllerError;
use crate::store::ResourceStore;
use crds::{InstanceSelector, MinIOInstance};
use std::sync::Arc;
use tracing::debug;

/// Outcome of resolving a selector
#[derive(Debug)]
pub enum Resolution {
    /// No instance matches yet; not an error
    NotReady,
    Resolved(MinIOInstance),
}

/// Maps a MinIOBucket's selector to exactly one MinIOInstance
pub struct BackendResolver {
    store: Arc<dyn ResourceStore>,
}

impl BackendResolver {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        namespace: &str,
        selector: &InstanceSelector,
    ) -> Result<Resolution, ControllerError> {
        let mut instances = self.store.list_instances(namespace, selector).await?;
        match instances.len() {
            0 => {
                debug!("No MinIOInstance in {} matches {}", namespace, selector);
                Ok(Resolution::NotReady)
            }
            1 => Ok(Resolution::Resolved(instances.remove(0))),
            count => {
                debug!(
                    "Selector {} matches {} MinIOInstances in {}",
                    selector, count, namespace
                );
                Err(ControllerError::AmbiguousBackend(format!(
                    "selector {} matches {} MinIOInstances in {}",
                    selector, count, namespace
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeResourceStore, instance};

    fn selector() -> InstanceSelector {
        InstanceSelector::from_labels([("app", "minio")])
    }

    #[tokio::test]
    async fn test_no_match_is_not_ready() {
        let store = Arc::new(FakeResourceStore::new());
        let resolver = BackendResolver::new(store);

        let resolution = resolver.resolve("ns", &selector()).await.unwrap();
        assert!(matches!(resolution, Resolution::NotReady));
    }

    #[tokio::test]
    async fn test_single_match_resolves() {
        let store = Arc::new(FakeResourceStore::new());
        store.add_instance(instance("ns", "minio", &[("app", "minio")]));
        store.add_instance(instance("ns", "other", &[("app", "other")]));
        store.add_instance(instance("elsewhere", "minio", &[("app", "minio")]));
        let resolver = BackendResolver::new(store);

        match resolver.resolve("ns", &selector()).await.unwrap() {
            Resolution::Resolved(found) => {
                assert_eq!(found.metadata.name.as_deref(), Some("minio"));
                assert_eq!(found.metadata.namespace.as_deref(), Some("ns"));
            }
            Resolution::NotReady => panic!("expected a resolved instance"),
        }
    }

    #[tokio::test]
    async fn test_multiple_matches_are_ambiguous() {
        let store = Arc::new(FakeResourceStore::new());
        store.add_instance(instance("ns", "minio-a", &[("app", "minio")]));
        store.add_instance(instance("ns", "minio-b", &[("app", "minio")]));
        let resolver = BackendResolver::new(store);

        let err = resolver.resolve("ns", &selector()).await.unwrap_err();
        assert!(matches!(err, ControllerError::AmbiguousBackend(ref msg) if msg.contains("2")));
        assert!(err.is_configuration_defect());
        // The error alone carries what the failure log needs
        let rendered = err.to_string();
        assert!(rendered.contains("app=minio"), "{}", rendered);
        assert!(rendered.contains("in ns"), "{}", rendered);
    }
}
