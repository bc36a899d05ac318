//! Integration tests for the MinIO client
//!
//! These tests require a running MinIO instance.
//! Set MINIO_ENDPOINT, MINIO_ACCESS_KEY and MINIO_SECRET_KEY to run.

use futures::TryStreamExt;
use minio_client::{CannedPolicy, Credentials, MinIOClient, ObjectStoreClient};
use std::time::Duration;

fn client_from_env() -> MinIOClient {
    let endpoint = std::env::var("MINIO_ENDPOINT").unwrap_or_else(|_| "127.0.0.1:9000".to_string());
    let access_key = std::env::var("MINIO_ACCESS_KEY")
        .expect("MINIO_ACCESS_KEY environment variable must be set");
    let secret_key = std::env::var("MINIO_SECRET_KEY")
        .expect("MINIO_SECRET_KEY environment variable must be set");

    MinIOClient::new(
        &endpoint,
        &Credentials::new(access_key, secret_key),
        Duration::from_secs(10),
    )
    .expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running MinIO instance
async fn test_bucket_lifecycle() {
    let client = client_from_env();
    let bucket = "minio-client-it-lifecycle";

    client.make_bucket(bucket).await.expect("make_bucket");
    // Second create is a no-op for the owner
    client.make_bucket(bucket).await.expect("make_bucket again");
    assert!(client.bucket_exists(bucket).await.expect("bucket_exists"));

    client
        .put_object(bucket, "index.html", Vec::new())
        .await
        .expect("put_object");
    assert!(client.object_exists(bucket, "index.html").await.expect("object_exists"));

    let keys: Vec<String> = client
        .list_objects(bucket)
        .try_collect()
        .await
        .expect("list_objects");
    for key in keys {
        client.remove_object(bucket, &key).await.expect("remove_object");
    }
    client.remove_bucket(bucket).await.expect("remove_bucket");
    assert!(!client.bucket_exists(bucket).await.expect("bucket_exists"));
}

#[tokio::test]
#[ignore]
async fn test_canned_policy_round_trip() {
    let client = client_from_env();
    let bucket = "minio-client-it-policy";

    client.make_bucket(bucket).await.expect("make_bucket");

    let document = CannedPolicy::ReadOnly
        .document(bucket)
        .to_json()
        .expect("serialize policy");
    client
        .set_bucket_policy(bucket, Some(&document))
        .await
        .expect("set policy");

    let current = client.get_bucket_policy(bucket).await.expect("get policy");
    assert!(CannedPolicy::ReadOnly.is_applied(bucket, current.as_deref()));

    client.set_bucket_policy(bucket, None).await.expect("clear policy");
    assert!(client.get_bucket_policy(bucket).await.expect("get policy").is_none());

    client.remove_bucket(bucket).await.expect("remove_bucket");
}
