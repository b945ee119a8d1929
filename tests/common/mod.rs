//! Shared scaffolding for integration tests that need a live MongoDB. Tests using this
//! module skip (rather than fail) when `MONGOPAL_TEST_MONGODB_URI` isn't set, so CI
//! runs without a database available still pass.

use mongodb::Client;

/// Returns a connected client against `MONGOPAL_TEST_MONGODB_URI`, or `None` if the
/// variable isn't set.
pub async fn test_client() -> Option<Client> {
    let uri = std::env::var("MONGOPAL_TEST_MONGODB_URI").ok()?;
    Client::with_uri_str(&uri).await.ok()
}

/// A collection name scoped to this test run, to avoid collisions between parallel
/// test binaries hitting the same database.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
