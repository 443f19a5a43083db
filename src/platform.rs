//! Sign-in bootstrap: everything a client needs before matchmaking.

use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error, From};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::{ClientConfig, ConfigError};
use crate::session::{ClientId, SessionStatus};
use crate::store::{DocumentStore, Filter, StoreError, with_timeout};

/// Name of the sessions collection inside a namespace.
pub const GAMES_COLLECTION: &str = "games";

/// Context produced by sign-in and threaded through every operation.
#[derive(Debug, Clone, Getters)]
pub struct PlatformContext {
    /// Shared document store client.
    store: Arc<dyn DocumentStore>,
    /// This client's identity.
    client_id: ClientId,
    /// Application namespace.
    namespace: String,
    /// Deadline for each store call.
    store_timeout: Duration,
}

impl PlatformContext {
    /// Path of the namespaced sessions collection:
    /// `artifacts/{namespace}/public/data/games`.
    pub fn games_collection(&self) -> String {
        format!(
            "artifacts/{}/public/data/{}",
            self.namespace, GAMES_COLLECTION
        )
    }
}

/// Sign-in failure.
#[derive(Debug, Clone, Display, Error, From)]
pub enum PlatformError {
    /// The configuration is unusable.
    #[display("Sign-in failed: {}", _0)]
    Config(ConfigError),
    /// The store did not answer the reachability probe.
    #[display("Sign-in failed: {}", _0)]
    Connection(StoreError),
}

/// Signs a client in against `store`.
///
/// Assigns the configured client id or a fresh random one, and probes the
/// namespaced sessions collection so an unreachable store is reported here
/// rather than on the first click.
///
/// # Errors
///
/// Returns [`PlatformError`] if the config is invalid or the store is down.
#[instrument(skip(config, store), fields(namespace = %config.namespace()))]
pub async fn authenticate(
    config: &ClientConfig,
    store: Arc<dyn DocumentStore>,
) -> Result<PlatformContext, PlatformError> {
    config.validate()?;

    let client_id = config
        .client_id()
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let context = PlatformContext {
        store,
        client_id,
        namespace: config.namespace().clone(),
        store_timeout: config.store_timeout(),
    };

    let probe = Filter::eq("status", SessionStatus::Waiting.to_string());
    let collection = context.games_collection();
    with_timeout(
        context.store_timeout,
        context.store.query(&collection, &probe),
    )
    .await?;

    info!(client_id = %context.client_id, collection = %collection, "Signed in");
    Ok(context)
}
