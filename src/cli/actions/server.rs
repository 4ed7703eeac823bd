use crate::{
    api::{self, ApiState},
    audit::AuditEmitter,
    cli::commands::policy::RateLimitStore,
    codes::{AccessCodeManager, AccessConfig, CodeStore, InMemoryCodeStore},
    crypto::{EncryptionService, KeyRing},
    profile::{InMemoryProfileStore, ProfileStore},
    rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimitPolicy, RateLimiter, sweeper},
    storage,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub encryption_keys: Vec<SecretString>,
    pub active_key_id: String,
    pub legacy_key: Option<SecretString>,
    pub access: AccessConfig,
    pub access_code_policy: RateLimitPolicy,
    pub rate_limit_store: Option<RateLimitStore>,
    pub sweep_interval: Duration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the key ring is invalid, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let specs: Vec<String> = args
        .encryption_keys
        .iter()
        .map(|spec| spec.expose_secret().to_string())
        .collect();
    let key_ring = KeyRing::from_specs(
        &specs,
        &args.active_key_id,
        args.legacy_key.as_ref().map(|key| key.expose_secret()),
    )
    .context("Invalid encryption key configuration")?;
    let encryption = Arc::new(EncryptionService::new(Arc::new(key_ring)));

    let limits = RateLimitConfig::new().with_access_code(args.access_code_policy);

    let codes: Arc<dyn CodeStore>;
    let profiles: Arc<dyn ProfileStore>;
    let limiter: Arc<dyn RateLimiter>;
    let audit: AuditEmitter;
    let pool = match &args.dsn {
        Some(dsn) => {
            let pool = storage::connect(dsn).await?;
            storage::apply_schema(&pool).await?;

            limiter = if args.rate_limit_store == Some(RateLimitStore::Memory) {
                warn!("Attempt counters are in memory; lockouts will not hold across instances");
                Arc::new(InMemoryRateLimiter::new(limits))
            } else {
                Arc::new(storage::PgRateLimiter::new(pool.clone(), limits))
            };
            codes = Arc::new(storage::PgCodeStore::new(pool.clone()));
            profiles = Arc::new(storage::PgProfileStore::new(pool.clone()));
            audit = AuditEmitter::new(Arc::new(storage::PgAuditSink::new(pool.clone())));
            Some(pool)
        }
        None => {
            warn!("No DSN configured; codes and profiles are kept in memory");
            limiter = Arc::new(InMemoryRateLimiter::new(limits));
            codes = Arc::new(InMemoryCodeStore::new());
            profiles = Arc::new(InMemoryProfileStore::new());
            audit = AuditEmitter::default();
            None
        }
    };

    let sweeper = sweeper::spawn(limiter.clone(), args.sweep_interval);

    let manager = AccessCodeManager::new(codes, profiles, limiter)
        .with_config(args.access)
        .with_audit(audit);

    let state = Arc::new(ApiState {
        manager,
        encryption,
        pool,
    });

    let result = api::new(args.port, state).await;
    sweeper.abort();
    result
}

fn log_startup_args(args: &Args) {
    let store = if args.dsn.is_some() { "postgres" } else { "memory" };
    info!(
        port = args.port,
        store,
        active_key_id = %args.active_key_id,
        keys = args.encryption_keys.len(),
        legacy_key = args.legacy_key.is_some(),
        code_length = args.access.code_length(),
        max_attempts = args.access_code_policy.max_attempts,
        sweep_interval_seconds = args.sweep_interval.as_secs(),
        "Starting carekey"
    );
}
