use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pubhub_edge::{
    AppState,
    cache::{CounterStore, MemoryCounterStore, PostgresCounterStore, RedisCounterStore},
    config::{Config, RateLimitBackend},
    infrastructure::{JwtVerifier, SupabaseAuthVerifier, SupabaseStorage, TokenVerifier},
    middleware::RateLimiter,
    router::create_router,
    storage::{BucketDescriptor, StorageApi, bootstrap_storage},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Arc::new(Config::from_env().context("failed to load configuration")?);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    // 令牌校验：配置了 JWT 密钥时本地校验，否则请求 Supabase Auth
    let verifier: Arc<dyn TokenVerifier> = match &config.jwt_secret {
        Some(secret) => {
            tracing::info!("verifying tokens locally with the project JWT secret");
            Arc::new(JwtVerifier::new(secret))
        }
        None => {
            tracing::info!("verifying tokens with the identity provider");
            Arc::new(SupabaseAuthVerifier::new(
                http.clone(),
                &config.supabase_url,
                &config.service_role_key,
            ))
        }
    };

    let store = counter_store(&config).await?;
    let limiter = Arc::new(
        RateLimiter::new(store.clone(), config.rate_limit_fail_open)
            .with_trusted_proxy_hops(config.trusted_proxy_hops),
    );

    let storage: Arc<dyn StorageApi> = Arc::new(SupabaseStorage::new(
        http,
        &config.supabase_url,
        &config.service_role_key,
    ));
    let bucket = Arc::new(BucketDescriptor::uploads(&config.storage_bucket));

    // 后台建桶，失败不影响启动
    {
        let storage = storage.clone();
        let bucket = bucket.clone();
        tokio::spawn(async move { bootstrap_storage(storage.as_ref(), &bucket).await });
    }

    // 定期清理过期计数器
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(purged = n, "purged expired rate limit counters"),
                Err(e) => tracing::warn!(error = %e, "failed to purge rate limit counters"),
            }
        }
    });

    let state = AppState {
        config: config.clone(),
        verifier,
        limiter,
        storage,
        bucket,
    };
    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(
        "Server listening on {}{}",
        listener.local_addr()?,
        config.api_base_uri
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn counter_store(config: &Config) -> anyhow::Result<Arc<dyn CounterStore>> {
    match config.rate_limit_backend {
        RateLimitBackend::Memory => {
            tracing::warn!("using in-memory rate limit counters, limits are per instance");
            Ok(Arc::new(MemoryCounterStore::new()))
        }
        RateLimitBackend::Redis => {
            let url = config.redis_url.as_deref().context("REDIS_URL is not set")?;
            let client = redis::Client::open(url).context("failed to create Redis client")?;
            tracing::info!("using Redis rate limit counters");
            Ok(Arc::new(RedisCounterStore::new(Arc::new(client))))
        }
        RateLimitBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is not set")?;
            // 设置数据库连接池
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .after_connect(|conn, _meta| {
                    Box::pin(async move {
                        conn.execute("SET application_name = 'pubhub_edge';")
                            .await?;
                        Ok(())
                    })
                })
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            let store = PostgresCounterStore::new(pool);
            store
                .ensure_schema()
                .await
                .context("failed to create rate limit table")?;
            tracing::info!("using Postgres rate limit counters");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
