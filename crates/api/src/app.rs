use axum::{middleware, routing::get, Router};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::{
    AuditLogStore, AuditTrail, ConsoleChannel, InAppChannel, InMemorySubmissionStore,
    InMemoryTemplateStore, MessageSender, NotificationChannel, NotificationDispatcher,
    RecoveryExecutor, SubmissionCoordinator, SubmissionLocks, SubmissionStore, TemplateResolver,
    TemplateStore,
};
use persistence::{
    AuditLogRepository, NotificationRepository, SubmissionRepository, TemplateRepository,
};

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_admin_key, trace_id,
    ClientRateLimiter,
};
use crate::routes::{audit_logs, fallback_config, health, notifications, quotes, templates};
use crate::services::{EmailAlertChannel, EmailError, EmailService, WebhookAlertChannel};

#[derive(Clone)]
pub struct AppState {
    /// Absent when running on in-memory stores.
    pub pool: Option<PgPool>,
    pub config: Arc<Config>,
    pub resolver: Arc<TemplateResolver>,
    pub coordinator: Arc<SubmissionCoordinator>,
    pub audit: Arc<AuditTrail>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub in_app: Arc<InAppChannel>,
    pub rate_limiter: Option<Arc<ClientRateLimiter>>,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Email service: {0}")]
    Email(#[from] EmailError),

    #[error("Webhook channel: {0}")]
    Webhook(#[from] reqwest::Error),
}

/// Storage and delivery implementations plugged into the domain services.
pub struct Backends {
    pub templates: Arc<dyn TemplateStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub audit_log: Option<Arc<dyn AuditLogStore>>,
    /// The `database` notification channel.
    pub notification_store: Option<Arc<dyn NotificationChannel>>,
    /// Quote sender; the configured email service when `None`.
    pub sender: Option<Arc<dyn MessageSender>>,
}

impl Backends {
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            templates: Arc::new(TemplateRepository::new(pool.clone())),
            submissions: Arc::new(SubmissionRepository::new(pool.clone())),
            audit_log: Some(Arc::new(AuditLogRepository::new(pool.clone()))),
            notification_store: Some(Arc::new(NotificationRepository::new(pool.clone()))),
            sender: None,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            templates: Arc::new(InMemoryTemplateStore::new()),
            submissions: Arc::new(InMemorySubmissionStore::new()),
            audit_log: None,
            notification_store: None,
            sender: None,
        }
    }
}

/// Wire the domain services together.
///
/// The dispatcher observes the audit trail through a weak reference, so the
/// two never keep each other alive.
pub fn build_state(
    config: Config,
    pool: Option<PgPool>,
    backends: Backends,
) -> Result<AppState, StartupError> {
    let config = Arc::new(config);

    let mut audit = AuditTrail::new(config.audit.clone());
    if let Some(store) = backends.audit_log {
        audit = audit.with_store(store);
    }
    let audit = Arc::new(audit);

    let email = EmailService::new(config.email.clone())?;
    let in_app = Arc::new(InAppChannel::new(config.notifications.history_limit));

    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![
        Arc::new(ConsoleChannel),
        in_app.clone(),
        Arc::new(EmailAlertChannel::new(
            email.clone(),
            config.notifications.email_recipients.clone(),
        )),
        Arc::new(WebhookAlertChannel::new(
            config.notifications.webhook_url.clone(),
            config.notifications.webhook_secret.clone(),
        )?),
    ];
    channels.extend(backends.notification_store);

    let dispatcher = NotificationDispatcher::new(
        config.notifications.clone(),
        audit.clone(),
        channels,
    );

    let executor = Arc::new(RecoveryExecutor::new(
        config.recovery.clone(),
        audit.clone(),
        dispatcher.clone(),
    ));

    let resolver = Arc::new(TemplateResolver::new(
        backends.templates,
        config.fallback.clone(),
        executor.clone(),
        audit.clone(),
        dispatcher.clone(),
    ));

    let sender = backends
        .sender
        .unwrap_or_else(|| Arc::new(email) as Arc<dyn MessageSender>);

    let coordinator = Arc::new(SubmissionCoordinator::new(
        config.submissions.clone(),
        resolver.clone(),
        backends.submissions,
        sender,
        executor,
        audit.clone(),
        dispatcher.clone(),
        SubmissionLocks::new(),
    ));

    let rate_limiter =
        ClientRateLimiter::new(config.security.rate_limit_per_minute).map(Arc::new);

    Ok(AppState {
        pool,
        config,
        resolver,
        coordinator,
        audit,
        dispatcher,
        in_app,
        rate_limiter,
    })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_app(state: AppState) -> Router {
    let quote_routes = Router::new()
        .nest("/api/v1/quotes", quotes::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let admin_routes = Router::new()
        .merge(templates::router())
        .nest("/fallback-config", fallback_config::router())
        .nest("/audit-logs", audit_logs::router())
        .nest("/notifications", notifications::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/live", get(health::live))
        .route("/api/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let cors = cors_layer(&state.config.security.cors_origins);

    Router::new()
        .merge(public_routes)
        .merge(quote_routes)
        .nest("/api/v1/admin", admin_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{NotificationKind, Severity};

    #[tokio::test]
    async fn test_in_memory_state_wires_enabled_channels() {
        let config = Config::load_for_test(&[]).unwrap();
        let state = build_state(config, None, Backends::in_memory()).unwrap();

        assert!(state.pool.is_none());
        assert!(state.rate_limiter.is_none());
        assert!(state.coordinator.locks().is_empty());

        let outcome = state
            .dispatcher
            .notify_system_issue(
                NotificationKind::SystemIssue,
                "Smoke test",
                "Dispatcher wired",
                Severity::Critical,
                None,
            )
            .await;
        assert!(outcome.is_dispatched());
        assert_eq!(state.in_app.feed(None).await.len(), 1);
    }

    #[test]
    fn test_rate_limiter_follows_config() {
        let config =
            Config::load_for_test(&[("security.rate_limit_per_minute", "10")]).unwrap();
        let state = build_state(config, None, Backends::in_memory()).unwrap();
        assert_eq!(state.rate_limiter.map(|l| l.per_minute()), Some(10));
    }
}
