//! Server construction: adapters, services, clock jobs, and route wiring.

pub mod config;
pub mod cron;

use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use prometheus::Registry;
use tracing::info;

use crate::domain::ports::Telemetry;
use crate::domain::{
    MidnightRollover, NotificationDispatcher, OccurrenceCleanup, SchedulePlanner, SnoozeReleaser,
    TaskEvaluator,
};
use crate::inbound::http::hello;
use crate::inbound::ws::{self, SessionRegistry, WsState};
use crate::middleware::Trace;
use crate::outbound::metrics::PrometheusTelemetry;
use crate::outbound::persistence::{
    DbPool, DieselNotificationJobQueue, DieselNotificationRepository, DieselScheduleRepository,
    DieselTaskRepository, DieselUserRepository,
};

use config::{AppConfig, CRON_TIMEZONE, STATIC_DIR};
use cron::ClockJobs;

/// Build every adapter and service, spawn the clock jobs, and return the
/// bound HTTP server.
///
/// # Errors
///
/// Fails when the database pool cannot be built, metrics registration is
/// rejected, or the listen socket cannot be bound.
pub async fn create_server(app_config: AppConfig) -> std::io::Result<Server> {
    let pool = DbPool::connect(&app_config.database_url)
        .await
        .map_err(|err| std::io::Error::other(format!("database pool: {err}")))?;

    let registry = Registry::new();
    let telemetry: Arc<dyn Telemetry> = Arc::new(
        PrometheusTelemetry::new(&registry)
            .map_err(|err| std::io::Error::other(format!("metrics registration: {err}")))?,
    );
    let prometheus = PrometheusMetricsBuilder::new("taskbar")
        .registry(registry)
        .endpoint("/metrics")
        .build()
        .map_err(|err| std::io::Error::other(format!("prometheus middleware: {err}")))?;

    let users = Arc::new(DieselUserRepository::new(pool.clone(), telemetry.clone()));
    let tasks = Arc::new(DieselTaskRepository::new(pool.clone(), telemetry.clone()));
    let schedules = Arc::new(DieselScheduleRepository::new(pool.clone(), telemetry.clone()));
    let notifications = Arc::new(DieselNotificationRepository::new(
        pool.clone(),
        telemetry.clone(),
    ));
    let jobs = Arc::new(DieselNotificationJobQueue::new(pool, telemetry.clone()));

    let session_registry = Arc::new(SessionRegistry::new(telemetry.clone()));

    let clock_jobs = ClockJobs {
        planner: Arc::new(SchedulePlanner::new(
            schedules.clone(),
            tasks.clone(),
            jobs.clone(),
            session_registry.clone(),
        )),
        dispatcher: Arc::new(NotificationDispatcher::new(
            jobs,
            notifications.clone(),
            session_registry.clone(),
        )),
        evaluator: Arc::new(TaskEvaluator::new(
            tasks.clone(),
            notifications.clone(),
            session_registry.clone(),
        )),
        snooze: Arc::new(SnoozeReleaser::new(
            notifications.clone(),
            session_registry.clone(),
        )),
        rollover: Arc::new(MidnightRollover::new(
            tasks.clone(),
            users.clone(),
            session_registry.clone(),
        )),
        cleanup: Arc::new(OccurrenceCleanup::new(schedules.clone())),
    };
    let cron_tz = CRON_TIMEZONE
        .parse()
        .map_err(|err| std::io::Error::other(format!("cron timezone: {err}")))?;
    cron::spawn_all(clock_jobs, cron_tz);

    let ws_state = web::Data::new(WsState {
        registry: session_registry,
        users,
        tasks,
        schedules,
        notifications,
        telemetry,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(ws_state.clone())
            .wrap(Trace)
            .wrap(prometheus.clone())
            .service(ws::ws_entry)
            .service(hello)
            .service(actix_files::Files::new("/", STATIC_DIR).index_file("index.html"))
    })
    .client_request_timeout(std::time::Duration::from_secs(10))
    .bind(("0.0.0.0", app_config.port))?
    .run();

    info!(port = app_config.port, "server listening");
    Ok(server)
}
