#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::fs;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tempfile::NamedTempFile;
use uuid::Uuid;

use telemetry_backend::config::AppConfig;
use telemetry_backend::jobs::worker::WorkerContext;
use telemetry_backend::types::RuleCreate;

pub struct TestDb {
    pub pool: SqlitePool,
    _db_file: NamedTempFile,
}

pub async fn setup_db(max_connections: u32) -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(500));

    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite for migrations");
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut conn)
        .await
        .expect("enable foreign keys for migrations");
    run_migrations_on_conn(&mut conn)
        .await
        .expect("run migrations");
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON;")
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
        .expect("connect sqlite file");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

async fn run_migrations_on_conn(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut entries: Vec<_> = fs::read_dir("migrations")
        .map_err(sqlx::Error::Io)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();

    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let contents = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        for statement in contents.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *conn).await?;
        }
    }

    Ok(())
}

pub fn test_config() -> AppConfig {
    AppConfig {
        worker_id: "worker-test".to_string(),
        ..AppConfig::default()
    }
}

pub fn worker_ctx(pool: SqlitePool) -> WorkerContext {
    WorkerContext::new(pool, test_config()).expect("build worker context")
}

pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub async fn seed_project(pool: &SqlitePool) -> Uuid {
    let org = telemetry_backend::store::org::create_org(pool, &format!("org-{}", Uuid::new_v4()))
        .await
        .expect("create org");
    let project = telemetry_backend::store::org::create_project(pool, org.id, "test-project")
        .await
        .expect("create project");
    project.id
}

pub async fn seed_device(pool: &SqlitePool, project_id: Uuid, tags: &[&str]) -> Uuid {
    let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    let device = telemetry_backend::store::device::create_device(
        pool,
        project_id,
        &format!("dev-{}", Uuid::new_v4()),
        "test device",
        &tags,
    )
    .await
    .expect("create device");
    device.id
}

pub fn rule_create(metric: &str, window_n: i64, required_k: i64, cooldown_seconds: i64) -> RuleCreate {
    RuleCreate {
        name: format!("{metric} rule"),
        metric: metric.to_string(),
        operator: ">".to_string(),
        threshold: 80.0,
        window_n,
        required_k,
        cooldown_seconds,
        enabled: true,
        scope: "ALL".to_string(),
        tag: None,
    }
}

pub async fn seed_rule(pool: &SqlitePool, project_id: Uuid, data: &RuleCreate) -> Uuid {
    let rule = telemetry_backend::store::rule::create_rule(pool, project_id, data)
        .await
        .expect("create rule");
    rule.id
}

/// Insert one event with an explicit timestamp. `age_secs` counts back from
/// now, so index 0 with age 0 is the newest event.
pub async fn seed_event(
    pool: &SqlitePool,
    device_id: Uuid,
    age_secs: i64,
    payload: serde_json::Value,
) -> Uuid {
    let id = Uuid::new_v4();
    let ts = format_ts(Utc::now() - Duration::seconds(age_secs));

    sqlx::query("INSERT INTO telemetry_events (id, device_id, ts, payload) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(device_id.to_string())
        .bind(&ts)
        .bind(payload.to_string())
        .execute(pool)
        .await
        .expect("insert event");

    id
}

/// Seed a window of temperature readings, newest first.
pub async fn seed_temperatures(pool: &SqlitePool, device_id: Uuid, values: &[f64]) {
    for (i, value) in values.iter().enumerate() {
        seed_event(
            pool,
            device_id,
            i as i64,
            serde_json::json!({ "temperature": value }),
        )
        .await;
    }
}

pub async fn seed_webhook(pool: &SqlitePool, project_id: Uuid, url: &str, secret: Option<&str>) -> Uuid {
    let webhook = telemetry_backend::store::webhook::create_webhook(pool, project_id, url, secret)
        .await
        .expect("create webhook");
    webhook.id
}

pub async fn seed_alert(pool: &SqlitePool, device_id: Uuid, rule_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    let details = serde_json::json!({
        "rule": { "id": rule_id },
        "evaluation": { "device_id": device_id, "match_count": 5, "considered": 5 },
    });

    sqlx::query(
        "INSERT INTO alerts (id, device_id, rule_id, triggered_at, details) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(device_id.to_string())
    .bind(rule_id.to_string())
    .bind(format_ts(Utc::now()))
    .bind(details.to_string())
    .execute(pool)
    .await
    .expect("insert alert");

    id
}

/// Issue a usable API key for a project, returning the raw presented form.
pub async fn seed_api_key(pool: &SqlitePool, project_id: Uuid) -> String {
    let (raw_key, prefix, hashed) =
        telemetry_backend::auth::generate_api_key().expect("generate api key");
    telemetry_backend::store::api_key::create_api_key(pool, project_id, &prefix, &hashed)
        .await
        .expect("store api key");
    raw_key
}

pub struct ReceivedRequest {
    pub timestamp: String,
    pub signature: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// A local webhook receiver capturing everything it is sent and answering
/// with a configurable status code.
pub struct MockReceiver {
    pub url: String,
    pub requests: std::sync::Arc<std::sync::Mutex<Vec<ReceivedRequest>>>,
    pub status: std::sync::Arc<std::sync::atomic::AtomicU16>,
}

impl MockReceiver {
    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("lock requests").len()
    }

    pub fn set_status(&self, status: u16) {
        self.status
            .store(status, std::sync::atomic::Ordering::SeqCst);
    }
}

pub async fn spawn_receiver(status: u16) -> MockReceiver {
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::sync::{Arc, Mutex};

    let requests: Arc<Mutex<Vec<ReceivedRequest>>> = Arc::new(Mutex::new(Vec::new()));
    let status = Arc::new(AtomicU16::new(status));

    let handler_requests = requests.clone();
    let handler_status = status.clone();
    let app = axum::Router::new().route(
        "/hook",
        axum::routing::post(move |headers: axum::http::HeaderMap, body: String| {
            let requests = handler_requests.clone();
            let status = handler_status.clone();
            async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string)
                };
                requests.lock().expect("lock requests").push(ReceivedRequest {
                    timestamp: header("x-telemetry-timestamp").unwrap_or_default(),
                    signature: header("x-telemetry-signature"),
                    content_type: header("content-type"),
                    body,
                });
                axum::http::StatusCode::from_u16(status.load(Ordering::SeqCst))
                    .unwrap_or(axum::http::StatusCode::OK)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind receiver");
    let addr = listener.local_addr().expect("receiver addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockReceiver {
        url: format!("http://{addr}/hook"),
        requests,
        status,
    }
}

pub async fn count_jobs(pool: &SqlitePool, kind: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE kind = ?")
        .bind(kind)
        .fetch_one(pool)
        .await
        .expect("count jobs")
}

pub async fn count_events(pool: &SqlitePool, device_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM telemetry_events WHERE device_id = ?")
        .bind(device_id.to_string())
        .fetch_one(pool)
        .await
        .expect("count events")
}

pub async fn count_alerts(pool: &SqlitePool, device_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE device_id = ?")
        .bind(device_id.to_string())
        .fetch_one(pool)
        .await
        .expect("count alerts")
}
