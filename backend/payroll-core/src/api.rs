// src/api.rs

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::clock::Clock;
use crate::connecteam_client::{CustomFieldDefinition, TimeTrackingGateway};
use crate::error::AppError;
use crate::export::{export_rows_for_week, write_payroll_csv};
use crate::models::{
    GenerationSummary, PayrollRecord, PayrollStatus, SyncResult, TimesheetWeekSummary,
    TimesheetWithEmployee,
};
use crate::payroll::{PaymentOutcome, PaymentRequest, PayrollDetail, PayrollEngine, PayrollRecordEdit};
use crate::roster::{RosterMatchReport, RosterService};
use crate::store::PayrollStore;
use crate::sync::HoursSynchronizer;
use crate::timesheets::TimesheetService;
use crate::week;

#[derive(Clone)]
pub struct AppState {
    pub synchronizer: Arc<HoursSynchronizer>,
    pub payroll: Arc<PayrollEngine>,
    pub timesheets: TimesheetService,
    pub roster: RosterService,
    pub store: Arc<dyn PayrollStore>,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn TimeTrackingGateway>,
        store: Arc<dyn PayrollStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            synchronizer: Arc::new(HoursSynchronizer::new(
                gateway.clone(),
                store.clone(),
                clock.clone(),
            )),
            payroll: Arc::new(PayrollEngine::new(store.clone(), clock)),
            timesheets: TimesheetService::new(store.clone()),
            roster: RosterService::new(gateway, store.clone()),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let payroll_routes = Router::new()
        .route("/", get(handle_list_payroll))
        .route("/generate", post(handle_generate_payroll))
        .route("/export", get(handle_export_payroll))
        .route("/{id}", get(handle_payroll_detail).patch(handle_update_payroll))
        .route("/{id}/payments", post(handle_record_payment))
        .route("/{id}/status", put(handle_mark_status))
        .route("/{id}/recompute", post(handle_recompute_status));

    let timesheet_routes = Router::new()
        .route("/", get(handle_timesheets_for_week))
        .route("/weeks", get(handle_timesheet_weeks));

    let api_routes = Router::new()
        .route("/sync", post(handle_sync))
        .nest("/payroll", payroll_routes)
        .nest("/timesheets", timesheet_routes)
        .route("/roster/connecteam", get(handle_roster_report))
        .route("/roster/connecteam/custom-fields", get(handle_custom_fields));

    Router::new()
        .route("/health", get(handle_health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Request shapes ---

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    pub week_start: Option<NaiveDate>,
    pub clear_first: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week_start: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub week_start: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: Decimal,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: PayrollStatus,
}

// --- Handlers ---

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_sync(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Json<SyncResult> {
    info!("Sync requested via API: {:?}", params);
    let result = state
        .synchronizer
        .sync_current_week_hours(params.week_start, params.clear_first.unwrap_or(true))
        .await;
    Json(result)
}

async fn handle_generate_payroll(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerationSummary>, AppError> {
    let summary = state.payroll.generate_weekly_payroll(request.week_start).await?;
    Ok(Json(summary))
}

async fn handle_list_payroll(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<Vec<PayrollRecord>>, AppError> {
    Ok(Json(state.payroll.payroll_for_week(query.week_start).await?))
}

async fn handle_export_payroll(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Response, AppError> {
    let rows = export_rows_for_week(state.store.as_ref(), query.week_start).await?;
    let mut body = Vec::new();
    write_payroll_csv(&mut body, &rows)?;
    let filename = format!(
        "payroll-{}.csv",
        week::format_date(week::week_start(query.week_start))
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

async fn handle_payroll_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PayrollDetail>, AppError> {
    Ok(Json(state.payroll.payroll_detail(&id).await?))
}

async fn handle_update_payroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<PayrollRecordEdit>,
) -> Result<Json<PayrollRecord>, AppError> {
    Ok(Json(state.payroll.update_payroll_record(&id, edit).await?))
}

async fn handle_record_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> Result<(StatusCode, Json<PaymentOutcome>), AppError> {
    let outcome = state
        .payroll
        .record_payroll_payment(PaymentRequest {
            payroll_record_id: id,
            amount: body.amount,
            paid_at: body.paid_at,
            method: body.method,
            memo: body.memo,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn handle_mark_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<PayrollRecord>, AppError> {
    Ok(Json(state.payroll.mark_payroll_status(&id, body.status).await?))
}

async fn handle_recompute_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PayrollRecord>, AppError> {
    Ok(Json(state.payroll.recompute_status(&id).await?))
}

async fn handle_timesheet_weeks(
    State(state): State<AppState>,
) -> Result<Json<Vec<TimesheetWeekSummary>>, AppError> {
    Ok(Json(state.timesheets.get_available_timesheet_weeks().await?))
}

async fn handle_timesheets_for_week(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<Vec<TimesheetWithEmployee>>, AppError> {
    let week_start = week::week_start(query.week_start);
    Ok(Json(state.timesheets.get_timesheets_for_week(week_start).await?))
}

async fn handle_roster_report(
    State(state): State<AppState>,
) -> Result<Json<RosterMatchReport>, AppError> {
    Ok(Json(state.roster.connecteam_match_report().await?))
}

async fn handle_custom_fields(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomFieldDefinition>>, AppError> {
    Ok(Json(state.roster.connecteam_custom_fields().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::store::MemoryStore;
    use crate::test_support::{d, employee, MockGateway};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        store: MemoryStore,
        gateway: MockGateway,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        store.insert_employee(employee("e-1", "Ana", Some("501"), dec!(20)));
        store.insert_employee(employee("e-2", "Bo", None, dec!(18)));
        let gateway = MockGateway::new();
        gateway.set_hours("501", &[(d("2024-01-08"), dec!(8)), (d("2024-01-09"), dec!(2))]);
        let clock = TestClock::new("2024-01-10 09:00:00");
        let state = AppState::new(
            Arc::new(gateway.clone()),
            Arc::new(store.clone()),
            Arc::new(clock),
        );
        Harness {
            app: router(state),
            store,
            gateway,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness();
        let (status, body) = send_json(&h.app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn sync_then_list_weeks_and_rows() {
        let h = harness();
        let (status, body) = send_json(&h.app, "POST", "/api/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["employees_synced"], 2);
        assert_eq!(h.store.timesheet_count(), 2);

        let (_, weeks) = send_json(&h.app, "GET", "/api/timesheets/weeks", None).await;
        assert_eq!(weeks[0]["week_start_date"], "2024-01-08");
        assert_eq!(weeks[0]["employee_count"], 2);

        let (_, rows) = send_json(&h.app, "GET", "/api/timesheets?week_start=2024-01-10", None).await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["employee_name"], "Ana");
        assert_eq!(rows[0]["total_hours"].as_f64(), Some(10.0));
    }

    #[tokio::test]
    async fn sync_reports_failure_without_error_status() {
        let h = harness();
        *h.gateway.fail_timesheet_fetch.lock().unwrap() = true;
        let (status, body) =
            send_json(&h.app, "POST", "/api/sync?week_start=2024-01-08&clear_first=false", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payroll_lifecycle_over_http() {
        let h = harness();
        send_json(&h.app, "POST", "/api/sync", None).await;

        let (status, summary) = send_json(
            &h.app,
            "POST",
            "/api/payroll/generate",
            Some(json!({ "week_start": "2024-01-08" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["created"], 2);

        let records = summary["records"].as_array().unwrap();
        let ana = records.iter().find(|r| r["employee_id"] == "e-1").unwrap();
        let id = ana["id"].as_str().unwrap().to_string();
        assert_eq!(ana["total_pay"].as_f64(), Some(200.0));
        assert_eq!(ana["status"], "pending");

        let (status, outcome) = send_json(
            &h.app,
            "POST",
            &format!("/api/payroll/{}/payments", id),
            Some(json!({ "amount": 50, "method": "bank" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(outcome["record"]["status"], "partial");

        let (status, detail) = send_json(&h.app, "GET", &format!("/api/payroll/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["transactions"].as_array().unwrap().len(), 1);
        assert_eq!(detail["balance"].as_f64(), Some(150.0));
        assert!(detail["total_paid"].is_number());

        let (status, record) = send_json(
            &h.app,
            "PUT",
            &format!("/api/payroll/{}/status", id),
            Some(json!({ "status": "paid" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "paid");
        assert_eq!(record["status_overridden"], true);

        let (_, record) =
            send_json(&h.app, "POST", &format!("/api/payroll/{}/recompute", id), None).await;
        assert_eq!(record["status"], "partial");
        assert_eq!(record["status_overridden"], false);
    }

    #[tokio::test]
    async fn invalid_payment_is_bad_request() {
        let h = harness();
        send_json(&h.app, "POST", "/api/sync", None).await;
        let (_, summary) = send_json(
            &h.app,
            "POST",
            "/api/payroll/generate",
            Some(json!({ "week_start": "2024-01-08" })),
        )
        .await;
        let id = summary["records"][0]["id"].as_str().unwrap().to_string();

        let (status, body) = send_json(
            &h.app,
            "POST",
            &format!("/api/payroll/{}/payments", id),
            Some(json!({ "amount": -5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("greater than zero"));
        assert_eq!(h.store.transaction_count(), 0);
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let h = harness();
        let (status, _) = send_json(&h.app, "GET", "/api/payroll/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn export_returns_csv() {
        let h = harness();
        send_json(&h.app, "POST", "/api/sync", None).await;
        send_json(
            &h.app,
            "POST",
            "/api/payroll/generate",
            Some(json!({ "week_start": "2024-01-08" })),
        )
        .await;

        let (status, bytes) = send(&h.app, "GET", "/api/payroll/export?week_start=2024-01-08", None).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("e-1,Ana,2024-01-08,10,20,200,pending"));
        assert!(lines[2].starts_with("e-2,Bo,2024-01-08,0,18,0,paid"));
    }

    #[tokio::test]
    async fn roster_report_lists_unlinked_employees() {
        let h = harness();
        let (status, report) = send_json(&h.app, "GET", "/api/roster/connecteam", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["unlinked_employees"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn custom_field_definitions_are_listed() {
        let h = harness();
        h.gateway.custom_fields.lock().unwrap().push(CustomFieldDefinition {
            id: "31".to_string(),
            name: "Hourly rate".to_string(),
            type_: Some("number".to_string()),
        });
        let (status, fields) =
            send_json(&h.app, "GET", "/api/roster/connecteam/custom-fields", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fields[0]["id"], "31");
        assert_eq!(fields[0]["type"], "number");
    }
}
