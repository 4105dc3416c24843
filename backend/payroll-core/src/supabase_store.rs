// src/supabase_store.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::connecteam_client::body_preview;
use crate::models::{
    Employee, NewPayrollRecord, NewPayrollTransaction, PayrollRecord, PayrollRecordUpdate,
    PayrollStatus, PayrollTransaction, Timesheet, TimesheetWeekSummary, TimesheetWithEmployee,
};
use crate::store::{PayrollStore, StoreError};
use crate::week;

const REST_PREFIX: &str = "/rest/v1";
const TIMESHEET_CONFLICT_TARGET: &str = "employee_id,week_start_date";
const PREFER_MERGE: &str = "resolution=merge-duplicates,return=minimal";
const PREFER_MINIMAL: &str = "return=minimal";
const PREFER_REPRESENTATION: &str = "return=representation";

pub const WEEK_SUMMARIES_RPC: &str = "get_timesheet_weeks";
pub const TIMESHEETS_FOR_WEEK_RPC: &str = "get_timesheets_for_week";

#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub timeout_secs: u64,
}

/// PostgREST-backed store for the hosted database.
#[derive(Clone)]
pub struct SupabaseStore {
    config: Arc<SupabaseConfig>,
    http_client: Client,
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, StoreError> {
        if config.url.trim().is_empty() {
            return Err(StoreError::ConfigError("SUPABASE_URL is empty".to_string()));
        }
        if config.service_key.trim().is_empty() {
            return Err(StoreError::ConfigError(
                "SUPABASE_SERVICE_KEY is empty".to_string(),
            ));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    fn build_request(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<RequestBuilder, StoreError> {
        let base = self.config.url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}/{}", base, REST_PREFIX, resource))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(self
            .http_client
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.service_key))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json"))
    }

    /// Executes the request and returns the raw body of a 2xx response.
    async fn execute(
        &self,
        request_builder: RequestBuilder,
        context_msg: &str,
    ) -> Result<String, StoreError> {
        let request = request_builder.build()?;
        let request_url = request.url().to_string();
        debug!("Sending store request for '{}' to URL: {}", context_msg, request_url);

        let response = self.http_client.execute(request).await.map_err(|e| {
            error!(
                "Store request failed before receiving response for '{}' (URL: {}): {}",
                context_msg, request_url, e
            );
            StoreError::Request(e)
        })?;

        let status = response.status();
        info!("Store response for '{}': Status={}", context_msg, status);

        let bytes = response.bytes().await?;
        let body = match std::str::from_utf8(&bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                warn!("Store response for '{}' is not valid UTF-8.", context_msg);
                debug!("Raw Response Body (Hex): {}", hex::encode(&bytes));
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        if !status.is_success() {
            error!(
                "Store Error Response: Status={}, Body='{}' for URL: {}",
                status,
                body_preview(&body),
                request_url
            );
            return Err(StoreError::ApiError {
                status,
                message: body_preview(&body),
            });
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
        context_msg: &str,
    ) -> Result<T, StoreError> {
        let body = self.execute(request_builder, context_msg).await?;
        serde_json::from_str(&body).map_err(|e| {
            error!("Failed to decode store rows for '{}': {}", context_msg, e);
            StoreError::Json(e)
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        context_msg: &str,
    ) -> Result<Vec<T>, StoreError> {
        let mut query = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());
        let request = self.build_request(Method::GET, table, &query)?;
        self.fetch(request, context_msg).await
    }

    /// PATCH or POST returning the written rows.
    async fn write_returning<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        table: &str,
        filters: &[(&str, String)],
        body: &B,
        context_msg: &str,
    ) -> Result<Vec<T>, StoreError> {
        let request = self
            .build_request(method, table, filters)?
            .header("Prefer", PREFER_REPRESENTATION)
            .json(body);
        self.fetch(request, context_msg).await
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        args: serde_json::Value,
    ) -> Result<Vec<T>, StoreError> {
        let request = self
            .build_request(Method::POST, &format!("rpc/{}", function), &[])?
            .json(&args);
        match self.fetch(request, function).await {
            Err(StoreError::ApiError { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(StoreError::RpcUnavailable(function.to_string()))
            }
            other => other,
        }
    }

    fn single<T>(rows: Vec<T>, entity: &'static str, id: &str) -> Result<T, StoreError> {
        rows.into_iter().next().ok_or_else(|| StoreError::NotFound {
            entity,
            id: id.to_string(),
        })
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl PayrollStore for SupabaseStore {
    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        self.select("employees", &[("order", "name.asc".to_string())], "List Employees")
            .await
    }

    async fn list_active_employees(&self) -> Result<Vec<Employee>, StoreError> {
        self.select(
            "employees",
            &[
                ("is_active", "eq.true".to_string()),
                ("order", "name.asc".to_string()),
            ],
            "List Active Employees",
        )
        .await
    }

    async fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError> {
        let rows: Vec<Employee> = self
            .select("employees", &[("id", eq(employee_id))], "Get Employee")
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn reset_current_week_hours(&self) -> Result<(), StoreError> {
        let request = self
            .build_request(Method::PATCH, "employees", &[("id", "not.is.null".to_string())])?
            .header("Prefer", PREFER_MINIMAL)
            .json(&json!({ "current_week_hours": Decimal::ZERO }));
        self.execute(request, "Reset Current Week Hours").await?;
        Ok(())
    }

    async fn update_employee_hours(
        &self,
        employee_id: &str,
        hours: Decimal,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let request = self
            .build_request(Method::PATCH, "employees", &[("id", eq(employee_id))])?
            .header("Prefer", PREFER_MINIMAL)
            .json(&json!({ "current_week_hours": hours, "last_sync_at": synced_at }));
        self.execute(request, "Update Employee Hours").await?;
        Ok(())
    }

    async fn delete_timesheets_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), StoreError> {
        let request = self
            .build_request(
                Method::DELETE,
                "timesheets",
                &[
                    ("week_start_date", format!("gte.{}", week::format_date(from))),
                    ("week_start_date", format!("lte.{}", week::format_date(to))),
                ],
            )?
            .header("Prefer", PREFER_MINIMAL);
        self.execute(request, "Delete Timesheets").await?;
        Ok(())
    }

    async fn upsert_timesheets(&self, rows: &[Timesheet]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .build_request(
                Method::POST,
                "timesheets",
                &[("on_conflict", TIMESHEET_CONFLICT_TARGET.to_string())],
            )?
            .header("Prefer", PREFER_MERGE)
            .json(rows);
        self.execute(request, "Upsert Timesheets").await?;
        Ok(())
    }

    async fn timesheets_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Timesheet>, StoreError> {
        self.select(
            "timesheets",
            &[
                ("week_start_date", format!("gte.{}", week::format_date(from))),
                ("week_start_date", format!("lte.{}", week::format_date(to))),
            ],
            "Timesheets In Window",
        )
        .await
    }

    async fn list_timesheets(&self) -> Result<Vec<Timesheet>, StoreError> {
        self.select(
            "timesheets",
            &[("order", "week_start_date.desc".to_string())],
            "List Timesheets",
        )
        .await
    }

    async fn timesheet_week_summaries_rpc(&self) -> Result<Vec<TimesheetWeekSummary>, StoreError> {
        self.rpc(WEEK_SUMMARIES_RPC, json!({})).await
    }

    async fn timesheets_for_week_rpc(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<TimesheetWithEmployee>, StoreError> {
        self.rpc(
            TIMESHEETS_FOR_WEEK_RPC,
            json!({ "p_week_start": week::format_date(week_start) }),
        )
        .await
    }

    async fn payroll_records_for_week(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<PayrollRecord>, StoreError> {
        self.select(
            "payroll_records",
            &[
                ("date", eq(&week::format_date(week_start))),
                ("order", "employee_id.asc".to_string()),
            ],
            "Payroll Records For Week",
        )
        .await
    }

    async fn get_payroll_record(&self, id: &str) -> Result<Option<PayrollRecord>, StoreError> {
        let rows: Vec<PayrollRecord> = self
            .select("payroll_records", &[("id", eq(id))], "Get Payroll Record")
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_payroll_record(
        &self,
        record: NewPayrollRecord,
    ) -> Result<PayrollRecord, StoreError> {
        let employee_id = record.employee_id.clone();
        let rows = self
            .write_returning(
                Method::POST,
                "payroll_records",
                &[],
                &record,
                "Insert Payroll Record",
            )
            .await?;
        Self::single(rows, "Inserted payroll record for employee", &employee_id)
    }

    async fn update_payroll_record(
        &self,
        id: &str,
        update: PayrollRecordUpdate,
    ) -> Result<PayrollRecord, StoreError> {
        let rows = self
            .write_returning(
                Method::PATCH,
                "payroll_records",
                &[("id", eq(id))],
                &update,
                "Update Payroll Record",
            )
            .await?;
        Self::single(rows, "Payroll record", id)
    }

    async fn set_payroll_status(
        &self,
        id: &str,
        status: PayrollStatus,
        overridden: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<PayrollRecord, StoreError> {
        let rows = self
            .write_returning(
                Method::PATCH,
                "payroll_records",
                &[("id", eq(id))],
                &json!({
                    "status": status,
                    "status_overridden": overridden,
                    "updated_at": updated_at,
                }),
                "Set Payroll Status",
            )
            .await?;
        Self::single(rows, "Payroll record", id)
    }

    async fn insert_payroll_transaction(
        &self,
        transaction: NewPayrollTransaction,
    ) -> Result<PayrollTransaction, StoreError> {
        let record_id = transaction.payroll_record_id.clone();
        let rows = self
            .write_returning(
                Method::POST,
                "payroll_transactions",
                &[],
                &transaction,
                "Insert Payroll Transaction",
            )
            .await?;
        Self::single(rows, "Inserted transaction for payroll record", &record_id)
    }

    async fn payroll_transactions(
        &self,
        payroll_record_id: &str,
    ) -> Result<Vec<PayrollTransaction>, StoreError> {
        self.select(
            "payroll_transactions",
            &[
                ("payroll_record_id", eq(payroll_record_id)),
                ("order", "paid_at.asc".to_string()),
            ],
            "Payroll Transactions",
        )
        .await
    }
}
