// src/connecteam_client.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::coerce;
use crate::week;

pub const CONNECTEAM_API_BASE_URL: &str = "https://api.connecteam.com";
pub const API_KEY_HEADER: &str = "X-API-Key";
pub const USERS_PAGE_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Upstream bodies embedded in error messages are cut to this many characters.
pub const ERROR_BODY_PREVIEW_CHARS: usize = 200;

// --- Connecteam API Data Structures ---

#[derive(Debug, Clone, Deserialize)]
struct ApiEnvelope<T> {
    data: T,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeClock {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeClocksData {
    #[serde(default)]
    time_clocks: Vec<TimeClock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityTimePoint {
    /// Unix seconds.
    timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawShift {
    #[serde(deserialize_with = "coerce::id")]
    id: String,
    start: ActivityTimePoint,
    #[serde(default)]
    end: Option<ActivityTimePoint>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTimeActivities {
    #[serde(deserialize_with = "coerce::id")]
    user_id: String,
    #[serde(default)]
    shifts: Vec<RawShift>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeActivitiesData {
    #[serde(default)]
    time_activities_by_users: Vec<UserTimeActivities>,
}

/// One clock-in/clock-out pair, flattened out of the provider's per-user grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeActivity {
    pub id: String,
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyRecord {
    date: String,
    #[serde(default, alias = "totalHours")]
    daily_total_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTimesheet {
    #[serde(deserialize_with = "coerce::id")]
    user_id: String,
    #[serde(default)]
    total_hours: Option<f64>,
    #[serde(default)]
    daily_records: Vec<DailyRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimesheetData {
    #[serde(default)]
    users: Vec<UserTimesheet>,
}

/// Hours for one provider user over the requested range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimesheetTotals {
    pub total_hours: Decimal,
    pub daily_hours: BTreeMap<NaiveDate, Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldValue {
    #[serde(deserialize_with = "coerce::id")]
    pub custom_field_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnecteamUser {
    #[serde(deserialize_with = "coerce::id")]
    pub user_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldValue>,
}

impl ConnecteamUser {
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersData {
    #[serde(default)]
    users: Vec<ConnecteamUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    #[serde(deserialize_with = "coerce::id")]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomFieldsData {
    #[serde(default)]
    custom_fields: Vec<CustomFieldDefinition>,
}

// --- Error Type ---

#[derive(Error, Debug)]
pub enum ConnecteamError {
    #[error("HTTP request to Connecteam failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Rate limit exceeded (Status 429): '{body}'")]
    RateLimitExceeded { body: String },

    #[error("Connecteam API error: Status={status}, Body='{body}'")]
    ApiError { status: StatusCode, body: String },

    #[error("Connecteam returned a non-JSON response for '{context}': {source}. Body='{body}'")]
    InvalidJson {
        context: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No active (non-archived) time clock found in Connecteam")]
    NoActiveTimeClock,
}

/// First [`ERROR_BODY_PREVIEW_CHARS`] characters of an upstream body.
pub fn body_preview(body: &str) -> String {
    body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}

// --- Gateway abstraction ---

/// Read-only access to the time-tracking provider.
#[async_trait]
pub trait TimeTrackingGateway: Send + Sync {
    async fn list_time_clocks(&self) -> Result<Vec<TimeClock>, ConnecteamError>;

    async fn get_time_activities(
        &self,
        clock_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<TimeActivity>, ConnecteamError>;

    /// Map from provider user id to total and per-date hours.
    async fn get_timesheet_totals_with_daily(
        &self,
        clock_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<String, TimesheetTotals>, ConnecteamError>;

    async fn get_users(&self) -> Result<Vec<ConnecteamUser>, ConnecteamError>;

    /// Definitions of the custom fields attached to users.
    async fn get_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ConnecteamError>;
}

/// The single clock payroll works against: the first one not archived.
pub fn active_time_clock(clocks: &[TimeClock]) -> Option<&TimeClock> {
    clocks.iter().find(|clock| !clock.is_archived)
}

pub async fn resolve_active_time_clock(
    gateway: &dyn TimeTrackingGateway,
) -> Result<TimeClock, ConnecteamError> {
    let clocks = gateway.list_time_clocks().await?;
    active_time_clock(&clocks)
        .cloned()
        .ok_or(ConnecteamError::NoActiveTimeClock)
}

// --- Client ---

#[derive(Clone, Debug)]
pub struct ConnecteamConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ConnecteamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: CONNECTEAM_API_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone)]
pub struct ConnecteamClient {
    config: Arc<ConnecteamConfig>,
    http_client: Client,
}

impl ConnecteamClient {
    pub fn new(config: ConnecteamConfig) -> Result<Self, ConnecteamError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.api_key.as_deref().map_or(true, str::is_empty) {
            warn!("CONNECTEAM_API_KEY is not set; Connecteam calls will fail until it is configured.");
        }

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    fn api_key(&self) -> Result<&str, ConnecteamError> {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(ConnecteamError::ConfigError(
                "Connecteam API key is missing (set CONNECTEAM_API_KEY)".to_string(),
            )),
        }
    }

    pub fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<RequestBuilder, ConnecteamError> {
        let api_key = self.api_key()?;

        let base = self.config.base_url.trim_end_matches('/');
        let mut url = if endpoint.starts_with('/') {
            Url::parse(&format!("{}{}", base, endpoint))?
        } else {
            Url::parse(&format!("{}/{}", base, endpoint))?
        };
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(self
            .http_client
            .request(method, url)
            .header(API_KEY_HEADER, api_key)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json"))
    }

    /// Sends the request and decodes the JSON body. Non-2xx and non-JSON
    /// bodies fail immediately; nothing is retried here.
    pub async fn send_and_deserialize<T: DeserializeOwned>(
        &self,
        request_builder: RequestBuilder,
        context_msg: &str,
    ) -> Result<T, ConnecteamError> {
        let request = request_builder.build().map_err(|e| {
            error!("Request build failed for '{}': {}", context_msg, e);
            ConnecteamError::Request(e)
        })?;
        let request_url = request.url().to_string();
        debug!("Sending request for '{}' to URL: {}", context_msg, request_url);

        let response = self.http_client.execute(request).await.map_err(|e| {
            error!(
                "HTTP execution failed before receiving response for '{}' (URL: {}): {}",
                context_msg, request_url, e
            );
            ConnecteamError::Request(e)
        })?;

        let status = response.status();
        info!(
            "Received response for '{}' (URL: {}): Status={}",
            context_msg, request_url, status
        );

        let bytes = response.bytes().await?;
        let body = match std::str::from_utf8(&bytes) {
            Ok(text) => text.to_string(),
            Err(_) => {
                warn!(
                    "Response body for '{}' is not valid UTF-8. Logging hex.",
                    context_msg
                );
                debug!("Raw Response Body (Hex) for '{}': {}", context_msg, hex::encode(&bytes));
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };

        if !status.is_success() {
            error!(
                "API Error Response: Status={}, Body='{}' for URL: {}",
                status,
                body_preview(&body),
                request_url
            );
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ConnecteamError::RateLimitExceeded {
                    body: body_preview(&body),
                });
            }
            return Err(ConnecteamError::ApiError {
                status,
                body: body_preview(&body),
            });
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            error!(
                "JSON deserialization failed for '{}' (URL: {}): {}",
                context_msg, request_url, e
            );
            ConnecteamError::InvalidJson {
                context: context_msg.to_string(),
                body: body_preview(&body),
                source: e,
            }
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        context_msg: &str,
    ) -> Result<ApiEnvelope<T>, ConnecteamError> {
        let request = self.build_request(Method::GET, endpoint, query)?;
        self.send_and_deserialize(request, context_msg).await
    }

    fn date_range_query(start_date: NaiveDate, end_date: NaiveDate) -> [(&'static str, String); 2] {
        [
            ("startDate", week::format_date(start_date)),
            ("endDate", week::format_date(end_date)),
        ]
    }
}

fn flatten_time_activities(data: TimeActivitiesData) -> Vec<TimeActivity> {
    let mut activities = Vec::new();
    for user in data.time_activities_by_users {
        for shift in user.shifts {
            let Some(start) = Utc.timestamp_opt(shift.start.timestamp, 0).single() else {
                warn!(
                    "Skipping shift {} for user {}: invalid start timestamp {}",
                    shift.id, user.user_id, shift.start.timestamp
                );
                continue;
            };
            let end = shift
                .end
                .as_ref()
                .and_then(|point| Utc.timestamp_opt(point.timestamp, 0).single());
            let duration_seconds = shift.duration.unwrap_or_else(|| {
                end.map(|end| (end - start).num_seconds().max(0))
                    .unwrap_or(0)
            });
            let status = shift.status.clone().unwrap_or_else(|| {
                if end.is_some() {
                    "completed".to_string()
                } else {
                    "active".to_string()
                }
            });
            activities.push(TimeActivity {
                id: shift.id,
                user_id: user.user_id.clone(),
                start,
                end,
                duration_seconds,
                status,
            });
        }
    }
    activities
}

fn collect_timesheet_totals(data: TimesheetData) -> HashMap<String, TimesheetTotals> {
    let mut totals = HashMap::new();
    for user in data.users {
        let mut daily_hours: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for record in &user.daily_records {
            match week::parse_date(&record.date) {
                Ok(date) => {
                    *daily_hours.entry(date).or_default() +=
                        coerce::hours_from_f64(record.daily_total_hours);
                }
                Err(e) => warn!(
                    "Ignoring daily record with unparseable date '{}' for user {}: {}",
                    record.date, user.user_id, e
                ),
            }
        }
        let total_hours = match user.total_hours {
            Some(total) => coerce::hours_from_f64(total),
            None => daily_hours.values().copied().sum(),
        };
        totals.insert(
            user.user_id,
            TimesheetTotals {
                total_hours,
                daily_hours,
            },
        );
    }
    totals
}

#[async_trait]
impl TimeTrackingGateway for ConnecteamClient {
    async fn list_time_clocks(&self) -> Result<Vec<TimeClock>, ConnecteamError> {
        let envelope: ApiEnvelope<TimeClocksData> = self
            .get("/time-clock/v1/time-clocks", &[], "List Time Clocks")
            .await?;
        Ok(envelope.data.time_clocks)
    }

    async fn get_time_activities(
        &self,
        clock_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<TimeActivity>, ConnecteamError> {
        let endpoint = format!("/time-clock/v1/time-clocks/{}/time-activities", clock_id);
        let envelope: ApiEnvelope<TimeActivitiesData> = self
            .get(
                &endpoint,
                &Self::date_range_query(start_date, end_date),
                "Get Time Activities",
            )
            .await?;
        Ok(flatten_time_activities(envelope.data))
    }

    async fn get_timesheet_totals_with_daily(
        &self,
        clock_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<String, TimesheetTotals>, ConnecteamError> {
        let endpoint = format!("/time-clock/v1/time-clocks/{}/timesheet", clock_id);
        let envelope: ApiEnvelope<TimesheetData> = self
            .get(
                &endpoint,
                &Self::date_range_query(start_date, end_date),
                "Get Timesheet Totals",
            )
            .await?;
        Ok(collect_timesheet_totals(envelope.data))
    }

    async fn get_users(&self) -> Result<Vec<ConnecteamUser>, ConnecteamError> {
        let mut users = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = [
                ("limit", USERS_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            let envelope: ApiEnvelope<UsersData> =
                self.get("/users/v1/users", &query, "Get Users").await?;
            let page_len = envelope.data.users.len();
            users.extend(envelope.data.users);

            let has_more = envelope.paging.map_or(false, |paging| paging.has_more);
            if !has_more || page_len == 0 {
                break;
            }
            offset += page_len;
        }
        info!("Fetched {} Connecteam users.", users.len());
        Ok(users)
    }

    async fn get_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ConnecteamError> {
        let envelope: ApiEnvelope<CustomFieldsData> = self
            .get("/users/v1/custom-fields", &[], "Get Custom Fields")
            .await?;
        Ok(envelope.data.custom_fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn d(date_str: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
    }

    fn create_test_client(base_url: &str) -> ConnecteamClient {
        ConnecteamClient::new(ConnecteamConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            timeout_secs: 5,
        })
        .expect("Failed to create test client")
    }

    #[tokio::test]
    async fn list_time_clocks_sends_api_key_and_picks_first_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks"))
            .and(header("X-API-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "requestId": "r1",
                "data": { "timeClocks": [
                    { "id": 1, "name": "Old clock", "isArchived": true },
                    { "id": 2, "name": "Main clock", "isArchived": false },
                    { "id": 3, "name": "Backup", "isArchived": false }
                ]}
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let clocks = client.list_time_clocks().await.unwrap();
        assert_eq!(clocks.len(), 3);
        assert_eq!(active_time_clock(&clocks).map(|c| c.id), Some(2));
    }

    #[tokio::test]
    async fn timesheet_totals_keyed_by_user_with_daily_breakdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks/2/timesheet"))
            .and(query_param("startDate", "2024-01-08"))
            .and(query_param("endDate", "2024-01-14"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "users": [
                    { "userId": 501, "totalHours": 15.5, "dailyRecords": [
                        { "date": "2024-01-08", "dailyTotalHours": 8.0 },
                        { "date": "2024-01-10", "dailyTotalHours": 7.5 }
                    ]},
                    { "userId": 502, "dailyRecords": [
                        { "date": "2024-01-09", "dailyTotalHours": 4.25 }
                    ]}
                ]}
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let totals = client
            .get_timesheet_totals_with_daily(2, d("2024-01-08"), d("2024-01-14"))
            .await
            .unwrap();

        let first = &totals["501"];
        assert_eq!(first.total_hours, dec!(15.5));
        assert_eq!(first.daily_hours[&d("2024-01-10")], dec!(7.5));
        // Missing totalHours falls back to the daily sum.
        assert_eq!(totals["502"].total_hours, dec!(4.25));
    }

    #[tokio::test]
    async fn time_activities_are_flattened_across_users() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks/2/time-activities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "timeActivitiesByUsers": [
                    { "userId": 501, "shifts": [
                        { "id": "s1", "start": { "timestamp": 1704700800 }, "end": { "timestamp": 1704729600 } },
                        { "id": "s2", "start": { "timestamp": 1704787200 } }
                    ]},
                    { "userId": 502, "shifts": [] }
                ]}
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let activities = client
            .get_time_activities(2, d("2024-01-08"), d("2024-01-14"))
            .await
            .unwrap();

        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].user_id, "501");
        assert_eq!(activities[0].duration_seconds, 8 * 3600);
        assert_eq!(activities[0].status, "completed");
        assert_eq!(activities[1].end, None);
        assert_eq!(activities[1].status, "active");
    }

    #[tokio::test]
    async fn users_are_paginated_until_has_more_is_false() {
        let server = MockServer::start().await;
        let first_page: Vec<_> = (0..USERS_PAGE_SIZE)
            .map(|i| json!({ "userId": i, "firstName": "User", "lastName": i.to_string() }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/users/v1/users"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "users": first_page },
                "paging": { "hasMore": true }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/v1/users"))
            .and(query_param("offset", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "users": [ { "userId": 900, "firstName": "Last" } ] },
                "paging": { "hasMore": false }
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let users = client.get_users().await.unwrap();
        assert_eq!(users.len(), USERS_PAGE_SIZE + 1);
        assert_eq!(users.last().unwrap().full_name(), "Last");
    }

    #[tokio::test]
    async fn custom_field_definitions_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/v1/custom-fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "customFields": [
                    { "id": 31, "name": "Hourly rate", "type": "number" },
                    { "id": "32", "name": "Title" }
                ] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let fields = client.get_custom_fields().await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].id, "31");
        assert_eq!(fields[0].type_.as_deref(), Some("number"));
        assert_eq!(fields[1].type_, None);
    }

    #[tokio::test]
    async fn resolving_the_clock_skips_archived_ones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "timeClocks": [
                    { "id": 1, "name": "Old", "isArchived": true },
                    { "id": 2, "name": "Crew", "isArchived": false }
                ] }
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let clock = resolve_active_time_clock(&client).await.unwrap();
        assert_eq!(clock.id, 2);
    }

    #[tokio::test]
    async fn all_archived_clocks_is_no_active_clock() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "timeClocks": [ { "id": 1, "name": "Old", "isArchived": true } ] }
            })))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let err = resolve_active_time_clock(&client).await.unwrap_err();
        assert!(matches!(err, ConnecteamError::NoActiveTimeClock));
    }

    #[tokio::test]
    async fn non_success_status_embeds_truncated_body() {
        let server = MockServer::start().await;
        let long_body = "x".repeat(500);
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks"))
            .respond_with(ResponseTemplate::new(500).set_body_string(long_body))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        match client.list_time_clocks().await {
            Err(ConnecteamError::ApiError { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.len(), ERROR_BODY_PREVIEW_CHARS);
            }
            other => panic!("Expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn html_body_is_reported_as_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/time-clock/v1/time-clocks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let client = create_test_client(&server.uri());
        let err = client.list_time_clocks().await.unwrap_err();
        assert!(matches!(err, ConnecteamError::InvalidJson { .. }));
        assert!(err.to_string().contains("<html>maintenance</html>"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_at_call_time() {
        let client = ConnecteamClient::new(ConnecteamConfig::default()).unwrap();
        let err = client.list_time_clocks().await.unwrap_err();
        assert!(matches!(err, ConnecteamError::ConfigError(_)));
    }
}
