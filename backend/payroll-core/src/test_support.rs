// src/test_support.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::connecteam_client::{
    ConnecteamError, ConnecteamUser, CustomFieldDefinition, TimeActivity, TimeClock,
    TimeTrackingGateway, TimesheetTotals,
};
use crate::models::Employee;

/// Gateway answering from canned data, recording the ranges it was asked for.
#[derive(Clone, Default)]
pub struct MockGateway {
    pub clocks: Arc<Mutex<Vec<TimeClock>>>,
    pub totals: Arc<Mutex<HashMap<String, TimesheetTotals>>>,
    pub users: Arc<Mutex<Vec<ConnecteamUser>>>,
    pub custom_fields: Arc<Mutex<Vec<CustomFieldDefinition>>>,
    pub fail_timesheet_fetch: Arc<Mutex<bool>>,
    pub requested_ranges: Arc<Mutex<Vec<(i64, NaiveDate, NaiveDate)>>>,
}

impl MockGateway {
    /// One archived and one live clock (id 2).
    pub fn new() -> Self {
        let gateway = Self::default();
        *gateway.clocks.lock().unwrap() = vec![
            TimeClock {
                id: 1,
                name: "Retired".to_string(),
                is_archived: true,
            },
            TimeClock {
                id: 2,
                name: "Cleaning crew".to_string(),
                is_archived: false,
            },
        ];
        gateway
    }

    pub fn set_hours(&self, connecteam_id: &str, days: &[(NaiveDate, Decimal)]) {
        let daily_hours: BTreeMap<NaiveDate, Decimal> = days.iter().copied().collect();
        let total_hours: Decimal = daily_hours.values().copied().sum();
        self.totals.lock().unwrap().insert(
            connecteam_id.to_string(),
            TimesheetTotals {
                total_hours,
                daily_hours,
            },
        );
    }

    pub fn clear_hours(&self) {
        self.totals.lock().unwrap().clear();
    }

    pub fn archive_all_clocks(&self) {
        for clock in self.clocks.lock().unwrap().iter_mut() {
            clock.is_archived = true;
        }
    }
}

#[async_trait]
impl TimeTrackingGateway for MockGateway {
    async fn list_time_clocks(&self) -> Result<Vec<TimeClock>, ConnecteamError> {
        Ok(self.clocks.lock().unwrap().clone())
    }

    async fn get_time_activities(
        &self,
        _clock_id: i64,
        _start_date: NaiveDate,
        _end_date: NaiveDate,
    ) -> Result<Vec<TimeActivity>, ConnecteamError> {
        Ok(Vec::new())
    }

    async fn get_timesheet_totals_with_daily(
        &self,
        clock_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<HashMap<String, TimesheetTotals>, ConnecteamError> {
        self.requested_ranges
            .lock()
            .unwrap()
            .push((clock_id, start_date, end_date));
        if *self.fail_timesheet_fetch.lock().unwrap() {
            return Err(ConnecteamError::ApiError {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "<html>upstream down</html>".to_string(),
            });
        }
        Ok(self.totals.lock().unwrap().clone())
    }

    async fn get_users(&self) -> Result<Vec<ConnecteamUser>, ConnecteamError> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn get_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, ConnecteamError> {
        Ok(self.custom_fields.lock().unwrap().clone())
    }
}

pub fn d(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

pub fn employee(id: &str, name: &str, connecteam_id: Option<&str>, rate: Decimal) -> Employee {
    Employee {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(format!("{}@example.com", id)),
        title: Some("Cleaner".to_string()),
        connecteam_id: connecteam_id.map(str::to_string),
        hourly_rate: rate,
        current_week_hours: Decimal::ZERO,
        last_sync_at: None,
        is_active: true,
    }
}
