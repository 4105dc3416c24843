// src/models.rs

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::coerce;
use crate::week;

pub type EmployeeId = String;
pub type PayrollRecordId = String;

fn default_true() -> bool {
    true
}

// --- Roster ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(deserialize_with = "coerce::id")]
    pub id: EmployeeId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Connecteam user id. Employees without one always reconcile to zero hours.
    #[serde(default, deserialize_with = "coerce::optional_id")]
    pub connecteam_id: Option<String>,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub hourly_rate: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub current_week_hours: Decimal,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

// --- Timesheets ---

/// Hours per weekday. Serialized as the seven `{day}_hours` columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyHours {
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub monday_hours: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub tuesday_hours: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub wednesday_hours: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub thursday_hours: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub friday_hours: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub saturday_hours: Decimal,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub sunday_hours: Decimal,
}

impl DailyHours {
    fn slot_mut(&mut self, day: Weekday) -> &mut Decimal {
        match day {
            Weekday::Mon => &mut self.monday_hours,
            Weekday::Tue => &mut self.tuesday_hours,
            Weekday::Wed => &mut self.wednesday_hours,
            Weekday::Thu => &mut self.thursday_hours,
            Weekday::Fri => &mut self.friday_hours,
            Weekday::Sat => &mut self.saturday_hours,
            Weekday::Sun => &mut self.sunday_hours,
        }
    }

    pub fn get(&self, day: Weekday) -> Decimal {
        match day {
            Weekday::Mon => self.monday_hours,
            Weekday::Tue => self.tuesday_hours,
            Weekday::Wed => self.wednesday_hours,
            Weekday::Thu => self.thursday_hours,
            Weekday::Fri => self.friday_hours,
            Weekday::Sat => self.saturday_hours,
            Weekday::Sun => self.sunday_hours,
        }
    }

    /// Adds to the slot; negative provider values are clamped to zero.
    pub fn add(&mut self, day: Weekday, hours: Decimal) {
        let slot = self.slot_mut(day);
        *slot = (*slot + hours).max(Decimal::ZERO);
    }

    pub fn total(&self) -> Decimal {
        self.monday_hours
            + self.tuesday_hours
            + self.wednesday_hours
            + self.thursday_hours
            + self.friday_hours
            + self.saturday_hours
            + self.sunday_hours
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timesheet {
    #[serde(default, skip_serializing, deserialize_with = "coerce::optional_id")]
    pub id: Option<String>,
    #[serde(deserialize_with = "coerce::id")]
    pub employee_id: EmployeeId,
    #[serde(deserialize_with = "date_key")]
    pub week_start_date: NaiveDate,
    #[serde(deserialize_with = "date_key")]
    pub week_end_date: NaiveDate,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub total_hours: Decimal,
    #[serde(flatten)]
    pub daily: DailyHours,
    #[serde(default)]
    pub synced_from_connecteam: bool,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl Timesheet {
    /// A sync-derived row for the week starting `week_start`.
    pub fn synced(
        employee_id: &str,
        week_start: NaiveDate,
        total_hours: Decimal,
        daily: DailyHours,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            employee_id: employee_id.to_string(),
            week_start_date: week_start,
            week_end_date: week::week_end(week_start),
            total_hours,
            daily,
            synced_from_connecteam: true,
            synced_at: Some(synced_at),
        }
    }
}

/// Date columns may come back as timestamps; only the date part is kept.
fn date_key<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    week::parse_date(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetWeekSummary {
    #[serde(deserialize_with = "date_key")]
    pub week_start_date: NaiveDate,
    #[serde(default)]
    pub employee_count: u32,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub total_hours: Decimal,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetWithEmployee {
    #[serde(flatten)]
    pub timesheet: Timesheet,
    pub employee_name: String,
    #[serde(default)]
    pub employee_email: Option<String>,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub title: Option<String>,
}

// --- Payroll ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayrollStatus {
    Pending,
    Partial,
    Paid,
}

impl PayrollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayrollStatus::Pending => "pending",
            PayrollStatus::Partial => "partial",
            PayrollStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PayrollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayrollStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PayrollStatus::Pending),
            "partial" => Ok(PayrollStatus::Partial),
            "paid" => Ok(PayrollStatus::Paid),
            other => Err(format!("unknown payroll status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollRecord {
    #[serde(deserialize_with = "coerce::id")]
    pub id: PayrollRecordId,
    #[serde(deserialize_with = "coerce::id")]
    pub employee_id: EmployeeId,
    /// Week start (Monday).
    #[serde(deserialize_with = "date_key")]
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub hours_worked: Decimal,
    /// Snapshot of hours × rate at generation time.
    #[serde(default, deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub total_pay: Decimal,
    pub status: PayrollStatus,
    #[serde(default)]
    pub notes: Option<String>,
    /// Set when an admin forced the status instead of letting payments drive it.
    #[serde(default)]
    pub status_overridden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPayrollRecord {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    #[serde(serialize_with = "coerce::number")]
    pub hours_worked: Decimal,
    #[serde(serialize_with = "coerce::number")]
    pub total_pay: Decimal,
    pub status: PayrollStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields rewritten by generation or by an admin edit. Status is never part
/// of this update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollRecordUpdate {
    #[serde(serialize_with = "coerce::number")]
    pub hours_worked: Decimal,
    #[serde(serialize_with = "coerce::number")]
    pub total_pay: Decimal,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollTransaction {
    #[serde(deserialize_with = "coerce::id")]
    pub id: String,
    #[serde(deserialize_with = "coerce::id")]
    pub payroll_record_id: PayrollRecordId,
    #[serde(deserialize_with = "coerce::decimal", serialize_with = "coerce::number")]
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPayrollTransaction {
    pub payroll_record_id: PayrollRecordId,
    #[serde(serialize_with = "coerce::number")]
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub method: Option<String>,
    pub memo: Option<String>,
}

// --- Operation results ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub employees_synced: usize,
    pub errors: Vec<String>,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub week_start: NaiveDate,
    pub created: usize,
    pub updated: usize,
    pub records: Vec<PayrollRecord>,
}
