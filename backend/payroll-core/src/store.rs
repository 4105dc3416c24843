// src/store.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    Employee, EmployeeId, NewPayrollRecord, NewPayrollTransaction, PayrollRecord,
    PayrollRecordUpdate, PayrollStatus, PayrollTransaction, Timesheet, TimesheetWeekSummary,
    TimesheetWithEmployee,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request to data store failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Data store error: Status={status}, Message='{message}'")]
    ApiError { status: StatusCode, message: String },

    #[error("Database function '{0}' is not available")]
    RpcUnavailable(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Data store write failed: {0}")]
    WriteFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Row-level access to the four tables the payroll pipeline touches.
#[async_trait]
pub trait PayrollStore: Send + Sync {
    // Employees

    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError>;

    async fn list_active_employees(&self) -> Result<Vec<Employee>, StoreError>;

    async fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError>;

    /// Sets `current_week_hours` to zero on every employee.
    async fn reset_current_week_hours(&self) -> Result<(), StoreError>;

    async fn update_employee_hours(
        &self,
        employee_id: &str,
        hours: Decimal,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // Timesheets

    /// Deletes rows whose `week_start_date` is within `from..=to`.
    async fn delete_timesheets_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), StoreError>;

    /// Inserts or overwrites on `(employee_id, week_start_date)`.
    async fn upsert_timesheets(&self, rows: &[Timesheet]) -> Result<(), StoreError>;

    async fn timesheets_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Timesheet>, StoreError>;

    async fn list_timesheets(&self) -> Result<Vec<Timesheet>, StoreError>;

    /// Database-side week aggregation. May fail with `RpcUnavailable`.
    async fn timesheet_week_summaries_rpc(&self) -> Result<Vec<TimesheetWeekSummary>, StoreError>;

    /// Database-side join of a week's rows with employee columns.
    async fn timesheets_for_week_rpc(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<TimesheetWithEmployee>, StoreError>;

    // Payroll

    async fn payroll_records_for_week(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<PayrollRecord>, StoreError>;

    async fn get_payroll_record(&self, id: &str) -> Result<Option<PayrollRecord>, StoreError>;

    async fn insert_payroll_record(
        &self,
        record: NewPayrollRecord,
    ) -> Result<PayrollRecord, StoreError>;

    async fn update_payroll_record(
        &self,
        id: &str,
        update: PayrollRecordUpdate,
    ) -> Result<PayrollRecord, StoreError>;

    async fn set_payroll_status(
        &self,
        id: &str,
        status: PayrollStatus,
        overridden: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<PayrollRecord, StoreError>;

    async fn insert_payroll_transaction(
        &self,
        transaction: NewPayrollTransaction,
    ) -> Result<PayrollTransaction, StoreError>;

    async fn payroll_transactions(
        &self,
        payroll_record_id: &str,
    ) -> Result<Vec<PayrollTransaction>, StoreError>;
}

// --- In-process implementation ---

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store kept entirely in memory. Used for local runs without a hosted
/// backend and by the test suite.
#[derive(Clone, Default)]
pub struct MemoryStore {
    employees: Arc<Mutex<HashMap<EmployeeId, Employee>>>,
    timesheets: Arc<Mutex<HashMap<(EmployeeId, NaiveDate), Timesheet>>>,
    payroll_records: Arc<Mutex<HashMap<String, PayrollRecord>>>,
    payroll_transactions: Arc<Mutex<Vec<PayrollTransaction>>>,
    rpc_enabled: bool,
    failing_employee_updates: Arc<Mutex<HashSet<EmployeeId>>>,
    fail_hours_reset: Arc<Mutex<bool>>,
    fail_timesheet_upserts: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the two RPC methods answer like a database that has the
    /// aggregation functions installed.
    pub fn with_rpc(mut self) -> Self {
        self.rpc_enabled = true;
        self
    }

    pub fn insert_employee(&self, employee: Employee) {
        info!("Configuring employee: ID={}, Name={}", employee.id, employee.name);
        lock(&self.employees).insert(employee.id.clone(), employee);
    }

    /// Writes a timesheet row as-is, bypassing the upsert key normalization.
    /// Useful for seeding rows written with a drifted week key.
    pub fn insert_timesheet(&self, timesheet: Timesheet) {
        lock(&self.timesheets).insert(
            (timesheet.employee_id.clone(), timesheet.week_start_date),
            timesheet,
        );
    }

    /// Subsequent `update_employee_hours` calls for this employee fail.
    pub fn fail_hours_updates_for(&self, employee_id: &str) {
        lock(&self.failing_employee_updates).insert(employee_id.to_string());
    }

    /// Subsequent `reset_current_week_hours` calls fail.
    pub fn fail_hours_reset(&self) {
        *lock(&self.fail_hours_reset) = true;
    }

    /// Subsequent `upsert_timesheets` calls fail without writing anything.
    pub fn fail_timesheet_upserts(&self) {
        *lock(&self.fail_timesheet_upserts) = true;
    }

    pub fn timesheet_count(&self) -> usize {
        lock(&self.timesheets).len()
    }

    pub fn transaction_count(&self) -> usize {
        lock(&self.payroll_transactions).len()
    }

    fn week_summaries(&self) -> Vec<TimesheetWeekSummary> {
        let rows: Vec<Timesheet> = lock(&self.timesheets).values().cloned().collect();
        crate::timesheets::summarize_weeks(&rows)
    }

    fn joined_week(&self, week_start: NaiveDate) -> Vec<TimesheetWithEmployee> {
        let employees = lock(&self.employees).clone();
        let rows: Vec<Timesheet> = lock(&self.timesheets)
            .values()
            .filter(|ts| ts.week_start_date == week_start)
            .cloned()
            .collect();
        crate::timesheets::join_with_employees(rows, &employees.into_values().collect::<Vec<_>>())
    }
}

#[async_trait]
impl PayrollStore for MemoryStore {
    async fn list_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let mut employees: Vec<Employee> = lock(&self.employees).values().cloned().collect();
        employees.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(employees)
    }

    async fn list_active_employees(&self) -> Result<Vec<Employee>, StoreError> {
        let mut employees = self.list_employees().await?;
        employees.retain(|e| e.is_active);
        Ok(employees)
    }

    async fn get_employee(&self, employee_id: &str) -> Result<Option<Employee>, StoreError> {
        Ok(lock(&self.employees).get(employee_id).cloned())
    }

    async fn reset_current_week_hours(&self) -> Result<(), StoreError> {
        if *lock(&self.fail_hours_reset) {
            return Err(StoreError::WriteFailed(
                "bulk update of employees rejected".to_string(),
            ));
        }
        for employee in lock(&self.employees).values_mut() {
            employee.current_week_hours = Decimal::ZERO;
        }
        Ok(())
    }

    async fn update_employee_hours(
        &self,
        employee_id: &str,
        hours: Decimal,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if lock(&self.failing_employee_updates).contains(employee_id) {
            return Err(StoreError::WriteFailed(format!(
                "update of employees row {} rejected",
                employee_id
            )));
        }
        let mut employees = lock(&self.employees);
        let employee = employees
            .get_mut(employee_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "Employee",
                id: employee_id.to_string(),
            })?;
        employee.current_week_hours = hours;
        employee.last_sync_at = Some(synced_at);
        Ok(())
    }

    async fn delete_timesheets_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut timesheets = lock(&self.timesheets);
        let before = timesheets.len();
        timesheets.retain(|(_, week_start), _| !(*week_start >= from && *week_start <= to));
        debug!(
            "Deleted {} timesheet rows between {} and {}",
            before - timesheets.len(),
            from,
            to
        );
        Ok(())
    }

    async fn upsert_timesheets(&self, rows: &[Timesheet]) -> Result<(), StoreError> {
        if *lock(&self.fail_timesheet_upserts) {
            return Err(StoreError::WriteFailed(format!(
                "upsert of {} timesheets rows rejected",
                rows.len()
            )));
        }
        let mut timesheets = lock(&self.timesheets);
        for row in rows {
            let key = (row.employee_id.clone(), row.week_start_date);
            let id = timesheets
                .get(&key)
                .and_then(|existing| existing.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let mut stored = row.clone();
            stored.id = Some(id);
            timesheets.insert(key, stored);
        }
        Ok(())
    }

    async fn timesheets_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Timesheet>, StoreError> {
        Ok(lock(&self.timesheets)
            .values()
            .filter(|ts| ts.week_start_date >= from && ts.week_start_date <= to)
            .cloned()
            .collect())
    }

    async fn list_timesheets(&self) -> Result<Vec<Timesheet>, StoreError> {
        let mut rows: Vec<Timesheet> = lock(&self.timesheets).values().cloned().collect();
        rows.sort_by(|a, b| {
            b.week_start_date
                .cmp(&a.week_start_date)
                .then_with(|| a.employee_id.cmp(&b.employee_id))
        });
        Ok(rows)
    }

    async fn timesheet_week_summaries_rpc(&self) -> Result<Vec<TimesheetWeekSummary>, StoreError> {
        if !self.rpc_enabled {
            return Err(StoreError::RpcUnavailable("get_timesheet_weeks".to_string()));
        }
        Ok(self.week_summaries())
    }

    async fn timesheets_for_week_rpc(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<TimesheetWithEmployee>, StoreError> {
        if !self.rpc_enabled {
            return Err(StoreError::RpcUnavailable(
                "get_timesheets_for_week".to_string(),
            ));
        }
        Ok(self.joined_week(week_start))
    }

    async fn payroll_records_for_week(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<PayrollRecord>, StoreError> {
        let mut records: Vec<PayrollRecord> = lock(&self.payroll_records)
            .values()
            .filter(|record| record.date == week_start)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
        Ok(records)
    }

    async fn get_payroll_record(&self, id: &str) -> Result<Option<PayrollRecord>, StoreError> {
        Ok(lock(&self.payroll_records).get(id).cloned())
    }

    async fn insert_payroll_record(
        &self,
        record: NewPayrollRecord,
    ) -> Result<PayrollRecord, StoreError> {
        let stored = PayrollRecord {
            id: Uuid::new_v4().to_string(),
            employee_id: record.employee_id,
            date: record.date,
            hours_worked: record.hours_worked,
            total_pay: record.total_pay,
            status: record.status,
            notes: record.notes,
            status_overridden: false,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        lock(&self.payroll_records).insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_payroll_record(
        &self,
        id: &str,
        update: PayrollRecordUpdate,
    ) -> Result<PayrollRecord, StoreError> {
        let mut records = lock(&self.payroll_records);
        let record = records.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "Payroll record",
            id: id.to_string(),
        })?;
        record.hours_worked = update.hours_worked;
        record.total_pay = update.total_pay;
        record.notes = update.notes;
        record.updated_at = update.updated_at;
        Ok(record.clone())
    }

    async fn set_payroll_status(
        &self,
        id: &str,
        status: PayrollStatus,
        overridden: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<PayrollRecord, StoreError> {
        let mut records = lock(&self.payroll_records);
        let record = records.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "Payroll record",
            id: id.to_string(),
        })?;
        record.status = status;
        record.status_overridden = overridden;
        record.updated_at = updated_at;
        Ok(record.clone())
    }

    async fn insert_payroll_transaction(
        &self,
        transaction: NewPayrollTransaction,
    ) -> Result<PayrollTransaction, StoreError> {
        if !lock(&self.payroll_records).contains_key(&transaction.payroll_record_id) {
            return Err(StoreError::NotFound {
                entity: "Payroll record",
                id: transaction.payroll_record_id,
            });
        }
        let stored = PayrollTransaction {
            id: Uuid::new_v4().to_string(),
            payroll_record_id: transaction.payroll_record_id,
            amount: transaction.amount,
            paid_at: transaction.paid_at,
            method: transaction.method,
            memo: transaction.memo,
        };
        lock(&self.payroll_transactions).push(stored.clone());
        Ok(stored)
    }

    async fn payroll_transactions(
        &self,
        payroll_record_id: &str,
    ) -> Result<Vec<PayrollTransaction>, StoreError> {
        let mut transactions: Vec<PayrollTransaction> = lock(&self.payroll_transactions)
            .iter()
            .filter(|tx| tx.payroll_record_id == payroll_record_id)
            .cloned()
            .collect();
        transactions.sort_by_key(|tx| tx.paid_at);
        Ok(transactions)
    }
}
