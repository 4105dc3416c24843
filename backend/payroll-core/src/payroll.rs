// src/payroll.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::coerce::{self, SCALE};
use crate::models::{
    GenerationSummary, NewPayrollRecord, NewPayrollTransaction, PayrollRecord,
    PayrollRecordUpdate, PayrollStatus, PayrollTransaction, Timesheet,
};
use crate::store::{PayrollStore, StoreError};
use crate::week;

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Payment amount must be greater than zero (got {0})")]
    InvalidAmount(Decimal),

    #[error("Hours worked cannot be negative (got {0})")]
    InvalidHours(Decimal),

    #[error("Payroll record not found: {0}")]
    RecordNotFound(String),

    #[error("Employee not found: {0}")]
    EmployeeNotFound(String),
}

/// Status implied by the amount paid so far against the record's snapshot pay.
pub fn derive_status(total_pay: Decimal, total_paid: Decimal) -> PayrollStatus {
    if total_paid <= Decimal::ZERO {
        PayrollStatus::Pending
    } else if total_paid >= total_pay {
        PayrollStatus::Paid
    } else {
        PayrollStatus::Partial
    }
}

/// The derived status when it differs from the stored one.
pub fn status_drift(record: &PayrollRecord, total_paid: Decimal) -> Option<PayrollStatus> {
    let derived = derive_status(record.total_pay, total_paid);
    (derived != record.status).then_some(derived)
}

pub fn compute_pay(hours: Decimal, hourly_rate: Decimal) -> Decimal {
    (hours * hourly_rate).round_dp(SCALE)
}

/// Hours per employee across rows from the widened week window. When
/// several rows match, the largest total wins.
pub fn hours_by_employee(rows: &[Timesheet]) -> HashMap<&str, Decimal> {
    let mut hours: HashMap<&str, Decimal> = HashMap::new();
    for row in rows {
        match hours.get_mut(row.employee_id.as_str()) {
            Some(current) => {
                if *current != row.total_hours {
                    warn!(
                        "Employee {} has conflicting timesheet totals near week {} ({} vs {}); using the larger.",
                        row.employee_id, row.week_start_date, current, row.total_hours
                    );
                }
                *current = (*current).max(row.total_hours);
            }
            None => {
                hours.insert(row.employee_id.as_str(), row.total_hours);
            }
        }
    }
    hours
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub payroll_record_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub transaction: PayrollTransaction,
    pub record: PayrollRecord,
    #[serde(serialize_with = "coerce::number")]
    pub total_paid: Decimal,
}

/// Admin edit. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayrollRecordEdit {
    #[serde(default)]
    pub hours_worked: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollDetail {
    pub record: PayrollRecord,
    pub transactions: Vec<PayrollTransaction>,
    #[serde(serialize_with = "coerce::number")]
    pub total_paid: Decimal,
    #[serde(serialize_with = "coerce::number")]
    pub balance: Decimal,
}

#[derive(Clone)]
pub struct PayrollEngine {
    store: Arc<dyn PayrollStore>,
    clock: Arc<dyn Clock>,
}

impl PayrollEngine {
    pub fn new(store: Arc<dyn PayrollStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates or refreshes one record per active employee for the week.
    /// Existing records keep their status.
    pub async fn generate_weekly_payroll(
        &self,
        week_start: NaiveDate,
    ) -> Result<GenerationSummary, PayrollError> {
        let requested = week_start;
        let week_start = week::week_start(requested);
        if week_start != requested {
            info!(
                "Payroll week {} is not a Monday; generating for {} instead",
                requested, week_start
            );
        }
        info!("Generating payroll for week starting {}...", week_start);

        let employees = self.store.list_active_employees().await?;
        let (window_from, window_to) = week::legacy_week_window(week_start);
        let timesheets = self.store.timesheets_between(window_from, window_to).await?;
        let hours = hours_by_employee(&timesheets);

        let existing: HashMap<String, PayrollRecord> = self
            .store
            .payroll_records_for_week(week_start)
            .await?
            .into_iter()
            .map(|record| (record.employee_id.clone(), record))
            .collect();

        let now = self.clock.now();
        let mut created = 0;
        let mut updated = 0;
        let mut records = Vec::with_capacity(employees.len());

        for employee in &employees {
            let hours_worked = hours
                .get(employee.id.as_str())
                .copied()
                .unwrap_or(Decimal::ZERO);
            let total_pay = compute_pay(hours_worked, employee.hourly_rate);

            let record = match existing.get(&employee.id) {
                Some(record) => {
                    debug!(
                        "Updating payroll record {} for {}: {}h, {} (status {} kept)",
                        record.id, employee.name, hours_worked, total_pay, record.status
                    );
                    updated += 1;
                    self.store
                        .update_payroll_record(
                            &record.id,
                            PayrollRecordUpdate {
                                hours_worked,
                                total_pay,
                                notes: record.notes.clone(),
                                updated_at: now,
                            },
                        )
                        .await?
                }
                None => {
                    let status = if total_pay.is_zero() {
                        PayrollStatus::Paid
                    } else {
                        PayrollStatus::Pending
                    };
                    debug!(
                        "Creating payroll record for {}: {}h, {} ({})",
                        employee.name, hours_worked, total_pay, status
                    );
                    created += 1;
                    self.store
                        .insert_payroll_record(NewPayrollRecord {
                            employee_id: employee.id.clone(),
                            date: week_start,
                            hours_worked,
                            total_pay,
                            status,
                            notes: None,
                            created_at: now,
                            updated_at: now,
                        })
                        .await?
                }
            };
            records.push(record);
        }

        info!(
            "Payroll generation for {} complete. Created {}, updated {}.",
            week_start, created, updated
        );
        Ok(GenerationSummary {
            week_start,
            created,
            updated,
            records,
        })
    }

    async fn require_record(&self, id: &str) -> Result<PayrollRecord, PayrollError> {
        self.store
            .get_payroll_record(id)
            .await?
            .ok_or_else(|| PayrollError::RecordNotFound(id.to_string()))
    }

    async fn total_paid(&self, id: &str) -> Result<(Vec<PayrollTransaction>, Decimal), PayrollError> {
        let transactions = self.store.payroll_transactions(id).await?;
        let total: Decimal = transactions.iter().map(|tx| tx.amount).sum();
        Ok((transactions, total))
    }

    /// Writes the status derived from the record's transactions. Clears an
    /// admin override.
    async fn apply_derived_status(
        &self,
        record: &PayrollRecord,
        total_paid: Decimal,
    ) -> Result<PayrollRecord, PayrollError> {
        let status = derive_status(record.total_pay, total_paid);
        if record.status_overridden && status != record.status {
            warn!(
                "Payroll record {} had an admin-set status '{}'; replacing with '{}' from payments",
                record.id, record.status, status
            );
        }
        Ok(self
            .store
            .set_payroll_status(&record.id, status, false, self.clock.now())
            .await?)
    }

    /// Appends a payment and recomputes the record status. Non-positive
    /// amounts are rejected before anything is written.
    pub async fn record_payroll_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, PayrollError> {
        if request.amount <= Decimal::ZERO {
            warn!(
                "Rejected payment of {} for payroll record {}",
                request.amount, request.payroll_record_id
            );
            return Err(PayrollError::InvalidAmount(request.amount));
        }

        let record = self.require_record(&request.payroll_record_id).await?;
        let transaction = self
            .store
            .insert_payroll_transaction(NewPayrollTransaction {
                payroll_record_id: record.id.clone(),
                amount: request.amount.round_dp(SCALE),
                paid_at: request.paid_at.unwrap_or_else(|| self.clock.now()),
                method: request.method,
                memo: request.memo,
            })
            .await?;

        let (_, total_paid) = self.total_paid(&record.id).await?;
        let record = self.apply_derived_status(&record, total_paid).await?;
        info!(
            "Recorded payment of {} on payroll record {}. Paid {} of {}, status {}.",
            transaction.amount, record.id, total_paid, record.total_pay, record.status
        );

        Ok(PaymentOutcome {
            transaction,
            record,
            total_paid,
        })
    }

    pub async fn recompute_status(&self, id: &str) -> Result<PayrollRecord, PayrollError> {
        let record = self.require_record(id).await?;
        let (_, total_paid) = self.total_paid(id).await?;
        self.apply_derived_status(&record, total_paid).await
    }

    /// Administrative override. Stays in place until the next payment.
    pub async fn mark_payroll_status(
        &self,
        id: &str,
        status: PayrollStatus,
    ) -> Result<PayrollRecord, PayrollError> {
        let record = self.require_record(id).await?;
        warn!(
            "Admin override: payroll record {} status '{}' -> '{}'",
            id, record.status, status
        );
        Ok(self
            .store
            .set_payroll_status(id, status, true, self.clock.now())
            .await?)
    }

    /// Hours edits reprice with the employee's current rate. Status is left alone.
    pub async fn update_payroll_record(
        &self,
        id: &str,
        edit: PayrollRecordEdit,
    ) -> Result<PayrollRecord, PayrollError> {
        let record = self.require_record(id).await?;

        let (hours_worked, total_pay) = match edit.hours_worked {
            Some(hours) if hours < Decimal::ZERO => return Err(PayrollError::InvalidHours(hours)),
            Some(hours) => {
                let employee = self
                    .store
                    .get_employee(&record.employee_id)
                    .await?
                    .ok_or_else(|| PayrollError::EmployeeNotFound(record.employee_id.clone()))?;
                let hours = hours.round_dp(SCALE);
                (hours, compute_pay(hours, employee.hourly_rate))
            }
            None => (record.hours_worked, record.total_pay),
        };

        let updated = self
            .store
            .update_payroll_record(
                id,
                PayrollRecordUpdate {
                    hours_worked,
                    total_pay,
                    notes: edit.notes.or(record.notes),
                    updated_at: self.clock.now(),
                },
            )
            .await?;
        info!(
            "Payroll record {} edited: {}h, {}",
            id, updated.hours_worked, updated.total_pay
        );

        let (_, total_paid) = self.total_paid(id).await?;
        if let Some(derived) = status_drift(&updated, total_paid) {
            warn!(
                "Payroll record {} keeps status '{}' after edit; payments of {} against {} would derive '{}'",
                id, updated.status, total_paid, updated.total_pay, derived
            );
        }
        Ok(updated)
    }

    pub async fn payroll_for_week(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<PayrollRecord>, PayrollError> {
        Ok(self
            .store
            .payroll_records_for_week(week::week_start(week_start))
            .await?)
    }

    pub async fn payroll_detail(&self, id: &str) -> Result<PayrollDetail, PayrollError> {
        let record = self.require_record(id).await?;
        let (transactions, total_paid) = self.total_paid(id).await?;
        let balance = (record.total_pay - total_paid).max(Decimal::ZERO);
        Ok(PayrollDetail {
            record,
            transactions,
            total_paid,
            balance,
        })
    }
}
