// src/export.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

use crate::models::{Employee, PayrollRecord, PayrollStatus};
use crate::store::{PayrollStore, StoreError};
use crate::week;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollExportRow {
    pub employee_id: String,
    pub employee_name: String,
    pub week_start: String,
    pub hours_worked: Decimal,
    pub hourly_rate: Decimal,
    pub total_pay: Decimal,
    pub status: PayrollStatus,
    pub notes: String,
}

/// One row per record, sorted by employee name. Records whose employee is
/// gone keep their id with an empty name and zero rate.
pub fn build_export_rows(
    records: &[PayrollRecord],
    employees: &[Employee],
) -> Vec<PayrollExportRow> {
    let by_id: HashMap<&str, &Employee> = employees.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut rows: Vec<PayrollExportRow> = records
        .iter()
        .map(|record| {
            let employee = by_id.get(record.employee_id.as_str());
            PayrollExportRow {
                employee_id: record.employee_id.clone(),
                employee_name: employee.map(|e| e.name.clone()).unwrap_or_default(),
                week_start: week::format_date(record.date),
                hours_worked: record.hours_worked,
                hourly_rate: employee.map(|e| e.hourly_rate).unwrap_or(Decimal::ZERO),
                total_pay: record.total_pay,
                status: record.status,
                notes: record.notes.clone().unwrap_or_default(),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.employee_name
            .cmp(&b.employee_name)
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    rows
}

pub async fn export_rows_for_week(
    store: &dyn PayrollStore,
    week_start: NaiveDate,
) -> Result<Vec<PayrollExportRow>, StoreError> {
    let records = store
        .payroll_records_for_week(week::week_start(week_start))
        .await?;
    let employees = store.list_employees().await?;
    Ok(build_export_rows(&records, &employees))
}

/// Writes a header line followed by one line per row.
pub fn write_payroll_csv<W: Write>(writer: W, rows: &[PayrollExportRow]) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    if rows.is_empty() {
        csv_writer.write_record([
            "employee_id",
            "employee_name",
            "week_start",
            "hours_worked",
            "hourly_rate",
            "total_pay",
            "status",
            "notes",
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}
