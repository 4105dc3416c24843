// src/timesheets.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Employee, Timesheet, TimesheetWeekSummary, TimesheetWithEmployee};
use crate::store::{PayrollStore, StoreError};

/// Groups raw rows by week start, newest week first.
///
/// `last_synced_at` is the first non-null `synced_at` seen for the week, in
/// row order.
pub fn summarize_weeks(rows: &[Timesheet]) -> Vec<TimesheetWeekSummary> {
    let mut grouped: BTreeMap<NaiveDate, (HashSet<&str>, TimesheetWeekSummary)> = BTreeMap::new();
    for row in rows {
        let (employees, summary) = grouped.entry(row.week_start_date).or_insert_with(|| {
            (
                HashSet::new(),
                TimesheetWeekSummary {
                    week_start_date: row.week_start_date,
                    employee_count: 0,
                    total_hours: Decimal::ZERO,
                    last_synced_at: None,
                },
            )
        });
        employees.insert(row.employee_id.as_str());
        summary.total_hours += row.total_hours;
        if summary.last_synced_at.is_none() {
            summary.last_synced_at = row.synced_at;
        }
    }

    grouped
        .into_values()
        .rev()
        .map(|(employees, mut summary)| {
            summary.employee_count = employees.len() as u32;
            summary
        })
        .collect()
}

/// Attaches employee columns to each row, ordered by employee name. Rows
/// whose employee no longer exists are dropped.
pub fn join_with_employees(
    rows: Vec<Timesheet>,
    employees: &[Employee],
) -> Vec<TimesheetWithEmployee> {
    let by_id: HashMap<&str, &Employee> = employees.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut joined: Vec<TimesheetWithEmployee> = rows
        .into_iter()
        .filter_map(|timesheet| match by_id.get(timesheet.employee_id.as_str()) {
            Some(employee) => Some(TimesheetWithEmployee {
                employee_name: employee.name.clone(),
                employee_email: employee.email.clone(),
                hourly_rate: employee.hourly_rate,
                title: employee.title.clone(),
                timesheet,
            }),
            None => {
                debug!(
                    "Dropping timesheet row for unknown employee {}",
                    timesheet.employee_id
                );
                None
            }
        })
        .collect();
    joined.sort_by(|a, b| a.employee_name.cmp(&b.employee_name));
    joined
}

/// Read side of the timesheet table. Prefers the database-side aggregation
/// and falls back to doing the same work over raw rows.
#[derive(Clone)]
pub struct TimesheetService {
    store: Arc<dyn PayrollStore>,
}

impl TimesheetService {
    pub fn new(store: Arc<dyn PayrollStore>) -> Self {
        Self { store }
    }

    pub async fn get_available_timesheet_weeks(
        &self,
    ) -> Result<Vec<TimesheetWeekSummary>, StoreError> {
        match self.store.timesheet_week_summaries_rpc().await {
            Ok(summaries) => {
                debug!("Loaded {} week summaries via RPC", summaries.len());
                Ok(summaries)
            }
            Err(e) => {
                warn!("Week summary RPC failed ({}); aggregating raw timesheet rows.", e);
                let rows = self.store.list_timesheets().await?;
                let summaries = summarize_weeks(&rows);
                info!(
                    "Aggregated {} timesheet rows into {} weeks",
                    rows.len(),
                    summaries.len()
                );
                Ok(summaries)
            }
        }
    }

    pub async fn get_timesheets_for_week(
        &self,
        week_start: NaiveDate,
    ) -> Result<Vec<TimesheetWithEmployee>, StoreError> {
        match self.store.timesheets_for_week_rpc(week_start).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(
                    "Timesheets-for-week RPC failed for {} ({}); joining rows locally.",
                    week_start, e
                );
                let rows = self.store.timesheets_between(week_start, week_start).await?;
                let employees = self.store.list_employees().await?;
                Ok(join_with_employees(rows, &employees))
            }
        }
    }
}
