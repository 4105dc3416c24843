// src/sync.rs

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::connecteam_client::{
    resolve_active_time_clock, ConnecteamError, TimeTrackingGateway, TimesheetTotals,
};
use crate::models::{DailyHours, SyncResult, Timesheet};
use crate::roster::EmployeeRoster;
use crate::store::PayrollStore;
use crate::week;

/// Pulls the week's hours from Connecteam into `employees` and `timesheets`.
#[derive(Clone)]
pub struct HoursSynchronizer {
    gateway: Arc<dyn TimeTrackingGateway>,
    store: Arc<dyn PayrollStore>,
    clock: Arc<dyn Clock>,
}

/// Output of the populate phase.
#[derive(Debug, Default)]
pub struct PopulateOutcome {
    pub timesheets: Vec<Timesheet>,
    pub employees_synced: usize,
    pub errors: Vec<String>,
}

impl HoursSynchronizer {
    pub fn new(
        gateway: Arc<dyn TimeTrackingGateway>,
        store: Arc<dyn PayrollStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
        }
    }

    /// Reconciles one week. `week_start` defaults to the current week; any
    /// date is moved to the Monday of its week.
    ///
    /// Loading employees, resolving the clock and fetching hours are fatal.
    /// Anything after that is collected into `errors` and the run continues.
    pub async fn sync_current_week_hours(
        &self,
        week_start: Option<NaiveDate>,
        clear_first: bool,
    ) -> SyncResult {
        let synced_at = self.clock.now();
        let fatal = |message: String| {
            error!("Hours sync aborted: {}", message);
            SyncResult {
                success: false,
                employees_synced: 0,
                errors: vec![message],
                synced_at,
            }
        };

        info!("Starting Connecteam hours sync (clear_first={})...", clear_first);

        let roster = match self.store.list_employees().await {
            Ok(employees) => EmployeeRoster::new(employees),
            Err(e) => return fatal(format!("Failed to load employees: {}", e)),
        };
        debug!("Loaded {} employees for sync", roster.len());

        let mut errors = Vec::new();
        let mut hours_reset = false;
        if clear_first {
            match self.reset_phase().await {
                Ok(()) => hours_reset = true,
                Err(message) => errors.push(message),
            }
        }

        let time_clock = match resolve_active_time_clock(self.gateway.as_ref()).await {
            Ok(time_clock) => time_clock,
            Err(e @ ConnecteamError::NoActiveTimeClock) => return fatal(e.to_string()),
            Err(e) => return fatal(format!("Failed to list time clocks: {}", e)),
        };
        info!("Using time clock {} ({})", time_clock.id, time_clock.name);

        let week_start = match week_start {
            Some(date) => {
                let monday = week::week_start(date);
                if monday != date {
                    debug!("Requested week {} normalized to Monday {}", date, monday);
                }
                monday
            }
            None => week::current_week_start(self.clock.as_ref()),
        };
        let week_end = week::week_end(week_start);

        let totals = match self
            .gateway
            .get_timesheet_totals_with_daily(time_clock.id, week_start, week_end)
            .await
        {
            Ok(totals) => totals,
            Err(e) => return fatal(format!("Failed to fetch Connecteam timesheet: {}", e)),
        };
        info!(
            "Fetched hours for {} Connecteam users for week {} - {}",
            totals.len(),
            week_start,
            week_end
        );

        let (window_from, window_to) = week::legacy_week_window(week_start);
        if let Err(e) = self
            .store
            .delete_timesheets_between(window_from, window_to)
            .await
        {
            let message = format!("Failed to clear timesheets for week {}: {}", week_start, e);
            error!("{}", message);
            errors.push(message);
        }

        let outcome = self
            .populate_phase(&roster, &totals, week_start, hours_reset, synced_at)
            .await;
        errors.extend(outcome.errors);

        if let Err(e) = self.store.upsert_timesheets(&outcome.timesheets).await {
            let message = format!(
                "Failed to upsert {} timesheet rows: {}",
                outcome.timesheets.len(),
                e
            );
            error!("{}", message);
            errors.push(message);
        }

        let success = errors.is_empty();
        if success {
            info!(
                "Hours sync complete. Synced {} employees.",
                outcome.employees_synced
            );
        } else {
            warn!(
                "Hours sync finished with {} errors. Synced {} employees.",
                errors.len(),
                outcome.employees_synced
            );
        }

        SyncResult {
            success,
            employees_synced: outcome.employees_synced,
            errors,
            synced_at,
        }
    }

    /// Zeroes the cached weekly hours of every employee.
    pub async fn reset_phase(&self) -> Result<(), String> {
        info!("Resetting current week hours for all employees...");
        self.store.reset_current_week_hours().await.map_err(|e| {
            let message = format!("Failed to reset current week hours: {}", e);
            error!("{}", message);
            message
        })
    }

    /// Writes each employee's hours and builds one timesheet row per employee.
    ///
    /// Employees without a Connecteam id get zero hours. Their cached field
    /// is only written when `hours_reset` is false; a successful reset
    /// already zeroed it.
    pub async fn populate_phase(
        &self,
        roster: &EmployeeRoster,
        totals: &HashMap<String, TimesheetTotals>,
        week_start: NaiveDate,
        hours_reset: bool,
        synced_at: DateTime<Utc>,
    ) -> PopulateOutcome {
        let mut outcome = PopulateOutcome::default();

        for employee in roster.employees() {
            let external_id = EmployeeRoster::connecteam_id_of(employee);

            let (hours, daily) = match external_id {
                None => {
                    debug!("Employee {} has no Connecteam id; zero hours", employee.id);
                    (Decimal::ZERO, DailyHours::default())
                }
                Some(id) => match totals.get(id) {
                    Some(user_totals) => (
                        user_totals.total_hours,
                        daily_breakdown(&employee.id, user_totals, week_start),
                    ),
                    None => (Decimal::ZERO, DailyHours::default()),
                },
            };

            let needs_write = external_id.is_some() || !hours_reset;
            let write_result = if needs_write {
                self.store
                    .update_employee_hours(&employee.id, hours, synced_at)
                    .await
            } else {
                Ok(())
            };

            match write_result {
                Ok(()) => outcome.employees_synced += 1,
                Err(e) => {
                    let message = format!(
                        "Failed to update hours for employee {} ({}): {}",
                        employee.name, employee.id, e
                    );
                    error!("{}", message);
                    outcome.errors.push(message);
                }
            }

            outcome.timesheets.push(Timesheet::synced(
                &employee.id,
                week_start,
                hours,
                daily,
                synced_at,
            ));
        }

        outcome
    }
}

/// Spreads per-date hours onto weekday slots. Dates outside the week are
/// ignored.
fn daily_breakdown(
    employee_id: &str,
    totals: &TimesheetTotals,
    week_start: NaiveDate,
) -> DailyHours {
    let week_end = week::week_end(week_start);
    let mut daily = DailyHours::default();
    for (date, hours) in &totals.daily_hours {
        if *date < week_start || *date > week_end {
            warn!(
                "Ignoring {} hours on {} for employee {}: outside week {}",
                hours, date, employee_id, week_start
            );
            continue;
        }
        daily.add(date.weekday(), *hours);
    }
    daily
}

/// Re-syncs the current week every `interval` until the task is dropped.
pub async fn run_periodic_sync(synchronizer: Arc<HoursSynchronizer>, interval: Duration) {
    loop {
        sleep(interval).await;
        info!("Starting periodic hours synchronization...");
        let result = synchronizer.sync_current_week_hours(None, true).await;
        if !result.success {
            error!(
                "Periodic hours sync reported {} errors: {:?}",
                result.errors.len(),
                result.errors
            );
        }
    }
}
