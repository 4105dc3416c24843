// src/roster.rs

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::connecteam_client::{ConnecteamUser, CustomFieldDefinition, TimeTrackingGateway};
use crate::error::AppError;
use crate::models::Employee;
use crate::store::PayrollStore;

/// Employees indexed by their Connecteam user id.
#[derive(Debug, Clone, Default)]
pub struct EmployeeRoster {
    employees: Vec<Employee>,
    by_connecteam_id: HashMap<String, usize>,
}

impl EmployeeRoster {
    pub fn new(employees: Vec<Employee>) -> Self {
        let mut by_connecteam_id = HashMap::new();
        for (idx, employee) in employees.iter().enumerate() {
            let Some(external_id) = Self::connecteam_id_of(employee) else {
                continue;
            };
            if let Some(previous) = by_connecteam_id.insert(external_id.to_string(), idx) {
                warn!(
                    "Connecteam id {} is linked to both {} and {}; using the latter.",
                    external_id, employees[previous].id, employee.id
                );
            }
        }
        Self {
            employees,
            by_connecteam_id,
        }
    }

    /// Trimmed Connecteam id, or `None` when unset or blank.
    pub fn connecteam_id_of(employee: &Employee) -> Option<&str> {
        employee
            .connecteam_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn active(&self) -> impl Iterator<Item = &Employee> {
        self.employees.iter().filter(|e| e.is_active)
    }

    pub fn find_by_connecteam_id(&self, connecteam_id: &str) -> Option<&Employee> {
        self.by_connecteam_id
            .get(connecteam_id.trim())
            .map(|&idx| &self.employees[idx])
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn match_connecteam_users(&self, users: &[ConnecteamUser]) -> RosterMatchReport {
        let mut report = RosterMatchReport::default();
        let mut seen = HashSet::new();

        for user in users {
            match self.find_by_connecteam_id(&user.user_id) {
                Some(employee) => {
                    seen.insert(employee.id.clone());
                    report.matched.push(RosterMatch {
                        employee_id: employee.id.clone(),
                        employee_name: employee.name.clone(),
                        connecteam_id: user.user_id.clone(),
                        connecteam_name: user.full_name(),
                        connecteam_archived: user.is_archived,
                    });
                }
                None if !user.is_archived => report.unknown_users.push(UnknownUser {
                    connecteam_id: user.user_id.clone(),
                    name: user.full_name(),
                    email: user.email.clone(),
                }),
                None => {}
            }
        }

        report.unlinked_employees = self
            .active()
            .filter(|e| !seen.contains(&e.id))
            .map(|e| UnlinkedEmployee {
                employee_id: e.id.clone(),
                name: e.name.clone(),
                connecteam_id: e.connecteam_id.clone(),
            })
            .collect();
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterMatch {
    pub employee_id: String,
    pub employee_name: String,
    pub connecteam_id: String,
    pub connecteam_name: String,
    pub connecteam_archived: bool,
}

/// Active employee with no live Connecteam counterpart. Their hours will
/// always sync as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlinkedEmployee {
    pub employee_id: String,
    pub name: String,
    pub connecteam_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownUser {
    pub connecteam_id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RosterMatchReport {
    pub matched: Vec<RosterMatch>,
    pub unlinked_employees: Vec<UnlinkedEmployee>,
    pub unknown_users: Vec<UnknownUser>,
}

#[derive(Clone)]
pub struct RosterService {
    gateway: Arc<dyn TimeTrackingGateway>,
    store: Arc<dyn PayrollStore>,
}

impl RosterService {
    pub fn new(gateway: Arc<dyn TimeTrackingGateway>, store: Arc<dyn PayrollStore>) -> Self {
        Self { gateway, store }
    }

    pub async fn load(&self) -> Result<EmployeeRoster, AppError> {
        Ok(EmployeeRoster::new(self.store.list_employees().await?))
    }

    pub async fn connecteam_match_report(&self) -> Result<RosterMatchReport, AppError> {
        let roster = self.load().await?;
        let users = self.gateway.get_users().await?;
        let report = roster.match_connecteam_users(&users);
        info!(
            "Roster match: {} matched, {} unlinked employees, {} unknown Connecteam users",
            report.matched.len(),
            report.unlinked_employees.len(),
            report.unknown_users.len()
        );
        Ok(report)
    }

    pub async fn connecteam_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, AppError> {
        let fields = self.gateway.get_custom_fields().await?;
        info!("Fetched {} Connecteam custom field definitions", fields.len());
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn employee(id: &str, name: &str, connecteam_id: Option<&str>, active: bool) -> Employee {
        Employee {
            id: id.to_string(),
            name: name.to_string(),
            email: None,
            title: None,
            connecteam_id: connecteam_id.map(str::to_string),
            hourly_rate: Decimal::ZERO,
            current_week_hours: Decimal::ZERO,
            last_sync_at: None,
            is_active: active,
        }
    }

    fn user(id: u64, first: &str, archived: bool) -> ConnecteamUser {
        serde_json::from_value(json!({
            "userId": id,
            "firstName": first,
            "lastName": "Test",
            "isArchived": archived
        }))
        .unwrap()
    }

    #[test]
    fn lookup_trims_external_ids() {
        let roster = EmployeeRoster::new(vec![employee("e-1", "Ana", Some(" 501 "), true)]);
        assert_eq!(roster.find_by_connecteam_id("501").map(|e| e.id.as_str()), Some("e-1"));
        assert!(roster.find_by_connecteam_id("502").is_none());
        assert_eq!(EmployeeRoster::connecteam_id_of(&roster.employees()[0]), Some("501"));
        assert_eq!(
            EmployeeRoster::connecteam_id_of(&employee("e-2", "Bo", Some("  "), true)),
            None
        );
    }

    #[test]
    fn active_view_excludes_inactive() {
        let roster = EmployeeRoster::new(vec![
            employee("e-1", "Ana", None, true),
            employee("e-2", "Bo", None, false),
        ]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.active().count(), 1);
    }

    #[test]
    fn match_report_buckets() {
        let roster = EmployeeRoster::new(vec![
            employee("e-1", "Ana", Some("501"), true),
            employee("e-2", "Bo", None, true),
            employee("e-3", "Cy", Some("999"), true),
            employee("e-4", "Di", None, false),
        ]);
        let users = vec![user(501, "Ana", false), user(777, "Eve", false), user(888, "Old", true)];

        let report = roster.match_connecteam_users(&users);
        assert_eq!(report.matched.len(), 1);
        assert_eq!(report.matched[0].connecteam_name, "Ana Test");

        let unlinked: Vec<&str> = report
            .unlinked_employees
            .iter()
            .map(|e| e.employee_id.as_str())
            .collect();
        assert_eq!(unlinked, vec!["e-2", "e-3"]);

        assert_eq!(report.unknown_users.len(), 1);
        assert_eq!(report.unknown_users[0].connecteam_id, "777");
    }
}
