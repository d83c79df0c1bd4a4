//! Demo members shown when the collection is empty or unreachable.

use crate::types::{User, UserRole, UserStatus};
use chrono::NaiveDate;

const DEMO_MEMBERS: &[(&str, &str, &str, UserRole, UserStatus)] = &[
    ("Jane", "Doe", "jane.doe@example.com", UserRole::Admin, UserStatus::Active),
    ("Marcus", "Smith", "m.smith@example.com", UserRole::Student, UserStatus::Active),
    ("Anna", "Lindberg", "anna.l@example.com", UserRole::Coach, UserStatus::Inactive),
    ("Hiroshi", "Kobayashi", "hiro@example.jp", UserRole::Student, UserStatus::Pending),
    ("Alex", "Bennett", "alex.b@example.com", UserRole::Admin, UserStatus::Active),
    ("Amy", "Crane", "amy@example.com", UserRole::Student, UserStatus::Inactive),
    ("Andrew", "Proctor", "andrew.p@example.co.uk", UserRole::Student, UserStatus::Active),
    ("Bianca", "Rose", "bianca@example.com", UserRole::Coach, UserStatus::Active),
    ("Catherine", "Lee", "c.lee@example.com", UserRole::Student, UserStatus::Active),
    ("David", "Chen", "d.chen@example.com", UserRole::Admin, UserStatus::Active),
    ("Elena", "Rodriguez", "elena.r@example.net", UserRole::Student, UserStatus::Pending),
    ("Fiona", "Gallagher", "fiona@example.ie", UserRole::Coach, UserStatus::Active),
];

const DEMO_JOIN_DATES: &[(i32, u32, u32)] = &[
    (2023, 10, 12),
    (2023, 10, 15),
    (2023, 9, 28),
    (2023, 11, 2),
    (2023, 10, 20),
];

/// Deterministic dataset: ids are `demo-<n>`, each member joined on one of a
/// handful of dates and expires a year later.
pub fn demo_users() -> Vec<User> {
    DEMO_MEMBERS
        .iter()
        .enumerate()
        .filter_map(|(i, (first, last, email, role, status))| {
            let (y, m, d) = DEMO_JOIN_DATES[i % DEMO_JOIN_DATES.len()];
            let joined = NaiveDate::from_ymd_opt(y, m, d)?.and_hms_opt(0, 0, 0)?;
            let expires = NaiveDate::from_ymd_opt(y + 1, m, d)?.and_hms_opt(0, 0, 0)?;
            Some(User {
                id: format!("demo-{}", i),
                first_name: first.to_string(),
                last_name: last.to_string(),
                email: email.to_string(),
                role: *role,
                status: *status,
                cohort: None,
                date_joined: joined.and_utc(),
                expiration_date: Some(expires.and_utc()),
            })
        })
        .collect()
}
