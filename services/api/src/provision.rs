//! services/api/src/provision.rs
//!
//! Bulk creation of student accounts from `USER{n}_EMAIL` / `USER{n}_PASS`
//! environment pairs. Every account gets a temporary password and must change
//! it at first login. Addresses that already have an account are skipped, so
//! the run can be repeated safely.

use reservation_core::domain::role_names;
use reservation_core::{DatabaseService, NewUser, PortError};
use tracing::info;

use crate::adapters::password::hash_password;
use crate::error::ApiError;

/// Pairs are looked up for `n` in `1..ACCOUNT_SLOTS`.
pub const ACCOUNT_SLOTS: u32 = 200;

/// An e-mail address with its temporary password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: Vec<String>,
    pub already_existing: Vec<String>,
}

/// Collects every numbered pair where both the address and the password are
/// set and non-empty.
pub fn accounts_from(lookup: impl Fn(&str) -> Option<String>) -> Vec<Account> {
    (1..ACCOUNT_SLOTS)
        .filter_map(|n| {
            let email = lookup(&format!("USER{}_EMAIL", n))?.trim().to_string();
            let password = lookup(&format!("USER{}_PASS", n))?;
            if email.is_empty() || password.is_empty() {
                return None;
            }
            Some(Account { email, password })
        })
        .collect()
}

pub fn accounts_from_env() -> Vec<Account> {
    accounts_from(|key| std::env::var(key).ok())
}

/// Creates a student account for every address that does not have one yet.
/// The address doubles as the username.
pub async fn provision_users(
    db: &dyn DatabaseService,
    accounts: &[Account],
) -> Result<ProvisionReport, ApiError> {
    let student = match db.get_role_by_name(role_names::STUDENT).await {
        Ok(role) => role,
        Err(PortError::NotFound(_)) => {
            return Err(ApiError::Internal("The student role does not exist".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut report = ProvisionReport::default();
    for account in accounts {
        match db.get_credentials_by_email(&account.email).await {
            Ok(_) => {
                info!(email = %account.email, "User already exists");
                report.already_existing.push(account.email.clone());
                continue;
            }
            Err(PortError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let user = db
            .create_user(NewUser {
                username: account.email.clone(),
                email: account.email.clone(),
                first_name: String::new(),
                last_name: String::new(),
                hashed_password: hash_password(&account.password)?,
                role_id: Some(student.id),
                must_change_password: true,
            })
            .await?;
        info!(user_id = %user.id, email = %user.email, "User created");
        report.created.push(user.email);
    }
    Ok(report)
}
