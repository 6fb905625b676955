use crate::error::{DriverError, Result};
use crate::id::DriverId;

/// Environment variable holding test credential `key` of `driver`: `MB_<DRIVER>_TEST_<KEY>`.
pub fn credential_var_name(driver: &DriverId, key: &str) -> String {
    format!("MB_{}_TEST_{}", driver.as_str(), key)
        .to_uppercase()
        .replace('-', "_")
}

/// Look up a test credential in the process environment.
pub fn lookup_test_credential(driver: &DriverId, key: &str, default: Option<&str>) -> Result<String> {
    lookup_with(|var| std::env::var(var).ok(), driver, key, default)
}

/// Look up a test credential through `env`, falling back to `default`.
pub fn lookup_with(
    env: impl Fn(&str) -> Option<String>,
    driver: &DriverId,
    key: &str,
    default: Option<&str>,
) -> Result<String> {
    let var = credential_var_name(driver, key);
    match env(&var) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => default
            .map(str::to_string)
            .ok_or_else(|| DriverError::MissingCredential {
                driver: driver.clone(),
                key: key.to_string(),
                var,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_names_are_uppercased_with_underscores() {
        let driver = DriverId::from("sql-server");
        assert_eq!(
            credential_var_name(&driver, "user"),
            "MB_SQL_SERVER_TEST_USER"
        );
        assert_eq!(
            credential_var_name(&DriverId::from("csv"), "root"),
            "MB_CSV_TEST_ROOT"
        );
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let err = lookup_with(|_| None, &DriverId::from("mysql"), "user", None).unwrap_err();
        assert!(matches!(err, DriverError::MissingCredential { ref var, .. } if var == "MB_MYSQL_TEST_USER"));
        assert!(err.to_string().contains("MB_MYSQL_TEST_USER"));
    }

    #[test]
    fn default_applies_when_unset() {
        let value = lookup_with(|_| None, &DriverId::from("mysql"), "host", Some("localhost"))
            .expect("default");
        assert_eq!(value, "localhost");
    }

    #[test]
    fn environment_wins_over_default() {
        let env = |var: &str| (var == "MB_MYSQL_TEST_HOST").then(|| "db.internal".to_string());
        let value = lookup_with(env, &DriverId::from("mysql"), "host", Some("localhost"))
            .expect("env");
        assert_eq!(value, "db.internal");
    }
}
