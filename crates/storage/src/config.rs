use doc_model::Settings;
use std::env;

pub const WORKERS_VAR: &str = "PAGE_MERGER_WORKERS";
pub const CACHE_MB_VAR: &str = "PAGE_MERGER_CACHE_MB";
pub const BATCH_SIZE_VAR: &str = "PAGE_MERGER_BATCH_SIZE";
pub const DATA_DIR_VAR: &str = "PAGE_MERGER_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Applies `PAGE_MERGER_*` overrides from the process environment.
///
/// # Errors
/// Returns [`ConfigError::InvalidValue`] if a set variable does not parse as
/// an unsigned integer, or if `PAGE_MERGER_BATCH_SIZE` is zero.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    apply_overrides(settings, |var| env::var(var).ok())
}

/// Same as [`apply_env_overrides`] with an explicit variable source.
pub fn apply_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(workers) = parse_var(&lookup, WORKERS_VAR)? {
        settings.worker_threads = workers;
    }
    if let Some(megabytes) = parse_var(&lookup, CACHE_MB_VAR)? {
        settings.cache_budget_mb = megabytes;
    }
    if let Some(batch_size) = parse_var(&lookup, BATCH_SIZE_VAR)? {
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue { var: BATCH_SIZE_VAR, value: "0".to_owned() });
        }
        settings.batch_size = batch_size;
    }
    Ok(())
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<usize>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn unset_variables_keep_settings() {
        let mut settings = Settings::default();
        apply_overrides(&mut settings, lookup(&[])).expect("no overrides");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings { batch_size: 4, ..Settings::default() };

        apply_overrides(
            &mut settings,
            lookup(&[(WORKERS_VAR, "3"), (CACHE_MB_VAR, "0"), (BATCH_SIZE_VAR, " 25 ")]),
        )
        .expect("valid overrides");

        assert_eq!(settings.worker_threads, 3);
        assert_eq!(settings.cache_budget_mb, 0);
        assert_eq!(settings.batch_size, 25);
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let mut settings = Settings::default();

        let err = apply_overrides(&mut settings, lookup(&[(CACHE_MB_VAR, "lots")]))
            .expect_err("not a number");

        assert_eq!(err, ConfigError::InvalidValue { var: CACHE_MB_VAR, value: "lots".to_owned() });
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut settings = Settings::default();
        assert!(apply_overrides(&mut settings, lookup(&[(BATCH_SIZE_VAR, "0")])).is_err());
        assert_eq!(settings.batch_size, 10);
    }

    #[test]
    #[serial]
    fn reads_process_environment() {
        let _guard = EnvGuard::new(&[WORKERS_VAR, CACHE_MB_VAR, BATCH_SIZE_VAR]);
        env::remove_var(CACHE_MB_VAR);
        env::remove_var(BATCH_SIZE_VAR);
        env::set_var(WORKERS_VAR, "6");

        let mut settings = Settings::default();
        apply_env_overrides(&mut settings).expect("valid environment");

        assert_eq!(settings.worker_threads, 6);
        assert_eq!(settings.cache_budget_mb, 256);
    }

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(value) => env::set_var(name, value),
                    None => env::remove_var(name),
                }
            }
        }
    }
}
