//! Planner settings consulted by the rewrite passes and metadata queries.

use crate::error::{PlanError, PlanResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Knobs for physical plan finalisation.
///
/// Missing keys in a settings file take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSettings {
    /// Translate residual join predicates into input-resolved column references
    /// for a vectorised executor. When off the residual is kept in flat-index form.
    pub vectorize_extra_join_condition: bool,
    /// Run the star-column rewrite pass.
    pub rename_star_columns: bool,
    /// Run the pass that gives join inputs the names the join exposes.
    pub rename_join_inputs: bool,
    /// Log every dispatch table the first time a session uses it.
    pub log_dispatch_tables: bool,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            vectorize_extra_join_condition: true,
            rename_star_columns: true,
            rename_join_inputs: true,
            log_dispatch_tables: false,
        }
    }
}

impl PlannerSettings {
    pub fn from_toml_str(content: &str) -> PlanResult<Self> {
        toml::from_str(content).map_err(|e| PlanError::Settings(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PlanResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PlanError::Settings(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> PlanResult<String> {
        toml::to_string_pretty(self).map_err(|e| PlanError::Settings(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = PlannerSettings::from_toml_str("rename_star_columns = false\n").unwrap();
        assert!(!settings.rename_star_columns);
        assert!(settings.vectorize_extra_join_condition);
        assert!(settings.rename_join_inputs);
        assert!(!settings.log_dispatch_tables);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vectorize_extra_join_condition = false").unwrap();
        writeln!(file, "log_dispatch_tables = true").unwrap();

        let settings = PlannerSettings::load(file.path()).unwrap();
        assert!(!settings.vectorize_extra_join_condition);
        assert!(settings.log_dispatch_tables);
    }

    #[test]
    fn test_saved_settings_load_back() {
        let settings = PlannerSettings {
            rename_join_inputs: false,
            ..Default::default()
        };
        let text = settings.to_toml_string().unwrap();
        assert_eq!(PlannerSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_bad_settings_are_reported() {
        let err = PlannerSettings::from_toml_str("rename_star_columns = 3").unwrap_err();
        assert!(matches!(err, PlanError::Settings(_)));
        assert!(PlannerSettings::load("/nonexistent/physopt.toml").is_err());
    }
}
