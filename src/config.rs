//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y expone una estructura inmutable (`CONFIG`).
use once_cell::sync::Lazy;
use std::env;

use pipeflow_tracking::TrackingConfig;

pub const DEFAULT_PROFILE: &str = "local";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuración global de la aplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Store de tracking por defecto (el pipeline puede pisar la URI).
    pub tracking: TrackingConfig,
    /// Perfil aplicado cuando la línea de comandos no pide otro.
    pub profile: String,
    pub log_level: String,
}

impl AppConfig {
    /// Construye la configuración a partir de una función de búsqueda de
    /// claves; las ausentes o vacías toman su valor por defecto.
    pub fn from_lookup<F>(lookup: F) -> Self
        where F: Fn(&str) -> Option<String>
    {
        let get = |key: &str, default: &str| {
            lookup(key).map(|v| v.trim().to_string())
                       .filter(|v| !v.is_empty())
                       .unwrap_or_else(|| default.to_string())
        };
        AppConfig { tracking: TrackingConfig::from_lookup(&lookup),
                    profile: get("PIPEFLOW_PROFILE", DEFAULT_PROFILE),
                    log_level: get("PIPEFLOW_LOG_LEVEL", DEFAULT_LOG_LEVEL) }
    }

    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // el .env es opcional
        Self::from_lookup(|key| env::var(key).ok())
    }
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = AppConfig::from_lookup(|_| None);
        assert_eq!(cfg.tracking.tracking_uri, "file:./mlruns");
        assert_eq!(cfg.profile, "local");
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn blank_values_are_ignored() {
        let vars: HashMap<&str, &str> = [("PIPEFLOW_PROFILE", "  "), ("PIPEFLOW_TRACKING_URI", "memory:")].into_iter().collect();
        let cfg = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.profile, "local");
        assert_eq!(cfg.tracking.tracking_uri, "memory:");
    }
}
