use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::CritiqueConfig;
use crate::store::ReviewStore;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
    pub overall_health: CheckStatus,
}

pub struct CritiqueDoctor;

impl CritiqueDoctor {
    pub fn new() -> Self {
        Self
    }

    /// `api_key` is whatever the config resolved; it is only checked for presence.
    pub fn run(&self, config: &CritiqueConfig, api_key: Option<&str>) -> DoctorReport {
        let mut checks = Vec::new();

        // 1. Gemini credentials
        checks.push(self.check_api_key(api_key));

        // 2. Report store
        checks.push(match config.database_path() {
            Ok(path) => self.check_store(&path),
            Err(e) => DoctorCheck {
                name: "Report Store".to_string(),
                status: CheckStatus::Fail,
                message: format!("Could not resolve database path: {}", e),
            },
        });

        // 3. Model endpoint
        checks.push(self.check_endpoint(&config.api_base));

        // Determine overall health
        let overall_health = if checks.iter().any(|c| matches!(c.status, CheckStatus::Fail)) {
            CheckStatus::Fail
        } else if checks
            .iter()
            .any(|c| matches!(c.status, CheckStatus::Warning))
        {
            CheckStatus::Warning
        } else {
            CheckStatus::Pass
        };

        DoctorReport {
            checks,
            overall_health,
        }
    }

    fn check_api_key(&self, api_key: Option<&str>) -> DoctorCheck {
        match api_key {
            Some(_) => DoctorCheck {
                name: "Gemini API Key".to_string(),
                status: CheckStatus::Pass,
                message: "API key found".to_string(),
            },
            None => DoctorCheck {
                name: "Gemini API Key".to_string(),
                status: CheckStatus::Warning,
                message: "No API key set; reviews will use the fallback checklist. Set GEMINI_API_KEY."
                    .to_string(),
            },
        }
    }

    fn check_store(&self, path: &Path) -> DoctorCheck {
        match ReviewStore::open_at(path).and_then(|store| store.count()) {
            Ok(count) => DoctorCheck {
                name: "Report Store".to_string(),
                status: CheckStatus::Pass,
                message: format!("{} reports in {}", count, path.display()),
            },
            Err(e) => DoctorCheck {
                name: "Report Store".to_string(),
                status: CheckStatus::Fail,
                message: format!("Cannot open {}: {:#}", path.display(), e),
            },
        }
    }

    fn check_endpoint(&self, api_base: &str) -> DoctorCheck {
        if api_base.starts_with("https://") {
            DoctorCheck {
                name: "Model Endpoint".to_string(),
                status: CheckStatus::Pass,
                message: api_base.to_string(),
            }
        } else if api_base.starts_with("http://") {
            DoctorCheck {
                name: "Model Endpoint".to_string(),
                status: CheckStatus::Warning,
                message: format!("{} is not using TLS", api_base),
            }
        } else {
            DoctorCheck {
                name: "Model Endpoint".to_string(),
                status: CheckStatus::Fail,
                message: format!("{} is not an http(s) URL", api_base),
            }
        }
    }
}

impl Default for CritiqueDoctor {
    fn default() -> Self {
        Self::new()
    }
}
