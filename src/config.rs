use crate::builder::HeadcountPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

const BASE_BUDGET_MS: u64 = 1_000;
const BUDGET_MS_PER_VARIABLE: u64 = 2;
const MAX_BUDGET_MS: u64 = 10_000;

/// Options du moteur
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub headcount_policy: HeadcountPolicy,
    /// Budget de recherche ; `None` = budget proportionnel à la taille du problème.
    pub time_budget_ms: Option<u64>,
    /// Repos minimal appliqué aux employés sans règle `MinRestHours` explicite.
    pub default_min_rest_hours: Option<u32>,
    /// Pénalité par place non pourvue en mode « au mieux ».
    pub shortfall_weight: f64,
    /// Poids du coût salarial dans l'objectif (0 = départage uniquement).
    pub cost_weight: f64,
    /// Pénalité par heure manquante sous `min_hours_per_week`.
    pub min_hours_weight: f64,
    pub max_suggestions: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            headcount_policy: HeadcountPolicy::Auto,
            time_budget_ms: None,
            default_min_rest_hours: None,
            shortfall_weight: 1_000.0,
            cost_weight: 0.0,
            min_hours_weight: 1.0,
            max_suggestions: 50,
        }
    }
}

impl EngineOptions {
    /// Charge les options depuis un fichier JSON (champs absents = valeurs par défaut).
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let options: Self = serde_json::from_slice(&data)
            .with_context(|| format!("parsing engine options {}", path.display()))?;
        Ok(options)
    }

    pub fn time_budget_for(&self, variables: usize) -> Duration {
        match self.time_budget_ms {
            Some(ms) => Duration::from_millis(ms),
            None => {
                let scaled = BASE_BUDGET_MS
                    .saturating_add(BUDGET_MS_PER_VARIABLE.saturating_mul(variables as u64));
                Duration::from_millis(scaled.min(MAX_BUDGET_MS))
            }
        }
    }
}
