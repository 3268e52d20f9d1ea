//! Tunable thresholds and weights for the engine.
//!
//! Every field has a default, so an empty TOML table (or no file at all)
//! yields a working configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
  pub resolver:  ResolverConfig,
  pub suggester: SuggesterConfig,
  pub bulk:      BulkConfig,
}

impl TriageConfig {
  pub fn validate(&self) -> Result<()> {
    self.resolver.validate()?;
    self.suggester.validate()?;
    self.bulk.validate()
  }
}

// ─── Constituent resolution ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
  /// Minimum name-token overlap ratio for a fuzzy match on name alone.
  pub min_name_overlap:    f64,
  /// Minimum address-token overlap ratio for a fuzzy match on address alone.
  pub min_address_overlap: f64,
  pub name_weight:         f64,
  pub address_weight:      f64,
  /// Upper bound on a fuzzy confidence. Must stay below 1.0, which is
  /// reserved for exact email matches.
  pub fuzzy_ceiling:       f64,
  /// Alternatives offered alongside a single fuzzy match.
  pub max_alternatives:    usize,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      min_name_overlap:    0.6,
      min_address_overlap: 0.6,
      name_weight:         0.7,
      address_weight:      0.3,
      fuzzy_ceiling:       0.95,
      max_alternatives:    5,
    }
  }
}

impl ResolverConfig {
  pub fn validate(&self) -> Result<()> {
    unit("resolver.min_name_overlap", self.min_name_overlap)?;
    unit("resolver.min_address_overlap", self.min_address_overlap)?;
    weights(
      "resolver",
      &[self.name_weight, self.address_weight],
    )?;
    if !(self.fuzzy_ceiling > 0.0 && self.fuzzy_ceiling < 1.0) {
      return Err(Error::InvalidConfig(format!(
        "resolver.fuzzy_ceiling must be in (0, 1), got {}",
        self.fuzzy_ceiling
      )));
    }
    Ok(())
  }
}

// ─── Case suggestion ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggesterConfig {
  /// A top candidate must score strictly above this to become `primary`.
  pub min_confidence:         f64,
  /// Candidates must score strictly above this to be offered as alternatives.
  pub alternative_floor:      f64,
  pub max_alternatives:       usize,
  pub status_weight:          f64,
  pub recency_weight:         f64,
  pub keyword_weight:         f64,
  /// Age in days at which the recency signal has halved.
  pub recency_half_life_days: f64,
}

impl Default for SuggesterConfig {
  fn default() -> Self {
    Self {
      min_confidence:         0.5,
      alternative_floor:      0.3,
      max_alternatives:       5,
      status_weight:          0.4,
      recency_weight:         0.25,
      keyword_weight:         0.35,
      recency_half_life_days: 30.0,
    }
  }
}

impl SuggesterConfig {
  pub fn validate(&self) -> Result<()> {
    unit("suggester.min_confidence", self.min_confidence)?;
    unit("suggester.alternative_floor", self.alternative_floor)?;
    if self.alternative_floor > self.min_confidence {
      return Err(Error::InvalidConfig(
        "suggester.alternative_floor must not exceed min_confidence".into(),
      ));
    }
    weights(
      "suggester",
      &[self.status_weight, self.recency_weight, self.keyword_weight],
    )?;
    if !(self.recency_half_life_days > 0.0) {
      return Err(Error::InvalidConfig(
        "suggester.recency_half_life_days must be positive".into(),
      ));
    }
    Ok(())
  }
}

// ─── Bulk commit ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
  /// Maximum writes in flight. `1` commits sequentially in input order.
  pub concurrency: usize,
}

impl Default for BulkConfig {
  fn default() -> Self { Self { concurrency: 1 } }
}

impl BulkConfig {
  pub fn validate(&self) -> Result<()> {
    if self.concurrency == 0 {
      return Err(Error::InvalidConfig("bulk.concurrency must be at least 1".into()));
    }
    Ok(())
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn unit(name: &str, value: f64) -> Result<()> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(Error::InvalidConfig(format!("{name} must be in [0, 1], got {value}")))
  }
}

fn weights(section: &str, values: &[f64]) -> Result<()> {
  if values.iter().any(|w| !w.is_finite() || *w < 0.0) {
    return Err(Error::InvalidConfig(format!(
      "{section} weights must be non-negative"
    )));
  }
  if values.iter().sum::<f64>() <= 0.0 {
    return Err(Error::InvalidConfig(format!(
      "{section} weights must not all be zero"
    )));
  }
  Ok(())
}
