//! User preference model.
//!
//! Every preference is an explicit `Preference<T>`: either `Unset` or
//! `Set(value)`. Absent keys in serialized payloads deserialize to `Unset`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A single optional preference value
#[derive(Debug, Clone, PartialEq)]
pub enum Preference<T> {
    /// The caller expressed no preference
    Unset,
    /// The caller set an explicit value
    Set(T),
}

impl<T> Default for Preference<T> {
    fn default() -> Self {
        Preference::Unset
    }
}

impl<T> Preference<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Preference::Set(_))
    }

    /// Borrow the value if one was set
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Preference::Set(value) => Some(value),
            Preference::Unset => None,
        }
    }
}

impl<T> From<Option<T>> for Preference<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Preference::Set(v),
            None => Preference::Unset,
        }
    }
}

impl<T: Serialize> Serialize for Preference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Preference::Set(value) => serializer.serialize_some(value),
            Preference::Unset => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Preference<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Preference::from)
    }
}

/// Skill level a tool targets, or a user asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// Monthly budget window in USD, inclusive on both ends. A positive lower
/// bound selects a price tier and so excludes zero-cost tools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRange {
    pub min_monthly_usd: f64,
    pub max_monthly_usd: f64,
}

impl BudgetRange {
    pub fn new(min_monthly_usd: f64, max_monthly_usd: f64) -> Self {
        Self {
            min_monthly_usd,
            max_monthly_usd,
        }
    }

    pub fn contains(&self, monthly_usd: f64) -> bool {
        monthly_usd >= self.min_monthly_usd && monthly_usd <= self.max_monthly_usd
    }

    /// A range is well formed when both ends are finite, non-negative and ordered
    pub fn is_well_formed(&self) -> bool {
        self.min_monthly_usd.is_finite()
            && self.max_monthly_usd.is_finite()
            && self.min_monthly_usd >= 0.0
            && self.min_monthly_usd <= self.max_monthly_usd
    }
}

/// Pricing signal carried by catalog metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PricingSignal {
    /// Entirely free
    Free,
    /// Usable free tier with paid upgrades
    Freemium,
    /// No free tier
    #[serde(rename_all = "camelCase")]
    Paid { monthly_usd: f64 },
}

impl PricingSignal {
    /// Entry cost per month; freemium tools can be used at zero cost
    pub fn entry_monthly_usd(&self) -> f64 {
        match self {
            PricingSignal::Free | PricingSignal::Freemium => 0.0,
            PricingSignal::Paid { monthly_usd } => *monthly_usd,
        }
    }

    pub fn is_paid_only(&self) -> bool {
        matches!(self, PricingSignal::Paid { .. })
    }
}

impl fmt::Display for PricingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingSignal::Free => write!(f, "free"),
            PricingSignal::Freemium => write!(f, "freemium"),
            PricingSignal::Paid { monthly_usd } => write!(f, "paid (${:.2}/mo)", monthly_usd),
        }
    }
}

/// Optional filters and biases supplied with a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub categories: Preference<Vec<String>>,
    #[serde(default)]
    pub difficulty_level: Preference<DifficultyLevel>,
    #[serde(default)]
    pub budget_range: Preference<BudgetRange>,
    #[serde(default)]
    pub free_tools_only: Preference<bool>,
}

impl UserPreferences {
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Preference::Set(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_difficulty(mut self, level: DifficultyLevel) -> Self {
        self.difficulty_level = Preference::Set(level);
        self
    }

    pub fn with_budget(mut self, range: BudgetRange) -> Self {
        self.budget_range = Preference::Set(range);
        self
    }

    pub fn free_only(mut self, free_only: bool) -> Self {
        self.free_tools_only = Preference::Set(free_only);
        self
    }

    /// Hard filters: budget range and free-only
    pub fn allows_pricing(&self, pricing: &PricingSignal) -> bool {
        if let Preference::Set(true) = self.free_tools_only {
            if pricing.is_paid_only() {
                return false;
            }
        }
        match &self.budget_range {
            Preference::Set(range) => range.contains(pricing.entry_monthly_usd()),
            Preference::Unset => true,
        }
    }

    /// Case-insensitive category match, used as a score boost
    pub fn prefers_category(&self, category: &str) -> bool {
        match &self.categories {
            Preference::Set(categories) => categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category)),
            Preference::Unset => false,
        }
    }

    pub fn matches_difficulty(&self, level: Option<DifficultyLevel>) -> bool {
        match (&self.difficulty_level, level) {
            (Preference::Set(wanted), Some(actual)) => *wanted == actual,
            _ => false,
        }
    }
}
