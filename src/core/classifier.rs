//! Beneficial-owner rules.
//!
//! Every rule is evaluated on its own and a person collects one reason per
//! matching rule. Quantitative thresholds are strict ("more than X %").

use crate::core::aggregator::PersonAggregates;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const DEFAULT_THRESHOLD_PCT: f64 = 25.0;
pub const COMPLETENESS_TOLERANCE: f64 = 0.001;

/// User edits to a computed person. `None` keeps the computed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonAdjustment {
    #[serde(default)]
    pub capital: Option<f64>,
    #[serde(default)]
    pub voting: Option<f64>,
    #[serde(default)]
    pub veto: bool,
    #[serde(default)]
    pub appoints_majority: bool,
    #[serde(default)]
    pub substitute_ubo: bool,
}

/// A person entered by hand, typically a stockholder the registry does not list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualPerson {
    pub name: String,
    #[serde(default)]
    pub capital: f64,
    #[serde(default)]
    pub voting: f64,
    #[serde(default)]
    pub veto: bool,
    #[serde(default)]
    pub appoints_majority: bool,
    #[serde(default)]
    pub substitute_ubo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingCoalition {
    pub name: String,
    pub members: Vec<String>,
}

/// Caller-held adjustment state, re-read on every classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentState {
    #[serde(default)]
    pub persons: BTreeMap<String, PersonAdjustment>,
    #[serde(default)]
    pub manual_persons: Vec<ManualPerson>,
    #[serde(default)]
    pub coalition: Option<VotingCoalition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalPersonRecord {
    pub capital: f64,
    pub voting: f64,
    pub veto: bool,
    pub appoints_majority: bool,
    pub substitute_ubo: bool,
}

/// Combines computed aggregates with user edits. Manual persons replace a
/// computed person of the same name.
pub fn merge_persons(
    aggregates: &PersonAggregates,
    adjustments: &AdjustmentState,
) -> BTreeMap<String, FinalPersonRecord> {
    let mut persons = BTreeMap::new();
    for (name, aggregate) in aggregates {
        let adjustment = adjustments.persons.get(name).cloned().unwrap_or_default();
        persons.insert(
            name.clone(),
            FinalPersonRecord {
                capital: adjustment.capital.unwrap_or(aggregate.ownership),
                voting: adjustment.voting.unwrap_or(aggregate.voting),
                veto: adjustment.veto,
                appoints_majority: adjustment.appoints_majority,
                substitute_ubo: adjustment.substitute_ubo,
            },
        );
    }
    for manual in &adjustments.manual_persons {
        let name = manual.name.trim();
        if name.is_empty() {
            continue;
        }
        persons.insert(
            name.to_string(),
            FinalPersonRecord {
                capital: manual.capital,
                voting: manual.voting,
                veto: manual.veto,
                appoints_majority: manual.appoints_majority,
                substitute_ubo: manual.substitute_ubo,
            },
        );
    }
    persons
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum UboReason {
    Capital { value: f64, threshold: f64 },
    Voting { value: f64, threshold: f64 },
    Veto,
    AppointsMajority,
    SubstituteOwner,
    Coalition { name: String, total: f64, threshold: f64 },
}

impl fmt::Display for UboReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UboReason::Capital { value, threshold } => write!(
                f,
                "capital share {:.2}% > {:.2}%",
                value * 100.0,
                threshold * 100.0
            ),
            UboReason::Voting { value, threshold } => write!(
                f,
                "voting rights {:.2}% > {:.2}%",
                value * 100.0,
                threshold * 100.0
            ),
            UboReason::Veto => write!(f, "veto right → decisive influence"),
            UboReason::AppointsMajority => write!(
                f,
                "appoints or removes a majority of the governing body → decisive influence"
            ),
            UboReason::SubstituteOwner => write!(f, "substitute beneficial owner"),
            UboReason::Coalition {
                name,
                total,
                threshold,
            } => write!(
                f,
                "member of voting coalition \"{}\" holding {:.2}% > {:.2}%",
                name,
                total * 100.0,
                threshold * 100.0
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    Capital,
    Voting,
}

/// Advisory only: the known persons do not account for the whole entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessWarning {
    pub measure: Measure,
    pub total: f64,
    pub missing: f64,
    pub surplus: f64,
}

impl fmt::Display for CompletenessWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.measure {
            Measure::Capital => "capital shares",
            Measure::Voting => "voting rights",
        };
        write!(
            f,
            "sum of {} = {:.2}% (missing {:.2}% / surplus {:.2}%)",
            what,
            self.total * 100.0,
            self.missing * 100.0,
            self.surplus * 100.0
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub capital: f64,
    pub voting: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UboResult {
    pub threshold: f64,
    pub owners: BTreeMap<String, FinalPersonRecord>,
    pub reasons: BTreeMap<String, Vec<UboReason>>,
    pub totals: Totals,
    pub warnings: Vec<CompletenessWarning>,
}

impl UboResult {
    pub fn is_owner(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    /// One line per beneficial owner, reasons joined with `; `.
    pub fn summary_lines(&self) -> Vec<String> {
        self.owners
            .iter()
            .map(|(name, record)| {
                let reasons: Vec<String> = self
                    .reasons
                    .get(name)
                    .map(|rs| rs.iter().map(ToString::to_string).collect())
                    .unwrap_or_default();
                format!(
                    "{} — capital: {:.2}%, voting rights: {:.2}% — {}",
                    name,
                    record.capital * 100.0,
                    record.voting * 100.0,
                    reasons.join("; ")
                )
            })
            .collect()
    }
}

fn completeness(measure: Measure, total: f64) -> Option<CompletenessWarning> {
    if (total - 1.0).abs() <= COMPLETENESS_TOLERANCE {
        return None;
    }
    Some(CompletenessWarning {
        measure,
        total,
        missing: (1.0 - total).max(0.0),
        surplus: (total - 1.0).max(0.0),
    })
}

/// Applies the beneficial-ownership rules to `persons`.
///
/// `threshold` is a fraction; a person qualifies quantitatively only when
/// strictly above it.
pub fn classify(
    persons: &BTreeMap<String, FinalPersonRecord>,
    threshold: f64,
    coalition: Option<&VotingCoalition>,
) -> UboResult {
    let mut reasons: BTreeMap<String, Vec<UboReason>> = BTreeMap::new();
    let mut qualifying: BTreeSet<String> = BTreeSet::new();

    for (name, person) in persons {
        let mut matched = Vec::new();
        if person.capital > threshold {
            matched.push(UboReason::Capital {
                value: person.capital,
                threshold,
            });
        }
        if person.voting > threshold {
            matched.push(UboReason::Voting {
                value: person.voting,
                threshold,
            });
        }
        if person.veto {
            matched.push(UboReason::Veto);
        }
        if person.appoints_majority {
            matched.push(UboReason::AppointsMajority);
        }
        if person.substitute_ubo {
            matched.push(UboReason::SubstituteOwner);
        }
        if !matched.is_empty() {
            qualifying.insert(name.clone());
            reasons.entry(name.clone()).or_default().extend(matched);
        }
    }

    if let Some(coalition) = coalition.filter(|c| !c.members.is_empty()) {
        let total: f64 = coalition
            .members
            .iter()
            .filter_map(|member| persons.get(member))
            .map(|p| p.voting)
            .sum();
        if total > threshold {
            tracing::info!(
                "🤝 Voting coalition '{}' holds {:.2}%, all members qualify",
                coalition.name,
                total * 100.0
            );
            for member in coalition.members.iter().filter(|m| persons.contains_key(*m)) {
                qualifying.insert(member.clone());
                reasons
                    .entry(member.clone())
                    .or_default()
                    .push(UboReason::Coalition {
                        name: coalition.name.clone(),
                        total,
                        threshold,
                    });
            }
        }
    }

    let totals = Totals {
        capital: persons.values().map(|p| p.capital.clamp(0.0, 1.0)).sum(),
        voting: persons.values().map(|p| p.voting.clamp(0.0, 1.0)).sum(),
    };
    let warnings: Vec<CompletenessWarning> = [
        completeness(Measure::Capital, totals.capital),
        completeness(Measure::Voting, totals.voting),
    ]
    .into_iter()
    .flatten()
    .collect();

    let owners = qualifying
        .into_iter()
        .filter_map(|name| persons.get(&name).cloned().map(|p| (name, p)))
        .collect();

    UboResult {
        threshold,
        owners,
        reasons,
        totals,
        warnings,
    }
}
