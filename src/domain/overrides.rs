//! Manually supplied owners, appended to whatever the registry reports.
//!
//! Overrides arrive in two historical shapes, a positional `(id, share)` pair
//! meaning "a domestic company owns this share", or a structured record with an
//! explicit `type` tag. Both normalize into [`ManualOwner`]. Entries with a
//! non-positive share or an unusable identifier are dropped without error so a
//! user can keep correcting them iteratively.

use crate::domain::model::{OwnerKind, OwnerRecord, PROVENANCE_MANUAL};
use crate::utils::error::{Result, UboError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Normalizes a domestic registration number to its 8-digit form.
///
/// Non-digits are stripped; a 7-digit number regains its dropped leading zero.
pub fn normalize_domestic_id(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        8 => Some(digits),
        7 => Some(format!("0{}", digits)),
        _ => None,
    }
}

/// Normalizes a foreign identifier: trimmed, uppercased, inner whitespace
/// runs collapsed to one space (`he  123456` becomes `HE 123456`).
pub fn normalize_foreign_id(raw: &str) -> Option<String> {
    let id = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    (!id.is_empty()).then_some(id)
}

/// Key under which overrides for a target are stored: the normalized domestic
/// number when the key reads as one, the normalized foreign id otherwise.
pub fn normalize_target_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let all_digits = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace());
    if all_digits {
        if let Some(id) = normalize_domestic_id(trimmed) {
            return Some(id);
        }
    }
    normalize_foreign_id(trimmed)
}

/// Raw override entry as found in case files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManualOverrideEntry {
    Pair(String, f64),
    Record(ManualOwnerRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualOwnerRecord {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub ico: Option<String>,
    #[serde(default, alias = "fid", alias = "code")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub share: Option<f64>,
}

/// A normalized manual owner. `share` is a fraction in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOwner {
    pub kind: OwnerKind,
    pub id: Option<String>,
    pub name: Option<String>,
    pub share: f64,
}

impl ManualOwner {
    pub fn into_owner_record(self) -> OwnerRecord {
        let name = match (&self.name, self.kind, &self.id) {
            (Some(name), _, _) if !name.trim().is_empty() => name.trim().to_string(),
            (_, OwnerKind::Company, Some(id)) => format!("Company (reg. no. {})", id),
            (_, OwnerKind::ForeignEntity, Some(id)) => format!("Foreign entity {}", id),
            _ => "Unnamed owner".to_string(),
        };
        OwnerRecord {
            kind: self.kind,
            name,
            identifier: self.id,
            raw_share: Some(format!("{:.2} %", self.share * 100.0)),
            share: Some(self.share),
            provenance: PROVENANCE_MANUAL.to_string(),
        }
    }
}

impl ManualOverrideEntry {
    pub fn normalize(&self) -> Option<ManualOwner> {
        match self {
            ManualOverrideEntry::Pair(id, share) => {
                if *share <= 0.0 {
                    return None;
                }
                Some(ManualOwner {
                    kind: OwnerKind::Company,
                    id: Some(normalize_domestic_id(id)?),
                    name: None,
                    share: *share,
                })
            }
            ManualOverrideEntry::Record(record) => record.normalize(),
        }
    }
}

impl ManualOwnerRecord {
    fn normalize(&self) -> Option<ManualOwner> {
        let share = self.share.filter(|s| *s > 0.0)?;
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let tag = self.kind.as_deref().map(|k| k.trim().to_lowercase());

        let kind = match tag.as_deref() {
            Some("company") | Some("cz") => OwnerKind::Company,
            Some("foreign") | Some("foreign_entity") => OwnerKind::ForeignEntity,
            Some("person") => OwnerKind::Person,
            // untagged records: infer from which fields are present
            _ if self.ico.is_some() => OwnerKind::Company,
            _ if self.id.is_some() => OwnerKind::ForeignEntity,
            _ if name.is_some() => OwnerKind::Person,
            _ => return None,
        };

        match kind {
            OwnerKind::Company => {
                let raw = self.ico.as_deref().or(self.id.as_deref())?;
                Some(ManualOwner {
                    kind,
                    id: Some(normalize_domestic_id(raw)?),
                    name,
                    share,
                })
            }
            OwnerKind::ForeignEntity => {
                let raw = self.id.as_deref().or(self.ico.as_deref())?;
                Some(ManualOwner {
                    kind,
                    id: Some(normalize_foreign_id(raw)?),
                    name,
                    share,
                })
            }
            OwnerKind::Person => Some(ManualOwner {
                kind,
                id: None,
                name: Some(name?),
                share,
            }),
        }
    }
}

/// Normalized override store, keyed by target entity id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualOverrides {
    entries: BTreeMap<String, Vec<ManualOwner>>,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(raw: &HashMap<String, Vec<ManualOverrideEntry>>) -> Self {
        let mut overrides = Self::new();
        for (target, entries) in raw {
            let Some(key) = normalize_target_key(target) else {
                continue;
            };
            let owners: Vec<ManualOwner> =
                entries.iter().filter_map(ManualOverrideEntry::normalize).collect();
            if !owners.is_empty() {
                overrides.entries.entry(key).or_default().extend(owners);
            }
        }
        overrides
    }

    /// Appends owners for `target`; invalid targets are ignored.
    pub fn add(&mut self, target: &str, owners: Vec<ManualOwner>) {
        if let Some(key) = normalize_target_key(target) {
            if !owners.is_empty() {
                self.entries.entry(key).or_default().extend(owners);
            }
        }
    }

    pub fn owners_for(&self, id: &str) -> &[ManualOwner] {
        self.entries.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Owners entered for a foreign entity. An all-digit foreign id may have
    /// been stored under its domestic form, so that key is tried second.
    pub fn owners_for_foreign(&self, id: &str) -> &[ManualOwner] {
        let Some(key) = normalize_foreign_id(id) else {
            return &[];
        };
        match self.entries.get(&key) {
            Some(owners) => owners.as_slice(),
            None => normalize_domestic_id(&key)
                .filter(|_| key.chars().all(|c| c.is_ascii_digit()))
                .map(|domestic| self.owners_for(&domestic))
                .unwrap_or(&[]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Parses the `ID1: 50, ID2: 25` shorthand (shares in percent) into company owners.
///
/// Unlike case-file entries this is interactive input, so malformed chunks are
/// reported instead of dropped.
pub fn parse_owner_pairs(input: &str) -> Result<Vec<ManualOwner>> {
    let mut owners = Vec::new();
    for chunk in input.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let (id_part, pct_part) =
            chunk
                .split_once(':')
                .ok_or_else(|| UboError::InvalidConfigValueError {
                    field: "manual".to_string(),
                    value: chunk.to_string(),
                    reason: "expected 'ID: percent'".to_string(),
                })?;
        let id = normalize_domestic_id(id_part).ok_or_else(|| UboError::InvalidIdentifier {
            value: id_part.trim().to_string(),
            reason: "registration number must have 7 or 8 digits".to_string(),
        })?;
        let pct = pct_part
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| UboError::InvalidConfigValueError {
                field: "manual".to_string(),
                value: pct_part.trim().to_string(),
                reason: "share must be a number of percent".to_string(),
            })?;
        if pct <= 0.0 {
            return Err(UboError::InvalidConfigValueError {
                field: "manual".to_string(),
                value: pct_part.trim().to_string(),
                reason: "share must be greater than zero".to_string(),
            });
        }
        owners.push(ManualOwner {
            kind: OwnerKind::Company,
            id: Some(id),
            name: None,
            share: pct / 100.0,
        });
    }

    let total: f64 = owners.iter().map(|o| o.share).sum();
    if total > 1.0 + 1e-6 {
        tracing::warn!(
            "⚠️ Manual shares add up to {:.2}% (> 100%), continuing anyway",
            total * 100.0
        );
    }
    Ok(owners)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domestic_id() {
        assert_eq!(normalize_domestic_id("27074358"), Some("27074358".to_string()));
        assert_eq!(normalize_domestic_id("6947"), None);
        assert_eq!(normalize_domestic_id("0006947"), Some("00006947".to_string()));
        assert_eq!(normalize_domestic_id("CZ 270 74 358"), Some("27074358".to_string()));
        assert_eq!(normalize_domestic_id("123456789"), None);
        assert_eq!(normalize_domestic_id(""), None);
    }

    #[test]
    fn test_legacy_pair_and_record_normalize_alike() {
        let pair = ManualOverrideEntry::Pair("3999840".to_string(), 0.5);
        let record = ManualOverrideEntry::Record(ManualOwnerRecord {
            kind: Some("company".to_string()),
            ico: Some("03999840".to_string()),
            share: Some(0.5),
            ..Default::default()
        });
        assert_eq!(pair.normalize(), record.normalize());
        assert_eq!(pair.normalize().unwrap().id.as_deref(), Some("03999840"));
    }

    #[test]
    fn test_invalid_entries_are_discarded() {
        let zero_share = ManualOverrideEntry::Pair("03999840".to_string(), 0.0);
        let bad_id = ManualOverrideEntry::Pair("12".to_string(), 0.3);
        let nameless_person = ManualOverrideEntry::Record(ManualOwnerRecord {
            kind: Some("person".to_string()),
            share: Some(0.3),
            ..Default::default()
        });
        assert!(zero_share.normalize().is_none());
        assert!(bad_id.normalize().is_none());
        assert!(nameless_person.normalize().is_none());
    }

    #[test]
    fn test_untagged_record_inference() {
        let foreign = ManualOwnerRecord {
            id: Some("z4159842".to_string()),
            share: Some(0.2),
            ..Default::default()
        };
        let owner = foreign.normalize().unwrap();
        assert_eq!(owner.kind, OwnerKind::ForeignEntity);
        assert_eq!(owner.id.as_deref(), Some("Z4159842"));
    }

    #[test]
    fn test_from_entries_keys_are_normalized() {
        let mut raw = HashMap::new();
        raw.insert(
            "6947".to_string(),
            vec![ManualOverrideEntry::Pair("03999840".to_string(), 0.5)],
        );
        raw.insert(
            "0006947".to_string(),
            vec![ManualOverrideEntry::Record(ManualOwnerRecord {
                kind: Some("person".to_string()),
                name: Some(" Jana Nová ".to_string()),
                share: Some(0.5),
                ..Default::default()
            })],
        );
        let overrides = ManualOverrides::from_entries(&raw);
        assert_eq!(overrides.owners_for("00006947").len(), 1);
        assert_eq!(overrides.owners_for("00006947")[0].name.as_deref(), Some("Jana Nová"));
        // "6947" is too short to be a registration number, so it stays a foreign key
        assert_eq!(overrides.owners_for_foreign("6947").len(), 1);
        assert_eq!(overrides.len(), 2);
    }

    #[test]
    fn test_foreign_keys_survive_from_entries() {
        let person = |name: &str| {
            vec![ManualOverrideEntry::Record(ManualOwnerRecord {
                kind: Some("person".to_string()),
                name: Some(name.to_string()),
                share: Some(1.0),
                ..Default::default()
            })]
        };
        let mut raw = HashMap::new();
        raw.insert(" he  123456 ".to_string(), person("Anna Georgiou"));
        raw.insert("123456".to_string(), person("Lars Berg"));
        raw.insert("7654321".to_string(), person("Mia Holm"));

        let overrides = ManualOverrides::from_entries(&raw);

        assert_eq!(overrides.len(), 3);
        assert_eq!(overrides.owners_for_foreign("HE 123456").len(), 1);
        assert_eq!(overrides.owners_for_foreign("he 123456").len(), 1);
        assert_eq!(overrides.owners_for_foreign("123456").len(), 1);
        // a 7-digit foreign id was stored under its padded domestic form
        assert_eq!(overrides.owners_for_foreign("7654321").len(), 1);
        assert_eq!(overrides.owners_for_foreign("CHE999").len(), 0);
    }

    #[test]
    fn test_normalize_foreign_id_collapses_whitespace() {
        assert_eq!(normalize_foreign_id("  he \t 123456 "), Some("HE 123456".to_string()));
        assert_eq!(normalize_foreign_id("   "), None);
    }

    #[test]
    fn test_entries_deserialize_from_both_shapes() {
        let json = r#"[["03999840", 0.5], {"type": "person", "name": "Eva", "share": 0.25}]"#;
        let entries: Vec<ManualOverrideEntry> = serde_json::from_str(json).unwrap();
        assert!(matches!(entries[0], ManualOverrideEntry::Pair(_, _)));
        assert_eq!(entries[1].normalize().unwrap().kind, OwnerKind::Person);
    }

    #[test]
    fn test_parse_owner_pairs() {
        let owners = parse_owner_pairs("03999840: 50, 17947103: 50").unwrap();
        assert_eq!(owners.len(), 2);
        assert!((owners[0].share - 0.5).abs() < 1e-12);
        assert_eq!(owners[1].id.as_deref(), Some("17947103"));

        assert!(parse_owner_pairs("03999840 50").is_err());
        assert!(parse_owner_pairs("03999840: 0").is_err());
        assert!(parse_owner_pairs("12: 10").is_err());
        assert!(parse_owner_pairs("").unwrap().is_empty());
    }

    #[test]
    fn test_into_owner_record_uses_manual_provenance() {
        let owner = ManualOwner {
            kind: OwnerKind::Company,
            id: Some("03999840".to_string()),
            name: None,
            share: 0.25,
        };
        let record = owner.into_owner_record();
        assert_eq!(record.provenance, PROVENANCE_MANUAL);
        assert_eq!(record.name, "Company (reg. no. 03999840)");
        assert_eq!(record.share, Some(0.25));
    }
}
