use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROVENANCE_SHAREHOLDERS: &str = "shareholders";
pub const PROVENANCE_STOCKHOLDERS: &str = "stockholders";
pub const PROVENANCE_MANUAL: &str = "manual";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Domestic,
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Company,
    ForeignEntity,
    Person,
}

/// One direct owner of an entity, as reported by the registry or entered manually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub kind: OwnerKind,
    pub name: String,
    pub identifier: Option<String>,
    pub raw_share: Option<String>,
    /// Explicit local fraction in `[0, 1]` when the source states one numerically.
    pub share: Option<f64>,
    pub provenance: String,
}

impl OwnerRecord {
    pub fn person(name: impl Into<String>, raw_share: impl Into<String>, provenance: &str) -> Self {
        Self {
            kind: OwnerKind::Person,
            name: name.into(),
            identifier: None,
            raw_share: Some(raw_share.into()),
            share: None,
            provenance: provenance.to_string(),
        }
    }

    pub fn company(
        name: impl Into<String>,
        identifier: impl Into<String>,
        raw_share: impl Into<String>,
        provenance: &str,
    ) -> Self {
        Self {
            kind: OwnerKind::Company,
            name: name.into(),
            identifier: Some(identifier.into()),
            raw_share: Some(raw_share.into()),
            share: None,
            provenance: provenance.to_string(),
        }
    }

    pub fn with_share(mut self, share: f64) -> Self {
        self.share = Some(share);
        self
    }
}

/// A registry answer for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub owners: Vec<OwnerRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "owner")]
pub enum LineKind {
    Header,
    Group,
    Owner(OwnerKind),
    Notice,
}

/// One row of the flat, depth-tagged rendering of an ownership tree.
///
/// Header at depth `d`, group label at `d + 1`, owner at `d + 2`, the owner's
/// own header at `d + 3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLine {
    pub depth: usize,
    pub label: String,
    pub text: String,
    pub effective_pct: Option<f64>,
    pub kind: LineKind,
}

impl NodeLine {
    pub fn new(depth: usize, kind: LineKind, label: &str, text: impl Into<String>) -> Self {
        Self {
            depth,
            label: label.to_string(),
            text: text.into(),
            effective_pct: None,
            kind,
        }
    }

    pub fn with_effective_pct(mut self, effective_pct: Option<f64>) -> Self {
        self.effective_pct = effective_pct;
        self
    }
}

impl fmt::Display for NodeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", "    ".repeat(self.depth), self.text)
    }
}

/// Indented plain-text rendering, four spaces per depth step.
pub fn render_lines(lines: &[NodeLine]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}
