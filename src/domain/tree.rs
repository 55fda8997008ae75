//! The ownership tree produced by one resolution run.
//!
//! Each resolved entity owns its owner groups, and each owner owns the branch
//! resolved beneath it. The flat [`NodeLine`] view used by text renderers is
//! derived from the tree, never the other way round.

use crate::domain::model::{EntityKind, LineKind, NodeLine, OwnerKind, OwnerRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Line-depth step between an entity header and the header of an entity it owns.
pub const LEVEL_STRIDE: usize = 3;

/// How an owner's share in its immediate parent was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareSource {
    /// `effective NN %` annotation, already discounted by every ancestor.
    EffectiveAnnotation,
    Numeric,
    Text,
    BareNumber,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnerShare {
    /// Fraction held directly in the parent entity.
    pub local: Option<f64>,
    /// Fraction of the root entity, after discounting by every ancestor.
    pub effective: Option<f64>,
    pub source: ShareSource,
}

impl OwnerShare {
    pub fn unknown() -> Self {
        Self {
            local: None,
            effective: None,
            source: ShareSource::Unknown,
        }
    }

    /// Multiplier handed to the owner's own branch. An unknown share does not
    /// discount the chain.
    pub fn next_multiplier(&self, parent_multiplier: f64) -> f64 {
        self.effective.unwrap_or(parent_multiplier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerNode {
    pub record: OwnerRecord,
    pub share: OwnerShare,
    /// Branch resolved beneath a company or foreign owner; `None` for persons
    /// and for entity owners without an identifier.
    pub branch: Option<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerGroup {
    pub label: String,
    pub owners: Vec<OwnerNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub level: usize,
    pub multiplier: f64,
    pub groups: Vec<OwnerGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Branch {
    Resolved(EntityNode),
    DepthExceeded { id: String, level: usize },
    LookupFailed { id: String, level: usize, message: String },
    CycleDetected { id: String, level: usize },
}

impl Branch {
    pub fn level(&self) -> usize {
        match self {
            Branch::Resolved(node) => node.level,
            Branch::DepthExceeded { level, .. }
            | Branch::LookupFailed { level, .. }
            | Branch::CycleDetected { level, .. } => *level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    LookupFailure { id: String, message: String },
    Unresolved { id: Option<String>, name: String },
    CycleDetected { id: String, name: String },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionWarning::LookupFailure { id, message } => {
                write!(f, "registry lookup failed for {}: {}", id, message)
            }
            ResolutionWarning::Unresolved { id: Some(id), name } => {
                write!(f, "no owners found for {} ({}); add them manually", name, id)
            }
            ResolutionWarning::Unresolved { id: None, name } => {
                write!(f, "{} has no identifier and cannot be expanded", name)
            }
            ResolutionWarning::CycleDetected { id, name } => {
                write!(f, "ownership cycle: {} ({}) already appears higher in this chain", name, id)
            }
        }
    }
}

fn describe_id(kind: EntityKind, id: &str) -> String {
    match kind {
        EntityKind::Domestic => format!("reg. no. {}", id),
        EntityKind::Foreign => format!("foreign ID {}", id),
    }
}

fn owner_id_suffix(record: &OwnerRecord) -> String {
    match (record.kind, &record.identifier) {
        (OwnerKind::Company, Some(id)) => format!(" ({})", describe_id(EntityKind::Domestic, id)),
        (OwnerKind::ForeignEntity, Some(id)) => {
            format!(" ({})", describe_id(EntityKind::Foreign, id))
        }
        _ => String::new(),
    }
}

fn share_text(owner: &OwnerNode) -> String {
    let raw = owner.record.raw_share.as_deref().unwrap_or("?");
    match (owner.share.source, owner.share.local, owner.share.effective) {
        (ShareSource::EffectiveAnnotation, _, Some(effective)) => {
            format!("effective {:.2}%", effective * 100.0)
        }
        (_, Some(local), Some(effective)) if owner.record.kind == OwnerKind::Person => {
            format!("{:.2}% (effective {:.2}%)", local * 100.0, effective * 100.0)
        }
        (_, Some(local), _) => format!("{:.2}%", local * 100.0),
        _ => raw.to_string(),
    }
}

fn push_branch(branch: &Branch, lines: &mut Vec<NodeLine>) {
    let depth = branch.level() * LEVEL_STRIDE;
    match branch {
        Branch::DepthExceeded { .. } => {
            lines.push(NodeLine::new(depth, LineKind::Notice, "", "⚠️ Maximum depth exceeded"));
        }
        Branch::LookupFailed { id, message, .. } => lines.push(NodeLine::new(
            depth,
            LineKind::Notice,
            "",
            format!("⚠️ Registry lookup failed for {}: {}", id, message),
        )),
        Branch::CycleDetected { id, .. } => lines.push(NodeLine::new(
            depth,
            LineKind::Notice,
            "",
            format!("⚠️ Ownership cycle: {} already appears higher in this chain", id),
        )),
        Branch::Resolved(node) => {
            lines.push(
                NodeLine::new(
                    depth,
                    LineKind::Header,
                    "",
                    format!("{} ({})", node.name, describe_id(node.kind, &node.id)),
                )
                .with_effective_pct(Some(node.multiplier * 100.0)),
            );
            for group in &node.groups {
                lines.push(NodeLine::new(
                    depth + 1,
                    LineKind::Group,
                    &group.label,
                    format!("{}:", group.label),
                ));
                for owner in &group.owners {
                    lines.push(
                        NodeLine::new(
                            depth + 2,
                            LineKind::Owner(owner.record.kind),
                            &group.label,
                            format!(
                                "{} — {}{}",
                                owner.record.name,
                                share_text(owner),
                                owner_id_suffix(&owner.record)
                            ),
                        )
                        .with_effective_pct(owner.share.effective.map(|e| e * 100.0)),
                    );
                    if let Some(child) = &owner.branch {
                        push_branch(child, lines);
                    }
                }
            }
        }
    }
}

fn collect_companies(branch: &Branch, found: &mut BTreeMap<String, String>) {
    if let Branch::Resolved(node) = branch {
        if node.kind == EntityKind::Domestic {
            found.insert(node.id.clone(), node.name.clone());
        }
        for owner in node.groups.iter().flat_map(|g| &g.owners) {
            if let (OwnerKind::Company, Some(id)) = (owner.record.kind, &owner.record.identifier) {
                found.entry(id.clone()).or_insert_with(|| owner.record.name.clone());
            }
            if let Some(child) = &owner.branch {
                collect_companies(child, found);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipTree {
    pub root: Branch,
}

impl OwnershipTree {
    /// Pre-order, group-then-owner flattening for text renderers.
    pub fn lines(&self) -> Vec<NodeLine> {
        let mut lines = Vec::new();
        push_branch(&self.root, &mut lines);
        lines
    }

    /// Domestic companies appearing anywhere in the tree as `(name, id)`,
    /// sorted by name. A resolved header name wins over an owner-line name.
    pub fn companies(&self) -> Vec<(String, String)> {
        let mut found = BTreeMap::new();
        collect_companies(&self.root, &mut found);
        let mut companies: Vec<(String, String)> =
            found.into_iter().map(|(id, name)| (name, id)).collect();
        companies.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
        companies
    }
}

/// Output of one resolution run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub tree: OwnershipTree,
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    pub fn unresolved(&self) -> impl Iterator<Item = &ResolutionWarning> {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ResolutionWarning::Unresolved { .. }))
    }
}
