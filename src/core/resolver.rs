//! Recursive expansion of an ownership chain into an [`OwnershipTree`].
//!
//! The walk is depth-first and strictly sequential: one registry call is
//! awaited before the next is issued. A branch stops at the depth ceiling, on
//! an entity already present on the active path, or when the registry lookup
//! fails; siblings are unaffected in every case.

use crate::core::share_parser::{parse_bare_percent, parse_effective, parse_share};
use crate::domain::model::{EntityKind, OwnerKind, OwnerRecord};
use crate::domain::overrides::{normalize_domestic_id, normalize_foreign_id, ManualOverrides};
use crate::domain::ports::RegistryGateway;
use crate::domain::tree::{
    Branch, EntityNode, OwnerGroup, OwnerNode, OwnerShare, OwnershipTree, Resolution,
    ResolutionWarning, ShareSource,
};
use crate::utils::error::{Result, UboError};
use std::future::Future;
use std::pin::Pin;

pub const DEFAULT_MAX_DEPTH: usize = 8;

type BranchFuture<'b> = Pin<Box<dyn Future<Output = Branch> + Send + 'b>>;

/// Establishes an owner's local and effective share under `parent_multiplier`.
///
/// An `effective NN %` annotation wins over everything else: it is taken as
/// already discounted and is never multiplied again. Otherwise the local share
/// comes from the numeric field, then the text tiers, then a bare number.
pub fn resolve_share(record: &OwnerRecord, parent_multiplier: f64) -> OwnerShare {
    let raw = record.raw_share.as_deref().unwrap_or("");

    if let Some(effective) = parse_effective(raw) {
        return OwnerShare {
            local: (parent_multiplier > 0.0).then(|| effective / parent_multiplier),
            effective: Some(effective),
            source: ShareSource::EffectiveAnnotation,
        };
    }

    let (local, source) = if let Some(share) = record.share {
        (share.clamp(0.0, 1.0), ShareSource::Numeric)
    } else if let Some(share) = parse_share(raw) {
        (share, ShareSource::Text)
    } else if let Some(share) = parse_bare_percent(raw) {
        (share, ShareSource::BareNumber)
    } else {
        return OwnerShare::unknown();
    };

    OwnerShare {
        local: Some(local),
        effective: Some(parent_multiplier * local),
        source,
    }
}

struct Target {
    id: String,
    kind: EntityKind,
    display_name: Option<String>,
}

struct Resolver<'a, G: RegistryGateway + ?Sized> {
    gateway: &'a G,
    overrides: &'a ManualOverrides,
    max_depth: usize,
    warnings: Vec<ResolutionWarning>,
    path: Vec<String>,
}

impl<'a, G: RegistryGateway + ?Sized> Resolver<'a, G> {
    fn walk<'b>(&'b mut self, target: Target, level: usize, multiplier: f64) -> BranchFuture<'b> {
        Box::pin(async move {
            if level > self.max_depth {
                tracing::debug!("Depth limit reached at {} (level {})", target.id, level);
                return Branch::DepthExceeded {
                    id: target.id,
                    level,
                };
            }

            if self.path.contains(&target.id) {
                let name = target.display_name.clone().unwrap_or_else(|| target.id.clone());
                tracing::warn!("🔁 Ownership cycle detected at {} ({})", name, target.id);
                self.warnings.push(ResolutionWarning::CycleDetected {
                    id: target.id.clone(),
                    name,
                });
                return Branch::CycleDetected {
                    id: target.id,
                    level,
                };
            }

            let (name, mut owners) = match target.kind {
                EntityKind::Domestic => match self.gateway.get_entity(&target.id).await {
                    Ok(record) => (record.name, record.owners),
                    Err(e) => {
                        let message = e.to_string();
                        tracing::warn!("⚠️ Registry lookup failed for {}: {}", target.id, message);
                        self.warnings.push(ResolutionWarning::LookupFailure {
                            id: target.id.clone(),
                            message: message.clone(),
                        });
                        return Branch::LookupFailed {
                            id: target.id,
                            level,
                            message,
                        };
                    }
                },
                EntityKind::Foreign => {
                    let name = target
                        .display_name
                        .clone()
                        .unwrap_or_else(|| format!("Foreign entity {}", target.id));
                    (name, Vec::new())
                }
            };

            let manual = match target.kind {
                EntityKind::Domestic => self.overrides.owners_for(&target.id),
                EntityKind::Foreign => self.overrides.owners_for_foreign(&target.id),
            };
            if !manual.is_empty() {
                tracing::debug!("Appending {} manual owner(s) to {}", manual.len(), target.id);
            }
            owners.extend(manual.iter().cloned().map(|m| m.into_owner_record()));

            if owners.is_empty() {
                tracing::warn!("❓ No owners found for {} ({})", name, target.id);
                self.warnings.push(ResolutionWarning::Unresolved {
                    id: Some(target.id.clone()),
                    name: name.clone(),
                });
            }

            tracing::debug!(
                "Expanding {} ({}) at level {} with {} owner(s), multiplier {:.4}",
                name,
                target.id,
                level,
                owners.len(),
                multiplier
            );

            self.path.push(target.id.clone());
            let groups = self.expand_owners(owners, level, multiplier).await;
            self.path.pop();

            Branch::Resolved(EntityNode {
                id: target.id,
                name,
                kind: target.kind,
                level,
                multiplier,
                groups,
            })
        })
    }

    async fn expand_owners(
        &mut self,
        owners: Vec<OwnerRecord>,
        level: usize,
        multiplier: f64,
    ) -> Vec<OwnerGroup> {
        let mut grouped: Vec<(String, Vec<OwnerRecord>)> = Vec::new();
        for owner in owners {
            match grouped.iter_mut().find(|(label, _)| *label == owner.provenance) {
                Some((_, members)) => members.push(owner),
                None => grouped.push((owner.provenance.clone(), vec![owner])),
            }
        }

        let mut groups = Vec::with_capacity(grouped.len());
        for (label, members) in grouped {
            let mut nodes = Vec::with_capacity(members.len());
            for record in members {
                let share = resolve_share(&record, multiplier);
                let branch = self.expand_owner(&record, &share, level, multiplier).await;
                nodes.push(OwnerNode {
                    record,
                    share,
                    branch,
                });
            }
            groups.push(OwnerGroup {
                label,
                owners: nodes,
            });
        }
        groups
    }

    async fn expand_owner(
        &mut self,
        record: &OwnerRecord,
        share: &OwnerShare,
        level: usize,
        multiplier: f64,
    ) -> Option<Branch> {
        let target = match (record.kind, record.identifier.as_deref()) {
            (OwnerKind::Person, _) => return None,
            (OwnerKind::Company, Some(raw)) => normalize_domestic_id(raw).map(|id| Target {
                id,
                kind: EntityKind::Domestic,
                display_name: Some(record.name.clone()),
            }),
            (OwnerKind::ForeignEntity, Some(raw)) => normalize_foreign_id(raw).map(|id| Target {
                id,
                kind: EntityKind::Foreign,
                display_name: Some(record.name.clone()),
            }),
            _ => None,
        };

        match target {
            Some(target) => {
                let next = share.next_multiplier(multiplier);
                Some(self.walk(target, level + 1, next).await)
            }
            None => {
                tracing::warn!("❓ {} has no usable identifier, not expanded", record.name);
                self.warnings.push(ResolutionWarning::Unresolved {
                    id: None,
                    name: record.name.clone(),
                });
                None
            }
        }
    }
}

/// Resolves the ownership tree of the domestic entity `root_id`.
///
/// Fails only when `root_id` is not a usable registration number; every other
/// problem is confined to its branch and reported through the warnings.
pub async fn resolve<G: RegistryGateway + ?Sized>(
    gateway: &G,
    root_id: &str,
    max_depth: usize,
    overrides: &ManualOverrides,
) -> Result<Resolution> {
    let id = normalize_domestic_id(root_id).ok_or_else(|| UboError::InvalidIdentifier {
        value: root_id.to_string(),
        reason: "registration number must have 7 or 8 digits".to_string(),
    })?;

    tracing::info!("🔎 Resolving ownership of {} (max depth {})", id, max_depth);

    let mut resolver = Resolver {
        gateway,
        overrides,
        max_depth,
        warnings: Vec::new(),
        path: Vec::new(),
    };
    let root = resolver
        .walk(
            Target {
                id,
                kind: EntityKind::Domestic,
                display_name: None,
            },
            0,
            1.0,
        )
        .await;

    tracing::info!(
        "✅ Resolution finished with {} warning(s)",
        resolver.warnings.len()
    );

    Ok(Resolution {
        tree: OwnershipTree { root },
        warnings: resolver.warnings,
    })
}
