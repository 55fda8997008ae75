//! Per-person cumulative effective shares.
//!
//! A person reachable along several chains holds every one of those economic
//! exposures, so contributions are summed rather than deduplicated. Totals are
//! clamped to `[0, 1]` once, after the last contribution.

use crate::core::share_parser::{parse_effective, parse_share};
use crate::domain::model::{LineKind, NodeLine, OwnerKind};
use crate::domain::tree::{Branch, OwnerNode, OwnershipTree, ShareSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionSource {
    /// Effective percentage carried by the node itself.
    NodeEffective,
    /// `effective NN %` annotation in the share text.
    EffectiveAnnotation,
    /// Enclosing multiplier times the local share.
    LocalShare,
    Unknown,
}

/// One path by which a person holds part of the root entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub enclosing_multiplier: f64,
    pub local_share: Option<f64>,
    pub contribution: Option<f64>,
    pub source: ContributionSource,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonAggregate {
    pub ownership: f64,
    pub voting: f64,
    pub paths: Vec<Contribution>,
}

impl PersonAggregate {
    fn add(&mut self, contribution: Contribution) {
        if let Some(value) = contribution.contribution {
            self.ownership += value;
            self.voting += value;
        }
        self.paths.push(contribution);
    }
}

pub type PersonAggregates = BTreeMap<String, PersonAggregate>;

fn finish(mut persons: PersonAggregates) -> PersonAggregates {
    for aggregate in persons.values_mut() {
        aggregate.ownership = aggregate.ownership.clamp(0.0, 1.0);
        aggregate.voting = aggregate.voting.clamp(0.0, 1.0);
    }
    persons
}

fn person_contribution(owner: &OwnerNode, enclosing: f64) -> Contribution {
    let text = owner
        .record
        .raw_share
        .clone()
        .unwrap_or_else(|| owner.record.name.clone());
    let (local_share, contribution, source) = match owner.share.source {
        ShareSource::EffectiveAnnotation => (
            owner.share.local,
            owner.share.effective,
            ContributionSource::EffectiveAnnotation,
        ),
        ShareSource::Unknown => (None, None, ContributionSource::Unknown),
        _ => (
            owner.share.local,
            owner.share.local.map(|local| enclosing * local),
            ContributionSource::LocalShare,
        ),
    };
    Contribution {
        enclosing_multiplier: enclosing,
        local_share,
        contribution,
        source,
        text,
    }
}

fn walk(branch: &Branch, enclosing: f64, persons: &mut PersonAggregates) {
    let Branch::Resolved(node) = branch else {
        return;
    };
    for owner in node.groups.iter().flat_map(|g| &g.owners) {
        match owner.record.kind {
            OwnerKind::Person => {
                persons
                    .entry(owner.record.name.clone())
                    .or_default()
                    .add(person_contribution(owner, enclosing));
            }
            OwnerKind::Company | OwnerKind::ForeignEntity => {
                if let Some(child) = &owner.branch {
                    walk(child, owner.share.next_multiplier(enclosing), persons);
                }
            }
        }
    }
}

/// Sums every person's effective ownership and voting over all paths of `tree`.
pub fn aggregate(tree: &OwnershipTree) -> PersonAggregates {
    let mut persons = PersonAggregates::new();
    walk(&tree.root, 1.0, &mut persons);
    finish(persons)
}

/// Same computation over a flat, depth-tagged line snapshot.
///
/// Tree shape is recovered from depths alone: a stack of
/// `(header depth, multiplier)` plus the multiplier announced by the most
/// recent company line, which the next header adopts.
pub fn aggregate_lines(lines: &[NodeLine]) -> PersonAggregates {
    let mut persons = PersonAggregates::new();
    let mut stack: Vec<(usize, f64)> = Vec::new();
    let mut pending: Option<f64> = None;

    for line in lines {
        match line.kind {
            LineKind::Group => continue,
            LineKind::Notice => {
                // replaces the header a pending multiplier was meant for
                pending = None;
                continue;
            }
            LineKind::Header => {
                while stack.last().is_some_and(|(depth, _)| *depth >= line.depth) {
                    stack.pop();
                }
                let parent = stack.last().map(|(_, m)| *m).unwrap_or(1.0);
                stack.push((line.depth, pending.take().unwrap_or(parent)));
                continue;
            }
            LineKind::Owner(_) => {}
        }

        let expected_parent = line.depth.saturating_sub(2);
        while stack.last().is_some_and(|(depth, _)| *depth > expected_parent) {
            stack.pop();
        }
        let enclosing = stack.last().map(|(_, m)| *m).unwrap_or(1.0);
        let node_effective = line.effective_pct.map(|pct| pct / 100.0);
        let text_effective = parse_effective(&line.text);

        match line.kind {
            LineKind::Owner(OwnerKind::Person) => {
                let name = line
                    .text
                    .split(" — ")
                    .next()
                    .unwrap_or(&line.text)
                    .trim()
                    .to_string();
                let contribution = if let Some(effective) = node_effective {
                    Contribution {
                        enclosing_multiplier: enclosing,
                        local_share: (enclosing > 0.0).then(|| effective / enclosing),
                        contribution: Some(effective),
                        source: ContributionSource::NodeEffective,
                        text: line.text.clone(),
                    }
                } else if let Some(effective) = text_effective {
                    Contribution {
                        enclosing_multiplier: enclosing,
                        local_share: (enclosing > 0.0).then(|| effective / enclosing),
                        contribution: Some(effective),
                        source: ContributionSource::EffectiveAnnotation,
                        text: line.text.clone(),
                    }
                } else {
                    let local = parse_share(&line.text);
                    Contribution {
                        enclosing_multiplier: enclosing,
                        local_share: local,
                        contribution: local.map(|l| enclosing * l),
                        source: if local.is_some() {
                            ContributionSource::LocalShare
                        } else {
                            ContributionSource::Unknown
                        },
                        text: line.text.clone(),
                    }
                };
                persons.entry(name).or_default().add(contribution);
            }
            _ => {
                let local = match node_effective.or(text_effective) {
                    Some(effective) if enclosing > 0.0 => Some(effective / enclosing),
                    Some(_) => None,
                    None => parse_share(&line.text),
                };
                pending = local.map(|l| enclosing * l);
            }
        }
    }

    finish(persons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resolver::{resolve, tests::StaticGateway};
    use crate::domain::model::{OwnerRecord, PROVENANCE_SHAREHOLDERS};
    use crate::domain::overrides::ManualOverrides;

    fn person(name: &str, share: &str) -> OwnerRecord {
        OwnerRecord::person(name, share, PROVENANCE_SHAREHOLDERS)
    }

    fn company(name: &str, id: &str, share: &str) -> OwnerRecord {
        OwnerRecord::company(name, id, share, PROVENANCE_SHAREHOLDERS)
    }

    fn diamond() -> StaticGateway {
        StaticGateway::new()
            .with(
                "11111111",
                "Root a.s.",
                vec![
                    company("A s.r.o.", "22222222", "obchodni_podil: 1/2"),
                    company("B s.r.o.", "33333333", "obchodni_podil: 1/2"),
                    person("Karel Veselý", "10 %"),
                ],
            )
            .with("22222222", "A s.r.o.", vec![person("Jan Novák", "60 %"), person("Eva Malá", "40 %")])
            .with("33333333", "B s.r.o.", vec![person("Jan Novák", "30 %"), person("Ota Dlouhý", "70 %")])
    }

    #[tokio::test]
    async fn test_multiple_paths_are_summed() {
        let gateway = diamond();
        let resolution = resolve(&gateway, "11111111", 8, &ManualOverrides::new()).await.unwrap();

        let persons = aggregate(&resolution.tree);

        let jan = &persons["Jan Novák"];
        assert!((jan.ownership - (0.5 * 0.6 + 0.5 * 0.3)).abs() < 1e-9);
        assert_eq!(jan.paths.len(), 2);
        assert_eq!(jan.voting, jan.ownership);
        assert!((persons["Karel Veselý"].ownership - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_lines_and_tree_agree() {
        let gateway = diamond();
        let resolution = resolve(&gateway, "11111111", 8, &ManualOverrides::new()).await.unwrap();

        let from_tree = aggregate(&resolution.tree);
        let from_lines = aggregate_lines(&resolution.tree.lines());

        assert_eq!(from_tree.len(), from_lines.len());
        for (name, agg) in &from_tree {
            assert!((agg.ownership - from_lines[name].ownership).abs() < 1e-9, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_total_is_clamped_after_summation() {
        let gateway = StaticGateway::new()
            .with(
                "11111111",
                "Root a.s.",
                vec![
                    company("A s.r.o.", "22222222", "100 %"),
                    company("B s.r.o.", "33333333", "100 %"),
                ],
            )
            .with("22222222", "A s.r.o.", vec![person("Jan Novák", "80 %")])
            .with("33333333", "B s.r.o.", vec![person("Jan Novák", "70 %")]);
        let resolution = resolve(&gateway, "11111111", 8, &ManualOverrides::new()).await.unwrap();

        let jan = &aggregate(&resolution.tree)["Jan Novák"];

        assert_eq!(jan.ownership, 1.0);
        let raw: f64 = jan.paths.iter().filter_map(|p| p.contribution).sum();
        assert!((raw - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_share_keeps_person_with_zero() {
        let gateway = StaticGateway::new()
            .with("11111111", "Root a.s.", vec![person("Jan Novák", "neuvedeno")]);
        let resolution = resolve(&gateway, "11111111", 8, &ManualOverrides::new()).await.unwrap();

        let persons = aggregate(&resolution.tree);

        assert_eq!(persons["Jan Novák"].ownership, 0.0);
        assert_eq!(persons["Jan Novák"].paths[0].source, ContributionSource::Unknown);
    }

    #[test]
    fn test_aggregate_lines_uses_depth_stack() {
        let lines = vec![
            NodeLine::new(0, LineKind::Header, "", "Root a.s. (reg. no. 11111111)"),
            NodeLine::new(1, LineKind::Group, "shareholders", "shareholders:"),
            NodeLine::new(2, LineKind::Owner(OwnerKind::Company), "shareholders", "A s.r.o. — 50.00% (reg. no. 22222222)"),
            NodeLine::new(3, LineKind::Header, "", "A s.r.o. (reg. no. 22222222)"),
            NodeLine::new(4, LineKind::Group, "shareholders", "shareholders:"),
            NodeLine::new(5, LineKind::Owner(OwnerKind::Person), "shareholders", "Jan Novák — 40 %"),
            // back at the root level after the nested block
            NodeLine::new(2, LineKind::Owner(OwnerKind::Person), "shareholders", "Eva Malá — 50 %"),
        ];

        let persons = aggregate_lines(&lines);

        assert!((persons["Jan Novák"].ownership - 0.2).abs() < 1e-9);
        assert!((persons["Eva Malá"].ownership - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_lines_node_effective_is_not_rediscounted() {
        let lines = vec![
            NodeLine::new(0, LineKind::Header, "", "Root a.s. (reg. no. 11111111)"),
            NodeLine::new(1, LineKind::Group, "shareholders", "shareholders:"),
            NodeLine::new(2, LineKind::Owner(OwnerKind::Company), "shareholders", "A s.r.o. — 60.00% (reg. no. 22222222)")
                .with_effective_pct(Some(60.0)),
            NodeLine::new(3, LineKind::Header, "", "A s.r.o. (reg. no. 22222222)"),
            NodeLine::new(4, LineKind::Group, "shareholders", "shareholders:"),
            NodeLine::new(5, LineKind::Owner(OwnerKind::Person), "shareholders", "Jan Novák — effective 40%"),
        ];

        let persons = aggregate_lines(&lines);

        assert!((persons["Jan Novák"].ownership - 0.4).abs() < 1e-9);
        assert_eq!(persons["Jan Novák"].paths[0].source, ContributionSource::EffectiveAnnotation);
    }
}
