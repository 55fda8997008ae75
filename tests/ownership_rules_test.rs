use async_trait::async_trait;
use std::collections::HashMap;
use ubo_resolver::core::aggregator::{aggregate, aggregate_lines};
use ubo_resolver::core::classifier::{FinalPersonRecord, UboReason, VotingCoalition};
use ubo_resolver::domain::model::{EntityKind, EntityRecord, OwnerRecord, PROVENANCE_SHAREHOLDERS};
use ubo_resolver::domain::overrides::ManualOverrides;
use ubo_resolver::domain::ports::RegistryGateway;
use ubo_resolver::{classify, merge_persons, resolve, AdjustmentState, Result, UboError};

struct FixtureRegistry {
    entities: HashMap<String, EntityRecord>,
}

impl FixtureRegistry {
    fn new(entities: Vec<(&str, &str, Vec<OwnerRecord>)>) -> Self {
        Self {
            entities: entities
                .into_iter()
                .map(|(id, name, owners)| {
                    (
                        id.to_string(),
                        EntityRecord {
                            id: id.to_string(),
                            name: name.to_string(),
                            kind: EntityKind::Domestic,
                            owners,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl RegistryGateway for FixtureRegistry {
    async fn get_entity(&self, normalized_id: &str) -> Result<EntityRecord> {
        self.entities
            .get(normalized_id)
            .cloned()
            .ok_or_else(|| UboError::RegistryError {
                id: normalized_id.to_string(),
                code: "404".to_string(),
            })
    }
}

#[tokio::test]
async fn test_effective_annotation_is_not_discounted_again() {
    let registry = FixtureRegistry::new(vec![
        (
            "10000000",
            "Root s.r.o.",
            vec![OwnerRecord::company(
                "Middle s.r.o.",
                "20000000",
                "business-share: 60 %",
                PROVENANCE_SHAREHOLDERS,
            )],
        ),
        (
            "20000000",
            "Middle s.r.o.",
            vec![OwnerRecord::person(
                "Jan Novák",
                "effective 40%",
                PROVENANCE_SHAREHOLDERS,
            )],
        ),
    ]);

    let resolution = resolve(&registry, "10000000", 8, &ManualOverrides::new())
        .await
        .unwrap();
    let persons = aggregate(&resolution.tree);

    assert!((persons["Jan Novák"].ownership - 0.40).abs() < 1e-9);
    // the flat line view agrees with the tree walk
    let from_lines = aggregate_lines(&resolution.tree.lines());
    assert!((from_lines["Jan Novák"].ownership - 0.40).abs() < 1e-9);

    let result = classify(
        &merge_persons(&persons, &AdjustmentState::default()),
        0.25,
        None,
    );
    assert!(result.is_owner("Jan Novák"));
}

#[tokio::test]
async fn test_person_under_two_branches_sums_contributions() {
    let registry = FixtureRegistry::new(vec![
        (
            "10000000",
            "Root s.r.o.",
            vec![
                OwnerRecord::company("Left s.r.o.", "20000000", "obchodni_podil: 1/2", PROVENANCE_SHAREHOLDERS),
                OwnerRecord::company("Right s.r.o.", "30000000", "obchodni_podil: 1/2", PROVENANCE_SHAREHOLDERS),
            ],
        ),
        (
            "20000000",
            "Left s.r.o.",
            vec![OwnerRecord::person("Eva Malá", "30 %", PROVENANCE_SHAREHOLDERS)],
        ),
        (
            "30000000",
            "Right s.r.o.",
            vec![OwnerRecord::person("Eva Malá", "20 %", PROVENANCE_SHAREHOLDERS)],
        ),
    ]);

    let resolution = resolve(&registry, "10000000", 8, &ManualOverrides::new())
        .await
        .unwrap();
    let persons = aggregate(&resolution.tree);

    let eva = &persons["Eva Malá"];
    assert!((eva.ownership - 0.25).abs() < 1e-9);
    assert_eq!(eva.paths.len(), 2);

    // 0.25 is not strictly above 0.25
    let result = classify(
        &merge_persons(&persons, &AdjustmentState::default()),
        0.25,
        None,
    );
    assert!(!result.is_owner("Eva Malá"));
}

#[test]
fn test_coalition_members_qualify_together() {
    let mut persons = std::collections::BTreeMap::new();
    persons.insert(
        "A".to_string(),
        FinalPersonRecord { capital: 0.10, voting: 0.10, ..Default::default() },
    );
    persons.insert(
        "B".to_string(),
        FinalPersonRecord { capital: 0.20, voting: 0.20, ..Default::default() },
    );
    let coalition = VotingCoalition {
        name: "Pact".to_string(),
        members: vec!["A".to_string(), "B".to_string()],
    };

    let result = classify(&persons, 0.25, Some(&coalition));

    for member in ["A", "B"] {
        assert!(result.is_owner(member));
        assert!(result.reasons[member]
            .iter()
            .any(|r| matches!(r, UboReason::Coalition { name, .. } if name == "Pact")));
    }
}
