//! Realm group sync planning
//!
//! Groups are matched by name. Desired groups missing from Keycloak are
//! created together with their subgroups, groups that already exist are
//! updated and get any missing direct subgroups. Groups that only exist in
//! Keycloak are left alone.

use crate::crd::KeycloakRealmGroup;

/// One admin API call needed to bring realm groups up to date.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOp {
    /// Create a top-level group, then each of its subgroups under the new id
    Create(KeycloakRealmGroup),
    Update {
        id: String,
        group: KeycloakRealmGroup,
    },
    CreateChild {
        parent_id: String,
        group: KeycloakRealmGroup,
    },
}

impl GroupOp {
    pub fn group_name(&self) -> &str {
        match self {
            GroupOp::Create(group) => &group.name,
            GroupOp::Update { group, .. } | GroupOp::CreateChild { group, .. } => &group.name,
        }
    }
}

/// Additive sync of `desired` onto `existing`, in desired order.
pub fn plan_group_sync(
    desired: &[KeycloakRealmGroup],
    existing: &[KeycloakRealmGroup],
) -> Vec<GroupOp> {
    let mut ops = Vec::new();

    for group in desired {
        let current = existing.iter().find_map(|e| match &e.id {
            Some(id) if e.name == group.name => Some((id, e)),
            _ => None,
        });

        let Some((id, current)) = current else {
            ops.push(GroupOp::Create(group.clone()));
            continue;
        };

        let mut update = group.clone();
        update.id = Some(id.clone());
        ops.push(GroupOp::Update {
            id: id.clone(),
            group: update,
        });

        for child in &group.sub_groups {
            if !current.sub_groups.iter().any(|c| c.name == child.name) {
                ops.push(GroupOp::CreateChild {
                    parent_id: id.clone(),
                    group: child.clone(),
                });
            }
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(name: &str, id: Option<&str>, children: &[&str]) -> KeycloakRealmGroup {
        KeycloakRealmGroup {
            id: id.map(str::to_string),
            name: name.to_string(),
            sub_groups: children
                .iter()
                .map(|c| KeycloakRealmGroup {
                    name: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_is_additive() {
        let desired = vec![group("A", None, &[]), group("B", None, &[])];
        let existing = vec![group("A", Some("id-a"), &[]), group("C", Some("id-c"), &[])];

        let ops = plan_group_sync(&desired, &existing);
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], GroupOp::Update { id, group } if id == "id-a" && group.name == "A"));
        assert!(matches!(&ops[1], GroupOp::Create(g) if g.name == "B"));
        assert!(ops.iter().all(|op| op.group_name() != "C"));
    }

    #[test]
    fn test_update_carries_existing_id() {
        let ops = plan_group_sync(&[group("A", None, &[])], &[group("A", Some("id-a"), &[])]);
        match &ops[0] {
            GroupOp::Update { group, .. } => assert_eq!(group.id.as_deref(), Some("id-a")),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_missing_children_created_under_existing_parent() {
        let desired = vec![group("A", None, &["a1", "a2"])];
        let existing = vec![group("A", Some("id-a"), &["a1", "old"])];

        let ops = plan_group_sync(&desired, &existing);
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[1],
            GroupOp::CreateChild {
                parent_id: "id-a".to_string(),
                group: KeycloakRealmGroup {
                    name: "a2".to_string(),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn test_new_group_keeps_children_for_creation() {
        let ops = plan_group_sync(&[group("B", None, &["b1"])], &[]);
        match &ops[0] {
            GroupOp::Create(g) => assert_eq!(g.sub_groups[0].name, "b1"),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_existing_group_without_id_is_recreated() {
        let ops = plan_group_sync(&[group("A", None, &[])], &[group("A", None, &[])]);
        assert!(matches!(&ops[0], GroupOp::Create(_)));
    }
}
