use std::collections::BTreeSet;

use compact_str::CompactString;
use rustc_hash::FxHashSet;

use crate::store::{ActorId, RevisionStore, StoreError};

/// Classifies actors as automated by their group memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorClassifier {
    automation_groups: Vec<CompactString>,
}

impl ActorClassifier {
    pub fn new(automation_groups: &[CompactString]) -> Self {
        Self {
            automation_groups: automation_groups.to_vec(),
        }
    }

    /// Ids of all actors in at least one automation group, each listed once.
    pub fn automated_actor_ids<S: RevisionStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<FxHashSet<ActorId>, StoreError> {
        if self.automation_groups.is_empty() {
            return Ok(FxHashSet::default());
        }
        let actors = store.select_actors_in_groups(&self.automation_groups)?;
        Ok(actors.into_iter().map(|actor| actor.id).collect())
    }

    /// Names of all actors in at least one automation group, ordered.
    pub fn automated_actor_names<S: RevisionStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<BTreeSet<CompactString>, StoreError> {
        if self.automation_groups.is_empty() {
            return Ok(BTreeSet::new());
        }
        let actors = store.select_actors_in_groups(&self.automation_groups)?;
        Ok(actors.into_iter().map(|actor| actor.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        predicate::Predicate,
        store::{ActorRef, CategoryKey, InMemoryStore, MalformedCategory, RevisionRow},
    };

    fn groups(names: &[&str]) -> Vec<CompactString> {
        names.iter().map(|name| CompactString::from(*name)).collect()
    }

    fn store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        let alice = store.ensure_actor("Alice", Some(1));
        let bot1 = store.ensure_actor("Bot1", Some(2));
        let bot2 = store.ensure_actor("Bot2", Some(3));
        store.add_group_membership(alice, "sysop").unwrap();
        store.add_group_membership(bot1, "automaton").unwrap();
        store.add_group_membership(bot1, "bot").unwrap();
        store.add_group_membership(bot2, "bot").unwrap();
        store
    }

    #[test]
    fn test_automated_actor_ids_are_deduplicated() {
        let store = store();
        let classifier = ActorClassifier::new(&groups(&["automaton", "bot"]));
        let ids = classifier.automated_actor_ids(&store).unwrap();

        let expected: FxHashSet<ActorId> = ["Bot1", "Bot2"]
            .iter()
            .map(|name| store.actor_id_by_name(name).unwrap())
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_default_group_only() {
        let store = store();
        let classifier = ActorClassifier::new(&groups(&["automaton"]));
        let names = classifier.automated_actor_names(&store).unwrap();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["Bot1"]);
    }

    #[test]
    fn test_no_groups_means_no_automated_actors() {
        let classifier = ActorClassifier::new(&[]);
        assert!(classifier.automated_actor_ids(&store()).unwrap().is_empty());
        assert!(classifier.automated_actor_names(&store()).unwrap().is_empty());
    }

    #[derive(Debug)]
    struct UnreachableStore;

    impl RevisionStore for UnreachableStore {
        fn select_revisions(&self, _: &Predicate) -> Result<Vec<RevisionRow>, StoreError> {
            unreachable!()
        }

        fn select_actors_in_groups(
            &self,
            _: &[CompactString],
        ) -> Result<Vec<ActorRef>, StoreError> {
            Err(StoreError::Unavailable {
                reason: "connection refused".into(),
            })
        }

        fn resolve_category_key(&self, _: &str) -> Result<CategoryKey, MalformedCategory> {
            unreachable!()
        }
    }

    #[test]
    fn test_store_failure_is_not_an_empty_set() {
        let classifier = ActorClassifier::new(&groups(&["automaton"]));
        assert!(matches!(
            classifier.automated_actor_ids(&UnreachableStore),
            Err(StoreError::Unavailable { .. })
        ));
    }
}
