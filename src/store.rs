use std::fmt::{self, Debug, Display};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::predicate::Predicate;

pub type PageId = i32;
pub type RevisionId = i32;
pub type ActorId = i32;

/// Normalized database key of a category title (e.g. `Living_people`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryKey(CompactString);

impl CategoryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRecord {
    pub id: PageId,
    pub namespace: i32,
    pub title: CompactString,
    pub is_redirect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorRecord {
    pub id: ActorId,
    pub name: CompactString,
    // `None` for anonymous editors
    pub user_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionRecord {
    pub id: RevisionId,
    pub parent_id: Option<RevisionId>,
    pub timestamp: DateTime<Utc>,
    pub page_id: PageId,
    pub actor_id: ActorId,
    pub comment: Option<CompactString>,
}

impl RevisionRecord {
    /// A revision without a parent created its page.
    pub fn is_creation(&self) -> bool {
        matches!(self.parent_id, None | Some(0))
    }
}

/// Joined view of one revision with its page, actor and category links,
/// as seen by [`Predicate::matches`].
#[derive(Debug, Clone, Copy)]
pub struct RevisionView<'a> {
    pub revision: &'a RevisionRecord,
    pub page: &'a PageRecord,
    pub actor: &'a ActorRecord,
    pub categories: Option<&'a FxHashSet<CategoryKey>>,
}

impl RevisionView<'_> {
    pub fn in_category(&self, key: &CategoryKey) -> bool {
        self.categories.is_some_and(|keys| keys.contains(key))
    }
}

/// One row returned by [`RevisionStore::select_revisions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRow {
    pub page_id: PageId,
    pub page_title: CompactString,
    pub actor_name: CompactString,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorRef {
    pub id: ActorId,
    pub name: CompactString,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("revision store unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("revision {revision} references unknown {relation} {id}")]
    DanglingReference {
        revision: RevisionId,
        relation: &'static str,
        id: i32,
    },
    #[error("group membership references unknown actor {0}")]
    UnknownActor(ActorId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed category title: {input:?}")]
pub struct MalformedCategory {
    pub input: String,
}

/// Read-only access to the revision log and the relations it is joined with.
///
/// Implementations own connection and transaction handling; every call is
/// an independent read and must either return the complete answer or fail.
pub trait RevisionStore: Send + Sync {
    /// All revisions satisfying `predicate`, joined with page and actor data.
    fn select_revisions(&self, predicate: &Predicate) -> Result<Vec<RevisionRow>, StoreError>;

    /// Actors holding membership in at least one of `groups`. May contain
    /// duplicates if an actor is in several of the groups.
    fn select_actors_in_groups(
        &self,
        groups: &[CompactString],
    ) -> Result<Vec<ActorRef>, StoreError>;

    /// Resolve free-text category input into a normalized [`CategoryKey`].
    fn resolve_category_key(&self, free_text: &str) -> Result<CategoryKey, MalformedCategory>;

    /// Number of distinct pages with at least one revision satisfying `predicate`.
    ///
    /// Signed like a database `COUNT`, the caller checks the sign.
    fn count_distinct_pages(&self, predicate: &Predicate) -> Result<i64, StoreError> {
        let rows = self.select_revisions(predicate)?;
        let pages: FxHashSet<PageId> = rows.iter().map(|row| row.page_id).collect();
        Ok(pages.len() as i64)
    }
}

// characters that can never appear in a title
const ILLEGAL_TITLE_CHARS: &[char] = &['#', '<', '>', '[', ']', '|', '{', '}'];

/// Normalize free-text category input into a database key.
///
/// A leading colon and a namespace prefix matching one of `namespace_aliases`
/// are removed. Runs of spaces and underscores become a single underscore and
/// the first character is uppercased.
pub fn normalize_category_key(
    input: &str,
    namespace_aliases: &[CompactString],
) -> Result<CategoryKey, MalformedCategory> {
    let malformed = || MalformedCategory {
        input: input.to_owned(),
    };

    let mut text = input.trim();
    if let Some(rest) = text.strip_prefix(':') {
        text = rest.trim_start();
    }
    if let Some((prefix, rest)) = text.split_once(':') {
        let prefix = prefix.trim().replace('_', " ");
        if namespace_aliases
            .iter()
            .any(|alias| alias.replace('_', " ").eq_ignore_ascii_case(&prefix))
        {
            text = rest;
        }
    }

    if text
        .chars()
        .any(|c| ILLEGAL_TITLE_CHARS.contains(&c) || c.is_control())
    {
        return Err(malformed());
    }

    let mut key = String::with_capacity(text.len());
    let mut pending_separator = false;
    for c in text.chars() {
        if c == ' ' || c == '_' || c.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator && !key.is_empty() {
            key.push('_');
        }
        pending_separator = false;

        if key.is_empty() {
            push_uppercase(&mut key, c);
        } else {
            key.push(c);
        }
    }

    if key.is_empty() {
        return Err(malformed());
    }
    Ok(CategoryKey(CompactString::from(key)))
}

fn push_uppercase(output: &mut String, c: char) {
    let mapped = unicode_case_mapping::to_uppercase(c);
    if mapped[0] == 0 {
        output.push(c);
        return;
    }
    for code in mapped.into_iter().take_while(|&code| code != 0) {
        output.push(char::from_u32(code).unwrap_or(c));
    }
}

/// Revision store held entirely in memory, typically populated from an XML dump.
///
/// The store is immutable while reports run; all mutation happens while loading.
#[derive(Debug)]
pub struct InMemoryStore {
    pages: FxHashMap<PageId, PageRecord>,
    actors: FxHashMap<ActorId, ActorRecord>,
    actors_by_name: FxHashMap<CompactString, ActorId>,
    revisions: Vec<RevisionRecord>,
    groups: FxHashMap<ActorId, FxHashSet<CompactString>>,
    category_links: FxHashMap<PageId, FxHashSet<CategoryKey>>,
    category_namespace_aliases: Vec<CompactString>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            pages: FxHashMap::default(),
            actors: FxHashMap::default(),
            actors_by_name: FxHashMap::default(),
            revisions: Vec::new(),
            groups: FxHashMap::default(),
            category_links: FxHashMap::default(),
            category_namespace_aliases: vec![CompactString::from("Category")],
        }
    }

    /// Accept `alias` as a category namespace prefix in addition to `Category`.
    pub fn add_category_namespace_alias(&mut self, alias: &str) {
        let alias = CompactString::from(alias.trim());
        if !alias.is_empty() && !self.category_namespace_aliases.contains(&alias) {
            self.category_namespace_aliases.push(alias);
        }
    }

    pub fn category_namespace_aliases(&self) -> &[CompactString] {
        &self.category_namespace_aliases
    }

    pub fn insert_page(&mut self, page: PageRecord) {
        self.pages.insert(page.id, page);
    }

    /// Return the id of the actor called `name`, registering it if unknown.
    pub fn ensure_actor(&mut self, name: &str, user_id: Option<i32>) -> ActorId {
        if let Some(id) = self.actors_by_name.get(name) {
            return *id;
        }

        let id = self.actors.len() as ActorId + 1;
        let name = CompactString::from(name);
        self.actors_by_name.insert(name.clone(), id);
        self.actors.insert(id, ActorRecord { id, name, user_id });
        id
    }

    pub fn actor_id_by_name(&self, name: &str) -> Option<ActorId> {
        self.actors_by_name.get(name).copied()
    }

    pub fn add_group_membership(&mut self, actor: ActorId, group: &str) -> Result<(), StoreError> {
        if !self.actors.contains_key(&actor) {
            return Err(StoreError::UnknownActor(actor));
        }
        self.groups
            .entry(actor)
            .or_default()
            .insert(CompactString::from(group));
        Ok(())
    }

    pub fn add_category_link(&mut self, page: PageId, key: CategoryKey) {
        self.category_links.entry(page).or_default().insert(key);
    }

    /// Append a revision to the log. Its page and actor must already be known.
    pub fn insert_revision(&mut self, revision: RevisionRecord) -> Result<(), StoreError> {
        if !self.pages.contains_key(&revision.page_id) {
            return Err(StoreError::DanglingReference {
                revision: revision.id,
                relation: "page",
                id: revision.page_id,
            });
        }
        if !self.actors.contains_key(&revision.actor_id) {
            return Err(StoreError::DanglingReference {
                revision: revision.id,
                relation: "actor",
                id: revision.actor_id,
            });
        }
        self.revisions.push(revision);
        Ok(())
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    fn views(&self) -> impl Iterator<Item = RevisionView<'_>> {
        self.revisions.iter().filter_map(|revision| {
            // revisions are validated on insert, pages can't be removed
            let page = self.pages.get(&revision.page_id)?;
            let actor = self.actors.get(&revision.actor_id)?;
            Some(RevisionView {
                revision,
                page,
                actor,
                categories: self.category_links.get(&revision.page_id),
            })
        })
    }
}

impl RevisionStore for InMemoryStore {
    fn select_revisions(&self, predicate: &Predicate) -> Result<Vec<RevisionRow>, StoreError> {
        Ok(self
            .views()
            .filter(|view| predicate.matches(view))
            .map(|view| RevisionRow {
                page_id: view.page.id,
                page_title: view.page.title.clone(),
                actor_name: view.actor.name.clone(),
                timestamp: view.revision.timestamp,
            })
            .collect())
    }

    fn select_actors_in_groups(
        &self,
        groups: &[CompactString],
    ) -> Result<Vec<ActorRef>, StoreError> {
        Ok(self
            .groups
            .iter()
            .filter(|(_, held)| groups.iter().any(|group| held.contains(group)))
            .filter_map(|(actor, _)| self.actors.get(actor))
            .map(|actor| ActorRef {
                id: actor.id,
                name: actor.name.clone(),
            })
            .collect())
    }

    fn resolve_category_key(&self, free_text: &str) -> Result<CategoryKey, MalformedCategory> {
        normalize_category_key(free_text, &self.category_namespace_aliases)
    }

    fn count_distinct_pages(&self, predicate: &Predicate) -> Result<i64, StoreError> {
        let pages: FxHashSet<PageId> = self
            .views()
            .filter(|view| predicate.matches(view))
            .map(|view| view.page.id)
            .collect();
        Ok(pages.len() as i64)
    }
}
