//! Typed filter over the revision log.
//!
//! A [`Predicate`] is a conjunction of [`Clause`]s plus the [`Join`]s that
//! restrict the page set. It is built fresh for every query by a
//! [`PredicateBuilder`] and never modified afterwards.

use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

use chrono::{DateTime, SecondsFormat, Utc};
use memchr::memmem;
use rustc_hash::FxHashSet;

use crate::{
    bulk_edit::BulkEditFilter,
    params::ReportParameters,
    store::{ActorId, CategoryKey, MalformedCategory, RevisionStore, RevisionView},
};

/// Literal substring searched in revision comments.
#[derive(Clone)]
pub struct CommentPattern {
    literal: String,
    finder: memmem::Finder<'static>,
}

impl CommentPattern {
    pub fn new(literal: &str) -> Self {
        Self {
            literal: literal.to_owned(),
            finder: memmem::Finder::new(literal.as_bytes()).into_owned(),
        }
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn is_contained_in(&self, text: &str) -> bool {
        self.finder.find(text.as_bytes()).is_some()
    }

    /// The pattern as an escaped `LIKE` expression, `%literal%`.
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.literal.len() + 2);
        pattern.push('%');
        for c in self.literal.chars() {
            if matches!(c, '\\' | '%' | '_') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

impl Debug for CommentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommentPattern").field(&self.literal).finish()
    }
}

impl PartialEq for CommentPattern {
    fn eq(&self, other: &Self) -> bool {
        self.literal == other.literal
    }
}

impl Eq for CommentPattern {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Namespace(i32),
    NotRedirect,
    /// Excludes page creations.
    HasParent,
    TimestampAtLeast(DateTime<Utc>),
    TimestampBefore(DateTime<Utc>),
    CommentNotContaining(CommentPattern),
    ActorNotIn(Arc<FxHashSet<ActorId>>),
}

impl Clause {
    pub fn matches(&self, view: &RevisionView<'_>) -> bool {
        match self {
            Clause::Namespace(namespace) => view.page.namespace == *namespace,
            Clause::NotRedirect => !view.page.is_redirect,
            Clause::HasParent => !view.revision.is_creation(),
            Clause::TimestampAtLeast(bound) => view.revision.timestamp >= *bound,
            Clause::TimestampBefore(bound) => view.revision.timestamp < *bound,
            Clause::CommentNotContaining(pattern) => !view
                .revision
                .comment
                .as_deref()
                .is_some_and(|comment| pattern.is_contained_in(comment)),
            Clause::ActorNotIn(actors) => !actors.contains(&view.actor.id),
        }
    }
}

fn quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    write!(f, "'{}'", value.replace('\'', "''"))
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Namespace(namespace) => write!(f, "page_namespace = {namespace}"),
            Clause::NotRedirect => write!(f, "page_is_redirect = 0"),
            Clause::HasParent => write!(f, "rev_parent_id != 0"),
            Clause::TimestampAtLeast(bound) => {
                write!(f, "rev_timestamp >= ")?;
                quoted(f, &timestamp(bound))
            }
            Clause::TimestampBefore(bound) => {
                write!(f, "rev_timestamp < ")?;
                quoted(f, &timestamp(bound))
            }
            Clause::CommentNotContaining(pattern) => {
                write!(f, "comment_text NOT LIKE ")?;
                quoted(f, &pattern.like_pattern())
            }
            Clause::ActorNotIn(actors) => {
                write!(f, "rev_actor NOT IN <{} automated actors>", actors.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Join {
    /// Inner join on category membership of the revision's page.
    CategoryLinks(CategoryKey),
}

impl Join {
    pub fn matches(&self, view: &RevisionView<'_>) -> bool {
        match self {
            Join::CategoryLinks(key) => view.in_category(key),
        }
    }
}

impl Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Join::CategoryLinks(key) => {
                write!(f, "JOIN categorylinks ON rev_page = cl_from AND cl_to = ")?;
                quoted(f, key.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
    joins: Vec<Join>,
}

impl Predicate {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Whether the revision passes every clause and join.
    pub fn matches(&self, view: &RevisionView<'_>) -> bool {
        self.joins.iter().all(|join| join.matches(view))
            && self.clauses.iter().all(|clause| clause.matches(view))
    }

    pub fn excludes_actors(&self) -> bool {
        self.clauses
            .iter()
            .any(|clause| matches!(clause, Clause::ActorNotIn(_)))
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for join in &self.joins {
            write!(f, "{join} ")?;
        }
        write!(f, "WHERE ")?;
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// Which actors' revisions a query takes into account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorScope {
    /// Every actor, automated ones included.
    All,
    /// Everyone except the given automated actors.
    ExcludeAutomated(Arc<FxHashSet<ActorId>>),
}

/// Per-request state from which the predicates of one report are built.
///
/// The category is resolved once when the builder is created, every call to
/// [`PredicateBuilder::build`] then produces an independent predicate.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    main_namespace: i32,
    lower_bound: Option<DateTime<Utc>>,
    upper_bound: Option<DateTime<Utc>>,
    category: Option<CategoryKey>,
    bulk_edit: CommentPattern,
}

impl PredicateBuilder {
    pub fn for_request<S: RevisionStore + ?Sized>(
        store: &S,
        params: &ReportParameters,
        main_namespace: i32,
        bulk_edit: &dyn BulkEditFilter,
    ) -> Result<Self, MalformedCategory> {
        let category = params
            .category_text()
            .map(|text| store.resolve_category_key(text))
            .transpose()?;

        Ok(Self {
            main_namespace,
            lower_bound: params.lower_bound(),
            upper_bound: params.upper_bound(),
            category,
            bulk_edit: CommentPattern::new(bulk_edit.signature()),
        })
    }

    pub fn category(&self) -> Option<&CategoryKey> {
        self.category.as_ref()
    }

    pub fn build(&self, actors: &ActorScope) -> Predicate {
        let mut clauses = vec![
            Clause::Namespace(self.main_namespace),
            Clause::NotRedirect,
            Clause::HasParent,
        ];
        if let Some(bound) = self.lower_bound {
            clauses.push(Clause::TimestampAtLeast(bound));
        }
        if let Some(bound) = self.upper_bound {
            clauses.push(Clause::TimestampBefore(bound));
        }
        clauses.push(Clause::CommentNotContaining(self.bulk_edit.clone()));
        if let ActorScope::ExcludeAutomated(automated) = actors {
            clauses.push(Clause::ActorNotIn(automated.clone()));
        }

        let joins = self
            .category
            .iter()
            .cloned()
            .map(Join::CategoryLinks)
            .collect();

        Predicate { clauses, joins }
    }
}
