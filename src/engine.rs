use std::{collections::BTreeSet, sync::Arc, thread};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use tracing::instrument;

use crate::{
    actors::ActorClassifier,
    bulk_edit::{BulkEditFilter, TemplateSignature},
    config::{ConfigError, ReportConfig},
    params::ReportParameters,
    predicate::{ActorScope, Predicate, PredicateBuilder},
    store::{MalformedCategory, PageId, RevisionStore, StoreError},
};

pub type EditorName = CompactString;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("malformed category: {input:?}")]
    MalformedCategory { input: String },
    #[error("revision store failure")]
    StoreUnavailable(#[from] StoreError),
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<MalformedCategory> for ReportError {
    fn from(err: MalformedCategory) -> Self {
        ReportError::MalformedCategory { input: err.input }
    }
}

/// Editors of the qualifying revisions, split by classification.
///
/// Both sets are ordered and disjoint, their union is the unfiltered editor set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorPartition {
    pub humans: BTreeSet<EditorName>,
    pub bots: BTreeSet<EditorName>,
}

/// A page with at least one qualifying update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedPage {
    pub page_id: PageId,
    pub title: CompactString,
    /// Timestamp of the latest qualifying revision.
    pub last_revision: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub updated_pages: u64,
    /// Only present if the debug breakdown was requested.
    pub editors: Option<EditorPartition>,
}

/// Runs article update reports against a [`RevisionStore`].
///
/// The engine keeps no state between calls. Every operation resolves its
/// parameters, builds new predicates and issues independent reads.
#[derive(Debug)]
pub struct ReportEngine<S> {
    store: S,
    main_namespace: i32,
    classifier: ActorClassifier,
    bulk_edit: Box<dyn BulkEditFilter>,
}

impl<S: RevisionStore> ReportEngine<S> {
    pub fn new(store: S, config: &ReportConfig) -> Result<Self, ConfigError> {
        let bulk_edit = TemplateSignature::from_template(&config.bulk_edit_template)?;
        Ok(Self::with_bulk_edit_filter(store, config, Box::new(bulk_edit)))
    }

    /// Use a custom way of recognizing bulk edits instead of the configured template.
    pub fn with_bulk_edit_filter(
        store: S,
        config: &ReportConfig,
        bulk_edit: Box<dyn BulkEditFilter>,
    ) -> Self {
        Self {
            store,
            main_namespace: config.main_namespace,
            classifier: ActorClassifier::new(&config.automation_groups),
            bulk_edit,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bulk_edit_signature(&self) -> &str {
        self.bulk_edit.signature()
    }

    fn predicate_builder(
        &self,
        params: &ReportParameters,
    ) -> Result<PredicateBuilder, ReportError> {
        Ok(PredicateBuilder::for_request(
            &self.store,
            params,
            self.main_namespace,
            self.bulk_edit.as_ref(),
        )?)
    }

    fn human_scope(&self) -> Result<ActorScope, ReportError> {
        let automated = self.classifier.automated_actor_ids(&self.store)?;
        Ok(ActorScope::ExcludeAutomated(Arc::new(automated)))
    }

    fn select_editor_names(
        &self,
        predicate: &Predicate,
    ) -> Result<BTreeSet<EditorName>, ReportError> {
        tracing::debug!(%predicate, "selecting editors");
        let rows = self.store.select_revisions(predicate)?;
        Ok(rows.into_iter().map(|row| row.actor_name).collect())
    }

    /// Number of distinct pages with at least one genuine human update.
    #[instrument(skip(self))]
    pub fn count_distinct_updated_pages(
        &self,
        params: &ReportParameters,
    ) -> Result<u64, ReportError> {
        let builder = self.predicate_builder(params)?;
        let predicate = builder.build(&self.human_scope()?);
        tracing::debug!(%predicate, "counting updated pages");

        let count = self.store.count_distinct_pages(&predicate)?;
        u64::try_from(count).map_err(|_| {
            tracing::error!(count, %predicate, "store returned a negative page count");
            ReportError::InvariantViolation(format!("negative page count {count}"))
        })
    }

    /// Ordered, deduplicated names of the editors of qualifying revisions.
    ///
    /// With `exclude_bots` unset, revisions of automated actors are included.
    #[instrument(skip(self))]
    pub fn distinct_editors(
        &self,
        params: &ReportParameters,
        exclude_bots: bool,
    ) -> Result<BTreeSet<EditorName>, ReportError> {
        let builder = self.predicate_builder(params)?;
        let scope = if exclude_bots {
            self.human_scope()?
        } else {
            ActorScope::All
        };
        self.select_editor_names(&builder.build(&scope))
    }

    /// Split all editors of qualifying revisions into humans and bots.
    #[instrument(skip(self))]
    pub fn partition_editors(
        &self,
        params: &ReportParameters,
    ) -> Result<EditorPartition, ReportError> {
        let predicate = self.predicate_builder(params)?.build(&ActorScope::All);

        // the two reads are independent of each other
        let (editors, automated) = thread::scope(|scope| {
            let automated = scope.spawn(|| self.classifier.automated_actor_names(&self.store));
            let editors = self.select_editor_names(&predicate);
            let automated = automated
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            (editors, automated)
        });
        let (editors, automated) = (editors?, automated?);

        let (bots, humans) = editors
            .into_iter()
            .partition(|editor| automated.contains(editor));
        Ok(EditorPartition { humans, bots })
    }

    /// Pages with a genuine human update and the time of their latest such
    /// update, ordered by title.
    #[instrument(skip(self))]
    pub fn updated_pages(
        &self,
        params: &ReportParameters,
    ) -> Result<Vec<UpdatedPage>, ReportError> {
        let builder = self.predicate_builder(params)?;
        let predicate = builder.build(&self.human_scope()?);
        tracing::debug!(%predicate, "listing updated pages");

        let mut pages: FxHashMap<PageId, UpdatedPage> = FxHashMap::default();
        for row in self.store.select_revisions(&predicate)? {
            pages
                .entry(row.page_id)
                .and_modify(|page| page.last_revision = page.last_revision.max(row.timestamp))
                .or_insert_with(|| UpdatedPage {
                    page_id: row.page_id,
                    title: row.page_title,
                    last_revision: row.timestamp,
                });
        }

        let mut pages: Vec<UpdatedPage> = pages.into_values().collect();
        pages.sort_by(|a, b| a.title.cmp(&b.title).then(a.page_id.cmp(&b.page_id)));
        Ok(pages)
    }

    /// Run a complete report: the update count and, if requested, the editor breakdown.
    #[instrument(skip(self))]
    pub fn run(&self, params: &ReportParameters) -> Result<ReportOutcome, ReportError> {
        let updated_pages = self.count_distinct_updated_pages(params)?;
        let editors = if params.include_debug_breakdown {
            Some(self.partition_editors(params)?)
        } else {
            None
        };
        Ok(ReportOutcome {
            updated_pages,
            editors,
        })
    }
}
