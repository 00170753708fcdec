use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use compact_str::CompactString;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;

use crate::{
    config::DEFAULT_AUTOMATION_GROUP,
    dump_parser::{Contributor, Page, Revision, Text},
    store::{
        normalize_category_key, ActorRecord, InMemoryStore, PageId, PageRecord, RevisionRecord,
        RevisionView,
    },
};

pub mod prelude {
    pub(crate) use super::proptest as proptest_support;
    pub(crate) use super::{
        actor, date, dummy_revision, dump_revision, dump_xml, hidden_user, main_page, scenario_store,
        ts, user, view, StoreBuilder,
    };
    pub(crate) use proptest::prelude::*;
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn ts(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .unwrap()
}

pub fn dummy_revision() -> RevisionRecord {
    RevisionRecord {
        id: 0,
        parent_id: None,
        timestamp: ts(1970, 1, 1, 0, 0, 0),
        page_id: 0,
        actor_id: 0,
        comment: None,
    }
}

pub fn main_page(id: PageId, title: &str) -> PageRecord {
    PageRecord {
        id,
        namespace: 0,
        title: title.into(),
        is_redirect: false,
    }
}

pub fn actor(id: i32, name: &str) -> ActorRecord {
    ActorRecord {
        id,
        name: name.into(),
        user_id: Some(id),
    }
}

pub fn view<'a>(
    revision: &'a RevisionRecord,
    page: &'a PageRecord,
    actor: &'a ActorRecord,
) -> RevisionView<'a> {
    RevisionView {
        revision,
        page,
        actor,
        categories: None,
    }
}

/// Assembles an [`InMemoryStore`] revision by revision.
#[derive(Debug)]
pub struct StoreBuilder {
    store: InMemoryStore,
    next_revision: i32,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            store: InMemoryStore::new(),
            // revision ids start high so that parent ids are never 0
            next_revision: 100,
        }
    }

    pub fn page(&mut self, id: PageId, title: &str) -> &mut Self {
        self.store.insert_page(main_page(id, title));
        self
    }

    pub fn page_in_namespace(&mut self, id: PageId, namespace: i32, title: &str) -> &mut Self {
        self.store.insert_page(PageRecord {
            namespace,
            ..main_page(id, title)
        });
        self
    }

    pub fn redirect(&mut self, id: PageId, title: &str) -> &mut Self {
        self.store.insert_page(PageRecord {
            is_redirect: true,
            ..main_page(id, title)
        });
        self
    }

    pub fn categorize(&mut self, page: PageId, category: &str) -> &mut Self {
        let key = normalize_category_key(category, &[]).unwrap();
        self.store.add_category_link(page, key);
        self
    }

    pub fn human(&mut self, name: &str) -> &mut Self {
        self.store.ensure_actor(name, None);
        self
    }

    pub fn bot(&mut self, name: &str) -> &mut Self {
        let id = self.store.ensure_actor(name, None);
        self.store
            .add_group_membership(id, DEFAULT_AUTOMATION_GROUP)
            .unwrap();
        self
    }

    fn revision(
        &mut self,
        page: PageId,
        actor: &str,
        timestamp: DateTime<Utc>,
        comment: &str,
        is_creation: bool,
    ) -> &mut Self {
        let id = self.next_revision;
        self.next_revision += 1;
        let actor_id = self.store.actor_id_by_name(actor).unwrap();
        self.store
            .insert_revision(RevisionRecord {
                id,
                parent_id: if is_creation { None } else { Some(id - 1) },
                timestamp,
                page_id: page,
                actor_id,
                comment: Some(CompactString::from(comment)),
            })
            .unwrap();
        self
    }

    pub fn update(
        &mut self,
        page: PageId,
        actor: &str,
        timestamp: DateTime<Utc>,
        comment: &str,
    ) -> &mut Self {
        self.revision(page, actor, timestamp, comment, false)
    }

    pub fn creation(
        &mut self,
        page: PageId,
        actor: &str,
        timestamp: DateTime<Utc>,
        comment: &str,
    ) -> &mut Self {
        self.revision(page, actor, timestamp, comment, true)
    }

    pub fn build(self) -> InMemoryStore {
        self.store
    }
}

/// Alice updates page 1, Bot1 updates it again, Alice creates page 2.
/// `comment` is the summary of Alice's update.
pub fn scenario_store(comment: &str) -> InMemoryStore {
    let mut builder = StoreBuilder::new();
    builder.page(1, "Page one").page(2, "Page two");
    builder.human("Alice").bot("Bot1");
    builder
        .update(1, "Alice", ts(2024, 1, 5, 10, 0, 0), comment)
        .update(1, "Bot1", ts(2024, 1, 6, 10, 0, 0), "fix typo")
        .creation(2, "Alice", ts(2024, 1, 5, 11, 0, 0), "new page");
    builder.build()
}

pub mod proptest {
    use proptest::prelude::*;

    use super::{ts, StoreBuilder};
    use crate::store::InMemoryStore;

    const EDITORS: &[(&str, bool)] = &[
        ("Alice", false),
        ("Bob", false),
        ("Carol", false),
        ("Bot1", true),
        ("Bot2", true),
    ];
    const PAGES: i32 = 6;

    #[derive(Debug, Clone)]
    pub struct Edit {
        page: i32,
        editor: usize,
        // days after 2023-12-20
        day: u32,
        is_creation: bool,
        is_bulk: bool,
    }

    /// Random revision history around January 2024.
    #[derive(Debug, Clone)]
    pub struct History {
        edits: Vec<Edit>,
    }

    impl History {
        pub fn build(&self) -> InMemoryStore {
            let mut builder = StoreBuilder::new();
            for page in 1..=PAGES {
                builder.page(page, &format!("Page {page}"));
            }
            for (name, is_bot) in EDITORS {
                if *is_bot {
                    builder.bot(name);
                } else {
                    builder.human(name);
                }
            }

            let start = ts(2023, 12, 20, 12, 0, 0);
            for edit in &self.edits {
                let timestamp = start + chrono::TimeDelta::days(i64::from(edit.day));
                let comment = if edit.is_bulk {
                    "Text replacement - \"x\" to \"y\""
                } else {
                    "copyedit"
                };
                let editor = EDITORS[edit.editor].0;
                if edit.is_creation {
                    builder.creation(edit.page, editor, timestamp, comment);
                } else {
                    builder.update(edit.page, editor, timestamp, comment);
                }
            }
            builder.build()
        }

        /// Number of pages touched by any edit.
        pub fn updated_page_upper_bound(&self) -> u64 {
            let mut pages: Vec<i32> = self.edits.iter().map(|edit| edit.page).collect();
            pages.sort_unstable();
            pages.dedup();
            pages.len() as u64
        }
    }

    fn edit() -> impl Strategy<Value = Edit> {
        (
            1..=PAGES,
            0..EDITORS.len(),
            0u32..60,
            prop::bool::weighted(0.2),
            prop::bool::weighted(0.2),
        )
            .prop_map(|(page, editor, day, is_creation, is_bulk)| Edit {
                page,
                editor,
                day,
                is_creation,
                is_bulk,
            })
    }

    pub fn history() -> impl Strategy<Value = History> {
        prop::collection::vec(edit(), 0..40).prop_map(|edits| History { edits })
    }
}

fn write_text_element<W: std::io::Write>(writer: &mut quick_xml::Writer<W>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .unwrap();
    writer.write_event(Event::End(BytesEnd::new(tag))).unwrap();
}

/// Serialize `pages` as a complete export dump, including a `siteinfo` block
/// that names the category namespace `Kategorie`.
pub fn dump_xml(pages: &[Page]) -> String {
    // Source: https://github.com/mediawiki-utilities/python-mwtypes/blob/523a93f98fe1372938fc15872b5abb1f267cc643/mwtypes/timestamp.py#L12
    const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";

    let mut xml = Vec::new();
    let mut writer = quick_xml::Writer::new(Cursor::new(&mut xml));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .unwrap();
    writer
        .write_event(Event::Start(
            BytesStart::new("mediawiki").with_attributes([("version", "0.11")]),
        ))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("siteinfo")))
        .unwrap();
    write_text_element(&mut writer, "dbname", "testwiki");
    writer
        .write_event(Event::Start(BytesStart::new("namespaces")))
        .unwrap();
    writer
        .write_event(Event::Empty(
            BytesStart::new("namespace").with_attributes([("key", "0")]),
        ))
        .unwrap();
    for (key, name) in [("1", "Diskussion"), ("14", "Kategorie")] {
        writer
            .write_event(Event::Start(
                BytesStart::new("namespace").with_attributes([("key", key)]),
            ))
            .unwrap();
        writer
            .write_event(Event::Text(BytesText::new(name)))
            .unwrap();
        writer
            .write_event(Event::End(BytesEnd::new("namespace")))
            .unwrap();
    }
    writer
        .write_event(Event::End(BytesEnd::new("namespaces")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("siteinfo")))
        .unwrap();

    for page in pages {
        writer
            .write_event(Event::Start(BytesStart::new("page")))
            .unwrap();
        write_text_element(&mut writer, "title", &page.title);
        write_text_element(&mut writer, "ns", &page.namespace.to_string());
        write_text_element(&mut writer, "id", &page.id.to_string());
        if page.is_redirect {
            writer
                .write_event(Event::Empty(
                    BytesStart::new("redirect").with_attributes([("title", "Target")]),
                ))
                .unwrap();
        }

        for revision in &page.revisions {
            writer
                .write_event(Event::Start(BytesStart::new("revision")))
                .unwrap();
            write_text_element(&mut writer, "id", &revision.id.to_string());
            if let Some(parent_id) = revision.parent_id {
                write_text_element(&mut writer, "parentid", &parent_id.to_string());
            }
            write_text_element(
                &mut writer,
                "timestamp",
                &revision.timestamp.format(TIMESTAMP_FORMAT_LONG).to_string(),
            );

            match (&revision.contributor.username, revision.contributor.id) {
                (Some(username), id) => {
                    writer
                        .write_event(Event::Start(BytesStart::new("contributor")))
                        .unwrap();
                    match id {
                        Some(id) => {
                            write_text_element(&mut writer, "username", username);
                            write_text_element(&mut writer, "id", &id.to_string());
                        }
                        None => write_text_element(&mut writer, "ip", username),
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new("contributor")))
                        .unwrap();
                }
                (None, _) => {
                    writer
                        .write_event(Event::Empty(
                            BytesStart::new("contributor").with_attributes([("deleted", "deleted")]),
                        ))
                        .unwrap();
                }
            }

            if let Some(comment) = &revision.comment {
                write_text_element(&mut writer, "comment", comment);
            }

            match &revision.text {
                Text::Normal(text) => write_text_element(&mut writer, "text", text),
                Text::Deleted => {
                    writer
                        .write_event(Event::Empty(
                            BytesStart::new("text").with_attributes([("deleted", "deleted")]),
                        ))
                        .unwrap();
                }
            }

            writer
                .write_event(Event::End(BytesEnd::new("revision")))
                .unwrap();
        }

        writer
            .write_event(Event::End(BytesEnd::new("page")))
            .unwrap();
    }

    writer
        .write_event(Event::End(BytesEnd::new("mediawiki")))
        .unwrap();

    String::from_utf8(xml).unwrap()
}

pub fn dump_revision(
    id: i32,
    parent_id: Option<i32>,
    timestamp: DateTime<Utc>,
    contributor: Contributor,
    comment: &str,
    text: &str,
) -> Revision {
    Revision {
        id,
        parent_id,
        timestamp,
        contributor,
        text: Text::Normal(text.to_owned()),
        comment: Some(comment.into()),
    }
}

pub fn hidden_user() -> Contributor {
    Contributor {
        username: None,
        id: None,
    }
}

pub fn user(name: &str, id: i32) -> Contributor {
    Contributor {
        username: Some(name.into()),
        id: Some(id),
    }
}
