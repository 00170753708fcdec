use std::{
    any::type_name_of_val,
    collections::HashMap,
    convert::Infallible,
    fmt::Debug,
    io::{BufRead, Read},
    sync::{Arc, LazyLock},
};

use compact_str::CompactString;
use quick_xml::events::{BytesEnd, BytesStart};
use rand::Rng;
use regex::Regex;
use tracing::instrument;

use crate::{
    config::CATEGORY_NAMESPACE,
    store::{
        normalize_category_key, CategoryKey, InMemoryStore, PageRecord, RevisionRecord,
        StoreError,
    },
};

// we normally don't retrieve the value of the tags, so this is the most efficient backend
type TagStringInterner = string_interner::StringInterner<string_interner::backend::BucketBackend>;

// list of all tags that are relevant for the report
// i.e. the tags of which we need a value and their parent tags
#[derive(PartialEq, Eq)]
enum Tag {
    MediaWiki,  // <mediawiki version="0.11" ...other attributes>...</mediawiki> is the root tag
    SiteInfo, // <siteinfo><dbname>...</dbname><namespaces>...</namespaces> ...other tags</siteinfo>
    DbName,   // <dbname>dewiktionary</dbname>
    Namespaces, // <namespaces><namespace key="0" /> ...more namespace tags</namespaces>
    Namespace(String), // <namespace key="1">Diskussion</namespace>
    Page,     // <page>...tags are (title, ns, id, redirect, revision)</page>
    Title,    // <title>blah</title>
    Ns,       // <ns>0</ns>
    Id,       // <id>500</id>
    Redirect, // <redirect title="Target" />
    Revision, // <revision>...tags are (id, parentid, timestamp, contributor, comment, text)</revision>
    ParentId, // <parentid>499</parentid>
    Timestamp, // <timestamp>2003-12-05T06:41:50Z</timestamp>
    Contributor, // <contributor><username>blah</username><id>500</id></contributor> or <contributor><ip>127.0.0.1</ip></contributor>
    Username, // <username>blah</username>
    Ip,       // <ip>127.0.0.1</ip>
    Comment,  // <comment>blah</comment>
    Text(bool), // <text bytes="20">blah</text> or <text bytes="20" deleted="deleted" />
    Unknown(string_interner::DefaultSymbol), // any other tag
}

impl Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::MediaWiki => write!(f, "<mediawiki>"),
            Tag::SiteInfo => write!(f, "<siteinfo>"),
            Tag::DbName => write!(f, "<dbname>"),
            Tag::Namespaces => write!(f, "<namespaces>"),
            Tag::Namespace(key) => write!(f, "<namespace key={}>", key),
            Tag::Page => write!(f, "<page>"),
            Tag::Title => write!(f, "<title>"),
            Tag::Ns => write!(f, "<ns>"),
            Tag::Id => write!(f, "<id>"),
            Tag::Redirect => write!(f, "<redirect>"),
            Tag::Revision => write!(f, "<revision>"),
            Tag::ParentId => write!(f, "<parentid>"),
            Tag::Timestamp => write!(f, "<timestamp>"),
            Tag::Contributor => write!(f, "<contributor>"),
            Tag::Username => write!(f, "<username>"),
            Tag::Ip => write!(f, "<ip>"),
            Tag::Comment => write!(f, "<comment>"),
            Tag::Text(deleted) => {
                if *deleted {
                    write!(f, "<text deleted>")
                } else {
                    write!(f, "<text>")
                }
            }
            Tag::Unknown(tag) => write!(f, "<unknown tag - interned symbol: {:?}>", tag),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum TagReadingError<T> {
    /// Error returned to indicate that the input is not valid UTF-8.
    ///
    /// Allows continuing to parse the XML file, but this may lead to incorrect results if there is more than one distinct non-UTF-8 tag.
    #[error("non-UTF-8 tag detected")]
    NonUtf8Tag(T),
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("missing expected attribute `{0}` for tag `{1}`")]
    MissingAttribute(&'static str, &'static str),
}

#[derive(Debug)]
struct NonUtf8Tag<T>(T);

impl Tag {
    fn from_start_bytes(
        e: &BytesStart,
        tag_interner: &mut TagStringInterner,
    ) -> Result<Self, TagReadingError<Tag>> {
        match e.name().as_ref() {
            b"mediawiki" => Ok(Tag::MediaWiki),
            b"siteinfo" => Ok(Tag::SiteInfo),
            b"dbname" => Ok(Tag::DbName),
            b"namespaces" => Ok(Tag::Namespaces),
            b"namespace" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;

                    if attr.key.as_ref() == b"key" {
                        let key = attr.unescape_value()?;
                        return Ok(Tag::Namespace(key.into_owned()));
                    }
                }

                Err(TagReadingError::MissingAttribute("key", "namespace"))
            }
            b"page" => Ok(Tag::Page),
            b"title" => Ok(Tag::Title),
            b"ns" => Ok(Tag::Ns),
            b"id" => Ok(Tag::Id),
            b"redirect" => Ok(Tag::Redirect),
            b"revision" => Ok(Tag::Revision),
            b"parentid" => Ok(Tag::ParentId),
            b"timestamp" => Ok(Tag::Timestamp),
            b"contributor" => Ok(Tag::Contributor),
            b"username" => Ok(Tag::Username),
            b"ip" => Ok(Tag::Ip),
            b"comment" => Ok(Tag::Comment),
            b"text" => {
                let mut deleted = false;

                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_ref() == b"deleted" {
                        deleted = true;
                    }
                }

                Ok(Tag::Text(deleted))
            }
            _ => {
                let name = e.name().into_inner();

                if let Ok(name) = std::str::from_utf8(name) {
                    Ok(Tag::Unknown(tag_interner.get_or_intern(name)))
                } else {
                    Err(TagReadingError::NonUtf8Tag(Tag::Unknown(
                        tag_interner.get_or_intern("non-utf8 tag"),
                    )))
                }
            }
        }
    }

    fn matches_end_bytes(
        &self,
        e: &quick_xml::events::BytesEnd,
        tag_interner: &mut TagStringInterner,
    ) -> Result<bool, NonUtf8Tag<bool>> {
        match (self, e.name().as_ref()) {
            (Tag::MediaWiki, b"mediawiki") => Ok(true),
            (Tag::SiteInfo, b"siteinfo") => Ok(true),
            (Tag::DbName, b"dbname") => Ok(true),
            (Tag::Namespaces, b"namespaces") => Ok(true),
            (Tag::Namespace(_), b"namespace") => Ok(true),
            (Tag::Page, b"page") => Ok(true),
            (Tag::Title, b"title") => Ok(true),
            (Tag::Ns, b"ns") => Ok(true),
            (Tag::Id, b"id") => Ok(true),
            (Tag::Redirect, b"redirect") => Ok(true),
            (Tag::Revision, b"revision") => Ok(true),
            (Tag::ParentId, b"parentid") => Ok(true),
            (Tag::Timestamp, b"timestamp") => Ok(true),
            (Tag::Contributor, b"contributor") => Ok(true),
            (Tag::Username, b"username") => Ok(true),
            (Tag::Ip, b"ip") => Ok(true),
            (Tag::Comment, b"comment") => Ok(true),
            (Tag::Text(_), b"text") => Ok(true),
            (Tag::Unknown(expected_tag), tag_name) => {
                if let Ok(tag) = std::str::from_utf8(tag_name) {
                    let tag = tag_interner.get_or_intern(tag);
                    Ok(tag == *expected_tag)
                } else {
                    let tag = tag_interner.get_or_intern("non-utf8 tag");
                    Err(NonUtf8Tag(tag == *expected_tag))
                }
            }
            _ => Ok(false),
        }
    }
}

/// Actor name under which revisions with a hidden contributor are stored.
///
/// `<` can't appear in user names, so no real account collides with it.
pub const HIDDEN_CONTRIBUTOR: &str = "<hidden contributor>";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contributor {
    // IP address for anonymous edits, None if the contributor was hidden
    pub username: Option<CompactString>,
    pub id: Option<i32>,
}

impl Contributor {
    /// Name of the actor the revision is attributed to.
    pub fn actor_name(&self) -> &str {
        self.username.as_deref().unwrap_or(HIDDEN_CONTRIBUTOR)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Text {
    Normal(String),
    Deleted,
}

impl Text {
    pub fn as_str(&self) -> &str {
        match self {
            Text::Normal(text) => text,
            Text::Deleted => "",
        }
    }
}

impl Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Text::Normal(text) => write!(f, "{:?}", text),
            Text::Deleted => write!(f, "Deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    pub id: i32,
    // missing for the revision that created the page
    pub parent_id: Option<i32>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    // aka. user
    pub contributor: Contributor,
    pub text: Text,
    pub comment: Option<CompactString>,
}

#[derive(Debug)]
struct RevisionBuilder {
    id: Option<i32>,
    parent_id: Option<i32>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    contributor_name: Option<CompactString>,
    contributor_id: Option<i32>,
    // a <contributor> element was present, possibly empty
    has_contributor: bool,
    text: Option<Text>,
    comment: Option<CompactString>,
}

#[derive(Debug, thiserror::Error)]
#[error("missing mandatory field: {0}")]
struct BuildRevisionError(&'static str, Box<RevisionBuilder>);

impl RevisionBuilder {
    fn new() -> Self {
        Self {
            id: None,
            parent_id: None,
            timestamp: None,
            contributor_name: None,
            contributor_id: None,
            has_contributor: false,
            text: None,
            comment: None,
        }
    }

    fn try_build(self) -> Result<Revision, BuildRevisionError> {
        let Some(id) = self.id else {
            return Err(BuildRevisionError("id", self.into()));
        };
        let Some(timestamp) = self.timestamp else {
            return Err(BuildRevisionError("timestamp", self.into()));
        };
        // hidden contributors have an empty <contributor deleted="deleted" />
        if self.contributor_name.is_none() && !self.has_contributor {
            return Err(BuildRevisionError("contributor", self.into()));
        }

        Ok(Revision {
            id,
            parent_id: self.parent_id,
            timestamp,
            contributor: Contributor {
                username: self.contributor_name,
                id: self.contributor_id,
            },
            // text is only used for category links, a missing text has none
            text: self.text.unwrap_or(Text::Deleted),
            comment: self.comment,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Page {
    pub id: i32,
    // without the namespace prefix
    pub title: CompactString,
    pub namespace: i32,
    pub is_redirect: bool,
    pub revisions: Vec<Revision>,
}

impl Page {
    /// The revision with the latest timestamp, i.e. the current page content.
    pub fn latest_revision(&self) -> Option<&Revision> {
        self.revisions.iter().max_by_key(|revision| revision.timestamp)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Default,
    Named(CompactString),
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Default => write!(f, "Default"),
            Namespace::Named(name) => write!(f, "{:?}", name),
        }
    }
}

#[derive(Debug)]
pub struct SiteInfo {
    pub dbname: CompactString,
    pub namespaces: HashMap<i32, Namespace>,
}

impl SiteInfo {
    pub fn namespace_name(&self, key: i32) -> Option<&str> {
        match self.namespaces.get(&key) {
            Some(Namespace::Named(name)) => Some(name),
            _ => None,
        }
    }
}

pub struct DumpParser<R: BufRead> {
    tag_interner: TagStringInterner,
    xml_parser: quick_xml::Reader<R>,
    buf: Vec<u8>,
    current_path: Vec<Tag>,
    site_info: SiteInfo,
    non_utf8_reporter: NonUtf8Reporter,
}

impl<R: BufRead> Debug for DumpParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpParser")
            .field("tag_interner", &type_name_of_val(&self.tag_interner))
            .field("xml_parser", &type_name_of_val(&self.xml_parser))
            // print buffer length and capacity
            .field("buf.len", &self.buf.len())
            .field("buf.capacity", &self.buf.capacity())
            .field("current_path", &self.current_path)
            .field("site_info", &self.site_info)
            .finish()
    }
}

#[derive(Debug)]
struct NonUtf8Reporter {
    num_tags: usize,
}

impl NonUtf8Reporter {
    fn new() -> Self {
        Self { num_tags: 0 }
    }

    fn register(&mut self, name: &[u8]) {
        self.num_tags += 1;

        if self.num_tags == 1 {
            tracing::warn!(message = "Non-UTF-8 tag in XML detected. This is not expected. Parsing will continue, but the results may be incorrect. Further non-UTF-8 tags will not be reported.", name = String::from_utf8_lossy(name).as_ref());
        }
    }

    fn tag_from_start_bytes(
        &mut self,
        e: &BytesStart,
        tag_interner: &mut TagStringInterner,
    ) -> Result<Tag, TagReadingError<Infallible>> {
        match Tag::from_start_bytes(e, tag_interner) {
            Ok(tag) => Ok(tag),
            Err(TagReadingError::NonUtf8Tag(tag)) => {
                self.register(e.name().as_ref());
                Ok(tag)
            }
            Err(TagReadingError::XmlError(e)) => Err(TagReadingError::XmlError(e)),
            Err(TagReadingError::MissingAttribute(att, tag)) => {
                Err(TagReadingError::MissingAttribute(att, tag))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("unexpected end of file")]
    Eof,
    #[error("revision store rejected dump content")]
    Store(#[from] StoreError),
}

/// Counters reported after loading a dump into a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub pages: usize,
    pub revisions: usize,
    pub category_links: usize,
}

// [[Category:Name]] or [[Category:Name|sort key]], prefix checked separately
static CATEGORY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[\s*([^\[\]|:]+?)\s*:\s*([^\[\]|]+?)\s*(?:\|[^\[\]]*)?\]\]")
        .expect("category link regex is valid")
});

/// Categories linked from `text`, normalized and deduplicated.
///
/// Only links whose namespace prefix is one of `namespace_aliases` count.
/// Links with an invalid title are skipped.
pub fn extract_category_links(
    text: &str,
    namespace_aliases: &[CompactString],
) -> Vec<CategoryKey> {
    let mut keys: Vec<CategoryKey> = CATEGORY_LINK
        .captures_iter(text)
        .filter(|captures| {
            let prefix = captures[1].replace('_', " ");
            namespace_aliases
                .iter()
                .any(|alias| alias.replace('_', " ").eq_ignore_ascii_case(&prefix))
        })
        .filter_map(|captures| match normalize_category_key(&captures[2], &[]) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::debug!(message = "Skipping invalid category link", input = err.input.as_str());
                None
            }
        })
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

impl<R: BufRead> DumpParser<R> {
    pub fn new(reader: R) -> Result<Self, ParsingError> {
        let xml_parser = quick_xml::Reader::from_reader(reader);
        // expand_empty_elements not set, take care to handle empty elements!

        let mut new = Self {
            tag_interner: TagStringInterner::new(),
            xml_parser,
            // preallocate 1 MiB for the buffer
            buf: Vec::with_capacity(1024 * 1024),
            current_path: Vec::new(),
            site_info: SiteInfo {
                dbname: CompactString::default(),
                namespaces: HashMap::new(),
            },
            non_utf8_reporter: NonUtf8Reporter::new(),
        };

        new.parse_site_info()?;

        Ok(new)
    }

    pub fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }

    /// Parse the remaining pages of the dump into `store`.
    ///
    /// The localized name of the category namespace is registered as an
    /// alias, category links are taken from the latest revision of each page.
    #[instrument(skip_all)]
    pub fn load_into(&mut self, store: &mut InMemoryStore) -> Result<LoadSummary, ParsingError> {
        if let Some(name) = self.site_info.namespace_name(CATEGORY_NAMESPACE) {
            store.add_category_namespace_alias(name);
        }
        let aliases = store.category_namespace_aliases().to_vec();

        let mut summary = LoadSummary::default();
        while let Some(page) = self.parse_page()? {
            store.insert_page(PageRecord {
                id: page.id,
                namespace: page.namespace,
                title: page.title.clone(),
                is_redirect: page.is_redirect,
            });
            summary.pages += 1;

            if let Some(latest) = page.latest_revision() {
                for key in extract_category_links(latest.text.as_str(), &aliases) {
                    store.add_category_link(page.id, key);
                    summary.category_links += 1;
                }
            }

            for revision in page.revisions {
                let actor_id =
                    store.ensure_actor(revision.contributor.actor_name(), revision.contributor.id);
                store.insert_revision(RevisionRecord {
                    id: revision.id,
                    parent_id: revision.parent_id,
                    timestamp: revision.timestamp,
                    page_id: page.id,
                    actor_id,
                    comment: revision.comment,
                })?;
                summary.revisions += 1;
            }
        }

        tracing::info!(
            pages = summary.pages,
            revisions = summary.revisions,
            category_links = summary.category_links,
            "dump loaded"
        );
        Ok(summary)
    }

    #[instrument]
    fn parse_start_bytes(
        e: &BytesStart,
        expecting_namespace: bool,

        // unfortunately have to pass all these as arguments, because otherwise we get problems with the borrow checker
        non_utf8_reporter: &mut NonUtf8Reporter,
        tag_interner: &mut TagStringInterner,
        current_path: &[Tag],
    ) -> Result<Tag, quick_xml::Error> {
        match non_utf8_reporter.tag_from_start_bytes(e, tag_interner) {
            Ok(tag) => Ok(tag),
            Err(TagReadingError::MissingAttribute(attr, tag)) => {
                // `namespace` is the only tag with a mandatory attribute
                if expecting_namespace {
                    tracing::warn!(
                        message = "missing expected attribute, ignoring the namespace",
                        attribute = attr,
                        tag = tag
                    );
                } else {
                    tracing::info!(
                        message = "found known tag in unexpected location",
                        tag = ?tag,
                        path = ?current_path
                    );
                }
                Ok(Tag::Namespace("ignored".to_string()))
            }
            Err(TagReadingError::XmlError(e)) => Err(e),
            Err(TagReadingError::NonUtf8Tag(never)) => match never {},
        }
    }

    // debugging aid for format changes
    fn check_known_tags_in_unexpected_location(&self, is_empty: bool) {
        let Some(tag) = self.current_path.last() else {
            return;
        };

        if !matches!(tag, Tag::Unknown(_)) {
            tracing::info!(
                message = "found known tag in unexpected location",
                tag = ?tag,
                path = ?self.current_path,
                is_empty
            );
        }
    }

    fn abort_parsing<T>(xml_parser: &mut quick_xml::Reader<R>) -> Result<T, ParsingError> {
        tracing::error!("Aborting parsing due to error");
        let mut useless_buf = [0];
        xml_parser
            .stream()
            .take(u64::MAX)
            .read(&mut useless_buf)
            .map_err(|e| quick_xml::Error::Io(Arc::new(e)))?;
        Err(ParsingError::Eof)
    }

    fn check_end_tag(
        e: &BytesEnd,
        current_path: &mut Vec<Tag>,
        tag_interner: &mut TagStringInterner,
        xml_parser: &mut quick_xml::Reader<R>,
    ) -> Result<Option<Tag>, ParsingError> {
        // error handling for mismatched tags
        let tag = if let Some(tag) = current_path.pop() {
            tag
        } else {
            let tag = String::from_utf8_lossy(e.name().into_inner());
            tracing::error!(message = "Unexpected end tag", tag = tag.as_ref(), current_path = ?current_path, position = xml_parser.buffer_position());

            if cfg!(feature = "strict") {
                return Self::abort_parsing(xml_parser);
            } else {
                tracing::warn!("Ignoring unexpected end tag. This may lead to incorrect results.");
                return Ok(None);
            }
        };

        // ignore non-utf8 error here because we already reported it when the tag was read
        //  (or it will not match the opening tag and we will report that anyway)
        let matches = tag
            .matches_end_bytes(e, tag_interner)
            .unwrap_or_else(|e| e.0);
        if !matches {
            tracing::error!(
                message = "Mismatched tags",
                expected = ?tag,
                actual = String::from_utf8_lossy(e.name().as_ref()).as_ref(),
                current_path = ?current_path,
                position = xml_parser.buffer_position()
            );

            if cfg!(feature = "strict") {
                return Self::abort_parsing(xml_parser);
            } else {
                // we can't tell a stray closing tag from a typo or an unclosed
                // opening tag, so just continue
                tracing::warn!("Ignoring mismatched tag. This may lead to incorrect results.");
            }
        }

        Ok(Some(tag))
    }

    #[instrument]
    fn parse_site_info(&mut self) -> Result<(), ParsingError> {
        let mut site_info = SiteInfo {
            dbname: CompactString::default(),
            namespaces: HashMap::new(),
        };

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                quick_xml::events::Event::Start(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        true,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    self.current_path.push(tag);
                }
                quick_xml::events::Event::Empty(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        true,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    use Tag::*;

                    self.current_path.push(tag);
                    match self.current_path.as_slice() {
                        [MediaWiki, SiteInfo, Namespaces, Namespace(id)] => {
                            if let Ok(key) = id.parse() {
                                site_info.namespaces.insert(key, self::Namespace::Default);
                            } else {
                                tracing::warn!(
                                    message = "Ignoring namespace with invalid id",
                                    id,
                                    position = self.xml_parser.buffer_position()
                                );
                            }
                        }
                        _ => self.check_known_tags_in_unexpected_location(true),
                    }
                    self.current_path.pop();
                }
                quick_xml::events::Event::Text(e) => {
                    let text = e.unescape()?;

                    use Tag::*;

                    match self.current_path.as_slice() {
                        [MediaWiki, SiteInfo, DbName] => {
                            site_info.dbname = CompactString::from(text.as_ref());
                        }
                        [MediaWiki, SiteInfo, Namespaces, Namespace(id)] => {
                            if let Ok(key) = id.parse() {
                                site_info.namespaces.insert(
                                    key,
                                    self::Namespace::Named(CompactString::from(text.as_ref())),
                                );
                            } else if id != "ignored" {
                                tracing::warn!(
                                    message = "Ignoring namespace with invalid id",
                                    id,
                                    name = text.as_ref(),
                                    position = self.xml_parser.buffer_position()
                                );
                            }
                        }
                        _ => self.check_known_tags_in_unexpected_location(false),
                    }
                }
                quick_xml::events::Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e,
                        &mut self.current_path,
                        &mut self.tag_interner,
                        &mut self.xml_parser,
                    )?;

                    if tag == Some(Tag::SiteInfo) {
                        // found the closing tag for siteinfo, we're done
                        self.buf.clear();
                        break;
                    }
                }
                quick_xml::events::Event::Eof => {
                    // we should never reach eof in a correct file because we break when we find the closing tag

                    tracing::error!(partial_site_info = ?site_info, current_path = ?self.current_path);
                    return Err(ParsingError::Eof);
                }
                _ => {}
            }
            self.buf.clear();
        }

        self.site_info = site_info;
        Ok(())
    }

    fn parse_id(
        xml_parser: &quick_xml::Reader<R>,
        kind: &'static str,
        text: &str,
    ) -> Option<i32> {
        match text.trim().parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(
                    message = "Found invalid id",
                    kind,
                    id = text,
                    position = xml_parser.buffer_position()
                );
                None
            }
        }
    }

    // titles are stored with spaces and without the namespace prefix
    fn normalize_title(&self, title: &str, namespace: i32) -> CompactString {
        let title = self
            .site_info
            .namespace_name(namespace)
            .filter(|_| namespace != 0)
            .and_then(|name| title.strip_prefix(name))
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(title);

        if title.contains('_') {
            CompactString::from(title.replace('_', " "))
        } else {
            CompactString::from(title)
        }
    }

    pub fn parse_page(&mut self) -> Result<Option<Page>, ParsingError> {
        let span = tracing::span!(tracing::Level::INFO, "parse_page", title = tracing::field::Empty);

        let mut page = Page {
            id: 0,
            title: CompactString::default(),
            namespace: 0,
            is_redirect: false,
            revisions: Vec::new(),
        };
        let mut raw_title = String::new();
        let mut started_page = false;

        let mut revision_builder = None;

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                quick_xml::events::Event::Start(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        false,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    if tag == Tag::Page {
                        started_page = true;
                    }

                    if tag == Tag::Revision {
                        revision_builder = Some(RevisionBuilder::new());
                    }

                    if tag == Tag::Contributor {
                        if let Some(revision_builder) = &mut revision_builder {
                            revision_builder.has_contributor = true;
                        }
                    }

                    self.current_path.push(tag);
                }
                quick_xml::events::Event::Empty(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        false,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    self.current_path.push(tag);

                    use Tag::*;

                    match self.current_path.as_slice() {
                        [MediaWiki, Page, Redirect] => {
                            page.is_redirect = true;
                        }
                        [MediaWiki, Page, Revision, Text(deleted)] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.text = Some(if *deleted {
                                    self::Text::Deleted
                                } else {
                                    self::Text::Normal(String::new())
                                });
                            }
                        }
                        [MediaWiki, Page, Revision, Contributor] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.has_contributor = true;
                            }
                        }
                        // deleted comments carry no value
                        [MediaWiki, Page, Revision, Comment] => {}
                        _ => self.check_known_tags_in_unexpected_location(true),
                    }
                    self.current_path.pop();
                }
                quick_xml::events::Event::Text(e) => {
                    let text = e.unescape()?;

                    use Tag::*;

                    match self.current_path.as_slice() {
                        // Page tags
                        [MediaWiki, Page, Title] => {
                            raw_title = text.into_owned();
                            span.record("title", raw_title.as_str());
                        }
                        [MediaWiki, Page, Ns] => {
                            page.namespace = Self::parse_id(&self.xml_parser, "namespace", &text)
                                .unwrap_or_else(|| {
                                    tracing::warn!("defaulting to namespace 0");
                                    0
                                });
                        }
                        [MediaWiki, Page, Id] => {
                            // always use negative ids for invalid ids
                            page.id = Self::parse_id(&self.xml_parser, "page", &text)
                                .unwrap_or_else(|| rand::thread_rng().gen_range(i32::MIN..-100));
                        }
                        // Revision tags
                        [MediaWiki, Page, Revision, Id] => {
                            let id = Self::parse_id(&self.xml_parser, "revision", &text)
                                .unwrap_or_else(|| rand::thread_rng().gen_range(i32::MIN..-100));
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.id = Some(id);
                            }
                        }
                        [MediaWiki, Page, Revision, ParentId] => {
                            let parent_id =
                                Self::parse_id(&self.xml_parser, "parent revision", &text);
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.parent_id = parent_id;
                            }
                        }
                        [MediaWiki, Page, Revision, Timestamp] => {
                            // Source: https://github.com/mediawiki-utilities/python-mwtypes/blob/523a93f98fe1372938fc15872b5abb1f267cc643/mwtypes/timestamp.py#L12
                            const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";
                            const TIMESTAMP_FORMAT_SHORT: &str = "%Y%m%d%H%M%S";

                            let timestamp = chrono::NaiveDateTime::parse_from_str(
                                text.as_ref(),
                                TIMESTAMP_FORMAT_SHORT,
                            )
                            .or_else(|_| {
                                chrono::NaiveDateTime::parse_from_str(
                                    text.as_ref(),
                                    TIMESTAMP_FORMAT_LONG,
                                )
                            })
                            .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc));

                            if timestamp.is_err() {
                                tracing::warn!(
                                    message = "Found invalid revision timestamp",
                                    timestamp = text.as_ref(),
                                    position = self.xml_parser.buffer_position()
                                );
                            }
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.timestamp = timestamp.ok();
                            }
                        }
                        [MediaWiki, Page, Revision, Contributor, Username]
                        | [MediaWiki, Page, Revision, Contributor, Ip] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.contributor_name =
                                    Some(CompactString::from(text.as_ref()));
                            }
                        }
                        [MediaWiki, Page, Revision, Contributor, Id] => {
                            let contributor_id =
                                Self::parse_id(&self.xml_parser, "contributor", &text);
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.contributor_id = contributor_id;
                            }
                        }
                        [MediaWiki, Page, Revision, Text(deleted)] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.text = Some(if *deleted {
                                    self::Text::Deleted
                                } else {
                                    self::Text::Normal(text.into_owned())
                                });
                            }
                        }
                        [MediaWiki, Page, Revision, Comment] => {
                            if let Some(revision_builder) = &mut revision_builder {
                                revision_builder.comment = Some(CompactString::from(text.as_ref()));
                            }
                        }
                        _ => self.check_known_tags_in_unexpected_location(false),
                    }
                }
                quick_xml::events::Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e,
                        &mut self.current_path,
                        &mut self.tag_interner,
                        &mut self.xml_parser,
                    )?;

                    if tag == Some(Tag::Revision) {
                        if let Some(revision_builder) = revision_builder.take() {
                            match revision_builder.try_build() {
                                Ok(revision) => page.revisions.push(revision),
                                Err(BuildRevisionError(field, revision_builder)) => {
                                    tracing::error!(
                                        message = "Missing mandatory field in revision",
                                        field,
                                        partial_revision = ?revision_builder,
                                        revision_end_position = self.xml_parser.buffer_position()
                                    );
                                    if cfg!(feature = "strict") {
                                        return Self::abort_parsing(&mut self.xml_parser);
                                    }
                                    tracing::warn!("Ignoring revision with missing mandatory field");
                                }
                            }
                        }
                    }

                    if tag == Some(Tag::Page) {
                        self.buf.clear();
                        break;
                    }
                }
                quick_xml::events::Event::Eof => {
                    if started_page {
                        tracing::error!(partial_page = ?page, current_path = ?self.current_path);
                        return Err(ParsingError::Eof);
                    } else {
                        return Ok(None);
                    }
                }
                _ => {}
            }
            self.buf.clear();
        }

        page.title = self.normalize_title(&raw_title, page.namespace);
        Ok(Some(page))
    }
}
