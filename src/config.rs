use compact_str::CompactString;

/// Namespace id of regular articles.
pub const MAIN_NAMESPACE: i32 = 0;
/// Namespace id of category pages.
pub const CATEGORY_NAMESPACE: i32 = 14;

/// Group whose members are considered automated editors unless configured otherwise.
pub const DEFAULT_AUTOMATION_GROUP: &str = "automaton";

/// English edit summary written by the find/replace extension.
pub const DEFAULT_BULK_EDIT_TEMPLATE: &str = "Text replacement - \"$1\" to \"$2\"";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bulk edit template {template:?} yields an empty signature")]
    EmptyBulkEditSignature { template: String },
}

/// Settings shared by all report runs of one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Groups whose members are classified as automated.
    pub automation_groups: Vec<CompactString>,
    /// Localized edit summary template of the bulk find/replace tool.
    pub bulk_edit_template: String,
    /// Namespace whose pages are eligible for reporting.
    pub main_namespace: i32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            automation_groups: vec![CompactString::from(DEFAULT_AUTOMATION_GROUP)],
            bulk_edit_template: DEFAULT_BULK_EDIT_TEMPLATE.to_owned(),
            main_namespace: MAIN_NAMESPACE,
        }
    }
}

impl ReportConfig {
    pub fn with_automation_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: AsRef<str>,
    {
        let mut automation_groups: Vec<CompactString> = groups
            .into_iter()
            .map(|group| CompactString::from(group.as_ref().trim()))
            .filter(|group| !group.is_empty())
            .collect();
        automation_groups.sort();
        automation_groups.dedup();

        self.automation_groups = automation_groups;
        self
    }

    pub fn with_bulk_edit_template(mut self, template: impl Into<String>) -> Self {
        self.bulk_edit_template = template.into();
        self
    }

    pub fn with_main_namespace(mut self, namespace: i32) -> Self {
        self.main_namespace = namespace;
        self
    }
}
