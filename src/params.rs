use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("at least one of the parameters `from` and `to` is required")]
    MissingDateRange,
    #[error("invalid date {value:?} for parameter `{field}`, expected YYYY-MM-DD")]
    InvalidDate {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Input of one report run.
///
/// The engine expects at least one of the dates to be present, see
/// [`ReportParameters::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportParameters {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub include_debug_breakdown: bool,
}

// form values count as missing when empty
fn parameter_not_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_date(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, ParamsError> {
    parameter_not_empty(value)
        .map(|value| {
            NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| {
                ParamsError::InvalidDate {
                    field,
                    value: value.to_owned(),
                    source,
                }
            })
        })
        .transpose()
}

impl ReportParameters {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
            category: None,
            include_debug_breakdown: false,
        }
    }

    /// Build validated parameters from raw form values.
    ///
    /// Empty strings are treated like absent values.
    pub fn from_form(
        from: Option<&str>,
        to: Option<&str>,
        category: Option<&str>,
        include_debug_breakdown: bool,
    ) -> Result<Self, ParamsError> {
        let params = Self {
            start_date: parse_date("from", from)?,
            end_date: parse_date("to", to)?,
            category: parameter_not_empty(category).map(str::to_owned),
            include_debug_breakdown,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_debug_breakdown(mut self, include: bool) -> Self {
        self.include_debug_breakdown = include;
        self
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.start_date.is_none() && self.end_date.is_none() {
            return Err(ParamsError::MissingDateRange);
        }
        Ok(())
    }

    /// Category filter, `None` if absent or blank.
    pub fn category_text(&self) -> Option<&str> {
        parameter_not_empty(self.category.as_deref())
    }

    /// Inclusive lower timestamp bound: start of the start date (UTC).
    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.start_date.map(start_of_day)
    }

    /// Exclusive upper timestamp bound: start of the day after the end date (UTC).
    ///
    /// `None` if there is no end date or the day after it can't be represented.
    pub fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .and_then(|end| end.checked_add_days(Days::new(1)))
            .map(start_of_day)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
