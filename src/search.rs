//! Search-results URL construction.
//!
//! A [`SearchQuery`] describes one news search (text, sort order, period and
//! content type) and renders the portal's search URL. Pagination is added
//! later by the link collector as a `start` offset.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const SEARCH_ENDPOINT: &str = "https://search.naver.com/search.naver";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("custom period starts {from} but ends {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("unknown {kind} '{value}'")]
    UnknownOption { kind: &'static str, value: String },

    #[error("invalid search endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Relevance,
    Recent,
    Oldest,
}

impl SortOrder {
    fn code(self) -> &'static str {
        match self {
            SortOrder::Relevance => "0",
            SortOrder::Recent => "1",
            SortOrder::Oldest => "2",
        }
    }

    fn nso(self) -> &'static str {
        match self {
            SortOrder::Relevance => "r",
            SortOrder::Recent => "dd",
            SortOrder::Oldest => "da",
        }
    }
}

impl FromStr for SortOrder {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevance" | "0" => Ok(SortOrder::Relevance),
            "recent" | "1" => Ok(SortOrder::Recent),
            "oldest" | "2" => Ok(SortOrder::Oldest),
            _ => Err(SearchError::UnknownOption {
                kind: "sort order",
                value: s.to_string(),
            }),
        }
    }
}

/// Time window of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    All,
    Hour,
    Day,
    Week,
    Month,
    ThreeMonths,
    SixMonths,
    Year,
    /// Inclusive `from..=to`.
    Custom { from: NaiveDate, to: NaiveDate },
}

impl Period {
    pub fn custom(from: NaiveDate, to: NaiveDate) -> Result<Self, SearchError> {
        if from > to {
            return Err(SearchError::InvertedRange { from, to });
        }
        Ok(Period::Custom { from, to })
    }

    fn code(&self) -> &'static str {
        match self {
            Period::All => "0",
            Period::Hour => "1",
            Period::Day => "2",
            Period::Week => "3",
            Period::Month => "4",
            Period::ThreeMonths => "5",
            Period::SixMonths => "6",
            Period::Year => "7",
            Period::Custom { .. } => "3",
        }
    }

    fn nso(&self) -> String {
        match self {
            Period::All => "all".into(),
            Period::Hour => "1h".into(),
            Period::Day => "1d".into(),
            Period::Week => "1w".into(),
            Period::Month => "1m".into(),
            Period::ThreeMonths => "3m".into(),
            Period::SixMonths => "6m".into(),
            Period::Year => "1y".into(),
            Period::Custom { from, to } => {
                format!("from{}to{}", from.format("%Y%m%d"), to.format("%Y%m%d"))
            }
        }
    }

    /// Days covered by a relative period, for turning it into an explicit
    /// date range.
    pub fn lookback_days(&self) -> Option<i64> {
        match self {
            Period::Week => Some(7),
            Period::Month => Some(30),
            Period::ThreeMonths => Some(90),
            Period::SixMonths => Some(180),
            Period::Year => Some(365),
            _ => None,
        }
    }
}

impl FromStr for Period {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Period::All),
            "1h" => Ok(Period::Hour),
            "1d" => Ok(Period::Day),
            "1w" => Ok(Period::Week),
            "1m" => Ok(Period::Month),
            "3m" => Ok(Period::ThreeMonths),
            "6m" => Ok(Period::SixMonths),
            "1y" => Ok(Period::Year),
            _ => Err(SearchError::UnknownOption {
                kind: "period",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NewsType {
    #[default]
    All,
    Photo,
    Video,
    Print,
    PressRelease,
    Auto,
}

impl FromStr for NewsType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(NewsType::All),
            "photo" => Ok(NewsType::Photo),
            "video" => Ok(NewsType::Video),
            "print" => Ok(NewsType::Print),
            "press_release" => Ok(NewsType::PressRelease),
            "auto" => Ok(NewsType::Auto),
            _ => Err(SearchError::UnknownOption {
                kind: "news type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub sort: SortOrder,
    pub period: Period,
    pub news_type: NewsType,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sort: SortOrder::default(),
            period: Period::default(),
            news_type: NewsType::default(),
        }
    }

    /// A search pinned to the single calendar day `day`.
    pub fn for_day(query: impl Into<String>, day: NaiveDate, sort: SortOrder, news_type: NewsType) -> Self {
        Self {
            query: query.into(),
            sort,
            period: Period::Custom { from: day, to: day },
            news_type,
        }
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.period = period;
        self
    }

    pub fn with_news_type(mut self, news_type: NewsType) -> Self {
        self.news_type = news_type;
        self
    }

    /// Render the search URL (without a pagination offset).
    pub fn build_url(&self) -> Result<String, SearchError> {
        let (ds, de) = match self.period {
            Period::Custom { from, to } => {
                if from > to {
                    return Err(SearchError::InvertedRange { from, to });
                }
                (from.format("%Y.%m.%d").to_string(), to.format("%Y.%m.%d").to_string())
            }
            _ => (String::new(), String::new()),
        };
        let photo = if self.news_type == NewsType::Photo { "1" } else { "0" };
        let nso = format!("so:{},p:{},a:all", self.sort.nso(), self.period.nso());

        let params: [(&str, &str); 19] = [
            ("ssc", "tab.news.all"),
            ("query", self.query.as_str()),
            ("sm", "tab_opt"),
            ("sort", self.sort.code()),
            ("photo", photo),
            ("field", "0"),
            ("pd", self.period.code()),
            ("ds", ds.as_str()),
            ("de", de.as_str()),
            ("docid", ""),
            ("related", "0"),
            ("mynews", "0"),
            ("office_type", "0"),
            ("office_section_code", "0"),
            ("news_office_checked", ""),
            ("nso", nso.as_str()),
            ("is_sug_officeid", "0"),
            ("office_category", ""),
            ("service_area", ""),
        ];

        Ok(Url::parse_with_params(SEARCH_ENDPOINT, params)?.into())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nso())
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' ({:?}, {}, {:?})", self.query, self.sort, self.period, self.news_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params(url: &str) -> Vec<(String, String)> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn param(url: &str, key: &str) -> String {
        params(url)
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .unwrap()
    }

    #[test]
    fn test_default_query_url() {
        let url = SearchQuery::new("인공지능").build_url().unwrap();
        assert!(url.starts_with("https://search.naver.com/search.naver?ssc=tab.news.all&query="));
        assert_eq!(param(&url, "query"), "인공지능");
        assert_eq!(param(&url, "sort"), "0");
        assert_eq!(param(&url, "pd"), "0");
        assert_eq!(param(&url, "ds"), "");
        assert_eq!(param(&url, "nso"), "so:r,p:all,a:all");
    }

    #[test]
    fn test_parameter_order_is_fixed() {
        let url = SearchQuery::new("q").build_url().unwrap();
        let keys: Vec<String> = params(&url).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            [
                "ssc", "query", "sm", "sort", "photo", "field", "pd", "ds", "de", "docid",
                "related", "mynews", "office_type", "office_section_code", "news_office_checked",
                "nso", "is_sug_officeid", "office_category", "service_area"
            ]
        );
    }

    #[test]
    fn test_day_query_pins_custom_period() {
        let url = SearchQuery::for_day("반도체", day(2025, 5, 20), SortOrder::Recent, NewsType::All)
            .build_url()
            .unwrap();
        assert_eq!(param(&url, "pd"), "3");
        assert_eq!(param(&url, "ds"), "2025.05.20");
        assert_eq!(param(&url, "de"), "2025.05.20");
        assert_eq!(param(&url, "sort"), "1");
        assert_eq!(param(&url, "nso"), "so:dd,p:from20250520to20250520,a:all");
    }

    #[test]
    fn test_relative_period_and_photo_type() {
        let url = SearchQuery::new("q")
            .with_period(Period::Week)
            .with_sort(SortOrder::Oldest)
            .with_news_type(NewsType::Photo)
            .build_url()
            .unwrap();
        assert_eq!(param(&url, "pd"), "3");
        assert_eq!(param(&url, "photo"), "1");
        assert_eq!(param(&url, "nso"), "so:da,p:1w,a:all");
    }

    #[test]
    fn test_query_text_is_encoded() {
        let url = SearchQuery::new("a b&c").build_url().unwrap();
        assert!(url.contains("query=a+b%26c"));
        assert_eq!(param(&url, "query"), "a b&c");
    }

    #[test]
    fn test_inverted_custom_range_rejected() {
        assert_eq!(
            Period::custom(day(2025, 5, 2), day(2025, 5, 1)),
            Err(SearchError::InvertedRange {
                from: day(2025, 5, 2),
                to: day(2025, 5, 1)
            })
        );
        let query = SearchQuery::new("q").with_period(Period::Custom {
            from: day(2025, 5, 2),
            to: day(2025, 5, 1),
        });
        assert!(query.build_url().is_err());
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!("recent".parse::<SortOrder>(), Ok(SortOrder::Recent));
        assert_eq!("3m".parse::<Period>(), Ok(Period::ThreeMonths));
        assert_eq!("press_release".parse::<NewsType>(), Ok(NewsType::PressRelease));
        assert!("sideways".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_lookback_days() {
        assert_eq!(Period::Week.lookback_days(), Some(7));
        assert_eq!(Period::Year.lookback_days(), Some(365));
        assert_eq!(Period::All.lookback_days(), None);
    }

    #[test]
    fn test_period_display() {
        assert_eq!(Period::SixMonths.to_string(), "6m");
        let custom = Period::custom(day(2025, 1, 1), day(2025, 1, 31)).unwrap();
        assert_eq!(custom.to_string(), "from20250101to20250131");
    }
}
