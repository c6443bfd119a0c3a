//! Data models shared by the extractor and the batch coordinator.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`SchemaField`]: the closed set of extractable columns
//! - [`Publisher`]: the closed set of known news publishers
//! - [`Theme`]: the sentiment theme a search belongs to
//! - [`Article`]: a fetched document, consumed once by the extractor
//! - [`SearchResult`]: a theme/keyword pair threaded with one article
//! - [`Record`]: the extracted row, one per search result

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An extractable output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaField {
    Title,
    Date,
    Author,
    Content,
}

impl SchemaField {
    /// Every field, in output order.
    pub const ALL: [SchemaField; 4] = [
        SchemaField::Title,
        SchemaField::Date,
        SchemaField::Author,
        SchemaField::Content,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaField::Title => "title",
            SchemaField::Date => "date",
            SchemaField::Author => "author",
            SchemaField::Content => "content",
        }
    }
}

impl fmt::Display for SchemaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("`{s}` is not a schema field"))
    }
}

macro_rules! publishers {
    ($($variant:ident => $name:literal,)+) => {
        /// A known news publisher.
        ///
        /// Serialized by its display name, e.g. `"Fastmarkets"`. Domains
        /// that map to no publisher resolve to [`Publisher::Unknown`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum Publisher {
            $($variant,)+
            Unknown,
        }

        impl Publisher {
            /// Every known publisher, excluding [`Publisher::Unknown`].
            pub const KNOWN: &'static [Publisher] = &[$(Publisher::$variant,)+];

            pub fn name(&self) -> &'static str {
                match self {
                    $(Publisher::$variant => $name,)+
                    Publisher::Unknown => "unknown",
                }
            }
        }
    };
}

publishers! {
    ChemAnalyst => "ChemAnalyst",
    Fastmarkets => "Fastmarkets",
    FasUsda => "USDA Foreign Agricultural Service",
    BiodieselMagazine => "Biodiesel Magazine",
    BusinessResearchInsights => "Business Research Insights",
    GlobeNewswire => "GlobeNewswire",
    TheEdgeMalaysia => "The Edge Malaysia",
    CleanAirTaskForce => "Clean Air Task Force (CATF)",
    TheLoadstar => "The Loadstar",
    TransportEnvironment => "Transport Environment (T&E)",
    GlobalMarketInsights => "Global Market Insights (GMI)",
    GrandViewResearch => "Grand View Research",
    ResourceWise => "Resource Wise",
    Reuters => "Reuters",
    RystadEnergy => "Rystad Energy",
    ErsUsda => "USDA Economic Research Service",
    GreenCarCongress => "Green Car Congress",
    WasteManagementWorld => "Waste Management World (WMW)",
    UnionOfConcernedScientists => "Union of Concerned Scientists",
    IngThink => "ING Think",
    ScienceDirect => "ScienceDirect",
    InternationalEnergyAgency => "International Energy Agency (IEA)",
    EnergyInformationAdministration => "U.S. Energy Information Administration (EIA)",
    TransportTopics => "Transport Topics",
    TheGuardian => "The Guardian",
    Nature => "Nature",
    TheCounter => "The Counter",
    CmeGroup => "CME Group",
    EtEnergyWorld => "ET EnergyWorld",
    Clariant => "Clariant Specialty Chemicals",
    BiofuelsInternational => "Biofuels International",
    OurWorldInData => "Our World in Data",
    NewScientist => "New Scientist",
    ResearchGate => "ResearchGate",
    YahooFinance => "Yahoo Finance",
}

impl fmt::Display for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Publisher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Publisher::Unknown.name() {
            return Ok(Publisher::Unknown);
        }
        Publisher::KNOWN
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("`{s}` is not a known publisher"))
    }
}

impl TryFrom<String> for Publisher {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Publisher> for String {
    fn from(value: Publisher) -> Self {
        value.name().to_string()
    }
}

/// The theme a keyword search was run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Theme {
    #[serde(rename = "demand")]
    Demand,
    #[serde(rename = "supply")]
    Supply,
    #[serde(rename = "feedstock price")]
    FeedstockPrice,
    #[serde(rename = "component price")]
    ComponentPrice,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Demand => "demand",
            Theme::Supply => "supply",
            Theme::FeedstockPrice => "feedstock price",
            Theme::ComponentPrice => "component price",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetched article, produced by the coordinator from a document source
/// page and consumed once by the extractor.
#[derive(Debug, Clone)]
pub struct Article {
    /// The publisher resolved from the canonical URL.
    pub publisher: Publisher,
    /// The canonical URL the document source ended up on.
    pub url: String,
    /// The raw page text.
    pub html: String,
}

/// One article together with the search that found it.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub theme: Theme,
    pub keyword: String,
    pub article: Article,
}

/// An extracted row.
///
/// Identity fields are always populated. Extractable fields are `None`
/// when absent and serialize as `null`, never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub publisher: Publisher,
    pub url: String,
    pub theme: Theme,
    pub keyword: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
}

impl Record {
    /// A record carrying only identity fields.
    pub fn identity(result: &SearchResult) -> Self {
        Record {
            publisher: result.article.publisher,
            url: result.article.url.clone(),
            theme: result.theme,
            keyword: result.keyword.clone(),
            title: None,
            date: None,
            author: None,
            content: None,
        }
    }

    pub fn field(&self, field: SchemaField) -> Option<&str> {
        match field {
            SchemaField::Title => self.title.as_deref(),
            SchemaField::Date => self.date.as_deref(),
            SchemaField::Author => self.author.as_deref(),
            SchemaField::Content => self.content.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: SchemaField, value: Option<String>) {
        match field {
            SchemaField::Title => self.title = value,
            SchemaField::Date => self.date = value,
            SchemaField::Author => self.author = value,
            SchemaField::Content => self.content = value,
        }
    }

    /// Whether every extractable field is absent.
    pub fn is_blank(&self) -> bool {
        SchemaField::ALL.iter().all(|f| self.field(*f).is_none())
    }
}
