use crate::crawler::{ListDetailRequest, PaginationRequest};
use crate::extract::{CompiledSelector, Field, FieldSchema, MatchMode};
use crate::output::OutputFormat;
use crate::url::{CrawlBoundary, DomainPattern};
use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Main configuration structure for a Harvest-Crawl job
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Request behavior: identification, pacing, retries and caching
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Maximum requests per second; 0 disables throttling
    pub requests_per_second: f64,

    /// Per-attempt timeout (seconds)
    pub timeout_secs: f64,

    /// Total attempts per URL, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt (milliseconds)
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after each further failure
    pub backoff_factor: f64,

    /// HTTP statuses treated as transient, e.g. [429, 503]
    pub retry_statuses: Vec<u16>,

    /// How long successful responses stay cached (seconds); 0 disables caching
    pub cache_ttl_secs: u64,

    /// Maximum number of cached responses
    pub cache_capacity: Option<usize>,

    /// Extra headers sent with every request
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("harvest-crawl/{}", env!("CARGO_PKG_VERSION")),
            requests_per_second: 1.0,
            timeout_secs: 10.0,
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
            retry_statuses: Vec::new(),
            cache_ttl_secs: 3600,
            cache_capacity: Some(1000),
            headers: BTreeMap::new(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::from_secs(10))
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Which hosts a crawl may continue onto
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryMode {
    #[default]
    Any,
    SameDomain,
    Domains,
}

/// Engine behavior shared by both crawl modes
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Maximum number of detail pages fetched at once
    pub concurrency: usize,

    pub boundary: BoundaryMode,

    /// Domain patterns (e.g. "*.example.com") used when `boundary = "domains"`
    pub allowed_domains: Vec<String>,

    /// Prefix every record with its source URL (and page number)
    pub annotate_source: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            boundary: BoundaryMode::Any,
            allowed_domains: Vec::new(),
            annotate_source: false,
        }
    }
}

impl EngineConfig {
    /// Builds the crawl boundary
    pub fn crawl_boundary(&self) -> CrawlBoundary {
        match self.boundary {
            BoundaryMode::Any => CrawlBoundary::Any,
            BoundaryMode::SameDomain => CrawlBoundary::SameDomain,
            BoundaryMode::Domains => CrawlBoundary::Domains(
                self.allowed_domains
                    .iter()
                    .map(|pattern| DomainPattern::parse(pattern))
                    .collect(),
            ),
        }
    }
}

/// What to crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum CrawlConfig {
    /// Follow "next" links from a start page
    #[serde(rename_all = "kebab-case")]
    Pagination {
        start_url: String,
        next_selector: String,
        #[serde(default = "default_max_pages")]
        max_pages: u32,
        schema: SchemaConfig,
    },

    /// Fetch every detail page linked from a list page
    #[serde(rename_all = "kebab-case")]
    ListDetail {
        list_url: String,
        item_selector: String,
        link_selector: String,
        #[serde(default = "default_max_items")]
        max_items: usize,
        schema: SchemaConfig,
    },
}

fn default_max_pages() -> u32 {
    10
}

fn default_max_items() -> usize {
    100
}

impl CrawlConfig {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Pagination { .. } => "pagination",
            Self::ListDetail { .. } => "list-detail",
        }
    }

    /// The URL the crawl starts from
    pub fn seed_url(&self) -> &str {
        match self {
            Self::Pagination { start_url, .. } => start_url,
            Self::ListDetail { list_url, .. } => list_url,
        }
    }

    pub fn schema(&self) -> &SchemaConfig {
        match self {
            Self::Pagination { schema, .. } | Self::ListDetail { schema, .. } => schema,
        }
    }

    /// Compiles selectors and URLs into a runnable crawl job
    pub fn to_job(&self) -> Result<CrawlJob, ConfigError> {
        match self {
            Self::Pagination {
                start_url,
                next_selector,
                max_pages,
                schema,
            } => Ok(CrawlJob::Pagination(PaginationRequest::new(
                parse_url(start_url)?,
                schema.compile()?,
                compile_selector(next_selector)?,
                *max_pages,
            ))),
            Self::ListDetail {
                list_url,
                item_selector,
                link_selector,
                max_items,
                schema,
            } => Ok(CrawlJob::ListDetail(ListDetailRequest::new(
                parse_url(list_url)?,
                compile_selector(item_selector)?,
                compile_selector(link_selector)?,
                schema.compile()?,
                *max_items,
            ))),
        }
    }
}

/// A crawl ready to hand to the engine
#[derive(Debug, Clone)]
pub enum CrawlJob {
    Pagination(PaginationRequest),
    ListDetail(ListDetailRequest),
}

/// Declarative extraction schema as written in the job file
///
/// `table` selects table extraction; otherwise `fields` form a flat record.
/// `scope` repeats the schema within every element it matches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaConfig {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

/// A page-level field source that needs no element selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// `<title>` and `<meta>` entries
    Metadata,
    /// `application/ld+json` blocks
    JsonLd,
    /// `<img>` elements
    Images,
}

/// One named field of a schema
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldConfig {
    pub name: String,

    /// CSS selector; required unless the field has nested `fields` or a `source`
    #[serde(default)]
    pub selector: Option<String>,

    /// Read page metadata, JSON-LD or images instead of selector matches
    #[serde(default)]
    pub source: Option<SourceKind>,

    /// Metadata entry name, or JSON-LD `@type`, to narrow a `source` field
    #[serde(default)]
    pub key: Option<String>,

    /// Attribute to read instead of the element text
    #[serde(default)]
    pub attr: Option<String>,

    /// `first`, `all` or `auto` (default `auto`, or `first` with `attr`)
    #[serde(default)]
    pub mode: Option<MatchMode>,

    /// Scope of a nested schema
    #[serde(default)]
    pub scope: Option<String>,

    /// Fields of a nested schema; the value becomes a list of records
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl SchemaConfig {
    /// Compiles the schema, rejecting invalid selectors
    pub fn compile(&self) -> Result<FieldSchema, ConfigError> {
        let inner = match &self.table {
            Some(table) => FieldSchema::Table {
                selector: compile_selector(table)?,
            },
            None => {
                if self.fields.is_empty() {
                    return Err(ConfigError::Validation(
                        "schema must define at least one field or a table".to_string(),
                    ));
                }
                FieldSchema::Flat(
                    self.fields
                        .iter()
                        .map(FieldConfig::compile)
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
        };

        match &self.scope {
            Some(scope) => Ok(FieldSchema::Nested {
                scope: compile_selector(scope)?,
                child: Box::new(inner),
            }),
            None => Ok(inner),
        }
    }
}

impl FieldConfig {
    fn compile(&self) -> Result<Field, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if let Some(source) = self.source {
            if !self.fields.is_empty() || self.attr.is_some() {
                return Err(ConfigError::Validation(format!(
                    "field '{}' has a source and cannot take fields or attr",
                    self.name
                )));
            }
            let key = self.key.as_deref();
            return match source {
                SourceKind::Metadata => Ok(Field::metadata(&self.name, key)),
                SourceKind::JsonLd => Ok(Field::json_ld(&self.name, key)),
                SourceKind::Images => Field::images(&self.name, self.selector.as_deref())
                    .map_err(|e| ConfigError::InvalidSelector(e.to_string())),
            };
        }

        if !self.fields.is_empty() {
            let nested = SchemaConfig {
                scope: self.scope.clone(),
                table: None,
                fields: self.fields.clone(),
            };
            return Ok(Field::nested(&self.name, nested.compile()?));
        }

        let selector = self.selector.as_deref().ok_or_else(|| {
            ConfigError::Validation(format!("field '{}' needs a selector", self.name))
        })?;

        let field = match &self.attr {
            Some(attr) => Field::attr(&self.name, selector, attr),
            None => Field::text(&self.name, selector),
        }
        .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;

        Ok(match self.mode {
            Some(mode) => field.with_mode(mode),
            None => field,
        })
    }
}

/// Where and how records are written
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Records file; records go to stdout as JSON when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Record format; inferred from the path extension when unset
    #[serde(default)]
    pub format: Option<OutputFormat>,

    /// JSON file listing every failed URL
    #[serde(default)]
    pub failures_path: Option<PathBuf>,

    /// Markdown crawl summary
    #[serde(default)]
    pub summary_path: Option<PathBuf>,
}

impl OutputConfig {
    /// The record format to use for `path`
    pub fn resolved_format(&self) -> OutputFormat {
        self.format.unwrap_or_else(|| {
            self.path
                .as_deref()
                .map(OutputFormat::from_path)
                .unwrap_or_default()
        })
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", raw, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "'{}' must use http or https",
            raw
        )));
    }
    Ok(url)
}

pub(crate) fn compile_selector(raw: &str) -> Result<CompiledSelector, ConfigError> {
    CompiledSelector::parse(raw).map_err(|e| ConfigError::InvalidSelector(e.to_string()))
}
