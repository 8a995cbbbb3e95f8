//! Declarative field schemas
//!
//! A schema maps field names to selector expressions. Selectors are compiled
//! when the schema is built, so extraction itself never fails.

use crate::HarvestError;
use scraper::Selector;
use serde::Deserialize;

const DEFAULT_IMAGE_SELECTOR: &str = "img";

/// A CSS selector kept together with its source text
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    source: String,
    selector: Selector,
}

impl CompiledSelector {
    /// Compiles a CSS selector expression
    ///
    /// # Examples
    ///
    /// ```
    /// use harvest_crawl::extract::CompiledSelector;
    ///
    /// assert!(CompiledSelector::parse("li.next > a").is_ok());
    /// assert!(CompiledSelector::parse("li..next").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self, HarvestError> {
        let selector = Selector::parse(source).map_err(|e| HarvestError::Selector {
            selector: source.to_string(),
            message: format!("{:?}", e),
        })?;
        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    /// Returns the selector expression as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl PartialEq for CompiledSelector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// How the matches of a field selector become a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Text of the first match
    First,
    /// Texts of every match, as a list
    All,
    /// One match gives text, several give a list
    #[default]
    Auto,
}

/// Where a field's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// Text (or an attribute) of the elements matching a selector
    Select {
        selector: CompiledSelector,
        attr: Option<String>,
        mode: MatchMode,
    },
    /// A sub-schema evaluated in the same scope, producing nested records
    Schema(FieldSchema),
    /// Page metadata: the `<title>` and `<meta>` name/content pairs
    ///
    /// With a name, the content of that entry. Without one, a single
    /// nested record holding every entry.
    Metadata { name: Option<String> },
    /// JSON-LD blocks of the page, optionally only those of one `@type`
    JsonLd { type_name: Option<String> },
    /// Images matching a selector, as records of `url`, `alt` and `title`
    Images { selector: CompiledSelector },
}

/// A named field of a flat schema
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub source: FieldSource,
}

impl Field {
    /// A field taking element text with [`MatchMode::Auto`]
    pub fn text(name: &str, selector: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            name: name.to_string(),
            source: FieldSource::Select {
                selector: CompiledSelector::parse(selector)?,
                attr: None,
                mode: MatchMode::Auto,
            },
        })
    }

    /// A field taking an attribute of the first matching element
    ///
    /// `href` and `src` values are resolved to absolute URLs.
    pub fn attr(name: &str, selector: &str, attr: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            name: name.to_string(),
            source: FieldSource::Select {
                selector: CompiledSelector::parse(selector)?,
                attr: Some(attr.to_string()),
                mode: MatchMode::First,
            },
        })
    }

    /// A field holding the records produced by a sub-schema
    pub fn nested(name: &str, schema: FieldSchema) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Schema(schema),
        }
    }

    /// A field reading page metadata, one entry or all of them
    ///
    /// Metadata is read from the whole page, even inside a nested scope.
    pub fn metadata(name: &str, entry: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Metadata {
                name: entry.map(str::to_string),
            },
        }
    }

    /// A field holding the page's JSON-LD objects
    pub fn json_ld(name: &str, type_name: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::JsonLd {
                type_name: type_name.map(str::to_string),
            },
        }
    }

    /// A field listing images; the selector defaults to `img`
    pub fn images(name: &str, selector: Option<&str>) -> Result<Self, HarvestError> {
        Ok(Self {
            name: name.to_string(),
            source: FieldSource::Images {
                selector: CompiledSelector::parse(selector.unwrap_or(DEFAULT_IMAGE_SELECTOR))?,
            },
        })
    }

    /// Overrides the match mode of a selector field
    pub fn with_mode(mut self, new_mode: MatchMode) -> Self {
        if let FieldSource::Select { mode, .. } = &mut self.source {
            *mode = new_mode;
        }
        self
    }
}

/// A declarative extraction schema
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSchema {
    /// Every field is evaluated against the whole scope, giving one record
    Flat(Vec<Field>),
    /// The scope selector yields N sub-trees, each evaluated with `child`
    Nested {
        scope: CompiledSelector,
        child: Box<FieldSchema>,
    },
    /// The first matching table becomes one record per data row
    Table { selector: CompiledSelector },
}

impl FieldSchema {
    /// Builds a flat schema of text fields from `(name, selector)` pairs
    ///
    /// # Examples
    ///
    /// ```
    /// use harvest_crawl::FieldSchema;
    ///
    /// let schema = FieldSchema::flat([("title", "h1"), ("price", ".price")]).unwrap();
    /// assert_eq!(schema.field_names(), vec!["title", "price"]);
    /// ```
    pub fn flat<'a, I>(pairs: I) -> Result<Self, HarvestError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let fields = pairs
            .into_iter()
            .map(|(name, selector)| Field::text(name, selector))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Flat(fields))
    }

    /// Builds a nested schema: `child` is evaluated within every `scope` match
    pub fn nested(scope: &str, child: FieldSchema) -> Result<Self, HarvestError> {
        Ok(Self::Nested {
            scope: CompiledSelector::parse(scope)?,
            child: Box::new(child),
        })
    }

    /// Builds a table schema over the first table matching `selector`
    pub fn table(selector: &str) -> Result<Self, HarvestError> {
        Ok(Self::Table {
            selector: CompiledSelector::parse(selector)?,
        })
    }

    /// Names of the top-level fields, in schema order
    ///
    /// Table schemas take their names from the document, so they report none.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            Self::Flat(fields) => fields.iter().map(|f| f.name.as_str()).collect(),
            Self::Nested { child, .. } => child.field_names(),
            Self::Table { .. } => Vec::new(),
        }
    }
}
