//! Schema-driven record extraction
//!
//! The extractor applies a [`FieldSchema`] to a [`Document`]. Missing data is
//! an expected outcome: a selector that matches nothing yields
//! [`FieldValue::Missing`], never an error.

use crate::extract::document::Document;
use crate::extract::record::{FieldValue, Record};
use crate::extract::schema::{CompiledSelector, Field, FieldSchema, FieldSource, MatchMode};
use crate::url::resolve_link;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use url::Url;

/// Attributes whose values are links and get resolved to absolute URLs
const LINK_ATTRIBUTES: &[&str] = &["href", "src"];

/// Extracts records from a document according to a schema
///
/// - A flat schema produces exactly one record.
/// - A nested schema produces one record per scope, in document order.
/// - A table schema produces one record per data row.
///
/// # Example
///
/// ```
/// use harvest_crawl::extract::{extract, Document, FieldSchema};
/// use url::Url;
///
/// let doc = Document::new(
///     Url::parse("https://example.com/").unwrap(),
///     r#"<div class="card"><h2>Dune</h2></div><div class="card"><h2>Emma</h2></div>"#,
/// );
/// let schema = FieldSchema::nested(".card", FieldSchema::flat([("title", "h2")]).unwrap()).unwrap();
/// let records = extract(&doc, &schema);
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[1].text("title"), Some("Emma"));
/// ```
pub fn extract(document: &Document, schema: &FieldSchema) -> Vec<Record> {
    let html = document.html();
    let page = Page {
        root: html.root_element(),
        base: document.url(),
    };
    extract_in(page.root, schema, page)
}

/// Extracts the first table matching `selector` as one record per data row
pub fn extract_table(document: &Document, selector: &CompiledSelector) -> Vec<Record> {
    let html = document.html();
    table_records(html.root_element(), selector)
}

/// Reads the page `<title>` and every named `<meta>` entry as one record
///
/// Keys come from `name` or `property` and are lowercased. A repeated key
/// keeps its last content, at the position it first appeared.
pub fn extract_metadata(document: &Document) -> Record {
    let html = document.html();
    page_metadata(html.root_element())
        .into_iter()
        .map(|(key, content)| (key, FieldValue::Text(content)))
        .collect()
}

/// Parses every JSON-LD block of the page
///
/// Top-level arrays and `@graph` lists are flattened. Blocks that are not
/// valid JSON are skipped.
pub fn extract_structured_data(document: &Document) -> Vec<Value> {
    let html = document.html();
    json_ld_objects(html.root_element())
}

/// Lists the images matching `selector` with absolute URLs
pub fn extract_images(document: &Document, selector: &CompiledSelector) -> Vec<Record> {
    let html = document.html();
    image_records(html.root_element(), selector, document.url())
}

/// Resolves the first element matching `selector` to an absolute link
///
/// The element's own `href` is used; if it has none, the first `a[href]`
/// inside it is used instead (so `li.next` works as well as `li.next > a`).
pub fn select_first_link(document: &Document, selector: &CompiledSelector) -> Option<Url> {
    let html = document.html();
    let element = html.select(selector.selector()).next()?;
    link_of(element, document.url())
}

/// Resolves every element matching `selector` to an absolute link
pub fn select_links(document: &Document, selector: &CompiledSelector) -> Vec<Url> {
    let html = document.html();
    html.select(selector.selector())
        .filter_map(|element| link_of(element, document.url()))
        .collect()
}

/// For each item container, resolves the first link inside it
///
/// Returns one entry per container in document order; `None` marks a
/// container without a usable link.
pub fn item_links(
    document: &Document,
    item_selector: &CompiledSelector,
    link_selector: &CompiledSelector,
) -> Vec<Option<Url>> {
    let html = document.html();
    html.select(item_selector.selector())
        .map(|item| {
            item.select(link_selector.selector())
                .next()
                .and_then(|anchor| link_of(anchor, document.url()))
        })
        .collect()
}

/// Whole-document context, so page-level fields work inside nested scopes
#[derive(Clone, Copy)]
struct Page<'a> {
    root: ElementRef<'a>,
    base: &'a Url,
}

fn extract_in<'a>(scope: ElementRef<'a>, schema: &FieldSchema, page: Page<'a>) -> Vec<Record> {
    match schema {
        FieldSchema::Flat(fields) => vec![flat_record(scope, fields, page)],
        FieldSchema::Nested {
            scope: scope_selector,
            child,
        } => scope
            .select(scope_selector.selector())
            .flat_map(|sub_scope| extract_in(sub_scope, child, page))
            .collect(),
        FieldSchema::Table { selector } => table_records(scope, selector),
    }
}

fn flat_record<'a>(scope: ElementRef<'a>, fields: &[Field], page: Page<'a>) -> Record {
    fields
        .iter()
        .map(|field| (field.name.clone(), field_value(scope, &field.source, page)))
        .collect()
}

fn field_value<'a>(scope: ElementRef<'a>, source: &FieldSource, page: Page<'a>) -> FieldValue {
    match source {
        FieldSource::Schema(schema) => FieldValue::Records(extract_in(scope, schema, page)),
        FieldSource::Select {
            selector,
            attr,
            mode,
        } => {
            let mut values = scope
                .select(selector.selector())
                .filter_map(|element| element_value(element, attr.as_deref(), page.base));

            match mode {
                MatchMode::First => values.next().map_or(FieldValue::Missing, FieldValue::Text),
                MatchMode::All => {
                    let values: Vec<String> = values.collect();
                    if values.is_empty() {
                        FieldValue::Missing
                    } else {
                        FieldValue::List(values)
                    }
                }
                MatchMode::Auto => {
                    let mut values: Vec<String> = values.collect();
                    match values.len() {
                        0 => FieldValue::Missing,
                        1 => FieldValue::Text(values.remove(0)),
                        _ => FieldValue::List(values),
                    }
                }
            }
        }
        FieldSource::Metadata { name: Some(name) } => {
            let name = name.to_ascii_lowercase();
            page_metadata(page.root)
                .into_iter()
                .find(|(key, _)| *key == name)
                .map_or(FieldValue::Missing, |(_, content)| FieldValue::Text(content))
        }
        FieldSource::Metadata { name: None } => {
            let entries = page_metadata(page.root);
            if entries.is_empty() {
                return FieldValue::Missing;
            }
            let record = entries
                .into_iter()
                .map(|(key, content)| (key, FieldValue::Text(content)))
                .collect();
            FieldValue::Records(vec![record])
        }
        FieldSource::JsonLd { type_name } => {
            let objects: Vec<Value> = json_ld_objects(page.root)
                .into_iter()
                .filter(|object| type_name.as_deref().map_or(true, |t| has_type(object, t)))
                .collect();
            if objects.is_empty() {
                FieldValue::Missing
            } else {
                FieldValue::Json(Value::Array(objects))
            }
        }
        FieldSource::Images { selector } => {
            let images = image_records(scope, selector, page.base);
            if images.is_empty() {
                FieldValue::Missing
            } else {
                FieldValue::Records(images)
            }
        }
    }
}

fn element_value(element: ElementRef<'_>, attr: Option<&str>, base: &Url) -> Option<String> {
    match attr {
        None => Some(element_text(element)),
        Some(name) => {
            let raw = element.value().attr(name)?;
            if LINK_ATTRIBUTES.contains(&name) {
                if let Some(resolved) = resolve_link(raw, base) {
                    return Some(resolved.to_string());
                }
            }
            Some(raw.trim().to_string())
        }
    }
}

/// Element text with runs of whitespace collapsed to single spaces
fn element_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn link_of(element: ElementRef<'_>, base: &Url) -> Option<Url> {
    if let Some(href) = element.value().attr("href") {
        return resolve_link(href, base);
    }

    let anchor = Selector::parse("a[href]").ok()?;
    element
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_link(href, base))
}

/// `(key, content)` pairs, title first
fn page_metadata(root: ElementRef<'_>) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();

    let (Ok(title_selector), Ok(meta_selector)) =
        (Selector::parse("title"), Selector::parse("meta[content]"))
    else {
        return entries;
    };

    if let Some(title) = root.select(&title_selector).next() {
        let title = element_text(title);
        if !title.is_empty() {
            entries.push(("title".to_string(), title));
        }
    }

    for meta in root.select(&meta_selector) {
        let element = meta.value();
        let Some(key) = element.attr("name").or_else(|| element.attr("property")) else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        let content = element.attr("content").unwrap_or_default().trim().to_string();

        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = content,
            None => entries.push((key, content)),
        }
    }

    entries
}

fn json_ld_objects(root: ElementRef<'_>) -> Vec<Value> {
    let Ok(script_selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    let mut objects = Vec::new();
    for script in root.select(&script_selector) {
        let body: String = script.text().collect();
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(Value::Array(items)) => objects.extend(items),
            Ok(Value::Object(mut object)) => match object.remove("@graph") {
                Some(Value::Array(graph)) => objects.extend(graph),
                Some(graph) => {
                    object.insert("@graph".to_string(), graph);
                    objects.push(Value::Object(object));
                }
                None => objects.push(Value::Object(object)),
            },
            Ok(other) => tracing::debug!("Ignoring JSON-LD block that is not an object: {}", other),
            Err(e) => tracing::debug!("Skipping invalid JSON-LD block: {}", e),
        }
    }
    objects
}

/// `@type` may be a single name or a list of names
fn has_type(object: &Value, type_name: &str) -> bool {
    match object.get("@type") {
        Some(Value::String(name)) => name == type_name,
        Some(Value::Array(names)) => names.iter().any(|name| name.as_str() == Some(type_name)),
        _ => false,
    }
}

/// Lazy-loaded images keep the real URL in `data-src`
fn image_records(scope: ElementRef<'_>, selector: &CompiledSelector, base: &Url) -> Vec<Record> {
    scope
        .select(selector.selector())
        .filter_map(|image| {
            let element = image.value();
            let url = ["src", "data-src"]
                .iter()
                .find_map(|name| element.attr(name).and_then(|src| resolve_link(src, base)))?;
            let text_attr = |name: &str| {
                element
                    .attr(name)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map_or(FieldValue::Missing, |value| FieldValue::Text(value.to_string()))
            };

            Some(
                [
                    ("url".to_string(), FieldValue::Text(url.to_string())),
                    ("alt".to_string(), text_attr("alt")),
                    ("title".to_string(), text_attr("title")),
                ]
                .into_iter()
                .collect(),
            )
        })
        .collect()
}

/// Header row: the `thead` row if there is one, else the first row.
/// Data rows are padded with `Missing` or truncated to the header width.
fn table_records(scope: ElementRef<'_>, selector: &CompiledSelector) -> Vec<Record> {
    let Some(table) = scope.select(selector.selector()).next() else {
        tracing::debug!("No table matched '{}'", selector.as_str());
        return Vec::new();
    };

    let (Ok(row_selector), Ok(head_selector), Ok(cell_selector)) = (
        Selector::parse("tr"),
        Selector::parse("thead tr"),
        Selector::parse("th, td"),
    ) else {
        return Vec::new();
    };

    let Some(header_row) = table
        .select(&head_selector)
        .next()
        .or_else(|| table.select(&row_selector).next())
    else {
        return Vec::new();
    };

    let headers: Vec<String> = header_row
        .select(&cell_selector)
        .enumerate()
        .map(|(i, cell)| {
            let name = element_text(cell);
            if name.is_empty() {
                format!("column_{}", i + 1)
            } else {
                name
            }
        })
        .collect();

    if headers.is_empty() {
        tracing::debug!("Table '{}' has an empty header row", selector.as_str());
        return Vec::new();
    }

    table
        .select(&row_selector)
        .filter(|row| row.id() != header_row.id())
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&cell_selector).map(element_text).collect();
            if cells.is_empty() {
                return None;
            }
            if cells.len() != headers.len() {
                tracing::trace!(
                    "Table row has {} cells, header has {}",
                    cells.len(),
                    headers.len()
                );
            }

            let mut cells = cells.into_iter();
            Some(
                headers
                    .iter()
                    .map(|name| {
                        let value = cells.next().map_or(FieldValue::Missing, FieldValue::Text);
                        (name.clone(), value)
                    })
                    .collect(),
            )
        })
        .collect()
}
