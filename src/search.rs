//! CMR query construction, pagination and response decoding.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::xml;

pub(crate) const DEFAULT_GRANULE_LIMIT: usize = 20;
pub(crate) const DEFAULT_COLLECTION_LIMIT: usize = 100;

/// Filters for a granule or collection search.
///
/// Each filter contributes only its own query parameters. Values containing
/// `|` are sent as repeated `name[]` parameters, and values containing `*`
/// or `?` turn on CMR pattern matching for that parameter.
///
/// ```
/// use maap::SearchQuery;
///
/// let query = SearchQuery::new()
///     .short_name("GEDI02_A")
///     .bounding_box("-122.5,37.5,-121.5,38.5")
///     .limit(5);
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    filters: Vec<(String, String)>,
    limit: Option<usize>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-text search across record metadata.
    pub fn keyword(self, value: impl Into<String>) -> Self {
        self.param("keyword", value)
    }

    pub fn short_name(self, value: impl Into<String>) -> Self {
        self.param("short_name", value)
    }

    pub fn concept_id(self, value: impl Into<String>) -> Self {
        self.param("concept_id", value)
    }

    pub fn collection_concept_id(self, value: impl Into<String>) -> Self {
        self.param("collection_concept_id", value)
    }

    pub fn readable_granule_name(self, value: impl Into<String>) -> Self {
        self.param("readable_granule_name", value)
    }

    pub fn provider(self, value: impl Into<String>) -> Self {
        self.param("provider", value)
    }

    pub fn instrument(self, value: impl Into<String>) -> Self {
        self.param("instrument", value)
    }

    pub fn platform(self, value: impl Into<String>) -> Self {
        self.param("platform", value)
    }

    /// `west,south,east,north` in degrees.
    pub fn bounding_box(self, value: impl Into<String>) -> Self {
        self.param("bounding_box", value)
    }

    /// `start,end` as ISO 8601 timestamps; either side may be open.
    pub fn temporal(self, value: impl Into<String>) -> Self {
        self.param("temporal", value)
    }

    /// Closed ring of `lon,lat` pairs.
    pub fn polygon(self, value: impl Into<String>) -> Self {
        self.param("polygon", value)
    }

    /// Any other CMR parameter, or the name of an indexed attribute
    /// (such as `site_name`).
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.filters.retain(|(k, _)| *k != name);
        self.filters.push((name, value.into()));
        self
    }

    /// Maximum number of results to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Checks filter values and combinations without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(Error::validation("limit must be at least 1"));
        }

        for (name, value) in &self.filters {
            if name.trim().is_empty() {
                return Err(Error::validation("search parameter names must not be empty"));
            }
            if value.trim().is_empty() {
                return Err(Error::validation(format!(
                    "search parameter {:?} has an empty value",
                    name
                )));
            }
            match name.as_str() {
                "bounding_box" => validate_bounding_box(value)?,
                "temporal" => validate_temporal(value)?,
                "polygon" => validate_polygon(value)?,
                _ => {}
            }
        }

        if self.has("bounding_box") && self.has("polygon") {
            return Err(Error::validation(
                "bounding_box and polygon cannot be combined; pick one spatial filter",
            ));
        }
        Ok(())
    }

    /// Query parameters for the catalog, excluding pagination.
    pub fn to_params(&self, indexed_attributes: &[String]) -> Result<Vec<(String, String)>> {
        self.validate()?;

        let mut params = Vec::new();
        for (name, value) in &self.filters {
            match lookup_indexed_attribute(indexed_attributes, name) {
                Some((attribute, data_type)) => {
                    let wildcard = value.contains(['*', '?']);
                    for part in value.split('|') {
                        params.push((
                            "attribute[]".to_string(),
                            format!("{},{},{}", data_type, attribute, part),
                        ));
                    }
                    if wildcard {
                        params.push(("options[attribute][pattern]".to_string(), "true".to_string()));
                    }
                }
                None => push_terms(&mut params, name, value),
            }
        }
        Ok(params)
    }

    fn has(&self, name: &str) -> bool {
        self.filters.iter().any(|(k, _)| k == name)
    }
}

fn push_terms(params: &mut Vec<(String, String)>, name: &str, value: &str) {
    if value.contains('|') {
        for part in value.split('|') {
            params.push((format!("{}[]", name), part.to_string()));
        }
    } else if value.contains(['*', '?']) {
        params.push((format!("options[{}][pattern]", name), "true".to_string()));
        params.push((name.to_string(), value.to_string()));
    } else {
        params.push((name.to_string(), value.to_string()));
    }
}

/// `param,Attribute Name,type` -> (`Attribute Name`, `type`) for `param`.
fn lookup_indexed_attribute<'a>(
    indexed: &'a [String],
    name: &str,
) -> Option<(&'a str, &'a str)> {
    indexed.iter().find_map(|entry| {
        let mut parts = entry.splitn(3, ',');
        let param = parts.next()?.trim();
        let attribute = parts.next()?.trim();
        let data_type = parts.next()?.trim();
        (param == name).then_some((attribute, data_type))
    })
}

fn parse_numbers(field: &str, value: &str) -> Result<Vec<f64>> {
    value
        .split(',')
        .map(|p| {
            p.trim().parse::<f64>().map_err(|_| {
                Error::validation(format!("{} has a non-numeric coordinate {:?}", field, p))
            })
        })
        .collect()
}

fn validate_bounding_box(value: &str) -> Result<()> {
    let coords = parse_numbers("bounding_box", value)?;
    let [west, south, east, north] = coords[..] else {
        return Err(Error::validation(
            "bounding_box must be west,south,east,north",
        ));
    };
    for lon in [west, east] {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(Error::validation(format!(
                "bounding_box longitude {} is outside [-180, 180]",
                lon
            )));
        }
    }
    for lat in [south, north] {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(Error::validation(format!(
                "bounding_box latitude {} is outside [-90, 90]",
                lat
            )));
        }
    }
    if south > north {
        return Err(Error::validation("bounding_box south must not exceed north"));
    }
    Ok(())
}

fn validate_temporal(value: &str) -> Result<()> {
    match value.split_once(',') {
        Some((start, end)) if !(start.trim().is_empty() && end.trim().is_empty()) => Ok(()),
        _ => Err(Error::validation("temporal must be start,end")),
    }
}

fn validate_polygon(value: &str) -> Result<()> {
    let coords = parse_numbers("polygon", value)?;
    if coords.len() < 8 || coords.len() % 2 != 0 {
        return Err(Error::validation(
            "polygon needs at least four lon,lat pairs",
        ));
    }
    Ok(())
}

/// Fetches pages `1..` until `limit` records are collected or the catalog
/// runs dry, then truncates to `limit`.
pub(crate) fn collect_pages<F>(limit: usize, page_size: usize, mut fetch: F) -> Result<Vec<Value>>
where
    F: FnMut(usize, usize) -> Result<Vec<Value>>,
{
    let page_size = page_size.max(1);
    let mut results = Vec::new();
    let mut page_num = 1;

    while results.len() < limit {
        let page = fetch(page_num, page_size)?;
        let count = page.len();
        debug!(page_num, count, "fetched catalog page");
        results.extend(page);

        if count < page_size {
            break;
        }
        page_num += 1;
    }

    results.truncate(limit);
    Ok(results)
}

/// Decodes one catalog page into record values.
pub(crate) fn parse_search_response(body: &str) -> Result<Vec<Value>> {
    let mut text = body.trim().to_string();

    // The platform proxy may hand back the XML as a JSON string.
    if text.starts_with('"') {
        text = serde_json::from_str::<String>(&text)?;
    }
    if let Some(rest) = text.trim_start().strip_prefix("CMR Error ") {
        text = rest.to_string();
    }

    let doc = xml::parse(&text)?;
    if doc.name == "errors" || doc.children.iter().any(|c| c.name == "error") {
        let messages: Vec<&str> = doc
            .children
            .iter()
            .filter(|c| c.name == "error")
            .filter_map(|n| n.text())
            .collect();
        return Err(Error::Catalog(if messages.is_empty() {
            text
        } else {
            messages.join("; ")
        }));
    }

    Ok(doc
        .children
        .iter()
        .filter(|c| c.name == "result")
        .map(|c| c.to_value())
        .collect())
}
