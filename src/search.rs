//! Search orchestration: glob criteria compiled per field, server filters
//! attached to the pager, and every candidate re-checked client-side while
//! it streams past.

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::client::ApiClient;
use crate::glob::{self, PatternError, Predicate};

/// A compiled set of search criteria. Terms intersect (every term must
/// match); within one term the candidate fields union, so a bare pattern
/// matches a record on any of the command's default fields.
#[derive(Debug)]
pub struct SearchQuery {
    params: Vec<(String, String)>,
    terms: Vec<Vec<Predicate>>,
}

impl SearchQuery {
    /// Compile criteria tokens. A token of the form `field:pattern` targets
    /// that field alone; anything else is a pattern applied to every default
    /// field. Only single-field terms contribute server filters: a
    /// cross-field union cannot be expressed with per-field filter keys
    /// without risking false negatives, so those terms filter client-side
    /// only.
    pub fn build(default_fields: &[&str], criteria: &[String]) -> Result<Self, PatternError> {
        let mut params = Vec::new();
        let mut terms = Vec::new();
        for token in criteria {
            let (fields, pattern) = match token.split_once(':') {
                Some((field, pattern)) if !field.is_empty() && !pattern.is_empty() => {
                    (vec![field], pattern)
                }
                _ => (default_fields.to_vec(), token.as_str()),
            };
            let mut alternates = Vec::with_capacity(fields.len());
            for field in &fields {
                let (filters, predicate) = glob::compile(field, pattern)?;
                if fields.len() == 1 {
                    params.extend(filters.to_query());
                }
                alternates.push(predicate);
            }
            terms.push(alternates);
        }
        Ok(Self { params, terms })
    }

    /// Server-side narrowing parameters, safe to AND onto the resource
    /// query.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// True when every term matches the record on at least one of its
    /// fields.
    pub fn matches(&self, record: &Value) -> bool {
        self.terms
            .iter()
            .all(|alternates| alternates.iter().any(|p| p.matches(record)))
    }
}

/// Stream a resource through the compiled query: the server sees the
/// narrowing filters, the predicates make the final call on each record as
/// it arrives.
pub fn search_pager<'a>(
    client: &'a ApiClient,
    resource: &str,
    query: &'a SearchQuery,
    extra: &[(String, String)],
    page_size: Option<u64>,
) -> impl Iterator<Item = Result<Value>> + 'a {
    let mut params = query.params().to_vec();
    params.extend(extra.iter().cloned());
    let mut pager = client.get_pager(resource, &params);
    if let Some(size) = page_size {
        pager = pager.page_size(size);
    }
    pager.filter(move |row| match row {
        Ok(record) => query.matches(record),
        Err(_) => true,
    })
}

/// First record whose `selectors` field matches `criteria`, trying each
/// selector in order with its own narrowed pager.
pub fn get_by(
    client: &ApiClient,
    selectors: &[&str],
    resource: &str,
    criteria: &str,
) -> Result<Option<Value>> {
    for field in selectors {
        let (filters, predicate) = glob::compile(field, criteria)?;
        for row in client.get_pager(resource, &filters.to_query()) {
            let row = row?;
            if predicate.matches(&row) {
                return Ok(Some(row));
            }
        }
    }
    Ok(None)
}

/// Resolve a resource by numeric id or by name glob; missing records are an
/// error naming the resource.
pub fn get_by_id_or_name(client: &ApiClient, resource: &str, ident: &str) -> Result<Value> {
    let mut selectors = vec!["name"];
    if !ident.is_empty() && ident.chars().all(|c| c.is_ascii_digit()) {
        selectors.insert(0, "id");
    }
    get_by(client, &selectors, resource, ident)?
        .ok_or_else(|| anyhow!("{} not found: {}", resource_label(resource), ident))
}

fn resource_label(resource: &str) -> String {
    let singular = resource.strip_suffix('s').unwrap_or(resource);
    let mut chars = singular.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
