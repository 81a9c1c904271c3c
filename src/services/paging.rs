//! Result paging: lazy page traversal and coverage checks.

use futures::stream::{self, Stream, StreamExt};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::binding::request::query_element;
use crate::binding::{Operation, WfsClient, WfsRequest, WfsResponse};
use crate::error::{ConformanceError, ConformanceResult};
use crate::feature::{self, FeatureRecord};
use crate::filter::FilterExpression;
use crate::validation::checks::{number_returned, number_returned_consistent};
use crate::validation::{Check, Expectations, ResponseValidator, SchemaRef};
use crate::xml::namespaces::FES;
use crate::xml::{Element, QName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

/// The query every page repeats.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub type_name: QName,
    pub filter: Option<FilterExpression>,
    pub sort_by: Vec<(QName, SortOrder)>,
}

impl QueryTemplate {
    pub fn new(type_name: QName) -> Self {
        Self {
            type_name,
            filter: None,
            sort_by: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, property: QName, order: SortOrder) -> Self {
        self.sort_by.push((property, order));
        self
    }

    fn query(&self) -> Element {
        let mut query = query_element(&self.type_name, self.filter.as_ref());
        if !self.sort_by.is_empty() {
            let mut sort = Element::new(FES, "SortBy");
            for (property, order) in &self.sort_by {
                query = query.declare_name(property);
                sort.push(
                    Element::new(FES, "SortProperty")
                        .child(Element::new(FES, "ValueReference").text(property.prefixed()))
                        .child(Element::new(FES, "SortOrder").text(order.to_string())),
                );
            }
            query.push(sort);
        }
        query
    }

    pub fn request(&self, version: &str) -> WfsRequest {
        WfsRequest::new(Operation::GetFeature, version).child(self.query())
    }
}

/// Position of one page request. Recomputed for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub start_index: u64,
    pub page_size: u64,
    pub total_known: Option<u64>,
}

impl PageCursor {
    pub fn first(page_size: u64) -> Self {
        Self {
            start_index: 0,
            page_size: page_size.max(1),
            total_known: None,
        }
    }
}

/// Values of the sort properties of one feature, in `sort_by` order.
pub type SortKey = Vec<Option<String>>;

#[derive(Debug, Clone)]
pub struct Page {
    pub cursor: PageCursor,
    pub ids: Vec<String>,
    /// One entry per identifier; empty for unsorted queries
    pub sort_keys: Vec<SortKey>,
    pub number_matched: Option<u64>,
    pub number_returned: Option<u64>,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl Page {
    /// Cursor for the following page, or `None` once the result set is exhausted.
    pub fn next_cursor(&self) -> Option<PageCursor> {
        let returned = self.ids.len() as u64;
        if returned == 0 {
            return None;
        }
        let start_index = self.cursor.start_index + returned;
        let total = self.cursor.total_known.or(self.number_matched);
        match total {
            Some(total) if start_index >= total => None,
            None if returned < self.cursor.page_size => None,
            _ => Some(PageCursor {
                start_index,
                page_size: self.cursor.page_size,
                total_known: total,
            }),
        }
    }
}

pub struct PagingController {
    client: Arc<WfsClient>,
    validator: ResponseValidator,
}

impl PagingController {
    pub fn new(client: Arc<WfsClient>, validator: ResponseValidator) -> Self {
        Self { client, validator }
    }

    /// Lazy traversal of every page of `template`. Each call starts afresh at index 0.
    pub fn paginate<'a>(
        &'a self,
        template: &'a QueryTemplate,
        page_size: u64,
    ) -> impl Stream<Item = ConformanceResult<Page>> + 'a {
        stream::unfold(Some(PageCursor::first(page_size)), move |cursor| async move {
            let cursor = cursor?;
            match self.fetch_page(template, cursor).await {
                Ok(page) => {
                    let next = page.next_cursor();
                    Some((Ok(page), next))
                }
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    pub async fn fetch_page(&self, template: &QueryTemplate, cursor: PageCursor) -> ConformanceResult<Page> {
        let request = template
            .request(self.client.version())
            .attr("startIndex", cursor.start_index)
            .attr("count", cursor.page_size);
        let response = self.client.send(&request).await?;
        self.validator.require(
            &response,
            SchemaRef::FeatureCollection,
            &Expectations::success().check(number_returned_consistent()),
        )?;
        let page = parse_page(&response, cursor, &template.sort_by)?;
        tracing::debug!(
            start_index = cursor.start_index,
            returned = page.ids.len(),
            matched = ?page.number_matched,
            "Fetched page"
        );
        if page.ids.len() as u64 > cursor.page_size {
            return Err(ConformanceError::business_rule(format!(
                "Page at {} holds {} features, more than count={}",
                cursor.start_index,
                page.ids.len(),
                cursor.page_size
            ))
            .with_exchange(&response.exchange));
        }
        Ok(page)
    }

    /// The whole result of one request without paging parameters.
    pub async fn unpaged(&self, template: &QueryTemplate) -> ConformanceResult<Page> {
        let response = self.client.send(&template.request(self.client.version())).await?;
        self.validator
            .require_success(&response, SchemaRef::FeatureCollection)?;
        let page = parse_page(&response, PageCursor::first(u64::MAX), &template.sort_by)?;
        if let Some(matched) = page.number_matched
            && matched > page.ids.len() as u64
        {
            return Err(ConformanceError::Inapplicable(format!(
                "Unpaged query returned {} of {} features; CountDefault truncates the reference set",
                page.ids.len(),
                matched
            )));
        }
        Ok(page)
    }

    /// Traverse every page and compare with the unpaged result: no duplicates,
    /// no gaps, and the same order when the service advertises a stable one.
    pub async fn verify_coverage(&self, template: &QueryTemplate, page_size: u64) -> ConformanceResult<()> {
        let reference = self.unpaged(template).await?;
        let page_size = page_size.max(1);
        // A service ignoring startIndex would otherwise never exhaust.
        let max_pages = reference.ids.len() as u64 / page_size + 2;

        let pages: Vec<ConformanceResult<Page>> = self
            .paginate(template, page_size)
            .take(max_pages as usize)
            .collect()
            .await;
        let mut paged = Vec::new();
        let mut paged_keys = Vec::new();
        for page in pages {
            let page = page?;
            paged.extend(page.ids);
            paged_keys.extend(page.sort_keys);
        }

        let mut seen = HashSet::new();
        let duplicates: Vec<&String> = paged.iter().filter(|id| !seen.insert(id.as_str())).collect();
        if !duplicates.is_empty() {
            return Err(ConformanceError::business_rule(format!(
                "Identifiers repeated across pages of size {}: {:?}",
                page_size, duplicates
            )));
        }

        let expected: HashSet<&str> = reference.ids.iter().map(String::as_str).collect();
        let missing: Vec<&&str> = expected.iter().filter(|id| !seen.contains(**id)).collect();
        let extra: Vec<&&str> = seen.iter().filter(|id| !expected.contains(**id)).collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(ConformanceError::business_rule(format!(
                "Paged result differs from unpaged result: missing {:?}, unexpected {:?}",
                missing, extra
            )));
        }

        let capabilities = self.client.capabilities();
        let sorted = !template.sort_by.is_empty() && capabilities.implements_sorting();
        let stable = sorted || capabilities.paging_is_transaction_safe();
        if let Some(mismatch) = order_mismatch(&reference, &paged, &paged_keys, sorted, stable) {
            return Err(ConformanceError::business_rule(mismatch));
        }
        tracing::info!(
            type_name = %template.type_name.prefixed(),
            page_size,
            features = paged.len(),
            ordered = stable,
            "Paging coverage verified"
        );
        Ok(())
    }

    /// `resultType=hits` with a count: no members, and a `next` link when more
    /// features match than fit on the page.
    pub async fn verify_hits_page(&self, template: &QueryTemplate, page_size: u64) -> ConformanceResult<()> {
        let request = template
            .request(self.client.version())
            .attr("resultType", "hits")
            .attr("count", page_size);
        let response = self.client.send(&request).await?;
        let next_present = Check::new("next link on a partial hits page", move |root| {
            let matched = root
                .attribute("numberMatched")
                .and_then(|m| m.parse::<u64>().ok());
            match matched {
                Some(m) if m <= page_size => Ok(()),
                _ if root.attribute("next").is_some() => Ok(()),
                _ => Err("hits response lacks a next link".to_string()),
            }
        });
        self.validator.require(
            &response,
            SchemaRef::FeatureCollection,
            &Expectations::success()
                .check(number_returned(0))
                .check(next_present),
        )
    }

    /// Follow `next` from the first page, then `previous` back; the first page must reappear.
    pub async fn verify_link_round_trip(&self, template: &QueryTemplate, page_size: u64) -> ConformanceResult<()> {
        let first = self.fetch_page(template, PageCursor::first(page_size)).await?;
        let next = first.next.clone().ok_or_else(|| {
            ConformanceError::Inapplicable(format!(
                "First page of {} has no next link",
                template.type_name.prefixed()
            ))
        })?;
        let second = self.follow(&next, first.cursor).await?;
        let previous = second.previous.clone().ok_or_else(|| {
            ConformanceError::business_rule("Second page has no previous link")
        })?;
        let back = self.follow(&previous, first.cursor).await?;
        if back.ids != first.ids {
            return Err(ConformanceError::business_rule(format!(
                "Following previous from the second page returned {:?}, the first page held {:?}",
                back.ids, first.ids
            )));
        }
        Ok(())
    }

    async fn follow(&self, link: &str, cursor: PageCursor) -> ConformanceResult<Page> {
        let response = self.client.fetch_link(link).await?;
        self.validator
            .require_success(&response, SchemaRef::FeatureCollection)?;
        parse_page(&response, cursor, &[])
    }
}

/// Why the paged order disagrees with the unpaged one, if it must agree.
/// Sorted results only fix the sequence of sort keys; features with equal
/// keys may come back in any order.
fn order_mismatch(
    reference: &Page,
    paged: &[String],
    paged_keys: &[SortKey],
    sorted: bool,
    stable: bool,
) -> Option<String> {
    if sorted {
        (paged_keys != reference.sort_keys.as_slice()).then(|| {
            format!(
                "Paged sort keys {:?} differ from unpaged sort keys {:?}",
                paged_keys, reference.sort_keys
            )
        })
    } else if stable {
        (paged != reference.ids.as_slice()).then(|| {
            format!(
                "Paged order {:?} differs from unpaged order {:?}",
                paged, reference.ids
            )
        })
    } else {
        None
    }
}

fn parse_page(
    response: &WfsResponse,
    cursor: PageCursor,
    sort_by: &[(QName, SortOrder)],
) -> ConformanceResult<Page> {
    let doc = response.document()?;
    let root = doc.root_element();
    let count = |name: &str| root.attribute(name).and_then(|v| v.trim().parse::<u64>().ok());
    let members: Vec<_> = feature::features(root)
        .into_iter()
        .filter(|f| feature::feature_id(*f).is_some())
        .collect();
    let sort_keys = if sort_by.is_empty() {
        Vec::new()
    } else {
        members
            .iter()
            .map(|f| {
                let record = FeatureRecord::from_node(*f);
                sort_by
                    .iter()
                    .map(|(property, _)| record.value(&property.local_name).map(str::to_string))
                    .collect()
            })
            .collect()
    };
    Ok(Page {
        cursor,
        ids: members
            .iter()
            .filter_map(|f| feature::feature_id(*f).map(str::to_string))
            .collect(),
        sort_keys,
        number_matched: count("numberMatched"),
        number_returned: count("numberReturned"),
        next: root.attribute("next").map(str::to_string),
        previous: root.attribute("previous").map(str::to_string),
    })
}
