//! Common test utilities and fixtures
//!
//! `MockWfs` is an in-process WFS 2.0 service backed by an in-memory store of
//! `tns:Place` and `tns:Landmark` features. It answers the XML and SOAP
//! encodings over POST and GetCapabilities plus paging links over KVP GET.
//! The store keeps version histories, locks and stored queries, and answers
//! spatial joins of the two types, so the full suite can run against it.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::{RawQuery, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use roxmltree::{Document, Node};

use wfsconform::config::Config;
use wfsconform::error::Verdict;
use wfsconform::feature::FeatureRecord;
use wfsconform::filter::{
    FilterExpression, JoinOperand, ResourceIdPredicate, SpatialJoin, SpatialOp, VersionAction,
};
use wfsconform::filter::{decode::decode_filter, eval};
use wfsconform::suite::{RunReport, Runner, Suite, classes};
use wfsconform::xml::element::escape;
use wfsconform::xml::namespaces::{FES, GML, OWS, QName, SOAP12, WFS, WFS_QUERY_LANGUAGE, XSD, XSI};
use wfsconform::xml::{Element, reader};

pub const TNS: &str = "http://example.org/wfsconform/places";
const COUNT_DEFAULT: usize = 1000;
const FEATURE_TYPES: [&str; 2] = ["Place", "Landmark"];
const BUILT_IN: [&str; 2] = ["urn:ogc:def:query:OGC-WFS::GetFeatureById", "GetFeatureById"];

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("wfsconform=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Deliberate deviations, for tests that must see the suite fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct Defects {
    /// Every page starts at the first feature.
    pub ignore_start_index: bool,
    /// Transactions ignore locks held by others.
    pub ignore_locks: bool,
    /// Queries on this feature type ignore their filter.
    pub unfiltered_type: Option<&'static str>,
    /// A created stored query stays out of this many listings.
    pub delayed_listing: usize,
    /// Updates overwrite the current version instead of adding one.
    pub stale_versions: bool,
    /// Deletes are reported but leave the feature in place.
    pub keep_deleted: bool,
}

#[derive(Clone)]
pub struct MockWfs {
    pub base: String,
    store: Arc<Mutex<Store>>,
}

impl MockWfs {
    pub async fn start() -> Self {
        Self::with_defects(Defects::default()).await
    }

    pub async fn with_defects(defects: Defects) -> Self {
        init_logging();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("mock address");
        let mock = Self {
            base: format!("http://{}/wfs", addr),
            store: Arc::new(Mutex::new(Store::seeded(defects))),
        };

        let app = Router::new()
            .route("/wfs", get(handle_get).post(handle_post))
            .with_state(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        mock
    }

    /// Suite configuration pointing at this service, tuned for fast runs.
    pub fn config(&self) -> Config {
        let mut config = Config::for_endpoint(self.base.clone());
        config.stored_query_retries = 3;
        config.stored_query_backoff_ms = 10;
        config.request_timeout_secs = 10;
        config.random_seed = Some(7);
        config
    }

    /// Identifiers of the features that are currently live.
    pub fn live_ids(&self) -> Vec<String> {
        let store = self.store.lock().unwrap();
        store.live().map(|(id, _)| id.clone()).collect()
    }

    pub fn stored_query_ids(&self) -> Vec<String> {
        let store = self.store.lock().unwrap();
        store.stored_queries.keys().cloned().collect()
    }

    pub fn lock_count(&self) -> usize {
        let mut store = self.store.lock().unwrap();
        store.purge_locks();
        store.locks.len()
    }

    fn dispatch(&self, source: &str) -> Result<String, Fault> {
        let doc = Document::parse(source)
            .map_err(|e| Fault::new(StatusCode::BAD_REQUEST, "OperationParsingFailed", None, e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().namespace() != Some(WFS) {
            return Err(Fault::new(
                StatusCode::BAD_REQUEST,
                "OperationNotSupported",
                Some(root.tag_name().name()),
                "not a WFS request",
            ));
        }

        let mut store = self.store.lock().unwrap();
        match root.tag_name().name() {
            "GetCapabilities" => Ok(capabilities(&self.base)),
            "DescribeFeatureType" => describe_feature_type(root),
            "GetFeature" => store.get_feature(root, &self.base),
            "GetFeatureWithLock" => store.get_feature_with_lock(root),
            "GetPropertyValue" => store.get_property_value(root),
            "LockFeature" => store.lock_feature(root),
            "Transaction" => store.transaction(root),
            "ListStoredQueries" => Ok(store.list_stored_queries()),
            "DescribeStoredQueries" => store.describe_stored_queries(root),
            "CreateStoredQuery" => store.create_stored_query(root),
            "DropStoredQuery" => store.drop_stored_query(root),
            other => Err(Fault::new(
                StatusCode::BAD_REQUEST,
                "OperationNotSupported",
                Some(other),
                "unknown operation",
            )),
        }
    }

    fn dispatch_kvp(&self, params: &HashMap<String, String>) -> Result<String, Fault> {
        let request = params.get("REQUEST").map(String::as_str).unwrap_or("");
        match request {
            "GetCapabilities" => Ok(capabilities(&self.base)),
            // Paging links carry the type and the window only
            "GetFeature" => {
                let type_names = params.get("TYPENAMES").map(String::as_str).unwrap_or("");
                let type_name = type_names
                    .rsplit(':')
                    .next()
                    .filter(|name| FEATURE_TYPES.contains(name))
                    .ok_or_else(|| Fault::invalid("typeNames", format!("unknown type {}", type_names)))?;
                let number = |name: &str| params.get(name).and_then(|v| v.parse::<usize>().ok());
                let window = Window {
                    start: number("STARTINDEX").unwrap_or(0),
                    count: number("COUNT"),
                    hits: false,
                };
                let store = self.store.lock().unwrap();
                Ok(store.page(&QuerySpec::of(type_name), window, &self.base))
            }
            other => Err(Fault::new(
                StatusCode::BAD_REQUEST,
                "OperationNotSupported",
                Some("request"),
                format!("{} is not offered over KVP", other),
            )),
        }
    }
}

/// Run every registered test against `config` and return the report.
pub async fn run_suite(config: Config) -> RunReport {
    init_logging();
    let config = Arc::new(config);
    let suite = Arc::new(Suite::new(config.clone()));
    Runner::new(suite, config.concurrency)
        .run(classes::all())
        .await
        .expect("suite initialization")
}

pub fn assert_verdict(report: &RunReport, name: &str, verdict: Verdict) {
    let outcome = report
        .outcome(name)
        .unwrap_or_else(|| panic!("{} was not run", name));
    assert_eq!(
        outcome.verdict, verdict,
        "{}: reason {:?}, violations {:?}",
        name, outcome.reason, outcome.violations
    );
}

async fn handle_get(State(mock): State<MockWfs>, RawQuery(query): RawQuery) -> Response {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .map(|(k, v)| (k.to_ascii_uppercase(), v.into_owned()))
        .collect();
    respond(mock.dispatch_kvp(&params), false)
}

async fn handle_post(State(mock): State<MockWfs>, body: String) -> Response {
    match unwrap_soap(&body) {
        Ok(Some(payload)) => respond(mock.dispatch(&payload), true),
        Ok(None) => respond(mock.dispatch(&body), false),
        Err(fault) => respond(Err(fault), false),
    }
}

/// The request carried in a SOAP body, or `None` for a plain XML request.
fn unwrap_soap(body: &str) -> Result<Option<String>, Fault> {
    let doc = Document::parse(body)
        .map_err(|e| Fault::new(StatusCode::BAD_REQUEST, "OperationParsingFailed", None, e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "Envelope" {
        return Ok(None);
    }
    reader::elements(root)
        .find(|n| n.tag_name().name() == "Body")
        .and_then(reader::first_element)
        .map(|request| Some(Element::from_node(request).to_string()))
        .ok_or_else(|| Fault::new(StatusCode::BAD_REQUEST, "OperationParsingFailed", None, "empty SOAP body"))
}

fn respond(result: Result<String, Fault>, soap: bool) -> Response {
    let (status, payload) = match result {
        Ok(body) => (StatusCode::OK, body),
        Err(fault) => (fault.status, fault.report()),
    };
    if !soap {
        return (status, [(header::CONTENT_TYPE, "application/xml")], payload).into_response();
    }

    let content = if status.is_success() {
        payload
    } else {
        format!(
            r#"<soap:Fault><soap:Code><soap:Value>soap:Sender</soap:Value></soap:Code><soap:Reason><soap:Text xml:lang="en">Request failed</soap:Text></soap:Reason><soap:Detail>{}</soap:Detail></soap:Fault>"#,
            strip_declaration(&payload)
        )
    };
    let envelope = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{}"><soap:Body>{}</soap:Body></soap:Envelope>"#,
        SOAP12,
        strip_declaration(&content)
    );
    (status, [(header::CONTENT_TYPE, "application/soap+xml")], envelope).into_response()
}

fn strip_declaration(xml: &str) -> &str {
    match xml.trim_start().strip_prefix("<?xml") {
        Some(rest) => rest.split_once("?>").map(|(_, body)| body).unwrap_or(rest),
        None => xml,
    }
}

struct Fault {
    status: StatusCode,
    code: &'static str,
    locator: Option<String>,
    text: String,
}

impl Fault {
    fn new(status: StatusCode, code: &'static str, locator: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            status,
            code,
            locator: locator.map(str::to_string),
            text: text.into(),
        }
    }

    fn invalid(locator: &str, text: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidParameterValue", Some(locator), text)
    }

    fn missing(locator: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "MissingParameterValue",
            Some(locator),
            format!("{} is required", locator),
        )
    }

    fn report(&self) -> String {
        let mut exception = Element::new(OWS, "Exception").attr("exceptionCode", self.code);
        if let Some(locator) = &self.locator {
            exception.set_attr("locator", locator.clone());
        }
        exception.push(Element::new(OWS, "ExceptionText").text(self.text.clone()));
        Element::new(OWS, "ExceptionReport")
            .attr("version", "2.0.0")
            .child(exception)
            .to_string()
    }
}

fn tns(name: &str) -> Element {
    Element::qualified(&QName::new(TNS, name).with_prefix("tns"))
}

fn place(id: &str, name: &str, population: u32, founded: &str, note: Option<&str>, pos: (f64, f64)) -> Element {
    let note = match note {
        Some(text) => tns("note").text(text),
        None => tns("note").attr_ns(XSI, "nil", "true"),
    };
    tns("Place")
        .declare("tns", TNS)
        .attr_ns(GML, "id", id)
        .child(tns("name").text(name))
        .child(tns("population").text(population.to_string()))
        .child(tns("founded").text(founded))
        .child(note)
        .child(
            tns("geom").child(
                Element::new(GML, "Point")
                    .attr("srsName", "urn:ogc:def:crs:EPSG::4326")
                    .attr_ns(GML, "id", format!("{}.geom", id))
                    .child(Element::new(GML, "pos").text(format!("{} {}", pos.0, pos.1))),
            ),
        )
}

fn landmark(id: &str, label: &str, height: u32, pos: (f64, f64)) -> Element {
    tns("Landmark")
        .declare("tns", TNS)
        .attr_ns(GML, "id", id)
        .child(tns("label").text(label))
        .child(tns("height").text(height.to_string()))
        .child(
            tns("site").child(
                Element::new(GML, "Point")
                    .attr("srsName", "urn:ogc:def:crs:EPSG::4326")
                    .attr_ns(GML, "id", format!("{}.site", id))
                    .child(Element::new(GML, "pos").text(format!("{} {}", pos.0, pos.1))),
            ),
        )
}

fn record(feature: &Element) -> FeatureRecord {
    let source = feature.to_string();
    let doc = Document::parse(&source).expect("stored features are well formed");
    FeatureRecord::from_node(doc.root_element())
}

fn local_name(reference: &str) -> String {
    let last = reference.rsplit('/').next().unwrap_or(reference);
    last.rsplit(':').next().unwrap_or(last).to_string()
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone)]
struct Version {
    feature: Element,
    retired: bool,
}

struct Lock {
    ids: Vec<String>,
    expires: Instant,
}

struct QuerySpec {
    /// Local name of the queried type
    type_name: String,
    filter: Option<FilterExpression>,
    sort: Vec<(String, bool)>,
}

impl QuerySpec {
    fn of(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            filter: None,
            sort: Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
struct Window {
    start: usize,
    count: Option<usize>,
    hits: bool,
}

#[derive(Default)]
struct Outcome {
    inserted: Vec<(String, usize)>,
    updated: Vec<(String, usize)>,
    replaced: Vec<(String, usize)>,
    deleted: usize,
}

struct Store {
    features: IndexMap<String, Vec<Version>>,
    locks: HashMap<String, Lock>,
    stored_queries: IndexMap<String, String>,
    /// Listings each created stored query is still hidden from
    hidden_listings: HashMap<String, usize>,
    next_feature: u64,
    next_lock: u64,
    defects: Defects,
}

impl Store {
    fn seeded(defects: Defects) -> Self {
        let seed = [
            place("p1", "Alpha", 100, "1850-06-01", Some("river"), (1.0, 2.0)),
            place("p2", "Beta", 250, "1901-01-01", None, (5.0, 6.0)),
            place("p3", "Gamma", 42, "1999-12-31", Some("harbour"), (-3.0, 4.0)),
            landmark("l1", "Tower", 120, (1.0, 2.0)),
            landmark("l2", "Bridge", 35, (8.0, 8.0)),
        ];
        let features = seed
            .into_iter()
            .map(|feature| {
                let id = feature.attribute_ns(GML, "id").unwrap_or_default().to_string();
                (id, vec![Version { feature, retired: false }])
            })
            .collect();
        Self {
            features,
            locks: HashMap::new(),
            stored_queries: IndexMap::new(),
            hidden_listings: HashMap::new(),
            next_feature: 0,
            next_lock: 0,
            defects,
        }
    }

    fn live(&self) -> impl Iterator<Item = (&String, &Element)> {
        self.features.iter().filter_map(|(id, versions)| {
            versions
                .last()
                .filter(|v| !v.retired)
                .map(|v| (id, &v.feature))
        })
    }

    fn current(&self, id: &str) -> Option<&Element> {
        live_version(&self.features, id).map(|v| &v.feature)
    }

    fn purge_locks(&mut self) {
        let now = Instant::now();
        self.locks.retain(|_, lock| lock.expires > now);
    }

    fn holder(&self, id: &str) -> Option<&str> {
        self.locks
            .iter()
            .find(|(_, lock)| lock.ids.iter().any(|held| held == id))
            .map(|(lock_id, _)| lock_id.as_str())
    }

    fn select(&self, spec: &QuerySpec) -> Vec<(String, Element)> {
        let unfiltered = self.defects.unfiltered_type == Some(spec.type_name.as_str());
        let mut selected: Vec<(String, Element, FeatureRecord)> = self
            .live()
            .filter(|(_, feature)| feature.is(TNS, &spec.type_name))
            .map(|(id, feature)| (id.clone(), feature.clone(), record(feature)))
            .filter(|(_, _, r)| unfiltered || spec.filter.as_ref().is_none_or(|f| eval::matches(f, r)))
            .collect();

        if !spec.sort.is_empty() {
            selected.sort_by(|a, b| {
                for (property, descending) in &spec.sort {
                    let order = match (a.2.value(property), b.2.value(property)) {
                        (Some(x), Some(y)) => eval::compare(x, y, true).unwrap_or(Ordering::Equal),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    };
                    let order = if *descending { order.reverse() } else { order };
                    if order != Ordering::Equal {
                        return order;
                    }
                }
                Ordering::Equal
            });
        }
        selected.into_iter().map(|(id, feature, _)| (id, feature)).collect()
    }

    fn page(&self, spec: &QuerySpec, window: Window, base: &str) -> String {
        let selected = self.select(spec);
        let matched = selected.len();
        let start = if self.defects.ignore_start_index {
            0
        } else {
            window.start.min(matched)
        };
        let count = window.count.unwrap_or(COUNT_DEFAULT).max(1);
        let end = (start + count).min(matched);

        let mut attributes = Vec::new();
        if start + count < matched {
            attributes.push(("next", page_link(base, &spec.type_name, start + count, count)));
        }
        if window.start > 0 {
            attributes.push((
                "previous",
                page_link(base, &spec.type_name, window.start.saturating_sub(count), count),
            ));
        }

        let members = if window.hits {
            Vec::new()
        } else {
            selected[start..end]
                .iter()
                .map(|(_, feature)| (feature.clone(), None))
                .collect()
        };
        feature_collection(members, matched, attributes)
    }

    fn get_feature(&self, root: Node<'_, '_>, base: &str) -> Result<String, Fault> {
        if let Some(stored) = reader::child(root, WFS, "StoredQuery") {
            return self.invoke_stored_query(stored, root, base);
        }
        let query = reader::child(root, WFS, "Query").ok_or_else(|| Fault::missing("Query"))?;
        if query
            .attribute("typeNames")
            .is_some_and(|names| names.split_whitespace().count() > 1)
        {
            return self.join(query);
        }
        let spec = parse_query(query)?;

        if let Some(FilterExpression::ResourceId(predicates)) = &spec.filter
            && predicates.iter().any(|p| p.version.is_some())
        {
            let members: Vec<(Element, Option<&str>)> = self
                .history(predicates)
                .into_iter()
                .map(|(feature, state)| (feature, Some(state)))
                .collect();
            let matched = members.len();
            return Ok(feature_collection(members, matched, Vec::new()));
        }

        Ok(self.page(&spec, window(root)?, base))
    }

    /// Pairs of live features of two types whose geometries satisfy the
    /// spatial predicate, as `wfs:Tuple` members.
    fn join(&self, query: Node<'_, '_>) -> Result<String, Fault> {
        let type_names = query
            .attribute("typeNames")
            .ok_or_else(|| Fault::missing("typeNames"))?;
        let types = type_names
            .split_whitespace()
            .map(|name| known_type(query, name, "typeNames"))
            .collect::<Result<Vec<_>, _>>()?;
        let aliases: Vec<&str> = query
            .attribute("aliases")
            .map(|a| a.split_whitespace().collect())
            .unwrap_or_default();
        if types.len() != 2 || !(aliases.is_empty() || aliases.len() == 2) {
            return Err(Fault::invalid("typeNames", "joins take exactly two type names"));
        }

        let predicate = reader::child(query, FES, "Filter")
            .and_then(reader::first_element)
            .ok_or_else(|| Fault::missing("Filter"))?;
        let op = SpatialOp::from_element_name(predicate.tag_name().name())
            .ok_or_else(|| Fault::invalid("filter", "joins need a spatial predicate"))?;
        let references: Vec<String> = reader::children(predicate, FES, "ValueReference")
            .map(reader::text)
            .collect();
        let [left, right] = references.as_slice() else {
            return Err(Fault::invalid("filter", "joins compare two value references"));
        };
        let operand = |reference: &str| -> Result<(usize, JoinOperand), Fault> {
            let (head, property) = reference
                .split_once('/')
                .ok_or_else(|| Fault::invalid("ValueReference", format!("{} names no type", reference)))?;
            let index = if aliases.is_empty() {
                let head = known_type(predicate, head, "ValueReference")?;
                types.iter().position(|t| *t == head)
            } else {
                aliases.iter().position(|a| *a == head)
            }
            .ok_or_else(|| Fault::invalid("ValueReference", format!("{} is not queried", head)))?;
            Ok((
                index,
                JoinOperand {
                    type_name: QName::new(TNS, types[index].as_str()),
                    alias: aliases.get(index).map(|a| a.to_string()),
                    property: QName::new(TNS, local_name(property)),
                },
            ))
        };
        let (left_index, left) = operand(left)?;
        let (right_index, right) = operand(right)?;
        if left_index == right_index {
            return Err(Fault::invalid("filter", "join operands name the same type"));
        }
        let join = SpatialJoin { op, left, right };

        let side = |index: usize| self.select(&QuerySpec::of(&types[index]));
        let (first, second) = (side(left_index), side(right_index));
        let mut tuples = Vec::new();
        for (_, a) in &first {
            for (_, b) in &second {
                if eval::join_matches(&join, &record(a), &record(b)) {
                    let pair = if left_index == 0 { [a, b] } else { [b, a] };
                    let mut tuple = Element::new(WFS, "Tuple");
                    for feature in pair {
                        tuple.push(Element::new(WFS, "member").child(feature.clone()));
                    }
                    tuples.push(tuple);
                }
            }
        }

        let mut collection = Element::new(WFS, "FeatureCollection")
            .attr("numberMatched", tuples.len().to_string())
            .attr("numberReturned", tuples.len().to_string())
            .attr("timeStamp", timestamp());
        for tuple in tuples {
            collection.push(Element::new(WFS, "member").child(tuple));
        }
        Ok(collection.to_string())
    }

    /// Versions selected by versioned resource identifiers, with their states.
    fn history(&self, predicates: &[ResourceIdPredicate]) -> Vec<(Element, &'static str)> {
        let mut members = Vec::new();
        for predicate in predicates {
            let Some(versions) = self.features.get(&predicate.rid) else {
                continue;
            };
            let last = versions.len() - 1;
            let indexes: Vec<usize> = match &predicate.version {
                None | Some(VersionAction::Last) | Some(VersionAction::Next) => vec![last],
                Some(VersionAction::First) => vec![0],
                Some(VersionAction::Previous) => last.checked_sub(1).into_iter().collect(),
                Some(VersionAction::All) => (0..=last).collect(),
                Some(VersionAction::Label(label)) => label
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .filter(|i| *i <= last)
                    .into_iter()
                    .collect(),
            };
            for index in indexes {
                let version = &versions[index];
                let state = if version.retired {
                    "retired"
                } else if index < last {
                    "superseded"
                } else {
                    "valid"
                };
                members.push((version.feature.clone(), state));
            }
        }
        members
    }

    fn get_feature_with_lock(&mut self, root: Node<'_, '_>) -> Result<String, Fault> {
        let query = reader::child(root, WFS, "Query").ok_or_else(|| Fault::missing("Query"))?;
        let spec = parse_query(query)?;
        let selected = self.select(&spec);
        let ids: Vec<String> = selected.iter().map(|(id, _)| id.clone()).collect();
        let lock_id = self.acquire(&ids, expiry(root))?;

        let matched = selected.len();
        let members = selected
            .into_iter()
            .map(|(_, feature)| (feature, None))
            .collect();
        Ok(feature_collection(members, matched, vec![("lockId", lock_id)]))
    }

    fn get_property_value(&self, root: Node<'_, '_>) -> Result<String, Fault> {
        let reference = root
            .attribute("valueReference")
            .ok_or_else(|| Fault::missing("valueReference"))?;
        let property = local_name(reference);
        let query = reader::child(root, WFS, "Query").ok_or_else(|| Fault::missing("Query"))?;
        let spec = parse_query(query)?;

        let values: Vec<String> = self
            .select(&spec)
            .iter()
            .filter_map(|(_, feature)| feature.find(TNS, &property).map(Element::text_content))
            .collect();
        let mut collection = Element::new(WFS, "ValueCollection")
            .attr("numberMatched", values.len().to_string())
            .attr("numberReturned", values.len().to_string())
            .attr("timeStamp", timestamp());
        for value in values {
            collection.push(Element::new(WFS, "member").text(value));
        }
        Ok(collection.to_string())
    }

    fn acquire(&mut self, ids: &[String], expiry: Duration) -> Result<String, Fault> {
        self.purge_locks();
        if let Some(id) = ids.iter().find(|id| self.holder(id).is_some()) {
            return Err(Fault::new(
                StatusCode::BAD_REQUEST,
                "CannotLockAllFeatures",
                Some("lockAction"),
                format!("{} is already locked", id),
            ));
        }
        self.next_lock += 1;
        let lock_id = format!("lock-{}", self.next_lock);
        self.locks.insert(
            lock_id.clone(),
            Lock {
                ids: ids.to_vec(),
                expires: Instant::now() + expiry,
            },
        );
        Ok(lock_id)
    }

    fn lock_feature(&mut self, root: Node<'_, '_>) -> Result<String, Fault> {
        self.purge_locks();
        let expiry = expiry(root);
        match (root.attribute("lockId"), reader::child(root, WFS, "Query")) {
            (Some(lock_id), None) => match self.locks.get_mut(lock_id) {
                Some(lock) => {
                    lock.expires = Instant::now() + expiry;
                    Ok(lock_response(lock_id, &lock.ids))
                }
                None => Err(Fault::new(
                    StatusCode::FORBIDDEN,
                    "LockHasExpired",
                    Some("lockId"),
                    format!("{} is unknown or has expired", lock_id),
                )),
            },
            (_, Some(query)) => {
                let spec = parse_query(query)?;
                let ids: Vec<String> = self.select(&spec).into_iter().map(|(id, _)| id).collect();
                let lock_id = self.acquire(&ids, expiry)?;
                Ok(lock_response(&lock_id, &ids))
            }
            (None, None) => Err(Fault::missing("Query")),
        }
    }

    fn check_lock(&self, id: &str, token: Option<&str>) -> Result<(), Fault> {
        if self.defects.ignore_locks {
            return Ok(());
        }
        match self.holder(id) {
            Some(held) if Some(held) != token => Err(Fault::new(
                StatusCode::BAD_REQUEST,
                "OperationProcessingFailed",
                Some("lockId"),
                format!("{} is locked by {}", id, held),
            )),
            _ => Ok(()),
        }
    }

    fn transaction(&mut self, root: Node<'_, '_>) -> Result<String, Fault> {
        self.purge_locks();
        let token = root.attribute("lockId");
        if let Some(lock_id) = token
            && !self.locks.contains_key(lock_id)
        {
            return Err(Fault::new(
                StatusCode::FORBIDDEN,
                "LockHasExpired",
                Some("lockId"),
                format!("{} is unknown or has expired", lock_id),
            ));
        }

        // Actions apply to a working copy; any failure leaves the store untouched
        let mut work = self.features.clone();
        let mut next_feature = self.next_feature;
        let mut outcome = Outcome::default();

        for action in reader::elements(root) {
            match action.tag_name().name() {
                "Insert" => {
                    let use_existing = action.attribute("idgen") == Some("UseExisting");
                    for node in reader::elements(action) {
                        let mut feature = Element::from_node(node);
                        if feature.namespace.as_deref() != Some(TNS)
                            || !FEATURE_TYPES.contains(&feature.name.as_str())
                        {
                            return Err(Fault::new(
                                StatusCode::BAD_REQUEST,
                                "InvalidValue",
                                Some("Insert"),
                                format!("cannot insert {}", feature.name),
                            ));
                        }
                        let id = if use_existing {
                            let id = feature
                                .attribute_ns(GML, "id")
                                .map(str::to_string)
                                .ok_or_else(|| Fault::missing("gml:id"))?;
                            if live_version(&work, &id).is_some() {
                                return Err(Fault::new(
                                    StatusCode::BAD_REQUEST,
                                    "InvalidValue",
                                    Some("idgen"),
                                    format!("{} already exists", id),
                                ));
                            }
                            id
                        } else {
                            next_feature += 1;
                            format!("{}-{}", feature.name.to_lowercase(), next_feature)
                        };
                        feature = feature.attr_ns(GML, "id", id.clone());
                        let versions = work.entry(id.clone()).or_default();
                        versions.push(Version { feature, retired: false });
                        outcome.inserted.push((id, versions.len()));
                    }
                }
                "Update" => {
                    for id in targets(&work, action)? {
                        self.check_lock(&id, token)?;
                        let mut feature = current_feature(&work, &id)?;
                        for property in reader::children(action, WFS, "Property") {
                            let reference = reader::child_text(property, WFS, "ValueReference")
                                .ok_or_else(|| Fault::missing("ValueReference"))?;
                            let name = local_name(&reference);
                            let value = reader::child_text(property, WFS, "Value").unwrap_or_default();
                            match feature.find_local_mut(&name) {
                                Some(existing) => existing.set_text(value),
                                None => feature.push(tns(&name).text(value)),
                            }
                        }
                        let versions = work.entry(id.clone()).or_default();
                        if self.defects.stale_versions
                            && let Some(current) = versions.last_mut()
                        {
                            current.feature = feature;
                        } else {
                            versions.push(Version { feature, retired: false });
                        }
                        outcome.updated.push((id, versions.len()));
                    }
                }
                "Replace" => {
                    let replacement = reader::elements(action)
                        .find(|n| n.tag_name().namespace() != Some(FES))
                        .ok_or_else(|| Fault::missing("Replace"))?;
                    for id in targets(&work, action)? {
                        self.check_lock(&id, token)?;
                        let feature = Element::from_node(replacement).attr_ns(GML, "id", id.clone());
                        let versions = work.entry(id.clone()).or_default();
                        versions.push(Version { feature, retired: false });
                        outcome.replaced.push((id, versions.len()));
                    }
                }
                "Delete" => {
                    for id in targets(&work, action)? {
                        self.check_lock(&id, token)?;
                        let feature = current_feature(&work, &id)?;
                        if !self.defects.keep_deleted {
                            work.entry(id).or_default().push(Version { feature, retired: true });
                        }
                        outcome.deleted += 1;
                    }
                }
                other => {
                    return Err(Fault::new(
                        StatusCode::BAD_REQUEST,
                        "OperationParsingFailed",
                        Some(other),
                        "unknown transaction action",
                    ));
                }
            }
        }

        self.features = work;
        self.next_feature = next_feature;
        if let Some(lock_id) = token
            && root.attribute("releaseAction").is_none_or(|a| a == "ALL")
        {
            self.locks.remove(lock_id);
        }
        Ok(outcome.to_xml())
    }

    fn list_stored_queries(&mut self) -> String {
        let mut response = Element::new(WFS, "ListStoredQueriesResponse");
        let mut created = Vec::new();
        for id in self.stored_queries.keys() {
            match self.hidden_listings.get_mut(id) {
                Some(remaining) if *remaining > 0 => *remaining -= 1,
                _ => created.push(id.as_str()),
            }
        }
        let ids = BUILT_IN.iter().copied().chain(created);
        for id in ids {
            response.push(
                Element::new(WFS, "StoredQuery")
                    .attr("id", id)
                    .child(Element::new(WFS, "Title").text(id))
                    .child(
                        Element::new(WFS, "ReturnFeatureType")
                            .declare("tns", TNS)
                            .text("tns:Place"),
                    ),
            );
        }
        response.to_string()
    }

    fn describe_stored_queries(&self, root: Node<'_, '_>) -> Result<String, Fault> {
        let mut ids: Vec<String> = reader::children(root, WFS, "StoredQueryId")
            .map(reader::text)
            .collect();
        if ids.is_empty() {
            ids = BUILT_IN
                .iter()
                .map(|id| id.to_string())
                .chain(self.stored_queries.keys().cloned())
                .collect();
        }

        let mut response = Element::new(WFS, "DescribeStoredQueriesResponse");
        for id in ids {
            if BUILT_IN.contains(&id.as_str()) {
                response.push(built_in_description(&id));
            } else if let Some(definition) = self.stored_queries.get(&id) {
                let doc = Document::parse(definition).expect("stored definitions are well formed");
                let mut description = Element::from_node(doc.root_element());
                description.name = "StoredQueryDescription".to_string();
                response.push(description);
            } else {
                return Err(Fault::invalid("StoredQueryId", format!("no stored query {}", id)));
            }
        }
        Ok(response.to_string())
    }

    fn create_stored_query(&mut self, root: Node<'_, '_>) -> Result<String, Fault> {
        for definition in reader::children(root, WFS, "StoredQueryDefinition") {
            let id = definition.attribute("id").ok_or_else(|| Fault::missing("id"))?;
            if BUILT_IN.contains(&id) || self.stored_queries.contains_key(id) {
                return Err(Fault::new(
                    StatusCode::BAD_REQUEST,
                    "DuplicateStoredQueryIdValue",
                    Some(id),
                    format!("{} already exists", id),
                ));
            }
            let text = reader::child(definition, WFS, "QueryExpressionText")
                .ok_or_else(|| Fault::missing("QueryExpressionText"))?;
            if text.attribute("language") != Some(WFS_QUERY_LANGUAGE) {
                return Err(Fault::invalid("language", "unsupported query language"));
            }
            self.stored_queries
                .insert(id.to_string(), Element::from_node(definition).to_string());
            if self.defects.delayed_listing > 0 {
                self.hidden_listings
                    .insert(id.to_string(), self.defects.delayed_listing);
            }
        }
        Ok(Element::new(WFS, "CreateStoredQueryResponse")
            .attr("status", "OK")
            .to_string())
    }

    fn drop_stored_query(&mut self, root: Node<'_, '_>) -> Result<String, Fault> {
        let id = root.attribute("id").ok_or_else(|| Fault::missing("id"))?;
        if BUILT_IN.contains(&id) {
            return Err(Fault::new(
                StatusCode::BAD_REQUEST,
                "OperationProcessingFailed",
                Some("id"),
                "built-in stored queries cannot be dropped",
            ));
        }
        self.hidden_listings.remove(id);
        if self.stored_queries.shift_remove(id).is_none() {
            return Err(Fault::invalid("id", format!("no stored query {}", id)));
        }
        Ok(Element::new(WFS, "DropStoredQueryResponse")
            .attr("status", "OK")
            .to_string())
    }

    fn invoke_stored_query(&self, stored: Node<'_, '_>, root: Node<'_, '_>, base: &str) -> Result<String, Fault> {
        let id = stored.attribute("id").ok_or_else(|| Fault::missing("id"))?;
        let parameters: Vec<(String, String)> = reader::children(stored, WFS, "Parameter")
            .filter_map(|p| Some((p.attribute("name")?.to_string(), reader::text(p))))
            .collect();

        if BUILT_IN.contains(&id) {
            let wanted = parameters
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("id"))
                .map(|(_, value)| value.as_str())
                .ok_or_else(|| Fault::missing("id"))?;
            return self
                .current(wanted)
                .map(|feature| feature.to_string())
                .ok_or_else(|| {
                    Fault::new(StatusCode::NOT_FOUND, "NotFound", Some("id"), format!("no feature {}", wanted))
                });
        }

        let definition = self
            .stored_queries
            .get(id)
            .ok_or_else(|| Fault::invalid("StoredQueryId", format!("no stored query {}", id)))?;
        let mut expanded = definition.clone();
        for (name, value) in &parameters {
            expanded = expanded.replace(&format!("${{{}}}", name), &escape(value, false));
        }
        let doc = Document::parse(&expanded)
            .map_err(|e| Fault::new(StatusCode::BAD_REQUEST, "OperationProcessingFailed", None, e.to_string()))?;
        let query = reader::descendants(doc.root_element(), WFS, "Query")
            .next()
            .ok_or_else(|| Fault::missing("Query"))?;
        let spec = parse_query(query)?;
        Ok(self.page(&spec, window(root)?, base))
    }
}

fn live_version<'a>(features: &'a IndexMap<String, Vec<Version>>, id: &str) -> Option<&'a Version> {
    features.get(id).and_then(|v| v.last()).filter(|v| !v.retired)
}

fn current_feature(features: &IndexMap<String, Vec<Version>>, id: &str) -> Result<Element, Fault> {
    live_version(features, id)
        .map(|v| v.feature.clone())
        .ok_or_else(|| Fault::invalid("filter", format!("no feature {}", id)))
}

/// Identifiers an Update, Replace or Delete applies to.
fn targets(features: &IndexMap<String, Vec<Version>>, action: Node<'_, '_>) -> Result<Vec<String>, Fault> {
    let type_name = action
        .attribute("typeName")
        .map(|name| known_type(action, name, "typeName"))
        .transpose()?;
    let filter = reader::child(action, FES, "Filter").ok_or_else(|| Fault::missing("Filter"))?;
    let expression = decode_filter(filter).map_err(|e| Fault::invalid("filter", e.to_string()))?;

    let of_type = |feature: &Element| type_name.as_deref().is_none_or(|t| feature.is(TNS, t));
    if let FilterExpression::ResourceId(predicates) = &expression {
        return predicates
            .iter()
            .map(|p| {
                current_feature(features, &p.rid)
                    .and_then(|feature| {
                        if of_type(&feature) {
                            Ok(p.rid.clone())
                        } else {
                            Err(Fault::invalid("filter", format!("{} is not of the target type", p.rid)))
                        }
                    })
            })
            .collect();
    }
    Ok(features
        .iter()
        .filter_map(|(id, versions)| versions.last().filter(|v| !v.retired).map(|v| (id, v)))
        .filter(|(_, v)| of_type(&v.feature) && eval::matches(&expression, &record(&v.feature)))
        .map(|(id, _)| id.clone())
        .collect())
}

/// Local name of a served feature type named by `value`.
fn known_type(node: Node<'_, '_>, value: &str, locator: &str) -> Result<String, Fault> {
    match reader::resolve_qname(node, value.trim()) {
        Some(name) if name.namespace == TNS && FEATURE_TYPES.contains(&name.local_name.as_str()) => {
            Ok(name.local_name)
        }
        _ => Err(Fault::invalid(locator, format!("unknown type {}", value))),
    }
}

fn parse_query(query: Node<'_, '_>) -> Result<QuerySpec, Fault> {
    let type_names = query
        .attribute("typeNames")
        .ok_or_else(|| Fault::missing("typeNames"))?;
    let type_name = known_type(query, type_names, "typeNames")?;

    let filter = reader::child(query, FES, "Filter")
        .map(decode_filter)
        .transpose()
        .map_err(|e| Fault::invalid("filter", e.to_string()))?;
    let sort = reader::child(query, FES, "SortBy")
        .map(|sort_by| {
            reader::children(sort_by, FES, "SortProperty")
                .filter_map(|p| {
                    let reference = reader::child_text(p, FES, "ValueReference")?;
                    let descending = reader::child_text(p, FES, "SortOrder")
                        .is_some_and(|o| o.eq_ignore_ascii_case("DESC"));
                    Some((local_name(&reference), descending))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(QuerySpec {
        type_name,
        filter,
        sort,
    })
}

fn window(root: Node<'_, '_>) -> Result<Window, Fault> {
    fn number(root: Node<'_, '_>, name: &str) -> Result<Option<usize>, Fault> {
        root.attribute(name)
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| Fault::invalid(name, format!("{} is not a count", v)))
            })
            .transpose()
    }
    Ok(Window {
        start: number(root, "startIndex")?.unwrap_or(0),
        count: number(root, "count")?,
        hits: root.attribute("resultType") == Some("hits"),
    })
}

fn expiry(root: Node<'_, '_>) -> Duration {
    let seconds = root
        .attribute("expiry")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(300);
    Duration::from_secs(seconds)
}

fn page_link(base: &str, type_name: &str, start: usize, count: usize) -> String {
    let mut url = url::Url::parse(base).expect("mock base is a URL");
    url.query_pairs_mut()
        .append_pair("SERVICE", "WFS")
        .append_pair("VERSION", "2.0.2")
        .append_pair("REQUEST", "GetFeature")
        .append_pair("TYPENAMES", &format!("tns:{}", type_name))
        .append_pair("NAMESPACES", &format!("xmlns(tns,{})", TNS))
        .append_pair("STARTINDEX", &start.to_string())
        .append_pair("COUNT", &count.to_string());
    url.to_string()
}

fn feature_collection(
    members: Vec<(Element, Option<&str>)>,
    matched: usize,
    attributes: Vec<(&str, String)>,
) -> String {
    let mut collection = Element::new(WFS, "FeatureCollection")
        .attr("numberMatched", matched.to_string())
        .attr("numberReturned", members.len().to_string())
        .attr("timeStamp", timestamp());
    for (name, value) in attributes {
        collection.set_attr(name, value);
    }
    for (feature, state) in members {
        let mut member = Element::new(WFS, "member");
        if let Some(state) = state {
            member.set_attr("state", state);
        }
        member.push(feature);
        collection.push(member);
    }
    collection.to_string()
}

fn lock_response(lock_id: &str, ids: &[String]) -> String {
    let mut locked = Element::new(WFS, "FeaturesLocked");
    for id in ids {
        locked.push(Element::new(FES, "ResourceId").attr("rid", id.as_str()));
    }
    Element::new(WFS, "LockFeatureResponse")
        .attr("lockId", lock_id)
        .child(locked)
        .to_string()
}

fn built_in_description(id: &str) -> Element {
    Element::new(WFS, "StoredQueryDescription")
        .attr("id", id)
        .declare("xsd", XSD)
        .declare("tns", TNS)
        .child(Element::new(WFS, "Title").text("Get feature by identifier"))
        .child(
            Element::new(WFS, "Parameter")
                .attr("name", "id")
                .attr("type", "xsd:string"),
        )
        .child(
            Element::new(WFS, "QueryExpressionText")
                .attr("returnFeatureTypes", "tns:Place")
                .attr("language", "urn:ogc:def:queryLanguage:OGC-WFS::WFS_QueryExpression")
                .attr("isPrivate", "true"),
        )
}

impl Outcome {
    fn to_xml(&self) -> String {
        let total = |name: &str, n: usize| Element::new(WFS, name).text(n.to_string());
        let mut response = Element::new(WFS, "TransactionResponse")
            .attr("version", "2.0.2")
            .child(
                Element::new(WFS, "TransactionSummary")
                    .child(total("totalInserted", self.inserted.len()))
                    .child(total("totalUpdated", self.updated.len()))
                    .child(total("totalReplaced", self.replaced.len()))
                    .child(total("totalDeleted", self.deleted)),
            );
        let groups = [
            ("InsertResults", &self.inserted),
            ("UpdateResults", &self.updated),
            ("ReplaceResults", &self.replaced),
        ];
        for (name, results) in groups {
            if results.is_empty() {
                continue;
            }
            let mut list = Element::new(WFS, name);
            for (rid, version) in results {
                list.push(
                    Element::new(WFS, "Feature").child(
                        Element::new(FES, "ResourceId")
                            .attr("rid", rid.as_str())
                            .attr("version", version.to_string()),
                    ),
                );
            }
            response.push(list);
        }
        response.to_string()
    }
}

fn describe_feature_type(root: Node<'_, '_>) -> Result<String, Fault> {
    for type_name in reader::children(root, WFS, "TypeName") {
        known_type(type_name, &reader::text(type_name), "typeName")?;
    }
    Ok(SCHEMA.replace("TNS", TNS))
}

fn capabilities(base: &str) -> String {
    const OPERATIONS: [&str; 11] = [
        "GetCapabilities",
        "DescribeFeatureType",
        "GetFeature",
        "GetPropertyValue",
        "GetFeatureWithLock",
        "LockFeature",
        "Transaction",
        "ListStoredQueries",
        "DescribeStoredQueries",
        "CreateStoredQuery",
        "DropStoredQuery",
    ];
    let operations: String = OPERATIONS
        .iter()
        .map(|name| {
            format!(
                r#"<ows:Operation name="{name}"><ows:DCP><ows:HTTP><ows:Get xlink:href="{base}"/><ows:Post xlink:href="{base}"/></ows:HTTP></ows:DCP></ows:Operation>"#
            )
        })
        .collect();
    CAPABILITIES
        .replace("OPERATIONS", &operations)
        .replace("TNS", TNS)
}

const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:WFS_Capabilities version="2.0.2"
    xmlns:wfs="http://www.opengis.net/wfs/2.0"
    xmlns:ows="http://www.opengis.net/ows/1.1"
    xmlns:fes="http://www.opengis.net/fes/2.0"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:tns="TNS">
  <ows:ServiceIdentification>
    <ows:Title>Mock places service</ows:Title>
    <ows:ServiceType>WFS</ows:ServiceType>
    <ows:ServiceTypeVersion>2.0.2</ows:ServiceTypeVersion>
  </ows:ServiceIdentification>
  <ows:OperationsMetadata>
    OPERATIONS
    <ows:Constraint name="ImplementsBasicWFS"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="ImplementsTransactionalWFS"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="ImplementsLockingWFS"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="KVPEncoding"><ows:NoValues/><ows:DefaultValue>FALSE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="XMLEncoding"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="SOAPEncoding"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="ManageStoredQueries"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="ImplementsResultPaging"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="ImplementsFeatureVersioning"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="PagingIsTransactionSafe"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="ImplementsSpatialJoins"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></ows:Constraint>
    <ows:Constraint name="CountDefault"><ows:NoValues/><ows:DefaultValue>1000</ows:DefaultValue></ows:Constraint>
  </ows:OperationsMetadata>
  <wfs:FeatureTypeList>
    <wfs:FeatureType>
      <wfs:Name>tns:Place</wfs:Name>
      <wfs:Title>Places</wfs:Title>
      <wfs:DefaultCRS>urn:ogc:def:crs:EPSG::4326</wfs:DefaultCRS>
      <ows:WGS84BoundingBox>
        <ows:LowerCorner>-10 -10</ows:LowerCorner>
        <ows:UpperCorner>10 10</ows:UpperCorner>
      </ows:WGS84BoundingBox>
    </wfs:FeatureType>
    <wfs:FeatureType>
      <wfs:Name>tns:Landmark</wfs:Name>
      <wfs:Title>Landmarks</wfs:Title>
      <wfs:DefaultCRS>urn:ogc:def:crs:EPSG::4326</wfs:DefaultCRS>
      <ows:WGS84BoundingBox>
        <ows:LowerCorner>-10 -10</ows:LowerCorner>
        <ows:UpperCorner>10 10</ows:UpperCorner>
      </ows:WGS84BoundingBox>
    </wfs:FeatureType>
  </wfs:FeatureTypeList>
  <fes:Filter_Capabilities>
    <fes:Conformance>
      <fes:Constraint name="ImplementsQuery"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsAdHocQuery"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsResourceId"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsMinStandardFilter"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsStandardFilter"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsMinSpatialFilter"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsSpatialFilter"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsMinTemporalFilter"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsTemporalFilter"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsVersionNav"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
      <fes:Constraint name="ImplementsSorting"><ows:NoValues/><ows:DefaultValue>TRUE</ows:DefaultValue></fes:Constraint>
    </fes:Conformance>
    <fes:Id_Capabilities>
      <fes:ResourceIdentifier name="fes:ResourceId"/>
    </fes:Id_Capabilities>
    <fes:Scalar_Capabilities>
      <fes:LogicalOperators/>
      <fes:ComparisonOperators>
        <fes:ComparisonOperator name="PropertyIsEqualTo"/>
        <fes:ComparisonOperator name="PropertyIsNotEqualTo"/>
        <fes:ComparisonOperator name="PropertyIsLessThan"/>
        <fes:ComparisonOperator name="PropertyIsGreaterThan"/>
        <fes:ComparisonOperator name="PropertyIsLessThanOrEqualTo"/>
        <fes:ComparisonOperator name="PropertyIsGreaterThanOrEqualTo"/>
        <fes:ComparisonOperator name="PropertyIsBetween"/>
        <fes:ComparisonOperator name="PropertyIsLike"/>
        <fes:ComparisonOperator name="PropertyIsNull"/>
        <fes:ComparisonOperator name="PropertyIsNil"/>
      </fes:ComparisonOperators>
    </fes:Scalar_Capabilities>
    <fes:Spatial_Capabilities>
      <fes:GeometryOperands>
        <fes:GeometryOperand name="gml:Envelope"/>
        <fes:GeometryOperand name="gml:Point"/>
        <fes:GeometryOperand name="gml:Polygon"/>
      </fes:GeometryOperands>
      <fes:SpatialOperators>
        <fes:SpatialOperator name="BBOX"/>
        <fes:SpatialOperator name="Intersects"/>
        <fes:SpatialOperator name="Within"/>
        <fes:SpatialOperator name="Disjoint"/>
      </fes:SpatialOperators>
    </fes:Spatial_Capabilities>
    <fes:Temporal_Capabilities>
      <fes:TemporalOperands>
        <fes:TemporalOperand name="gml:TimeInstant"/>
        <fes:TemporalOperand name="gml:TimePeriod"/>
      </fes:TemporalOperands>
      <fes:TemporalOperators>
        <fes:TemporalOperator name="After"/>
        <fes:TemporalOperator name="Before"/>
        <fes:TemporalOperator name="During"/>
        <fes:TemporalOperator name="TEquals"/>
      </fes:TemporalOperators>
    </fes:Temporal_Capabilities>
  </fes:Filter_Capabilities>
</wfs:WFS_Capabilities>"#;

const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema targetNamespace="TNS" elementFormDefault="qualified"
    xmlns:xsd="http://www.w3.org/2001/XMLSchema"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:tns="TNS">
  <xsd:import namespace="http://www.opengis.net/gml/3.2"
      schemaLocation="http://schemas.opengis.net/gml/3.2.1/gml.xsd"/>
  <xsd:element name="Place" type="tns:PlaceType" substitutionGroup="gml:AbstractFeature"/>
  <xsd:complexType name="PlaceType">
    <xsd:complexContent>
      <xsd:extension base="gml:AbstractFeatureType">
        <xsd:sequence>
          <xsd:element name="name" type="xsd:string"/>
          <xsd:element name="population" type="xsd:integer"/>
          <xsd:element name="founded" type="xsd:date"/>
          <xsd:element name="note" type="xsd:string" nillable="true" minOccurs="0"/>
          <xsd:element name="geom" type="gml:PointPropertyType"/>
        </xsd:sequence>
      </xsd:extension>
    </xsd:complexContent>
  </xsd:complexType>
  <xsd:element name="Landmark" type="tns:LandmarkType" substitutionGroup="gml:AbstractFeature"/>
  <xsd:complexType name="LandmarkType">
    <xsd:complexContent>
      <xsd:extension base="gml:AbstractFeatureType">
        <xsd:sequence>
          <xsd:element name="label" type="xsd:string"/>
          <xsd:element name="height" type="xsd:integer"/>
          <xsd:element name="site" type="gml:PointPropertyType"/>
        </xsd:sequence>
      </xsd:extension>
    </xsd:complexContent>
  </xsd:complexType>
</xsd:schema>"#;
