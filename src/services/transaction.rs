use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::feature_state::{FeatureStateTable, Lifecycle, VersionLabel};
use super::keyed_lock::{KeyedLocks, feature_key};
use super::sampler::SampledFeature;
use crate::binding::request::query_element;
use crate::binding::{Operation, WfsClient, WfsRequest, WfsResponse};
use crate::capabilities::{FeatureTypeInfo, PropertyDescriptor, PropertyType};
use crate::error::{ConformanceError, ConformanceResult};
use crate::feature::{self, FeatureRecord};
use crate::filter::encode::filter_element;
use crate::filter::{FilterExpression, VersionAction};
use crate::validation::{Check, Expectations, ExceptionReport, ResponseValidator, SchemaRef};
use crate::xml::namespaces::{FES, GML, WFS};
use crate::xml::{Element, QName, reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Insert,
    Update,
    Replace,
    Delete,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Insert => write!(f, "Insert"),
            TransactionKind::Update => write!(f, "Update"),
            TransactionKind::Replace => write!(f, "Replace"),
            TransactionKind::Delete => write!(f, "Delete"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransactionPayload {
    Insert {
        features: Vec<Element>,
        /// Ask the service to keep the supplied gml:id values
        use_existing_ids: bool,
    },
    Update {
        type_name: QName,
        id: String,
        properties: Vec<(QName, String)>,
    },
    Replace {
        id: String,
        feature: Element,
    },
    Delete {
        type_name: QName,
        ids: Vec<String>,
    },
}

impl TransactionPayload {
    pub fn kind(&self) -> TransactionKind {
        match self {
            TransactionPayload::Insert { .. } => TransactionKind::Insert,
            TransactionPayload::Update { .. } => TransactionKind::Update,
            TransactionPayload::Replace { .. } => TransactionKind::Replace,
            TransactionPayload::Delete { .. } => TransactionKind::Delete,
        }
    }

    /// Existing identifiers the payload touches.
    pub fn target_ids(&self) -> Vec<String> {
        match self {
            TransactionPayload::Insert { .. } => Vec::new(),
            TransactionPayload::Update { id, .. } | TransactionPayload::Replace { id, .. } => {
                vec![id.clone()]
            }
            TransactionPayload::Delete { ids, .. } => ids.clone(),
        }
    }

    fn type_name(&self) -> Option<QName> {
        match self {
            TransactionPayload::Insert { features, .. } => features.first().map(Element::qname),
            TransactionPayload::Update { type_name, .. }
            | TransactionPayload::Delete { type_name, .. } => Some(type_name.clone()),
            TransactionPayload::Replace { feature, .. } => Some(feature.qname()),
        }
    }

    fn to_element(&self) -> Element {
        match self {
            TransactionPayload::Insert {
                features,
                use_existing_ids,
            } => {
                let mut insert = Element::new(WFS, "Insert");
                if *use_existing_ids {
                    insert.set_attr("idgen", "UseExisting");
                }
                insert.children_from(features.iter().cloned())
            }
            TransactionPayload::Update {
                type_name,
                id,
                properties,
            } => {
                let mut update = Element::new(WFS, "Update")
                    .declare_name(type_name)
                    .attr("typeName", type_name.prefixed());
                for (name, value) in properties {
                    update = update.declare_name(name).child(
                        Element::new(WFS, "Property")
                            .child(Element::new(WFS, "ValueReference").text(name.prefixed()))
                            .child(Element::new(WFS, "Value").text(value.clone())),
                    );
                }
                update.child(filter_element(&FilterExpression::resource_ids([id.as_str()])))
            }
            TransactionPayload::Replace { id, feature } => Element::new(WFS, "Replace")
                .child(feature.clone())
                .child(filter_element(&FilterExpression::resource_ids([id.as_str()]))),
            TransactionPayload::Delete { type_name, ids } => Element::new(WFS, "Delete")
                .declare_name(type_name)
                .attr("typeName", type_name.prefixed())
                .child(filter_element(&FilterExpression::resource_ids(
                    ids.iter().map(String::as_str),
                ))),
        }
    }
}

/// What one submitted transaction did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Correlation handle sent with the request
    pub handle: String,
    pub kind: TransactionKind,
    pub affected: Vec<String>,
    /// Version label reported for the first affected feature
    pub version: Option<String>,
    pub lock_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LockResult {
    pub lock_id: String,
    pub locked: Vec<String>,
    pub not_locked: Vec<String>,
}

/// A feature as returned by a version navigation query.
#[derive(Debug, Clone)]
pub struct VersionedMember {
    /// `wfs:member@state`: valid, superseded, retired or future
    pub state: Option<String>,
    pub record: FeatureRecord,
}

/// Undo step for a mutation made by a test.
#[derive(Debug, Clone)]
pub enum Compensation {
    Delete { type_name: QName, id: String },
    Restore { id: String, feature: Element },
    Reinsert { feature: Element },
}

#[derive(Debug, Default)]
struct Outcome {
    inserted: u64,
    updated: u64,
    replaced: u64,
    deleted: u64,
    /// (rid, version) per reported feature, in response order
    inserts: Vec<(String, Option<String>)>,
    updates: Vec<(String, Option<String>)>,
    replaces: Vec<(String, Option<String>)>,
}

pub struct TransactionEngine {
    client: Arc<WfsClient>,
    validator: ResponseValidator,
    states: Arc<FeatureStateTable>,
    locks: Arc<KeyedLocks>,
    lock_expiry: Duration,
    records: Mutex<Vec<TransactionRecord>>,
    pending: Mutex<Vec<Compensation>>,
    dirty: AtomicBool,
}

impl TransactionEngine {
    pub fn new(
        client: Arc<WfsClient>,
        validator: ResponseValidator,
        locks: Arc<KeyedLocks>,
        lock_expiry: Duration,
    ) -> Self {
        Self {
            client,
            validator,
            states: Arc::new(FeatureStateTable::new()),
            locks,
            lock_expiry,
            records: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn states(&self) -> &FeatureStateTable {
        &self.states
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Set once a compensation failed; the baseline can no longer be trusted.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn begin(&self) -> TransactionScope<'_> {
        TransactionScope {
            engine: self,
            compensations: Vec::new(),
            closed: false,
        }
    }

    fn transaction_request(&self, payload: &TransactionPayload, lock_token: Option<&str>) -> (String, WfsRequest) {
        let handle = Uuid::new_v4().to_string();
        let mut request = WfsRequest::new(Operation::Transaction, self.client.version())
            .attr("handle", &handle)
            .child(payload.to_element());
        if let Some(token) = lock_token {
            request = request.attr("lockId", token).attr("releaseAction", "ALL");
        }
        (handle, request)
    }

    /// Submit one mutation and assert its effects: counts in the summary,
    /// lock enforcement, version monotonicity and absence after delete.
    pub async fn submit(
        &self,
        payload: TransactionPayload,
        lock_token: Option<&str>,
    ) -> ConformanceResult<TransactionRecord> {
        let targets = payload.target_ids();
        let _guards = self.locks.acquire_all(targets.iter().map(|id| feature_key(id))).await;

        let blocked: Vec<(String, String)> = targets
            .iter()
            .filter_map(|id| {
                self.states
                    .lock_of(id)
                    .filter(|held| Some(held.as_str()) != lock_token)
                    .map(|held| (id.clone(), held))
            })
            .collect();

        let (handle, request) = self.transaction_request(&payload, lock_token);
        let response = self.client.send(&request).await?;

        if let Some((id, held)) = blocked.first() {
            if let Some(report) = ExceptionReport::parse(&response.body) {
                tracing::info!(
                    id = %id,
                    lock = %held,
                    codes = ?report.codes(),
                    "Service rejected mutation of a locked feature"
                );
                return Err(ConformanceError::ConcurrencyViolation {
                    message: format!(
                        "{} of {} rejected while locked by {}: {}",
                        payload.kind(),
                        id,
                        held,
                        report.summary()
                    ),
                    exchange: Some(Box::new(response.exchange.clone())),
                });
            }
            // Track what the service did anyway so teardown can undo it.
            if let Err(e) = self.apply(&payload, &response, &handle, lock_token) {
                tracing::warn!(
                    id = %id,
                    kind = %payload.kind(),
                    "Could not track a mutation that ignored a lock: {}", e
                );
            }
            return Err(ConformanceError::business_rule(format!(
                "{} of {} succeeded without the lock token of {}",
                payload.kind(),
                id,
                held
            ))
            .with_exchange(&response.exchange));
        }

        let record = self.apply(&payload, &response, &handle, lock_token)?;

        if let TransactionPayload::Delete { type_name, ids } = &payload {
            for id in ids {
                self.verify_not_found(type_name, id).await?;
            }
        }
        Ok(record)
    }

    /// Validate the response and update the state table.
    fn apply(
        &self,
        payload: &TransactionPayload,
        response: &WfsResponse,
        handle: &str,
        lock_token: Option<&str>,
    ) -> ConformanceResult<TransactionRecord> {
        let expected = match payload {
            TransactionPayload::Insert { features, .. } => ("totalInserted", features.len() as u64),
            TransactionPayload::Update { .. } => ("totalUpdated", 1),
            TransactionPayload::Replace { .. } => ("totalReplaced", 1),
            TransactionPayload::Delete { ids, .. } => ("totalDeleted", ids.len() as u64),
        };
        self.validator.require(
            response,
            SchemaRef::TransactionResponse,
            &Expectations::success().check(summary_count(expected.0, expected.1)),
        )?;
        let outcome = parse_outcome(response)?;
        let type_name = payload.type_name().unwrap_or_else(|| QName::new("", ""));

        let (affected, reported) = match payload {
            TransactionPayload::Insert { features, .. } => {
                if outcome.inserts.len() != features.len() {
                    return Err(ConformanceError::business_rule(format!(
                        "InsertResults lists {} features, {} were inserted",
                        outcome.inserts.len(),
                        features.len()
                    ))
                    .with_exchange(&response.exchange));
                }
                let ids: Vec<String> = outcome.inserts.iter().map(|(rid, _)| rid.clone()).collect();
                for id in &ids {
                    self.states.transition(id, &type_name, Lifecycle::Inserted)?;
                }
                (ids, outcome.inserts)
            }
            TransactionPayload::Update { id, .. } => {
                self.states.transition(id, &type_name, Lifecycle::Updated)?;
                (vec![id.clone()], outcome.updates)
            }
            TransactionPayload::Replace { id, .. } => {
                self.states.transition(id, &type_name, Lifecycle::Replaced)?;
                (vec![id.clone()], outcome.replaces)
            }
            TransactionPayload::Delete { ids, .. } => {
                for id in ids {
                    self.states.transition(id, &type_name, Lifecycle::Deleted)?;
                }
                (ids.clone(), Vec::new())
            }
        };

        for (rid, version) in &reported {
            if let Some(version) = version {
                let id = affected
                    .iter()
                    .find(|id| rid == *id || rid.starts_with(id.as_str()))
                    .unwrap_or(rid);
                self.states
                    .record_version(id, &type_name, VersionLabel(version.clone()))
                    .map_err(|e| e.with_exchange(&response.exchange))?;
            }
        }

        if let Some(token) = lock_token {
            self.states.unlock(token);
        }

        let record = TransactionRecord {
            handle: handle.to_string(),
            kind: payload.kind(),
            version: reported.iter().find_map(|(_, v)| v.clone()),
            affected,
            lock_token: lock_token.map(str::to_string),
        };
        tracing::info!(
            handle = %record.handle,
            kind = %record.kind,
            affected = ?record.affected,
            version = ?record.version,
            "Transaction applied"
        );
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(record)
    }

    /// Submit a mutation the service must refuse, e.g. one against a deleted feature.
    pub async fn submit_expecting_rejection(
        &self,
        payload: TransactionPayload,
        lock_token: Option<&str>,
        expectations: &Expectations,
    ) -> ConformanceResult<()> {
        let targets = payload.target_ids();
        let _guards = self.locks.acquire_all(targets.iter().map(|id| feature_key(id))).await;
        let (_, request) = self.transaction_request(&payload, lock_token);
        let response = self.client.send(&request).await?;
        self.validator
            .require(&response, SchemaRef::ExceptionReport, expectations)
    }

    /// Query `id` and assert nothing comes back.
    pub async fn verify_not_found(&self, type_name: &QName, id: &str) -> ConformanceResult<()> {
        let filter = FilterExpression::resource_ids([id]);
        let request = WfsRequest::get_feature(self.client.version(), type_name, Some(&filter));
        let response = self.client.send(&request).await?;
        self.validator.require(
            &response,
            SchemaRef::FeatureCollection,
            &Expectations::success().check(crate::validation::checks::feature_count(0)),
        )
    }

    /// Current representation of `id`, or `None` when it does not resolve.
    pub async fn current_feature(
        &self,
        type_name: &QName,
        id: &str,
    ) -> ConformanceResult<Option<Element>> {
        let filter = FilterExpression::resource_ids([id]);
        let request = WfsRequest::get_feature(self.client.version(), type_name, Some(&filter));
        let response = self.client.send(&request).await?;
        self.validator
            .require_success(&response, SchemaRef::FeatureCollection)?;
        let doc = response.document()?;
        Ok(feature::features(doc.root_element())
            .into_iter()
            .find(|f| feature::feature_id(*f) == Some(id))
            .map(Element::from_node))
    }

    pub async fn lock_features(
        &self,
        type_name: &QName,
        ids: &[String],
        expiry: Option<Duration>,
    ) -> ConformanceResult<LockResult> {
        let expiry = expiry.unwrap_or(self.lock_expiry);
        let _guards = self.locks.acquire_all(ids.iter().map(|id| feature_key(id))).await;
        let filter = FilterExpression::resource_ids(ids.iter().map(String::as_str));
        let request = WfsRequest::new(Operation::LockFeature, self.client.version())
            .attr("expiry", expiry.as_secs())
            .attr("lockAction", "ALL")
            .child(query_element(type_name, Some(&filter)));
        let response = self.client.send(&request).await?;
        self.validator
            .require_success(&response, SchemaRef::LockFeatureResponse)?;
        let result = parse_lock_response(&response)?;
        self.states.lock(&result.locked, type_name, &result.lock_id, expiry);
        tracing::info!(lock_id = %result.lock_id, locked = ?result.locked, "Features locked");
        Ok(result)
    }

    /// GetFeatureWithLock: returns the lock id and the identifiers returned.
    pub async fn get_feature_with_lock(
        &self,
        type_name: &QName,
        ids: &[String],
        expiry: Option<Duration>,
    ) -> ConformanceResult<(String, Vec<String>)> {
        let expiry = expiry.unwrap_or(self.lock_expiry);
        let _guards = self.locks.acquire_all(ids.iter().map(|id| feature_key(id))).await;
        let filter = FilterExpression::resource_ids(ids.iter().map(String::as_str));
        let request = WfsRequest::new(Operation::GetFeatureWithLock, self.client.version())
            .attr("expiry", expiry.as_secs())
            .child(query_element(type_name, Some(&filter)));
        let response = self.client.send(&request).await?;
        let has_lock_id = Check::new("FeatureCollection carries lockId", |root| {
            root.attribute("lockId")
                .map(|_| ())
                .ok_or_else(|| "GetFeatureWithLock response has no lockId".to_string())
        });
        self.validator.require(
            &response,
            SchemaRef::FeatureCollection,
            &Expectations::success().check(has_lock_id),
        )?;
        let (lock_id, returned) = {
            let doc = response.document()?;
            let root = doc.root_element();
            (
                root.attribute("lockId").unwrap_or_default().to_string(),
                feature::feature_ids(root),
            )
        };
        self.states.lock(&returned, type_name, &lock_id, expiry);
        Ok((lock_id, returned))
    }

    /// Release every feature held by `lock_id` with an empty transaction.
    pub async fn release(&self, lock_id: &str) -> ConformanceResult<()> {
        let request = WfsRequest::new(Operation::Transaction, self.client.version())
            .attr("lockId", lock_id)
            .attr("releaseAction", "ALL");
        let response = self.client.send(&request).await?;
        self.validator
            .require_success(&response, SchemaRef::TransactionResponse)?;
        let released = self.states.unlock(lock_id);
        tracing::debug!(lock_id, released = ?released, "Lock released");
        Ok(())
    }

    /// Refer to a lock that does not exist; the service must report it expired.
    pub async fn reset_lock(&self, lock_id: &str) -> ConformanceResult<()> {
        let request = WfsRequest::new(Operation::LockFeature, self.client.version())
            .attr("lockId", lock_id)
            .attr("expiry", self.lock_expiry.as_secs());
        let response = self.client.send(&request).await?;
        self.validator.require(
            &response,
            SchemaRef::ExceptionReport,
            &Expectations::exception("LockHasExpired").with_status(403),
        )
    }

    /// Navigate the version history of `id`.
    pub async fn resolve_version(
        &self,
        type_name: &QName,
        id: &str,
        action: VersionAction,
    ) -> ConformanceResult<Vec<VersionedMember>> {
        let filter = FilterExpression::versioned_resource_id(id, action);
        let request = WfsRequest::get_feature(self.client.version(), type_name, Some(&filter));
        let response = self.client.send(&request).await?;
        self.validator
            .require_success(&response, SchemaRef::FeatureCollection)?;
        let doc = response.document()?;
        Ok(reader::children(doc.root_element(), WFS, "member")
            .filter_map(|member| {
                reader::first_element(member).map(|f| VersionedMember {
                    state: member.attribute("state").map(str::to_string),
                    record: FeatureRecord::from_node(f),
                })
            })
            .collect())
    }

    /// Run one compensation outside any scope.
    pub async fn compensate(&self, compensation: Compensation) -> ConformanceResult<()> {
        let result = match compensation {
            Compensation::Delete { type_name, id } => {
                if self.states.lifecycle(&id) == Lifecycle::Deleted {
                    return Ok(());
                }
                self.submit(
                    TransactionPayload::Delete {
                        type_name,
                        ids: vec![id],
                    },
                    None,
                )
                .await
            }
            Compensation::Restore { id, feature } => {
                self.submit(TransactionPayload::Replace { id, feature }, None)
                    .await
            }
            Compensation::Reinsert { feature } => {
                if let Some(id) = gml_id(&feature) {
                    self.states.forget(&id);
                }
                let type_name = feature.qname();
                let outcome = self
                    .submit(
                        TransactionPayload::Insert {
                            features: vec![feature],
                            use_existing_ids: true,
                        },
                        None,
                    )
                    .await;
                // The restored feature is part of the baseline again.
                if let Ok(record) = &outcome {
                    for id in &record.affected {
                        self.states.forget(id);
                        tracing::debug!(id = %id, type_name = %type_name.prefixed(), "Restored");
                    }
                }
                outcome
            }
        };
        result.map(|_| ()).map_err(|e| {
            self.dirty.store(true, Ordering::SeqCst);
            tracing::error!("Compensation failed: {}", e);
            ConformanceError::CompensationFailure(e.to_string())
        })
    }

    fn defer(&self, compensations: Vec<Compensation>) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(compensations);
    }

    /// Undo everything still pending and delete any inserted feature left behind.
    pub async fn shutdown(&self) -> ConformanceResult<()> {
        let pending: Vec<Compensation> = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let mut failures = Vec::new();
        for compensation in pending.into_iter().rev() {
            if let Err(e) = self.compensate(compensation).await {
                failures.push(e.to_string());
            }
        }
        for (id, type_name) in self.states.live_inserted() {
            if let Err(e) = self.compensate(Compensation::Delete { type_name, id }).await {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ConformanceError::CompensationFailure(failures.join("; ")))
        }
    }
}

/// Records undo steps for mutations made through it. `close` runs them;
/// dropping an open scope defers them to engine shutdown.
pub struct TransactionScope<'e> {
    engine: &'e TransactionEngine,
    compensations: Vec<Compensation>,
    closed: bool,
}

impl TransactionScope<'_> {
    pub async fn submit(
        &mut self,
        payload: TransactionPayload,
        lock_token: Option<&str>,
    ) -> ConformanceResult<TransactionRecord> {
        let mut undo = Vec::new();
        match &payload {
            TransactionPayload::Update { type_name, id, .. } if !self.created(id) => {
                if let Some(original) = self.engine.current_feature(type_name, id).await? {
                    undo.push(Compensation::Restore {
                        id: id.clone(),
                        feature: original,
                    });
                }
            }
            TransactionPayload::Replace { id, feature } if !self.created(id) => {
                if let Some(original) = self.engine.current_feature(&feature.qname(), id).await? {
                    undo.push(Compensation::Restore {
                        id: id.clone(),
                        feature: original,
                    });
                }
            }
            TransactionPayload::Delete { type_name, ids } => {
                for id in ids {
                    if self.created(id) {
                        continue;
                    }
                    if let Some(original) = self.engine.current_feature(type_name, id).await? {
                        undo.push(Compensation::Reinsert { feature: original });
                    }
                }
            }
            _ => {}
        }

        let record = self.engine.submit(payload.clone(), lock_token).await?;
        if let TransactionPayload::Insert { features, .. } = &payload {
            let type_name = features
                .first()
                .map(Element::qname)
                .unwrap_or_else(|| QName::new("", ""));
            undo.extend(record.affected.iter().map(|id| Compensation::Delete {
                type_name: type_name.clone(),
                id: id.clone(),
            }));
        }
        if let TransactionPayload::Delete { ids, .. } = &payload {
            self.compensations.retain(|c| {
                !matches!(c, Compensation::Delete { id, .. } if ids.contains(id))
            });
        }
        self.compensations.extend(undo);
        Ok(record)
    }

    fn created(&self, id: &str) -> bool {
        self.compensations
            .iter()
            .any(|c| matches!(c, Compensation::Delete { id: created, .. } if created == id))
    }

    /// Undo in reverse order; the first failure marks the baseline dirty.
    pub async fn close(mut self) -> ConformanceResult<()> {
        self.closed = true;
        let compensations = std::mem::take(&mut self.compensations);
        let mut result = Ok(());
        for compensation in compensations.into_iter().rev() {
            if let Err(e) = self.engine.compensate(compensation).await
                && result.is_ok()
            {
                result = Err(e);
            }
        }
        result
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if !self.closed && !self.compensations.is_empty() {
            tracing::warn!(
                count = self.compensations.len(),
                "Transaction scope dropped open; compensating at shutdown"
            );
            self.engine.defer(std::mem::take(&mut self.compensations));
        }
    }
}

fn summary_count(name: &'static str, expected: u64) -> Check {
    Check::new(format!("{} = {}", name, expected), move |root| {
        let found = reader::child(root, WFS, "TransactionSummary")
            .and_then(|s| reader::child_text(s, WFS, name))
            .map_or(Ok(0), |t| t.parse::<u64>())
            .map_err(|_| format!("{} is not a count", name))?;
        if found == expected {
            Ok(())
        } else {
            Err(format!("Expected {} {}, got {}", name, expected, found))
        }
    })
}

fn parse_outcome(response: &WfsResponse) -> ConformanceResult<Outcome> {
    let doc = response.document()?;
    let root = doc.root_element();
    let mut outcome = Outcome::default();
    if let Some(summary) = reader::child(root, WFS, "TransactionSummary") {
        let count = |name: &str| {
            reader::child_text(summary, WFS, name)
                .and_then(|t| t.parse().ok())
                .unwrap_or(0)
        };
        outcome.inserted = count("totalInserted");
        outcome.updated = count("totalUpdated");
        outcome.replaced = count("totalReplaced");
        outcome.deleted = count("totalDeleted");
    }
    let results = |name: &str| -> Vec<(String, Option<String>)> {
        reader::child(root, WFS, name)
            .map(|r| {
                reader::children(r, WFS, "Feature")
                    .flat_map(|f| reader::children(f, FES, "ResourceId"))
                    .filter_map(|rid| {
                        rid.attribute("rid").map(|id| {
                            (id.to_string(), rid.attribute("version").map(str::to_string))
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };
    outcome.inserts = results("InsertResults");
    outcome.updates = results("UpdateResults");
    outcome.replaces = results("ReplaceResults");
    tracing::debug!(
        inserted = outcome.inserted,
        updated = outcome.updated,
        replaced = outcome.replaced,
        deleted = outcome.deleted,
        "Transaction summary"
    );
    Ok(outcome)
}

fn parse_lock_response(response: &WfsResponse) -> ConformanceResult<LockResult> {
    let doc = response.document()?;
    let root = doc.root_element();
    let ids = |name: &str| -> Vec<String> {
        reader::child(root, WFS, name)
            .map(|list| {
                reader::children(list, FES, "ResourceId")
                    .filter_map(|r| r.attribute("rid").map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    Ok(LockResult {
        lock_id: root.attribute("lockId").unwrap_or_default().to_string(),
        locked: ids("FeaturesLocked"),
        not_locked: ids("FeaturesNotLocked"),
    })
}

fn gml_id(element: &Element) -> Option<String> {
    element.attribute_ns(GML, "id").map(str::to_string)
}

/// Copy of a sampled feature with fresh gml:id values throughout, ready to insert.
pub fn fresh_copy(feature: &SampledFeature) -> Element {
    let suffix = Uuid::new_v4().simple().to_string();
    let mut element = feature.element.clone();
    rename_ids(&mut element, &suffix[..12]);
    element
}

fn rename_ids(element: &mut Element, suffix: &str) {
    for attribute in &mut element.attributes {
        if attribute.namespace.as_deref() == Some(GML) && attribute.name == "id" {
            attribute.value = format!("{}-{}", attribute.value, suffix);
        }
    }
    for child in element.elements_mut() {
        rename_ids(child, suffix);
    }
}

/// A value different from `current` that still fits the property's type.
pub fn new_property_value(property: &PropertyDescriptor, current: Option<&str>) -> Option<String> {
    let current = current.map(str::trim);
    if !property.enumerations.is_empty() {
        return property
            .enumerations
            .iter()
            .find(|v| Some(v.as_str()) != current)
            .cloned();
    }
    let number = current.and_then(|c| c.parse::<f64>().ok());
    let value = match &property.property_type {
        PropertyType::String => {
            if current == Some("TEST_VALUE") {
                "TEST_VALUE_2".to_string()
            } else {
                "TEST_VALUE".to_string()
            }
        }
        PropertyType::DateTime => Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        PropertyType::Date => Utc::now().format("%Y-%m-%d").to_string(),
        PropertyType::Double => match number {
            Some(n) if n != 0.0 => (n / 2.0).to_string(),
            _ => "1.5".to_string(),
        },
        PropertyType::Decimal => match number {
            Some(n) if n != 0.0 => (n / 10.0).to_string(),
            _ => "0.1".to_string(),
        },
        PropertyType::Integer => match current.and_then(|c| c.parse::<i64>().ok()) {
            Some(n) => n.checked_add(1).unwrap_or(n - 1).to_string(),
            None => "1".to_string(),
        },
        PropertyType::Uri => "http://example.org/test".to_string(),
        PropertyType::Boolean => (!matches!(current, Some("true" | "1"))).to_string(),
        PropertyType::Geometry(_) | PropertyType::Other(_) => return None,
    };
    (Some(value.as_str()) != current).then_some(value)
}

/// First declared non-nillable scalar property of the feature with a derivable new value.
pub fn update_candidate(
    info: &FeatureTypeInfo,
    feature: &SampledFeature,
) -> Option<(QName, String)> {
    let (required, nillable): (Vec<_>, Vec<_>) = info
        .properties
        .iter()
        .filter(|p| p.property_type.is_scalar())
        .partition(|p| !p.nillable);
    required.into_iter().chain(nillable).find_map(|p| {
        let current = feature.record.value(p.local_name());
        current?;
        new_property_value(p, current).map(|v| (p.name.clone(), v))
    })
}
