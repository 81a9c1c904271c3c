use geo::Rect;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::binding::{Operation, WfsClient, WfsRequest, WfsResponse};
use crate::error::{ConformanceError, ConformanceResult};
use crate::feature::{self, FeatureRecord};
use crate::filter::TimePosition;
use crate::validation::ExceptionReport;
use crate::xml::namespaces::WFS;
use crate::xml::{Element, QName, reader};

/// One sampled feature: the flattened view plus the element as returned.
#[derive(Debug, Clone)]
pub struct SampledFeature {
    pub record: FeatureRecord,
    pub element: Element,
}

/// Live instances of one feature type, read once per run.
#[derive(Debug, Clone)]
pub struct FeatureSample {
    pub type_name: QName,
    pub features: Vec<SampledFeature>,
    pub extent: Option<Rect<f64>>,
    pub srs_name: Option<String>,
    /// Earliest and latest value of every property whose values are all time positions
    pub temporal_extents: IndexMap<String, (TimePosition, TimePosition)>,
}

impl FeatureSample {
    pub fn new(type_name: QName, features: Vec<SampledFeature>) -> Self {
        let extent = features
            .iter()
            .filter_map(|f| f.record.envelope())
            .reduce(feature::union);
        let srs_name = features
            .iter()
            .flat_map(|f| f.record.geometries.values())
            .find_map(|g| g.srs_name.clone());

        let mut temporal_extents: IndexMap<String, (TimePosition, TimePosition)> = IndexMap::new();
        let mut rejected: Vec<String> = Vec::new();
        for record in features.iter().map(|f| &f.record) {
            for (name, value) in &record.values {
                let Some(value) = value else { continue };
                if rejected.contains(name) {
                    continue;
                }
                let Some(at) = TimePosition::parse(value) else {
                    temporal_extents.shift_remove(name);
                    rejected.push(name.clone());
                    continue;
                };
                temporal_extents
                    .entry(name.clone())
                    .and_modify(|(first, last)| {
                        if at.to_utc() < first.to_utc() {
                            *first = at;
                        }
                        if at.to_utc() > last.to_utc() {
                            *last = at;
                        }
                    })
                    .or_insert((at, at));
            }
        }

        Self {
            type_name,
            features,
            extent,
            srs_name,
            temporal_extents,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.features.iter().map(|f| f.record.id.clone()).collect()
    }

    pub fn feature_by_id(&self, id: &str) -> Option<&SampledFeature> {
        self.features.iter().find(|f| f.record.id == id)
    }

    /// First sampled feature with a non-nil value for `property`.
    pub fn representative(&self, property: &str) -> Option<(&SampledFeature, &str)> {
        self.features
            .iter()
            .find_map(|f| f.record.value(property).map(|v| (f, v)))
    }

    /// Every non-nil value of `property` across the sample, in sample order.
    pub fn values_of(&self, property: &str) -> Vec<&str> {
        self.features
            .iter()
            .filter_map(|f| f.record.value(property))
            .collect()
    }

    /// All values of a (possibly repeated) property of one feature.
    pub fn property_values(&self, property: &str, id: &str) -> Vec<String> {
        self.feature_by_id(id)
            .map(|f| {
                f.element
                    .elements()
                    .filter(|e| e.name == property)
                    .map(|e| e.text_content())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Up to `n` identifiers: the first ones, or a seeded random choice.
    pub fn select_feature_ids(&self, n: usize, seed: Option<u64>) -> Vec<String> {
        let mut ids = self.ids();
        if let Some(seed) = seed {
            let mut rng = StdRng::seed_from_u64(seed);
            ids.shuffle(&mut rng);
            tracing::info!(seed, type_name = %self.type_name.prefixed(), "Randomized feature selection");
        }
        ids.truncate(n);
        ids
    }
}

/// Collects and caches feature samples. Each type is fetched at most once per
/// run; concurrent callers wait on the same fetch.
pub struct DataSampler {
    client: Arc<WfsClient>,
    sample_size: usize,
    cache: Mutex<HashMap<QName, Arc<OnceCell<Arc<FeatureSample>>>>>,
}

impl DataSampler {
    pub fn new(client: Arc<WfsClient>, sample_size: usize) -> Self {
        Self {
            client,
            sample_size,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, type_name: &QName) -> Arc<OnceCell<Arc<FeatureSample>>> {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.entry(type_name.clone()).or_default().clone()
    }

    /// Cached sample of `type_name`. Failed fetches are not cached.
    pub async fn sample(&self, type_name: &QName) -> ConformanceResult<Arc<FeatureSample>> {
        let cell = self.cell(type_name);
        cell.get_or_try_init(|| async {
            self.fetch(type_name, self.sample_size).await.map(Arc::new)
        })
        .await
        .cloned()
    }

    /// Sample of a type that must hold data; an empty one is inapplicable.
    pub async fn non_empty(&self, type_name: &QName) -> ConformanceResult<Arc<FeatureSample>> {
        let sample = self.sample(type_name).await?;
        if sample.is_empty() {
            return Err(ConformanceError::Inapplicable(format!(
                "SUT reports zero instances of type {}",
                type_name.prefixed()
            )));
        }
        Ok(sample)
    }

    /// Issue an unfiltered query for up to `max_instances` features, trying
    /// each GetFeature binding until one returns data.
    pub async fn fetch(
        &self,
        type_name: &QName,
        max_instances: usize,
    ) -> ConformanceResult<FeatureSample> {
        let request = WfsRequest::get_feature(self.client.version(), type_name, None)
            .attr("count", max_instances);

        let mut last_error = None;
        let mut answered = false;
        for binding in self.client.bindings_for(Operation::GetFeature) {
            let response = match self.client.send_with(&request, binding).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(%binding, type_name = %type_name.prefixed(), "Sampling failed: {}", e);
                    last_error = Some(e);
                    continue;
                }
            };
            match parse_sample(type_name, &response) {
                Ok(features) if !features.is_empty() => {
                    tracing::info!(
                        %binding,
                        type_name = %type_name.prefixed(),
                        count = features.len(),
                        "Sampled features"
                    );
                    return Ok(FeatureSample::new(type_name.clone(), features));
                }
                Ok(_) => answered = true,
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => {
                tracing::info!(type_name = %type_name.prefixed(), "SUT reports zero instances");
                Ok(FeatureSample::new(type_name.clone(), Vec::new()))
            }
        }
    }
}

fn parse_sample(type_name: &QName, response: &WfsResponse) -> ConformanceResult<Vec<SampledFeature>> {
    let doc = response.document()?;
    let root = doc.root_element();
    if let Some(report) = ExceptionReport::from_node(root) {
        return Err(ConformanceError::business_rule(format!(
            "Sampling {} failed: {}",
            type_name.prefixed(),
            report.summary()
        ))
        .with_exchange(&response.exchange));
    }
    if !reader::is(root, WFS, "FeatureCollection") {
        return Err(ConformanceError::schema(format!(
            "Expected wfs:FeatureCollection, found {}",
            reader::element_qname(root)
        ))
        .with_exchange(&response.exchange));
    }
    Ok(feature::features(root)
        .into_iter()
        .filter(|node| type_name.matches(node.tag_name().namespace(), node.tag_name().name()))
        .map(|node| SampledFeature {
            record: FeatureRecord::from_node(node),
            element: Element::from_node(node),
        })
        .collect())
}
