//! Reusable business-rule predicates over a parsed response.

use roxmltree::Node;
use std::collections::HashSet;

use crate::feature::{FeatureRecord, feature_id, feature_ids, features, tuples};
use crate::filter::eval::{join_matches, matches};
use crate::filter::{FilterExpression, SpatialJoin};
use crate::xml::namespaces::{GML, WFS};
use crate::xml::{QName, reader};

type Predicate = Box<dyn Fn(Node<'_, '_>) -> Result<(), String> + Send + Sync>;

/// A named predicate evaluated against the root element of a response.
pub struct Check {
    pub description: String,
    predicate: Predicate,
}

impl Check {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Node<'_, '_>) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    pub fn run(&self, root: Node<'_, '_>) -> Result<(), String> {
        (self.predicate)(root)
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("description", &self.description)
            .finish()
    }
}

fn count_attribute(root: Node<'_, '_>, name: &str) -> Result<Option<u64>, String> {
    match root.attribute(name) {
        None | Some("unknown") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("{} '{}' is not a count", name, v)),
    }
}

pub fn feature_count(expected: usize) -> Check {
    Check::new(format!("response holds {} features", expected), move |root| {
        let found = features(root).len();
        if found == expected {
            Ok(())
        } else {
            Err(format!("Expected {} features, found {}", expected, found))
        }
    })
}

pub fn number_returned(expected: u64) -> Check {
    Check::new(format!("numberReturned = {}", expected), move |root| {
        match count_attribute(root, "numberReturned")? {
            Some(n) if n == expected => Ok(()),
            other => Err(format!("Expected numberReturned {}, got {:?}", expected, other)),
        }
    })
}

/// `numberMatched` does not exceed `limit`; `unknown` is accepted.
pub fn number_matched_at_most(limit: u64) -> Check {
    Check::new(format!("numberMatched <= {}", limit), move |root| {
        match count_attribute(root, "numberMatched")? {
            Some(n) if n > limit => Err(format!(
                "numberMatched {} exceeds the {} instances of the type",
                n, limit
            )),
            _ => Ok(()),
        }
    })
}

/// `numberReturned` agrees with the members actually present.
pub fn number_returned_consistent() -> Check {
    Check::new("numberReturned matches member count", |root| {
        let found = features(root).len() as u64;
        match count_attribute(root, "numberReturned")? {
            Some(n) if n != found => Err(format!(
                "numberReturned is {} but {} features were returned",
                n, found
            )),
            _ => Ok(()),
        }
    })
}

pub fn ids_subset_of(allowed: HashSet<String>) -> Check {
    Check::new("returned identifiers belong to the expected set", move |root| {
        let stray: Vec<String> = feature_ids(root)
            .into_iter()
            .filter(|id| !allowed.contains(id))
            .collect();
        if stray.is_empty() {
            Ok(())
        } else {
            Err(format!("Unexpected features returned: {}", stray.join(", ")))
        }
    })
}

pub fn contains_id(id: impl Into<String>) -> Check {
    let id = id.into();
    Check::new(format!("response contains {}", id), move |root| {
        if feature_ids(root).contains(&id) {
            Ok(())
        } else {
            Err(format!("Feature {} is missing from the response", id))
        }
    })
}

pub fn no_duplicate_ids() -> Check {
    Check::new("no duplicate identifiers", |root| {
        let mut seen = HashSet::new();
        let duplicates: Vec<String> = feature_ids(root)
            .into_iter()
            .filter(|id| !seen.insert(id.clone()))
            .collect();
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(format!("Duplicate features: {}", duplicates.join(", ")))
        }
    })
}

/// Every returned feature satisfies `filter` when evaluated locally.
pub fn all_satisfy(filter: FilterExpression) -> Check {
    Check::new(format!("all features satisfy {}", filter.describe()), move |root| {
        let failing: Vec<String> = features(root)
            .into_iter()
            .map(FeatureRecord::from_node)
            .filter(|f| !matches(&filter, f))
            .map(|f| f.id)
            .collect();
        if failing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Features not satisfying {}: {}",
                filter.describe(),
                failing.join(", ")
            ))
        }
    })
}

/// Every member is a `wfs:Tuple` pairing one feature of each joined type,
/// and every pair satisfies `join`.
pub fn tuples_satisfy(join: SpatialJoin) -> Check {
    Check::new(format!("tuples satisfy {}", join.describe()), move |root| {
        let members = reader::children(root, WFS, "member").count();
        let found = tuples(root);
        if found.len() != members {
            return Err(format!(
                "{} of {} members are not wfs:Tuple",
                members - found.len(),
                members
            ));
        }
        let same_type = |node: Node<'_, '_>, expected: &QName| {
            let name = reader::element_qname(node);
            name.namespace == expected.namespace && name.local_name == expected.local_name
        };
        let mut failing = Vec::new();
        for tuple in &found {
            let [left, right] = tuple.as_slice() else {
                return Err(format!("Tuple holds {} features instead of 2", tuple.len()));
            };
            if !same_type(*left, &join.left.type_name) || !same_type(*right, &join.right.type_name) {
                return Err(format!(
                    "Tuple pairs {} with {}",
                    reader::element_qname(*left),
                    reader::element_qname(*right)
                ));
            }
            let (a, b) = (FeatureRecord::from_node(*left), FeatureRecord::from_node(*right));
            if !join_matches(&join, &a, &b) {
                failing.push(format!("({}, {})", a.id, b.id));
            }
        }
        if failing.is_empty() {
            Ok(())
        } else {
            Err(format!("Pairs not satisfying {}: {}", join.describe(), failing.join(", ")))
        }
    })
}

pub fn contains_tuple(left: impl Into<String>, right: impl Into<String>) -> Check {
    let (left, right) = (left.into(), right.into());
    Check::new(format!("response pairs {} with {}", left, right), move |root| {
        let found = tuples(root).iter().any(|tuple| {
            let ids: Vec<&str> = tuple.iter().filter_map(|f| feature_id(*f)).collect();
            ids == [left.as_str(), right.as_str()]
        });
        if found {
            Ok(())
        } else {
            Err(format!("No tuple pairs {} with {}", left, right))
        }
    })
}

pub fn root_is(namespace: &'static str, local_name: &'static str) -> Check {
    Check::new(format!("root element is {}", local_name), move |root| {
        if reader::is(root, namespace, local_name) {
            Ok(())
        } else {
            Err(format!(
                "Expected {{{}}}{}, found {}",
                namespace,
                local_name,
                reader::element_qname(root)
            ))
        }
    })
}

/// Every GML geometry in the response uses `expected`, or one common CRS when `None`.
pub fn srs_name_consistent(expected: Option<String>) -> Check {
    Check::new("geometries share one srsName", move |root| {
        let names: HashSet<&str> = root
            .descendants()
            .filter(|n| n.tag_name().namespace() == Some(GML))
            .filter_map(|n| n.attribute("srsName"))
            .collect();
        match &expected {
            Some(wanted) => match names.iter().find(|n| **n != wanted.as_str()) {
                Some(other) => Err(format!("Geometry in {} where {} was requested", other, wanted)),
                None => Ok(()),
            },
            None if names.len() > 1 => {
                let mut listed: Vec<_> = names.into_iter().collect();
                listed.sort_unstable();
                Err(format!("Mixed srsName values: {}", listed.join(", ")))
            }
            None => Ok(()),
        }
    })
}
