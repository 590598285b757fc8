//! Batched read of API field values for many revisions at once.

use std::collections::{BTreeMap, HashMap};

use revfield_core::{Phid, RevisionRecord, Viewer};
use revfield_storage::Storage;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::EngineError;
use crate::field::FieldRole;
use crate::registry::{FieldCatalog, FieldList, FieldStorageQuery};

pub const EDGE_OBJECT_HAS_PROJECT: &str = "object.has-project";
pub const EDGE_REVISION_DEPENDS_ON: &str = "revision.depends-on-revision";

/// API keys that are not fields at all but lists of edge destinations.
/// These keys are reserved: they replace any field answering to the same key.
pub const LEGACY_EDGE_KEYS: &[(&str, &str)] = &[
    ("phabricator:projects", EDGE_OBJECT_HAS_PROJECT),
    ("phabricator:depends-on", EDGE_REVISION_DEPENDS_ON),
];

/// Resolve `api key -> value` for every revision, plus the legacy edge keys.
///
/// Object-stored fields (title, summary, test plan) are read from the records
/// passed in, so callers must pass the current stored records.
///
/// Costs one auxiliary field query and one edge query no matter how many
/// revisions are passed.
pub fn load_custom_fields_for_revisions<S: Storage + ?Sized>(
    storage: &S,
    catalog: &FieldCatalog,
    viewer: &Viewer,
    revisions: &[RevisionRecord],
) -> Result<BTreeMap<Phid, Map<String, Value>>, EngineError> {
    let mut lists: Vec<FieldList> = revisions
        .iter()
        .map(|revision| {
            let mut list = catalog.object_fields(FieldRole::Api);
            list.set_viewer(viewer).read_fields_from_object(revision);
            list
        })
        .collect();

    FieldStorageQuery::new()
        .add_all(lists.iter_mut())
        .execute(storage)?;

    let mut results: BTreeMap<Phid, Map<String, Value>> = revisions
        .iter()
        .zip(lists)
        .map(|(revision, list)| (revision.phid, list.into_api_key_map()))
        .collect();

    let sources: Vec<Phid> = revisions.iter().map(|r| r.phid).collect();
    let edge_types: Vec<&str> = LEGACY_EDGE_KEYS.iter().map(|(_, edge)| *edge).collect();
    let edges = storage.edge_destinations(&sources, &edge_types)?;

    let key_for_edge: HashMap<&str, &str> = LEGACY_EDGE_KEYS
        .iter()
        .map(|(key, edge)| (*edge, *key))
        .collect();
    for values in results.values_mut() {
        for (key, _) in LEGACY_EDGE_KEYS {
            values.insert(key.to_string(), Value::Array(Vec::new()));
        }
    }
    for edge in &edges {
        let Some(key) = key_for_edge.get(edge.edge_type.as_str()) else {
            continue;
        };
        if let Some(Value::Array(destinations)) = results
            .get_mut(&edge.source)
            .and_then(|values| values.get_mut(*key))
        {
            destinations.push(Value::String(edge.destination.to_string()));
        }
    }

    debug!(
        revisions = revisions.len(),
        edges = edges.len(),
        "resolved api fields"
    );
    Ok(results)
}
