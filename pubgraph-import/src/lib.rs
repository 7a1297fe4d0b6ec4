//! Bulk JSON import for pubgraph.
//!
//! A manifest lists field definitions and Pubs keyed by a local name. Each
//! Pub becomes one batch item upserted by id, so items can relate to one
//! another by key, and re-running a manifest that pins its ids converges
//! instead of duplicating.

use pubgraph_model::{FieldType, PubField};
use pubgraph_ops::{Batch, ConnectOptions, EngineConfig, Mutation, OpsError};
use pubgraph_storage::{PubStore, StorageError};
use pubgraph_types::{CommunityId, PubId, PubTypeId, StageId};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate pub key '{0}'")]
    DuplicateKey(String),

    #[error("relation target '{0}' is neither a pub key nor a pub id")]
    UnknownTarget(String),

    #[error("field '{0}' already exists with a different type")]
    FieldMismatch(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ops(#[from] OpsError),
}

/// Top-level import document.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub community_id: CommunityId,
    /// Pub type used when a Pub does not name its own.
    pub pub_type_id: PubTypeId,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub pubs: Vec<PubSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub slug: String,
    pub schema: FieldType,
    #[serde(default)]
    pub relation_value: Option<FieldType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubSpec {
    /// Name other Pubs in the manifest use to relate to this one.
    pub key: String,
    /// Fixed id; a fresh one is generated when absent.
    #[serde(default)]
    pub id: Option<PubId>,
    #[serde(default)]
    pub pub_type_id: Option<PubTypeId>,
    #[serde(default)]
    pub stage_id: Option<StageId>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
    /// Replace the stored edges of every listed relation field.
    #[serde(default)]
    pub replace_relations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationSpec {
    pub field: String,
    /// A key from this manifest or the id of an existing Pub.
    pub to: String,
    #[serde(default)]
    pub value: Value,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub fields_created: usize,
    /// Each manifest key with the Pub id it was written to.
    pub pubs: Vec<(String, PubId)>,
    pub pubs_created: usize,
}

impl Manifest {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Pub id for every key, generated where the manifest does not pin one.
    pub fn assign_ids(&self) -> Result<HashMap<String, PubId>, ImportError> {
        let mut ids = HashMap::with_capacity(self.pubs.len());
        for spec in &self.pubs {
            let id = spec.id.unwrap_or_else(PubId::new);
            if ids.insert(spec.key.clone(), id).is_some() {
                return Err(ImportError::DuplicateKey(spec.key.clone()));
            }
        }
        Ok(ids)
    }

    /// One mutation per Pub, in manifest order.
    pub fn plan(&self) -> Result<Vec<(String, PubId, Mutation)>, ImportError> {
        let ids = self.assign_ids()?;
        let resolve = |to: &str| -> Result<PubId, ImportError> {
            match ids.get(to) {
                Some(id) => Ok(*id),
                None => to
                    .parse()
                    .map_err(|_| ImportError::UnknownTarget(to.to_string())),
            }
        };

        let mut items = Vec::with_capacity(self.pubs.len());
        for spec in &self.pubs {
            let id = ids[&spec.key];
            let mut m = Mutation::new(self.community_id);
            let mut op = m
                .upsert(id, spec.pub_type_id.unwrap_or(self.pub_type_id))
                .set_all(spec.values.clone());
            if let Some(stage_id) = spec.stage_id {
                op = op.stage(stage_id);
            }
            let options = ConnectOptions {
                override_existing: spec.replace_relations,
                delete_orphaned: false,
            };
            for relation in &spec.relations {
                op = op.connect_with(
                    relation.field.clone(),
                    resolve(&relation.to)?,
                    relation.value.clone(),
                    options,
                );
            }
            let root = op.op();
            m.add_root(root);
            items.push((spec.key.clone(), id, m));
        }
        Ok(items)
    }
}

/// Registers the manifest's fields that do not exist yet.
pub fn ensure_fields(store: &PubStore, manifest: &Manifest) -> Result<usize, ImportError> {
    let mut created = 0;
    for spec in &manifest.fields {
        let field = match (spec.schema, spec.relation_value) {
            (FieldType::Relation, edge) => PubField::relation(
                manifest.community_id,
                &spec.slug,
                edge.unwrap_or(FieldType::Json),
            ),
            (schema, _) => PubField::scalar(manifest.community_id, &spec.slug, schema),
        };
        match store.field(manifest.community_id, &spec.slug)? {
            Some(existing) => {
                if existing.schema != field.schema
                    || existing.relation_value != field.relation_value
                {
                    return Err(ImportError::FieldMismatch(spec.slug.clone()));
                }
            }
            None => {
                store.create_field(&field)?;
                created += 1;
            }
        }
    }
    debug!("Registered {created} new fields");
    Ok(created)
}

/// Imports `manifest` into `store` as one batch.
pub async fn run_import(
    store: &PubStore,
    manifest: &Manifest,
    config: &EngineConfig,
) -> Result<ImportReport, ImportError> {
    let fields_created = ensure_fields(store, manifest)?;
    let items = manifest.plan()?;

    let mut pubs = Vec::with_capacity(items.len());
    let mut batch = Batch::with_config(store, config);
    for (key, id, mutation) in items {
        pubs.push((key, id));
        batch = batch.add_mutation(mutation);
    }
    let report = batch.execute_report().await?;

    info!(
        "Imported {} pubs ({} new) into community {}",
        pubs.len(),
        report.created.len(),
        manifest.community_id
    );
    Ok(ImportReport {
        fields_created,
        pubs,
        pubs_created: report.created.len(),
    })
}
