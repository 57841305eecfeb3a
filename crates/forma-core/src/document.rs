//! Document aggregate and file serialization

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use forma_cad::op::OpResult;
use forma_cad::{KernelContext, ParamEnv, ParamError, ParamPatch, PartStudio, RebuildReport, StudioError};
use glam::DMat4;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembly::{Assembly, AssemblyError};

/// Current file format version
pub const FORMAT_VERSION: u32 = 1;

/// A named body exported from a part studio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: Uuid,
    pub name: String,
    pub studio_id: Uuid,
    pub op_id: Uuid,
}

/// Document-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Part studio not found: {0}")]
    StudioNotFound(Uuid),
    #[error("Part not found: {0}")]
    PartNotFound(Uuid),
    #[error("Assembly not found: {0}")]
    AssemblyNotFound(Uuid),
    #[error("Op {op} not found in part studio {studio}")]
    OpNotFound { studio: Uuid, op: Uuid },
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Studio(#[from] StudioError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Serialization format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentData {
    version: u32,
    id: Uuid,
    name: String,
    #[serde(default)]
    params: ParamEnv,
    #[serde(default)]
    part_studios: Vec<PartStudio>,
    #[serde(default)]
    parts: Vec<Part>,
    #[serde(default)]
    assemblies: Vec<Assembly>,
}

/// Parameters, part studios, parts and assemblies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DocumentData", into = "DocumentData")]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    params: ParamEnv,
    studios: BTreeMap<Uuid, PartStudio>,
    parts: BTreeMap<Uuid, Part>,
    assemblies: BTreeMap<Uuid, Assembly>,
}

impl From<Document> for DocumentData {
    fn from(doc: Document) -> Self {
        Self {
            version: FORMAT_VERSION,
            id: doc.id,
            name: doc.name,
            params: doc.params,
            part_studios: doc.studios.into_values().collect(),
            parts: doc.parts.into_values().collect(),
            assemblies: doc.assemblies.into_values().collect(),
        }
    }
}

impl TryFrom<DocumentData> for Document {
    type Error = DocumentError;

    fn try_from(data: DocumentData) -> Result<Self, Self::Error> {
        if data.version > FORMAT_VERSION {
            return Err(DocumentError::Deserialize(format!(
                "unsupported format version {}",
                data.version
            )));
        }
        let doc = Self {
            id: data.id,
            name: data.name,
            params: data.params,
            studios: data.part_studios.into_iter().map(|s| (s.id, s)).collect(),
            parts: BTreeMap::new(),
            assemblies: BTreeMap::new(),
        };
        let doc = data
            .parts
            .into_iter()
            .try_fold(doc, |doc, part| doc.insert_part(part))?;
        data.assemblies
            .into_iter()
            .try_fold(doc, |doc, assembly| doc.insert_assembly(assembly))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            params: ParamEnv::new(),
            studios: BTreeMap::new(),
            parts: BTreeMap::new(),
            assemblies: BTreeMap::new(),
        }
    }

    // ============== Parameters ==============

    pub fn params(&self) -> &ParamEnv {
        &self.params
    }

    pub fn add_param(&self, name: &str, initial_value: f64) -> Result<(Self, Uuid), DocumentError> {
        let (params, id) = self.params.add_param(name, initial_value)?;
        Ok((self.with_params(params), id))
    }

    pub fn update_param(&self, id: Uuid, patch: ParamPatch) -> Result<Self, DocumentError> {
        let params = self.params.update_param(id, patch)?;
        Ok(self.with_params(params))
    }

    pub fn remove_param(&self, id: Uuid) -> Result<Self, DocumentError> {
        let params = self.params.remove_param(id)?;
        Ok(self.with_params(params))
    }

    /// Swap in a new environment; every studio must rebuild from op 0
    fn with_params(&self, params: ParamEnv) -> Self {
        let mut next = self.clone();
        next.params = params;
        next.studios = self
            .studios
            .iter()
            .map(|(id, studio)| (*id, studio.invalidated()))
            .collect();
        next
    }

    // ============== Part Studios ==============

    pub fn add_studio(&self, name: impl Into<String>) -> (Self, Uuid) {
        let studio = PartStudio::new(name);
        let id = studio.id;
        let mut next = self.clone();
        next.studios.insert(id, studio);
        (next, id)
    }

    pub fn studio(&self, id: Uuid) -> Option<&PartStudio> {
        self.studios.get(&id)
    }

    pub fn studios(&self) -> impl Iterator<Item = &PartStudio> {
        self.studios.values()
    }

    /// Replace a studio with an edited version of it
    ///
    /// Parts whose op no longer exists are removed along with their
    /// instances.
    pub fn update_studio(&self, studio: PartStudio) -> Result<Self, DocumentError> {
        if !self.studios.contains_key(&studio.id) {
            return Err(DocumentError::StudioNotFound(studio.id));
        }
        let dangling: Vec<Uuid> = self
            .parts
            .values()
            .filter(|p| p.studio_id == studio.id && studio.op(p.op_id).is_none())
            .map(|p| p.id)
            .collect();
        let mut next = self.clone();
        next.studios.insert(studio.id, studio);
        Ok(dangling.into_iter().fold(next, |doc, part| doc.drop_part(part)))
    }

    /// Remove a studio and every part exported from it
    pub fn remove_studio(&self, id: Uuid) -> Result<Self, DocumentError> {
        if !self.studios.contains_key(&id) {
            return Err(DocumentError::StudioNotFound(id));
        }
        let parts: Vec<Uuid> = self
            .parts
            .values()
            .filter(|p| p.studio_id == id)
            .map(|p| p.id)
            .collect();
        let mut next = parts.into_iter().fold(self.clone(), |doc, part| doc.drop_part(part));
        next.studios.remove(&id);
        Ok(next)
    }

    // ============== Parts ==============

    pub fn add_part(
        &self,
        name: impl Into<String>,
        studio_id: Uuid,
        op_id: Uuid,
    ) -> Result<(Self, Uuid), DocumentError> {
        let part = Part {
            id: Uuid::new_v4(),
            name: name.into(),
            studio_id,
            op_id,
        };
        let id = part.id;
        Ok((self.clone().insert_part(part)?, id))
    }

    fn insert_part(mut self, part: Part) -> Result<Self, DocumentError> {
        let studio = self
            .studios
            .get(&part.studio_id)
            .ok_or(DocumentError::StudioNotFound(part.studio_id))?;
        if studio.op(part.op_id).is_none() {
            return Err(DocumentError::OpNotFound {
                studio: part.studio_id,
                op: part.op_id,
            });
        }
        self.parts.insert(part.id, part);
        Ok(self)
    }

    /// Remove a part and its instances in every assembly
    pub fn remove_part(&self, id: Uuid) -> Result<Self, DocumentError> {
        if !self.parts.contains_key(&id) {
            return Err(DocumentError::PartNotFound(id));
        }
        Ok(self.clone().drop_part(id))
    }

    fn drop_part(mut self, id: Uuid) -> Self {
        self.parts.remove(&id);
        for assembly in self.assemblies.values_mut() {
            *assembly = assembly.remove_part_instances(id);
        }
        self
    }

    pub fn part(&self, id: Uuid) -> Option<&Part> {
        self.parts.get(&id)
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.values()
    }

    /// Current result of the op a part exports, if its studio is built
    pub fn part_body(&self, id: Uuid) -> Option<&Arc<OpResult>> {
        let part = self.parts.get(&id)?;
        self.studios.get(&part.studio_id)?.result(part.op_id)
    }

    // ============== Assemblies ==============

    pub fn add_assembly(&self, name: impl Into<String>) -> (Self, Uuid) {
        let assembly = Assembly::new(name);
        let id = assembly.id;
        let mut next = self.clone();
        next.assemblies.insert(id, assembly);
        (next, id)
    }

    /// Place an instance of a part in an assembly
    pub fn add_instance(
        &self,
        assembly_id: Uuid,
        part_id: Uuid,
        name: impl Into<String>,
        transform: DMat4,
    ) -> Result<(Self, Uuid), DocumentError> {
        if !self.parts.contains_key(&part_id) {
            return Err(DocumentError::PartNotFound(part_id));
        }
        let assembly = self
            .assemblies
            .get(&assembly_id)
            .ok_or(DocumentError::AssemblyNotFound(assembly_id))?;
        let (assembly, id) = assembly.add_instance(part_id, name, transform);
        let mut next = self.clone();
        next.assemblies.insert(assembly_id, assembly);
        Ok((next, id))
    }

    /// Replace an assembly with an edited version of it
    pub fn update_assembly(&self, assembly: Assembly) -> Result<Self, DocumentError> {
        if !self.assemblies.contains_key(&assembly.id) {
            return Err(DocumentError::AssemblyNotFound(assembly.id));
        }
        self.clone().insert_assembly(assembly)
    }

    fn insert_assembly(mut self, assembly: Assembly) -> Result<Self, DocumentError> {
        if let Some(instance) = assembly.instances().find(|i| !self.parts.contains_key(&i.part_id)) {
            return Err(DocumentError::PartNotFound(instance.part_id));
        }
        self.assemblies.insert(assembly.id, assembly);
        Ok(self)
    }

    pub fn remove_assembly(&self, id: Uuid) -> Result<Self, DocumentError> {
        let mut next = self.clone();
        next.assemblies
            .remove(&id)
            .ok_or(DocumentError::AssemblyNotFound(id))?;
        Ok(next)
    }

    pub fn assembly(&self, id: Uuid) -> Option<&Assembly> {
        self.assemblies.get(&id)
    }

    pub fn assemblies(&self) -> impl Iterator<Item = &Assembly> {
        self.assemblies.values()
    }

    // ============== Rebuild ==============

    /// Rebuild every part studio against the document parameters
    pub fn rebuild_all(&self, ctx: &mut KernelContext) -> (Self, Vec<(Uuid, RebuildReport)>) {
        let mut next = self.clone();
        let mut reports = Vec::with_capacity(self.studios.len());
        for (id, studio) in &self.studios {
            let (built, report) = studio.rebuild(&self.params, ctx);
            next.studios.insert(*id, built);
            reports.push((*id, report));
        }
        (next, reports)
    }

    // ============== Files ==============

    /// Save to a file; `.json` files are written as JSON, anything else as RON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path = path.as_ref();
        let content = if is_json(path) {
            self.to_json()?.into_bytes()
        } else {
            self.to_bytes()?
        };
        std::fs::write(path, content).map_err(|e| DocumentError::Io(e.to_string()))?;
        tracing::info!("Saved document '{}' to {}", self.name, path.display());
        Ok(())
    }

    /// Load from a file written by [`Document::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DocumentError::Io(e.to_string()))?;
        if is_json(path) {
            Self::from_json(&content)
        } else {
            Self::from_ron(&content)
        }
    }

    pub fn to_ron(&self) -> Result<String, DocumentError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| DocumentError::Serialize(e.to_string()))
    }

    pub fn from_ron(content: &str) -> Result<Self, DocumentError> {
        ron::from_str(content).map_err(|e| DocumentError::Deserialize(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).map_err(|e| DocumentError::Serialize(e.to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(content).map_err(|e| DocumentError::Deserialize(e.to_string()))
    }

    /// Serialize to RON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(self.to_ron()?.into_bytes())
    }

    /// Load from RON bytes
    pub fn load_from_bytes(data: &[u8]) -> Result<Self, DocumentError> {
        let content =
            std::str::from_utf8(data).map_err(|e| DocumentError::Deserialize(e.to_string()))?;
        Self::from_ron(content)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
