//! Serialized form of a part studio
//!
//! Ops are stored in rebuild order and replayed through the same validation
//! as `PartStudio::add_op`, so a loaded studio can never reference a later
//! op. Sketches get the same checks as sketch edits. Results are not stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PartStudio, StudioError};
use crate::op::Op;
use crate::sketch::{Plane, Sketch};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartStudioData {
    pub id: Uuid,
    pub name: String,
    pub planes: Vec<Plane>,
    #[serde(default)]
    pub sketches: Vec<Sketch>,
    #[serde(default)]
    pub ops: Vec<Op>,
}

impl From<PartStudio> for PartStudioData {
    fn from(studio: PartStudio) -> Self {
        let ops = studio.ops().cloned().collect();
        Self {
            id: studio.id,
            name: studio.name,
            planes: studio.planes.into_values().collect(),
            sketches: studio
                .sketches
                .into_values()
                .map(Arc::unwrap_or_clone)
                .collect(),
            ops,
        }
    }
}

impl TryFrom<PartStudioData> for PartStudio {
    type Error = StudioError;

    fn try_from(data: PartStudioData) -> Result<Self, Self::Error> {
        let planes: BTreeMap<Uuid, Plane> = data.planes.into_iter().map(|p| (p.id, p)).collect();
        let mut studio = PartStudio::with_planes(data.id, data.name, planes);
        for sketch in data.sketches {
            if !studio.planes.contains_key(&sketch.plane_id) {
                return Err(StudioError::PlaneNotFound(sketch.plane_id));
            }
            sketch.validate()?;
            studio.sketches.insert(sketch.id, Arc::new(sketch));
        }
        for op in data.ops {
            studio.push_op(op)?;
        }
        Ok(studio)
    }
}
