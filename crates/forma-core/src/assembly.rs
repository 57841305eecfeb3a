//! Assembly bookkeeping
//!
//! Part instances placed with rigid transforms, plus the constraints between
//! them. There is no 3D constraint solving here: an instance counts as
//! constrained when it is fixed or takes part in at least one constraint,
//! which over-reports for instances with a single loose mate.

use std::collections::BTreeMap;

use glam::DMat4;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("Instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("Constraint not found: {0}")]
    ConstraintNotFound(Uuid),

    #[error("Instance {0} cannot be constrained to itself")]
    SelfConstraint(Uuid),
}

/// A placed copy of a part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInstance {
    pub id: Uuid,
    pub part_id: Uuid,
    pub name: String,
    pub transform: DMat4,
    #[serde(default)]
    pub fixed: bool,
}

/// Relation between two instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MateKind {
    Fastened,
    Revolute,
    Slider,
    Cylindrical,
    Planar,
    Ball,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConstraint {
    pub id: Uuid,
    pub instance_a: Uuid,
    pub instance_b: Uuid,
    pub kind: MateKind,
}

impl AssemblyConstraint {
    pub fn involves(&self, instance: Uuid) -> bool {
        self.instance_a == instance || self.instance_b == instance
    }
}

/// Outcome of the last bookkeeping pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblySolveStatus {
    Ok,
    UnderConstrained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AssemblyData {
    id: Uuid,
    name: String,
    instances: Vec<PartInstance>,
    #[serde(default)]
    constraints: Vec<AssemblyConstraint>,
}

/// Instances and constraints; solved fields are derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AssemblyData", into = "AssemblyData")]
pub struct Assembly {
    pub id: Uuid,
    pub name: String,
    instances: BTreeMap<Uuid, PartInstance>,
    constraints: BTreeMap<Uuid, AssemblyConstraint>,
    solved_transforms: Option<BTreeMap<Uuid, DMat4>>,
    solve_status: Option<AssemblySolveStatus>,
}

impl From<Assembly> for AssemblyData {
    fn from(assembly: Assembly) -> Self {
        Self {
            id: assembly.id,
            name: assembly.name,
            instances: assembly.instances.into_values().collect(),
            constraints: assembly.constraints.into_values().collect(),
        }
    }
}

impl From<AssemblyData> for Assembly {
    fn from(data: AssemblyData) -> Self {
        let instances: BTreeMap<Uuid, PartInstance> =
            data.instances.into_iter().map(|i| (i.id, i)).collect();
        let constraints = data
            .constraints
            .into_iter()
            .filter(|c| {
                let known = instances.contains_key(&c.instance_a) && instances.contains_key(&c.instance_b);
                if !known {
                    tracing::warn!("Dropping constraint {} with unknown instance", c.id);
                }
                known
            })
            .map(|c| (c.id, c))
            .collect();
        Self {
            id: data.id,
            name: data.name,
            instances,
            constraints,
            solved_transforms: None,
            solve_status: None,
        }
    }
}

impl Assembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            instances: BTreeMap::new(),
            constraints: BTreeMap::new(),
            solved_transforms: None,
            solve_status: None,
        }
    }

    /// Clone with derived solve state cleared
    fn edited(&self) -> Self {
        let mut next = self.clone();
        next.solved_transforms = None;
        next.solve_status = None;
        next
    }

    /// Place a new instance of `part_id`
    pub fn add_instance(&self, part_id: Uuid, name: impl Into<String>, transform: DMat4) -> (Self, Uuid) {
        let instance = PartInstance {
            id: Uuid::new_v4(),
            part_id,
            name: name.into(),
            transform,
            fixed: false,
        };
        let id = instance.id;
        let mut next = self.edited();
        next.instances.insert(id, instance);
        (next, id)
    }

    /// Remove an instance together with its constraints
    pub fn remove_instance(&self, id: Uuid) -> Result<Self, AssemblyError> {
        if !self.instances.contains_key(&id) {
            return Err(AssemblyError::InstanceNotFound(id));
        }
        let mut next = self.edited();
        next.instances.remove(&id);
        next.constraints.retain(|_, c| !c.involves(id));
        Ok(next)
    }

    /// Remove every instance of `part_id`
    pub fn remove_part_instances(&self, part_id: Uuid) -> Self {
        let doomed: Vec<Uuid> = self
            .instances
            .values()
            .filter(|i| i.part_id == part_id)
            .map(|i| i.id)
            .collect();
        if doomed.is_empty() {
            return self.clone();
        }
        let mut next = self.edited();
        for id in &doomed {
            next.instances.remove(id);
            next.constraints.retain(|_, c| !c.involves(*id));
        }
        next
    }

    pub fn set_instance_transform(&self, id: Uuid, transform: DMat4) -> Result<Self, AssemblyError> {
        let mut next = self.edited();
        let instance = next
            .instances
            .get_mut(&id)
            .ok_or(AssemblyError::InstanceNotFound(id))?;
        instance.transform = transform;
        Ok(next)
    }

    pub fn toggle_instance_fixed(&self, id: Uuid) -> Result<Self, AssemblyError> {
        let mut next = self.edited();
        let instance = next
            .instances
            .get_mut(&id)
            .ok_or(AssemblyError::InstanceNotFound(id))?;
        instance.fixed = !instance.fixed;
        Ok(next)
    }

    /// Constrain two distinct, existing instances
    pub fn add_constraint(
        &self,
        instance_a: Uuid,
        instance_b: Uuid,
        kind: MateKind,
    ) -> Result<(Self, Uuid), AssemblyError> {
        for id in [instance_a, instance_b] {
            if !self.instances.contains_key(&id) {
                return Err(AssemblyError::InstanceNotFound(id));
            }
        }
        if instance_a == instance_b {
            return Err(AssemblyError::SelfConstraint(instance_a));
        }
        let constraint = AssemblyConstraint {
            id: Uuid::new_v4(),
            instance_a,
            instance_b,
            kind,
        };
        let id = constraint.id;
        let mut next = self.edited();
        next.constraints.insert(id, constraint);
        Ok((next, id))
    }

    pub fn remove_constraint(&self, id: Uuid) -> Result<Self, AssemblyError> {
        if !self.constraints.contains_key(&id) {
            return Err(AssemblyError::ConstraintNotFound(id));
        }
        let mut next = self.edited();
        next.constraints.remove(&id);
        Ok(next)
    }

    /// Fixed, or part of at least one constraint
    pub fn is_instance_constrained(&self, id: Uuid) -> bool {
        self.instances.get(&id).is_some_and(|i| i.fixed)
            || self.constraints.values().any(|c| c.involves(id))
    }

    /// Record current transforms as solved and report unconstrained instances
    pub fn solve_bookkeeping(&self) -> (Self, Vec<Uuid>) {
        let unconstrained: Vec<Uuid> = self
            .instances
            .keys()
            .filter(|id| !self.is_instance_constrained(**id))
            .copied()
            .collect();
        let mut next = self.clone();
        next.solved_transforms = Some(
            self.instances
                .values()
                .map(|i| (i.id, i.transform))
                .collect(),
        );
        next.solve_status = Some(if unconstrained.is_empty() {
            AssemblySolveStatus::Ok
        } else {
            AssemblySolveStatus::UnderConstrained
        });
        (next, unconstrained)
    }

    pub fn instance(&self, id: Uuid) -> Option<&PartInstance> {
        self.instances.get(&id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &PartInstance> {
        self.instances.values()
    }

    pub fn constraint(&self, id: Uuid) -> Option<&AssemblyConstraint> {
        self.constraints.get(&id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &AssemblyConstraint> {
        self.constraints.values()
    }

    pub fn solved_transforms(&self) -> Option<&BTreeMap<Uuid, DMat4>> {
        self.solved_transforms.as_ref()
    }

    pub fn solve_status(&self) -> Option<AssemblySolveStatus> {
        self.solve_status
    }
}
