//! End-to-end modeling scenarios through the document API

use std::sync::Arc;

use approx::assert_relative_eq;
use forma_cad::kernel::{BooleanType, GeometryKernel, KernelRef, PolyKernel};
use forma_cad::op::{ExtrudeDirection, Profile};
use forma_cad::sketch::SolveStatus;
use forma_cad::topo::{ResolveMethod, resolve_topo_ref};
use forma_cad::{
    Dimension, FormaConfig, KernelContext, NewtonSolver, Op, OpKind, OpState, ParamPatch,
    SketchConstraint,
};
use forma_core::{Document, History};
use glam::{DVec2, DVec3};
use uuid::Uuid;

struct Plate {
    doc: Document,
    studio_id: Uuid,
    sketch_op: Uuid,
    pad: Uuid,
    width: Uuid,
}

/// A `width` x 10 rectangle on Top padded by `thickness`
fn plate() -> Plate {
    let doc = Document::new("Plate");
    let (doc, width) = doc.add_param("width", 20.0).unwrap();
    let (doc, _) = doc.add_param("thickness", 4.0).unwrap();
    let (doc, studio_id) = doc.add_studio("Plate");

    let studio = doc.studio(studio_id).unwrap();
    let top = studio.plane_by_name("Top").unwrap().id;
    let (studio, sketch_id, sketch_op) = studio.add_sketch(top, "Outline").unwrap();
    let sketch = studio.sketch(sketch_id).unwrap().as_ref().clone();
    let (sketch, a) = sketch.add_point(DVec2::ZERO);
    let (sketch, b) = sketch.add_point(DVec2::new(20.0, 0.0));
    let (sketch, c) = sketch.add_point(DVec2::new(20.0, 10.0));
    let (sketch, d) = sketch.add_point(DVec2::new(0.0, 10.0));
    let (sketch, ab) = sketch.add_line(a, b).unwrap();
    let (sketch, bc) = sketch.add_line(b, c).unwrap();
    let (sketch, cd) = sketch.add_line(c, d).unwrap();
    let (sketch, da) = sketch.add_line(d, a).unwrap();
    let sketch = [
        SketchConstraint::fixed(a),
        SketchConstraint::horizontal(ab),
        SketchConstraint::horizontal(cd),
        SketchConstraint::vertical(bc),
        SketchConstraint::vertical(da),
        SketchConstraint::length(ab, Dimension::expr("width")),
        SketchConstraint::length(bc, 10.0),
    ]
    .into_iter()
    .fold(sketch, |s, c| s.add_constraint(c).unwrap().0);
    let studio = studio.with_sketch(sketch).unwrap();
    let (studio, pad) = studio
        .add_op(Op::extrude("Pad", sketch_id, Dimension::expr("thickness")))
        .unwrap();
    let doc = doc.update_studio(studio).unwrap();

    Plate {
        doc,
        studio_id,
        sketch_op,
        pad,
        width,
    }
}

fn poly_context() -> (Arc<PolyKernel>, KernelContext) {
    let poly = Arc::new(PolyKernel::new());
    let kernel: KernelRef = poly.clone();
    (poly, KernelContext::new(kernel, Box::new(NewtonSolver::new())))
}

fn max_coord(doc: &Document, studio: Uuid, op: Uuid, axis: usize) -> f32 {
    let result = doc.studio(studio).unwrap().result(op).unwrap();
    result
        .mesh()
        .unwrap()
        .positions
        .iter()
        .map(|p| p[axis])
        .fold(f32::MIN, f32::max)
}

#[test]
fn test_parameter_drives_geometry() {
    let plate = plate();
    let mut ctx = KernelContext::reference(&FormaConfig::default());
    let (built, reports) = plate.doc.rebuild_all(&mut ctx);
    assert!(reports.iter().all(|(_, r)| r.is_clean()));
    assert_relative_eq!(max_coord(&built, plate.studio_id, plate.pad, 0), 20.0, epsilon = 1e-4);
    assert_relative_eq!(max_coord(&built, plate.studio_id, plate.pad, 2), 4.0, epsilon = 1e-4);

    let sketch = built
        .studio(plate.studio_id)
        .unwrap()
        .result(plate.sketch_op)
        .unwrap()
        .sketch()
        .unwrap()
        .clone();
    assert_eq!(sketch.solve_status(), Some(SolveStatus::Ok));
    assert_eq!(sketch.dof(), Some(0));

    let edited = built
        .update_param(plate.width, ParamPatch::expression("thickness * 8"))
        .unwrap();
    let studio = edited.studio(plate.studio_id).unwrap();
    assert_eq!(studio.op_state(plate.pad), Some(OpState::Stale));

    let (rebuilt, _) = edited.rebuild_all(&mut ctx);
    assert_relative_eq!(max_coord(&rebuilt, plate.studio_id, plate.pad, 0), 32.0, epsilon = 1e-4);
}

#[test]
fn test_face_reference_survives_downstream_edits_and_resize() {
    let plate = plate();
    let (poly, mut ctx) = poly_context();
    let (built, _) = plate.doc.rebuild_all(&mut ctx);

    let studio = built.studio(plate.studio_id).unwrap();
    let faces = &studio.result(plate.pad).unwrap().topo_map().unwrap().faces;
    let top = faces
        .iter()
        .find(|f| f.signature.and_then(|s| s.normal).is_some_and(|n| n.z > 0.99))
        .cloned()
        .unwrap();
    let (studio, boss) = studio
        .add_op(Op::new(
            "Boss",
            OpKind::Extrude {
                profile: Profile::Face(top.clone()),
                depth: 3.0.into(),
                direction: ExtrudeDirection::Normal,
                merge: None,
            },
        ))
        .unwrap();
    let (studio, _) = studio.add_op(Op::make_box("Spacer", 1.0, 1.0, 1.0)).unwrap();
    let doc = built.update_studio(studio).unwrap();

    let (rebuilt, reports) = doc.rebuild_all(&mut ctx);
    assert!(reports.iter().all(|(_, r)| r.is_clean()));
    let studio = rebuilt.studio(plate.studio_id).unwrap();
    let resolved = resolve_topo_ref(&top, studio.results(), poly.as_ref()).unwrap();
    assert_eq!(resolved.method, ResolveMethod::ByIndex);
    let signature = top.signature.unwrap();
    assert_eq!(Some(poly.face_center(resolved.handle).unwrap()), signature.center);
    assert_eq!(Some(poly.face_normal(resolved.handle).unwrap()), signature.normal);
    assert_relative_eq!(max_coord(&rebuilt, plate.studio_id, boss, 2), 7.0, epsilon = 1e-4);

    // A wider plate moves the top face; the reference stays on it
    let wider = rebuilt
        .update_param(plate.width, ParamPatch::expression("35"))
        .unwrap();
    let (wider, reports) = wider.rebuild_all(&mut ctx);
    assert!(reports.iter().all(|(_, r)| r.is_clean()));
    let studio = wider.studio(plate.studio_id).unwrap();
    let resolved = resolve_topo_ref(&top, studio.results(), poly.as_ref()).unwrap();
    assert_eq!(resolved.method, ResolveMethod::ByIndex);
    assert!(poly.face_normal(resolved.handle).unwrap().z > 0.99);
    assert_eq!(studio.op_state(boss), Some(OpState::Evaluated));
    assert_relative_eq!(max_coord(&wider, plate.studio_id, boss, 0), 35.0, epsilon = 1e-4);
    assert_relative_eq!(max_coord(&wider, plate.studio_id, boss, 2), 7.0, epsilon = 1e-4);
}

#[test]
fn test_rebuild_from_any_index_matches_full_rebuild() {
    let plate = plate();
    let studio = plate.doc.studio(plate.studio_id).unwrap();
    let (studio, fillet) = studio
        .add_op(Op::fillet_all("Round", plate.pad, 0.5))
        .unwrap();
    let (studio, moved) = studio
        .add_op(Op::translate("Offset", fillet, DVec3::new(0.0, 0.0, 2.0)))
        .unwrap();
    let (studio, _) = studio.add_op(Op::make_box("Stop", 2.0, 2.0, 2.0)).unwrap();
    let (studio, _) = studio
        .add_op(Op::boolean("Cut", moved, plate.pad, BooleanType::Subtract))
        .unwrap();

    let env = plate.doc.params().clone();
    let (_poly, mut ctx) = poly_context();
    let (full, _) = studio.rebuild(&env, &mut ctx);
    for start in 0..=full.len() {
        let (partial, _) = full.rebuild_from(start, &env, &mut ctx);
        for id in full.op_order() {
            assert_eq!(full.op_state(*id), partial.op_state(*id));
            let (a, b) = (full.result(*id).unwrap(), partial.result(*id).unwrap());
            assert!(a.same_geometry(b), "op {id} differs after rebuild_from({start})");
        }
    }
}

#[test]
fn test_undo_restores_previous_document() {
    let plate = plate();
    let mut history = History::new(plate.doc.clone(), &FormaConfig::default().history);

    let studio = history.present().studio(plate.studio_id).unwrap().clone();
    let (studio, _) = studio.add_op(Op::fillet_all("Round", plate.pad, 1.0)).unwrap();
    let next = history.present().update_studio(studio).unwrap();
    history.push(next);
    assert_eq!(history.present().studio(plate.studio_id).unwrap().len(), 3);

    let removed = history
        .present()
        .studio(plate.studio_id)
        .unwrap()
        .remove_op(plate.sketch_op)
        .unwrap();
    let next = history.present().update_studio(removed).unwrap();
    history.push(next);
    assert!(history.present().studio(plate.studio_id).unwrap().is_empty());

    assert!(history.undo());
    assert_eq!(history.present().studio(plate.studio_id).unwrap().len(), 3);
    assert!(history.undo());
    assert_eq!(history.present().studio(plate.studio_id).unwrap().len(), 2);
    assert!(!history.undo());
    assert!(history.redo());
    assert_eq!(history.present().studio(plate.studio_id).unwrap().len(), 3);
}
