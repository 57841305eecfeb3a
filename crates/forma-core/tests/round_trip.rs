//! Document serialization round trips

use forma_cad::kernel::{Axis3D, BooleanType};
use forma_cad::op::{EdgeSelection, ExtrudeDirection, Profile};
use forma_cad::sketch::ConstraintKind;
use forma_cad::topo::{TopoKind, TopoRef};
use forma_cad::{Dimension, KernelContext, Op, OpKind, ParamPatch, SketchConstraint};
use forma_core::{Document, MateKind};
use glam::{DMat4, DVec2, DVec3};
use uuid::Uuid;

/// Document touching every serialized type
fn sample_document() -> Document {
    let doc = Document::new("Bracket");
    let (doc, width) = doc.add_param("width", 20.0).unwrap();
    let (doc, _) = doc.add_param("height", 5.0).unwrap();
    let doc = doc
        .update_param(width, ParamPatch::expression("height * 4"))
        .unwrap();
    let (doc, studio_id) = doc.add_studio("Main");

    let studio = doc.studio(studio_id).unwrap();
    let top = studio.plane_by_name("Top").unwrap().id;
    let (studio, sketch_id, _) = studio.add_sketch(top, "Base").unwrap();

    let sketch = studio.sketch(sketch_id).unwrap().as_ref().clone();
    let (sketch, a) = sketch.add_point(DVec2::ZERO);
    let (sketch, b) = sketch.add_point(DVec2::new(20.0, 0.0));
    let (sketch, c) = sketch.add_point(DVec2::new(20.0, 10.0));
    let (sketch, d) = sketch.add_point(DVec2::new(0.0, 10.0));
    let (sketch, hole) = sketch.add_point(DVec2::new(5.0, 5.0));
    let (sketch, arc_start) = sketch.add_point(DVec2::new(7.0, 5.0));
    let (sketch, arc_end) = sketch.add_point(DVec2::new(5.0, 7.0));
    let (sketch, ab) = sketch.add_line(a, b).unwrap();
    let (sketch, bc) = sketch.add_line(b, c).unwrap();
    let (sketch, cd) = sketch.add_line(c, d).unwrap();
    let (sketch, da) = sketch.add_line(d, a).unwrap();
    let (sketch, circle) = sketch.add_circle(hole, 2.0).unwrap();
    let (sketch, arc) = sketch.add_arc(hole, arc_start, arc_end).unwrap();
    let sketch = sketch.set_construction(arc, true).unwrap();

    let constraints = [
        SketchConstraint::fixed(a),
        SketchConstraint::horizontal(ab),
        SketchConstraint::vertical(bc),
        SketchConstraint::horizontal(cd),
        SketchConstraint::vertical(da),
        SketchConstraint::length(ab, Dimension::expr("width")),
        SketchConstraint::length(bc, 10.0),
        SketchConstraint::radius(circle, Dimension::expr("height / 2.5")),
        SketchConstraint::new(ConstraintKind::Symmetric, vec![a, b, cd], None).unwrap(),
    ];
    let sketch = constraints
        .into_iter()
        .fold(sketch, |s, c| s.add_constraint(c).unwrap().0);
    let studio = studio.with_sketch(sketch).unwrap();

    let (studio, body) = studio
        .add_op(Op::extrude("Pad", sketch_id, Dimension::expr("height")))
        .unwrap();
    let top_face = TopoRef::by_index(body, TopoKind::Face, 1);
    let (studio, boss) = studio
        .add_op(Op::new(
            "Boss",
            OpKind::Extrude {
                profile: Profile::Face(top_face),
                depth: 2.0.into(),
                direction: ExtrudeDirection::Symmetric,
                merge: None,
            },
        ))
        .unwrap();
    let (studio, shaft) = studio.add_op(Op::cylinder("Shaft", 1.0, 8.0)).unwrap();
    let (studio, joined) = studio
        .add_op(Op::boolean("Join", body, shaft, BooleanType::Union))
        .unwrap();
    let (studio, _) = studio
        .add_op(Op::new(
            "Edge break",
            OpKind::Chamfer {
                target: joined,
                edges: EdgeSelection::Refs(vec![TopoRef::by_index(joined, TopoKind::Edge, 0)]),
                distance: 0.5.into(),
            },
        ))
        .unwrap();
    let (studio, _) = studio
        .add_op(Op::new(
            "Spin",
            OpKind::Transform {
                target: boss,
                translation: DVec3::new(0.0, 0.0, 1.0),
                rotation_axis: DVec3::Z,
                rotation_angle: 90.0.into(),
            },
        ))
        .unwrap();
    let (studio, _) = studio
        .add_op(Op::new(
            "Ring",
            OpKind::Revolve {
                profile: Profile::Sketch { sketch_id },
                axis: Axis3D::new(DVec3::new(-5.0, 0.0, 0.0), DVec3::Y),
                angle: 180.0.into(),
                merge: None,
            },
        ))
        .unwrap();
    let doc = doc.update_studio(studio).unwrap();

    let (doc, part) = doc.add_part("Bracket body", studio_id, joined).unwrap();
    let (doc, asm) = doc.add_assembly("Fixture");
    let (doc, left) = doc.add_instance(asm, part, "Left", DMat4::IDENTITY).unwrap();
    let (doc, right) = doc
        .add_instance(asm, part, "Right", DMat4::from_translation(DVec3::X * 40.0))
        .unwrap();
    let assembly = doc.assembly(asm).unwrap();
    let (assembly, _) = assembly.add_constraint(left, right, MateKind::Fastened).unwrap();
    let assembly = assembly.toggle_instance_fixed(left).unwrap();
    doc.update_assembly(assembly).unwrap()
}

fn assert_same_document(a: &Document, b: &Document) {
    assert_eq!(a.id, b.id);
    assert_eq!(a.name, b.name);
    assert_eq!(
        a.params().iter().collect::<Vec<_>>(),
        b.params().iter().collect::<Vec<_>>()
    );
    assert_eq!(a.parts().collect::<Vec<_>>(), b.parts().collect::<Vec<_>>());
    assert_eq!(
        a.assemblies().collect::<Vec<_>>(),
        b.assemblies().collect::<Vec<_>>()
    );

    for studio in a.studios() {
        let loaded = b.studio(studio.id).unwrap();
        assert_eq!(studio.name, loaded.name);
        assert_eq!(studio.op_order(), loaded.op_order());
        assert_eq!(studio.ops().collect::<Vec<_>>(), loaded.ops().collect::<Vec<_>>());
        assert_eq!(
            studio.planes().collect::<Vec<_>>(),
            loaded.planes().collect::<Vec<_>>()
        );
        for sketch in studio.sketches() {
            assert_eq!(Some(sketch), loaded.sketch(sketch.id));
        }
        for id in studio.op_order() {
            assert_eq!(studio.node(*id).unwrap().deps, loaded.node(*id).unwrap().deps);
        }
    }
    assert_eq!(a.studios().count(), b.studios().count());
}

#[test]
fn test_ron_round_trip() {
    let doc = sample_document();
    let text = doc.to_ron().unwrap();
    let loaded = Document::from_ron(&text).unwrap();
    assert_same_document(&doc, &loaded);
    assert_eq!(loaded.params().value_of("width"), Some(20.0));
}

#[test]
fn test_json_round_trip() {
    let doc = sample_document();
    let text = doc.to_json().unwrap();
    let loaded = Document::from_json(&text).unwrap();
    assert_same_document(&doc, &loaded);
}

#[test]
fn test_save_and_load_files() {
    let doc = sample_document();
    let dir = tempfile::tempdir().unwrap();

    for name in ["bracket.forma.ron", "bracket.json"] {
        let path = dir.path().join(name);
        doc.save(&path).unwrap();
        let loaded = Document::load(&path).unwrap();
        assert_same_document(&doc, &loaded);
    }

    let json = std::fs::read_to_string(dir.path().join("bracket.json")).unwrap();
    assert!(json.trim_start().starts_with('{'));

    let bytes = doc.to_bytes().unwrap();
    assert_same_document(&doc, &Document::load_from_bytes(&bytes).unwrap());
}

#[test]
fn test_results_are_rederived_after_load() {
    let doc = sample_document();
    let mut ctx = KernelContext::reference(&Default::default());
    let (built, _) = doc.rebuild_all(&mut ctx);

    let loaded = Document::from_ron(&built.to_ron().unwrap()).unwrap();
    for studio in loaded.studios() {
        assert!(studio.results().is_empty());
    }

    let mut fresh = KernelContext::reference(&Default::default());
    let (rebuilt, _) = loaded.rebuild_all(&mut fresh);
    for studio in built.studios() {
        let other = rebuilt.studio(studio.id).unwrap();
        for id in studio.op_order() {
            assert_eq!(studio.op_state(*id), other.op_state(*id));
            if let (Some(a), Some(b)) = (studio.result(*id), other.result(*id)) {
                assert!(a.same_geometry(b), "op {id} differs after reload");
            }
        }
    }
}

#[test]
fn test_unknown_part_in_assembly_is_rejected() {
    let doc = sample_document();
    let text = doc.to_ron().unwrap();
    let part = doc.parts().next().unwrap().id;
    let reference = format!("part_id: \"{part}\"");
    assert!(text.contains(&reference));
    let broken = text.replace(&reference, &format!("part_id: \"{}\"", Uuid::new_v4()));
    assert!(Document::from_ron(&broken).is_err());
}

#[test]
fn test_sketch_constraint_without_dimension_is_rejected() {
    let doc = sample_document();
    let mut value: serde_json::Value = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
    let constraints = value["part_studios"][0]["sketches"][0]["constraints"]
        .as_array_mut()
        .unwrap();
    let radius = constraints.iter_mut().find(|c| c["kind"] == "Radius").unwrap();
    radius.as_object_mut().unwrap().remove("dim");

    assert!(Document::from_json(&value.to_string()).is_err());
}
