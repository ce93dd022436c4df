use shapedelta::program::Program;
use shapedelta::{
    ConsumerCache, DisplayPipeline, DisplaySession, EvaluateError, HashCache, MergeOptions, MeshEntry, PipelineConfig,
    ReferenceKernel, StepConfig, StepError,
};
use shapedelta_core::{vec3, Expr, Finish, GeometryGraph, Parameter, StepRotation};
use std::path::PathBuf;
use uuid::Uuid;

const STEP_FILE: &str = "ISO-10303-21;
HEADER;
FILE_NAME('bracket.step','',(''),(''),'','','');
ENDSEC;
DATA;
#10 = CARTESIAN_POINT('', (0., 0., 0.));
#11 = CARTESIAN_POINT('', (20., 10., 4.));
#12 = CARTESIAN_POINT('', (5., 5., 2.));
ENDSEC;
END-ISO-10303-21;
";

fn config_without_library() -> PipelineConfig {
    PipelineConfig {
        step: StepConfig {
            root: None,
            candidate_roots: Vec::new(),
            env_var: format!("SHAPEDELTA_TEST_{}", Uuid::new_v4().simple()),
        },
        ..PipelineConfig::default()
    }
}

fn pipeline() -> DisplayPipeline<ReferenceKernel> {
    DisplayPipeline::from_config(&config_without_library())
}

fn step_dir(files: &[&str]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shapedelta-it-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    for file in files {
        std::fs::write(dir.join(file), STEP_FILE).unwrap();
    }
    dir
}

#[test]
fn test_single_box() {
    let mut graph = GeometryGraph::new();
    let id = graph.add_box("block", vec3(0, 0, 0), vec3(100, 200, 200));

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();

    let info = &response.display_info[&id];
    assert!(info.error.is_none());
    assert_eq!(info.hash.as_ref().map(String::len), Some(64));

    let mesh = response.meshes[&id].payload().unwrap();
    assert_eq!(mesh.triangle_count(), 12);

    let summary = response.summary[0].as_ref().unwrap();
    assert_eq!(summary.id, id);
    assert!((summary.volume - 4_000_000.0).abs() < 1e-6);
    assert!((summary.area - 2.0 * (20_000.0 + 20_000.0 + 40_000.0)).abs() < 1e-6);
}

#[test]
fn test_degenerate_box_is_reported() {
    let mut graph = GeometryGraph::new();
    let flat = graph.add_box("flat", vec3(0, 0, 0), vec3(10, 10, 0));

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();
    assert_eq!(response.display_info[&flat].error.as_deref(), Some("cannot build box"));
    assert!(response.display_info[&flat].hash.is_none());
    assert!(!response.meshes.contains_key(&flat));
    assert!(response.logs.iter().any(|line| line.contains("has failed")));
}

#[test]
fn test_unchanged_items_are_reused() {
    let mut graph = GeometryGraph::new();
    let block = graph.add_box("block", vec3(0, 0, 0), vec3(20, 20, 20));
    let pin = graph.add_cylinder("pin", vec3(10, 10, -5), vec3(10, 10, 25), 4);
    let drilled = graph.add_cut("drilled", &block, &pin);

    let mut session = DisplaySession::new(pipeline());
    let first = session.evaluate(&graph).unwrap();
    for id in [&block, &pin, &drilled] {
        assert!(first.meshes[id].payload().is_some(), "{} should carry a mesh", id);
    }
    let volume = first.summary[2].as_ref().unwrap().volume;
    let expected = 8000.0 - std::f64::consts::PI * 16.0 * 20.0;
    assert!((volume - expected).abs() / expected < 0.1);

    let second = session.evaluate(&graph).unwrap();
    for id in [&block, &pin, &drilled] {
        assert_eq!(second.meshes[id], MeshEntry::Reuse);
        assert_eq!(second.display_info[id], first.display_info[id]);
    }

    graph.item_mut(&pin).unwrap().kind = shapedelta_core::ItemKind::Cylinder {
        point1: vec3(10, 10, -5),
        point2: vec3(10, 10, 25),
        radius: Expr::from(5),
    };
    let third = session.evaluate(&graph).unwrap();
    assert_eq!(third.meshes[&block], MeshEntry::Reuse);
    assert!(third.meshes[&pin].payload().is_some());
    assert!(third.meshes[&drilled].payload().is_some());
}

#[test]
fn test_parameter_change_rebuilds_dependents() {
    let mut graph = GeometryGraph::new();
    graph.add_parameter(Parameter::new("len", 10.0));
    graph.add_parameter(Parameter::new("length", "$len * 2"));
    let short = graph.add_box("short", vec3(0, 0, 0), vec3("$len", 1, 1));
    let long = graph.add_box("long", vec3(0, 0, 0), vec3("$length", 1, 1));
    let fixed = graph.add_sphere("ball", vec3(0, 0, 0), 3);

    let mut session = DisplaySession::new(pipeline());
    let first = session.evaluate(&graph).unwrap();
    assert!((first.summary[0].as_ref().unwrap().volume - 10.0).abs() < 1e-9);
    assert!((first.summary[1].as_ref().unwrap().volume - 20.0).abs() < 1e-9);

    assert!(graph.set_parameter("len", 4.0));
    let second = session.evaluate(&graph).unwrap();
    assert!(second.meshes[&short].payload().is_some());
    assert!(second.meshes[&long].payload().is_some());
    assert_eq!(second.meshes[&fixed], MeshEntry::Reuse);
    assert!((second.summary[1].as_ref().unwrap().volume - 8.0).abs() < 1e-9);
}

#[test]
fn test_item_local_parameter() {
    let mut graph = GeometryGraph::new();
    graph.add_parameter(Parameter::new("size", 2.0));
    let id = graph.add_box("block", vec3(0, 0, 0), vec3("$size", "$size", "$size"));
    graph.item_mut(&id).unwrap().parameters.push(Parameter::new("size", 3.0));

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();
    assert!((response.summary[0].as_ref().unwrap().volume - 27.0).abs() < 1e-9);
}

#[test]
fn test_errors_stay_with_their_item() {
    let mut graph = GeometryGraph::new();
    let good = graph.add_box("good", vec3(0, 0, 0), vec3(1, 1, 1));
    let bad = graph.add_box("bad", vec3(0, 0, 0), vec3("$missing", 1, 1));
    let derived = graph.add_fuse("derived", &good, &bad);
    let after = graph.add_sphere("after", vec3(0, 0, 0), 1);

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();

    assert!(response.display_info[&good].is_ok());
    assert!(response.display_info[&after].is_ok());
    assert_eq!(
        response.display_info[&bad].error.as_deref(),
        Some("unknown parameter $missing")
    );
    assert!(response.display_info[&derived].error.is_some());
    assert_eq!(response.errors().count(), 2);
    assert_eq!(response.hash_cache().len(), 2);
}

#[test]
fn test_hidden_items_build_but_do_not_display() {
    let mut graph = GeometryGraph::new();
    let tool = graph.add_sphere("tool", vec3(0, 0, 0), 2);
    let block = graph.add_box("block", vec3(-5, -5, -5), vec3(5, 5, 5));
    let result = graph.add_cut("result", &block, &tool);
    graph.item_mut(&tool).unwrap().visible = false;

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();
    assert!(!response.display_info.contains_key(&tool));
    assert!(response.display_info[&result].is_ok());
    assert!(response.meshes.contains_key(&block));
}

#[test]
fn test_generation_and_results_are_deterministic() {
    let mut graph = GeometryGraph::new();
    let a = graph.add_box("a", vec3(0, 0, 0), vec3(3, 4, 5));
    let b = graph.add_sphere("b", vec3(1, 1, 1), 2);
    graph.add_common("both", &a, &b);

    let one = pipeline();
    let two = pipeline();
    assert_eq!(one.generate(&graph).text(), two.generate(&graph).text());

    let first = serde_json::to_string(&one.evaluate(&graph, &HashCache::new()).unwrap()).unwrap();
    let second = serde_json::to_string(&two.evaluate(&graph, &HashCache::new()).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_round_trip_through_consumer_cache() {
    let mut graph = GeometryGraph::new();
    let keep = graph.add_box("keep", vec3(0, 0, 0), vec3(1, 1, 1));
    let drop = graph.add_box("drop", vec3(2, 0, 0), vec3(3, 1, 1));

    let mut session = DisplaySession::new(pipeline());
    let options = MergeOptions::with_max_age(1);

    let delta = session.evaluate(&graph).unwrap();
    let wire = serde_json::to_string(&delta).unwrap();
    let delta: shapedelta::ResponseDelta = serde_json::from_str(&wire).unwrap();
    let (cache, stats) = ConsumerCache::new().merge_delta(&delta, options);
    assert_eq!(stats.stored, 2);
    assert_eq!(cache.generation_counter, 2);

    graph.remove_item(&drop);
    let delta = session.evaluate(&graph).unwrap();
    assert_eq!(delta.meshes[&keep], MeshEntry::Reuse);

    let (cache, stats) = cache.merge_delta(&delta, options);
    assert_eq!(stats.carried_forward, 1);
    assert_eq!(stats.evicted, 1);
    assert_eq!(cache.generation(&keep), Some(3));
    assert!(cache.mesh(&keep).is_some());
    assert!(cache.mesh(&drop).is_none());
}

#[test]
fn test_fillet_finish_rounds_the_shape() {
    let mut graph = GeometryGraph::new();
    let plain = graph.add_box("plain", vec3(0, 0, 0), vec3(10, 10, 10));
    let rounded = graph.add_box("rounded", vec3(20, 0, 0), vec3(30, 10, 10));
    graph.item_mut(&rounded).unwrap().finish = Some(Finish::Fillet { factor: Expr::from(10) });

    let program = pipeline().generate(&graph);
    assert!(program.text().contains("displayFillet("));

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();
    let plain_volume = response.summary[0].as_ref().unwrap().volume;
    let rounded_volume = response.summary[1].as_ref().unwrap().volume;
    assert!((plain_volume - 1000.0).abs() < 1e-9);
    assert!(rounded_volume < 1000.0 && rounded_volume > 950.0);
    assert!(response.display_info[&plain].is_ok());
    assert!(response.display_info[&rounded].is_ok());
}

#[test]
fn test_program_level_failures() {
    let pipeline = pipeline();
    let previous = HashCache::new();

    let misuse = Program::from_text("display(csg.makeBox([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]), 5);");
    assert!(matches!(
        pipeline.evaluate_program(&misuse, &previous),
        Err(EvaluateError::ContractViolation(_))
    ));

    let hidden = Program::from_text("try { display(42, \"x\"); } catch (err) { reportError(err, \"x\"); }");
    assert!(matches!(
        pipeline.evaluate_program(&hidden, &previous),
        Err(EvaluateError::ContractViolation(_))
    ));

    let broken = Program::from_text("let x = ;");
    assert!(matches!(
        pipeline.evaluate_program(&broken, &previous),
        Err(EvaluateError::Compile(_))
    ));

    let thrown = Program::from_text("throw \"boom\";");
    assert!(matches!(
        pipeline.evaluate_program(&thrown, &previous),
        Err(EvaluateError::Script(_))
    ));
}

#[test]
fn test_step_bodies_are_imported_and_placed() {
    let dir = step_dir(&["bracket-1.STEP"]);
    let config = PipelineConfig {
        step: StepConfig::with_root(&dir),
        ..PipelineConfig::default()
    };
    let pipeline = DisplayPipeline::new(ReferenceKernel::new(), &config);

    let mut graph = GeometryGraph::new();
    let placed = graph.add_step(
        "bracket",
        "bracket-1",
        Some(StepRotation {
            center: [0.0, 0.0, 0.0],
            axis: [0.0, 0.0, 1.0],
            angle: 90.0,
        }),
        Some([100.0, 0.0, 0.0]),
    );
    let plain = graph.add_box("plain", vec3(0, 0, 0), vec3(1, 1, 1));

    let response = pipeline.evaluate(&graph, &HashCache::new()).unwrap();

    let mesh = response.meshes[&placed].payload().unwrap();
    assert!(mesh.color.is_some());
    assert!(mesh.vertices.iter().all(|v| v[0] > 89.0 && v[0] < 100.001));
    assert!(response.display_info[&placed].is_ok());
    assert!(response.meshes[&plain].payload().unwrap().color.is_none());

    let summary = response.summary[0].as_ref().unwrap();
    assert!((summary.volume - 800.0).abs() < 1e-6);

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_step_failures() {
    let dir = step_dir(&[]);
    let config = PipelineConfig {
        step: StepConfig::with_root(&dir),
        ..PipelineConfig::default()
    };
    let mut graph = GeometryGraph::new();
    graph.add_step("missing", "not-there", None, None);

    let err = DisplayPipeline::new(ReferenceKernel::new(), &config)
        .evaluate(&graph, &HashCache::new())
        .unwrap_err();
    assert!(matches!(err, EvaluateError::Step(StepError::FileNotFound { .. })));

    let err = pipeline().evaluate(&graph, &HashCache::new()).unwrap_err();
    assert!(matches!(err, EvaluateError::Step(StepError::NoLibrary { .. })));

    std::fs::remove_dir_all(dir).ok();
}

const CUBE_STEP_FILE: &str = "ISO-10303-21;
HEADER;
ENDSEC;
DATA;
#1 = CARTESIAN_POINT('', (0., 0., 0.));
#2 = CARTESIAN_POINT('', (10., 10., 10.));
ENDSEC;
END-ISO-10303-21;
";

fn step_pipeline(dir: &PathBuf) -> DisplayPipeline<ReferenceKernel> {
    let config = PipelineConfig {
        step: StepConfig::with_root(dir),
        ..PipelineConfig::default()
    };
    DisplayPipeline::new(ReferenceKernel::new(), &config)
}

#[test]
fn test_fillet_finish_on_step_body() {
    let dir = step_dir(&[]);
    std::fs::write(dir.join("cube.step"), CUBE_STEP_FILE).unwrap();

    let mut graph = GeometryGraph::new();
    let plain = graph.add_step("plain", "cube", None, None);
    let rounded = graph.add_step("rounded", "cube", None, Some([20.0, 0.0, 0.0]));
    graph.item_mut(&rounded).unwrap().finish = Some(Finish::Fillet { factor: Expr::from(10) });

    let response = step_pipeline(&dir).evaluate(&graph, &HashCache::new()).unwrap();

    assert!(response.display_info[&plain].is_ok());
    assert!(response.display_info[&rounded].is_ok());
    let plain_volume = response.summary[0].as_ref().unwrap().volume;
    let rounded_volume = response.summary[1].as_ref().unwrap().volume;
    assert!((plain_volume - 1000.0).abs() < 1e-6);
    assert!(rounded_volume < 1000.0 && rounded_volume > 950.0);
    assert!(response.meshes[&rounded].payload().unwrap().vertices.iter().all(|v| v[0] >= 20.0));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_step_body_inside_boolean() {
    let dir = step_dir(&["bracket-1.step"]);

    let mut graph = GeometryGraph::new();
    let body = graph.add_step("bracket", "bracket-1", None, None);
    let hole = graph.add_cylinder("hole", vec3(5, 5, -1), vec3(5, 5, 5), 2);
    let drilled = graph.add_cut("drilled", &body, &hole);
    let moved = graph.add_translate("moved", &drilled, vec3(0, 50, 0));
    graph.item_mut(&hole).unwrap().visible = false;

    let response = step_pipeline(&dir).evaluate(&graph, &HashCache::new()).unwrap();

    for id in [&body, &drilled, &moved] {
        assert!(response.display_info[id].is_ok(), "{} failed", id);
        assert!(response.meshes[id].payload().unwrap().color.is_some());
    }
    assert_ne!(response.display_info[&body].hash, response.display_info[&drilled].hash);
    assert_ne!(response.display_info[&drilled].hash, response.display_info[&moved].hash);

    let volume = |id: &str| {
        response
            .summary
            .iter()
            .flatten()
            .find(|summary| summary.id == id)
            .map(|summary| summary.volume)
            .unwrap()
    };
    assert!((volume(&body) - 800.0).abs() < 1e-6);
    assert!(volume(&moved) < volume(&body));
    assert!(response
        .meshes[&moved]
        .payload()
        .unwrap()
        .vertices
        .iter()
        .all(|v| v[1] >= 49.0));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_bad_step_placement_stays_with_its_item() {
    let dir = step_dir(&["bracket-1.step"]);

    let mut graph = GeometryGraph::new();
    let block = graph.add_box("block", vec3(0, 0, 0), vec3(1, 1, 1));
    let good = graph.add_step("good", "bracket-1", None, Some([0.0, 30.0, 0.0]));
    let bad = graph.add_step(
        "bad",
        "bracket-1",
        Some(StepRotation {
            center: [0.0, 0.0, 0.0],
            axis: [0.0, 0.0, 0.0],
            angle: 45.0,
        }),
        None,
    );

    let response = step_pipeline(&dir).evaluate(&graph, &HashCache::new()).unwrap();

    assert!(response.display_info[&block].is_ok());
    assert!(response.display_info[&good].is_ok());
    assert!(response.meshes[&good].payload().is_some());
    assert!(response.display_info[&bad].error.is_some());
    assert!(!response.meshes.contains_key(&bad));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_unreadable_step_file_stays_with_its_item() {
    let dir = step_dir(&["bracket-1.step"]);
    std::fs::write(dir.join("broken.step"), "not a step file").unwrap();

    let mut graph = GeometryGraph::new();
    let good = graph.add_step("good", "bracket-1", None, None);
    let broken = graph.add_step("broken", "broken", None, None);

    let response = step_pipeline(&dir).evaluate(&graph, &HashCache::new()).unwrap();
    assert!(response.display_info[&good].is_ok());
    let error = response.display_info[&broken].error.as_deref().unwrap();
    assert!(error.contains("broken"));

    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_only_math_functions_reach_the_program() {
    let mut graph = GeometryGraph::new();
    graph.add_parameter(Parameter::new("w", "nosuch(1)"));
    graph.add_parameter(Parameter::new("bad_arity", "sqrt(1, 2)"));
    graph.add_parameter(Parameter::new("root", "sqrt(16)"));
    let sized = graph.add_box("sized", vec3(0, 0, 0), vec3("$root", 1, 1));
    let uses_w = graph.add_box("uses_w", vec3(0, 0, 0), vec3("$w", 1, 1));
    let uses_arity = graph.add_box("uses_arity", vec3(0, 0, 0), vec3("$bad_arity", 1, 1));
    let sneaky = graph.add_box("sneaky", vec3(0, 0, 0), vec3("display(1, 2)", 1, 1));
    let plain = graph.add_sphere("plain", vec3(0, 0, 0), 1);

    let response = pipeline().evaluate(&graph, &HashCache::new()).unwrap();

    assert!(response.display_info[&sized].is_ok());
    assert!((response.summary[0].as_ref().unwrap().volume - 4.0).abs() < 1e-9);
    assert!(response.display_info[&plain].is_ok());
    assert_eq!(
        response.display_info[&uses_w].error.as_deref(),
        Some("unknown parameter $w")
    );
    assert!(response.display_info[&uses_arity].error.is_some());
    let error = response.display_info[&sneaky].error.as_deref().unwrap();
    assert!(error.contains("unknown function"));
}
