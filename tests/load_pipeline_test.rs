use dither_ngin::{
    assigner::{AssignMode, KeywordSet, apply_palette},
    data_structures::material::Palette,
    resources::{AssetLoader, DisplayTransform, Progress, center_model, scale_to_fit},
};

mod common;

use common::test_utils::write_named_triangles;

#[tokio::test]
async fn loaded_parts_are_placed_and_coloured_by_name() {
    let dir = write_named_triangles("pipeline", &["body", "visor", "strap"]);
    let loader = AssetLoader::new(&dir);

    let mut reports: Vec<Progress> = Vec::new();
    let mut model = loader
        .load("parts.gltf", |p| reports.push(p))
        .await
        .unwrap();
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|w| w[0].loaded <= w[1].loaded));
    assert_eq!(model.mesh_count(), 3);
    assert_eq!(model.name.as_deref(), Some("parts"));

    center_model(&mut model, &DisplayTransform::default()).unwrap();
    let factor = scale_to_fit(&mut model, 2.0).unwrap();
    assert!(factor > 0.0);
    let bounds = model.bounds().unwrap();
    assert!((bounds.max_extent() - 2.0).abs() < 1e-4);
    for c in [bounds.center().x, bounds.center().y, bounds.center().z] {
        assert!(c.abs() < 1e-4, "box centre off the origin: {:?}", bounds.center());
    }

    let palette = Palette::dithering_optimized();
    let report = apply_palette(
        &mut model,
        &palette,
        &AssignMode::NameMatch(KeywordSet::new(["visor"])),
    );
    assert_eq!(report.special, 1);
    assert_eq!(report.assigned, 2);
    assert!(!report.fallback);

    let mut seen = Vec::new();
    model.for_each_mesh(&mut |name, mesh| {
        seen.push((name.map(str::to_string), mesh.material().descriptor.clone()))
    });
    assert_eq!(seen[0], (Some("body".to_string()), palette.entries[0].clone()));
    assert_eq!(seen[1], (Some("visor".to_string()), palette.special.clone()));
    assert_eq!(seen[2], (Some("strap".to_string()), palette.entries[1].clone()));

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn model_without_matching_names_falls_back_to_first_part() {
    let dir = write_named_triangles("fallback", &["left", "right"]);
    let loader = AssetLoader::new(&dir);
    let mut model = loader.load("parts.gltf", |_| {}).await.unwrap();

    let palette = Palette::high_contrast();
    let report = apply_palette(
        &mut model,
        &palette,
        &AssignMode::NameMatch(KeywordSet::new(["glass"])),
    );
    assert!(report.fallback);
    assert_eq!(report.special, 1);
    assert_eq!(report.assigned, 1);

    let mut first = None;
    model.for_each_mesh(&mut |_, mesh| {
        first.get_or_insert_with(|| mesh.material().descriptor.clone());
    });
    assert_eq!(first, Some(palette.special.clone()));

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn missing_sibling_buffer_fails_the_load() {
    let dir = write_named_triangles("nobin", &["only"]);
    std::fs::remove_file(dir.join("parts.bin")).unwrap();
    let loader = AssetLoader::new(&dir);
    assert!(loader.load("parts.gltf", |_| {}).await.is_err());
    std::fs::remove_dir_all(dir).ok();
}

fn gltf_in(dir: &std::path::Path) -> String {
    dir.join("parts.gltf").to_string_lossy().into_owned()
}

#[tokio::test]
async fn batch_comes_back_in_request_order() {
    let one = write_named_triangles("batch-one", &["single"]);
    let three = write_named_triangles("batch-three", &["a", "b", "c"]);
    let (one_path, three_path) = (gltf_in(&one), gltf_in(&three));
    let loader = AssetLoader::default();

    let nodes = loader
        .load_multiple(&[one_path.as_str(), three_path.as_str()])
        .await
        .unwrap();
    let counts: Vec<usize> = nodes.iter().map(|n| n.mesh_count()).collect();
    assert_eq!(counts, [1, 3]);

    let nodes = loader
        .load_multiple(&[three_path.as_str(), one_path.as_str()])
        .await
        .unwrap();
    let counts: Vec<usize> = nodes.iter().map(|n| n.mesh_count()).collect();
    assert_eq!(counts, [3, 1]);

    std::fs::remove_dir_all(one).ok();
    std::fs::remove_dir_all(three).ok();
}

#[tokio::test]
async fn one_missing_file_fails_the_whole_batch() {
    let good = write_named_triangles("batch-good", &["body"]);
    let good_path = gltf_in(&good);
    let missing = good.join("nowhere.gltf").to_string_lossy().into_owned();
    let loader = AssetLoader::default();

    let batch = loader
        .load_multiple(&[good_path.as_str(), missing.as_str()])
        .await;
    assert!(batch.is_err());

    std::fs::remove_dir_all(good).ok();
}

#[tokio::test]
async fn several_files_form_one_model() {
    let front = write_named_triangles("parts-front", &["body", "visor"]);
    let back = write_named_triangles("parts-back", &["strap"]);
    let loader = AssetLoader::default();

    let model = loader
        .load_parts(&[gltf_in(&front).as_str(), gltf_in(&back).as_str()])
        .await
        .unwrap();
    assert_eq!(model.name.as_deref(), Some("model"));
    assert_eq!(model.children().len(), 2);
    let mut names = Vec::new();
    model.for_each_mesh(&mut |name, _| names.push(name.map(str::to_string)));
    assert_eq!(
        names,
        [Some("body".to_string()), Some("visor".to_string()), Some("strap".to_string())]
    );

    std::fs::remove_dir_all(front).ok();
    std::fs::remove_dir_all(back).ok();
}
