//! Material assignment over the meshes of a scene node.
//!
//! Every operation here walks the meshes in depth-first pre-order and swaps the
//! material reference of the meshes it touches. The replacement is always a
//! fresh [`Material`] built from a descriptor, carrying over the previous base
//! colour and normal maps.

use std::sync::Arc;

use log::debug;

use crate::data_structures::{
    material::{Material, MaterialDescriptor, Palette, hex_to_linear},
    mesh::MeshData,
    scene_graph::SceneNode,
};

/// Lowercased substrings that mark a mesh for the special finish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordSet(Vec<String>);

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, name: Option<&str>) -> bool {
        let Some(name) = name else {
            return false;
        };
        let name = name.to_lowercase();
        self.0.iter().any(|k| name.contains(k.as_str()))
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self::new(["visor", "shield", "glass", "lens"])
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AssignMode {
    /// `palette[i]` for the i-th mesh while `i < palette.len()`.
    Sequential,
    /// Matching meshes get the special finish, the others are assigned
    /// sequentially with their own counter.
    NameMatch(KeywordSet),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssignReport {
    /// Meshes that received a palette entry.
    pub assigned: usize,
    /// Meshes that received the special finish.
    pub special: usize,
    /// Meshes whose material reference was left alone.
    pub untouched: usize,
    /// No name matched and the first mesh was given the special finish.
    pub fallback: bool,
}

fn replace(mesh: &mut MeshData, descriptor: &MaterialDescriptor) {
    let material = Material::replacing(mesh.material(), descriptor);
    mesh.set_material(Arc::new(material));
}

pub fn apply_palette(node: &mut SceneNode, palette: &Palette, mode: &AssignMode) -> AssignReport {
    let mut report = AssignReport::default();
    let mut counter = 0;
    match mode {
        AssignMode::Sequential => {
            node.for_each_mesh_mut(&mut |_, mesh| match palette.get(counter) {
                Some(descriptor) => {
                    replace(mesh, descriptor);
                    counter += 1;
                    report.assigned += 1;
                }
                None => report.untouched += 1,
            });
        }
        AssignMode::NameMatch(keywords) => {
            // Without any match the first mesh takes the special finish and
            // stays out of the sequential count.
            let mut any_match = false;
            node.for_each_mesh(&mut |name, _| any_match |= keywords.matches(name));
            report.fallback = !any_match;
            let mut first = true;
            node.for_each_mesh_mut(&mut |name, mesh| {
                let fallback = report.fallback && std::mem::take(&mut first);
                if fallback || keywords.matches(name) {
                    replace(mesh, &palette.special);
                    report.special += 1;
                } else if let Some(descriptor) = palette.get(counter) {
                    replace(mesh, descriptor);
                    counter += 1;
                    report.assigned += 1;
                } else {
                    report.untouched += 1;
                }
            });
        }
    }
    debug!(
        "palette {:?}: {} assigned, {} special, {} untouched",
        palette.name, report.assigned, report.special, report.untouched
    );
    report
}

/// Give every mesh the same look.
pub fn apply_uniform(node: &mut SceneNode, descriptor: &MaterialDescriptor) -> usize {
    let mut count = 0;
    node.for_each_mesh_mut(&mut |_, mesh| {
        replace(mesh, descriptor);
        count += 1;
    });
    count
}

/// Lift materials too dark to survive the dither. Returns how many changed.
///
/// Below 0.15 luminance the colour becomes mid grey, below 0.25 it is
/// brightened by half.
pub fn boost_dark_materials(node: &mut SceneNode) -> usize {
    let mut changed = 0;
    node.for_each_mesh_mut(&mut |_, mesh| {
        let current = &mesh.material().descriptor;
        let luminance = current.luminance();
        let base_color = if luminance < 0.15 {
            hex_to_linear(0x808080)
        } else if luminance < 0.25 {
            let [r, g, b, a] = current.base_color;
            [(r * 1.5).min(1.0), (g * 1.5).min(1.0), (b * 1.5).min(1.0), a]
        } else {
            return;
        };
        let descriptor = MaterialDescriptor {
            base_color,
            ..current.clone()
        };
        replace(mesh, &descriptor);
        changed += 1;
    });
    if changed > 0 {
        debug!("boosted {changed} dark materials");
    }
    changed
}
