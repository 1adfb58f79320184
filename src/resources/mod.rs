/**
 * This module contains all logic for loading models and environment maps from
 * external files, and for placing a loaded model in front of the camera.
 */
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use cgmath::{EuclideanSpace, Quaternion, Rad, Rotation3, Vector3};
use log::{debug, info, warn};
use tokio::io::AsyncReadExt;

use crate::data_structures::{
    material::{ColorSpace, ImageMap, Material, MaterialDescriptor},
    mesh::{Geometry, MeshData, ModelVertex},
    scene_graph::{NodeKind, SceneNode},
    transform::Transform,
};

pub mod environment;
pub mod queue;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("buffer {0} has no data")]
    MissingBuffer(usize),
    #[error("malformed asset: {0}")]
    Malformed(String),
    #[error("load task stopped before finishing: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("the node has no geometry")]
    Empty,
    #[error("bounding box has zero extent")]
    DegenerateGeometry,
    #[error("target size {0} is not a positive number")]
    InvalidTarget(f32),
}

/// Bytes read so far out of the expected total. Both only ever grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.loaded as f32 / self.total as f32
        }
    }
}

/// Fixed placement applied by [`center_model`] after centring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub scale: f32,
    pub tilt_x: Rad<f32>,
    pub turn_y: Rad<f32>,
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            scale: 0.6,
            tilt_x: Rad(-std::f32::consts::FRAC_PI_8),
            turn_y: Rad(std::f32::consts::FRAC_PI_4),
        }
    }
}

impl DisplayTransform {
    pub fn rotation(&self) -> Quaternion<f32> {
        Quaternion::from_angle_x(self.tilt_x) * Quaternion::from_angle_y(self.turn_y)
    }
}

/// Resolves relative locators against `root` and turns glTF files into
/// [`SceneNode`] trees. Nothing here touches the GPU.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    root: PathBuf,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new("./assets")
    }
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Read a whole file in chunks, reporting progress after every chunk.
    pub async fn fetch<P>(&self, locator: &str, mut progress: P) -> Result<Vec<u8>, LoadError>
    where
        P: FnMut(Progress),
    {
        let path = self.resolve(locator);
        let io_err = |source| LoadError::Io {
            path: path.clone(),
            source,
        };
        let mut file = tokio::fs::File::open(&path).await.map_err(io_err)?;
        let mut total = file.metadata().await.map_err(io_err)?.len();
        let mut bytes = Vec::with_capacity(total as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        progress(Progress { loaded: 0, total });
        loop {
            let n = file.read(&mut chunk).await.map_err(io_err)?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
            let loaded = bytes.len() as u64;
            // the file may have grown since the metadata call
            total = total.max(loaded);
            progress(Progress { loaded, total });
        }
        Ok(bytes)
    }

    /// Load a `.gltf` or `.glb` file into a group node holding the default
    /// scene. External buffers and images are resolved next to the file.
    pub async fn load<P>(&self, locator: &str, progress: P) -> Result<SceneNode, LoadError>
    where
        P: FnMut(Progress),
    {
        debug!("Loading model {}", locator);
        let bytes = self.fetch(locator, progress).await?;
        let gltf = gltf::Gltf::from_slice(&bytes)?;
        let path = self.resolve(locator);
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut buffer_data: Vec<Vec<u8>> = Vec::new();
        for buffer in gltf.buffers() {
            match buffer.source() {
                gltf::buffer::Source::Bin => {
                    let blob = gltf
                        .blob
                        .as_deref()
                        .ok_or(LoadError::MissingBuffer(buffer.index()))?;
                    buffer_data.push(blob.to_vec());
                }
                gltf::buffer::Source::Uri(uri) => {
                    buffer_data.push(read_sibling(&base, uri).await?);
                }
            }
        }
        for (buffer, data) in gltf.buffers().zip(&buffer_data) {
            if data.len() < buffer.length() {
                return Err(LoadError::Malformed(format!(
                    "buffer {} holds {} bytes, expected {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                )));
            }
        }

        let mut images = ImageCache::default();
        for material in gltf.materials() {
            let pbr = material.pbr_metallic_roughness();
            if let Some(info) = pbr.base_color_texture() {
                images
                    .load(&base, &buffer_data, info.texture().source(), ColorSpace::Srgb)
                    .await?;
            }
            if let Some(normal) = material.normal_texture() {
                images
                    .load(&base, &buffer_data, normal.texture().source(), ColorSpace::Linear)
                    .await?;
            }
        }

        let builder = NodeBuilder {
            buffers: &buffer_data,
            images: &images,
            materials: HashMap::new(),
        };
        let root = builder.build(&gltf, display_name(&path))?;
        info!("Loaded {} with {} meshes", locator, root.mesh_count());
        Ok(root)
    }

    /// Load all locators concurrently. The first failure fails the whole
    /// batch, otherwise the nodes come back in the order requested.
    pub async fn load_multiple(&self, locators: &[&str]) -> Result<Vec<SceneNode>, LoadError> {
        let loads = locators.iter().map(|locator| {
            self.load(locator, move |p: Progress| {
                debug!("{}: {:.0}%", locator, p.fraction() * 100.0)
            })
        });
        futures::future::try_join_all(loads).await
    }

    /// One model made of one or more files. Several files are loaded together
    /// and grouped under a node named "model", in the order given.
    pub async fn load_parts(&self, locators: &[&str]) -> Result<SceneNode, LoadError> {
        match locators {
            [] => Err(LoadError::Malformed("no model files given".to_string())),
            [single] => {
                self.load(single, |p| debug!("{}: {:.0}%", single, p.fraction() * 100.0))
                    .await
            }
            _ => {
                let parts = self.load_multiple(locators).await?;
                Ok(parts
                    .into_iter()
                    .fold(SceneNode::group("model"), SceneNode::with_child))
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

async fn read_sibling(base: &Path, uri: &str) -> Result<Vec<u8>, LoadError> {
    if uri.starts_with("data:") {
        return Err(LoadError::Malformed(
            "embedded data URIs are not supported".to_string(),
        ));
    }
    let path = base.join(uri);
    tokio::fs::read(&path)
        .await
        .map_err(|source| LoadError::Io { path, source })
}

/// Decoded images keyed by glTF image index and the colour space they are
/// sampled in.
#[derive(Default)]
struct ImageCache {
    maps: HashMap<(usize, bool), Arc<ImageMap>>,
}

impl ImageCache {
    async fn load(
        &mut self,
        base: &Path,
        buffers: &[Vec<u8>],
        image: gltf::Image<'_>,
        color_space: ColorSpace,
    ) -> Result<(), LoadError> {
        let key = (image.index(), color_space == ColorSpace::Linear);
        if self.maps.contains_key(&key) {
            return Ok(());
        }
        let decoded = match image.source() {
            gltf::image::Source::View { view, .. } => {
                let data = buffers
                    .get(view.buffer().index())
                    .ok_or(LoadError::MissingBuffer(view.buffer().index()))?;
                let bytes = data
                    .get(view.offset()..view.offset() + view.length())
                    .ok_or_else(|| {
                        LoadError::Malformed(format!("image view {} out of range", view.index()))
                    })?;
                image::load_from_memory(bytes)?
            }
            gltf::image::Source::Uri { uri, .. } => {
                let bytes = read_sibling(base, uri).await?;
                image::load_from_memory(&bytes)?
            }
        };
        let label = image
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("image {}", image.index()));
        self.maps.insert(
            key,
            Arc::new(ImageMap::new(label, decoded.to_rgba8(), color_space)),
        );
        Ok(())
    }

    fn get(&self, image: gltf::Image<'_>, color_space: ColorSpace) -> Option<Arc<ImageMap>> {
        self.maps
            .get(&(image.index(), color_space == ColorSpace::Linear))
            .cloned()
    }
}

struct NodeBuilder<'a> {
    buffers: &'a [Vec<u8>],
    images: &'a ImageCache,
    /// One shared material per glTF material until the assigner replaces it.
    materials: HashMap<Option<usize>, Arc<Material>>,
}

impl NodeBuilder<'_> {
    fn build(mut self, gltf: &gltf::Gltf, name: String) -> Result<SceneNode, LoadError> {
        let scene = gltf
            .default_scene()
            .or_else(|| gltf.scenes().next())
            .ok_or_else(|| LoadError::Malformed("file contains no scene".to_string()))?;
        let mut root = SceneNode::group(name);
        for node in scene.nodes() {
            root.add_child(self.node(node)?);
        }
        Ok(root)
    }

    fn node(&mut self, node: gltf::Node<'_>) -> Result<SceneNode, LoadError> {
        let (t, r, s) = node.transform().decomposed();
        let local = Transform {
            position: t.into(),
            rotation: Quaternion::new(r[3], r[0], r[1], r[2]),
            scale: s.into(),
        };
        let name = node
            .name()
            .or_else(|| node.mesh().and_then(|m| m.name()))
            .map(str::to_owned);

        let mut scene_node = match node.mesh() {
            Some(mesh) => {
                let mut parts = self.primitives(&mesh)?;
                if parts.len() == 1 {
                    let part = parts.remove(0);
                    SceneNode::mesh(name, part)
                } else {
                    let mut group = SceneNode::new(name.clone(), NodeKind::Group);
                    for part in parts {
                        group.add_child(SceneNode::mesh(name.clone(), part));
                    }
                    group
                }
            }
            None => SceneNode::new(name, NodeKind::Group),
        }
        .with_transform(local);

        for child in node.children() {
            scene_node.add_child(self.node(child)?);
        }
        Ok(scene_node)
    }

    fn primitives(&mut self, mesh: &gltf::Mesh<'_>) -> Result<Vec<MeshData>, LoadError> {
        let mut parts = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "Skipping primitive {} of mesh {:?}: mode {:?} is not drawn",
                    primitive.index(),
                    mesh.name(),
                    primitive.mode()
                );
                continue;
            }
            let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(Vec::as_slice));
            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| {
                    LoadError::Malformed(format!("mesh {:?} has no positions", mesh.name()))
                })?
                .collect();
            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
            let tex_coords: Vec<[f32; 2]> = reader
                .read_tex_coords(0)
                .map(|tc| tc.into_f32().collect())
                .unwrap_or_default();
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(LoadError::Malformed(format!(
                    "index {} out of range in mesh {:?}",
                    bad,
                    mesh.name()
                )));
            }

            let vertices = positions
                .iter()
                .enumerate()
                .map(|(i, position)| ModelVertex {
                    position: *position,
                    tex_coords: tex_coords.get(i).copied().unwrap_or([0.0, 0.0]),
                    normal: normals
                        .as_ref()
                        .and_then(|n| n.get(i).copied())
                        .unwrap_or([0.0, 0.0, 0.0]),
                    tangent: [0.0; 3],
                    bitangent: [0.0; 3],
                })
                .collect();
            let label = format!("{}#{}", mesh.name().unwrap_or("mesh"), primitive.index());
            let mut geometry = Geometry::new(label, vertices, indices);
            if normals.is_none() {
                geometry.compute_normals();
            }
            geometry.compute_tangents();

            let material = self.material(&primitive.material());
            parts.push(MeshData::new(Arc::new(geometry), material));
        }
        Ok(parts)
    }

    fn material(&mut self, material: &gltf::Material<'_>) -> Arc<Material> {
        let images = self.images;
        self.materials
            .entry(material.index())
            .or_insert_with(|| {
                let pbr = material.pbr_metallic_roughness();
                let descriptor = MaterialDescriptor::new(
                    pbr.base_color_factor(),
                    pbr.metallic_factor(),
                    pbr.roughness_factor(),
                );
                let name = material.name().unwrap_or("default").to_string();
                let mut built = Material::new(name, descriptor);
                built.base_color_map = pbr
                    .base_color_texture()
                    .and_then(|info| images.get(info.texture().source(), ColorSpace::Srgb));
                built.normal_map = material
                    .normal_texture()
                    .and_then(|n| images.get(n.texture().source(), ColorSpace::Linear));
                Arc::new(built)
            })
            .clone()
    }
}

/// Move `node` so the centre of its geometry sits at the origin of its parent
/// and apply the fixed display scale and tilt.
pub fn center_model(node: &mut SceneNode, display: &DisplayTransform) -> Result<(), SceneError> {
    let bounds = node.content_bounds().ok_or(SceneError::Empty)?;
    let rotation = display.rotation();
    let center = bounds.center().to_vec() * display.scale;
    node.local = Transform {
        position: -(rotation * center),
        rotation,
        scale: Vector3::new(display.scale, display.scale, display.scale),
    };
    debug!("Centred {:?} (box size {:?})", node.name, bounds.size());
    Ok(())
}

/// Scale `node` uniformly about its parent's origin so that its largest
/// bounding-box extent equals `target`. Returns the factor applied. A box with
/// no extent leaves the node untouched.
pub fn scale_to_fit(node: &mut SceneNode, target: f32) -> Result<f32, SceneError> {
    if !(target.is_finite() && target > 0.0) {
        warn!("Refusing to fit {:?} to size {}", node.name, target);
        return Err(SceneError::InvalidTarget(target));
    }
    let bounds = node.bounds().ok_or(SceneError::Empty)?;
    if bounds.is_degenerate() {
        warn!("Not scaling {:?}: its bounding box has no extent", node.name);
        return Err(SceneError::DegenerateGeometry);
    }
    let factor = target / bounds.max_extent();
    node.local.scale *= factor;
    node.local.position *= factor;
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data_structures::{bounds::Aabb, material::MaterialDescriptor};

    fn mesh_node(name: &str, geometry: Geometry) -> SceneNode {
        let material = Arc::new(Material::new(name, MaterialDescriptor::from_hex(0xffffff)));
        SceneNode::mesh(Some(name.to_string()), MeshData::new(Arc::new(geometry), material))
    }

    fn offset_box() -> SceneNode {
        let mut cube = Geometry::cube(2.0);
        for v in &mut cube.vertices {
            v.position[0] = v.position[0] * 2.0 + 10.0;
            v.position[1] += 3.0;
        }
        SceneNode::group("model").with_child(mesh_node("body", cube))
    }

    fn point_geometry() -> Geometry {
        let v = ModelVertex {
            position: [1.0, 1.0, 1.0],
            tex_coords: [0.0; 2],
            normal: [0.0, 1.0, 0.0],
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        };
        Geometry::new("point", vec![v; 3], vec![0, 1, 2])
    }

    #[test]
    fn scale_to_fit_hits_the_target_and_is_idempotent() {
        let mut node = offset_box();
        let first = scale_to_fit(&mut node, 2.0).unwrap();
        assert_relative_eq!(first, 0.5);
        let bounds = node.bounds().unwrap();
        assert_relative_eq!(bounds.max_extent(), 2.0, epsilon = 1e-5);

        let before = node.local.clone();
        let second = scale_to_fit(&mut node, 2.0).unwrap();
        assert_relative_eq!(second, 1.0, epsilon = 1e-5);
        assert_relative_eq!(node.local.scale.x, before.scale.x, epsilon = 1e-5);
        assert_relative_eq!(node.local.position.x, before.position.x, epsilon = 1e-4);
    }

    #[test]
    fn degenerate_box_is_left_alone() {
        let mut node = SceneNode::group("flat").with_child(mesh_node("dot", point_geometry()));
        let before = node.local.clone();
        assert_eq!(scale_to_fit(&mut node, 2.0), Err(SceneError::DegenerateGeometry));
        assert_eq!(node.local, before);
        assert!(node.local.scale.x.is_finite());
    }

    #[test]
    fn empty_nodes_and_bad_targets_are_errors() {
        let mut empty = SceneNode::group("empty");
        assert_eq!(scale_to_fit(&mut empty, 1.0), Err(SceneError::Empty));
        assert_eq!(
            center_model(&mut empty, &DisplayTransform::default()),
            Err(SceneError::Empty)
        );
        let mut node = offset_box();
        assert!(matches!(
            scale_to_fit(&mut node, f32::NAN),
            Err(SceneError::InvalidTarget(_))
        ));
        assert!(matches!(
            scale_to_fit(&mut node, 0.0),
            Err(SceneError::InvalidTarget(_))
        ));
    }

    #[test]
    fn center_model_puts_the_box_centre_at_the_origin() {
        let mut node = offset_box();
        let display = DisplayTransform::default();
        center_model(&mut node, &display).unwrap();

        let bounds: Aabb = node.bounds().unwrap();
        let center = bounds.center().to_vec();
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(center.z, 0.0, epsilon = 1e-4);
        assert_relative_eq!(node.local.scale.x, 0.6);
    }

    #[test]
    fn center_then_fit_stays_centred() {
        let mut node = offset_box();
        center_model(&mut node, &DisplayTransform::default()).unwrap();
        scale_to_fit(&mut node, 3.0).unwrap();
        let bounds = node.bounds().unwrap();
        assert_relative_eq!(bounds.max_extent(), 3.0, epsilon = 1e-4);
        assert_relative_eq!(bounds.center().to_vec().x, 0.0, epsilon = 1e-4);
    }

    #[tokio::test]
    async fn missing_files_fail_with_io_errors() {
        let loader = AssetLoader::new(std::env::temp_dir());
        let result = loader.load("dither-ngin-does-not-exist.glb", |_| {}).await;
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[tokio::test]
    async fn garbage_fails_to_parse() {
        let dir = std::env::temp_dir().join(format!("dither-ngin-garbage-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.gltf"), b"{ this is not json").unwrap();
        let loader = AssetLoader::new(&dir);

        let result = loader.load("broken.gltf", |_| {}).await;
        assert!(matches!(result, Err(LoadError::Gltf(_))));
        let batch = loader.load_multiple(&["broken.gltf", "also-missing.glb"]).await;
        assert!(batch.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn parts_need_at_least_one_file() {
        let loader = AssetLoader::default();
        assert!(matches!(loader.load_parts(&[]).await, Err(LoadError::Malformed(_))));
    }

    #[tokio::test]
    async fn fetch_progress_never_goes_backwards() {
        let dir = std::env::temp_dir().join(format!("dither-ngin-fetch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let payload = vec![7u8; CHUNK_SIZE * 2 + 17];
        std::fs::write(dir.join("blob.bin"), &payload).unwrap();
        let loader = AssetLoader::new(&dir);

        let mut seen = Vec::new();
        let bytes = loader.fetch("blob.bin", |p| seen.push(p)).await.unwrap();
        assert_eq!(bytes, payload);
        assert!(seen.windows(2).all(|w| w[0].loaded <= w[1].loaded && w[0].total <= w[1].total));
        assert_eq!(seen.last().map(|p| p.loaded), Some(payload.len() as u64));
        std::fs::remove_dir_all(&dir).ok();
    }
}
