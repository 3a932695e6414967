use crate::element::{evaluate_lagrange_basis, lagrange_nodes, normal_facets, Geometry};
use crate::error::ConfigurationError;
use crate::mesh::{Mesh, MeshElement};
use crate::space::{Family, FieldSpace};
use itertools::Itertools;
use nalgebra::DVector;
use rustc_hash::FxHashMap;

/// The nodes of a single element, in local order, together with their orientation signs.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNodes {
    pub nodes: Vec<usize>,
    pub signs: Vec<f64>,
}

/// Numbering of the nodes of a field space on a mesh.
///
/// Nodes are associated with mesh entities (vertices, edges, faces and cells), identified by their sorted
/// global vertex indices, so that elements sharing an entity share its nodes. For nodal spaces, vertex nodes
/// are numbered first in ascending vertex order, so that on meshes without unused vertices the node of a vertex
/// has the same index as the vertex itself. Discontinuous spaces give every element its own nodes.
#[derive(Debug, Clone)]
pub struct DofMap {
    positions: Vec<DVector<f64>>,
    offsets: Vec<usize>,
    nodes: Vec<usize>,
    signs: Vec<f64>,
    entities: FxHashMap<Vec<usize>, usize>,
}

/// Maps a point on the reference domain of an element to physical space with the linear geometry map.
fn map_reference_point(mesh: &Mesh, element: &MeshElement, xi: &[f64]) -> DVector<f64> {
    let geometry = element.geometry();
    let dim = geometry.reference_dim();
    let mut x = DVector::zeros(mesh.dim());
    if let Some((values, _)) = evaluate_lagrange_basis(geometry, 1, &xi[..dim]) {
        for (phi, &v) in values.iter().zip(element.vertices()) {
            x.axpy(*phi, &mesh.vertices()[v], 1.0);
        }
    }
    x
}

fn centroid(mesh: &Mesh, vertices: &[usize]) -> DVector<f64> {
    let mut x = DVector::zeros(mesh.dim());
    for &v in vertices {
        x += &mesh.vertices()[v];
    }
    x / vertices.len() as f64
}

/// The orientation of a facet given as a cycle of global vertex indices, relative to the canonical
/// orientation of the facet.
///
/// Segments are canonically oriented from the smaller to the larger index. Longer cycles are rotated to start
/// at their smallest index, and are canonically oriented if the following index is smaller than the preceding.
fn facet_sign(cycle: &[usize]) -> f64 {
    let n = cycle.len();
    let positive = if n == 2 {
        cycle[0] < cycle[1]
    } else {
        let start = cycle
            .iter()
            .enumerate()
            .min_by_key(|&(_, v)| *v)
            .map(|(i, _)| i)
            .unwrap_or(0);
        cycle[(start + 1) % n] < cycle[(start + n - 1) % n]
    };
    if positive {
        1.0
    } else {
        -1.0
    }
}

fn sorted_key(vertices: impl IntoIterator<Item = usize>) -> Vec<usize> {
    vertices.into_iter().sorted_unstable().collect()
}

impl DofMap {
    pub fn build(mesh: &Mesh, field: &FieldSpace) -> eyre::Result<Self> {
        let mut map = Self {
            positions: Vec::new(),
            offsets: vec![0],
            nodes: Vec::new(),
            signs: Vec::new(),
            entities: FxHashMap::default(),
        };

        if field.family == Family::Nodal {
            let used_vertices = mesh
                .elements()
                .iter()
                .flat_map(|element| element.vertices().iter().copied())
                .sorted_unstable()
                .dedup();
            for v in used_vertices {
                map.entity_node(vec![v], || mesh.vertices()[v].clone());
            }
        }

        for element in mesh.elements() {
            let geometry = element.geometry();
            let global = |local: usize| element.vertices()[local];
            match field.family {
                Family::Nodal | Family::Discontinuous => {
                    let nodes = lagrange_nodes(geometry, field.order).ok_or(ConfigurationError::UnsupportedSpace {
                        space: *field,
                        geometry,
                    })?;
                    for node in nodes {
                        let position = || map_reference_point(mesh, element, &node.reference_coords);
                        let id = if field.family == Family::Nodal {
                            let key = sorted_key(node.entity.local_vertices(geometry).into_iter().map(global));
                            map.entity_node(key, position)
                        } else {
                            map.new_node(position())
                        };
                        map.nodes.push(id);
                        map.signs.push(1.0);
                    }
                }
                Family::Tangential => {
                    for &[start, end] in geometry.edges() {
                        let (a, b) = (global(start), global(end));
                        let id = map.entity_node(sorted_key([a, b]), || centroid(mesh, &[a, b]));
                        map.nodes.push(id);
                        map.signs.push(if a < b { 1.0 } else { -1.0 });
                    }
                }
                Family::Normal => {
                    for facet in normal_facets(geometry) {
                        let cycle: Vec<usize> = facet.iter().map(|&v| global(v)).collect();
                        let id = map.entity_node(sorted_key(cycle.iter().copied()), || centroid(mesh, &cycle));
                        map.nodes.push(id);
                        map.signs.push(facet_sign(&cycle));
                    }
                }
            }
            map.offsets.push(map.nodes.len());
        }

        Ok(map)
    }

    fn new_node(&mut self, position: DVector<f64>) -> usize {
        self.positions.push(position);
        self.positions.len() - 1
    }

    fn entity_node(&mut self, key: Vec<usize>, position: impl FnOnce() -> DVector<f64>) -> usize {
        if let Some(&id) = self.entities.get(&key) {
            id
        } else {
            let id = self.new_node(position());
            self.entities.insert(key, id);
            id
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[DVector<f64>] {
        &self.positions
    }

    pub fn num_domain_elements(&self) -> usize {
        self.offsets.len() - 1
    }

    /// # Panics
    ///
    /// Panics if the element index is out of bounds.
    pub fn domain_element_nodes(&self, element: usize) -> ElementNodes {
        let range = self.offsets[element]..self.offsets[element + 1];
        ElementNodes {
            nodes: self.nodes[range.clone()].to_vec(),
            signs: self.signs[range].to_vec(),
        }
    }

    /// The nodes of a boundary element, looked up from the entities of the domain elements.
    ///
    /// Only meaningful for nodal spaces.
    pub fn boundary_element_nodes(
        &self,
        mesh: &Mesh,
        field: &FieldSpace,
        element: usize,
    ) -> eyre::Result<ElementNodes> {
        let num_elements = mesh.boundary_elements().len();
        let boundary_element = mesh
            .boundary_elements()
            .get(element)
            .ok_or(ConfigurationError::ElementOutOfBounds {
                index: element,
                num_elements,
            })?;
        let geometry: Geometry = boundary_element.geometry();
        field.check_geometry(geometry)?;
        let local_nodes = lagrange_nodes(geometry, field.order)
            .ok_or(ConfigurationError::UnsupportedSpace { space: *field, geometry })?;

        let nodes = local_nodes
            .iter()
            .map(|node| {
                let key = sorted_key(
                    node.entity
                        .local_vertices(geometry)
                        .into_iter()
                        .map(|v| boundary_element.vertices()[v]),
                );
                self.entities.get(&key).copied().ok_or_else(|| {
                    ConfigurationError::InvalidMesh(format!(
                        "boundary element {element} is not on the boundary of any domain element"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let signs = vec![1.0; nodes.len()];
        Ok(ElementNodes { nodes, signs })
    }
}
