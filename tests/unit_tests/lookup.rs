use super::restriction::two_quads_with_rotated_element;
use matrixcompare::assert_matrix_eq;
use std::sync::Arc;
use weakform::assembly::GradientAssemblyLookup;
use weakform::mesh::procedural::{create_uniform_line_mesh_1d, create_unit_square_uniform_quad_mesh_2d};
use weakform::mesh::ElementKind;
use weakform::nalgebra::{dmatrix, DMatrix};
use weakform::restriction::ElementRestriction;
use weakform::space::{FieldSpace, FiniteElementSpace};

fn line_restriction(cells: usize) -> ElementRestriction {
    let mesh = Arc::new(create_uniform_line_mesh_1d(0.0, 1.0, cells));
    let space = FiniteElementSpace::new(mesh, FieldSpace::nodal(1)).unwrap();
    ElementRestriction::new(&space, ElementKind::Domain).unwrap()
}

#[test]
fn pattern_of_line_mesh_is_tridiagonal() {
    let r = line_restriction(3);
    let lookup = GradientAssemblyLookup::new([Some((&r, &r)), None]).unwrap();
    assert_eq!(lookup.nnz(), 10);
    assert_eq!(lookup.row_offsets(), &[0, 2, 5, 8, 10]);
    assert_eq!(lookup.column_indices(), &[0, 1, 0, 1, 2, 1, 2, 3, 2, 3]);
    assert_eq!(lookup.pattern().major_dim(), 4);
}

#[test]
fn lookup_of_element_entries() {
    let r = line_restriction(3);
    let lookup = GradientAssemblyLookup::new([Some((&r, &r)), None]).unwrap();
    // Element 1 connects dofs 1 and 2: row 1 starts at offset 2, row 2 at offset 5
    assert_eq!(lookup.lookup(ElementKind::Domain, 1, 0, 0), Some((3, 1.0)));
    assert_eq!(lookup.lookup(ElementKind::Domain, 1, 0, 1), Some((4, 1.0)));
    assert_eq!(lookup.lookup(ElementKind::Domain, 1, 1, 0), Some((5, 1.0)));
    assert_eq!(lookup.lookup(ElementKind::Domain, 1, 1, 1), Some((6, 1.0)));

    assert_eq!(lookup.lookup(ElementKind::Domain, 1, 2, 0), None);
    assert_eq!(lookup.lookup(ElementKind::Domain, 3, 0, 0), None);
    assert_eq!(lookup.lookup(ElementKind::Boundary, 0, 0, 0), None);
}

#[test]
fn assemble_sums_element_matrices() {
    let r = line_restriction(3);
    let lookup = GradientAssemblyLookup::new([Some((&r, &r)), None]).unwrap();
    let element = dmatrix![1.0, -1.0; -1.0, 1.0];
    let matrices = vec![element.clone(), 2.0 * &element, 3.0 * &element];
    let assembled = lookup.assemble([matrices.as_slice(), &[]]).unwrap();

    #[rustfmt::skip]
    let expected = dmatrix![
         1.0, -1.0,  0.0,  0.0;
        -1.0,  3.0, -2.0,  0.0;
         0.0, -2.0,  5.0, -3.0;
         0.0,  0.0, -3.0,  3.0
    ];
    assert_matrix_eq!(DMatrix::from(&assembled), expected);

    // Assembling again starts from zero
    let again = lookup.assemble([matrices.as_slice(), &[]]).unwrap();
    assert_matrix_eq!(DMatrix::from(&again), expected);
}

#[test]
fn domain_and_boundary_contributions_share_one_pattern() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d(1));
    let space = FiniteElementSpace::new(mesh, FieldSpace::nodal(1)).unwrap();
    let domain = ElementRestriction::new(&space, ElementKind::Domain).unwrap();
    let boundary = ElementRestriction::new(&space, ElementKind::Boundary).unwrap();
    let lookup = GradientAssemblyLookup::new([Some((&domain, &domain)), Some((&boundary, &boundary))]).unwrap();
    assert_eq!(lookup.nnz(), 16);

    let boundary_matrices = vec![DMatrix::repeat(2, 2, 1.0); 4];
    let assembled = DMatrix::from(&lookup.assemble([&[], boundary_matrices.as_slice()]).unwrap());
    // Every vertex lies on two boundary segments, and every boundary edge is covered once
    #[rustfmt::skip]
    let expected = dmatrix![
        2.0, 1.0, 1.0, 0.0;
        1.0, 2.0, 0.0, 1.0;
        1.0, 0.0, 2.0, 1.0;
        0.0, 1.0, 1.0, 2.0
    ];
    assert_matrix_eq!(assembled, expected);
}

#[test]
fn mixed_assembly_applies_trial_signs() {
    let mesh = Arc::new(two_quads_with_rotated_element());
    let nodal = FiniteElementSpace::new(mesh.clone(), FieldSpace::nodal(1)).unwrap();
    let tangential = FiniteElementSpace::new(mesh, FieldSpace::tangential()).unwrap();
    let test = ElementRestriction::new(&nodal, ElementKind::Domain).unwrap();
    let trial = ElementRestriction::new(&tangential, ElementKind::Domain).unwrap();
    let lookup = GradientAssemblyLookup::new([Some((&test, &trial)), None]).unwrap();
    assert_eq!(lookup.pattern().major_dim(), 6);
    assert_eq!(lookup.pattern().minor_dim(), 7);

    let (_, sign) = lookup.lookup(ElementKind::Domain, 1, 0, 0).unwrap();
    assert_eq!(sign, -1.0);

    let matrices = vec![DMatrix::repeat(4, 4, 1.0); 2];
    let assembled = DMatrix::from(&lookup.assemble([matrices.as_slice(), &[]]).unwrap());
    let shared = trial.element_indices(0)[3];
    let column: Vec<f64> = assembled.column(shared).iter().copied().collect();
    // Vertices 1 and 4 see the shared edge from both elements with opposite orientation
    assert_eq!(column, vec![1.0, 0.0, -1.0, 1.0, 0.0, -1.0]);
}
