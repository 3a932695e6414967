use super::{assert_vectors_close, check_gradient, is_interior, space, wiggly_vector};
use matrixcompare::assert_scalar_eq;
use std::sync::Arc;
use weakform::assembly::Functional;
use weakform::mesh::procedural::{
    create_unit_box_uniform_hex_mesh_3d, create_unit_box_uniform_tet_mesh_3d, create_unit_square_uniform_quad_mesh_2d,
    create_unit_square_uniform_tri_mesh_2d,
};
use weakform::mesh::{Domain, Mesh};
use weakform::nalgebra::{DMatrix, DVector};
use weakform::space::FieldSpace;
use weakform_solid::materials::{LameParameters, LinearElasticity, NeoHookean, YoungPoisson};
use weakform_solid::BodyForce;

fn meshes() -> Vec<Arc<Mesh>> {
    vec![
        Arc::new(create_unit_square_uniform_quad_mesh_2d(3)),
        Arc::new(create_unit_square_uniform_tri_mesh_2d(3)),
        Arc::new(create_unit_box_uniform_hex_mesh_3d(2)),
        Arc::new(create_unit_box_uniform_tet_mesh_3d(2)),
    ]
}

fn elasticity_functional(mesh: &Arc<Mesh>, order: usize, material: LinearElasticity) -> Functional {
    let displacement = space(mesh, FieldSpace::nodal(order).with_components(mesh.dim()));
    let mut functional = Functional::new(displacement.clone(), vec![displacement]).unwrap();
    functional
        .add_domain_integral(mesh.dim(), &[0], material, &Domain::all_elements(mesh))
        .unwrap();
    functional
}

#[test]
fn affine_displacement_is_in_equilibrium() {
    let material = LinearElasticity::new(LameParameters { mu: 2.0, lambda: 5.0 });
    for mesh in meshes() {
        let dim = mesh.dim();
        let a = DMatrix::from_fn(dim, dim, |i, j| 0.1 * (i as f64 + 1.0) - 0.05 * j as f64);
        for order in [1, 2] {
            let mut functional = elasticity_functional(&mesh, order, material);
            let displacement = functional.test_space().clone();
            let u = displacement.interpolate(|x| &a * x + DVector::repeat(dim, 0.3));
            let residual = functional.evaluate(&[&u]).unwrap();

            // Constant stress is divergence free, so only boundary nodes see tractions
            for (node, x) in displacement.node_positions().iter().enumerate() {
                if is_interior(x) {
                    for i in 0..dim {
                        assert_scalar_eq!(residual[dim * node + i], 0.0, comp = abs, tol = 1e-12);
                    }
                }
            }
            // Tractions of a constant stress integrate to zero over a closed boundary
            for i in 0..dim {
                let total: f64 = residual.iter().skip(i).step_by(dim).sum();
                assert_scalar_eq!(total, 0.0, comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn linear_elasticity_jacobian_reproduces_residual() {
    let material = LinearElasticity::new(YoungPoisson {
        young: 1e3,
        poisson: 0.3,
    });
    for mesh in meshes() {
        for order in [1, 2] {
            let mut functional = elasticity_functional(&mesh, order, material);
            let n = functional.test_space().num_true_dofs();
            let u = wiggly_vector(n, 0.35);
            let (residual, mut gradient) = functional.evaluate_and_differentiate(&[&u], 0).unwrap();
            let stiffness = DMatrix::from(&gradient.assemble().unwrap());
            assert_eq!(stiffness.shape(), (n, n));
            assert_vectors_close(&(&stiffness * &u), &residual, 1e-12);
            assert!((&stiffness - stiffness.transpose()).amax() <= 1e-10 * stiffness.amax());
        }
    }
}

#[test]
fn repeated_evaluations_match_fresh_functionals() {
    let material = LinearElasticity::new(LameParameters { mu: 1.5, lambda: 4.0 });
    for mesh in meshes() {
        let mut reused = elasticity_functional(&mesh, 2, material);
        let n = reused.test_space().num_true_dofs();
        for frequency in [0.35, 1.2, -0.7] {
            let u = wiggly_vector(n, frequency);
            let v = wiggly_vector(n, 2.0 * frequency);
            let mut fresh = elasticity_functional(&mesh, 2, material);
            assert_vectors_close(&reused.evaluate(&[&u]).unwrap(), &fresh.evaluate(&[&u]).unwrap(), 1e-14);

            let (_, mut gradient) = reused.evaluate_and_differentiate(&[&u], 0).unwrap();
            let reused_action = gradient.apply_to(&v).unwrap();
            let reused_matrix = DMatrix::from(&gradient.assemble().unwrap());
            let (_, mut gradient) = fresh.evaluate_and_differentiate(&[&u], 0).unwrap();
            assert_vectors_close(&reused_action, &gradient.apply_to(&v).unwrap(), 1e-14);
            assert_vectors_close(&(&reused_matrix * &v), &reused_action, 1e-12);
        }
    }
}

#[test]
fn neo_hookean_gradient_matches_finite_differences() {
    let material = NeoHookean::new(YoungPoisson {
        young: 10.0,
        poisson: 0.4,
    });
    let meshes = [
        Arc::new(create_unit_square_uniform_tri_mesh_2d(2)),
        Arc::new(create_unit_box_uniform_hex_mesh_3d(1)),
    ];
    for mesh in meshes {
        for order in [1, 2] {
            let displacement = space(&mesh, FieldSpace::nodal(order).with_components(mesh.dim()));
            let mut functional = Functional::new(displacement.clone(), vec![displacement.clone()]).unwrap();
            functional
                .add_domain_integral(mesh.dim(), &[0], material, &Domain::all_elements(&mesh))
                .unwrap();
            let n = displacement.num_true_dofs();
            // Small displacements keep the deformation far from inversion
            let u = 0.05 * wiggly_vector(n, 0.45);
            check_gradient(&mut functional, &[&u], 0, &wiggly_vector(n, 1.6));
        }
    }
}

#[test]
fn neo_hookean_reports_inverted_elements() {
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d(1));
    let displacement = space(&mesh, FieldSpace::nodal(1).with_components(2));
    let mut functional = Functional::new(displacement.clone(), vec![displacement.clone()]).unwrap();
    functional
        .add_area_integral(
            &[0],
            NeoHookean::new(LameParameters { mu: 1.0, lambda: 1.0 }),
            &Domain::all_elements(&mesh),
        )
        .unwrap();
    // Mirror the square in x, which inverts it
    let u = displacement.interpolate(|x| weakform::nalgebra::dvector![-2.0 * x[0], 0.0]);
    assert!(functional.evaluate(&[&u]).is_err());
}

#[test]
fn gravity_load_sums_to_weight() {
    for mesh in meshes() {
        let dim = mesh.dim();
        let displacement = space(&mesh, FieldSpace::nodal(2).with_components(dim));
        let mut functional = Functional::new(displacement.clone(), vec![displacement.clone()]).unwrap();
        functional
            .add_domain_integral(dim, &[], BodyForce::gravity(2.0, dim, 9.81), &Domain::all_elements(&mesh))
            .unwrap();
        let residual = functional
            .evaluate(&[&DVector::zeros(displacement.num_true_dofs())])
            .unwrap();
        for i in 0..dim {
            let total: f64 = residual.iter().skip(i).step_by(dim).sum();
            let expected = if i == dim - 1 { 2.0 * 9.81 } else { 0.0 };
            assert_scalar_eq!(total, expected, comp = abs, tol = 1e-12);
        }
    }
}
