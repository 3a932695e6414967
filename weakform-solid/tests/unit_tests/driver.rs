use eyre::Result;
use matrixcompare::assert_scalar_eq;
use weakform::dual::DualMatrix;
use weakform_solid::materials::{
    BulkShear, LameParameters, LinearElasticity, NeoHookean, ParameterizedLinearElasticity, YoungPoisson,
};
use weakform_solid::{uniaxial_strain_history, uniaxial_stress_test, StatefulStressModel, StressModel};

#[test]
fn uniaxial_linear_elasticity_3d() {
    let (young, poisson) = (1e3, 0.3);
    let material = LinearElasticity::new(YoungPoisson { young, poisson });
    let strains = [0.0, 1e-3, 2e-3, -1e-3];
    let history = uniaxial_strain_history(&material, 3, &strains).unwrap();

    assert_eq!(history.len(), strains.len());
    for (point, &strain) in history.iter().zip(&strains) {
        assert_eq!(point.axial_strain, strain);
        assert_eq!(point.lateral_strains.len(), 2);
        assert_scalar_eq!(point.axial_stress, young * strain, comp = abs, tol = 1e-9);
        for &lateral in &point.lateral_strains {
            assert_scalar_eq!(lateral, -poisson * strain, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn uniaxial_linear_elasticity_2d() {
    // Plane strain: the lateral strain follows from 2 mu eps_y + lambda (eps + eps_y) = 0
    let lame = LameParameters { mu: 2.0, lambda: 5.0 };
    let strain = 0.01;
    let history = uniaxial_strain_history(&LinearElasticity::new(lame), 2, &[strain]).unwrap();

    let lateral = -lame.lambda * strain / (2.0 * lame.mu + lame.lambda);
    let stress = 2.0 * lame.mu * strain + lame.lambda * (strain + lateral);
    assert_scalar_eq!(history[0].lateral_strains[0], lateral, comp = abs, tol = 1e-12);
    assert_scalar_eq!(history[0].axial_stress, stress, comp = abs, tol = 1e-12);
}

#[test]
fn uniaxial_neo_hookean_small_strain_matches_linear_elasticity() {
    let (young, poisson) = (1e3, 0.3);
    let material = NeoHookean::new(YoungPoisson { young, poisson });
    let strain = 1e-6;
    let history = uniaxial_strain_history(&material, 3, &[strain]).unwrap();
    assert_scalar_eq!(history[0].axial_stress / strain, young, comp = abs, tol = 1.0);
    for &lateral in &history[0].lateral_strains {
        assert_scalar_eq!(lateral / strain, -poisson, comp = abs, tol = 1e-3);
    }
}

#[test]
fn uniaxial_neo_hookean_large_strain() {
    let material = NeoHookean::new(LameParameters { mu: 1.0, lambda: 10.0 });
    let strains: Vec<f64> = (1..=10).map(|i| 0.05 * i as f64).collect();
    let history = uniaxial_strain_history(&material, 3, &strains).unwrap();

    let mut previous_stress = 0.0;
    for point in &history {
        // Lateral contraction, symmetric in the lateral directions
        assert!(point.lateral_strains[0] < 0.0);
        assert_scalar_eq!(point.lateral_strains[0], point.lateral_strains[1], comp = abs, tol = 1e-10);
        assert!(point.axial_stress > previous_stress);
        previous_stress = point.axial_stress;
    }
}

#[test]
fn uniaxial_strain_history_propagates_material_failure() {
    let material = NeoHookean::new(LameParameters { mu: 1.0, lambda: 1.0 });
    assert!(uniaxial_strain_history(&material, 3, &[0.1, -1.5]).is_err());
    assert!(uniaxial_strain_history(&material, 0, &[0.1]).is_err());
}

#[test]
fn uniaxial_tension_with_time_dependent_parameters() {
    let material = ParameterizedLinearElasticity::new(YoungPoisson {
        young: 1.0,
        poisson: 0.25,
    });
    let delta_bulk = |t: f64| 1.0 + 3.0 * t;
    let delta_shear = |t: f64| 1.0 + t;
    let parameters: [&dyn Fn(f64) -> f64; 2] = [&delta_bulk, &delta_shear];
    let history = uniaxial_stress_test(&material, 3, 1.0, 10, (), |t| t, &parameters).unwrap();

    assert_eq!(history.len(), 10);
    let BulkShear { bulk, shear } = material.parameters;
    for (i, point) in history.iter().enumerate() {
        let t = 0.1 * (i + 1) as f64;
        assert_scalar_eq!(point.time, t, comp = abs, tol = 1e-14);
        assert_scalar_eq!(point.axial_strain, t, comp = abs, tol = 1e-14);

        let (k, g) = (bulk + delta_bulk(t), shear + delta_shear(t));
        let young = 9.0 * k * g / (3.0 * k + g);
        let poisson = (3.0 * k - 2.0 * g) / (2.0 * (3.0 * k + g));
        assert_scalar_eq!(point.axial_stress, young * t, comp = abs, tol = 1e-9);
        for &lateral in &point.lateral_strains {
            assert_scalar_eq!(lateral, -poisson * t, comp = abs, tol = 1e-10);
        }

        assert_eq!(point.displacement_gradient[(0, 0)], point.axial_strain);
        assert_eq!(point.stress[(0, 0)], point.axial_stress);
        for j in 1..3 {
            assert_scalar_eq!(point.stress[(j, j)], 0.0, comp = abs, tol = 1e-9);
        }
    }

    // The moduli grow in time, so the material stiffens
    assert!(history[9].axial_stress / history[9].axial_strain > history[0].axial_stress / history[0].axial_strain);
}

/// Linear elasticity that counts the evaluations committed to its state.
struct CountingElasticity(LinearElasticity);

impl StatefulStressModel for CountingElasticity {
    type State = usize;

    fn compute_stress_tensor_with_state(
        &self,
        displacement_gradient: &DualMatrix,
        state: &mut usize,
        _parameters: &[f64],
    ) -> Result<DualMatrix> {
        *state += 1;
        self.0.compute_stress_tensor(displacement_gradient)
    }
}

#[test]
fn uniaxial_stress_test_updates_state_once_per_step() {
    let material = CountingElasticity(LinearElasticity::new(YoungPoisson {
        young: 1e3,
        poisson: 0.3,
    }));
    let history = uniaxial_stress_test(&material, 3, 2.0, 4, 10, |t| 1e-3 * t, &[]).unwrap();

    let states: Vec<usize> = history.iter().map(|point| point.state).collect();
    assert_eq!(states, vec![11, 12, 13, 14]);
    let times: Vec<f64> = history.iter().map(|point| point.time).collect();
    assert_eq!(times, vec![0.5, 1.0, 1.5, 2.0]);
    for point in &history {
        assert_scalar_eq!(point.axial_stress, 1e3 * point.axial_strain, comp = abs, tol = 1e-9);
    }
}

#[test]
fn uniaxial_stress_test_rejects_invalid_loading() {
    let material = ParameterizedLinearElasticity::new(LameParameters { mu: 1.0, lambda: 1.0 });
    let zero = |_: f64| 0.0;
    let parameters: [&dyn Fn(f64) -> f64; 2] = [&zero, &zero];

    // Wrong number of parameters
    assert!(uniaxial_stress_test(&material, 3, 1.0, 2, (), |t| t, &parameters[..1]).is_err());
    assert!(uniaxial_stress_test(&material, 3, 0.0, 2, (), |t| t, &parameters).is_err());
    assert!(uniaxial_stress_test(&material, 3, 1.0, 0, (), |t| t, &parameters).is_err());
    assert!(uniaxial_stress_test(&material, 0, 1.0, 2, (), |t| t, &parameters).is_err());

    let history = uniaxial_stress_test(&material, 2, 1.0, 2, (), |t| t, &parameters).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].lateral_strains.len(), 1);
}
