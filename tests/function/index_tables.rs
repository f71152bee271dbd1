//! Index bookkeeping under random structural edits.

use compfit::function::{CompositeFunction, Function};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::random_leaf;

fn check_tables(composite: &CompositeFunction) {
    let n_params = composite.n_params();
    let from_children: usize = (0..composite.n_functions())
        .map(|i| composite.get_function(i).unwrap().n_params())
        .sum();
    assert_eq!(from_children, n_params);

    for index in 0..n_params {
        let (child, local) = composite.local_index(index).unwrap();
        assert_eq!(composite.param_offset(child).unwrap() + local, index);
        assert!(local < composite.get_function(child).unwrap().n_params());

        let name = composite.parameter_name(index).unwrap();
        assert!(name.starts_with(&format!("f{}.", child)));
        assert_eq!(composite.parameter_index(&name).unwrap(), index);
    }
    assert!(composite.parameter_name(n_params).is_err());
}

fn check_active(composite: &CompositeFunction) {
    let n_params = composite.n_params();
    let tied = (0..n_params)
        .filter(|&i| composite.is_tied(i).unwrap())
        .count();
    assert_eq!(composite.n_active() + tied, n_params);

    for index in 0..n_params {
        let active = composite.active_index(index).unwrap();
        assert_eq!(composite.is_active(index).unwrap(), active.is_some());
        if let Some(k) = active {
            assert_eq!(composite.index_of_active(k).unwrap(), index);
        }
    }
}

#[test]
fn random_add_remove_replace_keeps_tables_consistent() {
    for seed in 0..8 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut composite = CompositeFunction::new();

        for _ in 0..60 {
            let n = composite.n_functions();
            match rng.gen_range(0..4) {
                0 | 1 => {
                    composite.add_function(random_leaf(&mut rng));
                }
                2 if n > 0 => {
                    composite.remove_function(rng.gen_range(0..n)).unwrap();
                }
                3 if n > 0 => {
                    let i = rng.gen_range(0..n);
                    composite.replace_function(i, random_leaf(&mut rng)).unwrap();
                }
                _ => {}
            }
            check_tables(&composite);
            check_active(&composite);
        }
    }
}

#[test]
fn random_fixes_partition_the_parameters() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut composite = CompositeFunction::new();
    for _ in 0..6 {
        composite.add_function(random_leaf(&mut rng));
    }

    for _ in 0..40 {
        let index = rng.gen_range(0..composite.n_params());
        let name = composite.parameter_name(index).unwrap();
        if rng.gen_bool(0.6) {
            composite.fix(&name).unwrap();
            assert!(composite.is_fixed(&name).unwrap());
        } else {
            composite.remove_tie(&name).unwrap();
            assert!(composite.is_active(index).unwrap());
        }
        check_active(&composite);
    }

    // Removing a child drops the ties on its parameters with it.
    while composite.n_functions() > 0 {
        composite.remove_function(0).unwrap();
        check_tables(&composite);
        check_active(&composite);
        assert!(composite.ties().len() <= composite.n_params());
    }
}

#[test]
fn replacement_shifts_later_indices_by_the_size_difference() {
    use compfit::models::{Constant, Gaussian, Linear};

    let mut composite = CompositeFunction::new();
    composite.add_function(Box::new(Linear::new(1.0, 2.0)));
    composite.add_function(Box::new(Constant::new(3.0)));
    composite.add_function(Box::new(Gaussian::new(4.0, 5.0, 6.0)));
    assert_eq!(composite.parameter_index("f2.Height").unwrap(), 3);

    composite
        .replace_function(1, Box::new(Linear::new(0.0, 0.0)))
        .unwrap();
    assert_eq!(composite.parameter_index("f2.Height").unwrap(), 4);
    assert_eq!(composite.get_parameter(4).unwrap(), 4.0);
    assert_eq!(composite.param_offset(2).unwrap(), 4);

    composite
        .replace_function(0, Box::new(Constant::new(0.0)))
        .unwrap();
    assert_eq!(composite.parameter_index("f2.Height").unwrap(), 3);
    assert_eq!(composite.get_parameter(3).unwrap(), 4.0);
}

#[test]
fn out_of_range_access_is_reported() {
    use compfit::models::Linear;
    use compfit::CompFitError;

    let mut composite = CompositeFunction::new();
    composite.add_function(Box::new(Linear::new(1.0, 2.0)));
    assert!(matches!(
        composite.get_parameter(2),
        Err(CompFitError::IndexOutOfBounds { index: 2, len: 2 })
    ));
    assert!(composite.set_parameter(5, 0.0).is_err());
    assert!(composite.remove_function(1).is_err());
    assert!(matches!(
        composite.parameter_index("f0.B"),
        Err(CompFitError::InvalidArgument(_))
    ));
    assert!(composite.parameter_index("f3.A0").is_err());
}
