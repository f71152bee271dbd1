//! Tie evaluation order, dangling ties and ties across replacement.

use approx::assert_relative_eq;
use compfit::function::{CompositeFunction, Function};
use compfit::models::{Constant, Gaussian, Linear};
use compfit::CompFitError;

fn two_lines() -> CompositeFunction {
    let mut composite = CompositeFunction::new();
    composite.add_function(Box::new(Linear::new(1.0, 1.0)));
    composite.add_function(Box::new(Linear::new(0.0, 0.0)));
    composite
}

#[test]
fn ties_in_dependency_order() {
    let mut composite = two_lines();
    composite.tie("f0.A1", "77").unwrap();
    composite.tie("f0.A0", "2*f0.A1").unwrap();
    composite.tie("f1.A0", "f0.A0+1").unwrap();
    composite.apply_ties().unwrap();

    assert_eq!(composite.get_parameter_by_name("f0.A1").unwrap(), 77.0);
    assert_eq!(composite.get_parameter_by_name("f0.A0").unwrap(), 154.0);
    assert_eq!(composite.get_parameter_by_name("f1.A0").unwrap(), 155.0);
    assert_eq!(composite.n_active(), 1);
}

#[test]
fn ties_in_wrong_order_read_stale_values() {
    let mut composite = two_lines();
    composite.tie("f0.A0", "2*f0.A1").unwrap();
    composite.tie("f0.A1", "77").unwrap();
    composite.apply_ties().unwrap();

    // A0 was computed from the value of A1 before its own tie ran.
    assert_eq!(composite.get_parameter_by_name("f0.A0").unwrap(), 2.0);
    assert_eq!(composite.get_parameter_by_name("f0.A1").unwrap(), 77.0);

    // A second pass sees the updated value.
    composite.apply_ties().unwrap();
    assert_eq!(composite.get_parameter_by_name("f0.A0").unwrap(), 154.0);
}

#[test]
fn tie_to_unknown_parameter_is_rejected_eagerly() {
    let mut composite = two_lines();
    assert!(matches!(
        composite.tie("f0.A0", "f2.A0*3"),
        Err(CompFitError::InvalidArgument(_))
    ));
    assert!(matches!(
        composite.tie("f5.A0", "1"),
        Err(CompFitError::InvalidArgument(_))
    ));
    assert!(composite.tie("f0.A0", "2*").is_err());
    assert_eq!(composite.n_active(), 4);
}

#[test]
fn removed_reference_dangles_until_applied() {
    let mut composite = two_lines();
    composite.add_function(Box::new(Constant::new(5.0)));
    composite.tie("f0.A0", "f2.A0/5").unwrap();
    composite.remove_function(2).unwrap();

    // The target survives, so the tie is kept but cannot be evaluated.
    assert!(composite.is_tied(0).unwrap());
    match composite.apply_ties() {
        Err(CompFitError::DanglingTie { lhs }) => assert_eq!(lhs, "f0.A0"),
        other => panic!("expected a dangling tie, got {:?}", other),
    }
}

#[test]
fn same_shape_replacement_preserves_other_ties() {
    let mut composite = CompositeFunction::new();
    composite.add_function(Box::new(Gaussian::new(1.0, 0.0, 0.5)));
    composite.add_function(Box::new(Gaussian::new(2.0, 1.0, 0.5)));
    composite.add_function(Box::new(Linear::new(0.1, 0.0)));
    composite.tie("f1.Sigma", "f0.Sigma").unwrap();
    composite.tie("f2.A1", "0").unwrap();

    composite
        .replace_function(2, Box::new(Linear::new(0.3, 9.0)))
        .unwrap();
    composite
        .replace_function(0, Box::new(Gaussian::new(1.0, 0.0, 0.25)))
        .unwrap();

    assert_eq!(composite.ties().len(), 2);
    assert!(composite.is_tied(5).unwrap());
    assert!(composite.is_tied(7).unwrap());
    composite.apply_ties().unwrap();
    assert_relative_eq!(composite.get_parameter_by_name("f1.Sigma").unwrap(), 0.25);
    assert_eq!(composite.get_parameter_by_name("f2.A1").unwrap(), 0.0);
    assert_eq!(composite.get_parameter_by_name("f2.A0").unwrap(), 0.3);
}

#[test]
fn replacement_without_the_target_drops_the_tie() {
    let mut composite = two_lines();
    composite.tie("f1.A1", "f0.A1*2").unwrap();
    composite
        .replace_function(1, Box::new(Constant::new(0.0)))
        .unwrap();
    assert!(composite.ties().is_empty());
    assert_eq!(composite.n_active(), 3);
}

#[test]
fn nested_ties_run_before_the_parent_ties() {
    let mut inner = CompositeFunction::new();
    inner.add_function(Box::new(Linear::new(1.0, 5.0)));
    inner.add_function(Box::new(Constant::new(0.0)));
    inner.tie("f1.A0", "f0.A0+f0.A1").unwrap();

    let mut root = CompositeFunction::new();
    root.add_function(Box::new(Constant::new(4.0)));
    root.add_function(Box::new(inner));
    root.tie("f1.f0.A1", "f0.A0/2").unwrap();

    assert_eq!(root.parameter_name(3).unwrap(), "f1.f1.A0");
    assert_eq!(root.n_active(), 2);

    root.apply_ties().unwrap();
    assert_eq!(root.get_parameter_by_name("f1.f0.A1").unwrap(), 2.0);
    // The inner tie ran first and saw the old A1.
    assert_eq!(root.get_parameter_by_name("f1.f1.A0").unwrap(), 6.0);

    root.apply_ties().unwrap();
    assert_eq!(root.get_parameter_by_name("f1.f1.A0").unwrap(), 3.0);
}
