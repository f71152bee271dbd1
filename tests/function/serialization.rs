//! Round trips through the text form.

use approx::assert_relative_eq;
use compfit::function::{parse_string, CompositeFunction, Function};
use compfit::models::{Constant, Gaussian, Linear};
use compfit::parameters::Bounds;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::{random_leaf, values};

/// Perturb every active parameter, re-apply ties and compare all values.
fn assert_ties_agree(a: &mut dyn Function, b: &mut dyn Function) {
    for k in 0..a.n_active() {
        let index = a.index_of_active(k).unwrap();
        let value = 0.5 + k as f64;
        a.set_parameter(index, value).unwrap();
        b.set_parameter(index, value).unwrap();
    }
    a.apply_ties().unwrap();
    b.apply_ties().unwrap();
    for (x, y) in values(a).iter().zip(values(b).iter()) {
        assert_relative_eq!(x, y, epsilon = 1e-12);
    }
}

#[test]
fn random_composites_round_trip() {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    for _ in 0..20 {
        let mut composite = CompositeFunction::new();
        let n = rng.gen_range(2..6);
        for _ in 0..n {
            composite.add_function(random_leaf(&mut rng));
        }
        // Tie the first parameter of the last child to the first parameter.
        let last = composite.param_offset(n - 1).unwrap();
        let target = composite.parameter_name(last).unwrap();
        let source = composite.parameter_name(0).unwrap();
        composite.tie(&target, &format!("2*{}+1", source)).unwrap();
        if rng.gen_bool(0.5) {
            composite.fix(&composite.parameter_name(1).unwrap()).unwrap();
        }

        let text = composite.as_string().unwrap();
        let mut parsed = parse_string(&text).unwrap();
        assert_eq!(parsed.n_params(), composite.n_params());
        assert_eq!(parsed.n_active(), composite.n_active());
        assert_eq!(values(parsed.as_ref()), values(&composite));
        assert_eq!(parsed.as_string().unwrap(), text);
        assert_ties_agree(&mut composite, parsed.as_mut());
    }
}

#[test]
fn nested_tree_with_ties_and_constraints() {
    let mut background = CompositeFunction::product();
    background.add_function(Box::new(Constant::new(2.0)));
    background.add_function(Box::new(Linear::new(1.0, 0.5)));

    let mut root = CompositeFunction::new();
    root.add_function(Box::new(background));
    root.add_function(Box::new(Gaussian::new(3.0, 0.0, 0.2)));
    root.add_function(Box::new(Gaussian::new(1.0, 1.0, 0.2)));
    root.tie("f2.Sigma", "f1.Sigma").unwrap();
    root.tie("f2.Height", "f1.Height/3").unwrap();
    root.fix("f0.f0.A0").unwrap();
    root.add_constraint("f1.Sigma", Bounds::new(0.01, 1.0).unwrap())
        .unwrap();

    let text = root.as_string().unwrap();
    assert!(text.starts_with("(composite=ProductFunction;"));
    assert!(text.ends_with("ties=(f2.Sigma=f1.Sigma,f2.Height=f1.Height/3)"));

    let mut parsed = parse_string(&text).unwrap();
    assert_eq!(parsed.n_params(), 9);
    assert_eq!(parsed.n_active(), 6);
    assert!(parsed.is_fixed("f0.f0.A0").unwrap());
    let sigma = parsed.parameter_index("f1.Sigma").unwrap();
    assert_eq!(parsed.bounds(sigma).unwrap(), Some(Bounds::new(0.01, 1.0).unwrap()));
    assert_ties_agree(&mut root, parsed.as_mut());
}

#[test]
fn literal_ties_in_the_ties_clause_become_fixes() {
    let parsed = parse_string("name=Linear,A0=1,A1=2;name=Constant,A0=4;ties=(f1.A0=3)").unwrap();
    assert!(parsed.is_fixed("f1.A0").unwrap());
    assert_eq!(parsed.n_active(), 2);
    let text = parsed.as_string().unwrap();
    assert!(!text.contains("ties=(f1.A0"));
}

#[test]
fn constant_tie_read_by_an_earlier_tie_keeps_its_place() {
    let mut original = CompositeFunction::new();
    original.add_function(Box::new(Linear::new(1.0, 1.0)));
    original.add_function(Box::new(Linear::new(0.0, 0.0)));
    original.tie("f0.A0", "2*f0.A1").unwrap();
    original.tie("f0.A1", "77").unwrap();

    let text = original.as_string().unwrap();
    assert_eq!(
        text,
        "name=Linear,A0=1,A1=1;name=Linear,A0=0,A1=0;ties=(f0.A0=2*f0.A1,f0.A1=77)"
    );

    let mut parsed = parse_string(&text).unwrap();
    original.apply_ties().unwrap();
    parsed.apply_ties().unwrap();
    // The first tie reads A1 before it is set to 77.
    assert_eq!(original.get_parameter_by_name("f0.A0").unwrap(), 2.0);
    assert_eq!(values(parsed.as_ref()), values(&original));
    assert_eq!(parsed.as_string().unwrap(), text);
}

#[test]
fn constant_tie_read_by_a_nested_composite_stays_outside() {
    let mut inner = CompositeFunction::new();
    inner.add_function(Box::new(Linear::new(1.0, 3.0)));
    inner.add_function(Box::new(Constant::new(0.0)));
    inner.tie("f1.A0", "f0.A1+1").unwrap();

    let mut original = CompositeFunction::new();
    original.add_function(Box::new(inner));
    original.add_function(Box::new(Constant::new(5.0)));
    original.tie("f0.f0.A1", "10").unwrap();

    let text = original.as_string().unwrap();
    assert!(text.ends_with("ties=(f0.f0.A1=10)"));

    let mut parsed = parse_string(&text).unwrap();
    original.apply_ties().unwrap();
    parsed.apply_ties().unwrap();
    // Children first: the nested tie still sees A1 = 3.
    assert_eq!(original.get_parameter_by_name("f0.f1.A0").unwrap(), 4.0);
    assert_eq!(values(parsed.as_ref()), values(&original));
}
