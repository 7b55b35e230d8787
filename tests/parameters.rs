//! Registry clamp law and the control-surface parameter API.

mod common;

use approx::assert_relative_eq;
use proptest::prelude::*;
use sampler_core::{Error, ParamSpec, ParameterRegistry, SAMPLER_PARAMETERS, Unit};

proptest! {
    #[test]
    fn set_then_get_is_clamped(
        spec in prop::sample::select(SAMPLER_PARAMETERS.to_vec()),
        value in -100_000.0f32..100_000.0,
    ) {
        let registry = ParameterRegistry::sampler().unwrap();
        let stored = registry.set(spec.key, value).unwrap();
        let expected = value.clamp(spec.min, spec.max);
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(registry.get(spec.key), Some(expected));
    }

    #[test]
    fn address_and_key_access_agree(
        index in 0usize..SAMPLER_PARAMETERS.len(),
        value in -10.0f32..30_000.0,
    ) {
        let registry = ParameterRegistry::sampler().unwrap();
        let key = SAMPLER_PARAMETERS[index].key;
        let address = registry.address_of(key).unwrap();
        prop_assert_eq!(address.index(), index);
        registry.set_by_address(address, value);
        prop_assert_eq!(registry.get(key), Some(registry.get_by_address(address)));
    }
}

#[test]
fn cutoff_above_range_reads_back_as_maximum() {
    let (_instrument, surface) = common::sampler();
    surface.set_parameter("filterCutoff", 25_000.0);
    assert_eq!(surface.get_parameter("filterCutoff"), Some(20_000.0));
}

#[test]
fn nan_write_stores_minimum() {
    let registry = ParameterRegistry::sampler().unwrap();
    assert_eq!(registry.set("stereoWidth", f32::NAN), Some(0.0));
}

#[test]
fn duplicate_key_fails_construction() {
    let mut table = SAMPLER_PARAMETERS.to_vec();
    table.push(ParamSpec::new("drive", "Drive Again", 0.0, 1.0, 0.0, Unit::Generic));
    assert_eq!(
        ParameterRegistry::from_table(&table).unwrap_err(),
        Error::DuplicateParameter("drive".into())
    );
}

#[test]
fn defaults_restored() {
    let registry = ParameterRegistry::sampler().unwrap();
    registry.set("masterVolume", 0.1);
    registry.set("envSustain", 0.05);
    registry.reset_to_defaults();
    assert_relative_eq!(registry.get("masterVolume").unwrap(), 0.8);
    assert_relative_eq!(registry.get("envSustain").unwrap(), 0.7);
}

#[test]
fn display_formats() {
    let registry = ParameterRegistry::sampler().unwrap();
    assert_eq!(registry.display_string("filterType", 1.0).as_deref(), Some("BP"));
    assert_eq!(registry.display_string("envDecayCurve", 3.0).as_deref(), Some("S-Curve"));
    assert_eq!(registry.display_string("filterEnabled", 0.2).as_deref(), Some("Off"));
    assert_eq!(registry.display_string("envAttack", 0.126).as_deref(), Some("0.13"));
    assert_eq!(registry.display_string("unknown", 1.0), None);
}
