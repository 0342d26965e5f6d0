//! Test to verify test infrastructure works correctly

mod common;

use common::builders::ScopeConfigBuilder;
use common::scope_helpers::create_test_scope;

#[test]
fn test_infrastructure_setup() {
    let config = ScopeConfigBuilder::new().channel("test:pv").capacity(8).build();
    let scope = create_test_scope(config);

    assert_eq!(scope.engine.channels().len(), 1);
    assert!(scope.engine.registry().contains("test:pv"));
    assert_eq!(scope.engine.registry().capacity(), 8);
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}
