//! The seed probe fleet shipped under `probes/` must stay loadable and
//! correctly gated. These tests read the real files, not fixtures.

use std::path::PathBuf;

use webcompat::prelude::*;

fn seed_registry() -> ProbeRegistry {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../probes");
    ProbeRegistry::load(&root).expect("seed probes must parse")
}

fn probe<'a>(registry: &'a ProbeRegistry, id: &str) -> &'a Probe {
    registry
        .get(id)
        .unwrap_or_else(|| panic!("seed probe `{id}` missing"))
}

// ============================================================================
// Fleet shape
// ============================================================================

#[test]
fn seed_fleet_loads_sorted_by_id() {
    let registry = seed_registry();
    let ids: Vec<_> = registry
        .probes()
        .iter()
        .map(|p| p.metadata.id.as_str())
        .collect();
    assert_eq!(
        ids,
        vec![
            "1448747_118757_discountcoffee",
            "1577519_stream_directv_com",
            "1610026_mobilesuica",
            "1886285_188628515_windowscentral_com",
            "1909448_fire_honeywell",
            "1928954_publix",
        ]
    );
}

#[test]
fn every_seed_names_its_bug() {
    let registry = seed_registry();
    for probe in registry.probes() {
        assert!(
            probe.metadata.bug.is_some(),
            "{} has no bug number",
            probe.metadata.id
        );
        assert!(probe.metadata.url.starts_with("https://"));
    }
}

// ============================================================================
// Individual seeds
// ============================================================================

#[test]
fn mobilesuica_races_login_form_against_interstitial() {
    let registry = seed_registry();
    let suica = probe(&registry, "1610026_mobilesuica");

    assert_eq!(suica.metadata.bug, Some(1_610_026));
    assert_eq!(suica.metadata.timeout_secs, Some(90));

    let disabled = suica.disabled.as_ref().unwrap();
    let Step::AwaitFirstOf {
        locators, on_match, ..
    } = &disabled[1]
    else {
        panic!("expected an await_first_of race on the disabled side");
    };
    assert_eq!(locators.len(), 2);
    assert_eq!(on_match.len(), 1);
    assert_eq!(on_match[0].index, 1);
    assert!(matches!(on_match[0].then, ArmAction::Fail { .. }));
}

#[test]
fn honeywell_is_single_sided() {
    let registry = seed_registry();
    let honeywell = probe(&registry, "1909448_fire_honeywell");

    assert!(honeywell.enabled.is_none());
    assert!(honeywell.regression.is_none());
    // A lone body serves both sides.
    assert_eq!(honeywell.enabled_steps(), honeywell.disabled_steps(142));
}

#[test]
fn publix_regression_swaps_the_disabled_body_at_140() {
    let registry = seed_registry();
    let publix = probe(&registry, "1928954_publix");

    let regression = publix.regression.as_ref().unwrap();
    assert_eq!(regression.min_version, Some(140));

    // Below the bound the race body runs; from 140 the plain await does.
    assert!(matches!(
        publix.disabled_steps(139)[1],
        Step::AwaitFirstOf { .. }
    ));
    assert!(matches!(publix.disabled_steps(140)[1], Step::AwaitCss { .. }));
    assert!(matches!(publix.disabled_steps(141)[1], Step::AwaitCss { .. }));
    assert_eq!(publix.enabled_steps().len(), 2);
}

#[test]
fn discountcoffee_only_runs_on_android() {
    let registry = seed_registry();
    let coffee = probe(&registry, "1448747_118757_discountcoffee");
    assert_eq!(coffee.metadata.only_platforms, vec![Platform::Android]);

    let linux = EnvironmentProfile::new(Platform::Linux, 142);
    let decision = CapabilityMatcher::new(&linux).evaluate(&coffee.metadata);
    assert!(matches!(decision, MatchDecision::Skip(_)));

    let android = EnvironmentProfile::new(Platform::Android, 142);
    assert!(CapabilityMatcher::new(&android)
        .evaluate(&coffee.metadata)
        .is_runnable());
}

#[test]
fn directv_arms_raise_a_region_skip() {
    let registry = seed_registry();
    let directv = probe(&registry, "1577519_stream_directv_com");

    for steps in [
        directv.enabled.as_ref().unwrap(),
        directv.disabled.as_ref().unwrap(),
    ] {
        let Step::AwaitFirstOf { on_match, .. } = &steps[1] else {
            panic!("expected an await_first_of race");
        };
        assert!(
            on_match
                .iter()
                .any(|arm| matches!(arm.then, ArmAction::SkipRegion { .. })),
            "no region-skip arm"
        );
    }
}

#[test]
fn windowscentral_needs_layout_scrollbars() {
    let registry = seed_registry();
    let wc = probe(&registry, "1886285_188628515_windowscentral_com");
    assert_eq!(wc.metadata.requires, vec![Capability::VisibleScrollbars]);

    let overlay = EnvironmentProfile::new(Platform::Linux, 142).with_visible_scrollbars(false);
    let decision = CapabilityMatcher::new(&overlay).evaluate(&wc.metadata);
    assert!(matches!(decision, MatchDecision::Skip(_)));

    // Desktop profiles default to classic scrollbars.
    let classic = EnvironmentProfile::new(Platform::Linux, 142);
    assert!(CapabilityMatcher::new(&classic)
        .evaluate(&wc.metadata)
        .is_runnable());
}

#[test]
fn both_trending_bodies_toggle_only_the_phrasing_flag() {
    let registry = seed_registry();
    let wc = probe(&registry, "1886285_188628515_windowscentral_com");

    let Step::TestTrendingScrollbar { should_fail } = wc.enabled.as_ref().unwrap()[1] else {
        panic!("expected the trending check on the enabled side");
    };
    assert!(!should_fail);
    let Step::TestTrendingScrollbar { should_fail } = wc.disabled.as_ref().unwrap()[1] else {
        panic!("expected the trending check on the disabled side");
    };
    assert!(should_fail);
}
