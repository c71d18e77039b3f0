use std::path::PathBuf;

use cms_e2e::scenarios::{self, Credentials};
use cms_e2e::spec::{LoadState, Scenario, Step, WaitState};
use cms_e2e::E2eError;

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

#[test]
fn bundled_specs_load_sorted_by_name() {
    let specs = Scenario::load_all(&specs_dir()).unwrap();
    let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["about_layout", "accommodations"]);

    let about = &specs[0];
    assert_eq!(
        about.steps[1],
        Step::WaitFor {
            selector: "#content-container".to_string(),
            state: WaitState::Visible,
        }
    );
    assert!(matches!(
        specs[1].steps[0],
        Step::Navigate { wait_until: LoadState::NetworkIdle, .. }
    ));
}

#[test]
fn bundled_specs_do_not_shadow_builtins() {
    let builtin = scenarios::builtin(&Credentials::default());
    for spec in Scenario::load_all(&specs_dir()).unwrap() {
        assert!(
            builtin.iter().all(|b| b.name != spec.name),
            "{} shadows a built-in scenario",
            spec.name
        );
    }
}

#[test]
fn invalid_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "name: broken\nsteps:\n  - action: teleport\n").unwrap();

    let err = Scenario::load_all(dir.path()).unwrap_err();
    assert!(err.to_string().contains("broken.yaml"), "{}", err);
}

#[test]
fn missing_specs_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-specs");

    let err = Scenario::load_all(&missing).unwrap_err();
    assert!(matches!(err, E2eError::SpecParse(_)), "{}", err);
    assert!(err.to_string().contains("no-such-specs"), "{}", err);
}

#[test]
fn empty_specs_directory_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Scenario::load_all(dir.path()).unwrap().is_empty());
}

#[test]
fn every_builtin_scenario_ends_with_a_screenshot() {
    for scenario in scenarios::builtin(&Credentials::default()) {
        assert!(
            matches!(scenario.steps.last(), Some(Step::Screenshot { full_page: true, .. })),
            "{} does not end with a full-page capture",
            scenario.name
        );
    }
}

#[test]
fn authenticated_scenarios_sign_in_before_interacting() {
    let creds = Credentials::default();
    for scenario in [
        scenarios::content_save(&creds),
        scenarios::parallax(&creds),
        scenarios::logout(&creds),
        scenarios::button_links(&creds),
        scenarios::accommodation_buttons(&creds),
    ] {
        let wait = scenario
            .steps
            .iter()
            .position(|s| matches!(s, Step::WaitForUrl { url } if url == scenarios::ADMIN_PATH))
            .unwrap_or_else(|| panic!("{} never waits for the admin page", scenario.name));
        let first_edit = scenario
            .steps
            .iter()
            .position(|s| {
                matches!(s, Step::Fill { selector, .. } if selector != "#username" && selector != "#password")
                    || matches!(s, Step::Check { .. })
            });
        if let Some(edit) = first_edit {
            assert!(wait < edit, "{} edits content before signing in", scenario.name);
        }
    }
}
