// tests/resolve.rs

//! Resolution tests: dependency closure, cycles, conflicts, pins and
//! picked versions against local find-links.

mod common;

use common::{Sandbox, installer_with, make_egg, make_namespace_egg};
use eggsmith::{Error, InstallerConfig, PatchDirectives, VersionPins};
use mockito::{Matcher, Server};

fn keys(installation: &eggsmith::Installation) -> Vec<String> {
    let mut keys: Vec<String> = installation
        .working_set
        .iter()
        .map(|d| format!("{} {}", d.key(), d.version()))
        .collect();
    keys.sort();
    keys
}

#[test]
fn test_installs_dependency_closure() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["lib>=1.0"]);
    make_egg(&sandbox.links, "lib", "1.2", &[]);

    let installation = sandbox
        .installer()
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["app 1.0", "lib 1.2"]);
    assert_eq!(
        sandbox.installed(),
        vec!["app-1.0-py3.11.egg", "lib-1.2-py3.11.egg"]
    );
}

#[test]
fn test_two_node_cycle_terminates() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "alpha", "1.0", &["beta"]);
    make_egg(&sandbox.links, "beta", "1.0", &["alpha"]);

    let installation = sandbox
        .installer()
        .install(&["alpha"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["alpha 1.0", "beta 1.0"]);
}

#[test]
fn test_three_node_cycle_terminates() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "alpha", "1.0", &["beta"]);
    make_egg(&sandbox.links, "beta", "1.0", &["gamma"]);
    make_egg(&sandbox.links, "gamma", "1.0", &["alpha>=1.0"]);

    let installation = sandbox
        .installer()
        .install(&["alpha"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["alpha 1.0", "beta 1.0", "gamma 1.0"]);
}

#[test]
fn test_conflict_names_both_culprits() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["pkg==1.0", "lib"]);
    make_egg(&sandbox.links, "lib", "1.0", &["pkg>=2.0"]);
    make_egg(&sandbox.links, "pkg", "1.0", &[]);
    make_egg(&sandbox.links, "pkg", "2.0", &[]);

    let err = sandbox
        .installer()
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap_err();
    match err {
        Error::VersionConflict(conflict) => {
            let message = conflict.to_string();
            assert!(message.contains("We already have: pkg 1.0"), "{message}");
            assert!(message.contains("but lib 1.0 requires 'pkg>=2.0'."), "{message}");
        }
        other => panic!("expected a version conflict, got {other}"),
    }
}

#[test]
fn test_prefer_final_skips_prereleases() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "pkg", "1.0", &[]);
    make_egg(&sandbox.links, "pkg", "2.0b1", &[]);

    let installation = sandbox
        .installer()
        .install(&["pkg"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["pkg 1.0"]);

    let other = Sandbox::new();
    make_egg(&other.links, "pkg", "1.0", &[]);
    make_egg(&other.links, "pkg", "2.0b1", &[]);
    let installation = installer_with(other.config().with_prefer_final(false))
        .install(&["pkg"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["pkg 2.0b1"]);
}

#[test]
fn test_second_run_is_idempotent() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["lib"]);
    make_egg(&sandbox.links, "lib", "1.0", &[]);

    let first = sandbox
        .installer()
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    let installed = sandbox.installed();

    let second = sandbox
        .installer()
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&first), keys(&second));
    assert_eq!(sandbox.installed(), installed);
    assert!(second.working_set.iter().all(|d| d.is_in_directory(&sandbox.dest)));
}

#[test]
fn test_local_exact_pin_never_probes_index() {
    let mut server = Server::new();
    let probe = server.mock("GET", Matcher::Any).expect(0).create();

    let sandbox = Sandbox::new();
    make_egg(&sandbox.dest, "foo", "1.0", &[]);
    let config = sandbox.config().with_links(Vec::<String>::new()).with_index(server.url());

    let installation = installer_with(config)
        .install(&["foo==1.0"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["foo 1.0"]);
    assert!(installation.picked.is_empty());
    probe.assert();
}

#[test]
fn test_versions_pin_applies_to_dependencies() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["lib"]);
    make_egg(&sandbox.links, "lib", "1.0", &[]);
    make_egg(&sandbox.links, "lib", "2.0", &[]);

    let config = sandbox
        .config()
        .with_versions(VersionPins::from_iter([("lib", "1.0")]));
    let installation = installer_with(config)
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["app 1.0", "lib 1.0"]);
    assert_eq!(installation.picked.get("app"), Some("1.0"));
    assert_eq!(installation.picked.get("lib"), None);
}

#[test]
fn test_incompatible_pin_is_reported() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["lib>=2.0"]);
    make_egg(&sandbox.links, "lib", "1.0", &[]);

    let config = sandbox
        .config()
        .with_versions(VersionPins::from_iter([("lib", "1.0")]));
    let err = installer_with(config)
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap_err();
    match err {
        Error::IncompatibleConstraint { provenance, .. } => {
            assert!(provenance.iter().any(|l| l == "[versions] constraint on lib: 1.0"));
            assert!(provenance.iter().any(|l| l.contains("Requirement of app: lib>=2.0")));
        }
        other => panic!("expected an incompatible constraint, got {other}"),
    }
}

#[test]
fn test_picked_versions_forbidden() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "foo", "1.0", &[]);

    let config = InstallerConfig {
        allow_picked_versions: false,
        ..sandbox.config()
    };
    let err = installer_with(config)
        .install(&["foo"], None, &PatchDirectives::default())
        .unwrap_err();
    assert!(matches!(&err, Error::UserError(msg) if msg == "Picked: foo = 1.0"), "{err}");
}

#[test]
fn test_offline_without_local_dist() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "foo", "1.0", &[]);

    let config = InstallerConfig {
        dest: None,
        ..sandbox.config()
    };
    let err = installer_with(config)
        .install(&["foo"], None, &PatchDirectives::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "We don't have a distribution for foo\nand can't install one in offline (no-install) mode.\n"
    );
}

#[test]
fn test_missing_distribution() {
    let sandbox = Sandbox::new();
    let err = sandbox
        .installer()
        .install(&["nothere"], None, &PatchDirectives::default())
        .unwrap_err();
    assert!(matches!(err, Error::MissingDistribution(_)));
    assert_eq!(err.to_string(), "Couldn't find a distribution for 'nothere'.");
}

#[test]
fn test_namespace_package_pulls_in_setuptools() {
    let sandbox = Sandbox::new();
    make_namespace_egg(&sandbox.links, "ns.pkg", "1.0");
    make_egg(&sandbox.links, "setuptools", "69.0", &[]);

    let installation = sandbox
        .installer()
        .install(&["ns.pkg"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["ns.pkg 1.0", "setuptools 69.0"]);
}

#[test]
fn test_dependency_links_extend_find_links() {
    let sandbox = Sandbox::new();
    let extra = sandbox.root.path().join("extra");
    std::fs::create_dir_all(&extra).unwrap();
    let app = make_egg(&sandbox.links, "app", "1.0", &["lib"]);
    std::fs::write(
        app.join("EGG-INFO/dependency_links.txt"),
        format!("{}\n", extra.display()),
    )
    .unwrap();
    make_egg(&extra, "lib", "3.0", &[]);

    let mut installer = sandbox.installer();
    let installation = installer
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["app 1.0", "lib 3.0"]);
    assert!(installer.links().contains(&extra.display().to_string()));
}

#[test]
fn test_develop_egg_wins() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "foo", "2.0", &[]);
    let src = sandbox.root.path().join("src");
    std::fs::create_dir_all(src.join("foo.egg-info")).unwrap();
    std::fs::write(src.join("foo.egg-info/PKG-INFO"), "Name: foo\nVersion: 1.0\n").unwrap();
    std::fs::write(sandbox.dest.join("foo.egg-link"), format!("{}\n.", src.display())).unwrap();

    let installation = sandbox
        .installer()
        .install(&["foo"], None, &PatchDirectives::default())
        .unwrap();
    let foo = installation.working_set.get("foo").unwrap();
    assert_eq!(foo.precedence, eggsmith::Precedence::Develop);
    assert!(installation.picked.is_empty());
}

#[test]
fn test_required_by_recorded_under_project() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["Foo_Bar>=1"]);
    make_egg(&sandbox.links, "Foo_Bar", "1.0", &[]);

    let config = InstallerConfig {
        store_required_by: true,
        ..sandbox.config()
    };
    let installation = installer_with(config)
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    assert_eq!(keys(&installation), vec!["app 1.0", "foo-bar 1.0"]);

    let picked = &installation.picked;
    assert_eq!(picked.get("Foo-Bar"), Some("1.0"));
    let dependents = picked.required_by("Foo-Bar").unwrap();
    assert_eq!(dependents.iter().collect::<Vec<_>>(), vec!["app==1.0"]);
    assert!(
        picked
            .to_versions_section()
            .contains("\n# Required by:\n# app==1.0\nFoo-Bar = 1.0\n")
    );
}
