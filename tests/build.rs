// tests/build.rs

//! Source builds: sdists turned into eggs, patches, failures and develop
//! installs, with the setup step replaced by a test double.

mod common;

use common::{FakeSetup, NoopRecompiler, Sandbox, make_egg, make_sdist};
use eggsmith::{BuildExt, Error, Installer, InstallerConfig, PatchDirectives, PatchSet};
use std::fs;

fn installer(config: InstallerConfig, setup: FakeSetup) -> Installer {
    Installer::new(config)
        .unwrap()
        .with_setup_runner(Box::new(setup))
        .with_recompiler(Box::new(NoopRecompiler))
}

#[test]
fn test_sdist_is_built_into_dest() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");
    let setup = FakeSetup::default();

    let built = installer(sandbox.config(), setup.clone())
        .build("foo", &BuildExt::new(), &PatchDirectives::default())
        .unwrap();
    assert_eq!(built, vec![sandbox.dest.join("foo-1.0-py3.11.egg")]);
    assert_eq!(sandbox.installed(), vec!["foo-1.0-py3.11.egg"]);

    let calls = setup.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].setup_dir.ends_with("foo-1.0"));
    assert!(calls[0].setup_cfg.is_none());
}

#[test]
fn test_build_ext_options_reach_setup_cfg() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");
    let setup = FakeSetup::default();
    let base = sandbox.root.path().to_path_buf();
    let build_ext = BuildExt::new()
        .include_dirs(&base, &["include", "/usr/include/extra"])
        .rpath(&base, &["$ORIGIN/lib"]);

    installer(sandbox.config(), setup.clone())
        .build("foo", &build_ext, &PatchDirectives::default())
        .unwrap();

    let calls = setup.calls.lock().unwrap();
    let cfg = calls[0].setup_cfg.as_deref().unwrap();
    assert!(cfg.contains("[build_ext]"), "{cfg}");
    assert!(
        cfg.contains(&format!("include-dirs = {}/include:/usr/include/extra", base.display())),
        "{cfg}"
    );
    assert!(cfg.contains("rpath = $ORIGIN/lib"), "{cfg}");
}

#[test]
fn test_patches_are_applied_and_tagged() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");
    let patch = sandbox.root.path().join("touch.patch");
    fs::write(&patch, "echo patched > PATCHED\n").unwrap();

    let mut patches = PatchDirectives::new();
    patches.insert(
        "foo",
        PatchSet::new([patch.display().to_string()])
            .with_binary("sh")
            .with_options("-s"),
    );
    let setup = FakeSetup::default();

    let built = installer(sandbox.config(), setup.clone())
        .build("foo", &BuildExt::new(), &patches)
        .unwrap();
    assert_eq!(built, vec![sandbox.dest.join("foo-1.0+SlapOSPatched001-py3.11.egg")]);

    let calls = setup.calls.lock().unwrap();
    assert!(calls[0].patched);
    let cfg = calls[0].setup_cfg.as_deref().unwrap();
    assert!(cfg.contains("[egg_info]"), "{cfg}");
    assert!(cfg.contains("tag_build = +SlapOSPatched001"), "{cfg}");
}

#[test]
fn test_failing_patch_aborts_build() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");
    let patch = sandbox.root.path().join("broken.patch");
    fs::write(&patch, "garbage\n").unwrap();

    let mut patches = PatchDirectives::new();
    patches.insert("foo", PatchSet::new([patch.display().to_string()]).with_binary("false"));
    let setup = FakeSetup::default();

    let err = installer(sandbox.config(), setup.clone())
        .build("foo", &BuildExt::new(), &patches)
        .unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }), "{err}");
    assert!(setup.calls.lock().unwrap().is_empty());
    assert!(sandbox.installed().is_empty());
}

#[test]
fn test_failing_setup_leaves_dest_clean() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");

    let err = installer(sandbox.config(), FakeSetup::failing())
        .build("foo", &BuildExt::new(), &PatchDirectives::default())
        .unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }), "{err}");
    assert!(sandbox.installed().is_empty());
}

#[test]
fn test_build_reuses_existing_egg() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");
    let existing = make_egg(&sandbox.dest, "foo", "1.0", &[]);
    let setup = FakeSetup::default();

    let built = installer(sandbox.config(), setup.clone())
        .build("foo", &BuildExt::new(), &PatchDirectives::default())
        .unwrap();
    assert_eq!(built, vec![existing]);
    assert!(setup.calls.lock().unwrap().is_empty());
}

#[test]
fn test_build_offline() {
    let sandbox = Sandbox::new();
    make_sdist(&sandbox.links, "foo", "1.0");
    let config = InstallerConfig {
        dest: None,
        ..sandbox.config()
    };

    let err = installer(config, FakeSetup::default())
        .build("foo", &BuildExt::new(), &PatchDirectives::default())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "We don't have a distribution for foo\nand can't build one in offline (no-install) mode.\n"
    );
}

#[test]
fn test_build_without_source_distribution() {
    let sandbox = Sandbox::new();
    let err = installer(sandbox.config(), FakeSetup::default())
        .build("foo", &BuildExt::new(), &PatchDirectives::default())
        .unwrap_err();
    assert_eq!(err.to_string(), "Couldn't find a source distribution for 'foo'.");
}

#[test]
fn test_install_builds_sdist_dependencies() {
    let sandbox = Sandbox::new();
    make_egg(&sandbox.links, "app", "1.0", &["lib"]);
    make_sdist(&sandbox.links, "lib", "2.0");
    let setup = FakeSetup::default();

    let installation = installer(sandbox.config(), setup.clone())
        .install(&["app"], None, &PatchDirectives::default())
        .unwrap();
    let mut keys: Vec<String> = installation
        .working_set
        .iter()
        .map(|d| format!("{} {}", d.key(), d.version()))
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["app 1.0", "lib 2.0"]);
    assert_eq!(setup.calls.lock().unwrap().len(), 1);
    assert_eq!(
        sandbox.installed(),
        vec!["app-1.0-py3.11.egg", "lib-2.0-py3.11.egg"]
    );
}

#[test]
fn test_develop_places_egg_link() {
    let sandbox = Sandbox::new();
    let src = sandbox.root.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("setup.py"), "name=foo\nversion=1.0\n").unwrap();
    let base = sandbox.root.path().to_path_buf();

    let link = installer(sandbox.config(), FakeSetup::default())
        .develop(&src, &sandbox.dest, &BuildExt::new().include_dirs(&base, &["include"]))
        .unwrap();
    assert_eq!(link, sandbox.dest.join("fake.egg-link"));
    assert!(fs::read_to_string(&link).unwrap().starts_with(&src.display().to_string()));
    assert_eq!(sandbox.installed(), vec!["fake.egg-link"]);
    assert!(!src.join("setup.cfg").exists());
}
