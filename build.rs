// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Options shared by the resolving commands
fn installer_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("TOML installer configuration"),
    )
    .arg(
        Arg::new("dest")
            .short('d')
            .long("dest")
            .value_name("DIR")
            .help("Directory eggs are installed into; omit to work offline"),
    )
    .arg(
        Arg::new("links")
            .short('f')
            .long("find-links")
            .action(ArgAction::Append)
            .help("Extra find-links (repeatable)"),
    )
    .arg(Arg::new("index").short('i').long("index").help("Package index URL"))
    .arg(Arg::new("download_cache").long("download-cache").help("Persistent download directory"))
    .arg(
        Arg::new("no_newest")
            .long("no-newest")
            .action(ArgAction::SetTrue)
            .help("Keep the versions already installed when they satisfy"),
    )
    .arg(Arg::new("patches").long("patches").help("TOML file of per-project patch directives"))
}

fn build_cli() -> Command {
    Command::new("eggsmith")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Eggsmith Contributors")
        .about("Resolve, fetch and build Python eggs with a signed network cache")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging (overridden by RUST_LOG)"),
        )
        .subcommand(installer_args(
            Command::new("install")
                .about("Install requirements and their dependencies")
                .arg(Arg::new("specs").required(true).num_args(1..).help("Requirement specifiers")),
        ))
        .subcommand(installer_args(
            Command::new("build")
                .about("Build a source distribution into an egg")
                .arg(Arg::new("spec").required(true).help("Requirement specifier of the project to build"))
                .arg(Arg::new("include_dirs").long("include-dir").action(ArgAction::Append).help("Header directories"))
                .arg(Arg::new("library_dirs").long("library-dir").action(ArgAction::Append).help("Library directories"))
                .arg(Arg::new("rpath").long("rpath").action(ArgAction::Append).help("Runtime library directories")),
        ))
        .subcommand(installer_args(
            Command::new("develop")
                .about("Install an editable source tree as a develop egg")
                .arg(Arg::new("setup").required(true).help("setup.py or the directory holding it")),
        ))
        .subcommand(
            Command::new("keygen")
                .about("Generate a key pair for signing network cache uploads")
                .arg(Arg::new("output").short('o').long("output").help("Key file to write")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("eggsmith.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
