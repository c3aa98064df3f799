// build.rs

use clap::{Arg, ArgAction, ArgGroup, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

const DB_PATH: &str = "/var/db/pkgcore/local.sqlite";

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value(DB_PATH)
        .help("Database path")
}

fn build_cli() -> Command {
    Command::new("pkgcore")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pkgcore Contributors")
        .about("Inspect, register and build binary packages")
        .subcommand_required(false)
        .arg(
            Arg::new("developer")
                .long("developer")
                .global(true)
                .env("PKGCORE_DEVELOPER_MODE")
                .action(ArgAction::SetTrue)
                .help("Stricter checks and louder diagnostics for package authors"),
        )
        .subcommand(
            Command::new("init")
                .about("Initialize the local package database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("info")
                .about("Show a package archive's metadata and dependency status")
                .arg(Arg::new("package").required(true).help("Archive path or http(s)/ftp URI"))
                .arg(db_path_arg())
                .arg(
                    Arg::new("cache_dir")
                        .short('c')
                        .long("cache-dir")
                        .default_value("/var/cache/pkgcore")
                        .help("Download directory for remote archives"),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Record a staged package as installed")
                .arg(
                    Arg::new("metadir")
                        .short('m')
                        .long("metadir")
                        .help("Metadata directory holding +MANIFEST and friends"),
                )
                .arg(
                    Arg::new("manifest")
                        .short('M')
                        .long("manifest")
                        .help("Bare manifest file"),
                )
                .group(
                    ArgGroup::new("source")
                        .required(true)
                        .args(["metadir", "manifest"]),
                )
                .arg(
                    Arg::new("test")
                        .short('t')
                        .long("test")
                        .action(ArgAction::SetTrue)
                        .help("Testing mode: register without checking the listed files"),
                )
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .default_value("/")
                        .help("Root the listed files are checked below"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("create")
                .about("Build a package archive from a metadata directory or an installed package")
                .arg(Arg::new("origin").help("Origin of an installed package to re-pack"))
                .arg(
                    Arg::new("metadir")
                        .short('m')
                        .long("metadir")
                        .help("Metadata directory holding +MANIFEST and friends"),
                )
                .group(
                    ArgGroup::new("input")
                        .required(true)
                        .args(["origin", "metadir"]),
                )
                .arg(
                    Arg::new("root")
                        .short('r')
                        .long("root")
                        .help("Staging root the payload files are read from"),
                )
                .arg(
                    Arg::new("outdir")
                        .short('o')
                        .long("outdir")
                        .default_value(".")
                        .help("Output directory"),
                )
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .default_value("txz")
                        .value_parser(["tar", "tgz", "txz", "tzst"])
                        .help("Archive format"),
                )
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("query")
                .about("Query installed packages")
                .arg(Arg::new("origin").help("Origin glob (optional)"))
                .arg(db_path_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("pkgcore.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
