// src/main.rs

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use pkgcore::archive::PackageReader;
use pkgcore::config::{Config, DEFAULT_CACHE_DIR, DEFAULT_DB_PATH};
use pkgcore::db::PackageDb;
use pkgcore::db::models::InstalledPackage;
use pkgcore::fetch::HttpFetcher;
use pkgcore::manifest::JsonManifest;
use pkgcore::metadir;
use pkgcore::{ArchiveFormat, Attr, Package, PackageKind, PackageWriter, register_package, resolver};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "pkgcore")]
#[command(author, version, about = "Inspect, register and build binary packages", long_about = None)]
struct Cli {
    /// Stricter checks and louder diagnostics for package authors
    #[arg(long, global = true, env = "PKGCORE_DEVELOPER_MODE")]
    developer: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local package database
    Init {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show a package archive's metadata and dependency status
    Info {
        /// Archive path or http(s)/ftp URI
        package: String,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
        /// Download directory for remote archives
        #[arg(short, long, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
    /// Record a staged package as installed
    #[command(group(ArgGroup::new("source").required(true).args(["metadir", "manifest"])))]
    Register {
        /// Metadata directory holding +MANIFEST and friends
        #[arg(short = 'm', long)]
        metadir: Option<PathBuf>,
        /// Bare manifest file
        #[arg(short = 'M', long)]
        manifest: Option<PathBuf>,
        /// Testing mode: register without checking the listed files
        #[arg(short = 't', long)]
        test: bool,
        /// Root the listed files are checked below
        #[arg(short = 'r', long, default_value = "/")]
        root: PathBuf,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Build a package archive from a metadata directory or an installed package
    #[command(group(ArgGroup::new("input").required(true).args(["origin", "metadir"])))]
    Create {
        /// Origin of an installed package to re-pack
        origin: Option<String>,
        /// Metadata directory holding +MANIFEST and friends
        #[arg(short = 'm', long)]
        metadir: Option<PathBuf>,
        /// Staging root the payload files are read from
        #[arg(short = 'r', long)]
        root: Option<PathBuf>,
        /// Output directory
        #[arg(short = 'o', long, default_value = ".")]
        outdir: PathBuf,
        /// Archive format: tar, tgz, txz or tzst
        #[arg(short = 'f', long, default_value = "txz")]
        format: ArchiveFormat,
        /// Database path, for re-packing an installed package
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Query installed packages
    Query {
        /// Origin glob (optional, lists all if omitted)
        origin: Option<String>,
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
}

fn print_package(pkg: &Package) {
    println!(
        "{}-{}",
        pkg.name().unwrap_or("?"),
        pkg.version().unwrap_or("?")
    );
    for attr in [
        Attr::Origin,
        Attr::Comment,
        Attr::Arch,
        Attr::Maintainer,
        Attr::Www,
        Attr::Prefix,
    ] {
        if let Some(value) = pkg.get(attr) {
            println!("  {:<11} {}", format!("{}:", attr), value);
        }
    }
    if let Some(size) = pkg.flatsize() {
        println!("  {:<11} {} bytes", "flatsize:", size);
    }
    println!("  {:<11} {}", "kind:", pkg.kind);

    if !pkg.deps().is_empty() {
        println!("  Dependencies:");
        for dep in pkg.deps() {
            println!(
                "    {}-{} ({}) [{}]",
                dep.name().unwrap_or("?"),
                dep.version().unwrap_or("?"),
                dep.origin().unwrap_or("?"),
                dep.kind
            );
        }
    }
    if !pkg.rdeps().is_empty() {
        println!("  Required by:");
        for rdep in pkg.rdeps() {
            println!(
                "    {}-{} ({})",
                rdep.name().unwrap_or("?"),
                rdep.version().unwrap_or("?"),
                rdep.origin().unwrap_or("?")
            );
        }
    }
    if !pkg.scripts().is_empty() {
        let phases: Vec<_> = pkg.scripts().iter().map(|s| s.phase.as_str()).collect();
        println!("  Scripts: {}", phases.join(", "));
    }
    println!("  Files: {}", pkg.files().len());
}

/// Resolve `pkg` against the database at `db_path` if it exists
fn resolve_if_present(pkg: &mut Package, db_path: &str) -> Result<Option<resolver::ResolveReport>> {
    if !Path::new(db_path).exists() {
        info!("No database at {}, skipping dependency check", db_path);
        return Ok(None);
    }
    let db = PackageDb::open(db_path)?;
    let report = resolver::resolve(pkg, &db);

    for installed in resolver::find_conflicts(pkg, &db)? {
        println!(
            "Conflicts with installed {}-{} ({})",
            installed.name, installed.version, installed.origin
        );
    }
    Ok(Some(report))
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::default().with_developer_mode(cli.developer);

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing package database at: {}", db_path);
            pkgcore::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Info {
            package,
            db_path,
            cache_dir,
        }) => {
            let config = config.with_cache_dir(cache_dir).with_db_path(&db_path);
            let fetcher = HttpFetcher::new(&config)?;
            let reader = PackageReader::new(&JsonManifest, &config).with_fetcher(&fetcher);

            let mut pkg = reader
                .open(&package)
                .with_context(|| format!("Failed to read package {}", package))?;
            if pkg.kind == PackageKind::OldFile {
                println!("{} uses the legacy archive layout", package);
            }

            let report = resolve_if_present(&mut pkg, &db_path)?;
            print_package(&pkg);
            if let Some(report) = report {
                println!(
                    "\n{} installed, {} missing, {} unchecked",
                    report.installed, report.missing, report.degraded
                );
            }
            Ok(())
        }
        Some(Commands::Register {
            metadir,
            manifest,
            test,
            root,
            db_path,
        }) => {
            let pkg = match (metadir, manifest) {
                (Some(dir), _) => metadir::load_metadata_dir(&dir, &JsonManifest, &config)?,
                (None, Some(path)) => metadir::load_manifest_file(&path, &JsonManifest, &config)?,
                (None, None) => return Err(anyhow::anyhow!("Either -m or -M is required")),
            };

            let mut db = PackageDb::open(&db_path)?;
            let mut checked = pkg.clone();
            let report = resolver::resolve(&mut checked, &db);
            for dep in checked.deps().iter().filter(|d| d.kind != PackageKind::Installed) {
                println!(
                    "Missing dependency: {}-{} ({})",
                    dep.name().unwrap_or("?"),
                    dep.version().unwrap_or("?"),
                    dep.origin().unwrap_or("?")
                );
            }
            if config.developer_mode && !report.all_installed() {
                return Err(anyhow::anyhow!(
                    "{} dependencies are not installed",
                    report.missing + report.degraded
                ));
            }

            let message = register_package(db.conn_mut(), &pkg, &root, test, &config)?;
            println!(
                "Registered package: {} version {}",
                pkg.name().unwrap_or("?"),
                pkg.version().unwrap_or("?")
            );
            println!("  Files: {}", pkg.files().len());
            println!("  Dependencies: {}", pkg.deps().len());
            if let Some(message) = message {
                println!("{}", message);
            }
            Ok(())
        }
        Some(Commands::Create {
            origin,
            metadir,
            root,
            outdir,
            format,
            db_path,
        }) => {
            let writer = PackageWriter::new(format, &config);
            let path = match (origin, metadir) {
                (Some(origin), _) => {
                    let db = PackageDb::open(&db_path)?;
                    writer.write_installed(db.conn(), &origin, root.as_deref(), &outdir)?
                }
                (None, Some(dir)) => {
                    let pkg = metadir::load_metadata_dir(&dir, &JsonManifest, &config)?;
                    writer.write(&pkg, root.as_deref(), &outdir)?
                }
                (None, None) => return Err(anyhow::anyhow!("Either an origin or -m is required")),
            };
            println!("Created {}", path.display());
            Ok(())
        }
        Some(Commands::Query { origin, db_path }) => {
            let db = PackageDb::open(&db_path)?;

            match origin {
                Some(origin) => {
                    let record = match InstalledPackage::find_by_origin(db.conn(), &origin)? {
                        Some(record) => Some(record),
                        None => InstalledPackage::find_by_origin_glob(db.conn(), &origin)?,
                    }
                    .ok_or_else(|| anyhow::anyhow!("No installed package matches {}", origin))?;
                    let pkg = record.to_package(db.conn())?;
                    print_package(&pkg);
                    if let Some(installed_at) = &record.installed_at {
                        println!("  Installed: {}", installed_at);
                    }
                }
                None => {
                    let records = InstalledPackage::list_all(db.conn())?;
                    if records.is_empty() {
                        println!("No packages found.");
                    } else {
                        println!("Installed packages:");
                        for record in &records {
                            print!("  {}-{} ({})", record.name, record.version, record.origin);
                            if let Some(arch) = &record.arch {
                                print!(" [{}]", arch);
                            }
                            println!();
                        }
                        println!("\nTotal: {} package(s)", records.len());
                    }
                }
            }
            Ok(())
        }
        None => {
            println!("pkgcore - package metadata and archive tool");
            println!("Run 'pkgcore --help' for usage information");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_register_requires_a_source() {
        assert!(Cli::try_parse_from(["pkgcore", "register"]).is_err());
        assert!(Cli::try_parse_from(["pkgcore", "register", "-m", "/tmp/md", "-M", "/tmp/m"]).is_err());

        let cli = Cli::try_parse_from(["pkgcore", "register", "-M", "/tmp/manifest", "-t"]).unwrap();
        match cli.command {
            Some(Commands::Register { manifest, test, db_path, .. }) => {
                assert_eq!(manifest, Some(PathBuf::from("/tmp/manifest")));
                assert!(test);
                assert_eq!(db_path, DEFAULT_DB_PATH);
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_register_root_defaults_to_slash() {
        let cli = Cli::try_parse_from(["pkgcore", "register", "-m", "/tmp/md"]).unwrap();
        match cli.command {
            Some(Commands::Register { root, test, .. }) => {
                assert_eq!(root, PathBuf::from("/"));
                assert!(!test);
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn test_create_format_parsing() {
        let cli = Cli::try_parse_from(["pkgcore", "create", "-m", "md", "-f", "tzst"]).unwrap();
        match cli.command {
            Some(Commands::Create { format, outdir, root, origin, .. }) => {
                assert_eq!(format, ArchiveFormat::Tzst);
                assert_eq!(outdir, PathBuf::from("."));
                assert!(root.is_none());
                assert!(origin.is_none());
            }
            _ => panic!("expected create"),
        }

        assert!(Cli::try_parse_from(["pkgcore", "create", "-m", "md", "-f", "rpm"]).is_err());
    }

    #[test]
    fn test_create_from_installed_origin() {
        assert!(Cli::try_parse_from(["pkgcore", "create"]).is_err());
        assert!(Cli::try_parse_from(["pkgcore", "create", "shells/zsh", "-m", "md"]).is_err());

        let cli = Cli::try_parse_from(["pkgcore", "create", "shells/zsh", "-o", "/tmp/out"]).unwrap();
        match cli.command {
            Some(Commands::Create { origin, metadir, db_path, .. }) => {
                assert_eq!(origin.as_deref(), Some("shells/zsh"));
                assert!(metadir.is_none());
                assert_eq!(db_path, DEFAULT_DB_PATH);
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_developer_flag_is_global() {
        let cli = Cli::try_parse_from(["pkgcore", "query", "--developer"]).unwrap();
        assert!(cli.developer);
    }
}
