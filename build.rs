//! Build script for keydiff: locate a system DuckDB when not bundling it

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=DUCKDB_LIB_PATH");
    println!("cargo:rerun-if-env-changed=KEYDIFF_SKIP_DUCKDB_DETECTION");

    // The bundled feature compiles DuckDB from source; nothing to find
    if env::var_os("CARGO_FEATURE_BUNDLED").is_some() {
        return;
    }

    // Packagers linking against a known DuckDB
    if env::var_os("KEYDIFF_SKIP_DUCKDB_DETECTION").is_some() {
        println!("cargo:rustc-link-lib=duckdb");
        return;
    }

    match locate_duckdb() {
        Some(dir) => {
            println!("cargo:rustc-link-search=native={}", dir.display());
            println!("cargo:rustc-link-lib=duckdb");
        }
        None => {
            eprintln!("DuckDB library not found. Either:");
            eprintln!("  - install libduckdb (brew install duckdb, apt install libduckdb-dev)");
            eprintln!("  - set DUCKDB_LIB_PATH=/path/to/duckdb/lib");
            eprintln!("  - build with the default `bundled` feature");
            panic!("DuckDB library not found");
        }
    }
}

/// First directory holding a DuckDB library: env override, pkg-config, then system paths
fn locate_duckdb() -> Option<PathBuf> {
    let from_env = env::var_os("DUCKDB_LIB_PATH").map(PathBuf::from);
    from_env
        .into_iter()
        .chain(pkg_config_dirs())
        .chain(system_dirs())
        .find(|dir| has_duckdb(dir))
}

fn pkg_config_dirs() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        return Vec::new();
    }
    let output = match Command::new("pkg-config").args(["--libs-only-L", "duckdb"]).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };
    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|flag| flag.strip_prefix("-L"))
        .map(PathBuf::from)
        .collect()
}

fn system_dirs() -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "macos") {
        &["/opt/homebrew/lib", "/usr/local/lib", "/opt/local/lib"]
    } else if cfg!(target_os = "windows") {
        &["C:\\Program Files\\DuckDB\\lib", "C:\\duckdb\\lib"]
    } else {
        &["/usr/lib", "/usr/local/lib", "/usr/lib/x86_64-linux-gnu", "/usr/lib64", "/lib"]
    };
    dirs.iter().map(PathBuf::from).collect()
}

fn has_duckdb(dir: &Path) -> bool {
    let names: &[&str] = if cfg!(target_os = "windows") {
        &["duckdb.dll", "duckdb.lib"]
    } else if cfg!(target_os = "macos") {
        &["libduckdb.dylib", "libduckdb.a"]
    } else {
        &["libduckdb.so", "libduckdb.so.1", "libduckdb.a"]
    };
    names.iter().any(|name| dir.join(name).exists())
}
