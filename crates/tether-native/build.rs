use std::env;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;

const MIN_VERSION: &str = "1.0.0";
const DEFAULT_LIB_NAME: &str = "torrent-shim";

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), BuildError> {
    println!("cargo:rerun-if-env-changed=TETHER_NATIVE_LIB_DIR");
    println!("cargo:rerun-if-env-changed=TETHER_NATIVE_LIB_NAME");
    println!("cargo:rerun-if-changed=build.rs");

    // The stub engine needs nothing from the native side.
    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        return Ok(());
    }

    let lib_name = env::var("TETHER_NATIVE_LIB_NAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LIB_NAME.to_string());

    if let Some(dir) = env::var_os("TETHER_NATIVE_LIB_DIR").map(PathBuf::from) {
        if !dir.exists() {
            return Err(BuildError::MissingLibDir { path: dir });
        }
        println!("cargo:rustc-link-search=native={}", dir.display());
        println!("cargo:rustc-link-lib={lib_name}");
        return Ok(());
    }

    for prefix in ["/opt/homebrew", "/usr/local"] {
        let lib = PathBuf::from(prefix).join("lib");
        if lib.join(format!("lib{lib_name}.so")).exists()
            || lib.join(format!("lib{lib_name}.dylib")).exists()
            || lib.join(format!("lib{lib_name}.a")).exists()
        {
            println!("cargo:rustc-link-search=native={}", lib.display());
            println!("cargo:rustc-link-lib={lib_name}");
            return Ok(());
        }
    }

    let library = pkg_config::Config::new()
        .atleast_version(MIN_VERSION)
        .probe(&lib_name)
        .map_err(BuildError::PkgConfig)?;
    if library.libs.is_empty() {
        return Err(BuildError::NoLibraries);
    }
    Ok(())
}

#[derive(Debug)]
enum BuildError {
    MissingLibDir { path: PathBuf },
    PkgConfig(pkg_config::Error),
    NoLibraries,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingLibDir { path } => {
                write!(f, "native shim library directory missing: {}", path.display())
            }
            BuildError::PkgConfig(_) => write!(f, "native shim pkg-config probe failed"),
            BuildError::NoLibraries => write!(f, "native shim pkg-config entry lists no libraries"),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::PkgConfig(err) => Some(err),
            _ => None,
        }
    }
}
