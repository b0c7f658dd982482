//! Native fast path: the equation text is compiled into a shared library with
//! the host Rust compiler and called through a C ABI function pointer.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use libloading::Library;

use super::derivative::{Backend, Derivative};
use super::error::RuntimeError;

/// Explicit path to the compiler used for the fast path.
pub const RUSTC_ENV: &str = "CRNEXPORT_RUSTC";
/// When set, the fast path is never probed nor used.
pub const DISABLE_ENV: &str = "CRNEXPORT_DISABLE_NATIVE";

const RHS_SYMBOL: &[u8] = b"crn_ode_rhs";
const PROBE_SYMBOL: &[u8] = b"crn_probe";
const PROBE_VALUE: u32 = 42;

/// Math helpers giving the builtin functions free-function syntax.
pub const PRELUDE: &str = "#![allow(unused)]
#[inline(always)] fn exp(x: f64) -> f64 { x.exp() }
#[inline(always)] fn log(x: f64) -> f64 { x.ln() }
#[inline(always)] fn ln(x: f64) -> f64 { x.ln() }
#[inline(always)] fn log10(x: f64) -> f64 { x.log10() }
#[inline(always)] fn sqrt(x: f64) -> f64 { x.sqrt() }
#[inline(always)] fn abs(x: f64) -> f64 { x.abs() }
#[inline(always)] fn sin(x: f64) -> f64 { x.sin() }
#[inline(always)] fn cos(x: f64) -> f64 { x.cos() }
#[inline(always)] fn tan(x: f64) -> f64 { x.tan() }
#[inline(always)] fn pow(a: f64, b: f64) -> f64 { a.powf(b) }
#[inline(always)] fn min(a: f64, b: f64) -> f64 { a.min(b) }
#[inline(always)] fn max(a: f64, b: f64) -> f64 { a.max(b) }
";

const PROBE_SOURCE: &str = "#[no_mangle]
pub extern \"C\" fn crn_probe() -> u32 {
    42
}
";

type RhsFn = unsafe extern "C" fn(f64, *const f64, *const f64, *mut f64);
type ProbeFn = unsafe extern "C" fn() -> u32;

static BUILD_COUNTER: AtomicUsize = AtomicUsize::new(0);
static FAST_PATH: OnceLock<bool> = OnceLock::new();

/// Locate the Rust compiler.
///
/// Checks in order: `CRNEXPORT_RUSTC`, `RUSTC`, `rustc` on the `PATH`,
/// `CARGO_HOME/bin` and `~/.cargo/bin`. Falls back to plain `rustc` and lets
/// the spawn fail.
fn find_rustc() -> PathBuf {
    for var in [RUSTC_ENV, "RUSTC"] {
        if let Some(path) = env::var_os(var) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }
    }

    if let Ok(output) = Command::new("rustc").arg("--version").output() {
        if output.status.success() {
            return PathBuf::from("rustc");
        }
    }

    if let Some(cargo_home) = env::var_os("CARGO_HOME") {
        let path = PathBuf::from(cargo_home).join("bin").join(rustc_exe_name());
        if path.exists() {
            return path;
        }
    }

    // Unix: $HOME, Windows: %USERPROFILE%
    if let Some(home) = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")) {
        let path = PathBuf::from(home)
            .join(".cargo")
            .join("bin")
            .join(rustc_exe_name());
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("rustc")
}

#[inline]
fn rustc_exe_name() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "rustc.exe"
    }
    #[cfg(not(target_os = "windows"))]
    {
        "rustc"
    }
}

/// A fresh directory for one build, `$TMP/crnexport/<pid>_<name>`.
fn scratch_dir(name: &str) -> io::Result<PathBuf> {
    let dir = env::temp_dir()
        .join("crnexport")
        .join(format!("{}_{}", process::id(), name));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Compile `source` into a shared library and return its path.
///
/// `stem` must be a valid identifier; it becomes the prefix of the crate
/// name. A missing compiler or a failed compilation is reported as
/// [`RuntimeError::Compile`]; any other I/O failure as [`RuntimeError::Io`].
pub fn build_library(source: &str, stem: &str) -> Result<PathBuf, RuntimeError> {
    let name = format!("{}_{}", stem, BUILD_COUNTER.fetch_add(1, Ordering::Relaxed));
    let dir = scratch_dir(&name)?;
    let src = dir.join(format!("{}.rs", name));
    let out = dir.join(format!(
        "{}{}{}",
        env::consts::DLL_PREFIX,
        name,
        env::consts::DLL_SUFFIX
    ));
    fs::write(&src, source)?;

    let rustc = find_rustc();
    let output = Command::new(&rustc)
        .args(["--crate-type", "cdylib", "--edition", "2021"])
        .args(["-C", "opt-level=3"])
        .arg("--crate-name")
        .arg(&name)
        .arg("-o")
        .arg(&out)
        .arg(&src)
        .stdin(Stdio::null())
        .output();
    let _ = fs::remove_file(&src);
    let failure = match output {
        Ok(output) if output.status.success() => return Ok(out),
        Ok(output) => RuntimeError::Compile {
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => RuntimeError::Compile {
            message: format!("compiler '{}' not found", rustc.display()),
        },
        Err(err) => err.into(),
    };
    let _ = fs::remove_dir_all(&dir);
    Err(failure)
}

/// Wrap the equation text in the C ABI entry point of the fast path.
pub fn rhs_source(code: &str, num_species: usize, num_parameters: usize) -> String {
    let mut source = String::from(PRELUDE);
    source.push_str(&format!(
        "\nconst N: usize = {};\nconst P: usize = {};\n\n",
        num_species, num_parameters
    ));
    source.push_str("#[no_mangle]\n");
    source.push_str(
        "pub unsafe extern \"C\" fn crn_ode_rhs(t: f64, y: *const f64, p: *const f64, ydot: *mut f64) {\n",
    );
    source.push_str("    let y = std::slice::from_raw_parts(y, N);\n");
    source.push_str("    let p = std::slice::from_raw_parts(p, P);\n");
    source.push_str("    let ydot = std::slice::from_raw_parts_mut(ydot, N);\n");
    for line in code.lines() {
        source.push_str("    ");
        source.push_str(line.trim());
        source.push('\n');
    }
    source.push_str("}\n");
    source
}

/// Load a library built by `build_library`, then remove its file.
///
/// The mapping stays valid after the unlink on unix; elsewhere the removal
/// fails quietly and the file is left behind.
fn open(path: &Path) -> Result<Library, RuntimeError> {
    // Loading runs the library's initialisers. Only libraries produced by
    // `build_library` from our own sources are opened here.
    let lib = unsafe { Library::new(path) }
        .map_err(|e| RuntimeError::Load(format!("{}: {}", path.display(), e)))?;
    let _ = fs::remove_file(path);
    if let Some(dir) = path.parent() {
        let _ = fs::remove_dir(dir);
    }
    Ok(lib)
}

/// Compile and run a trivial library once.
pub fn probe() -> Result<(), RuntimeError> {
    let path = build_library(PROBE_SOURCE, "crn_probe")?;
    let lib = open(&path)?;
    let value = unsafe {
        let func = lib
            .get::<ProbeFn>(PROBE_SYMBOL)
            .map_err(|e| RuntimeError::Load(e.to_string()))?;
        func()
    };
    if value != PROBE_VALUE {
        return Err(RuntimeError::Load(format!(
            "probe library returned {} instead of {}",
            value, PROBE_VALUE
        )));
    }
    Ok(())
}

/// Whether the fast path can be used in this process.
///
/// The probe runs at most once. Only [`RuntimeError::Compile`] turns into
/// `false`; every other failure is returned to the caller.
pub fn use_fast_path() -> Result<bool, RuntimeError> {
    if env::var_os(DISABLE_ENV).is_some() {
        return Ok(false);
    }
    if let Some(&flag) = FAST_PATH.get() {
        return Ok(flag);
    }
    let flag = match probe() {
        Ok(()) => true,
        Err(RuntimeError::Compile { .. }) => false,
        Err(err) => return Err(err),
    };
    Ok(*FAST_PATH.get_or_init(|| flag))
}

/// Right-hand side backed by a compiled shared library.
pub struct NativeRhs {
    func: RhsFn,
    num_species: usize,
    num_parameters: usize,
    // keeps `func` valid
    _lib: Library,
}

impl NativeRhs {
    pub fn build(
        code: &str,
        num_species: usize,
        num_parameters: usize,
    ) -> Result<Self, RuntimeError> {
        let source = rhs_source(code, num_species, num_parameters);
        let path = build_library(&source, "crn_rhs")?;
        let lib = open(&path)?;
        let func = unsafe {
            *lib.get::<RhsFn>(RHS_SYMBOL)
                .map_err(|e| RuntimeError::Load(e.to_string()))?
        };
        Ok(Self {
            func,
            num_species,
            num_parameters,
            _lib: lib,
        })
    }

    pub fn num_species(&self) -> usize {
        self.num_species
    }

    pub fn num_parameters(&self) -> usize {
        self.num_parameters
    }
}

impl std::fmt::Debug for NativeRhs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRhs")
            .field("num_species", &self.num_species)
            .field("num_parameters", &self.num_parameters)
            .finish()
    }
}

impl Derivative for NativeRhs {
    fn evaluate(&self, t: f64, y: &[f64], p: &[f64], ydot: &mut [f64]) {
        assert_eq!(y.len(), self.num_species);
        assert_eq!(ydot.len(), self.num_species);
        assert_eq!(p.len(), self.num_parameters);
        unsafe { (self.func)(t, y.as_ptr(), p.as_ptr(), ydot.as_mut_ptr()) }
    }

    fn backend(&self) -> Backend {
        Backend::Native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::expr::FUNCTIONS;
    use approx::assert_relative_eq;

    #[test]
    fn test_prelude_defines_every_function() {
        for (name, _) in FUNCTIONS {
            assert!(
                PRELUDE.contains(&format!("fn {}(", name)),
                "missing {}",
                name
            );
        }
    }

    #[test]
    fn test_rhs_source_layout() {
        let source = rhs_source("ydot[0] = -p[0] * y[0];\n", 1, 1);
        assert!(source.starts_with("#![allow(unused)]"));
        assert!(source.contains("const N: usize = 1;"));
        assert!(source.contains("const P: usize = 1;"));
        assert!(source.contains("    ydot[0] = -p[0] * y[0];\n}"));
    }

    #[test]
    fn test_native_rhs_evaluates() {
        if probe().is_err() {
            eprintln!("skipping: no usable Rust compiler");
            return;
        }
        let rhs = NativeRhs::build("ydot[0] = -p[0] * y[0];\nydot[1] = p[0] * pow(y[0], 2.0) + t;", 2, 1)
            .unwrap();
        let mut ydot = [0.0; 2];
        rhs.evaluate(0.5, &[2.0, 0.0], &[0.25], &mut ydot);
        assert_relative_eq!(ydot[0], -0.5);
        assert_relative_eq!(ydot[1], 1.5);
        assert_eq!(rhs.backend(), Backend::Native);
    }

    #[cfg(unix)]
    #[test]
    fn test_loaded_library_leaves_no_file() {
        if probe().is_err() {
            eprintln!("skipping: no usable Rust compiler");
            return;
        }
        let path = build_library(PROBE_SOURCE, "crn_cleanup").unwrap();
        assert!(path.exists());
        let lib = open(&path).unwrap();
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
        let value = unsafe { lib.get::<ProbeFn>(PROBE_SYMBOL).unwrap()() };
        assert_eq!(value, PROBE_VALUE);
    }

    #[test]
    fn test_bad_source_is_a_compile_error() {
        if probe().is_err() {
            eprintln!("skipping: no usable Rust compiler");
            return;
        }
        match build_library("fn broken( {", "crn_broken") {
            Err(RuntimeError::Compile { .. }) => {}
            other => panic!("expected a compile error, got {:?}", other),
        }
        let prefix = format!("{}_crn_broken", process::id());
        let leftovers = fs::read_dir(env::temp_dir().join("crnexport"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .count();
        assert_eq!(leftovers, 0);
    }
}
