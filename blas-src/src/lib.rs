//! Selects the LAPACK/BLAS backend linked by `ndarray-linalg` in the crates of this workspace.
//! Accelerate on macOS, statically linked sequential MKL elsewhere.

#[cfg(target_os = "macos")]
extern crate accelerate_src as _backend;

#[cfg(not(target_os = "macos"))]
extern crate intel_mkl_src as _backend;
