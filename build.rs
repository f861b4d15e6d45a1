//! This build script copies `memory.x` into the output directory and sets the
//! linker arguments the firmware binary needs.  It only does anything when the
//! `rp2040` feature is enabled; the hardware-independent core needs none of
//! it.
//!
//! memory.x handling derived from embassy-rs examples.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=DEFMT_LOG");
    println!("cargo:rerun-if-changed=link/memory.rp2040.x");

    if env::var_os("CARGO_FEATURE_RP2040").is_none() {
        return;
    }

    // Put `memory.x` in the output directory and ensure it's on the linker
    // search path.  The file must not be called memory.x in the repository,
    // as then the linker would pick it up from the root directory instead of
    // the version placed in OUT_DIR.
    let memory_x = include_bytes!("link/memory.rp2040.x");
    let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
    File::create(out.join("memory.x"))
        .unwrap()
        .write_all(memory_x)
        .unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    // Embassy linker arguments for the binary.
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
}
