//! Checks that the chip feature matches the target and puts the matching
//! memory layout where the linker will find it as `memory.x`.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();
    let has_rp2040 = env::var("CARGO_FEATURE_RP2040").is_ok();
    let has_rp2350 = env::var("CARGO_FEATURE_RP2350").is_ok();

    let memory = match (target.as_str(), has_rp2040, has_rp2350) {
        ("thumbv6m-none-eabi", true, false) => "memory-rp2040.x",
        ("thumbv8m.main-none-eabihf", false, true) => "memory-rp2350.x",
        _ => {
            let error_msg = format!(
                "\n\x1b[1;31merror\x1b[0m: No chip or target selected!\n\n\
                Please use one of the aliases:\n\
                - Pico (RP2040):   \x1b[1;32mcargo run-pico\x1b[0m   or  \x1b[1;32mcargo run-pico-tx\x1b[0m\n\
                - Pico 2 (RP2350): \x1b[1;32mcargo run-pico2\x1b[0m  or  \x1b[1;32mcargo run-pico2-tx\x1b[0m\n\
                \n\x1b[1;34mNote\x1b[0m: The current target is '{}' and features are: rp2040={}, rp2350={}\n",
                target, has_rp2040, has_rp2350
            );
            panic!("{}", error_msg);
        }
    };

    let out = PathBuf::from(env::var_os("OUT_DIR").expect("cargo sets OUT_DIR"));
    fs::copy(memory, out.join("memory.x")).expect("failed to copy memory layout");
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=memory-rp2040.x");
    println!("cargo:rerun-if-changed=memory-rp2350.x");
    println!("cargo:rerun-if-changed=build.rs");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    if has_rp2040 {
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    }
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
