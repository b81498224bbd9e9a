//! Generates `include/cactus_telemetry.h` with cbindgen.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");

    let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => dir,
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let crate_path = PathBuf::from(&crate_dir);

    let include_dir = crate_path.join("include");
    if let Err(e) = std::fs::create_dir_all(&include_dir) {
        println!("cargo:warning=failed to create {}: {}", include_dir.display(), e);
        return;
    }

    let config = match cbindgen::Config::from_file(crate_path.join("cbindgen.toml")) {
        Ok(config) => config,
        Err(e) => {
            println!("cargo:warning=failed to read cbindgen.toml: {}", e);
            return;
        }
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(include_dir.join("cactus_telemetry.h"));
        }
        Err(e) => {
            // The library itself still builds; only the header is missing.
            println!("cargo:warning=cbindgen failed, C header not generated: {}", e);
        }
    }
}
