//! Build script for spotsync.
//!
//! Places the `.env.example` template next to where the binary looks for
//! its `.env` (the `spotsync` folder of the local data directory), so a fresh
//! install shows which credentials to fill in.

use std::{env, fs, path::PathBuf};

const TEMPLATE: &str = ".env.example";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed={}", TEMPLATE);

    let template = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join(TEMPLATE);
    if !template.is_file() {
        println!("cargo:warning={} not found at {}", TEMPLATE, template.display());
        return Ok(());
    }

    let mut data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.push("spotsync");

    // A read-only or sandboxed home must not fail the build.
    if let Err(e) = fs::create_dir_all(&data_dir)
        .and_then(|_| fs::copy(&template, data_dir.join(TEMPLATE)).map(|_| ()))
    {
        println!(
            "cargo:warning=could not copy {} to {}: {}",
            TEMPLATE,
            data_dir.display(),
            e
        );
    }

    Ok(())
}
