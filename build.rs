use std::env;
use std::fs;
use std::path::Path;

/// Plugin API versions are `YYYYMMDD` dates; compatibility compares the year part
fn check_api_version(version: i64) -> Result<u32, String> {
    let version = u32::try_from(version)
        .map_err(|_| format!("api_version {} does not fit a u32", version))?;
    let (year, month, day) = (version / 10000, version / 100 % 100, version % 100);
    if !(1000..=9999).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(format!("api_version {} is not a YYYYMMDD date", version));
    }
    Ok(version)
}

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let version_api_path = Path::new(&out_dir).join("version_api.rs");

    let cargo_manifest = env::var("CARGO_MANIFEST_DIR").unwrap();
    let cargo_toml_path = Path::new(&cargo_manifest).join("Cargo.toml");
    let cargo_toml: toml::Value = fs::read_to_string(&cargo_toml_path)
        .expect("Failed to read Cargo.toml")
        .parse()
        .expect("Failed to parse Cargo.toml");

    let declared = cargo_toml
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("learnhost"))
        .and_then(|l| l.get("api_version"))
        .and_then(|v| v.as_integer())
        .expect("Failed to find package.metadata.learnhost.api_version in Cargo.toml");

    let api_version = match check_api_version(declared) {
        Ok(version) => version,
        Err(message) => panic!("package.metadata.learnhost: {}", message),
    };

    fs::write(
        &version_api_path,
        format!(
            "// Generated from package.metadata.learnhost.api_version\n\
             pub const PLUGIN_API_VERSION: u32 = {};\n",
            api_version
        ),
    )
    .expect("Failed to write version_api.rs");

    println!("cargo:rustc-env=LEARNHOST_API_VERSION={}", api_version);
    println!("cargo:rerun-if-changed=Cargo.toml");
}
