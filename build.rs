use std::env;
use std::path::PathBuf;

const WATCHED_VARIABLES: [&str; 4] = ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    // Only Windows builds need help locating the FFmpeg libraries.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows"
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=scrubcache needs FFmpeg: set FFMPEG_DIR, or VCPKG_ROOT with an ffmpeg port installed."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| String::from("x64-windows"));
    let install_dir: PathBuf = [vcpkg_root.as_str(), "installed", triplet.as_str()].iter().collect();

    if !install_dir.exists() {
        println!(
            "cargo:warning=no vcpkg FFmpeg install under {}; the build will likely fail to link.",
            install_dir.display(),
        );
        return;
    }

    println!(
        "cargo:warning=using vcpkg FFmpeg from {0}; export FFMPEG_DIR={0} to silence this hint.",
        install_dir.display(),
    );
    if env::var_os("VCPKGRS_DYNAMIC").is_none() {
        println!("cargo:warning=dynamic vcpkg triplets also need VCPKGRS_DYNAMIC=1.");
    }
}
