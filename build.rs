use std::env;
use std::path::PathBuf;

/// FFmpeg discovery hints for Windows builds of the `ffmpeg` feature.
///
/// Without the feature nothing links against FFmpeg and the script is a
/// no-op.
fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");

    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" || env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=The ffmpeg feature needs FFmpeg. Install it via vcpkg and set FFMPEG_DIR, or build without the feature."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);

    if ffmpeg_dir.exists() {
        println!(
            "cargo:warning=Using vcpkg FFmpeg at {}; set FFMPEG_DIR to silence this message.",
            ffmpeg_dir.display(),
        );
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} has no FFmpeg install.",
            ffmpeg_dir.display(),
        );
    }
}
