//! Shared fixtures for integration tests
//!
//! - Game packages built on the fly with the `zip` crate
//! - A Unity-serialized settings asset
//! - Fake `apktool`, `keytool` and `jarsigner` shell scripts (unix only)

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Asset path inside the package
pub const ASSET_ENTRY: &str = "assets/bin/Data/PhotonServerSettings.asset";

/// Settings asset as the Unity editor serializes it
pub const SETTINGS_ASSET: &str = "%YAML 1.1
%TAG !u! tag:unity3d.com,2011:
--- !u!114 &11400000
MonoBehaviour:
  m_ObjectHideFlags: 0
  m_Name: PhotonServerSettings
  AppID: 1eb3a592-f2d1-41c1-ac3a-cd6308fca5cb
  HostType: 4
  ServerAddress:
  ServerPort: 5055
  Protocol: 0
";

/// Entries of a small but realistic package
pub fn game_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("AndroidManifest.xml", b"<manifest package=\"com.example.dragons\"/>".to_vec()),
        ("classes.dex", vec![0x64, 0x65, 0x78, 0x0a, 0x30, 0x33, 0x35, 0x00]),
        ("resources.arsc", vec![0x02, 0x00, 0x0c, 0x00, 0xff, 0xee]),
        ("res/drawable/icon.png", vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a]),
        (ASSET_ENTRY, SETTINGS_ASSET.as_bytes().to_vec()),
    ]
}

/// Write a package at `path` from `(name, bytes)` entries
pub fn write_apk<N: AsRef<str>>(path: &Path, entries: &[(N, Vec<u8>)]) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, data) in entries {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(name.as_ref(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// Write the standard game package into `dir`
pub fn game_apk(dir: &Path) -> PathBuf {
    let path = dir.join("DragonLand.apk");
    write_apk(&path, &game_entries());
    path
}

/// Read every entry of a package, sorted by name
pub fn read_apk(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        entries.push((file.name().to_string(), data));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Read one entry of a package as text
pub fn read_entry(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut text = String::new();
    file.read_to_string(&mut text).unwrap();
    text
}

/// Write an executable shell script
#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// `apktool d -f <src> -o <dest>` unzips, `apktool b <tree> -o <out>` zips
#[cfg(unix)]
pub fn fake_apktool(dir: &Path) -> PathBuf {
    script(
        dir,
        "apktool",
        r#"case "$1" in
  d) mkdir -p "$5" && cd "$5" && unzip -q -o "$3" ;;
  b) out="$4"; case "$out" in /*) ;; *) out="$PWD/$out" ;; esac
     cd "$2" && zip -q -r "$out" . ;;
  *) exit 2 ;;
esac"#,
    )
}

/// Writes whatever path follows `-keystore`
#[cfg(unix)]
pub fn fake_keytool(dir: &Path) -> PathBuf {
    script(
        dir,
        "keytool",
        r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-keystore" ]; then echo keystore > "$2"; fi
  shift
done"#,
    )
}

/// Copies the input package to the path after `-signedjar`
#[cfg(unix)]
pub fn fake_jarsigner(dir: &Path) -> PathBuf {
    script(
        dir,
        "jarsigner",
        r#"while [ $# -gt 0 ]; do
  if [ "$1" = "-signedjar" ]; then cp "$3" "$2"; exit 0; fi
  shift
done
exit 1"#,
    )
}

/// Exits non-zero with a message on stderr
#[cfg(unix)]
pub fn failing_tool(dir: &Path, name: &str) -> PathBuf {
    script(dir, name, "echo \"$0: simulated failure\" >&2\nexit 3")
}

/// True when the host has `zip` and `unzip` for the fake apktool
pub fn has_zip_tools() -> bool {
    ["zip", "unzip"]
        .iter()
        .all(|tool| photon_repack::toolchain::resolve_tool(tool).is_some())
}
