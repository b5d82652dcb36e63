// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tessera check` command implementation.
//!
//! Validates a single `plugin.toml` without scanning or launching anything.
//! Exit code 0 means the manifest would be accepted by discovery.

use std::path::Path;

use tessera_plugin::parse_manifest;

/// Runs the `tessera check` command. Returns the process exit code.
pub fn run_check(path: &Path) -> i32 {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("error: cannot read {}: {e}", path.display());
            return 1;
        }
    };
    match parse_manifest(&content) {
        Ok(manifest) => {
            println!("ok: {} {}", manifest.id, manifest.version);
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_manifest_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.toml");
        std::fs::write(
            &path,
            r#"
[plugin]
id = "clock"
version = "1.0.0"
entrypoint = "worker"
"#,
        )
        .unwrap();
        assert_eq!(run_check(&path), 0);
    }

    #[test]
    fn invalid_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.toml");
        std::fs::write(&path, "[plugin]\nid = \"\"\n").unwrap();
        assert_eq!(run_check(&path), 1);
    }

    #[test]
    fn missing_file_fails() {
        assert_eq!(run_check(Path::new("/nonexistent/plugin.toml")), 1);
    }
}
