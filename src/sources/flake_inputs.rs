//! Local flake input browsing.
//!
//! `nix flake archive --json` reports every input of a flake together with
//! its nix store path; from there this module lists directories and reads
//! files, never leaving `/nix/store/`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;

use crate::common::config::MAX_FILE_SIZE;
use crate::common::error::error_with;
use crate::common::format::format_size;

const NIX_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

fn nix_available() -> bool {
    which::which("nix").is_ok()
}

fn nix_not_found() -> String {
    error_with("NIX_NOT_FOUND", "Nix is not installed or not in PATH")
}

/// Run `nix` with the experimental-features flags. Returns
/// `(success, stdout, stderr)`; spawn failures and timeouts land in stderr.
async fn run_nix_command(args: &[&str], cwd: &Path) -> (bool, String, String) {
    let mut cmd = Command::new("nix");
    cmd.args(["--extra-experimental-features", "nix-command flakes"])
        .args(args)
        .current_dir(cwd);

    match tokio::time::timeout(NIX_COMMAND_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => (
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            (false, String::new(), "nix command not found".to_string())
        }
        Ok(Err(err)) => (false, String::new(), err.to_string()),
        Err(_) => (false, String::new(), "Command timed out".to_string()),
    }
}

/// Fetch the flake's input tree, or a human-readable failure message.
async fn get_flake_inputs(flake_dir: &Path) -> Result<Value, String> {
    if !flake_dir.join("flake.nix").is_file() {
        return Err(format!(
            "Not a flake directory: {} (no flake.nix found)",
            flake_dir.display()
        ));
    }

    let (success, stdout, stderr) = run_nix_command(&["flake", "archive", "--json"], flake_dir).await;
    if !success {
        if stderr.to_lowercase().contains("experimental feature") {
            return Err(
                "Flakes not enabled. Enable with: nix-command flakes experimental features"
                    .to_string(),
            );
        }
        if stderr.contains("does not provide attribute") {
            return Err(format!("Invalid flake: {}", stderr.trim()));
        }
        return Err(format!("Failed to get flake inputs: {}", stderr.trim()));
    }

    serde_json::from_str(&stdout)
        .map_err(|e| format!("Failed to parse flake archive output: {}", e))
}

/// Flatten nested inputs to `name -> store path`, nesting as
/// `parent.child`.
pub(crate) fn flatten_inputs(data: &Value) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    flatten_into(data, "", &mut result);
    result
}

fn flatten_into(data: &Value, prefix: &str, out: &mut BTreeMap<String, String>) {
    let Some(inputs) = data.get("inputs").and_then(Value::as_object) else {
        return;
    };
    for (name, info) in inputs {
        let full_name = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        if let Some(path) = info.get("path").and_then(Value::as_str) {
            if !path.is_empty() {
                out.insert(full_name.clone(), path.to_string());
            }
        }
        if info
            .get("inputs")
            .and_then(Value::as_object)
            .is_some_and(|nested| !nested.is_empty())
        {
            flatten_into(info, &full_name, out);
        }
    }
}

/// A path is valid when it resolves under `/nix/store/`. Paths that do not
/// exist yet are checked lexically so the caller can report NOT_FOUND
/// instead of a security violation.
pub(crate) fn validate_store_path(path: &Path) -> bool {
    match std::fs::canonicalize(path) {
        Ok(real) => real.starts_with("/nix/store/"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            path.starts_with("/nix/store/")
                && !path.components().any(|c| matches!(c, Component::ParentDir))
        }
        Err(_) => false,
    }
}

/// `input` or `input:subpath` query forms.
pub(crate) fn parse_input_query(query: &str) -> (&str, &str) {
    match query.split_once(':') {
        Some((input_name, subpath)) => (input_name, subpath.trim_start_matches('/')),
        None => (query, ""),
    }
}

fn input_not_found(input_name: &str, inputs: &BTreeMap<String, String>) -> String {
    let names: Vec<&str> = inputs.keys().map(String::as_str).take(10).collect();
    let more = if inputs.len() > 10 {
        format!(" ... and {} more", inputs.len() - 10)
    } else {
        String::new()
    };
    error_with(
        "NOT_FOUND",
        format!(
            "Input '{}' not found. Available: {}{}",
            input_name,
            names.join(", "),
            more
        ),
    )
}

/// List all flake inputs with their store paths.
pub async fn list(flake_dir: &str) -> String {
    if !nix_available() {
        return nix_not_found();
    }
    let data = match get_flake_inputs(Path::new(flake_dir)).await {
        Ok(data) => data,
        Err(msg) => return error_with("FLAKE_ERROR", msg),
    };

    let inputs = flatten_inputs(&data);
    if inputs.is_empty() {
        return "No inputs found for this flake.".to_string();
    }

    let flake_path = data
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or(flake_dir);

    let mut lines = vec![
        format!("Flake inputs ({} found):", inputs.len()),
        format!("Flake path: {}", flake_path),
        String::new(),
    ];
    for (name, store_path) in &inputs {
        lines.push(format!("* {}", name));
        lines.push(format!("  {}", store_path));
        lines.push(String::new());
    }
    lines.join("\n").trim().to_string()
}

/// List a directory inside a flake input.
pub async fn ls(flake_dir: &str, query: &str) -> String {
    if !nix_available() {
        return nix_not_found();
    }
    let (input_name, subpath) = parse_input_query(query);

    let data = match get_flake_inputs(Path::new(flake_dir)).await {
        Ok(data) => data,
        Err(msg) => return error_with("FLAKE_ERROR", msg),
    };
    let inputs = flatten_inputs(&data);
    let Some(store_path) = inputs.get(input_name) else {
        return input_not_found(input_name, &inputs);
    };

    let target_path = if subpath.is_empty() {
        PathBuf::from(store_path)
    } else {
        Path::new(store_path).join(subpath)
    };
    let display_subpath = if subpath.is_empty() { "/" } else { subpath };

    if !validate_store_path(&target_path) {
        return error_with("SECURITY_ERROR", "Invalid path: must stay within /nix/store/");
    }
    if !target_path.exists() {
        return error_with(
            "NOT_FOUND",
            format!("Path not found: {} in {}", display_subpath, input_name),
        );
    }
    if !target_path.is_dir() {
        return error_with(
            "NOT_DIRECTORY",
            format!("Not a directory: {} in {}", display_subpath, input_name),
        );
    }

    let mut entries = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(&target_path).await {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            return error_with(
                "PERMISSION_ERROR",
                format!("Permission denied: {}", display_subpath),
            )
        }
        Err(err) => return error_with("OS_ERROR", format!("Cannot list directory: {}", err)),
    };
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => entries.push(entry.file_name().to_string_lossy().into_owned()),
            Ok(None) => break,
            Err(err) => return error_with("OS_ERROR", format!("Cannot list directory: {}", err)),
        }
    }

    if entries.is_empty() {
        return format!("Directory '{}' in {} is empty.", display_subpath, input_name);
    }
    entries.sort();

    let mut dirs: Vec<String> = Vec::new();
    let mut files: Vec<(String, Option<u64>)> = Vec::new();
    for entry in entries {
        let entry_path = target_path.join(&entry);
        match tokio::fs::metadata(&entry_path).await {
            Ok(meta) if meta.is_dir() => dirs.push(entry),
            Ok(meta) => files.push((entry, Some(meta.len()))),
            Err(_) => files.push((entry, None)),
        }
    }

    let display_path = if subpath.is_empty() {
        input_name.to_string()
    } else {
        format!("{}:{}", input_name, subpath)
    };
    let mut lines = vec![
        format!(
            "Contents of {} ({} dirs, {} files):",
            display_path,
            dirs.len(),
            files.len()
        ),
        String::new(),
    ];
    for name in &dirs {
        lines.push(format!("  {}/", name));
    }
    for (name, size) in &files {
        let size_str = size.map(|s| format!(" ({})", format_size(s))).unwrap_or_default();
        lines.push(format!("  {}{}", name, size_str));
    }
    lines.join("\n")
}

/// Read a file from a flake input, capped by size and line limit.
pub async fn read(flake_dir: &str, query: &str, limit: usize) -> String {
    if !nix_available() {
        return nix_not_found();
    }

    let Some((input_name, file_path)) = query.split_once(':') else {
        return error_with(
            "INVALID_FORMAT",
            "Read requires 'input:path' format (e.g., 'nixpkgs:flake.nix')",
        );
    };
    let file_path = file_path.trim_start_matches('/');
    if file_path.is_empty() {
        return error_with(
            "INVALID_FORMAT",
            "File path required (e.g., 'nixpkgs:flake.nix')",
        );
    }

    let data = match get_flake_inputs(Path::new(flake_dir)).await {
        Ok(data) => data,
        Err(msg) => return error_with("FLAKE_ERROR", msg),
    };
    let inputs = flatten_inputs(&data);
    let Some(store_path) = inputs.get(input_name) else {
        return input_not_found(input_name, &inputs);
    };

    let target_path = Path::new(store_path).join(file_path);
    if !validate_store_path(&target_path) {
        return error_with("SECURITY_ERROR", "Invalid path: must stay within /nix/store/");
    }
    if !target_path.exists() {
        return error_with(
            "NOT_FOUND",
            format!("File not found: {} in {}", file_path, input_name),
        );
    }
    if target_path.is_dir() {
        return error_with(
            "IS_DIRECTORY",
            format!("'{}' is a directory. Use type='ls' to list contents.", file_path),
        );
    }

    let file_size = match tokio::fs::metadata(&target_path).await {
        Ok(meta) => meta.len(),
        Err(err) => return error_with("OS_ERROR", format!("Cannot access file: {}", err)),
    };
    if file_size > MAX_FILE_SIZE {
        return error_with(
            "FILE_TOO_LARGE",
            format!(
                "File too large: {} (max {})",
                format_size(file_size),
                format_size(MAX_FILE_SIZE)
            ),
        );
    }

    let bytes = match tokio::fs::read(&target_path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            return error_with("PERMISSION_ERROR", format!("Permission denied: {}", file_path))
        }
        Err(err) => return error_with("OS_ERROR", format!("Cannot read file: {}", err)),
    };

    // NUL byte in the head means binary; don't dump it at the model.
    if bytes.iter().take(8192).any(|b| *b == 0) {
        return error_with(
            "BINARY_FILE",
            format!("Binary file detected: {} ({})", file_path, format_size(file_size)),
        );
    }

    let text = String::from_utf8_lossy(&bytes);
    let all_lines: Vec<&str> = text.lines().collect();
    let total_lines = all_lines.len();
    let shown = &all_lines[..total_lines.min(limit)];

    let mut output = vec![
        format!("File: {}:{}", input_name, file_path),
        format!("Size: {}", format_size(file_size)),
        String::new(),
    ];
    if total_lines > limit {
        output.push(format!("(Showing {} of {} lines)", limit, total_lines));
        output.push(String::new());
    }
    output.extend(shown.iter().map(|line| line.to_string()));
    output.join("\n")
}
