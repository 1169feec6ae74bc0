//! Turn agent output into a path -> content file map.
//!
//! Files are announced by a `FILE: <path>` line followed by a fenced
//! block. Unmarked blocks land in the caller's default file.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Generated files keyed by relative path.
pub type CodeFiles = BTreeMap<String, String>;

static FILE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:#+\s*|//\s*)?\**FILE:\**\s*`?([^\s`*]+)`?\s*$").expect("static file marker pattern")
});

/// Extract every file from `output`.
///
/// Blank output yields an empty map. Output with no fences is taken as a
/// single file, split on `FILE:` markers when present.
pub fn extract_code_files(output: &str, default_filename: &str) -> CodeFiles {
    let mut files = CodeFiles::new();
    if output.trim().is_empty() {
        return files;
    }

    let mut pending_path: Option<String> = None;
    let mut block: Option<Vec<&str>> = None;
    let mut found_fence = false;

    for line in output.lines() {
        if let Some(lines) = block.as_mut() {
            if line.trim_start().starts_with("```") {
                let path = pending_path.take().unwrap_or_else(|| default_filename.to_string());
                store(&mut files, path, &lines.join("\n"), default_filename);
                block = None;
            } else {
                lines.push(line);
            }
            continue;
        }

        if line.trim_start().starts_with("```") {
            found_fence = true;
            block = Some(Vec::new());
        } else if let Some(caps) = FILE_MARKER_RE.captures(line) {
            pending_path = Some(caps[1].to_string());
        }
    }

    // Unterminated final fence.
    if let Some(lines) = block {
        let path = pending_path.take().unwrap_or_else(|| default_filename.to_string());
        store(&mut files, path, &lines.join("\n"), default_filename);
    }

    if !found_fence {
        return extract_unfenced(output, default_filename);
    }
    files
}

fn extract_unfenced(output: &str, default_filename: &str) -> CodeFiles {
    let mut files = CodeFiles::new();
    let mut current: Option<String> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in output.lines() {
        if let Some(caps) = FILE_MARKER_RE.captures(line) {
            if let Some(path) = current.take() {
                store(&mut files, path, &lines.join("\n"), default_filename);
            } else if lines.iter().any(|l| !l.trim().is_empty()) {
                store(&mut files, default_filename.to_string(), &lines.join("\n"), default_filename);
            }
            lines.clear();
            current = Some(caps[1].to_string());
        } else {
            lines.push(line);
        }
    }

    let path = current.unwrap_or_else(|| default_filename.to_string());
    store(&mut files, path, &lines.join("\n"), default_filename);
    files
}

fn store(files: &mut CodeFiles, path: String, content: &str, default_filename: &str) {
    let content = content.trim_matches('\n');
    if content.trim().is_empty() {
        return;
    }
    if path == default_filename {
        if let Some(existing) = files.get_mut(&path) {
            existing.push_str("\n\n");
            existing.push_str(content);
            return;
        }
    }
    files.insert(path, content.to_string());
}

/// Fence info string for a path, by extension.
pub fn fence_language(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("py") => "python",
        Some("rs") => "rust",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("go") => "go",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("md") => "markdown",
        _ => "",
    }
}

/// Render files back in the `FILE:` + fence format agents are asked for.
pub fn render_code_files(files: &CodeFiles) -> String {
    files
        .iter()
        .map(|(path, content)| {
            format!(
                "FILE: {}\n```{}\n{}\n```\n",
                path,
                fence_language(path),
                content.trim_end()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
