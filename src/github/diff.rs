use super::types::ChangedFileRecord;

/// Per-file addition/deletion counts from a unified diff.
///
/// Each file section starts with `diff --git a/{path} b/{path}`; the `b/`
/// path is reported so renames show their new name. Counting only starts
/// after the first `@@` hunk header of a section, so `---`/`+++` file
/// headers are never mistaken for changed lines.
pub fn file_stats(raw_diff: &str) -> Vec<ChangedFileRecord> {
    let mut files: Vec<ChangedFileRecord> = Vec::new();
    let mut in_hunk = false;

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            let path = rest
                .split_whitespace()
                .nth(1)
                .map(|b| b.strip_prefix("b/").unwrap_or(b))
                .unwrap_or(rest)
                .to_string();
            files.push(ChangedFileRecord {
                path,
                additions: 0,
                deletions: 0,
            });
            in_hunk = false;
            continue;
        }

        if line.starts_with("@@") {
            in_hunk = true;
            continue;
        }

        let Some(file) = files.last_mut().filter(|_| in_hunk) else {
            continue;
        };
        if line.starts_with('+') {
            file.additions += 1;
        } else if line.starts_with('-') {
            file.deletions += 1;
        }
    }

    files
}
