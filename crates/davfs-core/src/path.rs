//! Canonical-path handling.
//!
//! Directories end in `/`, files never do, and the root is the literal `/`.
//! Normalization is pure lexical cleaning (no I/O, no symlink resolution) —
//! the same contract as Go's `path.Clean`, with the trailing slash restored
//! afterward because it carries meaning `path.Clean` would otherwise erase.

use crate::error::{FsError, FsResult};

/// Turn a client-supplied path into canonical form.
///
/// 1. remember whether the input ended in `/`
/// 2. lexically collapse `.`, `..` and repeated separators
/// 3. re-append the trailing `/` if it was present and got cleaned away
/// 4. reject anything that doesn't start with `/`
pub fn normalize(input: &str) -> FsResult<String> {
    let trailing_slash = input.ends_with('/');
    let cleaned = clean(input);
    let mut out = cleaned;
    if trailing_slash && !out.ends_with('/') {
        out.push('/');
    }
    if !out.starts_with('/') {
        return Err(FsError::InvalidArgument);
    }
    Ok(out)
}

/// Lexical path cleaning equivalent to Go's `path.Clean`, operating on `/`
/// separated components. Does not special-case a trailing slash; callers
/// that care about it (i.e. `normalize`) restore it themselves.
fn clean(input: &str) -> String {
    let rooted = input.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for component in input.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                if let Some(last) = stack.last() {
                    if *last != ".." {
                        stack.pop();
                        continue;
                    }
                }
                if !rooted {
                    stack.push("..");
                }
            }
            c => stack.push(c),
        }
    }
    let joined = stack.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Split a canonical path into `(parent, basename)`, mirroring Go's
/// `path.Split`: the parent keeps its trailing `/`, the basename doesn't
/// carry one even if `path` names a directory.
pub fn split(path: &str) -> (&str, &str) {
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    match trimmed.rfind('/') {
        Some(idx) => (&path[..idx + 1], &trimmed[idx + 1..]),
        None => ("", trimmed),
    }
}

/// The last path component, with any trailing `/` stripped. The root `/`
/// stats as `/` itself, matching the Go original's special case.
pub fn basename(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    let (_, base) = split(path);
    base
}
