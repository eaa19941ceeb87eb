// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic routing-key patterns.
//!
//! `*` matches exactly one dot-separated segment; `#` matches zero or
//! more segments. `#` is only honored as a full segment, matching how
//! topic exchanges treat it.

/// Does `pattern` match `key`?
pub fn matches(pattern: &str, key: &str) -> bool {
    let pat: Vec<&str> = pattern.split('.').collect();
    let segs: Vec<&str> = key.split('.').collect();
    matches_from(&pat, &segs)
}

fn matches_from(pat: &[&str], segs: &[&str]) -> bool {
    match pat.split_first() {
        None => segs.is_empty(),
        Some((&"#", rest)) => {
            // '#' absorbs zero or more segments; try every split point.
            (0..=segs.len()).any(|n| matches_from(rest, &segs[n..]))
        }
        Some((&"*", rest)) => match segs.split_first() {
            Some((_, tail)) => matches_from(rest, tail),
            None => false,
        },
        Some((lit, rest)) => match segs.split_first() {
            Some((seg, tail)) if seg == lit => matches_from(rest, tail),
            _ => false,
        },
    }
}

/// The dot-separated segment at `index`, if present.
///
/// Sysinfo routing keys carry the CN uuid as their third segment
/// (`ur.sysinfo.<cn_uuid>`).
pub fn segment(key: &str, index: usize) -> Option<&str> {
    key.split('.').nth(index)
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
