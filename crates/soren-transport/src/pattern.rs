//! Subject pattern matching.

/// Returns `true` if `subject` matches `pattern`.
///
/// Both are dot-separated. In the pattern, `*` matches exactly one segment
/// and a trailing `>` matches one or more remaining segments.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');

    for token in pattern.split('.') {
        match token {
            ">" => return subject_tokens.next().is_some(),
            "*" => {
                if subject_tokens.next().is_none() {
                    return false;
                }
            }
            literal => {
                if subject_tokens.next() != Some(literal) {
                    return false;
                }
            }
        }
    }

    subject_tokens.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::subject_matches;

    #[test]
    fn test_literal() {
        assert!(subject_matches("soren.cpu.a.resize", "soren.cpu.a.resize"));
        assert!(!subject_matches("soren.cpu.a.resize", "soren.cpu.a.resize.x"));
        assert!(!subject_matches("soren.cpu.a.resize", "soren.cpu.a"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let pattern = "soren.v2.bin.*.abc123.resize";
        assert!(subject_matches(pattern, "soren.v2.bin.tenant-9.abc123.resize"));
        assert!(!subject_matches(pattern, "soren.v2.bin.abc123.resize"));
        assert!(!subject_matches(pattern, "soren.v2.bin.t.u.abc123.resize"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(subject_matches("soren.cpu.>", "soren.cpu.a.job.progress"));
        assert!(!subject_matches("soren.cpu.>", "soren.cpu"));
    }
}
