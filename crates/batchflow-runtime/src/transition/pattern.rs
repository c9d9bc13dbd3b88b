//! Outcome pattern matching.

/// Matches `text` against a glob `pattern`.
///
/// `*` matches any sequence of characters, including none, and `?` matches
/// exactly one character. Matching is case-sensitive.
pub fn matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Last `*` seen and the text position it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, from)) => {
                    p = star + 1;
                    t = from + 1;
                    backtrack = Some((star, from + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Specificity of a pattern: the number of `*` and then `?` wildcards.
///
/// Lower values are more specific.
pub fn specificity(pattern: &str) -> (usize, usize) {
    pattern.chars().fold((0, 0), |(stars, marks), c| match c {
        '*' => (stars + 1, marks),
        '?' => (stars, marks + 1),
        _ => (stars, marks),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns() {
        assert!(matches("COMPLETED", "COMPLETED"));
        assert!(!matches("COMPLETED", "completed"));
        assert!(!matches("COMPLETED", "COMPLETED_WITH_SKIPS"));
        assert!(matches("", ""));
        assert!(!matches("", "A"));
    }

    #[test]
    fn star_matches_any_sequence() {
        assert!(matches("*", ""));
        assert!(matches("*", "FAILED"));
        assert!(matches("COMPLETED*", "COMPLETED"));
        assert!(matches("COMPLETED*", "COMPLETED_WITH_SKIPS"));
        assert!(matches("*ED", "FAILED"));
        assert!(matches("C*D", "COMPLETED"));
        assert!(matches("*A*B*", "xxAyyBzz"));
        assert!(!matches("C*X", "COMPLETED"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        assert!(matches("FAIL?D", "FAILED"));
        assert!(!matches("FAIL?D", "FAILD"));
        assert!(matches("?", "A"));
        assert!(!matches("?", ""));
        assert!(matches("*?", "A"));
        assert!(!matches("??*", "A"));
    }

    #[test]
    fn specificity_counts_wildcards() {
        assert_eq!(specificity("FAILED"), (0, 0));
        assert_eq!(specificity("FAIL?D"), (0, 1));
        assert_eq!(specificity("*"), (1, 0));
        assert_eq!(specificity("*?*"), (2, 1));
    }
}
