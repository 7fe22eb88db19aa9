//! Wildcard name matching for process rules.

/// Case-insensitive wildcard match of a process name.
///
/// `*` matches any run of characters (including none), `?` exactly one.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen, and the text index it is matched up to.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                // Let the last star swallow one more character and retry.
                Some((star_p, star_t)) => {
                    star = Some((star_p, star_t + 1));
                    p = star_p + 1;
                    t = star_t + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Returns true if any pattern matches `text`.
pub fn any_matches(patterns: &[String], text: &str) -> bool {
    patterns.iter().any(|p| pattern_matches(p, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_case_insensitive() {
        assert!(pattern_matches("Notepad.exe", "notepad.EXE"));
        assert!(!pattern_matches("notepad.exe", "notepad.ex"));
    }

    #[test]
    fn test_star_and_question() {
        assert!(pattern_matches("*.exe", "chrome.exe"));
        assert!(pattern_matches("chrom?.exe", "chrome.exe"));
        assert!(pattern_matches("*team*", "MSTeams.exe"));
        assert!(!pattern_matches("?.exe", "ab.exe"));
        assert!(pattern_matches("**", ""));
    }

    #[test]
    fn test_star_backtracks() {
        assert!(pattern_matches("a*b*c", "axxbxxbc"));
        assert!(pattern_matches("*.tmp.exe", "x.tmp.tmp.exe"));
        assert!(!pattern_matches("a*c", "abcd"));
        assert!(!pattern_matches("*x", ""));
    }

    #[test]
    fn test_any_matches() {
        let patterns = vec!["svchost.exe".to_string(), "conhost*".to_string()];
        assert!(any_matches(&patterns, "conhost.exe"));
        assert!(!any_matches(&patterns, "winword.exe"));
        assert!(!any_matches(&[], "winword.exe"));
    }
}
