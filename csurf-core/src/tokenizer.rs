//! Line normalisation and tokenisation shared by every text format.

/// Normalises a raw line: tabs become spaces, CR/LF are dropped, anything
/// from the first `//` on is removed, and the result is trimmed.
pub fn trim_line(line: &str) -> String {
    let mut s: String = line
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '\t' { ' ' } else { c })
        .collect();
    if let Some(pos) = s.find("//") {
        s.truncate(pos);
    }
    s.trim().to_string()
}

/// Splits a normalised line on whitespace. A double quoted run is a single
/// token with the quotes removed; an unterminated quote runs to end of line.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else { break };

        let mut token = String::new();
        if first == '"' {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                token.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
        }
        tokens.push(token);
    }

    tokens
}

/// `trim_line` followed by `tokenize`.
pub fn line_tokens(raw: &str) -> Vec<String> {
    tokenize(&trim_line(raw))
}

/// True for lines every zone-format reader ignores: blank lines and lines starting with `/`.
pub fn is_ignorable(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('/')
}

/// Quotes a token when it would not survive tokenisation as-is.
pub fn quote_token(token: &str) -> String {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        format!("\"{}\"", token)
    } else {
        token.to_string()
    }
}

/// Joins tokens back into a line that tokenises to the same tokens.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| quote_token(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_strips_comment_and_whitespace() {
        assert_eq!(trim_line("\tFader1\tTrackVolume // the fader\r\n"), "Fader1 TrackVolume");
        assert_eq!(trim_line("// whole line"), "");
        assert_eq!(trim_line("   "), "");
    }

    #[test]
    fn test_tokenize_quoted() {
        assert_eq!(
            tokenize(r#"Zone "VST: ReaEQ (Cockos)" "ReaEQ""#),
            vec!["Zone", "VST: ReaEQ (Cockos)", "ReaEQ"]
        );
    }

    #[test]
    fn test_tokenize_unterminated_quote_runs_to_end() {
        assert_eq!(tokenize(r#"Display "abc def"#), vec!["Display", "abc def"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(line_tokens("  // nothing").is_empty());
    }

    #[test]
    fn test_tokenize_idempotent_over_join() {
        let lines = [
            "Shift+Fader1 TrackVolumeDB [ -60.0>12.0 ]",
            r#"Display1 FixedTextDisplay "Gain Reduction" Feedback=No"#,
            r#"Zone "JS: Saturation" "Sat""#,
        ];
        for line in lines {
            let once = tokenize(&trim_line(line));
            let twice = tokenize(&trim_line(&join_tokens(&once)));
            assert_eq!(once, twice, "line: {}", line);
        }
    }

    #[test]
    fn test_is_ignorable() {
        assert!(is_ignorable(""));
        assert!(is_ignorable("/ comment"));
        assert!(!is_ignorable("Zone Home"));
    }
}
