use std::iter::Peekable;
use std::str::Chars;

// A row never shows more than the terminal width; this only bounds what a job can park in its ring.
const MAX_LINE_CHARS: usize = 1024;

/// Makes a job's output line safe to paint into the cell grid.
///
/// Escape sequences (CSI, OSC, DCS/SOS/PM/APC) are dropped whole, tabs become a
/// single space, other control and bidi formatting characters are removed, and
/// the result is trimmed.
pub fn clean_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut kept = 0usize;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => skip_escape(&mut chars),
            '\t' => {
                out.push(' ');
                kept += 1;
            }
            c if c.is_control() || is_bidi_control(c) => {}
            c => {
                out.push(c);
                kept += 1;
            }
        }
        if kept >= MAX_LINE_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }

    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

fn skip_escape(chars: &mut Peekable<Chars<'_>>) {
    match chars.next() {
        Some('[') => {
            // CSI ends at the first final byte.
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
        }
        Some(']') => skip_string(chars, true),
        Some('P' | 'X' | '^' | '_') => skip_string(chars, false),
        _ => {}
    }
}

// OSC may end with BEL; every string sequence may end with ESC '\'.
fn skip_string(chars: &mut Peekable<Chars<'_>>, bel_ends: bool) {
    while let Some(c) = chars.next() {
        if bel_ends && c == '\x07' {
            return;
        }
        if c == '\x1b' && chars.peek() == Some(&'\\') {
            chars.next();
            return;
        }
    }
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::clean_log_line;

    #[test]
    fn drops_color_codes_and_titles() {
        let got = clean_log_line("Step 1/4 \u{1b}[32mRUN\u{1b}[0m make \u{1b}]0;docker\u{7}ok");
        assert_eq!(got, "Step 1/4 RUN make ok");
    }

    #[test]
    fn drops_string_sequences_terminated_by_st() {
        assert_eq!(clean_log_line("a\u{1b}Ppayload\u{1b}\\b"), "ab");
        assert_eq!(clean_log_line("a\u{1b}]8;;http://x\u{1b}\\b"), "ab");
    }

    #[test]
    fn trims_and_flattens_controls() {
        assert_eq!(clean_log_line("  \tfetch\tlayer\r\n"), "fetch layer");
        assert_eq!(clean_log_line("x\u{202e}y"), "xy");
        assert_eq!(clean_log_line(" \r\n\t "), "");
    }

    #[test]
    fn caps_very_long_lines() {
        let got = clean_log_line(&"a".repeat(5000));
        assert!(got.ends_with("...[truncated]"));
        assert!(got.chars().count() < 1100);
    }
}
