//! Byte-level glob matching for the KEYS command.
//!
//! Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[^…]`/`[!…]`), and `\` escapes.
//! Patterns and subjects are raw bytes; a malformed pattern (unterminated class or trailing
//! escape) matches nothing.

/// Returns whether `text` matches the glob `pattern` in full.
#[must_use]
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0_usize;
    let mut t = 0_usize;
    // Backtracking state for the most recent `*`.
    let mut star_pattern: Option<usize> = None;
    let mut star_text = 0_usize;

    while t < text.len() {
        match consume_one(pattern, p, text[t]) {
            Consume::Star => {
                star_pattern = Some(p + 1);
                star_text = t;
                p += 1;
            }
            Consume::Matched(next) => {
                p = next;
                t += 1;
            }
            Consume::Failed => match star_pattern {
                Some(resume) => {
                    // Let the star swallow one more byte and retry.
                    star_text += 1;
                    t = star_text;
                    p = resume;
                }
                None => return false,
            },
        }
    }

    // Only trailing stars may remain unconsumed.
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

enum Consume {
    /// Pattern head is `*`.
    Star,
    /// Pattern head matched the byte; next pattern offset follows.
    Matched(usize),
    Failed,
}

fn consume_one(pattern: &[u8], p: usize, byte: u8) -> Consume {
    match pattern.get(p) {
        None => Consume::Failed,
        Some(b'*') => Consume::Star,
        Some(b'?') => Consume::Matched(p + 1),
        Some(b'[') => match match_class(&pattern[p + 1..], byte) {
            Some(consumed) => Consume::Matched(p + 1 + consumed),
            None => Consume::Failed,
        },
        Some(b'\\') => match pattern.get(p + 1) {
            Some(&escaped) if escaped == byte => Consume::Matched(p + 2),
            _ => Consume::Failed,
        },
        Some(&literal) if literal == byte => Consume::Matched(p + 1),
        Some(_) => Consume::Failed,
    }
}

/// Matches `byte` against the class body starting after `[`. Returns the number of pattern
/// bytes consumed (including the closing `]`) on success.
fn match_class(body: &[u8], byte: u8) -> Option<usize> {
    let mut i = 0_usize;
    let negated = matches!(body.first(), Some(b'^' | b'!'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let &head = body.get(i)?;
        if head == b']' && !first {
            break;
        }
        first = false;

        let low = if head == b'\\' {
            i += 1;
            *body.get(i)?
        } else {
            head
        };

        if body.get(i + 1) == Some(&b'-') && body.get(i + 2).is_some_and(|&next| next != b']') {
            let mut j = i + 2;
            let high = if body[j] == b'\\' {
                j += 1;
                *body.get(j)?
            } else {
                body[j]
            };
            if low <= byte && byte <= high {
                matched = true;
            }
            i = j + 1;
        } else {
            if byte == low {
                matched = true;
            }
            i += 1;
        }
    }

    if matched == negated {
        return None;
    }
    Some(i + 1)
}

#[cfg(test)]
mod tests {
    use super::glob_match;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"*".as_slice(), b"anything".as_slice(), true)]
    #[case(b"*", b"", true)]
    #[case(b"user:*", b"user:42", true)]
    #[case(b"user:*", b"session:42", false)]
    #[case(b"*:42", b"user:42", true)]
    #[case(b"u*r:*", b"user:42", true)]
    #[case(b"h?llo", b"hello", true)]
    #[case(b"h?llo", b"hllo", false)]
    #[case(b"h[ae]llo", b"hallo", true)]
    #[case(b"h[ae]llo", b"hillo", false)]
    #[case(b"h[^e]llo", b"hallo", true)]
    #[case(b"h[^e]llo", b"hello", false)]
    #[case(b"h[!e]llo", b"hallo", true)]
    #[case(b"key:[0-9]", b"key:7", true)]
    #[case(b"key:[0-9]", b"key:x", false)]
    #[case(b"exact", b"exact", true)]
    #[case(b"exact", b"exactly", false)]
    #[case(b"a\\*b", b"a*b", true)]
    #[case(b"a\\*b", b"aXb", false)]
    #[case(b"[]", b"x", false)]
    #[case(b"h[ae", b"ha", false)]
    #[case(b"trail\\", b"trail", false)]
    fn glob_grid(#[case] pattern: &[u8], #[case] text: &[u8], #[case] expected: bool) {
        assert_that!(glob_match(pattern, text), eq(expected));
    }

    #[rstest]
    fn star_backtracks_across_repeated_prefixes() {
        assert_that!(glob_match(b"*abc", b"ababc"), eq(true));
        assert_that!(glob_match(b"a*b*c", b"axxbxxc"), eq(true));
        assert_that!(glob_match(b"a*b*c", b"axxbxx"), eq(false));
    }
}
