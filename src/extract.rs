//! Candidate extraction from a line of source text
//!
//! The hook engine never parses the traced language. It takes the raw text
//! of the current line and pulls out:
//!
//! - dotted paths (`data.T`, `np.pi`) to evaluate in the frame's scope
//! - bare names (`data`, `total`) to look up in the frame's scope
//! - assignment targets (`x` in `x = compute()`) to resolve when the routine returns
//!
//! Extraction is lexical and deliberately loose: a token that is not really
//! an expression simply fails to resolve and is skipped.

use std::collections::BTreeSet;

/// Tokens extracted from one line, each set sorted and deduplicated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineTokens<'a> {
    /// Attribute paths with at least one `.`
    pub dotted: BTreeSet<&'a str>,
    /// Names that appear in the line other than as an attribute segment
    pub names: BTreeSet<&'a str>,
}

impl<'a> LineTokens<'a> {
    pub fn is_empty(&self) -> bool {
        self.dotted.is_empty() && self.names.is_empty()
    }
}

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `token` could name a binding: a letter or `_`, then word characters
pub fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => chars.all(is_word_char),
        _ => false,
    }
}

/// Split `line` into dotted paths and bare names
///
/// ```
/// use huella::extract::tokenize;
///
/// let tokens = tokenize("result = data.T @ weights + 2.5");
/// assert_eq!(tokens.dotted.iter().copied().collect::<Vec<_>>(), vec!["data.T"]);
/// assert_eq!(
///     tokens.names.iter().copied().collect::<Vec<_>>(),
///     vec!["data", "result", "weights"]
/// );
/// ```
pub fn tokenize(line: &str) -> LineTokens<'_> {
    let mut tokens = LineTokens::default();

    for run in line.split(|c: char| !(is_word_char(c) || c == '.')) {
        if run.is_empty() {
            continue;
        }

        let mut segments = run.split('.');
        if let Some(head) = segments.next() {
            if is_identifier(head) {
                tokens.names.insert(head);
            }
        }

        if run.contains('.') && run.split('.').all(is_identifier) {
            tokens.dotted.insert(run);
        }
    }

    tokens
}

/// Names bound by a plain assignment statement on this line
///
/// Handles chained (`a = b = 1`), tuple (`a, b = pair`), annotated
/// (`n: int = 0`) and augmented (`total += x`) assignments. Keyword
/// arguments, defaults and comparisons are not assignments.
///
/// ```
/// use huella::extract::assignment_targets;
///
/// assert_eq!(assignment_targets("a, (b, c) = 1, (2, 3)"), vec!["a", "b", "c"]);
/// assert_eq!(assignment_targets("x = y = compute(n=3)"), vec!["x", "y"]);
/// assert!(assignment_targets("if x == 1:").is_empty());
/// assert!(assignment_targets("    color='red', label='data')").is_empty());
/// ```
pub fn assignment_targets(line: &str) -> Vec<&str> {
    let splits = top_level_assignments(line);
    if splits.is_empty() {
        return Vec::new();
    }

    let mut targets = Vec::new();
    let mut start = 0;
    for &eq in &splits {
        collect_targets(&line[start..eq], &mut targets);
        start = eq + 1;
    }

    let mut seen = BTreeSet::new();
    targets.retain(|t| seen.insert(*t));
    targets
}

/// Byte offsets of every `=` that acts as an assignment operator
///
/// Empty for continuation lines of a call started above: a line that closes
/// a bracket it never opened, or a balanced line ending in `,`. The `=` signs
/// on those are keyword arguments.
fn top_level_assignments(line: &str) -> Vec<usize> {
    let bytes = line.as_bytes();
    let mut positions = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut code_end = bytes.len();

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }

        match b {
            b'\'' | b'"' => quote = Some(b),
            b'#' => {
                code_end = i;
                break;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                // closes a bracket opened on an earlier line: continuation of a call
                if depth < 0 {
                    return Vec::new();
                }
            }
            b'=' if depth == 0 => {
                let prev = if i > 0 { bytes[i - 1] } else { 0 };
                let prev2 = if i > 1 { bytes[i - 2] } else { 0 };
                let next = bytes.get(i + 1).copied().unwrap_or(0);

                let comparison = next == b'='
                    || prev == b'='
                    || prev == b'!'
                    || prev == b':'
                    || ((prev == b'<' || prev == b'>') && prev2 != prev);
                if !comparison {
                    positions.push(i);
                }
            }
            _ => {}
        }
    }

    if depth == 0 && line[..code_end].trim_end().ends_with(',') {
        return Vec::new();
    }
    positions
}

/// Push the identifiers bound by one target segment (text left of an `=`)
fn collect_targets<'a>(segment: &'a str, out: &mut Vec<&'a str>) {
    // augmented operator glued to the `=`
    let segment = segment.trim_end_matches(|c: char| "+-*/%&|^@<>".contains(c));

    // annotation: `name: type`
    let segment = match split_top_level(segment, ':').first() {
        Some(head) => *head,
        None => segment,
    };

    collect_pattern(segment, out);
}

fn collect_pattern<'a>(pattern: &'a str, out: &mut Vec<&'a str>) {
    let pattern = pattern.trim().trim_start_matches('*').trim();
    if pattern.is_empty() {
        return;
    }

    if let Some(inner) = strip_brackets(pattern) {
        for part in split_top_level(inner, ',') {
            collect_pattern(part, out);
        }
        return;
    }

    let parts = split_top_level(pattern, ',');
    if parts.len() > 1 {
        for part in parts {
            collect_pattern(part, out);
        }
    } else if is_identifier(pattern) {
        out.push(pattern);
    }
}

/// Inner text of `(...)` or `[...]` when the brackets enclose the whole pattern
fn strip_brackets(pattern: &str) -> Option<&str> {
    let close = match pattern.as_bytes().first()? {
        b'(' => b')',
        b'[' => b']',
        _ => return None,
    };
    if pattern.as_bytes().last() != Some(&close) {
        return None;
    }

    let mut depth = 0i32;
    for (i, b) in pattern.bytes().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 && i != pattern.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&pattern[1..pattern.len() - 1])
}

fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
