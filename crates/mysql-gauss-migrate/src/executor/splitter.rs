//! Split a SQL script into statements.
//!
//! The splitter tracks quoting state, so a `;` inside a string literal or a
//! quoted identifier does not end a statement. Comments are dropped. Outside
//! quotes, a line break and the indentation around it collapse into a single
//! space; inside quotes the text is kept verbatim.

/// Split `script` into statements, without their terminating `;`.
///
/// Text after the last `;` is returned as a final statement when it is not
/// blank.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                // A doubled quote is an escaped quote, not the end.
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                // Line comment: skip to the line break and let it join lines.
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                push_separator(&mut current);
            }
            '\r' | '\n' => {
                while chars.peek().is_some_and(|n| n.is_whitespace()) {
                    chars.next();
                }
                push_separator(&mut current);
            }
            ';' => {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }

    statements
}

/// Replace trailing whitespace with one space, unless at statement start.
fn push_separator(current: &mut String) {
    let trimmed = current.trim_end().len();
    current.truncate(trimmed);
    if !current.is_empty() {
        current.push(' ');
    }
}
