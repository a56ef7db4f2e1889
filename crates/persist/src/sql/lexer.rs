//! Minimal tokenizer for caller-written SQL fragments.
//!
//! Only three things matter to the compiler: `?` placeholders, bare or
//! dotted identifiers that may name model properties, and everything else
//! (kept verbatim). Quoted strings, quoted identifiers and `--` comments are
//! skipped so a `?` inside them is never treated as a parameter.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Ident(&'a str),
    Placeholder,
}

pub(crate) fn tokenize(expr: &str) -> Vec<Token<'_>> {
    let bytes = expr.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < len {
                    if bytes[i] == q {
                        // A doubled quote is an escaped quote.
                        if i + 1 < len && bytes[i + 1] == q {
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'?' => {
                flush(&mut tokens, expr, text_start, i);
                tokens.push(Token::Placeholder);
                i += 1;
                text_start = i;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                let start = i;
                while i < len && is_ident_byte(bytes[i]) {
                    i += 1;
                }
                // `:name`, `@var`, `$1abc` and similar belong to something else.
                if !(prev.is_ascii_alphanumeric() || matches!(prev, b'_' | b'$' | b':' | b'@')) {
                    flush(&mut tokens, expr, text_start, start);
                    tokens.push(Token::Ident(&expr[start..i]));
                    text_start = i;
                }
            }
            c if c.is_ascii_digit() => {
                while i < len && is_ident_byte(bytes[i]) {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flush(&mut tokens, expr, text_start, len);
    tokens
}

fn flush<'a>(tokens: &mut Vec<Token<'a>>, expr: &'a str, from: usize, to: usize) {
    if to > from {
        tokens.push(Token::Text(&expr[from..to]));
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.')
}

/// Number of `?` placeholders outside quotes and comments.
pub(crate) fn count_placeholders(tokens: &[Token<'_>]) -> usize {
    tokens
        .iter()
        .filter(|t| matches!(t, Token::Placeholder))
        .count()
}
