//! Shell-like tokenizer for command strings.

use std::mem;

use super::CommandError;

/// Splits a `command` string into argv-like tokens.
///
/// The grammar is shell-like, but intentionally not POSIX-compliant:
///
/// - Space and tab separate tokens; repeated separators collapse. Other whitespace chars
///   (e.g., newlines) are a part of tokens.
/// - Single and double quotes group chars into a single token. A quote char of the other kind
///   is literal within quotes. Quoted segments adjacent to unquoted text are merged
///   into one token: `"hello"world` becomes `helloworld`. An empty quoted segment `""`
///   produces an empty token.
/// - Backslash escapes the next char unconditionally, *including* within single quotes;
///   `'It\'s'` is tokenized as `It's`.
/// - The end-of-options marker `--` is emitted as an ordinary token.
///
/// # Errors
///
/// - [`CommandError::Empty`] if the command is empty or consists of whitespace only.
/// - [`CommandError::UnclosedQuote`] if a quote is opened and never closed.
/// - [`CommandError::TrailingEscape`] if the command ends with an unconsumed backslash.
///
/// # Examples
///
/// ```
/// # use proc_harness::tokenize;
/// let tokens = tokenize(r#"git commit -m "Initial commit" -- 'src/lib.rs'"#)?;
/// assert_eq!(
///     tokens,
///     ["git", "commit", "-m", "Initial commit", "--", "src/lib.rs"]
/// );
/// # Ok::<_, proc_harness::CommandError>(())
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", ret, err))]
pub fn tokenize(command: &str) -> Result<Vec<String>, CommandError> {
    if command.trim().is_empty() {
        return Err(CommandError::Empty);
    }

    let mut tokens = vec![];
    let mut current = String::new();
    let mut quote_char = None::<char>;
    let mut escaped = false;
    // Distinguishes an empty quoted token (`""`) from the absence of a token.
    let mut has_content = false;

    for ch in command.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            has_content = true;
            continue;
        }

        match (ch, quote_char) {
            ('\\', _) => escaped = true,
            ('"' | '\'', None) => {
                quote_char = Some(ch);
                has_content = true;
            }
            (_, Some(delimiter)) if ch == delimiter => quote_char = None,
            (' ' | '\t', None) => {
                if has_content || !current.is_empty() {
                    tokens.push(mem::take(&mut current));
                    has_content = false;
                }
            }
            _ => {
                current.push(ch);
                has_content = true;
            }
        }
    }

    if let Some(delimiter) = quote_char {
        return Err(CommandError::UnclosedQuote(delimiter));
    }
    if escaped {
        return Err(CommandError::TrailingEscape);
    }
    if has_content || !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Quotes `token` so that [`tokenize()`] parses it back as a single token.
pub(crate) fn quote(token: &str) -> String {
    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|ch| matches!(ch, ' ' | '\t' | '"' | '\'' | '\\'));
    if !needs_quotes {
        return token.to_owned();
    }

    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('\'');
    for ch in token.chars() {
        if matches!(ch, '\'' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}
