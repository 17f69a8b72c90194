use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// First 64 bits of the content hash, as 16 lowercase hex characters.
pub fn chunk_id(relative_path: &str, start_line: usize, end_line: usize, normalized_code: &str) -> String {
    let seed = format!("{relative_path}\n{start_line}\n{end_line}\n{normalized_code}");
    let full = sha256_hex(seed.as_bytes());
    full[..16].to_string()
}

pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    (chars + 3) / 4
}

pub fn snippet(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len).collect();
    out.push_str("...");
    out
}

/// Redact emails, bearer tokens and long opaque strings from log lines.
pub fn redact_secrets(input: &str) -> String {
    let patterns = [
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
        r"(?i)bearer\s+[a-z0-9._-]+",
        r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b",
        r"[a-fA-F0-9]{32,}",
    ];
    let mut out = input.to_string();
    for pattern in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            out = re.replace_all(&out, "[REDACTED]").to_string();
        }
    }
    out
}

fn is_all_digits(token: &str) -> bool {
    token.as_bytes().iter().all(|b| b.is_ascii_digit())
}

fn is_all_hex(token: &str) -> bool {
    token.len() >= 16 && token.as_bytes().iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_noise_token(token: &str) -> bool {
    if token.is_empty() || token.len() > 64 {
        return true;
    }
    if token.len() == 1 {
        return true;
    }
    if is_all_hex(token) {
        return true;
    }
    if is_all_digits(token) {
        return token.len() >= 3;
    }
    false
}

/// Split on non-alphanumeric boundaries, then further split identifiers on
/// camelCase/PascalCase/snake_case/SCREAMING_CASE boundaries, lowercasing
/// every token. Acronym runs split before the last
/// capital when it starts a new capitalized word (`XMLHttpRequest` ->
/// `xml`, `http`, `request`).
fn split_identifier(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();

    for (i, &ch) in chars.iter().enumerate() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            continue;
        }
        if i > 0 {
            let prev = chars[i - 1];
            let prev_is_lower_or_digit = prev.is_lowercase() || prev.is_ascii_digit();
            let prev_is_upper = prev.is_uppercase();
            let next_is_lower = chars.get(i + 1).map(|c| c.is_lowercase()).unwrap_or(false);
            let split_here = ch.is_uppercase()
                && ((prev_is_lower_or_digit) || (prev_is_upper && next_is_lower));
            if split_here && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        }
        current.push(ch.to_ascii_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Tokenize text into a flat stream (whole words, lowercase, noise-filtered).
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut buf = String::new();
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            buf.push(ch);
        } else if !buf.is_empty() {
            words.push(std::mem::take(&mut buf));
        }
    }
    if !buf.is_empty() {
        words.push(buf);
    }

    let mut tokens = Vec::new();
    for word in words {
        for part in split_identifier(&word) {
            if !is_noise_token(&part) {
                tokens.push(part);
            }
        }
    }
    tokens
}

/// Tokenize and count occurrences, returning the document length (number of
/// tokens). Shared by the BM25 postings builder and the chunker's token
/// estimate, so both agree on what a token is.
pub fn tokenize_counts(text: &str, counts: &mut HashMap<String, usize>) -> usize {
    let tokens = tokenize(text);
    let doc_len = tokens.len();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    doc_len
}

/// Normalize a symbol name to canonical form: lowercase words separated by
/// single spaces.
pub fn normalize_symbol(name: &str) -> String {
    let mut parts = Vec::new();
    for raw_word in name.split(|c: char| !c.is_alphanumeric()) {
        if raw_word.is_empty() {
            continue;
        }
        parts.extend(split_identifier(raw_word));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_sixteen_hex_chars() {
        let id = chunk_id("a.ts", 1, 3, "fn foo() {}");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn chunk_id_is_deterministic() {
        let a = chunk_id("a.ts", 1, 3, "fn foo() {}");
        let b = chunk_id("a.ts", 1, 3, "fn foo() {}");
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_id_differs_for_different_content() {
        let a = chunk_id("a.ts", 1, 3, "fn foo() {}");
        let b = chunk_id("a.ts", 1, 3, "fn bar() {}");
        assert_ne!(a, b);
    }

    #[test]
    fn tokenize_splits_camel_case() {
        let tokens = tokenize("getUserById");
        assert!(tokens.contains(&"get".to_string()));
        assert!(tokens.contains(&"user".to_string()));
        assert!(tokens.contains(&"by".to_string()));
        assert!(tokens.contains(&"id".to_string()));
    }

    #[test]
    fn normalize_symbol_matches_spec_examples() {
        assert_eq!(normalize_symbol("getUserById"), "get user by id");
        assert_eq!(normalize_symbol("get_user_by_id"), "get user by id");
        assert_eq!(normalize_symbol("XMLHttpRequest"), "xml http request");
    }
}
