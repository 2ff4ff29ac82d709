//! Parser for the `tingrc` config file: whitespace `key value` pairs, one
//! per line, unknown keys ignored. Mirrors the original implementation's
//! `for l in r: pair = l.strip().split(); config[pair[0]] = pair[1]`.

use std::collections::HashMap;
use std::path::Path;

use ting_error::TingError;

pub fn parse_file(path: &Path) -> Result<HashMap<String, String>, TingError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TingError::Config(format!("couldn't read config file {}: {e}", path.display()))
    })?;
    Ok(parse_str(&contents))
}

pub fn parse_str(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else { continue };
        let Some(value) = tokens.next() else { continue };
        map.insert(key.to_string(), value.to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let map = parse_str("W abcdef\nZ 123456\n\nSocksPort 9008\n");
        assert_eq!(map.get("W").unwrap(), "abcdef");
        assert_eq!(map.get("Z").unwrap(), "123456");
        assert_eq!(map.get("SocksPort").unwrap(), "9008");
    }

    #[test]
    fn ignores_blank_and_key_only_lines() {
        let map = parse_str("\nJustAKey\n  \nW abc\n");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("W").unwrap(), "abc");
    }

    #[test]
    fn extra_tokens_on_a_line_are_ignored() {
        let map = parse_str("W abc def ghi\n");
        assert_eq!(map.get("W").unwrap(), "abc");
    }
}
