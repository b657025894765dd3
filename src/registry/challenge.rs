//! `WWW-Authenticate` challenge parsing
//!
//! Implements the RFC 2616 grammar the registry token flow relies on:
//!
//! ```text
//! challenge   = auth-scheme 1*SP 1#auth-param
//! auth-param  = token "=" ( token | quoted-string )
//! token       = 1*<any CHAR except CTLs or separators>
//! separators  = "(" | ")" | "<" | ">" | "@" | "," | ";" | ":" | "\" | <">
//!             | "/" | "[" | "]" | "?" | "=" | "{" | "}" | SP | HT
//! ```

use std::collections::HashMap;

const IS_TOKEN: u8 = 1;
const IS_SPACE: u8 = 1 << 1;

const fn is_separator(c: u8) -> bool {
    matches!(
        c,
        b' ' | b'\t'
            | b'"'
            | b'('
            | b')'
            | b','
            | b'/'
            | b':'
            | b';'
            | b'<'
            | b'='
            | b'>'
            | b'?'
            | b'@'
            | b'['
            | b']'
            | b'\\'
            | b'{'
            | b'}'
    )
}

const fn build_octet_types() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        let is_ctl = c <= 31 || c == 127;
        let is_char = c <= 127;
        let mut t = 0;
        if matches!(c, b' ' | b'\t' | b'\r' | b'\n') {
            t |= IS_SPACE;
        }
        if is_char && !is_ctl && !is_separator(c) {
            t |= IS_TOKEN;
        }
        table[i] = t;
        i += 1;
    }
    table
}

static OCTET_TYPES: [u8; 256] = build_octet_types();

/// One parsed challenge: lower-cased scheme plus its parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    pub parameters: HashMap<String, String>,
}

impl Challenge {
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn is_bearer(&self) -> bool {
        self.scheme == "bearer"
    }
}

/// Parse every `WWW-Authenticate` value of a response.
/// Values without a scheme are dropped.
pub fn parse_challenges<'a, I>(header_values: I) -> Vec<Challenge>
where
    I: IntoIterator<Item = &'a str>,
{
    header_values
        .into_iter()
        .filter_map(|value| {
            let (scheme, parameters) = parse_value_and_params(value);
            if scheme.is_empty() {
                None
            } else {
                Some(Challenge { scheme, parameters })
            }
        })
        .collect()
}

/// Realm and service of the last bearer challenge, if any
pub fn bearer_realm(challenges: &[Challenge]) -> Option<(String, String)> {
    challenges.iter().rev().find(|c| c.is_bearer()).map(|c| {
        (
            c.parameter("realm").unwrap_or_default().to_string(),
            c.parameter("service").unwrap_or_default().to_string(),
        )
    })
}

fn parse_value_and_params(header: &str) -> (String, HashMap<String, String>) {
    let mut params = HashMap::new();
    let (scheme, mut rest) = expect_token(header);
    if scheme.is_empty() {
        return (String::new(), params);
    }
    let scheme = scheme.to_ascii_lowercase();

    // The first parameter follows the scheme without a comma
    let mut first = true;
    loop {
        rest = skip_space(rest);
        if !first {
            match rest.strip_prefix(',') {
                Some(after) => rest = skip_space(after),
                None => break,
            }
        }
        first = false;

        let (key, after_key) = expect_token(rest);
        if key.is_empty() {
            break;
        }
        let Some(after_eq) = after_key.strip_prefix('=') else {
            break;
        };
        let (value, after_value) = expect_token_or_quoted(after_eq);
        if value.is_empty() {
            break;
        }
        params.insert(key.to_ascii_lowercase(), value);
        rest = after_value;
    }

    (scheme, params)
}

fn expect_token(s: &str) -> (&str, &str) {
    let end = s
        .bytes()
        .position(|b| OCTET_TYPES[b as usize] & IS_TOKEN == 0)
        .unwrap_or(s.len());
    s.split_at(end)
}

fn skip_space(s: &str) -> &str {
    let start = s
        .bytes()
        .position(|b| OCTET_TYPES[b as usize] & IS_SPACE == 0)
        .unwrap_or(s.len());
    &s[start..]
}

/// Token or quoted-string; an unterminated quote yields an empty value
fn expect_token_or_quoted(s: &str) -> (String, &str) {
    let Some(quoted) = s.strip_prefix('"') else {
        let (token, rest) = expect_token(s);
        return (token.to_string(), rest);
    };

    let bytes = quoted.as_bytes();
    let mut value = Vec::with_capacity(bytes.len());
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escape {
            escape = false;
            value.push(b);
        } else if b == b'\\' {
            escape = true;
        } else if b == b'"' {
            let value = String::from_utf8_lossy(&value).into_owned();
            return (value, &quoted[i + 1..]);
        } else {
            value.push(b);
        }
    }
    (String::new(), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(header: &str) -> Challenge {
        let mut challenges = parse_challenges([header]);
        assert_eq!(challenges.len(), 1, "expected one challenge for {:?}", header);
        challenges.remove(0)
    }

    #[test]
    fn test_octet_table() {
        assert_ne!(OCTET_TYPES[b'a' as usize] & IS_TOKEN, 0);
        assert_ne!(OCTET_TYPES[b'-' as usize] & IS_TOKEN, 0);
        assert_eq!(OCTET_TYPES[b'=' as usize] & IS_TOKEN, 0);
        assert_eq!(OCTET_TYPES[b'"' as usize] & IS_TOKEN, 0);
        assert_eq!(OCTET_TYPES[0x7f] & IS_TOKEN, 0);
        assert_eq!(OCTET_TYPES[0xc3] & IS_TOKEN, 0);
        assert_ne!(OCTET_TYPES[b'\t' as usize] & IS_SPACE, 0);
        assert_eq!(OCTET_TYPES[b'x' as usize] & IS_SPACE, 0);
    }

    #[test]
    fn test_bearer_challenge() {
        let challenge = single(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
        );
        assert_eq!(challenge.scheme, "bearer");
        assert_eq!(challenge.parameters.len(), 2);
        assert_eq!(challenge.parameter("realm"), Some("https://auth.example.com/token"));
        assert_eq!(challenge.parameter("service"), Some("registry.example.com"));
    }

    #[test]
    fn test_docker_hub_challenge_with_scope() {
        let challenge = single(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull""#,
        );
        assert_eq!(
            challenge.parameter("scope"),
            Some("repository:library/busybox:pull")
        );
    }

    #[test]
    fn test_scheme_and_keys_are_lower_cased_values_are_not() {
        let challenge = single(r#"BEARER Realm="https://Auth.Example.com/Token", SERVICE=Registry"#);
        assert_eq!(challenge.scheme, "bearer");
        assert_eq!(challenge.parameter("realm"), Some("https://Auth.Example.com/Token"));
        assert_eq!(challenge.parameter("service"), Some("Registry"));
    }

    #[test]
    fn test_unquoted_tokens_and_spacing() {
        let challenge = single("Basic   realm=registry ,  charset=UTF-8");
        assert_eq!(challenge.scheme, "basic");
        assert_eq!(challenge.parameter("realm"), Some("registry"));
        assert_eq!(challenge.parameter("charset"), Some("UTF-8"));
    }

    #[test]
    fn test_quoted_string_escapes() {
        let challenge = single(r#"Bearer realm="a \"quoted\" \\ realm",service="s""#);
        assert_eq!(challenge.parameter("realm"), Some(r#"a "quoted" \ realm"#));
        assert_eq!(challenge.parameter("service"), Some("s"));
    }

    #[test]
    fn test_malformed_parameter_keeps_earlier_ones() {
        let missing_eq = single(r#"Bearer realm="https://auth/token",service"#);
        assert_eq!(missing_eq.parameter("realm"), Some("https://auth/token"));
        assert_eq!(missing_eq.parameter("service"), None);

        let unterminated = single(r#"Bearer realm="https://auth/token",service="never closed"#);
        assert_eq!(unterminated.parameters.len(), 1);

        let empty_value = single(r#"Bearer realm="",service="s""#);
        assert!(empty_value.parameters.is_empty());
    }

    #[test]
    fn test_scheme_only() {
        let challenge = single("Negotiate");
        assert_eq!(challenge.scheme, "negotiate");
        assert!(challenge.parameters.is_empty());
    }

    #[test]
    fn test_values_without_scheme_are_discarded() {
        let challenges = parse_challenges(["", "  Bearer realm=x", r#""quoted""#]);
        assert!(challenges.is_empty());
    }

    #[test]
    fn test_multiple_header_values() {
        let challenges = parse_challenges([
            r#"Basic realm="registry""#,
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
        ]);
        assert_eq!(challenges.len(), 2);
        assert_eq!(
            bearer_realm(&challenges),
            Some((
                "https://auth.example.com/token".to_string(),
                "registry.example.com".to_string()
            ))
        );
    }

    #[test]
    fn test_no_bearer_challenge() {
        let challenges = parse_challenges([r#"Basic realm="registry""#]);
        assert_eq!(bearer_realm(&challenges), None);
    }

    #[test]
    fn test_non_ascii_value_is_preserved() {
        let challenge = single("Bearer realm=\"https://auth.example.com/tökén\"");
        assert_eq!(challenge.parameter("realm"), Some("https://auth.example.com/tökén"));
    }
}
