// Query string utilities

use std::collections::HashMap;

/// Parses query string (does not decode percent escapes)
/// Used in order to parse tcUrl and play parameters
///
/// # Arguments
///
/// * `query_string` - The query string part of the URI
///
/// # Return value
///
/// A map with all the key-value pairs the query string contains
pub fn parse_query_string_simple(query_string: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();

    for part in query_string.split('&') {
        if part.is_empty() {
            continue;
        }

        if let Some((key, val)) = part.split_once('=') {
            result.insert(key.to_string(), val.to_string());
        }
    }

    result
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string_simple() {
        let params_1 = parse_query_string_simple("");

        assert!(params_1.is_empty());

        let params_2 = parse_query_string_simple("vhost=example.com");

        assert_eq!(params_2.get("vhost").unwrap(), "example.com");

        let params_3 = parse_query_string_simple("vhost=example.com&cache=clear");

        assert_eq!(params_3.get("vhost").unwrap(), "example.com");
        assert_eq!(params_3.get("cache").unwrap(), "clear");

        let params_4 = parse_query_string_simple("novalue&x=1");

        assert!(!params_4.contains_key("novalue"));
        assert_eq!(params_4.get("x").unwrap(), "1");
    }
}
