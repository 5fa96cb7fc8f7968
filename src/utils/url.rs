// tcUrl parsing utils

use std::collections::HashMap;

use super::parse_query_string_simple;

/// Default port for the rtmp schema
pub const DEFAULT_PORT_RTMP: u16 = 1935;

/// Default port for the http schema
pub const DEFAULT_PORT_HTTP: u16 = 80;

/// Default port for the https schema
pub const DEFAULT_PORT_HTTPS: u16 = 443;

/// Parsed parts of a tcUrl (schema://host[:port]/app[?params])
pub struct TcUrlParts {
    /// URL schema (rtmp, http, https)
    pub schema: String,

    /// Host name
    pub host: String,

    /// Port (default depends on the schema)
    pub port: u16,

    /// Virtual host. Defaults to the host name,
    /// overridden by a query parameter named 'vhost'
    pub vhost: String,

    /// True if the vhost was not explicitly overridden
    pub vhost_is_default: bool,

    /// Application name
    pub app: String,

    /// Query parameters
    pub params: HashMap<String, String>,
}

/// Gets the default port for an URL schema
fn default_port_for_schema(schema: &str) -> u16 {
    match schema {
        "http" => DEFAULT_PORT_HTTP,
        "https" => DEFAULT_PORT_HTTPS,
        _ => DEFAULT_PORT_RTMP,
    }
}

/// Strips whitespace and leading / trailing slashes from a path component
pub fn trim_url_component(component: &str) -> String {
    component.trim().trim_matches('/').trim().to_string()
}

/// Parses a tcUrl as provided by the connect command
///
/// # Arguments
///
/// * `tc_url` - The tcUrl string
///
/// # Return value
///
/// Returns the parsed parts, or an error if the URL is malformed
pub fn parse_tc_url(tc_url: &str) -> Result<TcUrlParts, ()> {
    let schema_split: Vec<&str> = tc_url.splitn(2, "://").collect();

    if schema_split.len() != 2 {
        return Err(());
    }

    let schema = schema_split[0].trim().to_lowercase();

    if schema.is_empty() {
        return Err(());
    }

    let rest = schema_split[1];

    let (authority, path_and_query) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };

    if authority.is_empty() {
        return Err(());
    }

    let (host, port) = match authority.rfind(':') {
        Some(i) => {
            let host_part = &authority[..i];
            let port_part = &authority[i + 1..];

            match port_part.parse::<u16>() {
                Ok(p) => (host_part.to_string(), p),
                Err(_) => {
                    return Err(());
                }
            }
        }
        None => (authority.to_string(), default_port_for_schema(&schema)),
    };

    if host.is_empty() {
        return Err(());
    }

    let (path, query) = match path_and_query.find('?') {
        Some(i) => (&path_and_query[..i], &path_and_query[i + 1..]),
        None => (path_and_query, ""),
    };

    let app = trim_url_component(path);
    let params = parse_query_string_simple(query);

    let (vhost, vhost_is_default) = match params.get("vhost") {
        Some(v) if !v.is_empty() => (v.clone(), false),
        _ => (host.clone(), true),
    };

    Ok(TcUrlParts {
        schema,
        host,
        port,
        vhost,
        vhost_is_default,
        app,
        params,
    })
}

/// Builds the stream URL used as the key in the stream registry
///
/// The vhost is elided when it was not explicitly set
pub fn make_stream_url(vhost: &str, vhost_is_default: bool, app: &str, stream: &str) -> String {
    if vhost_is_default {
        format!("{}/{}", app, stream)
    } else {
        format!("{}/{}/{}", vhost, app, stream)
    }
}

// Tests
