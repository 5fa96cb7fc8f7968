// RTMP connect request model

use std::collections::HashMap;

use crate::utils::{make_stream_url, parse_tc_url, trim_url_component};

use super::RtmpCommand;

/// Parsed from the connect command. Mutable only during the connect
/// phase; immutable for the rest of the connection's lifetime.
#[derive(Clone, Debug)]
pub struct RtmpRequest {
    /// URL schema
    pub schema: String,

    /// The tcUrl as received
    pub tc_url: String,

    /// Target host
    pub host: String,

    /// Target port
    pub port: u16,

    /// Virtual host
    pub vhost: String,

    /// True when the vhost was not explicitly set
    pub vhost_is_default: bool,

    /// Application name
    pub app: String,

    /// Stream name, set by publish / play
    pub stream: String,

    /// pageUrl reported by the client
    pub page_url: String,

    /// swfUrl reported by the client
    pub swf_url: String,

    /// Query parameters of the tcUrl
    pub params: HashMap<String, String>,

    /// AMF object encoding requested by the client
    pub object_encoding: Option<u32>,
}

impl RtmpRequest {
    /// Parses the request out of a connect command
    ///
    /// # Return value
    ///
    /// Returns the parsed request, or an error when the tcUrl or app
    /// is missing or malformed
    pub fn from_connect_command(cmd: &RtmpCommand) -> Result<RtmpRequest, ()> {
        let cmd_obj = match cmd.get_argument("cmdObj") {
            Some(o) => o,
            None => {
                return Err(());
            }
        };

        let tc_url = match cmd_obj.get_object_property("tcUrl") {
            Some(u) => u.get_string().to_string(),
            None => {
                return Err(());
            }
        };

        let parts = parse_tc_url(&tc_url)?;

        // The app property takes precedence over the tcUrl path
        let app = match cmd_obj.get_object_property("app") {
            Some(a) => trim_url_component(a.get_string()),
            None => parts.app.clone(),
        };

        if app.is_empty() {
            return Err(());
        }

        let page_url = cmd_obj
            .get_object_property("pageUrl")
            .map(|v| v.get_string().to_string())
            .unwrap_or_default();

        let swf_url = cmd_obj
            .get_object_property("swfUrl")
            .map(|v| v.get_string().to_string())
            .unwrap_or_default();

        let object_encoding = cmd_obj.get_object_property("objectEncoding").and_then(|oe| {
            if oe.is_undefined() {
                None
            } else {
                Some(oe.get_integer() as u32)
            }
        });

        Ok(RtmpRequest {
            schema: parts.schema,
            tc_url,
            host: parts.host,
            port: parts.port,
            vhost: parts.vhost,
            vhost_is_default: parts.vhost_is_default,
            app,
            stream: "".to_string(),
            page_url,
            swf_url,
            params: parts.params,
            object_encoding,
        })
    }

    /// Sets the stream name, trimming whitespace and slashes
    pub fn set_stream(&mut self, stream: &str) {
        self.stream = trim_url_component(stream);
    }

    /// Gets the registry key for this request's stream
    pub fn stream_url(&self) -> String {
        make_stream_url(&self.vhost, self.vhost_is_default, &self.app, &self.stream)
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AMF0Value;
    use indexmap::IndexMap;

    fn make_connect(tc_url: &str, app: Option<&str>) -> RtmpCommand {
        let mut cmd = RtmpCommand::new("connect");
        cmd.set_argument("transId", AMF0Value::Number { value: 1.0 });

        let mut obj = IndexMap::new();

        if let Some(a) = app {
            obj.insert("app".to_string(), AMF0Value::String {
                value: a.to_string(),
            });
        }

        obj.insert("tcUrl".to_string(), AMF0Value::String {
            value: tc_url.to_string(),
        });

        cmd.set_argument("cmdObj", AMF0Value::Object { properties: obj });

        cmd
    }

    #[test]
    fn test_parse_connect() {
        let cmd = make_connect("rtmp://127.0.0.1/live", Some("live"));
        let mut req = RtmpRequest::from_connect_command(&cmd).unwrap();

        assert_eq!(req.schema, "rtmp");
        assert_eq!(req.host, "127.0.0.1");
        assert_eq!(req.port, 1935);
        assert_eq!(req.app, "live");
        assert!(req.vhost_is_default);

        req.set_stream(" livestream/ ");
        assert_eq!(req.stream, "livestream");
        assert_eq!(req.stream_url(), "live/livestream");
    }

    #[test]
    fn test_parse_connect_vhost() {
        let cmd = make_connect("rtmp://127.0.0.1/live?vhost=a.example.com", None);
        let mut req = RtmpRequest::from_connect_command(&cmd).unwrap();

        assert_eq!(req.vhost, "a.example.com");

        req.set_stream("demo");
        assert_eq!(req.stream_url(), "a.example.com/live/demo");
    }

    #[test]
    fn test_parse_connect_missing_tc_url() {
        let mut cmd = RtmpCommand::new("connect");
        cmd.set_argument("cmdObj", AMF0Value::Object {
            properties: IndexMap::new(),
        });

        assert!(RtmpRequest::from_connect_command(&cmd).is_err());
    }
}
