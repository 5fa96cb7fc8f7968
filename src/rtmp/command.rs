// RTMP command codec

use std::{collections::HashMap, sync::LazyLock};

use crate::amf::{AMF0Value, AmfDecodingCursor, AmfError};

/// RTMP command
///
/// A command is an AMF0 command name followed by a fixed list of
/// positional values; the argument names here are only labels for the
/// positions each command defines.
pub struct RtmpCommand {
    /// Command name
    pub cmd: String,

    /// Arguments
    pub arguments: HashMap<String, AMF0Value>,
}

static RTMP_COMMAND_CODES: LazyLock<HashMap<&'static str, Vec<&'static str>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, Vec<&'static str>> = HashMap::new();

        m.insert("_result", vec!["transId", "cmdObj", "info"]);
        m.insert("_error", vec!["transId", "cmdObj", "info", "streamId"]);
        m.insert("onStatus", vec!["transId", "cmdObj", "info"]);
        m.insert("onBWDone", vec!["transId", "cmdObj"]);
        m.insert("releaseStream", vec!["transId", "cmdObj", "streamName"]);
        m.insert("getStreamLength", vec!["transId", "cmdObj", "streamId"]);
        m.insert("FCPublish", vec!["transId", "cmdObj", "streamName"]);
        m.insert("FCUnpublish", vec!["transId", "cmdObj", "streamName"]);
        m.insert("FCSubscribe", vec!["transId", "cmdObj", "streamName"]);
        m.insert("onFCPublish", vec!["transId", "cmdObj", "info"]);
        m.insert("onFCUnpublish", vec!["transId", "cmdObj", "info"]);
        m.insert("connect", vec!["transId", "cmdObj", "args"]);
        m.insert("call", vec!["transId", "cmdObj", "args"]);
        m.insert("createStream", vec!["transId", "cmdObj"]);
        m.insert("close", vec!["transId", "cmdObj"]);
        m.insert(
            "play",
            vec!["transId", "cmdObj", "streamName", "start", "duration", "reset"],
        );
        m.insert("play2", vec!["transId", "cmdObj", "params"]);
        m.insert("deleteStream", vec!["transId", "cmdObj", "streamId"]);
        m.insert("closeStream", vec!["transId", "cmdObj"]);
        m.insert("receiveAudio", vec!["transId", "cmdObj", "bool"]);
        m.insert("receiveVideo", vec!["transId", "cmdObj", "bool"]);
        m.insert("publish", vec!["transId", "cmdObj", "streamName", "type"]);
        m.insert("seek", vec!["transId", "cmdObj", "ms"]);
        m.insert("pause", vec!["transId", "cmdObj", "pause", "ms"]);

        m
    });

impl RtmpCommand {
    /// Creates RtmpCommand
    pub fn new(cmd: &str) -> RtmpCommand {
        RtmpCommand {
            cmd: cmd.to_string(),
            arguments: HashMap::new(),
        }
    }

    /// Sets argument
    pub fn set_argument(&mut self, arg_name: &str, value: AMF0Value) {
        self.arguments.insert(arg_name.to_string(), value);
    }

    /// Gets argument
    pub fn get_argument(&self, arg_name: &str) -> Option<&AMF0Value> {
        self.arguments.get(arg_name)
    }

    /// Gets the transaction ID of the command
    pub fn get_trans_id(&self) -> f64 {
        match self.get_argument("transId") {
            Some(t) => t.get_float(),
            None => 0.0,
        }
    }

    /// Gets string representation of the command for debug logging
    pub fn to_debug_string(&self) -> String {
        let mut s = format!("{} {}\n", self.cmd, "{");

        for (arg_name, arg_val) in &self.arguments {
            s.push_str(&format!(
                "    '{}' = {}\n",
                arg_name,
                arg_val.to_debug_string("    ")
            ));
        }

        s.push('}');

        s
    }

    /// Encodes command
    pub fn encode(&self) -> Vec<u8> {
        let x = AMF0Value::String {
            value: self.cmd.clone(),
        };

        let mut buf = x.encode();

        if let Some(arg_list) = RTMP_COMMAND_CODES.get(self.cmd.as_str()) {
            for arg_name in arg_list {
                match self.arguments.get(*arg_name) {
                    Some(val) => {
                        buf.extend(val.encode());
                    }
                    None => {
                        buf.extend(AMF0Value::Undefined.encode());
                    }
                }
            }
        }

        buf
    }

    /// Decodes command from bytes
    pub fn decode(data: &[u8]) -> Result<RtmpCommand, AmfError> {
        let mut cursor = AmfDecodingCursor::new(data);

        let cmd_amf = AMF0Value::read(&mut cursor, data)?;
        let cmd = cmd_amf.get_string();

        let mut c = RtmpCommand::new(cmd);

        if let Some(arg_list) = RTMP_COMMAND_CODES.get(cmd) {
            let mut i: usize = 0;

            while i < arg_list.len() && !cursor.ended() {
                let val = AMF0Value::read(&mut cursor, data)?;

                c.set_argument(arg_list[i], val);

                i += 1;
            }
        }

        Ok(c)
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_connect_round_trip() {
        let mut cmd = RtmpCommand::new("connect");
        cmd.set_argument("transId", AMF0Value::Number { value: 1.0 });

        let mut cmd_obj = IndexMap::new();
        cmd_obj.insert("app".to_string(), AMF0Value::String {
            value: "live".to_string(),
        });
        cmd_obj.insert("tcUrl".to_string(), AMF0Value::String {
            value: "rtmp://127.0.0.1/live".to_string(),
        });

        cmd.set_argument("cmdObj", AMF0Value::Object { properties: cmd_obj });

        let encoded = cmd.encode();
        let decoded = RtmpCommand::decode(&encoded).unwrap();

        assert_eq!(decoded.cmd, "connect");
        assert_eq!(decoded.get_trans_id(), 1.0);
        assert_eq!(
            decoded
                .get_argument("cmdObj")
                .unwrap()
                .get_object_property("tcUrl")
                .unwrap()
                .get_string(),
            "rtmp://127.0.0.1/live"
        );
    }

    #[test]
    fn test_publish_round_trip() {
        let mut cmd = RtmpCommand::new("publish");
        cmd.set_argument("transId", AMF0Value::Number { value: 5.0 });
        cmd.set_argument("cmdObj", AMF0Value::Null);
        cmd.set_argument("streamName", AMF0Value::String {
            value: "livestream".to_string(),
        });
        cmd.set_argument("type", AMF0Value::String {
            value: "live".to_string(),
        });

        let decoded = RtmpCommand::decode(&cmd.encode()).unwrap();

        assert_eq!(decoded.cmd, "publish");
        assert_eq!(decoded.get_argument("streamName").unwrap().get_string(), "livestream");
        assert_eq!(decoded.get_argument("type").unwrap().get_string(), "live");
    }

    #[test]
    fn test_unknown_command_keeps_name() {
        let cmd = RtmpCommand::new("somethingCustom");
        let decoded = RtmpCommand::decode(&cmd.encode()).unwrap();
        assert_eq!(decoded.cmd, "somethingCustom");
    }
}
