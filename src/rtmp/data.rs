// RTMP data message codec

use std::{collections::HashMap, sync::LazyLock};

use crate::amf::{AMF0Value, AmfDecodingCursor, AmfError};

/// RTMP data message (AMF0 data, message type 18)
pub struct RtmpData {
    /// Data tag
    pub tag: String,

    /// Arguments
    pub arguments: HashMap<String, AMF0Value>,
}

static RTMP_DATA_CODES: LazyLock<HashMap<&'static str, Vec<&'static str>>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, Vec<&'static str>> = HashMap::new();

        m.insert("@setDataFrame", vec!["method", "dataObj"]);
        m.insert("onFI", vec!["info"]);
        m.insert("onMetaData", vec!["dataObj"]);
        m.insert("|RtmpSampleAccess", vec!["bool1", "bool2"]);

        m
    });

impl RtmpData {
    /// Creates RtmpData
    pub fn new(tag: &str) -> RtmpData {
        RtmpData {
            tag: tag.to_string(),
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

    /// Gets string representation of the data for debug logging
    pub fn to_debug_string(&self) -> String {
        let mut s = format!("{} {}\n", self.tag, "{");

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

    /// Encodes data
    pub fn encode(&self) -> Vec<u8> {
        let x = AMF0Value::String {
            value: self.tag.clone(),
        };

        let mut buf = x.encode();

        if let Some(arg_list) = RTMP_DATA_CODES.get(self.tag.as_str()) {
            for arg_name in arg_list {
                if let Some(val) = self.arguments.get(*arg_name) {
                    buf.extend(val.encode());
                }
            }
        }

        buf
    }

    /// Decodes data from bytes
    pub fn decode(data: &[u8]) -> Result<RtmpData, AmfError> {
        let mut cursor = AmfDecodingCursor::new(data);

        let tag_amf = AMF0Value::read(&mut cursor, data)?;
        let tag = tag_amf.get_string();

        let mut d = RtmpData::new(tag);

        if let Some(arg_list) = RTMP_DATA_CODES.get(tag) {
            let mut i: usize = 0;

            while i < arg_list.len() && !cursor.ended() {
                let val = AMF0Value::read(&mut cursor, data)?;

                d.set_argument(arg_list[i], val);

                i += 1;
            }
        }

        Ok(d)
    }
}

// Tests
