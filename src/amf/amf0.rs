// AMF0 value

use byteorder::{BigEndian, ByteOrder};
use indexmap::IndexMap;

use super::{AmfDecodingCursor, AmfError};

const AMF0_TYPE_NUMBER: u8 = 0x00;
const AMF0_TYPE_BOOL: u8 = 0x01;
const AMF0_TYPE_STRING: u8 = 0x02;
const AMF0_TYPE_OBJECT: u8 = 0x03;
const AMF0_TYPE_NULL: u8 = 0x05;
const AMF0_TYPE_UNDEFINED: u8 = 0x06;
const AMF0_TYPE_ECMA_ARRAY: u8 = 0x08;
const AMF0_TYPE_STRICT_ARRAY: u8 = 0x0A;
const AMF0_TYPE_DATE: u8 = 0x0B;
const AMF0_TYPE_LONG_STRING: u8 = 0x0C;

const AMF0_OBJECT_TERM_CODE: u8 = 0x09;

/// AMF0 compatible value
///
/// Object and EcmaArray keep their properties in insertion order.
/// Some encoders (FMLE among them) depend on the field ordering, so the
/// order in which properties are set is the order on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum AMF0Value {
    Number {
        value: f64,
    },
    Bool {
        value: bool,
    },
    String {
        value: String,
    },
    Object {
        properties: IndexMap<String, AMF0Value>,
    },
    Null,
    Undefined,
    EcmaArray {
        items: IndexMap<String, AMF0Value>,
    },
    StrictArray {
        items: Vec<AMF0Value>,
    },
    Date {
        timestamp: f64,
        time_zone: i16,
    },
    LongString {
        value: String,
    },
}

impl AMF0Value {
    /// Obtains a string representation of the value
    /// Used for debug logging purposes
    pub fn to_debug_string(&self, tabs: &str) -> String {
        match self {
            AMF0Value::Number { value } => {
                format!("{}", value)
            }
            AMF0Value::Bool { value } => {
                if *value {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            AMF0Value::String { value } => {
                format!("'{}'", value)
            }
            AMF0Value::Object { properties } => {
                let mut res = "{\n".to_string();

                for (key, value) in properties.iter() {
                    res.push_str(tabs);
                    res.push_str("    '");
                    res.push_str(key);
                    res.push_str("' = ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push('}');

                res
            }
            AMF0Value::Null => "NULL".to_string(),
            AMF0Value::Undefined => "UNDEFINED".to_string(),
            AMF0Value::EcmaArray { items } => {
                let mut res = "ARRAY [\n".to_string();

                for (key, value) in items.iter() {
                    res.push_str(tabs);
                    res.push_str("    '");
                    res.push_str(key);
                    res.push_str("' = ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push(']');

                res
            }
            AMF0Value::StrictArray { items } => {
                let mut res = "STRICT_ARRAY [\n".to_string();

                for value in items.iter() {
                    res.push_str(tabs);
                    res.push_str("    ");
                    res.push_str(&value.to_debug_string(&format!("{}    ", tabs)));
                    res.push('\n');
                }

                res.push_str(tabs);
                res.push(']');

                res
            }
            AMF0Value::Date { timestamp, .. } => {
                format!("DATE({})", timestamp)
            }
            AMF0Value::LongString { value } => {
                format!("L'{}'", value)
            }
        }
    }

    // Value check functions:

    /// Returns true if the value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, AMF0Value::Undefined)
    }

    /// Returns true if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, AMF0Value::Null)
    }

    /// Returns the value as boolean
    pub fn get_bool(&self) -> bool {
        match self {
            AMF0Value::Bool { value } => *value,
            AMF0Value::Number { value } => *value != 0.0,
            _ => false,
        }
    }

    /// Returns the value as integer
    pub fn get_integer(&self) -> i64 {
        match self {
            AMF0Value::Number { value } => *value as i64,
            AMF0Value::Date { timestamp, .. } => *timestamp as i64,
            _ => 0,
        }
    }

    /// Returns the value as float
    pub fn get_float(&self) -> f64 {
        match self {
            AMF0Value::Number { value } => *value,
            AMF0Value::Date { timestamp, .. } => *timestamp,
            _ => 0.0,
        }
    }

    /// Returns the value as string
    pub fn get_string(&self) -> &str {
        match self {
            AMF0Value::String { value } => value.as_str(),
            AMF0Value::LongString { value } => value.as_str(),
            _ => "",
        }
    }

    /// Returns the value as an ordered map of properties
    pub fn get_object(&self) -> Option<&IndexMap<String, AMF0Value>> {
        match self {
            AMF0Value::Object { properties } => Some(properties),
            AMF0Value::EcmaArray { items } => Some(items),
            _ => None,
        }
    }

    /// Gets the value of a property (for objects)
    pub fn get_object_property(&self, property_name: &str) -> Option<&AMF0Value> {
        self.get_object().and_then(|o| o.get(property_name))
    }

    /// Returns the value as array (Vec)
    pub fn get_array(&self) -> Option<&Vec<AMF0Value>> {
        match self {
            AMF0Value::StrictArray { items } => Some(items),
            _ => None,
        }
    }

    // Encoding functions:

    /// Encodes value into bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AMF0Value::Number { value } => {
                let mut buf = vec![AMF0_TYPE_NUMBER];
                buf.extend(Self::encode_number(*value));
                buf
            }
            AMF0Value::Bool { value } => {
                vec![AMF0_TYPE_BOOL, if *value { 0x01 } else { 0x00 }]
            }
            AMF0Value::String { value } => {
                let mut buf = vec![AMF0_TYPE_STRING];
                buf.extend(Self::encode_string(value));
                buf
            }
            AMF0Value::Object { properties } => {
                let mut buf = vec![AMF0_TYPE_OBJECT];
                buf.extend(Self::encode_object(properties));
                buf
            }
            AMF0Value::Null => vec![AMF0_TYPE_NULL],
            AMF0Value::Undefined => vec![AMF0_TYPE_UNDEFINED],
            AMF0Value::EcmaArray { items } => {
                let mut buf = vec![AMF0_TYPE_ECMA_ARRAY, 0, 0, 0, 0];
                BigEndian::write_u32(&mut buf[1..5], items.len() as u32);
                buf.extend(Self::encode_object(items));
                buf
            }
            AMF0Value::StrictArray { items } => {
                let mut buf = vec![AMF0_TYPE_STRICT_ARRAY, 0, 0, 0, 0];
                BigEndian::write_u32(&mut buf[1..5], items.len() as u32);

                for item in items {
                    buf.extend(item.encode());
                }

                buf
            }
            AMF0Value::Date {
                timestamp,
                time_zone,
            } => {
                let mut buf = vec![AMF0_TYPE_DATE, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
                BigEndian::write_f64(&mut buf[1..9], *timestamp);
                BigEndian::write_i16(&mut buf[9..11], *time_zone);
                buf
            }
            AMF0Value::LongString { value } => {
                let mut buf = vec![AMF0_TYPE_LONG_STRING, 0, 0, 0, 0];
                let str_bytes = value.as_bytes();
                BigEndian::write_u32(&mut buf[1..5], str_bytes.len() as u32);
                buf.extend(str_bytes);
                buf
            }
        }
    }

    /// Encodes number value (IEEE-754, big endian)
    pub fn encode_number(num: f64) -> Vec<u8> {
        let mut buf = vec![0; 8];
        BigEndian::write_f64(&mut buf, num);
        buf
    }

    /// Encodes string value (no marker, 2-byte length prefix)
    pub fn encode_string(s: &str) -> Vec<u8> {
        let str_bytes = s.as_bytes();
        let mut buf = vec![0x00; 2];
        BigEndian::write_u16(&mut buf, str_bytes.len() as u16);
        buf.extend(str_bytes);
        buf
    }

    /// Encodes the properties of an object, with the final terminator
    pub fn encode_object(o: &IndexMap<String, AMF0Value>) -> Vec<u8> {
        let mut buf = Vec::new();

        for (key, value) in o.iter() {
            buf.extend(Self::encode_string(key));
            buf.extend(value.encode());
        }

        buf.extend(Self::encode_string(""));
        buf.push(AMF0_OBJECT_TERM_CODE);

        buf
    }

    // Decoding functions:

    /// Peeks the marker byte of the next value in the buffer
    pub fn discover(buffer: &[u8]) -> Result<u8, AmfError> {
        match buffer.first() {
            Some(m) => Ok(*m),
            None => Err(AmfError::NeedMoreData),
        }
    }

    /// Reads a value from the buffer, advancing the cursor
    pub fn read(cursor: &mut AmfDecodingCursor, buffer: &[u8]) -> Result<AMF0Value, AmfError> {
        let marker = cursor.read(buffer, 1)?[0];

        match marker {
            AMF0_TYPE_NUMBER => {
                let b = cursor.read(buffer, 8)?;
                Ok(AMF0Value::Number {
                    value: BigEndian::read_f64(b),
                })
            }
            AMF0_TYPE_BOOL => {
                let b = cursor.read(buffer, 1)?;
                Ok(AMF0Value::Bool { value: b[0] != 0 })
            }
            AMF0_TYPE_STRING => {
                let value = Self::read_utf8(cursor, buffer)?;
                Ok(AMF0Value::String { value })
            }
            AMF0_TYPE_OBJECT => {
                let properties = Self::read_object_properties(cursor, buffer)?;
                Ok(AMF0Value::Object { properties })
            }
            AMF0_TYPE_NULL => Ok(AMF0Value::Null),
            AMF0_TYPE_UNDEFINED => Ok(AMF0Value::Undefined),
            AMF0_TYPE_ECMA_ARRAY => {
                // The count prefix is advisory, the terminator is authoritative
                cursor.skip(4)?;
                let items = Self::read_object_properties(cursor, buffer)?;
                Ok(AMF0Value::EcmaArray { items })
            }
            AMF0_TYPE_STRICT_ARRAY => {
                let b = cursor.read(buffer, 4)?;
                let count = BigEndian::read_u32(b) as usize;

                let mut items = Vec::with_capacity(count.min(1024));

                for _ in 0..count {
                    items.push(Self::read(cursor, buffer)?);
                }

                Ok(AMF0Value::StrictArray { items })
            }
            AMF0_TYPE_DATE => {
                let b = cursor.read(buffer, 10)?;
                Ok(AMF0Value::Date {
                    timestamp: BigEndian::read_f64(&b[0..8]),
                    time_zone: BigEndian::read_i16(&b[8..10]),
                })
            }
            AMF0_TYPE_LONG_STRING => {
                let b = cursor.read(buffer, 4)?;
                let len = BigEndian::read_u32(b) as usize;
                let str_bytes = cursor.read(buffer, len)?;

                match String::from_utf8(str_bytes.to_vec()) {
                    Ok(value) => Ok(AMF0Value::LongString { value }),
                    Err(_) => Err(AmfError::InvalidString),
                }
            }
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    /// Reads a length-prefixed UTF-8 string (no marker)
    fn read_utf8(cursor: &mut AmfDecodingCursor, buffer: &[u8]) -> Result<String, AmfError> {
        let b = cursor.read(buffer, 2)?;
        let len = BigEndian::read_u16(b) as usize;
        let str_bytes = cursor.read(buffer, len)?;

        match String::from_utf8(str_bytes.to_vec()) {
            Ok(s) => Ok(s),
            Err(_) => Err(AmfError::InvalidString),
        }
    }

    /// Reads object properties until the terminator sequence (00 00 09)
    fn read_object_properties(
        cursor: &mut AmfDecodingCursor,
        buffer: &[u8],
    ) -> Result<IndexMap<String, AMF0Value>, AmfError> {
        let mut properties = IndexMap::new();

        loop {
            let key = Self::read_utf8(cursor, buffer)?;

            if key.is_empty() {
                let term = cursor.read(buffer, 1)?;

                if term[0] == AMF0_OBJECT_TERM_CODE {
                    return Ok(properties);
                }

                return Err(AmfError::UnknownMarker(term[0]));
            }

            let value = Self::read(cursor, buffer)?;
            properties.insert(key, value);
        }
    }
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &AMF0Value) -> AMF0Value {
        let encoded = v.encode();
        let mut cursor = AmfDecodingCursor::new(&encoded);
        AMF0Value::read(&mut cursor, &encoded).unwrap()
    }

    #[test]
    fn test_scalar_round_trip() {
        for v in [
            AMF0Value::Number { value: 1935.0 },
            AMF0Value::Bool { value: true },
            AMF0Value::String {
                value: "livestream".to_string(),
            },
            AMF0Value::Null,
            AMF0Value::Undefined,
            AMF0Value::Date {
                timestamp: 1700000000000.0,
                time_zone: 0,
            },
            AMF0Value::LongString {
                value: "x".repeat(70000),
            },
        ] {
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn test_object_round_trip_preserves_order() {
        let mut properties = IndexMap::new();
        properties.insert("width".to_string(), AMF0Value::Number { value: 640.0 });
        properties.insert("height".to_string(), AMF0Value::Number { value: 360.0 });
        properties.insert(
            "encoder".to_string(),
            AMF0Value::String {
                value: "obs".to_string(),
            },
        );

        let v = AMF0Value::Object { properties };
        let decoded = round_trip(&v);

        let obj = decoded.get_object().unwrap();
        let keys: Vec<&String> = obj.keys().collect();

        assert_eq!(keys, vec!["width", "height", "encoder"]);
        assert_eq!(decoded, v);
    }

    #[test]
    fn test_ecma_array_round_trip() {
        let mut items = IndexMap::new();
        items.insert("duration".to_string(), AMF0Value::Number { value: 0.0 });
        items.insert("fps".to_string(), AMF0Value::Number { value: 30.0 });

        let v = AMF0Value::EcmaArray { items };
        let encoded = v.encode();

        // Marker, then the 4-byte count prefix
        assert_eq!(encoded[0], 0x08);
        assert_eq!(&encoded[1..5], &[0, 0, 0, 2]);

        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_strict_array_round_trip() {
        let v = AMF0Value::StrictArray {
            items: vec![
                AMF0Value::Number { value: 1.0 },
                AMF0Value::String {
                    value: "two".to_string(),
                },
                AMF0Value::Null,
            ],
        };

        assert_eq!(round_trip(&v), v);
    }

    #[test]
    fn test_object_wire_format() {
        let mut properties = IndexMap::new();
        properties.insert("app".to_string(), AMF0Value::String {
            value: "live".to_string(),
        });

        let v = AMF0Value::Object { properties };
        let encoded = v.encode();

        // 03 | 00 03 'app' | 02 00 04 'live' | 00 00 09
        assert_eq!(encoded[0], 0x03);
        assert_eq!(&encoded[1..3], &[0x00, 0x03]);
        assert_eq!(&encoded[3..6], b"app");
        assert_eq!(encoded[6], 0x02);
        assert_eq!(&encoded[encoded.len() - 3..], &[0x00, 0x00, 0x09]);
    }

    #[test]
    fn test_number_wire_format() {
        let encoded = AMF0Value::Number { value: 1.0 }.encode();
        assert_eq!(encoded, vec![0x00, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_discover() {
        assert_eq!(AMF0Value::discover(&[0x02, 0x00]).unwrap(), 0x02);
        assert_eq!(AMF0Value::discover(&[]), Err(AmfError::NeedMoreData));
    }

    #[test]
    fn test_decode_errors() {
        let mut cursor = AmfDecodingCursor::new(&[0x00, 0x01]);
        assert_eq!(
            AMF0Value::read(&mut cursor, &[0x00, 0x01]),
            Err(AmfError::NeedMoreData)
        );

        let bad = [0xF0u8];
        let mut cursor = AmfDecodingCursor::new(&bad);
        assert_eq!(
            AMF0Value::read(&mut cursor, &bad),
            Err(AmfError::UnknownMarker(0xF0))
        );
    }
}
