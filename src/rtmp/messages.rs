// RTMP message generators

use byteorder::{BigEndian, ByteOrder};
use indexmap::IndexMap;

use crate::amf::AMF0Value;

use super::{
    MediaMessage, MessageHeader, RtmpCommand, RtmpData, PING_REQUEST, PING_RESPONSE,
    RTMP_SERVER_CAPABILITIES, RTMP_SERVER_FMS_VERSION, RTMP_SERVER_MODE,
};

/// Makes RTMP acknowledgement message
pub fn rtmp_make_ack(sequence_number: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], sequence_number);

    b
}

/// Makes RTMP window acknowledgement size message
pub fn rtmp_make_window_ack(size: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);

    b
}

/// Makes RTMP control message to indicate peer bandwidth
pub fn rtmp_make_peer_bandwidth_set_message(size: u32, limit_type: u8) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);
    b[16] = limit_type;

    b
}

/// Makes RTMP control message to indicate chunk size
pub fn rtmp_make_chunk_size_set_message(size: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00,
    ];

    BigEndian::write_u32(&mut b[12..16], size);

    b
}

/// Makes RTMP user control message to indicate stream status
/// Use one of these for status: STREAM_BEGIN, STREAM_EOF, STREAM_DRY
pub fn rtmp_make_stream_status_message(status: u16, stream_id: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00,
    ];

    BigEndian::write_u16(&mut b[12..14], status);
    BigEndian::write_u32(&mut b[14..18], stream_id);

    b
}

/// Makes RTMP ping request message
pub fn rtmp_make_ping_request(timestamp: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00,
    ];

    BigEndian::write_u16(&mut b[12..14], PING_REQUEST);
    BigEndian::write_u32(&mut b[14..18], timestamp);

    b
}

/// Makes RTMP ping response message, echoing the request timestamp
pub fn rtmp_make_ping_response(echo_timestamp: u32) -> Vec<u8> {
    let mut b = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00,
    ];

    BigEndian::write_u16(&mut b[12..14], PING_RESPONSE);
    BigEndian::write_u32(&mut b[14..18], echo_timestamp);

    b
}

/// Makes RTMP invoke command message
pub fn rtmp_make_invoke_message(cmd: &RtmpCommand, stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let payload = cmd.encode();
    let msg = MediaMessage::from_slice(MessageHeader::new_invoke(0, stream_id), &payload);

    msg.encode_chunks(out_chunk_size).flatten().to_vec()
}

/// Makes RTMP data message
pub fn rtmp_make_data_message(data: &RtmpData, stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let payload = data.encode();
    let msg = MediaMessage::from_slice(MessageHeader::new_data(0, 0, stream_id), &payload);

    msg.encode_chunks(out_chunk_size).flatten().to_vec()
}

/// Makes RTMP onStatus message
pub fn rtmp_make_status_message(
    stream_id: u32,
    level: &str,
    code: &str,
    description: Option<&str>,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("onStatus");

    cmd.set_argument("transId", AMF0Value::Number { value: 0.0 });
    cmd.set_argument("cmdObj", AMF0Value::Null);

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();

    info.insert("level".to_string(), AMF0Value::String {
        value: level.to_string(),
    });
    info.insert("code".to_string(), AMF0Value::String {
        value: code.to_string(),
    });

    if let Some(d) = description {
        info.insert("description".to_string(), AMF0Value::String {
            value: d.to_string(),
        });
    }

    cmd.set_argument("info", AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, stream_id, out_chunk_size)
}

/// Makes the onStatus rejection sent when a connect is redirected
///
/// The ex object carries the 302 code plus the redirect target, so clients
/// that understand redirection can reconnect to the other host.
pub fn rtmp_make_connect_rejected_redirect(
    redirect_tc_url: &str,
    redirect_full_url: &str,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("onStatus");

    cmd.set_argument("transId", AMF0Value::Number { value: 0.0 });
    cmd.set_argument("cmdObj", AMF0Value::Null);

    let mut ex: IndexMap<String, AMF0Value> = IndexMap::new();
    ex.insert("code".to_string(), AMF0Value::Number { value: 302.0 });
    ex.insert("redirect".to_string(), AMF0Value::String {
        value: redirect_tc_url.to_string(),
    });
    ex.insert("redirect2".to_string(), AMF0Value::String {
        value: redirect_full_url.to_string(),
    });

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();
    info.insert("level".to_string(), AMF0Value::String {
        value: "error".to_string(),
    });
    info.insert("code".to_string(), AMF0Value::String {
        value: "NetConnection.Connect.Rejected".to_string(),
    });
    info.insert("description".to_string(), AMF0Value::String {
        value: format!("Connection failed: redirect to {}", redirect_tc_url),
    });
    info.insert("ex".to_string(), AMF0Value::Object { properties: ex });

    cmd.set_argument("info", AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes RTMP sample access message
pub fn rtmp_make_sample_access_message(stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let mut data = RtmpData::new("|RtmpSampleAccess");

    data.set_argument("bool1", AMF0Value::Bool { value: true });
    data.set_argument("bool2", AMF0Value::Bool { value: true });

    rtmp_make_data_message(&data, stream_id, out_chunk_size)
}

/// Makes the NetStream.Data.Start data message sent before playback
pub fn rtmp_make_data_start_message(stream_id: u32, out_chunk_size: usize) -> Vec<u8> {
    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();
    info.insert("code".to_string(), AMF0Value::String {
        value: "NetStream.Data.Start".to_string(),
    });

    let mut data = RtmpData::new("onFI");
    data.set_argument("info", AMF0Value::Object { properties: info });

    rtmp_make_data_message(&data, stream_id, out_chunk_size)
}

/// Makes message to respond to a connect message
pub fn rtmp_make_connect_response(
    trans_id: f64,
    object_encoding: Option<u32>,
    server_version: &str,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("_result");

    cmd.set_argument("transId", AMF0Value::Number { value: trans_id });

    let mut cmd_obj: IndexMap<String, AMF0Value> = IndexMap::new();

    cmd_obj.insert("fmsVer".to_string(), AMF0Value::String {
        value: RTMP_SERVER_FMS_VERSION.to_string(),
    });
    cmd_obj.insert("capabilities".to_string(), AMF0Value::Number {
        value: RTMP_SERVER_CAPABILITIES,
    });
    cmd_obj.insert("mode".to_string(), AMF0Value::Number {
        value: RTMP_SERVER_MODE,
    });

    cmd.set_argument("cmdObj", AMF0Value::Object {
        properties: cmd_obj,
    });

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();

    info.insert("level".to_string(), AMF0Value::String {
        value: "status".to_string(),
    });
    info.insert("code".to_string(), AMF0Value::String {
        value: "NetConnection.Connect.Success".to_string(),
    });
    info.insert("description".to_string(), AMF0Value::String {
        value: "Connection succeeded.".to_string(),
    });

    match object_encoding {
        Some(oe) => {
            info.insert("objectEncoding".to_string(), AMF0Value::Number {
                value: oe as f64,
            });
        }
        None => {
            info.insert("objectEncoding".to_string(), AMF0Value::Number { value: 0.0 });
        }
    }

    let mut data: IndexMap<String, AMF0Value> = IndexMap::new();
    data.insert("server".to_string(), AMF0Value::String {
        value: "LiveHub".to_string(),
    });
    data.insert("version".to_string(), AMF0Value::String {
        value: server_version.to_string(),
    });

    info.insert("data".to_string(), AMF0Value::EcmaArray { items: data });

    cmd.set_argument("info", AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes the onBWDone call sent after the connect response
pub fn rtmp_make_on_bw_done(out_chunk_size: usize) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("onBWDone");

    cmd.set_argument("transId", AMF0Value::Number { value: 0.0 });
    cmd.set_argument("cmdObj", AMF0Value::Null);

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes message to respond to a createStream message
pub fn rtmp_make_create_stream_response(
    trans_id: f64,
    stream_index: u32,
    out_chunk_size: usize,
) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("_result");

    cmd.set_argument("transId", AMF0Value::Number { value: trans_id });
    cmd.set_argument("cmdObj", AMF0Value::Null);
    cmd.set_argument("info", AMF0Value::Number {
        value: stream_index as f64,
    });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes a generic _result with undefined info
/// Used to answer releaseStream / FCPublish
pub fn rtmp_make_result_undefined(trans_id: f64, out_chunk_size: usize) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("_result");

    cmd.set_argument("transId", AMF0Value::Number { value: trans_id });
    cmd.set_argument("cmdObj", AMF0Value::Undefined);
    cmd.set_argument("info", AMF0Value::Undefined);

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes a _result carrying a number
/// Used to answer getStreamLength
pub fn rtmp_make_result_number(trans_id: f64, value: f64, out_chunk_size: usize) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("_result");

    cmd.set_argument("transId", AMF0Value::Number { value: trans_id });
    cmd.set_argument("cmdObj", AMF0Value::Null);
    cmd.set_argument("info", AMF0Value::Number { value });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes the onFCPublish notification
pub fn rtmp_make_on_fc_publish(stream: &str, out_chunk_size: usize) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("onFCPublish");

    cmd.set_argument("transId", AMF0Value::Number { value: 0.0 });
    cmd.set_argument("cmdObj", AMF0Value::Null);

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();
    info.insert("code".to_string(), AMF0Value::String {
        value: "NetStream.Publish.Start".to_string(),
    });
    info.insert("description".to_string(), AMF0Value::String {
        value: format!("FCPublish to stream {}.", stream),
    });

    cmd.set_argument("info", AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Makes the onFCUnpublish notification
pub fn rtmp_make_on_fc_unpublish(stream: &str, out_chunk_size: usize) -> Vec<u8> {
    let mut cmd = RtmpCommand::new("onFCUnpublish");

    cmd.set_argument("transId", AMF0Value::Number { value: 0.0 });
    cmd.set_argument("cmdObj", AMF0Value::Null);

    let mut info: IndexMap<String, AMF0Value> = IndexMap::new();
    info.insert("code".to_string(), AMF0Value::String {
        value: "NetStream.Unpublish.Success".to_string(),
    });
    info.insert("description".to_string(), AMF0Value::String {
        value: format!("FCUnpublish to stream {}.", stream),
    });

    cmd.set_argument("info", AMF0Value::Object { properties: info });

    rtmp_make_invoke_message(&cmd, 0, out_chunk_size)
}

/// Build onMetaData bytes to be stored and replayed to subscribers
pub fn rtmp_build_metadata(data: &RtmpData) -> Vec<u8> {
    let mut res = RtmpData::new("onMetaData");

    match data.get_argument("dataObj") {
        Some(arg) => {
            res.set_argument("dataObj", arg.clone());
        }
        None => {
            res.set_argument("dataObj", AMF0Value::Null);
        }
    }

    res.encode()
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtmp::{ChunkDecoder, RTMP_TYPE_EVENT, RTMP_TYPE_INVOKE};

    #[test]
    fn test_window_ack_layout() {
        let b = rtmp_make_window_ack(2_500_000);

        assert_eq!(b.len(), 16);
        assert_eq!(b[7], 0x05);
        assert_eq!(BigEndian::read_u32(&b[12..16]), 2_500_000);
    }

    #[test]
    fn test_ping_response_echoes_timestamp() {
        let b = rtmp_make_ping_response(0xABCD1234);

        assert_eq!(BigEndian::read_u16(&b[12..14]), PING_RESPONSE);
        assert_eq!(BigEndian::read_u32(&b[14..18]), 0xABCD1234);

        // It decodes as a user control event message
        let mut decoder = ChunkDecoder::new();
        decoder.push_bytes(&b);
        let msg = decoder.poll_message().unwrap().unwrap();
        assert_eq!(msg.header.message_type, RTMP_TYPE_EVENT);
    }

    #[test]
    fn test_connect_response_decodes() {
        let b = rtmp_make_connect_response(1.0, Some(0), "0.1.0", 4096);

        let mut decoder = ChunkDecoder::new();
        decoder.set_in_chunk_size(4096).unwrap();
        decoder.push_bytes(&b);
        let msg = decoder.poll_message().unwrap().unwrap();

        assert_eq!(msg.header.message_type, RTMP_TYPE_INVOKE);

        let cmd = RtmpCommand::decode(msg.payload.flatten().as_ref()).unwrap();
        assert_eq!(cmd.cmd, "_result");
        assert_eq!(cmd.get_trans_id(), 1.0);

        let cmd_obj = cmd.get_argument("cmdObj").unwrap();
        assert_eq!(
            cmd_obj.get_object_property("fmsVer").unwrap().get_string(),
            RTMP_SERVER_FMS_VERSION
        );
        assert_eq!(
            cmd_obj.get_object_property("capabilities").unwrap().get_float(),
            127.0
        );

        let info = cmd.get_argument("info").unwrap();
        assert_eq!(
            info.get_object_property("objectEncoding").unwrap().get_float(),
            0.0
        );
    }

    #[test]
    fn test_redirect_response_carries_ex() {
        let b = rtmp_make_connect_rejected_redirect(
            "rtmp://b.example/live",
            "rtmp://b.example/live/stream",
            4096,
        );

        let mut decoder = ChunkDecoder::new();
        decoder.set_in_chunk_size(4096).unwrap();
        decoder.push_bytes(&b);
        let msg = decoder.poll_message().unwrap().unwrap();

        let cmd = RtmpCommand::decode(msg.payload.flatten().as_ref()).unwrap();
        assert_eq!(cmd.cmd, "onStatus");

        let info = cmd.get_argument("info").unwrap();
        assert_eq!(info.get_object_property("level").unwrap().get_string(), "error");
        assert_eq!(
            info.get_object_property("code").unwrap().get_string(),
            "NetConnection.Connect.Rejected"
        );

        let ex = info.get_object_property("ex").unwrap();
        assert_eq!(ex.get_object_property("code").unwrap().get_float(), 302.0);
        assert_eq!(
            ex.get_object_property("redirect").unwrap().get_string(),
            "rtmp://b.example/live"
        );
        assert_eq!(
            ex.get_object_property("redirect2").unwrap().get_string(),
            "rtmp://b.example/live/stream"
        );
    }
}
