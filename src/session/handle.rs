// RTMP session orchestration

use std::sync::Arc;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::{mpsc::channel, Mutex},
};

use crate::{log::Logger, server::ServerContext};

use super::{
    do_session_cleanup, session_handshake, session_read_cycle, spawn_task_session_messages,
    spawn_task_to_send_pings, RtmpSessionReadStatus, SessionContext, SessionReadContext,
};

/// Handles an RTMP session from handshake to disconnect
///
/// # Arguments
///
/// * `logger` - The session logger
/// * `server_context` - The server context
/// * `session_context` - The session context
/// * `read_stream` - The stream to read from the client
/// * `write_stream` - The stream to write to the client
pub async fn handle_rtmp_session<
    TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin,
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin + 'static,
>(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_context: SessionContext,
    mut read_stream: TR,
    write_stream: Arc<Mutex<TW>>,
) {
    // Handshake

    if !session_handshake(&mut read_stream, &write_stream, &server_context, &logger).await {
        return;
    }

    // Channels: subscriber messages and the kill signal

    let (msg_sender, msg_receiver) = channel(server_context.config.live.queue_length.max(1));
    let (kill_sender, mut kill_receiver) = channel::<()>(1);

    // Subscriber message task

    spawn_task_session_messages(
        write_stream.clone(),
        server_context.config.clone(),
        session_context.clone(),
        msg_receiver,
        kill_sender.clone(),
        logger.clone(),
    );

    // Ping task

    let (cancel_pings_sender, cancel_pings_receiver) = channel::<()>(1);

    spawn_task_to_send_pings(
        write_stream.clone(),
        server_context.config.clone(),
        session_context.clone(),
        cancel_pings_receiver,
        logger.clone(),
    );

    // Read loop

    let mut read_context = SessionReadContext {
        session: session_context,
        msg_sender,
        kill_sender,
        read_status: RtmpSessionReadStatus::new(),
    };

    loop {
        let continue_loop = session_read_cycle(
            &mut read_stream,
            write_stream.as_ref(),
            &server_context,
            &mut read_context,
            &mut kill_receiver,
            &logger,
        )
        .await;

        if !continue_loop {
            break;
        }
    }

    // Cleanup

    let _ = cancel_pings_sender.try_send(());

    if server_context.config.log_requests && logger.config.debug_enabled {
        logger.log_debug("Performing session cleanup...");
    }

    do_session_cleanup(&logger, &server_context, &mut read_context).await;
}

// Tests

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf},
        time::timeout,
    };

    use crate::{
        amf::AMF0Value,
        rtc::RtcSessionManager,
        rtmp::{
            ChunkDecoder, MediaMessage, MessageHeader, RtmpCommand, rtmp_make_invoke_message,
            RTMP_SIG_SIZE, RTMP_TYPE_INVOKE, RTMP_TYPE_SET_CHUNK_SIZE, RTMP_TYPE_VIDEO,
            RTMP_VERSION,
        },
        server::{
            HttpServerConfiguration, LiveConfiguration, RtcConfiguration,
            RtmpServerConfiguration, ServerConfiguration,
        },
        source::{JitterAlgorithm, SourceConfig, SourceRegistry},
    };

    use byteorder::{BigEndian, ByteOrder};

    fn test_server_context() -> ServerContext {
        let config = ServerConfiguration {
            rtmp: RtmpServerConfiguration {
                port: 1935,
                bind_address: "127.0.0.1".to_string(),
                chunk_size: 60000,
                redirect_tc_url: None,
            },
            http: HttpServerConfiguration {
                port: 8080,
                bind_address: "127.0.0.1".to_string(),
            },
            live: LiveConfiguration {
                gop_enabled: true,
                gop_cache_size: 16 * 1024 * 1024,
                queue_length: 16,
                jitter_algorithm: JitterAlgorithm::Off,
                mix_correct: false,
                flv_record: false,
                flv_record_dir: "./records".to_string(),
                workers: 0,
                publisher_gone_terminate: true,
                keyframe_interval_ms: 5000,
            },
            rtc: RtcConfiguration {
                candidates: Vec::new(),
                stun_port: 3478,
            },
            version: "test".to_string(),
            log_requests: false,
        };

        ServerContext {
            config: Arc::new(config),
            registry: Arc::new(SourceRegistry::new(SourceConfig::default())),
            rtc_sessions: Arc::new(RtcSessionManager::new()),
        }
    }

    /// Spawns a server session over an in-memory socket, returning the
    /// client-side halves
    fn spawn_session(
        server_context: ServerContext,
        session_id: u64,
    ) -> (ReadHalf<DuplexStream>, tokio::io::WriteHalf<DuplexStream>) {
        let (client, server) = tokio::io::duplex(1024 * 1024);

        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);

        tokio::spawn(async move {
            handle_rtmp_session(
                Arc::new(crate::log::Logger::new_disabled()),
                server_context,
                SessionContext::new(session_id, "127.0.0.1".parse().unwrap()),
                server_read,
                Arc::new(Mutex::new(server_write)),
            )
            .await;
        });

        (client_read, client_write)
    }

    /// Performs the client side of the simple handshake
    async fn client_handshake(
        read: &mut ReadHalf<DuplexStream>,
        write: &mut tokio::io::WriteHalf<DuplexStream>,
    ) {
        let c1 = vec![7u8; RTMP_SIG_SIZE];

        write.write_all(&[RTMP_VERSION]).await.unwrap();
        write.write_all(&c1).await.unwrap();

        let mut response = vec![0u8; 1 + RTMP_SIG_SIZE * 2];
        timeout(Duration::from_secs(5), read.read_exact(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response[0], RTMP_VERSION);
        // Simple handshake: S2 echoes C1
        assert_eq!(&response[1 + RTMP_SIG_SIZE..], &c1[..]);

        // C2 echoes S1
        let c2 = response[1..1 + RTMP_SIG_SIZE].to_vec();
        write.write_all(&c2).await.unwrap();
    }

    /// Collects messages from the server, tracking its chunk size
    async fn collect_messages(
        read: &mut ReadHalf<DuplexStream>,
        decoder: &mut ChunkDecoder,
        count: usize,
        filter_type: Option<u8>,
    ) -> Vec<MediaMessage> {
        let mut out = Vec::new();
        let mut buf = [0u8; 8192];

        while out.len() < count {
            if let Some(msg) = decoder.poll_message().unwrap() {
                if msg.header.message_type == RTMP_TYPE_SET_CHUNK_SIZE {
                    let payload = msg.payload.flatten();
                    let size = BigEndian::read_u32(&payload[0..4]) as usize;
                    decoder.set_in_chunk_size(size).unwrap();
                    continue;
                }

                match filter_type {
                    Some(t) if msg.header.message_type != t => continue,
                    _ => {}
                }

                out.push(msg);
                continue;
            }

            let n = timeout(Duration::from_secs(5), read.read(&mut buf))
                .await
                .expect("timed out waiting for server messages")
                .unwrap();

            assert!(n > 0, "server closed the connection unexpectedly");

            decoder.push_bytes(&buf[..n]);
        }

        out
    }

    /// Collects the next `count` command messages
    async fn collect_commands(
        read: &mut ReadHalf<DuplexStream>,
        decoder: &mut ChunkDecoder,
        count: usize,
    ) -> Vec<RtmpCommand> {
        collect_messages(read, decoder, count, Some(RTMP_TYPE_INVOKE))
            .await
            .into_iter()
            .map(|m| RtmpCommand::decode(m.payload.flatten().as_ref()).unwrap())
            .collect()
    }

    fn connect_command(trans_id: f64) -> RtmpCommand {
        let mut cmd = RtmpCommand::new("connect");
        cmd.set_argument("transId", AMF0Value::Number { value: trans_id });

        let mut obj = indexmap::IndexMap::new();
        obj.insert("app".to_string(), AMF0Value::String {
            value: "live".to_string(),
        });
        obj.insert("tcUrl".to_string(), AMF0Value::String {
            value: "rtmp://127.0.0.1/live".to_string(),
        });

        cmd.set_argument("cmdObj", AMF0Value::Object { properties: obj });

        cmd
    }

    fn simple_command(name: &str, trans_id: f64, stream_name: Option<&str>) -> RtmpCommand {
        let mut cmd = RtmpCommand::new(name);
        cmd.set_argument("transId", AMF0Value::Number { value: trans_id });
        cmd.set_argument("cmdObj", AMF0Value::Null);

        if let Some(s) = stream_name {
            cmd.set_argument("streamName", AMF0Value::String {
                value: s.to_string(),
            });
        }

        cmd
    }

    #[tokio::test]
    async fn test_connect_publish_unpublish_flow() {
        let server_context = test_server_context();

        let (mut read, mut write) = spawn_session(server_context.clone(), 1);
        let mut decoder = ChunkDecoder::new();

        client_handshake(&mut read, &mut write).await;

        // connect

        write
            .write_all(&rtmp_make_invoke_message(&connect_command(1.0), 0, 128))
            .await
            .unwrap();

        let cmds = collect_commands(&mut read, &mut decoder, 2).await;

        assert_eq!(cmds[0].cmd, "_result");
        assert_eq!(cmds[0].get_trans_id(), 1.0);

        let info = cmds[0].get_argument("info").unwrap();
        assert_eq!(
            info.get_object_property("code").unwrap().get_string(),
            "NetConnection.Connect.Success"
        );

        assert_eq!(cmds[1].cmd, "onBWDone");

        // releaseStream + FCPublish + createStream

        write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("releaseStream", 2.0, Some("livestream")),
                0,
                128,
            ))
            .await
            .unwrap();
        write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("FCPublish", 3.0, Some("livestream")),
                0,
                128,
            ))
            .await
            .unwrap();
        write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("createStream", 4.0, None),
                0,
                128,
            ))
            .await
            .unwrap();

        let cmds = collect_commands(&mut read, &mut decoder, 3).await;

        assert_eq!(cmds[0].cmd, "_result"); // releaseStream
        assert_eq!(cmds[1].cmd, "_result"); // FCPublish
        assert_eq!(cmds[2].cmd, "_result"); // createStream
        assert_eq!(cmds[2].get_trans_id(), 4.0);
        assert_eq!(cmds[2].get_argument("info").unwrap().get_float(), 1.0);

        // publish

        write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("publish", 5.0, Some("livestream")),
                1,
                128,
            ))
            .await
            .unwrap();

        let cmds = collect_commands(&mut read, &mut decoder, 2).await;

        assert_eq!(cmds[0].cmd, "onFCPublish");
        assert_eq!(cmds[1].cmd, "onStatus");

        let info = cmds[1].get_argument("info").unwrap();
        assert_eq!(
            info.get_object_property("code").unwrap().get_string(),
            "NetStream.Publish.Start"
        );

        // The publisher slot is taken

        assert!(server_context
            .registry
            .attach_publisher("live/livestream", 99)
            .await
            .is_err());

        // FCUnpublish

        write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("FCUnpublish", 6.0, Some("livestream")),
                1,
                128,
            ))
            .await
            .unwrap();

        let cmds = collect_commands(&mut read, &mut decoder, 3).await;

        assert_eq!(cmds[0].cmd, "onFCUnpublish");
        assert_eq!(cmds[1].cmd, "_result");
        assert_eq!(cmds[2].cmd, "onStatus");

        let info = cmds[2].get_argument("info").unwrap();
        assert_eq!(
            info.get_object_property("code").unwrap().get_string(),
            "NetStream.Unpublish.Success"
        );

        // The slot is free again

        assert!(server_context
            .registry
            .attach_publisher("live/livestream", 99)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_play_receives_gop_primed_stream() {
        let server_context = test_server_context();

        // Publisher session

        let (mut pub_read, mut pub_write) = spawn_session(server_context.clone(), 1);
        let mut pub_decoder = ChunkDecoder::new();

        client_handshake(&mut pub_read, &mut pub_write).await;

        pub_write
            .write_all(&rtmp_make_invoke_message(&connect_command(1.0), 0, 128))
            .await
            .unwrap();
        collect_commands(&mut pub_read, &mut pub_decoder, 2).await;

        pub_write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("createStream", 2.0, None),
                0,
                128,
            ))
            .await
            .unwrap();
        collect_commands(&mut pub_read, &mut pub_decoder, 1).await;

        pub_write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("publish", 3.0, Some("livestream")),
                1,
                128,
            ))
            .await
            .unwrap();
        collect_commands(&mut pub_read, &mut pub_decoder, 2).await;

        // Publish a video sequence header and a keyframe

        let video_sh = MediaMessage::from_slice(
            MessageHeader::new_video(0, 0, 1),
            &[0x17, 0x00, 0x00, 0x00, 0x00, 0x01, 0x64, 0x00, 0x1E],
        );
        pub_write
            .write_all(video_sh.encode_chunks(128).flatten().as_ref())
            .await
            .unwrap();

        let keyframe = MediaMessage::from_slice(
            MessageHeader::new_video(0, 40, 1),
            &[0x17, 0x01, 0x00, 0x00, 0x00, 0xDE, 0xAD, 0xBE, 0xEF],
        );
        pub_write
            .write_all(keyframe.encode_chunks(128).flatten().as_ref())
            .await
            .unwrap();

        // Give the routing a moment to settle
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Player session

        let (mut play_read, mut play_write) = spawn_session(server_context.clone(), 2);
        let mut play_decoder = ChunkDecoder::new();

        client_handshake(&mut play_read, &mut play_write).await;

        play_write
            .write_all(&rtmp_make_invoke_message(&connect_command(1.0), 0, 128))
            .await
            .unwrap();
        collect_commands(&mut play_read, &mut play_decoder, 2).await;

        play_write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("createStream", 2.0, None),
                0,
                128,
            ))
            .await
            .unwrap();
        collect_commands(&mut play_read, &mut play_decoder, 1).await;

        play_write
            .write_all(&rtmp_make_invoke_message(
                &simple_command("play", 3.0, Some("livestream")),
                1,
                128,
            ))
            .await
            .unwrap();

        // Play start statuses: NetStream.Play.Reset then NetStream.Play.Start

        let cmds = collect_commands(&mut play_read, &mut play_decoder, 2).await;

        let reset_info = cmds[0].get_argument("info").unwrap();
        assert_eq!(
            reset_info.get_object_property("code").unwrap().get_string(),
            "NetStream.Play.Reset"
        );

        let start_info = cmds[1].get_argument("info").unwrap();
        assert_eq!(
            start_info.get_object_property("code").unwrap().get_string(),
            "NetStream.Play.Start"
        );

        // The primed stream: video sequence header first, then the GOP keyframe

        let videos =
            collect_messages(&mut play_read, &mut play_decoder, 2, Some(RTMP_TYPE_VIDEO)).await;

        let sh = videos[0].payload.flatten();
        assert_eq!(&sh[0..2], &[0x17, 0x00]);

        let kf = videos[1].payload.flatten();
        assert_eq!(&kf[0..2], &[0x17, 0x01]);
        assert_eq!(&kf[5..9], &[0xDE, 0xAD, 0xBE, 0xEF]);

        // A live message broadcast after attach also arrives

        let inter = MediaMessage::from_slice(
            MessageHeader::new_video(0, 80, 1),
            &[0x27, 0x01, 0x00, 0x00, 0x00, 0x55],
        );
        pub_write
            .write_all(inter.encode_chunks(128).flatten().as_ref())
            .await
            .unwrap();

        let videos =
            collect_messages(&mut play_read, &mut play_decoder, 1, Some(RTMP_TYPE_VIDEO)).await;

        let live = videos[0].payload.flatten();
        assert_eq!(&live[0..2], &[0x27, 0x01]);
        assert_eq!(videos[0].header.timestamp, 80);
    }
}
