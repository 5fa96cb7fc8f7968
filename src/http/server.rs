// HTTP server (FLV subscribers + WebRTC API)

use std::sync::Arc;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    sync::{mpsc::Sender, Mutex},
};

use crate::{
    log::Logger,
    server::{ServerContext, SessionIdGenerator},
};

use super::{
    handle_flv_subscriber, handle_rtc_play, handle_rtc_publish, flv_path_to_stream_url,
    read_http_request_head, HttpRequestHead, RtcApiRequest, RtcApiResponse, MAX_BODY_SIZE,
};

/// Runs the HTTP accept loop
pub fn http_server(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id_generator: Arc<Mutex<SessionIdGenerator>>,
    end_notifier: Sender<()>,
) {
    tokio::spawn(async move {
        let listen_addr = server_context.config.http.get_tcp_listen_addr();

        let listener = match TcpListener::bind(&listen_addr).await {
            Ok(l) => l,
            Err(e) => {
                logger.log_error(&format!("Could not create HTTP listener: {}", e));
                end_notifier
                    .send(())
                    .await
                    .expect("failed to notify to main thread");
                return;
            }
        };

        logger.log_info(&format!("Listening on {}", listen_addr));

        loop {
            match listener.accept().await {
                Ok((connection, addr)) => {
                    let logger = logger.clone();
                    let server_context = server_context.clone();
                    let session_id_generator = session_id_generator.clone();

                    tokio::spawn(async move {
                        let (mut read_stream, write_stream) = connection.into_split();
                        let write_stream = Arc::new(Mutex::new(write_stream));

                        let mut session_id_generator_v = session_id_generator.lock().await;
                        let session_id = session_id_generator_v.generate_id();
                        drop(session_id_generator_v);

                        let session_logger =
                            Arc::new(logger.make_child_logger(&format!("[#{}] ", session_id)));

                        if server_context.config.log_requests {
                            session_logger
                                .log_debug(&format!("HTTP connection accepted from {}", addr.ip()));
                        }

                        handle_http_connection(
                            session_logger,
                            server_context,
                            session_id,
                            &mut read_stream,
                            write_stream.clone(),
                        )
                        .await;

                        let mut write_stream_v = write_stream.lock().await;
                        let _ = write_stream_v.shutdown().await;
                    });
                }
                Err(e) => {
                    logger.log_error(&format!("Could not accept connection: {}", e));
                    end_notifier
                        .send(())
                        .await
                        .expect("failed to notify to main thread");
                    return;
                }
            }
        }
    });
}

/// Writes a plain response with a body
async fn write_response<TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin>(
    write_stream: &Mutex<TW>,
    status: &str,
    content_type: &str,
    body: &[u8],
) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );

    let mut write_stream_v = write_stream.lock().await;

    if write_stream_v.write_all(head.as_bytes()).await.is_ok() {
        let _ = write_stream_v.write_all(body).await;
    }
}

/// Reads the full request body
async fn read_body<TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin>(
    read_stream: &mut TR,
    head: &HttpRequestHead,
) -> Result<Vec<u8>, ()> {
    let content_length = head.content_length();

    if content_length > MAX_BODY_SIZE {
        return Err(());
    }

    let mut body = head.body_start.clone();

    while body.len() < content_length {
        let mut buf = [0u8; 4096];

        let n = match read_stream.read(&mut buf).await {
            Ok(0) => return Err(()),
            Ok(n) => n,
            Err(_) => return Err(()),
        };

        body.extend_from_slice(&buf[..n]);
    }

    body.truncate(content_length);

    Ok(body)
}

/// Routes one HTTP connection
async fn handle_http_connection<
    TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin,
    TW: AsyncWrite + AsyncWriteExt + Send + Sync + Unpin,
>(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id: u64,
    read_stream: &mut TR,
    write_stream: Arc<Mutex<TW>>,
) {
    let head = match read_http_request_head(read_stream).await {
        Ok(h) => h,
        Err(_) => {
            return;
        }
    };

    // HTTP-FLV subscription

    if head.method == "GET" && head.path.ends_with(".flv") {
        match flv_path_to_stream_url(&head.path) {
            Some(stream_url) => {
                handle_flv_subscriber(
                    logger,
                    server_context,
                    session_id,
                    stream_url,
                    read_stream,
                    write_stream.as_ref(),
                )
                .await;
            }
            None => {
                write_response(
                    write_stream.as_ref(),
                    "404 Not Found",
                    "text/plain",
                    b"stream not found",
                )
                .await;
            }
        }

        return;
    }

    // WebRTC API

    if head.method == "POST" && (head.path == "/rtc/v1/publish/" || head.path == "/rtc/v1/play/") {
        let body = match read_body(read_stream, &head).await {
            Ok(b) => b,
            Err(_) => {
                write_response(
                    write_stream.as_ref(),
                    "400 Bad Request",
                    "text/plain",
                    b"bad request",
                )
                .await;
                return;
            }
        };

        let request: RtcApiRequest = match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(_) => {
                write_response(
                    write_stream.as_ref(),
                    "400 Bad Request",
                    "text/plain",
                    b"invalid json",
                )
                .await;
                return;
            }
        };

        let response: RtcApiResponse = if head.path == "/rtc/v1/publish/" {
            handle_rtc_publish(logger, server_context, session_id, request).await
        } else {
            handle_rtc_play(logger, server_context, session_id, request).await
        };

        let body = serde_json::to_vec(&response).unwrap_or_else(|_| b"{}".to_vec());

        write_response(write_stream.as_ref(), "200 OK", "application/json", &body).await;

        return;
    }

    write_response(
        write_stream.as_ref(),
        "404 Not Found",
        "text/plain",
        b"not found",
    )
    .await;
}
