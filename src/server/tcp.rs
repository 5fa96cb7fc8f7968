// RTMP TCP server

use std::sync::Arc;

use tokio::{
    io::AsyncWriteExt,
    net::TcpListener,
    sync::{mpsc::Sender, Mutex},
};

use crate::log::Logger;

use super::{handle_connection, ServerContext, SessionIdGenerator};

/// Runs the RTMP TCP accept loop
pub fn tcp_server(
    logger: Arc<Logger>,
    server_context: ServerContext,
    session_id_generator: Arc<Mutex<SessionIdGenerator>>,
    end_notifier: Sender<()>,
) {
    tokio::spawn(async move {
        let listen_addr = server_context.config.rtmp.get_tcp_listen_addr();

        let listener = match TcpListener::bind(&listen_addr).await {
            Ok(l) => l,
            Err(e) => {
                logger.log_error(&format!("Could not create TCP listener: {}", e));
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
                        let ip = addr.ip();
                        let (read_stream, write_stream) = connection.into_split();
                        let write_stream = Arc::new(Mutex::new(write_stream));

                        handle_connection(
                            logger,
                            server_context,
                            session_id_generator,
                            read_stream,
                            write_stream.clone(),
                            ip,
                        )
                        .await;

                        // Ensure connection is closed
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
