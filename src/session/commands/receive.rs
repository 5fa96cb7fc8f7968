// receiveAudio / receiveVideo command handling

use crate::{
    log::Logger,
    rtmp::RtmpCommand,
    server::ServerContext,
    session::SessionReadContext,
};

/// Handles the receiveAudio and receiveVideo commands
///
/// # Return value
///
/// Returns true to continue the session main loop, false to end it
pub async fn handle_rtmp_command_receive(
    cmd: &RtmpCommand,
    server_context: &ServerContext,
    read_context: &mut SessionReadContext,
    logger: &Logger,
) -> bool {
    let config = &server_context.config;
    let session_id = read_context.session.id;

    let flag = match cmd.get_argument("bool") {
        Some(b) => b.get_bool(),
        None => true,
    };

    let stream_url = read_context.session.stream_url().await;

    let url = match stream_url {
        Some(u) => u,
        None => {
            if config.log_requests && logger.config.debug_enabled {
                logger.log_debug("Ignored receive command from an unbound session");
            }
            return true;
        }
    };

    if let Some(source) = server_context.registry.get(&url).await {
        let mut source_v = source.lock().await;

        match cmd.cmd.as_str() {
            "receiveAudio" => {
                source_v.set_subscriber_receive(session_id, Some(flag), None);
            }
            "receiveVideo" => {
                source_v.set_subscriber_receive(session_id, None, Some(flag));
            }
            _ => {}
        }
    }

    true
}
