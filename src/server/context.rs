// Server context

use std::sync::Arc;

use crate::{rtc::RtcSessionManager, source::SourceRegistry};

use super::ServerConfiguration;

/// Shared state handed to every connection handler
#[derive(Clone)]
pub struct ServerContext {
    /// Immutable configuration snapshot
    pub config: Arc<ServerConfiguration>,

    /// Stream registry
    pub registry: Arc<SourceRegistry>,

    /// Active RTC bridge sessions
    pub rtc_sessions: Arc<RtcSessionManager>,
}
