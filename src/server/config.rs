// Server configuration

use crate::{
    log::Logger,
    rtmp::{RTMP_MAX_CHUNK_SIZE, RTMP_MIN_CHUNK_SIZE, RTMP_OUT_CHUNK_SIZE_DEFAULT},
    source::{JitterAlgorithm, SourceConfig},
    utils::{get_env_bool, get_env_string, get_env_u32, get_env_u64},
};

const RTMP_PORT_DEFAULT: u32 = 1935;
const HTTP_PORT_DEFAULT: u32 = 8080;

const MAX_PORT: u32 = 65535;

const GOP_CACHE_SIZE_MB_DEFAULT: u32 = 256;
const QUEUE_LENGTH_DEFAULT: u32 = 8;
const KEYFRAME_INTERVAL_MS_DEFAULT: u64 = 5000;

/// RTMP listener configuration
#[derive(Clone)]
pub struct RtmpServerConfiguration {
    /// Port
    pub port: u32,

    /// Bind address
    pub bind_address: String,

    /// Outbound RTMP chunk size
    pub chunk_size: usize,

    /// When set, every connect is redirected to this tcUrl
    pub redirect_tc_url: Option<String>,
}

impl RtmpServerConfiguration {
    /// Loads configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `logger` - The logger
    pub fn load_from_env(logger: &Logger) -> Result<RtmpServerConfiguration, ()> {
        let port = get_env_u32("RTMP_PORT", RTMP_PORT_DEFAULT);

        if port == 0 || port > MAX_PORT {
            logger.log_error(&format!("RTMP_PORT has an invalid value: {}", port));
            return Err(());
        }

        let bind_address = get_env_string("BIND_ADDRESS", "0.0.0.0");

        let chunk_size =
            get_env_u32("RTMP_CHUNK_SIZE", RTMP_OUT_CHUNK_SIZE_DEFAULT as u32) as usize;

        if !(RTMP_MIN_CHUNK_SIZE..=RTMP_MAX_CHUNK_SIZE).contains(&chunk_size) {
            logger.log_error(&format!(
                "RTMP_CHUNK_SIZE has an invalid value: {}. Min: {}. Max: {}",
                chunk_size, RTMP_MIN_CHUNK_SIZE, RTMP_MAX_CHUNK_SIZE
            ));
            return Err(());
        }

        let redirect_tc_url = match get_env_string("RTMP_REDIRECT_TCURL", "") {
            s if s.is_empty() => None,
            s => Some(s),
        };

        Ok(RtmpServerConfiguration {
            port,
            bind_address,
            chunk_size,
            redirect_tc_url,
        })
    }

    /// Gets the address for listening
    pub fn get_tcp_listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// HTTP listener configuration (HTTP-FLV subscribers + WebRTC API)
#[derive(Clone)]
pub struct HttpServerConfiguration {
    /// Port
    pub port: u32,

    /// Bind address
    pub bind_address: String,
}

impl HttpServerConfiguration {
    /// Loads configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `logger` - The logger
    pub fn load_from_env(logger: &Logger) -> Result<HttpServerConfiguration, ()> {
        let port = get_env_u32("HTTP_PORT", HTTP_PORT_DEFAULT);

        if port == 0 || port > MAX_PORT {
            logger.log_error(&format!("HTTP_PORT has an invalid value: {}", port));
            return Err(());
        }

        let bind_address = get_env_string(
            "HTTP_BIND_ADDRESS",
            &get_env_string("BIND_ADDRESS", "0.0.0.0"),
        );

        Ok(HttpServerConfiguration { port, bind_address })
    }

    /// Gets the address for listening
    pub fn get_tcp_listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Live streaming behavior configuration
#[derive(Clone)]
pub struct LiveConfiguration {
    /// Enable the GOP cache
    pub gop_enabled: bool,

    /// GOP cache byte cap
    pub gop_cache_size: usize,

    /// Per-subscriber queue high watermark, in messages
    pub queue_length: usize,

    /// Timestamp jitter correction algorithm
    pub jitter_algorithm: JitterAlgorithm,

    /// Reorder interleaved A/V timestamps
    pub mix_correct: bool,

    /// Persist incoming streams as FLV files
    pub flv_record: bool,

    /// Directory for FLV records
    pub flv_record_dir: String,

    /// Worker threads for the async runtime (0 uses the core count)
    pub workers: usize,

    /// Terminate subscribers when the publisher disconnects
    pub publisher_gone_terminate: bool,

    /// Interval for requesting keyframes from a publisher while a
    /// WebRTC subscriber is attached, in milliseconds
    pub keyframe_interval_ms: u64,
}

impl LiveConfiguration {
    /// Loads configuration from environment variables
    pub fn load_from_env(_logger: &Logger) -> Result<LiveConfiguration, ()> {
        let gop_enabled = get_env_bool("LIVE_GOP", true);
        let gop_cache_size =
            (get_env_u32("LIVE_GOP_CACHE_SIZE_MB", GOP_CACHE_SIZE_MB_DEFAULT) as usize)
                * 1024
                * 1024;

        let queue_length = get_env_u32("LIVE_QUEUE_LENGTH", QUEUE_LENGTH_DEFAULT) as usize;

        let jitter_algorithm = JitterAlgorithm::from_config(get_env_u32("LIVE_JITTER_ALGO", 1));

        let mix_correct = get_env_bool("LIVE_MIX_CORRECT", false);

        let flv_record = get_env_bool("LIVE_FLV_RECORD", false);
        let flv_record_dir = get_env_string("LIVE_FLV_RECORD_DIR", "./records");

        let workers = get_env_u32("LIVE_WORKERS", 0) as usize;

        let publisher_gone_terminate = get_env_bool("PUBLISHER_GONE_TERMINATE", true);

        let keyframe_interval_ms =
            get_env_u64("RTMP2RTC_KEYFRAME_INTERVAL_MS", KEYFRAME_INTERVAL_MS_DEFAULT);

        Ok(LiveConfiguration {
            gop_enabled,
            gop_cache_size,
            queue_length,
            jitter_algorithm,
            mix_correct,
            flv_record,
            flv_record_dir,
            workers,
            publisher_gone_terminate,
            keyframe_interval_ms,
        })
    }

    /// Builds the per-source behavior knobs
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            gop_enabled: self.gop_enabled,
            gop_cache_max_bytes: self.gop_cache_size,
            queue_length: self.queue_length,
            terminate_subscribers_on_unpublish: self.publisher_gone_terminate,
        }
    }
}

/// WebRTC bridging configuration
#[derive(Clone)]
pub struct RtcConfiguration {
    /// Candidate addresses advertised in SDP answers
    pub candidates: Vec<String>,

    /// STUN port advertised in SDP answers
    pub stun_port: u32,
}

impl RtcConfiguration {
    /// Loads configuration from environment variables
    pub fn load_from_env(_logger: &Logger) -> Result<RtcConfiguration, ()> {
        let candidates: Vec<String> = get_env_string("RTC_CANDIDATES", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let stun_port = get_env_u32("RTC_STUN_PORT", 3478);

        Ok(RtcConfiguration {
            candidates,
            stun_port,
        })
    }
}

/// Full server configuration
#[derive(Clone)]
pub struct ServerConfiguration {
    /// RTMP listener config
    pub rtmp: RtmpServerConfiguration,

    /// HTTP listener config
    pub http: HttpServerConfiguration,

    /// Live streaming config
    pub live: LiveConfiguration,

    /// WebRTC bridging config
    pub rtc: RtcConfiguration,

    /// Server version string announced to clients
    pub version: String,

    /// True to log requests
    pub log_requests: bool,
}

impl ServerConfiguration {
    /// Loads configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `logger` - The logger
    pub fn load_from_env(logger: &Logger) -> Result<ServerConfiguration, ()> {
        let rtmp = RtmpServerConfiguration::load_from_env(logger)?;
        let http = HttpServerConfiguration::load_from_env(logger)?;
        let live = LiveConfiguration::load_from_env(logger)?;
        let rtc = RtcConfiguration::load_from_env(logger)?;

        let log_requests = get_env_bool("LOG_REQUESTS", true);

        Ok(ServerConfiguration {
            rtmp,
            http,
            live,
            rtc,
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_requests,
        })
    }
}
