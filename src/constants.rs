// Define some constants for the broadcast parameters
pub const FALLBACK_BITRATE: u32 = 128_000; // bits/sec when probing fails
pub const CHUNKS_PER_SECOND: u32 = 10; // pacer emits 100ms of audio per chunk
pub const MAX_CHUNK_SIZE: usize = 64 * 1024; // upper bound for a single paced chunk
pub const SUBSCRIBER_BUFFER_CHUNKS: usize = 64; // chunks buffered per listener before dropping
pub const CONFIG_FILE: &str = "Config.toml";
