//! Error types for the audio link

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Buffer overflow: {requested} bytes offered, {free} bytes free")]
    BufferOverflow { requested: usize, free: usize },

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Capture cancelled")]
    Cancelled,

    #[error("End of stream")]
    EndOfStream,

    #[error("Timed out waiting for the audio backend")]
    Timeout,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0} bytes")]
    InvalidFrameSize(usize),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Wire protocol violations. Packets producing these are discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Bad magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Truncated packet: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),

    #[error("Unknown packet kind: {0}")]
    UnknownKind(u8),

    #[error("Unknown codec id: {0}")]
    UnknownCodec(u8),

    #[error("Unknown sample format: {0}")]
    UnknownFormat(u8),

    #[error("Invalid stream descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
