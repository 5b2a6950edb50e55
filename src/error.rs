use thiserror::Error;

/// Failures of a byte-range read, whatever the backing store.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    #[error("S3 error: {0}")]
    S3(String),

    /// The range ends past the last byte of the resource
    #[error("Range out of bounds: {requested} bytes at offset {offset} exceed size {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Half-open range whose end precedes its start
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("File error: {0}")]
    File(String),

    /// Transport failure while streaming a response body
    #[error("Connection error: {0}")]
    Connection(String),

    /// No object or file under this name
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Malformed or truncated TIFF structure found while walking the directories.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    #[error("Read failed: {0}")]
    Io(#[from] IoError),

    /// First two bytes are neither `II` nor `MM`
    #[error("Not a TIFF: byte order mark 0x{0:04X} is neither II nor MM")]
    InvalidMagic(u16),

    /// Version word other than 42 (classic) or 43 (BigTIFF)
    #[error("Unknown TIFF version {0}")]
    InvalidVersion(u16),

    /// BigTIFF header declaring an offset width other than 8
    #[error("BigTIFF offset width must be 8 bytes, header declares {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// Fewer bytes than the structure being parsed requires
    #[error("File too small: {required} bytes needed, {actual} available")]
    FileTooSmall { required: u64, actual: u64 },

    /// IFD offset past the end of the file, or revisiting an earlier IFD
    #[error("Bad IFD offset {0}")]
    InvalidIfdOffset(u64),

    /// A tag every image directory must carry is absent
    #[error("Required tag {0} is missing")]
    MissingTag(&'static str),

    /// Tag present but with the wrong field type or count
    #[error("Tag {tag} has an invalid value: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Field type code outside the TIFF 6.0 and BigTIFF tables
    #[error("Unknown field type code {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while translating an IFD into a virtual array.
///
/// Every variant is terminal. Messages name the offending tag or value so they
/// can be surfaced to an end user directly.
#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    #[error("Invalid TIFF: {0}")]
    Tiff(#[from] TiffError),

    /// Read failure while sniffing the byte order
    #[error("Read failed: {0}")]
    Io(#[from] IoError),

    /// The file uses a TIFF feature that cannot be expressed as a virtual array
    #[error("{0}")]
    Unsupported(String),

    /// Compression tag outside the recognized compressor table
    #[error("TIFF has compressor tag {0}, which is not recognized. Please raise an issue for support.")]
    UnrecognizedCompression(u16),

    /// No scalar type for this combination of sample format and bit width
    #[error(
        "Unrecognized datatype, got sample_format = {sample_format:?} and bits_per_sample = {bits_per_sample:?}"
    )]
    UnrecognizedDataType {
        sample_format: Vec<u16>,
        bits_per_sample: Vec<u16>,
    },

    /// Codec name outside the closed codec table
    #[error("Unrecognized codec name: {0}")]
    UnrecognizedCodec(String),

    /// The directory contradicts an invariant of the array model
    #[error("{0}")]
    InvariantViolation(String),

    /// A serialized codec configuration does not match the codec it names
    #[error("Codec id does not match {expected}. Got: {found}.")]
    ConfigurationMismatch { expected: String, found: String },

    /// A serialized codec configuration could not be parsed
    #[error("Invalid configuration for codec {name}: {message}")]
    InvalidConfiguration { name: String, message: String },

    /// A codec direction this crate never executes
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// The blocking entry point could not start its runtime
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl TranslateError {
    /// Shorthand for [`TranslateError::Unsupported`].
    pub fn unsupported(message: impl Into<String>) -> Self {
        TranslateError::Unsupported(message.into())
    }

    /// Shorthand for [`TranslateError::InvariantViolation`].
    pub fn invariant(message: impl Into<String>) -> Self {
        TranslateError::InvariantViolation(message.into())
    }

    /// Whether this error reports a feature the translator deliberately rejects.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, TranslateError::Unsupported(_))
    }
}
