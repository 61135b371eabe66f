use std::io;
use std::string::FromUtf8Error;

use nix::errno::Errno;
use thiserror::Error;

use crate::ProtocolFamily;

/// Errors raised while turning command line options into a parameter block. They are always
/// fatal for the command that triggered them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("unknown option \"--{0}\"")]
    UnknownOption(String),

    #[error("option \"--{0}\" requires an argument")]
    MissingArgument(String),

    #[error("unexpected argument \"{0}\"")]
    UnexpectedArgument(String),

    #[error("\"!\" not allowed before \"--{0}\"")]
    InversionNotAllowed(String),

    #[error("no --h-length defined")]
    NoHardwareLength,

    #[error("! --h-length not allowed for \"--{0}\"")]
    InvertedHardwareLength(&'static str),

    #[error("only --h-length 6 supported, got {0}")]
    UnsupportedHardwareLength(u8),

    #[error("invalid {side} MAC \"{value}\"")]
    InvalidMac { side: &'static str, value: String },

    #[error("host/network \"{value}\" not found for \"--{option}\"")]
    InvalidAddress { option: &'static str, value: String },

    #[error("unknown reject type \"{0}\"")]
    UnknownRejectType(String),

    #[error("bad target \"{0}\" for --mangle-target")]
    BadMangleTarget(String),

    #[error("the parameter block does not belong to extension \"{0}\"")]
    ForeignParameterBlock(String),
}

/// Registry errors point at a packaging or programming defect rather than at the user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("extension \"{name}\" (family {family:?}, revision {revision}) is already registered")]
    DuplicateExtension {
        name: String,
        family: ProtocolFamily,
        revision: u8,
    },

    #[error("extension \"{name}\" declares the option \"--{option}\" twice")]
    DuplicateOption { name: String, option: String },

    #[error("extension \"{name}\" gives the option \"--{option}\" the id {id}, which does not fit in the flags mask")]
    OptionIdOutOfRange {
        name: String,
        option: String,
        id: u8,
    },

    #[error("no extension \"{name}\" for family {family:?}")]
    UnknownExtension {
        name: String,
        family: ProtocolFamily,
    },

    #[error("\"{0}\" is not a {1}")]
    WrongKind(String, &'static str),
}

/// Errors found while decoding binary data handed out by the kernel.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("The buffer is too small to hold a valid entry")]
    BufTooSmall,

    #[error("The entry holds unexpected data")]
    InvalidDataSize,

    #[error("The entry at offset {0} has an invalid size")]
    InvalidEntrySize(usize),

    #[error("The parameter block of \"{name}\" is {actual} bytes long, expected {expected}")]
    InvalidPayloadSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid value for a protocol family")]
    UnknownProtocolFamily(i32),

    #[error("Unsupported value for a reject type")]
    UnknownRejectType(u32),

    #[error("Unsupported verdict for a mangle target")]
    UnknownMangleVerdict(i32),

    #[error("Unsupported value for a chain policy")]
    UnknownChainPolicy(i32),

    #[error("The mangle flags {0:#x} are not supported")]
    UnknownMangleFlags(u8),

    #[error("The jump at offset {0} does not point at the head of a chain")]
    DanglingJump(usize),

    #[error("The entry at offset {0} is outside of any chain")]
    OrphanEntry(usize),

    #[error("The decoded String is not UTF8 compliant")]
    StringDecodeFailure(#[from] FromUtf8Error),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Cannot initialize table \"{table}\"")]
    TableUnavailable {
        table: String,
        #[source]
        source: Box<QueryError>,
    },

    #[error("Table does not exist (do you need to insmod?)")]
    NoSuchTable,

    #[error("Badly formed tablename \"{0}\"")]
    MalformedTableListing(String),

    #[error("Failed to list table names in {path}")]
    ListingUnreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Unable to open a socket to the {0:?} tables")]
    SocketOpenError(ProtocolFamily, #[source] Errno),

    #[error("Error while querying the kernel tables")]
    SockoptError(#[source] Errno),

    #[error("The table changed while it was being read, retry")]
    ConcurrentUpdate,

    #[error("Error while processing the entries handed by the kernel")]
    ProcessEntriesError(#[from] DecodeError),

    #[error("Could not load kernel module \"{module}\"")]
    ModuleLoadFailed {
        module: String,
        #[source]
        source: io::Error,
    },

    #[error("The {0:?} family has no kernel tables")]
    UnsupportedFamily(ProtocolFamily),
}

/// Everything that can make a dump fail.
#[derive(Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Cannot render extension \"{name}\"")]
    Decode {
        name: String,
        #[source]
        source: DecodeError,
    },

    #[error("Target \"{0}\" is missing save function")]
    MissingSaveFunction(String),

    #[error("Error while writing the dump")]
    Io(#[from] io::Error),
}
