//! A module with the match and target extensions that can be attached to [`Rule`]s, and the
//! machinery that drives them: the [`Registry`] that resolves them by name and the
//! [`ParamParser`] that builds their parameter blocks from command line options.
//!
//! Every extension exposes the same capability set through the [`Extension`] trait. Its
//! parameter block is carried by the [`ExtensionData`] tagged variant, so that callers never
//! have to reinterpret raw bytes themselves: the bytes found in the kernel are turned into a
//! typed block by the extension that owns them ([`Extension::decode`]).
//!
//! [`Rule`]: crate::Rule

use std::fmt::Debug;

use crate::error::{DecodeError, ParameterError};
use crate::{ProtocolFamily, RuleHeader};

mod names;
pub use names::{NameEntry, NameLookup, NameTable};

mod registry;
pub use registry::{Registry, RegistryBuilder};

mod parser;
pub use parser::{HardwareLength, ParamParser, RuleContext};

mod mangle;
pub use mangle::{ArpMangle, Mangle, MangleFlags, MangleVerdict};

mod reject;
pub use reject::{Reject, RejectInfo, RejectWith};
#[cfg(test)]
pub(crate) use reject::REJECT_TYPES;

mod trace;
pub use trace::{Trace, TraceInfo};

/// Identifier of an option inside the option table of one extension. Option `n` sets bit `n`
/// of the flags mask handed to [`Extension::final_check`].
pub type OptionId = u8;

/// Option ids must stay below this bound to fit in the flags mask.
pub const MAX_OPTION_ID: OptionId = u32::BITS as OptionId;

/// One entry of the option table of an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionSpec {
    /// Name of the option, without the leading dashes.
    pub long_name: &'static str,
    pub takes_argument: bool,
    pub id: OptionId,
    /// Whether the option may be preceded by `!`.
    pub invertible: bool,
}

impl OptionSpec {
    pub const fn with_argument(long_name: &'static str, id: OptionId) -> Self {
        OptionSpec {
            long_name,
            takes_argument: true,
            id,
            invertible: false,
        }
    }
}

/// Whether an extension is a non-terminating test or the terminating action of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Match,
    Target,
}

impl ExtensionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionKind::Match => "match",
            ExtensionKind::Target => "target",
        }
    }
}

/// Rounds a parameter block size up to the alignment the kernel uses for the data of matches
/// and targets (`XT_ALIGN`).
pub const fn xt_align(size: usize) -> usize {
    (size + 7) & !7
}

/// Checks that a payload read from the kernel has the size an extension expects, with or
/// without the trailing alignment.
pub fn check_payload_size(
    name: &str,
    payload: &[u8],
    param_size: usize,
) -> Result<(), DecodeError> {
    if payload.len() == param_size || payload.len() == xt_align(param_size) {
        Ok(())
    } else {
        Err(DecodeError::InvalidPayloadSize {
            name: name.to_string(),
            expected: param_size,
            actual: payload.len(),
        })
    }
}

/// The descriptor of a match or target kind.
///
/// Rendering callbacks return `None` when the extension does not provide them, and the text
/// they return carries neither leading nor trailing whitespace.
pub trait Extension {
    fn name(&self) -> &'static str;

    fn family(&self) -> ProtocolFamily;

    fn revision(&self) -> u8 {
        0
    }

    fn kind(&self) -> ExtensionKind;

    /// Exact size of the parameter block in the kernel, before alignment.
    fn param_size(&self) -> usize;

    fn options(&self) -> &'static [OptionSpec] {
        &[]
    }

    /// Usage text listing the options of the extension.
    fn help(&self) -> String {
        String::new()
    }

    /// Returns the parameter block with its defaults, before any option was parsed.
    fn init(&self) -> ExtensionData;

    /// Applies one option to `data`. Returns `Ok(false)`, without touching `data`, when `id`
    /// is not an option of this extension.
    fn parse(
        &self,
        _id: OptionId,
        _arg: &str,
        _invert: bool,
        _data: &mut ExtensionData,
        _ctx: &RuleContext<'_>,
    ) -> Result<bool, ParameterError> {
        Ok(false)
    }

    /// Runs once all the options of a rule were parsed, with the mask of the options seen.
    fn final_check(&self, _flags: u32) -> Result<(), ParameterError> {
        Ok(())
    }

    /// Human oriented rendering. Addresses are resolved to names unless `numeric` is set.
    fn print(
        &self,
        _data: &ExtensionData,
        _header: &RuleHeader,
        _numeric: bool,
    ) -> Option<String> {
        None
    }

    /// Canonical rendering, parsed back by the restore tools.
    fn save(&self, _data: &ExtensionData, _header: &RuleHeader) -> Option<String> {
        None
    }

    /// Equivalent nftables expression.
    fn translate(&self, _data: &ExtensionData, _header: &RuleHeader) -> Option<String> {
        None
    }

    /// Builds the typed parameter block from the bytes stored in the kernel.
    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, DecodeError>;

    /// Serializes the parameter block in the layout the kernel expects, alignment included.
    fn encode(&self, data: &ExtensionData) -> Vec<u8>;
}

impl<'a> Debug for dyn Extension + 'a {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name())
            .field("family", &self.family())
            .field("revision", &self.revision())
            .field("kind", &self.kind())
            .finish()
    }
}

// one variant per parameter block type, each convertible from its block
macro_rules! create_extension_data {
    ($enum:ident $(, [$name:ident, $type:ty])+) => {
        /// The parameter block of an extension, tagged with the extension it belongs to.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum $enum {
            $(
                $name($type),
            )+
        }

        $(
            impl From<$type> for $enum {
                fn from(val: $type) -> Self {
                    $enum::$name(val)
                }
            }
        )+
    };
}

create_extension_data!(
    ExtensionData,
    [Reject, RejectInfo],
    [Mangle, ArpMangle],
    [Trace, TraceInfo]
);

/// The extensions shipped with the crate.
pub fn builtin_extensions() -> Vec<Box<dyn Extension>> {
    vec![Box::new(Reject), Box::new(Trace), Box::new(Mangle)]
}
