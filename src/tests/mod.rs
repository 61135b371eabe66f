use crate::error::{DecodeError, ParameterError};
use crate::extension::{
    Extension, ExtensionData, ExtensionKind, OptionId, OptionSpec, ParamParser, Registry,
    RuleContext, TraceInfo,
};
use crate::rule::{ArpHeader, Ipv4Header, MaskedValue};
use crate::{ProtocolFamily, RuleHeader};

mod addr;
mod parser;
mod save;

pub const TABLE_NAME: &str = "filter";
pub const USER_CHAIN: &str = "LOGGING";

pub fn get_registry() -> Registry {
    Registry::with_builtin_extensions().unwrap()
}

pub fn ipv4_header() -> RuleHeader {
    RuleHeader::Ipv4(Ipv4Header::default())
}

/// An arp rule header testing `--h-length len`.
pub fn arp_header_with_hw_len(len: u8) -> RuleHeader {
    RuleHeader::Arp(ArpHeader {
        hw_len: Some(MaskedValue::new(len, 0xff)),
        ..Default::default()
    })
}

/// Runs a whole option parsing pass for `ext`, as a rule with `header` would.
pub fn parse_with(
    ext: &dyn Extension,
    header: &RuleHeader,
    args: &[&str],
) -> Result<ExtensionData, ParameterError> {
    let ctx = RuleContext::new(header);
    let mut parser = ParamParser::new(ext);
    parser.parse_args(args, &ctx)?;
    parser.finish()
}

pub const O_MOCK_VALUE: OptionId = 0;
pub const O_MOCK_FLAG: OptionId = 3;
pub const O_MOCK_WIDE: OptionId = 40;

static MOCK_OPTIONS: [OptionSpec; 2] = [
    OptionSpec::with_argument("mock-value", O_MOCK_VALUE),
    OptionSpec {
        long_name: "mock-flag",
        takes_argument: false,
        id: O_MOCK_FLAG,
        invertible: true,
    },
];

static DUPLICATE_OPTIONS: [OptionSpec; 2] = [
    OptionSpec::with_argument("mock-value", 0),
    OptionSpec::with_argument("mock-value", 1),
];

static WIDE_OPTIONS: [OptionSpec; 2] = [
    OptionSpec::with_argument("mock-value", O_MOCK_VALUE),
    OptionSpec {
        long_name: "mock-wide",
        takes_argument: false,
        id: O_MOCK_WIDE,
        invertible: false,
    },
];

/// A match accepting any value for `--mock-value`, whose final check requires that option.
pub struct MockMatch {
    pub name: &'static str,
    pub family: ProtocolFamily,
    pub revision: u8,
    pub options: &'static [OptionSpec],
}

impl MockMatch {
    pub fn new(revision: u8) -> Self {
        MockMatch {
            name: "mock",
            family: ProtocolFamily::Ipv4,
            revision,
            options: &MOCK_OPTIONS,
        }
    }

    /// Declares an option whose id does not fit in the flags mask.
    pub fn with_wide_option() -> Self {
        MockMatch {
            options: &WIDE_OPTIONS,
            ..MockMatch::new(0)
        }
    }

    pub fn with_duplicate_options() -> Self {
        MockMatch {
            options: &DUPLICATE_OPTIONS,
            ..MockMatch::new(0)
        }
    }
}

impl Extension for MockMatch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn family(&self) -> ProtocolFamily {
        self.family
    }

    fn revision(&self) -> u8 {
        self.revision
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Match
    }

    fn param_size(&self) -> usize {
        0
    }

    fn options(&self) -> &'static [OptionSpec] {
        self.options
    }

    fn init(&self) -> ExtensionData {
        TraceInfo.into()
    }

    fn parse(
        &self,
        id: OptionId,
        _arg: &str,
        _invert: bool,
        _data: &mut ExtensionData,
        _ctx: &RuleContext<'_>,
    ) -> Result<bool, ParameterError> {
        Ok(id == O_MOCK_VALUE || id == O_MOCK_FLAG || id == O_MOCK_WIDE)
    }

    fn final_check(&self, flags: u32) -> Result<(), ParameterError> {
        if flags & (1 << O_MOCK_VALUE) == 0 {
            return Err(ParameterError::MissingArgument("mock-value".to_string()));
        }
        Ok(())
    }

    fn save(&self, _data: &ExtensionData, _header: &RuleHeader) -> Option<String> {
        Some(format!("--mock-value {}", self.revision))
    }

    fn decode(&self, _payload: &[u8]) -> Result<ExtensionData, DecodeError> {
        Ok(TraceInfo.into())
    }

    fn encode(&self, _data: &ExtensionData) -> Vec<u8> {
        Vec::new()
    }
}
