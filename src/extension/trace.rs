use super::{check_payload_size, Extension, ExtensionData, ExtensionKind};
use crate::error::DecodeError;
use crate::{ProtocolFamily, RuleHeader};

/// The `TRACE` target has no parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceInfo;

/// Marks packets so that the kernel logs every rule they traverse. Usable with every family.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trace;

impl Extension for Trace {
    fn name(&self) -> &'static str {
        "TRACE"
    }

    fn family(&self) -> ProtocolFamily {
        ProtocolFamily::Unspec
    }

    fn kind(&self) -> ExtensionKind {
        ExtensionKind::Target
    }

    fn param_size(&self) -> usize {
        0
    }

    fn init(&self) -> ExtensionData {
        TraceInfo.into()
    }

    fn translate(&self, _data: &ExtensionData, _header: &RuleHeader) -> Option<String> {
        Some("nftrace set 1".to_string())
    }

    fn decode(&self, payload: &[u8]) -> Result<ExtensionData, DecodeError> {
        check_payload_size(self.name(), payload, 0)?;
        Ok(TraceInfo.into())
    }

    fn encode(&self, _data: &ExtensionData) -> Vec<u8> {
        Vec::new()
    }
}
