use super::{Extension, ExtensionData, OptionSpec};
use crate::error::ParameterError;
use crate::rule::{InvFlags, RuleHeader};

/// The `--h-length` test of the arp rule an extension is being parsed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareLength {
    pub length: u8,
    pub inverted: bool,
}

/// Read access to the rule under construction, for extensions whose options depend on the
/// generic part of the rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    header: &'a RuleHeader,
}

impl<'a> RuleContext<'a> {
    pub fn new(header: &'a RuleHeader) -> Self {
        RuleContext { header }
    }

    pub fn get_header(&self) -> &'a RuleHeader {
        self.header
    }

    /// Returns `None` unless the rule is an arp rule that tests the hardware address length.
    pub fn hardware_length(&self) -> Option<HardwareLength> {
        match self.header {
            RuleHeader::Arp(arp) => arp
                .hw_len
                .filter(|hw_len| hw_len.mask != 0)
                .map(|hw_len| HardwareLength {
                    length: hw_len.value,
                    inverted: arp.inv.contains(InvFlags::HW_LEN),
                }),
            _ => None,
        }
    }
}

/// Drives the option callbacks of one extension to build its parameter block.
///
/// The block starts from [`Extension::init`], each option is dispatched to
/// [`Extension::parse`] and [`ParamParser::finish`] runs [`Extension::final_check`] with the
/// mask of the options that were seen.
pub struct ParamParser<'a> {
    ext: &'a dyn Extension,
    data: ExtensionData,
    flags: u32,
}

impl<'a> ParamParser<'a> {
    pub fn new(ext: &'a dyn Extension) -> Self {
        ParamParser {
            ext,
            data: ext.init(),
            flags: 0,
        }
    }

    pub fn get_data(&self) -> &ExtensionData {
        &self.data
    }

    /// Bit `n` is set once the option of id `n` was parsed.
    pub fn get_flags(&self) -> u32 {
        self.flags
    }

    fn option(&self, long_name: &str) -> Result<&'static OptionSpec, ParameterError> {
        self.ext
            .options()
            .iter()
            .find(|opt| opt.long_name == long_name)
            .ok_or_else(|| ParameterError::UnknownOption(long_name.to_string()))
    }

    /// Applies a single option, given by its long name without the leading dashes.
    pub fn parse_option(
        &mut self,
        long_name: &str,
        arg: Option<&str>,
        invert: bool,
        ctx: &RuleContext<'_>,
    ) -> Result<(), ParameterError> {
        let opt = self.option(long_name)?;
        if invert && !opt.invertible {
            return Err(ParameterError::InversionNotAllowed(long_name.to_string()));
        }
        let arg = match (opt.takes_argument, arg) {
            (true, Some(arg)) => arg,
            (true, None) => return Err(ParameterError::MissingArgument(long_name.to_string())),
            (false, Some(arg)) => return Err(ParameterError::UnexpectedArgument(arg.to_string())),
            (false, None) => "",
        };
        trace!("{}: parsing --{} {:?}", self.ext.name(), long_name, arg);
        if !self.ext.parse(opt.id, arg, invert, &mut self.data, ctx)? {
            return Err(ParameterError::UnknownOption(long_name.to_string()));
        }
        // ids past the mask are refused by the registry
        self.flags |= 1u32.checked_shl(u32::from(opt.id)).unwrap_or(0);
        Ok(())
    }

    /// Applies a whole command line fragment such as `["!", "--opt", "value", "--flag"]`.
    /// Arguments may also be attached with `--opt=value`.
    pub fn parse_args<S: AsRef<str>>(
        &mut self,
        args: &[S],
        ctx: &RuleContext<'_>,
    ) -> Result<(), ParameterError> {
        let mut tokens = args.iter().map(AsRef::as_ref);
        let mut invert = false;
        while let Some(token) = tokens.next() {
            if token == "!" {
                invert = true;
                continue;
            }
            let option = token
                .strip_prefix("--")
                .ok_or_else(|| ParameterError::UnexpectedArgument(token.to_string()))?;
            let (long_name, attached) = match option.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (option, None),
            };
            let arg = match attached {
                Some(value) => Some(value),
                None if self.option(long_name)?.takes_argument => tokens.next(),
                None => None,
            };
            self.parse_option(long_name, arg, invert, ctx)?;
            invert = false;
        }
        Ok(())
    }

    /// Runs the final validation and hands out the parameter block.
    pub fn finish(self) -> Result<ExtensionData, ParameterError> {
        self.ext.final_check(self.flags)?;
        Ok(self.data)
    }
}
