use std::collections::{BTreeMap, HashSet};

use super::{builtin_extensions, Extension, ExtensionKind, MAX_OPTION_ID};
use crate::error::RegistryError;
use crate::ProtocolFamily;

type RegistryKey = (String, ProtocolFamily, u8);

/// Collects extensions before they can be looked up. Registration happens once, before any
/// rule is parsed or rendered, after which the builder is turned into an immutable [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    extensions: BTreeMap<RegistryKey, Box<dyn Extension>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, ext: Box<dyn Extension>) -> Result<Self, RegistryError> {
        let key = (ext.name().to_string(), ext.family(), ext.revision());
        if self.extensions.contains_key(&key) {
            return Err(RegistryError::DuplicateExtension {
                name: key.0,
                family: key.1,
                revision: key.2,
            });
        }
        let mut seen = HashSet::new();
        for opt in ext.options() {
            if opt.id >= MAX_OPTION_ID {
                return Err(RegistryError::OptionIdOutOfRange {
                    name: key.0,
                    option: opt.long_name.to_string(),
                    id: opt.id,
                });
            }
            if !seen.insert(opt.long_name) {
                return Err(RegistryError::DuplicateOption {
                    name: key.0,
                    option: opt.long_name.to_string(),
                });
            }
        }
        trace!(
            "Registering {} {} (family {:?}, revision {})",
            ext.kind().as_str(),
            key.0,
            key.1,
            key.2
        );
        self.extensions.insert(key, ext);
        Ok(self)
    }

    pub fn finish(self) -> Registry {
        Registry {
            extensions: self.extensions,
        }
    }
}

/// The set of known extensions, keyed by name, family and revision.
pub struct Registry {
    extensions: BTreeMap<RegistryKey, Box<dyn Extension>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry holding the extensions shipped with the crate.
    pub fn with_builtin_extensions() -> Result<Self, RegistryError> {
        builtin_extensions()
            .into_iter()
            .try_fold(RegistryBuilder::new(), RegistryBuilder::register)
            .map(RegistryBuilder::finish)
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.values().map(|ext| ext.as_ref())
    }

    /// Finds the extension `name` usable with `family`. Extensions registered for the exact
    /// family win over the family independent ones. Among the candidates, the highest revision
    /// not above `revision` is selected, or the highest revision when none is requested.
    pub fn lookup(
        &self,
        name: &str,
        family: ProtocolFamily,
        revision: Option<u8>,
    ) -> Result<&dyn Extension, RegistryError> {
        let max_revision = revision.unwrap_or(u8::MAX);
        let mut families = vec![family];
        if family != ProtocolFamily::Unspec {
            families.push(ProtocolFamily::Unspec);
        }
        families
            .into_iter()
            .find_map(|fam| {
                self.extensions
                    .range((name.to_string(), fam, 0)..=(name.to_string(), fam, max_revision))
                    .next_back()
                    .map(|(_, ext)| ext.as_ref())
            })
            .ok_or_else(|| RegistryError::UnknownExtension {
                name: name.to_string(),
                family,
            })
    }

    /// Like [`Registry::lookup`], also checking that the extension is of the given kind.
    pub fn lookup_kind(
        &self,
        name: &str,
        family: ProtocolFamily,
        revision: Option<u8>,
        kind: ExtensionKind,
    ) -> Result<&dyn Extension, RegistryError> {
        let ext = self.lookup(name, family, revision)?;
        if ext.kind() != kind {
            return Err(RegistryError::WrongKind(name.to_string(), kind.as_str()));
        }
        Ok(ext)
    }
}
