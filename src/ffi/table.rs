//! Function table shared by every component.

use std::fmt;

use super::error::check_status;
use super::handles::Handle;
use super::raw::{ClassTypeIdFn, GetLastErrorFn, GetVersionFn, InstanceFn};
use crate::error::{Error, Result};
use crate::symbols::SymbolLookup;
use crate::types::{LoadOptions, TypeTag, Version};

/// The fixed operations every component exposes, resolved by name.
pub struct BaseTable {
    component: &'static str,
    namespace: &'static str,
    options: LoadOptions,
    symbols: SymbolLookup,
    pub(crate) get_version: GetVersionFn,
    pub(crate) get_last_error: GetLastErrorFn,
    pub(crate) acquire_instance: InstanceFn,
    pub(crate) release_instance: InstanceFn,
    pub(crate) class_type_id: ClassTypeIdFn,
}

impl BaseTable {
    /// Resolve the fixed operations of `namespace` and check the binary version.
    ///
    /// # Safety
    ///
    /// The lookup function must return addresses whose signatures match the
    /// fixed cross-component operations.
    pub unsafe fn load(
        symbols: SymbolLookup,
        namespace: &'static str,
        component: &'static str,
        binding: Version,
        options: LoadOptions,
    ) -> Result<Self> {
        let table = Self {
            component,
            namespace,
            options,
            symbols,
            get_version: symbols.resolve_fn(namespace, "getversion")?,
            get_last_error: symbols.resolve_fn(namespace, "getlasterror")?,
            acquire_instance: symbols.resolve_fn(namespace, "acquireinstance")?,
            release_instance: symbols.resolve_fn(namespace, "releaseinstance")?,
            class_type_id: symbols.resolve_fn(namespace, "base_classtypeid")?,
        };

        if table.options.verify_version {
            let native = table.version()?;
            if !native.is_compatible_with(&binding) {
                return Err(Error::IncompatibleVersion {
                    component,
                    native,
                    binding,
                });
            }
        }

        log::debug!("loaded {} component (namespace {})", component, namespace);
        Ok(table)
    }

    /// Component name used in error messages, e.g. `"Zoo"`.
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Symbol namespace of the component.
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Options the component was loaded with.
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Symbol lookup the component was loaded through.
    pub fn symbols(&self) -> &SymbolLookup {
        &self.symbols
    }

    /// Query the native binary version.
    pub fn version(&self) -> Result<Version> {
        let mut version = Version::default();
        let status = unsafe {
            (self.get_version)(&mut version.major, &mut version.minor, &mut version.micro)
        };
        check_status(self, Handle::null(), status)?;
        Ok(version)
    }

    /// Query the type tag of the object behind `handle`.
    pub fn class_type_id(&self, handle: Handle) -> Result<TypeTag> {
        if handle.is_null() {
            return Err(Error::InvalidHandle);
        }
        let mut tag = 0u64;
        let status = unsafe { (self.class_type_id)(handle, &mut tag) };
        check_status(self, handle, status)?;
        Ok(TypeTag::new(tag))
    }
}

impl fmt::Debug for BaseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseTable")
            .field("component", &self.component)
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
