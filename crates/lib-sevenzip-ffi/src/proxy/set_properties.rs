//! `ISetProperties` proxy.

use crate::abi::{NativeHandle, SetPropertiesTable};
use crate::codec::{encode_variant, EncodedVariant, NativeString, RawPropVariant, RawString, StringConvention};
use crate::error::{BridgeError, BridgeResult};
use crate::manager::LibraryManager;
use lib_archive_types::{HResult, PropVariant};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

/// Named settings for an archive object, such as compression level.
///
/// Only reachable through a cast, so it never releases the object.
pub struct PropertySetter<'a> {
    table: SetPropertiesTable,
    handle: NativeHandle,
    _owner: PhantomData<&'a ()>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a> PropertySetter<'a> {
    pub(crate) fn alias(manager: &Arc<LibraryManager>, handle: NativeHandle) -> BridgeResult<Self> {
        let table = *manager.table::<SetPropertiesTable>()?;
        Ok(Self {
            table,
            handle,
            _owner: PhantomData,
            _not_sync: PhantomData,
        })
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Apply `properties` in order. Returns the engine's status unchanged.
    pub fn set_properties(&self, properties: &[(&str, PropVariant)]) -> BridgeResult<HResult> {
        let count = u32::try_from(properties.len()).map_err(|_| BridgeError::native(HResult::E_INVALIDARG))?;

        let names = properties
            .iter()
            .map(|(name, _)| NativeString::new(name, StringConvention::NATIVE))
            .collect::<BridgeResult<Vec<_>>>()?;
        let values = properties
            .iter()
            .map(|(_, value)| encode_variant(value, StringConvention::NATIVE))
            .collect::<BridgeResult<Vec<_>>>()?;

        // Contiguous views; `names` and `values` keep the payloads alive.
        let raw_names: Vec<RawString> = names.iter().map(NativeString::as_ptr).collect();
        let raw_values: Vec<RawPropVariant> = values.iter().map(|v| *EncodedVariant::as_raw(v)).collect();

        // SAFETY: both arrays hold `count` elements and outlive the call.
        let status = HResult(unsafe { (self.table.set_properties)(self.handle, raw_names.as_ptr(), raw_values.as_ptr(), count) });
        tracing::debug!(handle = %self.handle, count, status = %status, "ISetProperties::SetProperties");
        Ok(status)
    }
}

impl std::fmt::Debug for PropertySetter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySetter").field("handle", &self.handle).finish()
    }
}
