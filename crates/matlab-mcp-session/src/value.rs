//! Owned engine values and struct decoding.

use std::ffi::{c_void, CStr, CString};
use std::ptr::NonNull;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use matlab_mcp_core::{Error, Result};
use matlab_mcp_loader::ffi::{
    MxArrayToString, MxCreateDoubleScalar, MxCreateLogicalScalar, MxCreateString, MxDestroyArray,
    MxFree, MxGetCell, MxGetField, MxGetLogicals, MxGetNumberOfElements, MxGetPr, MxIsCell,
    MxIsChar, MxIsDouble, MxIsLogical, MxIsNumeric, MxIsStruct,
};
use matlab_mcp_loader::{LibraryRegistry, RawArray};

/// Type of an engine value, as far as this crate decodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValueClass {
    /// Numeric array
    Numeric,
    /// Character array
    Char,
    /// Logical array
    Logical,
    /// Cell array
    Cell,
    /// Struct array
    Struct,
    /// Anything else (function handles, objects, ...)
    Other,
}

/// An engine value owned by this process.
///
/// Returned by [`crate::EngineSession::get_var`] or created through the
/// matrix library. The value is destroyed with `mxDestroyArray` on drop.
/// Fields read while decoding belong to the parent and are never destroyed
/// on their own.
pub struct MxArray {
    ptr: NonNull<RawArray>,
    libs: Arc<LibraryRegistry>,
}

// SAFETY: the array is uniquely owned and only touched through `&self` or
// `&mut self`; the matrix library keeps no thread affinity for it.
unsafe impl Send for MxArray {}

impl MxArray {
    /// Take ownership of a native array.
    ///
    /// # Safety
    ///
    /// `ptr` must be an owned `mxArray*` created by the matrix library in
    /// `libs`, not referenced by any other owner.
    pub unsafe fn from_raw(ptr: NonNull<RawArray>, libs: Arc<LibraryRegistry>) -> Self {
        Self { ptr, libs }
    }

    /// Native pointer, valid while `self` lives.
    pub fn as_ptr(&self) -> *const RawArray {
        self.ptr.as_ptr()
    }

    /// Real double scalar.
    pub fn scalar(libs: &Arc<LibraryRegistry>, value: f64) -> Result<Self> {
        let create = libs.matrix().resolve::<MxCreateDoubleScalar>()?;
        let ptr = unsafe { create(value) };
        Self::created(libs, ptr, "mxCreateDoubleScalar")
    }

    /// Character array.
    pub fn string(libs: &Arc<LibraryRegistry>, value: &str) -> Result<Self> {
        let create = libs.matrix().resolve::<MxCreateString>()?;
        let text = CString::new(value)?;
        let ptr = unsafe { create(text.as_ptr()) };
        Self::created(libs, ptr, "mxCreateString")
    }

    /// Logical scalar.
    pub fn logical(libs: &Arc<LibraryRegistry>, value: bool) -> Result<Self> {
        let create = libs.matrix().resolve::<MxCreateLogicalScalar>()?;
        let ptr = unsafe { create(value) };
        Self::created(libs, ptr, "mxCreateLogicalScalar")
    }

    fn created(libs: &Arc<LibraryRegistry>, ptr: *mut RawArray, call: &'static str) -> Result<Self> {
        let ptr = NonNull::new(ptr).ok_or(Error::NativeCall { call, status: -1 })?;
        Ok(Self {
            ptr,
            libs: Arc::clone(libs),
        })
    }

    /// Class of the value.
    pub fn class(&self) -> Result<ValueClass> {
        classify(&self.libs, self.as_ptr())
    }

    /// First element of a real double value, `None` for other classes.
    ///
    /// Integer and single values are numeric but not decoded.
    pub fn to_scalar(&self) -> Result<Option<f64>> {
        unsafe { read_scalar(&self.libs, self.as_ptr()) }
    }

    /// Text of a character value, `None` for other classes.
    pub fn to_text(&self) -> Result<Option<String>> {
        unsafe { read_text(&self.libs, self.as_ptr()) }
    }

    /// First element of a logical value, `None` for other classes.
    pub fn to_bool(&self) -> Result<Option<bool>> {
        unsafe { read_bool(&self.libs, self.as_ptr()) }
    }

    /// Numeric field of a 1x1 struct.
    ///
    /// # Panics
    ///
    /// Panics when the value is not a struct, the field is missing, or the
    /// field is not a double.
    pub fn scalar_field(&self, name: &str) -> Result<f64> {
        let field = self.field(name)?;
        let value = unsafe { read_scalar(&self.libs, field.as_ptr()) }?;
        Ok(value.unwrap_or_else(|| shape_violation(name, "a double")))
    }

    /// Character field of a 1x1 struct.
    ///
    /// # Panics
    ///
    /// Panics when the value is not a struct, the field is missing, or the
    /// field is not a character array.
    pub fn string_field(&self, name: &str) -> Result<String> {
        let field = self.field(name)?;
        let value = unsafe { read_text(&self.libs, field.as_ptr()) }?;
        Ok(value.unwrap_or_else(|| shape_violation(name, "a character array")))
    }

    /// Cell-of-strings field of a 1x1 struct.
    ///
    /// # Panics
    ///
    /// Panics when the value is not a struct, the field is missing, the
    /// field is not a cell array, or any element is not a character array.
    pub fn string_vec_field(&self, name: &str) -> Result<Vec<String>> {
        let matrix = self.libs.matrix();
        let is_cell = matrix.resolve::<MxIsCell>()?;
        let count = matrix.resolve::<MxGetNumberOfElements>()?;
        let get_cell = matrix.resolve::<MxGetCell>()?;

        let field = self.field(name)?;
        if !unsafe { is_cell(field.as_ptr()) } {
            shape_violation(name, "a cell array");
        }

        let len = unsafe { count(field.as_ptr()) };
        let mut strings = Vec::with_capacity(len);
        for index in 0..len {
            let item = unsafe { get_cell(field.as_ptr(), index) };
            if item.is_null() {
                shape_violation(name, "a cell array of strings");
            }
            let text = unsafe { read_text(&self.libs, item) }?;
            strings.push(text.unwrap_or_else(|| shape_violation(name, "a cell array of strings")));
        }
        Ok(strings)
    }

    /// Logical field of a 1x1 struct.
    ///
    /// # Panics
    ///
    /// Panics when the value is not a struct, the field is missing, or the
    /// field is not logical.
    pub fn bool_field(&self, name: &str) -> Result<bool> {
        let field = self.field(name)?;
        let value = unsafe { read_bool(&self.libs, field.as_ptr()) }?;
        Ok(value.unwrap_or_else(|| shape_violation(name, "logical")))
    }

    /// Borrowed view of a field of element 0.
    fn field(&self, name: &str) -> Result<NonNull<RawArray>> {
        let matrix = self.libs.matrix();
        let is_struct = matrix.resolve::<MxIsStruct>()?;
        let get_field = matrix.resolve::<MxGetField>()?;

        if !unsafe { is_struct(self.as_ptr()) } {
            shape_violation(name, "readable because the value is not a struct");
        }

        let field_name = CString::new(name)?;
        let ptr = unsafe { get_field(self.as_ptr(), 0, field_name.as_ptr()) };
        Ok(NonNull::new(ptr).unwrap_or_else(|| shape_violation(name, "present")))
    }
}

impl Drop for MxArray {
    fn drop(&mut self) {
        match self.libs.matrix().resolve::<MxDestroyArray>() {
            Ok(destroy) => unsafe { destroy(self.ptr.as_ptr()) },
            // The array leaks.
            Err(e) => warn!("Cannot destroy engine value: {}", e),
        }
    }
}

impl std::fmt::Debug for MxArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MxArray").field("ptr", &self.ptr).finish()
    }
}

fn shape_violation(field: &str, expected: &str) -> ! {
    panic!("caller violated the expected value shape: field '{field}' is not {expected}")
}

fn classify(libs: &LibraryRegistry, pa: *const RawArray) -> Result<ValueClass> {
    let matrix = libs.matrix();
    let checks = [
        (matrix.resolve::<MxIsNumeric>()?, ValueClass::Numeric),
        (matrix.resolve::<MxIsChar>()?, ValueClass::Char),
        (matrix.resolve::<MxIsLogical>()?, ValueClass::Logical),
        (matrix.resolve::<MxIsCell>()?, ValueClass::Cell),
        (matrix.resolve::<MxIsStruct>()?, ValueClass::Struct),
    ];

    Ok(checks
        .iter()
        .find(|&&(check, _)| unsafe { check(pa) })
        .map(|&(_, class)| class)
        .unwrap_or(ValueClass::Other))
}

/// # Safety
///
/// `pa` must be a live `mxArray*` of the matrix library in `libs`.
unsafe fn read_scalar(libs: &LibraryRegistry, pa: *const RawArray) -> Result<Option<f64>> {
    let is_double = libs.matrix().resolve::<MxIsDouble>()?;
    let get_pr = libs.matrix().resolve::<MxGetPr>()?;

    if !unsafe { is_double(pa) } {
        return Ok(None);
    }
    let data = unsafe { get_pr(pa) };
    Ok(unsafe { data.as_ref() }.copied())
}

/// # Safety
///
/// `pa` must be a live `mxArray*` of the matrix library in `libs`.
unsafe fn read_text(libs: &LibraryRegistry, pa: *const RawArray) -> Result<Option<String>> {
    let is_char = libs.matrix().resolve::<MxIsChar>()?;
    let to_string = libs.matrix().resolve::<MxArrayToString>()?;
    let free = libs.matrix().resolve::<MxFree>()?;

    if !unsafe { is_char(pa) } {
        return Ok(None);
    }
    let raw = unsafe { to_string(pa) };
    if raw.is_null() {
        return Ok(None);
    }

    let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
    unsafe { free(raw as *mut c_void) };
    Ok(Some(text))
}

/// # Safety
///
/// `pa` must be a live `mxArray*` of the matrix library in `libs`.
unsafe fn read_bool(libs: &LibraryRegistry, pa: *const RawArray) -> Result<Option<bool>> {
    let is_logical = libs.matrix().resolve::<MxIsLogical>()?;
    let get_logicals = libs.matrix().resolve::<MxGetLogicals>()?;

    if !unsafe { is_logical(pa) } {
        return Ok(None);
    }
    let data = unsafe { get_logicals(pa) };
    Ok(unsafe { data.as_ref() }.copied())
}
