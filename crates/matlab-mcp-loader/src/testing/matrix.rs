//! Fake matrix library.
//!
//! Owned arrays are boxed [`FakeValue`]s; field and cell accessors return
//! pointers into their parent, as the real API does.

use std::ffi::{c_char, c_void, CStr, CString};

use crate::ffi::{
    EntryPoint, MxArrayToString, MxCreateDoubleScalar, MxCreateLogicalScalar, MxCreateString,
    MxDestroyArray, MxFree, MxGetCell, MxGetField, MxGetLogicals, MxGetNumberOfElements,
    MxGetPr, MxIsCell, MxIsChar, MxIsDouble, MxIsLogical, MxIsNumeric, MxIsStruct, RawArray,
};

/// A value held by the fake engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeValue {
    /// Real double scalar
    Double(f64),
    /// int32 scalar
    Int32(i32),
    /// Character array
    Char(CString),
    /// Logical scalar
    Logical(bool),
    /// Cell array
    Cell(Vec<FakeValue>),
    /// 1x1 struct with named fields
    Struct(Vec<(String, FakeValue)>),
}

impl FakeValue {
    /// Character array from text; interior NUL bytes are dropped.
    pub fn text(value: &str) -> Self {
        let bytes: Vec<u8> = value.bytes().filter(|b| *b != 0).collect();
        FakeValue::Char(CString::new(bytes).unwrap_or_default())
    }

    /// 1x1 struct from `(field, value)` pairs.
    pub fn structure<'a>(fields: impl IntoIterator<Item = (&'a str, FakeValue)>) -> Self {
        FakeValue::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Cell array of character arrays.
    pub fn text_cell<'a>(items: impl IntoIterator<Item = &'a str>) -> Self {
        FakeValue::Cell(items.into_iter().map(FakeValue::text).collect())
    }

    /// Hand ownership to native code as an `mxArray*`.
    ///
    /// Release it with `mxDestroyArray`.
    pub fn into_raw(self) -> *mut RawArray {
        Box::into_raw(Box::new(self)) as *mut RawArray
    }

    /// Borrow the value behind an `mxArray*` created by this module.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live `FakeValue`.
    pub unsafe fn from_ptr<'a>(ptr: *const RawArray) -> Option<&'a FakeValue> {
        unsafe { (ptr as *const FakeValue).as_ref() }
    }

    pub(super) fn parse(expr: &str) -> Self {
        match expr {
            "true" => FakeValue::Logical(true),
            "false" => FakeValue::Logical(false),
            _ => {
                let int32 = expr
                    .strip_prefix("int32(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|digits| digits.trim().parse::<i32>().ok());
                if let Some(number) = int32 {
                    FakeValue::Int32(number)
                } else if let Ok(number) = expr.parse::<f64>() {
                    FakeValue::Double(number)
                } else {
                    FakeValue::text(expr.trim_matches('\''))
                }
            }
        }
    }

    pub(super) fn display(&self) -> String {
        match self {
            FakeValue::Double(value) => value.to_string(),
            FakeValue::Int32(value) => value.to_string(),
            FakeValue::Char(value) => format!("'{}'", value.to_string_lossy()),
            FakeValue::Logical(value) => u8::from(*value).to_string(),
            FakeValue::Cell(items) => format!("{{1x{} cell}}", items.len()),
            FakeValue::Struct(fields) => format!("[1x1 struct, {} fields]", fields.len()),
        }
    }
}

unsafe fn value<'a>(pa: *const RawArray) -> Option<&'a FakeValue> {
    unsafe { FakeValue::from_ptr(pa) }
}

fn borrowed(value: &FakeValue) -> *mut RawArray {
    value as *const FakeValue as *mut RawArray
}

unsafe extern "C" fn mx_get_field(pa: *const RawArray, index: usize, name: *const c_char) -> *mut RawArray {
    let Some(FakeValue::Struct(fields)) = (unsafe { value(pa) }) else {
        return std::ptr::null_mut();
    };
    if index != 0 || name.is_null() {
        return std::ptr::null_mut();
    }

    let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
    fields
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, value)| borrowed(value))
        .unwrap_or(std::ptr::null_mut())
}

unsafe extern "C" fn mx_is_numeric(pa: *const RawArray) -> bool {
    matches!(unsafe { value(pa) }, Some(FakeValue::Double(_) | FakeValue::Int32(_)))
}

unsafe extern "C" fn mx_is_double(pa: *const RawArray) -> bool {
    matches!(unsafe { value(pa) }, Some(FakeValue::Double(_)))
}

unsafe extern "C" fn mx_is_char(pa: *const RawArray) -> bool {
    matches!(unsafe { value(pa) }, Some(FakeValue::Char(_)))
}

unsafe extern "C" fn mx_is_cell(pa: *const RawArray) -> bool {
    matches!(unsafe { value(pa) }, Some(FakeValue::Cell(_)))
}

unsafe extern "C" fn mx_is_logical(pa: *const RawArray) -> bool {
    matches!(unsafe { value(pa) }, Some(FakeValue::Logical(_)))
}

unsafe extern "C" fn mx_is_struct(pa: *const RawArray) -> bool {
    matches!(unsafe { value(pa) }, Some(FakeValue::Struct(_)))
}

unsafe extern "C" fn mx_get_pr(pa: *const RawArray) -> *mut f64 {
    match unsafe { value(pa) } {
        Some(FakeValue::Double(number)) => number as *const f64 as *mut f64,
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn mx_get_logicals(pa: *const RawArray) -> *mut bool {
    match unsafe { value(pa) } {
        Some(FakeValue::Logical(flag)) => flag as *const bool as *mut bool,
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn mx_get_number_of_elements(pa: *const RawArray) -> usize {
    match unsafe { value(pa) } {
        Some(FakeValue::Cell(items)) => items.len(),
        Some(FakeValue::Char(text)) => text.as_bytes().len(),
        Some(_) => 1,
        None => 0,
    }
}

unsafe extern "C" fn mx_get_cell(pa: *const RawArray, index: usize) -> *mut RawArray {
    match unsafe { value(pa) } {
        Some(FakeValue::Cell(items)) => items
            .get(index)
            .map(borrowed)
            .unwrap_or(std::ptr::null_mut()),
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn mx_array_to_string(pa: *const RawArray) -> *mut c_char {
    match unsafe { value(pa) } {
        Some(FakeValue::Char(text)) => text.clone().into_raw(),
        _ => std::ptr::null_mut(),
    }
}

// Only strings from `mxArrayToString` are ever freed through here.
unsafe extern "C" fn mx_free(ptr: *mut c_void) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr as *mut c_char) });
    }
}

unsafe extern "C" fn mx_create_double_scalar(number: f64) -> *mut RawArray {
    FakeValue::Double(number).into_raw()
}

unsafe extern "C" fn mx_create_string(text: *const c_char) -> *mut RawArray {
    if text.is_null() {
        return std::ptr::null_mut();
    }
    FakeValue::Char(unsafe { CStr::from_ptr(text) }.to_owned()).into_raw()
}

unsafe extern "C" fn mx_create_logical_scalar(flag: bool) -> *mut RawArray {
    FakeValue::Logical(flag).into_raw()
}

unsafe extern "C" fn mx_destroy_array(pa: *mut RawArray) {
    if !pa.is_null() {
        drop(unsafe { Box::from_raw(pa as *mut FakeValue) });
    }
}

pub(super) fn symbol(name: &str) -> Option<*const c_void> {
    let table: [(&str, *const c_void); 17] = [
        (MxGetField::SYMBOL, mx_get_field as *const c_void),
        (MxIsNumeric::SYMBOL, mx_is_numeric as *const c_void),
        (MxIsDouble::SYMBOL, mx_is_double as *const c_void),
        (MxIsChar::SYMBOL, mx_is_char as *const c_void),
        (MxIsCell::SYMBOL, mx_is_cell as *const c_void),
        (MxIsLogical::SYMBOL, mx_is_logical as *const c_void),
        (MxIsStruct::SYMBOL, mx_is_struct as *const c_void),
        (MxGetPr::SYMBOL, mx_get_pr as *const c_void),
        (MxGetLogicals::SYMBOL, mx_get_logicals as *const c_void),
        (MxGetNumberOfElements::SYMBOL, mx_get_number_of_elements as *const c_void),
        (MxGetCell::SYMBOL, mx_get_cell as *const c_void),
        (MxArrayToString::SYMBOL, mx_array_to_string as *const c_void),
        (MxFree::SYMBOL, mx_free as *const c_void),
        (MxCreateDoubleScalar::SYMBOL, mx_create_double_scalar as *const c_void),
        (MxCreateString::SYMBOL, mx_create_string as *const c_void),
        (MxCreateLogicalScalar::SYMBOL, mx_create_logical_scalar as *const c_void),
        (MxDestroyArray::SYMBOL, mx_destroy_array as *const c_void),
    ];

    table
        .iter()
        .find(|(symbol, _)| *symbol == name)
        .map(|(_, address)| *address)
}
