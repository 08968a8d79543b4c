//! Typed binding table for the native engine and matrix APIs.
//!
//! Every entry point the workspace calls is declared exactly once below: a
//! marker type, the exported symbol, the library that exports it, and its C
//! signature. [`crate::DynamicLibrary::resolve`] only accepts these markers,
//! so a symbol can never be bound to a signature other than the one
//! registered here, and asking a library for an entry point it does not
//! export is rejected before the native loader is consulted.

use std::ffi::{c_char, c_int, c_void};

/// Opaque native engine handle (`Engine*`).
#[repr(C)]
pub struct Engine {
    _private: [u8; 0],
}

/// Opaque native matrix value (`mxArray*`).
#[repr(C)]
pub struct RawArray {
    _private: [u8; 0],
}

/// The three native libraries of a MATLAB install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryKind {
    /// Engine library (`libeng`)
    Engine,
    /// Matrix library (`libmx`)
    Matrix,
    /// MAT-file library (`libmat`)
    Mat,
}

impl LibraryKind {
    /// All kinds in registry order.
    pub const ALL: [LibraryKind; 3] = [LibraryKind::Engine, LibraryKind::Matrix, LibraryKind::Mat];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            LibraryKind::Engine => "engine",
            LibraryKind::Matrix => "matrix",
            LibraryKind::Mat => "mat",
        }
    }
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A registered native function.
pub trait EntryPoint {
    /// C signature of the function.
    type Fn: Copy;

    /// Exported symbol name.
    const SYMBOL: &'static str;

    /// Library exporting the symbol.
    const LIBRARY: LibraryKind;

    /// Bind a raw symbol address to this entry point's signature.
    ///
    /// # Safety
    ///
    /// `raw` must be the address of the function named [`Self::SYMBOL`],
    /// exported with the signature [`Self::Fn`].
    unsafe fn bind(raw: *const c_void) -> BoundFn;

    /// Extract the typed pointer from a cached binding.
    fn unwrap(bound: BoundFn) -> Option<Self::Fn>;
}

macro_rules! entry_points {
    ($(
        $(#[$doc:meta])*
        $marker:ident => $library:ident, $symbol:literal, $sig:ty;
    )*) => {
        /// A bound native function, tagged by entry point.
        #[derive(Clone, Copy)]
        pub enum BoundFn {
            $(
                $(#[$doc])*
                $marker($sig),
            )*
        }

        impl BoundFn {
            /// Address of the bound function.
            pub fn address(&self) -> usize {
                match self {
                    $(BoundFn::$marker(f) => *f as usize,)*
                }
            }
        }

        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy)]
            pub struct $marker;

            impl EntryPoint for $marker {
                type Fn = $sig;
                const SYMBOL: &'static str = $symbol;
                const LIBRARY: LibraryKind = LibraryKind::$library;

                unsafe fn bind(raw: *const c_void) -> BoundFn {
                    BoundFn::$marker(unsafe { std::mem::transmute::<*const c_void, $sig>(raw) })
                }

                fn unwrap(bound: BoundFn) -> Option<$sig> {
                    match bound {
                        BoundFn::$marker(f) => Some(f),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*

        /// Every registered `(library, symbol)` pair.
        pub const REGISTERED: &[(LibraryKind, &str)] = &[$((LibraryKind::$library, $symbol),)*];
    };
}

entry_points! {
    /// `Engine* engOpen(const char* startcmd)`
    EngOpen => Engine, "engOpen",
        unsafe extern "C" fn(*const c_char) -> *mut Engine;
    /// `Engine* engOpenSingleUse(const char*, void*, int* retstatus)` (Windows only)
    EngOpenSingleUse => Engine, "engOpenSingleUse",
        unsafe extern "C" fn(*const c_char, *mut c_void, *mut c_int) -> *mut Engine;
    /// `int engClose(Engine*)`
    EngClose => Engine, "engClose",
        unsafe extern "C" fn(*mut Engine) -> c_int;
    /// `int engEvalString(Engine*, const char*)`
    EngEvalString => Engine, "engEvalString",
        unsafe extern "C" fn(*mut Engine, *const c_char) -> c_int;
    /// `mxArray* engGetVariable(Engine*, const char*)`
    EngGetVariable => Engine, "engGetVariable_800",
        unsafe extern "C" fn(*mut Engine, *const c_char) -> *mut RawArray;
    /// `int engPutVariable(Engine*, const char*, const mxArray*)`
    EngPutVariable => Engine, "engPutVariable_800",
        unsafe extern "C" fn(*mut Engine, *const c_char, *const RawArray) -> c_int;
    /// `int engOutputBuffer(Engine*, char* buffer, int n)`
    EngOutputBuffer => Engine, "engOutputBuffer",
        unsafe extern "C" fn(*mut Engine, *mut c_char, c_int) -> c_int;
    /// `int engGetVisible(Engine*, bool*)`
    EngGetVisible => Engine, "engGetVisible",
        unsafe extern "C" fn(*mut Engine, *mut bool) -> c_int;
    /// `int engSetVisible(Engine*, bool)`
    EngSetVisible => Engine, "engSetVisible",
        unsafe extern "C" fn(*mut Engine, bool) -> c_int;

    /// `mxArray* mxGetField(const mxArray*, size_t index, const char* name)`
    MxGetField => Matrix, "mxGetField_800",
        unsafe extern "C" fn(*const RawArray, usize, *const c_char) -> *mut RawArray;
    /// `bool mxIsNumeric(const mxArray*)`
    MxIsNumeric => Matrix, "mxIsNumeric_800",
        unsafe extern "C" fn(*const RawArray) -> bool;
    /// `bool mxIsDouble(const mxArray*)`
    MxIsDouble => Matrix, "mxIsDouble_800",
        unsafe extern "C" fn(*const RawArray) -> bool;
    /// `bool mxIsChar(const mxArray*)`
    MxIsChar => Matrix, "mxIsChar_800",
        unsafe extern "C" fn(*const RawArray) -> bool;
    /// `bool mxIsCell(const mxArray*)`
    MxIsCell => Matrix, "mxIsCell_800",
        unsafe extern "C" fn(*const RawArray) -> bool;
    /// `bool mxIsLogical(const mxArray*)`
    MxIsLogical => Matrix, "mxIsLogical_800",
        unsafe extern "C" fn(*const RawArray) -> bool;
    /// `bool mxIsStruct(const mxArray*)`
    MxIsStruct => Matrix, "mxIsStruct_800",
        unsafe extern "C" fn(*const RawArray) -> bool;
    /// `double* mxGetPr(const mxArray*)`
    MxGetPr => Matrix, "mxGetPr_800",
        unsafe extern "C" fn(*const RawArray) -> *mut f64;
    /// `mxLogical* mxGetLogicals(const mxArray*)`
    MxGetLogicals => Matrix, "mxGetLogicals_800",
        unsafe extern "C" fn(*const RawArray) -> *mut bool;
    /// `size_t mxGetNumberOfElements(const mxArray*)`
    MxGetNumberOfElements => Matrix, "mxGetNumberOfElements_800",
        unsafe extern "C" fn(*const RawArray) -> usize;
    /// `mxArray* mxGetCell(const mxArray*, size_t index)`
    MxGetCell => Matrix, "mxGetCell_800",
        unsafe extern "C" fn(*const RawArray, usize) -> *mut RawArray;
    /// `char* mxArrayToString(const mxArray*)`, freed with `mxFree`
    MxArrayToString => Matrix, "mxArrayToString_800",
        unsafe extern "C" fn(*const RawArray) -> *mut c_char;
    /// `void mxFree(void*)`
    MxFree => Matrix, "mxFree_800",
        unsafe extern "C" fn(*mut c_void);
    /// `mxArray* mxCreateDoubleScalar(double)`
    MxCreateDoubleScalar => Matrix, "mxCreateDoubleScalar_800",
        unsafe extern "C" fn(f64) -> *mut RawArray;
    /// `mxArray* mxCreateString(const char*)`
    MxCreateString => Matrix, "mxCreateString_800",
        unsafe extern "C" fn(*const c_char) -> *mut RawArray;
    /// `mxArray* mxCreateLogicalScalar(bool)`
    MxCreateLogicalScalar => Matrix, "mxCreateLogicalScalar_800",
        unsafe extern "C" fn(bool) -> *mut RawArray;
    /// `void mxDestroyArray(mxArray*)`
    MxDestroyArray => Matrix, "mxDestroyArray_800",
        unsafe extern "C" fn(*mut RawArray);
}

/// Check whether `symbol` is registered for `library`.
pub fn is_registered(library: LibraryKind, symbol: &str) -> bool {
    REGISTERED
        .iter()
        .any(|(kind, name)| *kind == library && *name == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_unique() {
        let mut names: Vec<&str> = REGISTERED.iter().map(|(_, name)| *name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_engine_symbols_registered() {
        assert!(is_registered(LibraryKind::Engine, "engEvalString"));
        assert!(is_registered(LibraryKind::Engine, EngOpenSingleUse::SYMBOL));
        assert!(!is_registered(LibraryKind::Matrix, "engEvalString"));
    }

    #[test]
    fn test_matrix_symbols_are_versioned() {
        for (kind, name) in REGISTERED {
            if *kind == LibraryKind::Matrix {
                assert!(name.ends_with("_800"), "{name} is not versioned");
            }
        }
    }

    #[test]
    fn test_mat_library_has_no_entry_points() {
        assert!(!REGISTERED.iter().any(|(kind, _)| *kind == LibraryKind::Mat));
    }

    #[test]
    fn test_unwrap_rejects_other_entry_point() {
        unsafe extern "C" fn close(_: *mut Engine) -> c_int {
            0
        }

        let bound = unsafe { EngClose::bind(close as *const c_void) };
        assert!(EngClose::unwrap(bound).is_some());
        assert!(EngEvalString::unwrap(bound).is_none());
        assert_eq!(bound.address(), close as usize);
    }

    #[test]
    fn test_library_kind_label() {
        assert_eq!(LibraryKind::Engine.to_string(), "engine");
        assert_eq!(LibraryKind::ALL.len(), 3);
    }
}
