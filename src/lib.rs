use once_cell::sync::Lazy;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int, c_ulonglong};
use std::sync::RwLock;
use tracing::{info, warn};

pub mod config;
pub mod context;
pub mod descriptor;
pub mod distribution;
pub mod error;
pub mod hash;
pub mod partition;

pub use config::{SerializationPolicy, SketchConfig};
pub use context::{Engine, RandomContext};
pub use descriptor::{SketchDescription, SketchDescriptor};
pub use distribution::{
    CauchyScale, DistributionSpec, IndexDistribution, Rademacher, SketchDistribution,
    UniformIndex, ValueDistribution, WzExponential,
};
pub use error::{Result, SketchError};
pub use hash::{HashSketch, HashSketchParams, LocalParams, SUPPORTED_HASH_SKETCHES};
pub use partition::Layout;

pub const SK_OK: c_int = 0;
pub const SK_NULL_POINTER: c_int = 1;
pub const SK_INVALID_UTF8: c_int = 2;
pub const SK_BUFFER_TOO_SMALL: c_int = 3;

static ACTIVE_CONFIG: Lazy<RwLock<SketchConfig>> = Lazy::new(|| {
    let config = SketchConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring invalid sketch configuration from environment.");
        SketchConfig::default()
    });
    RwLock::new(config)
});

fn active_config() -> SketchConfig {
    match ACTIVE_CONFIG.read() {
        Ok(config) => config.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn fail(e: SketchError) -> c_int {
    warn!(code = e.code(), error = %e, "Sketch call failed.");
    e.code()
}

fn read_str<'a>(ptr: *const c_char) -> std::result::Result<&'a str, c_int> {
    if ptr.is_null() {
        return Err(SK_NULL_POINTER);
    }
    let c_str = unsafe { CStr::from_ptr(ptr) };
    c_str.to_str().map_err(|_| SK_INVALID_UTF8)
}

// --- Runtime FFI ---

/// Install a `tracing` fmt subscriber for hosts embedding the library.
/// Calling it again is harmless.
#[unsafe(no_mangle)]
pub extern "C" fn sk_init_logging() -> c_int {
    let _ = tracing_subscriber::fmt::try_init();
    SK_OK
}

/// Replace the active configuration with a JSON `SketchConfig`.
#[unsafe(no_mangle)]
pub extern "C" fn sk_configure(json: *const c_char) -> c_int {
    let json = match read_str(json) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let config = match SketchConfig::from_json(json) {
        Ok(config) => config,
        Err(e) => return fail(e),
    };
    info!(
        engine = config.engine.name(),
        serialization = ?config.serialization,
        "Sketch configuration updated."
    );
    match ACTIVE_CONFIG.write() {
        Ok(mut active) => *active = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
    SK_OK
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_strerror(code: c_int) -> *const c_char {
    let message: &'static CStr = match code {
        SK_OK => c"success",
        SK_NULL_POINTER => c"null pointer argument",
        SK_INVALID_UTF8 => c"string argument is not valid UTF-8",
        SK_BUFFER_TOO_SMALL => c"output buffer too small",
        101 => c"invalid dimension",
        102 => c"invalid sample count",
        103 => c"unsupported distribution",
        104 => c"malformed sketch description",
        105 => c"invalid distribution domain",
        106 => c"coordinates outside input dimension",
        107 => c"invalid process partition",
        108 => c"serialization failed",
        109 => c"unsupported sketch type",
        _ => c"unknown error",
    };
    message.as_ptr()
}

/// Space separated type tags accepted by `sk_create_hash_sketch`.
#[unsafe(no_mangle)]
pub extern "C" fn sk_supported_sketch_types() -> *const c_char {
    c"CWT MMT WZT".as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(s);
    }
}

// --- Context FFI ---

/// Create a context on the configured engine.
#[unsafe(no_mangle)]
pub extern "C" fn sk_create_context(seed: c_ulonglong, out: *mut *mut RandomContext) -> c_int {
    if out.is_null() {
        return SK_NULL_POINTER;
    }
    let context = RandomContext::from_config(seed, &active_config());
    unsafe {
        *out = Box::into_raw(Box::new(context));
    }
    SK_OK
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_create_context_with_engine(
    seed: c_ulonglong,
    engine: *const c_char,
    out: *mut *mut RandomContext,
) -> c_int {
    if out.is_null() {
        return SK_NULL_POINTER;
    }
    let name = match read_str(engine) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let Some(engine) = Engine::from_name(name) else {
        return fail(SketchError::Deserialization(format!(
            "unknown engine {:?}",
            name
        )));
    };
    unsafe {
        *out = Box::into_raw(Box::new(RandomContext::with_engine(seed, engine)));
    }
    SK_OK
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_free_context(ptr: *mut RandomContext) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(ptr);
    }
}

// --- Hash Sketch FFI ---

/// Create unbuilt hash sketch parameters. `p` only applies to WZT.
#[unsafe(no_mangle)]
pub extern "C" fn sk_create_hash_sketch(
    context: *const RandomContext,
    sketch_type: *const c_char,
    n: i64,
    s: i64,
    p: c_double,
    out: *mut *mut HashSketch,
) -> c_int {
    if context.is_null() || out.is_null() {
        return SK_NULL_POINTER;
    }
    let sketch_type = match read_str(sketch_type) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let context = unsafe { *context };
    match HashSketch::new(sketch_type, n, s, context, Some(p)) {
        Ok(sketch) => {
            unsafe {
                *out = Box::into_raw(Box::new(sketch));
            }
            SK_OK
        }
        Err(e) => fail(e),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_free_sketch(ptr: *mut HashSketch) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let _ = Box::from_raw(ptr);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_sketch_dims(
    sketch: *const HashSketch,
    n_out: *mut i64,
    s_out: *mut i64,
) -> c_int {
    if sketch.is_null() || n_out.is_null() || s_out.is_null() {
        return SK_NULL_POINTER;
    }
    let descriptor = unsafe { &*sketch }.descriptor();
    unsafe {
        *n_out = descriptor.n() as i64;
        *s_out = descriptor.s() as i64;
    }
    SK_OK
}

/// Copy the full parameter arrays, building them first if needed.
/// Both buffers must hold at least N entries.
#[unsafe(no_mangle)]
pub extern "C" fn sk_sketch_params(
    sketch: *const HashSketch,
    row_idx_out: *mut u64,
    row_value_out: *mut f64,
    len: usize,
) -> c_int {
    if sketch.is_null() || row_idx_out.is_null() || row_value_out.is_null() {
        return SK_NULL_POINTER;
    }
    let sketch = unsafe { &*sketch };
    let (row_idx, row_value) = match (sketch.row_idx(), sketch.row_value()) {
        (Ok(idx), Ok(val)) => (idx, val),
        (Err(e), _) | (_, Err(e)) => return fail(e),
    };
    copy_params(row_idx, row_value, row_idx_out, row_value_out, len)
}

/// Copy the parameters of input coordinates `[start, end)` without building
/// the full arrays.
#[unsafe(no_mangle)]
pub extern "C" fn sk_sketch_range_params(
    sketch: *const HashSketch,
    start: usize,
    end: usize,
    row_idx_out: *mut u64,
    row_value_out: *mut f64,
    len: usize,
) -> c_int {
    if sketch.is_null() || row_idx_out.is_null() || row_value_out.is_null() {
        return SK_NULL_POINTER;
    }
    let sketch = unsafe { &*sketch };
    match sketch.build_range(start..end) {
        Ok(local) => copy_params(&local.row_idx, &local.row_value, row_idx_out, row_value_out, len),
        Err(e) => fail(e),
    }
}

fn copy_params(
    row_idx: &[usize],
    row_value: &[f64],
    row_idx_out: *mut u64,
    row_value_out: *mut f64,
    len: usize,
) -> c_int {
    if len < row_idx.len() {
        return SK_BUFFER_TOO_SMALL;
    }
    let idx_out = unsafe { std::slice::from_raw_parts_mut(row_idx_out, row_idx.len()) };
    let val_out = unsafe { std::slice::from_raw_parts_mut(row_value_out, row_value.len()) };
    for (dst, &src) in idx_out.iter_mut().zip(row_idx) {
        *dst = src as u64;
    }
    val_out.copy_from_slice(row_value);
    SK_OK
}

/// Serialize under the configured policy. Free the result with
/// `sk_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn sk_sketch_to_json(sketch: *const HashSketch, out: *mut *mut c_char) -> c_int {
    if sketch.is_null() || out.is_null() {
        return SK_NULL_POINTER;
    }
    let sketch = unsafe { &*sketch };
    let json = match sketch
        .describe(active_config().serialization)
        .and_then(|d| d.to_json())
    {
        Ok(json) => json,
        Err(e) => return fail(e),
    };
    match CString::new(json) {
        Ok(c_json) => {
            unsafe {
                *out = c_json.into_raw();
            }
            SK_OK
        }
        Err(e) => fail(SketchError::Serialization(e.to_string())),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn sk_sketch_from_json(json: *const c_char, out: *mut *mut HashSketch) -> c_int {
    if out.is_null() {
        return SK_NULL_POINTER;
    }
    let json = match read_str(json) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match SketchDescription::from_json(json).and_then(|d| HashSketch::from_description(&d)) {
        Ok(sketch) => {
            unsafe {
                *out = Box::into_raw(Box::new(sketch));
            }
            SK_OK
        }
        Err(e) => fail(e),
    }
}
