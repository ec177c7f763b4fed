//! LZF codec used by the `binary_compressed` storage type of PCD files.
//!
//! Two interchangeable decompression backends exist: the built-in decoder in
//! [internal] and, when the crate is compiled with the `lzf` feature, the
//! [lzf](https://crates.io/crates/lzf) crate. Which one is used is decided per call
//! by a [LzfBackendPreference].
//!
//! ```
//! use pcdio::lzf::{compress, decompress, LzfBackendPreference};
//!
//! let data = b"abcabcabcabcabcabc";
//! let compressed = compress(data);
//! let restored = decompress(&compressed, data.len(), LzfBackendPreference::Auto).unwrap();
//! assert_eq!(restored, data);
//! ```

pub mod internal;

use log::{info, warn};
use thiserror::Error;

pub use internal::compress;

/// Errors raised while inflating an LZF stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LzfError {
    /// The stream inflated to a different number of bytes than announced.
    #[error("Expected {expected} decompressed bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// The stream inflates to more than the announced number of bytes.
    #[error("Decompressed data exceeds the expected {expected} bytes")]
    OutputOverflow { expected: usize },
    /// [LzfBackendPreference::ForceExternal] was requested but no external backend is compiled in.
    #[error("The external LZF backend is not available, rebuild with the `lzf` feature")]
    MissingBackend,
    /// The stream cannot be decoded.
    #[error("Corrupt LZF stream at byte {offset}: {reason}")]
    CorruptStream { offset: usize, reason: String },
    /// Failure reported by the external backend.
    #[error("LZF backend error: {0}")]
    Backend(String),
}

/// Selects the decompression backend.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum LzfBackendPreference {
    /// Use the external backend when it is compiled in, otherwise the built-in decoder.
    #[default]
    #[value(name = "auto")]
    Auto,
    /// Always use the built-in decoder.
    #[value(name = "internal")]
    ForceInternal,
    /// Require the external backend.
    #[value(name = "external")]
    ForceExternal,
}

/// A decompressor able to inflate LZF streams.
pub trait LzfBackend {
    fn name(&self) -> &'static str;

    /// Inflates `input` into exactly `expected_len` bytes.
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, LzfError>;
}

/// The pure Rust decoder from [internal].
#[derive(Debug, Copy, Clone, Default)]
pub struct InternalLzf;

impl LzfBackend for InternalLzf {
    fn name(&self) -> &'static str {
        "internal"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, LzfError> {
        internal::decompress(input, expected_len)
    }
}

/// Decoder backed by the `lzf` crate.
#[cfg(feature = "lzf")]
#[derive(Debug, Copy, Clone, Default)]
pub struct ExternalLzf;

#[cfg(feature = "lzf")]
impl LzfBackend for ExternalLzf {
    fn name(&self) -> &'static str {
        "lzf"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, LzfError> {
        // the crate treats an empty stream as corrupt
        if input.is_empty() {
            return match expected_len {
                0 => Ok(Vec::new()),
                expected => Err(LzfError::LengthMismatch {
                    expected,
                    actual: 0,
                }),
            };
        }

        let output = ::lzf::decompress(input, expected_len).map_err(|e| match e {
            ::lzf::LzfError::BufferTooSmall => LzfError::OutputOverflow {
                expected: expected_len,
            },
            other => LzfError::Backend(format!("{other:?}")),
        })?;

        if output.len() != expected_len {
            return Err(LzfError::LengthMismatch {
                expected: expected_len,
                actual: output.len(),
            });
        }
        Ok(output)
    }
}

/// Probes for an external decompression backend.
///
/// This is evaluated on every call, nothing is cached.
pub fn external_backend() -> Option<Box<dyn LzfBackend>> {
    #[cfg(feature = "lzf")]
    {
        Some(Box::new(ExternalLzf))
    }
    #[cfg(not(feature = "lzf"))]
    {
        None
    }
}

/// Resolves a [LzfBackendPreference] into a concrete backend.
pub fn select_backend(preference: LzfBackendPreference) -> Result<Box<dyn LzfBackend>, LzfError> {
    match preference {
        LzfBackendPreference::ForceInternal => Ok(Box::new(InternalLzf)),
        LzfBackendPreference::ForceExternal => external_backend().ok_or(LzfError::MissingBackend),
        LzfBackendPreference::Auto => Ok(external_backend().unwrap_or_else(|| {
            warn!(
                "No external LZF backend available, falling back to the built-in decoder. \
                 Build with the `lzf` feature for faster decompression"
            );
            Box::new(InternalLzf)
        })),
    }
}

/// Inflates `input` into exactly `expected_len` bytes using the preferred backend.
///
/// An `expected_len` the stream cannot possibly reach is rejected before any backend
/// allocates for it.
pub fn decompress(
    input: &[u8],
    expected_len: usize,
    preference: LzfBackendPreference,
) -> Result<Vec<u8>, LzfError> {
    let backend = select_backend(preference)?;
    if expected_len > input.len().saturating_mul(internal::MAX_EXPANSION) {
        return Err(LzfError::CorruptStream {
            offset: input.len(),
            reason: format!(
                "{} bytes cannot inflate to {expected_len} bytes",
                input.len()
            ),
        });
    }
    info!(
        "Decompressing {} bytes into {} bytes with the {} LZF backend",
        input.len(),
        expected_len,
        backend.name()
    );
    backend.decompress(input, expected_len)
}
