//! Field sanity checks.
//!
//! The same predicates serve two phases: sniffing treats a failure as "no
//! points for this step", decoding treats it as "this format does not match".

use std::path::Path;

use crate::descriptor::Check;
use crate::error::ValidationError;

/// Ceilings guarding against misdetected formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest file count accepted from a header.
    pub max_files: u64,
    /// Longest filename accepted, in bytes.
    pub max_filename_length: usize,
    /// Ceiling for lengths checked before the archive size is known.
    pub max_length: u64,
}

impl Limits {
    pub const DEFAULT_MAX_FILES: u64 = 1_000_000;
    pub const DEFAULT_MAX_FILENAME_LENGTH: usize = 260;
    pub const DEFAULT_MAX_LENGTH: u64 = 1 << 40;

    pub fn with_max_files(mut self, max_files: u64) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_max_filename_length(mut self, max: usize) -> Self {
        self.max_filename_length = max;
        self
    }

    pub fn with_max_length(mut self, max: u64) -> Self {
        self.max_length = max;
        self
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_files: Self::DEFAULT_MAX_FILES,
            max_filename_length: Self::DEFAULT_MAX_FILENAME_LENGTH,
            max_length: Self::DEFAULT_MAX_LENGTH,
        }
    }
}

/// Pure field checks parameterised by [`Limits`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldValidator {
    limits: Limits,
}

impl FieldValidator {
    pub const fn new(limits: Limits) -> Self {
        Self { limits }
    }

    #[inline]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// `value` must lie within `0..=archive_size`.
    #[inline]
    pub fn check_offset(&self, value: u64, archive_size: u64) -> Result<(), ValidationError> {
        if value > archive_size {
            return Err(ValidationError::OffsetOutOfRange {
                value,
                archive_size,
            });
        }
        Ok(())
    }

    /// `value` must lie within `0..=archive_size`.
    #[inline]
    pub fn check_length(&self, value: u64, archive_size: u64) -> Result<(), ValidationError> {
        if value > archive_size {
            return Err(ValidationError::LengthOutOfRange {
                value,
                limit: archive_size,
            });
        }
        Ok(())
    }

    /// Check a length against the configured ceiling only.
    #[inline]
    pub fn check_length_sane(&self, value: u64) -> Result<(), ValidationError> {
        self.check_length(value, self.limits.max_length)
    }

    /// Zero is a valid count.
    #[inline]
    pub fn check_num_files(&self, value: u64) -> Result<(), ValidationError> {
        if value > self.limits.max_files {
            return Err(ValidationError::CountOutOfRange {
                value,
                max: self.limits.max_files,
            });
        }
        Ok(())
    }

    /// A stored filename length must be non-zero and within the limit.
    pub fn check_filename_length(&self, value: u64) -> Result<(), ValidationError> {
        if value == 0 || value > self.limits.max_filename_length as u64 {
            return Err(ValidationError::InvalidFilename {
                name: String::new(),
                reason: "filename length out of range",
            });
        }
        Ok(())
    }

    /// Reject empty, overlong or non-printable names.
    pub fn check_filename(&self, name: &str) -> Result<(), ValidationError> {
        let reason = if name.is_empty() {
            "empty filename"
        } else if name.len() > self.limits.max_filename_length {
            "filename too long"
        } else if name.chars().any(char::is_control) {
            "filename contains control characters"
        } else {
            return Ok(());
        };
        Err(ValidationError::InvalidFilename {
            name: name.chars().take(64).collect(),
            reason,
        })
    }

    /// Case-insensitive extension match. Scoring only, never an error.
    pub fn check_extension(path: &Path, allowed: &[&str]) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
    }

    /// Evaluate a descriptor [`Check`] against a value read from a stream of
    /// `stream_size` bytes.
    pub fn check(&self, check: &Check, value: u64, stream_size: u64) -> Result<(), ValidationError> {
        let accepted = match check {
            Check::Any => true,
            Check::Equals(v) => value == *v,
            Check::OneOf(vs) => vs.contains(&value),
            Check::Range { min, max } => (*min..=*max).contains(&value),
            Check::NonZero => value != 0,
            Check::Offset => return self.check_offset(value, stream_size),
            Check::Length => return self.check_length(value, stream_size),
            Check::Count => return self.check_num_files(value),
        };
        if accepted {
            Ok(())
        } else {
            Err(ValidationError::UnexpectedValue { value })
        }
    }
}
