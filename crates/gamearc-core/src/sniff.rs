//! Format sniffing.
//!
//! Scoring is a total function. Probe steps read sequentially from the start
//! of the stream; a step whose check fails contributes nothing, and the first
//! read that fails ends scoring with whatever was earned so far.

use std::path::Path;

use gamearc_common::ByteSource;
use tracing::trace;

use crate::descriptor::{Anchor, FormatDescriptor, NameEncoding, ProbeStep, Scope};
use crate::validate::FieldValidator;

/// Outcome of one probe step.
enum Outcome {
    Hit,
    Miss,
    /// The stream could not be read further.
    Exhausted,
}

/// Computes how confidently a descriptor matches a stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatSniffer {
    validator: FieldValidator,
}

impl FormatSniffer {
    pub const fn new(validator: FieldValidator) -> Self {
        Self { validator }
    }

    /// Score `source` against `descriptor`'s probe steps.
    ///
    /// The source is not modified; probing runs on a private cursor.
    pub fn score(&self, source: &ByteSource, descriptor: &FormatDescriptor) -> u32 {
        let mut probe = source.clone();
        if probe.seek(0).is_err() {
            return 0;
        }
        // Probes mirror the header layout, so they see it the way decoding does.
        for scope in [Scope::Whole, Scope::Header] {
            if let Some(spec) = descriptor.obfuscation_for(scope) {
                match spec.build(|_| None) {
                    Some(t) => probe = probe.with_transform(t),
                    None => return 0,
                }
            }
        }

        let size = probe.len();
        let mut score = 0u32;
        for (i, step) in descriptor.probes.iter().enumerate() {
            match self.run_step(&mut probe, &step.step, size) {
                Outcome::Hit => score = score.saturating_add(step.points),
                Outcome::Miss => {}
                Outcome::Exhausted => {
                    trace!(format = descriptor.name, step = i, "probe ran out of data");
                    break;
                }
            }
        }
        score
    }

    /// Score including the extension signal of `path`.
    pub fn score_path(
        &self,
        source: &ByteSource,
        descriptor: &FormatDescriptor,
        path: Option<&Path>,
    ) -> u32 {
        let mut score = self.score(source, descriptor);
        if let Some(path) = path {
            if FieldValidator::check_extension(path, &descriptor.extensions) {
                score = score.saturating_add(descriptor.extension_points);
            }
        }
        score
    }

    fn run_step(&self, probe: &mut ByteSource, step: &ProbeStep, size: u64) -> Outcome {
        match step {
            ProbeStep::Magic(magic) => match probe.matches_magic(magic) {
                Ok(true) => Outcome::Hit,
                Ok(false) => Outcome::Miss,
                Err(_) => Outcome::Exhausted,
            },
            ProbeStep::Field { field, check } => match field.read(probe) {
                Ok(value) => match self.validator.check(check, value, size) {
                    Ok(()) => Outcome::Hit,
                    Err(_) => Outcome::Miss,
                },
                Err(_) => Outcome::Exhausted,
            },
            ProbeStep::Skip(n) => match probe.skip(*n) {
                Ok(()) => Outcome::Hit,
                Err(_) => Outcome::Exhausted,
            },
            ProbeStep::Seek(anchor) => {
                let target = match *anchor {
                    Anchor::Start(pos) => Some(pos),
                    Anchor::End(back) => size.checked_sub(back),
                    Anchor::Cursor => Some(probe.position()),
                    // Header slots do not exist while sniffing.
                    Anchor::Slot(_) | Anchor::SlotPlus(..) => None,
                };
                match target.map(|t| probe.seek(t)) {
                    Some(Ok(())) => Outcome::Hit,
                    _ => Outcome::Exhausted,
                }
            }
            ProbeStep::Filename(encoding) => self.probe_name(probe, encoding),
        }
    }

    fn probe_name(&self, probe: &mut ByteSource, encoding: &NameEncoding) -> Outcome {
        let max = self.validator.limits().max_filename_length;
        let name = match encoding {
            NameEncoding::Fixed(n) => probe.read_fixed_string(*n),
            NameEncoding::CString => probe.read_cstring(Some(max)),
            NameEncoding::Prefixed(field) => match field.read(probe) {
                Ok(len) if self.validator.check_filename_length(len).is_ok() => {
                    probe.read_fixed_string(len as usize)
                }
                Ok(_) => return Outcome::Miss,
                Err(_) => return Outcome::Exhausted,
            },
            NameEncoding::Ref(_) => return Outcome::Miss,
        };
        match name {
            Ok(name) if self.validator.check_filename(&name).is_ok() => Outcome::Hit,
            Ok(_) => Outcome::Miss,
            Err(gamearc_common::Error::InvalidEncoding { .. }) => Outcome::Miss,
            Err(_) => Outcome::Exhausted,
        }
    }
}
