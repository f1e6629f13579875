//! Locates fixed-shape byte patterns inside engine binaries and rewrites the
//! viewport immediates embedded in them. Patterns are declarative data: literal
//! opcode bytes, fixed-width wildcard gaps for operands we do not care about,
//! and geometry-parameterized immediates that both locate and verify the patch
//! targets. The declared expected-occurrence count is the only correctness
//! oracle available against a stripped binary.

use std::path::Path;

use crate::error::{PatchError, PatchWarning, Result};
use crate::geometry::PatchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
}

/// One piece of a byte pattern.
#[derive(Debug, Clone, Copy)]
pub enum Segment {
    /// Literal bytes, matched and preserved.
    Lit(&'static [u8]),
    /// Fixed-width wildcard gap, matched and preserved (operand bytes such
    /// as a rip-relative displacement).
    Any(usize),
    /// A little-endian u32 immediate holding the default dimension for the
    /// given axis; rewritten to the target dimension.
    U32(Axis),
    /// As `U32`, for binaries storing the dimension as an f32.
    F32(Axis),
}

#[derive(Debug, Clone, Copy)]
pub struct PatternSpec {
    pub name: &'static str,
    pub segments: &'static [Segment],
    /// How many times the pattern occurs in a supported upstream build.
    pub expected: usize,
}

/// Per-binary-variant adjustment of a base pattern, resolved by a pure merge
/// before any file is touched.
#[derive(Debug, Clone, Copy)]
pub struct PatternOverride {
    pub name: &'static str,
    pub segments: Option<&'static [Segment]>,
    pub expected: Option<usize>,
}

pub fn resolve_patterns(base: &[PatternSpec], overrides: &[PatternOverride]) -> Vec<PatternSpec> {
    base.iter()
        .map(|spec| match overrides.iter().find(|o| o.name == spec.name) {
            Some(o) => PatternSpec {
                name: spec.name,
                segments: o.segments.unwrap_or(spec.segments),
                expected: o.expected.unwrap_or(spec.expected),
            },
            None => *spec,
        })
        .collect()
}

/// A pattern instantiated against a concrete geometry: a maskable needle
/// plus the byte ranges to overwrite on each match.
struct Compiled {
    needle: Vec<Option<u8>>,
    rewrites: Vec<(usize, Vec<u8>)>,
}

fn compile(spec: &PatternSpec, ctx: &PatchContext) -> Compiled {
    let mut needle = Vec::new();
    let mut rewrites = Vec::new();
    for segment in spec.segments {
        match segment {
            Segment::Lit(bytes) => needle.extend(bytes.iter().map(|b| Some(*b))),
            Segment::Any(n) => needle.extend(std::iter::repeat(None).take(*n)),
            Segment::U32(axis) => {
                let from = axis_value(ctx.default, *axis).to_le_bytes();
                let to = axis_value(ctx.viewport, *axis).to_le_bytes();
                rewrites.push((needle.len(), to.to_vec()));
                needle.extend(from.iter().map(|b| Some(*b)));
            }
            Segment::F32(axis) => {
                let from = (axis_value(ctx.default, *axis) as f32).to_le_bytes();
                let to = (axis_value(ctx.viewport, *axis) as f32).to_le_bytes();
                rewrites.push((needle.len(), to.to_vec()));
                needle.extend(from.iter().map(|b| Some(*b)));
            }
        }
    }
    Compiled { needle, rewrites }
}

fn axis_value(viewport: crate::geometry::Viewport, axis: Axis) -> u32 {
    match axis {
        Axis::Width => viewport.width,
        Axis::Height => viewport.height,
    }
}

fn matches_at(haystack: &[u8], needle: &[Option<u8>]) -> bool {
    haystack
        .iter()
        .zip(needle)
        .all(|(byte, expected)| expected.map_or(true, |e| e == *byte))
}

/// Global non-overlapping substitution of one compiled pattern. Returns the
/// number of occurrences rewritten.
fn substitute(bytes: &mut [u8], compiled: &Compiled) -> usize {
    let len = compiled.needle.len();
    if len == 0 || len > bytes.len() {
        return 0;
    }
    let mut count = 0;
    let mut pos = 0;
    while pos + len <= bytes.len() {
        if matches_at(&bytes[pos..pos + len], &compiled.needle) {
            for (offset, replacement) in &compiled.rewrites {
                bytes[pos + offset..pos + offset + replacement.len()].copy_from_slice(replacement);
            }
            count += 1;
            pos += len;
        } else {
            pos += 1;
        }
    }
    count
}

/// Apply every pattern of a spec, in declaration order, to a copy of the
/// pristine bytes. Zero matches for a pattern expected to occur is fatal and
/// nothing is written; a non-zero but unexpected count is collected as a
/// warning and patching proceeds.
pub fn apply_patterns(
    original: &[u8],
    specs: &[PatternSpec],
    ctx: &PatchContext,
    file: &Path,
) -> Result<(Vec<u8>, Vec<PatchWarning>)> {
    let mut bytes = original.to_vec();
    let mut warnings = Vec::new();
    for spec in specs {
        let compiled = compile(spec, ctx);
        let found = substitute(&mut bytes, &compiled);
        if found == 0 && spec.expected > 0 {
            return Err(PatchError::PatternNotFound {
                file: file.to_path_buf(),
                pattern: spec.name.to_string(),
            });
        }
        if found == spec.expected {
            log::debug!(
                "'{}': pattern '{}' rewritten {} times",
                file.display(),
                spec.name,
                found
            );
        } else {
            let warning = PatchWarning {
                file: file.to_path_buf(),
                pattern: spec.name.to_string(),
                expected: spec.expected,
                found,
            };
            log::warn!("{warning} -- binary layout may have shifted, patching anyway");
            warnings.push(warning);
        }
    }
    Ok((bytes, warnings))
}

/// Count occurrences of a pattern instantiated for the *default* geometry
/// without modifying anything. Used by `status` as evidence: a patched binary
/// no longer contains the default-viewport immediates.
pub fn scan_count(bytes: &[u8], spec: &PatternSpec, ctx: &PatchContext) -> usize {
    let compiled = compile(spec, ctx);
    let len = compiled.needle.len();
    if len == 0 || len > bytes.len() {
        return 0;
    }
    let mut count = 0;
    let mut pos = 0;
    while pos + len <= bytes.len() {
        if matches_at(&bytes[pos..pos + len], &compiled.needle) {
            count += 1;
            pos += len;
        } else {
            pos += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PatchContext, Viewport};

    const WIDTH_PATTERN: PatternSpec = PatternSpec {
        name: "viewport-width",
        segments: &[
            Segment::Lit(&[0xc7, 0x05]),
            Segment::Any(4),
            Segment::U32(Axis::Width),
        ],
        expected: 2,
    };

    fn ctx() -> PatchContext {
        PatchContext::new(Viewport::new(2560, 1080), false)
    }

    fn buffer_with_width_sites(count: usize) -> Vec<u8> {
        let mut bytes = vec![0x90; 16];
        for i in 0..count {
            bytes.extend_from_slice(&[0xc7, 0x05, i as u8, 0x22, 0x33, 0x44]);
            bytes.extend_from_slice(&1920u32.to_le_bytes());
            bytes.extend_from_slice(&[0x00; 8]);
        }
        bytes
    }

    #[test]
    fn rewrites_expected_occurrences_and_preserves_gaps() {
        let original = buffer_with_width_sites(2);
        let (patched, warnings) =
            apply_patterns(&original, &[WIDTH_PATTERN], &ctx(), Path::new("engine.dll")).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(patched.len(), original.len());
        // Both immediates rewritten, displacement bytes untouched.
        let new = 2560u32.to_le_bytes();
        let site = 16;
        assert_eq!(&patched[site + 2..site + 6], &[0x00, 0x22, 0x33, 0x44]);
        assert_eq!(&patched[site + 6..site + 10], &new);
        assert!(!patched
            .windows(4)
            .any(|w| w == 1920u32.to_le_bytes()));
    }

    #[test]
    fn zero_matches_is_fatal() {
        let junk = vec![0xab; 64];
        let err =
            apply_patterns(&junk, &[WIDTH_PATTERN], &ctx(), Path::new("engine.dll")).unwrap_err();
        assert!(matches!(err, PatchError::PatternNotFound { pattern, .. } if pattern == "viewport-width"));
    }

    #[test]
    fn unexpected_count_warns_but_patches() {
        let original = buffer_with_width_sites(3);
        let (patched, warnings) =
            apply_patterns(&original, &[WIDTH_PATTERN], &ctx(), Path::new("engine.dll")).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].expected, 2);
        assert_eq!(warnings[0].found, 3);
        // All three occurrences were still rewritten.
        assert_eq!(scan_count(&patched, &WIDTH_PATTERN, &ctx()), 0);
    }

    #[test]
    fn f32_segments_rewrite_float_immediates() {
        let spec = PatternSpec {
            name: "float-width",
            segments: &[Segment::Lit(&[0xf3, 0x0f]), Segment::F32(Axis::Width)],
            expected: 1,
        };
        let mut original = vec![0u8; 8];
        original.extend_from_slice(&[0xf3, 0x0f]);
        original.extend_from_slice(&1920f32.to_le_bytes());
        let (patched, warnings) =
            apply_patterns(&original, &[spec], &ctx(), Path::new("engine.dll")).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(&patched[10..14], &2560f32.to_le_bytes());
    }

    #[test]
    fn override_merge_is_pure_and_selective() {
        let overridden = &[PatternOverride {
            name: "viewport-width",
            segments: None,
            expected: Some(3),
        }];
        let resolved = resolve_patterns(&[WIDTH_PATTERN], overridden);
        assert_eq!(resolved[0].expected, 3);
        // Base spec untouched.
        assert_eq!(WIDTH_PATTERN.expected, 2);
        let untouched = resolve_patterns(&[WIDTH_PATTERN], &[]);
        assert_eq!(untouched[0].expected, 2);
    }

    #[test]
    fn scan_count_sees_default_geometry_only() {
        let original = buffer_with_width_sites(2);
        assert_eq!(scan_count(&original, &WIDTH_PATTERN, &ctx()), 2);
        let (patched, _) =
            apply_patterns(&original, &[WIDTH_PATTERN], &ctx(), Path::new("engine.dll")).unwrap();
        assert_eq!(scan_count(&patched, &WIDTH_PATTERN, &ctx()), 0);
    }
}
