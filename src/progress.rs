//! Progress reporting and advisory cancellation for long reads and writes.
//!
//! The native operation calls [`ProgressCallback::progress`] with the
//! fraction done in `[0.0, 1.0]`. Returning `true` asks it to abort at its
//! next safe point. Fractions are best-effort: they are not guaranteed to be
//! monotonic, and a final `1.0` report is not guaranteed either.

pub trait ProgressCallback {
    /// Report progress; return `true` to request an abort.
    fn progress(&mut self, fraction: f32) -> bool;
}

impl<F> ProgressCallback for F
where
    F: FnMut(f32) -> bool,
{
    fn progress(&mut self, fraction: f32) -> bool {
        self(fraction)
    }
}

/// Adapter used by the native layer: no callback means "never abort".
pub(crate) fn report(callback: &mut Option<&mut dyn ProgressCallback>, fraction: f32) -> bool {
    match callback {
        Some(cb) => cb.progress(fraction.clamp(0.0, 1.0)),
        None => false,
    }
}
