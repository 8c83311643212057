//! Output files that buffers write into.
//!
//! ```no_run
//! use imageio_bind::{ImageBuf, ImageOutput};
//!
//! let buf = ImageBuf::open("in.png")?;
//! let mut out = ImageOutput::create("out.tif")?;
//! out.open(&buf.spec())?;
//! buf.write_output(&mut out)?;
//! out.close();
//! # Ok::<(), imageio_bind::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::handle::{Handle, NativeKind};
use crate::imagespec::ImageSpec;
use crate::native::RawRef;
use crate::native::output;
use std::cell::Cell;
use std::marker::PhantomData;
use std::path::Path;

pub(crate) struct OutputKind;

impl NativeKind for OutputKind {
    const NAME: &'static str = "ImageOutput";

    fn free(raw: RawRef) {
        output::free(raw);
    }

    fn geterror(raw: RawRef) -> String {
        output::geterror(raw)
    }
}

#[derive(Debug)]
pub struct ImageOutput {
    handle: Handle<OutputKind>,
    _not_sync: PhantomData<Cell<()>>,
}

impl ImageOutput {
    /// An output for `path`, its format chosen by the file extension.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_format(path, "")
    }

    /// An output for `path` in the named format ("png", "jpeg", ...).
    pub fn create_with_format(path: impl AsRef<Path>, format: &str) -> Result<Self> {
        let out = Self {
            handle: Handle::owned(output::create(path.as_ref(), format)),
            _not_sync: PhantomData,
        };
        match out.last_error() {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    /// Prepare to receive images described by `spec`.
    pub fn open(&mut self, spec: &ImageSpec) -> Result<()> {
        let raw = self.handle.raw()?;
        let data = spec.snapshot().ok_or(Error::Released)?;
        let ok = output::open(raw, &data);
        self.handle.check(ok)
    }

    pub(crate) fn raw(&self) -> Result<RawRef> {
        self.handle.raw()
    }

    pub fn format_name(&self) -> String {
        self.handle.get().map(output::format_name).unwrap_or_default()
    }

    /// Whether the format can do `feature`: "alpha", "multiimage", "tiles".
    pub fn supports(&self, feature: &str) -> bool {
        self.handle
            .get()
            .is_some_and(|raw| output::supports(raw, feature))
    }

    /// Number of images written since the last `open`.
    pub fn images_written(&self) -> u32 {
        self.handle.get().map_or(0, output::images_written)
    }

    pub fn last_error(&self) -> Option<Error> {
        self.handle.last_error()
    }

    /// Close the file. Later calls do nothing.
    pub fn close(&mut self) {
        self.handle.release();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_released()
    }
}
