//! Native image output streams: an open file that buffers write into.

use super::codec;
use super::registry::{RawRef, Registry};
use super::spec::SpecData;
use crate::progress::ProgressCallback;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub(crate) static OUTPUTS: LazyLock<Registry<NativeOutput>> =
    LazyLock::new(|| Registry::new("output"));

#[derive(Debug)]
pub(crate) struct NativeOutput {
    path: PathBuf,
    format: Option<ImageFormat>,
    spec: Option<SpecData>,
    images_written: u32,
    error: String,
}

impl NativeOutput {
    fn fail(&mut self, message: String) -> bool {
        if !self.error.is_empty() {
            self.error.push('\n');
        }
        self.error.push_str(&message);
        false
    }

    fn write_image(
        &mut self,
        spec: &SpecData,
        pixels: &[f32],
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<(), String> {
        let (Some(format), Some(opened)) = (self.format, self.spec.as_ref()) else {
            return Err(format!("\"{}\": file not open", self.path.display()));
        };
        if self.images_written > 0 && !codec::supports(format, "multiimage") {
            return Err(format!(
                "{} does not support multiple subimages",
                codec::format_name(format)
            ));
        }
        if (opened.width, opened.height, opened.nchannels)
            != (spec.width, spec.height, spec.nchannels)
        {
            return Err(format!(
                "image is {}x{}x{} but the output was opened for {}x{}x{}",
                spec.width,
                spec.height,
                spec.nchannels,
                opened.width,
                opened.height,
                opened.nchannels
            ));
        }
        codec::encode(&self.path, format, spec, opened.format, pixels, progress)
            .map_err(|e| e.to_string())?;
        self.images_written += 1;
        Ok(())
    }
}

/// Create an output for `path`; an empty `format` is inferred from the
/// extension. Failure is recorded on the returned object.
pub(crate) fn create(path: &Path, format: &str) -> RawRef {
    let mut output = NativeOutput {
        path: path.to_path_buf(),
        format: None,
        spec: None,
        images_written: 0,
        error: String::new(),
    };
    match codec::output_format(path, format) {
        Ok(f) => output.format = Some(f),
        Err(e) => {
            output.fail(e.to_string());
        }
    }
    OUTPUTS.insert(output)
}

pub(crate) fn free(raw: RawRef) {
    OUTPUTS.remove(raw);
}

pub(crate) fn geterror(raw: RawRef) -> String {
    OUTPUTS
        .with(raw, |o| std::mem::take(&mut o.error))
        .unwrap_or_default()
}

pub(crate) fn open(raw: RawRef, spec: &SpecData) -> bool {
    OUTPUTS
        .with(raw, |o| {
            let Some(format) = o.format else {
                return o.fail(format!("\"{}\": no format writer", o.path.display()));
            };
            if !(1..=4).contains(&spec.nchannels) {
                let name = codec::format_name(format);
                return o.fail(format!(
                    "{name} does not support {}-channel images",
                    spec.nchannels
                ));
            }
            o.spec = Some(spec.clone());
            o.images_written = 0;
            true
        })
        .unwrap_or(false)
}

pub(crate) fn write_image(
    raw: RawRef,
    spec: &SpecData,
    pixels: &[f32],
    progress: Option<&mut dyn ProgressCallback>,
) -> Result<(), String> {
    OUTPUTS
        .with(raw, |o| o.write_image(spec, pixels, progress))
        .unwrap_or_else(|| Err("ImageOutput has been closed".to_string()))
}

pub(crate) fn format_name(raw: RawRef) -> String {
    OUTPUTS
        .with(raw, |o| o.format.map(codec::format_name).unwrap_or_default().to_string())
        .unwrap_or_default()
}

pub(crate) fn supports(raw: RawRef, feature: &str) -> bool {
    OUTPUTS
        .with(raw, |o| o.format.is_some_and(|f| codec::supports(f, feature)))
        .unwrap_or(false)
}

pub(crate) fn images_written(raw: RawRef) -> u32 {
    OUTPUTS.with(raw, |o| o.images_written).unwrap_or(0)
}
