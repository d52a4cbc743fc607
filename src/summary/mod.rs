//! TensorBoard summary writer
//!
//! Writes step-indexed scalars and image batches into an
//! `events.out.tfevents.*` file that TensorBoard reads directly.
//!
//! ## File Format
//!
//! ```text
//! record 0: Event { file_version: "brain.Event:2" }
//! record n: Event { step, summary: [ (tag, simple_value | image tensor) ] }
//! ```
//!
//! Records are TFRecord framed (see [`record`]).
//!
//! # Example
//!
//! ```rust
//! use mlwrapper::summary::{read_events, EventWriter};
//!
//! let dir = tempfile::tempdir()?;
//! let mut writer = EventWriter::create(dir.path())?;
//! for step in 0..10 {
//!     writer.write_scalar("loss", 1.0 / (step as f32 + 1.0), step)?;
//! }
//! let path = writer.path().to_path_buf();
//! writer.close()?;
//!
//! let events = read_events(&path)?;
//! assert_eq!(events.len(), 11);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod image_batch;
pub mod proto;
pub mod record;

pub use image_batch::{encode_png, to_nhwc, ImageSource, Pixel, MAX_IMAGE_OUTPUTS};
pub use proto::{
    Event, EventKind, ImageBatch, Summary, SummaryMetadata, SummaryValue, SummaryValueKind,
    TensorProto,
};

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use ndarray::{ArrayView4, Axis};
use prost::Message;

use crate::Result;

const FILE_VERSION: &str = "brain.Event:2";

/// Append-only writer for one event file.
#[derive(Debug)]
pub struct EventWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl EventWriter {
    /// Create an event file in `dir` and write the file-version record.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be created or written.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        let file_name = format!(
            "events.out.tfevents.{}.{host}.{}",
            Utc::now().timestamp(),
            std::process::id()
        );
        let path = dir.as_ref().join(file_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = Self {
            path,
            writer: BufWriter::new(file),
        };
        writer.write_event(0, EventKind::FileVersion(FILE_VERSION.to_string()))?;
        writer.flush()?;
        Ok(writer)
    }

    /// Path of the event file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one scalar.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the write fails.
    pub fn write_scalar(&mut self, tag: &str, value: f32, step: i64) -> Result<()> {
        let value = SummaryValue {
            tag: tag.to_string(),
            metadata: None,
            value: Some(SummaryValueKind::SimpleValue(value)),
        };
        self.write_event(step, EventKind::Summary(Summary { value: vec![value] }))
    }

    /// Write up to [`MAX_IMAGE_OUTPUTS`] images of a `[b, h, w, c]` batch.
    ///
    /// The batch becomes one value tagged `tag`: an `images`-plugin string
    /// tensor `[width, height, png, ...]`, as `tf.summary.image` writes it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidImageShape` for an unsupported channel count and `Io`
    /// if the write fails.
    pub fn write_image_batch(&mut self, tag: &str, batch: ArrayView4<'_, u8>, step: i64) -> Result<()> {
        let (_, height, width, _) = batch.dim();
        let count = batch.len_of(Axis(0)).min(MAX_IMAGE_OUTPUTS);
        let mut strings = Vec::with_capacity(count + 2);
        strings.push(width.to_string().into_bytes());
        strings.push(height.to_string().into_bytes());
        for image in batch.axis_iter(Axis(0)).take(count) {
            strings.push(encode_png(image)?);
        }
        let value = SummaryValue {
            tag: tag.to_string(),
            metadata: Some(SummaryMetadata::images()),
            value: Some(SummaryValueKind::Tensor(TensorProto::strings(strings))),
        };
        self.write_event(step, EventKind::Summary(Summary { value: vec![value] }))
    }

    /// Push buffered records to the file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and close the file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the final flush or sync fails.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn write_event(&mut self, step: i64, what: EventKind) -> Result<()> {
        #[allow(clippy::cast_precision_loss)]
        let wall_time = Utc::now().timestamp_micros() as f64 / 1e6;
        let event = Event {
            wall_time,
            step,
            what: Some(what),
        };
        record::write_record(&mut self.writer, &event.encode_to_vec())
    }
}

/// Decode every event of an event file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, `CorruptRecord` or `Decode` if
/// it is malformed.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    while let Some(data) = record::read_record(&mut reader)? {
        events.push(Event::decode(data.as_slice())?);
    }
    Ok(events)
}
