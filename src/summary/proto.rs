//! TensorBoard `Event` / `Summary` protobuf messages.
//!
//! Hand-derived subset of `tensorflow/core/util/event.proto`,
//! `tensorflow/core/framework/summary.proto`, `tensor.proto` and
//! `tensor_shape.proto`; field tags must match upstream.

use prost::{Message, Oneof};

/// `DataType::DT_STRING`.
pub const DT_STRING: i32 = 7;

/// `DataClass::DATA_CLASS_BLOB_SEQUENCE`, the class of image summaries.
pub const DATA_CLASS_BLOB_SEQUENCE: i32 = 3;

/// Plugin that renders image summaries.
pub const IMAGES_PLUGIN: &str = "images";

/// One record of an event file.
#[derive(Clone, PartialEq, Message)]
pub struct Event {
    /// Seconds since the epoch.
    #[prost(double, tag = "1")]
    pub wall_time: f64,
    /// Global step of the event.
    #[prost(int64, tag = "2")]
    pub step: i64,
    /// Payload.
    #[prost(oneof = "EventKind", tags = "3, 5")]
    pub what: Option<EventKind>,
}

/// Payload of an [`Event`].
#[derive(Clone, PartialEq, Oneof)]
pub enum EventKind {
    /// First record of every file, e.g. `brain.Event:2`.
    #[prost(string, tag = "3")]
    FileVersion(String),
    /// Summary values.
    #[prost(message, tag = "5")]
    Summary(Summary),
}

/// A set of tagged values written at one step.
#[derive(Clone, PartialEq, Message)]
pub struct Summary {
    /// Tagged values.
    #[prost(message, repeated, tag = "1")]
    pub value: Vec<SummaryValue>,
}

/// One tagged value.
#[derive(Clone, PartialEq, Message)]
pub struct SummaryValue {
    /// Tag shown in TensorBoard.
    #[prost(string, tag = "1")]
    pub tag: String,
    /// Plugin routing for tensor values.
    #[prost(message, optional, tag = "9")]
    pub metadata: Option<SummaryMetadata>,
    /// The value.
    #[prost(oneof = "SummaryValueKind", tags = "2, 8")]
    pub value: Option<SummaryValueKind>,
}

/// Kinds of [`SummaryValue`] this crate writes.
#[derive(Clone, PartialEq, Oneof)]
pub enum SummaryValueKind {
    /// Scalar.
    #[prost(float, tag = "2")]
    SimpleValue(f32),
    /// Tensor, interpreted by the plugin named in the metadata.
    #[prost(message, tag = "8")]
    Tensor(TensorProto),
}

/// Which plugin owns a value and how its data is laid out.
#[derive(Clone, PartialEq, Message)]
pub struct SummaryMetadata {
    /// Owning plugin.
    #[prost(message, optional, tag = "1")]
    pub plugin_data: Option<PluginData>,
    /// Display name; the tag when empty.
    #[prost(string, tag = "2")]
    pub display_name: String,
    /// Markdown description.
    #[prost(string, tag = "3")]
    pub summary_description: String,
    /// `DataClass` enum value.
    #[prost(int32, tag = "4")]
    pub data_class: i32,
}

/// Plugin name plus plugin-specific content.
#[derive(Clone, PartialEq, Message)]
pub struct PluginData {
    /// Plugin name, e.g. `images`.
    #[prost(string, tag = "1")]
    pub plugin_name: String,
    /// Serialized plugin message.
    #[prost(bytes = "vec", tag = "2")]
    pub content: Vec<u8>,
}

/// A tensor; only string tensors are written here.
#[derive(Clone, PartialEq, Message)]
pub struct TensorProto {
    /// `DataType` enum value.
    #[prost(int32, tag = "1")]
    pub dtype: i32,
    /// Shape.
    #[prost(message, optional, tag = "2")]
    pub tensor_shape: Option<TensorShapeProto>,
    /// Elements of a `DT_STRING` tensor.
    #[prost(bytes = "vec", repeated, tag = "8")]
    pub string_val: Vec<Vec<u8>>,
}

/// Tensor shape.
#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeProto {
    /// Dimensions, outermost first.
    #[prost(message, repeated, tag = "2")]
    pub dim: Vec<TensorShapeDim>,
}

/// One tensor dimension.
#[derive(Clone, PartialEq, Message)]
pub struct TensorShapeDim {
    /// Size of the dimension.
    #[prost(int64, tag = "1")]
    pub size: i64,
}

/// A decoded image summary: every image of the batch has the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBatch<'a> {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// PNG bytes, one entry per image.
    pub pngs: &'a [Vec<u8>],
}

impl SummaryMetadata {
    /// Metadata of an image summary.
    #[must_use]
    pub fn images() -> Self {
        Self {
            plugin_data: Some(PluginData {
                plugin_name: IMAGES_PLUGIN.to_string(),
                content: Vec::new(),
            }),
            display_name: String::new(),
            summary_description: String::new(),
            data_class: DATA_CLASS_BLOB_SEQUENCE,
        }
    }
}

impl TensorProto {
    /// 1-D string tensor holding `values`.
    #[must_use]
    pub fn strings(values: Vec<Vec<u8>>) -> Self {
        let size = i64::try_from(values.len()).unwrap_or(i64::MAX);
        Self {
            dtype: DT_STRING,
            tensor_shape: Some(TensorShapeProto {
                dim: vec![TensorShapeDim { size }],
            }),
            string_val: values,
        }
    }
}

impl SummaryValue {
    /// The image batch held by this value, if it is an image summary.
    ///
    /// Image summaries are string tensors `[width, height, png, ...]` owned
    /// by the `images` plugin.
    #[must_use]
    pub fn image_batch(&self) -> Option<ImageBatch<'_>> {
        let plugin = self.metadata.as_ref()?.plugin_data.as_ref()?;
        let Some(SummaryValueKind::Tensor(tensor)) = &self.value else {
            return None;
        };
        if plugin.plugin_name != IMAGES_PLUGIN || tensor.dtype != DT_STRING {
            return None;
        }
        let [width, height, pngs @ ..] = tensor.string_val.as_slice() else {
            return None;
        };
        Some(ImageBatch {
            width: parse_dimension(width)?,
            height: parse_dimension(height)?,
            pngs,
        })
    }
}

fn parse_dimension(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

impl Event {
    /// Scalar values in this event, as `(tag, value)`.
    pub fn scalars(&self) -> impl Iterator<Item = (&str, f32)> {
        self.summary_values().filter_map(|v| match &v.value {
            Some(SummaryValueKind::SimpleValue(x)) => Some((v.tag.as_str(), *x)),
            _ => None,
        })
    }

    /// Image summaries in this event, as `(tag, batch)`.
    pub fn images(&self) -> impl Iterator<Item = (&str, ImageBatch<'_>)> {
        self.summary_values()
            .filter_map(|v| v.image_batch().map(|batch| (v.tag.as_str(), batch)))
    }

    fn summary_values(&self) -> impl Iterator<Item = &SummaryValue> {
        let values: &[SummaryValue] = match &self.what {
            Some(EventKind::Summary(summary)) => &summary.value,
            _ => &[],
        };
        values.iter()
    }
}
