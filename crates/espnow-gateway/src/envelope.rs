//! Envelope codec for ESP-NOW frames
//!
//! Sensor nodes send a fixed C struct over ESP-NOW with no header, version
//! or checksum. The receiver must agree on the layout byte-for-byte:
//!
//! | Offset | Size | Field | Encoding |
//! |--------|------|-------|----------|
//! | 0 | 240 | content | text, NUL-terminated within the field |
//! | 240 | 0 | padding | alignment of the next field to 4 bytes |
//! | 240 | 4 | category | `u32` little-endian (1, 2 or 3) |
//! | 244 | 4 | page | `i32` little-endian |
//!
//! Senders are ESP8266/ESP32 boards, which are little-endian, so a raw
//! struct copy on the sender yields the encoding above. The padding row is
//! computed from the content bound and is zero for the 240-byte field.
//!
//! Decoding is permissive: any category tag is accepted here and only the
//! router decides whether it can be delivered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;

use crate::config::MAX_CONTENT_LEN;
use crate::error::{DecodeError, RouteError};

const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) / align * align
}

/// Offset of the category tag
pub const CATEGORY_OFFSET: usize = align_up(MAX_CONTENT_LEN, 4);

/// Offset of the page field
pub const PAGE_OFFSET: usize = CATEGORY_OFFSET + 4;

/// Size of one envelope on the wire
pub const ENVELOPE_SIZE: usize = PAGE_OFFSET + 4;

const PADDING_LEN: usize = CATEGORY_OFFSET - MAX_CONTENT_LEN;

const _: () = assert!(ENVELOPE_SIZE == 248);
const _: () = assert!(PADDING_LEN == 0);

/// Purpose of a message, encoded as a `u32` tag on the wire
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Sensor reading for the home-automation controller
    SensorInfo = 1,
    /// Free-form log line from the node
    Log = 2,
    /// Command addressed to the controller
    Command = 3,
}

impl Category {
    /// Every category, in tag order
    pub const ALL: [Category; 3] = [Category::SensorInfo, Category::Log, Category::Command];

    /// Wire tag for this category
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Name used in diagnostic records
    pub fn name(self) -> &'static str {
        match self {
            Category::SensorInfo => "SENSOR_INFO",
            Category::Log => "LOG",
            Category::Command => "COMMAND",
        }
    }
}

impl TryFrom<u32> for Category {
    type Error = RouteError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Category::SensorInfo),
            2 => Ok(Category::Log),
            3 => Ok(Category::Command),
            other => Err(RouteError::UnmappedCategory(other)),
        }
    }
}

impl From<Category> for u32 {
    fn from(category: Category) -> Self {
        category.tag()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Diagnostic name for a raw tag, `UNKNOWN` outside the enumeration
pub fn category_name(tag: u32) -> &'static str {
    Category::try_from(tag).map_or("UNKNOWN", Category::name)
}

/// A decoded envelope
///
/// The full content field is kept so that re-encoding reproduces the sender's
/// bytes, including whatever follows the terminator.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    content: [u8; MAX_CONTENT_LEN],
    /// Raw category tag, validated only when routing
    pub category: u32,
    /// Opaque paging hint for downstream consumers
    pub page: i32,
}

impl Message {
    /// Build a message from text
    ///
    /// The text plus its terminator must fit in the content field.
    pub fn new(text: &str, category: impl Into<u32>, page: i32) -> Result<Self, DecodeError> {
        let bytes = text.as_bytes();
        if bytes.len() >= MAX_CONTENT_LEN {
            return Err(DecodeError::ContentTooLong {
                len: bytes.len(),
                max: MAX_CONTENT_LEN - 1,
            });
        }

        let mut content = [0u8; MAX_CONTENT_LEN];
        content[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            content,
            category: category.into(),
            page,
        })
    }

    /// Content bytes up to the first NUL, or the whole field if none
    pub fn content_bytes(&self) -> &[u8] {
        let end = self
            .content
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_CONTENT_LEN);
        &self.content[..end]
    }

    /// Content as text, with invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.content_bytes())
    }

    /// The whole content field as received
    pub fn raw_content(&self) -> &[u8; MAX_CONTENT_LEN] {
        &self.content
    }

    /// Validated category
    pub fn category(&self) -> Result<Category, RouteError> {
        Category::try_from(self.category)
    }

    /// Diagnostic name of the category tag
    pub fn category_name(&self) -> &'static str {
        category_name(self.category)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("content", &self.text())
            .field("category", &self.category)
            .field("page", &self.page)
            .finish()
    }
}

/// Decode one envelope
///
/// `raw` must hold at least [`ENVELOPE_SIZE`] bytes; anything after the
/// envelope is ignored. `_declared_length` is the length reported by the link
/// and never sizes the copy.
pub fn decode(raw: &[u8], _declared_length: usize) -> Result<Message, DecodeError> {
    if raw.len() < ENVELOPE_SIZE {
        return Err(DecodeError::TooShort {
            len: raw.len(),
            required: ENVELOPE_SIZE,
        });
    }

    let mut buf = &raw[..ENVELOPE_SIZE];

    let mut content = [0u8; MAX_CONTENT_LEN];
    buf.copy_to_slice(&mut content);
    buf.advance(PADDING_LEN);
    let category = buf.get_u32_le();
    let page = buf.get_i32_le();

    Ok(Message {
        content,
        category,
        page,
    })
}

/// Encode a message with the sender's layout
pub fn encode(message: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(ENVELOPE_SIZE);
    buf.put_slice(&message.content);
    buf.put_bytes(0, PADDING_LEN);
    buf.put_u32_le(message.category);
    buf.put_i32_le(message.page);
    buf.freeze()
}
