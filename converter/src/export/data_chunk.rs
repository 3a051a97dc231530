//! Binary chunk stream.
//!
//! Every exported numeric array is appended to one shared byte buffer and
//! described by a [`DataChunk`]. Values are little-endian and chunks are
//! concatenated in registration order without padding.

use serde::Serialize;

/// Element type of a [`DataChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float,
    Double,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Float | DataType::Uint32 | DataType::Int32 => 4,
            DataType::Double => 8,
        }
    }
}

/// Scalar types that can be written to the chunk stream.
pub trait ChunkElement: bytemuck::Pod {
    const TYPE: DataType;
}

macro_rules! chunk_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl ChunkElement for $ty {
            const TYPE: DataType = DataType::$variant;
        })*
    };
}

chunk_element! {
    f32 => Float,
    f64 => Double,
    u8 => Uint8,
    i8 => Int8,
    u16 => Uint16,
    i16 => Int16,
    u32 => Uint32,
    i32 => Int32,
}

/// Reference to one array inside the shared byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataChunk {
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub byte_offset: usize,
    /// Elements per record.
    pub stride: usize,
    /// Number of records.
    pub count: usize,
}

impl DataChunk {
    pub fn byte_len(&self) -> usize {
        self.stride * self.count * self.data_type.size()
    }

    /// Read the chunk back from `data`.
    ///
    /// Returns `None` if `T` does not match the chunk type or the chunk lies
    /// outside `data`.
    pub fn decode<T: ChunkElement>(&self, data: &[u8]) -> Option<Vec<T>> {
        if T::TYPE != self.data_type {
            return None;
        }
        let bytes = data.get(self.byte_offset..self.byte_offset + self.byte_len())?;
        let size = self.data_type.size();
        Some(
            bytes
                .chunks_exact(size)
                .map(|element| {
                    if cfg!(target_endian = "little") {
                        bytemuck::pod_read_unaligned(element)
                    } else {
                        let swapped: Vec<u8> = element.iter().rev().copied().collect();
                        bytemuck::pod_read_unaligned(&swapped)
                    }
                })
                .collect(),
        )
    }
}

/// Accumulates chunks into one byte buffer.
#[derive(Debug, Default)]
pub struct DataChunkBuilder {
    data: Vec<u8>,
}

impl DataChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append `values` as records of `stride` elements.
    ///
    /// A trailing partial record is written but not counted.
    pub fn push<T: ChunkElement>(&mut self, values: &[T], stride: usize) -> DataChunk {
        let stride = stride.max(1);
        if values.len() % stride != 0 {
            log::warn!(
                "Chunk of {} elements is not a multiple of stride {}",
                values.len(),
                stride
            );
        }
        let chunk = DataChunk {
            data_type: T::TYPE,
            byte_offset: self.data.len(),
            stride,
            count: values.len() / stride,
        };
        let bytes: &[u8] = bytemuck::cast_slice(values);
        if cfg!(target_endian = "little") {
            self.data.extend_from_slice(bytes);
        } else {
            for element in bytes.chunks_exact(std::mem::size_of::<T>()) {
                self.data.extend(element.iter().rev());
            }
        }
        chunk
    }

    /// Append `values` rounded to `decimals` places.
    pub fn push_rounded(&mut self, values: &[f32], stride: usize, decimals: u32) -> DataChunk {
        let rounded = super::round_slice(values, decimals);
        self.push(&rounded, stride)
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_concatenated_without_padding() {
        let mut builder = DataChunkBuilder::new();
        let a = builder.push(&[1u8, 2, 3], 1);
        let b = builder.push(&[1.5f32, -2.0], 2);
        let c = builder.push(&[7u16, 8, 9, 10], 2);

        assert_eq!(a.byte_offset, 0);
        assert_eq!(a.count, 3);
        assert_eq!(b.byte_offset, 3);
        assert_eq!(b.count, 1);
        assert_eq!(c.byte_offset, 11);
        assert_eq!(c.count, 2);

        let data = builder.finish();
        assert_eq!(data.len(), 19);
        assert_eq!(&data[3..7], &1.5f32.to_le_bytes());
        assert_eq!(&data[11..13], &7u16.to_le_bytes());
        assert_eq!(b.decode::<f32>(&data), Some(vec![1.5, -2.0]));
        assert_eq!(c.decode::<u16>(&data), Some(vec![7, 8, 9, 10]));
    }

    #[test]
    fn decode_rejects_mismatched_type() {
        let mut builder = DataChunkBuilder::new();
        let chunk = builder.push(&[1u32, 2], 1);
        let data = builder.finish();
        assert!(chunk.decode::<f32>(&data).is_none());
        assert!(chunk.decode::<u32>(&data[..4]).is_none());
    }

    #[test]
    fn chunk_serializes_type_tag() {
        let chunk = DataChunk {
            data_type: DataType::Uint16,
            byte_offset: 8,
            stride: 3,
            count: 4,
        };
        let json = serde_json::to_value(chunk).unwrap();
        assert_eq!(json["type"], "uint16");
        assert_eq!(json["byte_offset"], 8);
        assert_eq!(json["stride"], 3);
        assert_eq!(json["count"], 4);
    }
}
