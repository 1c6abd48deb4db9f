//! Wavefront OBJ export for Mesh objects
//!
//! Only the channel based vertex layout (`m_VertexData.m_Channels`) is read.
//! Compressed meshes are not decoded.

use crate::error::{BinaryError, Result};
use crate::reader::{BinaryReader, ByteOrder};
use std::fmt::Write;
use unity_patcher_core::UnityValue;

const CHANNEL_POSITION: usize = 0;
const CHANNEL_NORMAL: usize = 1;
const CHANNEL_UV0: usize = 4;

/// Vertex attribute storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float,
    Float16,
    UNorm8,
    SNorm8,
    UNorm16,
    SNorm16,
    UInt8,
    SInt8,
    UInt16,
    SInt16,
    UInt32,
    SInt32,
}

impl VertexFormat {
    pub fn from_id(id: i64) -> Result<Self> {
        Ok(match id {
            0 => Self::Float,
            1 => Self::Float16,
            2 => Self::UNorm8,
            3 => Self::SNorm8,
            4 => Self::UNorm16,
            5 => Self::SNorm16,
            6 => Self::UInt8,
            7 => Self::SInt8,
            8 => Self::UInt16,
            9 => Self::SInt16,
            10 => Self::UInt32,
            11 => Self::SInt32,
            other => {
                return Err(BinaryError::unsupported(format!(
                    "Vertex format {}",
                    other
                )));
            }
        })
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Float | Self::UInt32 | Self::SInt32 => 4,
            Self::Float16 | Self::UNorm16 | Self::SNorm16 | Self::UInt16 | Self::SInt16 => 2,
            Self::UNorm8 | Self::SNorm8 | Self::UInt8 | Self::SInt8 => 1,
        }
    }

    fn read(&self, reader: &mut BinaryReader) -> Result<f32> {
        Ok(match self {
            Self::Float => reader.read_f32()?,
            Self::Float16 => half_to_f32(reader.read_u16()?),
            Self::UNorm8 => reader.read_u8()? as f32 / 255.0,
            Self::SNorm8 => (reader.read_i8()? as f32 / 127.0).max(-1.0),
            Self::UNorm16 => reader.read_u16()? as f32 / 65535.0,
            Self::SNorm16 => (reader.read_i16()? as f32 / 32767.0).max(-1.0),
            Self::UInt8 => reader.read_u8()? as f32,
            Self::SInt8 => reader.read_i8()? as f32,
            Self::UInt16 => reader.read_u16()? as f32,
            Self::SInt16 => reader.read_i16()? as f32,
            Self::UInt32 => reader.read_u32()? as f32,
            Self::SInt32 => reader.read_i32()? as f32,
        })
    }
}

fn half_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let mantissa = (bits & 0x3FF) as f32;
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1F if mantissa == 0.0 => sign * f32::INFINITY,
        0x1F => f32::NAN,
        e => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(e - 15),
    }
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    stream: usize,
    offset: usize,
    format: VertexFormat,
    dimension: usize,
}

/// Vertex channels read out of `m_VertexData`
#[derive(Debug, Default)]
pub struct VertexAttributes {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
}

fn int_field(value: &UnityValue, key: &str) -> Result<i64> {
    value
        .get(key)
        .and_then(UnityValue::to_i64)
        .ok_or_else(|| BinaryError::invalid_data(format!("Mesh field {} is missing", key)))
}

fn read_channels(vertex_data: &UnityValue) -> Result<Vec<Option<Channel>>> {
    let channels = vertex_data
        .get("m_Channels")
        .and_then(UnityValue::as_array)
        .ok_or_else(|| BinaryError::unsupported("Mesh without m_Channels"))?;

    channels
        .iter()
        .map(|channel| {
            let dimension = (int_field(channel, "dimension")? & 0xF) as usize;
            if dimension == 0 {
                return Ok(None);
            }
            Ok(Some(Channel {
                stream: int_field(channel, "stream")? as usize,
                offset: int_field(channel, "offset")? as usize,
                format: VertexFormat::from_id(int_field(channel, "format")?)?,
                dimension,
            }))
        })
        .collect()
}

/// Decode vertex attributes from the packed stream bytes.
///
/// Streams follow each other in stream order, each aligned to 16 bytes.
pub fn read_vertices(
    vertex_data: &UnityValue,
    bytes: &[u8],
    byte_order: ByteOrder,
) -> Result<VertexAttributes> {
    let vertex_count = int_field(vertex_data, "m_VertexCount")? as usize;
    let channels = read_channels(vertex_data)?;

    let stream_count = channels
        .iter()
        .flatten()
        .map(|c| c.stream + 1)
        .max()
        .unwrap_or(0);
    let mut strides = vec![0usize; stream_count];
    for channel in channels.iter().flatten() {
        strides[channel.stream] += channel.dimension * channel.format.size();
    }
    let mut stream_offsets = Vec::with_capacity(stream_count);
    let mut offset = 0usize;
    for stride in &strides {
        stream_offsets.push(offset);
        offset += vertex_count * stride;
        offset = (offset + 15) & !15;
    }

    let mut reader = BinaryReader::new(bytes, byte_order);
    let mut read_channel = |index: usize| -> Result<Vec<Vec<f32>>> {
        let Some(Some(channel)) = channels.get(index).copied() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(vertex_count);
        for vertex in 0..vertex_count {
            let start = stream_offsets[channel.stream]
                + vertex * strides[channel.stream]
                + channel.offset;
            reader.set_position(start)?;
            let mut components = Vec::with_capacity(channel.dimension);
            for _ in 0..channel.dimension {
                components.push(channel.format.read(&mut reader)?);
            }
            out.push(components);
        }
        Ok(out)
    };

    let vec3 = |c: &Vec<f32>| {
        [
            c.first().copied().unwrap_or(0.0),
            c.get(1).copied().unwrap_or(0.0),
            c.get(2).copied().unwrap_or(0.0),
        ]
    };
    let positions = read_channel(CHANNEL_POSITION)?.iter().map(vec3).collect();
    let normals = read_channel(CHANNEL_NORMAL)?.iter().map(vec3).collect();
    let uvs = read_channel(CHANNEL_UV0)?
        .iter()
        .map(|c| [c.first().copied().unwrap_or(0.0), c.get(1).copied().unwrap_or(0.0)])
        .collect();

    Ok(VertexAttributes {
        positions,
        normals,
        uvs,
    })
}

/// Triangle lists of every sub mesh
pub fn read_triangles(fields: &UnityValue, byte_order: ByteOrder) -> Result<Vec<Vec<[u32; 3]>>> {
    let index_bytes = fields
        .get("m_IndexBuffer")
        .and_then(UnityValue::to_bytes)
        .unwrap_or_default();
    let wide = fields
        .get("m_IndexFormat")
        .and_then(UnityValue::to_i64)
        .unwrap_or(0)
        == 1;

    let sub_meshes = fields
        .get("m_SubMeshes")
        .and_then(UnityValue::as_array)
        .cloned()
        .unwrap_or_default();

    let mut reader = BinaryReader::new(&index_bytes, byte_order);
    let mut result = Vec::with_capacity(sub_meshes.len());
    for (i, sub_mesh) in sub_meshes.iter().enumerate() {
        let topology = sub_mesh.get("topology").and_then(UnityValue::to_i64).unwrap_or(0);
        if topology != 0 {
            tracing::warn!("Sub mesh {} uses topology {}, skipped", i, topology);
            result.push(Vec::new());
            continue;
        }
        let first_byte = int_field(sub_mesh, "firstByte")? as usize;
        let index_count = int_field(sub_mesh, "indexCount")? as usize;
        reader.set_position(first_byte)?;

        let mut indices = Vec::with_capacity(index_count);
        for _ in 0..index_count {
            indices.push(if wide {
                reader.read_u32()?
            } else {
                reader.read_u16()? as u32
            });
        }
        result.push(
            indices
                .chunks_exact(3)
                .map(|t| [t[0], t[1], t[2]])
                .collect(),
        );
    }
    Ok(result)
}

/// Render a mesh as OBJ text.
///
/// `vertex_bytes` is the content of `m_VertexData.m_DataSize` or of the
/// streamed resource. X is mirrored and faces are rewound to match the
/// right handed OBJ convention.
pub fn export_obj(fields: &UnityValue, vertex_bytes: &[u8], byte_order: ByteOrder) -> Result<String> {
    let name = fields
        .get("m_Name")
        .and_then(UnityValue::as_str)
        .unwrap_or("Mesh");
    let vertex_data = fields
        .get("m_VertexData")
        .ok_or_else(|| BinaryError::unsupported("Mesh without m_VertexData"))?;

    let attributes = read_vertices(vertex_data, vertex_bytes, byte_order)?;
    if attributes.positions.is_empty() {
        return Err(BinaryError::invalid_data("Mesh has no vertices"));
    }
    let triangles = read_triangles(fields, byte_order)?;

    let mut obj = String::new();
    let _ = writeln!(obj, "g {}", name);
    for [x, y, z] in &attributes.positions {
        let _ = writeln!(obj, "v {} {} {}", -x, y, z);
    }
    for [u, v] in &attributes.uvs {
        let _ = writeln!(obj, "vt {} {}", u, v);
    }
    for [x, y, z] in &attributes.normals {
        let _ = writeln!(obj, "vn {} {} {}", -x, y, z);
    }

    let has_uv = !attributes.uvs.is_empty();
    let has_normal = !attributes.normals.is_empty();
    let corner = |i: u32| {
        let i = i + 1;
        match (has_uv, has_normal) {
            (true, true) => format!("{0}/{0}/{0}", i),
            (true, false) => format!("{0}/{0}", i),
            (false, true) => format!("{0}//{0}", i),
            (false, false) => i.to_string(),
        }
    };

    for (i, faces) in triangles.iter().enumerate() {
        let _ = writeln!(obj, "g {}_{}", name, i);
        for [a, b, c] in faces {
            let _ = writeln!(obj, "f {} {} {}", corner(*c), corner(*b), corner(*a));
        }
    }
    Ok(obj)
}
