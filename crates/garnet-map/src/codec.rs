//! Self-describing byte encoding of [`UpdateGrid`]s and [`OverwriteGrid`]s.
//!
//! # Format
//!
//! ```text
//! +-------+----------------+------------+----------+----------------------------+
//! | magic | format version | value type | reserved | lz4 frame                  |
//! | GRNT  | u16 LE         | u8         | u8       | rkyv archived `GridStream` |
//! +-------+----------------+------------+----------+----------------------------+
//! ```
//!
//! A stream may carry several grids, but [`decode`] only consumes the first one and logs a warning about the rest. Entries
//! are written in a canonical order, so equal grids always encode to equal bytes.

use crate::core::glam::IVec3;
use crate::core::rkyv::{self, check_archived_root, AlignedVec, Archive, Deserialize, Serialize};
use crate::grid::*;

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::io::{self, Read};
use std::marker::PhantomData;
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"GRNT";
pub const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 8;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The bytes are not a grid stream.
    #[error("malformed grid stream: {0}")]
    Format(String),
    /// The bytes are a grid stream, but not one this build can consume.
    #[error("incompatible grid stream: {0}")]
    VersionMismatch(String),
}

#[derive(Archive, Deserialize, Serialize)]
#[archive(crate = "crate::core::rkyv", check_bytes)]
struct GridStream {
    grids: Vec<GridRecord>,
}

#[derive(Archive, Deserialize, Serialize)]
#[archive(crate = "crate::core::rkyv", check_bytes)]
struct GridRecord {
    kind: u8,
    resolution: f32,
    coords: Vec<[i32; 3]>,
    /// Little-endian values, one per coordinate.
    values: Vec<u8>,
}

/// Collects any number of grids into one stream.
pub struct GridEncoder<T> {
    records: Vec<GridRecord>,
    marker: PhantomData<T>,
}

impl<T> Default for GridEncoder<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            marker: PhantomData,
        }
    }
}

impl<T: GridValue> GridEncoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_update(&mut self, grid: &UpdateGrid<T>) -> &mut Self {
        self.add_grid(GridKind::Update, grid)
    }

    pub fn add_overwrite(&mut self, grid: &OverwriteGrid<T>) -> &mut Self {
        self.add_grid(GridKind::Overwrite, grid)
    }

    fn add_grid(&mut self, kind: GridKind, grid: &SparseGrid<T>) -> &mut Self {
        let entries = grid.sorted_entries();
        let mut coords = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len() * T::VALUE_TYPE.size());
        for (p, v) in entries {
            coords.push(p.to_array());
            v.write_le_bytes(&mut values);
        }
        self.records.push(GridRecord {
            kind: kind.tag(),
            resolution: grid.resolution(),
            coords,
            values,
        });
        self
    }

    pub fn encode(self) -> Vec<u8> {
        let stream = GridStream {
            grids: self.records,
        };
        let archived = rkyv::to_bytes::<_, 1024>(&stream).expect("in-memory serialization");

        let mut bytes = Vec::with_capacity(HEADER_LEN + archived.len() / 2);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.push(T::VALUE_TYPE.tag());
        bytes.push(0);

        let mut encoder = FrameEncoder::new(bytes);
        let mut reader = archived.as_slice();
        io::copy(&mut reader, &mut encoder).expect("in-memory write");
        encoder.finish().expect("in-memory write")
    }
}

impl<T: GridValue> UpdateGrid<T> {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = GridEncoder::new();
        encoder.add_update(self);
        encoder.encode()
    }
}

impl<T: GridValue> OverwriteGrid<T> {
    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = GridEncoder::new();
        encoder.add_overwrite(self);
        encoder.encode()
    }
}

/// Decodes the first grid of an encoded stream.
///
/// Nothing is returned unless the whole grid is well formed: every value must be finite, overwrite values must be
/// probabilities, and no voxel may appear twice.
pub fn decode<T: GridValue>(bytes: &[u8]) -> Result<DecodedGrid<T>, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Format(format!(
            "expected at least {} header bytes, got {}",
            HEADER_LEN,
            bytes.len()
        )));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if header[..4] != MAGIC {
        return Err(CodecError::Format(format!(
            "unrecognized header {:02x?}",
            &header[..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FORMAT_VERSION {
        return Err(CodecError::VersionMismatch(format!(
            "format version {} is not supported, expected {}",
            version, FORMAT_VERSION
        )));
    }
    match ValueType::from_tag(header[6]) {
        Some(value_type) if value_type == T::VALUE_TYPE => {}
        Some(value_type) => {
            return Err(CodecError::VersionMismatch(format!(
                "stream carries {:?} values, expected {:?}",
                value_type,
                T::VALUE_TYPE
            )))
        }
        None => {
            return Err(CodecError::VersionMismatch(format!(
                "unknown value type tag {}",
                header[6]
            )))
        }
    }

    let mut decompressed = Vec::new();
    FrameDecoder::new(body)
        .read_to_end(&mut decompressed)
        .map_err(|e| CodecError::Format(format!("failed to decompress grid stream: {}", e)))?;
    // Archived data must be aligned before it can be validated.
    let mut aligned = AlignedVec::with_capacity(decompressed.len());
    aligned.extend_from_slice(&decompressed);
    let stream = check_archived_root::<GridStream>(&aligned)
        .map_err(|e| CodecError::Format(format!("invalid grid stream: {}", e)))?;

    let record = stream
        .grids
        .first()
        .ok_or_else(|| CodecError::Format("stream contains no grids".into()))?;
    if stream.grids.len() > 1 {
        log::warn!(
            "Grid stream contains {} grids; only the first is used",
            stream.grids.len()
        );
    }

    decode_record(record)
}

fn decode_record<T: GridValue>(record: &ArchivedGridRecord) -> Result<DecodedGrid<T>, CodecError> {
    let kind = GridKind::from_tag(record.kind).ok_or_else(|| {
        CodecError::VersionMismatch(format!("unknown grid kind tag {}", record.kind))
    })?;
    let resolution = f32::from(record.resolution);
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(CodecError::Format(format!(
            "invalid resolution {}",
            resolution
        )));
    }
    let value_size = T::VALUE_TYPE.size();
    if record.values.len() != record.coords.len() * value_size {
        return Err(CodecError::Format(format!(
            "{} coordinates but {} value bytes",
            record.coords.len(),
            record.values.len()
        )));
    }

    let mut grid = SparseGrid::new(resolution);
    grid.values.reserve(record.coords.len());
    for (coords, value_bytes) in record.coords.iter().zip(record.values.chunks_exact(value_size)) {
        let p = IVec3::new(
            i32::from(coords[0]),
            i32::from(coords[1]),
            i32::from(coords[2]),
        );
        let value = T::read_le_bytes(value_bytes);
        if !value.is_finite() {
            return Err(CodecError::Format(format!(
                "non-finite value {:?} at {}",
                value, p
            )));
        }
        if kind == GridKind::Overwrite && !(0.0..=1.0).contains(&value.to_f32()) {
            return Err(CodecError::Format(format!(
                "overwrite value {:?} at {} is not a probability",
                value, p
            )));
        }
        if grid.insert(p, value).is_some() {
            return Err(CodecError::Format(format!("voxel {} appears twice", p)));
        }
    }

    Ok(match kind {
        GridKind::Update => DecodedGrid::Update(UpdateGrid(grid)),
        GridKind::Overwrite => DecodedGrid::Overwrite(OverwriteGrid(grid)),
    })
}

/// Decodes the first grid of a stream, which must be an [`UpdateGrid`].
pub fn decode_update<T: GridValue>(bytes: &[u8]) -> Result<UpdateGrid<T>, CodecError> {
    match decode(bytes)? {
        DecodedGrid::Update(grid) => Ok(grid),
        DecodedGrid::Overwrite(_) => Err(CodecError::VersionMismatch(
            "expected an update grid, found an overwrite grid".into(),
        )),
    }
}

/// Decodes the first grid of a stream, which must be an [`OverwriteGrid`].
pub fn decode_overwrite<T: GridValue>(bytes: &[u8]) -> Result<OverwriteGrid<T>, CodecError> {
    match decode(bytes)? {
        DecodedGrid::Overwrite(grid) => Ok(grid),
        DecodedGrid::Update(_) => Err(CodecError::VersionMismatch(
            "expected an overwrite grid, found an update grid".into(),
        )),
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
