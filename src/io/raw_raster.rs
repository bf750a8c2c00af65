//! Headerless binary raster planes (the data half of ISCE/ENVI images).

use crate::io::isce_xml::ImageHeader;
use crate::types::{IfgComplex, ProductError, ProductResult};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memmap2::Mmap;
use ndarray::{Array2, Array3, Axis};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// On-disk element type, named as ISCE names it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Byte,
    Short,
    Int,
    Float,
    Double,
    CFloat,
}

impl DataType {
    pub fn from_isce(name: &str) -> ProductResult<Self> {
        match name.trim().to_uppercase().as_str() {
            "BYTE" | "CHAR" => Ok(DataType::Byte),
            "SHORT" => Ok(DataType::Short),
            "INT" => Ok(DataType::Int),
            "FLOAT" => Ok(DataType::Float),
            "DOUBLE" => Ok(DataType::Double),
            "CFLOAT" => Ok(DataType::CFloat),
            other => Err(ProductError::InvalidFormat(format!("unsupported data_type '{}'", other))),
        }
    }

    pub fn isce_name(&self) -> &'static str {
        match self {
            DataType::Byte => "BYTE",
            DataType::Short => "SHORT",
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::CFloat => "CFLOAT",
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::Byte => 1,
            DataType::Short => 2,
            DataType::Int | DataType::Float => 4,
            DataType::Double | DataType::CFloat => 8,
        }
    }

    /// ENVI `data type` code
    pub fn envi_code(&self) -> u8 {
        match self {
            DataType::Byte => 1,
            DataType::Short => 2,
            DataType::Int => 3,
            DataType::Float => 4,
            DataType::Double => 5,
            DataType::CFloat => 6,
        }
    }

    /// GDAL VRT `dataType` attribute
    pub fn gdal_name(&self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::Short => "Int16",
            DataType::Int => "Int32",
            DataType::Float => "Float32",
            DataType::Double => "Float64",
            DataType::CFloat => "CFloat32",
        }
    }
}

/// Band interleave scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    Bil,
    Bip,
    Bsq,
}

impl Interleave {
    pub fn from_name(name: &str) -> ProductResult<Self> {
        match name.trim().to_uppercase().as_str() {
            "BIL" => Ok(Interleave::Bil),
            "BIP" => Ok(Interleave::Bip),
            "BSQ" => Ok(Interleave::Bsq),
            other => Err(ProductError::InvalidFormat(format!("unsupported scheme '{}'", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interleave::Bil => "BIL",
            Interleave::Bip => "BIP",
            Interleave::Bsq => "BSQ",
        }
    }

    /// Element index of (band, row, col) in a `bands x rows x cols` file
    pub fn element_index(&self, dims: (usize, usize, usize), b: usize, r: usize, c: usize) -> usize {
        let (bands, rows, cols) = dims;
        match self {
            Interleave::Bsq => (b * rows + r) * cols + c,
            Interleave::Bil => (r * bands + b) * cols + c,
            Interleave::Bip => (r * cols + c) * bands + b,
        }
    }

    /// (image offset, pixel offset, line offset) in bytes for one band,
    /// as a GDAL raw band describes it
    pub fn band_offsets(&self, dims: (usize, usize, usize), band: usize, elem: usize) -> (usize, usize, usize) {
        let (bands, rows, cols) = dims;
        match self {
            Interleave::Bsq => (band * rows * cols * elem, elem, cols * elem),
            Interleave::Bil => (band * cols * elem, elem, bands * cols * elem),
            Interleave::Bip => (band * elem, bands * elem, cols * bands * elem),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn from_isce(code: &str) -> ProductResult<Self> {
        match code.trim().to_lowercase().as_str() {
            "l" | "little" => Ok(Endianness::Little),
            "b" | "big" => Ok(Endianness::Big),
            other => Err(ProductError::InvalidFormat(format!("unsupported byte_order '{}'", other))),
        }
    }

    pub fn isce_code(&self) -> &'static str {
        match self {
            Endianness::Little => "l",
            Endianness::Big => "b",
        }
    }
}

/// A pixel type that can be decoded from and encoded to raw planes
pub trait RasterElement: Copy + Default {
    const DATA_TYPE: DataType;

    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding
    fn encode_le(self, out: &mut Vec<u8>);
}

impl RasterElement for i8 {
    const DATA_TYPE: DataType = DataType::Byte;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
}

impl RasterElement for u8 {
    const DATA_TYPE: DataType = DataType::Byte;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        bytes[0]
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
}

impl RasterElement for i16 {
    const DATA_TYPE: DataType = DataType::Short;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        B::read_i16(bytes)
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RasterElement for i32 {
    const DATA_TYPE: DataType = DataType::Int;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        B::read_i32(bytes)
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RasterElement for f32 {
    const DATA_TYPE: DataType = DataType::Float;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        B::read_f32(bytes)
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RasterElement for f64 {
    const DATA_TYPE: DataType = DataType::Double;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        B::read_f64(bytes)
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RasterElement for IfgComplex {
    const DATA_TYPE: DataType = DataType::CFloat;
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Self {
        IfgComplex::new(B::read_f32(&bytes[..4]), B::read_f32(&bytes[4..8]))
    }
    fn encode_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.re.to_le_bytes());
        out.extend_from_slice(&self.im.to_le_bytes());
    }
}

/// Memory-map the binary described by `header` and decode all bands
/// into a (band, row, col) array.
pub fn read_planes<T: RasterElement>(path: &Path, header: &ImageHeader) -> ProductResult<Array3<T>> {
    if header.data_type != T::DATA_TYPE {
        return Err(ProductError::InvalidFormat(format!(
            "{} holds {} samples, expected {}",
            path.display(),
            header.data_type.isce_name(),
            T::DATA_TYPE.isce_name()
        )));
    }

    let dims = (header.bands, header.length, header.width);
    let elem = header.data_type.size_bytes();
    let expected = dims.0 * dims.1 * dims.2 * elem;

    let file = File::open(path)?;
    let actual = file.metadata()?.len() as usize;
    if actual < expected {
        return Err(ProductError::InvalidFormat(format!(
            "{} is {} bytes, header implies {} ({}x{}x{} {})",
            path.display(), actual, expected, dims.0, dims.1, dims.2, header.data_type.isce_name()
        )));
    }

    // SAFETY: the file is opened read-only and not modified while mapped
    let mmap = unsafe { Mmap::map(&file)? };

    log::debug!(
        "Decoding {} ({} bands, {}x{}, {}, {})",
        path.display(), dims.0, dims.1, dims.2, header.scheme.name(), header.data_type.isce_name()
    );

    let data = match header.byte_order {
        Endianness::Little => decode_all::<T, LittleEndian>(&mmap, dims, header.scheme, elem),
        Endianness::Big => decode_all::<T, BigEndian>(&mmap, dims, header.scheme, elem),
    };
    Ok(data)
}

fn decode_all<T: RasterElement, B: ByteOrder>(
    bytes: &[u8],
    dims: (usize, usize, usize),
    scheme: Interleave,
    elem: usize,
) -> Array3<T> {
    Array3::from_shape_fn(dims, |(b, r, c)| {
        let offset = scheme.element_index(dims, b, r, c) * elem;
        T::decode::<B>(&bytes[offset..offset + elem])
    })
}

/// Read band 0 of an integer label raster, widening BYTE/SHORT/INT to i32
pub fn read_label_band(path: &Path, header: &ImageHeader) -> ProductResult<Array2<i32>> {
    let planes: Array3<i32> = match header.data_type {
        DataType::Byte => read_planes::<u8>(path, header)?.mapv(i32::from),
        DataType::Short => read_planes::<i16>(path, header)?.mapv(i32::from),
        DataType::Int => read_planes::<i32>(path, header)?,
        other => {
            return Err(ProductError::InvalidFormat(format!(
                "label raster {} must be integer, found {}",
                path.display(),
                other.isce_name()
            )))
        }
    };
    Ok(planes.index_axis_move(Axis(0), 0))
}

/// Write a (band, row, col) array as little-endian planes
pub fn write_planes<T: RasterElement>(path: &Path, data: &Array3<T>, scheme: Interleave) -> ProductResult<()> {
    let dims = data.dim();
    let mut bytes = Vec::with_capacity(data.len() * T::DATA_TYPE.size_bytes());

    match scheme {
        Interleave::Bsq => data.iter().for_each(|v| v.encode_le(&mut bytes)),
        Interleave::Bil => {
            for r in 0..dims.1 {
                for b in 0..dims.0 {
                    for c in 0..dims.2 {
                        data[[b, r, c]].encode_le(&mut bytes);
                    }
                }
            }
        }
        Interleave::Bip => {
            for r in 0..dims.1 {
                for c in 0..dims.2 {
                    for b in 0..dims.0 {
                        data[[b, r, c]].encode_le(&mut bytes);
                    }
                }
            }
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;

    log::debug!("Wrote {} bytes ({}) to {}", bytes.len(), scheme.name(), path.display());
    Ok(())
}
