use std::fmt::{self, Display, Formatter};
use std::io::{self, Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use half::f16;

/// A decoded .pcd file: the header and one record per point.
///
/// Record `i` holds one value per field, in the order of [PCDHeader::fields].
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub(crate) header: PCDHeader,
    pub(crate) points: Vec<Vec<PCDValue>>,
}

impl PointCloud {
    pub fn new(header: PCDHeader, points: Vec<Vec<PCDValue>>) -> Result<Self, String> {
        if header.points() != points.len() as u64 {
            return Err(format!(
                "Expected {} points from header data, got {} instead",
                header.points(),
                points.len()
            ));
        }

        let num_fields = header.fields().len();
        if let Some((i, record)) = points
            .iter()
            .enumerate()
            .find(|(_, record)| record.len() != num_fields)
        {
            return Err(format!(
                "Point {i} has {} values but the header declares {num_fields} fields",
                record.len()
            ));
        }

        Ok(Self { header, points })
    }

    /// Builds the fixed `x y z` float cloud used for exporting coordinates.
    pub fn from_xyz(coordinates: &[[f32; 3]]) -> Self {
        let fields = ["x", "y", "z"]
            .iter()
            .map(|name| PCDField::with_data_type(name.to_string(), PCDFieldDataType::F32, 1))
            .collect();
        let n = coordinates.len() as u64;
        let header = PCDHeader {
            version: "0.7".to_string(),
            fields,
            width: n,
            height: 1,
            viewpoint: [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
            points: n,
            data_type: PCDDataType::Binary,
        };
        let points = coordinates
            .iter()
            .map(|c| c.iter().map(|&v| PCDValue::Float(v as f64)).collect())
            .collect();

        Self { header, points }
    }

    pub fn header(&self) -> &PCDHeader {
        &self.header
    }

    /// Field names in declaration order
    pub fn fields(&self) -> Vec<&str> {
        self.header.fields().iter().map(PCDField::name).collect()
    }

    pub fn points(&self) -> &[Vec<PCDValue>] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Vec<PCDValue>> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The first three values of every point, usually `x y z`.
    ///
    /// Returns `None` if the cloud has fewer than three fields.
    pub fn xyz(&self) -> Option<Vec<[f64; 3]>> {
        if self.header.fields().len() < 3 {
            return None;
        }
        Some(
            self.points
                .iter()
                .map(|p| [p[0].as_f64(), p[1].as_f64(), p[2].as_f64()])
                .collect(),
        )
    }
}

/// A single value of a point
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PCDValue {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl PCDValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Signed(v) => v,
            Self::Unsigned(v) => v as i64,
            Self::Float(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Self::Signed(v) => v as u64,
            Self::Unsigned(v) => v,
            Self::Float(v) => v as u64,
        }
    }
}

impl Display for PCDValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Header information for the PCD file
#[derive(Debug, Clone, PartialEq)]
pub struct PCDHeader {
    pub(crate) version: String,
    pub(crate) fields: Vec<PCDField>,
    pub(crate) width: u64,
    pub(crate) height: u64,
    pub(crate) viewpoint: [f32; 7],
    pub(crate) points: u64,
    pub(crate) data_type: PCDDataType,
}

impl PCDHeader {
    pub fn new(
        version: String,
        fields: Vec<PCDField>,
        width: u64,
        height: u64,
        viewpoint: [f32; 7],
        points: u64,
        data_type: PCDDataType,
    ) -> Result<Self, String> {
        if width.checked_mul(height) != Some(points) {
            return Err(format!("Width * Height must be equal to number of points. Width: {width} Height: {height} Points: {points}"));
        }

        Ok(Self {
            version,
            fields,
            width,
            height,
            viewpoint,
            points,
            data_type,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fields(&self) -> &Vec<PCDField> {
        &self.fields
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Translation `x y z` followed by the orientation quaternion `w x y z`
    pub fn viewpoint(&self) -> &[f32; 7] {
        &self.viewpoint
    }

    pub fn points(&self) -> u64 {
        self.points
    }

    pub fn data_type(&self) -> PCDDataType {
        self.data_type
    }

    /// Number of bytes a single point occupies in binary form.
    pub fn point_size(&self) -> usize {
        self.fields.iter().map(PCDField::size).sum()
    }

    /// Calculates the number of bytes that should be present in the
    /// binary data portion of the point cloud.
    pub fn buffer_size(&self) -> u64 {
        (self.point_size() as u64).saturating_mul(self.points)
    }
}

/// The information for each dimension of the point
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PCDField {
    name: String,
    data_type: PCDFieldDataType,
    count: u64,
}

impl PCDField {
    pub fn new(
        name: String,
        size: PCDFieldSize,
        field_type: PCDFieldType,
        count: u64,
    ) -> Result<Self, String> {
        let data_type = (size, field_type).try_into()?;
        Ok(Self::with_data_type(name, data_type, count))
    }

    pub fn with_data_type(name: String, data_type: PCDFieldDataType, count: u64) -> Self {
        Self {
            name,
            data_type,
            count,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> PCDFieldDataType {
        self.data_type
    }

    pub fn size(&self) -> usize {
        self.data_type.size()
    }

    /// Declared repeat count. Records always hold a single value per field.
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// A valid combination of the [PCDFieldType] and [PCDFieldSize]
///
/// This is the binary layout of a single value. A one byte float has no
/// representation, every other combination does.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PCDFieldDataType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F16,
    F32,
    F64,
}

impl PCDFieldDataType {
    pub fn size(self) -> usize {
        u8::from(PCDFieldSize::from(self)) as usize
    }

    /// Reads one little-endian value of this layout.
    pub fn read_value<R: Read>(self, r: &mut R) -> io::Result<PCDValue> {
        use PCDValue::*;

        Ok(match self {
            Self::I8 => Signed(r.read_i8()? as i64),
            Self::I16 => Signed(r.read_i16::<LittleEndian>()? as i64),
            Self::I32 => Signed(r.read_i32::<LittleEndian>()? as i64),
            Self::I64 => Signed(r.read_i64::<LittleEndian>()?),
            Self::U8 => Unsigned(r.read_u8()? as u64),
            Self::U16 => Unsigned(r.read_u16::<LittleEndian>()? as u64),
            Self::U32 => Unsigned(r.read_u32::<LittleEndian>()? as u64),
            Self::U64 => Unsigned(r.read_u64::<LittleEndian>()?),
            Self::F16 => Float(f16::from_bits(r.read_u16::<LittleEndian>()?).to_f64()),
            Self::F32 => Float(r.read_f32::<LittleEndian>()? as f64),
            Self::F64 => Float(r.read_f64::<LittleEndian>()?),
        })
    }

    /// Writes `value` as one little-endian value of this layout, converting it with `as` casts.
    pub fn write_value<W: Write>(self, w: &mut W, value: PCDValue) -> io::Result<()> {
        match self {
            Self::I8 => w.write_i8(value.as_i64() as i8),
            Self::I16 => w.write_i16::<LittleEndian>(value.as_i64() as i16),
            Self::I32 => w.write_i32::<LittleEndian>(value.as_i64() as i32),
            Self::I64 => w.write_i64::<LittleEndian>(value.as_i64()),
            Self::U8 => w.write_u8(value.as_u64() as u8),
            Self::U16 => w.write_u16::<LittleEndian>(value.as_u64() as u16),
            Self::U32 => w.write_u32::<LittleEndian>(value.as_u64() as u32),
            Self::U64 => w.write_u64::<LittleEndian>(value.as_u64()),
            Self::F16 => w.write_u16::<LittleEndian>(f16::from_f64(value.as_f64()).to_bits()),
            Self::F32 => w.write_f32::<LittleEndian>(value.as_f64() as f32),
            Self::F64 => w.write_f64::<LittleEndian>(value.as_f64()),
        }
    }

    /// Text form of `value` for the ascii storage type.
    pub fn format_value(self, value: PCDValue) -> String {
        match self {
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => value.as_i64().to_string(),
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => value.as_u64().to_string(),
            Self::F16 => f16::from_f64(value.as_f64()).to_string(),
            Self::F32 => (value.as_f64() as f32).to_string(),
            Self::F64 => value.as_f64().to_string(),
        }
    }
}

impl TryFrom<(PCDFieldSize, PCDFieldType)> for PCDFieldDataType {
    type Error = String;

    fn try_from((size, field_type): (PCDFieldSize, PCDFieldType)) -> Result<Self, Self::Error> {
        use PCDFieldSize::*;
        use PCDFieldType::*;

        match (size, field_type) {
            (One, Signed) => Ok(Self::I8),
            (Two, Signed) => Ok(Self::I16),
            (Four, Signed) => Ok(Self::I32),
            (Eight, Signed) => Ok(Self::I64),
            (One, Unsigned) => Ok(Self::U8),
            (Two, Unsigned) => Ok(Self::U16),
            (Four, Unsigned) => Ok(Self::U32),
            (Eight, Unsigned) => Ok(Self::U64),
            (One, Float) => Err(format!(
                "Field combination of size: {size:?} and type: {field_type:?} not supported."
            )),
            (Two, Float) => Ok(Self::F16),
            (Four, Float) => Ok(Self::F32),
            (Eight, Float) => Ok(Self::F64),
        }
    }
}

impl From<PCDFieldDataType> for PCDFieldSize {
    fn from(data: PCDFieldDataType) -> Self {
        use PCDFieldDataType::*;

        match data {
            I8 | U8 => Self::One,
            I16 | U16 | F16 => Self::Two,
            I32 | U32 | F32 => Self::Four,
            I64 | U64 | F64 => Self::Eight,
        }
    }
}

impl From<PCDFieldDataType> for PCDFieldType {
    fn from(data: PCDFieldDataType) -> Self {
        use PCDFieldDataType::*;

        match data {
            I8 | I16 | I32 | I64 => Self::Signed,
            U8 | U16 | U32 | U64 => Self::Unsigned,
            F16 | F32 | F64 => Self::Float,
        }
    }
}

/// The size in bytes of the dimension of the field
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PCDFieldSize {
    One,
    Two,
    Four,
    Eight,
}

impl Display for PCDFieldSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

impl FromStr for PCDFieldSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<u8>()
            .map_err(|e| format!("Field size {s} is not an integer: {e}"))?;
        Self::try_from(value)
    }
}

impl TryFrom<u8> for PCDFieldSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            _ => Err(format!(
                "Only field sizes of 1, 2, 4, 8 are supported. Got: {value}"
            )),
        }
    }
}

impl From<PCDFieldSize> for u8 {
    fn from(field_size: PCDFieldSize) -> Self {
        match field_size {
            PCDFieldSize::One => 1,
            PCDFieldSize::Two => 2,
            PCDFieldSize::Four => 4,
            PCDFieldSize::Eight => 8,
        }
    }
}

/// The type of the dimension of the field
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PCDFieldType {
    Signed,
    Unsigned,
    Float,
}

impl Display for PCDFieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Signed => "I",
            Self::Unsigned => "U",
            Self::Float => "F",
        })
    }
}

impl FromStr for PCDFieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(Self::Signed),
            "U" => Ok(Self::Unsigned),
            "F" => Ok(Self::Float),
            _ => Err(format!("Unknown field type {s}")),
        }
    }
}

/// The storage format of the point cloud data file
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PCDDataType {
    Ascii,
    Binary,
    BinaryCompressed,
}

impl Display for PCDDataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascii => "ascii",
            Self::Binary => "binary",
            Self::BinaryCompressed => "binary_compressed",
        })
    }
}

impl FromStr for PCDDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascii" => Ok(Self::Ascii),
            "binary" => Ok(Self::Binary),
            "binary_compressed" => Ok(Self::BinaryCompressed),
            _ => Err(format!("Unknown data type: {s}")),
        }
    }
}
