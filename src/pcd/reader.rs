use crate::lzf::{self, LzfBackendPreference, LzfError};
use crate::pcd::data_types::{
    PCDDataType, PCDField, PCDFieldDataType, PCDFieldSize, PCDFieldType, PCDHeader, PCDValue,
    PointCloud,
};
use std::fmt::Display;

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, trace};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

type Result<T> = std::result::Result<T, PCDReadError>;

/// The keys of a PCD header. `DATA` always ends the header.
const HEADER_KEYS: [&str; 10] = [
    "VERSION",
    "FIELDS",
    "SIZE",
    "TYPE",
    "COUNT",
    "WIDTH",
    "HEIGHT",
    "VIEWPOINT",
    "POINTS",
    "DATA",
];

/// Upper bound on records allocated up front, the header is not trusted further than this.
const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

/// Reads a [PointCloud] directly from a file given the path
pub fn read_pcd_file<P: AsRef<Path>>(p: P, lzf_backend: LzfBackendPreference) -> Result<PointCloud> {
    let file = File::open(p).map_err(PCDReadError::IOError)?;
    let reader = BufReader::new(file);
    Parser::new(reader, lzf_backend).parse()
}

/// Reads [PCDHeader] directly from a file given the path
pub fn read_pcd_header<P: AsRef<Path>>(p: P) -> Result<PCDHeader> {
    let file = File::open(p).map_err(PCDReadError::IOError)?;
    let reader = BufReader::new(file);
    Parser::new(reader, LzfBackendPreference::Auto).parse_header()
}

/// Parses a [PointCloud] from the reader
/// ```no_run
/// use pcdio::lzf::LzfBackendPreference;
/// use pcdio::pcd::{PCDReadError, read_pcd};
///
/// fn main() -> Result<(), PCDReadError> {
///     let pcd = read_pcd("VERSION .7 ...".as_bytes(), LzfBackendPreference::Auto)?;
///     println!("{}", pcd.len());
///     Ok(())
/// }
/// ```
pub fn read_pcd<R: Read>(r: R, lzf_backend: LzfBackendPreference) -> Result<PointCloud> {
    let reader = BufReader::new(r);
    Parser::new(reader, lzf_backend).parse()
}

/// Represents possible error scenarios when attempting to parse a point cloud data format file.
#[derive(Error, Debug)]
pub enum PCDReadError {
    /// For ease of conversion from IO errors to PCDReadError.
    /// Note that error can still be due to an invalid encoding of PCD
    /// E.g. the body ending before every point was read.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A header key never received a value before `DATA` or the end of the file.
    #[error("Missing header field {section}")]
    MissingHeaderField { section: String },
    /// A header value could not be converted or breaks a header invariant.
    #[error("Invalid header value for {section}. {error_msg}\n\t{value:?}")]
    InvalidHeaderValue {
        /// The header key the error is attributed to
        section: String,
        /// A custom error messaging describing the error
        error_msg: String,
        /// The raw value of that key
        value: String,
    },
    /// `DATA` is not one of `ascii`, `binary`, `binary_compressed`.
    #[error("Unsupported data mode {0:?}")]
    UnsupportedDataMode(String),
    /// A point of an ascii body does not hold the expected values.
    #[error("Malformed record for point {point}: {error_msg}")]
    MalformedRecord { point: u64, error_msg: String },
    /// Represents an error with the data of the file.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Decompression(#[from] LzfError),
}

/// Header values as they appear in the file, before any conversion.
#[derive(Debug, Default)]
struct RawHeader {
    values: [Option<String>; HEADER_KEYS.len()],
}

impl RawHeader {
    /// Stores `value` if `key` is a header key. Later values replace earlier ones.
    fn set(&mut self, key: &str, value: &str) {
        if let Some(i) = HEADER_KEYS.iter().position(|k| *k == key) {
            self.values[i] = Some(value.trim().to_string());
        }
    }

    fn value(&self, key: &str) -> Result<&str> {
        HEADER_KEYS
            .iter()
            .position(|k| *k == key)
            .and_then(|i| self.values[i].as_deref())
            .ok_or_else(|| PCDReadError::MissingHeaderField {
                section: key.to_string(),
            })
    }

    fn parse<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        let value = self.value(key)?;
        value
            .parse::<T>()
            .map_err(|e| header_err(key, e.to_string(), value))
    }

    fn parse_vec<T>(&self, key: &str) -> Result<Vec<T>>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        let value = self.value(key)?;
        value
            .split_whitespace()
            .map(|s| s.parse::<T>())
            .collect::<std::result::Result<Vec<T>, T::Err>>()
            .map_err(|e| header_err(key, e.to_string(), value))
    }

    /// Converts every value to its typed form and checks the header invariants.
    fn validate(&self) -> Result<PCDHeader> {
        if let Some(missing) = HEADER_KEYS.iter().find(|key| self.value(key).is_err()) {
            return Err(PCDReadError::MissingHeaderField {
                section: missing.to_string(),
            });
        }

        let version = self.value("VERSION")?.to_string();
        let names: Vec<String> = self.parse_vec("FIELDS")?;
        let sizes: Vec<PCDFieldSize> = self.parse_vec("SIZE")?;
        let types: Vec<PCDFieldType> = self.parse_vec("TYPE")?;
        let counts: Vec<u64> = self.parse_vec("COUNT")?;
        let width: u64 = self.parse("WIDTH")?;
        let height: u64 = self.parse("HEIGHT")?;
        let points: u64 = self.parse("POINTS")?;
        let viewpoint: [f32; 7] = self
            .parse_vec::<f32>("VIEWPOINT")?
            .try_into()
            .map_err(|v: Vec<f32>| {
                header_err(
                    "VIEWPOINT",
                    format!("Expected length 7, got {}", v.len()),
                    self.value("VIEWPOINT").unwrap_or_default(),
                )
            })?;
        let data = self.value("DATA")?;
        let data_type = data
            .parse::<PCDDataType>()
            .map_err(|_| PCDReadError::UnsupportedDataMode(data.to_string()))?;

        for (key, len) in [
            ("SIZE", sizes.len()),
            ("TYPE", types.len()),
            ("COUNT", counts.len()),
        ] {
            if len != names.len() {
                return Err(header_err(
                    key,
                    format!("Expected length {}, got {len}", names.len()),
                    self.value(key)?,
                ));
            }
        }

        let layouts = field_layouts(&sizes, &types)
            .map_err(|e| header_err("TYPE", e, self.value("TYPE").unwrap_or_default()))?;
        let fields = names
            .into_iter()
            .zip(layouts)
            .zip(counts)
            .map(|((name, layout), count)| PCDField::with_data_type(name, layout, count))
            .collect();

        PCDHeader::new(version, fields, width, height, viewpoint, points, data_type)
            .map_err(|e| header_err("POINTS", e, self.value("POINTS").unwrap_or_default()))
    }
}

/// Maps every field's declared size and type to the binary layout of its values.
pub fn field_layouts(
    sizes: &[PCDFieldSize],
    types: &[PCDFieldType],
) -> std::result::Result<Vec<PCDFieldDataType>, String> {
    sizes
        .iter()
        .zip(types)
        .map(|(&size, &field_type)| PCDFieldDataType::try_from((size, field_type)))
        .collect()
}

fn header_err(section: &str, error_msg: String, value: &str) -> PCDReadError {
    PCDReadError::InvalidHeaderValue {
        section: section.to_string(),
        error_msg,
        value: value.to_string(),
    }
}

struct Parser<R: BufRead> {
    reader: R,
    lzf_backend: LzfBackendPreference,
}

impl<R: BufRead> Parser<R> {
    fn new(reader: R, lzf_backend: LzfBackendPreference) -> Self {
        Self {
            reader,
            lzf_backend,
        }
    }

    fn parse(mut self) -> Result<PointCloud> {
        let header = self.parse_header()?;
        self.parse_data(header)
    }

    fn parse_header(&mut self) -> Result<PCDHeader> {
        let header = self.read_raw_header()?.validate()?;
        debug!(
            "PCD header: version {}, {} fields, {} points, {} data",
            header.version(),
            header.fields().len(),
            header.points(),
            header.data_type()
        );
        Ok(header)
    }

    /// Collects header lines up to and including the `DATA` line.
    ///
    /// The reader is left at the first byte of the body.
    fn read_raw_header(&mut self) -> Result<RawHeader> {
        let mut raw = RawHeader::default();
        let mut buf = Vec::new();
        let mut line_number = 0;

        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_number += 1;

            let line = std::str::from_utf8(&buf).map_err(|_| {
                PCDReadError::InvalidData(format!("Header line {line_number} is not valid UTF-8"))
            })?;
            let line = line.trim_end();
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            raw.set(key, value);
            if key == "DATA" {
                break;
            }
        }

        Ok(raw)
    }

    fn parse_data(self, header: PCDHeader) -> Result<PointCloud> {
        let layouts: Vec<PCDFieldDataType> =
            header.fields().iter().map(PCDField::data_type).collect();
        trace!("Field layouts: {layouts:?}");

        let points = match header.data_type() {
            PCDDataType::Ascii => self.parse_ascii_data(&header)?,
            PCDDataType::Binary => self.parse_binary_data(&header, &layouts)?,
            PCDDataType::BinaryCompressed => self.parse_compressed_data(&header, &layouts)?,
        };

        PointCloud::new(header, points).map_err(PCDReadError::InvalidData)
    }

    fn parse_ascii_data(mut self, header: &PCDHeader) -> Result<Vec<Vec<PCDValue>>> {
        let num_fields = header.fields().len();
        let mut points = Vec::with_capacity(capacity_hint(header.points()));
        let mut buf = Vec::new();

        // Should only read the number of points specified in the header
        for point in 0..header.points() {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                return Err(PCDReadError::MalformedRecord {
                    point,
                    error_msg: format!(
                        "Data ended after {point} of {} points",
                        header.points()
                    ),
                });
            }
            let line = std::str::from_utf8(&buf).map_err(|e| PCDReadError::MalformedRecord {
                point,
                error_msg: format!("Line is not valid UTF-8: {e}"),
            })?;

            let record = line
                .split_whitespace()
                .map(|token| {
                    token
                        .parse::<f64>()
                        .map(PCDValue::Float)
                        .map_err(|e| PCDReadError::MalformedRecord {
                            point,
                            error_msg: format!("{token:?} is not a number: {e}"),
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            if record.len() != num_fields {
                return Err(PCDReadError::MalformedRecord {
                    point,
                    error_msg: format!(
                        "Expected {num_fields} values, got {}.\nLine: {}",
                        record.len(),
                        line.trim_end()
                    ),
                });
            }
            points.push(record);
        }

        Ok(points)
    }

    fn parse_binary_data(
        mut self,
        header: &PCDHeader,
        layouts: &[PCDFieldDataType],
    ) -> Result<Vec<Vec<PCDValue>>> {
        let mut chunk = vec![0; header.point_size()];
        let mut points = Vec::with_capacity(capacity_hint(header.points()));

        for _ in 0..header.points() {
            self.reader.read_exact(&mut chunk)?;
            let mut rdr = &chunk[..];
            let record = layouts
                .iter()
                .map(|layout| layout.read_value(&mut rdr))
                .collect::<io::Result<Vec<_>>>()?;
            points.push(record);
        }

        Ok(points)
    }

    fn parse_compressed_data(
        mut self,
        header: &PCDHeader,
        layouts: &[PCDFieldDataType],
    ) -> Result<Vec<Vec<PCDValue>>> {
        let compressed_len = self.reader.read_u32::<LittleEndian>()?;
        let decompressed_len = self.reader.read_u32::<LittleEndian>()?;
        if u64::from(decompressed_len) != header.buffer_size() {
            return Err(PCDReadError::InvalidData(format!(
                "Header describes {} bytes of data, body announces {decompressed_len}",
                header.buffer_size()
            )));
        }

        let mut compressed = Vec::new();
        (&mut self.reader)
            .take(compressed_len as u64)
            .read_to_end(&mut compressed)?;
        if compressed.len() != compressed_len as usize {
            return Err(PCDReadError::IOError(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Expected {compressed_len} compressed bytes, got {}",
                    compressed.len()
                ),
            )));
        }

        // backends return exactly `decompressed_len` bytes or fail
        let data = lzf::decompress(&compressed, decompressed_len as usize, self.lzf_backend)?;

        // Fields are stored one after another: all x, then all y, ...
        let num_points = header.points() as usize;
        let mut offset = 0;
        let mut columns = Vec::with_capacity(layouts.len());
        for layout in layouts {
            let column_len = num_points * layout.size();
            let mut rdr = &data[offset..offset + column_len];
            let column = (0..num_points)
                .map(|_| layout.read_value(&mut rdr))
                .collect::<io::Result<Vec<_>>>()?;
            columns.push(column);
            offset += column_len;
        }

        transpose(columns, num_points)
    }
}

/// Turns one column per field back into one record per point.
fn transpose(columns: Vec<Vec<PCDValue>>, num_points: usize) -> Result<Vec<Vec<PCDValue>>> {
    if let Some((field, column)) = columns
        .iter()
        .enumerate()
        .find(|(_, column)| column.len() != num_points)
    {
        return Err(PCDReadError::InvalidData(format!(
            "Column of field {field} holds {} values, expected {num_points}",
            column.len()
        )));
    }

    Ok((0..num_points)
        .map(|point| columns.iter().map(|column| column[point]).collect())
        .collect())
}

fn capacity_hint(points: u64) -> usize {
    (points as usize).min(MAX_PREALLOCATED_POINTS)
}

#[cfg(test)]
mod tests {
    use crate::lzf::{self, LzfBackendPreference, LzfError};
    use crate::pcd::data_types::PCDFieldDataType;
    use crate::pcd::reader::{transpose, PCDReadError, Parser};
    use crate::pcd::{read_pcd, PCDDataType, PCDHeader, PCDValue};
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::{BufReader, Read};

    const XYZ_HEADER: &str = "# .PCD v0.7 - Point Cloud Data file format\n\
        VERSION 0.7\n\
        FIELDS x y z\n\
        SIZE 4 4 4\n\
        TYPE F F F\n\
        COUNT 1 1 1\n\
        WIDTH 5\n\
        HEIGHT 1\n\
        VIEWPOINT 0 0 0 1 0 0 0\n\
        POINTS 5\n";

    fn parse_str(s: &str) -> Parser<BufReader<&[u8]>> {
        Parser::new(BufReader::new(s.as_bytes()), LzfBackendPreference::Auto)
    }

    fn parse_header(s: &str) -> Result<PCDHeader, PCDReadError> {
        parse_str(s).parse_header()
    }

    /// Replaces the line starting with `key` in a valid xyz header
    fn header_with(key: &str, line: &str) -> String {
        let mut header = XYZ_HEADER
            .lines()
            .map(|l| {
                if l.starts_with(key) {
                    line.to_string()
                } else {
                    l.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        header.push_str("\nDATA ascii\n");
        header
    }

    fn assert_header_fail<T>(result: Result<T, PCDReadError>, fail_section: &str) {
        match result {
            Ok(_) => panic!("Parsing should fail"),
            Err(e) => match e {
                PCDReadError::InvalidHeaderValue { section, .. } => {
                    assert_eq!(&section, fail_section)
                }
                e => panic!("Error should be due to {fail_section}, got {e:?}"),
            },
        }
    }

    fn expected_points() -> Vec<[f64; 3]> {
        vec![
            [-2.0, -2.0, -2.0],
            [-1.0, -1.0, -1.0],
            [0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0],
            [2.0, 2.0, 2.0],
        ]
    }

    #[test]
    fn parse_header_success() {
        let header = parse_header(&format!("{XYZ_HEADER}DATA binary\n")).unwrap();
        assert_eq!(header.version(), "0.7");
        assert_eq!(header.fields().len(), 3);
        assert!(header
            .fields()
            .iter()
            .all(|f| f.data_type() == PCDFieldDataType::F32 && f.count() == 1));
        assert_eq!(header.width(), 5);
        assert_eq!(header.height(), 1);
        assert_eq!(header.points(), 5);
        assert_eq!(header.viewpoint(), &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(header.data_type(), PCDDataType::Binary);
        assert_eq!(header.point_size(), 12);
    }

    #[test]
    fn parse_header_any_order_last_value_wins() {
        let header_str = "POINTS 2\n\
            VIEWPOINT 0 0 0 1 0 0 0\n\
            some unrelated line\n\
            HEIGHT 1\n\
            WIDTH 7\n\
            WIDTH 2\n\
            COUNT 1 1\n\
            TYPE U I\n\
            SIZE 2 8\n\
            FIELDS label offset\n\
            VERSION .7\n\
            DATA binary_compressed\n";

        let header = parse_header(header_str).unwrap();
        assert_eq!(header.version(), ".7");
        assert_eq!(header.width(), 2);
        let layouts: Vec<_> = header.fields().iter().map(|f| f.data_type()).collect();
        assert_eq!(layouts, [PCDFieldDataType::U16, PCDFieldDataType::I64]);
        assert_eq!(header.fields()[1].name(), "offset");
        assert_eq!(header.data_type(), PCDDataType::BinaryCompressed);
    }

    #[test]
    fn parse_header_stops_at_data() {
        let header_str = format!("{XYZ_HEADER}DATA ascii\r\nWIDTH 9\n");
        let mut parser = parse_str(&header_str);
        let header = parser.parse_header().unwrap();
        assert_eq!(header.width(), 5);

        let mut rest = String::new();
        parser.reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "WIDTH 9\n");
    }

    #[test]
    fn parse_header_missing_field() {
        let header_str = header_with("COUNT", "# no count");
        match parse_header(&header_str) {
            Err(PCDReadError::MissingHeaderField { section }) => assert_eq!(section, "COUNT"),
            other => panic!("Expected missing COUNT, got {other:?}"),
        }

        // the file ends before DATA
        match parse_header(XYZ_HEADER) {
            Err(PCDReadError::MissingHeaderField { section }) => assert_eq!(section, "DATA"),
            other => panic!("Expected missing DATA, got {other:?}"),
        }
    }

    #[test]
    fn parse_header_width_height_points_mismatch() {
        let header_str = header_with("WIDTH", "WIDTH 2").replace("HEIGHT 1", "HEIGHT 2");
        assert_header_fail(parse_header(&header_str), "POINTS");
    }

    #[test]
    fn parse_header_invalid_sizes() {
        assert_header_fail(parse_header(&header_with("SIZE", "SIZE 4 3 4")), "SIZE");
        assert_header_fail(parse_header(&header_with("SIZE", "SIZE 4 4")), "SIZE");
        assert_header_fail(parse_header(&header_with("SIZE", "SIZE 4 four 4")), "SIZE");
    }

    #[test]
    fn parse_header_invalid_types() {
        assert_header_fail(parse_header(&header_with("TYPE", "TYPE F A F")), "TYPE");
        assert_header_fail(parse_header(&header_with("TYPE", "TYPE F F F F")), "TYPE");
        assert_header_fail(parse_header(&header_with("COUNT", "COUNT 1 1")), "COUNT");
    }

    #[test]
    fn parse_header_one_byte_float() {
        let header_str = header_with("SIZE", "SIZE 4 4 1");
        assert_header_fail(parse_header(&header_str), "TYPE");

        for size in ["SIZE 4 4 4", "SIZE 8 8 8", "SIZE 4 8 2"] {
            assert!(parse_header(&header_with("SIZE", size)).is_ok(), "{size}");
        }
    }

    #[test]
    fn parse_header_invalid_numbers() {
        assert_header_fail(parse_header(&header_with("WIDTH", "WIDTH 5.0")), "WIDTH");
        assert_header_fail(parse_header(&header_with("HEIGHT", "HEIGHT abc")), "HEIGHT");
        assert_header_fail(parse_header(&header_with("POINTS", "POINTS -5")), "POINTS");
        assert_header_fail(
            parse_header(&header_with("VIEWPOINT", "VIEWPOINT 0 0 0 1 0 0")),
            "VIEWPOINT",
        );
        assert_header_fail(
            parse_header(&header_with("VIEWPOINT", "VIEWPOINT a 0 0 1 0 0 0")),
            "VIEWPOINT",
        );
    }

    #[test]
    fn parse_header_unsupported_data_mode() {
        for data in ["DATA compressed_binary\n", "DATA\n"] {
            let result = parse_header(&format!("{XYZ_HEADER}{data}"));
            assert!(
                matches!(result, Err(PCDReadError::UnsupportedDataMode(_))),
                "{data}"
            );
        }
    }

    #[test]
    fn parse_ascii_success() {
        let pcd_str = format!("{XYZ_HEADER}DATA ascii\n-2 -2 -2\n-1 -1 -1\n0 0 0\n1 1 1\n2 2 2\n");
        let pcd = read_pcd(pcd_str.as_bytes(), LzfBackendPreference::Auto).unwrap();
        assert_eq!(pcd.fields(), ["x", "y", "z"]);
        assert_eq!(pcd.xyz().unwrap(), expected_points());
        assert_eq!(pcd.points()[0][0], PCDValue::Float(-2.0));
    }

    #[test]
    fn parse_ascii_malformed_records() {
        let bodies = [
            ("-2 -2 -2\n-1 -1\n0 0 0\n1 1 1\n2 2 2\n", 1),
            ("-2 -2 -2\n-1 -1 -1\n0 zero 0\n1 1 1\n2 2 2\n", 2),
            ("-2 -2 -2\n-1 -1 -1\n0 0 0\n1 1 1\n", 4),
        ];

        for (body, bad_point) in bodies {
            let pcd_str = format!("{XYZ_HEADER}DATA ascii\n{body}");
            match read_pcd(pcd_str.as_bytes(), LzfBackendPreference::Auto) {
                Err(PCDReadError::MalformedRecord { point, .. }) => assert_eq!(point, bad_point),
                other => panic!("Expected malformed record, got {other:?}"),
            }
        }
    }

    #[test]
    fn parse_ascii_invalid_utf8() {
        let mut pcd = format!("{XYZ_HEADER}DATA ascii\n-2 -2 -2\n").into_bytes();
        pcd.extend_from_slice(b"1 \xff 3\n0 0 0\n1 1 1\n2 2 2\n");

        match read_pcd(&pcd[..], LzfBackendPreference::Auto) {
            Err(PCDReadError::MalformedRecord { point, .. }) => assert_eq!(point, 1),
            other => panic!("Expected malformed record, got {other:?}"),
        }
    }

    #[test]
    fn parse_binary_success() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary\n").into_bytes();
        for [x, y, z] in expected_points() {
            pcd.write_f32::<LittleEndian>(x as f32).unwrap();
            pcd.write_f32::<LittleEndian>(y as f32).unwrap();
            pcd.write_f32::<LittleEndian>(z as f32).unwrap();
        }

        let pcd = read_pcd(&pcd[..], LzfBackendPreference::Auto).unwrap();
        assert_eq!(pcd.xyz().unwrap(), expected_points());
    }

    #[test]
    fn parse_binary_mixed_fields() {
        let mut pcd = b"VERSION 0.7\n\
            FIELDS x label intensity\n\
            SIZE 8 1 2\n\
            TYPE F I U\n\
            COUNT 1 1 1\n\
            WIDTH 2\n\
            HEIGHT 1\n\
            VIEWPOINT 0 0 0 1 0 0 0\n\
            POINTS 2\n\
            DATA binary\n"
            .to_vec();
        pcd.write_f64::<LittleEndian>(0.5).unwrap();
        pcd.write_i8(-3).unwrap();
        pcd.write_u16::<LittleEndian>(500).unwrap();
        pcd.write_f64::<LittleEndian>(-0.5).unwrap();
        pcd.write_i8(3).unwrap();
        pcd.write_u16::<LittleEndian>(65535).unwrap();

        let pcd = read_pcd(&pcd[..], LzfBackendPreference::Auto).unwrap();
        assert_eq!(
            pcd.points(),
            [
                vec![
                    PCDValue::Float(0.5),
                    PCDValue::Signed(-3),
                    PCDValue::Unsigned(500)
                ],
                vec![
                    PCDValue::Float(-0.5),
                    PCDValue::Signed(3),
                    PCDValue::Unsigned(65535)
                ],
            ]
        );
        assert!(pcd.xyz().unwrap()[1] == [-0.5, 3.0, 65535.0]);
    }

    #[test]
    fn parse_binary_truncated() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary\n").into_bytes();
        pcd.extend_from_slice(&[0; 12 * 4 + 5]);
        let result = read_pcd(&pcd[..], LzfBackendPreference::Auto);
        assert!(matches!(result, Err(PCDReadError::IOError(_))));
    }

    /// Column-major body: every x, then every y, then every z
    fn compressed_body(points: &[[f64; 3]]) -> Vec<u8> {
        let mut columns: Vec<u8> = vec![];
        for axis in 0..3 {
            for point in points {
                columns.write_f32::<LittleEndian>(point[axis] as f32).unwrap();
            }
        }
        let compressed = lzf::compress(&columns);

        let mut body: Vec<u8> = vec![];
        body.write_u32::<LittleEndian>(compressed.len() as u32).unwrap();
        body.write_u32::<LittleEndian>(columns.len() as u32).unwrap();
        body.extend_from_slice(&compressed);
        body
    }

    #[test]
    fn parse_compressed_success() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        pcd.extend_from_slice(&compressed_body(&expected_points()));

        for backend in [LzfBackendPreference::Auto, LzfBackendPreference::ForceInternal] {
            let cloud = read_pcd(&pcd[..], backend).unwrap();
            assert_eq!(cloud.xyz().unwrap(), expected_points());
        }
    }

    #[test]
    fn parse_compressed_hand_encoded() {
        // x column: -1.0 twice, then 1.0 twice, y and z columns repeat it
        let mut stream = vec![3, 0x00, 0x00, 0x80, 0xbf, 0x40, 0x03];
        stream.extend_from_slice(&[3, 0x00, 0x00, 0x80, 0x3f, 0x40, 0x03]);
        // copy the 16 byte x column twice, 32 bytes from 16 back
        stream.extend_from_slice(&[0xe0, 0x17, 0x0f]);

        let mut pcd = b"VERSION 0.7\n\
            FIELDS x y z\n\
            SIZE 4 4 4\n\
            TYPE F F F\n\
            COUNT 1 1 1\n\
            WIDTH 4\n\
            HEIGHT 1\n\
            VIEWPOINT 0 0 0 1 0 0 0\n\
            POINTS 4\n\
            DATA binary_compressed\n"
            .to_vec();
        pcd.write_u32::<LittleEndian>(stream.len() as u32).unwrap();
        pcd.write_u32::<LittleEndian>(48).unwrap();
        pcd.extend_from_slice(&stream);

        let cloud = read_pcd(&pcd[..], LzfBackendPreference::ForceInternal).unwrap();
        assert_eq!(
            cloud.xyz().unwrap(),
            vec![
                [-1.0, -1.0, -1.0],
                [-1.0, -1.0, -1.0],
                [1.0, 1.0, 1.0],
                [1.0, 1.0, 1.0]
            ]
        );
    }

    #[test]
    fn parse_compressed_length_mismatch() {
        // stream holds 4 points but announces the 60 bytes 5 points need
        let mut body = compressed_body(&expected_points()[..4]);
        body[4..8].copy_from_slice(&60u32.to_le_bytes());
        let mut pcd = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        pcd.extend_from_slice(&body);

        let result = read_pcd(&pcd[..], LzfBackendPreference::ForceInternal);
        assert!(matches!(
            result,
            Err(PCDReadError::Decompression(LzfError::LengthMismatch {
                expected: 60,
                actual: 48
            }))
        ));
    }

    #[test]
    fn parse_compressed_announced_length_checked_before_decoding() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        pcd.write_u32::<LittleEndian>(2).unwrap();
        pcd.write_u32::<LittleEndian>(u32::MAX).unwrap();
        pcd.extend_from_slice(&[0, b'a']);

        let result = read_pcd(&pcd[..], LzfBackendPreference::ForceInternal);
        assert!(matches!(result, Err(PCDReadError::InvalidData(_))));
    }

    #[test]
    fn parse_compressed_huge_header_tiny_body() {
        let header = XYZ_HEADER
            .replace("WIDTH 5", "WIDTH 100000000")
            .replace("POINTS 5", "POINTS 100000000");
        let mut pcd = format!("{header}DATA binary_compressed\n").into_bytes();
        pcd.write_u32::<LittleEndian>(2).unwrap();
        pcd.write_u32::<LittleEndian>(1_200_000_000).unwrap();
        pcd.extend_from_slice(&[0, b'a']);

        let result = read_pcd(&pcd[..], LzfBackendPreference::ForceInternal);
        assert!(matches!(
            result,
            Err(PCDReadError::Decompression(LzfError::CorruptStream { .. }))
        ));
    }

    #[test]
    fn parse_compressed_stream_longer_than_announced() {
        let body = compressed_body(&expected_points());
        // a long back-reference appended after the real data
        let mut stream = body[8..].to_vec();
        stream.extend_from_slice(&[0xE0, 0xFF, 0x00]);
        let mut overflowing = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        overflowing.write_u32::<LittleEndian>(stream.len() as u32).unwrap();
        overflowing.write_u32::<LittleEndian>(60).unwrap();
        overflowing.extend_from_slice(&stream);

        let result = read_pcd(&overflowing[..], LzfBackendPreference::ForceInternal);
        assert!(matches!(
            result,
            Err(PCDReadError::Decompression(LzfError::OutputOverflow { expected: 60 }))
        ));
    }

    #[test]
    fn transpose_rejects_short_columns() {
        let columns = vec![
            vec![PCDValue::Float(1.0), PCDValue::Float(2.0)],
            vec![PCDValue::Unsigned(3)],
        ];
        assert!(matches!(
            transpose(columns, 2),
            Err(PCDReadError::InvalidData(_))
        ));

        let columns = vec![
            vec![PCDValue::Float(1.0), PCDValue::Float(2.0)],
            vec![PCDValue::Unsigned(3), PCDValue::Unsigned(4)],
        ];
        assert_eq!(
            transpose(columns, 2).unwrap(),
            vec![
                vec![PCDValue::Float(1.0), PCDValue::Unsigned(3)],
                vec![PCDValue::Float(2.0), PCDValue::Unsigned(4)],
            ]
        );
    }

    #[test]
    fn parse_compressed_wrong_point_count() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        pcd.extend_from_slice(&compressed_body(&expected_points()[..4]));

        let result = read_pcd(&pcd[..], LzfBackendPreference::ForceInternal);
        assert!(matches!(result, Err(PCDReadError::InvalidData(_))));
    }

    #[test]
    fn parse_compressed_truncated_payload() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        let body = compressed_body(&expected_points());
        pcd.extend_from_slice(&body[..body.len() - 1]);

        let result = read_pcd(&pcd[..], LzfBackendPreference::ForceInternal);
        assert!(matches!(result, Err(PCDReadError::IOError(_))));
    }

    #[cfg(not(feature = "lzf"))]
    #[test]
    fn parse_compressed_requires_external_backend() {
        let mut pcd = format!("{XYZ_HEADER}DATA binary_compressed\n").into_bytes();
        pcd.extend_from_slice(&compressed_body(&expected_points()));

        let result = read_pcd(&pcd[..], LzfBackendPreference::ForceExternal);
        assert!(matches!(
            result,
            Err(PCDReadError::Decompression(LzfError::MissingBackend))
        ));
    }
}
