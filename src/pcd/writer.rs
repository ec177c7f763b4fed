use crate::lzf;
use crate::pcd::{PCDDataType, PCDFieldDataType, PCDFieldSize, PCDFieldType, PointCloud};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

type IOResult = Result<(), std::io::Error>;

/// First line of files written by [write_xyz_pcd]
const XYZ_COMMENT: &str = "# .PCD v0.7 - Point Cloud Data file format\n";

/// Writes the point cloud into the file
pub fn write_pcd_file<P: AsRef<Path>>(
    pcd: &PointCloud,
    data_type: PCDDataType,
    p: P,
) -> IOResult {
    let file = File::create(p)?;
    let mut writer = BufWriter::new(file);
    Writer::new(pcd, data_type, &mut writer).write()?;
    writer.flush()
}

/// Writes the point cloud into the provided writer
pub fn write_pcd<W: Write>(
    pcd: &PointCloud,
    data_type: PCDDataType,
    writer: &mut W,
) -> IOResult {
    Writer::new(pcd, data_type, writer).write()
}

/// Writes coordinates as a binary `x y z` float point cloud
pub fn write_xyz_pcd<W: Write>(coordinates: &[[f32; 3]], writer: &mut W) -> IOResult {
    writer.write_all(XYZ_COMMENT.as_bytes())?;
    write_pcd(
        &PointCloud::from_xyz(coordinates),
        PCDDataType::Binary,
        writer,
    )
}

/// Writes coordinates into the file as a binary `x y z` float point cloud
pub fn write_xyz_pcd_file<P: AsRef<Path>>(coordinates: &[[f32; 3]], p: P) -> IOResult {
    let file = File::create(p)?;
    let mut writer = BufWriter::new(file);
    write_xyz_pcd(coordinates, &mut writer)?;
    writer.flush()
}

struct Writer<'a, W: Write> {
    writer: W,
    pcd: &'a PointCloud,
    data_type: PCDDataType,
    layouts: Vec<PCDFieldDataType>,
}

impl<'a, W: Write> Writer<'a, W> {
    fn new(pcd: &'a PointCloud, data_type: PCDDataType, writer: W) -> Self {
        let layouts = pcd.header().fields().iter().map(|f| f.data_type()).collect();
        Self {
            pcd,
            data_type,
            writer,
            layouts,
        }
    }

    fn write(mut self) -> IOResult {
        self.write_header()?;
        self.write_data()
    }

    fn write_header(&mut self) -> IOResult {
        let header = self.pcd.header();
        let mut fields = vec![];
        let mut sizes = vec![];
        let mut types = vec![];
        let mut counts = vec![];

        for field in header.fields() {
            fields.push(field.name().to_string());
            sizes.push(PCDFieldSize::from(field.data_type()).to_string());
            types.push(PCDFieldType::from(field.data_type()).to_string());
            counts.push(field.count().to_string());
        }

        let viewpoint = header
            .viewpoint()
            .iter()
            .map(f32::to_string)
            .collect::<Vec<_>>();

        let header_str = format!(
            "VERSION {}\n\
            FIELDS {}\n\
            SIZE {}\n\
            TYPE {}\n\
            COUNT {}\n\
            WIDTH {}\n\
            HEIGHT {}\n\
            VIEWPOINT {}\n\
            POINTS {}\n\
            DATA {}\n",
            header.version(),
            fields.join(" "),
            sizes.join(" "),
            types.join(" "),
            counts.join(" "),
            header.width(),
            header.height(),
            viewpoint.join(" "),
            header.points(),
            self.data_type
        );

        self.writer.write_all(header_str.as_bytes())
    }

    fn write_data(&mut self) -> IOResult {
        match self.data_type {
            PCDDataType::Ascii => self.write_ascii(),
            PCDDataType::Binary => self.write_binary(),
            PCDDataType::BinaryCompressed => self.write_binary_compressed(),
        }
    }

    fn write_ascii(&mut self) -> IOResult {
        let mut values = Vec::with_capacity(self.layouts.len());
        for point in self.pcd.points() {
            values.clear();
            values.extend(
                self.layouts
                    .iter()
                    .zip(point)
                    .map(|(layout, &value)| layout.format_value(value)),
            );
            self.writer.write_all(values.join(" ").as_bytes())?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn write_binary(&mut self) -> IOResult {
        for point in self.pcd.points() {
            for (layout, &value) in self.layouts.iter().zip(point) {
                layout.write_value(&mut self.writer, value)?;
            }
        }
        Ok(())
    }

    fn write_binary_compressed(&mut self) -> IOResult {
        // Column-major: every value of the first field, then the second, ...
        let capacity = self.pcd.header().point_size() * self.pcd.len();
        let mut columns: Vec<u8> = Vec::with_capacity(capacity);
        for (i, layout) in self.layouts.iter().enumerate() {
            for point in self.pcd.points() {
                layout.write_value(&mut columns, point[i])?;
            }
        }

        let compressed = lzf::compress(&columns);
        self.writer.write_u32::<LittleEndian>(length_u32(compressed.len())?)?;
        self.writer.write_u32::<LittleEndian>(length_u32(columns.len())?)?;
        self.writer.write_all(&compressed)
    }
}

fn length_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{len} bytes of point data do not fit a binary_compressed body"),
        )
    })
}
