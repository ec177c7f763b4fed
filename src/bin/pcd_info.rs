use anyhow::{Context, Result};
use clap::Parser;
use pcdio::pcd::{read_pcd_header, PCDFieldSize, PCDFieldType};
use std::path::PathBuf;

/// Prints the header of .pcd files
#[derive(Parser)]
struct Args {
    /// Only print the number of points
    #[clap(long, default_value_t = false)]
    num_of_points: bool,

    /// .pcd files to inspect
    #[clap(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Args = Args::parse();

    for file in &args.files {
        let header = read_pcd_header(file)
            .with_context(|| format!("Failed to read the header of {}", file.display()))?;

        if args.num_of_points {
            println!("{}: {}", file.display(), header.points());
            continue;
        }

        println!("{}", file.display());
        println!("  version: {}", header.version());
        println!("  format: pcd {}", header.data_type().to_string().to_ascii_uppercase());
        println!(
            "  size: {} x {} ({} points)",
            header.width(),
            header.height(),
            header.points()
        );
        println!("  viewpoint: {:?}", header.viewpoint());
        println!("  fields:");
        for field in header.fields() {
            println!(
                "    {} {}{} x{}",
                field.name(),
                PCDFieldType::from(field.data_type()),
                u8::from(PCDFieldSize::from(field.data_type())),
                field.count()
            );
        }
    }

    Ok(())
}
