use anyhow::{Context, Result};
use clap::Parser;
use kdam::tqdm;
use log::{error, info};
use pcdio::lzf::LzfBackendPreference;
use pcdio::pcd::{read_pcd_file, write_pcd_file, PCDDataType};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Re-encodes .pcd files with another storage type
///
/// Files that fail to decode are reported and skipped.
#[derive(Parser)]
struct Args {
    #[clap(short, long)]
    output_dir: PathBuf,

    /// Storage type can be "ascii", "binary" or "binary_compressed"
    #[clap(short, long, default_value = "binary")]
    storage_type: PCDDataType,

    /// Decoder for binary_compressed input
    #[clap(long, value_enum, default_value_t = LzfBackendPreference::Auto)]
    lzf: LzfBackendPreference,

    /// Files or directories
    files: Vec<OsString>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Args = Args::parse();

    let files_to_convert = find_pcd_files(&args.files)?;
    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let mut count = 0;
    for file_path in tqdm!(files_to_convert.into_iter()) {
        let pcd = match read_pcd_file(&file_path, args.lzf) {
            Ok(pcd) => pcd,
            Err(e) => {
                error!("Failed to read {}\n{e}", file_path.display());
                continue;
            }
        };

        let Some(filename) = file_path.file_name() else {
            continue;
        };
        let output_file = args.output_dir.join(filename);
        if let Err(e) = write_pcd_file(&pcd, args.storage_type, &output_file) {
            error!("Failed to write {}\n{e}", output_file.display());
            continue;
        }
        count += 1;
    }

    info!("Converted {count} files");
    Ok(())
}

fn find_pcd_files(os_strings: &[OsString]) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for file_str in os_strings {
        let path = Path::new(&file_str);
        if path.is_dir() {
            for entry in path
                .read_dir()
                .with_context(|| format!("Failed to list {}", path.display()))?
            {
                let entry = entry?.path();
                // We do not recursively search
                if entry.is_file() && entry.extension().map_or(false, |ext| ext == "pcd") {
                    files.push(entry);
                }
            }
        } else {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}
