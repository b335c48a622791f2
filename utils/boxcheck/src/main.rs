mod image;
mod layout;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use kernel::Supervisor;
use std::fs;
use std::path::PathBuf;
use std::process;

use crate::image::FirmwareImage;
use crate::layout::Layout;
use crate::report::{Outcome, Report};

#[derive(Parser)]
#[command(name = "boxcheck")]
#[command(about = "Load a firmware image's box table on the host model and report the result")]
struct Args {
    /// ELF file or raw flash image
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// JSON board layout
    #[arg(short, long, value_name = "FILE")]
    layout: PathBuf,

    /// Treat the image as a raw binary even if it looks like ELF
    #[arg(long)]
    raw: bool,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bytes = fs::read(&args.image).with_context(|| format!("Failed to read image: {:?}", args.image))?;
    let layout = Layout::from_file(&args.layout)?;

    let firmware = if !args.raw && FirmwareImage::is_elf(&bytes) {
        FirmwareImage::from_elf(&bytes)?
    } else {
        FirmwareImage::from_raw(&bytes, layout.image_base())
    };
    let layout = layout.with_cfgtbl(firmware.cfgtbl);

    let mut hw = layout.machine();
    firmware.load_into(&hw)?;

    let name = args.image.display().to_string();
    let report = match Supervisor::boot(&mut hw, layout.boot) {
        Ok(sup) => Report::booted(name, &hw, &sup),
        Err(fault) => {
            let cfgtbl = layout.boot.cfgtbl_ptr;
            Report::rejected(name, (cfgtbl.start, cfgtbl.end), &fault)
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_text();
    }

    if matches!(report.outcome, Outcome::Rejected { .. }) {
        process::exit(1);
    }
    Ok(())
}
