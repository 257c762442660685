//! Command line front end: single-file and recursive directory conversion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgGroup, Parser, ValueEnum};
use fontconv::{Conversion, FontFormat, TargetFormat, convert, detect_format};

#[derive(Parser)]
#[command(version, about = "Convert font files between TTF, WOFF, and WOFF2 formats")]
#[command(group(ArgGroup::new("input").required(true).args(["file", "directory"])))]
struct Args {
    /// Input font file to convert
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Input directory containing font files to convert (recursive)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Output file path (for -f) or output directory (for -d)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target font format
    #[arg(short, long, value_enum)]
    target: Target,

    /// Force overwrite existing output files/directories
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Target {
    Ttf,
    Woff,
    Woff2,
}

impl From<Target> for TargetFormat {
    fn from(target: Target) -> TargetFormat {
        match target {
            Target::Ttf => TargetFormat::Ttf,
            Target::Woff => TargetFormat::Woff,
            Target::Woff2 => TargetFormat::Woff2,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let ok = match (&args.file, &args.directory) {
        (Some(file), _) => process_single_file(&args, file),
        (_, Some(directory)) => process_directory(&args, directory),
        _ => unreachable!("clap enforces the input group"),
    };
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn sniff_file(path: &Path) -> Option<FontFormat> {
    let data = fs::read(path).ok()?;
    detect_format(&data)
}

fn process_single_file(args: &Args, input_file: &Path) -> bool {
    if !input_file.exists() {
        eprintln!("Error: Input file '{}' does not exist", input_file.display());
        return false;
    }
    let Some(source_format) = sniff_file(input_file) else {
        eprintln!("Error: Unable to detect format of '{}'", input_file.display());
        return false;
    };

    let target = TargetFormat::from(args.target);
    if source_format.extension() == target.extension() {
        eprintln!(
            "Skipping: Source and target formats are the same ({})",
            target.extension()
        );
        return true;
    }
    if source_format == FontFormat::Otf && target == TargetFormat::Ttf {
        eprintln!("Note: Converting OTF to TTF with outline conversion (CFF to TrueType).");
    }

    let Some(output_file) = determine_output_path(args, input_file, target) else {
        return false;
    };
    if let Some(parent) = output_file.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("Error: Could not create '{}': {err}", parent.display());
            return false;
        }
    }
    println!(
        "Converting: {} -> {}",
        input_file.display(),
        output_file.display()
    );
    convert_file(input_file, &output_file, target)
}

fn determine_output_path(args: &Args, input_file: &Path, target: TargetFormat) -> Option<PathBuf> {
    match &args.output {
        Some(output) => {
            if output.is_dir() {
                eprintln!(
                    "Error: Output path '{}' is an existing directory",
                    output.display()
                );
                return None;
            }
            if output.exists() && !args.force {
                eprintln!(
                    "Error: Output file '{}' already exists. Use --force to overwrite.",
                    output.display()
                );
                return None;
            }
            Some(output.clone())
        }
        None => {
            let output = input_file.with_extension(target.extension());
            if output.exists() && output != input_file && !args.force {
                eprintln!(
                    "Error: Output file '{}' already exists. Use --force to overwrite.",
                    output.display()
                );
                return None;
            }
            Some(output)
        }
    }
}

fn convert_file(input: &Path, output: &Path, target: TargetFormat) -> bool {
    let data = match fs::read(input) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("Error converting {}: {err}", input.display());
            return false;
        }
    };
    let result = match convert(&data, target) {
        Ok(Conversion::OutlinesRetained(bytes)) => {
            eprintln!("  Warning: Could not convert outlines, keeping CFF format");
            bytes
        }
        Ok(conversion) => conversion.into_bytes(),
        Err(err) => {
            eprintln!("Error converting {}: {err}", input.display());
            return false;
        }
    };
    if let Err(err) = fs::write(output, result) {
        eprintln!("Error converting {}: {err}", input.display());
        return false;
    }
    true
}

fn process_directory(args: &Args, input_dir: &Path) -> bool {
    if !input_dir.exists() {
        eprintln!(
            "Error: Input directory '{}' does not exist",
            input_dir.display()
        );
        return false;
    }
    if !input_dir.is_dir() {
        eprintln!("Error: '{}' is not a directory", input_dir.display());
        return false;
    }
    if let Some(output) = &args.output {
        let same = match (input_dir.canonicalize(), output.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => input_dir == output,
        };
        if same {
            eprintln!("Error: Input and output directories cannot be the same");
            return false;
        }
        if output.exists() && !args.force {
            eprintln!(
                "Error: Output directory '{}' already exists. Use --force to overwrite.",
                output.display()
            );
            return false;
        }
    }

    let mut font_files = Vec::new();
    if let Err(err) = find_font_files(input_dir, &mut font_files) {
        eprintln!("Error: Could not read '{}': {err}", input_dir.display());
        return false;
    }
    if font_files.is_empty() {
        eprintln!("No font files found in '{}'", input_dir.display());
        return true;
    }

    let target = TargetFormat::from(args.target);
    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;
    for font_file in &font_files {
        match convert_directory_file(font_file, input_dir, args, target) {
            FileOutcome::Converted => success_count += 1,
            FileOutcome::Skipped => skip_count += 1,
            FileOutcome::Failed => fail_count += 1,
        }
    }

    println!("\nConversion complete:");
    println!("  Successful: {success_count}");
    println!("  Skipped: {skip_count}");
    println!("  Failed: {fail_count}");
    fail_count == 0
}

enum FileOutcome {
    Converted,
    Skipped,
    Failed,
}

fn convert_directory_file(
    font_file: &Path,
    input_dir: &Path,
    args: &Args,
    target: TargetFormat,
) -> FileOutcome {
    let Some(source_format) = sniff_file(font_file) else {
        eprintln!(
            "Warning: Unable to detect format of '{}', skipping",
            font_file.display()
        );
        return FileOutcome::Skipped;
    };

    let output_file = match &args.output {
        Some(output_dir) => {
            // mirror the input tree under the output directory
            let relative = font_file.strip_prefix(input_dir).unwrap_or(font_file);
            output_dir
                .join(relative)
                .with_extension(target.extension())
        }
        None => {
            if source_format.extension() == target.extension() {
                eprintln!(
                    "Skipping: {} (already in {} format)",
                    font_file.display(),
                    target.extension()
                );
                return FileOutcome::Skipped;
            }
            font_file.with_extension(target.extension())
        }
    };

    if let Some(parent) = output_file.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            eprintln!("Error converting {}: {err}", font_file.display());
            return FileOutcome::Failed;
        }
    }
    println!(
        "Converting: {} -> {}",
        font_file.display(),
        output_file.display()
    );
    if convert_file(font_file, &output_file, target) {
        FileOutcome::Converted
    } else {
        FileOutcome::Failed
    }
}

/// Recursively collect files with a font extension, case-insensitively.
fn find_font_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            find_font_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "ttf" | "otf" | "woff" | "woff2"
                )
            })
        {
            out.push(path);
        }
    }
    Ok(())
}
