use std::env;
use std::process::ExitCode;

use udf_ds_std::FileDataStorage;
use udf_fs::Volume;

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: udf_ls <image>");
        return ExitCode::FAILURE;
    };

    match run(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("udf_ls: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str) -> udf_err::Result<()> {
    let storage = FileDataStorage::open(path)?;
    let volume = Volume::open(storage)?;
    list(&volume, None, 0)
}

fn list<DS: udf_ds::DataStorage>(
    volume: &Volume<DS>,
    dir: Option<udf_fs::DirEntryHandle>,
    depth: usize,
) -> udf_err::Result<()> {
    for file in volume.read_dir(dir)? {
        println!("{}{}", "  ".repeat(depth), file.name());
        if file.is_dir() {
            list(volume, Some(file.handle()), depth + 1)?;
        }
    }
    Ok(())
}
