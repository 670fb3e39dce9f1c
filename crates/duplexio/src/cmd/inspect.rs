use std::fs::File;
use std::io::BufReader;

use duplexio_engine::parse_log;

use crate::cmd::InspectArgs;
use crate::exit::{engine_error, io_error, CliResult, SUCCESS};
use crate::output::{print_records, OutputFormat};

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let file = File::open(&args.path)
        .map_err(|err| io_error(&format!("failed opening {}", args.path.display()), err))?;
    let records = parse_log(BufReader::new(file))
        .map_err(|err| engine_error(&format!("invalid log {}", args.path.display()), err))?;

    print_records(&records, format);
    Ok(SUCCESS)
}
