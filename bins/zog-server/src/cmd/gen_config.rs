use crate::config::{FileConfig, GenConfigArgs, LogFormat};
use crate::error::ServerError;

use super::write_output;

pub fn run(args: GenConfigArgs, log_format: Option<LogFormat>) -> Result<(), ServerError> {
    let file = FileConfig {
        logpath: args.logpath.clone(),
        log_format,
        receiver: Some(args.receiver.resolve(None)?),
    };
    write_output(args.output.as_deref(), &file.render()?)
}
