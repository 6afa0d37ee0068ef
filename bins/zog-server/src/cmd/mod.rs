pub mod gen_config;
pub mod gen_program;
pub mod send;
pub mod start;

use std::path::Path;

use crate::error::ServerError;

/// Write generated text to `path`, or to stdout when there is none.
fn write_output(path: Option<&Path>, text: &str) -> Result<(), ServerError> {
    match path {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!(path = %path.display(), "written");
        }
        None => print!("{text}"),
    }
    Ok(())
}
